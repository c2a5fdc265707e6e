//! Utility modules for the load engine

pub mod error;
pub mod logging;

pub use error::{LoadError, Result};
