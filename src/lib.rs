//! # Bulkflow
//!
//! A record load orchestration engine: given prepared input rows and a
//! target schema, load them into a remote system of record through one of
//! two mutually exclusive asynchronous protocols — a job/batch queue model
//! (submit batches, poll an async job until done) or a synchronous
//! collection model (submit fixed-size record batches directly, get
//! immediate per-record results) — then reconcile remote results back onto
//! the original input records, preserving order and surfacing per-record
//! and per-batch failures.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use bulkflow::{
//!     ApiMode, EngineConfig, EngineRequest, HttpRemoteApi, LoadEngine, LoadRequest,
//!     MemoryHistoryStore, OperationKind, OrgRef, PrepareOutcome,
//! };
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::from_env()?;
//!     let client = Arc::new(HttpRemoteApi::new(&config.remote)?);
//!     let history = Arc::new(MemoryHistoryStore::new());
//!
//!     let engine = LoadEngine::new(config, client, history)?;
//!     let mut handle = engine.spawn();
//!
//!     handle
//!         .send(EngineRequest::LoadData(LoadRequest {
//!             session: Uuid::new_v4(),
//!             org: OrgRef::new("org-1"),
//!             prepared: PrepareOutcome::default(),
//!             object: "Account".to_string(),
//!             operation: OperationKind::Insert,
//!             api_mode: ApiMode::Bulk,
//!             batch_size: Some(10_000),
//!             serial_mode: false,
//!             external_id: None,
//!             assignment_rule_id: None,
//!             attachments: None,
//!             binary_field: None,
//!         }))
//!         .await?;
//!
//!     while let Some(event) = handle.events.recv().await {
//!         println!("{:?}", event);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod config;
pub mod core;
pub mod utils;

// Re-export main types
pub use config::{EngineConfig, LoadConfig, RemoteConfig};
pub use utils::error::{LoadError, Result};
pub use utils::logging::init_logging;

// Export the engine surface
pub use core::session::{
    EngineEvent, EngineHandle, EngineRequest, Liveness, LoadEngine, LoadSession, LoadStatus,
    SessionStatus,
};

// Export the data model
pub use core::types::{
    ApiMode, AttachmentArchive, Batch, BatchPayload, BatchSummary, ConcurrencyMode,
    DuplicateLookupPolicy, FieldKind, FieldMappingItem, HttpMethod, JobInfo, JobState,
    JobStatusSnapshot, LoadRequest, LookupMapping, OperationKind, OrgRef, PrepareError,
    PrepareOutcome, PrepareRequest, PreparedRecord, RecordError, RecordObject, RemoteBatchInfo,
    RemoteBatchState, ResultRecord,
};

// Export collaborator seams and outcomes
pub use core::client::{
    CollectionRecordResult, CollectionRequest, CreateJobRequest, HttpRemoteApi, RemoteApi,
};
pub use core::history::{HistoryStore, LoadHistoryRecord, MemoryHistoryStore};
pub use core::results::LoadOutcome;

/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Name of the crate
pub const NAME: &str = env!("CARGO_PKG_NAME");
