//! Typed messages exchanged between the engine and its host
//!
//! Every message carries the session token so replies can be demultiplexed
//! even across overlapping requests.

use uuid::Uuid;

use crate::core::results::LoadOutcome;
use crate::core::types::{JobStatusSnapshot, LoadRequest, PrepareOutcome, PrepareRequest, ResultRecord};

/// Requests the host sends to the engine
#[derive(Debug)]
pub enum EngineRequest {
    /// Transform raw rows into target-schema records
    PrepareData(PrepareRequest),
    /// Load prepared records into the remote system
    LoadData(LoadRequest),
}

impl EngineRequest {
    /// Session token the request belongs to.
    pub fn session(&self) -> Uuid {
        match self {
            Self::PrepareData(request) => request.session,
            Self::LoadData(request) => request.session,
        }
    }
}

/// Running progress snapshot for one load
#[derive(Debug, Clone)]
pub enum LoadStatus {
    /// Queue model: job info plus per-batch submission summaries
    Job(JobStatusSnapshot),
    /// Collection model: per-record results for one reconciled batch
    Records(Vec<ResultRecord>),
}

/// Events and replies the engine emits to the host
#[derive(Debug)]
pub enum EngineEvent {
    /// Incremental preparation progress, 0-100
    PrepareDataProgress {
        /// Owning session
        session: Uuid,
        /// Percentage of lookups resolved
        progress: u8,
    },
    /// Terminal reply to a `PrepareData` request
    PrepareDataDone {
        /// Owning session
        session: Uuid,
        /// Prepared records and per-row errors; absent on fatal failure
        data: Option<PrepareOutcome>,
        /// Fatal error detail
        error: Option<String>,
    },
    /// Running progress for a `LoadData` request
    LoadDataStatus {
        /// Owning session
        session: Uuid,
        /// Current snapshot
        status: LoadStatus,
    },
    /// Terminal reply to a `LoadData` request
    LoadDataDone {
        /// Owning session
        session: Uuid,
        /// Final tallies and results; present even for failed sessions so
        /// consumers always see counts
        outcome: Option<LoadOutcome>,
        /// Fatal or aggregate error detail
        error: Option<String>,
    },
}

impl EngineEvent {
    /// Session token the event belongs to.
    pub fn session(&self) -> Uuid {
        match self {
            Self::PrepareDataProgress { session, .. }
            | Self::PrepareDataDone { session, .. }
            | Self::LoadDataStatus { session, .. }
            | Self::LoadDataDone { session, .. } => *session,
        }
    }
}
