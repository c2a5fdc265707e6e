//! Load history hand-off
//!
//! A completed session produces one history record keyed
//! `org-id:session-token`, handed to an external storage collaborator
//! through the [`HistoryStore`] trait. Persistence failure never affects
//! the session outcome.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core::types::{ApiMode, OperationKind, PrepareError};
use crate::utils::error::Result;

/// Snapshot of one completed load session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadHistoryRecord {
    /// Storage key, `org-id:session-token`
    pub key: String,
    /// Session token
    pub session: Uuid,
    /// Org the load ran against
    pub org: String,
    /// Target object name
    pub object: String,
    /// Operation performed
    pub operation: OperationKind,
    /// Protocol used
    pub api_mode: ApiMode,
    /// Records per batch
    pub batch_size: usize,
    /// Whether the job ran its batches serially
    pub serial_mode: bool,
    /// External id field, upsert only
    pub external_id: Option<String>,
    /// Assignment rule applied, when configured
    pub assignment_rule_id: Option<String>,
    /// When the load started
    pub started_at: DateTime<Utc>,
    /// When the load finished
    pub finished_at: DateTime<Utc>,
    /// Records accepted by the remote system
    pub success: u64,
    /// Records that failed anywhere in the run
    pub failure: u64,
    /// Rows that failed during preparation
    pub errors: Vec<PrepareError>,
}

impl LoadHistoryRecord {
    /// Storage key for an org/session pair.
    pub fn key_for(org: &str, session: &Uuid) -> String {
        format!("{}:{}", org, session)
    }
}

/// External storage collaborator for completed-session history
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Persist one history record.
    async fn save(&self, record: &LoadHistoryRecord) -> Result<()>;
}

/// In-memory history store
#[derive(Debug, Clone, Default)]
pub struct MemoryHistoryStore {
    entries: Arc<RwLock<HashMap<String, LoadHistoryRecord>>>,
}

impl MemoryHistoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a stored record by key.
    pub async fn get(&self, key: &str) -> Option<LoadHistoryRecord> {
        self.entries.read().await.get(key).cloned()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn save(&self, record: &LoadHistoryRecord) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(record.key.clone(), record.clone());
        Ok(())
    }
}
