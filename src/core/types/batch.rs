//! Local submission batches and attachment archives

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::record::RecordObject;

/// Payload carried by one batch
#[derive(Debug, Clone)]
pub enum BatchPayload {
    /// Encoded body for the queue model (CSV text)
    Encoded(String),
    /// Record collection for the synchronous collection model
    Records {
        /// Outbound records, including attribute tags and encoded attachments
        outbound: Vec<RecordObject>,
        /// The matching original records, for result reconciliation
        originals: Vec<RecordObject>,
    },
}

impl BatchPayload {
    /// Number of records in the payload.
    pub fn record_count(&self) -> usize {
        match self {
            // Encoded payloads count data lines, excluding the header row.
            Self::Encoded(body) => body.lines().count().saturating_sub(1),
            Self::Records { outbound, .. } => outbound.len(),
        }
    }
}

/// An ordered, zero-indexed unit of submission
#[derive(Debug, Clone)]
pub struct Batch {
    /// Position in the split sequence; immutable once assigned
    pub batch_number: usize,
    /// The records or encoded body to submit
    pub payload: BatchPayload,
    /// Whether submission has been attempted
    pub completed: bool,
    /// Whether submission succeeded
    pub success: bool,
    /// Remote identifier assigned at submission time
    pub remote_batch_id: Option<String>,
    /// Submission failure detail
    pub error_message: Option<String>,
}

impl Batch {
    /// A fresh batch awaiting submission.
    pub fn new(batch_number: usize, payload: BatchPayload) -> Self {
        Self {
            batch_number,
            payload,
            completed: false,
            success: false,
            remote_batch_id: None,
            error_message: None,
        }
    }

    /// Payload-free view for status events.
    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            batch_number: self.batch_number,
            completed: self.completed,
            success: self.success,
            remote_batch_id: self.remote_batch_id.clone(),
            error_message: self.error_message.clone(),
        }
    }
}

/// Status of one batch without its payload, suitable for progress events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Position in the split sequence
    pub batch_number: usize,
    /// Whether submission has been attempted
    pub completed: bool,
    /// Whether submission succeeded
    pub success: bool,
    /// Remote identifier assigned at submission time
    pub remote_batch_id: Option<String>,
    /// Submission failure detail
    pub error_message: Option<String>,
}

/// In-memory archive of binary attachment content, keyed by entry name.
///
/// Handed to the engine by ownership transfer; entries are never mutated
/// after construction.
#[derive(Debug, Clone, Default)]
pub struct AttachmentArchive {
    entries: HashMap<String, Bytes>,
}

impl AttachmentArchive {
    /// An archive over the given entries.
    pub fn new(entries: HashMap<String, Bytes>) -> Self {
        Self { entries }
    }

    /// Look up an entry by name.
    pub fn get(&self, name: &str) -> Option<&Bytes> {
        self.entries.get(name)
    }

    /// Number of entries in the archive.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the archive has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
