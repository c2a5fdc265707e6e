//! Remote job and batch status carriers for the queue model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::operation::{ConcurrencyMode, OperationKind};

/// Lifecycle state of a remote job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// Accepting batches
    Open,
    /// Closed and processing submitted batches
    InProgress,
    /// All batches processed
    Completed,
    /// The job itself failed
    Failed,
    /// Aborted by the caller or the remote system
    Aborted,
}

/// Processing state of one remote batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteBatchState {
    /// Waiting to be processed
    Queued,
    /// Being processed
    InProgress,
    /// Processed; per-record results available
    Completed,
    /// Processing failed for the whole batch
    Failed,
}

/// Status of one batch as reported by the remote system
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteBatchInfo {
    /// Remote batch identifier
    pub id: String,
    /// Owning job identifier
    pub job_id: String,
    /// Current processing state
    pub state: RemoteBatchState,
    /// Records processed so far in this batch
    #[serde(default)]
    pub number_records_processed: u64,
    /// Records that failed in this batch
    #[serde(default)]
    pub number_records_failed: u64,
    /// When the remote system created the batch
    #[serde(default)]
    pub created_date: Option<DateTime<Utc>>,
    /// Failure detail reported by the remote system
    #[serde(default)]
    pub state_message: Option<String>,
}

/// A remote job with its aggregate counters and batch list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    /// Remote job identifier; absent on synthetic placeholder jobs
    pub id: Option<String>,
    /// Target object name
    pub object: String,
    /// Operation the job performs
    pub operation: OperationKind,
    /// Batch processing mode
    pub concurrency_mode: ConcurrencyMode,
    /// Current job state
    pub state: JobState,
    /// Batches waiting to be processed
    #[serde(default)]
    pub number_batches_queued: u32,
    /// Batches being processed
    #[serde(default)]
    pub number_batches_in_progress: u32,
    /// Batches processed to completion
    #[serde(default)]
    pub number_batches_completed: u32,
    /// Batches that failed
    #[serde(default)]
    pub number_batches_failed: u32,
    /// Total batches the job knows about
    #[serde(default)]
    pub number_batches_total: u32,
    /// Records processed across all batches
    #[serde(default)]
    pub number_records_processed: u64,
    /// Records that failed across all batches
    #[serde(default)]
    pub number_records_failed: u64,
    /// When the remote system created the job
    #[serde(default)]
    pub created_date: Option<DateTime<Utc>>,
    /// Batch statuses, held in submission order once reordered locally
    #[serde(default)]
    pub batches: Vec<RemoteBatchInfo>,
}

impl JobInfo {
    /// Synthetic Failed job used when zero rows survive preparation, so
    /// downstream consumers always see a consistent shape.
    pub fn failed_placeholder(
        object: impl Into<String>,
        operation: OperationKind,
        concurrency_mode: ConcurrencyMode,
    ) -> Self {
        Self {
            id: None,
            object: object.into(),
            operation,
            concurrency_mode,
            state: JobState::Failed,
            number_batches_queued: 0,
            number_batches_in_progress: 0,
            number_batches_completed: 0,
            number_batches_failed: 0,
            number_batches_total: 0,
            number_records_processed: 0,
            number_records_failed: 0,
            created_date: None,
            batches: Vec::new(),
        }
    }

    /// Records accepted by the remote system.
    pub fn records_succeeded(&self) -> u64 {
        self.number_records_processed
            .saturating_sub(self.number_records_failed)
    }
}

/// Running snapshot of a queue-model load, emitted on the session channel
/// after every batch submission and status fetch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusSnapshot {
    /// Current job info, batches in submission order
    pub job: JobInfo,
    /// Number of batches the partitioner produced
    pub total_batches: usize,
    /// Payload-free submission status per batch
    pub batch_summaries: Vec<super::batch::BatchSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_placeholder_shape() {
        let job = JobInfo::failed_placeholder("Account", OperationKind::Upsert, ConcurrencyMode::Serial);
        assert_eq!(job.state, JobState::Failed);
        assert!(job.id.is_none());
        assert!(job.batches.is_empty());
        assert_eq!(job.number_batches_total, 0);
    }

    #[test]
    fn test_records_succeeded_saturates() {
        let mut job = JobInfo::failed_placeholder("Account", OperationKind::Insert, ConcurrencyMode::Parallel);
        job.number_records_processed = 10;
        job.number_records_failed = 4;
        assert_eq!(job.records_succeeded(), 6);

        job.number_records_failed = 20;
        assert_eq!(job.records_succeeded(), 0);
    }

    #[test]
    fn test_job_info_wire_names() {
        let json = r#"{
            "id": "750xx001",
            "object": "Contact",
            "operation": "INSERT",
            "concurrencyMode": "Parallel",
            "state": "InProgress",
            "numberBatchesTotal": 3,
            "numberBatchesCompleted": 1,
            "numberRecordsProcessed": 100,
            "numberRecordsFailed": 2,
            "batches": [
                {"id": "751aa", "jobId": "750xx001", "state": "Completed", "numberRecordsProcessed": 100, "numberRecordsFailed": 2}
            ]
        }"#;

        let job: JobInfo = serde_json::from_str(json).unwrap();
        assert_eq!(job.id.as_deref(), Some("750xx001"));
        assert_eq!(job.number_batches_total, 3);
        assert_eq!(job.batches.len(), 1);
        assert_eq!(job.batches[0].state, RemoteBatchState::Completed);
    }
}
