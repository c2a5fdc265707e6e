//! Result aggregator: one outcome per original input row
//!
//! Combines rows that failed preparation, rows filtered before submission,
//! and remote per-record outcomes into the session's terminal tallies. The
//! collection model carries full per-record results; the queue model
//! reports counts from the job's aggregate counters, with per-record
//! detail for the rows the engine itself rejected.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::{JobInfo, PrepareError, RecordError, ResultRecord};

/// Status code attached to rows that failed during preparation
pub const STATUS_PROCESSING_ERROR: &str = "PROCESSING_ERROR";

/// Terminal outcome of one load session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadOutcome {
    /// Records the remote system accepted
    pub success: u64,
    /// Records that failed anywhere: preparation, submission, or remotely
    pub failure: u64,
    /// Per-record outcomes, where per-record detail exists
    pub results: Vec<ResultRecord>,
    /// Final job info for queue-model sessions
    pub job: Option<JobInfo>,
    /// Aggregate error carried by an otherwise-finished run
    pub aggregate_error: Option<String>,
}

/// Combine collection-model per-record results with preparation failures.
pub fn aggregate_collection_results(
    remote: Vec<ResultRecord>,
    prepare_errors: &[PrepareError],
) -> LoadOutcome {
    let success = remote.iter().filter(|r| r.success).count() as u64;
    let remote_failures = remote.len() as u64 - success;

    let mut results = remote;
    results.extend(prepare_errors.iter().map(prepare_error_result));

    let failure = remote_failures + prepare_errors.len() as u64;
    debug!(success, failure, "Aggregated collection results");

    LoadOutcome {
        success,
        failure,
        results,
        job: None,
        aggregate_error: None,
    }
}

/// Combine queue-model job counters with preparation failures.
pub fn aggregate_job_outcome(
    job: JobInfo,
    prepare_errors: &[PrepareError],
    aggregate_error: Option<String>,
) -> LoadOutcome {
    let success = job.records_succeeded();
    let failure = job.number_records_failed + prepare_errors.len() as u64;
    debug!(success, failure, "Aggregated job outcome");

    LoadOutcome {
        success,
        failure,
        results: prepare_errors.iter().map(prepare_error_result).collect(),
        job: Some(job),
        aggregate_error,
    }
}

/// The outcome reported when zero rows survive preparation: full failure,
/// with a synthetic Failed job so downstream consumers see a consistent
/// shape.
pub fn total_failure_outcome(job: JobInfo, prepare_errors: &[PrepareError]) -> LoadOutcome {
    LoadOutcome {
        success: 0,
        failure: prepare_errors.len() as u64,
        results: prepare_errors.iter().map(prepare_error_result).collect(),
        job: Some(job),
        aggregate_error: None,
    }
}

fn prepare_error_result(error: &PrepareError) -> ResultRecord {
    ResultRecord::failure(
        error.record.clone(),
        RecordError::new(STATUS_PROCESSING_ERROR, error.errors.join("\n")),
    )
}
