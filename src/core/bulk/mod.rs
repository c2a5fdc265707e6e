//! Job driver for the queue model
//!
//! Creates the remote job, submits batches strictly in order, builds the
//! `remote_batch_id -> batch_number` map that every later reordering keys
//! off, and closes the job best-effort. Individual batch submission failure
//! never aborts the run; losing batches only surfaces as an aggregate error
//! after all submissions are attempted.

pub mod poller;

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::core::client::{CreateJobRequest, RemoteApi};
use crate::core::session::liveness::Liveness;
use crate::core::types::{
    Batch, BatchPayload, ConcurrencyMode, JobInfo, JobState, JobStatusSnapshot, LoadRequest,
    OperationKind, RemoteBatchInfo,
};
use crate::utils::error::{LoadError, Result};

/// State collected by one queue-model run
#[derive(Debug)]
pub struct BulkRunState {
    /// Job info with batches in submission order
    pub job: JobInfo,
    /// Remote batch id to submission-order index
    pub batch_order: HashMap<String, usize>,
    /// Per-batch submission status
    pub batches: Vec<Batch>,
    /// Aggregate error when one or more batches failed to load
    pub aggregate_error: Option<LoadError>,
}

/// Drives one job through create, sequential submission, and best-effort close
pub struct JobDriver<'a> {
    client: &'a dyn RemoteApi,
    live: &'a Liveness,
}

impl<'a> JobDriver<'a> {
    /// A driver over the given remote client and session liveness flag.
    pub fn new(client: &'a dyn RemoteApi, live: &'a Liveness) -> Self {
        Self { client, live }
    }

    /// Run the full submission sequence for one load request.
    ///
    /// `emit` receives a status snapshot after job creation and after every
    /// batch submission, successful or not.
    pub async fn run(
        &self,
        request: &LoadRequest,
        mut batches: Vec<Batch>,
        mut emit: impl FnMut(JobStatusSnapshot),
    ) -> Result<BulkRunState> {
        let external_id = match request.operation {
            OperationKind::Upsert => request.external_id.clone(),
            _ => None,
        };
        let mut job = self
            .client
            .create_job(
                &request.org,
                &CreateJobRequest {
                    operation: request.operation,
                    object: request.object.clone(),
                    concurrency_mode: ConcurrencyMode::from_serial_flag(request.serial_mode),
                    external_id_field_name: external_id,
                    assignment_rule_id: request.assignment_rule_id.clone(),
                },
            )
            .await?;
        let job_id = job
            .id
            .clone()
            .ok_or_else(|| LoadError::RemoteApi("Job created without an id".to_string()))?;
        info!(%job_id, batches = batches.len(), "Remote job created");

        let total_batches = batches.len();
        let mut batch_order: HashMap<String, usize> = HashMap::new();
        let mut submission_errors: Vec<String> = Vec::new();

        emit(snapshot(&job, total_batches, &batches));

        for index in 0..batches.len() {
            let is_last = index + 1 == total_batches;
            let payload = match &mut batches[index].payload {
                // Ownership of the encoded body moves to the client; the
                // batch is never read for its payload again.
                BatchPayload::Encoded(body) => std::mem::take(body),
                BatchPayload::Records { .. } => {
                    return Err(LoadError::Internal(
                        "Queue-model batches must carry encoded payloads".to_string(),
                    ));
                }
            };

            let submitted = self
                .client
                .add_batch(&request.org, &job_id, payload, is_last)
                .await;
            if !self.live.is_live() {
                debug!(%job_id, "Session no longer live, abandoning submission");
                return Ok(BulkRunState {
                    job,
                    batch_order,
                    batches,
                    aggregate_error: None,
                });
            }

            let batch = &mut batches[index];
            batch.completed = true;
            match submitted {
                Ok(remote) => {
                    batch_order.insert(remote.id.clone(), index);
                    batch.remote_batch_id = Some(remote.id.clone());
                    batch.success = true;
                    job.batches.push(remote);
                }
                Err(e) => {
                    warn!(%job_id, batch_number = index, "Batch submission failed: {}", e);
                    batch.success = false;
                    batch.error_message = Some(e.to_string());
                    submission_errors.push(format!("batch {}: {}", index, e));
                }
            }
            emit(snapshot(&job, total_batches, &batches));
        }

        let mut final_job = self.client.get_job(&request.org, &job_id).await?;
        if !self.live.is_live() {
            return Ok(BulkRunState {
                job: final_job,
                batch_order,
                batches,
                aggregate_error: None,
            });
        }
        final_job.batches = reorder_batches(std::mem::take(&mut final_job.batches), &batch_order);

        let aggregate_error = if final_job.batches.len() != total_batches {
            // At least one batch never made it to the remote system.
            Some(LoadError::batch_load(submission_errors))
        } else {
            None
        };

        if final_job.state == JobState::Open {
            if let Err(e) = self.client.close_job(&request.org, &job_id).await {
                // Closing is best-effort cleanup; the load result stands.
                debug!(%job_id, "Ignoring job close failure: {}", e);
            }
        }

        Ok(BulkRunState {
            job: final_job,
            batch_order,
            batches,
            aggregate_error,
        })
    }
}

/// Restore submission order over a remote batch list using the id map built
/// during submission. Remote batches with no known id are dropped, as are
/// gaps left by batches that never reached the remote system.
pub fn reorder_batches(
    batches: Vec<RemoteBatchInfo>,
    order: &HashMap<String, usize>,
) -> Vec<RemoteBatchInfo> {
    let slot_count = order.values().max().map_or(0, |max| max + 1);
    let mut slots: Vec<Option<RemoteBatchInfo>> = Vec::new();
    slots.resize_with(slot_count, || None);

    for batch in batches {
        if let Some(&index) = order.get(&batch.id) {
            if index < slots.len() {
                slots[index] = Some(batch);
            }
        }
    }

    slots.into_iter().flatten().collect()
}

fn snapshot(job: &JobInfo, total_batches: usize, batches: &[Batch]) -> JobStatusSnapshot {
    JobStatusSnapshot {
        job: job.clone(),
        total_batches,
        batch_summaries: batches.iter().map(Batch::summary).collect(),
    }
}
