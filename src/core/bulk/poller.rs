//! Status poller for the queue model
//!
//! Fetches job status on a fixed interval, bounded by an iteration cap.
//! Exceeding the cap leaves the session in Processing without further
//! action; that stall is caller-visible, not an automatic failure.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::LoadConfig;
use crate::core::client::RemoteApi;
use crate::core::session::liveness::Liveness;
use crate::core::types::{JobInfo, OrgRef};
use crate::utils::error::Result;

use super::reorder_batches;

/// Terminal observation of one polling run
#[derive(Debug)]
pub struct PollOutcome {
    /// Latest job info, batches in submission order
    pub job: JobInfo,
    /// Whether the completion predicate was observed
    pub completed: bool,
    /// Status fetches performed
    pub iterations: u32,
}

/// Polls one job until completion, the iteration cap, or session teardown
pub struct StatusPoller<'a> {
    client: &'a dyn RemoteApi,
    live: &'a Liveness,
    interval: Duration,
    max_iterations: u32,
}

impl<'a> StatusPoller<'a> {
    /// A poller configured from the engine's load settings.
    pub fn new(client: &'a dyn RemoteApi, config: &LoadConfig, live: &'a Liveness) -> Self {
        Self {
            client,
            live,
            interval: Duration::from_millis(config.poll_interval_ms),
            max_iterations: config.max_poll_iterations,
        }
    }

    /// Poll until the job is done or the iteration cap is reached.
    ///
    /// `on_update` receives each reordered job snapshot as it replaces the
    /// cached one. Returns `completed: false` when the cap is exceeded or
    /// the session dies mid-poll.
    pub async fn poll(
        &self,
        org: &OrgRef,
        mut job: JobInfo,
        expected_batches: usize,
        batch_order: &HashMap<String, usize>,
        mut on_update: impl FnMut(&JobInfo),
    ) -> Result<PollOutcome> {
        let Some(job_id) = job.id.clone() else {
            // Synthetic jobs have nothing to poll.
            return Ok(PollOutcome {
                job,
                completed: false,
                iterations: 0,
            });
        };

        let mut iterations = 0u32;
        loop {
            if job_is_done(&job, expected_batches) {
                debug!(%job_id, iterations, "Job completed");
                return Ok(PollOutcome {
                    job,
                    completed: true,
                    iterations,
                });
            }
            if iterations >= self.max_iterations {
                warn!(
                    %job_id,
                    iterations, "Polling iteration cap reached, leaving job in processing state"
                );
                return Ok(PollOutcome {
                    job,
                    completed: false,
                    iterations,
                });
            }

            tokio::time::sleep(self.interval).await;
            if !self.live.is_live() {
                debug!(%job_id, "Session no longer live, discarding poll");
                return Ok(PollOutcome {
                    job,
                    completed: false,
                    iterations,
                });
            }

            iterations += 1;
            match self.client.get_job(org, &job_id).await {
                Ok(mut fetched) => {
                    if !self.live.is_live() {
                        return Ok(PollOutcome {
                            job,
                            completed: false,
                            iterations,
                        });
                    }
                    // Remote batch order is not guaranteed to match
                    // submission order; restore it before caching.
                    fetched.batches =
                        reorder_batches(std::mem::take(&mut fetched.batches), batch_order);
                    job = fetched;
                    on_update(&job);
                }
                Err(e) => {
                    // A failed status fetch burns an iteration but does not
                    // end the run; the cached job info stands.
                    warn!(%job_id, iterations, "Status fetch failed: {}", e);
                }
            }
        }
    }
}

/// Domain-specific completion predicate: every successfully submitted batch
/// is visible in the job's batch list, and the job's own counters account
/// for every batch it knows about.
pub fn job_is_done(job: &JobInfo, expected_batches: usize) -> bool {
    job.batches.len() >= expected_batches
        && job.number_batches_total > 0
        && job.number_batches_completed + job.number_batches_failed >= job.number_batches_total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::client::MockRemoteApi;
    use crate::core::types::{
        ConcurrencyMode, JobState, OperationKind, RemoteBatchInfo, RemoteBatchState,
    };
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn job(id: &str, total: u32, completed: u32, failed: u32, batches: usize) -> JobInfo {
        JobInfo {
            id: Some(id.to_string()),
            object: "Account".to_string(),
            operation: OperationKind::Insert,
            concurrency_mode: ConcurrencyMode::Parallel,
            state: JobState::InProgress,
            number_batches_queued: 0,
            number_batches_in_progress: 0,
            number_batches_completed: completed,
            number_batches_failed: failed,
            number_batches_total: total,
            number_records_processed: 0,
            number_records_failed: 0,
            created_date: None,
            batches: (0..batches)
                .map(|i| RemoteBatchInfo {
                    id: format!("B{}", i),
                    job_id: id.to_string(),
                    state: RemoteBatchState::Completed,
                    number_records_processed: 0,
                    number_records_failed: 0,
                    created_date: None,
                    state_message: None,
                })
                .collect(),
        }
    }

    fn order(count: usize) -> HashMap<String, usize> {
        (0..count).map(|i| (format!("B{}", i), i)).collect()
    }

    fn config(interval_ms: u64, max_iterations: u32) -> LoadConfig {
        LoadConfig {
            poll_interval_ms: interval_ms,
            max_poll_iterations: max_iterations,
            ..LoadConfig::default()
        }
    }

    #[test]
    fn test_done_predicate() {
        assert!(job_is_done(&job("750", 2, 1, 1, 2), 2));
        assert!(job_is_done(&job("750", 2, 2, 0, 2), 2));
        // Counters lag behind: not done yet.
        assert!(!job_is_done(&job("750", 2, 1, 0, 2), 2));
        // Batch list does not yet cover every submitted batch.
        assert!(!job_is_done(&job("750", 2, 2, 0, 1), 2));
        // A job that knows of no batches is never done.
        assert!(!job_is_done(&job("750", 0, 0, 0, 0), 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_done() {
        let mut client = MockRemoteApi::new();
        let fetches = Arc::new(AtomicU32::new(0));
        let fetch_counter = fetches.clone();
        client.expect_get_job().returning(move |_, _| {
            let n = fetch_counter.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Ok(job("750", 2, 1, 0, 2))
            } else {
                Ok(job("750", 2, 2, 0, 2))
            }
        });

        let live = Liveness::new();
        let cfg = config(3_000, 200);
        let poller = StatusPoller::new(&client, &cfg, &live);

        let mut updates = 0;
        let outcome = poller
            .poll(
                &OrgRef::new("org-1"),
                job("750", 2, 0, 0, 2),
                2,
                &order(2),
                |_| updates += 1,
            )
            .await
            .unwrap();

        assert!(outcome.completed);
        assert_eq!(outcome.iterations, 3);
        assert_eq!(updates, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_stops_at_iteration_cap() {
        let mut client = MockRemoteApi::new();
        client
            .expect_get_job()
            .returning(|_, _| Ok(job("750", 2, 1, 0, 2)));

        let live = Liveness::new();
        let cfg = config(3_000, 5);
        let poller = StatusPoller::new(&client, &cfg, &live);

        let outcome = poller
            .poll(
                &OrgRef::new("org-1"),
                job("750", 2, 0, 0, 2),
                2,
                &order(2),
                |_| {},
            )
            .await
            .unwrap();

        assert!(!outcome.completed);
        assert_eq!(outcome.iterations, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_session_discards_poll() {
        let live = Liveness::new();
        let mut client = MockRemoteApi::new();
        let live_for_fetch = live.clone();
        client.expect_get_job().returning(move |_, _| {
            // Host tears the session down while the fetch is in flight.
            live_for_fetch.kill();
            Ok(job("750", 2, 2, 0, 2))
        });

        let cfg = config(3_000, 200);
        let poller = StatusPoller::new(&client, &cfg, &live);

        let mut updates = 0;
        let outcome = poller
            .poll(
                &OrgRef::new("org-1"),
                job("750", 2, 0, 0, 2),
                2,
                &order(2),
                |_| updates += 1,
            )
            .await
            .unwrap();

        assert!(!outcome.completed);
        assert_eq!(updates, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_error_burns_iteration_without_failing() {
        let mut client = MockRemoteApi::new();
        let fetches = Arc::new(AtomicU32::new(0));
        let fetch_counter = fetches.clone();
        client.expect_get_job().returning(move |_, _| {
            let n = fetch_counter.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(crate::utils::error::LoadError::RemoteApi(
                    "transient".to_string(),
                ))
            } else {
                Ok(job("750", 1, 1, 0, 1))
            }
        });

        let live = Liveness::new();
        let cfg = config(3_000, 200);
        let poller = StatusPoller::new(&client, &cfg, &live);

        let outcome = poller
            .poll(
                &OrgRef::new("org-1"),
                job("750", 1, 0, 0, 1),
                1,
                &order(1),
                |_| {},
            )
            .await
            .unwrap();

        assert!(outcome.completed);
        assert_eq!(outcome.iterations, 2);
    }
}
