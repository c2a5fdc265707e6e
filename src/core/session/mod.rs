//! Load session engine
//!
//! Runs as an isolated background task and communicates with the host
//! exclusively through typed messages tagged with the session token: one
//! request in, periodic progress events out, one terminal reply per
//! request. Exactly one load session is active per engine instance.

pub mod liveness;
pub mod message;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::core::bulk::JobDriver;
use crate::core::bulk::poller::StatusPoller;
use crate::core::client::RemoteApi;
use crate::core::collection::CollectionDriver;
use crate::core::history::{HistoryStore, LoadHistoryRecord};
use crate::core::partition::{AttachmentThresholds, build_bulk_batches, build_collection_batches};
use crate::core::prepare::prepare_records;
use crate::core::results::{
    LoadOutcome, aggregate_collection_results, aggregate_job_outcome, total_failure_outcome,
};
use crate::core::types::{
    ApiMode, Batch, ConcurrencyMode, JobInfo, JobStatusSnapshot, LoadRequest, PrepareRequest,
};
use crate::utils::error::{LoadError, Result};

pub use liveness::Liveness;
pub use message::{EngineEvent, EngineRequest, LoadStatus};

/// Lifecycle of one load session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Transforming rows and resolving lookups
    Preparing,
    /// Submitting batches to the remote system
    Uploading,
    /// Waiting for the remote job to finish
    Processing,
    /// Terminal: load finished, tallies reported
    Finished,
    /// Terminal: fatal failure
    Error,
}

impl SessionStatus {
    fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Error)
    }
}

/// Top-level aggregate correlating one load run
#[derive(Debug)]
pub struct LoadSession {
    /// Opaque correlation token
    pub token: Uuid,
    /// Current lifecycle state
    pub status: SessionStatus,
    /// When the session started
    pub started_at: DateTime<Utc>,
}

impl LoadSession {
    fn new(token: Uuid) -> Self {
        Self {
            token,
            status: SessionStatus::Preparing,
            started_at: Utc::now(),
        }
    }

    /// Move to a new lifecycle state. A session is finalized at most once.
    fn advance(&mut self, status: SessionStatus) {
        debug_assert!(
            !self.status.is_terminal(),
            "session advanced after finalization"
        );
        debug!(session = %self.token, from = ?self.status, to = ?status, "Session state change");
        self.status = status;
    }
}

/// Handle the host keeps to a spawned engine
pub struct EngineHandle {
    requests: mpsc::Sender<EngineRequest>,
    /// Progress events and terminal replies, in emission order
    pub events: mpsc::UnboundedReceiver<EngineEvent>,
    live: Liveness,
}

impl EngineHandle {
    /// Send one request to the engine.
    pub async fn send(&self, request: EngineRequest) -> Result<()> {
        self.requests
            .send(request)
            .await
            .map_err(|_| LoadError::Channel("Engine task has stopped".to_string()))
    }

    /// Mark the session as no longer wanted. In-flight remote calls are not
    /// aborted; their results are discarded.
    pub fn shutdown(&self) {
        self.live.kill();
    }

    /// The liveness flag shared with the engine.
    pub fn liveness(&self) -> Liveness {
        self.live.clone()
    }
}

/// The record load orchestration engine
pub struct LoadEngine {
    config: EngineConfig,
    client: Arc<dyn RemoteApi>,
    history: Arc<dyn HistoryStore>,
}

impl LoadEngine {
    /// Create an engine over a remote client and history collaborator.
    pub fn new(
        config: EngineConfig,
        client: Arc<dyn RemoteApi>,
        history: Arc<dyn HistoryStore>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            client,
            history,
        })
    }

    /// Spawn the engine as a background task and return the host's handle.
    pub fn spawn(self) -> EngineHandle {
        let (request_tx, request_rx) = mpsc::channel(8);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let live = Liveness::new();

        let task_live = live.clone();
        tokio::spawn(async move {
            self.run(request_rx, event_tx, task_live).await;
        });

        EngineHandle {
            requests: request_tx,
            events: event_rx,
            live,
        }
    }

    async fn run(
        self,
        mut requests: mpsc::Receiver<EngineRequest>,
        events: mpsc::UnboundedSender<EngineEvent>,
        live: Liveness,
    ) {
        info!("Load engine started");
        while let Some(request) = requests.recv().await {
            if !live.is_live() {
                break;
            }
            match request {
                EngineRequest::PrepareData(request) => {
                    self.handle_prepare(request, &events).await;
                }
                EngineRequest::LoadData(request) => {
                    self.handle_load(request, &events, &live).await;
                }
            }
        }
        debug!("Load engine stopped");
    }

    async fn handle_prepare(
        &self,
        request: PrepareRequest,
        events: &mpsc::UnboundedSender<EngineEvent>,
    ) {
        let session = request.session;
        info!(session = %session, rows = request.rows.len(), "Preparing data");

        let prepared = prepare_records(
            self.client.as_ref(),
            &request,
            self.config.load.lookup_concurrency,
            |progress| {
                let _ = events.send(EngineEvent::PrepareDataProgress { session, progress });
            },
        )
        .await;

        match prepared {
            Ok(outcome) => {
                let error = if outcome.records.is_empty() {
                    // Total-preparation failure; the load reply carries the
                    // synthetic Failed result.
                    Some(if outcome.query_errors.is_empty() {
                        "Pre-processing records failed.".to_string()
                    } else {
                        outcome.query_errors.join("\n")
                    })
                } else {
                    None
                };
                let _ = events.send(EngineEvent::PrepareDataDone {
                    session,
                    data: Some(outcome),
                    error,
                });
            }
            Err(e) => {
                error!(session = %session, "Data preparation failed: {}", e);
                let _ = events.send(EngineEvent::PrepareDataDone {
                    session,
                    data: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    async fn handle_load(
        &self,
        request: LoadRequest,
        events: &mpsc::UnboundedSender<EngineEvent>,
        live: &Liveness,
    ) {
        let token = request.session;
        let input_len = request.prepared.input_len() as u64;
        let mut session = LoadSession::new(token);
        info!(
            session = %token,
            object = %request.object,
            operation = %request.operation,
            records = request.prepared.records.len(),
            "Loading data"
        );

        if request.prepared.records.is_empty() {
            session.advance(SessionStatus::Error);
            let job = JobInfo::failed_placeholder(
                request.object.clone(),
                request.operation,
                ConcurrencyMode::from_serial_flag(request.serial_mode),
            );
            let _ = events.send(EngineEvent::LoadDataDone {
                session: token,
                outcome: Some(total_failure_outcome(job, &request.prepared.errors)),
                error: Some("Pre-processing records failed.".to_string()),
            });
            return;
        }

        let batch_size = request
            .batch_size
            .unwrap_or(self.config.load.default_batch_size);

        match request.api_mode {
            ApiMode::Bulk => {
                self.run_bulk(&request, batch_size, &mut session, input_len, events, live)
                    .await;
            }
            ApiMode::Collection => {
                self.run_collection(&request, batch_size, &mut session, input_len, events, live)
                    .await;
            }
        }
    }

    async fn run_bulk(
        &self,
        request: &LoadRequest,
        batch_size: usize,
        session: &mut LoadSession,
        input_len: u64,
        events: &mpsc::UnboundedSender<EngineEvent>,
        live: &Liveness,
    ) {
        let token = request.session;
        let batches = match build_bulk_batches(&request.prepared.records, batch_size) {
            Ok(batches) => batches,
            Err(e) => {
                self.fail_session(session, input_len, e, events);
                return;
            }
        };

        session.advance(SessionStatus::Uploading);
        let driver = JobDriver::new(self.client.as_ref(), live);
        let state = match driver
            .run(request, batches, |snapshot| {
                let _ = events.send(EngineEvent::LoadDataStatus {
                    session: token,
                    status: LoadStatus::Job(snapshot),
                });
            })
            .await
        {
            Ok(state) => state,
            Err(e) => {
                self.fail_session(session, input_len, e, events);
                return;
            }
        };
        if !live.is_live() {
            return;
        }

        let aggregate_error = state.aggregate_error.as_ref().map(ToString::to_string);
        let total_batches = state.batches.len();
        let batch_summaries: Vec<_> = state.batches.iter().map(Batch::summary).collect();
        let _ = events.send(EngineEvent::LoadDataStatus {
            session: token,
            status: LoadStatus::Job(JobStatusSnapshot {
                job: state.job.clone(),
                total_batches,
                batch_summaries: batch_summaries.clone(),
            }),
        });

        session.advance(SessionStatus::Processing);
        let poller = StatusPoller::new(self.client.as_ref(), &self.config.load, live);
        let polled = poller
            .poll(
                &request.org,
                state.job,
                state.batch_order.len(),
                &state.batch_order,
                |job| {
                    let _ = events.send(EngineEvent::LoadDataStatus {
                        session: token,
                        status: LoadStatus::Job(JobStatusSnapshot {
                            job: job.clone(),
                            total_batches,
                            batch_summaries: batch_summaries.clone(),
                        }),
                    });
                },
            )
            .await;

        match polled {
            Ok(outcome) if outcome.completed && live.is_live() => {
                session.advance(SessionStatus::Finished);
                let load_outcome = aggregate_job_outcome(
                    outcome.job,
                    &request.prepared.errors,
                    aggregate_error.clone(),
                );
                self.save_history(request, session, batch_size, &load_outcome)
                    .await;
                let _ = events.send(EngineEvent::LoadDataDone {
                    session: token,
                    outcome: Some(load_outcome),
                    error: aggregate_error,
                });
            }
            Ok(outcome) => {
                // Iteration cap exceeded or session torn down: leave the
                // session in Processing with no terminal reply.
                warn!(
                    session = %token,
                    iterations = outcome.iterations,
                    "Load left in processing state"
                );
            }
            Err(e) => {
                self.fail_session(session, input_len, e, events);
            }
        }
    }

    async fn run_collection(
        &self,
        request: &LoadRequest,
        batch_size: usize,
        session: &mut LoadSession,
        input_len: u64,
        events: &mpsc::UnboundedSender<EngineEvent>,
        live: &Liveness,
    ) {
        let token = request.session;
        let attachments = match (&request.attachments, &request.binary_field) {
            (Some(archive), Some(field)) => Some((archive, field.as_str())),
            _ => None,
        };
        let plan = build_collection_batches(
            &request.prepared.records,
            &request.object,
            batch_size,
            attachments,
            AttachmentThresholds {
                max_bytes: self.config.load.attachment_size_threshold,
                max_records: self.config.load.attachment_record_threshold,
            },
        );

        session.advance(SessionStatus::Uploading);
        let driver = CollectionDriver::new(self.client.as_ref(), live);
        let results = driver
            .run(request, plan, |records| {
                let _ = events.send(EngineEvent::LoadDataStatus {
                    session: token,
                    status: LoadStatus::Records(records.to_vec()),
                });
            })
            .await;

        match results {
            Ok(results) => {
                if !live.is_live() {
                    return;
                }
                session.advance(SessionStatus::Finished);
                let outcome = aggregate_collection_results(results, &request.prepared.errors);
                self.save_history(request, session, batch_size, &outcome).await;
                let _ = events.send(EngineEvent::LoadDataDone {
                    session: token,
                    outcome: Some(outcome),
                    error: None,
                });
            }
            Err(e) => {
                self.fail_session(session, input_len, e, events);
            }
        }
    }

    /// Finalize a session on a fatal error: full failure count, no partial
    /// tallies.
    fn fail_session(
        &self,
        session: &mut LoadSession,
        input_len: u64,
        error: LoadError,
        events: &mpsc::UnboundedSender<EngineEvent>,
    ) {
        error!(session = %session.token, "Load failed: {}", error);
        session.advance(SessionStatus::Error);
        let _ = events.send(EngineEvent::LoadDataDone {
            session: session.token,
            outcome: Some(LoadOutcome {
                success: 0,
                failure: input_len,
                results: Vec::new(),
                job: None,
                aggregate_error: None,
            }),
            error: Some(error.to_string()),
        });
    }

    /// Hand the completed session to the history collaborator, best-effort.
    async fn save_history(
        &self,
        request: &LoadRequest,
        session: &LoadSession,
        batch_size: usize,
        outcome: &LoadOutcome,
    ) {
        let record = LoadHistoryRecord {
            key: LoadHistoryRecord::key_for(&request.org.unique_id, &request.session),
            session: request.session,
            org: request.org.unique_id.clone(),
            object: request.object.clone(),
            operation: request.operation,
            api_mode: request.api_mode,
            batch_size,
            serial_mode: request.serial_mode,
            external_id: request.external_id.clone(),
            assignment_rule_id: request.assignment_rule_id.clone(),
            started_at: session.started_at,
            finished_at: Utc::now(),
            success: outcome.success,
            failure: outcome.failure,
            errors: request.prepared.errors.clone(),
        };

        if let Err(e) = self.history.save(&record).await {
            warn!(session = %request.session, "Could not save history item: {}", e);
        }
    }
}
