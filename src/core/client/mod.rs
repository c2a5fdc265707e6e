//! Remote API seam
//!
//! The engine consumes the remote system of record through the [`RemoteApi`]
//! trait so drivers can be tested against in-memory fakes. The production
//! implementation is the reqwest-based [`HttpRemoteApi`].

pub mod http;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::types::{
    ConcurrencyMode, HttpMethod, JobInfo, OperationKind, OrgRef, RecordError, RemoteBatchInfo,
};
use crate::utils::error::Result;

pub use http::HttpRemoteApi;

/// Parameters for creating a remote job
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    /// Operation the job performs
    pub operation: OperationKind,
    /// Target object name
    pub object: String,
    /// Batch processing mode
    pub concurrency_mode: ConcurrencyMode,
    /// External id field, upsert only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id_field_name: Option<String>,
    /// Assignment rule applied to newly created records
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment_rule_id: Option<String>,
}

/// One synchronous collection request
#[derive(Debug, Clone)]
pub struct CollectionRequest {
    /// HTTP verb derived from the operation kind
    pub method: HttpMethod,
    /// Path relative to the API base, including any query string
    pub url: String,
    /// JSON body; absent for delete requests
    pub body: Option<serde_json::Value>,
    /// Extra request headers
    pub headers: Vec<(String, String)>,
}

/// Per-record outcome returned by a collection request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionRecordResult {
    /// Remote identifier assigned or matched
    #[serde(default)]
    pub id: Option<String>,
    /// Whether the record was accepted
    pub success: bool,
    /// Structured rejection detail; empty on success
    #[serde(default)]
    pub errors: Vec<RecordError>,
}

/// Operations the engine requires from the remote system of record.
///
/// The exact wire format is owned by the external collaborator; this trait
/// only assumes that each call resolves to data or a thrown failure.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Create a remote job for the queue model.
    async fn create_job(&self, org: &OrgRef, request: &CreateJobRequest) -> Result<JobInfo>;

    /// Add one encoded batch to a job. `is_last` signals the final batch.
    async fn add_batch(
        &self,
        org: &OrgRef,
        job_id: &str,
        payload: String,
        is_last: bool,
    ) -> Result<RemoteBatchInfo>;

    /// Fetch a job's current state, counters, and batch list.
    async fn get_job(&self, org: &OrgRef, job_id: &str) -> Result<JobInfo>;

    /// Close a job so the remote system stops accepting batches.
    async fn close_job(&self, org: &OrgRef, job_id: &str) -> Result<JobInfo>;

    /// Submit one collection request and return its per-record results.
    async fn submit_collection(
        &self,
        org: &OrgRef,
        request: &CollectionRequest,
    ) -> Result<Vec<CollectionRecordResult>>;

    /// Resolve related-record references: for each match value, the ids of
    /// remote records whose `match_field` equals that value.
    async fn resolve_references(
        &self,
        org: &OrgRef,
        object: &str,
        match_field: &str,
        values: &[String],
    ) -> Result<HashMap<String, Vec<String>>>;
}
