//! Collection driver for the synchronous model
//!
//! Submits one request per batch, in order, and reconciles per-record
//! response positions against the original batch. Delete rows without a
//! resolved identifier are never sent remotely; their failures are
//! synthesized locally and re-inserted at their original offsets so the
//! output sequence matches the input order exactly.

use std::collections::BTreeSet;

use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::core::client::{CollectionRequest, RemoteApi};
use crate::core::partition::BatchPlan;
use crate::core::session::liveness::Liveness;
use crate::core::types::{
    Batch, BatchPayload, LoadRequest, OperationKind, RecordError, RecordObject, ResultRecord,
};
use crate::utils::error::{LoadError, Result};

/// Header applying or suppressing remote auto-assignment rules
const AUTO_ASSIGN_HEADER: &str = "Sforce-Auto-Assign";

/// Sentinel suppressing auto-assignment when no rule is configured
const AUTO_ASSIGN_OFF: &str = "FALSE";

/// Base path of the record collection endpoint
const COLLECTION_PATH: &str = "composite/sobjects";

/// Drives batches through the synchronous collection API
pub struct CollectionDriver<'a> {
    client: &'a dyn RemoteApi,
    live: &'a Liveness,
}

impl<'a> CollectionDriver<'a> {
    /// A driver over the given remote client and session liveness flag.
    pub fn new(client: &'a dyn RemoteApi, live: &'a Liveness) -> Self {
        Self { client, live }
    }

    /// Submit every batch in order and return one result per record.
    ///
    /// `emit` receives each batch's result slice as it is reconciled,
    /// followed by the failures synthesized for records dropped before
    /// batching.
    pub async fn run(
        &self,
        request: &LoadRequest,
        plan: BatchPlan,
        mut emit: impl FnMut(&[ResultRecord]),
    ) -> Result<Vec<ResultRecord>> {
        let mut all_results: Vec<ResultRecord> = Vec::new();

        for batch in plan.batches {
            let results = self.submit_batch(request, batch).await?;
            if !self.live.is_live() {
                debug!("Session no longer live, abandoning collection run");
                return Ok(all_results);
            }
            emit(&results);
            all_results.extend(results);
        }

        if !plan.dropped.is_empty() {
            // Records excluded before batching still get a per-row outcome.
            let failures: Vec<ResultRecord> = plan
                .dropped
                .into_iter()
                .map(|record| {
                    ResultRecord::failure(
                        record,
                        RecordError::new(
                            crate::core::types::STATUS_UNKNOWN,
                            "An unknown error has occurred while processing this record.",
                        ),
                    )
                })
                .collect();
            emit(&failures);
            all_results.extend(failures);
        }

        Ok(all_results)
    }

    async fn submit_batch(
        &self,
        request: &LoadRequest,
        batch: Batch,
    ) -> Result<Vec<ResultRecord>> {
        let batch_number = batch.batch_number;
        let BatchPayload::Records { outbound, originals } = batch.payload else {
            return Err(LoadError::Internal(
                "Collection batches must carry record payloads".to_string(),
            ));
        };

        let mut url = COLLECTION_PATH.to_string();
        if request.operation == OperationKind::Upsert {
            if let Some(external_id) = &request.external_id {
                url = format!("{}/{}/{}", url, request.object, external_id);
            }
        }

        // Delete rows without a mapped id cannot be submitted; drop them
        // from the outbound batch and remember their offsets.
        let mut missing_id_offsets: BTreeSet<usize> = BTreeSet::new();
        let mut submitted = outbound;
        if request.operation == OperationKind::Delete {
            missing_id_offsets = submitted
                .iter()
                .enumerate()
                .filter(|(_, record)| record_id(record).is_none())
                .map(|(offset, _)| offset)
                .collect();
            submitted.retain(|record| record_id(record).is_some());

            let ids: Vec<&str> = submitted.iter().filter_map(record_id).collect();
            url = format!("{}?ids={}&allOrNone=false", url, ids.join(","));
        }

        let assignment = request
            .assignment_rule_id
            .clone()
            .unwrap_or_else(|| AUTO_ASSIGN_OFF.to_string());
        let body = match request.operation {
            OperationKind::Delete => None,
            _ => Some(json!({ "allOrNone": false, "records": submitted })),
        };

        let response = self
            .client
            .submit_collection(
                &request.org,
                &CollectionRequest {
                    method: request.operation.http_method(),
                    url,
                    body,
                    headers: vec![(AUTO_ASSIGN_HEADER.to_string(), assignment)],
                },
            )
            .await;

        match response {
            Ok(results) => {
                debug!(batch_number, records = results.len(), "Collection batch accepted");
                Ok(reconcile(originals, results, &missing_id_offsets))
            }
            Err(e) => {
                // The whole batch call failed; per-row failure semantics
                // stay uniform by synthesizing one failure per record.
                warn!(batch_number, "Collection batch failed: {}", e);
                let message = e.to_string();
                Ok(originals
                    .into_iter()
                    .map(|record| {
                        ResultRecord::failure(record, RecordError::unknown(&message))
                    })
                    .collect())
            }
        }
    }
}

fn record_id(record: &RecordObject) -> Option<&str> {
    record.get("Id").and_then(Value::as_str)
}

/// Zip positional results with original records, re-inserting synthesized
/// missing-id failures at their original offsets.
fn reconcile(
    originals: Vec<RecordObject>,
    results: Vec<crate::core::client::CollectionRecordResult>,
    missing_id_offsets: &BTreeSet<usize>,
) -> Vec<ResultRecord> {
    let mut remote = results.into_iter();
    originals
        .into_iter()
        .enumerate()
        .map(|(offset, record)| {
            if missing_id_offsets.contains(&offset) {
                return ResultRecord::failure(record, RecordError::missing_id());
            }
            match remote.next() {
                Some(result) => ResultRecord {
                    success: result.success,
                    id: result.id,
                    errors: result.errors,
                    record,
                },
                None => ResultRecord::failure(
                    record,
                    RecordError::unknown("The remote system returned no result for this record"),
                ),
            }
        })
        .collect()
}
