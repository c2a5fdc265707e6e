//! HTTP implementation of the remote API seam

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use crate::config::RemoteConfig;
use crate::core::types::{JobInfo, OrgRef, RemoteBatchInfo};
use crate::utils::error::{LoadError, Result};

use super::{CollectionRecordResult, CollectionRequest, CreateJobRequest, RemoteApi};

/// Header carrying the target org identifier
const HEADER_ORG_ID: &str = "x-org-id";

/// Remote API client over HTTP
#[derive(Debug, Clone)]
pub struct HttpRemoteApi {
    base_url: String,
    http_client: Client,
}

impl HttpRemoteApi {
    /// Create a client from remote connection settings.
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let base_url = url::Url::parse(&config.base_url)
            .map_err(|e| LoadError::Config(format!("Invalid base URL '{}': {}", config.base_url, e)))?;

        let http_client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.request_timeout))
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .build()
            .map_err(|e| LoadError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Parse a response body, mapping non-success statuses to errors.
    async fn handle_response<T: DeserializeOwned>(&self, response: Response) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LoadError::RemoteApi(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(Self::map_http_error(status.as_u16(), &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| LoadError::RemoteApi(format!("Failed to parse response: {}", e)))
    }

    fn map_http_error(status: u16, body: &str) -> LoadError {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| {
                v.get("message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| {
                if body.is_empty() {
                    "An unknown error has occurred".to_string()
                } else {
                    body.to_string()
                }
            });

        match status {
            400 => LoadError::InvalidRequest(message),
            401 | 403 => LoadError::RemoteApi(format!("Not authorized: {}", message)),
            404 => LoadError::RemoteApi(format!("Not found: {}", message)),
            _ => LoadError::RemoteApi(message),
        }
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn create_job(&self, org: &OrgRef, request: &CreateJobRequest) -> Result<JobInfo> {
        debug!(object = %request.object, operation = %request.operation, "Creating remote job");
        let response = self
            .http_client
            .post(self.url("job"))
            .header(HEADER_ORG_ID, &org.unique_id)
            .json(request)
            .send()
            .await?;

        self.handle_response(response).await
    }

    async fn add_batch(
        &self,
        org: &OrgRef,
        job_id: &str,
        payload: String,
        is_last: bool,
    ) -> Result<RemoteBatchInfo> {
        debug!(job_id, is_last, bytes = payload.len(), "Submitting batch");
        let response = self
            .http_client
            .post(self.url(&format!("job/{}/batch", job_id)))
            .header(HEADER_ORG_ID, &org.unique_id)
            .header("content-type", "text/csv")
            .query(&[("isLast", is_last)])
            .body(payload)
            .send()
            .await?;

        self.handle_response(response).await
    }

    async fn get_job(&self, org: &OrgRef, job_id: &str) -> Result<JobInfo> {
        let response = self
            .http_client
            .get(self.url(&format!("job/{}", job_id)))
            .header(HEADER_ORG_ID, &org.unique_id)
            .send()
            .await?;

        self.handle_response(response).await
    }

    async fn close_job(&self, org: &OrgRef, job_id: &str) -> Result<JobInfo> {
        debug!(job_id, "Closing remote job");
        let response = self
            .http_client
            .post(self.url(&format!("job/{}/close", job_id)))
            .header(HEADER_ORG_ID, &org.unique_id)
            .send()
            .await?;

        self.handle_response(response).await
    }

    async fn submit_collection(
        &self,
        org: &OrgRef,
        request: &CollectionRequest,
    ) -> Result<Vec<CollectionRecordResult>> {
        debug!(url = %request.url, "Submitting collection request");
        let mut builder = self
            .http_client
            .request(request.method.as_reqwest(), self.url(&request.url))
            .header(HEADER_ORG_ID, &org.unique_id);

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        self.handle_response(response).await
    }

    async fn resolve_references(
        &self,
        org: &OrgRef,
        object: &str,
        match_field: &str,
        values: &[String],
    ) -> Result<HashMap<String, Vec<String>>> {
        debug!(object, match_field, count = values.len(), "Resolving related records");
        let response = self
            .http_client
            .post(self.url("lookup"))
            .header(HEADER_ORG_ID, &org.unique_id)
            .json(&json!({
                "object": object,
                "field": match_field,
                "values": values,
            }))
            .send()
            .await?;

        self.handle_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ConcurrencyMode, HttpMethod, JobState, OperationKind};
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> RemoteConfig {
        RemoteConfig {
            base_url: base_url.to_string(),
            request_timeout: 5,
            connect_timeout: 2,
        }
    }

    fn job_json(id: &str, state: &str) -> serde_json::Value {
        json!({
            "id": id,
            "object": "Account",
            "operation": "INSERT",
            "concurrencyMode": "Parallel",
            "state": state,
            "numberBatchesTotal": 1,
            "batches": []
        })
    }

    #[tokio::test]
    async fn test_create_job() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/job"))
            .and(header("x-org-id", "org-1"))
            .and(body_string_contains("\"operation\":\"INSERT\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(job_json("750aa", "Open")))
            .mount(&server)
            .await;

        let client = HttpRemoteApi::new(&test_config(&server.uri())).unwrap();
        let job = client
            .create_job(
                &OrgRef::new("org-1"),
                &CreateJobRequest {
                    operation: OperationKind::Insert,
                    object: "Account".to_string(),
                    concurrency_mode: ConcurrencyMode::Parallel,
                    external_id_field_name: None,
                    assignment_rule_id: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(job.id.as_deref(), Some("750aa"));
        assert_eq!(job.state, JobState::Open);
    }

    #[tokio::test]
    async fn test_add_batch_marks_last() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/job/750aa/batch"))
            .and(query_param("isLast", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "751bb",
                "jobId": "750aa",
                "state": "Queued"
            })))
            .mount(&server)
            .await;

        let client = HttpRemoteApi::new(&test_config(&server.uri())).unwrap();
        let batch = client
            .add_batch(&OrgRef::new("org-1"), "750aa", "Name\nAcme\n".to_string(), true)
            .await
            .unwrap();

        assert_eq!(batch.id, "751bb");
    }

    #[tokio::test]
    async fn test_error_body_message_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/job/nope"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"message": "job not found"})),
            )
            .mount(&server)
            .await;

        let client = HttpRemoteApi::new(&test_config(&server.uri())).unwrap();
        let err = client
            .get_job(&OrgRef::new("org-1"), "nope")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("job not found"));
    }

    #[tokio::test]
    async fn test_collection_request_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/composite/records/Account/ExternalId__c"))
            .and(header("Sforce-Auto-Assign", "FALSE"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "001aa", "success": true, "errors": []}
            ])))
            .mount(&server)
            .await;

        let client = HttpRemoteApi::new(&test_config(&server.uri())).unwrap();
        let results = client
            .submit_collection(
                &OrgRef::new("org-1"),
                &CollectionRequest {
                    method: HttpMethod::Patch,
                    url: "composite/records/Account/ExternalId__c".to_string(),
                    body: Some(json!({"allOrNone": false, "records": []})),
                    headers: vec![("Sforce-Auto-Assign".to_string(), "FALSE".to_string())],
                },
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert!(results[0].success);
    }
}
