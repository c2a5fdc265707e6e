//! Operation kinds and API mode selection

use serde::{Deserialize, Serialize};

/// The load operation requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationKind {
    /// Create new records
    Insert,
    /// Update existing records by id
    Update,
    /// Insert or update, matched on an external id field
    Upsert,
    /// Delete existing records by id
    Delete,
}

impl OperationKind {
    /// Wire name of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Upsert => "upsert",
            Self::Delete => "delete",
        }
    }

    /// HTTP verb used by the collection API for this operation.
    pub fn http_method(&self) -> HttpMethod {
        match self {
            Self::Insert => HttpMethod::Post,
            Self::Update => HttpMethod::Patch,
            Self::Upsert => HttpMethod::Patch,
            Self::Delete => HttpMethod::Delete,
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which of the two mutually exclusive load protocols a session uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApiMode {
    /// Job/batch queue model: submit batches to an async job, poll until done
    Bulk,
    /// Synchronous collection model: one request per batch, immediate results
    Collection,
}

/// How the remote system processes a job's batches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConcurrencyMode {
    /// Batches may be processed concurrently
    Parallel,
    /// Batches are processed one at a time
    Serial,
}

impl ConcurrencyMode {
    /// Derive the mode from the caller's serial flag.
    pub fn from_serial_flag(serial: bool) -> Self {
        if serial { Self::Serial } else { Self::Parallel }
    }
}

/// HTTP verbs used by the collection API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Convert to a `reqwest` method.
    pub fn as_reqwest(&self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Patch => reqwest::Method::PATCH,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_method_derivation() {
        assert_eq!(OperationKind::Insert.http_method(), HttpMethod::Post);
        assert_eq!(OperationKind::Update.http_method(), HttpMethod::Patch);
        assert_eq!(OperationKind::Upsert.http_method(), HttpMethod::Patch);
        assert_eq!(OperationKind::Delete.http_method(), HttpMethod::Delete);
    }

    #[test]
    fn test_operation_serialization() {
        let json = serde_json::to_string(&OperationKind::Upsert).unwrap();
        assert_eq!(json, "\"UPSERT\"");
        let parsed: OperationKind = serde_json::from_str("\"DELETE\"").unwrap();
        assert_eq!(parsed, OperationKind::Delete);
    }

    #[test]
    fn test_concurrency_mode_from_flag() {
        assert_eq!(ConcurrencyMode::from_serial_flag(true), ConcurrencyMode::Serial);
        assert_eq!(ConcurrencyMode::from_serial_flag(false), ConcurrencyMode::Parallel);
    }
}
