//! Record carriers: prepared rows, preparation errors, and per-record outcomes

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single row's field values, keyed by target-schema field name
pub type RecordObject = Map<String, Value>;

/// Status code attached to a locally synthesized failure when a delete row
/// has no resolved identifier.
pub const STATUS_MISSING_ID: &str = "MISSING_ID";

/// Status code attached to failures synthesized for whole-batch transport
/// errors and records dropped before batching.
pub const STATUS_UNKNOWN: &str = "UNKNOWN";

/// A row transformed into the target schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparedRecord {
    /// Zero-based index of the originating input row
    pub row: usize,
    /// Target-schema field values
    pub fields: RecordObject,
}

impl PreparedRecord {
    /// The record's resolved identifier, if the `Id` field carries a string.
    pub fn id(&self) -> Option<&str> {
        self.fields.get("Id").and_then(Value::as_str)
    }
}

/// A row that failed during preparation and never reached a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareError {
    /// Zero-based index of the originating input row
    pub row: usize,
    /// The original record payload
    pub record: RecordObject,
    /// Error messages collected while preparing this row
    pub errors: Vec<String>,
}

/// Output of the data preparer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrepareOutcome {
    /// Rows that survived preparation, in input order
    pub records: Vec<PreparedRecord>,
    /// Rows that failed preparation
    pub errors: Vec<PrepareError>,
    /// Errors raised by lookup queries, not tied to a single row
    pub query_errors: Vec<String>,
}

impl PrepareOutcome {
    /// Total number of input rows this outcome accounts for.
    pub fn input_len(&self) -> usize {
        self.records.len() + self.errors.len()
    }
}

/// A structured error attached to a per-record outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordError {
    /// Machine-readable status code
    #[serde(rename = "statusCode")]
    pub status_code: String,
    /// Human-readable message
    pub message: String,
    /// Fields implicated by the error
    #[serde(default)]
    pub fields: Vec<String>,
}

impl RecordError {
    /// Build an error with a status code and message and no field list.
    pub fn new(status_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status_code: status_code.into(),
            message: message.into(),
            fields: Vec::new(),
        }
    }

    /// The local failure synthesized for delete rows with no mapped id.
    pub fn missing_id() -> Self {
        Self::new(
            STATUS_MISSING_ID,
            "This record did not have a mapped value for the Id",
        )
    }

    /// The generic failure synthesized when a whole batch call fails.
    pub fn unknown(detail: &str) -> Self {
        Self::new(
            STATUS_UNKNOWN,
            format!("An unknown error has occurred. Remote message: {}", detail),
        )
    }
}

/// One outcome per original input row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Whether the remote system accepted the record
    pub success: bool,
    /// Remote identifier assigned or matched, when available
    pub id: Option<String>,
    /// Structured errors; empty on success
    pub errors: Vec<RecordError>,
    /// The original record payload this outcome belongs to
    pub record: RecordObject,
}

impl ResultRecord {
    /// A failure outcome carrying a single structured error.
    pub fn failure(record: RecordObject, error: RecordError) -> Self {
        Self {
            success: false,
            id: None,
            errors: vec![error],
            record,
        }
    }
}
