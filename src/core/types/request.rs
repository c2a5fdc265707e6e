//! Request payloads handed to the engine by the host

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::batch::AttachmentArchive;
use super::operation::{ApiMode, OperationKind};
use super::record::{PrepareOutcome, RecordObject};

/// Reference to the target org/tenant a load runs against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgRef {
    /// Opaque unique identifier of the org
    pub unique_id: String,
}

impl OrgRef {
    /// An org reference over the given identifier.
    pub fn new(unique_id: impl Into<String>) -> Self {
        Self {
            unique_id: unique_id.into(),
        }
    }
}

/// Value handling applied while mapping a source column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FieldKind {
    /// Copy the value through unchanged
    #[default]
    Text,
    /// Parse against the caller's date format and re-emit as an ISO date
    Date,
}

/// Policy when a related-record lookup matches more than one remote record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DuplicateLookupPolicy {
    /// Take the first match
    #[default]
    FirstMatch,
    /// Treat multiple matches as a per-row preparation error
    Error,
}

/// Related-record resolution attached to a mapping entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupMapping {
    /// Object the lookup resolves against
    pub related_object: String,
    /// Field on the related object the source value is matched on
    pub match_field: String,
    /// Behavior when the match field is not unique
    #[serde(default)]
    pub duplicate_policy: DuplicateLookupPolicy,
    /// Map to an explicit null instead of erroring when no match is found
    #[serde(default)]
    pub null_if_no_match: bool,
}

/// One source-column-to-target-field mapping entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMappingItem {
    /// Column name in the raw input rows
    pub source_column: String,
    /// Field name in the target schema
    pub target_field: String,
    /// Value handling for this field
    #[serde(default)]
    pub kind: FieldKind,
    /// Present when the value is a related-record reference to resolve
    #[serde(default)]
    pub lookup: Option<LookupMapping>,
}

/// Request to transform raw rows into target-schema records
#[derive(Debug, Clone)]
pub struct PrepareRequest {
    /// Correlation token scoping this load run's messages
    pub session: Uuid,
    /// Target org
    pub org: OrgRef,
    /// Raw input rows
    pub rows: Vec<RecordObject>,
    /// Source-to-target field mapping
    pub mapping: Vec<FieldMappingItem>,
    /// Target object name
    pub object: String,
    /// Map empty source values to explicit nulls
    pub insert_nulls: bool,
    /// Format raw date strings are parsed with (chrono syntax)
    pub date_format: String,
    /// Protocol the subsequent load will use
    pub api_mode: ApiMode,
}

/// Request to load prepared records into the remote system
#[derive(Debug, Clone)]
pub struct LoadRequest {
    /// Correlation token scoping this load run's messages
    pub session: Uuid,
    /// Target org
    pub org: OrgRef,
    /// Prepared records plus the rows that failed preparation
    pub prepared: PrepareOutcome,
    /// Target object name
    pub object: String,
    /// Operation to perform
    pub operation: OperationKind,
    /// Protocol selection for this run
    pub api_mode: ApiMode,
    /// Records per batch; engine default when absent
    pub batch_size: Option<usize>,
    /// Process the job's batches serially rather than in parallel
    pub serial_mode: bool,
    /// External id field, used by upsert only
    pub external_id: Option<String>,
    /// Assignment rule applied to newly created records, when configured
    pub assignment_rule_id: Option<String>,
    /// Binary attachment content, present for attachment loads
    pub attachments: Option<AttachmentArchive>,
    /// Record field naming each row's archive entry
    pub binary_field: Option<String>,
}
