//! Core data model for the load engine

pub mod batch;
pub mod job;
pub mod operation;
pub mod record;
pub mod request;

pub use batch::{AttachmentArchive, Batch, BatchPayload, BatchSummary};
pub use job::{JobInfo, JobState, JobStatusSnapshot, RemoteBatchInfo, RemoteBatchState};
pub use operation::{ApiMode, ConcurrencyMode, HttpMethod, OperationKind};
pub use record::{
    PrepareError, PrepareOutcome, PreparedRecord, RecordError, RecordObject, ResultRecord,
    STATUS_MISSING_ID, STATUS_UNKNOWN,
};
pub use request::{
    DuplicateLookupPolicy, FieldKind, FieldMappingItem, LoadRequest, LookupMapping, OrgRef,
    PrepareRequest,
};
