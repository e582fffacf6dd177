//! # Publish Workflow
//!
//! Version-aware create/update/delete of Confluence pages plus the local
//! cache that remembers which page each source document was published to.

pub mod cache;
pub mod target;
pub mod workflow;

pub use cache::{normalize_key, PageCache, PageMapping};
pub use target::{resolve_target, PublishTarget, TargetDefaults, TargetOverrides};
pub use workflow::{
    DeleteOutcome, DeleteRequest, PublishOutcome, PublishRequest, PublishWorkflow, UpdateRequest,
    UploadFailure,
};
