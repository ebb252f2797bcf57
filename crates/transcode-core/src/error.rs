//! Orchestrator-wide error taxonomy. Every fallible surface in this crate
//! returns `OrchestratorError` or wraps a narrower error into it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Submission failed validation before any task row was created.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Every submitted profile was dropped by the media classifier.
    #[error("no applicable profiles for detected media type {detected:?}")]
    NoApplicableProfiles { detected: String },

    /// The requested task does not exist.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// `create` was called with a `task_id` that already exists.
    #[error("task already exists: {0}")]
    TaskAlreadyExists(String),

    /// A blob-store operation could not reach the backend.
    #[error("blob store unreachable: {0}")]
    BlobUnreachable(String),

    /// A blob-store object was missing.
    #[error("blob not found: {0}")]
    BlobNotFound(String),

    /// Bus publish failed; the caller decides how to account for it.
    #[error("bus publish failed on topic {topic}: {reason}")]
    BusPublishFailed { topic: String, reason: String },

    /// Optimistic-concurrency mismatch on `transition`.
    #[error("storage conflict on task {task_id}: expected status {expected}, found {actual}")]
    StorageConflict {
        task_id: String,
        expected: String,
        actual: String,
    },

    /// `retry`/`delete`/`resend_callback` called against an ineligible status.
    #[error("operation {op} not permitted for task {task_id} in status {status}")]
    InvalidTransition {
        task_id: String,
        status: String,
        op: String,
    },

    /// Callback delivery exhausted its retry budget.
    #[error("callback delivery failed for task {task_id}: {0}", task_id = .task_id)]
    CallbackDeliveryFailed {
        task_id: String,
        #[source]
        source: transcode_wire::WireError,
    },

    /// Configuration could not be loaded or was malformed.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Wire(#[from] transcode_wire::WireError),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
