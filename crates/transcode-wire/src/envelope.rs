//! Bus envelopes — the JSON-encoded records carried over the five logical
//! channels (`transcode.tasks`, `transcode.results`, `face.tasks`,
//! `face.results`, and user-chosen notification topics).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Work item published to `transcode.tasks`: one per effective profile.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TranscodeTaskEnvelope {
    pub task_id: String,
    pub profile_id: String,
    /// A URL, either the caller's original or the blob-store URL of an upload.
    pub source: String,
    /// Opaque profile configuration, forwarded verbatim to the worker.
    pub profile_config: serde_json::Value,
    /// Output layout template, e.g. `{base_path}/{task_id}/{profile_id}`.
    pub output_layout: String,
    /// Incremented on each republish after a retryable failure.
    #[serde(default)]
    pub attempt: u32,
}

/// Work item published to `face.tasks`: at most one per task.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FaceTaskEnvelope {
    pub task_id: String,
    pub source: String,
    pub face_config: serde_json::Value,
    pub avatar_output_layout: String,
    #[serde(default)]
    pub attempt: u32,
}

/// Artifact payload carried inside a successful `ProfileResult`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactPayload {
    pub url: String,
    pub size_bytes: u64,
    pub metadata: serde_json::Value,
}

/// A message delivered on `transcode.results` — the outcome of one profile's
/// transcode attempt. The idempotency key is `(task_id, profile_id)` plus the
/// outcome discriminant; exact dedup semantics live in the aggregator, not here.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum ProfileResult {
    #[serde(rename = "ok")]
    Success {
        task_id: String,
        profile_id: String,
        artifact: ArtifactPayload,
    },
    #[serde(rename = "err")]
    Failure {
        task_id: String,
        profile_id: String,
        reason: String,
        retryable: bool,
    },
}

impl ProfileResult {
    pub fn task_id(&self) -> &str {
        match self {
            ProfileResult::Success { task_id, .. } => task_id,
            ProfileResult::Failure { task_id, .. } => task_id,
        }
    }

    pub fn profile_id(&self) -> &str {
        match self {
            ProfileResult::Success { profile_id, .. } => profile_id,
            ProfileResult::Failure { profile_id, .. } => profile_id,
        }
    }
}

/// A detected face, part of a successful `FaceResult`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Face {
    pub bounding_box: BoundingBox,
    /// Face embedding vector, used by workers to cluster faces into groups.
    pub embedding: Vec<f32>,
    pub group_index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f32>,
    pub avatar_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// A message delivered on `face.results`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum FaceResult {
    #[serde(rename = "ok")]
    Success { task_id: String, faces: Vec<Face> },
    #[serde(rename = "err")]
    Failure {
        task_id: String,
        reason: String,
        retryable: bool,
    },
}

impl FaceResult {
    pub fn task_id(&self) -> &str {
        match self {
            FaceResult::Success { task_id, .. } => task_id,
            FaceResult::Failure { task_id, .. } => task_id,
        }
    }
}

/// The canonical result object: what `GET /task/{id}` returns, what gets
/// published to a `notify_topic`, and what gets POSTed to a callback URL.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEnvelope {
    pub task_id: String,
    pub status: String,
    pub outputs: serde_json::Value,
    pub failed_profiles: serde_json::Value,
    pub face_detection: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}
