//! A trivial stand-in for the real FFmpeg/ONNX worker pools, which the
//! orchestration spec treats as opaque functions `transcode(profile, source)
//! -> artifact` and `detect_faces(source, config) -> faces` reachable only
//! through the bus. Lets `transcode submit` demonstrate admission → fan-out
//! → aggregation → notification end to end without a real media pipeline.

use std::sync::Arc;

use transcode_core::{BlobStore, InMemoryBlobStore};
use transcode_wire::{ArtifactPayload, Face, FaceResult, FaceTaskEnvelope, ProfileResult, TranscodeTaskEnvelope};

/// Drains one `TranscodeTaskEnvelope` and fabricates a successful artifact by
/// writing a placeholder blob under the profile's output layout.
pub async fn run_transcode(blob_store: &Arc<InMemoryBlobStore>, envelope: &TranscodeTaskEnvelope) -> ProfileResult {
    let key = format!("{}/{}", envelope.output_layout.trim_start_matches('/'), "output.bin");
    match blob_store.put(&key, b"synthetic-output".to_vec(), "application/octet-stream").await {
        Ok(url) => ProfileResult::Success {
            task_id: envelope.task_id.clone(),
            profile_id: envelope.profile_id.clone(),
            artifact: ArtifactPayload {
                url,
                size_bytes: 17,
                metadata: serde_json::json!({"note": "synthetic local worker output"}),
            },
        },
        Err(err) => ProfileResult::Failure {
            task_id: envelope.task_id.clone(),
            profile_id: envelope.profile_id.clone(),
            reason: err.to_string(),
            retryable: true,
        },
    }
}

/// Drains one `FaceTaskEnvelope` and fabricates a single detected face.
pub async fn run_face_detection(blob_store: &Arc<InMemoryBlobStore>, envelope: &FaceTaskEnvelope) -> FaceResult {
    let key = format!("{}/{}", envelope.avatar_output_layout.trim_start_matches('/'), "face-0.jpg");
    match blob_store.put(&key, b"synthetic-avatar".to_vec(), "image/jpeg").await {
        Ok(avatar_url) => FaceResult::Success {
            task_id: envelope.task_id.clone(),
            faces: vec![Face {
                bounding_box: transcode_wire::BoundingBox { x: 0.1, y: 0.1, width: 0.2, height: 0.2 },
                embedding: vec![0.0; 8],
                group_index: 0,
                age: None,
                gender: None,
                quality_score: Some(0.9),
                avatar_url,
            }],
        },
        Err(err) => FaceResult::Failure {
            task_id: envelope.task_id.clone(),
            reason: err.to_string(),
            retryable: true,
        },
    }
}
