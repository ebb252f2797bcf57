//! C5 — validates a submission, stores an upload, classifies the media,
//! filters profiles, creates the task row, and fans out work items.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use transcode_wire::{CallbackConfig, FaceTaskEnvelope, TranscodeTaskEnvelope};
use uuid::Uuid;

use crate::blob::BlobStore;
use crate::bus::MessageBus;
use crate::classifier::{ClassificationHint, MediaClassifier};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::profile::{FaceDetectionConfig, Profile, S3Layout};
use crate::store::TaskStore;
use crate::task::{FaceStage, MediaType, Task, TaskStatus};

pub const TOPIC_TRANSCODE_TASKS: &str = "transcode.tasks";
pub const TOPIC_FACE_TASKS: &str = "face.tasks";

/// Either a URL the workers fetch directly, or bytes the caller uploaded,
/// which this controller stores before fan-out.
pub enum SourceInput {
    Url(String),
    Upload { filename: String, content_type: String, bytes: Vec<u8> },
}

pub struct SubmitRequest {
    pub source: SourceInput,
    pub profiles: Vec<Profile>,
    pub s3_layout: S3Layout,
    pub face_config: Option<FaceDetectionConfig>,
    pub callback: Option<CallbackConfig>,
    pub notify_topic: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub task_id: String,
    pub status: TaskStatus,
    pub effective_profiles: Vec<String>,
    pub dropped_profiles: Vec<String>,
    pub face_enabled: bool,
}

pub struct AdmissionController<B: MessageBus> {
    blob_store: Arc<dyn BlobStore>,
    task_store: Arc<dyn TaskStore>,
    bus: Arc<B>,
    classifier: MediaClassifier,
}

impl<B: MessageBus> AdmissionController<B> {
    pub fn new(
        blob_store: Arc<dyn BlobStore>,
        task_store: Arc<dyn TaskStore>,
        bus: Arc<B>,
        classifier: MediaClassifier,
    ) -> Self {
        Self { blob_store, task_store, bus, classifier }
    }

    pub async fn submit(&self, request: SubmitRequest) -> OrchestratorResult<SubmitOutcome> {
        if request.profiles.is_empty() {
            return Err(OrchestratorError::BadRequest("at least one profile is required".into()));
        }
        if !request.s3_layout.is_valid() {
            return Err(OrchestratorError::BadRequest(
                "s3_layout.folder_structure must reference {task_id} and {profile_id}".into(),
            ));
        }

        let task_id = Uuid::new_v4().to_string();

        let (source_url, classification_hint) = match &request.source {
            SourceInput::Url(url) => {
                if url.trim().is_empty() {
                    return Err(OrchestratorError::BadRequest("media_url must not be empty".into()));
                }
                let hint = ClassificationHint { declared_mime: None, filename: None, source_url: Some(url) };
                let media_type = self.classifier.classify(&hint);
                (url.clone(), media_type)
            }
            SourceInput::Upload { ref filename, ref content_type, ref bytes } => {
                if bytes.is_empty() {
                    return Err(OrchestratorError::BadRequest("uploaded file is empty".into()));
                }
                let hint = ClassificationHint {
                    declared_mime: Some(content_type),
                    filename: Some(filename),
                    source_url: None,
                };
                let media_type = self.classifier.classify(&hint);
                let key = format!("{task_id}/source/{filename}");
                let url = self.blob_store.put(&key, bytes.clone(), content_type).await?;
                (url, media_type)
            }
        };

        let outcome = self.filter_and_admit(task_id, source_url, classification_hint, request).await?;
        Ok(outcome)
    }

    async fn filter_and_admit(
        &self,
        task_id: String,
        source_url: String,
        detected_media_type: MediaType,
        request: SubmitRequest,
    ) -> OrchestratorResult<SubmitOutcome> {
        let submitted_profiles = request.profiles.clone();
        let filter_outcome = self.classifier.filter_profiles(request.profiles, detected_media_type);
        if filter_outcome.effective.is_empty() {
            return Err(OrchestratorError::NoApplicableProfiles {
                detected: detected_media_type.to_string(),
            });
        }

        let face_enabled = request.face_config.as_ref().map(|c| c.enabled).unwrap_or(false);
        let now = Utc::now();
        let effective_profile_ids: Vec<String> = filter_outcome.effective.iter().map(|p| p.id_profile.clone()).collect();

        let mut task = Task {
            task_id: task_id.clone(),
            status: TaskStatus::Pending,
            source: source_url.clone(),
            // §3: "ordered list of Profile as supplied" — the full request,
            // not just the subset that survived media-type filtering.
            submitted_profiles,
            effective_profiles: effective_profile_ids.clone(),
            dropped_profiles: filter_outcome.dropped.clone(),
            outputs: BTreeMap::new(),
            failed_profiles: Default::default(),
            profile_errors: BTreeMap::new(),
            attempts: BTreeMap::new(),
            face_detection: if face_enabled { FaceStage::Pending } else { FaceStage::Disabled },
            face_attempts: 0,
            detected_media_type,
            callback: request.callback,
            notify_topic: request.notify_topic,
            created_at: now,
            updated_at: now,
            error: None,
        };

        self.task_store.create(task.clone()).await?;

        for profile in &filter_outcome.effective {
            let output_layout = request.s3_layout.render(&task_id, &profile.id_profile);
            let envelope = TranscodeTaskEnvelope {
                task_id: task_id.clone(),
                profile_id: profile.id_profile.clone(),
                source: source_url.clone(),
                profile_config: serde_json::to_value(&profile.config).unwrap_or(serde_json::Value::Null),
                output_layout,
                attempt: 0,
            };
            if let Err(err) = self.bus.publish(TOPIC_TRANSCODE_TASKS, envelope).await {
                warn!(task_id, profile_id = %profile.id_profile, error = %err, "fan-out publish failed, marking profile failed");
                task.failed_profiles.insert(profile.id_profile.clone());
                task.profile_errors.insert(profile.id_profile.clone(), err.to_string());
            }
        }

        if face_enabled {
            let face_config = request.face_config.expect("face_enabled implies face_config is Some");
            let avatar_output_layout = request.s3_layout.render(&task_id, "faces");
            let envelope = FaceTaskEnvelope {
                task_id: task_id.clone(),
                source: source_url,
                face_config: serde_json::to_value(&face_config).unwrap_or(serde_json::Value::Null),
                avatar_output_layout,
                attempt: 0,
            };
            if let Err(err) = self.bus.publish(TOPIC_FACE_TASKS, envelope).await {
                warn!(task_id, error = %err, "face fan-out publish failed, marking face stage failed");
                task.face_detection = FaceStage::Failed { reason: err.to_string() };
            }
        }

        // Persist the bookkeeping fan-out may have mutated, then transition
        // to PROCESSING. §4.5 step 7: failures above don't roll the task
        // back — the aggregator is given the chance to terminate it.
        for profile_id in &task.failed_profiles {
            self.task_store
                .apply_partial(
                    &task_id,
                    transcode_wire::ProfileResult::Failure {
                        task_id: task_id.clone(),
                        profile_id: profile_id.clone(),
                        reason: task.profile_errors.get(profile_id).cloned().unwrap_or_default(),
                        retryable: false,
                    },
                    0,
                )
                .await?;
        }
        if let FaceStage::Failed { reason } = &task.face_detection {
            self.task_store
                .apply_face_result(
                    &task_id,
                    transcode_wire::FaceResult::Failure {
                        task_id: task_id.clone(),
                        reason: reason.clone(),
                        retryable: false,
                    },
                    0,
                )
                .await?;
        }

        let persisted = self.task_store.transition(&task_id, TaskStatus::Pending, TaskStatus::Processing).await?;
        info!(task_id = %task_id, effective = effective_profile_ids.len(), face_enabled, "task admitted");

        Ok(SubmitOutcome {
            task_id,
            status: persisted.status,
            effective_profiles: effective_profile_ids,
            dropped_profiles: filter_outcome.dropped,
            face_enabled,
        })
    }
}
