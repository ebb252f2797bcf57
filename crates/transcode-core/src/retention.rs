//! C8 — re-submits a task (optionally wiping prior artifacts), deletes a
//! task (optionally wiping artifacts and face data), and resends a callback
//! for a finished task. Operates laterally on existing rows rather than
//! sitting in the admission → aggregation pipeline.

use std::sync::Arc;

use tracing::info;
use transcode_wire::TranscodeTaskEnvelope;

use crate::admission::TOPIC_TRANSCODE_TASKS;
use crate::blob::BlobStore;
use crate::bus::MessageBus;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::notifier::{build_envelope, Notifier};
use crate::store::TaskStore;
use crate::task::TaskStatus;
use transcode_wire::CallbackClient;

pub struct RetentionManager<B: MessageBus> {
    task_store: Arc<dyn TaskStore>,
    blob_store: Arc<dyn BlobStore>,
    bus: Arc<B>,
    notifier: Arc<Notifier<B>>,
    callback_client: Arc<CallbackClient>,
}

impl<B: MessageBus> RetentionManager<B> {
    pub fn new(
        task_store: Arc<dyn TaskStore>,
        blob_store: Arc<dyn BlobStore>,
        bus: Arc<B>,
        notifier: Arc<Notifier<B>>,
        callback_client: Arc<CallbackClient>,
    ) -> Self {
        Self { task_store, blob_store, bus, notifier, callback_client }
    }

    /// Refuses if the task is PENDING or PROCESSING. Optionally wipes the
    /// task's blob prefix, resets the row, then republishes fan-out for
    /// every stored effective profile.
    pub async fn retry(&self, task_id: &str, wipe_artifacts: bool) -> OrchestratorResult<()> {
        let task = self.task_store.get(task_id).await?;
        if !task.status.is_terminal() {
            return Err(OrchestratorError::InvalidTransition {
                task_id: task_id.to_string(),
                status: task.status.to_string(),
                op: "retry".to_string(),
            });
        }

        if wipe_artifacts {
            self.blob_store.delete_prefix(&format!("{task_id}/")).await?;
        }

        let reset = self.task_store.reset_for_retry(task_id).await?;

        // §4.8: re-run fan-out "using the stored effective_profiles" — not
        // submitted_profiles, which also carries profiles media-type
        // filtering already dropped at the original admission.
        let effective: Vec<_> = reset
            .submitted_profiles
            .iter()
            .filter(|p| reset.effective_profiles.contains(&p.id_profile))
            .collect();

        for profile in effective {
            let envelope = TranscodeTaskEnvelope {
                task_id: task_id.to_string(),
                profile_id: profile.id_profile.clone(),
                source: reset.source.clone(),
                profile_config: serde_json::to_value(&profile.config).unwrap_or(serde_json::Value::Null),
                output_layout: format!("{task_id}/{}", profile.id_profile),
                attempt: 0,
            };
            self.bus.publish(TOPIC_TRANSCODE_TASKS, envelope).await?;
        }

        self.task_store.transition(task_id, TaskStatus::Pending, TaskStatus::Processing).await?;
        info!(task_id, wipe_artifacts, "task retried");
        Ok(())
    }

    /// Removes the row; optionally deletes the task's blob prefix (and the
    /// face avatar subprefix). Returns the count of blobs removed.
    pub async fn delete(&self, task_id: &str, wipe_artifacts: bool, wipe_faces: bool) -> OrchestratorResult<usize> {
        let mut removed = 0;
        if wipe_artifacts {
            removed += self.blob_store.delete_prefix(&format!("{task_id}/")).await?;
        }
        if wipe_faces {
            removed += self.blob_store.delete_prefix(&format!("{task_id}/faces/")).await?;
        }
        self.task_store.delete(task_id).await?;
        info!(task_id, removed, "task deleted");
        Ok(removed)
    }

    /// Permitted only for COMPLETED/PARTIAL/FAILED tasks. Re-runs C7's
    /// delivery path without touching task state.
    pub async fn resend_callback(&self, task_id: &str) -> OrchestratorResult<()> {
        let task = self.task_store.get(task_id).await?;
        if !task.status.is_terminal() {
            return Err(OrchestratorError::InvalidTransition {
                task_id: task_id.to_string(),
                status: task.status.to_string(),
                op: "resend_callback".to_string(),
            });
        }
        let envelope = build_envelope(&task);
        if let Some(callback) = &task.callback {
            self.callback_client
                .deliver(callback, &envelope)
                .await
                .map_err(|source| OrchestratorError::CallbackDeliveryFailed { task_id: task_id.to_string(), source })?;
        }
        Ok(())
    }
}
