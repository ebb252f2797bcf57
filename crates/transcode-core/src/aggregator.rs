//! C6 — the result aggregator. Consumes per-profile transcode results and
//! face-detection results, applies the merge protocol, decides terminal
//! state, and hands terminal tasks to the notifier. The single authority on
//! task-level terminal state; nothing else may set COMPLETED/PARTIAL/FAILED.

use std::sync::Arc;

use tracing::{error, info, warn};
use transcode_wire::{FaceResult, FaceTaskEnvelope, ProfileResult, TranscodeTaskEnvelope};

use crate::admission::{TOPIC_FACE_TASKS, TOPIC_TRANSCODE_TASKS};
use crate::bus::MessageBus;
use crate::error::OrchestratorResult;
use crate::notifier::Notifier;
use crate::store::{ApplyOutcome, TaskStore};
use crate::task::TaskStatus;

pub struct ResultAggregator<B: MessageBus> {
    task_store: Arc<dyn TaskStore>,
    bus: Arc<B>,
    notifier: Arc<Notifier<B>>,
    retry_max_per_profile: u32,
}

impl<B: MessageBus> ResultAggregator<B> {
    pub fn new(
        task_store: Arc<dyn TaskStore>,
        bus: Arc<B>,
        notifier: Arc<Notifier<B>>,
        retry_max_per_profile: u32,
    ) -> Self {
        Self { task_store, bus, notifier, retry_max_per_profile }
    }

    /// Folds one `transcode.results` message into its task, per §4.6.
    pub async fn handle_profile_result(&self, result: ProfileResult) -> OrchestratorResult<()> {
        let task_id = result.task_id().to_string();
        let profile_id = result.profile_id().to_string();

        let original_source = match self.task_store.get(&task_id).await {
            Ok(task) => task.source,
            Err(_) => {
                info!(task_id, "result for unknown task, dropping");
                return Ok(());
            }
        };

        match self.task_store.apply_partial(&task_id, result, self.retry_max_per_profile).await? {
            ApplyOutcome::Stale => {
                info!(task_id, profile_id, "stale or duplicate result, dropping");
            }
            ApplyOutcome::Duplicate => {
                info!(task_id, profile_id, "duplicate result, dropping");
            }
            ApplyOutcome::NeedsRepublish { task, attempt } => {
                let output_layout = format!("{}/{}/{}", "s3-output", task_id, profile_id);
                let envelope = TranscodeTaskEnvelope {
                    task_id: task_id.clone(),
                    profile_id: profile_id.clone(),
                    source: original_source,
                    profile_config: task
                        .submitted_profiles
                        .iter()
                        .find(|p| p.id_profile == profile_id)
                        .map(|p| serde_json::to_value(&p.config).unwrap_or(serde_json::Value::Null))
                        .unwrap_or(serde_json::Value::Null),
                    output_layout,
                    attempt,
                };
                warn!(task_id, profile_id, attempt, "republishing retryable failure");
                self.bus.publish(TOPIC_TRANSCODE_TASKS, envelope).await?;
            }
            ApplyOutcome::Applied(task) => {
                self.evaluate_terminal(task).await?;
            }
        }
        Ok(())
    }

    /// Folds one `face.results` message into its task.
    pub async fn handle_face_result(&self, result: FaceResult) -> OrchestratorResult<()> {
        let task_id = result.task_id().to_string();

        let original_source = match self.task_store.get(&task_id).await {
            Ok(task) => task.source,
            Err(_) => {
                info!(task_id, "face result for unknown task, dropping");
                return Ok(());
            }
        };

        match self.task_store.apply_face_result(&task_id, result, self.retry_max_per_profile).await? {
            ApplyOutcome::Stale | ApplyOutcome::Duplicate => {
                info!(task_id, "stale or duplicate face result, dropping");
            }
            ApplyOutcome::NeedsRepublish { attempt, .. } => {
                let envelope = FaceTaskEnvelope {
                    task_id: task_id.clone(),
                    source: original_source,
                    face_config: serde_json::Value::Null,
                    avatar_output_layout: format!("{task_id}/faces"),
                    attempt,
                };
                warn!(task_id, attempt, "republishing retryable face failure");
                self.bus.publish(TOPIC_FACE_TASKS, envelope).await?;
            }
            ApplyOutcome::Applied(task) => {
                self.evaluate_terminal(task).await?;
            }
        }
        Ok(())
    }

    /// Evaluates the §4.6 terminal predicate and, if it fires, performs the
    /// guarded CAS into the terminal status and hands the task to C7.
    async fn evaluate_terminal(&self, task: crate::task::Task) -> OrchestratorResult<()> {
        let Some(terminal) = task.terminal_status() else {
            return Ok(());
        };
        match self.task_store.transition(&task.task_id, TaskStatus::Processing, terminal).await {
            Ok(persisted) => {
                info!(task_id = %persisted.task_id, status = %persisted.status, "task reached terminal state");
                self.notifier.notify(&persisted).await;
            }
            Err(err) => {
                // Another delivery already drove this task terminal (or
                // beyond); that's fine, the merge is idempotent.
                warn!(task_id = %task.task_id, error = %err, "terminal transition lost race, assuming already handled");
            }
        }
        Ok(())
    }

    /// After N consecutive failures redelivering the same message, the bus
    /// dead-letters it; record the task as FAILED with the captured reason
    /// rather than leaving it stuck in PROCESSING forever.
    pub async fn handle_dead_letter(&self, task_id: &str, reason: String) -> OrchestratorResult<()> {
        error!(task_id, reason = %reason, "dead-lettering task after repeated processing failures");
        if let Ok(persisted) = self.task_store.transition(task_id, TaskStatus::Processing, TaskStatus::Failed).await {
            self.notifier.notify(&persisted).await;
        }
        Ok(())
    }
}
