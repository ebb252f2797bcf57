//! C7 — on a terminal transition, builds the canonical result envelope and
//! delivers it to the bus notify topic and/or the HTTP callback. Never
//! mutates task state; delivery failure is a separate observable event from
//! task-level failure (§9: "callback failures never mutate task state").

use std::sync::Arc;

use serde_json::json;
use tracing::{error, info};
use transcode_wire::{CallbackClient, NotificationEnvelope};

use crate::bus::MessageBus;
use crate::task::{FaceStage, Task};

pub struct Notifier<B: MessageBus> {
    bus: Arc<B>,
    callback_client: Arc<CallbackClient>,
}

impl<B: MessageBus> Notifier<B> {
    pub fn new(bus: Arc<B>, callback_client: Arc<CallbackClient>) -> Self {
        Self { bus, callback_client }
    }

    /// Builds the envelope and fires both delivery paths. Intended to be
    /// called exactly once per terminal transition — the CAS in
    /// `ResultAggregator::evaluate_terminal` guarantees that.
    pub async fn notify(&self, task: &Task) {
        let envelope = build_envelope(task);

        if let Some(topic) = &task.notify_topic {
            if let Err(err) = self.bus.publish(topic, envelope.clone()).await {
                error!(task_id = %task.task_id, topic, error = %err, "notify-topic publish failed");
            } else {
                info!(task_id = %task.task_id, topic, "published terminal notification");
            }
        }

        if let Some(callback) = &task.callback {
            match self.callback_client.deliver(callback, &envelope).await {
                Ok(()) => info!(task_id = %task.task_id, "callback delivered"),
                Err(err) => error!(task_id = %task.task_id, error = %err, "callback delivery exhausted"),
            }
        }
    }
}

/// Builds the result object returned by `GET /task/{id}`, published to the
/// notify topic, and POSTed to the callback URL — the same shape in all
/// three places per §6.2.
pub fn build_envelope(task: &Task) -> NotificationEnvelope {
    let outputs = json!(task
        .outputs
        .iter()
        .map(|(profile_id, artifacts)| (profile_id.clone(), artifacts))
        .collect::<std::collections::BTreeMap<_, _>>());

    let failed_profiles = json!(task
        .failed_profiles
        .iter()
        .map(|profile_id| (profile_id.clone(), task.profile_errors.get(profile_id).cloned().unwrap_or_default()))
        .collect::<std::collections::BTreeMap<_, _>>());

    let face_detection = match &task.face_detection {
        FaceStage::Disabled => json!({"state": "disabled"}),
        FaceStage::Pending => json!({"state": "pending"}),
        FaceStage::Completed { faces } => json!({"state": "completed", "faces": faces}),
        FaceStage::Failed { reason } => json!({"state": "failed", "reason": reason}),
    };

    NotificationEnvelope {
        task_id: task.task_id.clone(),
        status: task.status.to_string(),
        outputs,
        failed_profiles,
        face_detection,
        error: task.error.clone(),
        updated_at: task.updated_at,
    }
}
