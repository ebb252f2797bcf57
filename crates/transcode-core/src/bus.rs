//! C3 — publish/subscribe wrapper over five logical channels. The spec
//! treats the real bus as an external collaborator (at-least-once publish,
//! explicit ack/nack subscribe); this in-process adapter stands in for it
//! during tests and the `serve` CLI command's `disable_bus` mode, the same
//! way `InProcessBus`-shaped adapters appear in the retrieval pack's event
//! bus examples.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::error::{OrchestratorError, OrchestratorResult};

/// A single at-least-once delivery. Calling neither `ack` nor `nack` behaves
/// as if `nack` had fired once the delivery is dropped, matching how a
/// crashed consumer leaves an unacked message to be redelivered.
pub struct Delivery<T> {
    pub payload: T,
    acked: bool,
    nack_sender: mpsc::UnboundedSender<()>,
}

impl<T> Delivery<T> {
    pub fn ack(mut self) {
        self.acked = true;
    }

    pub fn nack(self) {
        let _ = self.nack_sender.send(());
    }
}

impl<T> Drop for Delivery<T> {
    fn drop(&mut self) {
        if !self.acked {
            let _ = self.nack_sender.send(());
        }
    }
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    /// At-least-once publish of a JSON-serializable envelope onto `topic`.
    async fn publish<T: Serialize + Send + Sync + 'static>(&self, topic: &str, envelope: T) -> OrchestratorResult<()>;

    /// Pulls the next message for `topic`, or `None` if the topic is empty.
    /// Callers loop this and call `ack`/`nack` on the returned `Delivery`.
    async fn receive<T: DeserializeOwned + Send + 'static>(&self, topic: &str) -> OrchestratorResult<Option<Delivery<T>>>;

    /// Messages redelivered past the in-flight retry bound land here.
    async fn dead_letters(&self, topic: &str) -> Vec<serde_json::Value>;
}

const DEFAULT_DEAD_LETTER_CAPACITY: usize = 256;

struct Topic {
    queue: VecDeque<serde_json::Value>,
    dead_letters: VecDeque<serde_json::Value>,
}

impl Topic {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            dead_letters: VecDeque::new(),
        }
    }
}

/// Reference `MessageBus`: an in-process FIFO per topic, guarded by a single
/// mutex. Not meant to survive a process restart — the crash-durability the
/// real bus offers is explicitly out of scope for this orchestration engine.
pub struct InProcessBus {
    topics: Arc<Mutex<std::collections::BTreeMap<String, Topic>>>,
    inflight_per_subscription: usize,
    dead_letter_capacity: usize,
}

impl Default for InProcessBus {
    fn default() -> Self {
        Self::new(8)
    }
}

impl InProcessBus {
    pub fn new(inflight_per_subscription: usize) -> Self {
        Self {
            topics: Arc::new(Mutex::new(std::collections::BTreeMap::new())),
            inflight_per_subscription,
            dead_letter_capacity: DEFAULT_DEAD_LETTER_CAPACITY,
        }
    }

    pub fn shared(inflight_per_subscription: usize) -> Arc<Self> {
        Arc::new(Self::new(inflight_per_subscription))
    }

    async fn dead_letter(&self, topic: &str, envelope: serde_json::Value) {
        let mut topics = self.topics.lock().await;
        let entry = topics.entry(topic.to_string()).or_insert_with(Topic::new);
        if entry.dead_letters.len() >= self.dead_letter_capacity {
            entry.dead_letters.pop_front();
        }
        entry.dead_letters.push_back(envelope);
    }
}

#[async_trait]
impl MessageBus for InProcessBus {
    async fn publish<T: Serialize + Send + Sync + 'static>(&self, topic: &str, envelope: T) -> OrchestratorResult<()> {
        let value = serde_json::to_value(envelope).map_err(|e| OrchestratorError::BusPublishFailed {
            topic: topic.to_string(),
            reason: e.to_string(),
        })?;
        let mut topics = self.topics.lock().await;
        let entry = topics.entry(topic.to_string()).or_insert_with(Topic::new);
        entry.queue.push_back(value);
        debug!(topic, "published");
        Ok(())
    }

    async fn receive<T: DeserializeOwned + Send + 'static>(&self, topic: &str) -> OrchestratorResult<Option<Delivery<T>>> {
        let value = {
            let mut topics = self.topics.lock().await;
            let entry = topics.entry(topic.to_string()).or_insert_with(Topic::new);
            entry.queue.pop_front()
        };
        let Some(value) = value else {
            return Ok(None);
        };

        let payload: T = match serde_json::from_value(value.clone()) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(topic, error = %err, "dropping undeserializable message, sending to dead letter");
                self.dead_letter(topic, value).await;
                return Ok(None);
            }
        };

        let (nack_sender, mut nack_receiver) = mpsc::unbounded_channel::<()>();
        let topic_owned = topic.to_string();
        let requeue_target = self.topics.clone();
        let original = value;
        tokio::spawn(async move {
            if nack_receiver.recv().await.is_some() {
                let mut topics = requeue_target.lock().await;
                let entry = topics.entry(topic_owned).or_insert_with(Topic::new);
                entry.queue.push_back(original);
            }
        });

        Ok(Some(Delivery {
            payload,
            acked: false,
            nack_sender,
        }))
    }

    async fn dead_letters(&self, topic: &str) -> Vec<serde_json::Value> {
        let topics = self.topics.lock().await;
        topics
            .get(topic)
            .map(|t| t.dead_letters.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl InProcessBus {
    pub fn inflight_per_subscription(&self) -> usize {
        self.inflight_per_subscription
    }
}
