//! Wires C1–C8 together into one in-process engine instance. A real
//! deployment replaces `InMemoryBlobStore`/`InMemoryTaskStore`/`InProcessBus`
//! with the actual S3/database/message-bus adapters this crate treats as
//! external collaborators; everything above the trait boundary is unchanged.

use std::sync::Arc;

use transcode_core::{
    AdmissionController, InMemoryBlobStore, InMemoryTaskStore, InProcessBus, MediaClassifier,
    Notifier, OrchestratorConfig, ResultAggregator, RetentionManager,
};
use transcode_wire::CallbackClient;

pub struct Engine {
    pub blob_store: Arc<InMemoryBlobStore>,
    pub task_store: Arc<InMemoryTaskStore>,
    pub bus: Arc<InProcessBus>,
    pub admission: Arc<AdmissionController<InProcessBus>>,
    pub aggregator: Arc<ResultAggregator<InProcessBus>>,
    pub retention: Arc<RetentionManager<InProcessBus>>,
    pub config: OrchestratorConfig,
}

impl Engine {
    pub fn new(config: OrchestratorConfig) -> Self {
        let blob_store = InMemoryBlobStore::shared(&config.blob.base_url);
        let task_store = InMemoryTaskStore::shared();
        let bus = InProcessBus::shared(config.bus.inflight_per_subscription);

        let classifier = MediaClassifier::new(config.media_classifier.default_on_unknown);

        let admission = Arc::new(AdmissionController::new(
            blob_store.clone(),
            task_store.clone(),
            bus.clone(),
            classifier,
        ));

        let callback_client = Arc::new(CallbackClient::with_policy(
            config.callback.max_attempts,
            std::time::Duration::from_millis(config.callback.base_delay_ms),
        ));
        let notifier = Arc::new(Notifier::new(bus.clone(), callback_client.clone()));
        let aggregator = Arc::new(ResultAggregator::new(
            task_store.clone(),
            bus.clone(),
            notifier.clone(),
            config.aggregator.retry_max_per_profile,
        ));
        let retention = Arc::new(RetentionManager::new(
            task_store.clone(),
            blob_store.clone(),
            bus.clone(),
            notifier,
            callback_client,
        ));

        Self { blob_store, task_store, bus, admission, aggregator, retention, config }
    }
}
