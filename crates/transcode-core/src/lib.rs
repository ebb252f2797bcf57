//! The task orchestration engine: admission, fan-out, result aggregation,
//! terminal policy, notification, and retention for the distributed media
//! transcode orchestrator.

pub mod admission;
pub mod aggregator;
pub mod blob;
pub mod bus;
pub mod classifier;
pub mod config;
pub mod error;
pub mod notifier;
pub mod profile;
pub mod retention;
pub mod store;
pub mod task;
pub mod telemetry;

pub use admission::{AdmissionController, SourceInput, SubmitOutcome, SubmitRequest};
pub use aggregator::ResultAggregator;
pub use blob::{BlobStore, InMemoryBlobStore};
pub use bus::{InProcessBus, MessageBus};
pub use classifier::{ClassificationHint, DefaultOnUnknown, MediaClassifier};
pub use config::OrchestratorConfig;
pub use error::{OrchestratorError, OrchestratorResult};
pub use notifier::Notifier;
pub use profile::{Profile, ProfileBuilder, ProfileConfig, S3Layout};
pub use retention::RetentionManager;
pub use store::{InMemoryTaskStore, TaskStore};
pub use task::{FaceStage, MediaType, Task, TaskStatus};
