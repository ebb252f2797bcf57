//! Wire-level types shared between the orchestrator core and its workers:
//! bus envelopes, callback configuration, and the HTTP callback client.

pub mod callback;
pub mod client;
pub mod envelope;
pub mod error;

pub use callback::{CallbackAuth, CallbackConfig};
pub use client::CallbackClient;
pub use envelope::{
    ArtifactPayload, BoundingBox, Face, FaceResult, FaceTaskEnvelope, NotificationEnvelope,
    ProfileResult, TranscodeTaskEnvelope,
};
pub use error::{WireError, WireResult};
