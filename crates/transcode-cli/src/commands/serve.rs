//! `transcode serve` — runs the bus-driven worker pools against the
//! in-process reference bus: a transcode-results drain feeding the
//! aggregator, a face-results drain feeding the aggregator, and the local
//! stand-in workers draining `transcode.tasks`/`face.tasks` and publishing
//! results back onto the bus. A real deployment instead points each pool at
//! the actual broker subscription and replaces `local_worker` with the
//! FFmpeg/ONNX worker processes; everything downstream of the bus is
//! unchanged.

use std::time::Duration;

use clap::Args;
use tracing::info;
use transcode_core::{MessageBus, OrchestratorConfig};
use transcode_wire::{FaceResult, FaceTaskEnvelope, ProfileResult, TranscodeTaskEnvelope};

use crate::engine::Engine;
use crate::local_worker::{run_face_detection, run_transcode};

#[derive(Args)]
pub struct ServeArgs {
    /// Stop after this many idle poll rounds (0 = run until Ctrl+C).
    #[arg(long, default_value_t = 0)]
    pub max_idle_rounds: u64,

    /// Poll interval when a topic is empty.
    #[arg(long, default_value_t = 25)]
    pub poll_interval_ms: u64,
}

pub async fn execute(args: ServeArgs, config: OrchestratorConfig) -> anyhow::Result<()> {
    let engine = Engine::new(config);
    info!(
        inflight = engine.bus.inflight_per_subscription(),
        "serve: worker pools starting"
    );

    let mut idle_rounds: u64 = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("serve: shutdown signal received, draining in-flight work and stopping");
                break;
            }
            made_progress = poll_once(&engine) => {
                if made_progress {
                    idle_rounds = 0;
                } else {
                    idle_rounds += 1;
                    if args.max_idle_rounds > 0 && idle_rounds >= args.max_idle_rounds {
                        info!(idle_rounds, "serve: idle-round budget exhausted, stopping");
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(args.poll_interval_ms)).await;
                }
            }
        }
    }
    Ok(())
}

/// One sweep across all four topics the worker pools own. Returns whether
/// any message was processed, so the caller can back off when idle.
async fn poll_once(engine: &Engine) -> bool {
    let mut made_progress = false;

    while let Ok(Some(delivery)) = engine.bus.receive::<TranscodeTaskEnvelope>("transcode.tasks").await {
        let result: ProfileResult = run_transcode(&engine.blob_store, &delivery.payload).await;
        delivery.ack();
        if let Err(err) = engine.bus.publish("transcode.results", result).await {
            tracing::error!(error = %err, "serve: failed to publish transcode result");
        }
        made_progress = true;
    }

    while let Ok(Some(delivery)) = engine.bus.receive::<FaceTaskEnvelope>("face.tasks").await {
        let result: FaceResult = run_face_detection(&engine.blob_store, &delivery.payload).await;
        delivery.ack();
        if let Err(err) = engine.bus.publish("face.results", result).await {
            tracing::error!(error = %err, "serve: failed to publish face result");
        }
        made_progress = true;
    }

    while let Ok(Some(delivery)) = engine.bus.receive::<ProfileResult>("transcode.results").await {
        let result = delivery.payload.clone();
        delivery.ack();
        if let Err(err) = engine.aggregator.handle_profile_result(result).await {
            tracing::error!(error = %err, "serve: aggregator failed on transcode result");
        }
        made_progress = true;
    }

    while let Ok(Some(delivery)) = engine.bus.receive::<FaceResult>("face.results").await {
        let result = delivery.payload.clone();
        delivery.ack();
        if let Err(err) = engine.aggregator.handle_face_result(result).await {
            tracing::error!(error = %err, "serve: aggregator failed on face result");
        }
        made_progress = true;
    }

    made_progress
}
