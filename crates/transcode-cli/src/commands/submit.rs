//! `transcode submit` — the CLI equivalent of `POST /transcode`.

use std::path::Path;
use std::time::Duration;

use clap::Args;
use colored::Colorize;
use serde::Deserialize;
use transcode_core::{MessageBus, OrchestratorConfig, Profile, S3Layout, SourceInput, SubmitRequest, TaskStore};
use transcode_wire::{CallbackConfig, FaceResult, FaceTaskEnvelope, ProfileResult, TranscodeTaskEnvelope};

use crate::engine::Engine;
use crate::local_worker::{run_face_detection, run_transcode};

use super::OutputFormat;

#[derive(Args)]
pub struct SubmitArgs {
    /// A `media_url`, or a path to a local file to upload.
    pub source: String,

    /// Path to a JSON request file: `{profiles, s3_layout, face_config?, callback?, notify_topic?}`.
    #[arg(long, short)]
    pub request: String,
}

#[derive(Deserialize)]
struct RequestFile {
    profiles: Vec<Profile>,
    s3_layout: S3Layout,
    #[serde(default)]
    face_config: Option<transcode_core::profile::FaceDetectionConfig>,
    #[serde(default)]
    callback: Option<CallbackConfig>,
    #[serde(default)]
    notify_topic: Option<String>,
}

pub async fn execute(args: SubmitArgs, config: OrchestratorConfig, output: OutputFormat) -> anyhow::Result<()> {
    let request_json = std::fs::read_to_string(&args.request)?;
    let request_file: RequestFile = serde_json::from_str(&request_json)?;

    let source = if Path::new(&args.source).is_file() {
        let bytes = std::fs::read(&args.source)?;
        let content_type = guess_content_type(&args.source);
        SourceInput::Upload {
            filename: args.source.clone(),
            content_type,
            bytes,
        }
    } else {
        SourceInput::Url(args.source.clone())
    };

    let engine = Engine::new(config);

    let outcome = engine
        .admission
        .submit(SubmitRequest {
            source,
            profiles: request_file.profiles,
            s3_layout: request_file.s3_layout,
            face_config: request_file.face_config,
            callback: request_file.callback,
            notify_topic: request_file.notify_topic,
        })
        .await?;

    println!(
        "  {} submitted: task_id={}, effective={:?}, dropped={:?}, face_enabled={}",
        "->".green(),
        outcome.task_id.bold(),
        outcome.effective_profiles,
        outcome.dropped_profiles,
        outcome.face_enabled
    );

    drain_with_local_worker(&engine, &outcome.task_id).await?;

    let task = engine.task_store.get(&outcome.task_id).await?;
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&task)?),
        OutputFormat::Text => {
            println!(
                "  {} task {} reached {}",
                "=>".cyan(),
                task.task_id,
                task.status.to_string().bold()
            );
        }
    }
    Ok(())
}

fn guess_content_type(path: &str) -> String {
    match Path::new(path).extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()) {
        Some(ext) if ["jpg", "jpeg"].contains(&ext.as_str()) => "image/jpeg".to_string(),
        Some(ext) if ext == "png" => "image/png".to_string(),
        Some(ext) if ext == "gif" => "image/gif".to_string(),
        Some(ext) if ["mp4", "mov", "mkv", "webm"].contains(&ext.as_str()) => "video/mp4".to_string(),
        _ => "application/octet-stream".to_string(),
    }
}

/// Pulls every outstanding `transcode.tasks`/`face.tasks` message, runs the
/// local stand-in worker against it, and publishes the result — looping
/// until the task reaches a terminal state or the bus goes quiet.
async fn drain_with_local_worker(engine: &Engine, task_id: &str) -> anyhow::Result<()> {
    for _round in 0..64 {
        let task = engine.task_store.get(task_id).await?;
        if task.status.is_terminal() {
            return Ok(());
        }

        let mut made_progress = false;

        while let Some(delivery) = engine.bus.receive::<TranscodeTaskEnvelope>("transcode.tasks").await? {
            if delivery.payload.task_id != task_id {
                delivery.nack();
                continue;
            }
            let result: ProfileResult = run_transcode(&engine.blob_store, &delivery.payload).await;
            delivery.ack();
            engine.aggregator.handle_profile_result(result).await?;
            made_progress = true;
        }

        while let Some(delivery) = engine.bus.receive::<FaceTaskEnvelope>("face.tasks").await? {
            if delivery.payload.task_id != task_id {
                delivery.nack();
                continue;
            }
            let result: FaceResult = run_face_detection(&engine.blob_store, &delivery.payload).await;
            delivery.ack();
            engine.aggregator.handle_face_result(result).await?;
            made_progress = true;
        }

        if !made_progress {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
    Ok(())
}
