//! `transcode task ...` — the CLI equivalent of the `/task/{id}` family of
//! HTTP endpoints (§6.1): get, list, summary, retry, delete, resend-callback.

use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{Table, Tabled};
use transcode_core::store::ListFilter;
use transcode_core::{OrchestratorConfig, TaskStatus, TaskStore};

use crate::engine::Engine;

use super::OutputFormat;

#[derive(Subcommand)]
pub enum TaskCommands {
    /// `GET /task/{id}`.
    Get(TaskIdArgs),

    /// `GET /tasks?status=&limit=&offset=`.
    List(ListArgs),

    /// `GET /tasks/summary`.
    Summary,

    /// `POST /task/{id}/retry?delete_files=bool`.
    Retry(RetryArgs),

    /// `DELETE /task/{id}?delete_files=bool&delete_faces=bool`.
    Delete(DeleteArgs),

    /// `POST /task/{id}/callback`.
    ResendCallback(TaskIdArgs),
}

#[derive(Args)]
pub struct TaskIdArgs {
    pub task_id: String,
}

#[derive(Args)]
pub struct ListArgs {
    /// Filter by status: pending, processing, completed, partial, failed.
    #[arg(long)]
    pub status: Option<String>,
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
    #[arg(long, default_value_t = 0)]
    pub offset: usize,
}

#[derive(Args)]
pub struct RetryArgs {
    pub task_id: String,
    /// Wipe the task's blob prefix before resetting and re-fanning-out.
    #[arg(long)]
    pub delete_files: bool,
}

#[derive(Args)]
pub struct DeleteArgs {
    pub task_id: String,
    #[arg(long)]
    pub delete_files: bool,
    #[arg(long)]
    pub delete_faces: bool,
}

#[derive(Tabled)]
struct TaskRow {
    task_id: String,
    status: String,
    effective_profiles: usize,
    outputs: usize,
    failed: usize,
    face: String,
}

fn to_row(task: &transcode_core::task::Task) -> TaskRow {
    TaskRow {
        task_id: task.task_id.clone(),
        status: task.status.to_string(),
        effective_profiles: task.effective_profiles.len(),
        outputs: task.outputs.len(),
        failed: task.failed_profiles.len(),
        face: task.face_detection.to_string(),
    }
}

pub async fn execute(command: TaskCommands, config: OrchestratorConfig, output: OutputFormat) -> anyhow::Result<()> {
    let engine = Engine::new(config);

    match command {
        TaskCommands::Get(args) => {
            let task = engine.task_store.get(&args.task_id).await?;
            print_task(&task, output);
        }
        TaskCommands::List(args) => {
            let status = args.status.as_deref().map(parse_status).transpose()?;
            let (tasks, total) = engine.task_store.list(ListFilter { status }, args.limit, args.offset).await?;
            match output {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&tasks)?),
                OutputFormat::Text => {
                    let rows: Vec<TaskRow> = tasks.iter().map(to_row).collect();
                    println!("{}", Table::new(rows));
                    println!("{} of {} total", "showing".dimmed(), total);
                }
            }
        }
        TaskCommands::Summary => {
            let summary = engine.task_store.summary().await?;
            match output {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
                OutputFormat::Text => {
                    for (status, count) in &summary {
                        println!("  {:<12} {}", status, count);
                    }
                }
            }
        }
        TaskCommands::Retry(args) => {
            engine.retention.retry(&args.task_id, args.delete_files).await?;
            println!("{} task {} retried", "->".green(), args.task_id.bold());
        }
        TaskCommands::Delete(args) => {
            let removed = engine.retention.delete(&args.task_id, args.delete_files, args.delete_faces).await?;
            println!("{} task {} deleted ({} blobs removed)", "->".green(), args.task_id.bold(), removed);
        }
        TaskCommands::ResendCallback(args) => {
            engine.retention.resend_callback(&args.task_id).await?;
            println!("{} callback resent for {}", "->".green(), args.task_id.bold());
        }
    }
    Ok(())
}

fn print_task(task: &transcode_core::task::Task, output: OutputFormat) {
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(task).unwrap()),
        OutputFormat::Text => {
            println!("{}", Table::new([to_row(task)]));
        }
    }
}

fn parse_status(raw: &str) -> anyhow::Result<TaskStatus> {
    match raw.to_ascii_lowercase().as_str() {
        "pending" => Ok(TaskStatus::Pending),
        "processing" => Ok(TaskStatus::Processing),
        "completed" => Ok(TaskStatus::Completed),
        "partial" => Ok(TaskStatus::Partial),
        "failed" => Ok(TaskStatus::Failed),
        other => anyhow::bail!("unknown status filter: {other}"),
    }
}
