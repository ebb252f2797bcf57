//! CLI command definitions and dispatch.

pub mod health;
pub mod serve;
pub mod submit;
pub mod task;

use clap::{Parser, Subcommand};

const BANNER: &str = r#"
   transcode-orchestrator
   Submit media, fan it out, watch it land.
"#;

/// transcode — operate the distributed media transcode orchestrator.
#[derive(Parser)]
#[command(
    name = "transcode",
    version,
    about = "Operate the distributed media transcode orchestrator",
    long_about = BANNER,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the orchestrator config file (defaults to the platform config dir).
    #[arg(long, global = true, env = "TRANSCODE_CONFIG")]
    pub config: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Submit a media source with a profile list; runs it to completion
    /// against the in-process reference engine.
    Submit(submit::SubmitArgs),

    /// Inspect and manage tasks (get, list, summary, retry, delete, resend-callback).
    #[command(subcommand)]
    Task(task::TaskCommands),

    /// Run the bus listener loop (admission subscription + aggregator workers).
    Serve(serve::ServeArgs),

    /// Report engine health.
    Health,
}

#[derive(Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Execute the CLI command.
pub async fn execute(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli
        .config
        .map(std::path::PathBuf::from)
        .or_else(transcode_core::OrchestratorConfig::default_path);
    let config = transcode_core::OrchestratorConfig::load(config_path.as_deref())?;

    match cli.command {
        Commands::Submit(args) => submit::execute(args, config, cli.output).await,
        Commands::Task(cmd) => task::execute(cmd, config, cli.output).await,
        Commands::Serve(args) => serve::execute(args, config).await,
        Commands::Health => health::execute(config).await,
    }
}
