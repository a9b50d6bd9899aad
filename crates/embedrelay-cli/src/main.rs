mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "embedrelay",
    version,
    about = "Checkpointed delivery of embedding artifacts to a vector sink"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline loop: scan, deliver, drain dead letters
    Run {
        /// Path to pipeline YAML file
        pipeline: PathBuf,
        /// Run a single tick instead of looping
        #[arg(long)]
        once: bool,
    },
    /// Run one scanner tick: discover and enqueue new artifacts
    Scan {
        /// Path to pipeline YAML file
        pipeline: PathBuf,
    },
    /// Drain the work queue: deliver enqueued tasks to the sink
    Work {
        /// Path to pipeline YAML file
        pipeline: PathBuf,
    },
    /// Drain the dead-letter channel into durable failure records
    DrainDlq {
        /// Path to pipeline YAML file
        pipeline: PathBuf,
    },
    /// Report a document's pipeline status
    Status {
        /// Path to pipeline YAML file
        pipeline: PathBuf,
        /// Document id to resolve
        document_id: String,
    },
    /// Probe sink reachability
    Health {
        /// Path to pipeline YAML file
        pipeline: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run { pipeline, once } => commands::run::execute(&pipeline, once).await,
        Commands::Scan { pipeline } => commands::scan::execute(&pipeline).await,
        Commands::Work { pipeline } => commands::work::execute(&pipeline).await,
        Commands::DrainDlq { pipeline } => commands::drain_dlq::execute(&pipeline).await,
        Commands::Status {
            pipeline,
            document_id,
        } => commands::status::execute(&pipeline, &document_id).await,
        Commands::Health { pipeline } => commands::health::execute(&pipeline).await,
    }
}
