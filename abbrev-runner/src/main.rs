use abbrev_runner::{
    run_worker, IsolatedExecutor, ProcessIsolation, ResumableBatchRunner, RunnerConfig,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(
    name = "abbrev-runner",
    about = "Extract abbreviations from a corpus, restarting after engine crashes"
)]
struct Cli {
    /// Path to a runner.toml (defaults to the user config directory)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH")]
    log_file_path: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the batch until the whole corpus has been traversed (default)
    Run,
    /// Isolated traversal; reads its settings from stdin
    #[command(hide = true)]
    Worker,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Run) {
        Command::Worker => {
            init_worker_tracing();
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            let succeeded = run_worker(stdin.lock(), stdout.lock())
                .context("Failed to write worker report")?;
            if !succeeded {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Run => {
            init_tracing(cli.log_file_path.as_deref());
            run_batch(cli.config).await
        }
    }
}

async fn run_batch(config_path: Option<PathBuf>) -> Result<()> {
    let (config, loaded_from) =
        RunnerConfig::load(config_path.as_deref()).context("Failed to load runner config")?;
    tracing::info!("Configuration from {:?} (if present)", loaded_from);

    let settings = config.traversal_settings();
    tracing::info!("source_file={:?}", settings.corpus_path);

    let isolation = ProcessIsolation::current_exe(IsolatedExecutor::new(config.runner.grace()))
        .context("Failed to locate the runner binary")?;

    let runner = ResumableBatchRunner::new(isolation, settings, config.runner.timeout())
        .with_max_attempts(config.runner.max_attempts);

    let outcome = runner.run().await?;
    tracing::info!(
        "Done after {} attempt(s): {:?}",
        outcome.attempts,
        outcome.summary
    );

    Ok(())
}

fn init_tracing(log_file_path: Option<&str>) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if let Some(log_path) = log_file_path {
        let log_path = std::path::Path::new(log_path);
        let file_appender = tracing_appender::rolling::never(
            log_path.parent().unwrap_or(std::path::Path::new(".")),
            log_path
                .file_name()
                .unwrap_or(std::ffi::OsStr::new("abbrev-runner.log")),
        );
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        std::mem::forget(guard);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(true)
                    .with_writer(std::io::stdout),
            )
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(non_blocking),
            )
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

/// Worker logs go to stderr; stdout is the result channel
fn init_worker_tracing() {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}
