//! # queuectl
//!
//! Main entry point for the queuectl command-line tool.
//!
//! Exit codes:
//! - **0**: success
//! - **1**: infrastructure failure (database, configuration, I/O)
//! - **2**: invalid input, unknown or duplicate job, job in the wrong state

use clap::Parser;
use queuectl_cli::cli::Cli;
use queuectl_cli::commands::{self, Context};
use queuectl_cli::startup::shutdown_signal;
use queuectl_config::ConfigLoader;
use queuectl_core::{init_logging, QueueResult};
use tracing::debug;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            debug!(code = e.error_code(), "Command failed");
            eprintln!("error: {}", e);
            e.exit_code()
        }
    };

    std::process::exit(code);
}

async fn run(cli: Cli) -> QueueResult<()> {
    let mut loader = ConfigLoader::new(cli.config.clone()).with_database_url(cli.database_url.clone());
    if let Some(environment) = &cli.environment {
        loader = loader.with_environment(environment.clone());
    }
    let config = loader.load()?;

    init_logging(&config.logging)?;
    if cli.is_worker() {
        queuectl_jobs::register_metrics();
    }
    let files = loader.layer_files(&config.app.environment);
    debug!(
        environment = %config.app.environment,
        dir = %cli.config.display(),
        files = files.len(),
        "Configuration loaded"
    );
    for path in &files {
        debug!(path = %path.display(), "Applied config file");
    }

    let ctx = Context::connect(config).await?;
    let mut out = std::io::stdout();
    let result = commands::dispatch(cli.command, &ctx, &mut out, shutdown_signal()).await;
    ctx.close().await;
    result
}
