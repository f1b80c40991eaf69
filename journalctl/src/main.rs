use anyhow::{Context, Result};
use clap::Parser;
use journalctl::{CatArgs, Cli, Command};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Records go to stdout, diagnostics to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Cat(args) if args.follow => follow(&args),
        Command::Cat(args) => journalctl::cat(&args, &mut std::io::stdout().lock()),
        Command::Info(args) => journalctl::info(&args, &mut std::io::stdout().lock()),
    }
}

fn follow(args: &CatArgs) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    runtime.block_on(async {
        let shutdown = CancellationToken::new();

        let shutdown_token = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl-C signal, stopping");
                    shutdown_token.cancel();
                }
                Err(e) => {
                    error!("Failed to listen for Ctrl-C signal: {}", e);
                }
            }
        });

        journalctl::follow(args, &mut std::io::stdout().lock(), shutdown).await
    })
}
