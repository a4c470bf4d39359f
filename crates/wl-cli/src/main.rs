use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use wl_cli::commands::{sources, sync};
use wl_cli::{Cli, Commands, Config};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    match &cli.command {
        Some(Commands::Sync(args)) => {
            let config =
                Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
            tracing::debug!(?config, "loaded configuration");

            let runtime = tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;
            let cancel = CancellationToken::new();

            runtime.block_on(async {
                // The first Ctrl-C stops outstanding uploads so finished ones are
                // still reported. A second one exits immediately.
                let on_signal = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::info!("interrupted, cancelling uploads");
                        on_signal.cancel();
                    }
                    if tokio::signal::ctrl_c().await.is_ok() {
                        std::process::exit(130);
                    }
                });

                let mut stdout = std::io::stdout().lock();
                let mut stdin = std::io::stdin().lock();
                sync::run(&mut stdout, &mut stdin, &config, args, cancel).await
            })?;
        }
        Some(Commands::Sources) => {
            sources::run(&mut std::io::stdout())?;
        }
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
