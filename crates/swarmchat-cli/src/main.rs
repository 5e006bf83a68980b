//! SwarmChat CLI entry point

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use swarmchat_cli::{AppConfig, Cli, SwarmchatApp};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.print_config {
        print!("{}", AppConfig::example_config());
        return Ok(());
    }

    let config = AppConfig::load(&cli).context("Failed to load configuration")?;
    setup_logging(config.cli.verbose);

    let mut app = SwarmchatApp::start(config)
        .await
        .context("Failed to join swarm")?;
    println!("Type /help for a list of commands.");

    app.run().await?;

    info!("SwarmChat CLI exited successfully");
    Ok(())
}

/// Install the fmt subscriber; `RUST_LOG` applies unless verbose forces debug
fn setup_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
