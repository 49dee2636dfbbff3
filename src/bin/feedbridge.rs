//! feedbridge daemon: relays a social-feed timeline into IRC channels.

use clap::{CommandFactory, Parser};
use feedbridge::{Config, HttpFeedClient, IrcConnection, Supervisor, run_with_shutdown};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "feedbridge")]
#[command(version, about = "Relay a social-feed timeline into IRC channels")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(default_value = "feedbridge.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("feedbridge: {e}\n\n{}", Args::command().render_help());
            return ExitCode::FAILURE;
        }
    };

    match run(&config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "feedbridge stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &Config) -> feedbridge::Result<()> {
    let transport = IrcConnection::from_config(&config.irc);
    let feed = HttpFeedClient::new(&config.feed)?;
    let mut supervisor = Supervisor::new(config, transport, feed)?;

    info!(
        server = %config.irc.server,
        port = config.irc.port,
        channels = ?config.irc.channels,
        "Starting feedbridge"
    );
    run_with_shutdown(&mut supervisor).await
}
