use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

/// Real-time MIDI-over-IP relay daemon.
#[derive(Parser, Debug)]
#[command(name = "pianoconnect", about = "Real-time MIDI-over-IP relay")]
struct Args {
    /// Path to the relay's configuration file.
    #[arg(default_value = "pianoconnect.conf")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match midinet_relay::config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %args.config.display(), error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = midinet_relay::run(config).await {
        error!(error = %e, "relay exited with an error");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
