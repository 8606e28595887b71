use std::path::PathBuf;

use clap::Parser;
use vibemonitor_lib::{init_logging, run, RunOptions};

/// Watch accelerometer samples for sustained vibration and notify webhooks
/// when the activity starts and stops.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Settings file (JSON). Defaults are used when it does not exist.
    #[arg(long, default_value = "vibemonitor.json")]
    settings: PathBuf,

    /// Read `x,y,z` samples from this file instead of stdin.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Replay samples at this rate in Hz.
    #[arg(long)]
    replay_hz: Option<f64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();

    run(RunOptions {
        settings_path: cli.settings,
        input: cli.input,
        replay_hz: cli.replay_hz,
    })
    .await
}
