use std::path::PathBuf;

use anyhow::{Context, Result};
use blinkcheck_core::ConfirmationSampling;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod render;
mod replay;
mod settings;
mod trace;

use settings::Settings;
use trace::Trace;

#[derive(Parser)]
#[command(name = "blinkcheck", version, about = "Blink-based liveness check")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a recorded detection trace through the liveness pipeline
    Replay {
        /// Path to a TOML trace file
        trace: PathBuf,
        /// Emit one JSON object per state change instead of status text
        #[arg(long)]
        json: bool,
        /// Override BLINKCHECK_CONFIRMATION_SAMPLING (trigger | checkpoint)
        #[arg(long)]
        sampling: Option<ConfirmationSampling>,
        /// Override the trace's settle time after the last frame, in milliseconds
        #[arg(long)]
        settle_ms: Option<u64>,
    },
    /// Print the effective configuration as JSON
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::from_env().context("invalid BLINKCHECK_* configuration")?;

    match cli.command {
        Command::Replay {
            trace,
            json,
            sampling,
            settle_ms,
        } => {
            if let Some(sampling) = sampling {
                settings.liveness.sampling = sampling;
            }

            let mut trace = Trace::load(&trace)?;
            if settle_ms.is_some() {
                trace.settle_ms = settle_ms;
            }
            let report = replay::run(trace, &settings, json).await?;

            if json {
                println!("{}", serde_json::to_string(&report)?);
            } else if !report.permission_granted {
                println!("Camera permission denied — analysis disabled.");
            } else {
                println!(
                    "{} frame(s) offered, {} analysed, {} dropped, {} released.",
                    report.stats.offered,
                    report.stats.analyzed,
                    report.stats.dropped,
                    report.released
                );
            }
        }
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
    }

    Ok(())
}
