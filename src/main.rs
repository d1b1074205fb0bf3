//! Shield session replay
//!
//! Replays recorded sessions through the classifier and reports verdicts,
//! for calibrating weights and thresholds against labeled traffic.

use anyhow::{Context, Result};
use clap::Parser;
use shield_bot_detection::replay::{replay, SessionRecording};
use shield_bot_detection::ShieldConfig;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "shield-replay")]
#[command(author, version, about = "Replay recorded sessions through the Shield classifier")]
struct Args {
    /// Recorded sessions (JSON or YAML)
    #[arg(required = true)]
    recordings: Vec<PathBuf>,

    /// Path to configuration file (JSON or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Pretty-print verdict JSON
    #[arg(long)]
    pretty: bool,

    /// Enable JSON logging format
    #[arg(long)]
    json_logs: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logging(json: bool, level: &str) {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let env_filter = EnvFilter::from_default_env().add_directive(level.into());

    // Verdicts go to stdout; logs stay on stderr
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, &args.log_level);

    let config = match &args.config {
        Some(path) => ShieldConfig::from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ShieldConfig::default(),
    };

    let mut labeled = 0usize;
    let mut agreed = 0usize;

    for path in &args.recordings {
        let recording = match SessionRecording::from_path(path) {
            Ok(recording) => recording,
            Err(err) => {
                warn!(recording = %path.display(), error = %err, "Skipping unreadable recording");
                continue;
            }
        };

        let verdict = replay(&recording, &config).await;

        let output = if args.pretty {
            serde_json::to_string_pretty(&verdict)?
        } else {
            serde_json::to_string(&verdict)?
        };
        println!("{}", output);

        if let Some(label) = recording.label {
            labeled += 1;
            let agrees = label == verdict.verdict;
            if agrees {
                agreed += 1;
            }
            info!(
                recording = %path.display(),
                label = label.as_str(),
                verdict = verdict.verdict.as_str(),
                confidence = verdict.confidence,
                agrees,
                "Replayed"
            );
        } else {
            info!(
                recording = %path.display(),
                verdict = verdict.verdict.as_str(),
                confidence = verdict.confidence,
                "Replayed"
            );
        }
    }

    if labeled > 0 {
        info!(
            labeled,
            agreed,
            agreement = agreed as f64 / labeled as f64,
            "Label agreement"
        );
    }

    Ok(())
}
