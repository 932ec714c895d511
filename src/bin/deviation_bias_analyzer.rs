use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use deviation_bias_analyzer::{analyze, AnalyzerConfig, AnalyzerError};
use tracing_subscriber::EnvFilter;

/// Detect temporal drift and demographic bias in AI agent telemetry.
#[derive(Parser, Debug)]
#[command(name = "deviation-bias-analyzer", version)]
struct Cli {
    /// Path to an OTEL payload (compact or OTLP JSON). Reads stdin when omitted.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Optional TOML configuration overriding the built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Free-text description of what this agent is for; colors concern narratives.
    #[arg(long, default_value = "")]
    purpose: String,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("deviation_bias_analyzer=info")))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AnalyzerConfig::load(path),
        None => Ok(AnalyzerConfig::default()),
    };
    let config = match config {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("configuration error: {e}");
            return exit_code_for(&e);
        }
    };

    let raw = match read_input(cli.input.as_deref()) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::error!("failed to read input: {e}");
            return ExitCode::from(1);
        }
    };

    let payload: serde_json::Value = match serde_json::from_str(&raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!("invalid JSON input: {e}");
            return exit_code_for(&AnalyzerError::MalformedInput(e.to_string()));
        }
    };

    match analyze(&payload, &config, &cli.purpose) {
        Ok(output) => match serde_json::to_string_pretty(&output) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                tracing::error!("failed to serialize output: {e}");
                ExitCode::from(1)
            }
        },
        Err(e) => {
            tracing::error!("analysis failed: {e}");
            exit_code_for(&e)
        }
    }
}

fn read_input(path: Option<&std::path::Path>) -> anyhow::Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).context("reading stdin")?;
            Ok(buf)
        }
    }
}

fn exit_code_for(err: &AnalyzerError) -> ExitCode {
    match err {
        AnalyzerError::MalformedInput(_) => ExitCode::from(2),
        AnalyzerError::ConfigurationInvalid(_) | AnalyzerError::ConfigRead { .. } | AnalyzerError::ConfigParse { .. } => {
            ExitCode::from(3)
        }
    }
}
