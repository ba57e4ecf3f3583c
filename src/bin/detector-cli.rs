// One-shot quotation detection from the command line
//
// Usage:
//   detector-cli [--mode llm|heuristic] [--min-confidence N] [--all-candidates] <greek text>
//
// Configuration comes from the environment (see EngineConfig::from_env);
// the result prints as pretty JSON on stdout.

use std::io::Read;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use quotation_detector::{DetectOptions, DetectionEngine, DetectionMode, EngineConfig};

fn parse_args() -> Result<(DetectOptions, String)> {
    let mut options = DetectOptions::default();
    let mut text_parts: Vec<String> = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--mode" => {
                let value = args.next().context("--mode requires a value")?;
                options.mode = match value.as_str() {
                    "llm" => DetectionMode::Llm,
                    "heuristic" => DetectionMode::Heuristic,
                    other => anyhow::bail!("unsupported mode: {}", other),
                };
            }
            "--min-confidence" => {
                let value = args.next().context("--min-confidence requires a value")?;
                options.min_confidence = value
                    .parse()
                    .context("--min-confidence must be an integer 0-100")?;
            }
            "--all-candidates" => options.include_all_candidates = true,
            "--help" | "-h" => {
                println!(
                    "Usage: detector-cli [--mode llm|heuristic] [--min-confidence N] \
                     [--all-candidates] <greek text>\n\
                     With no text argument, reads the input from stdin."
                );
                std::process::exit(0);
            }
            _ => text_parts.push(arg),
        }
    }

    let text = if text_parts.is_empty() {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read input from stdin")?;
        buffer
    } else {
        text_parts.join(" ")
    };

    Ok((options, text.trim().to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let (options, text) = parse_args()?;

    let config = EngineConfig::from_env();
    let engine = DetectionEngine::from_config(config).context("failed to initialize engine")?;

    let result = engine
        .detect(&text, &options)
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
