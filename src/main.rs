//! Decoy preview tool.
//!
//! Builds the corpus index and prints what a trapped visitor would see,
//! without standing up the serving layer.

use anyhow::{Context, Result};
use clap::Parser;
use decoy_gateway::{GatewayConfig, MarkovIndex, TextGenerator};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "decoy-gateway")]
#[command(author, version, about = "Preview procedurally generated decoy pages")]
struct Args {
    /// Path to configuration file (JSON or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory of HTML files to index as the generation corpus
    #[arg(long)]
    corpus: Option<PathBuf>,

    /// Request path to render a decoy page for
    #[arg(short, long, default_value = "/")]
    path: String,

    /// Scramble an existing HTML file instead of fabricating a page
    #[arg(long)]
    scramble: Option<PathBuf>,

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

    let env_filter = EnvFilter::from_default_env()
        .add_directive(level.into());

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

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, &args.log_level);

    let config = match &args.config {
        Some(path) => GatewayConfig::load(path)?,
        None => GatewayConfig::default(),
    };

    let corpus_dir = args.corpus.as_ref().or(config.decoy.corpus_dir.as_ref());
    let index = match corpus_dir {
        Some(dir) => MarkovIndex::build_from_dir(dir),
        None => MarkovIndex::empty(),
    };
    let stats = index.stats();
    info!(
        vocabulary = stats.vocabulary,
        transitions = stats.transitions,
        source_words = stats.source_words,
        "corpus indexed"
    );
    if index.is_empty() {
        info!("no corpus indexed, generating from built-in fallback vocabulary");
    }

    let generator = TextGenerator::new(index);

    let output = match &args.scramble {
        Some(file) => {
            let html = std::fs::read_to_string(file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            generator.scramble_html(&html, &format!("decoy::{}", args.path))
        }
        None => generator.decoy_page(&args.path),
    };

    println!("{output}");
    Ok(())
}
