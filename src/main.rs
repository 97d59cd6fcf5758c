//! CLI entry point for the cebcrawl tool.

use std::sync::Arc;

use anyhow::{Context, Result};
use cebcrawl_core::{CrawlerConfig, Orchestrator};
use clap::Parser;
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

/// Site crawled when no config file is given.
const DEFAULT_BASE_URL: &str = "https://www.cebraspe.org.br";

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");
    info!("cebcrawl starting");

    let config = match &args.config {
        Some(path) => CrawlerConfig::from_toml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => {
            info!(base_url = DEFAULT_BASE_URL, "no config file, using defaults");
            CrawlerConfig::builder(DEFAULT_BASE_URL)
                .build()
                .context("building default config")?
        }
    };

    let mut orchestrator =
        Orchestrator::new(Arc::new(config)).context("constructing pipeline")?;

    // Ctrl-C stops issuing new work; in-flight downloads finish and their
    // results are persisted.
    let cancel = orchestrator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight work");
            cancel.cancel();
        }
    });

    match orchestrator.run().await {
        Ok(report) => {
            print!("{report}");
            Ok(())
        }
        Err(failure) => {
            // A failed run still reports whatever it got through
            print!("{}", failure.report);
            Err(failure.error).context("crawl run failed")
        }
    }
}
