// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! CentralDB replication service CLI
//!
//! # Usage
//!
//! ```bash
//! # Replicate every source in sources.yaml forever
//! centraldb --sources sources.yaml --dest-token $TOKEN
//!
//! # Single pass, verbose
//! centraldb --once --log-level debug
//!
//! # Backfill everything before a fixed instant
//! centraldb --once --until 1735689600
//! ```

use anyhow::{Context, Result};
use centraldb::{
    ChunkedWriter, CursorStore, InfluxDestination, InfluxExtractor, Replicator, Settings,
    SourceLoader, SourcesFile, SqliteCursorStore, StopHandle,
};
use clap::Parser;
use reqwest::blocking::Client;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "centraldb")]
#[command(author = "naskel.com")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Incremental InfluxDB replication into a central store", long_about = None)]
struct Args {
    /// Source list (YAML), re-read every cycle
    #[arg(short, long, default_value = "sources.yaml")]
    sources: PathBuf,

    /// Directory holding the cursor database [env: DBDIR]
    #[arg(long)]
    db_dir: Option<PathBuf>,

    /// Destination URL [env: CENTRALDB_DEST_URL]
    #[arg(long)]
    dest_url: Option<String>,

    /// Destination organization [env: CENTRALDB_DEST_ORG]
    #[arg(long)]
    dest_org: Option<String>,

    /// Destination API token [env: CENTRALDB_DEST_TOKEN]
    #[arg(long)]
    dest_token: Option<String>,

    /// Destination request / source connect timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Points per write request
    #[arg(long, default_value_t = centraldb::writer::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Stop every window at this Unix time (seconds) and commit it
    #[arg(long, value_parser = parse_until)]
    until: Option<f64>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let settings = build_settings(&args);

    tracing::info!("CentralDB starting...");
    tracing::info!("  Sources: {}", args.sources.display());
    tracing::info!("  Cursor DB: {}", settings.data_dir.display());
    tracing::info!("  Destination: {} (org {})", settings.destination.url, settings.destination.org);
    if let Some(until) = args.until {
        tracing::info!("  Until: {}", centraldb::extract::format_time(until));
    }

    let (query_client, write_client) = build_clients(settings.request_timeout)?;

    let cursors = SqliteCursorStore::open_dir(&settings.data_dir)
        .with_context(|| format!("Failed to open cursor store in {}", settings.data_dir.display()))?;
    cursors
        .initialize()
        .context("Failed to initialize cursor store")?;

    let replicator = Replicator::new(
        cursors,
        InfluxExtractor::new(query_client),
        InfluxDestination::new(write_client, settings.destination),
    )
    .with_writer(ChunkedWriter::new(args.chunk_size))
    .with_until(args.until);

    ctrlc_handler(replicator.stop_handle());

    let loader = SourcesFile::new(&args.sources);

    if args.once {
        let config = loader
            .load()
            .with_context(|| format!("Failed to load {}", args.sources.display()))?;
        let report = replicator.run_cycle(&config.sources);
        tracing::info!(
            synced = report.synced.len(),
            failed = report.failed.len(),
            points = report.points(),
            "Single cycle complete"
        );
        if !report.is_clean() {
            anyhow::bail!("{} source(s) failed", report.failed.len());
        }
        return Ok(());
    }

    replicator
        .run(&loader)
        .with_context(|| format!("Failed to load {}", args.sources.display()))?;

    Ok(())
}

/// HTTP clients for source queries and destination calls.
///
/// A query body is read while the window's chunks are written, so the query
/// client only bounds connecting; a total timeout would cut long windows off
/// mid-stream on every cycle.
fn build_clients(timeout: Duration) -> Result<(Client, Client)> {
    let query = Client::builder()
        .connect_timeout(timeout)
        .timeout(None::<Duration>)
        .build()
        .context("Failed to build source HTTP client")?;
    let write = Client::builder()
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()
        .context("Failed to build destination HTTP client")?;
    Ok((query, write))
}

/// Parse `--until`, rejecting NaN and infinities.
fn parse_until(value: &str) -> std::result::Result<f64, String> {
    let until: f64 = value
        .parse()
        .map_err(|e| format!("invalid Unix time '{}': {}", value, e))?;
    if until.is_finite() {
        Ok(until)
    } else {
        Err(format!("Unix time must be finite, got '{}'", value))
    }
}

/// Environment settings with command-line overrides applied.
fn build_settings(args: &Args) -> Settings {
    let mut builder = Settings::builder().base(Settings::from_env());

    if let Some(dir) = &args.db_dir {
        builder = builder.data_dir(dir);
    }
    if let Some(url) = &args.dest_url {
        builder = builder.dest_url(url);
    }
    if let Some(org) = &args.dest_org {
        builder = builder.dest_org(org);
    }
    if let Some(token) = &args.dest_token {
        builder = builder.dest_token(token);
    }
    if let Some(secs) = args.timeout {
        builder = builder.request_timeout(Duration::from_secs(secs));
    }

    builder.build()
}

/// Setup Ctrl+C handler.
fn ctrlc_handler(stop_handle: StopHandle) {
    let _ = ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, stopping after current source...");
        stop_handle.stop();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let args = Args::try_parse_from(["centraldb"]).unwrap();
        assert_eq!(args.sources, PathBuf::from("sources.yaml"));
        assert_eq!(args.chunk_size, 10_000);
        assert!(!args.once);
        assert!(args.until.is_none());
    }

    #[test]
    fn test_cli_overrides_settings() {
        let args = Args::try_parse_from([
            "centraldb",
            "--db-dir",
            "/tmp/cdb",
            "--dest-org",
            "lab",
            "--timeout",
            "30",
            "--until",
            "1700000000",
            "--once",
        ])
        .unwrap();

        let settings = build_settings(&args);
        assert_eq!(settings.data_dir, PathBuf::from("/tmp/cdb"));
        assert_eq!(settings.destination.org, "lab");
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
        assert_eq!(args.until, Some(1_700_000_000.0));
        assert!(args.once);
    }

    #[test]
    fn test_cli_rejects_non_finite_until() {
        for bad in ["NaN", "inf", "-inf", "soon"] {
            assert!(
                Args::try_parse_from(["centraldb", "--until", bad]).is_err(),
                "accepted --until {}",
                bad
            );
        }
        assert_eq!(parse_until("1700000000.5"), Ok(1_700_000_000.5));
    }

    #[test]
    fn test_build_clients() {
        assert!(build_clients(Duration::from_secs(5)).is_ok());
    }
}
