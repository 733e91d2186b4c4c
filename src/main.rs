//! ODS Replicator - Main entry point.
//!
//! Reads the YAML configuration, replicates every configured source
//! database into the ODS and reports the outcome through the exit status.

use clap::Parser;
use ods_replicator::config::{Cli, ReplicationConfig};
use ods_replicator::error::ReplicationError;
use ods_replicator::replication::{MySqlOds, MySqlSource, Replicator};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Exit status for a completed run with failures under `--strict`.
const EXIT_PARTIAL_FAILURE: u8 = 4;

/// Initialize the tracing subscriber for logging.
fn init_tracing(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so stdout stays clean for --summary-json
    if cli.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn fail(err: &ReplicationError) -> ExitCode {
    match err.suggestion() {
        Some(suggestion) => error!(error = %err, suggestion = %suggestion, "Replication failed"),
        None => error!(error = %err, "Replication failed"),
    }
    ExitCode::from(err.exit_code())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse configuration from command line and environment
    let cli = Cli::parse();

    // Initialize logging
    init_tracing(&cli);

    info!(
        config = %cli.config.display(),
        "Starting ODS Replicator v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = match ReplicationConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => return fail(&e),
    };
    let servers = match config.select_servers(&cli.servers) {
        Ok(servers) => servers,
        Err(e) => return fail(&e),
    };

    let options = cli.options();
    info!(
        ods = %config.ods.address(),
        servers = servers.len(),
        batch_size = options.batch_size,
        preserve_primary_key = options.preserve_primary_key,
        "Configuration loaded"
    );

    let source = MySqlSource::new(&options);
    let destination = MySqlOds::new(config.ods.clone(), &options);
    let replicator = match Replicator::new(source, destination, &options) {
        Ok(replicator) => replicator,
        Err(e) => return fail(&e),
    };

    let summary = match replicator.run(&servers).await {
        Ok(summary) => summary,
        Err(e) => return fail(&e),
    };

    if cli.summary_json {
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{json}"),
            Err(e) => warn!(error = %e, "Could not serialize run summary"),
        }
    }

    if summary.has_failures() {
        warn!(
            failures = summary.failures.len(),
            tables_failed = summary.tables_failed,
            batches_failed = summary.batches_failed,
            databases_failed = summary.databases_failed,
            "Run completed with failures"
        );
        if cli.strict {
            return ExitCode::from(EXIT_PARTIAL_FAILURE);
        }
    }

    ExitCode::SUCCESS
}
