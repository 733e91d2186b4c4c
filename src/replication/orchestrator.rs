//! Drives a full replication run: servers, then databases, then tables.

use super::{BulkLoader, Destination, SourceCatalog};
use crate::config::{ReplicationOptions, ServerConfig};
use crate::error::{ReplicationError, ReplicationResult};
use crate::models::{FailureScope, LoadReport, RunSummary};
use tracing::{error, info, warn};

/// How a table step ended, when it did not end in an error.
enum TableOutcome {
    Loaded(LoadReport),
    /// Table created but the source had no rows.
    Empty,
}

/// Sequential replication of every configured server into the ODS.
pub struct Replicator<S, D> {
    source: S,
    destination: D,
    loader: BulkLoader,
}

impl<S: SourceCatalog, D: Destination> Replicator<S, D> {
    pub fn new(source: S, destination: D, options: &ReplicationOptions) -> ReplicationResult<Self> {
        Ok(Self {
            source,
            destination,
            loader: BulkLoader::new(options.batch_size)?,
        })
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn destination(&self) -> &D {
        &self.destination
    }

    /// Replicate `servers` in order.
    ///
    /// Table and batch failures are recorded in the summary and the run
    /// goes on. Losing the ODS ends the run with an error.
    pub async fn run(&self, servers: &[ServerConfig]) -> ReplicationResult<RunSummary> {
        let mut summary = RunSummary::new();
        info!(run_id = %summary.run_id, servers = servers.len(), "Replication run started");

        for server in servers {
            summary.servers += 1;
            info!(
                server_id = %server.server_id,
                host = %server.host,
                databases = server.databases.len(),
                "Replicating server"
            );

            for database in &server.databases {
                if let Err(e) = self.replicate_database(server, database, &mut summary).await {
                    error!(
                        run_id = %summary.run_id,
                        server_id = %server.server_id,
                        database = %database,
                        error = %e,
                        tables_replicated = summary.tables_replicated,
                        rows_written = summary.rows_written,
                        "ODS unavailable, aborting run"
                    );
                    return Err(e);
                }
            }
        }

        summary.finish();
        info!(
            run_id = %summary.run_id,
            databases = summary.databases_replicated,
            databases_failed = summary.databases_failed,
            tables = summary.tables_replicated,
            tables_failed = summary.tables_failed,
            rows_written = summary.rows_written,
            batches_failed = summary.batches_failed,
            "Replication run finished"
        );
        Ok(summary)
    }

    /// Returns an error only when the run cannot continue.
    async fn replicate_database(
        &self,
        server: &ServerConfig,
        database: &str,
        summary: &mut RunSummary,
    ) -> ReplicationResult<()> {
        let server_id = server.server_id.as_str();
        let ods_database = server.ods_database_name(database);

        if let Err(e) = self.destination.ensure_database(&ods_database).await {
            if e.is_run_fatal() {
                return Err(e);
            }
            warn!(
                server_id = %server_id,
                database = %database,
                ods_database = %ods_database,
                error = %e,
                "Cannot create ODS database, skipping database"
            );
            summary.databases_failed += 1;
            summary.record_failure(FailureScope::Database, server_id, database, None, &e);
            return Ok(());
        }

        let tables = match self.source.list_tables(server, database).await {
            Ok(tables) => tables,
            Err(e) => {
                if e.is_run_fatal() {
                    return Err(e);
                }
                warn!(
                    server_id = %server_id,
                    database = %database,
                    error = %e,
                    "Cannot list tables, skipping database"
                );
                summary.databases_failed += 1;
                summary.record_failure(FailureScope::Database, server_id, database, None, &e);
                return Ok(());
            }
        };

        info!(
            server_id = %server_id,
            database = %database,
            ods_database = %ods_database,
            tables = tables.len(),
            "Replicating database"
        );

        for table in &tables {
            match self
                .replicate_table(server, database, &ods_database, table)
                .await
            {
                Ok(TableOutcome::Loaded(report)) => {
                    summary.tables_replicated += 1;
                    summary.record_load(&report);
                    for (batch_no, message) in &report.batch_errors {
                        summary.record_failure(
                            FailureScope::Batch,
                            server_id,
                            database,
                            Some(table.as_str()),
                            format!("batch {batch_no}: {message}"),
                        );
                    }
                }
                Ok(TableOutcome::Empty) => {
                    summary.tables_replicated += 1;
                }
                Err(e) if e.is_run_fatal() => return Err(e),
                Err(e) => {
                    warn!(
                        server_id = %server_id,
                        database = %database,
                        table = %table,
                        error = %e,
                        "Table skipped"
                    );
                    summary.tables_failed += 1;
                    summary.record_failure(
                        FailureScope::Table,
                        server_id,
                        database,
                        Some(table.as_str()),
                        &e,
                    );

                    if e.is_database_fatal() {
                        warn!(
                            server_id = %server_id,
                            database = %database,
                            "Source server unavailable, skipping rest of database"
                        );
                        summary.databases_failed += 1;
                        summary.record_failure(
                            FailureScope::Database,
                            server_id,
                            database,
                            None,
                            &e,
                        );
                        return Ok(());
                    }
                }
            }
        }

        summary.databases_replicated += 1;
        Ok(())
    }

    async fn replicate_table(
        &self,
        server: &ServerConfig,
        database: &str,
        ods_database: &str,
        table: &str,
    ) -> ReplicationResult<TableOutcome> {
        let schema = self.source.describe_table(server, database, table).await?;
        if schema.is_empty() {
            return Err(ReplicationError::describe(table, "table reported no columns"));
        }

        self.destination.ensure_table(ods_database, &schema).await?;

        let rows = self.source.fetch_rows(server, database, table).await?;
        if rows.is_empty() {
            info!(
                server_id = %server.server_id,
                database = %database,
                table = %table,
                "Table is empty"
            );
            return Ok(TableOutcome::Empty);
        }

        let report = self
            .loader
            .load_rows(&self.destination, &rows, ods_database, table)
            .await?;
        Ok(TableOutcome::Loaded(report))
    }
}
