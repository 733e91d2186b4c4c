//! MySQL-backed source and destination.
//!
//! Every operation opens its own connection and releases it before
//! returning, whatever the outcome.

use super::{BatchWriter, Destination, SourceCatalog};
use crate::config::{ConnectionSettings, ReplicationOptions, ServerConfig};
use crate::db::connection::{ConnectionProvider, QueryFailure, ScopedConnection, timed};
use crate::db::SchemaInspector;
use crate::db::statements;
use crate::db::values::push_value;
use crate::error::{Endpoint, ReplicationError, ReplicationResult};
use crate::models::{RowRecord, TableSchema};
use sqlx::mysql::MySql;
use sqlx::{Connection, Executor, QueryBuilder};
use std::time::Duration;
use tracing::{debug, info};

/// Source servers, reached with the credentials of each [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct MySqlSource {
    provider: ConnectionProvider,
    query_timeout: Duration,
}

impl MySqlSource {
    pub fn new(options: &ReplicationOptions) -> Self {
        Self {
            provider: ConnectionProvider::new(Endpoint::Source, options.connect_timeout),
            query_timeout: options.query_timeout,
        }
    }
}

impl SourceCatalog for MySqlSource {
    async fn list_tables(
        &self,
        server: &ServerConfig,
        database: &str,
    ) -> ReplicationResult<Vec<String>> {
        let mut conn = self
            .provider
            .open(&server.connection(), Some(database))
            .await?;
        let result = SchemaInspector::list_tables(&mut conn, database, self.query_timeout).await;
        conn.release().await;
        result
    }

    async fn describe_table(
        &self,
        server: &ServerConfig,
        database: &str,
        table: &str,
    ) -> ReplicationResult<TableSchema> {
        let mut conn = self
            .provider
            .open(&server.connection(), Some(database))
            .await?;
        let result = SchemaInspector::describe_table(&mut conn, table, self.query_timeout).await;
        conn.release().await;
        result
    }

    async fn fetch_rows(
        &self,
        server: &ServerConfig,
        database: &str,
        table: &str,
    ) -> ReplicationResult<Vec<RowRecord>> {
        let mut conn = self
            .provider
            .open(&server.connection(), Some(database))
            .await?;
        let result = SchemaInspector::fetch_rows(&mut conn, table, self.query_timeout).await;
        conn.release().await;
        result
    }
}

/// The ODS server.
#[derive(Debug, Clone)]
pub struct MySqlOds {
    settings: ConnectionSettings,
    provider: ConnectionProvider,
    query_timeout: Duration,
    preserve_primary_key: bool,
}

impl MySqlOds {
    pub fn new(settings: ConnectionSettings, options: &ReplicationOptions) -> Self {
        Self {
            settings,
            provider: ConnectionProvider::new(Endpoint::Ods, options.connect_timeout),
            query_timeout: options.query_timeout,
            preserve_primary_key: options.preserve_primary_key,
        }
    }

    /// Run one DDL statement on a fresh connection.
    async fn execute_ddl(&self, sql: &str, object: &str) -> ReplicationResult<()> {
        let mut conn = self.provider.open(&self.settings, None).await?;
        let result = timed(self.query_timeout, (&mut *conn).execute(sql))
            .await
            .map(|_| ())
            .map_err(|e| e.into_error(sql, |e| ReplicationError::provision(object, e)));
        conn.release().await;
        result
    }
}

impl Destination for MySqlOds {
    type Writer = MySqlBatchWriter;

    async fn ensure_database(&self, name: &str) -> ReplicationResult<()> {
        let sql = statements::create_database(name)?;
        self.execute_ddl(&sql, &format!("database `{name}`")).await?;
        debug!(database = %name, "ODS database ready");
        Ok(())
    }

    async fn ensure_table(&self, database: &str, schema: &TableSchema) -> ReplicationResult<()> {
        let sql = statements::create_table(database, schema, self.preserve_primary_key)?;
        let object = format!("table `{database}`.`{}`", schema.table_name);
        self.execute_ddl(&sql, &object).await?;
        debug!(
            database = %database,
            table = %schema.table_name,
            columns = schema.columns.len(),
            "ODS table ready"
        );
        Ok(())
    }

    async fn open_writer(
        &self,
        database: &str,
        table: &str,
        columns: &[String],
    ) -> ReplicationResult<MySqlBatchWriter> {
        let prefix = statements::insert_ignore_prefix(database, table, columns)?;
        let conn = self.provider.open(&self.settings, None).await?;
        info!(
            database = %database,
            table = %table,
            target = %conn.target(),
            "Loading table"
        );
        Ok(MySqlBatchWriter {
            conn,
            prefix,
            table: table.to_string(),
            column_count: columns.len(),
            query_timeout: self.query_timeout,
        })
    }
}

/// One connection's worth of `INSERT IGNORE` batches into a single table.
#[derive(Debug)]
pub struct MySqlBatchWriter {
    conn: ScopedConnection,
    /// `INSERT IGNORE INTO ... (cols) `
    prefix: String,
    table: String,
    column_count: usize,
    query_timeout: Duration,
}

fn batch_error(
    table: &str,
    batch_no: usize,
    rows: usize,
    failure: QueryFailure,
) -> ReplicationError {
    failure.into_error(format!("batch {batch_no} into `{table}`"), |e| {
        ReplicationError::batch_insert(table, batch_no, rows, e)
    })
}

impl BatchWriter for MySqlBatchWriter {
    /// The batch commits as a whole. Batches wider than the placeholder limit
    /// are split into several statements inside the same transaction.
    async fn write_batch(
        &mut self,
        batch_no: usize,
        rows: &[RowRecord],
    ) -> ReplicationResult<u64> {
        let mut tx = timed(self.query_timeout, self.conn.begin())
            .await
            .map_err(|e| batch_error(&self.table, batch_no, rows.len(), e))?;

        let mut inserted = 0;
        for range in statements::statement_ranges(rows.len(), self.column_count) {
            let mut builder = QueryBuilder::<MySql>::new(&self.prefix);
            builder.push_values(&rows[range], |mut tuple, row| {
                for value in row.values() {
                    push_value(&mut tuple, value);
                }
            });

            let query = builder.build().persistent(false);
            match timed(self.query_timeout, query.execute(&mut *tx)).await {
                Ok(result) => inserted += result.rows_affected(),
                Err(e) => {
                    // Dropping the transaction rolls the batch back.
                    return Err(batch_error(&self.table, batch_no, rows.len(), e));
                }
            }
        }

        timed(self.query_timeout, tx.commit())
            .await
            .map_err(|e| batch_error(&self.table, batch_no, rows.len(), e))?;
        Ok(inserted)
    }

    async fn close(self) {
        self.conn.release().await;
    }
}
