//! The replication driver.
//!
//! The orchestrator and loader only see the three traits below. The MySQL
//! implementations live in [`mysql`]; tests drive the same code paths with
//! in-memory doubles.

pub mod loader;
pub mod mysql;
pub mod orchestrator;

use crate::config::ServerConfig;
use crate::error::ReplicationResult;
use crate::models::{RowRecord, TableSchema};
use std::future::Future;

pub use loader::BulkLoader;
pub use mysql::{MySqlBatchWriter, MySqlOds, MySqlSource};
pub use orchestrator::Replicator;

/// Read access to the source servers.
pub trait SourceCatalog: Send + Sync {
    /// Table names of `database`, in the server's listing order.
    fn list_tables(
        &self,
        server: &ServerConfig,
        database: &str,
    ) -> impl Future<Output = ReplicationResult<Vec<String>>> + Send;

    /// Column structure of one table, in ordinal order.
    fn describe_table(
        &self,
        server: &ServerConfig,
        database: &str,
        table: &str,
    ) -> impl Future<Output = ReplicationResult<TableSchema>> + Send;

    /// Every row of one table.
    fn fetch_rows(
        &self,
        server: &ServerConfig,
        database: &str,
        table: &str,
    ) -> impl Future<Output = ReplicationResult<Vec<RowRecord>>> + Send;
}

/// Write access to the ODS.
pub trait Destination: Send + Sync {
    type Writer: BatchWriter;

    /// Create the database unless it exists.
    fn ensure_database(&self, name: &str) -> impl Future<Output = ReplicationResult<()>> + Send;

    /// Create the table unless it exists.
    fn ensure_table(
        &self,
        database: &str,
        schema: &TableSchema,
    ) -> impl Future<Output = ReplicationResult<()>> + Send;

    /// Open a writer for `INSERT IGNORE` batches over `columns`.
    fn open_writer(
        &self,
        database: &str,
        table: &str,
        columns: &[String],
    ) -> impl Future<Output = ReplicationResult<Self::Writer>> + Send;
}

/// Inserts batches into one ODS table. Each batch commits on its own.
pub trait BatchWriter: Send {
    /// Insert one batch; returns the rows the ODS actually inserted.
    fn write_batch(
        &mut self,
        batch_no: usize,
        rows: &[RowRecord],
    ) -> impl Future<Output = ReplicationResult<u64>> + Send;

    fn close(self) -> impl Future<Output = ()> + Send;
}
