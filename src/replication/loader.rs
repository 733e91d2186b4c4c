//! Batched `INSERT IGNORE` loading.

use super::{BatchWriter, Destination};
use crate::error::{ReplicationError, ReplicationResult};
use crate::models::{LoadReport, RowRecord};
use tracing::{debug, error, info};

/// Splits rows into fixed-size batches and inserts them one at a time.
///
/// Batches are committed independently. A failed batch is reported and
/// skipped; loading continues with the next one.
#[derive(Debug, Clone, Copy)]
pub struct BulkLoader {
    batch_size: usize,
}

impl BulkLoader {
    pub fn new(batch_size: usize) -> ReplicationResult<Self> {
        if batch_size == 0 {
            return Err(ReplicationError::config("batch size must be at least 1"));
        }
        Ok(Self { batch_size })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Load `rows` into `database`.`table`.
    ///
    /// Every row must have the first row's column list. Empty input opens no
    /// writer and issues nothing.
    pub async fn load_rows<D: Destination>(
        &self,
        destination: &D,
        rows: &[RowRecord],
        database: &str,
        table: &str,
    ) -> ReplicationResult<LoadReport> {
        let Some(first) = rows.first() else {
            debug!(database = %database, table = %table, "No rows to load");
            return Ok(LoadReport::default());
        };

        if first.is_empty() {
            return Err(ReplicationError::invalid_input(format!(
                "rows for '{table}' have no columns"
            )));
        }
        if let Some(pos) = rows.iter().position(|row| !row.same_shape(first)) {
            return Err(ReplicationError::invalid_input(format!(
                "row {} of '{table}' does not match the column list of the first row",
                pos + 1
            )));
        }

        let mut writer = destination
            .open_writer(database, table, first.columns())
            .await?;

        let mut report = LoadReport {
            rows_submitted: rows.len(),
            ..Default::default()
        };

        for (idx, batch) in rows.chunks(self.batch_size).enumerate() {
            let batch_no = idx + 1;
            report.batches += 1;

            match writer.write_batch(batch_no, batch).await {
                Ok(inserted) => {
                    report.rows_written += inserted;
                    debug!(
                        database = %database,
                        table = %table,
                        batch = batch_no,
                        rows = batch.len(),
                        inserted,
                        "Batch committed"
                    );
                }
                Err(e) => {
                    error!(
                        database = %database,
                        table = %table,
                        batch = batch_no,
                        rows = batch.len(),
                        error = %e,
                        "Batch failed, skipping"
                    );
                    report.batches_failed += 1;
                    report.batch_errors.push((batch_no, e.to_string()));
                }
            }
        }

        writer.close().await;

        info!(
            database = %database,
            table = %table,
            rows = report.rows_submitted,
            inserted = report.rows_written,
            batches = report.batches,
            failed_batches = report.batches_failed,
            "Table loaded"
        );
        Ok(report)
    }
}
