//! Per-table and per-run results.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Outcome of loading one table's rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Insert batches issued, including failed ones.
    pub batches: usize,
    pub batches_failed: usize,
    /// Rows handed to the loader.
    pub rows_submitted: usize,
    /// Rows the ODS reports as inserted. Ignored duplicates are not counted.
    pub rows_written: u64,
    /// `(batch number, error)` for each abandoned batch.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub batch_errors: Vec<(usize, String)>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.batches_failed == 0
    }
}

/// The scope a recorded failure applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureScope {
    Database,
    Table,
    Batch,
}

/// One failure recorded during a run.
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub scope: FailureScope,
    pub server_id: String,
    pub database: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    pub error: String,
}

/// Summary of one replication run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub servers: usize,
    pub databases_replicated: usize,
    pub databases_failed: usize,
    pub tables_replicated: usize,
    pub tables_failed: usize,
    pub rows_written: u64,
    pub batches_failed: usize,
    pub failures: Vec<FailureRecord>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            servers: 0,
            databases_replicated: 0,
            databases_failed: 0,
            tables_replicated: 0,
            tables_failed: 0,
            rows_written: 0,
            batches_failed: 0,
            failures: Vec::new(),
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn record_failure(
        &mut self,
        scope: FailureScope,
        server_id: &str,
        database: &str,
        table: Option<&str>,
        error: impl ToString,
    ) {
        self.failures.push(FailureRecord {
            scope,
            server_id: server_id.to_string(),
            database: database.to_string(),
            table: table.map(String::from),
            error: error.to_string(),
        });
    }

    /// Fold one table's load into the run totals.
    pub fn record_load(&mut self, report: &LoadReport) {
        self.rows_written += report.rows_written;
        self.batches_failed += report.batches_failed;
    }
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}
