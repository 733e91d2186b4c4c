//! Data models for the ODS replicator.
//!
//! This module re-exports all model types used throughout the application.

pub mod row;
pub mod schema;
pub mod summary;

// Re-export commonly used types
pub use row::{RowRecord, SqlValue};
pub use schema::{ColumnDefinition, TableSchema};
pub use summary::{FailureRecord, FailureScope, LoadReport, RunSummary};
