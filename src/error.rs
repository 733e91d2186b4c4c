//! Error types for the ODS replicator.
//!
//! Every failure the replication driver can hit maps onto one variant of
//! [`ReplicationError`]. The variant decides how far the failure propagates:
//! a single batch, a single table, a source database, or the whole run.

use std::fmt;
use thiserror::Error;

/// Which side of the replication a connection failure happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Source,
    Ods,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Ods => write!(f, "ODS"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ReplicationError {
    #[error("Connection to {endpoint} server {target} failed: {message}")]
    Connection {
        endpoint: Endpoint,
        /// host:port, never the credentials
        target: String,
        message: String,
        suggestion: String,
    },

    #[error("Failed to list tables in database '{database}': {message}")]
    Introspection { database: String, message: String },

    #[error("Failed to describe table '{table}': {message}")]
    Describe { table: String, message: String },

    #[error("Failed to read rows from table '{table}': {message}")]
    Fetch { table: String, message: String },

    #[error("Failed to provision {object}: {message}")]
    Provision { object: String, message: String },

    #[error("Batch {batch} ({rows} rows) into '{table}' failed: {message}")]
    BatchInsert {
        table: String,
        batch: usize,
        rows: usize,
        message: String,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Invalid identifier '{identifier}': {reason}")]
    InvalidIdentifier { identifier: String, reason: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

impl ReplicationError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(
        endpoint: Endpoint,
        target: impl Into<String>,
        message: impl fmt::Display,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Connection {
            endpoint,
            target: target.into(),
            message: message.to_string(),
            suggestion: suggestion.into(),
        }
    }

    /// Create an error for a failed table listing.
    pub fn introspection(database: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Introspection {
            database: database.into(),
            message: message.to_string(),
        }
    }

    /// Create an error for a table whose structure could not be read.
    pub fn describe(table: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Describe {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create an error for a failed `SELECT *`.
    pub fn fetch(table: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a provisioning error for a database or table.
    pub fn provision(object: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Provision {
            object: object.into(),
            message: message.to_string(),
        }
    }

    /// Create an error for one abandoned insert batch.
    pub fn batch_insert(
        table: impl Into<String>,
        batch: usize,
        rows: usize,
        message: impl fmt::Display,
    ) -> Self {
        Self::BatchInsert {
            table: table.into(),
            batch,
            rows,
            message: message.to_string(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create an invalid identifier error.
    pub fn invalid_identifier(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl fmt::Display) -> Self {
        Self::Config {
            message: message.to_string(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// The endpoint of a connection failure, if this is one.
    pub fn connection_endpoint(&self) -> Option<Endpoint> {
        match self {
            Self::Connection { endpoint, .. } => Some(*endpoint),
            _ => None,
        }
    }

    /// True when no further work is possible in this run: the ODS is gone.
    pub fn is_run_fatal(&self) -> bool {
        self.connection_endpoint() == Some(Endpoint::Ods)
    }

    /// True when the rest of the current source database cannot be processed.
    pub fn is_database_fatal(&self) -> bool {
        self.connection_endpoint() == Some(Endpoint::Source)
    }

    /// Process exit code for an error that ended the run.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config { .. } | Self::InvalidIdentifier { .. } => 2,
            Self::Connection {
                endpoint: Endpoint::Ods,
                ..
            } => 3,
            _ => 1,
        }
    }
}

impl From<serde_yaml::Error> for ReplicationError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::config(format!("invalid YAML: {err}"))
    }
}

/// Result type alias for replication operations.
pub type ReplicationResult<T> = Result<T, ReplicationError>;
