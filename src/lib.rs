//! ODS Replicator Library
//!
//! Copies the tables of one or more source MySQL servers into a single
//! operational data store, one `{server_id}_{database}` database per
//! source database.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod replication;

pub use config::{Cli, ReplicationConfig, ReplicationOptions, ServerConfig};
pub use error::{ReplicationError, ReplicationResult};
pub use replication::Replicator;
