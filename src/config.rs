//! Configuration handling for the ODS replicator.
//!
//! Two layers: process options come from CLI arguments and environment
//! variables, the servers to replicate come from a YAML document.
//!
//! ```yaml
//! ods:
//!   host: ods.internal
//!   port: 3306
//!   user: replicator
//!   password: secret
//! databases:
//!   - server_id: s1
//!     host: db1.internal
//!     port: 3306
//!     user: reader
//!     password: secret
//!     databases: [shop, crm]
//! ```

use crate::db::identifier::{MAX_IDENTIFIER_LEN, validate_name};
use crate::error::{ReplicationError, ReplicationResult};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.yml";
pub const DEFAULT_MYSQL_PORT: u16 = 3306;
pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 300;

fn default_port() -> u16 {
    DEFAULT_MYSQL_PORT
}

/// Host, port and credentials for one MySQL server.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    /// Sensitive - never logged.
    #[serde(default)]
    pub password: String,
}

impl ConnectionSettings {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
        }
    }

    /// `host:port`, safe to log.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One source server and the databases to copy from it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Unique id, used as the ODS database name prefix.
    pub server_id: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    /// Source databases, processed in this order.
    pub databases: Vec<String>,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("server_id", &self.server_id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("databases", &self.databases)
            .finish()
    }
}

impl ServerConfig {
    pub fn connection(&self) -> ConnectionSettings {
        ConnectionSettings::new(&self.host, self.port, &self.user, &self.password)
    }

    /// Destination database for one of this server's databases.
    pub fn ods_database_name(&self, database: &str) -> String {
        ods_database_name(&self.server_id, database)
    }
}

/// `{server_id}_{database}`.
pub fn ods_database_name(server_id: &str, database: &str) -> String {
    format!("{server_id}_{database}")
}

/// The YAML document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    pub ods: ConnectionSettings,
    /// Source servers, processed in this order.
    #[serde(rename = "databases")]
    pub servers: Vec<ServerConfig>,
}

impl ReplicationConfig {
    /// Read, parse and validate a YAML config file.
    pub fn load(path: impl AsRef<Path>) -> ReplicationResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ReplicationError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml_str(raw: &str) -> ReplicationResult<Self> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the replication driver relies on.
    pub fn validate(&self) -> ReplicationResult<()> {
        if self.ods.host.trim().is_empty() {
            return Err(ReplicationError::config("ods.host must not be empty"));
        }
        if self.servers.is_empty() {
            return Err(ReplicationError::config(
                "at least one source server must be configured under 'databases'",
            ));
        }

        let mut seen = HashSet::new();
        for server in &self.servers {
            validate_name(&server.server_id)?;
            if !seen.insert(server.server_id.as_str()) {
                return Err(ReplicationError::config(format!(
                    "duplicate server_id '{}'",
                    server.server_id
                )));
            }
            if server.host.trim().is_empty() {
                return Err(ReplicationError::config(format!(
                    "server '{}' has an empty host",
                    server.server_id
                )));
            }
            if server.databases.is_empty() {
                return Err(ReplicationError::config(format!(
                    "server '{}' lists no databases",
                    server.server_id
                )));
            }
            for database in &server.databases {
                validate_name(database)?;
                let ods_name = server.ods_database_name(database);
                if ods_name.len() > MAX_IDENTIFIER_LEN {
                    return Err(ReplicationError::invalid_identifier(
                        ods_name,
                        format!("ODS database name exceeds {MAX_IDENTIFIER_LEN} characters"),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Keep only the listed server ids, in config order. Empty keeps all.
    pub fn select_servers(&self, server_ids: &[String]) -> ReplicationResult<Vec<ServerConfig>> {
        if server_ids.is_empty() {
            return Ok(self.servers.clone());
        }
        if let Some(unknown) = server_ids
            .iter()
            .find(|id| !self.servers.iter().any(|s| &s.server_id == *id))
        {
            return Err(ReplicationError::config(format!(
                "unknown server_id '{unknown}' in --server"
            )));
        }
        Ok(self
            .servers
            .iter()
            .filter(|s| server_ids.contains(&s.server_id))
            .cloned()
            .collect())
    }
}

/// Knobs the orchestrator, provisioner and loader share.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicationOptions {
    pub batch_size: usize,
    pub connect_timeout: Duration,
    pub query_timeout: Duration,
    /// Recreate the source primary key on new ODS tables.
    pub preserve_primary_key: bool,
}

impl Default for ReplicationOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
            preserve_primary_key: true,
        }
    }
}

/// Command line interface.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "ods-replicator",
    about = "Replicates source MySQL databases into a consolidated operational data store",
    version,
    author
)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(
        short,
        long,
        value_name = "PATH",
        default_value = DEFAULT_CONFIG_PATH,
        env = "ODS_CONFIG"
    )]
    pub config: PathBuf,

    /// Only replicate these server ids (repeatable or comma-separated)
    #[arg(
        short,
        long = "server",
        value_name = "SERVER_ID",
        value_delimiter = ','
    )]
    pub servers: Vec<String>,

    /// Rows per insert batch
    #[arg(
        long,
        default_value_t = DEFAULT_BATCH_SIZE as u64,
        env = "ODS_BATCH_SIZE",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub batch_size: u64,

    /// Connection timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS,
        env = "ODS_CONNECT_TIMEOUT"
    )]
    pub connect_timeout: u64,

    /// Per-statement timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_QUERY_TIMEOUT_SECS,
        env = "ODS_QUERY_TIMEOUT"
    )]
    pub query_timeout: u64,

    /// Create ODS tables without the source primary key
    #[arg(long)]
    pub no_primary_key: bool,

    /// Exit with status 4 if any table, batch or database failed
    #[arg(long)]
    pub strict: bool,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    pub summary_json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "ODS_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "ODS_JSON_LOGS")]
    pub json_logs: bool,
}

impl Cli {
    pub fn options(&self) -> ReplicationOptions {
        ReplicationOptions {
            batch_size: usize::try_from(self.batch_size).unwrap_or(usize::MAX),
            connect_timeout: Duration::from_secs(self.connect_timeout),
            query_timeout: Duration::from_secs(self.query_timeout),
            preserve_primary_key: !self.no_primary_key,
        }
    }
}
