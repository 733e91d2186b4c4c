//! Connection management.
//!
//! Every operation opens its own MySQL connection, uses it, and releases it.
//! Nothing is pooled or shared: the replicator works one table at a time and
//! a short-lived connection per step keeps failure scopes isolated.

use crate::config::ConnectionSettings;
use crate::error::{Endpoint, ReplicationError, ReplicationResult};
use futures_util::{Stream, TryStreamExt};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{ConnectOptions, Connection};
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Why a single statement did not produce a result.
#[derive(Debug, Error)]
pub enum QueryFailure {
    #[error(transparent)]
    Sql(#[from] sqlx::Error),

    #[error("statement timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
}

impl QueryFailure {
    /// Map into the error taxonomy. A timeout keeps the scope of the
    /// statement it interrupted; the caller supplies the mapping for the rest.
    pub fn into_error(
        self,
        operation: impl Into<String>,
        on_sql: impl FnOnce(sqlx::Error) -> ReplicationError,
    ) -> ReplicationError {
        match self {
            Self::Sql(e) => on_sql(e),
            Self::TimedOut(limit) => ReplicationError::timeout(operation, limit.as_secs()),
        }
    }
}

/// Run one statement future under a deadline.
pub async fn timed<T, F>(limit: Duration, fut: F) -> Result<T, QueryFailure>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match timeout(limit, fut).await {
        Ok(result) => result.map_err(QueryFailure::from),
        Err(_) => Err(QueryFailure::TimedOut(limit)),
    }
}

/// Wait for the next item of a result stream under a deadline.
///
/// The limit covers a single wait, so a long read that keeps delivering rows
/// is never cut off; only a stalled one is.
pub async fn next_timed<S, T>(limit: Duration, stream: &mut S) -> Result<Option<T>, QueryFailure>
where
    S: Stream<Item = Result<T, sqlx::Error>> + Unpin,
{
    timed(limit, stream.try_next()).await
}

/// Opens connections to one side of the replication.
#[derive(Debug, Clone)]
pub struct ConnectionProvider {
    endpoint: Endpoint,
    connect_timeout: Duration,
}

impl ConnectionProvider {
    pub fn new(endpoint: Endpoint, connect_timeout: Duration) -> Self {
        Self {
            endpoint,
            connect_timeout,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Connection options for `settings`, optionally selecting a default database.
    pub fn connect_options(
        settings: &ConnectionSettings,
        database: Option<&str>,
    ) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .username(&settings.user)
            .password(&settings.password)
            .charset("utf8mb4");
        if let Some(db) = database {
            options = options.database(db);
        }
        options
    }

    /// Open a connection. Fails with a `Connection` error when the server is
    /// unreachable, rejects the credentials, or does not answer in time.
    pub async fn open(
        &self,
        settings: &ConnectionSettings,
        database: Option<&str>,
    ) -> ReplicationResult<ScopedConnection> {
        let target = settings.address();
        let options = Self::connect_options(settings, database);

        debug!(
            endpoint = %self.endpoint,
            target = %target,
            database = ?database,
            "Opening connection"
        );

        let conn = match timeout(self.connect_timeout, options.connect()).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                return Err(ReplicationError::connection(
                    self.endpoint,
                    target,
                    &e,
                    connection_suggestion(&e),
                ));
            }
            Err(_) => {
                return Err(ReplicationError::connection(
                    self.endpoint,
                    target,
                    format!(
                        "no response within {}s",
                        self.connect_timeout.as_secs()
                    ),
                    "Check that the server is reachable or raise --connect-timeout",
                ));
            }
        };

        Ok(ScopedConnection { conn, target })
    }
}

/// A connection owned by exactly one operation.
///
/// Call [`ScopedConnection::release`] on the normal path for a graceful
/// `COM_QUIT`; on any other path dropping the guard closes the socket.
pub struct ScopedConnection {
    conn: MySqlConnection,
    target: String,
}

impl std::fmt::Debug for ScopedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedConnection")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl ScopedConnection {
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Close the connection gracefully.
    pub async fn release(self) {
        let target = self.target;
        if let Err(e) = self.conn.close().await {
            warn!(target = %target, error = %e, "Connection did not close cleanly");
        }
    }
}

impl Deref for ScopedConnection {
    type Target = MySqlConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl DerefMut for ScopedConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

/// Generate a helpful suggestion for connection errors.
pub fn connection_suggestion(error: &sqlx::Error) -> String {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") {
        return "Check that the MySQL server is running and accessible".to_string();
    }

    if error_str.contains("access denied")
        || error_str.contains("authentication")
        || error_str.contains("password")
    {
        return "Verify the user and password in the configuration file".to_string();
    }

    if error_str.contains("unknown database") || error_str.contains("does not exist") {
        return "Check that the database name exists on the server".to_string();
    }

    if error_str.contains("tls") || error_str.contains("ssl") {
        return "Check TLS/SSL configuration or try disabling it".to_string();
    }

    "Verify host, port and credentials in the configuration file".to_string()
}
