//! Shared test utilities for integration tests.
//!
//! This module provides:
//! - A scripted source catalog that records every call
//! - An in-memory ODS that applies `INSERT IGNORE` semantics on primary keys
//! - Row and schema fixtures

#![allow(dead_code)]

use ods_replicator::config::{ReplicationOptions, ServerConfig};
use ods_replicator::error::{Endpoint, ReplicationError, ReplicationResult};
use ods_replicator::models::{ColumnDefinition, RowRecord, SqlValue, TableSchema};
use ods_replicator::replication::{BatchWriter, Destination, SourceCatalog};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

// =========================================================================
// Fixtures
// =========================================================================

pub fn server(server_id: &str, databases: &[&str]) -> ServerConfig {
    ServerConfig {
        server_id: server_id.to_string(),
        host: format!("{server_id}.internal"),
        port: 3306,
        user: "reader".to_string(),
        password: "secret".to_string(),
        databases: databases.iter().map(|d| d.to_string()).collect(),
    }
}

pub fn options(batch_size: usize) -> ReplicationOptions {
    ReplicationOptions {
        batch_size,
        ..Default::default()
    }
}

/// `orders (id INT PRIMARY KEY, total DECIMAL(10,2))`
pub fn orders_schema() -> TableSchema {
    TableSchema::new(
        "orders",
        vec![
            ColumnDefinition::new("id", "int")
                .with_nullable(false)
                .with_primary_key(true),
            ColumnDefinition::new("total", "decimal(10,2)"),
        ],
    )
}

/// `count` order rows with ids `1..=count`, sharing one column list.
pub fn orders_rows(count: usize) -> Vec<RowRecord> {
    id_rows(&["id", "total"], count, |i| {
        vec![
            SqlValue::Int(i as i64),
            SqlValue::Text(format!("{}.{:02}", i * 3, i % 100)),
        ]
    })
}

pub fn id_rows(
    names: &[&str],
    count: usize,
    values: impl Fn(usize) -> Vec<SqlValue>,
) -> Vec<RowRecord> {
    let columns: Arc<[String]> = names.iter().map(|n| n.to_string()).collect();
    (1..=count)
        .map(|i| RowRecord::new(Arc::clone(&columns), values(i)).unwrap())
        .collect()
}

/// Integer value of `column`, for ordering assertions.
pub fn int_of(row: &RowRecord, column: &str) -> i64 {
    match row.get(column) {
        Some(SqlValue::Int(v)) => *v,
        other => panic!("column {column} is not an int: {other:?}"),
    }
}

// =========================================================================
// Source
// =========================================================================

/// A recorded source call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceCall {
    ListTables { server_id: String, database: String },
    Describe { database: String, table: String },
    Fetch { database: String, table: String },
}

/// One scripted source table.
#[derive(Debug, Clone)]
pub struct MockTable {
    pub name: String,
    /// `None` makes DESCRIBE fail.
    pub schema: Option<TableSchema>,
    pub rows: Vec<RowRecord>,
    pub fetch_fails: bool,
    /// DESCRIBE fails with a source connection error.
    pub connection_lost: bool,
}

impl MockTable {
    pub fn new(schema: TableSchema, rows: Vec<RowRecord>) -> Self {
        Self {
            name: schema.table_name.clone(),
            schema: Some(schema),
            rows,
            fetch_fails: false,
            connection_lost: false,
        }
    }

    pub fn undescribable(name: &str) -> Self {
        Self {
            name: name.to_string(),
            schema: None,
            rows: Vec::new(),
            fetch_fails: false,
            connection_lost: false,
        }
    }

    pub fn with_fetch_failure(mut self) -> Self {
        self.fetch_fails = true;
        self
    }

    pub fn with_connection_lost(mut self) -> Self {
        self.connection_lost = true;
        self
    }
}

/// Scripted source servers. Unknown databases list no tables.
#[derive(Default)]
pub struct MockSource {
    tables: HashMap<(String, String), Vec<MockTable>>,
    list_failures: HashSet<(String, String)>,
    calls: Mutex<Vec<SourceCall>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, server_id: &str, database: &str, table: MockTable) -> Self {
        self.tables
            .entry((server_id.to_string(), database.to_string()))
            .or_default()
            .push(table);
        self
    }

    pub fn with_list_failure(mut self, server_id: &str, database: &str) -> Self {
        self.list_failures
            .insert((server_id.to_string(), database.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<SourceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fetched_tables(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SourceCall::Fetch { table, .. } => Some(table),
                _ => None,
            })
            .collect()
    }

    fn table(&self, server: &ServerConfig, database: &str, table: &str) -> Option<&MockTable> {
        self.tables
            .get(&(server.server_id.clone(), database.to_string()))
            .and_then(|tables| tables.iter().find(|t| t.name == table))
    }

    fn record(&self, call: SourceCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl SourceCatalog for MockSource {
    async fn list_tables(
        &self,
        server: &ServerConfig,
        database: &str,
    ) -> ReplicationResult<Vec<String>> {
        self.record(SourceCall::ListTables {
            server_id: server.server_id.clone(),
            database: database.to_string(),
        });
        let key = (server.server_id.clone(), database.to_string());
        if self.list_failures.contains(&key) {
            return Err(ReplicationError::introspection(
                database,
                "Access denied for user 'reader'",
            ));
        }
        Ok(self
            .tables
            .get(&key)
            .map(|tables| tables.iter().map(|t| t.name.clone()).collect())
            .unwrap_or_default())
    }

    async fn describe_table(
        &self,
        server: &ServerConfig,
        database: &str,
        table: &str,
    ) -> ReplicationResult<TableSchema> {
        self.record(SourceCall::Describe {
            database: database.to_string(),
            table: table.to_string(),
        });
        let Some(mock) = self.table(server, database, table) else {
            return Err(ReplicationError::describe(table, "no such table"));
        };
        if mock.connection_lost {
            return Err(ReplicationError::connection(
                Endpoint::Source,
                format!("{}:{}", server.host, server.port),
                "Lost connection to MySQL server",
                "",
            ));
        }
        mock.schema
            .clone()
            .ok_or_else(|| ReplicationError::describe(table, "Incorrect table definition"))
    }

    async fn fetch_rows(
        &self,
        server: &ServerConfig,
        database: &str,
        table: &str,
    ) -> ReplicationResult<Vec<RowRecord>> {
        self.record(SourceCall::Fetch {
            database: database.to_string(),
            table: table.to_string(),
        });
        match self.table(server, database, table) {
            Some(mock) if mock.fetch_fails => {
                Err(ReplicationError::fetch(table, "Got error 28 from storage engine"))
            }
            Some(mock) => Ok(mock.rows.clone()),
            None => Err(ReplicationError::fetch(table, "no such table")),
        }
    }
}

// =========================================================================
// ODS
// =========================================================================

/// A recorded `write_batch` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCall {
    pub database: String,
    pub table: String,
    pub batch_no: usize,
    pub rows: usize,
    pub committed: bool,
}

#[derive(Debug, Default)]
pub struct OdsTable {
    pub schema: Option<TableSchema>,
    pub rows: Vec<RowRecord>,
    keys: HashSet<Vec<String>>,
}

impl OdsTable {
    fn key_columns(&self) -> Vec<String> {
        self.schema
            .as_ref()
            .map(|s| s.primary_key().into_iter().map(String::from).collect())
            .unwrap_or_default()
    }

    /// `INSERT IGNORE` one row; returns whether it was inserted.
    fn insert_ignore(&mut self, row: &RowRecord) -> bool {
        let key_columns = self.key_columns();
        if !key_columns.is_empty() {
            let key = key_columns
                .iter()
                .map(|c| format!("{:?}", row.get(c)))
                .collect::<Vec<_>>();
            if !self.keys.insert(key) {
                return false;
            }
        }
        self.rows.push(row.clone());
        true
    }
}

#[derive(Debug, Default)]
pub struct OdsState {
    /// Databases in creation order.
    pub databases: Vec<String>,
    pub tables: BTreeMap<(String, String), OdsTable>,
    pub batches: Vec<BatchCall>,
    pub ensure_database_calls: usize,
    pub writers_opened: usize,
    pub writers_closed: usize,
}

/// In-memory ODS. Cloning shares the stored state, so a second run can
/// reload into the same tables.
#[derive(Clone, Default)]
pub struct MockOds {
    state: Arc<Mutex<OdsState>>,
    unreachable: bool,
    failing_databases: HashSet<String>,
    failing_tables: HashSet<String>,
    failing_batches: HashSet<(String, usize)>,
}

impl MockOds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with an ODS connection error.
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    pub fn with_failing_database(mut self, name: &str) -> Self {
        self.failing_databases.insert(name.to_string());
        self
    }

    pub fn with_failing_table(mut self, table: &str) -> Self {
        self.failing_tables.insert(table.to_string());
        self
    }

    pub fn with_failing_batch(mut self, table: &str, batch_no: usize) -> Self {
        self.failing_batches.insert((table.to_string(), batch_no));
        self
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, OdsState> {
        self.state.lock().unwrap()
    }

    pub fn table_rows(&self, database: &str, table: &str) -> Vec<RowRecord> {
        self.state()
            .tables
            .get(&(database.to_string(), table.to_string()))
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn has_table(&self, database: &str, table: &str) -> bool {
        self.state()
            .tables
            .contains_key(&(database.to_string(), table.to_string()))
    }

    pub fn batches(&self) -> Vec<BatchCall> {
        self.state().batches.clone()
    }

    fn check_reachable(&self) -> ReplicationResult<()> {
        if self.unreachable {
            return Err(ReplicationError::connection(
                Endpoint::Ods,
                "ods.internal:3306",
                "Connection refused",
                "Check that the MySQL server is running and accessible",
            ));
        }
        Ok(())
    }
}

impl Destination for MockOds {
    type Writer = MockWriter;

    async fn ensure_database(&self, name: &str) -> ReplicationResult<()> {
        self.check_reachable()?;
        let mut state = self.state();
        state.ensure_database_calls += 1;
        if self.failing_databases.contains(name) {
            return Err(ReplicationError::provision(
                format!("database `{name}`"),
                "Access denied",
            ));
        }
        if !state.databases.iter().any(|d| d == name) {
            state.databases.push(name.to_string());
        }
        Ok(())
    }

    async fn ensure_table(&self, database: &str, schema: &TableSchema) -> ReplicationResult<()> {
        self.check_reachable()?;
        if self.failing_tables.contains(&schema.table_name) {
            return Err(ReplicationError::provision(
                format!("table `{database}`.`{}`", schema.table_name),
                "Unknown data type",
            ));
        }
        let mut state = self.state();
        if !state.databases.iter().any(|d| d == database) {
            return Err(ReplicationError::provision(
                format!("table `{database}`.`{}`", schema.table_name),
                format!("Unknown database '{database}'"),
            ));
        }
        state
            .tables
            .entry((database.to_string(), schema.table_name.clone()))
            .or_insert_with(|| OdsTable {
                schema: Some(schema.clone()),
                ..Default::default()
            });
        Ok(())
    }

    async fn open_writer(
        &self,
        database: &str,
        table: &str,
        columns: &[String],
    ) -> ReplicationResult<MockWriter> {
        self.check_reachable()?;
        assert!(!columns.is_empty(), "writer opened without columns");
        self.state().writers_opened += 1;
        Ok(MockWriter {
            state: Arc::clone(&self.state),
            database: database.to_string(),
            table: table.to_string(),
            failing_batches: self
                .failing_batches
                .iter()
                .filter(|(t, _)| t == table)
                .map(|(_, n)| *n)
                .collect(),
        })
    }
}

pub struct MockWriter {
    state: Arc<Mutex<OdsState>>,
    database: String,
    table: String,
    failing_batches: HashSet<usize>,
}

impl BatchWriter for MockWriter {
    async fn write_batch(&mut self, batch_no: usize, rows: &[RowRecord]) -> ReplicationResult<u64> {
        let mut state = self.state.lock().unwrap();
        let fails = self.failing_batches.contains(&batch_no);
        state.batches.push(BatchCall {
            database: self.database.clone(),
            table: self.table.clone(),
            batch_no,
            rows: rows.len(),
            committed: !fails,
        });
        if fails {
            return Err(ReplicationError::batch_insert(
                &self.table,
                batch_no,
                rows.len(),
                "Deadlock found when trying to get lock",
            ));
        }

        let table = state
            .tables
            .entry((self.database.clone(), self.table.clone()))
            .or_default();
        let inserted = rows.iter().filter(|row| table.insert_ignore(row)).count();
        Ok(inserted as u64)
    }

    async fn close(self) {
        self.state.lock().unwrap().writers_closed += 1;
    }
}
