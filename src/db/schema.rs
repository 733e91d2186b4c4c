//! Schema introspection and row reads against a source server.
//!
//! Every statement here runs over the text protocol (no prepared
//! statements), which is what `SHOW TABLES` and `DESCRIBE` require and what
//! lets row values fall back to the server's own text rendering.

use crate::db::connection::{QueryFailure, next_timed, timed};
use crate::db::identifier::quote;
use crate::db::values::{column_names, decode_row};
use crate::error::{ReplicationError, ReplicationResult};
use crate::models::{ColumnDefinition, RowRecord, TableSchema};
use sqlx::mysql::{MySqlConnection, MySqlRow};
use sqlx::{Executor, Row};
use std::time::Duration;
use tracing::{debug, warn};

mod queries {
    pub const LIST_TABLES: &str = "SHOW TABLES";

    // DESCRIBE result columns, by position
    pub const FIELD: usize = 0;
    pub const TYPE: usize = 1;
    pub const NULL: usize = 2;
    pub const KEY: usize = 3;
}

/// Safely get a string from a MySQL row by index.
/// Metadata columns come back as VARBINARY on some server configurations.
fn get_string_by_index(row: &MySqlRow, index: usize) -> Option<String> {
    row.try_get::<String, _>(index).ok().or_else(|| {
        row.try_get::<Vec<u8>, _>(index)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
    })
}

/// Introspection of a source database over an open connection.
pub struct SchemaInspector;

impl SchemaInspector {
    /// Table names in the server's native `SHOW TABLES` order.
    pub async fn list_tables(
        conn: &mut MySqlConnection,
        database: &str,
        query_timeout: Duration,
    ) -> ReplicationResult<Vec<String>> {
        let rows = timed(query_timeout, conn.fetch_all(queries::LIST_TABLES))
            .await
            .map_err(|e| {
                e.into_error(format!("SHOW TABLES in {database}"), |e| {
                    ReplicationError::introspection(database, e)
                })
            })?;

        let tables = table_names(database, rows.iter().map(|row| get_string_by_index(row, 0)));

        debug!(database = %database, count = tables.len(), "Listed MySQL tables");
        Ok(tables)
    }

    /// Describe a table's columns in ordinal order.
    ///
    /// A table that yields no columns counts as a describe failure.
    pub async fn describe_table(
        conn: &mut MySqlConnection,
        table_name: &str,
        query_timeout: Duration,
    ) -> ReplicationResult<TableSchema> {
        let sql = format!("DESCRIBE {}", quote(table_name)?);
        let rows = timed(query_timeout, conn.fetch_all(sql.as_str()))
            .await
            .map_err(|e| e.into_error(&sql, |e| ReplicationError::describe(table_name, e)))?;

        let columns = rows
            .iter()
            .map(|row| parse_describe_row(row, table_name))
            .collect::<ReplicationResult<Vec<_>>>()?;

        if columns.is_empty() {
            return Err(ReplicationError::describe(
                table_name,
                "table reported no columns",
            ));
        }

        debug!(
            table = %table_name,
            columns = columns.len(),
            "Described MySQL table"
        );
        Ok(TableSchema::new(table_name, columns))
    }

    /// `SELECT * FROM <table>`, decoded in the query's field order.
    ///
    /// `query_timeout` bounds each wait for the next row, not the whole read.
    pub async fn fetch_rows(
        conn: &mut MySqlConnection,
        table_name: &str,
        query_timeout: Duration,
    ) -> ReplicationResult<Vec<RowRecord>> {
        let sql = format!("SELECT * FROM {}", quote(table_name)?);
        let on_failure =
            |e: QueryFailure| e.into_error(&sql, |e| ReplicationError::fetch(table_name, e));

        let mut stream = conn.fetch(sql.as_str());
        let mut columns = None;
        let mut rows = Vec::new();
        while let Some(row) = next_timed(query_timeout, &mut stream)
            .await
            .map_err(on_failure)?
        {
            let names = columns.get_or_insert_with(|| column_names(&row));
            rows.push(decode_row(&row, names).map_err(|e| ReplicationError::fetch(table_name, e))?);
        }

        debug!(table = %table_name, rows = rows.len(), "Fetched source rows");
        Ok(rows)
    }
}

/// Keep the decodable `SHOW TABLES` names in order; log the rest.
fn table_names(database: &str, names: impl Iterator<Item = Option<String>>) -> Vec<String> {
    let mut tables = Vec::new();
    for (position, name) in names.enumerate() {
        match name {
            Some(name) if !name.is_empty() => tables.push(name),
            _ => warn!(
                database = %database,
                position = position + 1,
                "Skipping table whose name could not be read"
            ),
        }
    }
    tables
}

fn parse_describe_row(row: &MySqlRow, table_name: &str) -> ReplicationResult<ColumnDefinition> {
    let name = get_string_by_index(row, queries::FIELD).filter(|s| !s.is_empty());
    let column_type = get_string_by_index(row, queries::TYPE).filter(|s| !s.is_empty());

    let (Some(name), Some(column_type)) = (name, column_type) else {
        return Err(ReplicationError::describe(
            table_name,
            "DESCRIBE returned a row without a field name or type",
        ));
    };

    let nullable = get_string_by_index(row, queries::NULL)
        .is_some_and(|v| v.eq_ignore_ascii_case("YES"));
    let key = get_string_by_index(row, queries::KEY).unwrap_or_default();

    Ok(ColumnDefinition::new(name, column_type)
        .with_nullable(nullable)
        .with_primary_key(key.eq_ignore_ascii_case("PRI")))
}
