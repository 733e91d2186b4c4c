//! SQL text for the ODS side.
//!
//! Only identifiers are spliced into these statements, always quoted; row
//! values are bound as parameters.

use crate::db::identifier::{check_column_type, qualified, quote};
use crate::error::{ReplicationError, ReplicationResult};
use crate::models::{ColumnDefinition, TableSchema};
use std::ops::Range;

/// Upper bound on `?` placeholders in one MySQL prepared statement.
pub const MAX_PLACEHOLDERS: usize = 65_535;

/// InnoDB index key prefix limit (DYNAMIC/COMPRESSED row formats).
pub const MAX_KEY_BYTES: usize = 3072;

/// Bytes a column contributes to an index key, or `None` if it cannot be
/// indexed without a prefix length. Character lengths assume utf8mb4.
fn key_width(column: &ColumnDefinition) -> Option<usize> {
    let lower = column.column_type.trim().to_lowercase();
    if lower.contains("text") || lower.contains("blob") || lower.starts_with("json") {
        return None;
    }

    let base = lower.split(['(', ' ']).next().unwrap_or_default();
    let length = lower
        .split_once('(')
        .and_then(|(_, rest)| rest.split_once(')'))
        .and_then(|(n, _)| n.trim().parse::<usize>().ok());

    Some(match base {
        "char" | "varchar" => length.unwrap_or(1) * 4,
        "binary" | "varbinary" => length.unwrap_or(1),
        _ => 8,
    })
}

/// Whether the key columns fit in one index without prefix lengths.
fn key_fits(columns: &[&ColumnDefinition]) -> bool {
    columns
        .iter()
        .try_fold(0usize, |total, c| key_width(c).map(|w| total + w))
        .is_some_and(|total| total <= MAX_KEY_BYTES)
}

/// `CREATE DATABASE IF NOT EXISTS`.
pub fn create_database(name: &str) -> ReplicationResult<String> {
    Ok(format!("CREATE DATABASE IF NOT EXISTS {}", quote(name)?))
}

/// `CREATE TABLE IF NOT EXISTS` with the source column types copied verbatim.
///
/// With `with_primary_key`, source `PRI` columns become the table's primary
/// key, unless the key needs a prefix length: a TEXT/BLOB column, or
/// char/binary columns wider than [`MAX_KEY_BYTES`] together. `DESCRIBE`
/// does not report the source prefix, so such tables get no key.
pub fn create_table(
    database: &str,
    schema: &TableSchema,
    with_primary_key: bool,
) -> ReplicationResult<String> {
    if schema.is_empty() {
        return Err(ReplicationError::invalid_input(format!(
            "table '{}' has no columns",
            schema.table_name
        )));
    }

    let mut definitions = Vec::with_capacity(schema.columns.len() + 1);
    for column in &schema.columns {
        check_column_type(&column.name, &column.column_type)?;
        definitions.push(format!(
            "{} {}",
            quote(&column.name)?,
            column.column_type.trim()
        ));
    }

    if with_primary_key {
        let key_columns: Vec<_> = schema
            .columns
            .iter()
            .filter(|c| c.is_primary_key)
            .collect();
        if !key_columns.is_empty() && key_fits(&key_columns) {
            let names = key_columns
                .iter()
                .map(|c| quote(&c.name))
                .collect::<ReplicationResult<Vec<_>>>()?;
            definitions.push(format!("PRIMARY KEY ({})", names.join(", ")));
        }
    }

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        qualified(database, &schema.table_name)?,
        definitions.join(", ")
    ))
}

/// `INSERT IGNORE INTO db.table (cols) ` - the caller appends `VALUES`.
pub fn insert_ignore_prefix(
    database: &str,
    table: &str,
    columns: &[String],
) -> ReplicationResult<String> {
    if columns.is_empty() {
        return Err(ReplicationError::invalid_input(format!(
            "cannot insert into '{table}' without columns"
        )));
    }
    let names = columns
        .iter()
        .map(|c| quote(c))
        .collect::<ReplicationResult<Vec<_>>>()?;
    Ok(format!(
        "INSERT IGNORE INTO {} ({}) ",
        qualified(database, table)?,
        names.join(", ")
    ))
}

/// How many rows fit in one multi-row `INSERT` without exceeding the
/// placeholder limit.
pub fn rows_per_statement(column_count: usize) -> usize {
    (MAX_PLACEHOLDERS / column_count.max(1)).max(1)
}

/// Row ranges of one batch, one per `INSERT` statement, so that no statement
/// binds more than [`MAX_PLACEHOLDERS`] values. Ranges are contiguous and in
/// row order.
pub fn statement_ranges(row_count: usize, column_count: usize) -> Vec<Range<usize>> {
    let step = rows_per_statement(column_count);
    (0..row_count)
        .step_by(step)
        .map(|start| start..(start + step).min(row_count))
        .collect()
}
