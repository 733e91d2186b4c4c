//! Value conversion between MySQL rows and [`SqlValue`].
//!
//! # Architecture
//!
//! Conversion uses a two-phase approach:
//! 1. `categorize_type` classifies the reported column type
//! 2. a decoder for that category extracts the value, falling back to the
//!    raw text the server sent when the typed decode does not fit
//!
//! Source rows are read over the text protocol, so the fallback always
//! has something to work with.

use crate::models::{RowRecord, SqlValue};
use sqlx::mysql::{MySql, MySqlRow};
use sqlx::query_builder::Separated;
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::sync::Arc;

/// Logical category for MySQL column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Binary,
    /// Everything the server renders as text: strings, DECIMAL, dates, JSON, ENUM.
    Text,
}

/// Classify a MySQL type name into a logical category.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Binary and text-blob names overlap with "tiny"/"int" checks below
    if lower.contains("text") || lower.contains("char") {
        return TypeCategory::Text;
    }
    if lower.contains("blob") || lower.contains("binary") || lower == "bit" {
        return TypeCategory::Binary;
    }

    // DECIMAL keeps its exact string form
    if lower.contains("decimal") || lower.contains("numeric") {
        return TypeCategory::Text;
    }

    if lower.contains("int") && !lower.contains("point") {
        return TypeCategory::Integer;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    TypeCategory::Text
}

/// Column names of a result row, shared by every row of the same query.
pub fn column_names(row: &MySqlRow) -> Arc<[String]> {
    row.columns().iter().map(|c| c.name().to_string()).collect()
}

/// Convert one MySQL row into a [`RowRecord`] over `columns`.
pub fn decode_row(row: &MySqlRow, columns: &Arc<[String]>) -> Result<RowRecord, String> {
    let values = row
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let category = categorize_type(col.type_info().name());
            decode_column(row, idx, category)
        })
        .collect();
    RowRecord::new(Arc::clone(columns), values)
}

fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> SqlValue {
    match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return SqlValue::Null,
        Ok(_) => {}
        Err(e) => {
            tracing::error!(column = idx, error = %e, "Failed to read column");
            return SqlValue::Null;
        }
    }

    match category {
        TypeCategory::Integer => decode_integer(row, idx),
        TypeCategory::Float => decode_float(row, idx),
        TypeCategory::Binary => decode_bytes(row, idx),
        TypeCategory::Text => decode_text(row, idx),
    }
}

fn decode_integer(row: &MySqlRow, idx: usize) -> SqlValue {
    if let Ok(v) = row.try_get::<i64, _>(idx) {
        return SqlValue::Int(v);
    }
    // BIGINT UNSIGNED above i64::MAX, or any other unsigned width
    if let Ok(v) = row.try_get::<u64, _>(idx) {
        return SqlValue::UInt(v);
    }
    decode_text(row, idx)
}

fn decode_float(row: &MySqlRow, idx: usize) -> SqlValue {
    if let Ok(v) = row.try_get::<f64, _>(idx) {
        return SqlValue::Float(v);
    }
    if let Ok(v) = row.try_get::<f32, _>(idx) {
        return SqlValue::Float(f64::from(v));
    }
    decode_text(row, idx)
}

fn decode_bytes(row: &MySqlRow, idx: usize) -> SqlValue {
    row.try_get_unchecked::<Vec<u8>, _>(idx)
        .map(SqlValue::Bytes)
        .unwrap_or(SqlValue::Null)
}

fn decode_text(row: &MySqlRow, idx: usize) -> SqlValue {
    match row.try_get_unchecked::<String, _>(idx) {
        Ok(v) => SqlValue::Text(v),
        // Not valid UTF-8: keep the bytes untouched
        Err(_) => decode_bytes(row, idx),
    }
}

/// Bind a value as the next placeholder of a `VALUES (...)` tuple.
pub fn push_value<'args>(
    tuple: &mut Separated<'_, 'args, MySql, &'static str>,
    value: &SqlValue,
) {
    match value {
        SqlValue::Null => tuple.push_bind(None::<String>),
        SqlValue::Int(v) => tuple.push_bind(*v),
        SqlValue::UInt(v) => tuple.push_bind(*v),
        SqlValue::Float(v) => tuple.push_bind(*v),
        SqlValue::Text(v) => tuple.push_bind(v.clone()),
        SqlValue::Bytes(v) => tuple.push_bind(v.clone()),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_integers() {
        for name in ["INT", "BIGINT", "BIGINT UNSIGNED", "TINYINT", "SMALLINT", "MEDIUMINT"] {
            assert_eq!(categorize_type(name), TypeCategory::Integer, "{name}");
        }
    }

    #[test]
    fn test_categorize_text_like() {
        for name in [
            "VARCHAR", "CHAR", "TEXT", "TINYTEXT", "DECIMAL", "DATETIME", "DATE", "TIME",
            "TIMESTAMP", "JSON", "ENUM", "SET", "YEAR",
        ] {
            assert_eq!(categorize_type(name), TypeCategory::Text, "{name}");
        }
    }

    #[test]
    fn test_categorize_binary() {
        for name in ["BLOB", "TINYBLOB", "LONGBLOB", "VARBINARY", "BINARY", "BIT"] {
            assert_eq!(categorize_type(name), TypeCategory::Binary, "{name}");
        }
    }

    #[test]
    fn test_categorize_float() {
        assert_eq!(categorize_type("DOUBLE"), TypeCategory::Float);
        assert_eq!(categorize_type("FLOAT"), TypeCategory::Float);
    }

    #[test]
    fn test_push_value_binds_each_placeholder() {
        let mut builder =
            sqlx::QueryBuilder::<MySql>::new("INSERT IGNORE INTO `t` (`a`, `b`, `c`) ");
        let values = vec![
            vec![SqlValue::Int(1), SqlValue::Text("x".into()), SqlValue::Null],
            vec![SqlValue::UInt(2), SqlValue::Bytes(vec![0, 1]), SqlValue::Float(1.5)],
        ];
        builder.push_values(values.iter(), |mut tuple, row| {
            for value in row {
                push_value(&mut tuple, value);
            }
        });
        assert_eq!(
            builder.sql(),
            "INSERT IGNORE INTO `t` (`a`, `b`, `c`) VALUES (?, ?, ?), (?, ?, ?)"
        );
    }
}
