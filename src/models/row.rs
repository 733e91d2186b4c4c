//! Rows fetched from a source table.

use serde::Serialize;
use std::sync::Arc;

/// A scalar value read from a source row.
///
/// DECIMAL, temporal, ENUM/SET and JSON columns travel as `Text` exactly as
/// the server rendered them, so nothing is lost on the way to the ODS.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this value for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// One source row: values in the query's native field order.
///
/// Rows produced by the same query share one column list, so checking that
/// a batch is homogeneous is usually a pointer comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct RowRecord {
    columns: Arc<[String]>,
    values: Vec<SqlValue>,
}

impl RowRecord {
    /// Build a row. Fails when the value count does not match the column count.
    pub fn new(columns: Arc<[String]>, values: Vec<SqlValue>) -> Result<Self, String> {
        if columns.len() != values.len() {
            return Err(format!(
                "row has {} values for {} columns",
                values.len(),
                columns.len()
            ));
        }
        Ok(Self { columns, values })
    }

    pub fn columns(&self) -> &Arc<[String]> {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }

    /// Same column names in the same order as `other`.
    pub fn same_shape(&self, other: &RowRecord) -> bool {
        Arc::ptr_eq(&self.columns, &other.columns) || self.columns == other.columns
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}
