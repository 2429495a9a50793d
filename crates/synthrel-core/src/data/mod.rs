//! # Row Values and Table Data
//!
//! A dataset is a map from table name to rows; each row is an `IndexMap`
//! (not `HashMap`) so column insertion order is preserved, which keeps
//! generated output deterministic.

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{Result, SynthError};
use crate::schema::FieldType;

/// A single cell value in a table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Timestamp(NaiveDateTime),
    Uuid(Uuid),
}

/// One table row, with columns in insertion order.
pub type Row = IndexMap<String, Value>;

/// All rows of one table.
pub type TableData = Vec<Row>;

/// A dataset: map from table name to its rows.
pub type Tables = IndexMap<String, TableData>;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of a value, used when a raw column is pulled into a
    /// statistical model. Non-numeric kinds have no numeric view.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Timestamp(ts) => Some(ts.and_utc().timestamp() as f64),
            _ => None,
        }
    }

    /// Key used for grouping and equality joins. Floats are formatted with
    /// ten decimal places, so `1.0` and `1.00000001` stay distinct keys
    /// while anything below that precision collapses into one group.
    pub fn group_key(&self) -> String {
        match self {
            Value::Null => "__NULL__".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format!("{:.10}", f),
            Value::String(s) => s.clone(),
            Value::Timestamp(ts) => ts.to_string(),
            Value::Uuid(u) => u.to_string(),
        }
    }

    /// Cast to a declared field type. `Null` stays `Null`; the finalizer
    /// drops null rows separately.
    pub fn cast_to(&self, ty: &FieldType, table: &str, column: &str) -> Result<Value> {
        let cast_err = || SynthError::TypeCast {
            table: table.to_string(),
            column: column.to_string(),
            value: format!("{}", self),
        };

        if self.is_null() {
            return Ok(Value::Null);
        }

        match ty {
            FieldType::Integer => match self {
                Value::Int(i) => Ok(Value::Int(*i)),
                Value::Float(f) if f.is_finite() => Ok(Value::Int(f.round() as i64)),
                Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
                Value::String(s) => s.parse::<i64>().map(Value::Int).map_err(|_| cast_err()),
                _ => Err(cast_err()),
            },
            FieldType::Float => match self.as_f64() {
                Some(f) => Ok(Value::Float(f)),
                None => match self {
                    Value::String(s) => {
                        s.parse::<f64>().map(Value::Float).map_err(|_| cast_err())
                    }
                    _ => Err(cast_err()),
                },
            },
            FieldType::Boolean => match self {
                Value::Bool(b) => Ok(Value::Bool(*b)),
                Value::Int(i) => Ok(Value::Bool(*i != 0)),
                Value::Float(f) => Ok(Value::Bool(*f >= 0.5)),
                _ => Err(cast_err()),
            },
            FieldType::Text => Ok(Value::String(format!("{}", self))),
            FieldType::Timestamp => match self {
                Value::Timestamp(ts) => Ok(Value::Timestamp(*ts)),
                Value::Float(f) if f.is_finite() => {
                    chrono::DateTime::from_timestamp(f.round() as i64, 0)
                        .map(|dt| Value::Timestamp(dt.naive_utc()))
                        .ok_or_else(cast_err)
                }
                Value::Int(i) => chrono::DateTime::from_timestamp(*i, 0)
                    .map(|dt| Value::Timestamp(dt.naive_utc()))
                    .ok_or_else(cast_err),
                _ => Err(cast_err()),
            },
            FieldType::Uuid => match self {
                Value::Uuid(u) => Ok(Value::Uuid(*u)),
                Value::String(s) => Uuid::parse_str(s).map(Value::Uuid).map_err(|_| cast_err()),
                _ => Err(cast_err()),
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(fl) => write!(f, "{}", fl),
            Value::String(s) => write!(f, "{}", s),
            Value::Timestamp(ts) => write!(f, "{}", ts),
            Value::Uuid(u) => write!(f, "{}", u),
        }
    }
}

/// Remove a column from every row, returning the removed values in row order.
/// Rows missing the column contribute `Null`.
pub fn take_column(rows: &mut TableData, column: &str) -> Vec<Value> {
    rows.iter_mut()
        .map(|row| row.shift_remove(column).unwrap_or(Value::Null))
        .collect()
}

/// Read a column from every row without consuming it.
pub fn column_values<'a>(rows: &'a [Row], column: &str) -> Vec<&'a Value> {
    rows.iter()
        .map(|row| row.get(column).unwrap_or(&Value::Null))
        .collect()
}

/// Write a column into every row, overwriting any existing values.
/// `values` must have one entry per row.
pub fn put_column(rows: &mut TableData, column: &str, values: Vec<Value>) {
    debug_assert_eq!(rows.len(), values.len());
    for (row, value) in rows.iter_mut().zip(values) {
        row.insert(column.to_string(), value);
    }
}

/// The set of column names present across all rows, in first-seen order.
pub fn column_names(rows: &[Row]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !names.iter().any(|n| n == key) {
                names.push(key.clone());
            }
        }
    }
    names
}
