//! Value and row types shared by drivers and the pool

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A database value as produced by a driver cursor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int64(i64),
    /// 32-bit floating point
    Float32(f32),
    /// 64-bit floating point
    Float64(f64),
    /// Decimal/Numeric (stored as string for precision)
    Decimal(String),
    /// UTF-8 string
    String(String),
    /// Binary data
    Bytes(Vec<u8>),
    /// Date (year, month, day)
    Date(NaiveDate),
    /// DateTime without timezone
    DateTime(NaiveDateTime),
}

impl Value {
    /// Check if the value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            Value::String(s) => s.parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Try to get as f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float32(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            Value::Decimal(s) | Value::String(s) => s.parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Try to get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            Value::Int64(v) => Some(*v != 0),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float32(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::Decimal(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::Date(v) => write!(f, "{}", v),
            Value::DateTime(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

/// Column description reported by a driver cursor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescription {
    /// Column name as the server reported it (may be empty or numeric)
    pub name: String,
    /// Database-specific type name
    pub data_type: String,
}

impl ColumnDescription {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Build addressable column names from a cursor description.
///
/// Empty names, purely numeric names (`"1"`, `"42"`) and names that repeat an
/// earlier column are replaced by `col<i>`, where `i` is the zero-based
/// position of the column. When `col<i>` is itself a real column name, a
/// suffix is appended (`col<i>_1`, `col<i>_2`, ...) until the name is unique.
pub fn normalize_column_names(description: &[ColumnDescription]) -> Vec<String> {
    let mut kept: Vec<Option<&str>> = Vec::with_capacity(description.len());
    let mut taken: HashSet<String> = HashSet::with_capacity(description.len());
    for column in description {
        let name = column.name.as_str();
        let numeric = !name.is_empty() && name.chars().all(|c| c.is_ascii_digit());
        if name.is_empty() || numeric || taken.contains(name) {
            kept.push(None);
        } else {
            taken.insert(name.to_string());
            kept.push(Some(name));
        }
    }

    kept.into_iter()
        .enumerate()
        .map(|(idx, name)| match name {
            Some(name) => name.to_string(),
            None => {
                let base = format!("col{}", idx);
                let mut candidate = base.clone();
                let mut suffix = 0;
                while taken.contains(&candidate) {
                    suffix += 1;
                    candidate = format!("{}_{}", base, suffix);
                }
                taken.insert(candidate.clone());
                candidate
            }
        })
        .collect()
}

/// A single record of a query result, addressable by position or column name
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Column names (shared between all rows of a result)
    columns: Arc<[String]>,
    /// Column values
    values: Vec<Value>,
}

impl Row {
    /// Create a new row
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Get a value by column index
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get a value by column name
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Get column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Get column values in column order
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over `(column, value)` pairs in column order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Convert to a HashMap
    pub fn to_map(&self) -> HashMap<String, Value> {
        self.columns
            .iter()
            .zip(self.values.iter())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl std::ops::Index<usize> for Row {
    type Output = Value;

    fn index(&self, index: usize) -> &Self::Output {
        &self.values[index]
    }
}

impl std::ops::Index<&str> for Row {
    type Output = Value;

    fn index(&self, name: &str) -> &Self::Output {
        match self.get_by_name(name) {
            Some(value) => value,
            None => panic!("no column named `{}` in row", name),
        }
    }
}
