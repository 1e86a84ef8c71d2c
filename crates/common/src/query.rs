//! Opaque query and result model
//!
//! The protocol treats a query and its result as typed but opaque values:
//! nothing here parses SQL or knows about storage layout. The storage
//! engine behind the service is the only component that interprets them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A typed value inside a row or bind variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

/// Column type tag carried in result metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Int64,
    Uint64,
    Float64,
    VarChar,
    VarBinary,
}

/// Result-set column metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub column_type: ColumnType,
}

impl Field {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// A SQL statement plus its bind variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundQuery {
    pub sql: String,
    pub bind_variables: HashMap<String, Value>,
}

impl BoundQuery {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            bind_variables: HashMap::new(),
        }
    }

    pub fn bind(mut self, name: impl Into<String>, value: Value) -> Self {
        self.bind_variables.insert(name.into(), value);
        self
    }
}

/// The result of executing one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub fields: Vec<Field>,
    pub rows: Vec<Vec<Value>>,
    pub rows_affected: u64,
    pub insert_id: u64,
}

impl QueryResult {
    /// A result carrying only column metadata. The first packet of a
    /// streaming result is always one of these; row packets follow.
    pub fn fields_only(fields: Vec<Field>) -> Self {
        Self {
            fields,
            ..Default::default()
        }
    }

    /// A result carrying only rows, for the follow-up packets of a
    /// streaming result.
    pub fn rows_only(rows: Vec<Vec<Value>>) -> Self {
        Self {
            rows,
            ..Default::default()
        }
    }
}

/// Transaction isolation requested at `Begin`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IsolationLevel {
    #[default]
    Default,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

/// Declared workload class, used for admission decisions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Workload {
    #[default]
    Unspecified,
    Oltp,
    Olap,
    Dba,
}

/// Per-call execution options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecuteOptions {
    pub isolation: IsolationLevel,
    pub workload: Workload,
}

/// Half-open range `[start, end)` over the split column. `None` means
/// unbounded on that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRange {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl KeyRange {
    /// The range covering everything.
    pub fn all() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    pub fn contains(&self, v: i64) -> bool {
        self.start.is_none_or(|s| v >= s) && self.end.is_none_or(|e| v < e)
    }
}

/// One slice of a larger query, used to parallelize full scans. The slices
/// returned for a query partition its row set: every row falls in exactly
/// one key range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySplit {
    pub query: BoundQuery,
    pub key_range: KeyRange,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_range_contains() {
        let r = KeyRange {
            start: Some(10),
            end: Some(20),
        };
        assert!(r.contains(10));
        assert!(r.contains(19));
        assert!(!r.contains(20));
        assert!(!r.contains(9));

        assert!(KeyRange::all().contains(i64::MIN));
        assert!(KeyRange::all().contains(i64::MAX));
    }

    #[test]
    fn test_fields_only_has_no_rows() {
        let r = QueryResult::fields_only(vec![Field::new("id", ColumnType::Int64)]);
        assert!(r.rows.is_empty());
        assert_eq!(r.rows_affected, 0);
    }

    #[test]
    fn test_bound_query_bind() {
        let q = BoundQuery::new("select * from t where id = :id").bind("id", Value::Int(3));
        assert_eq!(q.bind_variables.len(), 1);
    }
}
