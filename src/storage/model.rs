//! Flush-ready records.
//!
//! A [`RecordSet`] is one homogeneous batch of rows for a single table. Meters
//! build them from accumulators at the end of an aggregation cycle and hand
//! them to a [`Transaction`](super::Transaction).
//!
//! Expected column types on the server side: integers are `BIGINT`, floats
//! `DOUBLE PRECISION`, text `TEXT`, timestamps `TIMESTAMPTZ`, flags `BOOLEAN`.

use chrono::{DateTime, Utc};

use crate::meter::{SeriesStats, StatAccumulator};
use crate::storage::StoreError;

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Bool(bool),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// One row under construction: parallel column names and values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one column.
    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.columns.push(column.to_string());
        self.values.push(value.into());
        self
    }

    /// Appends `<name>_avg`, `<name>_min` and `<name>_max` from an accumulator.
    pub fn stat(self, name: &str, acc: &StatAccumulator) -> Self {
        self.with(&format!("{}_avg", name), acc.avg())
            .with(&format!("{}_min", name), acc.min())
            .with(&format!("{}_max", name), acc.max())
    }

    /// Appends avg/min/max columns for each of `series`, in order.
    pub fn stats(self, stats: &SeriesStats, series: &[&str]) -> Self {
        series
            .iter()
            .fold(self, |row, name| row.stat(name, &stats.get(name)))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

/// Homogeneous batch of rows for one table.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSet {
    table: &'static str,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl RecordSet {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Adds a row. The first row fixes the column list; later rows must match it.
    pub fn push(&mut self, row: Row) -> Result<(), StoreError> {
        if self.rows.is_empty() {
            self.columns = row.columns;
        } else if self.columns != row.columns {
            return Err(StoreError::Schema {
                table: self.table.to_string(),
                message: format!(
                    "row columns {:?} do not match {:?}",
                    row.columns, self.columns
                ),
            });
        }
        self.rows.push(row.values);
        Ok(())
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Looks up a value by row index and column name.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_stat_columns() {
        let mut acc = StatAccumulator::default();
        acc.aggregate(10.0);
        acc.aggregate(30.0);

        let row = Row::new().with("host_id", "h1").stat("percent", &acc);
        assert_eq!(
            row.columns(),
            &["host_id", "percent_avg", "percent_min", "percent_max"]
        );
        assert_eq!(
            row.values()[1..],
            [Value::Float(20.0), Value::Float(10.0), Value::Float(30.0)]
        );
    }

    #[test]
    fn test_record_set_rejects_mismatched_row() {
        let mut set = RecordSet::new("loads");
        set.push(Row::new().with("a", 1i64)).unwrap();
        set.push(Row::new().with("a", 2i64)).unwrap();

        let err = set.push(Row::new().with("b", 3i64)).unwrap_err();
        assert!(matches!(err, StoreError::Schema { .. }));
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(1, "a"), Some(&Value::Int(2)));
        assert_eq!(set.get(0, "b"), None);
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from(u64::MAX), Value::Int(i64::MAX));
        assert_eq!(Value::from(7u32).as_f64(), Some(7.0));
        assert_eq!(Value::from("x").as_str(), Some("x"));
        assert_eq!(Value::from(true).as_f64(), None);
    }
}
