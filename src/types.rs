//! Tabular data model shared by ingestion, eventstreams and processor callbacks.
//!
//! A [`DataSet`] is the "frame" exchanged at every public boundary of the crate: raw input
//! handed to [`crate::eventstream::Eventstream::new`], the output of
//! [`crate::eventstream::Eventstream::to_dataframe`], and the argument of every user callback
//! (masks, pipes, target selectors).

use std::fmt;

use crate::error::{EventstreamError, EventstreamResult};

/// Logical data type for a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point number.
    Float64,
    /// Boolean.
    Bool,
    /// UTF-8 string.
    Utf8,
    /// Absolute time, nanoseconds since the Unix epoch.
    Timestamp,
}

/// A single named, typed field in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field/column name.
    pub name: String,
    /// Field data type.
    pub data_type: DataType,
}

impl Field {
    /// Create a new field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Ordered list of fields describing the shape of a [`DataSet`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    /// Ordered list of fields.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Create a new schema from fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns the index of a field by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// A single typed value in a [`DataSet`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing/empty value.
    Null,
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// Boolean.
    Bool(bool),
    /// UTF-8 string.
    Utf8(String),
    /// Nanoseconds since the Unix epoch.
    Timestamp(i64),
}

impl Value {
    /// `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Borrow the string payload of a [`Value::Utf8`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Utf8(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Integer payload of [`Value::Int64`] or [`Value::Timestamp`].
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) | Value::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric payload widened to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int64(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    /// Logical type of this value; `None` for nulls.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Int64(_) => Some(DataType::Int64),
            Value::Float64(_) => Some(DataType::Float64),
            Value::Bool(_) => Some(DataType::Bool),
            Value::Utf8(_) => Some(DataType::Utf8),
            Value::Timestamp(_) => Some(DataType::Timestamp),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Utf8(v) => f.write_str(v),
            Value::Timestamp(v) => write!(f, "{v}ns"),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Utf8(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Utf8(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// In-memory tabular dataset.
///
/// Rows are stored as `Vec<Vec<Value>>` in the same order as the [`Schema`] fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataSet {
    /// Schema describing row shape.
    pub schema: Schema,
    /// Row-major value storage.
    pub rows: Vec<Vec<Value>>,
}

impl DataSet {
    /// Create a dataset from schema and rows.
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> Self {
        Self { schema, rows }
    }

    /// Number of rows in the dataset.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Borrow the value at (`row`, `column`).
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.schema.index_of(column)?;
        self.rows.get(row)?.get(idx)
    }

    /// Collect a whole column by name. Cells missing from short rows read as [`Value::Null`].
    pub fn column(&self, column: &str) -> Option<Vec<&Value>> {
        static NULL: Value = Value::Null;
        let idx = self.schema.index_of(column)?;
        Some(self.rows.iter().map(|row| row.get(idx).unwrap_or(&NULL)).collect())
    }

    /// Create a new dataset containing only rows that match `predicate`.
    ///
    /// The returned dataset preserves the original schema.
    pub fn filter_rows<F>(&self, mut predicate: F) -> Self
    where
        F: FnMut(&[Value]) -> bool,
    {
        let rows = self
            .rows
            .iter()
            .filter(|row| predicate(row.as_slice()))
            .cloned()
            .collect();
        Self {
            schema: self.schema.clone(),
            rows,
        }
    }

    /// Project the named columns, in the given order.
    pub fn select(&self, columns: &[&str]) -> EventstreamResult<DataSet> {
        let idxs = columns
            .iter()
            .map(|c| {
                self.schema.index_of(c).ok_or_else(|| EventstreamError::Schema {
                    message: format!("cannot select unknown column '{c}'"),
                })
            })
            .collect::<EventstreamResult<Vec<_>>>()?;
        let fields = idxs.iter().map(|&i| self.schema.fields[i].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| idxs.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(DataSet::new(Schema::new(fields), rows))
    }

    /// Rename column `from` to `to`.
    pub fn rename(&mut self, from: &str, to: &str) -> EventstreamResult<()> {
        if from != to && self.schema.index_of(to).is_some() {
            return Err(EventstreamError::Schema {
                message: format!("cannot rename '{from}': column '{to}' already exists"),
            });
        }
        let idx = self.schema.index_of(from).ok_or_else(|| EventstreamError::Schema {
            message: format!("cannot rename unknown column '{from}'"),
        })?;
        self.schema.fields[idx].name = to.to_string();
        Ok(())
    }

    /// Append a column, or overwrite it when a column with the same name already exists.
    ///
    /// Fails when `values` does not have one entry per row.
    pub fn push_column(&mut self, field: Field, values: Vec<Value>) -> EventstreamResult<()> {
        if values.len() != self.rows.len() {
            return Err(EventstreamError::Schema {
                message: format!(
                    "column '{}' has {} values but the dataset has {} rows",
                    field.name,
                    values.len(),
                    self.rows.len()
                ),
            });
        }
        match self.schema.index_of(&field.name) {
            Some(idx) => {
                self.schema.fields[idx] = field;
                for (row, v) in self.rows.iter_mut().zip(values) {
                    row[idx] = v;
                }
            }
            None => {
                self.schema.fields.push(field);
                for (row, v) in self.rows.iter_mut().zip(values) {
                    row.push(v);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{DataSet, DataType, Field, Schema, Value};

    fn sample_dataset() -> DataSet {
        let schema = Schema::new(vec![
            Field::new("user", DataType::Int64),
            Field::new("event", DataType::Utf8),
        ]);
        DataSet::new(
            schema,
            vec![
                vec![Value::Int64(1), Value::from("A")],
                vec![Value::Int64(2), Value::from("B")],
            ],
        )
    }

    #[test]
    fn schema_index_of_works() {
        let ds = sample_dataset();
        assert_eq!(ds.schema.index_of("user"), Some(0));
        assert_eq!(ds.schema.index_of("event"), Some(1));
        assert_eq!(ds.schema.index_of("missing"), None);
    }

    #[test]
    fn value_and_column_lookups() {
        let ds = sample_dataset();
        assert_eq!(ds.value(1, "event"), Some(&Value::from("B")));
        assert_eq!(ds.value(5, "event"), None);
        assert_eq!(
            ds.column("user"),
            Some(vec![&Value::Int64(1), &Value::Int64(2)])
        );
    }

    #[test]
    fn column_reads_short_rows_as_null() {
        let mut ds = sample_dataset();
        ds.rows[1].truncate(1);
        assert_eq!(
            ds.column("event"),
            Some(vec![&Value::from("A"), &Value::Null])
        );
    }

    #[test]
    fn push_column_appends_then_overwrites() {
        let mut ds = sample_dataset();
        ds.push_column(
            Field::new("score", DataType::Float64),
            vec![Value::Float64(1.0), Value::Null],
        )
        .unwrap();
        assert_eq!(ds.schema.fields.len(), 3);
        assert_eq!(ds.value(0, "score"), Some(&Value::Float64(1.0)));

        ds.push_column(
            Field::new("score", DataType::Float64),
            vec![Value::Float64(2.0), Value::Float64(3.0)],
        )
        .unwrap();
        assert_eq!(ds.schema.fields.len(), 3);
        assert_eq!(ds.value(1, "score"), Some(&Value::Float64(3.0)));
    }

    #[test]
    fn push_column_rejects_length_mismatch() {
        let mut ds = sample_dataset();
        let err = ds
            .push_column(Field::new("x", DataType::Int64), vec![Value::Int64(1)])
            .unwrap_err();
        assert!(err.to_string().contains("schema error"));
    }

    #[test]
    fn select_projects_and_reorders() {
        let ds = sample_dataset();
        let out = ds.select(&["event", "user"]).unwrap();
        assert_eq!(out.schema.field_names().collect::<Vec<_>>(), vec!["event", "user"]);
        assert_eq!(out.value(0, "event"), Some(&Value::from("A")));
        assert!(ds.select(&["nope"]).is_err());
    }

    #[test]
    fn rename_refuses_collisions() {
        let mut ds = sample_dataset();
        assert!(ds.rename("user", "event").is_err());
        ds.rename("user", "user_id").unwrap();
        assert_eq!(ds.value(1, "user_id"), Some(&Value::Int64(2)));
    }

    #[test]
    fn filter_rows_preserves_schema() {
        let ds = sample_dataset();
        let out = ds.filter_rows(|row| row[1] == Value::from("A"));
        assert_eq!(out.schema, ds.schema);
        assert_eq!(out.row_count(), 1);
    }
}
