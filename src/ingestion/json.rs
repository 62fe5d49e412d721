//! JSON reader for raw event logs.
//!
//! Supported inputs:
//! - A JSON array of objects: `[{"event":"A"}, {"event":"B"}]`
//! - Newline-delimited JSON (NDJSON): `{"event":"A"}\n{"event":"B"}\n`
//!
//! Nested fields are supported using dot paths in raw column names (e.g. `user.id`).

use std::fs;
use std::path::Path;

use crate::error::{EventstreamError, EventstreamResult};
use crate::schema::RawDataSchema;
use crate::types::{DataSet, DataType, Field, Schema, Value};

/// Read the columns declared by `raw_schema` from a JSON or NDJSON file.
pub fn read_raw_events_json_from_path(
    path: impl AsRef<Path>,
    raw_schema: &RawDataSchema,
) -> EventstreamResult<DataSet> {
    let text = fs::read_to_string(path)?;
    read_raw_events_json(&text, raw_schema)
}

/// Read the columns declared by `raw_schema` from an in-memory JSON string.
///
/// An empty input yields an empty dataset.
pub fn read_raw_events_json(input: &str, raw_schema: &RawDataSchema) -> EventstreamResult<DataSet> {
    let trimmed = input.trim();
    let values = if trimmed.is_empty() {
        Vec::new()
    } else if let Ok(v) = serde_json::from_str::<serde_json::Value>(trimmed) {
        // A single JSON value (array or object).
        match v {
            serde_json::Value::Array(items) => items,
            serde_json::Value::Object(_) => vec![v],
            _ => {
                return Err(EventstreamError::schema(
                    "json must be an object, an array of objects, or NDJSON",
                ));
            }
        }
    } else {
        let mut values = Vec::new();
        for (i, line) in trimmed.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let v = serde_json::from_str::<serde_json::Value>(line).map_err(|e| {
                EventstreamError::schema(format!("invalid ndjson at line {}: {e}", i + 1))
            })?;
            values.push(v);
        }
        values
    };
    read_json_values(&values, raw_schema)
}

fn read_json_values(
    values: &[serde_json::Value],
    raw_schema: &RawDataSchema,
) -> EventstreamResult<DataSet> {
    let mut names: Vec<&str> = Vec::new();
    for col in raw_schema.required_cols() {
        if !names.contains(&col) {
            names.push(col);
        }
    }

    let mut rows: Vec<Vec<Value>> = Vec::with_capacity(values.len());
    for (idx0, v) in values.iter().enumerate() {
        let row_num = idx0 + 1;
        let obj = v.as_object().ok_or_else(|| {
            EventstreamError::schema(format!("row {row_num} is not a json object"))
        })?;

        let mut row: Vec<Value> = Vec::with_capacity(names.len());
        for name in &names {
            let jv = get_by_dot_path(obj, name).ok_or_else(|| {
                EventstreamError::schema(format!(
                    "missing required column '{name}' in row {row_num}"
                ))
            })?;
            row.push(convert_json_value(jv));
        }
        rows.push(row);
    }

    let fields = names
        .iter()
        .enumerate()
        .map(|(c, name)| Field::new(*name, column_type(rows.iter().map(|r| &r[c]))))
        .collect();
    Ok(DataSet::new(Schema::new(fields), rows))
}

fn get_by_dot_path<'a>(
    root: &'a serde_json::Map<String, serde_json::Value>,
    path: &str,
) -> Option<&'a serde_json::Value> {
    if let Some(v) = root.get(path) {
        return Some(v);
    }
    let mut segments = path.split('.');
    let mut current = root.get(segments.next()?)?;
    for segment in segments {
        match current {
            serde_json::Value::Object(map) => current = map.get(segment)?,
            _ => return None,
        }
    }
    Some(current)
}

fn convert_json_value(v: &serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int64(i),
            None => n.as_f64().map(Value::Float64).unwrap_or(Value::Null),
        },
        serde_json::Value::String(s) => Value::Utf8(s.clone()),
        other => Value::Utf8(other.to_string()),
    }
}

/// Common type of a column: numeric columns mixing integers and floats are `Float64`, any
/// other mix is `Utf8`.
fn column_type<'a>(values: impl Iterator<Item = &'a Value>) -> DataType {
    let mut seen: Option<DataType> = None;
    for t in values.filter_map(Value::data_type) {
        seen = Some(match (seen, t) {
            (None, t) => t,
            (Some(a), b) if a == b => a,
            (Some(DataType::Int64), DataType::Float64)
            | (Some(DataType::Float64), DataType::Int64) => DataType::Float64,
            _ => DataType::Utf8,
        });
    }
    seen.unwrap_or(DataType::Utf8)
}

#[cfg(test)]
mod tests {
    use super::read_raw_events_json;
    use crate::schema::RawDataSchema;
    use crate::types::{DataType, Value};

    #[test]
    fn reads_array_of_objects_with_nested_paths() {
        let input = r#"[
            {"event": "A", "timestamp": 0, "user": {"id": 1}},
            {"event": "B", "timestamp": 1.5, "user": {"id": 2}}
        ]"#;
        let raw = RawDataSchema::new("event", "timestamp", "user.id");
        let ds = read_raw_events_json(input, &raw).unwrap();
        assert_eq!(ds.row_count(), 2);
        assert_eq!(ds.schema.fields[1].data_type, DataType::Float64);
        assert_eq!(ds.value(1, "user.id"), Some(&Value::Int64(2)));
    }

    #[test]
    fn reads_ndjson() {
        let input = "{\"event\":\"A\",\"timestamp\":0,\"user_id\":\"u\"}\n\n{\"event\":\"B\",\"timestamp\":3,\"user_id\":\"v\"}\n";
        let ds = read_raw_events_json(input, &RawDataSchema::default()).unwrap();
        assert_eq!(ds.row_count(), 2);
        assert_eq!(ds.value(1, "event"), Some(&Value::from("B")));
    }

    #[test]
    fn empty_input_is_an_empty_dataset() {
        let ds = read_raw_events_json("  ", &RawDataSchema::default()).unwrap();
        assert_eq!(ds.row_count(), 0);
        assert_eq!(ds.schema.fields.len(), 3);
    }

    #[test]
    fn missing_field_is_schema_error() {
        let err = read_raw_events_json(r#"[{"event":"A"}]"#, &RawDataSchema::default())
            .unwrap_err();
        assert!(err.to_string().contains("missing required column 'timestamp'"));
    }
}
