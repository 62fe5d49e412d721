//! CSV reader for raw event logs.

use std::path::Path;

use crate::error::{EventstreamError, EventstreamResult};
use crate::schema::RawDataSchema;
use crate::types::{DataSet, DataType, Field, Schema, Value};

/// Read the columns declared by `raw_schema` from a CSV file.
pub fn read_raw_events_csv_from_path(
    path: impl AsRef<Path>,
    raw_schema: &RawDataSchema,
) -> EventstreamResult<DataSet> {
    let file = std::fs::File::open(path)?;
    read_raw_events_csv(file, raw_schema)
}

/// Read the columns declared by `raw_schema` from CSV data.
///
/// Rules:
///
/// - CSV must have headers; column order may differ from the raw schema.
/// - Undeclared columns are ignored.
/// - Empty cells are null. Column types are inferred: integer, then float, then bool, then
///   string.
pub fn read_raw_events_csv<R: std::io::Read>(
    reader: R,
    raw_schema: &RawDataSchema,
) -> EventstreamResult<DataSet> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = rdr.headers()?.clone();

    // Map declared columns -> CSV column indexes (allows re-ordered CSV columns).
    let mut names = Vec::new();
    let mut col_idxs = Vec::new();
    for col in raw_schema.required_cols() {
        if names.iter().any(|n| n == col) {
            continue;
        }
        match headers.iter().position(|h| h == col) {
            Some(idx) => {
                names.push(col.to_string());
                col_idxs.push(idx);
            }
            None => {
                return Err(EventstreamError::schema(format!(
                    "missing required column '{col}'. headers={:?}",
                    headers.iter().collect::<Vec<_>>()
                )));
            }
        }
    }

    let mut cells: Vec<Vec<String>> = Vec::new();
    for result in rdr.records() {
        let record = result?;
        cells.push(
            col_idxs
                .iter()
                .map(|&i| record.get(i).unwrap_or("").to_string())
                .collect(),
        );
    }

    let types: Vec<DataType> = (0..names.len())
        .map(|c| infer_type(cells.iter().map(|row| row[c].as_str())))
        .collect();

    let rows = cells
        .iter()
        .map(|row| {
            row.iter()
                .zip(&types)
                .map(|(raw, t)| parse_typed_value(*t, raw))
                .collect()
        })
        .collect();

    let fields = names
        .into_iter()
        .zip(types)
        .map(|(n, t)| Field::new(n, t))
        .collect();
    Ok(DataSet::new(Schema::new(fields), rows))
}

fn infer_type<'a>(values: impl Iterator<Item = &'a str> + Clone) -> DataType {
    let present = values.filter(|v| !v.is_empty());
    if present.clone().all(|v| v.parse::<i64>().is_ok()) {
        DataType::Int64
    } else if present.clone().all(|v| v.parse::<f64>().is_ok()) {
        DataType::Float64
    } else if present.clone().all(|v| parse_bool(v).is_some()) {
        DataType::Bool
    } else {
        DataType::Utf8
    }
}

fn parse_typed_value(data_type: DataType, raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    let parsed = match data_type {
        DataType::Int64 => raw.parse::<i64>().ok().map(Value::Int64),
        DataType::Float64 => raw.parse::<f64>().ok().map(Value::Float64),
        DataType::Bool => parse_bool(raw).map(Value::Bool),
        DataType::Utf8 | DataType::Timestamp => None,
    };
    parsed.unwrap_or_else(|| Value::Utf8(raw.to_owned()))
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}
