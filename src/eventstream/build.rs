//! Construction of an eventstream from a raw [`DataSet`].

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{EventstreamError, EventstreamResult};
use crate::event_type::EventType;
use crate::schema::RawDataSchema;
use crate::time::{TimeUnit, Timestamp};
use crate::types::{DataSet, Value};

use super::{
    Event, EventId, Eventstream, EventstreamContext, EventstreamOptions, Row, UserId,
};

impl Eventstream {
    /// Build an eventstream from raw input.
    ///
    /// Rows receive fresh event ids in input order and are then sorted canonically (input
    /// position breaks ties). Unless the stream is derived (`options.relations` is non-empty),
    /// `path_start`/`path_end` markers are added around each user's path when
    /// `options.add_start_end_events` is set.
    ///
    /// # Errors
    ///
    /// Returns [`EventstreamError::Schema`] when a declared column is missing, or when a row has
    /// a null event name, timestamp or user id.
    pub fn new(
        raw: &DataSet,
        raw_schema: &RawDataSchema,
        options: EventstreamOptions,
        ctx: &EventstreamContext,
    ) -> EventstreamResult<Self> {
        raw_schema.validate(&raw.schema)?;

        let col = |name: &str| {
            raw.schema.index_of(name).ok_or_else(|| {
                EventstreamError::schema(format!("missing required column '{name}'"))
            })
        };
        let name_idx = col(&raw_schema.event_name)?;
        let ts_idx = col(&raw_schema.event_timestamp)?;
        let user_idx = col(&raw_schema.user_id)?;
        let type_idx = raw_schema.event_type.as_deref().map(col).transpose()?;
        let custom_idx = raw_schema
            .custom_cols
            .iter()
            .map(|c| Ok((c.custom_col.clone(), col(&c.raw_data_col)?)))
            .collect::<EventstreamResult<Vec<_>>>()?;
        let ref_idx = options
            .relations
            .iter()
            .map(|r| col(&r.ref_col))
            .collect::<EventstreamResult<Vec<_>>>()?;

        let mut schema = options.schema.unwrap_or_else(|| raw_schema.to_schema());
        for (custom, _) in &custom_idx {
            if !schema.custom_cols.contains(custom) {
                schema.custom_cols.push(custom.clone());
            }
        }

        static NULL: Value = Value::Null;
        let mut rows = Vec::with_capacity(raw.row_count());
        for (i, raw_row) in raw.rows.iter().enumerate() {
            let cell = |j: usize| raw_row.get(j).unwrap_or(&NULL);
            let name = read_name(cell(name_idx)).map_err(|e| at_row(i, e))?;
            let timestamp =
                read_timestamp(cell(ts_idx), options.timestamp_unit).map_err(|e| at_row(i, e))?;
            let user_id = UserId::from_value(cell(user_idx)).map_err(|e| at_row(i, e))?;
            let event_type = match type_idx {
                Some(j) => read_event_type(cell(j)).map_err(|e| at_row(i, e))?,
                None => EventType::Raw,
            };
            let custom: BTreeMap<String, Value> = custom_idx
                .iter()
                .map(|(c, j)| (c.clone(), cell(*j).clone()))
                .collect();
            let refs = ref_idx
                .iter()
                .map(|&j| read_ref(cell(j)))
                .collect::<EventstreamResult<Vec<_>>>()
                .map_err(|e| at_row(i, e))?;
            rows.push(Row {
                event: Event {
                    id: ctx.next_event_id(),
                    index: i as u64,
                    name,
                    event_type,
                    timestamp,
                    user_id,
                    custom,
                },
                deleted: false,
                refs,
            });
        }

        let derived = !options.relations.is_empty();
        let mut stream = Eventstream::empty(
            schema,
            options.index_order.unwrap_or_default(),
            options.relations,
            ctx,
        );
        stream.rows = rows;
        stream.canonicalize();

        if options.add_start_end_events && !derived {
            stream.add_path_boundaries();
        }

        debug!(
            stream = %stream.id(),
            rows = stream.len(),
            users = stream.paths().len(),
            "eventstream constructed"
        );
        Ok(stream)
    }

    /// Add `path_start`/`path_end` around each user's path unless already present.
    fn add_path_boundaries(&mut self) {
        let markers: Vec<Event> = self
            .paths()
            .iter()
            .flat_map(|path| {
                let mut out = Vec::with_capacity(2);
                if let Some(first) = path.first() {
                    if !path.has_type(EventType::PathStart) {
                        out.push(first.marker(&self.ctx, EventType::PathStart));
                    }
                }
                if let Some(last) = path.last() {
                    if !path.has_type(EventType::PathEnd) {
                        out.push(last.marker(&self.ctx, EventType::PathEnd));
                    }
                }
                out
            })
            .collect();
        let slots = self.relations.len();
        self.rows.extend(markers.into_iter().map(|event| Row {
            event,
            deleted: false,
            refs: vec![None; slots],
        }));
        self.canonicalize();
    }
}

fn at_row(row: usize, err: EventstreamError) -> EventstreamError {
    match err {
        EventstreamError::Schema { message } => {
            EventstreamError::schema(format!("row {row}: {message}"))
        }
        other => other,
    }
}

fn read_name(value: &Value) -> EventstreamResult<String> {
    match value {
        Value::Null => Err(EventstreamError::schema("event name is null")),
        Value::Utf8(s) => Ok(s.clone()),
        other => Ok(other.to_string()),
    }
}

fn read_timestamp(value: &Value, unit: TimeUnit) -> EventstreamResult<Timestamp> {
    match value {
        Value::Timestamp(ns) => Ok(Timestamp(*ns)),
        Value::Int64(v) => Ok(Timestamp(v.saturating_mul(unit.nanos()))),
        Value::Float64(v) => Ok(unit.timestamp(*v)),
        Value::Utf8(s) => s.trim().parse::<f64>().map(|v| unit.timestamp(v)).map_err(|_| {
            EventstreamError::schema(format!("timestamp '{s}' is not numeric"))
        }),
        Value::Null => Err(EventstreamError::schema("timestamp is null")),
        Value::Bool(_) => Err(EventstreamError::schema("timestamp must be numeric")),
    }
}

fn read_event_type(value: &Value) -> EventstreamResult<EventType> {
    match value {
        Value::Null => Ok(EventType::Raw),
        Value::Utf8(s) => s.parse(),
        other => Err(EventstreamError::schema(format!(
            "event type must be a string, got {other:?}"
        ))),
    }
}

fn read_ref(value: &Value) -> EventstreamResult<Option<EventId>> {
    match value {
        Value::Null => Ok(None),
        Value::Int64(v) if *v >= 0 => Ok(Some(EventId(*v as u64))),
        other => Err(EventstreamError::schema(format!(
            "parent reference must be a non-negative integer, got {other:?}"
        ))),
    }
}
