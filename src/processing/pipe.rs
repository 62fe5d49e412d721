//! Free-form frame transformation.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde_json::{Value as Json, json};

use crate::error::{EventstreamError, EventstreamResult};
use crate::event_type::EventType;
use crate::eventstream::{Event, EventId, Eventstream, Relation, Row, UserId};
use crate::params::{
    FrameFn, FunctionRegistry, NamedFn, ParamKind, ParamModel, ParamReader, ParamSpec,
    WidgetDescriptor,
};
use crate::time::Timestamp;
use crate::types::{DataSet, Value};

use super::{DataProcessor, ProcessorOutput};

#[derive(Debug, Clone)]
pub struct PipeParams {
    pub func: NamedFn<FrameFn>,
}

impl ParamModel for PipeParams {
    const PROCESSOR: &'static str = "Pipe";

    fn specs() -> Vec<ParamSpec> {
        vec![ParamSpec::required("func", ParamKind::Function)]
    }

    fn from_json(value: &Json, functions: &FunctionRegistry) -> EventstreamResult<Self> {
        let r = ParamReader::new(Self::PROCESSOR, value, &Self::specs(), functions)?;
        Ok(Self {
            func: r.require("func", r.frame("func")?)?,
        })
    }

    fn to_json(&self) -> Json {
        json!({ "func": self.func })
    }
}

/// Replaces the table with whatever `func` returns for the live rows.
///
/// The returned frame must contain every schema column. Rows carrying the `event_id` of an
/// input row keep that id and its lineage; other rows get fresh ids. Columns outside the schema
/// become custom columns. Soft-deleted input rows are carried over still deleted.
///
/// Timestamps must come back as [`Value::Timestamp`] (nanoseconds), the type
/// [`Eventstream::to_dataframe`] hands out. Plain integers are rejected rather than guessed at.
#[derive(Debug, Clone)]
pub struct Pipe {
    params: PipeParams,
}

impl Pipe {
    pub fn new(params: PipeParams) -> Self {
        Self { params }
    }

    fn read_rows(&self, input: &Eventstream, frame: &DataSet) -> EventstreamResult<Vec<Row>> {
        let schema = input.schema();
        let missing: Vec<String> = schema
            .get_cols()
            .into_iter()
            .filter(|c| frame.schema.index_of(c).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(self.fail(format!("returned frame lacks schema columns {missing:?}")));
        }
        let extra: Vec<&str> = frame
            .schema
            .field_names()
            .filter(|c| !schema.is_role_col(c))
            .collect();

        static NULL: Value = Value::Null;
        let ctx = input.context();
        let mut claimed = HashSet::new();
        let mut rows = Vec::with_capacity(frame.row_count());
        for i in 0..frame.row_count() {
            let cell = |col: &str| frame.value(i, col).unwrap_or(&NULL);
            let at_row = |message: String| self.fail(format!("row {i}: {message}"));

            let source = cell(&schema.event_id)
                .as_i64()
                .filter(|id| *id >= 0)
                .map(|id| EventId(id as u64))
                .filter(|id| input.get(*id).is_some() && !input.is_deleted(*id));
            let id = match source {
                Some(id) if claimed.insert(id) => id,
                _ => ctx.next_event_id(),
            };

            let name = cell(&schema.event_name)
                .as_str()
                .ok_or_else(|| at_row(format!("'{}' must be a string", schema.event_name)))?
                .to_string();
            let event_type = match cell(&schema.event_type) {
                Value::Null => EventType::Raw,
                Value::Utf8(tag) => tag.parse::<EventType>().map_err(|e| at_row(e.to_string()))?,
                other => return Err(at_row(format!("invalid event type {other:?}"))),
            };
            let timestamp = match cell(&schema.event_timestamp) {
                Value::Timestamp(ns) => Timestamp(*ns),
                other => {
                    return Err(at_row(format!(
                        "'{}' must be a timestamp value, got {other:?}",
                        schema.event_timestamp
                    )));
                }
            };
            let user_id = UserId::from_value(cell(&schema.user_id)).map_err(|e| at_row(e.to_string()))?;
            let index = cell(&schema.event_index)
                .as_i64()
                .map_or(i as u64, |v| v.max(0) as u64);
            let custom: BTreeMap<String, Value> = extra
                .iter()
                .map(|c| (c.to_string(), cell(c).clone()))
                .collect();

            rows.push(Row {
                event: Event {
                    id,
                    index,
                    name,
                    event_type,
                    timestamp,
                    user_id,
                    custom,
                },
                deleted: false,
                refs: vec![source],
            });
        }

        for (event, deleted) in input.events_with_deleted() {
            if deleted {
                rows.push(Row {
                    event: event.clone(),
                    deleted: true,
                    refs: vec![Some(event.id)],
                });
            }
        }
        Ok(rows)
    }

    fn fail(&self, message: String) -> EventstreamError {
        EventstreamError::processor(PipeParams::PROCESSOR, message)
    }
}

impl From<PipeParams> for Pipe {
    fn from(params: PipeParams) -> Self {
        Self::new(params)
    }
}

impl DataProcessor for Pipe {
    fn name(&self) -> &'static str {
        PipeParams::PROCESSOR
    }

    fn params(&self) -> Json {
        self.params.to_json()
    }

    fn widgets(&self) -> Vec<WidgetDescriptor> {
        PipeParams::widgets()
    }

    fn transform(&self, input: &Arc<Eventstream>) -> EventstreamResult<ProcessorOutput> {
        let frame = (self.params.func.get())(input.to_dataframe());
        let rows = self.read_rows(input, &frame)?;
        let relation = Relation::new(format!("ref_{}", input.id()), Arc::clone(input));
        let mut schema = input.schema().clone();
        for col in frame.schema.field_names() {
            if !schema.is_role_col(col) && !schema.custom_cols.iter().any(|c| c == col) {
                schema.custom_cols.push(col.to_string());
            }
        }
        let out = Eventstream::from_rows(
            schema,
            input.index_order().clone(),
            vec![relation],
            rows,
            input.context(),
        )
        .map_err(|e| self.fail(e.to_string()))?;
        Ok(ProcessorOutput::Full(out))
    }
}
