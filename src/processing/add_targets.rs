//! Positive and negative target labelling.
//!
//! Both processors share one implementation parameterized by a [`TargetKind`] marker.

use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::{Value as Json, json};

use crate::error::{EventstreamError, EventstreamResult};
use crate::event_type::EventType;
use crate::eventstream::{EventId, Eventstream};
use crate::params::{
    FunctionRegistry, NamedFn, ParamKind, ParamModel, ParamReader, ParamSpec, TargetsFn,
    WidgetDescriptor,
};
use crate::types::{DataSet, DataType, Field, Schema, Value};

use super::{DataProcessor, ProcessorOutput};

/// Which kind of target event a processor adds.
pub trait TargetKind: fmt::Debug + Send + Sync + 'static {
    const PROCESSOR: &'static str;
    const EVENT_TYPE: EventType;
}

#[derive(Debug, Clone, Copy)]
pub struct Positive;

impl TargetKind for Positive {
    const PROCESSOR: &'static str = "AddPositiveEvents";
    const EVENT_TYPE: EventType = EventType::PositiveTarget;
}

#[derive(Debug, Clone, Copy)]
pub struct Negative;

impl TargetKind for Negative {
    const PROCESSOR: &'static str = "AddNegativeEvents";
    const EVENT_TYPE: EventType = EventType::NegativeTarget;
}

pub struct TargetEventsParams<K> {
    pub targets: Vec<String>,
    /// Custom selector; `None` selects each user's earliest target event.
    pub func: Option<NamedFn<TargetsFn>>,
    kind: PhantomData<K>,
}

impl<K> TargetEventsParams<K> {
    pub fn new(targets: Vec<String>) -> Self {
        Self {
            targets,
            func: None,
            kind: PhantomData,
        }
    }

    pub fn with_func(mut self, func: NamedFn<TargetsFn>) -> Self {
        self.func = Some(func);
        self
    }
}

impl<K> Clone for TargetEventsParams<K> {
    fn clone(&self) -> Self {
        Self {
            targets: self.targets.clone(),
            func: self.func.clone(),
            kind: PhantomData,
        }
    }
}

impl<K: TargetKind> fmt::Debug for TargetEventsParams<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(K::PROCESSOR)
            .field("targets", &self.targets)
            .field("func", &self.func)
            .finish()
    }
}

impl<K: TargetKind> ParamModel for TargetEventsParams<K> {
    const PROCESSOR: &'static str = K::PROCESSOR;

    fn specs() -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("targets", ParamKind::ListOfString),
            ParamSpec::optional("func", ParamKind::Function),
        ]
    }

    fn from_json(value: &Json, functions: &FunctionRegistry) -> EventstreamResult<Self> {
        let r = ParamReader::new(Self::PROCESSOR, value, &Self::specs(), functions)?;
        let targets = r.require("targets", r.strings("targets")?)?;
        if targets.is_empty() {
            return Err(r.fail("targets", "at least one target event is required"));
        }
        Ok(Self {
            targets,
            func: r.targets("func")?,
            kind: PhantomData,
        })
    }

    fn to_json(&self) -> Json {
        json!({ "targets": self.targets, "func": self.func })
    }
}

/// Adds a `{positive,negative}_target_{name}` event at each selected target event.
pub struct AddTargetEvents<K> {
    params: TargetEventsParams<K>,
}

pub type AddPositiveEvents = AddTargetEvents<Positive>;
pub type AddNegativeEvents = AddTargetEvents<Negative>;

impl<K> AddTargetEvents<K> {
    pub fn new(params: TargetEventsParams<K>) -> Self {
        Self { params }
    }
}

impl<K> From<TargetEventsParams<K>> for AddTargetEvents<K> {
    fn from(params: TargetEventsParams<K>) -> Self {
        Self::new(params)
    }
}

impl<K: TargetKind> fmt::Debug for AddTargetEvents<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.params.fmt(f)
    }
}

impl<K: TargetKind> DataProcessor for AddTargetEvents<K> {
    fn name(&self) -> &'static str {
        K::PROCESSOR
    }

    fn params(&self) -> Json {
        self.params.to_json()
    }

    fn widgets(&self) -> Vec<WidgetDescriptor> {
        TargetEventsParams::<K>::widgets()
    }

    fn transform(&self, input: &Arc<Eventstream>) -> EventstreamResult<ProcessorOutput> {
        let selected = match &self.params.func {
            Some(func) => (func.get())(input, &self.params.targets),
            None => earliest_targets(input, &self.params.targets),
        };
        let ids = selected_ids(K::PROCESSOR, input, &selected)?;

        let ctx = input.context();
        let prefix = K::EVENT_TYPE.as_str();
        let mut delta = Eventstream::delta(input);
        let mut seen = HashSet::new();
        for id in ids {
            if !seen.insert(id) {
                continue;
            }
            let Some(event) = input.get(id).filter(|_| !input.is_deleted(id)) else {
                return Err(EventstreamError::processor(
                    K::PROCESSOR,
                    format!("selected event {id} is not a live event of the input"),
                ));
            };
            let name = format!("{prefix}_{}", event.name);
            delta.insert(event.derive(ctx, name, K::EVENT_TYPE));
        }
        Ok(ProcessorOutput::Delta(delta.finish()?))
    }
}

/// Per user, the earliest event whose name is one of `targets`.
pub fn earliest_targets(stream: &Eventstream, targets: &[String]) -> DataSet {
    let schema = Schema::new(vec![Field::new(
        stream.schema().event_id.clone(),
        DataType::Int64,
    )]);
    let rows = stream
        .paths()
        .iter()
        .filter_map(|path| {
            path.events
                .iter()
                .find(|e| targets.iter().any(|t| *t == e.name))
        })
        .map(|e| vec![Value::Int64(e.id.0 as i64)])
        .collect();
    DataSet::new(schema, rows)
}

fn selected_ids(
    processor: &str,
    input: &Eventstream,
    selected: &DataSet,
) -> EventstreamResult<Vec<EventId>> {
    let col = &input.schema().event_id;
    let values = selected.column(col).ok_or_else(|| {
        EventstreamError::processor(
            processor,
            format!("target selector must return a '{col}' column"),
        )
    })?;
    values
        .into_iter()
        .map(|v| match v {
            Value::Int64(id) if *id >= 0 => Ok(EventId(*id as u64)),
            other => Err(EventstreamError::processor(
                processor,
                format!("invalid event id {other:?} returned by target selector"),
            )),
        })
        .collect()
}
