//! Replace matching events with a single grouped event name.

use std::sync::Arc;

use serde_json::{Value as Json, json};

use crate::error::EventstreamResult;
use crate::event_type::EventType;
use crate::eventstream::Eventstream;
use crate::params::{
    FunctionRegistry, MaskFn, NamedFn, ParamKind, ParamModel, ParamReader, ParamSpec,
    WidgetDescriptor,
};

use super::{DataProcessor, ProcessorOutput, evaluate_mask};

#[derive(Debug, Clone)]
pub struct GroupEventsParams {
    pub event_name: String,
    pub event_type: EventType,
    pub func: NamedFn<MaskFn>,
}

impl GroupEventsParams {
    /// Group into `event_name` with the default `group_alias` type.
    pub fn new(event_name: impl Into<String>, func: NamedFn<MaskFn>) -> Self {
        Self {
            event_name: event_name.into(),
            event_type: EventType::GroupAlias,
            func,
        }
    }
}

impl ParamModel for GroupEventsParams {
    const PROCESSOR: &'static str = "GroupEvents";

    fn specs() -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("event_name", ParamKind::String),
            ParamSpec::optional("event_type", ParamKind::String).with_default(json!("group_alias")),
            ParamSpec::required("func", ParamKind::Function),
        ]
    }

    fn from_json(value: &Json, functions: &FunctionRegistry) -> EventstreamResult<Self> {
        let r = ParamReader::new(Self::PROCESSOR, value, &Self::specs(), functions)?;
        let event_type = match r.string("event_type")? {
            Some(t) => t
                .parse::<EventType>()
                .map_err(|e| r.fail("event_type", e.to_string()))?,
            None => EventType::GroupAlias,
        };
        Ok(Self {
            event_name: r.require("event_name", r.string("event_name")?)?,
            event_type,
            func: r.require("func", r.mask("func")?)?,
        })
    }

    fn to_json(&self) -> Json {
        json!({
            "event_name": self.event_name,
            "event_type": self.event_type,
            "func": self.func,
        })
    }
}

/// Every matching row is replaced by a row named `event_name` at the same time and user; the
/// original is soft-deleted.
#[derive(Debug, Clone)]
pub struct GroupEvents {
    params: GroupEventsParams,
}

impl GroupEvents {
    pub fn new(params: GroupEventsParams) -> Self {
        Self { params }
    }
}

impl From<GroupEventsParams> for GroupEvents {
    fn from(params: GroupEventsParams) -> Self {
        Self::new(params)
    }
}

impl DataProcessor for GroupEvents {
    fn name(&self) -> &'static str {
        GroupEventsParams::PROCESSOR
    }

    fn params(&self) -> Json {
        self.params.to_json()
    }

    fn widgets(&self) -> Vec<WidgetDescriptor> {
        GroupEventsParams::widgets()
    }

    fn transform(&self, input: &Arc<Eventstream>) -> EventstreamResult<ProcessorOutput> {
        let mask = evaluate_mask(self.name(), &self.params.func, input)?;
        let ctx = input.context();
        let mut delta = Eventstream::delta(input);
        for (event, hit) in input.events().zip(mask) {
            if hit {
                let grouped = event.derive(ctx, &self.params.event_name, self.params.event_type);
                delta.replace(event, grouped);
            }
        }
        Ok(ProcessorOutput::Delta(delta.finish()?))
    }
}
