use std::sync::Arc;

use serde_json::{Value as Json, json};

use crate::error::EventstreamResult;
use crate::event_type::EventType;
use crate::eventstream::Eventstream;
use crate::params::{FunctionRegistry, ParamModel, ParamReader, ParamSpec, WidgetDescriptor};

use super::{DataProcessor, ProcessorOutput};

/// No parameters.
#[derive(Debug, Clone, Default)]
pub struct AddStartEndEventsParams;

impl ParamModel for AddStartEndEventsParams {
    const PROCESSOR: &'static str = "AddStartEndEvents";

    fn specs() -> Vec<ParamSpec> {
        Vec::new()
    }

    fn from_json(value: &Json, functions: &FunctionRegistry) -> EventstreamResult<Self> {
        ParamReader::new(Self::PROCESSOR, value, &Self::specs(), functions)?;
        Ok(Self)
    }

    fn to_json(&self) -> Json {
        json!({})
    }
}

/// Adds `path_start` at each user's first event and `path_end` at the last one, skipping users
/// that already have them.
#[derive(Debug, Clone, Default)]
pub struct AddStartEndEvents;

impl AddStartEndEvents {
    pub fn new(_params: AddStartEndEventsParams) -> Self {
        Self
    }
}

impl From<AddStartEndEventsParams> for AddStartEndEvents {
    fn from(params: AddStartEndEventsParams) -> Self {
        Self::new(params)
    }
}

impl DataProcessor for AddStartEndEvents {
    fn name(&self) -> &'static str {
        AddStartEndEventsParams::PROCESSOR
    }

    fn params(&self) -> Json {
        AddStartEndEventsParams.to_json()
    }

    fn widgets(&self) -> Vec<WidgetDescriptor> {
        AddStartEndEventsParams::widgets()
    }

    fn transform(&self, input: &Arc<Eventstream>) -> EventstreamResult<ProcessorOutput> {
        let ctx = input.context();
        let mut delta = Eventstream::delta(input);
        for path in input.paths() {
            if let (Some(first), Some(last)) = (path.first(), path.last()) {
                if !path.has_type(EventType::PathStart) {
                    delta.insert(first.marker(ctx, EventType::PathStart));
                }
                if !path.has_type(EventType::PathEnd) {
                    delta.insert(last.marker(ctx, EventType::PathEnd));
                }
            }
        }
        Ok(ProcessorOutput::Delta(delta.finish()?))
    }
}
