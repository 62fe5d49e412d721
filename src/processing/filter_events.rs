//! Keep only the events a mask selects.

use std::sync::Arc;

use serde_json::{Value as Json, json};

use crate::error::EventstreamResult;
use crate::eventstream::Eventstream;
use crate::params::{
    FunctionRegistry, MaskFn, NamedFn, ParamKind, ParamModel, ParamReader, ParamSpec,
    WidgetDescriptor,
};

use super::{DataProcessor, ProcessorOutput, evaluate_mask};

#[derive(Debug, Clone)]
pub struct FilterEventsParams {
    /// `true` keeps the row.
    pub func: NamedFn<MaskFn>,
}

impl ParamModel for FilterEventsParams {
    const PROCESSOR: &'static str = "FilterEvents";

    fn specs() -> Vec<ParamSpec> {
        vec![ParamSpec::required("func", ParamKind::Function)]
    }

    fn from_json(value: &Json, functions: &FunctionRegistry) -> EventstreamResult<Self> {
        let r = ParamReader::new(Self::PROCESSOR, value, &Self::specs(), functions)?;
        Ok(Self {
            func: r.require("func", r.mask("func")?)?,
        })
    }

    fn to_json(&self) -> Json {
        json!({ "func": self.func })
    }
}

/// Soft-deletes every row the mask rejects; kept rows retain their event ids.
#[derive(Debug, Clone)]
pub struct FilterEvents {
    params: FilterEventsParams,
}

impl FilterEvents {
    pub fn new(params: FilterEventsParams) -> Self {
        Self { params }
    }
}

impl From<FilterEventsParams> for FilterEvents {
    fn from(params: FilterEventsParams) -> Self {
        Self::new(params)
    }
}

impl DataProcessor for FilterEvents {
    fn name(&self) -> &'static str {
        FilterEventsParams::PROCESSOR
    }

    fn params(&self) -> Json {
        self.params.to_json()
    }

    fn widgets(&self) -> Vec<WidgetDescriptor> {
        FilterEventsParams::widgets()
    }

    fn transform(&self, input: &Arc<Eventstream>) -> EventstreamResult<ProcessorOutput> {
        let mask = evaluate_mask(self.name(), &self.params.func, input)?;
        let mut delta = Eventstream::delta(input);
        for (event, keep) in input.events().zip(mask) {
            if !keep {
                delta.delete(event);
            }
        }
        Ok(ProcessorOutput::Delta(delta.finish()?))
    }
}
