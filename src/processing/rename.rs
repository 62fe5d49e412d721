use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value as Json, json};

use crate::error::EventstreamResult;
use crate::eventstream::Eventstream;
use crate::params::{FunctionRegistry, ParamKind, ParamModel, ParamReader, ParamSpec, WidgetDescriptor};

use super::{DataProcessor, ProcessorOutput};

/// Events named in `child_events` are renamed to `group_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameRule {
    pub group_name: String,
    pub child_events: Vec<String>,
}

impl RenameRule {
    pub fn new(group_name: impl Into<String>, child_events: &[&str]) -> Self {
        Self {
            group_name: group_name.into(),
            child_events: child_events.iter().map(|c| c.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenameProcessorParams {
    pub rules: Vec<RenameRule>,
}

impl RenameProcessorParams {
    /// Target name for `event`; the first matching rule wins.
    fn target(&self, event: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|r| r.child_events.iter().any(|c| c == event))
            .map(|r| r.group_name.as_str())
    }
}

impl ParamModel for RenameProcessorParams {
    const PROCESSOR: &'static str = "RenameProcessor";

    fn specs() -> Vec<ParamSpec> {
        vec![ParamSpec::required("rules", ParamKind::RenameRules)]
    }

    fn from_json(value: &Json, functions: &FunctionRegistry) -> EventstreamResult<Self> {
        let r = ParamReader::new(Self::PROCESSOR, value, &Self::specs(), functions)?;
        let raw = r.require("rules", r.raw("rules"))?;
        let rules = serde_json::from_value::<Vec<RenameRule>>(raw.clone())
            .map_err(|e| r.fail("rules", format!("expected [{{group_name, child_events}}]: {e}")))?;
        Ok(Self { rules })
    }

    fn to_json(&self) -> Json {
        json!({ "rules": self.rules })
    }
}

/// Renames events in place; ids and event types are kept.
#[derive(Debug, Clone)]
pub struct RenameProcessor {
    params: RenameProcessorParams,
}

impl RenameProcessor {
    pub fn new(params: RenameProcessorParams) -> Self {
        Self { params }
    }
}

impl From<RenameProcessorParams> for RenameProcessor {
    fn from(params: RenameProcessorParams) -> Self {
        Self::new(params)
    }
}

impl DataProcessor for RenameProcessor {
    fn name(&self) -> &'static str {
        RenameProcessorParams::PROCESSOR
    }

    fn params(&self) -> Json {
        self.params.to_json()
    }

    fn widgets(&self) -> Vec<WidgetDescriptor> {
        RenameProcessorParams::widgets()
    }

    fn transform(&self, input: &Arc<Eventstream>) -> EventstreamResult<ProcessorOutput> {
        let mut delta = Eventstream::delta(input);
        for event in input.events() {
            if let Some(group) = self.params.target(&event.name) {
                if group != event.name {
                    let mut renamed = event.clone();
                    renamed.name = group.to_string();
                    delta.update(renamed);
                }
            }
        }
        Ok(ProcessorOutput::Delta(delta.finish()?))
    }
}
