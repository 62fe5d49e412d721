use std::sync::Arc;

use serde_json::{Value as Json, json};

use crate::error::EventstreamResult;
use crate::event_type::EventType;
use crate::eventstream::Eventstream;
use crate::params::{FunctionRegistry, ParamKind, ParamModel, ParamReader, ParamSpec, WidgetDescriptor};
use crate::time::TimeSpan;

use super::{DataProcessor, ProcessorOutput};

/// Minimum a path must reach to be kept.
#[derive(Debug, Clone, PartialEq)]
pub enum MinPathLength {
    /// Number of events, not counting `path_start`/`path_end`.
    Steps(usize),
    /// Time between the first and last event.
    Time(TimeSpan),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropPathsParams {
    pub min_length: MinPathLength,
}

impl ParamModel for DropPathsParams {
    const PROCESSOR: &'static str = "DropPaths";

    fn specs() -> Vec<ParamSpec> {
        vec![
            ParamSpec::optional("min_steps", ParamKind::Integer),
            ParamSpec::optional("min_time", ParamKind::Time),
        ]
    }

    fn from_json(value: &Json, functions: &FunctionRegistry) -> EventstreamResult<Self> {
        let r = ParamReader::new(Self::PROCESSOR, value, &Self::specs(), functions)?;
        let min_length = match (r.count("min_steps")?, r.time("min_time")?) {
            (Some(steps), None) => MinPathLength::Steps(steps),
            (None, Some(time)) => MinPathLength::Time(time),
            (Some(_), Some(_)) => {
                return Err(r.fail("min_steps", "min_steps and min_time are mutually exclusive"));
            }
            (None, None) => {
                return Err(r.fail("min_steps", "either min_steps or min_time is required"));
            }
        };
        Ok(Self { min_length })
    }

    fn to_json(&self) -> Json {
        match &self.min_length {
            MinPathLength::Steps(steps) => json!({ "min_steps": steps }),
            MinPathLength::Time(time) => json!({ "min_time": time }),
        }
    }
}

/// Removes every event of users whose path is too short.
#[derive(Debug, Clone)]
pub struct DropPaths {
    params: DropPathsParams,
}

impl DropPaths {
    pub fn new(params: DropPathsParams) -> Self {
        Self { params }
    }
}

impl From<DropPathsParams> for DropPaths {
    fn from(params: DropPathsParams) -> Self {
        Self::new(params)
    }
}

impl DataProcessor for DropPaths {
    fn name(&self) -> &'static str {
        DropPathsParams::PROCESSOR
    }

    fn params(&self) -> Json {
        self.params.to_json()
    }

    fn widgets(&self) -> Vec<WidgetDescriptor> {
        DropPathsParams::widgets()
    }

    fn transform(&self, input: &Arc<Eventstream>) -> EventstreamResult<ProcessorOutput> {
        let mut delta = Eventstream::delta(input);
        for path in input.paths() {
            let keep = match &self.params.min_length {
                MinPathLength::Steps(min) => {
                    let steps = path
                        .events
                        .iter()
                        .filter(|e| !matches!(e.event_type, EventType::PathStart | EventType::PathEnd))
                        .count();
                    steps >= *min
                }
                MinPathLength::Time(min) => path.duration() >= min.as_nanos(),
            };
            if !keep {
                for event in &path.events {
                    delta.delete(event);
                }
            }
        }
        Ok(ProcessorOutput::Delta(delta.finish()?))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::{DropPaths, DropPathsParams, MinPathLength};
    use crate::eventstream::EventstreamContext;
    use crate::params::{FunctionRegistry, ParamModel};
    use crate::processing::DataProcessor;
    use crate::processing::test_support::stream;
    use crate::time::TimeSpan;

    #[rstest]
    #[case::by_steps(MinPathLength::Steps(2), vec!["1".to_string()])]
    #[case::by_time(MinPathLength::Time(TimeSpan::seconds(30.0)), vec!["1".to_string()])]
    #[case::nothing_dropped(MinPathLength::Steps(1), vec!["1".to_string(), "2".to_string()])]
    fn drops_short_paths(#[case] min_length: MinPathLength, #[case] kept: Vec<String>) {
        let ctx = EventstreamContext::new();
        let input = stream(&ctx, &[(1, "A", 0), (1, "B", 60), (2, "A", 10)]);
        let out = DropPaths::new(DropPathsParams { min_length }).apply(&input).unwrap();
        let users: Vec<String> = out.paths().iter().map(|p| p.user_id.to_string()).collect();
        assert_eq!(users, kept);
    }

    #[test]
    fn negative_steps_are_rejected() {
        let err = DropPathsParams::from_json(&json!({"min_steps": -1}), &FunctionRegistry::new())
            .unwrap_err();
        assert!(err.to_string().contains("DropPaths.min_steps"));
    }
}
