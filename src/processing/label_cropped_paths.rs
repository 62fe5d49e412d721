//! Mark paths that look truncated by the observation window.

use std::sync::Arc;

use serde_json::{Map, Value as Json};

use crate::error::EventstreamResult;
use crate::event_type::EventType;
use crate::eventstream::Eventstream;
use crate::params::{FunctionRegistry, ParamKind, ParamModel, ParamReader, ParamSpec, WidgetDescriptor};
use crate::time::TimeSpan;

use super::{DataProcessor, ProcessorOutput};

/// At least one cutoff must be set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelCroppedPathsParams {
    pub left_cutoff: Option<TimeSpan>,
    pub right_cutoff: Option<TimeSpan>,
}

impl ParamModel for LabelCroppedPathsParams {
    const PROCESSOR: &'static str = "LabelCroppedPaths";

    fn specs() -> Vec<ParamSpec> {
        vec![
            ParamSpec::optional("left_cutoff", ParamKind::Time),
            ParamSpec::optional("right_cutoff", ParamKind::Time),
        ]
    }

    fn from_json(value: &Json, functions: &FunctionRegistry) -> EventstreamResult<Self> {
        let r = ParamReader::new(Self::PROCESSOR, value, &Self::specs(), functions)?;
        let params = Self {
            left_cutoff: r.time("left_cutoff")?,
            right_cutoff: r.time("right_cutoff")?,
        };
        if params.left_cutoff.is_none() && params.right_cutoff.is_none() {
            return Err(r.fail(
                "left_cutoff",
                "either left_cutoff or right_cutoff is required",
            ));
        }
        Ok(params)
    }

    fn to_json(&self) -> Json {
        let mut out = Map::new();
        if let Some(left) = &self.left_cutoff {
            out.insert("left_cutoff".into(), serde_json::json!(left));
        }
        if let Some(right) = &self.right_cutoff {
            out.insert("right_cutoff".into(), serde_json::json!(right));
        }
        Json::Object(out)
    }
}

/// A path shorter than a cutoff gets `cropped_left` at its first event (left cutoff) and
/// `cropped_right` at its last event (right cutoff).
#[derive(Debug, Clone)]
pub struct LabelCroppedPaths {
    params: LabelCroppedPathsParams,
}

impl LabelCroppedPaths {
    pub fn new(params: LabelCroppedPathsParams) -> Self {
        Self { params }
    }
}

impl From<LabelCroppedPathsParams> for LabelCroppedPaths {
    fn from(params: LabelCroppedPathsParams) -> Self {
        Self::new(params)
    }
}

impl DataProcessor for LabelCroppedPaths {
    fn name(&self) -> &'static str {
        LabelCroppedPathsParams::PROCESSOR
    }

    fn params(&self) -> Json {
        self.params.to_json()
    }

    fn widgets(&self) -> Vec<WidgetDescriptor> {
        LabelCroppedPathsParams::widgets()
    }

    fn transform(&self, input: &Arc<Eventstream>) -> EventstreamResult<ProcessorOutput> {
        let ctx = input.context();
        let left = self.params.left_cutoff.map(|c| c.as_nanos());
        let right = self.params.right_cutoff.map(|c| c.as_nanos());
        let mut delta = Eventstream::delta(input);
        for path in input.paths() {
            let (Some(first), Some(last)) = (path.first(), path.last()) else {
                continue;
            };
            let duration = path.duration();
            if left.is_some_and(|cutoff| duration < cutoff) {
                delta.insert(first.marker(ctx, EventType::CroppedLeft));
            }
            if right.is_some_and(|cutoff| duration < cutoff) {
                delta.insert(last.marker(ctx, EventType::CroppedRight));
            }
        }
        Ok(ProcessorOutput::Delta(delta.finish()?))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{LabelCroppedPaths, LabelCroppedPathsParams};
    use crate::eventstream::{EventstreamContext, UserId};
    use crate::params::{FunctionRegistry, ParamModel};
    use crate::processing::DataProcessor;
    use crate::processing::test_support::stream;
    use crate::time::TimeSpan;

    #[test]
    fn short_path_is_cropped_on_the_left() {
        let ctx = EventstreamContext::new();
        let input = stream(
            &ctx,
            &[(1, "A", 0), (1, "B", 50), (1, "C", 100), (2, "A", 50), (2, "B", 55)],
        );
        let p = LabelCroppedPaths::new(LabelCroppedPathsParams {
            left_cutoff: Some(TimeSpan::seconds(10.0)),
            right_cutoff: None,
        });
        let out = p.apply(&input).unwrap();
        let cropped: Vec<_> = out
            .events()
            .filter(|e| e.name.starts_with("cropped"))
            .map(|e| (e.user_id.clone(), e.name.clone(), e.timestamp.as_secs_f64()))
            .collect();
        assert_eq!(cropped, vec![(UserId::Int(2), "cropped_left".to_string(), 50.0)]);
    }

    #[test]
    fn right_cutoff_marks_the_last_event() {
        let ctx = EventstreamContext::new();
        let input = stream(&ctx, &[(1, "A", 0), (1, "B", 5)]);
        let p = LabelCroppedPaths::new(LabelCroppedPathsParams {
            left_cutoff: None,
            right_cutoff: Some(TimeSpan::seconds(10.0)),
        });
        let out = p.apply(&input).unwrap();
        let last = out.events().last().unwrap();
        assert_eq!(last.name, "cropped_right");
        assert_eq!(last.timestamp.as_secs_f64(), 5.0);
    }

    #[test]
    fn needs_a_cutoff() {
        let err = LabelCroppedPathsParams::from_json(&json!({}), &FunctionRegistry::new())
            .unwrap_err();
        assert!(err.to_string().contains("LabelCroppedPaths.left_cutoff"));
    }
}
