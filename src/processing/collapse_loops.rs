//! Collapse runs of a repeated event into one event.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value as Json, json};

use crate::error::{EventstreamError, EventstreamResult};
use crate::event_type::EventType;
use crate::eventstream::{Event, Eventstream};
use crate::params::{FunctionRegistry, ParamKind, ParamModel, ParamReader, ParamSpec, WidgetDescriptor};
use crate::time::Timestamp;

use super::{DataProcessor, ProcessorOutput};

const SUFFIXES: &[&str] = &["loop", "count"];
const TIME_AGGS: &[&str] = &["min", "max", "mean"];

/// Name suffix of a collapsed run. No suffix keeps the original name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopSuffix {
    /// `{name}_loop`
    Loop,
    /// `{name}_loop_{run length}`
    Count,
}

impl FromStr for LoopSuffix {
    type Err = EventstreamError;

    fn from_str(s: &str) -> EventstreamResult<Self> {
        match s {
            "loop" => Ok(LoopSuffix::Loop),
            "count" => Ok(LoopSuffix::Count),
            other => Err(EventstreamError::schema(format!("unknown loop suffix '{other}'"))),
        }
    }
}

/// Timestamp given to a collapsed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeAgg {
    #[default]
    Min,
    Max,
    Mean,
}

impl TimeAgg {
    fn apply(&self, run: &[&Event]) -> Timestamp {
        let stamps = run.iter().map(|e| e.timestamp);
        match self {
            TimeAgg::Min => stamps.min().unwrap_or_default(),
            TimeAgg::Max => stamps.max().unwrap_or_default(),
            TimeAgg::Mean => {
                let sum: i128 = stamps.map(|t| i128::from(t.as_nanos())).sum();
                let n = run.len().max(1) as i128;
                Timestamp((sum / n) as i64)
            }
        }
    }
}

impl FromStr for TimeAgg {
    type Err = EventstreamError;

    fn from_str(s: &str) -> EventstreamResult<Self> {
        match s {
            "min" => Ok(TimeAgg::Min),
            "max" => Ok(TimeAgg::Max),
            "mean" => Ok(TimeAgg::Mean),
            other => Err(EventstreamError::schema(format!("unknown time aggregation '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollapseLoopsParams {
    pub suffix: Option<LoopSuffix>,
    pub time_agg: TimeAgg,
}

impl ParamModel for CollapseLoopsParams {
    const PROCESSOR: &'static str = "CollapseLoops";

    fn specs() -> Vec<ParamSpec> {
        vec![
            ParamSpec::optional("suffix", ParamKind::Enum(SUFFIXES)),
            ParamSpec::optional("time_agg", ParamKind::Enum(TIME_AGGS)).with_default(json!("min")),
        ]
    }

    fn from_json(value: &Json, functions: &FunctionRegistry) -> EventstreamResult<Self> {
        let r = ParamReader::new(Self::PROCESSOR, value, &Self::specs(), functions)?;
        let suffix = r
            .one_of("suffix", SUFFIXES)?
            .map(|s| s.parse::<LoopSuffix>().map_err(|e| r.fail("suffix", e.to_string())))
            .transpose()?;
        let time_agg = r
            .one_of("time_agg", TIME_AGGS)?
            .map(|s| s.parse::<TimeAgg>().map_err(|e| r.fail("time_agg", e.to_string())))
            .transpose()?
            .unwrap_or_default();
        Ok(Self { suffix, time_agg })
    }

    fn to_json(&self) -> Json {
        json!({ "suffix": self.suffix, "time_agg": self.time_agg })
    }
}

/// Replaces every maximal run (length two or more) of one event name within a user's path by a
/// single `group_alias` event.
#[derive(Debug, Clone, Default)]
pub struct CollapseLoops {
    params: CollapseLoopsParams,
}

impl CollapseLoops {
    pub fn new(params: CollapseLoopsParams) -> Self {
        Self { params }
    }

    fn collapsed_name(&self, name: &str, len: usize) -> String {
        match self.params.suffix {
            None => name.to_string(),
            Some(LoopSuffix::Loop) => format!("{name}_loop"),
            Some(LoopSuffix::Count) => format!("{name}_loop_{len}"),
        }
    }
}

impl From<CollapseLoopsParams> for CollapseLoops {
    fn from(params: CollapseLoopsParams) -> Self {
        Self::new(params)
    }
}

impl DataProcessor for CollapseLoops {
    fn name(&self) -> &'static str {
        CollapseLoopsParams::PROCESSOR
    }

    fn params(&self) -> Json {
        self.params.to_json()
    }

    fn widgets(&self) -> Vec<WidgetDescriptor> {
        CollapseLoopsParams::widgets()
    }

    fn transform(&self, input: &Arc<Eventstream>) -> EventstreamResult<ProcessorOutput> {
        let ctx = input.context();
        let mut delta = Eventstream::delta(input);
        for path in input.paths() {
            for run in path.events.chunk_by(|a, b| a.name == b.name) {
                let [first, rest @ ..] = run else { continue };
                if rest.is_empty() {
                    continue;
                }
                let collapsed = first
                    .derive(ctx, self.collapsed_name(&first.name, run.len()), EventType::GroupAlias)
                    .with_timestamp(self.params.time_agg.apply(run));
                delta.replace(first, collapsed);
                for event in rest {
                    delta.delete(event);
                }
            }
        }
        Ok(ProcessorOutput::Delta(delta.finish()?))
    }
}
