//! Cut each path down to a window between two anchor events.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json, json};

use crate::error::{EventstreamError, EventstreamResult};
use crate::eventstream::{Event, Eventstream};
use crate::params::{FunctionRegistry, ParamKind, ParamModel, ParamReader, ParamSpec, WidgetDescriptor};

use super::{DataProcessor, ProcessorOutput};

const OCCURRENCES: &[&str] = &["first", "last"];

/// Which occurrence of an anchor event counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Occurrence {
    #[default]
    First,
    Last,
}

impl Occurrence {
    fn as_str(&self) -> &'static str {
        match self {
            Occurrence::First => "first",
            Occurrence::Last => "last",
        }
    }

    fn locate(&self, events: &[&Event], name: &str) -> Option<usize> {
        match self {
            Occurrence::First => events.iter().position(|e| e.name == name),
            Occurrence::Last => events.iter().rposition(|e| e.name == name),
        }
    }
}

impl FromStr for Occurrence {
    type Err = EventstreamError;

    fn from_str(s: &str) -> EventstreamResult<Self> {
        match s {
            "first" => Ok(Occurrence::First),
            "last" => Ok(Occurrence::Last),
            other => Err(EventstreamError::schema(format!("unknown occurrence '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TruncatePathsParams {
    /// Events before this anchor are dropped.
    pub drop_before: Option<String>,
    /// Events after this anchor are dropped.
    pub drop_after: Option<String>,
    pub occurrence_before: Occurrence,
    pub occurrence_after: Occurrence,
    /// Moves the left window edge by this many events.
    pub shift_before: i64,
    /// Moves the right window edge by this many events.
    pub shift_after: i64,
}

impl ParamModel for TruncatePathsParams {
    const PROCESSOR: &'static str = "TruncatePaths";

    fn specs() -> Vec<ParamSpec> {
        vec![
            ParamSpec::optional("drop_before", ParamKind::String),
            ParamSpec::optional("drop_after", ParamKind::String),
            ParamSpec::optional("occurrence_before", ParamKind::Enum(OCCURRENCES))
                .with_default(json!("first")),
            ParamSpec::optional("occurrence_after", ParamKind::Enum(OCCURRENCES))
                .with_default(json!("first")),
            ParamSpec::optional("shift_before", ParamKind::Integer).with_default(json!(0)),
            ParamSpec::optional("shift_after", ParamKind::Integer).with_default(json!(0)),
        ]
    }

    fn from_json(value: &Json, functions: &FunctionRegistry) -> EventstreamResult<Self> {
        let r = ParamReader::new(Self::PROCESSOR, value, &Self::specs(), functions)?;
        let occurrence = |field: &str| -> EventstreamResult<Occurrence> {
            r.one_of(field, OCCURRENCES)?
                .map(|s| s.parse::<Occurrence>().map_err(|e| r.fail(field, e.to_string())))
                .transpose()
                .map(Option::unwrap_or_default)
        };
        let params = Self {
            drop_before: r.string("drop_before")?,
            drop_after: r.string("drop_after")?,
            occurrence_before: occurrence("occurrence_before")?,
            occurrence_after: occurrence("occurrence_after")?,
            shift_before: r.integer("shift_before")?.unwrap_or(0),
            shift_after: r.integer("shift_after")?.unwrap_or(0),
        };
        if params.drop_before.is_none() && params.drop_after.is_none() {
            return Err(r.fail("drop_before", "either drop_before or drop_after is required"));
        }
        Ok(params)
    }

    fn to_json(&self) -> Json {
        let mut out = Map::new();
        if let Some(before) = &self.drop_before {
            out.insert("drop_before".into(), json!(before));
            out.insert("occurrence_before".into(), json!(self.occurrence_before.as_str()));
            out.insert("shift_before".into(), json!(self.shift_before));
        }
        if let Some(after) = &self.drop_after {
            out.insert("drop_after".into(), json!(after));
            out.insert("occurrence_after".into(), json!(self.occurrence_after.as_str()));
            out.insert("shift_after".into(), json!(self.shift_after));
        }
        Json::Object(out)
    }
}

/// Keeps, per user, the events between the `drop_before` anchor and the `drop_after` anchor
/// (both inclusive, each moved by its shift). Users lacking an anchor keep that side intact.
#[derive(Debug, Clone)]
pub struct TruncatePaths {
    params: TruncatePathsParams,
}

impl TruncatePaths {
    pub fn new(params: TruncatePathsParams) -> Self {
        Self { params }
    }

    fn window(&self, events: &[&Event]) -> (i64, i64) {
        let p = &self.params;
        let start = p
            .drop_before
            .as_deref()
            .and_then(|name| p.occurrence_before.locate(events, name))
            .map_or(i64::MIN, |i| (i as i64).saturating_add(p.shift_before));
        let end = p
            .drop_after
            .as_deref()
            .and_then(|name| p.occurrence_after.locate(events, name))
            .map_or(i64::MAX, |i| (i as i64).saturating_add(p.shift_after));
        (start, end)
    }
}

impl From<TruncatePathsParams> for TruncatePaths {
    fn from(params: TruncatePathsParams) -> Self {
        Self::new(params)
    }
}

impl DataProcessor for TruncatePaths {
    fn name(&self) -> &'static str {
        TruncatePathsParams::PROCESSOR
    }

    fn params(&self) -> Json {
        self.params.to_json()
    }

    fn widgets(&self) -> Vec<WidgetDescriptor> {
        TruncatePathsParams::widgets()
    }

    fn transform(&self, input: &Arc<Eventstream>) -> EventstreamResult<ProcessorOutput> {
        let mut delta = Eventstream::delta(input);
        for path in input.paths() {
            let (start, end) = self.window(&path.events);
            for (i, event) in path.events.iter().enumerate() {
                let i = i as i64;
                if i < start || i > end {
                    delta.delete(event);
                }
            }
        }
        Ok(ProcessorOutput::Delta(delta.finish()?))
    }
}
