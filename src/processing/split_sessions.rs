//! Session splitting: assign session ids and inject session markers.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value as Json, json};
use tracing::debug;

use crate::error::{EventstreamError, EventstreamResult};
use crate::event_type::EventType;
use crate::eventstream::{Event, EventId, Eventstream, UserPath};
use crate::params::{FunctionRegistry, ParamKind, ParamModel, ParamReader, ParamSpec, WidgetDescriptor};
use crate::time::TimeSpan;
use crate::types::Value;

use super::{DataProcessor, ProcessorOutput};

/// Delimiter events separating sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delimiters {
    /// One event both ends a session and starts the next.
    Single(String),
    /// `(start, end)`: the first opens a session, the second closes it.
    Pair(String, String),
}

/// How session boundaries are found.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionSplit {
    /// A new session starts when the gap to the previous event exceeds the timeout.
    Timeout(TimeSpan),
    /// Boundaries at delimiter events; the delimiters themselves are removed.
    DelimiterEvents(Delimiters),
    /// Sessions are given by an existing custom column.
    DelimiterCol(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SplitSessionsParams {
    pub split: SessionSplit,
    /// Column receiving the session id, `"{user_id}_{n}"`.
    pub session_col: String,
    /// Use `session_start_cropped`/`session_end_cropped` for each user's outermost sessions.
    pub mark_truncated: bool,
}

impl SplitSessionsParams {
    pub fn new(split: SessionSplit) -> Self {
        Self {
            split,
            session_col: "session_id".to_string(),
            mark_truncated: false,
        }
    }
}

impl ParamModel for SplitSessionsParams {
    const PROCESSOR: &'static str = "SplitSessions";

    fn specs() -> Vec<ParamSpec> {
        vec![
            ParamSpec::optional("timeout", ParamKind::Time),
            ParamSpec::optional("delimiter_events", ParamKind::ListOfString),
            ParamSpec::optional("delimiter_col", ParamKind::String),
            ParamSpec::optional("session_col", ParamKind::String).with_default(json!("session_id")),
            ParamSpec::optional("mark_truncated", ParamKind::Boolean).with_default(json!(false)),
        ]
    }

    fn from_json(value: &Json, functions: &FunctionRegistry) -> EventstreamResult<Self> {
        let r = ParamReader::new(Self::PROCESSOR, value, &Self::specs(), functions)?;
        let timeout = r.time("timeout")?;
        let delimiter_events = r.strings("delimiter_events")?;
        let delimiter_col = r.string("delimiter_col")?;
        let split = match (timeout, delimiter_events, delimiter_col) {
            (Some(t), None, None) => SessionSplit::Timeout(t),
            (None, Some(events), None) => match events.as_slice() {
                [single] => SessionSplit::DelimiterEvents(Delimiters::Single(single.clone())),
                [start, end] => {
                    SessionSplit::DelimiterEvents(Delimiters::Pair(start.clone(), end.clone()))
                }
                _ => {
                    return Err(r.fail(
                        "delimiter_events",
                        format!("expected one or two event names, got {}", events.len()),
                    ));
                }
            },
            (None, None, Some(col)) => SessionSplit::DelimiterCol(col),
            _ => {
                return Err(r.fail(
                    "timeout",
                    "exactly one of timeout, delimiter_events or delimiter_col is required",
                ));
            }
        };
        Ok(Self {
            split,
            session_col: r.string("session_col")?.unwrap_or_else(|| "session_id".to_string()),
            mark_truncated: r.boolean("mark_truncated")?.unwrap_or(false),
        })
    }

    fn to_json(&self) -> Json {
        let mut out = Map::new();
        match &self.split {
            SessionSplit::Timeout(t) => {
                out.insert("timeout".into(), json!(t));
            }
            SessionSplit::DelimiterEvents(Delimiters::Single(e)) => {
                out.insert("delimiter_events".into(), json!([e]));
            }
            SessionSplit::DelimiterEvents(Delimiters::Pair(s, e)) => {
                out.insert("delimiter_events".into(), json!([s, e]));
            }
            SessionSplit::DelimiterCol(c) => {
                out.insert("delimiter_col".into(), json!(c));
            }
        }
        out.insert("session_col".into(), json!(self.session_col));
        out.insert("mark_truncated".into(), json!(self.mark_truncated));
        Json::Object(out)
    }
}

/// One user's sessions: member event ids in order, plus the session id value.
struct Session {
    value: Value,
    events: Vec<EventId>,
}

/// Writes a session id column and brackets every session with `session_start`/`session_end`.
///
/// Produces a full output: delimiter events are removed, every other row keeps its id.
#[derive(Debug, Clone)]
pub struct SplitSessions {
    params: SplitSessionsParams,
}

impl SplitSessions {
    pub fn new(params: SplitSessionsParams) -> Self {
        Self { params }
    }

    /// Sessions of one path, and the delimiter events to drop.
    fn sessions(&self, path: &UserPath<'_>) -> (Vec<Session>, Vec<EventId>) {
        let user = path.user_id;
        let numbered = |n: usize, events: Vec<EventId>| Session {
            value: Value::Utf8(format!("{user}_{n}")),
            events,
        };
        let mut sessions: Vec<Vec<EventId>> = Vec::new();
        let mut delimiters = Vec::new();

        match &self.params.split {
            SessionSplit::Timeout(timeout) => {
                let limit = timeout.as_nanos();
                let mut prev: Option<&Event> = None;
                for &e in &path.events {
                    let gap = prev.map(|p| e.timestamp - p.timestamp);
                    if gap.is_none_or(|g| g > limit) {
                        sessions.push(Vec::new());
                    }
                    if let Some(current) = sessions.last_mut() {
                        current.push(e.id);
                    }
                    prev = Some(e);
                }
            }
            SessionSplit::DelimiterEvents(Delimiters::Single(name)) => {
                let mut current = Vec::new();
                for e in &path.events {
                    if e.name == *name {
                        delimiters.push(e.id);
                        sessions.push(std::mem::take(&mut current));
                    } else {
                        current.push(e.id);
                    }
                }
                sessions.push(current);
            }
            SessionSplit::DelimiterEvents(Delimiters::Pair(start, end)) => {
                let mut open: Option<Vec<EventId>> = None;
                for e in &path.events {
                    if e.name == *start {
                        delimiters.push(e.id);
                        sessions.extend(open.replace(Vec::new()));
                    } else if e.name == *end {
                        delimiters.push(e.id);
                        sessions.extend(open.take());
                    } else if let Some(current) = open.as_mut() {
                        current.push(e.id);
                    }
                }
                sessions.extend(open);
            }
            SessionSplit::DelimiterCol(col) => {
                let runs = path.events.chunk_by(|a, b| a.custom(col) == b.custom(col));
                let out = runs
                    .filter(|run| !run[0].custom(col).is_null())
                    .map(|run| Session {
                        value: run[0].custom(col).clone(),
                        events: run.iter().map(|e| e.id).collect(),
                    })
                    .collect();
                return (out, delimiters);
            }
        }

        let out = sessions
            .into_iter()
            .filter(|s| !s.is_empty())
            .enumerate()
            .map(|(i, events)| numbered(i + 1, events))
            .collect();
        (out, delimiters)
    }
}

impl From<SplitSessionsParams> for SplitSessions {
    fn from(params: SplitSessionsParams) -> Self {
        Self::new(params)
    }
}

impl DataProcessor for SplitSessions {
    fn name(&self) -> &'static str {
        SplitSessionsParams::PROCESSOR
    }

    fn params(&self) -> Json {
        self.params.to_json()
    }

    fn widgets(&self) -> Vec<WidgetDescriptor> {
        SplitSessionsParams::widgets()
    }

    fn transform(&self, input: &Arc<Eventstream>) -> EventstreamResult<ProcessorOutput> {
        let session_col = self.params.session_col.as_str();
        if let SessionSplit::DelimiterCol(col) = &self.params.split {
            if !input.schema().custom_cols.contains(col) {
                return Err(EventstreamError::processor(
                    self.name(),
                    format!("delimiter column '{col}' is not a custom column of the input"),
                ));
            }
        }

        let mut per_user = Vec::new();
        let mut delimiters = Vec::new();
        for path in input.paths() {
            let (sessions, dropped) = self.sessions(&path);
            per_user.push(sessions);
            delimiters.extend(dropped);
        }

        let mut out = Eventstream::derive(input);
        out.soft_delete(delimiters);
        out.drop_soft_deleted();

        match &self.params.split {
            SessionSplit::DelimiterCol(col) => out
                .rename_custom_col(col, session_col)
                .map_err(|e| EventstreamError::processor(self.name(), e.to_string()))?,
            _ => {
                let mut values: HashMap<EventId, Value> = HashMap::new();
                for session in per_user.iter().flatten() {
                    for id in &session.events {
                        values.insert(*id, session.value.clone());
                    }
                }
                let column = out
                    .events()
                    .map(|e| values.remove(&e.id).unwrap_or(Value::Null))
                    .collect();
                out.add_custom_col(session_col, column)
                    .map_err(|e| EventstreamError::processor(self.name(), e.to_string()))?;
            }
        }

        let ctx = out.context().clone();
        let mut markers = Vec::new();
        for sessions in &per_user {
            let count = sessions.len();
            for (i, session) in sessions.iter().enumerate() {
                let first = session.events.first().and_then(|id| out.get(*id));
                let last = session.events.last().and_then(|id| out.get(*id));
                let (Some(first), Some(last)) = (first, last) else { continue };
                let cropped = self.params.mark_truncated;
                let start = if cropped && i == 0 {
                    EventType::SessionStartCropped
                } else {
                    EventType::SessionStart
                };
                let end = if cropped && i + 1 == count {
                    EventType::SessionEndCropped
                } else {
                    EventType::SessionEnd
                };
                markers.push(first.marker(&ctx, start));
                markers.push(last.marker(&ctx, end));
            }
        }
        debug!(
            processor = self.name(),
            sessions = per_user.iter().map(Vec::len).sum::<usize>(),
            markers = markers.len(),
            "sessions split"
        );
        out.push_events(markers)?;
        Ok(ProcessorOutput::Full(out))
    }
}
