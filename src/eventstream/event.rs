//! Event rows and their identifiers.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EventstreamError, EventstreamResult};
use crate::event_type::EventType;
use crate::time::Timestamp;
use crate::types::Value;

use super::context::EventstreamContext;

/// Opaque, process-unique identifier of an event row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an eventstream instance (the `eventstream_index` counter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(pub u64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owner of a path. Raw inputs may carry integer or string ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Int(i64),
    Str(String),
}

impl UserId {
    /// Read a user id from a raw cell. Nulls, floats with a fraction and booleans are rejected.
    pub fn from_value(value: &Value) -> EventstreamResult<Self> {
        match value {
            Value::Int64(v) => Ok(UserId::Int(*v)),
            Value::Utf8(s) => Ok(UserId::Str(s.clone())),
            Value::Float64(v) if v.fract() == 0.0 => Ok(UserId::Int(*v as i64)),
            other => Err(EventstreamError::schema(format!(
                "user id must be an integer or a string, got {other:?}"
            ))),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            UserId::Int(v) => Value::Int64(*v),
            UserId::Str(s) => Value::Utf8(s.clone()),
        }
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserId::Int(v) => write!(f, "{v}"),
            UserId::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for UserId {
    fn from(v: i64) -> Self {
        UserId::Int(v)
    }
}

impl From<&str> for UserId {
    fn from(v: &str) -> Self {
        UserId::Str(v.to_string())
    }
}

/// One row of an eventstream: the tuple of all schema-declared columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: EventId,
    /// Canonical position within the owning stream; a tie-break hint on freshly built rows.
    pub index: u64,
    pub name: String,
    pub event_type: EventType,
    pub timestamp: Timestamp,
    pub user_id: UserId,
    pub custom: BTreeMap<String, Value>,
}

impl Event {
    /// Value of a custom column; absent columns read as null.
    pub fn custom(&self, col: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.custom.get(col).unwrap_or(&NULL)
    }

    /// Compare every schema column except `event_id` and `event_index`.
    pub fn same_values(&self, other: &Event) -> bool {
        if self.name != other.name
            || self.event_type != other.event_type
            || self.timestamp != other.timestamp
            || self.user_id != other.user_id
        {
            return false;
        }
        self.custom
            .keys()
            .chain(other.custom.keys())
            .all(|k| self.custom(k) == other.custom(k))
    }

    /// A new event anchored at `self`: fresh id, same user, timestamp, custom values and
    /// tie-break index, with the given name and type.
    pub fn derive(
        &self,
        ctx: &EventstreamContext,
        name: impl Into<String>,
        event_type: EventType,
    ) -> Event {
        Event {
            id: ctx.next_event_id(),
            index: self.index,
            name: name.into(),
            event_type,
            timestamp: self.timestamp,
            user_id: self.user_id.clone(),
            custom: self.custom.clone(),
        }
    }

    /// A marker whose name equals its type tag (`path_start`, `session_end`, ...).
    pub fn marker(&self, ctx: &EventstreamContext, event_type: EventType) -> Event {
        self.derive(ctx, event_type.as_str(), event_type)
    }

    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Event {
        self.timestamp = timestamp;
        self
    }
}
