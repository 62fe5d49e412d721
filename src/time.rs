//! Timestamps and time-span parameters.

use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{EventstreamError, EventstreamResult};

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Absolute event time, nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Build a timestamp from whole seconds.
    pub fn from_secs(secs: i64) -> Self {
        Timestamp(secs.saturating_mul(NANOS_PER_SECOND))
    }

    /// Nanoseconds since the epoch.
    pub fn as_nanos(&self) -> i64 {
        self.0
    }

    /// Seconds since the epoch, as a float.
    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / NANOS_PER_SECOND as f64
    }
}

impl Add<i64> for Timestamp {
    type Output = Timestamp;

    fn add(self, nanos: i64) -> Timestamp {
        Timestamp(self.0.saturating_add(nanos))
    }
}

impl Sub for Timestamp {
    type Output = i64;

    fn sub(self, rhs: Timestamp) -> i64 {
        self.0.saturating_sub(rhs.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// Datetime unit codes accepted by time-span parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Weeks,
    Days,
    Hours,
    Minutes,
    Seconds,
    Millis,
    Micros,
    Nanos,
}

impl TimeUnit {
    /// All units, largest first.
    pub const ALL: [TimeUnit; 8] = [
        TimeUnit::Weeks,
        TimeUnit::Days,
        TimeUnit::Hours,
        TimeUnit::Minutes,
        TimeUnit::Seconds,
        TimeUnit::Millis,
        TimeUnit::Micros,
        TimeUnit::Nanos,
    ];

    /// Datetime code of the unit (`"s"`, `"ms"`, ...).
    pub fn code(&self) -> &'static str {
        match self {
            TimeUnit::Weeks => "W",
            TimeUnit::Days => "D",
            TimeUnit::Hours => "h",
            TimeUnit::Minutes => "m",
            TimeUnit::Seconds => "s",
            TimeUnit::Millis => "ms",
            TimeUnit::Micros => "us",
            TimeUnit::Nanos => "ns",
        }
    }

    /// Length of one unit in nanoseconds.
    pub fn nanos(&self) -> i64 {
        match self {
            TimeUnit::Weeks => 7 * 24 * 3600 * NANOS_PER_SECOND,
            TimeUnit::Days => 24 * 3600 * NANOS_PER_SECOND,
            TimeUnit::Hours => 3600 * NANOS_PER_SECOND,
            TimeUnit::Minutes => 60 * NANOS_PER_SECOND,
            TimeUnit::Seconds => NANOS_PER_SECOND,
            TimeUnit::Millis => 1_000_000,
            TimeUnit::Micros => 1_000,
            TimeUnit::Nanos => 1,
        }
    }

    /// Convert a raw numeric timestamp expressed in this unit.
    pub fn timestamp(&self, value: f64) -> Timestamp {
        Timestamp((value * self.nanos() as f64).round() as i64)
    }
}

impl FromStr for TimeUnit {
    type Err = EventstreamError;

    fn from_str(s: &str) -> EventstreamResult<Self> {
        TimeUnit::ALL
            .iter()
            .copied()
            .find(|u| u.code() == s)
            .ok_or_else(|| EventstreamError::schema(format!("unknown time unit '{s}'")))
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A `(value, unit)` duration, e.g. `(30.0, Minutes)`.
///
/// Serializes as the JSON pair `[30.0, "m"]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSpan {
    pub value: f64,
    pub unit: TimeUnit,
}

impl TimeSpan {
    pub fn new(value: f64, unit: TimeUnit) -> Self {
        Self { value, unit }
    }

    pub fn seconds(value: f64) -> Self {
        Self::new(value, TimeUnit::Seconds)
    }

    /// Span length in nanoseconds.
    pub fn as_nanos(&self) -> i64 {
        (self.value * self.unit.nanos() as f64).round() as i64
    }
}

impl Serialize for TimeSpan {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tup = serializer.serialize_tuple(2)?;
        tup.serialize_element(&self.value)?;
        tup.serialize_element(self.unit.code())?;
        tup.end()
    }
}

impl<'de> Deserialize<'de> for TimeSpan {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SpanVisitor;

        impl<'de> Visitor<'de> for SpanVisitor {
            type Value = TimeSpan;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a [value, unit] pair")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<TimeSpan, A::Error> {
                let value: f64 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let code: String = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                let unit = code.parse::<TimeUnit>().map_err(de::Error::custom)?;
                Ok(TimeSpan { value, unit })
            }
        }

        deserializer.deserialize_tuple(2, SpanVisitor)
    }
}
