//! Closed set of event-type tags and the total order used to break timestamp ties.
//!
//! Boundary and state markers sort before raw events at the same timestamp (a `path_start`
//! precedes the first raw event), closing markers sort after (a `path_end` follows the last one).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EventstreamError, EventstreamResult};

const TAG_COUNT: usize = 21;

/// Event-type tag carried by every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Profile,
    PathStart,
    NewUser,
    ExistingUser,
    CroppedLeft,
    SessionStart,
    SessionStartCropped,
    GroupAlias,
    Raw,
    RawSleep,
    Synthetic,
    SyntheticSleep,
    PositiveTarget,
    NegativeTarget,
    SessionEndCropped,
    SessionEnd,
    SessionSleep,
    AbsentUser,
    LostUser,
    CroppedRight,
    PathEnd,
}

impl EventType {
    /// All tags, lowest rank first.
    pub const ALL: [EventType; TAG_COUNT] = [
        EventType::Profile,
        EventType::PathStart,
        EventType::NewUser,
        EventType::ExistingUser,
        EventType::CroppedLeft,
        EventType::SessionStart,
        EventType::SessionStartCropped,
        EventType::GroupAlias,
        EventType::Raw,
        EventType::RawSleep,
        EventType::Synthetic,
        EventType::SyntheticSleep,
        EventType::PositiveTarget,
        EventType::NegativeTarget,
        EventType::SessionEndCropped,
        EventType::SessionEnd,
        EventType::SessionSleep,
        EventType::AbsentUser,
        EventType::LostUser,
        EventType::CroppedRight,
        EventType::PathEnd,
    ];

    /// Column representation of the tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Profile => "profile",
            EventType::PathStart => "path_start",
            EventType::NewUser => "new_user",
            EventType::ExistingUser => "existing_user",
            EventType::CroppedLeft => "cropped_left",
            EventType::SessionStart => "session_start",
            EventType::SessionStartCropped => "session_start_cropped",
            EventType::GroupAlias => "group_alias",
            EventType::Raw => "raw",
            EventType::RawSleep => "raw_sleep",
            EventType::Synthetic => "synthetic",
            EventType::SyntheticSleep => "synthetic_sleep",
            EventType::PositiveTarget => "positive_target",
            EventType::NegativeTarget => "negative_target",
            EventType::SessionEndCropped => "session_end_cropped",
            EventType::SessionEnd => "session_end",
            EventType::SessionSleep => "session_sleep",
            EventType::AbsentUser => "absent_user",
            EventType::LostUser => "lost_user",
            EventType::CroppedRight => "cropped_right",
            EventType::PathEnd => "path_end",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = EventstreamError;

    fn from_str(s: &str) -> EventstreamResult<Self> {
        EventType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| EventstreamError::schema(format!("unknown event type '{s}'")))
    }
}

/// Ranking of event types used as the secondary canonical sort key.
///
/// Defaults to the declaration order of [`EventType`]. A custom order may list a subset; tags
/// it omits rank after every listed tag, in their default relative order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexOrder {
    ranks: [usize; TAG_COUNT],
    order: Vec<EventType>,
}

impl IndexOrder {
    /// Build an order from a list of tags, lowest rank first.
    pub fn new(order: Vec<EventType>) -> Self {
        let mut ranks = [usize::MAX; TAG_COUNT];
        for (rank, t) in order.iter().enumerate() {
            let slot = &mut ranks[*t as usize];
            if *slot == usize::MAX {
                *slot = rank;
            }
        }
        let listed = order.len();
        for (i, slot) in ranks.iter_mut().enumerate() {
            if *slot == usize::MAX {
                *slot = listed + i;
            }
        }
        Self { ranks, order }
    }

    /// Rank of `event_type` under this order.
    pub fn rank(&self, event_type: EventType) -> usize {
        self.ranks[event_type as usize]
    }

    /// Tags as listed at construction.
    pub fn as_slice(&self) -> &[EventType] {
        &self.order
    }
}

impl Default for IndexOrder {
    fn default() -> Self {
        Self::new(EventType::ALL.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::{EventType, IndexOrder};

    #[test]
    fn default_order_matches_declaration() {
        let order = IndexOrder::default();
        for pair in EventType::ALL.windows(2) {
            assert!(order.rank(pair[0]) < order.rank(pair[1]), "{pair:?}");
        }
        assert!(order.rank(EventType::PathStart) < order.rank(EventType::Raw));
        assert!(order.rank(EventType::Raw) < order.rank(EventType::PathEnd));
        assert!(order.rank(EventType::SessionStart) < order.rank(EventType::GroupAlias));
        assert!(order.rank(EventType::LostUser) < order.rank(EventType::CroppedRight));
    }

    #[test]
    fn tags_round_trip_through_strings() {
        for t in EventType::ALL {
            assert_eq!(t.as_str().parse::<EventType>().unwrap(), t);
        }
        assert!("click".parse::<EventType>().is_err());
    }

    #[test]
    fn custom_order_ranks_unlisted_tags_last() {
        let order = IndexOrder::new(vec![EventType::PathEnd, EventType::Raw]);
        assert_eq!(order.rank(EventType::PathEnd), 0);
        assert_eq!(order.rank(EventType::Raw), 1);
        assert!(order.rank(EventType::PathStart) > order.rank(EventType::Raw));
        assert!(order.rank(EventType::Profile) < order.rank(EventType::PathStart));
    }

    #[test]
    fn serde_uses_snake_case_names() {
        let json = serde_json::to_string(&EventType::SessionStartCropped).unwrap();
        assert_eq!(json, "\"session_start_cropped\"");
    }
}
