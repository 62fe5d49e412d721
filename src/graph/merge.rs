//! Lineage-keyed union of sibling branches.
//!
//! Rows of different parents are matched through their lineage: two rows correspond when they
//! descend from the same origin row (and are the same occurrence of it within their branch).
//! Matched rows are reconciled against the nearest version both lineage chains share.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{EventstreamError, EventstreamResult};
use crate::eventstream::{Event, EventId, Eventstream, Relation, Row, StreamId};

struct Merged {
    event: Event,
    deleted: bool,
    refs: Vec<Option<EventId>>,
    /// Tie-break index of the origin row in its own stream.
    origin_index: u64,
    /// Lineage of the version currently held, newest first.
    chain: Vec<(StreamId, Event)>,
}

/// Merge `parents` into one stream holding a relation to each of them.
///
/// - rows present in a later parent but absent so far are appended, in parent order;
/// - rows soft-deleted in any parent are soft-deleted in the result;
/// - a row rewritten in one parent (relative to the common ancestor version) replaces the
///   unchanged version;
/// - two parents rewriting the same ancestor row differently is a
///   [`EventstreamError::LineageConflict`].
pub(crate) fn merge_parents(parents: &[Arc<Eventstream>]) -> EventstreamResult<Eventstream> {
    let Some(first) = parents.first() else {
        return Err(EventstreamError::graph(None, "merge needs at least one parent"));
    };
    let mut schema = first.schema().clone();
    for p in &parents[1..] {
        schema.ensure_compatible(p.schema())?;
        schema.union_custom_cols(p.schema());
    }
    let slots = parents.len();

    let mut merged: Vec<Merged> = Vec::new();
    let mut by_key: HashMap<(EventId, usize), usize> = HashMap::new();
    let mut conflicts: Vec<EventId> = Vec::new();

    for (slot, parent) in parents.iter().enumerate() {
        let mut occurrences: HashMap<EventId, usize> = HashMap::new();
        for (event, deleted) in parent.events_with_deleted() {
            let chain = parent.lineage(event.id);
            let (origin, origin_index) = chain
                .last()
                .map_or((event.id, event.index), |(_, e)| (e.id, e.index));
            let nth = occurrences.entry(origin).or_insert(0);
            let key = (origin, *nth);
            *nth += 1;

            match by_key.get(&key) {
                None => {
                    let mut refs = vec![None; slots];
                    refs[slot] = Some(event.id);
                    by_key.insert(key, merged.len());
                    merged.push(Merged {
                        event: event.clone(),
                        deleted,
                        refs,
                        origin_index,
                        chain,
                    });
                }
                Some(&pos) => {
                    let m = &mut merged[pos];
                    m.refs[slot] = Some(event.id);
                    m.deleted |= deleted;
                    let Some(ancestor) = common_ancestor(&m.chain, &chain) else {
                        continue;
                    };
                    let ours = !m.event.same_values(ancestor);
                    let theirs = !event.same_values(ancestor);
                    if theirs && ours && !m.event.same_values(event) {
                        conflicts.extend([m.event.id, event.id]);
                    } else if theirs && !ours {
                        m.event = event.clone();
                        m.chain = chain;
                    }
                }
            }
        }
    }

    if !conflicts.is_empty() {
        return Err(EventstreamError::LineageConflict {
            node: None,
            event_ids: conflicts,
        });
    }

    let relations = parents
        .iter()
        .map(|p| Relation::new(format!("ref_{}", p.id()), Arc::clone(p)))
        .collect();
    // Branch indices are renumbered per branch, so equal (timestamp, type) rows from different
    // parents are ordered by their origin instead. Rows new to a branch keep append order.
    merged.sort_by_key(|m| m.origin_index);
    let rows = merged
        .into_iter()
        .enumerate()
        .map(|(rank, mut m)| {
            m.event.index = rank as u64;
            Row {
                event: m.event,
                deleted: m.deleted,
                refs: m.refs,
            }
        })
        .collect();
    Eventstream::from_rows(
        schema,
        first.index_order().clone(),
        relations,
        rows,
        first.context(),
    )
}

/// Nearest version of the row present in both chains.
fn common_ancestor<'a>(
    ours: &[(StreamId, Event)],
    theirs: &'a [(StreamId, Event)],
) -> Option<&'a Event> {
    theirs
        .iter()
        .find(|(stream, event)| ours.iter().any(|(s, e)| s == stream && e.id == event.id))
        .map(|(_, event)| event)
}
