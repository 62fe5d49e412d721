//! The eventstream: an ordered, typed, lineage-aware table of user events.
//!
//! Rows are kept in canonical order `(timestamp, event type rank, event_index)`. Public
//! mutation is limited to [`Eventstream::append`], [`Eventstream::join`],
//! [`Eventstream::soft_delete`] and [`Eventstream::add_custom_col`]; everything else treats the
//! stream as immutable.
//!
//! Each stream holds a list of [`Relation`]s to the parent streams it was derived from. Every
//! row stores, per relation, the `event_id` of the parent row it came from (if any). Following
//! those references yields the row's lineage back to the row that first introduced it.
//!
//! ## Example
//!
//! ```rust
//! use rust_eventstream::eventstream::{Eventstream, EventstreamContext, EventstreamOptions};
//! use rust_eventstream::schema::RawDataSchema;
//! use rust_eventstream::types::{DataSet, DataType, Field, Schema, Value};
//!
//! let raw = DataSet::new(
//!     Schema::new(vec![
//!         Field::new("user_id", DataType::Int64),
//!         Field::new("event", DataType::Utf8),
//!         Field::new("timestamp", DataType::Int64),
//!     ]),
//!     vec![
//!         vec![Value::Int64(1), Value::from("A"), Value::Int64(0)],
//!         vec![Value::Int64(1), Value::from("B"), Value::Int64(5)],
//!     ],
//! );
//! let ctx = EventstreamContext::new();
//! let stream =
//!     Eventstream::new(&raw, &RawDataSchema::default(), EventstreamOptions::default(), &ctx)
//!         .unwrap();
//! // path_start, A, B, path_end
//! assert_eq!(stream.len(), 4);
//! ```

mod build;
mod context;
mod delta;
mod event;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{EventstreamError, EventstreamResult};
use crate::event_type::{EventType, IndexOrder};
use crate::schema::EventstreamSchema;
use crate::time::{TimeUnit, Timestamp};
use crate::types::{DataSet, DataType, Field, Schema, Value};

pub use context::EventstreamContext;
pub use delta::DeltaBuilder;
pub use event::{Event, EventId, StreamId, UserId};

/// Back-link from a stream to a parent stream.
///
/// `ref_col` names the hidden column holding, per row, the parent's `event_id`.
#[derive(Clone)]
pub struct Relation {
    pub ref_col: String,
    pub eventstream: Arc<Eventstream>,
}

impl Relation {
    pub fn new(ref_col: impl Into<String>, eventstream: Arc<Eventstream>) -> Self {
        Self {
            ref_col: ref_col.into(),
            eventstream,
        }
    }
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("ref_col", &self.ref_col)
            .field("eventstream", &self.eventstream.id())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Row {
    pub(crate) event: Event,
    pub(crate) deleted: bool,
    /// One slot per relation of the owning stream.
    pub(crate) refs: Vec<Option<EventId>>,
}

/// Options controlling eventstream construction.
///
/// Use [`Default`] for common cases.
#[derive(Debug, Clone)]
pub struct EventstreamOptions {
    /// Column names for each role. If `None`, derived from the raw-data schema.
    pub schema: Option<EventstreamSchema>,
    /// Inject `path_start`/`path_end` per user (skipped for derived streams).
    pub add_start_end_events: bool,
    /// Event-type ranking; defaults to [`IndexOrder::default`].
    pub index_order: Option<IndexOrder>,
    /// Parent relations; `ref_col` must name a raw column holding parent event ids.
    pub relations: Vec<Relation>,
    /// Unit of numeric raw timestamps.
    pub timestamp_unit: TimeUnit,
}

impl Default for EventstreamOptions {
    fn default() -> Self {
        Self {
            schema: None,
            add_start_end_events: true,
            index_order: None,
            relations: Vec::new(),
            timestamp_unit: TimeUnit::Seconds,
        }
    }
}

/// Events of one user in canonical order.
#[derive(Debug, Clone)]
pub struct UserPath<'a> {
    pub user_id: &'a UserId,
    pub events: Vec<&'a Event>,
}

impl<'a> UserPath<'a> {
    pub fn first(&self) -> Option<&'a Event> {
        self.events.first().copied()
    }

    pub fn last(&self) -> Option<&'a Event> {
        self.events.last().copied()
    }

    /// Time between the first and last event, in nanoseconds.
    pub fn duration(&self) -> i64 {
        match (self.first(), self.last()) {
            (Some(a), Some(b)) => b.timestamp - a.timestamp,
            _ => 0,
        }
    }

    pub fn has_type(&self, event_type: EventType) -> bool {
        self.events.iter().any(|e| e.event_type == event_type)
    }
}

/// Ordered, typed, lineage-aware collection of events.
pub struct Eventstream {
    id: StreamId,
    ctx: EventstreamContext,
    schema: EventstreamSchema,
    index_order: IndexOrder,
    relations: Vec<Relation>,
    rows: Vec<Row>,
    positions: HashMap<EventId, usize>,
}

impl fmt::Debug for Eventstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Eventstream")
            .field("id", &self.id)
            .field("rows", &self.len())
            .field("deleted", &(self.rows.len() - self.len()))
            .field("custom_cols", &self.schema.custom_cols)
            .field("relations", &self.relations)
            .finish()
    }
}

impl Eventstream {
    /// Build a stream directly from typed events. Events are re-sorted; their `index` acts as the
    /// tie-break hint and is then reassigned.
    pub fn from_events(
        schema: EventstreamSchema,
        events: Vec<Event>,
        index_order: IndexOrder,
        ctx: &EventstreamContext,
    ) -> EventstreamResult<Self> {
        let mut stream = Self::empty(schema, index_order, Vec::new(), ctx);
        stream.push_events(events)?;
        Ok(stream)
    }

    pub(crate) fn empty(
        schema: EventstreamSchema,
        index_order: IndexOrder,
        relations: Vec<Relation>,
        ctx: &EventstreamContext,
    ) -> Self {
        Self {
            id: ctx.next_stream_id(),
            ctx: ctx.clone(),
            schema,
            index_order,
            relations,
            rows: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// A child of `parent` holding its live rows with unchanged event ids.
    ///
    /// The child carries one relation (`ref_<parent id>`) and every row references itself in
    /// the parent, so lineage can be followed back through it.
    pub fn derive(parent: &Arc<Eventstream>) -> Eventstream {
        let relation = Relation::new(format!("ref_{}", parent.id), Arc::clone(parent));
        let mut child = Self::empty(
            parent.schema.clone(),
            parent.index_order.clone(),
            vec![relation],
            &parent.ctx,
        );
        child.rows = parent
            .rows
            .iter()
            .filter(|r| !r.deleted)
            .map(|r| Row {
                event: r.event.clone(),
                deleted: false,
                refs: vec![Some(r.event.id)],
            })
            .collect();
        child.canonicalize();
        child
    }

    /// Start an additive delta against `parent`.
    pub fn delta(parent: &Arc<Eventstream>) -> DeltaBuilder {
        DeltaBuilder::new(parent)
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn schema(&self) -> &EventstreamSchema {
        &self.schema
    }

    pub fn index_order(&self) -> &IndexOrder {
        &self.index_order
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn context(&self) -> &EventstreamContext {
        &self.ctx
    }

    /// Number of live (not soft-deleted) events.
    pub fn len(&self) -> usize {
        self.rows.iter().filter(|r| !r.deleted).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live events in canonical order.
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.rows.iter().filter(|r| !r.deleted).map(|r| &r.event)
    }

    /// All events including soft-deleted ones, paired with their deletion flag.
    pub fn events_with_deleted(&self) -> impl Iterator<Item = (&Event, bool)> {
        self.rows.iter().map(|r| (&r.event, r.deleted))
    }

    pub(crate) fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Look up an event (live or soft-deleted) by id.
    pub fn get(&self, id: EventId) -> Option<&Event> {
        self.positions.get(&id).map(|&p| &self.rows[p].event)
    }

    pub fn is_deleted(&self, id: EventId) -> bool {
        self.positions
            .get(&id)
            .is_some_and(|&p| self.rows[p].deleted)
    }

    /// Parent event id recorded for `id` under the relation named `ref_col`.
    pub fn parent_ref(&self, id: EventId, ref_col: &str) -> Option<EventId> {
        let rel = self.relations.iter().position(|r| r.ref_col == ref_col)?;
        let &p = self.positions.get(&id)?;
        self.rows[p].refs.get(rel).copied().flatten()
    }

    /// Live events grouped per user, users ordered by their first event.
    pub fn paths(&self) -> Vec<UserPath<'_>> {
        let mut slots: HashMap<&UserId, usize> = HashMap::new();
        let mut out: Vec<UserPath<'_>> = Vec::new();
        for e in self.events() {
            let slot = *slots.entry(&e.user_id).or_insert_with(|| {
                out.push(UserPath {
                    user_id: &e.user_id,
                    events: Vec::new(),
                });
                out.len() - 1
            });
            out[slot].events.push(e);
        }
        out
    }

    /// Earliest and latest live timestamps.
    pub fn time_bounds(&self) -> Option<(Timestamp, Timestamp)> {
        let first = self.events().next()?.timestamp;
        let last = self.events().map(|e| e.timestamp).max()?;
        Some((first, last))
    }

    /// Live rows projected to the schema columns.
    pub fn to_dataframe(&self) -> DataSet {
        self.to_dataframe_with(false)
    }

    /// Rows projected to the schema columns; soft-deleted rows are included when
    /// `show_deleted` is set. The result is an owned copy, independent of later mutations.
    pub fn to_dataframe_with(&self, show_deleted: bool) -> DataSet {
        let rows: Vec<&Row> = self
            .rows
            .iter()
            .filter(|r| show_deleted || !r.deleted)
            .collect();

        let user_type = if rows
            .iter()
            .any(|r| matches!(r.event.user_id, UserId::Str(_)))
        {
            DataType::Utf8
        } else {
            DataType::Int64
        };

        let mut fields = vec![
            Field::new(self.schema.event_id.clone(), DataType::Int64),
            Field::new(self.schema.event_type.clone(), DataType::Utf8),
            Field::new(self.schema.event_index.clone(), DataType::Int64),
            Field::new(self.schema.event_name.clone(), DataType::Utf8),
            Field::new(self.schema.event_timestamp.clone(), DataType::Timestamp),
            Field::new(self.schema.user_id.clone(), user_type),
        ];
        for col in &self.schema.custom_cols {
            let data_type = rows
                .iter()
                .find_map(|r| r.event.custom(col).data_type())
                .unwrap_or(DataType::Utf8);
            fields.push(Field::new(col.clone(), data_type));
        }

        let out = rows
            .iter()
            .map(|r| {
                let e = &r.event;
                let user = match (&e.user_id, user_type) {
                    (UserId::Int(v), DataType::Utf8) => Value::Utf8(v.to_string()),
                    (u, _) => u.to_value(),
                };
                let mut row = vec![
                    Value::Int64(e.id.0 as i64),
                    Value::from(e.event_type.as_str()),
                    Value::Int64(e.index as i64),
                    Value::from(e.name.as_str()),
                    Value::Timestamp(e.timestamp.as_nanos()),
                    user,
                ];
                row.extend(self.schema.custom_cols.iter().map(|c| e.custom(c).clone()));
                row
            })
            .collect();

        DataSet::new(Schema::new(fields), out)
    }

    /// Concatenate `other`'s rows (ids must not collide), then re-sort.
    ///
    /// Custom columns become the union of both schemas. Parent references are carried over for
    /// relations both streams share by `ref_col`.
    pub fn append(&mut self, other: &Eventstream) -> EventstreamResult<()> {
        self.schema.ensure_compatible(&other.schema)?;
        let dups: Vec<EventId> = other
            .rows
            .iter()
            .map(|r| r.event.id)
            .filter(|id| self.positions.contains_key(id))
            .collect();
        if !dups.is_empty() {
            return Err(EventstreamError::schema(format!(
                "append would duplicate event ids {dups:?}"
            )));
        }
        self.schema.union_custom_cols(&other.schema);
        for row in &other.rows {
            let refs = self.align_refs(other, &row.refs);
            self.rows.push(Row {
                event: row.event.clone(),
                deleted: row.deleted,
                refs,
            });
        }
        debug!(stream = %self.id, other = %other.id, rows = other.rows.len(), "appended");
        self.canonicalize();
        Ok(())
    }

    /// Merge the additive delta `other`, whose `ref_col` relation references rows of `self` by
    /// `event_id`.
    ///
    /// - a soft-deleted delta row soft-deletes the row it references;
    /// - a live delta row referencing a row replaces it: the referenced row is soft-deleted and
    ///   the delta row inherits its parent references;
    /// - live delta rows without a matching reference are appended.
    ///
    /// References to unknown rows behave like missing references.
    pub fn join(&mut self, other: &Eventstream, ref_col: &str) -> EventstreamResult<()> {
        self.schema.ensure_compatible(&other.schema)?;
        let rel = other
            .relations
            .iter()
            .position(|r| r.ref_col == ref_col)
            .ok_or_else(|| {
                EventstreamError::schema(format!(
                    "eventstream {} has no relation '{ref_col}'",
                    other.id
                ))
            })?;
        self.schema.union_custom_cols(&other.schema);

        let deleted_before: Vec<bool> = self.rows.iter().map(|r| r.deleted).collect();
        let (mut replaced, mut deleted, mut appended) = (0usize, 0usize, 0usize);

        for row in &other.rows {
            let target = row
                .refs
                .get(rel)
                .copied()
                .flatten()
                .and_then(|t| self.positions.get(&t).copied());

            match (target, row.deleted) {
                (Some(pos), true) => {
                    self.rows[pos].deleted = true;
                    deleted += 1;
                }
                (None, true) => {}
                (Some(pos), false) => {
                    if deleted_before.get(pos).copied().unwrap_or(false) {
                        continue;
                    }
                    // the delta renumbered its own rows; the target's index is the tie-break
                    let mut event = row.event.clone();
                    event.index = self.rows[pos].event.index;
                    if self.rows[pos].event.id == event.id {
                        self.rows[pos].event = event;
                    } else {
                        self.ensure_new_id(event.id)?;
                        let refs = self.rows[pos].refs.clone();
                        self.rows[pos].deleted = true;
                        self.push_row(Row {
                            event,
                            deleted: false,
                            refs,
                        });
                    }
                    replaced += 1;
                }
                (None, false) => {
                    self.ensure_new_id(row.event.id)?;
                    let refs = vec![None; self.relations.len()];
                    self.push_row(Row {
                        event: row.event.clone(),
                        deleted: false,
                        refs,
                    });
                    appended += 1;
                }
            }
        }

        debug!(
            stream = %self.id,
            delta = %other.id,
            replaced,
            deleted,
            appended,
            "joined delta"
        );
        self.canonicalize();
        Ok(())
    }

    /// Mark rows as deleted. Unknown ids are ignored; repeated calls are no-ops.
    ///
    /// Returns the number of rows newly marked.
    pub fn soft_delete<I>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = EventId>,
    {
        let mut marked = 0;
        for id in ids {
            if let Some(&p) = self.positions.get(&id) {
                if !self.rows[p].deleted {
                    self.rows[p].deleted = true;
                    marked += 1;
                }
            }
        }
        if marked > 0 {
            self.canonicalize();
        }
        marked
    }

    /// Widen the schema with custom column `name`, filled from `data` aligned on `event_index`
    /// (one value per live row). Existing values are overwritten.
    pub fn add_custom_col(&mut self, name: &str, data: Vec<Value>) -> EventstreamResult<()> {
        if self.schema.is_role_col(name) {
            return Err(EventstreamError::schema(format!(
                "'{name}' is a role column and cannot be used as a custom column"
            )));
        }
        let live = self.len();
        if data.len() != live {
            return Err(EventstreamError::schema(format!(
                "custom column '{name}' has {} values but the stream has {live} events",
                data.len()
            )));
        }
        let mut values = data.into_iter();
        for row in self.rows.iter_mut().filter(|r| !r.deleted) {
            if let Some(v) = values.next() {
                row.event.custom.insert(name.to_string(), v);
            }
        }
        if !self.schema.custom_cols.iter().any(|c| c == name) {
            self.schema.custom_cols.push(name.to_string());
        }
        Ok(())
    }

    /// Rename custom column `from` to `to` in the schema and on every row.
    pub(crate) fn rename_custom_col(&mut self, from: &str, to: &str) -> EventstreamResult<()> {
        if from == to {
            return Ok(());
        }
        let Some(slot) = self.schema.custom_cols.iter().position(|c| c == from) else {
            return Err(EventstreamError::schema(format!("unknown custom column '{from}'")));
        };
        if self.schema.is_role_col(to) || self.schema.custom_cols.iter().any(|c| c == to) {
            return Err(EventstreamError::schema(format!(
                "cannot rename '{from}': column '{to}' already exists"
            )));
        }
        self.schema.custom_cols[slot] = to.to_string();
        for row in &mut self.rows {
            if let Some(v) = row.event.custom.remove(from) {
                row.event.custom.insert(to.to_string(), v);
            }
        }
        Ok(())
    }

    /// Duplicate table, schema, relations and soft-delete markers under a new stream id.
    pub fn copy(&self) -> Eventstream {
        Eventstream {
            id: self.ctx.next_stream_id(),
            ctx: self.ctx.clone(),
            schema: self.schema.clone(),
            index_order: self.index_order.clone(),
            relations: self.relations.clone(),
            rows: self.rows.clone(),
            positions: self.positions.clone(),
        }
    }

    /// Physically remove soft-deleted rows. Returns how many were dropped.
    pub fn drop_soft_deleted(&mut self) -> usize {
        let before = self.rows.len();
        self.rows.retain(|r| !r.deleted);
        let dropped = before - self.rows.len();
        if dropped > 0 {
            self.rebuild_positions();
        }
        dropped
    }

    /// Chain of `(stream, event)` from `id` in this stream back to the row that introduced it.
    ///
    /// The first entry is the event itself; the last is its origin. Empty for unknown ids.
    pub fn lineage(&self, id: EventId) -> Vec<(StreamId, Event)> {
        let mut chain = Vec::new();
        let Some(&p) = self.positions.get(&id) else {
            return chain;
        };
        chain.push((self.id, self.rows[p].event.clone()));
        let mut hop = self.parent_hop(p);
        while let Some((stream, rid)) = hop {
            match stream.positions.get(&rid) {
                Some(&pp) => {
                    chain.push((stream.id, stream.rows[pp].event.clone()));
                    hop = stream.parent_hop(pp);
                }
                None => break,
            }
        }
        chain
    }

    /// Id of the row that first introduced `id`'s lineage.
    pub fn origin(&self, id: EventId) -> Option<EventId> {
        self.lineage(id).last().map(|(_, e)| e.id)
    }

    /// Equality under all schema columns except `event_id`.
    pub fn equivalent(&self, other: &Eventstream) -> bool {
        let strip = |s: &Eventstream| {
            let ds = s.to_dataframe();
            let cols: Vec<&str> = ds
                .schema
                .field_names()
                .filter(|c| *c != s.schema.event_id)
                .collect();
            ds.select(&cols).ok()
        };
        match (strip(self), strip(other)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Add loose events (no parent references) and re-sort.
    pub(crate) fn push_events(&mut self, events: Vec<Event>) -> EventstreamResult<()> {
        let mut seen = HashSet::new();
        for e in &events {
            if !seen.insert(e.id) {
                return Err(EventstreamError::schema(format!(
                    "duplicate event id {} in input",
                    e.id
                )));
            }
            self.ensure_new_id(e.id)?;
        }
        for col in events.iter().flat_map(|e| e.custom.keys()) {
            if !self.schema.custom_cols.contains(col) {
                self.schema.custom_cols.push(col.clone());
            }
        }
        let slots = self.relations.len();
        self.rows.extend(events.into_iter().map(|event| Row {
            event,
            deleted: false,
            refs: vec![None; slots],
        }));
        self.canonicalize();
        Ok(())
    }

    /// Build a stream from pre-assembled rows; used by deltas and merges.
    pub(crate) fn from_rows(
        schema: EventstreamSchema,
        index_order: IndexOrder,
        relations: Vec<Relation>,
        rows: Vec<Row>,
        ctx: &EventstreamContext,
    ) -> EventstreamResult<Self> {
        let mut stream = Self::empty(schema, index_order, relations, ctx);
        let mut seen = HashSet::new();
        for r in &rows {
            if !seen.insert(r.event.id) {
                return Err(EventstreamError::schema(format!(
                    "duplicate event id {}",
                    r.event.id
                )));
            }
        }
        for col in rows.iter().flat_map(|r| r.event.custom.keys()) {
            if !stream.schema.custom_cols.contains(col) {
                stream.schema.custom_cols.push(col.clone());
            }
        }
        stream.rows = rows;
        stream.canonicalize();
        Ok(stream)
    }

    fn parent_hop(&self, pos: usize) -> Option<(Arc<Eventstream>, EventId)> {
        self.rows[pos]
            .refs
            .iter()
            .enumerate()
            .find_map(|(j, r)| r.map(|rid| (Arc::clone(&self.relations[j].eventstream), rid)))
    }

    fn align_refs(&self, other: &Eventstream, refs: &[Option<EventId>]) -> Vec<Option<EventId>> {
        self.relations
            .iter()
            .map(|rel| {
                other
                    .relations
                    .iter()
                    .position(|o| o.ref_col == rel.ref_col)
                    .and_then(|j| refs.get(j).copied().flatten())
            })
            .collect()
    }

    fn ensure_new_id(&self, id: EventId) -> EventstreamResult<()> {
        if self.positions.contains_key(&id) {
            Err(EventstreamError::schema(format!(
                "event id {id} already exists in eventstream {}",
                self.id
            )))
        } else {
            Ok(())
        }
    }

    fn push_row(&mut self, row: Row) {
        self.positions.insert(row.event.id, self.rows.len());
        self.rows.push(row);
    }

    /// Sort by `(timestamp, type rank, event_index)` and renumber live rows densely.
    fn canonicalize(&mut self) {
        let order = &self.index_order;
        self.rows.sort_by(|a, b| {
            a.event
                .timestamp
                .cmp(&b.event.timestamp)
                .then_with(|| {
                    order
                        .rank(a.event.event_type)
                        .cmp(&order.rank(b.event.event_type))
                })
                .then_with(|| a.event.index.cmp(&b.event.index))
        });
        let mut next = 0u64;
        for row in self.rows.iter_mut().filter(|r| !r.deleted) {
            row.event.index = next;
            next += 1;
        }
        self.rebuild_positions();
    }

    fn rebuild_positions(&mut self) {
        self.positions = self
            .rows
            .iter()
            .enumerate()
            .map(|(p, r)| (r.event.id, p))
            .collect();
    }
}
