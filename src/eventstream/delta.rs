use std::sync::Arc;

use crate::error::EventstreamResult;

use super::{Event, Eventstream, Relation, Row};

/// Collects the rows a processor adds, replaces or deletes relative to its input.
///
/// The finished delta carries a single relation back to the parent; [`Eventstream::join`]
/// applies it to a stream holding the parent's rows.
#[derive(Debug)]
pub struct DeltaBuilder {
    parent: Arc<Eventstream>,
    ref_col: String,
    rows: Vec<Row>,
}

impl DeltaBuilder {
    pub(crate) fn new(parent: &Arc<Eventstream>) -> Self {
        Self {
            parent: Arc::clone(parent),
            ref_col: format!("ref_{}", parent.id()),
            rows: Vec::new(),
        }
    }

    /// Name of the relation column referencing the parent.
    pub fn ref_col(&self) -> &str {
        &self.ref_col
    }

    /// Add a brand-new event with no parent row.
    pub fn insert(&mut self, event: Event) -> &mut Self {
        self.rows.push(Row {
            event,
            deleted: false,
            refs: vec![None],
        });
        self
    }

    /// Replace `target` with `event`.
    ///
    /// When `event` keeps `target`'s id the row is rewritten in place, otherwise `target` is
    /// soft-deleted and `event` takes its lineage.
    pub fn replace(&mut self, target: &Event, event: Event) -> &mut Self {
        self.rows.push(Row {
            event,
            deleted: false,
            refs: vec![Some(target.id)],
        });
        self
    }

    /// Rewrite an event in place, keeping its id.
    pub fn update(&mut self, event: Event) -> &mut Self {
        let id = event.id;
        self.rows.push(Row {
            event,
            deleted: false,
            refs: vec![Some(id)],
        });
        self
    }

    /// Soft-delete `target`.
    pub fn delete(&mut self, target: &Event) -> &mut Self {
        self.rows.push(Row {
            event: target.clone(),
            deleted: true,
            refs: vec![Some(target.id)],
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of collected rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Materialize the delta stream. Fails when the same event id was added twice.
    pub fn finish(self) -> EventstreamResult<Eventstream> {
        let relation = Relation::new(self.ref_col, Arc::clone(&self.parent));
        Eventstream::from_rows(
            self.parent.schema().clone(),
            self.parent.index_order().clone(),
            vec![relation],
            self.rows,
            self.parent.context(),
        )
    }
}
