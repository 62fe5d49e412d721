//! Preprocessing graph: a DAG of processors rooted at a seed eventstream.
//!
//! Nodes are identified by caller-chosen [`NodeId`]s. Edges run parent to child and the parent
//! order of a node is significant: it is the branch order used when merging.
//!
//! [`PreprocessingGraph::combine`] computes a node depth-first, memoizing every ancestor for the
//! duration of the call. A node with several parents first merges them by lineage, then
//! applies its processor, if any.
//!
//! ```rust
//! use rust_eventstream::eventstream::{Eventstream, EventstreamContext, EventstreamOptions};
//! use rust_eventstream::graph::{Node, NodeId, PreprocessingGraph};
//! use rust_eventstream::processing::{AddStartEndEvents, AddStartEndEventsParams};
//! use rust_eventstream::schema::RawDataSchema;
//! use rust_eventstream::types::{DataSet, DataType, Field, Schema, Value};
//!
//! # fn main() -> Result<(), rust_eventstream::EventstreamError> {
//! let raw = DataSet::new(
//!     Schema::new(vec![
//!         Field::new("user_id", DataType::Int64),
//!         Field::new("event", DataType::Utf8),
//!         Field::new("timestamp", DataType::Int64),
//!     ]),
//!     vec![vec![Value::Int64(1), Value::from("A"), Value::Int64(0)]],
//! );
//! let options = EventstreamOptions {
//!     add_start_end_events: false,
//!     ..Default::default()
//! };
//! let ctx = EventstreamContext::new();
//! let source = Eventstream::new(&raw, &RawDataSchema::default(), options, &ctx)?;
//!
//! let mut graph = PreprocessingGraph::new(source);
//! let root = graph.root().clone();
//! graph.add_node(
//!     Node::events("markers", AddStartEndEvents::new(AddStartEndEventsParams)),
//!     &[root],
//! )?;
//! let out = graph.combine(&NodeId::from("markers"))?;
//! assert_eq!(out.len(), 3);
//! # Ok(())
//! # }
//! ```

mod description;
mod merge;
mod node;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::error::{EventstreamError, EventstreamResult};
use crate::eventstream::Eventstream;
use crate::observability::{PipelineEvent, PipelineObserver, Severity, notify};

pub use description::{EdgeDescription, GraphDescription, NodeDescription, SourceDescription};
pub use node::{MERGE_NODE, Node, NodeId, NodeKind};

/// Id given to the source node by [`PreprocessingGraph::new`].
pub const SOURCE_NODE: &str = "source";

/// Options controlling graph evaluation.
#[derive(Clone)]
pub struct GraphOptions {
    /// Optional observer for `combine` progress and failures.
    pub observer: Option<Arc<dyn PipelineObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: Severity,
}

impl fmt::Debug for GraphOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphOptions")
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            observer: None,
            alert_at_or_above: Severity::Critical,
        }
    }
}

/// DAG of preprocessing nodes over one source stream.
#[derive(Debug, Clone)]
pub struct PreprocessingGraph {
    root: NodeId,
    seed: Arc<Eventstream>,
    nodes: BTreeMap<NodeId, Node>,
    /// Ordered parent lists; the root has none.
    parents: BTreeMap<NodeId, Vec<NodeId>>,
    options: GraphOptions,
}

impl PreprocessingGraph {
    /// Graph holding only a source node (id [`SOURCE_NODE`]) around `source`.
    pub fn new(source: impl Into<Arc<Eventstream>>) -> Self {
        Self::with_source_id(SOURCE_NODE, source)
    }

    /// Like [`Self::new`], with a caller-chosen source node id.
    pub fn with_source_id(id: impl Into<NodeId>, source: impl Into<Arc<Eventstream>>) -> Self {
        let id = id.into();
        let seed = source.into();
        let mut nodes = BTreeMap::new();
        nodes.insert(id.clone(), Node::source(id.clone(), Arc::clone(&seed)));
        let mut parents = BTreeMap::new();
        parents.insert(id.clone(), Vec::new());
        Self {
            root: id,
            seed,
            nodes,
            parents,
            options: GraphOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GraphOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &GraphOptions {
        &self.options
    }

    pub fn root(&self) -> &NodeId {
        &self.root
    }

    /// The seed stream held by the source node.
    pub fn source(&self) -> &Arc<Eventstream> {
        &self.seed
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Parents of `id` in branch order.
    pub fn parents(&self, id: &NodeId) -> Option<&[NodeId]> {
        self.parents.get(id).map(Vec::as_slice)
    }

    /// Children of `id`, sorted by id.
    pub fn children(&self, id: &NodeId) -> Vec<&NodeId> {
        self.parents
            .iter()
            .filter(|(_, ps)| ps.contains(id))
            .map(|(child, _)| child)
            .collect()
    }

    /// Attach `node` below `parents`.
    ///
    /// # Errors
    ///
    /// [`EventstreamError::GraphStructure`] when the id is taken, a parent is unknown, the
    /// parent list is empty or repeats a node, or `node` is a source.
    pub fn add_node(&mut self, node: Node, parents: &[NodeId]) -> EventstreamResult<()> {
        let id = node.id.clone();
        if self.nodes.contains_key(&id) {
            return Err(EventstreamError::graph(Some(id.as_str()), "duplicate node id"));
        }
        if matches!(node.kind, NodeKind::Source(_)) {
            return Err(EventstreamError::graph(
                Some(id.as_str()),
                "a graph has exactly one source node",
            ));
        }
        if parents.is_empty() {
            return Err(EventstreamError::graph(
                Some(id.as_str()),
                "node needs at least one parent",
            ));
        }
        for (i, p) in parents.iter().enumerate() {
            if !self.nodes.contains_key(p) {
                return Err(EventstreamError::graph(
                    Some(id.as_str()),
                    format!("unknown parent '{p}'"),
                ));
            }
            if parents[..i].contains(p) {
                return Err(EventstreamError::graph(
                    Some(id.as_str()),
                    format!("parent '{p}' listed twice"),
                ));
            }
        }
        self.nodes.insert(id.clone(), node);
        self.parents.insert(id.clone(), parents.to_vec());
        debug!(node = %id, parents = parents.len(), "node added");
        Ok(())
    }

    /// Add `parent` as the last parent of `child`.
    ///
    /// # Errors
    ///
    /// [`EventstreamError::GraphStructure`] for unknown nodes, a duplicate edge, an edge into
    /// the source, or an edge that would close a cycle. The graph is unchanged on error.
    pub fn add_edge(&mut self, parent: &NodeId, child: &NodeId) -> EventstreamResult<()> {
        for id in [parent, child] {
            if !self.nodes.contains_key(id) {
                return Err(EventstreamError::graph(Some(id.as_str()), "unknown node"));
            }
        }
        if child == &self.root {
            return Err(EventstreamError::graph(
                Some(child.as_str()),
                "the source node cannot have parents",
            ));
        }
        let list = self.parents.entry(child.clone()).or_default();
        if list.contains(parent) {
            return Err(EventstreamError::graph(
                Some(child.as_str()),
                format!("edge from '{parent}' already exists"),
            ));
        }
        list.push(parent.clone());
        if let Err(err) = self.topological_order() {
            if let Some(list) = self.parents.get_mut(child) {
                list.pop();
            }
            return Err(err);
        }
        Ok(())
    }

    /// Remove `id` and every node reachable from it. Returns the removed ids, parents first.
    ///
    /// # Errors
    ///
    /// [`EventstreamError::GraphStructure`] for the source node or an unknown id.
    pub fn delete_node(&mut self, id: &NodeId) -> EventstreamResult<Vec<NodeId>> {
        if id == &self.root {
            return Err(EventstreamError::graph(
                Some(id.as_str()),
                "the source node cannot be deleted",
            ));
        }
        if !self.nodes.contains_key(id) {
            return Err(EventstreamError::graph(Some(id.as_str()), "unknown node"));
        }
        let order = self.topological_order()?;
        let mut doomed: Vec<NodeId> = vec![id.clone()];
        for n in order {
            if doomed.contains(&n) {
                continue;
            }
            let hit = self
                .parents
                .get(&n)
                .is_some_and(|ps| ps.iter().any(|p| doomed.contains(p)));
            if hit {
                doomed.push(n);
            }
        }
        for n in &doomed {
            self.nodes.remove(n);
            self.parents.remove(n);
        }
        debug!(node = %id, removed = doomed.len(), "node deleted");
        Ok(doomed)
    }

    /// Node ids in dependency order (Kahn's algorithm; ties broken by id).
    ///
    /// # Errors
    ///
    /// [`EventstreamError::GraphStructure`] when the edges contain a cycle.
    pub fn topological_order(&self) -> EventstreamResult<Vec<NodeId>> {
        let mut in_degree: BTreeMap<&NodeId, usize> =
            self.nodes.keys().map(|id| (id, 0)).collect();
        let mut children: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
        for (child, ps) in &self.parents {
            for p in ps {
                *in_degree.entry(child).or_insert(0) += 1;
                children.entry(p).or_default().push(child);
            }
        }

        // BTreeMap iteration keeps the initial queue sorted
        let mut queue: VecDeque<&NodeId> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = queue.pop_front() {
            order.push(id.clone());
            let mut ready = Vec::new();
            for &child in children.get(id).map(Vec::as_slice).unwrap_or_default() {
                if let Some(deg) = in_degree.get_mut(child) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        ready.push(child);
                    }
                }
            }
            ready.sort();
            queue.extend(ready);
        }

        if order.len() != self.nodes.len() {
            let stuck = in_degree
                .iter()
                .find(|(_, deg)| **deg > 0)
                .map(|(id, _)| id.as_str());
            return Err(EventstreamError::graph(stuck, "cycle detected"));
        }
        Ok(order)
    }

    /// Compute the eventstream at `id`.
    ///
    /// Ancestors are computed once per call. The source node yields a copy of the seed
    /// stream. Errors carry the id of the node they surfaced at.
    pub fn combine(&self, id: &NodeId) -> EventstreamResult<Eventstream> {
        let started = Instant::now();
        self.notify(PipelineEvent::CombineStarted {
            node: id.to_string(),
        });
        let mut memo = HashMap::new();
        let result = self.compute(id, &mut memo);
        drop(memo);
        match result {
            Ok(stream) => {
                let stream = Arc::try_unwrap(stream).unwrap_or_else(|shared| shared.copy());
                self.notify(PipelineEvent::CombineFinished {
                    node: id.to_string(),
                    rows: stream.len(),
                    elapsed: started.elapsed(),
                });
                Ok(stream)
            }
            Err(err) => {
                self.notify(PipelineEvent::CombineFailed {
                    node: err.node().unwrap_or(id.as_str()).to_string(),
                    severity: Severity::of(&err),
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    fn compute(
        &self,
        id: &NodeId,
        memo: &mut HashMap<NodeId, Arc<Eventstream>>,
    ) -> EventstreamResult<Arc<Eventstream>> {
        if let Some(done) = memo.get(id) {
            return Ok(Arc::clone(done));
        }
        let node = self
            .nodes
            .get(id)
            .ok_or_else(|| EventstreamError::graph(Some(id.as_str()), "unknown node"))?;

        let out = match &node.kind {
            NodeKind::Source(seed) => Arc::clone(seed),
            kind => {
                let parent_ids = self.parents.get(id).map(Vec::as_slice).unwrap_or_default();
                let mut inputs = Vec::with_capacity(parent_ids.len());
                for p in parent_ids {
                    inputs.push(self.compute(p, memo)?);
                }
                let input = match inputs.len() {
                    0 => {
                        return Err(EventstreamError::graph(
                            Some(id.as_str()),
                            "node has no parents",
                        ));
                    }
                    1 => inputs.remove(0),
                    n => {
                        let merged = merge::merge_parents(&inputs).map_err(|e| e.at_node(id.as_str()))?;
                        debug!(node = %id, parents = n, rows = merged.len(), "parents merged");
                        self.notify(PipelineEvent::MergeCompleted {
                            node: id.to_string(),
                            parents: n,
                            rows: merged.len(),
                        });
                        Arc::new(merged)
                    }
                };
                match kind {
                    NodeKind::Events(processor) => {
                        let started = Instant::now();
                        let output = processor
                            .apply(&input)
                            .map_err(|e| e.at_node(id.as_str()))?;
                        debug!(
                            node = %id,
                            processor = processor.name(),
                            rows = output.len(),
                            "node computed"
                        );
                        self.notify(PipelineEvent::NodeComputed {
                            node: id.to_string(),
                            processor: processor.name().to_string(),
                            rows: output.len(),
                            elapsed: started.elapsed(),
                        });
                        Arc::new(output)
                    }
                    _ => input,
                }
            }
        };
        memo.insert(id.clone(), Arc::clone(&out));
        Ok(out)
    }

    fn notify(&self, event: PipelineEvent) {
        notify(
            self.options.observer.as_ref(),
            event,
            self.options.alert_at_or_above,
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{Node, NodeId, PreprocessingGraph};
    use crate::error::EventstreamError;
    use crate::eventstream::EventstreamContext;
    use crate::observability::{PipelineEvent, RecordingObserver};
    use crate::processing::test_support::{name_mask, names, stream};
    use crate::processing::{FilterEvents, FilterEventsParams};

    use super::GraphOptions;

    fn keep(handle: &str, names: &'static [&'static str]) -> FilterEvents {
        FilterEvents::new(FilterEventsParams {
            func: name_mask(handle, move |n| names.contains(&n)),
        })
    }

    fn id(s: &str) -> NodeId {
        NodeId::from(s)
    }

    fn graph() -> PreprocessingGraph {
        let ctx = EventstreamContext::new();
        let source = stream(&ctx, &[(1, "A", 0), (1, "B", 1), (1, "C", 2)]);
        PreprocessingGraph::new(source)
    }

    #[test]
    fn rejects_duplicate_and_orphan_nodes() {
        let mut g = graph();
        let root = g.root().clone();
        g.add_node(Node::events("f", keep("a", &["A"])), &[root.clone()])
            .unwrap();
        let dup = g
            .add_node(Node::events("f", keep("a", &["A"])), &[root])
            .unwrap_err();
        assert!(matches!(dup, EventstreamError::GraphStructure { .. }));
        let orphan = g
            .add_node(Node::events("g", keep("a", &["A"])), &[id("nowhere")])
            .unwrap_err();
        assert_eq!(orphan.node(), Some("g"));
        assert!(!g.contains(&id("g")));
    }

    #[test]
    fn add_edge_refuses_cycles_and_rolls_back() {
        let mut g = graph();
        let root = g.root().clone();
        g.add_node(Node::events("a", keep("a", &["A"])), &[root]).unwrap();
        g.add_node(Node::events("b", keep("a", &["A"])), &[id("a")]).unwrap();
        let err = g.add_edge(&id("b"), &id("a")).unwrap_err();
        assert!(err.to_string().contains("cycle"));
        assert_eq!(g.parents(&id("a")).unwrap().len(), 1);
        assert!(g.topological_order().is_ok());
    }

    #[test]
    fn delete_node_removes_descendants_but_never_the_source() {
        let mut g = graph();
        let root = g.root().clone();
        g.add_node(Node::events("a", keep("a", &["A"])), &[root.clone()])
            .unwrap();
        g.add_node(Node::events("b", keep("b", &["B"])), &[root.clone()])
            .unwrap();
        g.add_node(Node::merge("m"), &[id("a"), id("b")]).unwrap();
        let removed = g.delete_node(&id("a")).unwrap();
        assert_eq!(removed, vec![id("a"), id("m")]);
        assert_eq!(g.len(), 2);
        assert!(g.children(&id("b")).is_empty());

        let err = g.delete_node(&root).unwrap_err();
        assert!(matches!(err, EventstreamError::GraphStructure { .. }));
    }

    #[test]
    fn combine_source_returns_an_independent_copy() {
        let g = graph();
        let out = g.combine(g.root()).unwrap();
        assert_ne!(out.id(), g.source().id());
        assert!(out.equivalent(g.source()));
    }

    #[test]
    fn combine_reports_progress_to_the_observer() {
        let recorder = Arc::new(RecordingObserver::new());
        let mut g = graph().with_options(GraphOptions {
            observer: Some(recorder.clone()),
            ..Default::default()
        });
        let root = g.root().clone();
        g.add_node(Node::events("a", keep("ab", &["A", "B"])), &[root.clone()])
            .unwrap();
        g.add_node(Node::events("b", keep("bc", &["B", "C"])), &[root])
            .unwrap();
        g.add_node(Node::merge("m"), &[id("a"), id("b")]).unwrap();
        let out = g.combine(&id("m")).unwrap();
        assert_eq!(names(&out), vec!["A", "B", "C"]);

        let events = recorder.events();
        assert!(matches!(events.first(), Some(PipelineEvent::CombineStarted { .. })));
        assert!(events.iter().any(|e| matches!(
            e,
            PipelineEvent::MergeCompleted { parents: 2, rows: 3, .. }
        )));
        let computed = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::NodeComputed { .. }))
            .count();
        assert_eq!(computed, 2);
        assert!(matches!(
            events.last(),
            Some(PipelineEvent::CombineFinished { rows: 3, .. })
        ));
    }

    #[test]
    fn combine_of_unknown_node_fails() {
        let g = graph();
        let err = g.combine(&id("ghost")).unwrap_err();
        assert_eq!(err.node(), Some("ghost"));
    }
}
