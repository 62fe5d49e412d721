use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::eventstream::Eventstream;
use crate::processing::DataProcessor;

/// Processor name used for merge nodes in graph descriptions.
pub const MERGE_NODE: &str = "MergeNode";

/// Caller-chosen, graph-unique node identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        NodeId(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        NodeId(id)
    }
}

/// What a node computes.
#[derive(Clone)]
pub enum NodeKind {
    /// The graph's seed stream.
    Source(Arc<Eventstream>),
    /// Applies a processor to its (merged) parents.
    Events(Arc<dyn DataProcessor>),
    /// Merges its parents and nothing else.
    Merge,
}

/// A vertex of a [`super::PreprocessingGraph`].
#[derive(Clone)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
}

impl Node {
    pub fn events(id: impl Into<NodeId>, processor: impl DataProcessor + 'static) -> Self {
        Self::shared(id, Arc::new(processor))
    }

    /// Node around an already shared processor.
    pub fn shared(id: impl Into<NodeId>, processor: Arc<dyn DataProcessor>) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Events(processor),
        }
    }

    pub fn merge(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Merge,
        }
    }

    pub(crate) fn source(id: impl Into<NodeId>, stream: Arc<Eventstream>) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Source(stream),
        }
    }

    /// Processor class name; `None` for the source.
    pub fn processor_name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Source(_) => None,
            NodeKind::Events(p) => Some(p.name()),
            NodeKind::Merge => Some(MERGE_NODE),
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Node");
        s.field("id", &self.id);
        match &self.kind {
            NodeKind::Source(stream) => s.field("source", &stream.id()),
            NodeKind::Events(p) => s.field("processor", p),
            NodeKind::Merge => s.field("merge", &true),
        };
        s.finish()
    }
}
