//! JSON description of a graph: nodes with their processor class and parameters, plus edges.
//!
//! The source stream itself is not part of the description; whoever rebuilds the graph
//! supplies it.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as Json;

use crate::error::{EventstreamError, EventstreamResult};
use crate::eventstream::Eventstream;
use crate::params::FunctionRegistry;
use crate::processing::ProcessorRegistry;

use super::{MERGE_NODE, Node, NodeId, NodeKind, PreprocessingGraph, SOURCE_NODE};

/// The source node. `stream_id` is opaque; it only identifies the stream that was described.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescription {
    #[serde(default = "source_node_id")]
    pub id: NodeId,
    #[serde(deserialize_with = "opaque_id")]
    pub stream_id: String,
}

fn source_node_id() -> NodeId {
    NodeId::from(SOURCE_NODE)
}

/// Accept string or numeric ids.
fn opaque_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Json::deserialize(deserializer)? {
        Json::String(s) => Ok(s),
        Json::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number stream id, got {other}"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescription {
    pub id: NodeId,
    pub processor: String,
    #[serde(default)]
    pub params: Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDescription {
    pub from: NodeId,
    pub to: NodeId,
}

/// Serializable shape of a [`PreprocessingGraph`].
///
/// Edges into a node appear in that node's parent order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDescription {
    pub source: SourceDescription,
    pub nodes: Vec<NodeDescription>,
    pub edges: Vec<EdgeDescription>,
}

impl GraphDescription {
    pub fn to_json(&self) -> EventstreamResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> EventstreamResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

impl PreprocessingGraph {
    /// Describe every non-source node and edge, in dependency order.
    pub fn to_description(&self) -> EventstreamResult<GraphDescription> {
        let order = self.topological_order()?;
        let mut nodes = Vec::with_capacity(order.len().saturating_sub(1));
        let mut edges = Vec::new();
        for id in &order {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            let params = match &node.kind {
                NodeKind::Source(_) => continue,
                NodeKind::Events(p) => p.params(),
                NodeKind::Merge => Json::Object(Default::default()),
            };
            nodes.push(NodeDescription {
                id: id.clone(),
                processor: node.processor_name().unwrap_or(MERGE_NODE).to_string(),
                params,
            });
            for parent in self.parents(id).unwrap_or_default() {
                edges.push(EdgeDescription {
                    from: parent.clone(),
                    to: id.clone(),
                });
            }
        }
        Ok(GraphDescription {
            source: SourceDescription {
                id: self.root.clone(),
                stream_id: self.seed.id().to_string(),
            },
            nodes,
            edges,
        })
    }

    /// Rebuild a graph from `description` over `source`.
    ///
    /// Processors are looked up by class name in `processors`; function parameters are resolved
    /// by handle in `functions`.
    ///
    /// # Errors
    ///
    /// [`EventstreamError::GraphStructure`] for unknown processors, dangling or cyclic edges
    /// and nodes without parents; [`EventstreamError::Parameter`] when a node's parameters are
    /// rejected by its model.
    pub fn from_description(
        description: &GraphDescription,
        source: impl Into<Arc<Eventstream>>,
        processors: &ProcessorRegistry,
        functions: &FunctionRegistry,
    ) -> EventstreamResult<Self> {
        let mut graph = Self::with_source_id(description.source.id.clone(), source);

        let mut built: BTreeMap<NodeId, Node> = BTreeMap::new();
        for nd in &description.nodes {
            if nd.id == graph.root || built.contains_key(&nd.id) {
                return Err(EventstreamError::graph(Some(nd.id.as_str()), "duplicate node id"));
            }
            let node = if nd.processor == MERGE_NODE {
                Node::merge(nd.id.clone())
            } else {
                let processor = processors
                    .build(&nd.processor, &nd.params, functions)
                    .map_err(|e| e.at_node(nd.id.as_str()))?;
                Node::shared(nd.id.clone(), processor)
            };
            built.insert(nd.id.clone(), node);
        }

        let mut parents: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
        let mut seen = HashSet::new();
        for edge in &description.edges {
            if !built.contains_key(&edge.to) {
                return Err(EventstreamError::graph(
                    Some(edge.to.as_str()),
                    format!("edge from '{}' targets an unknown node", edge.from),
                ));
            }
            if edge.from != graph.root && !built.contains_key(&edge.from) {
                return Err(EventstreamError::graph(
                    Some(edge.from.as_str()),
                    "edge starts at an unknown node",
                ));
            }
            if !seen.insert((&edge.from, &edge.to)) {
                return Err(EventstreamError::graph(
                    Some(edge.to.as_str()),
                    format!("edge from '{}' listed twice", edge.from),
                ));
            }
            parents
                .entry(edge.to.clone())
                .or_default()
                .push(edge.from.clone());
        }

        for (id, node) in built {
            let ps = parents.remove(&id).unwrap_or_default();
            if ps.is_empty() {
                return Err(EventstreamError::graph(
                    Some(id.as_str()),
                    "node needs at least one parent",
                ));
            }
            graph.nodes.insert(id.clone(), node);
            graph.parents.insert(id, ps);
        }
        graph.topological_order()?;
        Ok(graph)
    }
}
