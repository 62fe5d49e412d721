use thiserror::Error;

use crate::eventstream::EventId;

/// Convenience result type used across the crate.
pub type EventstreamResult<T> = Result<T, EventstreamError>;

/// Error type returned by eventstream, processor and graph operations.
///
/// All errors are fatal at the call site; nothing is retried.
#[derive(Debug, Error)]
pub enum EventstreamError {
    /// Underlying I/O error while reading raw input.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV decoding error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON decoding or encoding error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Required columns are missing, or two schemas cannot be reconciled.
    #[error("schema error: {message}")]
    Schema { message: String },

    /// A processor parameter model could not be constructed.
    #[error("parameter error in {processor}.{field}: {message}")]
    Parameter {
        processor: String,
        field: String,
        message: String,
    },

    /// Invalid graph shape: cycles, deleting the source, unknown nodes.
    #[error("graph structure error{}: {message}", fmt_node(.node))]
    GraphStructure {
        node: Option<String>,
        message: String,
    },

    /// Two merged branches rewrote the same ancestor row differently.
    #[error("lineage conflict{}: branches disagree on event ids {event_ids:?}", fmt_node(.node))]
    LineageConflict {
        node: Option<String>,
        event_ids: Vec<EventId>,
    },

    /// A processor produced a stream that violates eventstream invariants.
    #[error("processor error in {processor}{}: {message}", fmt_node(.node))]
    Processor {
        processor: String,
        node: Option<String>,
        message: String,
    },
}

fn fmt_node(node: &Option<String>) -> String {
    match node {
        Some(id) => format!(" at node '{id}'"),
        None => String::new(),
    }
}

impl EventstreamError {
    pub(crate) fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    pub(crate) fn parameter(
        processor: &str,
        field: &str,
        message: impl Into<String>,
    ) -> Self {
        Self::Parameter {
            processor: processor.to_string(),
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn graph(node: Option<&str>, message: impl Into<String>) -> Self {
        Self::GraphStructure {
            node: node.map(str::to_string),
            message: message.into(),
        }
    }

    pub(crate) fn processor(processor: &str, message: impl Into<String>) -> Self {
        Self::Processor {
            processor: processor.to_string(),
            node: None,
            message: message.into(),
        }
    }

    /// Attach the id of the graph node the error surfaced at, if the kind carries one.
    pub fn at_node(mut self, id: &str) -> Self {
        match &mut self {
            Self::Processor { node, .. }
            | Self::LineageConflict { node, .. }
            | Self::GraphStructure { node, .. } => {
                if node.is_none() {
                    *node = Some(id.to_string());
                }
            }
            _ => {}
        }
        self
    }

    /// Offending graph node, when known.
    pub fn node(&self) -> Option<&str> {
        match self {
            Self::Processor { node, .. }
            | Self::LineageConflict { node, .. }
            | Self::GraphStructure { node, .. } => node.as_deref(),
            _ => None,
        }
    }
}
