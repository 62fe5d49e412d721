//! `rust-eventstream` models clickstream data as an [`eventstream::Eventstream`]: a typed,
//! canonically ordered table of user events that supports soft deletion and tracks the lineage
//! of every row back to the stream that introduced it.
//!
//! On top of that sits a preprocessing graph ([`graph::PreprocessingGraph`]): a DAG of
//! [`processing::DataProcessor`]s rooted at a source stream. Nodes are computed on demand by
//! [`graph::PreprocessingGraph::combine`]; nodes with several parents merge their branches by
//! lineage first.
//!
//! ## What you get
//!
//! - **Data model**: [`schema::RawDataSchema`] maps raw columns to semantic roles,
//!   [`schema::EventstreamSchema`] names the stream's columns, [`event_type::EventType`] and
//!   [`event_type::IndexOrder`] drive the canonical sort.
//! - **Processors** ([`processing`]): filtering, grouping, renaming, loop collapsing, session
//!   splitting, path truncation and dropping, and labelling of new, lost and cropped users.
//!   Each processor has a typed parameter model ([`params::ParamModel`]) with a widget
//!   descriptor for editors.
//! - **Graphs** ([`graph`]): add, connect and delete nodes, combine, and round-trip through a JSON
//!   description.
//! - **Ingestion** ([`ingestion`]): CSV and JSON/NDJSON event logs straight into a stream.
//! - **Observability** ([`observability`]): opt-in observers for ingestion and `combine`.
//!
//! ## Quick example
//!
//! ```rust
//! use rust_eventstream::eventstream::{Eventstream, EventstreamContext, EventstreamOptions};
//! use rust_eventstream::graph::{Node, NodeId, PreprocessingGraph};
//! use rust_eventstream::processing::{SessionSplit, SplitSessions, SplitSessionsParams};
//! use rust_eventstream::schema::RawDataSchema;
//! use rust_eventstream::time::{TimeSpan, TimeUnit};
//! use rust_eventstream::types::{DataSet, DataType, Field, Schema, Value};
//!
//! # fn main() -> Result<(), rust_eventstream::EventstreamError> {
//! let raw = DataSet::new(
//!     Schema::new(vec![
//!         Field::new("user_id", DataType::Int64),
//!         Field::new("event", DataType::Utf8),
//!         Field::new("timestamp", DataType::Int64),
//!     ]),
//!     vec![
//!         vec![Value::Int64(1), Value::from("A"), Value::Int64(0)],
//!         vec![Value::Int64(1), Value::from("B"), Value::Int64(10)],
//!         vec![Value::Int64(1), Value::from("C"), Value::Int64(500)],
//!     ],
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
//! let split = SplitSessions::new(SplitSessionsParams::new(SessionSplit::Timeout(
//!     TimeSpan::new(60.0, TimeUnit::Seconds),
//! )));
//! graph.add_node(Node::events("sessions", split), &[root])?;
//!
//! let out = graph.combine(&NodeId::from("sessions"))?;
//! let names: Vec<&str> = out.events().map(|e| e.name.as_str()).collect();
//! assert_eq!(
//!     names,
//!     vec!["session_start", "A", "B", "session_end", "session_start", "C", "session_end"]
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`eventstream`]: the stream, its rows, relations, deltas and identity context
//! - [`processing`]: the processor contract, built-in processors and their registry
//! - [`graph`]: the preprocessing DAG
//! - [`params`]: parameter models, widget descriptors and named functions
//! - [`ingestion`]: file readers
//! - [`error`]: the crate-wide error type

pub mod error;
pub mod event_type;
pub mod eventstream;
pub mod graph;
pub mod ingestion;
pub mod observability;
pub mod params;
pub mod processing;
pub mod schema;
pub mod time;
pub mod types;

pub use error::{EventstreamError, EventstreamResult};
