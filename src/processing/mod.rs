//! Data processors: parameterized, pure transformations from one eventstream to another.
//!
//! A processor implements [`DataProcessor::transform`] and returns either
//!
//! - [`ProcessorOutput::Delta`]: only the rows to add, rewrite or mark deleted, built with
//!   [`Eventstream::delta`]. [`DataProcessor::apply`] joins the delta into a derived copy of the
//!   input and drops the soft-deleted rows. Preferred: event ids (and therefore lineage) of
//!   untouched rows are preserved.
//! - [`ProcessorOutput::Full`]: the complete output, for transformations that rewrite the whole
//!   table. The output must keep a relation to the input whose references resolve.
//!
//! Processors never mutate their input.
//!
//! ## Example: filter, then add path markers
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use rust_eventstream::eventstream::{Eventstream, EventstreamContext, EventstreamOptions};
//! use rust_eventstream::params::NamedFn;
//! use rust_eventstream::processing::{
//!     AddStartEndEvents, DataProcessor, FilterEvents, FilterEventsParams,
//! };
//! use rust_eventstream::schema::{EventstreamSchema, RawDataSchema};
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
//!         vec![Value::Int64(1), Value::from("B"), Value::Int64(1)],
//!     ],
//! );
//! let ctx = EventstreamContext::new();
//! let options = EventstreamOptions { add_start_end_events: false, ..Default::default() };
//! let source = Arc::new(Eventstream::new(&raw, &RawDataSchema::default(), options, &ctx).unwrap());
//!
//! let only_a = NamedFn::mask("only_a", |ds: &DataSet, schema: &EventstreamSchema| {
//!     ds.column(&schema.event_name)
//!         .unwrap_or_default()
//!         .into_iter()
//!         .map(|v| v.as_str() == Some("A"))
//!         .collect()
//! });
//! let filtered = FilterEvents::new(FilterEventsParams { func: only_a })
//!     .apply(&source)
//!     .unwrap();
//! let out = AddStartEndEvents::default().apply(&Arc::new(filtered)).unwrap();
//!
//! let names: Vec<&str> = out.events().map(|e| e.name.as_str()).collect();
//! assert_eq!(names, vec!["path_start", "A", "path_end"]);
//! ```

pub mod add_start_end_events;
pub mod add_targets;
pub mod collapse_loops;
pub mod drop_paths;
pub mod filter_events;
pub mod group_events;
pub mod label_cropped_paths;
pub mod label_lost_users;
pub mod label_new_users;
pub mod pipe;
pub mod registry;
pub mod rename;
pub mod split_sessions;
pub mod truncate_paths;

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{EventstreamError, EventstreamResult};
use crate::eventstream::Eventstream;
use crate::params::{MaskFn, NamedFn, WidgetDescriptor};

pub use add_start_end_events::{AddStartEndEvents, AddStartEndEventsParams};
pub use add_targets::{
    AddNegativeEvents, AddPositiveEvents, AddTargetEvents, Negative, Positive, TargetEventsParams,
    TargetKind,
};
pub use collapse_loops::{CollapseLoops, CollapseLoopsParams, LoopSuffix, TimeAgg};
pub use drop_paths::{DropPaths, DropPathsParams, MinPathLength};
pub use filter_events::{FilterEvents, FilterEventsParams};
pub use group_events::{GroupEvents, GroupEventsParams};
pub use label_cropped_paths::{LabelCroppedPaths, LabelCroppedPathsParams};
pub use label_lost_users::{LabelLostUsers, LabelLostUsersParams, LostUsers};
pub use label_new_users::{LabelNewUsers, LabelNewUsersParams, NewUsers};
pub use pipe::{Pipe, PipeParams};
pub use registry::ProcessorRegistry;
pub use rename::{RenameProcessor, RenameProcessorParams, RenameRule};
pub use split_sessions::{Delimiters, SessionSplit, SplitSessions, SplitSessionsParams};
pub use truncate_paths::{Occurrence, TruncatePaths, TruncatePathsParams};

/// What a processor produced for its input.
#[derive(Debug)]
pub enum ProcessorOutput {
    /// Complete output stream.
    Full(Eventstream),
    /// Additive delta against the input (see [`Eventstream::delta`]).
    Delta(Eventstream),
}

/// A parameterized, pure transformation of an eventstream.
pub trait DataProcessor: fmt::Debug + Send + Sync {
    /// Processor class name, as used in graph descriptions.
    fn name(&self) -> &'static str;

    /// Parameters as JSON; function fields appear as their handle name.
    fn params(&self) -> serde_json::Value;

    /// Widget descriptors of the parameter model.
    fn widgets(&self) -> Vec<WidgetDescriptor>;

    /// Compute the full output or a delta for `input`.
    fn transform(&self, input: &Arc<Eventstream>) -> EventstreamResult<ProcessorOutput>;

    /// Compute this processor's output stream for `input`.
    ///
    /// # Errors
    ///
    /// [`EventstreamError::Processor`] when the produced stream violates eventstream
    /// invariants, plus whatever `transform` reports.
    fn apply(&self, input: &Arc<Eventstream>) -> EventstreamResult<Eventstream> {
        let output = self.transform(input)?;
        finalize(self.name(), input, output)
    }
}

/// Normalize a processor's output into its node output stream.
pub(crate) fn finalize(
    processor: &str,
    input: &Arc<Eventstream>,
    output: ProcessorOutput,
) -> EventstreamResult<Eventstream> {
    match output {
        ProcessorOutput::Delta(delta) => {
            let ref_col = format!("ref_{}", input.id());
            let related = delta
                .relations()
                .iter()
                .any(|r| r.ref_col == ref_col && r.eventstream.id() == input.id());
            if !related {
                return Err(EventstreamError::processor(
                    processor,
                    format!("delta does not reference its input stream {}", input.id()),
                ));
            }
            let mut out = Eventstream::derive(input);
            out.join(&delta, &ref_col)
                .map_err(|e| EventstreamError::processor(processor, e.to_string()))?;
            let dropped = out.drop_soft_deleted();
            debug!(
                processor,
                input = %input.id(),
                output = %out.id(),
                delta_rows = delta.rows().len(),
                dropped,
                "delta applied"
            );
            Ok(out)
        }
        ProcessorOutput::Full(stream) => {
            validate_full(processor, input, &stream)?;
            debug!(
                processor,
                input = %input.id(),
                output = %stream.id(),
                rows = stream.len(),
                "full output"
            );
            Ok(stream)
        }
    }
}

fn validate_full(
    processor: &str,
    input: &Eventstream,
    output: &Eventstream,
) -> EventstreamResult<()> {
    if !input.schema().same_roles(output.schema()) {
        return Err(EventstreamError::processor(
            processor,
            format!(
                "output role columns {:?} differ from input {:?}",
                output.schema().get_cols(),
                input.schema().get_cols()
            ),
        ));
    }
    let Some(rel) = output
        .relations()
        .iter()
        .position(|r| r.eventstream.id() == input.id())
    else {
        return Err(EventstreamError::processor(
            processor,
            format!("output is not related to its input stream {}", input.id()),
        ));
    };
    let broken: Vec<_> = output
        .rows()
        .iter()
        .filter_map(|r| r.refs.get(rel).copied().flatten())
        .filter(|id| input.get(*id).is_none())
        .collect();
    if !broken.is_empty() {
        return Err(EventstreamError::processor(
            processor,
            format!("output references unknown input events {broken:?}"),
        ));
    }
    Ok(())
}

/// Evaluate a row mask against the live rows of `stream`, in canonical order.
pub(crate) fn evaluate_mask(
    processor: &str,
    func: &NamedFn<MaskFn>,
    stream: &Eventstream,
) -> EventstreamResult<Vec<bool>> {
    let frame = stream.to_dataframe();
    let mask = (func.get())(&frame, stream.schema());
    if mask.len() != frame.row_count() {
        return Err(EventstreamError::processor(
            processor,
            format!(
                "mask '{}' returned {} flags for {} rows",
                func.name(),
                mask.len(),
                frame.row_count()
            ),
        ));
    }
    Ok(mask)
}
