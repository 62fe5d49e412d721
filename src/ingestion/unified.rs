//! Unified ingestion entrypoint.
//!
//! Most callers should use [`ingest_eventstream_from_path`], which reads a raw event log and
//! builds an [`Eventstream`] from it.
//!
//! - If [`IngestionOptions::format`] is `None`, the format is inferred from the file extension.
//! - If a [`PipelineObserver`] is provided, success and failure are reported to it.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EventstreamError, EventstreamResult};
use crate::eventstream::{Eventstream, EventstreamContext, EventstreamOptions};
use crate::observability::{PipelineEvent, PipelineObserver, Severity, notify};
use crate::schema::RawDataSchema;
use crate::types::DataSet;

use super::{csv, json};

/// Supported raw input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngestionFormat {
    /// Comma-separated values.
    Csv,
    /// JSON array-of-objects or NDJSON.
    Json,
}

impl IngestionFormat {
    /// Parse an ingestion format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" | "ndjson" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Options controlling unified ingestion behavior.
///
/// Use [`Default`] for common cases.
#[derive(Clone)]
pub struct IngestionOptions {
    /// If `None`, auto-detect format from file extension.
    pub format: Option<IngestionFormat>,
    /// Options for the eventstream built from the raw data.
    pub stream: EventstreamOptions,
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn PipelineObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: Severity,
}

impl fmt::Debug for IngestionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestionOptions")
            .field("format", &self.format)
            .field("stream", &self.stream)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            format: None,
            stream: EventstreamOptions::default(),
            observer: None,
            alert_at_or_above: Severity::Critical,
        }
    }
}

/// Read the raw columns declared by `raw_schema` from `path`.
pub fn read_raw_events_from_path(
    path: impl AsRef<Path>,
    raw_schema: &RawDataSchema,
    format: Option<IngestionFormat>,
) -> EventstreamResult<DataSet> {
    let path = path.as_ref();
    let format = match format {
        Some(f) => f,
        None => infer_format_from_path(path)?,
    };
    match format {
        IngestionFormat::Csv => csv::read_raw_events_csv_from_path(path, raw_schema),
        IngestionFormat::Json => json::read_raw_events_json_from_path(path, raw_schema),
    }
}

/// Read a raw event log and build an eventstream from it.
///
/// When an observer is configured, this function reports `IngestionFinished` with the number of
/// events in the built stream, or `IngestionFailed` with a computed severity (alerting at or
/// above `options.alert_at_or_above`).
///
/// ```no_run
/// use std::sync::Arc;
///
/// use rust_eventstream::eventstream::EventstreamContext;
/// use rust_eventstream::ingestion::{ingest_eventstream_from_path, IngestionOptions};
/// use rust_eventstream::observability::StdErrObserver;
/// use rust_eventstream::schema::RawDataSchema;
///
/// # fn main() -> Result<(), rust_eventstream::EventstreamError> {
/// let opts = IngestionOptions {
///     observer: Some(Arc::new(StdErrObserver)),
///     ..Default::default()
/// };
/// let ctx = EventstreamContext::new();
/// let stream =
///     ingest_eventstream_from_path("clicks.csv", &RawDataSchema::default(), &opts, &ctx)?;
/// println!("events={}", stream.len());
/// # Ok(())
/// # }
/// ```
pub fn ingest_eventstream_from_path(
    path: impl AsRef<Path>,
    raw_schema: &RawDataSchema,
    options: &IngestionOptions,
    ctx: &EventstreamContext,
) -> EventstreamResult<Eventstream> {
    let path = path.as_ref();
    let format = match options.format {
        Some(f) => Ok(f),
        None => infer_format_from_path(path),
    };

    let detected = format.as_ref().ok().copied();

    let result = format.and_then(|f| {
        let raw = read_raw_events_from_path(path, raw_schema, Some(f))?;
        debug!(path = %path.display(), format = ?f, rows = raw.row_count(), "raw events read");
        Eventstream::new(&raw, raw_schema, options.stream.clone(), ctx)
    });

    let event = match &result {
        Ok(stream) => detected.map(|format| PipelineEvent::IngestionFinished {
            path: path.to_path_buf(),
            format,
            rows: stream.len(),
        }),
        Err(e) => Some(PipelineEvent::IngestionFailed {
            path: path.to_path_buf(),
            format: detected,
            severity: Severity::of(e),
            message: e.to_string(),
        }),
    };
    if let Some(event) = event {
        notify(options.observer.as_ref(), event, options.alert_at_or_above);
    }

    result
}

fn infer_format_from_path(path: &Path) -> EventstreamResult<IngestionFormat> {
    let ext = path.extension().and_then(|s| s.to_str()).ok_or_else(|| {
        EventstreamError::schema(format!(
            "cannot infer format: path has no extension ({})",
            path.display()
        ))
    })?;

    IngestionFormat::from_extension(ext).ok_or_else(|| {
        EventstreamError::schema(format!(
            "cannot infer format from extension '{ext}' for path ({})",
            path.display()
        ))
    })
}
