//! Ingestion entrypoints and implementations.
//!
//! Most callers should use [`ingest_eventstream_from_path`] (from [`unified`]) which:
//!
//! - auto-detects format by file extension (or you can override via [`IngestionOptions`])
//! - reads the raw columns declared by a [`crate::schema::RawDataSchema`]
//! - builds a [`crate::eventstream::Eventstream`]
//! - optionally reports success/failure/alerts to a [`crate::observability::PipelineObserver`]
//!
//! Format-specific readers returning the raw [`crate::types::DataSet`] are available under
//! [`csv`] and [`json`].

pub mod csv;
pub mod json;
pub mod unified;

pub use unified::{
    IngestionFormat, IngestionOptions, ingest_eventstream_from_path, read_raw_events_from_path,
};
