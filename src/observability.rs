//! Pipeline observers: hooks for logging, metrics and alerting around ingestion and `combine`.
//!
//! The library never installs a `tracing` subscriber; these observers are the opt-in,
//! structured way to watch a pipeline from the outside.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::EventstreamError;
use crate::ingestion::IngestionFormat;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal).
    Warning,
    /// Error-level event (operation failed).
    Error,
    /// Critical error (typically I/O failures).
    Critical,
}

impl Severity {
    /// Severity of a failure with the given error.
    pub fn of(error: &EventstreamError) -> Self {
        match error {
            EventstreamError::Io(_) => Severity::Critical,
            EventstreamError::Csv(err) => match err.kind() {
                ::csv::ErrorKind::Io(_) => Severity::Critical,
                _ => Severity::Error,
            },
            _ => Severity::Error,
        }
    }
}

/// Something that happened while ingesting or combining.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    IngestionFinished {
        path: PathBuf,
        format: IngestionFormat,
        rows: usize,
    },
    IngestionFailed {
        path: PathBuf,
        format: Option<IngestionFormat>,
        severity: Severity,
        message: String,
    },
    CombineStarted {
        node: String,
    },
    /// A processor node produced its output.
    NodeComputed {
        node: String,
        processor: String,
        rows: usize,
        elapsed: Duration,
    },
    /// Parents of a multi-parent node were merged.
    MergeCompleted {
        node: String,
        parents: usize,
        rows: usize,
    },
    CombineFinished {
        node: String,
        rows: usize,
        elapsed: Duration,
    },
    CombineFailed {
        node: String,
        severity: Severity,
        message: String,
    },
}

impl PipelineEvent {
    pub fn severity(&self) -> Severity {
        match self {
            PipelineEvent::IngestionFailed { severity, .. }
            | PipelineEvent::CombineFailed { severity, .. } => *severity,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineEvent::IngestionFinished { path, format, rows } => write!(
                f,
                "[ingest][ok] format={format:?} path={} rows={rows}",
                path.display()
            ),
            PipelineEvent::IngestionFailed {
                path,
                format,
                severity,
                message,
            } => write!(
                f,
                "[ingest][{severity:?}] format={format:?} path={} err={message}",
                path.display()
            ),
            PipelineEvent::CombineStarted { node } => write!(f, "[combine][start] node={node}"),
            PipelineEvent::NodeComputed {
                node,
                processor,
                rows,
                elapsed,
            } => write!(
                f,
                "[combine][node] node={node} processor={processor} rows={rows} elapsed={elapsed:?}"
            ),
            PipelineEvent::MergeCompleted {
                node,
                parents,
                rows,
            } => write!(f, "[combine][merge] node={node} parents={parents} rows={rows}"),
            PipelineEvent::CombineFinished {
                node,
                rows,
                elapsed,
            } => write!(
                f,
                "[combine][ok] node={node} rows={rows} elapsed={elapsed:?}"
            ),
            PipelineEvent::CombineFailed {
                node,
                severity,
                message,
            } => write!(f, "[combine][{severity:?}] node={node} err={message}"),
        }
    }
}

/// Observer interface for pipeline events.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait PipelineObserver: Send + Sync {
    /// Called for every event.
    fn on_event(&self, _event: &PipelineEvent) {}

    /// Called when a failure meets the configured alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_event`].
    fn on_alert(&self, event: &PipelineEvent) {
        self.on_event(event)
    }
}

/// Report `event`, escalating to `on_alert` at or above `alert_at_or_above`.
pub(crate) fn notify(
    observer: Option<&Arc<dyn PipelineObserver>>,
    event: PipelineEvent,
    alert_at_or_above: Severity,
) {
    if let Some(obs) = observer {
        obs.on_event(&event);
        if event.severity() > Severity::Info && event.severity() >= alert_at_or_above {
            obs.on_alert(&event);
        }
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn PipelineObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn PipelineObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl PipelineObserver for CompositeObserver {
    fn on_event(&self, event: &PipelineEvent) {
        for o in &self.observers {
            o.on_event(event);
        }
    }

    fn on_alert(&self, event: &PipelineEvent) {
        for o in &self.observers {
            o.on_alert(event);
        }
    }
}

/// Logs pipeline events to stderr.
#[derive(Debug, Default)]
pub struct StdErrObserver;

impl PipelineObserver for StdErrObserver {
    fn on_event(&self, event: &PipelineEvent) {
        eprintln!("{event}");
    }

    fn on_alert(&self, event: &PipelineEvent) {
        eprintln!("[ALERT]{event}");
    }
}

/// Captures every event in memory.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<PipelineEvent>>,
    alerts: Mutex<Vec<PipelineEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events seen so far.
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Snapshot of the alerts seen so far.
    pub fn alerts(&self) -> Vec<PipelineEvent> {
        self.alerts.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl PipelineObserver for RecordingObserver {
    fn on_event(&self, event: &PipelineEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }

    fn on_alert(&self, event: &PipelineEvent) {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(event.clone());
        }
    }
}
