//! Status channel from the workflow to its caller.
//!
//! Events are delivered synchronously on the worker thread, in the order
//! they are produced. Callers that own thread-affine state (UI widgets)
//! must marshal events back to their own thread.

use std::sync::{mpsc, Arc};

use crate::models::{StatusEvent, StatusLevel};

/// Receives status events.
pub trait StatusSink: Send + Sync {
    fn emit(&self, event: &StatusEvent);
}

impl<F> StatusSink for F
where
    F: Fn(&StatusEvent) + Send + Sync,
{
    fn emit(&self, event: &StatusEvent) {
        self(event)
    }
}

impl StatusSink for mpsc::Sender<StatusEvent> {
    fn emit(&self, event: &StatusEvent) {
        // Receiver gone means the caller stopped listening.
        let _ = self.send(event.clone());
    }
}

impl StatusSink for tokio::sync::mpsc::UnboundedSender<StatusEvent> {
    fn emit(&self, event: &StatusEvent) {
        let _ = self.send(event.clone());
    }
}

/// Sink that drops everything. Events are still logged by the reporter.
pub struct NullSink;

impl StatusSink for NullSink {
    fn emit(&self, _event: &StatusEvent) {}
}

/// Logs every message through `tracing` and forwards it to the sink.
#[derive(Clone)]
pub struct StatusReporter {
    sink: Arc<dyn StatusSink>,
}

impl StatusReporter {
    pub fn new(sink: Arc<dyn StatusSink>) -> Self {
        Self { sink }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(StatusLevel::Info, message.into());
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.emit(StatusLevel::Warning, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(StatusLevel::Error, message.into());
    }

    pub fn success(&self, message: impl Into<String>) {
        self.emit(StatusLevel::Success, message.into());
    }

    fn emit(&self, level: StatusLevel, message: String) {
        match level {
            StatusLevel::Info | StatusLevel::Success => tracing::info!("{}", message),
            StatusLevel::Warning => tracing::warn!("{}", message),
            StatusLevel::Error => tracing::error!("{}", message),
        }
        self.sink.emit(&StatusEvent::new(level, message));
    }
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new(Arc::new(NullSink))
    }
}
