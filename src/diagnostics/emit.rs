//! Diagnostic emission backend.
//!
//! Every report goes to a [`DiagnosticSink`]. The default sink forwards to
//! the `log` crate; tests use [`CollectingSink`].

use crossbeam_queue::SegQueue;

use super::kind::{Diagnostic, DiagnosticKind};

/// A diagnostic sink trait for custom output.
///
/// Sinks are called from inside the heap's critical section and must not
/// block or call back into the heap.
pub trait DiagnosticSink: Send + Sync {
    /// Handle a diagnostic.
    fn emit(&self, diag: &Diagnostic);
}

/// Sink that routes diagnostics through the `log` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn emit(&self, diag: &Diagnostic) {
        match diag.kind {
            DiagnosticKind::Error => log::error!("{diag}"),
            DiagnosticKind::Warning => log::warn!("{diag}"),
            DiagnosticKind::Note => log::info!("{diag}"),
        }
    }
}

/// A lock-free sink that collects diagnostics.
#[derive(Default)]
pub struct CollectingSink {
    diagnostics: SegQueue<Diagnostic>,
}

impl CollectingSink {
    /// Create a new collecting sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain everything collected so far, oldest first.
    pub fn take(&self) -> Vec<Diagnostic> {
        std::iter::from_fn(|| self.diagnostics.pop()).collect()
    }

    /// Number of diagnostics waiting.
    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    /// Whether nothing has been collected.
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

impl DiagnosticSink for CollectingSink {
    fn emit(&self, diag: &Diagnostic) {
        self.diagnostics.push(diag.clone());
    }
}
