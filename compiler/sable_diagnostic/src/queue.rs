//! Diagnostic queue for collecting, deduplicating, and sorting diagnostics.
//!
//! Features:
//! - Optional error limit to prevent overwhelming output
//! - Deduplication of identical diagnostics
//! - Stable position ordering, so repeated runs over the same input
//!   produce identical sequences

use crate::Diagnostic;

/// Configuration for diagnostic processing.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DiagnosticConfig {
    /// Maximum number of errors before dropping further ones (0 = unlimited).
    pub error_limit: usize,
    /// Deduplicate identical diagnostics.
    pub deduplicate: bool,
}

impl Default for DiagnosticConfig {
    fn default() -> Self {
        DiagnosticConfig {
            error_limit: 0,
            deduplicate: true,
        }
    }
}

impl DiagnosticConfig {
    /// Create a config that drops errors past `limit`.
    pub fn limited(limit: usize) -> Self {
        DiagnosticConfig {
            error_limit: limit,
            deduplicate: true,
        }
    }
}

/// Queue for collecting, deduplicating, and sorting diagnostics.
///
/// ```text
/// let mut queue = DiagnosticQueue::new();
/// queue.push(diagnostic);
/// // ... add more diagnostics
/// let sorted = queue.flush();
/// ```
#[derive(Debug, Default)]
pub struct DiagnosticQueue {
    config: DiagnosticConfig,
    diagnostics: Vec<Diagnostic>,
    /// Errors dropped because the limit was reached.
    suppressed: usize,
}

impl DiagnosticQueue {
    /// Create a queue with the default configuration.
    pub fn new() -> Self {
        Self::with_config(DiagnosticConfig::default())
    }

    /// Create a queue with an explicit configuration.
    pub fn with_config(config: DiagnosticConfig) -> Self {
        DiagnosticQueue {
            config,
            diagnostics: Vec::new(),
            suppressed: 0,
        }
    }

    /// Add a diagnostic to the queue.
    ///
    /// Errors past the configured limit are counted but not stored.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        if diagnostic.is_error()
            && self.config.error_limit > 0
            && self.error_count() >= self.config.error_limit
        {
            self.suppressed += 1;
            return;
        }
        self.diagnostics.push(diagnostic);
    }

    /// Number of queued diagnostics.
    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    /// Check whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Number of queued error-severity diagnostics.
    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    /// Check whether any error-severity diagnostic was queued.
    pub fn has_errors(&self) -> bool {
        self.suppressed > 0 || self.diagnostics.iter().any(Diagnostic::is_error)
    }

    /// Number of errors dropped due to the error limit.
    pub fn suppressed_count(&self) -> usize {
        self.suppressed
    }

    /// Sort, deduplicate, and return all queued diagnostics.
    ///
    /// Ordering is by primary span position (diagnostics without a span
    /// sort last), then insertion order. The sort is stable, so two runs
    /// over the same input yield identical sequences.
    pub fn flush(mut self) -> Vec<Diagnostic> {
        self.diagnostics.sort_by_key(|d| {
            d.primary_span()
                .map_or((u32::MAX, u32::MAX), |s| (s.start, s.end))
        });

        if self.config.deduplicate {
            let mut seen: Vec<Diagnostic> = Vec::with_capacity(self.diagnostics.len());
            for diag in self.diagnostics {
                if seen.last() != Some(&diag) {
                    seen.push(diag);
                }
            }
            seen
        } else {
            self.diagnostics
        }
    }
}
