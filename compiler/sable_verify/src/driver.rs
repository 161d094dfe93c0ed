//! The verification pass driver.
//!
//! Orchestrates capture analysis, ownership tracking, and isolation
//! checking over every function in a compilation unit. Per unit the
//! driver runs the state machine `Pending → Analyzing(i) → Done(status)`;
//! one function's failure never aborts the unit — the next function is
//! verified regardless, and the unit's final status is [`Failed`]
//! exactly when some function produced an error diagnostic.
//!
//! Functions are independent (each one's state tables are private to its
//! own fixed point), so the driver can verify them on a thread pool when
//! [`VerifyConfig::parallelism`] is greater than one. Reports are
//! collected in function order either way, so the output sequence does
//! not depend on the degree.
//!
//! Cancellation is cooperative and function-grained: a [`CancelToken`]
//! flipped by the enclosing compilation driver stops the pass after the
//! in-flight function completes.
//!
//! [`Failed`]: UnitStatus::Failed

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use sable_diagnostic::{Diagnostic, DiagnosticConfig, DiagnosticQueue};
use sable_ir::{Name, StringInterner};

use crate::capture::analyze_captures;
use crate::ir::{Function, Unit};
use crate::isolation::check_isolation;
use crate::report::Fault;
use crate::tracker::track_function;

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for the verification pass.
#[derive(Clone, Debug)]
pub struct VerifyConfig {
    /// Number of functions verified concurrently. 1 (the default) runs
    /// the sequential driver; values above 1 size a rayon pool.
    pub parallelism: usize,
    /// Per-function diagnostic queue settings.
    pub diagnostics: DiagnosticConfig,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        VerifyConfig {
            parallelism: 1,
            diagnostics: DiagnosticConfig::default(),
        }
    }
}

impl VerifyConfig {
    /// Create a config with the given parallelism degree (clamped to ≥ 1).
    pub fn with_parallelism(parallelism: usize) -> Self {
        VerifyConfig {
            parallelism: parallelism.max(1),
            diagnostics: DiagnosticConfig::default(),
        }
    }
}

/// Cooperative cancellation flag shared with the enclosing compilation
/// driver. Cancelling never interrupts the in-flight function; it stops
/// the pass from starting the next one.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Check whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Explicit state threaded through every component call — no process-wide
/// mutable compiler state anywhere in the pass.
pub struct VerificationContext<'a> {
    /// Resolves [`Name`]s when rendering diagnostics.
    pub interner: &'a StringInterner,
    /// The active configuration.
    pub config: &'a VerifyConfig,
}

impl<'a> VerificationContext<'a> {
    pub fn new(interner: &'a StringInterner, config: &'a VerifyConfig) -> Self {
        VerificationContext { interner, config }
    }
}

// ── Reports ─────────────────────────────────────────────────────────

/// Unit-level verification verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitStatus {
    /// Every verified function was clean.
    Verified,
    /// At least one function produced an error diagnostic.
    Failed,
}

/// Driver state for one compilation unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    /// No function verified yet.
    Pending,
    /// Verifying the function at this index.
    Analyzing(usize),
    /// All functions verified (or the pass was cancelled).
    Done(UnitStatus),
}

/// Diagnostics of one verified function.
#[derive(Clone, Debug)]
pub struct FunctionReport {
    /// The function's name.
    pub name: Name,
    /// Diagnostics in queue order (position-sorted, deduplicated).
    pub diagnostics: Vec<Diagnostic>,
}

impl FunctionReport {
    /// Whether this function failed verification.
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Verification result for a whole compilation unit.
#[derive(Clone, Debug)]
pub struct UnitReport {
    /// The unit-level verdict.
    pub status: UnitStatus,
    /// Per-function reports, in unit order. Functions skipped after a
    /// cancellation are absent.
    pub functions: Vec<FunctionReport>,
    /// Functions not verified because the pass was cancelled.
    pub skipped: usize,
}

impl UnitReport {
    /// All diagnostics of the unit, in function order.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.functions.iter().flat_map(|f| f.diagnostics.iter())
    }

    /// Total error-diagnostic count across the unit.
    pub fn error_count(&self) -> usize {
        self.diagnostics().filter(|d| d.is_error()).count()
    }
}

// ── Per-function verification ───────────────────────────────────────

/// Verify a single function: capture analysis, ownership tracking,
/// isolation checking, and diagnostic assembly.
///
/// Never panics on malformed input — unrecognizable shapes become
/// `E4005` diagnostics and whatever can still be analyzed is.
pub fn verify_function(func: &Function, ctx: &VerificationContext<'_>) -> FunctionReport {
    tracing::debug!(
        function = ctx.interner.lookup(func.name),
        "verifying function"
    );

    let mut queue = DiagnosticQueue::with_config(ctx.config.diagnostics.clone());

    if let Some(fault) = validate_shape(func) {
        queue.push(fault.to_diagnostic(ctx.interner));
        return FunctionReport {
            name: func.name,
            diagnostics: queue.flush(),
        };
    }

    let captures = analyze_captures(func);
    let tracked = track_function(func);
    let isolation_faults = check_isolation(func, &captures, &tracked);

    for fault in captures
        .faults
        .iter()
        .chain(tracked.faults.iter())
        .chain(isolation_faults.iter())
    {
        queue.push(fault.to_diagnostic(ctx.interner));
    }

    FunctionReport {
        name: func.name,
        diagnostics: queue.flush(),
    }
}

/// Structural checks the components assume. A function failing any of
/// them gets a single `E4005` diagnostic and is not analyzed further.
fn validate_shape(func: &Function) -> Option<Fault> {
    let span = func.term_span(func.entry.index());

    if func.var_classes.len() != func.var_kinds.len() {
        return Some(Fault::unsupported(
            span,
            format!(
                "value side tables disagree: {} classes vs {} kinds",
                func.var_classes.len(),
                func.var_kinds.len()
            ),
        ));
    }

    if func.entry.index() >= func.blocks.len() {
        return Some(Fault::unsupported(
            span,
            format!("entry block b{} out of range", func.entry.raw()),
        ));
    }

    for (idx, block) in func.blocks.iter().enumerate() {
        if block.id.index() != idx {
            return Some(Fault::unsupported(
                span,
                format!(
                    "block id b{} stored at arena index {idx}",
                    block.id.raw()
                ),
            ));
        }
    }

    for param in &func.params {
        if param.var.index() >= func.num_vars() {
            return Some(Fault::unsupported(
                span,
                format!(
                    "parameter value `%{}` outside the function's tables",
                    param.var.raw()
                ),
            ));
        }
    }

    None
}

// ── Unit verification ───────────────────────────────────────────────

/// Verify every function in the unit with the given configuration.
pub fn verify_unit(unit: &Unit, config: &VerifyConfig) -> UnitReport {
    verify_unit_with_cancel(unit, config, &CancelToken::new())
}

/// Verify a unit, stopping early (at function granularity) when `cancel`
/// is flipped by the enclosing compilation driver.
pub fn verify_unit_with_cancel(
    unit: &Unit,
    config: &VerifyConfig,
    cancel: &CancelToken,
) -> UnitReport {
    tracing::debug!(
        functions = unit.functions.len(),
        parallelism = config.parallelism,
        "verifying unit"
    );

    let ctx = VerificationContext::new(unit.interner.as_ref(), config);
    let report = if config.parallelism > 1 {
        verify_parallel(unit, &ctx, cancel, config.parallelism)
    } else {
        verify_sequential(unit, &ctx, cancel)
    };

    tracing::debug!(
        status = ?report.status,
        errors = report.error_count(),
        skipped = report.skipped,
        "unit verification complete"
    );
    report
}

fn status_of(reports: &[FunctionReport]) -> UnitStatus {
    if reports.iter().any(FunctionReport::has_errors) {
        UnitStatus::Failed
    } else {
        UnitStatus::Verified
    }
}

fn verify_sequential(
    unit: &Unit,
    ctx: &VerificationContext<'_>,
    cancel: &CancelToken,
) -> UnitReport {
    let total = unit.functions.len();
    let mut completed = Vec::with_capacity(total);

    let mut state = DriverState::Pending;
    let status = loop {
        state = match state {
            DriverState::Pending => DriverState::Analyzing(0),
            DriverState::Analyzing(index) => {
                if index >= total || cancel.is_cancelled() {
                    DriverState::Done(status_of(&completed))
                } else {
                    completed.push(verify_function(&unit.functions[index], ctx));
                    DriverState::Analyzing(index + 1)
                }
            }
            DriverState::Done(status) => break status,
        };
    };

    let skipped = total - completed.len();
    UnitReport {
        status,
        functions: completed,
        skipped,
    }
}

fn verify_parallel(
    unit: &Unit,
    ctx: &VerificationContext<'_>,
    cancel: &CancelToken,
    parallelism: usize,
) -> UnitReport {
    let pool = match rayon::ThreadPoolBuilder::new()
        .num_threads(parallelism)
        .build()
    {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(error = %e, "thread pool creation failed; verifying sequentially");
            return verify_sequential(unit, ctx, cancel);
        }
    };

    // collect() preserves unit order, so the report sequence is the same
    // as the sequential driver's.
    let reports: Vec<Option<FunctionReport>> = pool.install(|| {
        unit.functions
            .par_iter()
            .map(|func| {
                if cancel.is_cancelled() {
                    None
                } else {
                    Some(verify_function(func, ctx))
                }
            })
            .collect()
    });

    let completed: Vec<FunctionReport> = reports.into_iter().flatten().collect();
    let skipped = unit.functions.len() - completed.len();
    UnitReport {
        status: status_of(&completed),
        functions: completed,
        skipped,
    }
}
