//! Closure capture analysis.
//!
//! Scans a function's closure literals and determines, for every captured
//! outer value, the capture's effective mode:
//!
//! - **by-borrow** — a borrowed-kind value captured by a non-escaping
//!   closure; the closure reads through the live borrow.
//! - **by-copy** — scalar values always, and owned values not marked for
//!   move; the closure gets its own copy.
//! - **by-consume** — an owned value explicitly marked for move; the
//!   outer binding's lifetime ends at the capture.
//!
//! A closure **escapes** when its invocation may outlive the defining
//! synchronous scope: it is stored into an aggregate, returned, or (from
//! unconfined code) dispatched to an unbounded-lifetime executor. A
//! borrowed-kind value may never ride a by-borrow capture into an
//! escaping closure — that is a `BorrowEscape` fault at the capture
//! site, never a silent coercion. Dispatch out of an *isolated* function
//! is the isolation checker's territory and is not classified as an
//! escape here.
//!
//! Pure over the IR: no state, no mutation, deterministic output order
//! (block order, then instruction order, then capture slot order).

use rustc_hash::{FxHashMap, FxHashSet};

use sable_ir::Span;

use crate::ir::{BlockId, Function, Instr, Isolation, OwnershipKind, Terminator, TyClass, VarId};
use crate::report::{EscapeSink, Fault, FaultKind};

/// Effective ownership mode of a single closure capture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CaptureMode {
    /// The closure reads through a live borrow of the outer value.
    ByBorrow,
    /// The closure owns an independent copy.
    ByCopy,
    /// The outer value moves into the closure environment.
    ByConsume,
}

/// One resolved capture: a closure literal referencing an outer value.
///
/// A relation, not ownership — the IR's [`Capture`](crate::ir::Capture)
/// slot plus the analyzer's mode decision and the program point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClosureCapture {
    /// The closure literal's result value.
    pub closure: VarId,
    /// The captured outer value.
    pub var: VarId,
    /// The capture's effective ownership mode.
    pub mode: CaptureMode,
    /// Block containing the `MakeClosure`.
    pub block: BlockId,
    /// Instruction index of the `MakeClosure` within its block.
    pub instr: usize,
    /// Span of the `MakeClosure` instruction.
    pub span: Span,
}

/// Output of capture analysis for one function.
pub struct CaptureAnalysis {
    /// All resolved captures, in program order.
    pub captures: Vec<ClosureCapture>,
    /// Closures that escape their defining scope, with the first
    /// escaping use found in program order.
    pub escaping: FxHashMap<VarId, (Span, EscapeSink)>,
    /// Borrow-escape faults, in program order.
    pub faults: Vec<Fault>,
}

impl CaptureAnalysis {
    /// Captures of one closure, in slot order.
    pub fn captures_of(&self, closure: VarId) -> impl Iterator<Item = &ClosureCapture> {
        self.captures.iter().filter(move |c| c.closure == closure)
    }
}

/// Analyze every closure literal in `func`.
///
/// Out-of-range capture ids produce no record here — the tracker reports
/// the malformed use; duplicating it would double the diagnostic.
pub fn analyze_captures(func: &Function) -> CaptureAnalysis {
    let closure_vars = collect_closure_vars(func);
    let escaping = find_escapes(func, &closure_vars);

    let mut captures = Vec::new();
    let mut faults = Vec::new();

    for (block_idx, block) in func.blocks.iter().enumerate() {
        for (instr_idx, instr) in block.body.iter().enumerate() {
            let Instr::MakeClosure {
                dst,
                captures: slots,
                ..
            } = instr
            else {
                continue;
            };
            let span = func.instr_span(block_idx, instr_idx);

            for slot in slots {
                let (Some(class), Some(kind)) =
                    (func.var_class(slot.var), func.var_kind(slot.var))
                else {
                    continue;
                };

                let mode = match (class, kind) {
                    (TyClass::Scalar, _) => CaptureMode::ByCopy,
                    (TyClass::Ref, OwnershipKind::Borrowed) => CaptureMode::ByBorrow,
                    (TyClass::Ref, OwnershipKind::Owned | OwnershipKind::Consuming) => {
                        if slot.by_move {
                            CaptureMode::ByConsume
                        } else {
                            CaptureMode::ByCopy
                        }
                    }
                };

                if mode == CaptureMode::ByBorrow {
                    if let Some(&(escape_span, sink)) = escaping.get(dst) {
                        faults.push(Fault::new(
                            FaultKind::BorrowEscape {
                                var: slot.var,
                                closure: *dst,
                                escape_span,
                                sink,
                            },
                            span,
                        ));
                    }
                }

                captures.push(ClosureCapture {
                    closure: *dst,
                    var: slot.var,
                    mode,
                    block: block.id,
                    instr: instr_idx,
                    span,
                });
            }
        }
    }

    tracing::debug!(
        function = func.name.raw(),
        captures = captures.len(),
        escaping = escaping.len(),
        "capture analysis complete"
    );

    CaptureAnalysis {
        captures,
        escaping,
        faults,
    }
}

/// Result values of every `MakeClosure` in the function.
fn collect_closure_vars(func: &Function) -> FxHashSet<VarId> {
    let mut vars = FxHashSet::default();
    for block in &func.blocks {
        for instr in &block.body {
            if let Instr::MakeClosure { dst, .. } = instr {
                vars.insert(*dst);
            }
        }
    }
    vars
}

/// Find the first escaping use of each closure, in program order.
fn find_escapes(
    func: &Function,
    closure_vars: &FxHashSet<VarId>,
) -> FxHashMap<VarId, (Span, EscapeSink)> {
    let mut escaping = FxHashMap::default();

    let record = |var: VarId,
                  span: Span,
                  sink: EscapeSink,
                  map: &mut FxHashMap<VarId, (Span, EscapeSink)>| {
        if closure_vars.contains(&var) {
            map.entry(var).or_insert((span, sink));
        }
    };

    for (block_idx, block) in func.blocks.iter().enumerate() {
        for (instr_idx, instr) in block.body.iter().enumerate() {
            let span = func.instr_span(block_idx, instr_idx);
            match instr {
                Instr::Construct { args, .. } => {
                    for &arg in args {
                        record(arg, span, EscapeSink::Stored, &mut escaping);
                    }
                }
                Instr::Dispatch { closure, .. } => {
                    // Cross-domain hand-off from an isolated function is
                    // judged by the isolation checker against the live
                    // borrow, not flagged as a plain escape.
                    if func.isolation == Isolation::Unconfined {
                        record(*closure, span, EscapeSink::Dispatched, &mut escaping);
                    }
                }
                _ => {}
            }
        }

        if let Terminator::Return { value: Some(v) } = block.terminator {
            record(v, func.term_span(block_idx), EscapeSink::Returned, &mut escaping);
        }
    }

    escaping
}

#[cfg(test)]
mod tests;
