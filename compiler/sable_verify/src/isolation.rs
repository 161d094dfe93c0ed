//! Isolation-domain compatibility checking for borrow captures.
//!
//! A borrow that is safe in isolation alone, and safe in closures alone,
//! may not be safe when both combine: a closure holding a live borrow
//! must not be handed to code that executes outside the borrowing
//! function's isolation domain before the borrow's scope closes. The
//! synchronous case (`CallClosure` inside the scope) and the discharged
//! case (`Dispatch` after `CloseScope`) are both accepted; only a
//! hand-off while the borrow is live crosses the line.
//!
//! The policy enforced here — borrow scope must contain every
//! cross-domain invocation of the capturing closure — is a deliberate
//! design choice among several defensible ones; see DESIGN.md.
//!
//! Consumes the capture analyzer's records and the tracker's state
//! snapshots; adds no state of its own.

use rustc_hash::FxHashMap;

use crate::capture::{CaptureAnalysis, CaptureMode};
use crate::ir::{Function, Instr, Isolation, ScopeId, VarId};
use crate::report::{Fault, FaultKind};
use crate::tracker::{OwnershipState, TrackerResult};
use sable_ir::Span;

/// A by-borrow capture whose borrow was live at the capture site.
struct LiveBorrowCapture {
    var: VarId,
    scope: ScopeId,
    capture_span: Span,
}

/// Check every cross-domain hand-off in an isolated function.
///
/// Returns faults in program order (block order, then instruction
/// order). Functions without an isolation domain produce no faults here;
/// their dispatches were already classified as escapes by the capture
/// analyzer.
pub fn check_isolation(
    func: &Function,
    captures: &CaptureAnalysis,
    tracked: &TrackerResult,
) -> Vec<Fault> {
    if func.isolation == Isolation::Unconfined {
        return Vec::new();
    }

    // By-borrow captures whose borrow was actually live when captured.
    // A capture of an already-poisoned value is someone else's report.
    let mut live_captures: FxHashMap<VarId, Vec<LiveBorrowCapture>> = FxHashMap::default();
    for capture in &captures.captures {
        if capture.mode != CaptureMode::ByBorrow {
            continue;
        }
        let site = (capture.block.index(), capture.instr);
        let Some(entries) = tracked.capture_states.get(&site) else {
            continue;
        };
        let state = entries
            .iter()
            .find(|(var, _)| *var == capture.var)
            .map(|&(_, state)| state);
        if let Some(OwnershipState::LiveBorrowed(scope)) = state {
            live_captures
                .entry(capture.closure)
                .or_default()
                .push(LiveBorrowCapture {
                    var: capture.var,
                    scope,
                    capture_span: capture.span,
                });
        }
    }

    if live_captures.is_empty() {
        return Vec::new();
    }

    let mut faults = Vec::new();

    for (block_idx, block) in func.blocks.iter().enumerate() {
        for (instr_idx, instr) in block.body.iter().enumerate() {
            let Instr::Dispatch { closure, domain } = instr else {
                continue;
            };
            if *domain == func.isolation {
                // Hand-off within the same domain never crosses the
                // boundary.
                continue;
            }
            let Some(candidates) = live_captures.get(closure) else {
                continue;
            };
            let Some(states) = tracked.dispatch_states.get(&(block_idx, instr_idx)) else {
                continue;
            };

            let span = func.instr_span(block_idx, instr_idx);
            for candidate in candidates {
                let state = states.get(candidate.var.index()).copied();
                if state == Some(OwnershipState::LiveBorrowed(candidate.scope)) {
                    faults.push(Fault::new(
                        FaultKind::IsolationBorrow {
                            var: candidate.var,
                            closure: *closure,
                            capture_span: candidate.capture_span,
                            from: func.isolation,
                            to: *domain,
                        },
                        span,
                    ));
                }
            }
        }
    }

    tracing::debug!(
        function = func.name.raw(),
        violations = faults.len(),
        "isolation check complete"
    );

    faults
}
