//! Ownership and borrow verification for the Sable compiler.
//!
//! This crate runs after the front-end has lowered typed bodies to the
//! verify IR and attached isolation-domain information to declarations.
//! It provides:
//!
//! - **Verify IR** ([`Function`], [`Block`], [`Instr`], [`Terminator`]) — a
//!   basic-block intermediate representation carrying ownership kinds,
//!   borrow scopes, and isolation tags.
//!
//! - **Capture analysis** ([`analyze_captures`]) — which outer values each
//!   closure literal captures, and under what mode (by-borrow, by-copy,
//!   by-consume), including escape detection.
//!
//! - **Ownership tracking** ([`track_function`]) — a forward dataflow fixed
//!   point computing the live/borrowed/consumed state of every value at
//!   every block boundary.
//!
//! - **Isolation checking** ([`check_isolation`]) — live borrows captured
//!   by a closure must not cross the enclosing isolation-domain boundary
//!   before their scope closes.
//!
//! - **The pass driver** ([`verify_unit`], [`verify_function`]) — runs the
//!   components per function, optionally in parallel, and aggregates
//!   per-function diagnostics into a unit-level verdict.
//!
//! # Design
//!
//! The pass reports, it never aborts: any IR shape the components do not
//! recognize becomes an `E4005` diagnostic and verification continues with
//! the next function. One function's failure is invisible to every other
//! function in the unit.
//!
//! # Crate Dependencies
//!
//! `sable_verify` depends on `sable_ir` (for `Name`, `Span`, the interner)
//! and `sable_diagnostic` (for `Diagnostic`, `ErrorCode`, the queue). No
//! front-end or backend dependency — verification is stage-independent.

pub mod capture;
pub mod driver;
mod graph;
pub mod ir;
pub mod isolation;
pub mod report;
pub mod tracker;

#[cfg(test)]
mod test_helpers;

pub use capture::{analyze_captures, CaptureAnalysis, CaptureMode, ClosureCapture};
pub use driver::{
    verify_function, verify_unit, verify_unit_with_cancel, CancelToken, DriverState,
    FunctionReport, UnitReport, UnitStatus, VerificationContext, VerifyConfig,
};
pub use ir::{
    Block, BlockId, Capture, Function, Instr, Isolation, LitValue, OwnershipKind, Param, RValue,
    ScopeId, Terminator, TyClass, Unit, VarId,
};
pub use isolation::check_isolation;
pub use report::{EscapeSink, Fault, FaultKind};
pub use tracker::{track_function, OwnershipState, StateTable, TrackerResult};
