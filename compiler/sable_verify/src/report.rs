//! Fault records and their rendering into diagnostics.
//!
//! Verification components do not build [`Diagnostic`]s themselves; they
//! produce typed [`Fault`]s, and the driver routes every fault through
//! this module. This is the single place where an internal verification
//! failure becomes a user-visible record — there is no other exit, and in
//! particular no panic path, for malformed input.

use sable_diagnostic::{Diagnostic, ErrorCode};
use sable_ir::{Span, StringInterner};

use crate::ir::{BlockId, Isolation, ScopeId, VarId};

/// Where an escaping closure leaks its environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EscapeSink {
    /// Stored into an aggregate.
    Stored,
    /// Returned from the defining function.
    Returned,
    /// Handed to an unbounded-lifetime executor.
    Dispatched,
}

impl EscapeSink {
    fn describe(self) -> &'static str {
        match self {
            EscapeSink::Stored => "stored here",
            EscapeSink::Returned => "returned here",
            EscapeSink::Dispatched => "dispatched here",
        }
    }
}

/// A verification failure, before rendering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FaultKind {
    /// A consumed or never-defined value was used.
    UseAfterConsume {
        var: VarId,
        /// `true` if the value was consumed on this path, `false` if it
        /// was never defined on it.
        was_consumed: bool,
    },

    /// Predecessor paths disagree about a value's ownership state at a
    /// control-flow join.
    ConflictingOwnershipAtJoin { var: VarId, block: BlockId },

    /// A borrowed value was captured by-borrow into an escaping closure.
    BorrowEscape {
        var: VarId,
        closure: VarId,
        escape_span: Span,
        sink: EscapeSink,
    },

    /// A borrow was still live when the function returned — its scope
    /// never closed on this path.
    UndischargedBorrow { var: VarId, scope: ScopeId },

    /// A live borrow captured by a closure was handed across an
    /// isolation-domain boundary before its scope closed.
    IsolationBorrow {
        var: VarId,
        closure: VarId,
        capture_span: Span,
        from: Isolation,
        to: Isolation,
    },

    /// An IR shape the verifier does not recognize.
    UnsupportedConstruct { detail: String },
}

/// A fault anchored to a source position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fault {
    pub kind: FaultKind,
    pub span: Span,
}

impl Fault {
    pub fn new(kind: FaultKind, span: Span) -> Self {
        Fault { kind, span }
    }

    /// Shorthand for the downgrade path: anything unrepresentable becomes
    /// an `UnsupportedConstruct` fault rather than an abort.
    pub fn unsupported(span: Span, detail: impl Into<String>) -> Self {
        Fault {
            kind: FaultKind::UnsupportedConstruct {
                detail: detail.into(),
            },
            span,
        }
    }

    /// The error code this fault renders to.
    pub fn code(&self) -> ErrorCode {
        match &self.kind {
            FaultKind::UseAfterConsume { .. } => ErrorCode::E4001,
            FaultKind::ConflictingOwnershipAtJoin { .. } => ErrorCode::E4002,
            FaultKind::BorrowEscape { .. } | FaultKind::UndischargedBorrow { .. } => {
                ErrorCode::E4003
            }
            FaultKind::IsolationBorrow { .. } => ErrorCode::E4004,
            FaultKind::UnsupportedConstruct { .. } => ErrorCode::E4005,
        }
    }

    /// Render this fault as a diagnostic.
    ///
    /// `interner` resolves domain names; value ids are rendered in the
    /// IR dump notation (`%0`, `%1`, ...).
    pub fn to_diagnostic(&self, interner: &StringInterner) -> Diagnostic {
        match &self.kind {
            FaultKind::UseAfterConsume { var, was_consumed } => {
                let message = if *was_consumed {
                    format!("value `%{}` used after being consumed", var.raw())
                } else {
                    format!("value `%{}` used before it is defined", var.raw())
                };
                Diagnostic::error(ErrorCode::E4001)
                    .with_message(message)
                    .with_label(self.span, "used here")
            }

            FaultKind::ConflictingOwnershipAtJoin { var, block } => {
                Diagnostic::error(ErrorCode::E4002)
                    .with_message(format!(
                        "ownership of value `%{}` differs between paths joining at block b{}",
                        var.raw(),
                        block.raw()
                    ))
                    .with_label(self.span, "paths disagree when reaching this point")
            }

            FaultKind::BorrowEscape {
                var,
                closure,
                escape_span,
                sink,
            } => Diagnostic::error(ErrorCode::E4003)
                .with_message(format!(
                    "borrowed value `%{}` captured by closure `%{}`, which escapes its scope",
                    var.raw(),
                    closure.raw()
                ))
                .with_label(self.span, "captured by-borrow here")
                .with_secondary_label(*escape_span, sink.describe()),

            FaultKind::UndischargedBorrow { var, scope } => Diagnostic::error(ErrorCode::E4003)
                .with_message(format!(
                    "borrow of value `%{}` is still live when the function returns",
                    var.raw()
                ))
                .with_label(self.span, "function returns here")
                .with_note(format!("borrow scope {} never closes on this path", scope.raw())),

            FaultKind::IsolationBorrow {
                var,
                closure,
                capture_span,
                from,
                to,
            } => Diagnostic::error(ErrorCode::E4004)
                .with_message(format!(
                    "closure `%{}` holding a live borrow of `%{}` crosses from {} to {}",
                    closure.raw(),
                    var.raw(),
                    describe_domain(*from, interner),
                    describe_domain(*to, interner),
                ))
                .with_label(self.span, "handed across the domain boundary here")
                .with_secondary_label(*capture_span, "borrow captured here"),

            FaultKind::UnsupportedConstruct { detail } => Diagnostic::error(ErrorCode::E4005)
                .with_message(format!("unsupported construct: {detail}"))
                .with_label(self.span, "the verifier cannot analyze this"),
        }
    }
}

fn describe_domain(isolation: Isolation, interner: &StringInterner) -> String {
    match isolation {
        Isolation::Unconfined => "unconfined code".to_owned(),
        Isolation::Domain(name) => format!("domain `{}`", interner.lookup(name)),
    }
}
