//! Shared test utilities for the verification components.
//!
//! Consolidates factory functions used across `capture`, `tracker`,
//! `isolation`, and `driver` tests. Only compiled in test builds.

use sable_ir::{Name, Span};

use crate::ir::{
    Block, BlockId, Function, Isolation, OwnershipKind, Param, ScopeId, TyClass, VarId,
};
use crate::report::Fault;
use sable_diagnostic::ErrorCode;

/// Shorthand for `VarId::new(n)`.
pub(crate) fn v(n: u32) -> VarId {
    VarId::new(n)
}

/// Shorthand for `BlockId::new(n)`.
pub(crate) fn b(n: u32) -> BlockId {
    BlockId::new(n)
}

/// Shorthand for `ScopeId::new(n)`.
pub(crate) fn s(n: u32) -> ScopeId {
    ScopeId::new(n)
}

/// Build a minimal `Function` with a default name (`Name::from_raw(1)`).
///
/// `vars` lists (class, kind) for every value in the function, including
/// the parameters.
pub(crate) fn make_func(
    params: Vec<Param>,
    blocks: Vec<Block>,
    vars: Vec<(TyClass, OwnershipKind)>,
) -> Function {
    make_func_named(Name::from_raw(1), params, blocks, vars)
}

/// Build a minimal `Function` with an explicit name.
pub(crate) fn make_func_named(
    name: Name,
    params: Vec<Param>,
    blocks: Vec<Block>,
    vars: Vec<(TyClass, OwnershipKind)>,
) -> Function {
    let spans: Vec<Vec<Option<Span>>> = blocks.iter().map(|bl| vec![None; bl.body.len()]).collect();
    let term_spans = vec![None; blocks.len()];
    let (var_classes, var_kinds) = vars.into_iter().unzip();
    Function {
        name,
        params,
        isolation: Isolation::Unconfined,
        blocks,
        entry: BlockId::new(0),
        var_classes,
        var_kinds,
        spans,
        term_spans,
    }
}

/// Create an owned, ref-typed parameter.
pub(crate) fn owned_param(var: u32) -> Param {
    Param {
        var: VarId::new(var),
        class: TyClass::Ref,
        kind: OwnershipKind::Owned,
    }
}

/// Create a borrowed, ref-typed parameter.
pub(crate) fn borrowed_param(var: u32) -> Param {
    Param {
        var: VarId::new(var),
        class: TyClass::Ref,
        kind: OwnershipKind::Borrowed,
    }
}

/// A ref-typed, owned value table entry.
pub(crate) fn ref_owned() -> (TyClass, OwnershipKind) {
    (TyClass::Ref, OwnershipKind::Owned)
}

/// A ref-typed, borrowed value table entry.
pub(crate) fn ref_borrowed() -> (TyClass, OwnershipKind) {
    (TyClass::Ref, OwnershipKind::Borrowed)
}

/// A scalar, owned value table entry.
pub(crate) fn scalar() -> (TyClass, OwnershipKind) {
    (TyClass::Scalar, OwnershipKind::Owned)
}

/// Error codes of a fault list, in order.
pub(crate) fn codes(faults: &[Fault]) -> Vec<ErrorCode> {
    faults.iter().map(Fault::code).collect()
}
