//! Verify IR — basic-block intermediate representation for ownership
//! verification.
//!
//! The front-end lowers typed bodies to this IR after isolation-domain
//! information has been attached to declarations. All verification
//! components (capture analysis, ownership tracking, isolation checking)
//! operate on it read-only.
//!
//! # Architecture
//!
//! The verify IR follows the same basic-block structure as LLVM IR and
//! Rust's MIR:
//!
//! - **[`Function`]** — a function body: parameters, blocks, per-value
//!   side tables, isolation tag
//! - **[`Block`]** — a basic block: body instructions and a terminator
//! - **[`Instr`]** — a single instruction (binding, call, borrow, consume,
//!   scope bracket, closure literal, dispatch)
//! - **[`Terminator`]** — block exit (return, jump, branch, switch)
//!
//! Values are named via [`VarId`]. Control flow uses [`BlockId`] indices
//! between blocks; blocks are stored in an arena (`Vec<Block>`) addressed
//! by index, so the cyclic CFG holds no owning references.
//!
//! Adding an instruction kind is a compile-time exhaustiveness failure in
//! every component that matches on [`Instr`].

use sable_ir::{Name, Span};

// ── ID newtypes ─────────────────────────────────────────────────────

/// Value ID within a verify IR function.
///
/// Each `VarId` identifies a unique value within a single [`Function`].
/// IDs are allocated sequentially starting from 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct VarId(u32);

impl VarId {
    /// Create a new value ID from a raw index.
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize` (for indexing into side tables).
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Basic block ID within a verify IR function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct BlockId(u32);

impl BlockId {
    /// Create a new block ID from a raw index.
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize` (for indexing into `Vec<Block>`).
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Borrow scope ID within a verify IR function.
///
/// Scope 0 is reserved for the function body itself: borrowed-kind
/// parameters enter the function already borrowed for that scope, and it
/// is discharged implicitly at `Return`. The front-end allocates explicit
/// scopes (function calls, closure bodies, `OpenScope` brackets) from 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct ScopeId(u32);

impl ScopeId {
    /// The implicit function-body scope.
    pub const FUNCTION: ScopeId = ScopeId(0);

    /// Create a new scope ID from a raw index.
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }
}

// ── Classification and ownership tags ───────────────────────────────

/// Post-monomorphization type classification for a value.
///
/// The upstream stage classifies every value before verification; the
/// verifier never inspects types itself. Scalar values (ints, bools,
/// floats) carry no references and are always captured by copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum TyClass {
    /// Purely stack/register data. No reference to anything heap-bound.
    Scalar,
    /// Reference-typed: aliases heap state and participates in borrow and
    /// consume tracking.
    Ref,
}

/// Declared ownership kind of a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum OwnershipKind {
    /// The value owns its referent for its whole lifetime.
    Owned,
    /// A non-owning, time-bounded access right produced by a `Borrow`
    /// instruction or a borrowing parameter.
    Borrowed,
    /// An owned value the holder is obligated to consume.
    Consuming,
}

/// Isolation-domain tag for a function or a dispatch target.
///
/// A domain is a confinement boundary restricting which execution context
/// may touch a value without synchronization (an actor-like construct in
/// the surface language).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Isolation {
    /// Not confined to any domain.
    Unconfined,
    /// Confined to the named domain.
    Domain(Name),
}

// ── Literal values ──────────────────────────────────────────────────

/// Literal value in the verify IR.
///
/// Only the shapes the verifier can meet survive lowering; everything
/// else is already folded away by the front-end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum LitValue {
    Int(i64),
    Bool(bool),
    Str(Name),
    Unit,
}

/// A value expression on the right-hand side of a `Let`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum RValue {
    /// Copy of an existing value.
    Var(VarId),
    /// A literal constant.
    Literal(LitValue),
}

// ── Captures ────────────────────────────────────────────────────────

/// A single capture slot of a `MakeClosure` instruction.
///
/// Whether the capture is by-borrow, by-copy, or by-consume is *not*
/// stored here — that is the capture analyzer's output
/// ([`CaptureMode`](crate::CaptureMode)). The IR records only what the
/// source said: which outer value, and whether it was explicitly marked
/// for move.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Capture {
    /// The captured outer value.
    pub var: VarId,
    /// Explicitly marked for move into the closure environment.
    pub by_move: bool,
}

// ── Parameters ──────────────────────────────────────────────────────

/// A function parameter with its classification and declared ownership.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Param {
    /// The value ID bound to this parameter.
    pub var: VarId,
    /// Scalar or reference-typed.
    pub class: TyClass,
    /// Declared ownership kind.
    pub kind: OwnershipKind,
}

// ── Instructions ────────────────────────────────────────────────────

/// A single instruction in a verify IR basic block.
///
/// Instructions execute sequentially within a block. The tracker matches
/// this enum exhaustively; a new variant is a compile error in every
/// component until its transfer rule is written.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Instr {
    /// Bind a literal or copy a value: `let dst = value`.
    Let { dst: VarId, value: RValue },

    /// Direct synchronous call: `let dst = func(args...)`.
    Apply {
        dst: VarId,
        func: Name,
        args: Vec<VarId>,
    },

    /// Aggregate construction: `let dst = (args...)`. Arguments are
    /// stored into the aggregate, so this is an escape sink for closures.
    Construct { dst: VarId, args: Vec<VarId> },

    /// Open a borrow of `source` bound to `scope`: `dst` is the borrowed
    /// reference, valid until `CloseScope { scope }`.
    Borrow {
        dst: VarId,
        source: VarId,
        scope: ScopeId,
    },

    /// End an owned value's lifetime (transfer or destroy).
    Consume { var: VarId },

    /// Structural marker opening an explicit borrow scope. The tracker
    /// keys discharge off `CloseScope` alone; this marker exists so the
    /// lowering stays balanced and readable in IR dumps.
    OpenScope { scope: ScopeId },

    /// Close a borrow scope, discharging every borrow bound to it.
    CloseScope { scope: ScopeId },

    /// Closure literal: `let dst = closure[func](captures...)`.
    MakeClosure {
        dst: VarId,
        func: Name,
        captures: Vec<Capture>,
    },

    /// Synchronous closure invocation in the current scope and domain:
    /// `let dst = closure(args...)`. Never an escape.
    CallClosure {
        dst: VarId,
        closure: VarId,
        args: Vec<VarId>,
    },

    /// Hand the closure to a sink that executes it in `domain` with
    /// unbounded lifetime (an actor mailbox, an executor, a task queue).
    Dispatch { closure: VarId, domain: Isolation },
}

impl Instr {
    /// Returns the value defined (written) by this instruction, if any.
    ///
    /// Used by the tracker to decide which state slot an instruction
    /// updates, and by the capture analyzer to find closure definitions.
    pub fn defined_var(&self) -> Option<VarId> {
        match self {
            Instr::Let { dst, .. }
            | Instr::Apply { dst, .. }
            | Instr::Construct { dst, .. }
            | Instr::Borrow { dst, .. }
            | Instr::MakeClosure { dst, .. }
            | Instr::CallClosure { dst, .. } => Some(*dst),

            Instr::Consume { .. }
            | Instr::OpenScope { .. }
            | Instr::CloseScope { .. }
            | Instr::Dispatch { .. } => None,
        }
    }

    /// Returns all values read (used) by this instruction.
    ///
    /// Every `VarId` in a read position: call arguments, borrow sources,
    /// consumed values, captured values, dispatched closures. The `dst`
    /// of defining instructions is NOT included.
    pub fn used_vars(&self) -> Vec<VarId> {
        match self {
            Instr::Let { value, .. } => match value {
                RValue::Var(v) => vec![*v],
                RValue::Literal(_) => vec![],
            },

            Instr::Apply { args, .. } | Instr::Construct { args, .. } => args.clone(),

            Instr::Borrow { source, .. } => vec![*source],

            Instr::Consume { var } => vec![*var],

            Instr::OpenScope { .. } | Instr::CloseScope { .. } => vec![],

            Instr::MakeClosure { captures, .. } => captures.iter().map(|c| c.var).collect(),

            Instr::CallClosure { closure, args, .. } => {
                let mut vars = Vec::with_capacity(1 + args.len());
                vars.push(*closure);
                vars.extend_from_slice(args);
                vars
            }

            Instr::Dispatch { closure, .. } => vec![*closure],
        }
    }
}

// ── Terminators ─────────────────────────────────────────────────────

/// Block terminator — how control leaves a basic block.
///
/// Every block ends with exactly one terminator. Terminators reference
/// successor blocks by [`BlockId`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Terminator {
    /// Return from the function, optionally with a value. Returning a
    /// closure is an escape sink.
    Return { value: Option<VarId> },

    /// Unconditional jump to a target block.
    Jump { target: BlockId },

    /// Conditional branch on a boolean.
    Branch {
        cond: VarId,
        then_block: BlockId,
        else_block: BlockId,
    },

    /// Multi-way branch on an integer discriminant.
    Switch {
        scrutinee: VarId,
        cases: Vec<(u64, BlockId)>,
        default: BlockId,
    },
}

impl Terminator {
    /// Returns all values read (used) by this terminator.
    pub fn used_vars(&self) -> Vec<VarId> {
        match self {
            Terminator::Return { value } => value.map_or_else(Vec::new, |v| vec![v]),
            Terminator::Jump { .. } => vec![],
            Terminator::Branch { cond, .. } => vec![*cond],
            Terminator::Switch { scrutinee, .. } => vec![*scrutinee],
        }
    }
}

// ── Blocks ──────────────────────────────────────────────────────────

/// A basic block in the verify IR.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Block {
    /// This block's identifier. Must equal its arena index.
    pub id: BlockId,
    /// Sequential instructions executed in order.
    pub body: Vec<Instr>,
    /// How control leaves this block.
    pub terminator: Terminator,
}

// ── Functions ───────────────────────────────────────────────────────

/// A complete function in the verify IR.
///
/// Per-value metadata lives in index-addressed side tables
/// ([`var_classes`](Self::var_classes), [`var_kinds`](Self::var_kinds)),
/// both indexed by `VarId::index()`. The tables are authoritative: a
/// `VarId` outside them is malformed IR and reported as such.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Function {
    /// The function's mangled name.
    pub name: Name,
    /// Function parameters in declaration order.
    pub params: Vec<Param>,
    /// The isolation domain this function executes in.
    pub isolation: Isolation,
    /// Basic blocks in arena order. `blocks[entry.index()]` is the entry.
    pub blocks: Vec<Block>,
    /// The entry block ID.
    pub entry: BlockId,
    /// Classification of each value, indexed by `VarId::index()`.
    pub var_classes: Vec<TyClass>,
    /// Declared ownership kind of each value, indexed by `VarId::index()`.
    pub var_kinds: Vec<OwnershipKind>,
    /// Source spans for instructions, indexed by `[block_index][instr_index]`.
    /// `None` for synthetic instructions.
    ///
    /// Skipped during cache serialization — spans are source metadata not
    /// needed downstream. Deserialized functions get empty span vectors.
    #[cfg_attr(feature = "cache", serde(skip))]
    pub spans: Vec<Vec<Option<Span>>>,
    /// Source span of each block's terminator, indexed by block index.
    #[cfg_attr(feature = "cache", serde(skip))]
    pub term_spans: Vec<Option<Span>>,
}

impl Function {
    /// Look up the classification of a value, if the ID is in range.
    #[inline]
    pub fn var_class(&self, var: VarId) -> Option<TyClass> {
        self.var_classes.get(var.index()).copied()
    }

    /// Look up the declared ownership kind of a value, if the ID is in range.
    #[inline]
    pub fn var_kind(&self, var: VarId) -> Option<OwnershipKind> {
        self.var_kinds.get(var.index()).copied()
    }

    /// Number of values in this function's side tables.
    #[inline]
    pub fn num_vars(&self) -> usize {
        self.var_kinds.len()
    }

    /// Allocate a fresh value with the given classification and kind.
    ///
    /// Returns a new [`VarId`] that does not collide with any existing
    /// value in this function.
    pub fn fresh_var(&mut self, class: TyClass, kind: OwnershipKind) -> VarId {
        let id = u32::try_from(self.var_kinds.len())
            .unwrap_or_else(|_| panic!("value count exceeds u32::MAX"));
        self.var_classes.push(class);
        self.var_kinds.push(kind);
        VarId::new(id)
    }

    /// Append a new basic block to this function.
    ///
    /// The block's `id` must equal the next sequential arena index.
    /// Span entries are initialized to `None` for each instruction.
    pub fn push_block(&mut self, block: Block) {
        let expected = self.next_block_id();
        debug_assert_eq!(
            block.id,
            expected,
            "block ID {} does not match expected index {}",
            block.id.raw(),
            expected.raw(),
        );
        self.spans.push(vec![None; block.body.len()]);
        self.term_spans.push(None);
        self.blocks.push(block);
    }

    /// Return the [`BlockId`] that the next [`push_block`](Self::push_block)
    /// call will use.
    pub fn next_block_id(&self) -> BlockId {
        BlockId::new(
            u32::try_from(self.blocks.len())
                .unwrap_or_else(|_| panic!("block count exceeds u32::MAX")),
        )
    }

    /// Best-effort span for an instruction (dummy when absent).
    pub fn instr_span(&self, block_idx: usize, instr_idx: usize) -> Span {
        self.spans
            .get(block_idx)
            .and_then(|block_spans| block_spans.get(instr_idx))
            .copied()
            .flatten()
            .unwrap_or(Span::DUMMY)
    }

    /// Best-effort span for a block's terminator (dummy when absent).
    pub fn term_span(&self, block_idx: usize) -> Span {
        self.term_spans
            .get(block_idx)
            .copied()
            .flatten()
            .unwrap_or(Span::DUMMY)
    }
}

// ── Compilation units ───────────────────────────────────────────────

/// A compilation unit: the functions the driver verifies, plus the
/// interner their names were interned into.
pub struct Unit {
    /// Functions in front-end order. Verification preserves this order
    /// in its report.
    pub functions: Vec<Function>,
    /// Shared interner for resolving [`Name`]s in diagnostics.
    pub interner: sable_ir::SharedInterner,
}

impl Unit {
    /// Create a unit over an existing interner.
    pub fn new(functions: Vec<Function>, interner: sable_ir::SharedInterner) -> Self {
        Unit {
            functions,
            interner,
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
