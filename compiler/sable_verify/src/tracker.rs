//! Forward dataflow ownership tracking.
//!
//! Computes the abstract ownership state of every value at every block
//! boundary, then walks each block once to report violations. This is
//! the component the other two lean on: capture analysis feeds it
//! closure sites, and isolation checking consumes the states it records
//! at capture and dispatch sites.
//!
//! # Algorithm
//!
//! Standard forward dataflow with fixed-point iteration:
//!
//! 1. **Initialize** the entry block from the parameter list: owned and
//!    consuming parameters start `LiveOwned`, borrowing parameters start
//!    `LiveBorrowed` for the implicit function-body scope.
//! 2. **Iterate** an explicit worklist of block indices (seeded in
//!    reverse postorder, tracked with a pending bitset — no recursion):
//!    entry state = meet over reached predecessors' exit states, exit
//!    state = transfer over the block body.
//! 3. **Meet rule**: equal states pass through; any disagreement lowers
//!    to `Undefined`. Disagreements between two *defined* states are
//!    conflicts; a defined state meeting `Undefined` is just a
//!    conditionally-defined value.
//! 4. **Report** in a second, single walk per block (in index order)
//!    using the converged entry states, so diagnostic order is stable
//!    and a rerun produces an identical sequence.
//!
//! Convergence is guaranteed: per value the state can only descend in a
//! finite lattice (`Undefined` below everything else), and every
//! transfer rule is monotone — a lowered input never raises an output.
//!
//! # Poisoning
//!
//! The first fault for a value flags it and (for state-bearing faults)
//! lowers it to `Undefined`. Flagged values never produce further
//! diagnostics, so a double consume yields exactly one report and
//! values derived from a flagged one stay silent.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};

use sable_ir::Span;

use crate::graph::{compute_predecessors, compute_reverse_postorder, successor_block_ids};
use crate::ir::{Function, Instr, OwnershipKind, RValue, ScopeId, Terminator, VarId};
use crate::report::{Fault, FaultKind};

/// Abstract ownership state of a value at a program point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OwnershipState {
    /// Not defined on this path (also the poison state after a fault).
    Undefined,
    /// Live and owned.
    LiveOwned,
    /// Live, with an outstanding borrow bound to the given scope.
    LiveBorrowed(ScopeId),
    /// Lifetime ended by a consume, a move, or a scope close.
    Consumed,
}

/// Ownership states for every value, indexed by `VarId::index()`.
pub type StateTable = Vec<OwnershipState>;

/// Program point of an instruction: (block index, instruction index).
type Site = (usize, usize);

/// Everything ownership tracking learned about one function.
pub struct TrackerResult {
    /// Converged state at each block entry, indexed by block index.
    /// Unreachable blocks keep all-`Undefined` tables.
    pub entry_states: Vec<StateTable>,
    /// State of each captured value at each `MakeClosure` site, keyed by
    /// program point, in capture order.
    pub capture_states: FxHashMap<Site, Vec<(VarId, OwnershipState)>>,
    /// Full state table at each `Dispatch` site, keyed by program point.
    pub dispatch_states: FxHashMap<Site, StateTable>,
    /// Faults in deterministic emission order (block order, then
    /// instruction order within a block).
    pub faults: Vec<Fault>,
}

// ── Fault sinks ─────────────────────────────────────────────────────

/// Receiver for faults and state snapshots during a block walk.
///
/// The fixed-point phase walks blocks many times and must stay silent;
/// the reporting phase walks each block once and records. State
/// transitions are identical under both sinks — only emission differs.
trait Sink {
    /// Report a fault attributed to a value, at most once per value.
    fn report_once(&mut self, var: VarId, fault: Fault);
    /// Report a fault not attributed to any single value.
    fn fault(&mut self, fault: Fault);
    /// Mark a value as already-faulted without emitting (poison spread).
    fn flag(&mut self, var: VarId);
    /// Record capture-site states for the isolation checker.
    fn snapshot_capture(&mut self, site: Site, entries: Vec<(VarId, OwnershipState)>);
    /// Record dispatch-site states for the isolation checker.
    fn snapshot_dispatch(&mut self, site: Site, states: &[OwnershipState]);
}

/// Sink for the fixed-point phase: transitions only, no output.
struct Silent;

impl Sink for Silent {
    fn report_once(&mut self, _var: VarId, _fault: Fault) {}
    fn fault(&mut self, _fault: Fault) {}
    fn flag(&mut self, _var: VarId) {}
    fn snapshot_capture(&mut self, _site: Site, _entries: Vec<(VarId, OwnershipState)>) {}
    fn snapshot_dispatch(&mut self, _site: Site, _states: &[OwnershipState]) {}
}

/// Sink for the reporting phase.
#[derive(Default)]
struct Recorder {
    faults: Vec<Fault>,
    flagged: FxHashSet<VarId>,
    capture_states: FxHashMap<Site, Vec<(VarId, OwnershipState)>>,
    dispatch_states: FxHashMap<Site, StateTable>,
}

impl Sink for Recorder {
    fn report_once(&mut self, var: VarId, fault: Fault) {
        if self.flagged.insert(var) {
            self.faults.push(fault);
        }
    }

    fn fault(&mut self, fault: Fault) {
        self.faults.push(fault);
    }

    fn flag(&mut self, var: VarId) {
        self.flagged.insert(var);
    }

    fn snapshot_capture(&mut self, site: Site, entries: Vec<(VarId, OwnershipState)>) {
        self.capture_states.insert(site, entries);
    }

    fn snapshot_dispatch(&mut self, site: Site, states: &[OwnershipState]) {
        self.dispatch_states.insert(site, states.to_vec());
    }
}

// ── Transfer rules ──────────────────────────────────────────────────

#[expect(
    clippy::cast_possible_truncation,
    reason = "verify IR value counts fit in u32"
)]
fn var_at(idx: usize) -> VarId {
    VarId::new(idx as u32)
}

/// Check a use of `var`, poisoning on violation. Returns `true` when the
/// value is live and usable.
fn use_var(var: VarId, span: Span, states: &mut StateTable, sink: &mut impl Sink) -> bool {
    match states.get(var.index()).copied() {
        None => {
            sink.report_once(
                var,
                Fault::unsupported(
                    span,
                    format!(
                        "instruction references value `%{}` outside the function's tables",
                        var.raw()
                    ),
                ),
            );
            false
        }
        Some(OwnershipState::Undefined) => {
            sink.report_once(
                var,
                Fault::new(
                    FaultKind::UseAfterConsume {
                        var,
                        was_consumed: false,
                    },
                    span,
                ),
            );
            false
        }
        Some(OwnershipState::Consumed) => {
            sink.report_once(
                var,
                Fault::new(
                    FaultKind::UseAfterConsume {
                        var,
                        was_consumed: true,
                    },
                    span,
                ),
            );
            states[var.index()] = OwnershipState::Undefined;
            false
        }
        Some(OwnershipState::LiveOwned | OwnershipState::LiveBorrowed(_)) => true,
    }
}

/// Write a definition of `dst`. Bad inputs poison the result instead of
/// propagating a state a later use would re-report.
fn define_var(
    dst: VarId,
    inputs_ok: bool,
    new_state: OwnershipState,
    span: Span,
    states: &mut StateTable,
    sink: &mut impl Sink,
) {
    match states.get_mut(dst.index()) {
        None => {
            sink.report_once(
                dst,
                Fault::unsupported(
                    span,
                    format!(
                        "instruction defines value `%{}` outside the function's tables",
                        dst.raw()
                    ),
                ),
            );
        }
        Some(slot) => {
            if inputs_ok {
                *slot = new_state;
            } else {
                *slot = OwnershipState::Undefined;
                sink.flag(dst);
            }
        }
    }
}

fn apply_instr(
    func: &Function,
    site: Site,
    instr: &Instr,
    span: Span,
    states: &mut StateTable,
    sink: &mut impl Sink,
) {
    match instr {
        Instr::Let { dst, value } => {
            let ok = match value {
                RValue::Var(src) => use_var(*src, span, states, sink),
                RValue::Literal(_) => true,
            };
            define_var(*dst, ok, OwnershipState::LiveOwned, span, states, sink);
        }

        Instr::Apply { dst, args, .. } => {
            let mut ok = true;
            for &arg in args {
                ok &= use_var(arg, span, states, sink);
            }
            define_var(*dst, ok, OwnershipState::LiveOwned, span, states, sink);
        }

        Instr::Construct { dst, args } => {
            let mut ok = true;
            for &arg in args {
                ok &= use_var(arg, span, states, sink);
            }
            define_var(*dst, ok, OwnershipState::LiveOwned, span, states, sink);
        }

        Instr::Borrow { dst, source, scope } => {
            if use_var(*source, span, states, sink) {
                match states[source.index()] {
                    OwnershipState::LiveOwned => {
                        states[source.index()] = OwnershipState::LiveBorrowed(*scope);
                        define_var(
                            *dst,
                            true,
                            OwnershipState::LiveBorrowed(*scope),
                            span,
                            states,
                            sink,
                        );
                    }
                    OwnershipState::LiveBorrowed(_) => {
                        sink.report_once(
                            *source,
                            Fault::unsupported(
                                span,
                                format!(
                                    "borrow of value `%{}` while it is already borrowed",
                                    source.raw()
                                ),
                            ),
                        );
                        states[source.index()] = OwnershipState::Undefined;
                        define_var(*dst, false, OwnershipState::Undefined, span, states, sink);
                    }
                    OwnershipState::Undefined | OwnershipState::Consumed => {
                        define_var(*dst, false, OwnershipState::Undefined, span, states, sink);
                    }
                }
            } else {
                define_var(*dst, false, OwnershipState::Undefined, span, states, sink);
            }
        }

        Instr::Consume { var } => {
            if use_var(*var, span, states, sink) {
                match states[var.index()] {
                    OwnershipState::LiveOwned => {
                        states[var.index()] = OwnershipState::Consumed;
                    }
                    OwnershipState::LiveBorrowed(_) => {
                        sink.report_once(
                            *var,
                            Fault::unsupported(
                                span,
                                format!(
                                    "consume of value `%{}` while it is borrowed",
                                    var.raw()
                                ),
                            ),
                        );
                        states[var.index()] = OwnershipState::Undefined;
                    }
                    OwnershipState::Undefined | OwnershipState::Consumed => {}
                }
            }
        }

        // Structural marker only; discharge is keyed off CloseScope.
        Instr::OpenScope { .. } => {}

        Instr::CloseScope { scope } => {
            for (idx, state) in states.iter_mut().enumerate() {
                if *state == OwnershipState::LiveBorrowed(*scope) {
                    let kind = func
                        .var_kinds
                        .get(idx)
                        .copied()
                        .unwrap_or(OwnershipKind::Owned);
                    *state = match kind {
                        // The borrowed reference dies with its scope.
                        OwnershipKind::Borrowed => OwnershipState::Consumed,
                        // The source value is whole again.
                        OwnershipKind::Owned | OwnershipKind::Consuming => {
                            OwnershipState::LiveOwned
                        }
                    };
                }
            }
        }

        Instr::MakeClosure { dst, captures, .. } => {
            // Snapshot before the instruction executes: the isolation
            // checker asks what each captured value looked like at the
            // capture point.
            let entries: Vec<(VarId, OwnershipState)> = captures
                .iter()
                .map(|c| {
                    (
                        c.var,
                        states
                            .get(c.var.index())
                            .copied()
                            .unwrap_or(OwnershipState::Undefined),
                    )
                })
                .collect();
            sink.snapshot_capture(site, entries);

            let mut ok = true;
            for capture in captures {
                ok &= use_var(capture.var, span, states, sink);
                if capture.by_move {
                    match states.get(capture.var.index()).copied() {
                        Some(OwnershipState::LiveOwned) => {
                            states[capture.var.index()] = OwnershipState::Consumed;
                        }
                        Some(OwnershipState::LiveBorrowed(_)) => {
                            sink.report_once(
                                capture.var,
                                Fault::unsupported(
                                    span,
                                    format!(
                                        "move of value `%{}` into a closure while it is borrowed",
                                        capture.var.raw()
                                    ),
                                ),
                            );
                            states[capture.var.index()] = OwnershipState::Undefined;
                            ok = false;
                        }
                        _ => {}
                    }
                }
            }
            define_var(*dst, ok, OwnershipState::LiveOwned, span, states, sink);
        }

        Instr::CallClosure { dst, closure, args } => {
            let mut ok = use_var(*closure, span, states, sink);
            for &arg in args {
                ok &= use_var(arg, span, states, sink);
            }
            define_var(*dst, ok, OwnershipState::LiveOwned, span, states, sink);
        }

        Instr::Dispatch { closure, .. } => {
            sink.snapshot_dispatch(site, states);
            use_var(*closure, span, states, sink);
        }
    }
}

fn apply_terminator(
    func: &Function,
    block_idx: usize,
    states: &mut StateTable,
    sink: &mut impl Sink,
) {
    let block = &func.blocks[block_idx];
    let span = func.term_span(block_idx);

    for var in block.terminator.used_vars() {
        use_var(var, span, states, sink);
    }

    if matches!(block.terminator, Terminator::Return { .. }) {
        // Dischargeability: a borrow still live at return escaped its
        // producing scope. Reported on the owned source value; the
        // function-body scope discharges implicitly here.
        for (idx, state) in states.iter().enumerate() {
            if let OwnershipState::LiveBorrowed(scope) = *state {
                if scope != ScopeId::FUNCTION {
                    let kind = func
                        .var_kinds
                        .get(idx)
                        .copied()
                        .unwrap_or(OwnershipKind::Owned);
                    if matches!(kind, OwnershipKind::Owned | OwnershipKind::Consuming) {
                        let var = var_at(idx);
                        sink.report_once(
                            var,
                            Fault::new(FaultKind::UndischargedBorrow { var, scope }, span),
                        );
                    }
                }
            }
        }
    }

    for succ in successor_block_ids(&block.terminator) {
        if succ.index() >= func.blocks.len() {
            sink.fault(Fault::unsupported(
                span,
                format!("terminator targets block b{} outside the function", succ.raw()),
            ));
        }
    }
}

/// Run the transfer function over one whole block.
fn apply_block(func: &Function, block_idx: usize, states: &mut StateTable, sink: &mut impl Sink) {
    for (instr_idx, instr) in func.blocks[block_idx].body.iter().enumerate() {
        let span = func.instr_span(block_idx, instr_idx);
        apply_instr(func, (block_idx, instr_idx), instr, span, states, sink);
    }
    apply_terminator(func, block_idx, states, sink);
}

// ── Meet ────────────────────────────────────────────────────────────

/// Meet `other` into `acc`: equal states pass through, anything else
/// lowers to `Undefined`.
fn meet_into(acc: &mut StateTable, other: &StateTable) {
    for (a, &o) in acc.iter_mut().zip(other.iter()) {
        if *a != o {
            *a = OwnershipState::Undefined;
        }
    }
}

/// Initial entry-block state from the parameter list.
fn initial_states(func: &Function, num_vars: usize) -> StateTable {
    let mut states = vec![OwnershipState::Undefined; num_vars];
    for param in &func.params {
        if let Some(slot) = states.get_mut(param.var.index()) {
            *slot = match param.kind {
                OwnershipKind::Owned | OwnershipKind::Consuming => OwnershipState::LiveOwned,
                OwnershipKind::Borrowed => OwnershipState::LiveBorrowed(ScopeId::FUNCTION),
            };
        }
    }
    states
}

// ── Driver entry ────────────────────────────────────────────────────

/// Track ownership states for one function and report violations.
///
/// Pure over the IR: repeated runs on the same function produce an
/// identical [`TrackerResult`].
pub fn track_function(func: &Function) -> TrackerResult {
    let num_blocks = func.blocks.len();
    let num_vars = func.num_vars();
    let entry_idx = func.entry.index();

    tracing::debug!(
        function = func.name.raw(),
        num_blocks,
        num_vars,
        "tracking ownership"
    );

    if entry_idx >= num_blocks {
        return TrackerResult {
            entry_states: vec![vec![OwnershipState::Undefined; num_vars]; num_blocks],
            capture_states: FxHashMap::default(),
            dispatch_states: FxHashMap::default(),
            faults: vec![Fault::unsupported(
                Span::DUMMY,
                format!("entry block b{} out of range", func.entry.raw()),
            )],
        };
    }

    let initial = initial_states(func, num_vars);
    let preds = compute_predecessors(func);
    let rpo = compute_reverse_postorder(func);

    // Phase 1: fixed point over an explicit worklist, seeded in reverse
    // postorder so predecessors usually run before their successors.
    // The meet only consults predecessors that have been processed at
    // least once — an unprocessed predecessor's sentinel exit would
    // lower states it has no claim on yet.
    let mut entry_states: Vec<StateTable> =
        vec![vec![OwnershipState::Undefined; num_vars]; num_blocks];
    let mut exit_states: Vec<StateTable> =
        vec![vec![OwnershipState::Undefined; num_vars]; num_blocks];
    let mut processed = vec![false; num_blocks];
    let mut pending = vec![false; num_blocks];

    let mut worklist: VecDeque<usize> = VecDeque::with_capacity(rpo.len());
    for &block_idx in &rpo {
        worklist.push_back(block_idx);
        pending[block_idx] = true;
    }

    let mut iterations = 0u32;
    while let Some(block_idx) = worklist.pop_front() {
        pending[block_idx] = false;
        iterations += 1;

        let mut entry: Option<StateTable> = if block_idx == entry_idx {
            Some(initial.clone())
        } else {
            None
        };
        for &pred in &preds[block_idx] {
            if !processed[pred] {
                continue;
            }
            match entry.as_mut() {
                None => entry = Some(exit_states[pred].clone()),
                Some(acc) => meet_into(acc, &exit_states[pred]),
            }
        }
        let entry = entry.unwrap_or_else(|| vec![OwnershipState::Undefined; num_vars]);

        let first = !processed[block_idx];
        processed[block_idx] = true;
        if !first && entry == entry_states[block_idx] {
            continue;
        }
        entry_states[block_idx] = entry.clone();

        let mut exit = entry;
        apply_block(func, block_idx, &mut exit, &mut Silent);
        let exit_changed = exit != exit_states[block_idx];
        exit_states[block_idx] = exit;

        if first || exit_changed {
            for succ in successor_block_ids(&func.blocks[block_idx].terminator) {
                let succ_idx = succ.index();
                if succ_idx < num_blocks && !pending[succ_idx] {
                    pending[succ_idx] = true;
                    worklist.push_back(succ_idx);
                }
            }
        }
    }

    tracing::debug!(iterations, "ownership fixed point converged");

    // Phase 2: collect join conflicts against the converged exits.
    // Conflicts are detected here rather than during iteration so that
    // transient disagreements from half-converged states never surface.
    let conflicts =
        collect_join_conflicts(&preds, &processed, &exit_states, &initial, entry_idx, num_vars);

    // Phase 3: one reporting walk per reachable block, in index order.
    let mut recorder = Recorder::default();
    for block_idx in 0..num_blocks {
        if !processed[block_idx] {
            tracing::debug!(block = block_idx, "skipping unreachable block");
            continue;
        }

        let conflict_span = if func.blocks[block_idx].body.is_empty() {
            func.term_span(block_idx)
        } else {
            func.instr_span(block_idx, 0)
        };
        for &(conflict_block, var) in &conflicts {
            if conflict_block == block_idx {
                recorder.report_once(
                    var,
                    Fault::new(
                        FaultKind::ConflictingOwnershipAtJoin {
                            var,
                            block: func.blocks[block_idx].id,
                        },
                        conflict_span,
                    ),
                );
            }
        }

        let mut states = entry_states[block_idx].clone();
        apply_block(func, block_idx, &mut states, &mut recorder);
    }

    TrackerResult {
        entry_states,
        capture_states: recorder.capture_states,
        dispatch_states: recorder.dispatch_states,
        faults: recorder.faults,
    }
}

/// Find values whose converged states disagree between two defined
/// predecessor contributions at some join. Returned sorted by block
/// index, then value index.
fn collect_join_conflicts(
    preds: &[Vec<usize>],
    processed: &[bool],
    exit_states: &[StateTable],
    initial: &StateTable,
    entry_idx: usize,
    num_vars: usize,
) -> Vec<(usize, VarId)> {
    let mut conflicts = Vec::new();

    for (block_idx, block_preds) in preds.iter().enumerate() {
        if !processed[block_idx] {
            continue;
        }

        let mut contributions: Vec<&StateTable> = Vec::with_capacity(block_preds.len() + 1);
        if block_idx == entry_idx {
            contributions.push(initial);
        }
        for &pred in block_preds {
            if processed[pred] {
                contributions.push(&exit_states[pred]);
            }
        }
        if contributions.len() < 2 {
            continue;
        }

        for var_idx in 0..num_vars {
            let mut seen: Option<OwnershipState> = None;
            let mut conflicting = false;
            for table in &contributions {
                let state = table[var_idx];
                if state == OwnershipState::Undefined {
                    // Conditionally-defined on this path; not a conflict.
                    continue;
                }
                match seen {
                    None => seen = Some(state),
                    Some(prev) if prev != state => {
                        conflicting = true;
                        break;
                    }
                    Some(_) => {}
                }
            }
            if conflicting {
                conflicts.push((block_idx, var_at(var_idx)));
            }
        }
    }

    conflicts
}
