//! Shared CFG utilities for the verification components.
//!
//! Functions in this module are generic graph operations on [`Function`]
//! that more than one component needs. They live here rather than in a
//! specific component module so that components do not import from each
//! other — keeping the dependency graph flat.

use rustc_hash::FxHashSet;
use smallvec::{smallvec, SmallVec};

use crate::ir::{BlockId, Function, Terminator};

/// Extract successor block IDs from a terminator.
///
/// Returns `SmallVec<[BlockId; 4]>` to avoid heap allocation for the
/// common case (max 2 successors except Switch with many cases).
pub(crate) fn successor_block_ids(terminator: &Terminator) -> SmallVec<[BlockId; 4]> {
    match terminator {
        Terminator::Return { .. } => SmallVec::new(),
        Terminator::Jump { target } => smallvec![*target],
        Terminator::Branch {
            then_block,
            else_block,
            ..
        } => smallvec![*then_block, *else_block],
        Terminator::Switch { cases, default, .. } => {
            let mut targets = SmallVec::with_capacity(cases.len() + 1);
            for &(_, b) in cases {
                targets.push(b);
            }
            targets.push(*default);
            targets
        }
    }
}

/// Compute the predecessor list for each block (deduplicated).
///
/// Returns a vector indexed by block index, where each entry is the
/// list of distinct predecessor block indices. Out-of-range successor
/// ids are skipped here; the tracker reports them.
pub(crate) fn compute_predecessors(func: &Function) -> Vec<Vec<usize>> {
    let num_blocks = func.blocks.len();
    let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); num_blocks];

    for (block_idx, block) in func.blocks.iter().enumerate() {
        let mut seen = FxHashSet::default();
        for succ_id in successor_block_ids(&block.terminator) {
            let succ_idx = succ_id.index();
            if succ_idx < num_blocks && seen.insert(succ_idx) {
                predecessors[succ_idx].push(block_idx);
            }
        }
    }

    predecessors
}

/// Compute a postorder traversal of the CFG starting from the entry block.
///
/// Uses an iterative DFS with an explicit stack to avoid recursion depth
/// issues on deeply nested CFGs. Only visits reachable blocks.
pub(crate) fn compute_postorder(func: &Function) -> Vec<usize> {
    let num_blocks = func.blocks.len();
    let mut visited = vec![false; num_blocks];
    let mut postorder = Vec::with_capacity(num_blocks);

    // Stack entries: (block_index, children_processed).
    // When children_processed is false, we push successors.
    // When true, we emit the block to postorder.
    let mut stack: Vec<(usize, bool)> = vec![(func.entry.index(), false)];

    while let Some(&mut (block_idx, ref mut children_done)) = stack.last_mut() {
        if *children_done {
            postorder.push(block_idx);
            stack.pop();
            continue;
        }

        *children_done = true;

        if block_idx >= num_blocks {
            stack.pop();
            continue;
        }

        if visited[block_idx] {
            stack.pop();
            continue;
        }
        visited[block_idx] = true;

        let block = &func.blocks[block_idx];
        for succ_id in successor_block_ids(&block.terminator) {
            let succ_idx = succ_id.index();
            if succ_idx < num_blocks && !visited[succ_idx] {
                stack.push((succ_idx, false));
            }
        }
    }

    postorder
}

/// Compute a reverse postorder traversal (predecessors before successors,
/// back edges aside). This is the convergence order for forward dataflow.
pub(crate) fn compute_reverse_postorder(func: &Function) -> Vec<usize> {
    let mut order = compute_postorder(func);
    order.reverse();
    order
}
