//! Forward worklist fixpoint over basic blocks.
//!
//! Generic over a [`BlockInterpreter`], which supplies the abstract domain:
//! an entry state, a join, and a transfer function over the operations of one
//! block. Pre-states start at bottom, represented as `None`, so a block whose
//! pre-state is still `None` at the fixpoint was never reached.

use std::collections::VecDeque;

use crate::metadata::Operation;
use crate::summary::localflow::cfg::ControlFlowGraph;
use crate::{Error, Result};

/// Bound on block interpretations per method. Domains here have finite
/// height, so hitting this means a transfer function is not monotone.
const MAX_WORKLIST_STEPS: usize = 100_000;

/// An abstract domain plus its transfer function.
pub(crate) trait BlockInterpreter {
    /// Abstract state at a block boundary.
    type State: Clone + PartialEq;

    /// State on entry to the method.
    fn entry_state(&self) -> Self::State;

    /// Least upper bound of two states. Fails when the states have
    /// incompatible shapes, which only happens on malformed bodies.
    fn join(&self, lhs: &Self::State, rhs: &Self::State) -> Result<Self::State>;

    /// Interprets the operations of one block, producing the post-state.
    fn interpret_block(&mut self, ops: &[Operation], state: Self::State)
        -> Result<Self::State>;
}

/// Per-block entry states at the fixpoint. `None` is bottom: a block whose
/// entry is still `None` was never reached.
pub(crate) struct Fixpoint<S> {
    pub pre: Vec<Option<S>>,
}

/// Runs `interpreter` to a fixpoint over `cfg`.
pub(crate) fn solve<I: BlockInterpreter>(
    cfg: &ControlFlowGraph,
    operations: &[Operation],
    interpreter: &mut I,
) -> Result<Fixpoint<I::State>> {
    let n = cfg.block_count();
    let mut pre: Vec<Option<I::State>> = vec![None; n];
    let mut post: Vec<Option<I::State>> = vec![None; n];
    if n == 0 {
        return Ok(Fixpoint { pre });
    }

    let mut worklist: VecDeque<usize> = VecDeque::new();
    let mut queued = vec![false; n];
    worklist.push_back(0);
    queued[0] = true;

    let mut steps = 0usize;
    while let Some(block) = worklist.pop_front() {
        queued[block] = false;
        steps += 1;
        if steps > MAX_WORKLIST_STEPS {
            return Err(Error::Analysis(format!(
                "fixpoint not reached within {MAX_WORKLIST_STEPS} block interpretations"
            )));
        }

        let mut incoming = if block == 0 {
            Some(interpreter.entry_state())
        } else {
            None
        };
        for &pred in cfg.predecessors(block) {
            if let Some(pred_post) = &post[pred] {
                incoming = Some(match incoming {
                    Some(state) => interpreter.join(&state, pred_post)?,
                    None => pred_post.clone(),
                });
            }
        }
        let Some(incoming) = incoming else {
            // No reachable predecessor yet; revisit when one produces a state.
            continue;
        };

        let range = cfg.block(block);
        let outgoing =
            interpreter.interpret_block(&operations[range.start..range.end], incoming.clone())?;
        pre[block] = Some(incoming);

        if post[block].as_ref() != Some(&outgoing) {
            post[block] = Some(outgoing);
            for &succ in cfg.successors(block) {
                if !queued[succ] {
                    worklist.push_back(succ);
                    queued[succ] = true;
                }
            }
        }
    }

    Ok(Fixpoint { pre })
}
