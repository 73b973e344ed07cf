//! Basic block partitioning for bodies free of exception regions.
//!
//! The local-flow strategies refuse methods with exception regions or switch
//! operations before this code runs, so block construction only has to handle
//! straight-line flow, unconditional branches, and two-way branches.

use std::collections::BTreeMap;

use crate::metadata::{FlowType, MethodBody, Operand};
use crate::{Error, Result};

/// A basic block: a half-open range of operation indices into the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BasicBlock {
    /// Index of the first operation of the block.
    pub start: usize,
    /// Index one past the last operation of the block.
    pub end: usize,
}

/// The control flow graph of one method body. Block 0 is the entry block.
#[derive(Debug)]
pub(crate) struct ControlFlowGraph {
    blocks: Vec<BasicBlock>,
    successors: Vec<Vec<usize>>,
    predecessors: Vec<Vec<usize>>,
}

impl ControlFlowGraph {
    /// Partitions `body` into basic blocks and wires up the edges.
    ///
    /// Fails with [`Error::Analysis`] when a branch targets an offset that is
    /// not an operation boundary.
    pub(crate) fn build(body: &MethodBody) -> Result<Self> {
        let ops = &body.operations;
        let mut index_of_offset = BTreeMap::new();
        for (index, op) in ops.iter().enumerate() {
            index_of_offset.insert(op.offset, index);
        }
        let resolve = |offset: u32| -> Result<usize> {
            index_of_offset.get(&offset).copied().ok_or_else(|| {
                Error::Analysis(format!("branch target {offset} is not an operation boundary"))
            })
        };

        // Leaders: the entry, every branch target, and every fallthrough
        // point after a branch.
        let mut leaders = vec![false; ops.len()];
        if !ops.is_empty() {
            leaders[0] = true;
        }
        for (index, op) in ops.iter().enumerate() {
            if !op.opcode.is_branch() {
                continue;
            }
            for target in op.branch_targets() {
                leaders[resolve(target)?] = true;
            }
            if index + 1 < ops.len() {
                leaders[index + 1] = true;
            }
        }

        let mut blocks = Vec::new();
        let mut block_of_index = vec![0usize; ops.len()];
        for (index, &is_leader) in leaders.iter().enumerate() {
            if is_leader {
                blocks.push(BasicBlock {
                    start: index,
                    end: index,
                });
            }
            block_of_index[index] = blocks.len() - 1;
        }
        for b in 0..blocks.len() {
            blocks[b].end = if b + 1 < blocks.len() {
                blocks[b + 1].start
            } else {
                ops.len()
            };
        }

        let mut successors = vec![Vec::new(); blocks.len()];
        for (b, block) in blocks.iter().enumerate() {
            let last = &ops[block.end - 1];
            let mut targets = Vec::new();
            match last.opcode.flow_type() {
                FlowType::Normal | FlowType::EndRegion => {
                    if block.end < ops.len() {
                        targets.push(block_of_index[block.end]);
                    }
                }
                FlowType::Branch => {
                    if let Operand::Target(t) = last.operand {
                        targets.push(block_of_index[resolve(t)?]);
                    }
                }
                FlowType::ConditionalBranch => {
                    if let Operand::Target(t) = last.operand {
                        targets.push(block_of_index[resolve(t)?]);
                    }
                    if block.end < ops.len() {
                        targets.push(block_of_index[block.end]);
                    }
                }
                FlowType::Switch => {
                    for t in last.branch_targets() {
                        targets.push(block_of_index[resolve(t)?]);
                    }
                    if block.end < ops.len() {
                        targets.push(block_of_index[block.end]);
                    }
                }
                FlowType::Return | FlowType::Throw => {}
            }
            targets.dedup();
            successors[b] = targets;
        }

        let mut predecessors = vec![Vec::new(); blocks.len()];
        for (b, succs) in successors.iter().enumerate() {
            for &s in succs {
                predecessors[s].push(b);
            }
        }

        Ok(Self {
            blocks,
            successors,
            predecessors,
        })
    }

    pub(crate) fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub(crate) fn block(&self, index: usize) -> BasicBlock {
        self.blocks[index]
    }

    pub(crate) fn successors(&self, index: usize) -> &[usize] {
        &self.successors[index]
    }

    pub(crate) fn predecessors(&self, index: usize) -> &[usize] {
        &self.predecessors[index]
    }
}
