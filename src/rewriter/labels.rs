//! Up-front offset scan for a rewrite pass.
//!
//! Before any operation is replayed, the whole body is scanned once: every
//! offset a branch or switch operand can reach gets a label, and every offset
//! named by an exception region is recorded so region events fire during the
//! replay. The map is immutable afterwards; a target that was never recorded
//! here is malformed input, not something the main pass patches up.

use std::collections::{BTreeMap, BTreeSet};

use crate::metadata::MethodBody;
use crate::{Error, Result};

use super::assembler::{BodyAssembler, Label};

/// Labels keyed by original byte offset, plus the exception-boundary set.
#[derive(Debug)]
pub struct OffsetLabelMap {
    labels: BTreeMap<u32, Label>,
    boundary_offsets: BTreeSet<u32>,
}

impl OffsetLabelMap {
    /// Scans `body` and allocates one label per distinct target offset.
    ///
    /// Targets are branch and switch operands plus the fall-through offset
    /// after every conditional branch and switch. An unconditional `br` or
    /// `leave` creates no fall-through label.
    #[must_use]
    pub fn build(body: &MethodBody, assembler: &mut BodyAssembler) -> Self {
        let mut offsets = BTreeSet::new();
        for op in &body.operations {
            offsets.extend(op.branch_targets());
            if op.opcode.is_branch() && op.opcode.falls_through() {
                offsets.insert(op.offset + op.encoded_len());
            }
        }

        let mut boundary_offsets = BTreeSet::new();
        for region in &body.exception_regions {
            boundary_offsets.insert(region.try_start);
            boundary_offsets.insert(region.try_end);
            boundary_offsets.insert(region.handler_start);
            boundary_offsets.insert(region.handler_end);
            if let Some(filter_start) = region.filter_start {
                boundary_offsets.insert(filter_start);
            }
        }

        let labels = offsets
            .into_iter()
            .map(|offset| (offset, assembler.new_label()))
            .collect();
        Self {
            labels,
            boundary_offsets,
        }
    }

    /// The label allocated for `offset`, if any operation targets it.
    #[must_use]
    pub fn label_at(&self, offset: u32) -> Option<Label> {
        self.labels.get(&offset).copied()
    }

    /// The label a branch operand at `offset` must resolve through.
    pub fn target_label(&self, offset: u32) -> Result<Label> {
        self.label_at(offset)
            .ok_or(Error::MissingBranchLabel { offset })
    }

    /// Whether any exception region begins or ends at `offset`.
    #[must_use]
    pub fn is_region_boundary(&self, offset: u32) -> bool {
        self.boundary_offsets.contains(&offset)
    }
}
