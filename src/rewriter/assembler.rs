//! Re-emission of an operation stream with deferred branch resolution.
//!
//! The assembler is the sink the rewriter replays a body into. Operations are
//! appended in order and assigned long-form byte offsets as they arrive;
//! branch operands reference [`Label`]s instead of offsets and are resolved
//! once, when the finished body is assembled. Exception regions are rebuilt
//! from begin/end events so that injected operations shift region boundaries
//! along with everything else.

use crate::metadata::{
    ExceptionRegion, HandlerKind, MethodBody, OpCode, Operand, Operation, TypeId, TypeRefId,
};
use crate::{Error, Result};

/// An opaque branch-target handle.
///
/// A label is allocated before its position is known, referenced by any
/// number of branch or switch emissions, and bound to an offset by
/// [`BodyAssembler::mark_label`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(u32);

/// An operand as recorded before label resolution.
#[derive(Debug, Clone)]
enum PendingOperand {
    Fixed(Operand),
    Branch(Label),
    Switch(Vec<Label>),
}

#[derive(Debug)]
struct PendingOperation {
    offset: u32,
    opcode: OpCode,
    operand: PendingOperand,
}

/// An exception region whose extent is still being discovered.
#[derive(Debug)]
struct OpenRegion {
    try_start: u32,
    try_end: Option<u32>,
    kind: Option<HandlerKind>,
    handler_start: Option<u32>,
    filter_start: Option<u32>,
    catch_type: Option<TypeRefId>,
}

/// Accumulates a rewritten method body.
#[derive(Debug, Default)]
pub struct BodyAssembler {
    operations: Vec<PendingOperation>,
    offset: u32,
    labels: Vec<Option<u32>>,
    regions: Vec<ExceptionRegion>,
    open: Vec<OpenRegion>,
}

impl BodyAssembler {
    /// Creates an empty assembler positioned at offset zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Byte offset the next emitted operation will receive.
    #[must_use]
    pub fn current_offset(&self) -> u32 {
        self.offset
    }

    /// Allocates a fresh, unbound label.
    pub fn new_label(&mut self) -> Label {
        let label = Label(self.labels.len() as u32);
        self.labels.push(None);
        label
    }

    /// Binds `label` to the current offset.
    pub fn mark_label(&mut self, label: Label) {
        let slot = &mut self.labels[label.0 as usize];
        debug_assert!(slot.is_none(), "label bound twice");
        *slot = Some(self.offset);
    }

    /// Appends a non-branch operation with its operand as-is.
    ///
    /// Branch and switch opcodes must go through [`Self::emit_branch`] or
    /// [`Self::emit_switch`] so their targets participate in relocation;
    /// passing one here is an invariant violation.
    pub fn emit(&mut self, opcode: OpCode, operand: Operand) -> Result<()> {
        if opcode.is_branch() {
            return Err(Error::UnencodableOperand {
                offset: self.offset,
                message: format!("{opcode} targets must be emitted through labels"),
            });
        }
        let length = opcode.encoded_len() + operand.encoded_len();
        self.push(opcode, PendingOperand::Fixed(operand), length);
        Ok(())
    }

    /// Appends a branch to `target`, long-form encoding.
    pub fn emit_branch(&mut self, opcode: OpCode, target: Label) -> Result<()> {
        if !opcode.is_branch() || opcode == OpCode::Switch {
            return Err(Error::UnencodableOperand {
                offset: self.offset,
                message: format!("{opcode} does not take a single branch target"),
            });
        }
        let length = opcode.encoded_len() + 4;
        self.push(opcode, PendingOperand::Branch(target), length);
        Ok(())
    }

    /// Appends a `switch` over `targets`.
    pub fn emit_switch(&mut self, targets: Vec<Label>) {
        let length = OpCode::Switch.encoded_len() + 4 + 4 * targets.len() as u32;
        self.push(OpCode::Switch, PendingOperand::Switch(targets), length);
    }

    fn push(&mut self, opcode: OpCode, operand: PendingOperand, length: u32) {
        self.operations.push(PendingOperation {
            offset: self.offset,
            opcode,
            operand,
        });
        self.offset += length;
    }

    /// Opens a protected range at the current offset.
    pub fn begin_try(&mut self) {
        self.open.push(OpenRegion {
            try_start: self.offset,
            try_end: None,
            kind: None,
            handler_start: None,
            filter_start: None,
            catch_type: None,
        });
    }

    /// Starts the filter block of the innermost open region, sealing its
    /// protected range at the current offset.
    pub fn begin_filter(&mut self) -> Result<()> {
        let offset = self.offset;
        let region = self.innermost_without_handler()?;
        region.try_end = Some(offset);
        region.filter_start = Some(offset);
        Ok(())
    }

    /// Starts the handler block of the innermost open region.
    ///
    /// For non-filter kinds this also seals the protected range; a filter
    /// region's protected range was sealed by [`Self::begin_filter`].
    pub fn begin_handler(&mut self, kind: HandlerKind, catch_type: Option<TypeRefId>) -> Result<()> {
        let offset = self.offset;
        let region = self.innermost_without_handler()?;
        if region.try_end.is_none() {
            region.try_end = Some(offset);
        }
        region.kind = Some(kind);
        region.handler_start = Some(offset);
        region.catch_type = catch_type;
        Ok(())
    }

    /// Closes the innermost region whose handler has started, ending its
    /// handler block at the current offset.
    pub fn end_region(&mut self) -> Result<()> {
        let index = self
            .open
            .iter()
            .rposition(|region| region.handler_start.is_some())
            .ok_or_else(|| Error::UnencodableOperand {
                offset: self.offset,
                message: "region end with no open handler".into(),
            })?;
        let region = self.open.remove(index);
        self.close(region);
        Ok(())
    }

    /// Whether any protected range is still open.
    #[must_use]
    pub fn in_open_region(&self) -> bool {
        !self.open.is_empty()
    }

    /// Closes every region still open at the current offset.
    ///
    /// Regions whose handler never started cannot form a valid entry and are
    /// dropped; regions with a started handler are ended here. Handlers that
    /// extend to the last operation of a body are closed through this path,
    /// there being no operation at the end offset to trigger the event.
    pub fn force_close_open_regions(&mut self) {
        while let Some(region) = self.open.pop() {
            if region.handler_start.is_some() {
                self.close(region);
            }
        }
    }

    fn close(&mut self, region: OpenRegion) {
        let (Some(kind), Some(try_end), Some(handler_start)) =
            (region.kind, region.try_end, region.handler_start)
        else {
            return;
        };
        self.regions.push(ExceptionRegion {
            kind,
            try_start: region.try_start,
            try_end,
            handler_start,
            handler_end: self.offset,
            filter_start: region.filter_start,
            catch_type: region.catch_type,
        });
    }

    fn innermost_without_handler(&mut self) -> Result<&mut OpenRegion> {
        let offset = self.offset;
        self.open
            .iter_mut()
            .rev()
            .find(|region| region.handler_start.is_none())
            .ok_or_else(|| Error::UnencodableOperand {
                offset,
                message: "handler begins with no open protected range".into(),
            })
    }

    /// Resolves labels and produces the assembled body.
    ///
    /// Fails with [`Error::MissingBranchLabel`] if any referenced label was
    /// never bound, which means a branch points at an offset no operation was
    /// emitted for.
    pub fn finish(self, max_stack: u16, locals: Vec<TypeId>, zero_init: bool) -> Result<MethodBody> {
        let mut operations = Vec::with_capacity(self.operations.len());
        for pending in self.operations {
            let operand = match pending.operand {
                PendingOperand::Fixed(operand) => operand,
                PendingOperand::Branch(label) => {
                    Operand::Target(Self::resolve(&self.labels, label, pending.offset)?)
                }
                PendingOperand::Switch(targets) => Operand::Switch(
                    targets
                        .into_iter()
                        .map(|label| Self::resolve(&self.labels, label, pending.offset))
                        .collect::<Result<_>>()?,
                ),
            };
            operations.push(Operation {
                offset: pending.offset,
                opcode: pending.opcode,
                operand,
            });
        }
        Ok(MethodBody {
            operations,
            exception_regions: self.regions,
            max_stack,
            locals,
            zero_init,
        })
    }

    fn resolve(labels: &[Option<u32>], label: Label, branch_offset: u32) -> Result<u32> {
        labels[label.0 as usize].ok_or(Error::MissingBranchLabel {
            offset: branch_offset,
        })
    }
}
