//! The replay driver and its hook surface.
//!
//! [`MethodBodyRewriter::rewrite`] walks a body forward in offset order and
//! feeds every operation, label, and exception-region event through a
//! [`RewriteHooks`] implementation into a [`BodyAssembler`]. The default hook
//! bodies re-emit everything unchanged, so a hook that overrides nothing is
//! an identity copy; an instrumenting hook overrides only the categories it
//! cares about and inherits faithful copying for the rest.

use crate::metadata::{HandlerKind, MethodBody, OpCode, Operand, Operation, TypeId};
use crate::{Error, Result};

use super::assembler::{BodyAssembler, Label};
use super::labels::OffsetLabelMap;

/// Per-category rewrite hooks.
///
/// Every method has a default body that copies the input through, so
/// implementations override only what they change. `rewrite_max_stack`,
/// `rewrite_locals`, and `rewrite_zero_init` are called exactly once, after
/// the full replay; hooks that inject stack traffic or locals adjust the
/// declared values there.
#[allow(unused_variables)]
pub trait RewriteHooks {
    /// Called once before the first operation is replayed.
    fn start(&mut self, assembler: &mut BodyAssembler) -> Result<()> {
        Ok(())
    }

    /// Called when the replay reaches an offset some branch targets.
    ///
    /// The default binds the label at the current position. An override that
    /// emits instructions before delegating moves the branch target in front
    /// of them.
    fn rewrite_label(
        &mut self,
        assembler: &mut BodyAssembler,
        op: &Operation,
        label: Label,
    ) -> Result<()> {
        assembler.mark_label(label);
        Ok(())
    }

    /// Called for every single-target branch, including `leave`.
    fn rewrite_branch(
        &mut self,
        assembler: &mut BodyAssembler,
        op: &Operation,
        target: Label,
    ) -> Result<()> {
        assembler.emit_branch(op.opcode, target)
    }

    /// Called for `switch`.
    fn rewrite_switch(
        &mut self,
        assembler: &mut BodyAssembler,
        op: &Operation,
        targets: Vec<Label>,
    ) -> Result<()> {
        assembler.emit_switch(targets);
        Ok(())
    }

    /// Called for calls and function-pointer loads.
    fn rewrite_call(&mut self, assembler: &mut BodyAssembler, op: &Operation) -> Result<()> {
        assembler.emit(op.opcode, op.operand.clone())
    }

    /// Called for `newobj` and `newarr`.
    fn rewrite_new_object(&mut self, assembler: &mut BodyAssembler, op: &Operation) -> Result<()> {
        assembler.emit(op.opcode, op.operand.clone())
    }

    /// Called for local variable loads, including address loads.
    fn rewrite_load_local(&mut self, assembler: &mut BodyAssembler, op: &Operation) -> Result<()> {
        assembler.emit(op.opcode, op.operand.clone())
    }

    /// Called for local variable stores.
    fn rewrite_store_local(&mut self, assembler: &mut BodyAssembler, op: &Operation) -> Result<()> {
        assembler.emit(op.opcode, op.operand.clone())
    }

    /// Called for field loads, including address loads.
    fn rewrite_load_field(&mut self, assembler: &mut BodyAssembler, op: &Operation) -> Result<()> {
        assembler.emit(op.opcode, op.operand.clone())
    }

    /// Called for field stores.
    fn rewrite_store_field(&mut self, assembler: &mut BodyAssembler, op: &Operation) -> Result<()> {
        assembler.emit(op.opcode, op.operand.clone())
    }

    /// Called for `ret`.
    fn rewrite_return(&mut self, assembler: &mut BodyAssembler, op: &Operation) -> Result<()> {
        assembler.emit(op.opcode, op.operand.clone())
    }

    /// Called for every operation no other category claims.
    fn rewrite_operation(&mut self, assembler: &mut BodyAssembler, op: &Operation) -> Result<()> {
        assembler.emit(op.opcode, op.operand.clone())
    }

    /// Final say on the declared maximum stack depth.
    fn rewrite_max_stack(&mut self, max_stack: u16) -> u16 {
        max_stack
    }

    /// Final say on the local variable slots.
    fn rewrite_locals(&mut self, locals: &[TypeId]) -> Vec<TypeId> {
        locals.to_vec()
    }

    /// Final say on whether locals are zero-initialized.
    fn rewrite_zero_init(&mut self, zero_init: bool) -> bool {
        zero_init
    }
}

/// Hooks that override nothing. Rewriting with these copies a body verbatim.
#[derive(Debug, Default)]
pub struct IdentityHooks;

impl RewriteHooks for IdentityHooks {}

/// Replays a method body through a set of [`RewriteHooks`].
pub struct MethodBodyRewriter<'h, H: RewriteHooks + ?Sized> {
    hooks: &'h mut H,
}

impl<'h, H: RewriteHooks + ?Sized> MethodBodyRewriter<'h, H> {
    /// Creates a rewriter driving `hooks`.
    pub fn new(hooks: &'h mut H) -> Self {
        Self { hooks }
    }

    /// Rewrites `body` in place.
    ///
    /// Single forward pass in original offset order. At each operation the
    /// pending label for its offset is bound, exception-region begin and end
    /// events for its offset fire, and the operation itself is dispatched to
    /// its category hook. Afterwards any still-open protected range is
    /// force-closed and the scalar hooks run once each.
    pub fn rewrite(mut self, body: &mut MethodBody) -> Result<()> {
        let mut assembler = BodyAssembler::new();
        let labels = OffsetLabelMap::build(body, &mut assembler);

        self.hooks.start(&mut assembler)?;
        for op in &body.operations {
            if let Some(label) = labels.label_at(op.offset) {
                self.hooks.rewrite_label(&mut assembler, op, label)?;
            }
            if labels.is_region_boundary(op.offset) {
                Self::emit_region_events(&mut assembler, body, op.offset)?;
            }
            self.dispatch(&mut assembler, &labels, op)?;
        }
        assembler.force_close_open_regions();

        let max_stack = self.hooks.rewrite_max_stack(body.max_stack);
        let locals = self.hooks.rewrite_locals(&body.locals);
        let zero_init = self.hooks.rewrite_zero_init(body.zero_init);
        *body = assembler.finish(max_stack, locals, zero_init)?;
        Ok(())
    }

    /// Fires region events for `offset`, in region declaration order.
    ///
    /// Regions are listed innermost first, so an inner region's end fires
    /// before an outer region's handler begins when the two share an offset.
    fn emit_region_events(
        assembler: &mut BodyAssembler,
        body: &MethodBody,
        offset: u32,
    ) -> Result<()> {
        for region in &body.exception_regions {
            if offset == region.try_start {
                assembler.begin_try();
            }
            if region.kind == HandlerKind::Filter && region.filter_start == Some(offset) {
                assembler.begin_filter()?;
            }
            if offset == region.handler_start {
                assembler.begin_handler(region.kind, region.catch_type)?;
            }
            if offset == region.handler_end {
                assembler.end_region()?;
            }
        }
        Ok(())
    }

    fn dispatch(
        &mut self,
        assembler: &mut BodyAssembler,
        labels: &OffsetLabelMap,
        op: &Operation,
    ) -> Result<()> {
        match op.opcode {
            OpCode::Switch => {
                let Operand::Switch(targets) = &op.operand else {
                    return Err(operand_mismatch(op));
                };
                let targets = targets
                    .iter()
                    .map(|target| labels.target_label(*target))
                    .collect::<Result<Vec<_>>>()?;
                self.hooks.rewrite_switch(assembler, op, targets)
            }
            opcode if opcode.is_branch() => {
                let Operand::Target(target) = op.operand else {
                    return Err(operand_mismatch(op));
                };
                let target = labels.target_label(target)?;
                self.hooks.rewrite_branch(assembler, op, target)
            }
            OpCode::Call | OpCode::Callvirt | OpCode::Calli | OpCode::Ldftn | OpCode::Ldvirtftn => {
                self.hooks.rewrite_call(assembler, op)
            }
            OpCode::Newobj | OpCode::Newarr => self.hooks.rewrite_new_object(assembler, op),
            OpCode::Ldloc | OpCode::Ldloca => self.hooks.rewrite_load_local(assembler, op),
            OpCode::Stloc => self.hooks.rewrite_store_local(assembler, op),
            OpCode::Ldfld | OpCode::Ldflda | OpCode::Ldsfld | OpCode::Ldsflda => {
                self.hooks.rewrite_load_field(assembler, op)
            }
            OpCode::Stfld | OpCode::Stsfld => self.hooks.rewrite_store_field(assembler, op),
            OpCode::Ret => self.hooks.rewrite_return(assembler, op),
            _ => self.hooks.rewrite_operation(assembler, op),
        }
    }
}

fn operand_mismatch(op: &Operation) -> Error {
    Error::UnencodableOperand {
        offset: op.offset,
        message: format!("{} with operand {:?}", op.opcode, op.operand),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{layout, ExceptionRegion};

    fn body_of(operations: Vec<Operation>) -> MethodBody {
        let (operations, _) = layout(operations);
        MethodBody {
            operations,
            max_stack: 2,
            ..MethodBody::default()
        }
    }

    #[test]
    fn identity_rewrite_reproduces_the_body() {
        // if-diamond: brtrue over a nop, br past the else arm, ret.
        let mut body = body_of(vec![
            Operation::new(OpCode::LdcI4, Operand::I32(1)),
            Operation::new(OpCode::Brtrue, Operand::Target(4)),
            Operation::new(OpCode::Nop, Operand::None),
            Operation::new(OpCode::Br, Operand::Target(5)),
            Operation::new(OpCode::Nop, Operand::None),
            Operation::new(OpCode::Ret, Operand::None),
        ]);
        let original = body.clone();

        MethodBodyRewriter::new(&mut IdentityHooks)
            .rewrite(&mut body)
            .unwrap();
        assert_eq!(body, original);
    }

    #[test]
    fn identity_rewrite_rebuilds_exception_regions() {
        let (operations, offsets) = layout(vec![
            Operation::new(OpCode::Nop, Operand::None),
            Operation::new(OpCode::Leave, Operand::Target(4)),
            Operation::new(OpCode::Pop, Operand::None),
            Operation::new(OpCode::Leave, Operand::Target(4)),
            Operation::new(OpCode::Ret, Operand::None),
        ]);
        let region = ExceptionRegion {
            kind: HandlerKind::Catch,
            try_start: offsets[0],
            try_end: offsets[2],
            handler_start: offsets[2],
            handler_end: offsets[4],
            filter_start: None,
            catch_type: None,
        };
        let mut body = MethodBody {
            operations,
            exception_regions: vec![region.clone()],
            max_stack: 1,
            ..MethodBody::default()
        };

        MethodBodyRewriter::new(&mut IdentityHooks)
            .rewrite(&mut body)
            .unwrap();
        assert_eq!(body.exception_regions, vec![region]);
    }

    #[test]
    fn branch_to_a_nonexistent_offset_is_a_missing_label() {
        let mut body = body_of(vec![
            Operation::new(OpCode::Nop, Operand::None),
            Operation::new(OpCode::Ret, Operand::None),
        ]);
        // Point the branch past the end of the body, where no operation will
        // ever bind the label.
        body.operations[0] = Operation {
            offset: 0,
            opcode: OpCode::Br,
            operand: Operand::Target(100),
        };

        let result = MethodBodyRewriter::new(&mut IdentityHooks).rewrite(&mut body);
        assert!(matches!(result, Err(Error::MissingBranchLabel { .. })));
    }

    /// Prepends a nop to every return and claims one extra stack slot.
    struct PadReturns;

    impl RewriteHooks for PadReturns {
        fn rewrite_return(
            &mut self,
            assembler: &mut BodyAssembler,
            op: &Operation,
        ) -> Result<()> {
            assembler.emit(OpCode::Nop, Operand::None)?;
            assembler.emit(op.opcode, op.operand.clone())
        }

        fn rewrite_max_stack(&mut self, max_stack: u16) -> u16 {
            max_stack + 1
        }
    }

    #[test]
    fn injected_operations_shift_branch_targets() {
        // The conditional branch targets the ret; after injection it must
        // target the nop inserted in front of the ret.
        let mut body = body_of(vec![
            Operation::new(OpCode::LdcI4, Operand::I32(0)),
            Operation::new(OpCode::Brtrue, Operand::Target(3)),
            Operation::new(OpCode::Pop, Operand::None),
            Operation::new(OpCode::Ret, Operand::None),
        ]);

        MethodBodyRewriter::new(&mut PadReturns)
            .rewrite(&mut body)
            .unwrap();

        assert_eq!(body.max_stack, 3);
        let branch = &body.operations[1];
        let Operand::Target(target) = branch.operand else {
            panic!("branch lost its target");
        };
        let nop = body
            .operations
            .iter()
            .position(|op| op.offset == target)
            .unwrap();
        assert_eq!(body.operations[nop].opcode, OpCode::Nop);
        assert_eq!(body.operations[nop + 1].opcode, OpCode::Ret);
    }
}
