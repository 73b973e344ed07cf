//! The two local-flow summarization strategies.
//!
//! [`ReachabilityFlowSummarizer`] runs a one-bit fixpoint and feeds only the
//! operations of reachable blocks to the plain bytecode visitor, pruning dead
//! branches. [`TypesFlowSummarizer`] additionally tracks declared types
//! through argument, local, and stack slots so that a `callvirt` whose
//! receiver type is known can be tightened to the single override that
//! receiver would dispatch to.

use std::collections::BTreeMap;

use log::trace;

use crate::metadata::{MethodId, OpCode, Operand, Operation, WholeProgram};
use crate::summary::localflow::cfg::ControlFlowGraph;
use crate::summary::localflow::state::{AbstractType, SlotState, TypeDomain};
use crate::summary::localflow::worklist::{solve, BlockInterpreter};
use crate::summary::{BytecodeVisitor, MethodSummarizer, ReachabilitySummary};
use crate::{Error, Result};

/// Whether the local-flow strategies handle `method` at all.
///
/// Exception regions are refused wholesale, as is `switch`; both would
/// complicate block construction and join shapes for little gain at this
/// precision level.
pub(crate) fn local_flow_applies(program: &WholeProgram, method: MethodId) -> bool {
    let def = program.method(method);
    if def.is_abstract() || def.is_external() {
        return false;
    }
    let Some(body) = &def.body else {
        return false;
    };
    if body.has_exception_regions() {
        return false;
    }
    !body
        .operations
        .iter()
        .any(|op| op.opcode == OpCode::Switch)
}

/// One-bit reachability over basic blocks.
#[derive(Debug, Default)]
pub struct ReachabilityFlowSummarizer;

impl ReachabilityFlowSummarizer {
    /// Creates the summarizer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

struct ReachableInterpreter;

impl BlockInterpreter for ReachableInterpreter {
    type State = bool;

    fn entry_state(&self) -> bool {
        true
    }

    fn join(&self, lhs: &bool, rhs: &bool) -> Result<bool> {
        Ok(*lhs || *rhs)
    }

    fn interpret_block(&mut self, _ops: &[Operation], state: bool) -> Result<bool> {
        Ok(state)
    }
}

impl MethodSummarizer for ReachabilityFlowSummarizer {
    fn can_summarize(&self, program: &WholeProgram, method: MethodId) -> bool {
        local_flow_applies(program, method)
    }

    fn summarize(&self, program: &WholeProgram, method: MethodId) -> Result<ReachabilitySummary> {
        let def = program.method(method);
        let body = def
            .body
            .as_ref()
            .ok_or_else(|| Error::Analysis("method has no body".into()))?;
        let cfg = ControlFlowGraph::build(body)?;
        let fixpoint = solve(&cfg, &body.operations, &mut ReachableInterpreter)?;

        let mut visitor = BytecodeVisitor::new(program);
        for block in 0..cfg.block_count() {
            if fixpoint.pre[block].is_some() {
                let range = cfg.block(block);
                for op in &body.operations[range.start..range.end] {
                    visitor.visit(op);
                }
            } else {
                trace!(
                    "skipping unreachable block {block} in {}",
                    program.method_display(method)
                );
            }
        }
        Ok(visitor.into_summary())
    }
}

/// Declared-type flow with virtual call tightening.
#[derive(Debug, Default)]
pub struct TypesFlowSummarizer;

impl TypesFlowSummarizer {
    /// Creates the summarizer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

struct TypesInterpreter<'p> {
    program: &'p WholeProgram,
    domain: TypeDomain<'p>,
    /// Argument slot types on entry: receiver first for instance methods.
    entry_args: Vec<AbstractType>,
    entry_locals: Vec<AbstractType>,
    returns_value: bool,
    /// Abstract receiver value observed at each `callvirt`, by offset.
    receivers: BTreeMap<u32, AbstractType>,
}

impl<'p> TypesInterpreter<'p> {
    fn new(program: &'p WholeProgram, method: MethodId) -> Result<Self> {
        let def = program.method(method);
        let body = def
            .body
            .as_ref()
            .ok_or_else(|| Error::Analysis("method has no body".into()))?;
        let mut entry_args = Vec::new();
        if !def.is_static() {
            entry_args.push(Some(def.declaring_type));
        }
        entry_args.extend(def.param_types.iter().map(|&t| Some(t)));
        let entry_locals = body.locals.iter().map(|&t| Some(t)).collect();
        Ok(Self {
            program,
            domain: TypeDomain::new(program),
            entry_args,
            entry_locals,
            returns_value: def.return_type.is_some(),
            receivers: BTreeMap::new(),
        })
    }

    fn top(&self) -> AbstractType {
        Some(self.domain.top())
    }

    fn slot(&self, slots: &[AbstractType], index: usize) -> Result<AbstractType> {
        slots
            .get(index)
            .copied()
            .ok_or_else(|| Error::Analysis(format!("slot index {index} out of range")))
    }

    /// Pops arguments and the receiver of a call and pushes its result. The
    /// callee signature must be resolvable or the whole analysis is off.
    fn interpret_call(
        &mut self,
        op: &Operation,
        state: &mut SlotState,
        instance: bool,
        pushes_constructed: bool,
    ) -> Result<()> {
        let Operand::Method(r) = op.operand else {
            return Err(Error::Analysis("call without a method operand".into()));
        };
        let target = self.program.method_ref(r).resolved.ok_or_else(|| {
            Error::Analysis(format!(
                "cannot model call to unresolved reference '{}'",
                self.program.method_ref(r).name
            ))
        })?;
        let def = self.program.method(target);
        let argc = def.param_types.len();

        if op.opcode == OpCode::Callvirt {
            let receiver_depth = state.stack.len().checked_sub(argc + 1).ok_or_else(|| {
                Error::Analysis("operand stack underflow at callvirt".into())
            })?;
            self.receivers.insert(op.offset, state.stack[receiver_depth]);
        }

        state.popn(argc)?;
        if instance && !def.is_static() {
            state.pop()?;
        }
        if pushes_constructed {
            state.push(Some(def.declaring_type));
        } else if let Some(ret) = def.return_type {
            state.push(Some(ret));
        }
        Ok(())
    }

    fn interpret_op(&mut self, op: &Operation, state: &mut SlotState) -> Result<()> {
        let top = self.top();
        match op.opcode {
            OpCode::Nop | OpCode::Br | OpCode::Leave | OpCode::Endfinally | OpCode::Rethrow => {}

            OpCode::Ldarg => {
                if let Operand::Param(i) = op.operand {
                    let value = self.slot(&state.args, i as usize)?;
                    state.push(value);
                }
            }
            OpCode::Starg => {
                if let Operand::Param(i) = op.operand {
                    let value = state.pop()?;
                    let index = i as usize;
                    self.slot(&state.args, index)?;
                    state.args[index] = value;
                }
            }
            OpCode::Ldloc => {
                if let Operand::Local(i) = op.operand {
                    let value = self.slot(&state.locals, i as usize)?;
                    state.push(value);
                }
            }
            OpCode::Stloc => {
                if let Operand::Local(i) = op.operand {
                    let value = state.pop()?;
                    let index = i as usize;
                    self.slot(&state.locals, index)?;
                    state.locals[index] = value;
                }
            }

            OpCode::Ldarga
            | OpCode::Ldloca
            | OpCode::Ldsflda
            | OpCode::Ldftn
            | OpCode::LdcI4
            | OpCode::LdcI8
            | OpCode::LdcR4
            | OpCode::LdcR8
            | OpCode::Ldstr
            | OpCode::Ldnull
            | OpCode::Ldtoken
            | OpCode::Sizeof => state.push(top),

            OpCode::Ldsfld => {
                let value = self.field_operand_type(op);
                state.push(value);
            }
            OpCode::Ldfld => {
                state.pop()?;
                let value = self.field_operand_type(op);
                state.push(value);
            }
            OpCode::Ldflda => {
                state.pop()?;
                state.push(top);
            }

            OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::Rem
            | OpCode::And
            | OpCode::Or
            | OpCode::Xor
            | OpCode::Shl
            | OpCode::Shr
            | OpCode::Ceq
            | OpCode::Cgt
            | OpCode::Clt
            | OpCode::Ldelem => {
                state.popn(2)?;
                state.push(top);
            }
            OpCode::Neg | OpCode::Not | OpCode::Conv | OpCode::Ldlen | OpCode::Unbox => {
                state.pop()?;
                state.push(top);
            }
            OpCode::Castclass | OpCode::Isinst | OpCode::Box | OpCode::UnboxAny => {
                state.pop()?;
                let value = self.type_operand_type(op);
                state.push(value);
            }
            OpCode::Newarr => {
                state.pop()?;
                state.push(top);
            }
            OpCode::Ldvirtftn => {
                state.pop()?;
                state.push(top);
            }

            OpCode::Brtrue | OpCode::Brfalse | OpCode::Switch | OpCode::Endfilter => {
                state.pop()?;
            }
            OpCode::Beq
            | OpCode::Bge
            | OpCode::Bgt
            | OpCode::Ble
            | OpCode::Blt
            | OpCode::BneUn
            | OpCode::BgeUn
            | OpCode::BgtUn
            | OpCode::BleUn
            | OpCode::BltUn => state.popn(2)?,

            OpCode::Dup => {
                let value = state.pop()?;
                state.push(value);
                state.push(value);
            }
            OpCode::Pop | OpCode::Throw | OpCode::Initobj | OpCode::Stsfld => {
                state.pop()?;
            }
            OpCode::Stfld => state.popn(2)?,
            OpCode::Stelem => state.popn(3)?,

            OpCode::Call | OpCode::Callvirt => {
                self.interpret_call(op, state, true, false)?;
            }
            OpCode::Calli => {
                state.pop()?;
                self.interpret_call(op, state, true, false)?;
            }
            OpCode::Newobj => {
                self.interpret_call(op, state, false, true)?;
            }

            OpCode::Ret => {
                if self.returns_value {
                    state.pop()?;
                }
            }
        }
        Ok(())
    }

    fn field_operand_type(&self, op: &Operation) -> AbstractType {
        if let Operand::Field(r) = op.operand {
            if let Some(field) = self.program.field_ref(r).resolved {
                return Some(self.program.field(field).field_type);
            }
        }
        self.top()
    }

    fn type_operand_type(&self, op: &Operation) -> AbstractType {
        if let Operand::Type(r) = op.operand {
            if let Some(ty) = self.program.type_ref(r).resolved {
                return Some(ty);
            }
        }
        self.top()
    }
}

impl BlockInterpreter for TypesInterpreter<'_> {
    type State = SlotState;

    fn entry_state(&self) -> SlotState {
        SlotState {
            args: self.entry_args.clone(),
            locals: self.entry_locals.clone(),
            stack: Vec::new(),
        }
    }

    fn join(&self, lhs: &SlotState, rhs: &SlotState) -> Result<SlotState> {
        lhs.join(rhs, &self.domain)
    }

    fn interpret_block(&mut self, ops: &[Operation], mut state: SlotState) -> Result<SlotState> {
        for op in ops {
            self.interpret_op(op, &mut state)?;
        }
        Ok(state)
    }
}

impl MethodSummarizer for TypesFlowSummarizer {
    fn can_summarize(&self, program: &WholeProgram, method: MethodId) -> bool {
        local_flow_applies(program, method)
    }

    fn summarize(&self, program: &WholeProgram, method: MethodId) -> Result<ReachabilitySummary> {
        let def = program.method(method);
        let body = def
            .body
            .as_ref()
            .ok_or_else(|| Error::Analysis("method has no body".into()))?;
        let cfg = ControlFlowGraph::build(body)?;

        let mut interpreter = TypesInterpreter::new(program, method)?;
        let fixpoint = solve(&cfg, &body.operations, &mut interpreter)?;

        // Replay each reachable block from its fixpoint pre-state so the
        // recorded receiver values are the fixpoint ones, not whichever
        // iteration happened to run last.
        interpreter.receivers.clear();
        for block in 0..cfg.block_count() {
            if let Some(pre) = &fixpoint.pre[block] {
                let range = cfg.block(block);
                interpreter
                    .interpret_block(&body.operations[range.start..range.end], pre.clone())?;
            }
        }

        let receivers = interpreter.receivers;
        let mut visitor = BytecodeVisitor::new(program);
        for op in &body.operations {
            if tighten_callvirt(program, op, &receivers, &mut visitor) {
                continue;
            }
            visitor.visit(op);
        }
        Ok(visitor.into_summary())
    }
}

/// Replaces the generic virtual-call record for a `callvirt` with the single
/// override its known receiver type dispatches to. Returns false when the
/// receiver is unknown, an interface, or top, in which case the plain
/// handling applies.
fn tighten_callvirt(
    program: &WholeProgram,
    op: &Operation,
    receivers: &BTreeMap<u32, AbstractType>,
    visitor: &mut BytecodeVisitor<'_>,
) -> bool {
    if op.opcode != OpCode::Callvirt {
        return false;
    }
    let Operand::Method(r) = op.operand else {
        return false;
    };
    let Some(target) = program.method_ref(r).resolved else {
        return false;
    };
    if !program.method(target).is_virtual() {
        return false;
    }
    let Some(Some(receiver)) = receivers.get(&op.offset).copied() else {
        return false;
    };
    if program.type_def(receiver).is_interface() {
        return false;
    }
    let declaring = program.method(target).declaring_type;
    if !program.derives_from(receiver, declaring) {
        return false;
    }
    let Some(tightened) = program.implements_instantiated(receiver, target) else {
        return false;
    };
    trace!(
        "tightened {} to {} via receiver {}",
        program.method_display(target),
        program.method_display(tightened),
        program.type_def(receiver).full_name()
    );
    visitor
        .summary_mut()
        .virtually_called_methods
        .insert(tightened);
    visitor.note_generic_arguments(r);
    true
}
