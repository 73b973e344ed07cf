//! Flow-insensitive bytecode summarization.
//!
//! Scans every operation of a body once, ignoring control flow entirely, and
//! records each operation's worst-case reachability effect. This is the
//! baseline every other strategy falls back to.

use log::debug;

use crate::metadata::{
    FieldId, FieldRefId, GenericArg, MethodBody, MethodId, MethodRefId, OpCode, Operand,
    Operation, Reference, TypeId, TypeRefId, WholeProgram,
};
use crate::summary::{MethodSummarizer, ReachabilitySummary};
use crate::Result;

/// Summarizes a method by scanning its operations in order.
///
/// Handles every method that has a body; methods without one (abstract,
/// external) yield an empty summary.
#[derive(Debug, Default)]
pub struct BytecodeSummarizer;

impl BytecodeSummarizer {
    /// Creates the summarizer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl MethodSummarizer for BytecodeSummarizer {
    fn can_summarize(&self, _program: &WholeProgram, _method: MethodId) -> bool {
        true
    }

    fn summarize(&self, program: &WholeProgram, method: MethodId) -> Result<ReachabilitySummary> {
        let def = program.method(method);
        let Some(body) = &def.body else {
            debug!(
                "no body available for {}, producing empty summary",
                program.method_display(method)
            );
            return Ok(ReachabilitySummary::new());
        };
        let mut visitor = BytecodeVisitor::new(program);
        visitor.visit_body(body);
        Ok(visitor.into_summary())
    }
}

/// Accumulates per-operation effects into a summary.
///
/// Shared with the local-flow strategy, which feeds it only the operations of
/// blocks it proved reachable.
pub(crate) struct BytecodeVisitor<'p> {
    program: &'p WholeProgram,
    summary: ReachabilitySummary,
}

impl<'p> BytecodeVisitor<'p> {
    pub(crate) fn new(program: &'p WholeProgram) -> Self {
        Self {
            program,
            summary: ReachabilitySummary::new(),
        }
    }

    pub(crate) fn into_summary(self) -> ReachabilitySummary {
        self.summary
    }

    pub(crate) fn summary_mut(&mut self) -> &mut ReachabilitySummary {
        &mut self.summary
    }

    pub(crate) fn visit_body(&mut self, body: &MethodBody) {
        for op in &body.operations {
            self.visit(op);
        }
    }

    pub(crate) fn visit(&mut self, op: &Operation) {
        match op.opcode {
            OpCode::Newobj => {
                if let Operand::Method(r) = op.operand {
                    if let Some(ctor) = self.resolve_method(r) {
                        let constructed = self.program.method(ctor).declaring_type;
                        self.summary.reachable_types.insert(constructed);
                        self.summary.constructed_types.insert(constructed);
                        self.summary.nonvirtually_called_methods.insert(ctor);
                        self.note_generic_arguments(r);
                    }
                }
            }
            // Boxing a value type lets a later callvirt dispatch to one of
            // its methods. Box of a reference type is a no-op but legal.
            OpCode::Box => {
                if let Operand::Type(r) = op.operand {
                    if let Some(boxed) = self.resolve_type(r) {
                        if self.program.type_def(boxed).is_value_type() {
                            self.summary.constructed_types.insert(boxed);
                        }
                    }
                }
            }
            // Field tokens keep the field alive. Method and type tokens are
            // not tracked; see the reachability report for what that misses.
            OpCode::Ldtoken => {
                if let Operand::Field(r) = op.operand {
                    if let Some(field) = self.resolve_field(r) {
                        self.summary.reachable_fields.insert(field);
                    }
                }
            }
            // A call on a virtual method happens when it is invoked via
            // `base`, so it still counts as a non-virtual use.
            OpCode::Call | OpCode::Calli | OpCode::Ldftn => {
                if let Operand::Method(r) = op.operand {
                    if let Some(target) = self.resolve_method(r) {
                        self.summary.nonvirtually_called_methods.insert(target);
                        if self.program.is_activator_create_instance(target) {
                            self.record_activator_instantiation(r);
                        }
                        self.note_generic_arguments(r);
                    }
                }
            }
            OpCode::Callvirt | OpCode::Ldvirtftn => {
                if let Operand::Method(r) = op.operand {
                    if let Some(target) = self.resolve_method(r) {
                        // Compilers sometimes emit callvirt on non-virtual
                        // methods; treat those as direct calls.
                        if self.program.method(target).is_virtual() {
                            self.summary.virtually_called_methods.insert(target);
                        } else {
                            self.summary.nonvirtually_called_methods.insert(target);
                        }
                        self.note_generic_arguments(r);
                    }
                }
            }
            OpCode::Ldfld
            | OpCode::Ldflda
            | OpCode::Ldsfld
            | OpCode::Ldsflda
            | OpCode::Stfld
            | OpCode::Stsfld => {
                if let Operand::Field(r) = op.operand {
                    if let Some(field) = self.resolve_field(r) {
                        self.summary
                            .reachable_types
                            .insert(self.program.field(field).declaring_type);
                        self.summary.reachable_fields.insert(field);
                    }
                }
            }
            _ => {}
        }
    }

    /// A concrete type passed as a generic argument can flow into a
    /// `new T()` in the callee, so it is conservatively treated as
    /// constructed, along with its default constructor.
    pub(crate) fn note_generic_arguments(&mut self, call: MethodRefId) {
        let args = self.program.method_ref(call).generic_args.clone();
        for arg in args {
            let GenericArg::Type(ty) = arg else { continue };
            if !self.program.is_constructable(ty) {
                continue;
            }
            self.summary.constructed_types.insert(ty);
            let default_ctor = self
                .program
                .constructors(ty)
                .into_iter()
                .find(|&c| self.program.method(c).param_types.is_empty());
            if let Some(ctor) = default_ctor {
                self.summary.nonvirtually_called_methods.insert(ctor);
            }
        }
    }

    /// `Activator.CreateInstance<T>()` with a type-variable argument is a
    /// `new T()`: the variable itself is recorded as constructed and the mark
    /// phase resolves it against instantiations.
    fn record_activator_instantiation(&mut self, call: MethodRefId) {
        if let Some(GenericArg::Param(param)) =
            self.program.method_ref(call).generic_args.first()
        {
            self.summary.constructed_type_parameters.insert(*param);
        }
    }

    fn resolve_method(&mut self, r: MethodRefId) -> Option<MethodId> {
        let resolved = self.program.method_ref(r).resolved;
        if resolved.is_none() {
            self.summary.unresolved_references.insert(Reference::Method(r));
        }
        resolved
    }

    fn resolve_field(&mut self, r: FieldRefId) -> Option<FieldId> {
        let resolved = self.program.field_ref(r).resolved;
        if resolved.is_none() {
            self.summary.unresolved_references.insert(Reference::Field(r));
        }
        resolved
    }

    fn resolve_type(&mut self, r: TypeRefId) -> Option<TypeId> {
        let resolved = self.program.type_ref(r).resolved;
        if resolved.is_none() {
            self.summary.unresolved_references.insert(Reference::Type(r));
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::BytecodeSummarizer;
    use crate::metadata::{
        layout, GenericArg, MethodBody, MethodFlags, OpCode, Operand, Operation, ProgramBuilder,
        TypeFlags, Visibility,
    };
    use crate::summary::MethodSummarizer;

    #[test]
    fn newobj_records_construction_and_ctor_call() {
        let mut b = ProgramBuilder::new();
        let asm = b.add_assembly("App", true);
        let widget = b.add_class(asm, "App", "Widget");
        let ctor = b.add_method(
            widget,
            ".ctor",
            MethodFlags::CONSTRUCTOR,
            Visibility::Public,
            vec![],
        );
        let ctor_ref = b.method_ref(ctor);

        let main_ty = b.add_class(asm, "App", "Program");
        let main = b.add_method(
            main_ty,
            "Main",
            MethodFlags::STATIC,
            Visibility::Public,
            vec![],
        );
        let (ops, _) = layout(vec![
            Operation::new(OpCode::Newobj, Operand::Method(ctor_ref)),
            Operation::new(OpCode::Pop, Operand::None),
            Operation::new(OpCode::Ret, Operand::None),
        ]);
        b.set_body(
            main,
            MethodBody {
                operations: ops,
                max_stack: 1,
                ..Default::default()
            },
        );
        let program = b.finish();

        let summary = BytecodeSummarizer::new().summarize(&program, main).unwrap();
        assert!(summary.constructed_types.contains(&widget));
        assert!(summary.reachable_types.contains(&widget));
        assert!(summary.nonvirtually_called_methods.contains(&ctor));
        assert!(summary.unresolved_references.is_empty());
    }

    #[test]
    fn callvirt_on_non_virtual_target_is_a_direct_call() {
        let mut b = ProgramBuilder::new();
        let asm = b.add_assembly("App", true);
        let widget = b.add_class(asm, "App", "Widget");
        let helper = b.add_method(
            widget,
            "Helper",
            MethodFlags::empty(),
            Visibility::Public,
            vec![],
        );
        let helper_ref = b.method_ref(helper);
        let caller = b.add_method(
            widget,
            "Caller",
            MethodFlags::empty(),
            Visibility::Public,
            vec![],
        );
        let (ops, _) = layout(vec![
            Operation::new(OpCode::Ldarg, Operand::Param(0)),
            Operation::new(OpCode::Callvirt, Operand::Method(helper_ref)),
            Operation::new(OpCode::Ret, Operand::None),
        ]);
        b.set_body(
            caller,
            MethodBody {
                operations: ops,
                max_stack: 1,
                ..Default::default()
            },
        );
        let program = b.finish();

        let summary = BytecodeSummarizer::new()
            .summarize(&program, caller)
            .unwrap();
        assert!(summary.nonvirtually_called_methods.contains(&helper));
        assert!(summary.virtually_called_methods.is_empty());
    }

    #[test]
    fn box_of_a_value_type_counts_as_construction() {
        let mut b = ProgramBuilder::new();
        let asm = b.add_assembly("App", true);
        let point = b.add_type(asm, "App", "Point", None, TypeFlags::VALUE_TYPE);
        let widget = b.add_class(asm, "App", "Widget");
        let point_ref = b.type_ref(point);
        let widget_ref = b.type_ref(widget);

        let ty = b.add_class(asm, "App", "Program");
        let main = b.add_method(ty, "Main", MethodFlags::STATIC, Visibility::Public, vec![]);
        let (ops, _) = layout(vec![
            Operation::new(OpCode::Box, Operand::Type(point_ref)),
            Operation::new(OpCode::Pop, Operand::None),
            Operation::new(OpCode::Box, Operand::Type(widget_ref)),
            Operation::new(OpCode::Pop, Operand::None),
            Operation::new(OpCode::Ret, Operand::None),
        ]);
        b.set_body(
            main,
            MethodBody {
                operations: ops,
                max_stack: 1,
                ..Default::default()
            },
        );
        let program = b.finish();

        let summary = BytecodeSummarizer::new().summarize(&program, main).unwrap();
        assert!(summary.constructed_types.contains(&point));
        // Boxing a reference type is a no-op.
        assert!(!summary.constructed_types.contains(&widget));
    }

    #[test]
    fn ldtoken_on_a_field_keeps_it_alive() {
        let mut b = ProgramBuilder::new();
        let asm = b.add_assembly("App", true);
        let object = b.system_object();
        let widget = b.add_class(asm, "App", "Widget");
        let count = b.add_field(widget, "count", object, true);
        let count_ref = b.field_ref(count);

        let ty = b.add_class(asm, "App", "Program");
        let main = b.add_method(ty, "Main", MethodFlags::STATIC, Visibility::Public, vec![]);
        let (ops, _) = layout(vec![
            Operation::new(OpCode::Ldtoken, Operand::Field(count_ref)),
            Operation::new(OpCode::Pop, Operand::None),
            Operation::new(OpCode::Ret, Operand::None),
        ]);
        b.set_body(
            main,
            MethodBody {
                operations: ops,
                max_stack: 1,
                ..Default::default()
            },
        );
        let program = b.finish();

        let summary = BytecodeSummarizer::new().summarize(&program, main).unwrap();
        assert!(summary.reachable_fields.contains(&count));
    }

    #[test]
    fn create_instance_records_the_type_variable() {
        let mut b = ProgramBuilder::new();
        let asm = b.add_assembly("App", true);
        let activator = b.add_class(asm, "System", "Activator");
        let create = b.add_method(
            activator,
            "CreateInstance",
            MethodFlags::STATIC | MethodFlags::EXTERNAL,
            Visibility::Public,
            vec![],
        );
        let t = b.add_method_generic_param(create, "T");
        let create_ref = b.generic_method_ref(create, vec![GenericArg::Param(t)]);

        let ty = b.add_class(asm, "App", "Program");
        let main = b.add_method(ty, "Main", MethodFlags::STATIC, Visibility::Public, vec![]);
        let (ops, _) = layout(vec![
            Operation::new(OpCode::Call, Operand::Method(create_ref)),
            Operation::new(OpCode::Pop, Operand::None),
            Operation::new(OpCode::Ret, Operand::None),
        ]);
        b.set_body(
            main,
            MethodBody {
                operations: ops,
                max_stack: 1,
                ..Default::default()
            },
        );
        let program = b.finish();

        let summary = BytecodeSummarizer::new().summarize(&program, main).unwrap();
        assert!(summary.constructed_type_parameters.contains(&t));
        assert!(summary.nonvirtually_called_methods.contains(&create));
    }

    #[test]
    fn concrete_generic_arguments_flow_to_construction() {
        let mut b = ProgramBuilder::new();
        let asm = b.add_assembly("App", true);
        let widget = b.add_class(asm, "App", "Widget");
        let widget_ctor = b.add_method(
            widget,
            ".ctor",
            MethodFlags::CONSTRUCTOR,
            Visibility::Public,
            vec![],
        );

        let factory = b.add_class(asm, "App", "Factory");
        let make = b.add_method(
            factory,
            "Make",
            MethodFlags::STATIC,
            Visibility::Public,
            vec![],
        );
        b.add_method_generic_param(make, "T");
        let make_ref = b.generic_method_ref(make, vec![GenericArg::Type(widget)]);

        let ty = b.add_class(asm, "App", "Program");
        let main = b.add_method(ty, "Main", MethodFlags::STATIC, Visibility::Public, vec![]);
        let (ops, _) = layout(vec![
            Operation::new(OpCode::Call, Operand::Method(make_ref)),
            Operation::new(OpCode::Ret, Operand::None),
        ]);
        b.set_body(
            main,
            MethodBody {
                operations: ops,
                max_stack: 1,
                ..Default::default()
            },
        );
        let program = b.finish();

        let summary = BytecodeSummarizer::new().summarize(&program, main).unwrap();
        assert!(summary.constructed_types.contains(&widget));
        assert!(summary.nonvirtually_called_methods.contains(&widget_ctor));
    }

    #[test]
    fn unresolved_reference_is_recorded_not_fatal() {
        let mut b = ProgramBuilder::new();
        let asm = b.add_assembly("App", true);
        let missing = b.unresolved_method_ref("Gone.Missing::Method");
        let ty = b.add_class(asm, "App", "Program");
        let caller = b.add_method(
            ty,
            "Caller",
            MethodFlags::STATIC,
            Visibility::Public,
            vec![],
        );
        let (ops, _) = layout(vec![
            Operation::new(OpCode::Call, Operand::Method(missing)),
            Operation::new(OpCode::Ret, Operand::None),
        ]);
        b.set_body(
            caller,
            MethodBody {
                operations: ops,
                max_stack: 1,
                ..Default::default()
            },
        );
        let program = b.finish();

        let summary = BytecodeSummarizer::new()
            .summarize(&program, caller)
            .unwrap();
        assert!(summary.nonvirtually_called_methods.is_empty());
        assert_eq!(summary.unresolved_references.len(), 1);
    }
}
