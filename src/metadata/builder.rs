//! Construction of [`WholeProgram`] models.
//!
//! The builder seeds a runtime assembly with `System.Object` (including its
//! `.ctor` and virtual `Finalize`) so every program starts with the roots the
//! analysis assumes exist, then lets callers grow the model one definition at
//! a time. [`layout`] turns index-addressed operation lists into
//! offset-addressed bodies.

use std::sync::OnceLock;

use super::body::MethodBody;
use super::opcodes::{Operand, Operation};
use super::program::WholeProgram;
use super::types::{
    AssemblyDef, AssemblyId, CustomAttribute, FieldDef, FieldId, FieldRef, FieldRefId, GenericArg,
    GenericParamDef, GenericParamId, MethodDef, MethodFlags, MethodId, MethodRef, MethodRefId,
    TypeDef, TypeFlags, TypeId, TypeRef, TypeRefId, Visibility,
};

/// Incrementally builds a [`WholeProgram`].
#[derive(Debug)]
pub struct ProgramBuilder {
    assemblies: Vec<AssemblyDef>,
    types: Vec<TypeDef>,
    methods: Vec<MethodDef>,
    fields: Vec<FieldDef>,
    generic_params: Vec<GenericParamDef>,
    method_refs: Vec<MethodRef>,
    field_refs: Vec<FieldRef>,
    type_refs: Vec<TypeRef>,
    system_object: TypeId,
    object_finalize: MethodId,
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramBuilder {
    /// Creates a builder pre-seeded with a `System.Runtime` assembly holding
    /// `System.Object` and its `.ctor` and `Finalize` methods.
    #[must_use]
    pub fn new() -> Self {
        let mut builder = Self {
            assemblies: vec![AssemblyDef {
                name: "System.Runtime".into(),
                entry_point: None,
                root: false,
            }],
            types: Vec::new(),
            methods: Vec::new(),
            fields: Vec::new(),
            generic_params: Vec::new(),
            method_refs: Vec::new(),
            field_refs: Vec::new(),
            type_refs: Vec::new(),
            system_object: TypeId(0),
            object_finalize: MethodId(0),
        };
        let object = builder.add_type(
            AssemblyId(0),
            "System",
            "Object",
            None,
            TypeFlags::empty(),
        );
        builder.system_object = object;
        builder.add_method(
            object,
            ".ctor",
            MethodFlags::CONSTRUCTOR | MethodFlags::EXTERNAL,
            Visibility::Public,
            vec![],
        );
        builder.object_finalize = builder.add_method(
            object,
            "Finalize",
            MethodFlags::VIRTUAL | MethodFlags::EXTERNAL,
            Visibility::Family,
            vec![],
        );
        builder
    }

    /// The pre-seeded `System.Object` type.
    #[must_use]
    pub fn system_object(&self) -> TypeId {
        self.system_object
    }

    /// Adds an assembly. `root` marks it as a root of the analysis.
    pub fn add_assembly(&mut self, name: &str, root: bool) -> AssemblyId {
        self.assemblies.push(AssemblyDef {
            name: name.into(),
            entry_point: None,
            root,
        });
        AssemblyId(self.assemblies.len() as u32 - 1)
    }

    /// Declares `method` as the managed entry point of `assembly`.
    pub fn set_entry_point(&mut self, assembly: AssemblyId, method: MethodId) {
        self.assemblies[assembly.index()].entry_point = Some(method);
    }

    /// Adds a type. `base` of `None` with no [`TypeFlags::INTERFACE`] flag
    /// means the type derives from `System.Object` directly; pass the flag to
    /// declare an interface with no base.
    pub fn add_type(
        &mut self,
        assembly: AssemblyId,
        namespace: &str,
        name: &str,
        base: Option<TypeId>,
        flags: TypeFlags,
    ) -> TypeId {
        let base = if flags.contains(TypeFlags::INTERFACE) || (namespace, name) == ("System", "Object")
        {
            base
        } else {
            base.or(Some(self.system_object))
        };
        self.types.push(TypeDef {
            name: name.into(),
            namespace: namespace.into(),
            assembly,
            flags,
            base,
            interfaces: Vec::new(),
            methods: Vec::new(),
            fields: Vec::new(),
            generic_params: Vec::new(),
        });
        TypeId(self.types.len() as u32 - 1)
    }

    /// Shorthand for a plain public class in `namespace` deriving from
    /// `System.Object`.
    pub fn add_class(&mut self, assembly: AssemblyId, namespace: &str, name: &str) -> TypeId {
        self.add_type(assembly, namespace, name, None, TypeFlags::empty())
    }

    /// Records that `ty` directly implements `iface`.
    pub fn implement(&mut self, ty: TypeId, iface: TypeId) {
        self.types[ty.index()].interfaces.push(iface);
    }

    /// Adds a method to `ty`. External and abstract methods keep `body` as
    /// `None` until [`Self::set_body`] is called.
    pub fn add_method(
        &mut self,
        ty: TypeId,
        name: &str,
        flags: MethodFlags,
        visibility: Visibility,
        param_types: Vec<TypeId>,
    ) -> MethodId {
        self.methods.push(MethodDef {
            name: name.into(),
            declaring_type: ty,
            flags,
            visibility,
            param_types,
            return_type: None,
            generic_params: Vec::new(),
            body: None,
        });
        let id = MethodId(self.methods.len() as u32 - 1);
        self.types[ty.index()].methods.push(id);
        id
    }

    /// Declares a non-void return type for `method`.
    pub fn set_return_type(&mut self, method: MethodId, ty: TypeId) {
        self.methods[method.index()].return_type = Some(ty);
    }

    /// Attaches a body to `method`.
    pub fn set_body(&mut self, method: MethodId, body: MethodBody) {
        self.methods[method.index()].body = Some(body);
    }

    /// Adds a field to `ty`.
    pub fn add_field(
        &mut self,
        ty: TypeId,
        name: &str,
        field_type: TypeId,
        is_static: bool,
    ) -> FieldId {
        self.fields.push(FieldDef {
            name: name.into(),
            declaring_type: ty,
            field_type,
            is_static,
            attributes: Vec::new(),
        });
        let id = FieldId(self.fields.len() as u32 - 1);
        self.types[ty.index()].fields.push(id);
        id
    }

    /// Attaches a custom attribute to `field`.
    pub fn add_field_attribute(&mut self, field: FieldId, attribute: CustomAttribute) {
        self.fields[field.index()].attributes.push(attribute);
    }

    /// Adds a generic parameter to `method`.
    pub fn add_method_generic_param(&mut self, method: MethodId, name: &str) -> GenericParamId {
        self.generic_params.push(GenericParamDef {
            name: name.into(),
            owner_method: Some(method),
            owner_type: None,
        });
        let id = GenericParamId(self.generic_params.len() as u32 - 1);
        self.methods[method.index()].generic_params.push(id);
        id
    }

    /// Adds a resolved method reference.
    pub fn method_ref(&mut self, target: MethodId) -> MethodRefId {
        let name = format!(
            "{}.{}::{}",
            self.types[self.methods[target.index()].declaring_type.index()].namespace,
            self.types[self.methods[target.index()].declaring_type.index()].name,
            self.methods[target.index()].name
        );
        self.method_refs.push(MethodRef {
            name,
            resolved: Some(target),
            generic_args: Vec::new(),
        });
        MethodRefId(self.method_refs.len() as u32 - 1)
    }

    /// Adds a resolved reference to a generic method instance.
    pub fn generic_method_ref(&mut self, target: MethodId, args: Vec<GenericArg>) -> MethodRefId {
        let id = self.method_ref(target);
        self.method_refs[id.index()].generic_args = args;
        id
    }

    /// Adds a method reference that fails to resolve.
    pub fn unresolved_method_ref(&mut self, name: &str) -> MethodRefId {
        self.method_refs.push(MethodRef {
            name: name.into(),
            resolved: None,
            generic_args: Vec::new(),
        });
        MethodRefId(self.method_refs.len() as u32 - 1)
    }

    /// Adds a resolved field reference.
    pub fn field_ref(&mut self, target: FieldId) -> FieldRefId {
        let name = self.fields[target.index()].name.clone();
        self.field_refs.push(FieldRef {
            name,
            resolved: Some(target),
        });
        FieldRefId(self.field_refs.len() as u32 - 1)
    }

    /// Adds a field reference that fails to resolve.
    pub fn unresolved_field_ref(&mut self, name: &str) -> FieldRefId {
        self.field_refs.push(FieldRef {
            name: name.into(),
            resolved: None,
        });
        FieldRefId(self.field_refs.len() as u32 - 1)
    }

    /// Adds a resolved type reference.
    pub fn type_ref(&mut self, target: TypeId) -> TypeRefId {
        let name = self.types[target.index()].full_name();
        self.type_refs.push(TypeRef {
            name,
            resolved: Some(target),
        });
        TypeRefId(self.type_refs.len() as u32 - 1)
    }

    /// Adds a type reference that fails to resolve.
    pub fn unresolved_type_ref(&mut self, name: &str) -> TypeRefId {
        self.type_refs.push(TypeRef {
            name: name.into(),
            resolved: None,
        });
        TypeRefId(self.type_refs.len() as u32 - 1)
    }

    /// Freezes the model.
    #[must_use]
    pub fn finish(self) -> WholeProgram {
        WholeProgram {
            assemblies: self.assemblies,
            types: self.types,
            methods: self.methods,
            fields: self.fields,
            generic_params: self.generic_params,
            method_refs: self.method_refs,
            field_refs: self.field_refs,
            type_refs: self.type_refs,
            system_object: self.system_object,
            object_finalize: self.object_finalize,
            hierarchy: OnceLock::new(),
        }
    }
}

/// Lays out an index-addressed operation list into an offset-addressed one.
///
/// On input, [`Operand::Target`] and [`Operand::Switch`] operands hold
/// operation indices. The function assigns each operation its byte offset from
/// the long-form encoding lengths and rewrites the targets to byte offsets.
/// The returned offset table has one extra entry holding the end offset of the
/// body, so exception region ranges can be expressed with it directly.
#[must_use]
pub fn layout(mut operations: Vec<Operation>) -> (Vec<Operation>, Vec<u32>) {
    let mut offsets = Vec::with_capacity(operations.len() + 1);
    let mut offset = 0u32;
    for op in &mut operations {
        op.offset = offset;
        offsets.push(offset);
        offset += op.encoded_len();
    }
    offsets.push(offset);
    for op in &mut operations {
        match &mut op.operand {
            Operand::Target(index) => *index = offsets[*index as usize],
            Operand::Switch(indices) => {
                for index in indices {
                    *index = offsets[*index as usize];
                }
            }
            _ => {}
        }
    }
    (operations, offsets)
}

#[cfg(test)]
mod tests {
    use super::layout;
    use crate::metadata::{OpCode, Operand, Operation};

    #[test]
    fn layout_assigns_offsets_and_resolves_targets() {
        let ops = vec![
            Operation::new(OpCode::Ldarg, Operand::Param(0)), // offset 0, len 4
            Operation::new(OpCode::Brtrue, Operand::Target(3)), // offset 4, len 5
            Operation::new(OpCode::Nop, Operand::None),       // offset 9, len 1
            Operation::new(OpCode::Ret, Operand::None),       // offset 10
        ];
        let (ops, offsets) = layout(ops);
        assert_eq!(offsets, vec![0, 4, 9, 10, 11]);
        assert_eq!(ops[1].operand, Operand::Target(10));
        assert_eq!(ops[3].offset, 10);
    }
}
