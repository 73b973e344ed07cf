//! Definition arenas: assemblies, types, methods, fields, and the reference
//! tables that point at them.
//!
//! The model is index-based: every definition lives in a `Vec` owned by
//! [`crate::metadata::WholeProgram`] and is referred to by a `Copy` id
//! newtype. References (as opposed to definitions) model metadata the program
//! mentions but may not contain; a reference whose `resolved` slot is `None`
//! is the analysis' "unresolved reference" degraded mode and is recorded, not
//! raised.

use bitflags::bitflags;

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u32);

        impl $name {
            /// Returns the arena index this id refers to.
            #[must_use]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }
    };
}

define_id! {
    /// Handle for an assembly definition.
    AssemblyId
}
define_id! {
    /// Handle for a type definition.
    TypeId
}
define_id! {
    /// Handle for a method definition.
    MethodId
}
define_id! {
    /// Handle for a field definition.
    FieldId
}
define_id! {
    /// Handle for a generic parameter definition (a type variable).
    GenericParamId
}
define_id! {
    /// Handle for an entry in the method reference table.
    MethodRefId
}
define_id! {
    /// Handle for an entry in the field reference table.
    FieldRefId
}
define_id! {
    /// Handle for an entry in the type reference table.
    TypeRefId
}

bitflags! {
    /// Attribute flags of a type definition.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TypeFlags: u16 {
        /// The type is an interface.
        const INTERFACE = 0x0001;
        /// The type is abstract and cannot be constructed directly.
        const ABSTRACT = 0x0002;
        /// The type is a value type (struct).
        const VALUE_TYPE = 0x0004;
        /// The type cannot be subclassed.
        const SEALED = 0x0008;
        /// The type is a COM import.
        const COM_OBJECT = 0x0010;
    }
}

bitflags! {
    /// Attribute flags of a method definition.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MethodFlags: u16 {
        /// The method has no `this` receiver.
        const STATIC = 0x0001;
        /// The method participates in virtual dispatch.
        const VIRTUAL = 0x0002;
        /// The method has no implementation in its declaring type.
        const ABSTRACT = 0x0004;
        /// The method body lives outside the program model (native, runtime
        /// provided). No operations are available.
        const EXTERNAL = 0x0008;
        /// The method is an instance constructor (`.ctor`).
        const CONSTRUCTOR = 0x0010;
        /// The method is a type initializer (`.cctor`).
        const STATIC_CONSTRUCTOR = 0x0020;
    }
}

/// Member accessibility, reduced to the distinctions the analysis cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, strum::Display)]
pub enum Visibility {
    /// Accessible everywhere.
    Public,
    /// Accessible to the declaring type and subclasses.
    Family,
    /// Accessible within the declaring assembly.
    Assembly,
    /// Accessible only within the declaring type.
    Private,
}

/// An assembly definition: a named unit of the whole program.
#[derive(Debug, Clone)]
pub struct AssemblyDef {
    /// Simple name of the assembly (no version/culture).
    pub name: String,
    /// Managed entry point, if the assembly is executable.
    pub entry_point: Option<MethodId>,
    /// Whether this assembly is a root of the analysis (named by the user)
    /// rather than a dependency pulled in by reference.
    pub root: bool,
}

/// A type definition.
#[derive(Debug, Clone)]
pub struct TypeDef {
    /// Simple name, e.g. `Widget`.
    pub name: String,
    /// Containing namespace, e.g. `App.Controls`. Empty for the global one.
    pub namespace: String,
    /// Assembly this type is defined in.
    pub assembly: AssemblyId,
    /// Attribute flags.
    pub flags: TypeFlags,
    /// Base class. `None` only for `System.Object` and interfaces.
    pub base: Option<TypeId>,
    /// Interfaces this type directly implements.
    pub interfaces: Vec<TypeId>,
    /// Methods declared directly on this type, in declaration order.
    pub methods: Vec<MethodId>,
    /// Fields declared directly on this type, in declaration order.
    pub fields: Vec<FieldId>,
    /// Generic parameters declared by this type.
    pub generic_params: Vec<GenericParamId>,
}

impl TypeDef {
    /// Returns the namespace-qualified name, e.g. `App.Controls.Widget`.
    #[must_use]
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// Whether the type is an interface.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.flags.contains(TypeFlags::INTERFACE)
    }

    /// Whether the type is abstract.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.flags.contains(TypeFlags::ABSTRACT)
    }

    /// Whether the type is a value type.
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        self.flags.contains(TypeFlags::VALUE_TYPE)
    }
}

/// A method definition.
#[derive(Debug, Clone)]
pub struct MethodDef {
    /// Simple name, e.g. `Draw`, `.ctor`, `.cctor`.
    pub name: String,
    /// Type this method is declared on.
    pub declaring_type: TypeId,
    /// Attribute flags.
    pub flags: MethodFlags,
    /// Accessibility.
    pub visibility: Visibility,
    /// Declared parameter types, excluding the implicit receiver.
    pub param_types: Vec<TypeId>,
    /// Declared return type, `None` for void.
    pub return_type: Option<TypeId>,
    /// Generic parameters declared by this method.
    pub generic_params: Vec<GenericParamId>,
    /// The method body, if one exists. Abstract and external methods have
    /// none.
    pub body: Option<super::MethodBody>,
}

impl MethodDef {
    /// Whether the method participates in virtual dispatch.
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.flags.contains(MethodFlags::VIRTUAL)
    }

    /// Whether the method is abstract.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.flags.contains(MethodFlags::ABSTRACT)
    }

    /// Whether the method's implementation lives outside the program model.
    #[must_use]
    pub fn is_external(&self) -> bool {
        self.flags.contains(MethodFlags::EXTERNAL)
    }

    /// Whether the method is static.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodFlags::STATIC)
    }

    /// Whether the method is an instance constructor.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.flags.contains(MethodFlags::CONSTRUCTOR)
    }

    /// Whether the method is a type initializer.
    #[must_use]
    pub fn is_static_constructor(&self) -> bool {
        self.flags.contains(MethodFlags::STATIC_CONSTRUCTOR)
    }

    /// Whether two methods can override one another: same name and same
    /// declared parameter types.
    #[must_use]
    pub fn signature_matches(&self, other: &MethodDef) -> bool {
        self.name == other.name && self.param_types == other.param_types
    }
}

/// A field definition.
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// Simple name.
    pub name: String,
    /// Type this field is declared on.
    pub declaring_type: TypeId,
    /// Declared type of the field's value.
    pub field_type: TypeId,
    /// Whether the field is static.
    pub is_static: bool,
    /// Custom attributes attached to this field. Consumed by the summary
    /// script's `construct attributes` command.
    pub attributes: Vec<CustomAttribute>,
}

/// A generic parameter (type variable) declared by a type or method.
#[derive(Debug, Clone)]
pub struct GenericParamDef {
    /// Declared name, e.g. `T`.
    pub name: String,
    /// The method declaring this parameter, if it is a method type variable.
    pub owner_method: Option<MethodId>,
    /// The type declaring this parameter, if it is a class type variable.
    pub owner_type: Option<TypeId>,
}

/// A custom attribute instance attached to a definition.
#[derive(Debug, Clone)]
pub struct CustomAttribute {
    /// Reference to the attribute constructor that was invoked.
    pub constructor: MethodRefId,
    /// Named arguments (property assignments) in the attribute application.
    pub named_arguments: Vec<NamedArgument>,
}

/// A named argument inside a custom attribute application, e.g.
/// `[Widget(Order = 3)]`.
#[derive(Debug, Clone)]
pub struct NamedArgument {
    /// Property name as written (without the `set_` prefix).
    pub name: String,
    /// Declared type of the assigned value.
    pub value_type: TypeId,
}

/// A generic argument at a call site: either a concrete type or a type
/// variable of the enclosing context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GenericArg {
    /// A concrete type argument.
    Type(TypeId),
    /// A type variable of the calling method or its declaring type.
    Param(GenericParamId),
}

/// An entry in the method reference table.
#[derive(Debug, Clone)]
pub struct MethodRef {
    /// Display name for diagnostics, e.g. `App.Widget::Draw`.
    pub name: String,
    /// The definition this reference resolves to, when resolution succeeded.
    pub resolved: Option<MethodId>,
    /// Generic arguments if this reference instantiates a generic method.
    pub generic_args: Vec<GenericArg>,
}

/// An entry in the field reference table.
#[derive(Debug, Clone)]
pub struct FieldRef {
    /// Display name for diagnostics.
    pub name: String,
    /// The definition this reference resolves to, when resolution succeeded.
    pub resolved: Option<FieldId>,
}

/// An entry in the type reference table.
#[derive(Debug, Clone)]
pub struct TypeRef {
    /// Display name for diagnostics.
    pub name: String,
    /// The definition this reference resolves to, when resolution succeeded.
    pub resolved: Option<TypeId>,
}

/// A reference that failed to resolve against the program model.
///
/// Recorded into [`crate::summary::ReachabilitySummary::unresolved_references`]
/// rather than raised; the analysis keeps going in a documented degraded mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Reference {
    /// An unresolved method reference.
    Method(MethodRefId),
    /// An unresolved field reference.
    Field(FieldRefId),
    /// An unresolved type reference.
    Type(TypeRefId),
}
