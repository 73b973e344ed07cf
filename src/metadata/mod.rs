//! The program model the analyses run against.
//!
//! [`WholeProgram`] owns arenas of assembly, type, method, and field
//! definitions plus the reference tables their bodies index into. The model
//! is a closed world: everything the analyses will ever see is in it before
//! any analysis starts, and it never changes afterwards.

mod body;
mod builder;
mod hierarchy;
mod opcodes;
mod program;
mod types;

pub use body::{ExceptionRegion, HandlerKind, MethodBody};
pub use builder::{layout, ProgramBuilder};
pub use hierarchy::ClassHierarchy;
pub use opcodes::{FlowType, OpCode, Operand, Operation};
pub use program::{wildcard_match, WholeProgram};
pub use types::{
    AssemblyDef, AssemblyId, CustomAttribute, FieldDef, FieldId, FieldRef, FieldRefId, GenericArg,
    GenericParamDef, GenericParamId, MethodDef, MethodFlags, MethodId, MethodRef, MethodRefId,
    NamedArgument, Reference, TypeDef, TypeFlags, TypeId, TypeRef, TypeRefId, Visibility,
};
