//! The normalized CIL operation stream.
//!
//! Short-form opcodes are normalized away at build time: there is one `Ldarg`
//! with an explicit index, one `Br` with a 32-bit relative target, and so on.
//! Offsets in a body are byte offsets of the long-form encoding, which is also
//! the encoding the rewriter emits.

use super::types::{FieldRefId, MethodRefId, TypeRefId};

/// Normalized CIL opcodes.
///
/// This is not the full ECMA-335 set; it covers the operations the analyses
/// interpret plus a generic compute subset that flows through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
#[allow(missing_docs)]
pub enum OpCode {
    Nop,
    // Loads and stores.
    Ldarg,
    Ldarga,
    Starg,
    Ldloc,
    Ldloca,
    Stloc,
    LdcI4,
    LdcI8,
    LdcR4,
    LdcR8,
    Ldstr,
    Ldnull,
    Ldtoken,
    Dup,
    Pop,
    // Arithmetic and comparison.
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Neg,
    Not,
    Conv,
    Ceq,
    Cgt,
    Clt,
    // Calls and function pointers.
    Call,
    Callvirt,
    Calli,
    Newobj,
    Ldftn,
    Ldvirtftn,
    // Object model.
    Newarr,
    Box,
    Unbox,
    UnboxAny,
    Castclass,
    Isinst,
    Initobj,
    Sizeof,
    Ldlen,
    Ldelem,
    Stelem,
    // Fields.
    Ldfld,
    Ldflda,
    Ldsfld,
    Ldsflda,
    Stfld,
    Stsfld,
    // Branches.
    Br,
    Brtrue,
    Brfalse,
    Beq,
    Bge,
    Bgt,
    Ble,
    Blt,
    BneUn,
    BgeUn,
    BgtUn,
    BleUn,
    BltUn,
    Switch,
    Leave,
    // Terminators.
    Ret,
    Throw,
    Rethrow,
    Endfinally,
    Endfilter,
}

/// How control leaves an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Falls through to the next operation.
    Normal,
    /// Always transfers to the operand target. Covers `br` and `leave`.
    Branch,
    /// Transfers to the operand target or falls through.
    ConditionalBranch,
    /// Transfers to one of the operand targets or falls through.
    Switch,
    /// Leaves the method.
    Return,
    /// Raises an exception. Covers `throw` and `rethrow`.
    Throw,
    /// Ends a finally, fault, or filter region.
    EndRegion,
}

impl OpCode {
    /// Returns how control leaves an operation with this opcode.
    #[must_use]
    pub fn flow_type(self) -> FlowType {
        match self {
            Self::Br | Self::Leave => FlowType::Branch,
            Self::Brtrue
            | Self::Brfalse
            | Self::Beq
            | Self::Bge
            | Self::Bgt
            | Self::Ble
            | Self::Blt
            | Self::BneUn
            | Self::BgeUn
            | Self::BgtUn
            | Self::BleUn
            | Self::BltUn => FlowType::ConditionalBranch,
            Self::Switch => FlowType::Switch,
            Self::Ret => FlowType::Return,
            Self::Throw | Self::Rethrow => FlowType::Throw,
            Self::Endfinally | Self::Endfilter => FlowType::EndRegion,
            _ => FlowType::Normal,
        }
    }

    /// Whether this opcode transfers control through an explicit target.
    #[must_use]
    pub fn is_branch(self) -> bool {
        matches!(
            self.flow_type(),
            FlowType::Branch | FlowType::ConditionalBranch | FlowType::Switch
        )
    }

    /// Whether execution can continue at the next operation.
    #[must_use]
    pub fn falls_through(self) -> bool {
        matches!(
            self.flow_type(),
            FlowType::Normal | FlowType::ConditionalBranch | FlowType::Switch
        )
    }

    /// Encoded length of the opcode itself: two bytes for `0xFE`-prefixed
    /// opcodes, one otherwise.
    #[must_use]
    pub fn encoded_len(self) -> u32 {
        match self {
            Self::Ceq
            | Self::Cgt
            | Self::Clt
            | Self::Ldftn
            | Self::Ldvirtftn
            | Self::Ldarg
            | Self::Ldarga
            | Self::Starg
            | Self::Ldloc
            | Self::Ldloca
            | Self::Stloc
            | Self::Endfilter
            | Self::Initobj
            | Self::Rethrow
            | Self::Sizeof => 2,
            _ => 1,
        }
    }
}

/// The inline operand of an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand.
    None,
    /// Absolute byte offset of a branch target within the body.
    Target(u32),
    /// Jump table of absolute byte offsets.
    Switch(Vec<u32>),
    /// A method reference token.
    Method(MethodRefId),
    /// A field reference token.
    Field(FieldRefId),
    /// A type reference token.
    Type(TypeRefId),
    /// A local variable index.
    Local(u16),
    /// A parameter index. Index 0 is the receiver for instance methods.
    Param(u16),
    /// An inline 32-bit integer.
    I32(i32),
    /// An inline 64-bit integer.
    I64(i64),
    /// An inline 32-bit float.
    F32(f32),
    /// An inline 64-bit float.
    F64(f64),
    /// An inline string literal.
    String(String),
}

impl Operand {
    /// Encoded length of the operand in bytes, long forms only.
    #[must_use]
    pub fn encoded_len(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::Local(_) | Self::Param(_) => 2,
            Self::Target(_)
            | Self::Method(_)
            | Self::Field(_)
            | Self::Type(_)
            | Self::I32(_)
            | Self::F32(_)
            | Self::String(_) => 4,
            Self::Switch(targets) => 4 + 4 * targets.len() as u32,
            Self::I64(_) | Self::F64(_) => 8,
        }
    }
}

/// One operation in a method body: an offset, an opcode, and its operand.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// Byte offset of this operation from the start of the body.
    pub offset: u32,
    /// The opcode.
    pub opcode: OpCode,
    /// The inline operand, [`Operand::None`] when the opcode takes none.
    pub operand: Operand,
}

impl Operation {
    /// Creates an operation. Offsets are assigned by the body builder.
    #[must_use]
    pub fn new(opcode: OpCode, operand: Operand) -> Self {
        Self {
            offset: 0,
            opcode,
            operand,
        }
    }

    /// Total encoded length: opcode bytes plus operand bytes.
    #[must_use]
    pub fn encoded_len(&self) -> u32 {
        self.opcode.encoded_len() + self.operand.encoded_len()
    }

    /// Explicit branch targets of this operation, empty for non-branches.
    #[must_use]
    pub fn branch_targets(&self) -> Vec<u32> {
        match &self.operand {
            Operand::Target(target) if self.opcode.is_branch() => vec![*target],
            Operand::Switch(targets) => targets.clone(),
            _ => Vec::new(),
        }
    }
}
