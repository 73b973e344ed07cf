//! Method bodies: the operation stream, local slots, and exception regions.

use super::opcodes::Operation;
use super::types::{TypeId, TypeRefId};

/// What kind of handler an exception region installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum HandlerKind {
    /// Catches exceptions of a stated type.
    Catch,
    /// Catches exceptions accepted by a filter block.
    Filter,
    /// Runs on every exit from the protected range.
    Finally,
    /// Runs only on exceptional exit from the protected range.
    Fault,
}

/// One exception region of a method body.
///
/// All ranges are half-open byte offset intervals `[start, end)`. For a
/// [`HandlerKind::Filter`] region the filter block spans
/// `[filter_start, handler_start)` and the handler proper starts at
/// `handler_start`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionRegion {
    /// Handler kind.
    pub kind: HandlerKind,
    /// Start of the protected range.
    pub try_start: u32,
    /// End of the protected range, exclusive.
    pub try_end: u32,
    /// Start of the handler block.
    pub handler_start: u32,
    /// End of the handler block, exclusive.
    pub handler_end: u32,
    /// Start of the filter block, for [`HandlerKind::Filter`] regions only.
    pub filter_start: Option<u32>,
    /// Exception type caught, for [`HandlerKind::Catch`] regions only.
    pub catch_type: Option<TypeRefId>,
}

/// The body of a method: operations plus the metadata needed to re-emit it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MethodBody {
    /// Operation stream in offset order.
    pub operations: Vec<Operation>,
    /// Exception regions, innermost first.
    pub exception_regions: Vec<ExceptionRegion>,
    /// Declared maximum evaluation stack depth.
    pub max_stack: u16,
    /// Declared types of the local variable slots.
    pub locals: Vec<TypeId>,
    /// Whether locals are zero-initialized on entry.
    pub zero_init: bool,
}

impl MethodBody {
    /// Whether any operation of the body lies inside an exception region.
    #[must_use]
    pub fn has_exception_regions(&self) -> bool {
        !self.exception_regions.is_empty()
    }

    /// Byte offset one past the last operation.
    #[must_use]
    pub fn code_len(&self) -> u32 {
        self.operations
            .last()
            .map_or(0, |op| op.offset + op.encoded_len())
    }
}
