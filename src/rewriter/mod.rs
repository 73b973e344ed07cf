//! Method-body rewriting.
//!
//! A rewrite is a single forward replay of a body's operation stream into a
//! fresh [`BodyAssembler`]. Branch targets travel as opaque [`Label`]s so
//! that hooks may inject, drop, or reorder operations without breaking
//! control flow; exception regions are rebuilt from begin/end events fired at
//! their recorded boundary offsets. Hooks that override nothing produce a
//! byte-identical copy, which is the round-trip law the tests pin down.
//!
//! The boundary scan happens once, up front, in [`OffsetLabelMap::build`];
//! the map never changes during the replay. A branch operand whose target was
//! not recorded there is malformed input and rewriting fails.

mod assembler;
mod body_rewriter;
mod labels;

pub use assembler::{BodyAssembler, Label};
pub use body_rewriter::{IdentityHooks, MethodBodyRewriter, RewriteHooks};
pub use labels::OffsetLabelMap;
