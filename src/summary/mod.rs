//! Method summaries: what one method contributes to reachability.
//!
//! Every summarizer produces a [`ReachabilitySummary`] describing the calls,
//! field accesses, and constructions a method performs. The mark phase never
//! looks at bodies itself; it only unions summaries, so a summary computed by
//! any strategy (bytecode scan, local flow, hand-written script) is
//! interchangeable with any other.

mod bytecode;
pub mod localflow;
mod script;

pub use bytecode::BytecodeSummarizer;
pub(crate) use bytecode::BytecodeVisitor;
pub use localflow::{ReachabilityFlowSummarizer, TypesFlowSummarizer};
pub use script::ScriptSummarizer;

use std::collections::BTreeSet;

use crate::metadata::{FieldId, GenericParamId, MethodId, Reference, TypeId, WholeProgram};
use crate::Result;

/// The reachability effects of one method, as sets of definitions.
///
/// Sets are ordered so that unioning and iteration are deterministic
/// regardless of summarization order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReachabilitySummary {
    /// Methods called with a statically known target (`call`, `newobj`,
    /// `ldftn`, and `callvirt` on non-virtual targets).
    pub nonvirtually_called_methods: BTreeSet<MethodId>,
    /// Virtual methods called through dispatch. These name the declared
    /// target; the mark phase expands them over constructed subtypes.
    pub virtually_called_methods: BTreeSet<MethodId>,
    /// Fields loaded or stored. Loads and stores are not distinguished.
    pub reachable_fields: BTreeSet<FieldId>,
    /// Types used without necessarily being constructed.
    pub reachable_types: BTreeSet<TypeId>,
    /// Types the method constructs instances of.
    pub constructed_types: BTreeSet<TypeId>,
    /// Type variables constructed via `new T()`.
    pub constructed_type_parameters: BTreeSet<GenericParamId>,
    /// References that failed to resolve while summarizing. Recorded for
    /// reporting; the summary is otherwise complete modulo these.
    pub unresolved_references: BTreeSet<Reference>,
}

impl ReachabilitySummary {
    /// An empty summary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Unions `other` into `self`. Idempotent: unioning the same summary
    /// twice changes nothing.
    pub fn union(&mut self, other: &Self) {
        self.nonvirtually_called_methods
            .extend(&other.nonvirtually_called_methods);
        self.virtually_called_methods
            .extend(&other.virtually_called_methods);
        self.reachable_fields.extend(&other.reachable_fields);
        self.reachable_types.extend(&other.reachable_types);
        self.constructed_types.extend(&other.constructed_types);
        self.constructed_type_parameters
            .extend(&other.constructed_type_parameters);
        self.unresolved_references
            .extend(&other.unresolved_references);
    }

    /// Whether the summary records no effects at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nonvirtually_called_methods.is_empty()
            && self.virtually_called_methods.is_empty()
            && self.reachable_fields.is_empty()
            && self.reachable_types.is_empty()
            && self.constructed_types.is_empty()
            && self.constructed_type_parameters.is_empty()
            && self.unresolved_references.is_empty()
    }
}

/// A strategy for computing the [`ReachabilitySummary`] of a method.
///
/// Strategies are consulted in precision order by the mark phase. A strategy
/// first reports whether it can handle a method at all via
/// [`Self::can_summarize`]; a strategy that accepted a method may still fail
/// part way through with [`crate::Error::Analysis`], in which case the caller
/// falls back to the next, more conservative strategy.
pub trait MethodSummarizer {
    /// Cheap structural gate: whether this strategy handles `method`.
    fn can_summarize(&self, program: &WholeProgram, method: MethodId) -> bool;

    /// Computes the summary of `method`.
    fn summarize(&self, program: &WholeProgram, method: MethodId) -> Result<ReachabilitySummary>;
}

#[cfg(test)]
mod tests {
    use super::ReachabilitySummary;
    use crate::metadata::{FieldId, MethodId, TypeId};

    #[test]
    fn union_is_idempotent() {
        let mut a = ReachabilitySummary::new();
        a.nonvirtually_called_methods.insert(MethodId(1));
        a.constructed_types.insert(TypeId(2));

        let mut b = ReachabilitySummary::new();
        b.nonvirtually_called_methods.insert(MethodId(1));
        b.reachable_fields.insert(FieldId(7));

        let mut once = a.clone();
        once.union(&b);
        let mut twice = once.clone();
        twice.union(&b);
        assert_eq!(once, twice);
        assert_eq!(once.nonvirtually_called_methods.len(), 1);
    }

    #[test]
    fn empty_summary_reports_empty() {
        let summary = ReachabilitySummary::new();
        assert!(summary.is_empty());
    }
}
