//! Provenance for analysis facts.
//!
//! The fixpoint records a human-readable reason every time it reaches a
//! method or marks a type constructed, so a surprising line in a report can
//! be traced back to the dispatch, allocation, or root that caused it. A
//! fact discovered along several paths accumulates one reason per path.

use std::collections::{BTreeMap, BTreeSet};

use crate::metadata::{MethodId, TypeId};

/// Why each method was reached and each type was constructed.
#[derive(Debug, Clone, Default)]
pub struct AnalysisReasons {
    methods: BTreeMap<MethodId, BTreeSet<String>>,
    constructions: BTreeMap<TypeId, BTreeSet<String>>,
}

impl AnalysisReasons {
    pub(crate) fn note_method_reached(&mut self, method: MethodId, reason: String) {
        self.methods.entry(method).or_default().insert(reason);
    }

    pub(crate) fn note_type_constructed(&mut self, ty: TypeId, reason: String) {
        self.constructions.entry(ty).or_default().insert(reason);
    }

    /// The recorded reasons `method` was reached.
    pub fn method_reached(&self, method: MethodId) -> impl Iterator<Item = &str> {
        self.methods
            .get(&method)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// The recorded reasons `ty` was constructed.
    pub fn type_constructed(&self, ty: TypeId) -> impl Iterator<Item = &str> {
        self.constructions
            .get(&ty)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }
}
