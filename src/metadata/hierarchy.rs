//! Subtype edges of the whole program, inverted from the base-class and
//! interface lists on each type.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use super::program::WholeProgram;
use super::types::TypeId;

/// The class hierarchy as a map from a type to its direct subtypes.
///
/// A "direct subtype" of `T` is any type whose base class is `T` or that
/// directly implements interface `T`. Sets are ordered so traversal order is
/// deterministic across runs.
#[derive(Debug, Default)]
pub struct ClassHierarchy {
    direct_subtypes: BTreeMap<TypeId, BTreeSet<TypeId>>,
}

impl ClassHierarchy {
    /// Inverts the supertype edges of every type in `program`.
    #[must_use]
    pub fn build(program: &WholeProgram) -> Self {
        let mut direct_subtypes: BTreeMap<TypeId, BTreeSet<TypeId>> = BTreeMap::new();
        for (id, def) in program.types() {
            if let Some(base) = def.base {
                direct_subtypes.entry(base).or_default().insert(id);
            }
            for &iface in &def.interfaces {
                direct_subtypes.entry(iface).or_default().insert(id);
            }
        }
        Self { direct_subtypes }
    }

    /// Direct subtypes of `ty`.
    pub fn direct_subtypes(&self, ty: TypeId) -> impl Iterator<Item = TypeId> + '_ {
        self.direct_subtypes
            .get(&ty)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// All transitive subtypes of `ty`, not including `ty` itself.
    #[must_use]
    pub fn all_subtypes(&self, ty: TypeId) -> BTreeSet<TypeId> {
        let mut seen = BTreeSet::new();
        let mut pending: VecDeque<TypeId> = self.direct_subtypes(ty).collect();
        while let Some(next) = pending.pop_front() {
            if seen.insert(next) {
                pending.extend(self.direct_subtypes(next));
            }
        }
        seen
    }
}
