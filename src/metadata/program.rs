//! The whole-program model: arenas of definitions, reference tables, and the
//! query surface the analyses are written against.

use std::sync::OnceLock;

use super::body::MethodBody;
use super::hierarchy::ClassHierarchy;
use super::types::{
    AssemblyDef, AssemblyId, FieldDef, FieldId, FieldRef, FieldRefId, GenericParamDef,
    GenericParamId, MethodDef, MethodId, MethodRef, MethodRefId, TypeDef, TypeId, TypeRef,
    TypeRefId,
};

/// A closed-world snapshot of every assembly under analysis.
///
/// All definitions live in arenas owned here and are addressed by id.
/// The analyses only ever read the model, which is what lets the mark phase
/// summarize methods from multiple threads without locking; instrumentation
/// mutates bodies afterwards through [`Self::method_body_mut`], which takes
/// the whole model exclusively.
#[derive(Debug)]
pub struct WholeProgram {
    pub(crate) assemblies: Vec<AssemblyDef>,
    pub(crate) types: Vec<TypeDef>,
    pub(crate) methods: Vec<MethodDef>,
    pub(crate) fields: Vec<FieldDef>,
    pub(crate) generic_params: Vec<GenericParamDef>,
    pub(crate) method_refs: Vec<MethodRef>,
    pub(crate) field_refs: Vec<FieldRef>,
    pub(crate) type_refs: Vec<TypeRef>,
    pub(crate) system_object: TypeId,
    pub(crate) object_finalize: MethodId,
    pub(crate) hierarchy: OnceLock<ClassHierarchy>,
}

impl WholeProgram {
    /// Looks up an assembly definition.
    #[must_use]
    pub fn assembly(&self, id: AssemblyId) -> &AssemblyDef {
        &self.assemblies[id.index()]
    }

    /// Looks up a type definition.
    #[must_use]
    pub fn type_def(&self, id: TypeId) -> &TypeDef {
        &self.types[id.index()]
    }

    /// Looks up a method definition.
    #[must_use]
    pub fn method(&self, id: MethodId) -> &MethodDef {
        &self.methods[id.index()]
    }

    /// Mutable access to the body of `method`, if it has one.
    ///
    /// This is the rewriter's entry into the model: a pass over an analyzed
    /// program rewrites each body in place through this accessor, once the
    /// mark phase is done with its shared borrows.
    pub fn method_body_mut(&mut self, id: MethodId) -> Option<&mut MethodBody> {
        self.methods[id.index()].body.as_mut()
    }

    /// Looks up a field definition.
    #[must_use]
    pub fn field(&self, id: FieldId) -> &FieldDef {
        &self.fields[id.index()]
    }

    /// Looks up a generic parameter definition.
    #[must_use]
    pub fn generic_param(&self, id: GenericParamId) -> &GenericParamDef {
        &self.generic_params[id.index()]
    }

    /// Looks up an entry in the method reference table.
    #[must_use]
    pub fn method_ref(&self, id: MethodRefId) -> &MethodRef {
        &self.method_refs[id.index()]
    }

    /// Looks up an entry in the field reference table.
    #[must_use]
    pub fn field_ref(&self, id: FieldRefId) -> &FieldRef {
        &self.field_refs[id.index()]
    }

    /// Looks up an entry in the type reference table.
    #[must_use]
    pub fn type_ref(&self, id: TypeRefId) -> &TypeRef {
        &self.type_refs[id.index()]
    }

    /// Iterates all assemblies with their ids.
    pub fn assemblies(&self) -> impl Iterator<Item = (AssemblyId, &AssemblyDef)> {
        self.assemblies
            .iter()
            .enumerate()
            .map(|(i, a)| (AssemblyId(i as u32), a))
    }

    /// Iterates all type definitions with their ids.
    pub fn types(&self) -> impl Iterator<Item = (TypeId, &TypeDef)> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, t)| (TypeId(i as u32), t))
    }

    /// Iterates all method definitions with their ids.
    pub fn methods(&self) -> impl Iterator<Item = (MethodId, &MethodDef)> {
        self.methods
            .iter()
            .enumerate()
            .map(|(i, m)| (MethodId(i as u32), m))
    }

    /// Iterates all field definitions with their ids.
    pub fn fields(&self) -> impl Iterator<Item = (FieldId, &FieldDef)> {
        self.fields
            .iter()
            .enumerate()
            .map(|(i, f)| (FieldId(i as u32), f))
    }

    /// The `System.Object` definition.
    #[must_use]
    pub fn system_object(&self) -> TypeId {
        self.system_object
    }

    /// The `System.Object::Finalize` definition.
    #[must_use]
    pub fn object_finalize(&self) -> MethodId {
        self.object_finalize
    }

    /// The class hierarchy, built on first use.
    pub fn hierarchy(&self) -> &ClassHierarchy {
        self.hierarchy.get_or_init(|| ClassHierarchy::build(self))
    }

    /// Base classes of `ty`, nearest first, not including `ty` itself.
    #[must_use]
    pub fn base_chain(&self, ty: TypeId) -> Vec<TypeId> {
        let mut chain = Vec::new();
        let mut current = self.type_def(ty).base;
        while let Some(base) = current {
            chain.push(base);
            current = self.type_def(base).base;
        }
        chain
    }

    /// All supertypes of `ty`: base classes and implemented interfaces,
    /// transitively, not including `ty` itself.
    #[must_use]
    pub fn all_supertypes(&self, ty: TypeId) -> std::collections::BTreeSet<TypeId> {
        let mut result = std::collections::BTreeSet::new();
        let mut pending = vec![ty];
        while let Some(current) = pending.pop() {
            let def = self.type_def(current);
            for &super_ty in def.base.iter().chain(&def.interfaces) {
                if result.insert(super_ty) {
                    pending.push(super_ty);
                }
            }
        }
        result
    }

    /// Whether `derived` is `ancestor` or reaches it through base classes or
    /// interface implementation.
    #[must_use]
    pub fn derives_from(&self, derived: TypeId, ancestor: TypeId) -> bool {
        if derived == ancestor {
            return true;
        }
        let def = self.type_def(derived);
        if let Some(base) = def.base {
            if self.derives_from(base, ancestor) {
                return true;
            }
        }
        def.interfaces
            .iter()
            .any(|&iface| self.derives_from(iface, ancestor))
    }

    /// The override of virtual method `decl` that an instance of exactly
    /// `runtime_type` would dispatch to.
    ///
    /// Walks `runtime_type` and its base classes nearest first and returns the
    /// first method whose signature matches `decl`. Returns `None` when the
    /// hierarchy provides no implementation, which for well-formed input only
    /// happens when `runtime_type` does not actually derive from the
    /// declaring type.
    #[must_use]
    pub fn implements_instantiated(&self, runtime_type: TypeId, decl: MethodId) -> Option<MethodId> {
        let declared = self.method(decl);
        let mut current = Some(runtime_type);
        while let Some(ty) = current {
            for &m in &self.type_def(ty).methods {
                let candidate = self.method(m);
                if candidate.is_virtual() && candidate.signature_matches(declared) {
                    return Some(m);
                }
            }
            if ty == declared.declaring_type {
                break;
            }
            current = self.type_def(ty).base;
        }
        None
    }

    /// The type initializer of `ty`, if it declares one.
    #[must_use]
    pub fn static_constructor(&self, ty: TypeId) -> Option<MethodId> {
        self.type_def(ty)
            .methods
            .iter()
            .copied()
            .find(|&m| self.method(m).is_static_constructor())
    }

    /// Instance constructors of `ty`.
    #[must_use]
    pub fn constructors(&self, ty: TypeId) -> Vec<MethodId> {
        self.type_def(ty)
            .methods
            .iter()
            .copied()
            .filter(|&m| self.method(m).is_constructor())
            .collect()
    }

    /// Whether instances of `ty` can exist at runtime: not an interface, not
    /// abstract, and not the compiler-generated `<Module>` type.
    #[must_use]
    pub fn is_constructable(&self, ty: TypeId) -> bool {
        let def = self.type_def(ty);
        !def.is_interface() && !def.is_abstract() && def.name != "<Module>"
    }

    /// Whether `method` is `System.Activator::CreateInstance<T>()`.
    #[must_use]
    pub fn is_activator_create_instance(&self, method: MethodId) -> bool {
        let def = self.method(method);
        if def.name != "CreateInstance" || def.generic_params.len() != 1 {
            return false;
        }
        let declaring = self.type_def(def.declaring_type);
        declaring.name == "Activator" && declaring.namespace == "System"
    }

    /// Display path of a method, e.g. `App.Widget::Draw`.
    #[must_use]
    pub fn method_display(&self, id: MethodId) -> String {
        let def = self.method(id);
        format!(
            "{}::{}",
            self.type_def(def.declaring_type).full_name(),
            def.name
        )
    }

    /// Display path of a field, e.g. `App.Widget::count`.
    #[must_use]
    pub fn field_display(&self, id: FieldId) -> String {
        let def = self.field(id);
        format!(
            "{}::{}",
            self.type_def(def.declaring_type).full_name(),
            def.name
        )
    }

    fn in_assembly(&self, assembly: Option<&str>, id: AssemblyId) -> bool {
        match assembly {
            Some(name) => self.assembly(id).name == name,
            None => true,
        }
    }

    /// Methods whose display path matches `specifier`, optionally restricted
    /// to one assembly.
    ///
    /// A specifier matches exactly, or as a namespace suffix: `Widget::Draw`
    /// matches `App.Widget::Draw` but not `BudgetWidget::Draw`.
    #[must_use]
    pub fn methods_named(&self, assembly: Option<&str>, specifier: &str) -> Vec<MethodId> {
        self.methods()
            .filter(|&(id, m)| {
                self.in_assembly(assembly, self.type_def(m.declaring_type).assembly)
                    && path_matches(specifier, &self.method_display(id))
            })
            .map(|(id, _)| id)
            .collect()
    }

    /// Types whose full name matches `specifier`, optionally restricted to
    /// one assembly. Suffix matching as for [`Self::methods_named`].
    #[must_use]
    pub fn types_named(&self, assembly: Option<&str>, specifier: &str) -> Vec<TypeId> {
        self.types()
            .filter(|&(_, t)| {
                self.in_assembly(assembly, t.assembly) && path_matches(specifier, &t.full_name())
            })
            .map(|(id, _)| id)
            .collect()
    }

    /// Fields whose display path matches `specifier`, optionally restricted
    /// to one assembly.
    #[must_use]
    pub fn fields_named(&self, assembly: Option<&str>, specifier: &str) -> Vec<FieldId> {
        self.fields()
            .filter(|&(id, f)| {
                self.in_assembly(assembly, self.type_def(f.declaring_type).assembly)
                    && path_matches(specifier, &self.field_display(id))
            })
            .map(|(id, _)| id)
            .collect()
    }
}

/// Whether `specifier` names `path` exactly or as a suffix starting at a
/// namespace dot.
fn path_matches(specifier: &str, path: &str) -> bool {
    if specifier == path {
        return true;
    }
    path.strip_suffix(specifier)
        .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Matches `pattern` against `text` where `*` matches any run of characters.
///
/// Iterative two-pointer matching with backtracking to the most recent star.
#[must_use]
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern = pattern.as_bytes();
    let text = text.as_bytes();
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == b'*')
}

#[cfg(test)]
mod tests {
    use super::{path_matches, wildcard_match};

    #[test]
    fn wildcard_literal_and_star() {
        assert!(wildcard_match("App.Widget::Draw", "App.Widget::Draw"));
        assert!(wildcard_match("App.*::Draw", "App.Widget::Draw"));
        assert!(wildcard_match("*::Draw", "App.Widget::Draw"));
        assert!(wildcard_match("App.*", "App.Widget::Draw"));
        assert!(wildcard_match("*", "App.Widget::Draw"));
        assert!(!wildcard_match("App.*::Paint", "App.Widget::Draw"));
        assert!(!wildcard_match("Widget::Draw", "App.Widget::Draw"));
    }

    #[test]
    fn path_suffix_respects_dot_boundary() {
        assert!(path_matches("Widget::Draw", "App.Widget::Draw"));
        assert!(path_matches("App.Widget::Draw", "App.Widget::Draw"));
        assert!(!path_matches("idget::Draw", "App.Widget::Draw"));
        assert!(!path_matches("Other.Widget::Draw", "App.Widget::Draw"));
    }
}
