//! The Rapid Type Analysis fixpoint.
//!
//! Methods are pulled from a worklist and summarized; summary effects feed
//! the state sets, which in turn put more methods on the worklist. Virtual
//! dispatch is demand-driven: a virtual call contributes an implementation
//! only once some constructible subtype of the receiver is known to be
//! constructed, and a construction re-checks every demanded virtual against
//! the new type. The fixpoint is the least one because every state change is
//! a set insertion.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use log::{debug, warn};

use crate::mark::AnalysisReasons;
use crate::metadata::{
    FieldId, GenericParamId, MethodId, Reference, TypeId, WholeProgram,
};
use crate::summary::{
    BytecodeSummarizer, MethodSummarizer, ReachabilitySummary, TypesFlowSummarizer,
};
use crate::{Error, Result};

/// Which virtual methods have been dispatched against, and the runtime
/// targets discovered for each so far.
#[derive(Debug, Default)]
struct VirtualDispatchDemand {
    targets_by_dispatch: BTreeMap<MethodId, BTreeSet<MethodId>>,
}

impl VirtualDispatchDemand {
    fn in_demand(&self, method: MethodId) -> bool {
        self.targets_by_dispatch.contains_key(&method)
    }

    fn note_in_demand(&mut self, method: MethodId) {
        self.targets_by_dispatch.entry(method).or_default();
    }

    /// Records that `dispatch` may reach `target`. True when this pairing is
    /// new.
    fn note_target(&mut self, dispatch: MethodId, target: MethodId) -> bool {
        self.targets_by_dispatch
            .entry(dispatch)
            .or_default()
            .insert(target)
    }
}

/// Tuning knobs for the analysis.
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// Try the flow-sensitive summarizer before the plain bytecode scan.
    pub use_local_flow: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            use_local_flow: true,
        }
    }
}

/// Whole-program reachability via Rapid Type Analysis.
pub struct RapidTypeAnalysis<'p> {
    program: &'p WholeProgram,
    options: AnalysisOptions,

    reachable_methods: BTreeSet<MethodId>,
    nonvirtual_dispatches: BTreeSet<MethodId>,
    demand: VirtualDispatchDemand,
    reachable_fields: BTreeSet<FieldId>,
    reachable_types: BTreeSet<TypeId>,
    constructed_types: BTreeSet<TypeId>,
    constructed_type_parameters: BTreeSet<GenericParamId>,
    unresolved_references: BTreeSet<Reference>,
    methods_requiring_reflection_summary: BTreeSet<MethodId>,
    reasons: AnalysisReasons,

    worklist: VecDeque<MethodId>,

    bytecode: BytecodeSummarizer,
    local_flow: TypesFlowSummarizer,
    /// Summarizers that override or augment bytecode results for individual
    /// methods, typically loaded from a script.
    reflection_summarizers: Vec<Box<dyn MethodSummarizer>>,
}

impl<'p> RapidTypeAnalysis<'p> {
    /// Creates an analysis over `program`.
    #[must_use]
    pub fn new(program: &'p WholeProgram, options: AnalysisOptions) -> Self {
        Self {
            program,
            options,
            reachable_methods: BTreeSet::new(),
            nonvirtual_dispatches: BTreeSet::new(),
            demand: VirtualDispatchDemand::default(),
            reachable_fields: BTreeSet::new(),
            reachable_types: BTreeSet::new(),
            constructed_types: BTreeSet::new(),
            constructed_type_parameters: BTreeSet::new(),
            unresolved_references: BTreeSet::new(),
            methods_requiring_reflection_summary: BTreeSet::new(),
            reasons: AnalysisReasons::default(),
            worklist: VecDeque::new(),
            bytecode: BytecodeSummarizer::new(),
            local_flow: TypesFlowSummarizer::new(),
            reflection_summarizers: Vec::new(),
        }
    }

    /// Adds a summarizer consulted for every reachable method, in addition to
    /// the bytecode analysis.
    pub fn add_reflection_summarizer(&mut self, summarizer: Box<dyn MethodSummarizer>) {
        self.reflection_summarizers.push(summarizer);
    }

    /// Runs the analysis to its fixpoint from the given root methods.
    pub fn run(mut self, roots: &[MethodId]) -> Result<AnalysisResults> {
        for &root in roots {
            self.reasons
                .note_method_reached(root, "analysis entry point".into());
            self.note_nonvirtual_method_reached(root);

            // A constructor as an entry point means its type is constructed.
            let def = self.program.method(root);
            if def.is_constructor() && self.program.is_constructable(def.declaring_type) {
                let constructed = def.declaring_type;
                self.reasons
                    .note_type_constructed(constructed, "entry point is a constructor".into());
                self.construction_found(constructed);
            }
        }

        while let Some(method) = self.worklist.pop_front() {
            if self.program.method(method).is_external() {
                continue;
            }

            let bytecode_summary = self.best_summary(method)?;
            self.process_summary(&bytecode_summary, method);

            let mut got_reflection_summary = false;
            for i in 0..self.reflection_summarizers.len() {
                if !self.reflection_summarizers[i].can_summarize(self.program, method) {
                    continue;
                }
                let summary = self.reflection_summarizers[i].summarize(self.program, method)?;
                self.process_summary(&summary, method);
                got_reflection_summary = true;
            }

            if !got_reflection_summary
                && self.reflection_summary_probably_needed(method, &bytecode_summary)
            {
                self.methods_requiring_reflection_summary.insert(method);
            }
        }

        Ok(AnalysisResults {
            reachable_methods: self.reachable_methods,
            reachable_fields: self.reachable_fields,
            reachable_types: self.reachable_types,
            constructed_types: self.constructed_types,
            constructed_type_parameters: self.constructed_type_parameters,
            unresolved_references: self.unresolved_references,
            methods_requiring_reflection_summary: self.methods_requiring_reflection_summary,
            reasons: self.reasons,
        })
    }

    /// Picks the most precise summary available for `method`. A local-flow
    /// failure is not fatal; the bytecode scan always applies.
    fn best_summary(&self, method: MethodId) -> Result<ReachabilitySummary> {
        if self.options.use_local_flow && self.local_flow.can_summarize(self.program, method) {
            match self.local_flow.summarize(self.program, method) {
                Ok(summary) => return Ok(summary),
                Err(Error::Analysis(message)) => {
                    warn!(
                        "local flow failed for {}, falling back to bytecode scan: {message}",
                        self.program.method_display(method)
                    );
                }
                Err(other) => return Err(other),
            }
        }
        self.bytecode.summarize(self.program, method)
    }

    fn process_summary(&mut self, summary: &ReachabilitySummary, summarized: MethodId) {
        let source = self.program.method_display(summarized);
        for &called in &summary.nonvirtually_called_methods {
            self.reasons
                .note_method_reached(called, format!("called directly from {source}"));
            if self.nonvirtual_dispatches.insert(called) {
                self.note_nonvirtual_method_reached(called);
            }
        }
        for &dispatched in &summary.virtually_called_methods {
            self.note_virtual_dispatch(dispatched);
        }
        for &ty in &summary.reachable_types {
            self.type_use_found(ty);
        }
        for &ty in &summary.constructed_types {
            if self.program.is_constructable(ty) {
                self.reasons
                    .note_type_constructed(ty, format!("allocated in {source}"));
                self.construction_found(ty);
            } else {
                debug!(
                    "ignoring construction of non-constructable type {}",
                    self.program.type_def(ty).full_name()
                );
            }
        }
        self.reachable_fields.extend(&summary.reachable_fields);
        self.constructed_type_parameters
            .extend(&summary.constructed_type_parameters);
        self.unresolved_references
            .extend(&summary.unresolved_references);
    }

    /// A method reached without dispatch: its declaring type is used and the
    /// method itself needs summarization.
    fn note_nonvirtual_method_reached(&mut self, method: MethodId) {
        self.type_use_found(self.program.method(method).declaring_type);
        self.add_to_worklist(method);
    }

    fn add_to_worklist(&mut self, method: MethodId) {
        if self.reachable_methods.insert(method) {
            self.worklist.push_back(method);
        }
    }

    /// A type is used: so are all its base classes, and its initializer may
    /// run.
    fn type_use_found(&mut self, ty: TypeId) {
        if self.reachable_types.contains(&ty) {
            return;
        }
        if let Some(base) = self.program.type_def(ty).base {
            self.type_use_found(base);
        }
        self.reachable_types.insert(ty);

        if let Some(cctor) = self.program.static_constructor(ty) {
            self.reasons.note_method_reached(
                cctor,
                format!("type initializer of used type {}", self.program.type_def(ty).full_name()),
            );
            self.add_to_worklist(cctor);
        }
    }

    /// A type is constructed: every virtual already in demand anywhere on its
    /// supertype chain now has an implementation to account for, and its
    /// finalizer may run.
    fn construction_found(&mut self, ty: TypeId) {
        if !self.constructed_types.insert(ty) {
            return;
        }

        let mut chain = vec![ty];
        chain.extend(self.program.all_supertypes(ty));
        for super_ty in chain {
            for method in self.program.type_def(super_ty).methods.clone() {
                if self.program.method(method).is_virtual() && self.demand.in_demand(method) {
                    self.dispatch_to_implementation(method, ty);
                }
            }
        }

        if let Some(finalizer) = self
            .program
            .implements_instantiated(ty, self.program.object_finalize())
        {
            self.reasons.note_method_reached(
                finalizer,
                format!("finalizer of constructed type {}", self.program.type_def(ty).full_name()),
            );
            self.add_to_worklist(finalizer);
        }
    }

    /// First dispatch against `dispatched`: expand it over every subtype of
    /// its declaring type that is already known constructed. Later
    /// constructions pick up the demand in [`Self::construction_found`].
    fn note_virtual_dispatch(&mut self, dispatched: MethodId) {
        if self.demand.in_demand(dispatched) {
            return;
        }
        self.demand.note_in_demand(dispatched);

        let declaring = self.program.method(dispatched).declaring_type;
        self.type_use_found(declaring);

        let mut subtypes = vec![declaring];
        subtypes.extend(self.program.hierarchy().all_subtypes(declaring));
        for subtype in subtypes {
            if !self.program.is_constructable(subtype) {
                continue;
            }
            // Value types dispatch without an observable construction site,
            // so they count as constructed unconditionally.
            if self.program.type_def(subtype).is_value_type()
                || self.constructed_types.contains(&subtype)
            {
                self.dispatch_to_implementation(dispatched, subtype);
            }
        }
    }

    /// Resolves the implementation `runtime_type` provides for `dispatched`
    /// and marks it reachable through the dispatch table.
    fn dispatch_to_implementation(&mut self, dispatched: MethodId, runtime_type: TypeId) {
        let Some(implementation) = self
            .program
            .implements_instantiated(runtime_type, dispatched)
        else {
            warn!(
                "no implementation of {} found for constructed type {}",
                self.program.method_display(dispatched),
                self.program.type_def(runtime_type).full_name()
            );
            return;
        };
        if self.program.method(implementation).is_abstract() {
            return;
        }
        if self.demand.note_target(dispatched, implementation) {
            self.reasons.note_method_reached(
                implementation,
                format!(
                    "dispatch against {} with {} constructed",
                    self.program.method_display(dispatched),
                    self.program.type_def(runtime_type).full_name()
                ),
            );
            self.add_to_worklist(implementation);
        }
    }

    /// Debugging heuristic: a non-system method that calls into reflection
    /// without a script summary is probably under-approximated.
    fn reflection_summary_probably_needed(
        &self,
        method: MethodId,
        summary: &ReachabilitySummary,
    ) -> bool {
        let caller_type = self
            .program
            .type_def(self.program.method(method).declaring_type);
        if caller_type.namespace.starts_with("System") {
            return false;
        }
        summary
            .nonvirtually_called_methods
            .iter()
            .chain(&summary.virtually_called_methods)
            .any(|&called| {
                let ns = &self
                    .program
                    .type_def(self.program.method(called).declaring_type)
                    .namespace;
                let name = &self
                    .program
                    .type_def(self.program.method(called).declaring_type)
                    .name;
                ns.starts_with("System.Reflection")
                    || (ns == "System" && name == "Activator")
                    || ns.starts_with("System.Xml.Serialization")
            })
    }
}

/// Everything the fixpoint learned.
#[derive(Debug, Clone, Default)]
pub struct AnalysisResults {
    /// Methods that may execute.
    pub reachable_methods: BTreeSet<MethodId>,
    /// Fields that may be accessed.
    pub reachable_fields: BTreeSet<FieldId>,
    /// Types that are used, constructed or not.
    pub reachable_types: BTreeSet<TypeId>,
    /// Types that may be instantiated.
    pub constructed_types: BTreeSet<TypeId>,
    /// Type variables observed under `new T()`.
    pub constructed_type_parameters: BTreeSet<GenericParamId>,
    /// References that never resolved during the analysis.
    pub unresolved_references: BTreeSet<Reference>,
    /// Methods that look like they need a hand-written reflection summary.
    pub methods_requiring_reflection_summary: BTreeSet<MethodId>,
    /// Why each fact above holds, one textual reason per discovery path.
    pub reasons: AnalysisReasons,
}

impl AnalysisResults {
    /// Whether `method` was found reachable.
    #[must_use]
    pub fn method_is_reachable(&self, method: MethodId) -> bool {
        self.reachable_methods.contains(&method)
    }

    /// Whether `field` was found reachable.
    #[must_use]
    pub fn field_is_reachable(&self, field: FieldId) -> bool {
        self.reachable_fields.contains(&field)
    }

    /// Whether `ty` was found used.
    #[must_use]
    pub fn type_is_reachable(&self, ty: TypeId) -> bool {
        self.reachable_types.contains(&ty)
    }

    /// Whether `ty` was found constructed.
    #[must_use]
    pub fn type_is_constructed(&self, ty: TypeId) -> bool {
        self.constructed_types.contains(&ty)
    }
}
