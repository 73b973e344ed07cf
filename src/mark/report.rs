//! Per-assembly partition of the analysis results.
//!
//! Each definition in an assembly lands on exactly one side of the
//! reachable/unreachable split, which is what a sweep tool consumes. Reports
//! for independent assemblies are computed in parallel.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::Path;

use rayon::prelude::*;

use crate::mark::AnalysisResults;
use crate::metadata::{AssemblyId, FieldId, MethodId, TypeId, WholeProgram};
use crate::Result;

/// The reachable/unreachable partition of one assembly's definitions.
#[derive(Debug)]
pub struct AssemblyReport {
    /// The assembly this report covers.
    pub assembly: AssemblyId,
    /// Types found used.
    pub reachable_types: BTreeSet<TypeId>,
    /// Types never used.
    pub unreachable_types: BTreeSet<TypeId>,
    /// Fields found accessed.
    pub reachable_fields: BTreeSet<FieldId>,
    /// Fields never accessed.
    pub unreachable_fields: BTreeSet<FieldId>,
    /// Non-abstract methods found reachable.
    pub reachable_methods: BTreeSet<MethodId>,
    /// Non-abstract methods never reached.
    pub unreachable_methods: BTreeSet<MethodId>,
    /// Why each reachable method was reached, from the analysis' provenance
    /// ledger.
    pub method_reasons: BTreeMap<MethodId, Vec<String>>,
}

impl AssemblyReport {
    /// Partitions the definitions of `assembly` against `results`.
    #[must_use]
    pub fn from_results(
        program: &WholeProgram,
        assembly: AssemblyId,
        results: &AnalysisResults,
    ) -> Self {
        let mut report = Self {
            assembly,
            reachable_types: BTreeSet::new(),
            unreachable_types: BTreeSet::new(),
            reachable_fields: BTreeSet::new(),
            unreachable_fields: BTreeSet::new(),
            reachable_methods: BTreeSet::new(),
            unreachable_methods: BTreeSet::new(),
            method_reasons: BTreeMap::new(),
        };

        for (ty, def) in program.types() {
            if def.assembly != assembly {
                continue;
            }
            if results.type_is_reachable(ty) {
                report.reachable_types.insert(ty);
            } else {
                report.unreachable_types.insert(ty);
            }
            if def.is_interface() {
                continue;
            }
            for &field in &def.fields {
                if results.field_is_reachable(field) {
                    report.reachable_fields.insert(field);
                } else {
                    report.unreachable_fields.insert(field);
                }
            }
            for &method in &def.methods {
                if program.method(method).is_abstract() {
                    continue;
                }
                if results.method_is_reachable(method) {
                    report.reachable_methods.insert(method);
                    let reasons: Vec<String> = results
                        .reasons
                        .method_reached(method)
                        .map(str::to_string)
                        .collect();
                    if !reasons.is_empty() {
                        report.method_reasons.insert(method, reasons);
                    }
                } else {
                    report.unreachable_methods.insert(method);
                }
            }
        }

        report
    }

    /// Builds one report per assembly, in parallel.
    #[must_use]
    pub fn for_program(program: &WholeProgram, results: &AnalysisResults) -> Vec<Self> {
        let assemblies: Vec<AssemblyId> = program.assemblies().map(|(id, _)| id).collect();
        assemblies
            .into_par_iter()
            .map(|assembly| Self::from_results(program, assembly, results))
            .collect()
    }

    /// Writes the partition files and the method provenance file under
    /// `<directory>/<assembly>.report/`.
    pub fn write_to_directory(&self, program: &WholeProgram, directory: &Path) -> Result<()> {
        let assembly_dir =
            directory.join(format!("{}.report", program.assembly(self.assembly).name));
        fs::create_dir_all(&assembly_dir)?;

        let type_name = |&id: &TypeId| program.type_def(id).full_name();
        write_set(&assembly_dir, "ReachableTypes.txt", &self.reachable_types, type_name)?;
        write_set(&assembly_dir, "UnusedTypes.txt", &self.unreachable_types, type_name)?;
        write_set(&assembly_dir, "ReachableMethods.txt", &self.reachable_methods, |&id| {
            program.method_display(id)
        })?;
        write_set(&assembly_dir, "UnusedMethods.txt", &self.unreachable_methods, |&id| {
            program.method_display(id)
        })?;
        write_set(&assembly_dir, "ReachableFields.txt", &self.reachable_fields, |&id| {
            program.field_display(id)
        })?;
        write_set(&assembly_dir, "UnusedFields.txt", &self.unreachable_fields, |&id| {
            program.field_display(id)
        })?;

        let mut reasons_file = fs::File::create(assembly_dir.join("MethodReasons.txt"))?;
        for (&method, reasons) in &self.method_reasons {
            for reason in reasons {
                writeln!(reasons_file, "{}: {reason}", program.method_display(method))?;
            }
        }
        Ok(())
    }
}

fn write_set<T>(
    directory: &Path,
    file_name: &str,
    set: &BTreeSet<T>,
    mut display: impl FnMut(&T) -> String,
) -> Result<()> {
    let mut file = fs::File::create(directory.join(file_name))?;
    for item in set {
        writeln!(file, "{}", display(item))?;
    }
    Ok(())
}
