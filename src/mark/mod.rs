//! The mark phase: reachability roots, the analysis fixpoint, and the
//! per-assembly verdicts.

mod reasons;
mod report;
mod rta;

pub use reasons::AnalysisReasons;
pub use report::AssemblyReport;
pub use rta::{AnalysisOptions, AnalysisResults, RapidTypeAnalysis};

use std::collections::BTreeSet;

use crate::metadata::{MethodId, WholeProgram};

/// A source of root methods for the analysis.
pub trait EntryPointDetector {
    /// The methods assumed callable from outside the analyzed world.
    fn entry_points(&self, program: &WholeProgram) -> BTreeSet<MethodId>;
}

/// Roots the analysis at the managed entry point of every root assembly.
#[derive(Debug, Default)]
pub struct RootAssembliesEntryPointDetector;

impl EntryPointDetector for RootAssembliesEntryPointDetector {
    fn entry_points(&self, program: &WholeProgram) -> BTreeSet<MethodId> {
        program
            .assemblies()
            .filter(|(_, a)| a.root)
            .filter_map(|(_, a)| a.entry_point)
            .collect()
    }
}
