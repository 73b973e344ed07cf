//! # cilgc Prelude
//!
//! This module provides a convenient prelude for the most commonly used types
//! and traits from the cilgc library. Import this module to get quick access
//! to the essential types for reachability analysis and body rewriting.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all cilgc operations
pub use crate::Error;

/// The result type used throughout cilgc
pub use crate::Result;

// ================================================================================================
// Program Model
// ================================================================================================

/// Builder for assembling a closed-world program model
pub use crate::metadata::ProgramBuilder;

/// The immutable program model all analyses run against
pub use crate::metadata::WholeProgram;

/// Identifiers into the program model's arenas
pub use crate::metadata::{AssemblyId, FieldId, MethodId, TypeId};

/// Definition flag sets and visibility
pub use crate::metadata::{MethodFlags, TypeFlags, Visibility};

/// The normalized operation stream
pub use crate::metadata::{MethodBody, OpCode, Operand, Operation};

// ================================================================================================
// Summarization
// ================================================================================================

/// The summarizer contract every strategy implements
pub use crate::summary::MethodSummarizer;

/// What one method contributes to reachability
pub use crate::summary::ReachabilitySummary;

/// The built-in summarization strategies
pub use crate::summary::{
    BytecodeSummarizer, ReachabilityFlowSummarizer, ScriptSummarizer, TypesFlowSummarizer,
};

// ================================================================================================
// Whole-Program Analysis
// ================================================================================================

/// The whole-program fixpoint driver and its results
pub use crate::mark::{AnalysisOptions, AnalysisReasons, AnalysisResults, RapidTypeAnalysis};

/// Root discovery and per-assembly output
pub use crate::mark::{AssemblyReport, EntryPointDetector, RootAssembliesEntryPointDetector};

// ================================================================================================
// Body Rewriting
// ================================================================================================

/// The rewrite driver and its hook surface
pub use crate::rewriter::{BodyAssembler, IdentityHooks, Label, MethodBodyRewriter, RewriteHooks};
