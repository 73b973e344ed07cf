// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]

//! # cilgc
//!
//! Whole-program reachability analysis for managed CIL bytecode, built in
//! pure Rust. Given a closed-world program model, `cilgc` computes the
//! transitive closure of reachable methods, fields, and constructed types
//! under Rapid Type Analysis, with demand-driven virtual dispatch resolution
//! across the class hierarchy. A companion method-body rewriter replays
//! instruction streams through overridable hooks for instrumentation tools
//! built on the same program model.
//!
//! ## Features
//!
//! - **Rapid Type Analysis** - virtual call sites expand only over types the
//!   program actually constructs, in either discovery order
//! - **Pluggable summarization** - a plain bytecode scan, two flow-sensitive
//!   local analyses, and a text-format script loader all produce the same
//!   [`summary::ReachabilitySummary`] and compose freely
//! - **Call-site tightening** - an intraprocedural type dataflow narrows
//!   monomorphic virtual calls to their concrete targets
//! - **Method-body rewriting** - copy or mutate operation streams with
//!   automatic branch relocation and exception-region reconstruction
//! - **Deterministic output** - ordered sets everywhere; two runs over the
//!   same program produce identical results
//!
//! ## Quick Start
//!
//! ```rust
//! use cilgc::mark::{AnalysisOptions, RapidTypeAnalysis};
//! use cilgc::metadata::{MethodFlags, ProgramBuilder, Visibility};
//!
//! let mut builder = ProgramBuilder::new();
//! let app = builder.add_assembly("App", true);
//! let program_type = builder.add_class(app, "App", "Program");
//! let main = builder.add_method(
//!     program_type,
//!     "Main",
//!     MethodFlags::STATIC,
//!     Visibility::Public,
//!     Vec::new(),
//! );
//! builder.set_entry_point(app, main);
//! let program = builder.finish();
//!
//! let analysis = RapidTypeAnalysis::new(&program, AnalysisOptions::default());
//! let results = analysis.run(&[main])?;
//! assert!(results.method_is_reachable(main));
//! # Ok::<(), cilgc::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`metadata`] - the program model: assemblies, types, methods, fields,
//!   bodies, and the normalized operation stream
//! - [`summary`] - per-method summarizers, each reporting what one method
//!   contributes to reachability
//! - [`mark`] - the whole-program fixpoint driver and per-assembly reports
//! - [`rewriter`] - the instruction-stream copier/mutator

mod error;

/// Common imports for working with `cilgc`.
///
/// This module provides a curated selection of the most frequently used types
/// from across the library, allowing for convenient glob imports.
///
/// # Example
///
/// ```rust
/// use cilgc::prelude::*;
///
/// let program = ProgramBuilder::new().finish();
/// assert!(program.types().count() > 0);
/// ```
pub mod prelude;

/// The program model the analyses run against.
///
/// Everything the analyses consume lives here: assembly, type, method, and
/// field definitions, reference tables, method bodies with their normalized
/// operation streams and exception regions, and the class hierarchy index.
/// [`metadata::ProgramBuilder`] assembles a model; [`metadata::WholeProgram`]
/// is the immutable result.
pub mod metadata;

/// Per-method reachability summarization.
///
/// Every summarizer implements [`summary::MethodSummarizer`] and produces a
/// [`summary::ReachabilitySummary`]. The plain
/// [`summary::BytecodeSummarizer`] scans every operation of a body; the
/// analyses in [`summary::localflow`] run an intraprocedural dataflow first
/// and summarize more precisely; [`summary::ScriptSummarizer`] loads
/// hand-written summaries from a text file for methods the analyses cannot
/// see through, reflection being the usual culprit.
pub mod summary;

/// The mark phase: the whole-program analysis and its outputs.
///
/// [`mark::RapidTypeAnalysis`] drives per-method summarization to a fixpoint
/// over a worklist, expanding virtual call sites on demand as constructed
/// types are discovered. [`mark::AssemblyReport`] partitions each assembly's
/// definitions into reachable and unreachable sets.
pub mod mark;

/// Method-body rewriting for instrumentation.
///
/// [`rewriter::MethodBodyRewriter`] replays a body through
/// [`rewriter::RewriteHooks`] into a [`rewriter::BodyAssembler`], relocating
/// branch targets and rebuilding exception regions around whatever the hooks
/// inject or drop.
pub mod rewriter;

/// `cilgc` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is
/// always [`Error`]. Used consistently throughout the crate for all fallible
/// operations.
pub type Result<T> = std::result::Result<T, Error>;

/// `cilgc` Error type
///
/// The main error type for all operations in this crate: summary-script
/// loading failures, rewriter invariant violations, and local-flow analysis
/// failures (the one variant with a documented recovery path).
pub use error::Error;
