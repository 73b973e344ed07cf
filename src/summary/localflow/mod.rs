//! Flow-sensitive summarization over basic blocks.
//!
//! Built as a small dataflow toolkit: a control flow graph, a worklist
//! fixpoint generic over a [`worklist::BlockInterpreter`], and two concrete
//! interpreters layered on it. Any failure along the way, from a malformed
//! body to a state shape mismatch, surfaces as [`crate::Error::Analysis`];
//! the mark phase reacts by falling back to the flow-insensitive bytecode
//! summarizer, so local flow is strictly an opportunistic refinement.

mod cfg;
mod state;
mod summarizers;
mod worklist;

pub use summarizers::{ReachabilityFlowSummarizer, TypesFlowSummarizer};
