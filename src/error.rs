use thiserror::Error;

/// The generic Error type, which provides coverage for all errors this library
/// can potentially return.
///
/// Recoverable analysis conditions are deliberately *not* error variants:
/// unresolved references are recorded into a summary's unresolved set, and
/// unsupported method shapes are rejected through `can_summarize` predicates.
/// Only genuinely fatal conditions (malformed summary scripts, malformed input
/// bytecode handed to the rewriter, I/O) and the single sanctioned recovery
/// path ([`Error::Analysis`]) live here.
#[derive(Error, Debug)]
pub enum Error {
    /// A summary script line could not be parsed.
    ///
    /// Carries the 1-based line number and a description so the user can fix
    /// the script. Script errors are always fatal; there is no partial-load
    /// recovery.
    #[error("summary script line {line}: {message}")]
    ScriptParse {
        /// 1-based line number within the script file.
        line: usize,
        /// Description of what could not be parsed.
        message: String,
    },

    /// An identifier in a summary script matched no definition.
    #[error("no definition found for identifier '{identifier}'")]
    IdentifierNotFound {
        /// The `assembly!specifier` identifier as written in the script.
        identifier: String,
    },

    /// An identifier in a summary script matched more than one definition.
    #[error("identifier '{identifier}' is ambiguous ({count} matches)")]
    IdentifierAmbiguous {
        /// The `assembly!specifier` identifier as written in the script.
        identifier: String,
        /// How many definitions matched.
        count: usize,
    },

    /// A `construct attributes` command found an attribute whose constructor
    /// reference never resolved against the program model.
    ///
    /// Left unreported, the command would silently drop the constructions the
    /// script asked for, so this is fatal like every other script failure.
    #[error("attribute constructor '{constructor}' on field '{field}' is unresolved")]
    UnresolvedAttribute {
        /// Display path of the field carrying the attribute.
        field: String,
        /// Display name of the unresolved constructor reference.
        constructor: String,
    },

    /// A `construct attributes` command referenced a named argument whose
    /// property setter does not exist on the attribute type.
    ///
    /// Note: the lookup does not search super classes of the attribute type,
    /// so a setter inherited from a base attribute is reported as missing.
    #[error("couldn't find setter '{setter}' on attribute type '{attribute_type}'")]
    MissingSetter {
        /// The `set_<name>` setter that was looked up.
        setter: String,
        /// Display name of the attribute type that was searched.
        attribute_type: String,
    },

    /// A branch or exception-region boundary referenced an offset with no
    /// recorded label.
    ///
    /// This indicates malformed input bytecode: every offset referenced by a
    /// branch operand or an exception region must receive a label during the
    /// rewriter's up-front scan, before the main rewrite pass begins.
    #[error("no label recorded for branch target offset {offset}")]
    MissingBranchLabel {
        /// The bytecode offset that had no label.
        offset: u32,
    },

    /// An operation carried an operand kind the body assembler cannot encode.
    ///
    /// Should never occur for well-formed input; treated as an assertion on
    /// the input operation stream.
    #[error("operand cannot be encoded at offset {offset}: {message}")]
    UnencodableOperand {
        /// Offset of the offending operation.
        offset: u32,
        /// Description of the operand kind.
        message: String,
    },

    /// An internal consistency violation inside a local-flow analysis.
    ///
    /// This is the one error variant callers are expected to catch and recover
    /// from: the Types strategy maps it to a fallback onto the plain bytecode
    /// summarizer. Everything else propagates.
    #[error("local flow analysis failed: {0}")]
    Analysis(String),

    /// File I/O error while reading a summary script.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}
