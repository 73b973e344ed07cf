//! Hand-written summaries loaded from a text script.
//!
//! Scripts stand in for methods the automatic summarizers cannot see through,
//! typically reflection-heavy framework entry points. Format, one command per
//! line, `#` starts a comment:
//!
//! ```text
//! summarize App!Program::Main
//!     construct App!Widget
//!     construct subtypes App!Control
//!     construct matches App.Handlers.*
//!     construct attributes App!Widget::config
//!
//!     call App!Widget::Helper
//!     call virtual App!Control::Draw
//!     call anypublic App!Widget
//!     call any subtypes App!Control
//!
//!     read App!Widget::count
//!     write App!Widget::count
//! ```
//!
//! Identifiers are `assembly!path` or a bare `path`; paths match a full
//! namespace-qualified name or a suffix of one at a dot boundary. The
//! `matches` specifier takes a `*`-wildcard pattern instead.

use std::collections::BTreeMap;
use std::path::Path;

use log::debug;

use crate::metadata::{FieldId, MethodId, TypeId, WholeProgram};
use crate::summary::{MethodSummarizer, ReachabilitySummary};
use crate::{Error, Result};

/// Summaries parsed from a script, keyed by the method they describe.
///
/// [`MethodSummarizer::can_summarize`] answers true exactly for the methods
/// the script names, so this summarizer can sit in front of the automatic
/// ones and override them selectively.
#[derive(Debug, Default)]
pub struct ScriptSummarizer {
    summaries: BTreeMap<MethodId, ReachabilitySummary>,
}

#[derive(Debug)]
enum TypeSpecifier<'a> {
    /// One type, named exactly.
    Exactly(&'a str),
    /// All proper subtypes of the named type.
    Subtypes(&'a str),
    /// All types matching a wildcard pattern.
    Matches(&'a str),
}

impl ScriptSummarizer {
    /// Parses the script at `path` against `program`.
    pub fn from_path(path: &Path, program: &WholeProgram) -> Result<Self> {
        Self::parse(&std::fs::read_to_string(path)?, program)
    }

    /// Parses script `text` against `program`.
    pub fn parse(text: &str, program: &WholeProgram) -> Result<Self> {
        let mut summarizer = Self::default();
        let mut current: Option<MethodId> = None;

        for (index, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            summarizer
                .interpret_line(line, &mut current, program)
                .map_err(|e| match e {
                    Error::ScriptParse { message, .. } => Error::ScriptParse {
                        line: index + 1,
                        message,
                    },
                    other => other,
                })?;
        }
        debug!("loaded {} scripted summaries", summarizer.summaries.len());
        Ok(summarizer)
    }

    fn interpret_line(
        &mut self,
        line: &str,
        current: &mut Option<MethodId>,
        program: &WholeProgram,
    ) -> Result<()> {
        let mut tokens = line.split_whitespace().peekable();
        let op = tokens
            .next()
            .ok_or_else(|| parse_error("missing operation"))?
            .to_lowercase();

        match op.as_str() {
            "summarize" => {
                let method = lookup_method(consume(&mut tokens)?, program)?;
                self.summaries.insert(method, ReachabilitySummary::new());
                *current = Some(method);
            }
            "construct" => {
                if peek_is(&mut tokens, "attributes") {
                    tokens.next();
                    let field = lookup_field(consume(&mut tokens)?, program)?;
                    self.construct_attributes(current, field, program)?;
                } else {
                    let spec = consume_type_specifier(&mut tokens)?;
                    self.construct(current, &spec, program)?;
                }
            }
            "call" => {
                if peek_is(&mut tokens, "virtual") {
                    tokens.next();
                    let method = lookup_method(consume(&mut tokens)?, program)?;
                    self.summary(current)?.virtually_called_methods.insert(method);
                } else if peek_is(&mut tokens, "anypublic") {
                    tokens.next();
                    let spec = consume_type_specifier(&mut tokens)?;
                    self.call_any(current, &spec, program, true)?;
                } else if peek_is(&mut tokens, "any") {
                    tokens.next();
                    let spec = consume_type_specifier(&mut tokens)?;
                    self.call_any(current, &spec, program, false)?;
                } else {
                    let method = lookup_method(consume(&mut tokens)?, program)?;
                    self.summary(current)?
                        .nonvirtually_called_methods
                        .insert(method);
                }
            }
            // Loads and stores land in the same set, so read and write are
            // interchangeable; both spellings exist for script legibility.
            "read" | "write" => {
                let field = lookup_field(consume(&mut tokens)?, program)?;
                self.summary(current)?.reachable_fields.insert(field);
            }
            other => {
                return Err(parse_error(&format!(
                    "unrecognized operation: '{other}'"
                )));
            }
        }

        if tokens.next().is_some() {
            return Err(parse_error(&format!("trailing tokens after command: '{line}'")));
        }
        Ok(())
    }

    fn summary(&mut self, current: &Option<MethodId>) -> Result<&mut ReachabilitySummary> {
        (*current)
            .and_then(|method| self.summaries.get_mut(&method))
            .ok_or_else(|| parse_error("command used outside of a summarized method"))
    }

    fn construct(
        &mut self,
        current: &Option<MethodId>,
        spec: &TypeSpecifier<'_>,
        program: &WholeProgram,
    ) -> Result<()> {
        for ty in lookup_types(spec, program)? {
            if !program.is_constructable(ty) {
                continue;
            }
            let summary = self.summary(current)?;
            summary.constructed_types.insert(ty);
            // All non-private constructors become reachable. Imprecise, but
            // the script format has no way to spell a constructor signature.
            for ctor in program.constructors(ty) {
                if program.method(ctor).visibility != crate::metadata::Visibility::Private {
                    summary.nonvirtually_called_methods.insert(ctor);
                }
            }
        }
        Ok(())
    }

    /// Marks the attribute constructors on `field` reachable, along with the
    /// property setters its named arguments assign through.
    fn construct_attributes(
        &mut self,
        current: &Option<MethodId>,
        field: FieldId,
        program: &WholeProgram,
    ) -> Result<()> {
        let attributes = program.field(field).attributes.clone();
        for attribute in &attributes {
            let Some(ctor) = program.method_ref(attribute.constructor).resolved else {
                return Err(Error::UnresolvedAttribute {
                    field: program.field_display(field),
                    constructor: program.method_ref(attribute.constructor).name.clone(),
                });
            };
            let attribute_type = program.method(ctor).declaring_type;
            self.summary(current)?.nonvirtually_called_methods.insert(ctor);

            for arg in &attribute.named_arguments {
                let setter_name = format!("set_{}", arg.name);
                // The runtime type of the attribute is exact, so the setter
                // call is non-virtual. Setters inherited from a base class
                // are not found; scripts must name the declaring type.
                let setter = program
                    .type_def(attribute_type)
                    .methods
                    .iter()
                    .copied()
                    .find(|&m| {
                        let def = program.method(m);
                        def.name == setter_name && def.param_types == [arg.value_type]
                    })
                    .ok_or_else(|| Error::MissingSetter {
                        setter: setter_name.clone(),
                        attribute_type: program.type_def(attribute_type).full_name(),
                    })?;
                self.summary(current)?.nonvirtually_called_methods.insert(setter);
            }
        }
        Ok(())
    }

    /// Marks non-abstract methods declared directly on the specified types as
    /// called, and the types as constructed when a matching constructor is
    /// found. Inherited methods are not included.
    fn call_any(
        &mut self,
        current: &Option<MethodId>,
        spec: &TypeSpecifier<'_>,
        program: &WholeProgram,
        public_only: bool,
    ) -> Result<()> {
        for ty in lookup_types(spec, program)? {
            for method in self.methods_of(ty, program) {
                let def = program.method(method);
                if def.is_abstract() {
                    continue;
                }
                if public_only && def.visibility != crate::metadata::Visibility::Public {
                    continue;
                }
                let summary = self.summary(current)?;
                summary.nonvirtually_called_methods.insert(method);
                if def.is_constructor() && program.is_constructable(ty) {
                    summary.constructed_types.insert(ty);
                }
            }
        }
        Ok(())
    }

    fn methods_of(&self, ty: TypeId, program: &WholeProgram) -> Vec<MethodId> {
        program.type_def(ty).methods.clone()
    }
}

impl MethodSummarizer for ScriptSummarizer {
    fn can_summarize(&self, _program: &WholeProgram, method: MethodId) -> bool {
        self.summaries.contains_key(&method)
    }

    fn summarize(&self, _program: &WholeProgram, method: MethodId) -> Result<ReachabilitySummary> {
        Ok(self.summaries.get(&method).cloned().unwrap_or_default())
    }
}

fn parse_error(message: &str) -> Error {
    Error::ScriptParse {
        line: 0,
        message: message.into(),
    }
}

fn consume<'a, I: Iterator<Item = &'a str>>(tokens: &mut I) -> Result<&'a str> {
    tokens
        .next()
        .ok_or_else(|| parse_error("missing argument"))
}

fn peek_is(
    tokens: &mut std::iter::Peekable<std::str::SplitWhitespace<'_>>,
    expected: &str,
) -> bool {
    tokens
        .peek()
        .is_some_and(|t| t.eq_ignore_ascii_case(expected))
}

fn consume_type_specifier<'a>(
    tokens: &mut std::iter::Peekable<std::str::SplitWhitespace<'a>>,
) -> Result<TypeSpecifier<'a>> {
    let first = consume(tokens)?;
    if first.eq_ignore_ascii_case("subtypes") {
        Ok(TypeSpecifier::Subtypes(consume(tokens)?))
    } else if first.eq_ignore_ascii_case("matches") {
        Ok(TypeSpecifier::Matches(consume(tokens)?))
    } else {
        Ok(TypeSpecifier::Exactly(first))
    }
}

/// Splits `assembly!path` identifiers; a bare path searches every assembly.
fn split_identifier(identifier: &str) -> Result<(Option<&str>, &str)> {
    let mut parts = identifier.split('!');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(path), None, _) => Ok((None, path)),
        (Some(assembly), Some(path), None) => Ok((Some(assembly), path)),
        _ => Err(parse_error(&format!("malformed identifier: '{identifier}'"))),
    }
}

fn lookup_method(identifier: &str, program: &WholeProgram) -> Result<MethodId> {
    let (assembly, path) = split_identifier(identifier)?;
    let matches = program.methods_named(assembly, path);
    unique(matches, identifier)
}

fn lookup_field(identifier: &str, program: &WholeProgram) -> Result<FieldId> {
    let (assembly, path) = split_identifier(identifier)?;
    let matches = program.fields_named(assembly, path);
    unique(matches, identifier)
}

fn lookup_exact_type(identifier: &str, program: &WholeProgram) -> Result<TypeId> {
    let (assembly, path) = split_identifier(identifier)?;
    unique(program.types_named(assembly, path), identifier)
}

fn lookup_types(spec: &TypeSpecifier<'_>, program: &WholeProgram) -> Result<Vec<TypeId>> {
    match spec {
        TypeSpecifier::Exactly(identifier) => Ok(vec![lookup_exact_type(identifier, program)?]),
        TypeSpecifier::Subtypes(identifier) => {
            let ty = lookup_exact_type(identifier, program)?;
            Ok(program.hierarchy().all_subtypes(ty).into_iter().collect())
        }
        TypeSpecifier::Matches(identifier) => {
            let (assembly, pattern) = split_identifier(identifier)?;
            let types: Vec<TypeId> = program
                .types()
                .filter(|&(_, t)| {
                    assembly.map_or(true, |a| program.assembly(t.assembly).name == a)
                        && crate::metadata::wildcard_match(pattern, &t.full_name())
                })
                .map(|(id, _)| id)
                .collect();
            if types.is_empty() {
                return Err(Error::IdentifierNotFound {
                    identifier: (*identifier).into(),
                });
            }
            Ok(types)
        }
    }
}

fn unique<T>(mut matches: Vec<T>, identifier: &str) -> Result<T> {
    match matches.len() {
        1 => Ok(matches.remove(0)),
        0 => Err(Error::IdentifierNotFound {
            identifier: identifier.into(),
        }),
        n => Err(Error::IdentifierAmbiguous {
            identifier: identifier.into(),
            count: n,
        }),
    }
}
