//! The declared-types abstract domain.
//!
//! Each value is abstracted to the declared type it is known to have, with
//! `System.Object` as top ("some object, no idea which") and `None` as bottom.
//! A state tracks that abstraction for every argument slot, local slot, and
//! operand stack entry.

use crate::metadata::{TypeId, WholeProgram};
use crate::{Error, Result};

/// Abstract value: a known declared type, or `None` for bottom.
pub(crate) type AbstractType = Option<TypeId>;

/// Join and widening rules for [`AbstractType`] values.
pub(crate) struct TypeDomain<'p> {
    program: &'p WholeProgram,
}

impl<'p> TypeDomain<'p> {
    pub(crate) fn new(program: &'p WholeProgram) -> Self {
        Self { program }
    }

    /// Top of the domain.
    pub(crate) fn top(&self) -> TypeId {
        self.program.system_object()
    }

    /// Least upper bound of two values.
    pub(crate) fn join(&self, lhs: AbstractType, rhs: AbstractType) -> AbstractType {
        match (lhs, rhs) {
            (None, v) | (v, None) => v,
            (Some(a), Some(b)) => Some(self.merge(a, b)),
        }
    }

    /// Nearest common supertype of `a` and `b`, `System.Object` when the
    /// hierarchy offers nothing closer.
    fn merge(&self, a: TypeId, b: TypeId) -> TypeId {
        if self.program.derives_from(a, b) {
            return b;
        }
        if self.program.derives_from(b, a) {
            return a;
        }
        for base in self.program.base_chain(a) {
            if self.program.derives_from(b, base) {
                return base;
            }
        }
        self.top()
    }
}

/// Abstract state at a program point: arguments, locals, and operand stack.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SlotState {
    pub args: Vec<AbstractType>,
    pub locals: Vec<AbstractType>,
    pub stack: Vec<AbstractType>,
}

impl SlotState {
    pub(crate) fn push(&mut self, value: AbstractType) {
        self.stack.push(value);
    }

    pub(crate) fn pop(&mut self) -> Result<AbstractType> {
        self.stack
            .pop()
            .ok_or_else(|| Error::Analysis("operand stack underflow".into()))
    }

    pub(crate) fn popn(&mut self, count: usize) -> Result<()> {
        for _ in 0..count {
            self.pop()?;
        }
        Ok(())
    }

    /// Pointwise join. Verifiable bodies reach a join point with one stack
    /// shape, so a depth mismatch means the body is not analyzable here.
    pub(crate) fn join(&self, other: &Self, domain: &TypeDomain<'_>) -> Result<Self> {
        if self.args.len() != other.args.len()
            || self.locals.len() != other.locals.len()
            || self.stack.len() != other.stack.len()
        {
            return Err(Error::Analysis(
                "state shapes disagree at a join point".into(),
            ));
        }
        let zip = |a: &[AbstractType], b: &[AbstractType]| {
            a.iter()
                .zip(b)
                .map(|(&x, &y)| domain.join(x, y))
                .collect::<Vec<_>>()
        };
        Ok(Self {
            args: zip(&self.args, &other.args),
            locals: zip(&self.locals, &other.locals),
            stack: zip(&self.stack, &other.stack),
        })
    }
}
