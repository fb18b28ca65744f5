// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! SSA values

use crate::arena::Handle;
use crate::consts::Constant;
use crate::instructions::Instruction;
use crate::types::Type;

/// a reference to an SSA value
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Debug)]
pub enum Value {
    /// the function argument with the given index
    Argument(u32),
    /// a constant owned by the function
    Constant(Handle<Constant>),
    /// the result of an instruction
    Instruction(Handle<Instruction>),
}

impl Value {
    /// the defining instruction, if `self` is an instruction result
    pub fn instruction(self) -> Option<Handle<Instruction>> {
        match self {
            Value::Instruction(instruction) => Some(instruction),
            Value::Argument(_) | Value::Constant(_) => None,
        }
    }
    /// the constant, if `self` is a constant
    pub fn constant(self) -> Option<Handle<Constant>> {
        match self {
            Value::Constant(constant) => Some(constant),
            Value::Argument(_) | Value::Instruction(_) => None,
        }
    }
}

impl From<Handle<Instruction>> for Value {
    fn from(v: Handle<Instruction>) -> Self {
        Value::Instruction(v)
    }
}

impl From<Handle<Constant>> for Value {
    fn from(v: Handle<Constant>) -> Self {
        Value::Constant(v)
    }
}

/// how an argument varies between the invocations of a kernel
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ArgumentKind {
    /// every invocation receives the same value
    Uniform,
    /// each invocation may receive a different value
    PerInvocation,
}

/// a function argument
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Argument {
    /// the name of the argument -- doesn't need to be unique
    pub name: String,
    /// the type of the argument
    pub ty: Type,
    /// how the argument varies between invocations
    pub kind: ArgumentKind,
}

impl Argument {
    /// create a new `Argument`
    pub fn new(name: impl Into<String>, ty: Type, kind: ArgumentKind) -> Self {
        Argument {
            name: name.into(),
            ty,
            kind,
        }
    }
}
