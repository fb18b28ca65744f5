// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! IR prelude

pub use crate::{
    Argument, ArgumentKind, Block, Builder, Function, FunctionKind, Handle, InsertPoint,
    Instruction, InstructionKind, Intrinsic, Type, Value,
};
