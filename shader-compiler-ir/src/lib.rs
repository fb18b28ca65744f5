// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information
#![deny(missing_docs)]

//! Shader Compiler Intermediate Representation

#[macro_use]
mod macros;

pub mod arena;
pub mod builder;
pub mod consts;
pub mod function;
pub mod instructions;
pub mod order;
pub mod prelude;
mod target_properties;
pub mod text;
pub mod types;
pub mod users;
pub mod value;
pub mod verify;

pub use crate::arena::Arena;
pub use crate::arena::Handle;
pub use crate::builder::Builder;
pub use crate::consts::Constant;
pub use crate::function::Block;
pub use crate::function::Function;
pub use crate::function::FunctionKind;
pub use crate::function::InsertPoint;
pub use crate::instructions::BinaryOp;
pub use crate::instructions::Callee;
pub use crate::instructions::CastOp;
pub use crate::instructions::CompareOp;
pub use crate::instructions::Instruction;
pub use crate::instructions::InstructionKind;
pub use crate::instructions::Intrinsic;
pub use crate::instructions::ReduceOp;
pub use crate::instructions::ResourceLoopMarker;
pub use crate::order::InstructionOrder;
pub use crate::target_properties::TargetProperties;
pub use crate::types::AddressSpace;
pub use crate::types::FloatType;
pub use crate::types::IntegerType;
pub use crate::types::ScalarType;
pub use crate::types::Type;
pub use crate::users::UseMap;
pub use crate::value::Argument;
pub use crate::value::ArgumentKind;
pub use crate::value::Value;
pub use crate::verify::verify;
pub use crate::verify::VerifyError;
