// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! constants

use crate::types::FloatType;
use crate::types::IntegerType;
use crate::types::ScalarType;
use crate::types::Type;
use std::fmt;

/// a scalar constant
///
/// `bits` holds the value zero-extended from `ty.bit_width()` bits
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Constant {
    /// the type of the constant
    pub ty: ScalarType,
    /// the raw bits of the constant
    pub bits: u64,
}

impl Constant {
    /// create a constant, truncating `bits` to the width of `ty`
    pub fn new(ty: ScalarType, bits: u64) -> Self {
        Constant {
            ty,
            bits: bits & ty.bit_mask(),
        }
    }
    /// a `bool` constant
    pub fn bool(value: bool) -> Self {
        Self::new(ScalarType::Bool, value as u64)
    }
    /// an integer constant
    pub fn integer(integer_type: IntegerType, value: u64) -> Self {
        Self::new(ScalarType::Integer(integer_type), value)
    }
    /// a 32-bit integer constant
    pub fn i32(value: i32) -> Self {
        Self::integer(IntegerType::Int32, value as u32 as u64)
    }
    /// a 64-bit integer constant
    pub fn i64(value: i64) -> Self {
        Self::integer(IntegerType::Int64, value as u64)
    }
    /// a 32-bit float constant
    pub fn f32(value: f32) -> Self {
        Self::new(ScalarType::Float(FloatType::Float32), value.to_bits().into())
    }
    /// the type of the constant as a value type
    pub fn value_type(&self) -> Type {
        Type::Scalar(self.ty)
    }
    /// the value sign-extended from the constant's bit width
    pub fn as_signed(&self) -> i64 {
        let shift = 64 - self.ty.bit_width();
        ((self.bits << shift) as i64) >> shift
    }
    /// returns `true` if `self` is the integer zero
    pub fn is_zero(&self) -> bool {
        match self.ty {
            ScalarType::Integer(_) => self.bits == 0,
            _ => false,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.ty {
            ScalarType::Bool => write!(f, "{}", self.bits != 0),
            ScalarType::Integer(_) => write!(f, "{}{}", self.as_signed(), self.ty),
            ScalarType::Float(FloatType::Float32) => {
                write!(f, "{:?}f32", f32::from_bits(self.bits as u32))
            }
            ScalarType::Float(FloatType::Float64) => {
                write!(f, "{:?}f64", f64::from_bits(self.bits))
            }
            ScalarType::Float(FloatType::Float16) | ScalarType::Pointer(_) => {
                write!(f, "{:#x} : {}", self.bits, self.ty)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncation() {
        assert_eq!(Constant::i32(-1).bits, 0xFFFF_FFFF);
        assert_eq!(Constant::i32(-1).as_signed(), -1);
        assert_eq!(Constant::integer(IntegerType::Int8, 0x1FF).bits, 0xFF);
        assert_eq!(Constant::bool(true).bits, 1);
    }

    #[test]
    fn test_display() {
        assert_eq!(Constant::i32(-3).to_string(), "-3i32");
        assert_eq!(Constant::bool(false).to_string(), "false");
        assert_eq!(Constant::f32(1.5).to_string(), "1.5f32");
    }
}
