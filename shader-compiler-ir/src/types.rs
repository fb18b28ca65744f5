// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! types of IR values

use std::fmt;

/// an integer type
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum IntegerType {
    /// 8-bit signed or unsigned integer type
    Int8,
    /// 16-bit signed or unsigned integer type
    Int16,
    /// 32-bit signed or unsigned integer type
    Int32,
    /// 64-bit signed or unsigned integer type
    Int64,
}

impl IntegerType {
    /// the size of `self` in bits
    pub fn bit_width(self) -> u32 {
        match self {
            IntegerType::Int8 => 8,
            IntegerType::Int16 => 16,
            IntegerType::Int32 => 32,
            IntegerType::Int64 => 64,
        }
    }
}

/// a float type
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum FloatType {
    /// 16-bit float type
    Float16,
    /// 32-bit float type
    Float32,
    /// 64-bit float type
    Float64,
}

impl FloatType {
    /// the size of `self` in bits
    pub fn bit_width(self) -> u32 {
        match self {
            FloatType::Float16 => 16,
            FloatType::Float32 => 32,
            FloatType::Float64 => 64,
        }
    }
}

/// the memory a pointer points into
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum AddressSpace {
    /// memory private to each invocation
    Private,
    /// device memory visible to every invocation
    Global,
    /// memory shared between the invocations of a workgroup
    Workgroup,
    /// read-only device memory
    Constant,
}

/// a type that can be the element of a vector
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ScalarType {
    /// 1-bit flag
    Bool,
    /// integer
    Integer(IntegerType),
    /// floating-point
    Float(FloatType),
    /// data pointer, always 64 bits
    Pointer(AddressSpace),
}

impl ScalarType {
    /// the size of `self` in bits
    pub fn bit_width(self) -> u32 {
        match self {
            ScalarType::Bool => 1,
            ScalarType::Integer(integer_type) => integer_type.bit_width(),
            ScalarType::Float(float_type) => float_type.bit_width(),
            ScalarType::Pointer(_) => 64,
        }
    }
    /// the number of bytes `self` occupies in memory
    pub fn byte_size(self) -> u64 {
        (u64::from(self.bit_width()) + 7) / 8
    }
    /// mask with the low `bit_width` bits set
    pub fn bit_mask(self) -> u64 {
        match self.bit_width() {
            64 => !0,
            width => (1u64 << width) - 1,
        }
    }
}

impl From<IntegerType> for ScalarType {
    fn from(v: IntegerType) -> Self {
        ScalarType::Integer(v)
    }
}

impl From<FloatType> for ScalarType {
    fn from(v: FloatType) -> Self {
        ScalarType::Float(v)
    }
}

/// the type of an IR value
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Type {
    /// no value; the result type of stores, branches and void calls
    Void,
    /// a single scalar
    Scalar(ScalarType),
    /// a fixed-length vector of scalars
    Vector {
        /// the element type
        element: ScalarType,
        /// the number of elements
        length: u32,
    },
    /// opaque handle to a texture or buffer
    Resource,
    /// opaque handle to a sampler
    Sampler,
}

impl Type {
    /// the `bool` type
    pub const BOOL: Type = Type::Scalar(ScalarType::Bool);
    /// the 32-bit integer type
    pub const I32: Type = Type::Scalar(ScalarType::Integer(IntegerType::Int32));
    /// the 64-bit integer type
    pub const I64: Type = Type::Scalar(ScalarType::Integer(IntegerType::Int64));
    /// the 32-bit float type
    pub const F32: Type = Type::Scalar(ScalarType::Float(FloatType::Float32));

    /// a scalar integer type
    pub fn integer(integer_type: IntegerType) -> Type {
        Type::Scalar(ScalarType::Integer(integer_type))
    }
    /// a scalar float type
    pub fn float(float_type: FloatType) -> Type {
        Type::Scalar(ScalarType::Float(float_type))
    }
    /// a pointer type
    pub fn pointer(address_space: AddressSpace) -> Type {
        Type::Scalar(ScalarType::Pointer(address_space))
    }
    /// a vector type
    pub fn vector(element: impl Into<ScalarType>, length: u32) -> Type {
        Type::Vector {
            element: element.into(),
            length,
        }
    }
    /// returns `true` if `self` is a vector type
    pub fn is_vector(self) -> bool {
        match self {
            Type::Vector { .. } => true,
            _ => false,
        }
    }
    /// returns `true` if `self` is a 1-bit flag
    pub fn is_flag(self) -> bool {
        self == Type::BOOL
    }
    /// the scalar type of `self`, or the element type for vectors
    pub fn element_type(self) -> Option<ScalarType> {
        match self {
            Type::Scalar(scalar) => Some(scalar),
            Type::Vector { element, .. } => Some(element),
            Type::Void | Type::Resource | Type::Sampler => None,
        }
    }
    /// the number of scalars in `self`
    pub fn element_count(self) -> u32 {
        match self {
            Type::Void => 0,
            Type::Vector { length, .. } => length,
            Type::Scalar(_) | Type::Resource | Type::Sampler => 1,
        }
    }
    /// the address space if `self` is a pointer
    pub fn address_space(self) -> Option<AddressSpace> {
        match self {
            Type::Scalar(ScalarType::Pointer(address_space)) => Some(address_space),
            _ => None,
        }
    }
}

impl From<ScalarType> for Type {
    fn from(v: ScalarType) -> Self {
        Type::Scalar(v)
    }
}

impl From<IntegerType> for Type {
    fn from(v: IntegerType) -> Self {
        Type::integer(v)
    }
}

impl From<FloatType> for Type {
    fn from(v: FloatType) -> Self {
        Type::float(v)
    }
}

impl fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.pad(match self {
            AddressSpace::Private => "private",
            AddressSpace::Global => "global",
            AddressSpace::Workgroup => "workgroup",
            AddressSpace::Constant => "constant",
        })
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ScalarType::Bool => write!(f, "bool"),
            ScalarType::Integer(integer_type) => write!(f, "i{}", integer_type.bit_width()),
            ScalarType::Float(float_type) => write!(f, "f{}", float_type.bit_width()),
            ScalarType::Pointer(address_space) => write!(f, "ptr<{}>", address_space),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Scalar(scalar) => scalar.fmt(f),
            Type::Vector { element, length } => write!(f, "<{} x {}>", length, element),
            Type::Resource => write!(f, "resource"),
            Type::Sampler => write!(f, "sampler"),
        }
    }
}
