// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! instructions

use crate::arena::Handle;
use crate::function::Block;
use crate::types::Type;
use crate::value::Value;
use bitflags::bitflags;
use smallvec::SmallVec;
use std::fmt;

impl_text_enum! {
    /// a two-operand arithmetic or bitwise operation
    pub enum BinaryOp {
        /// integer addition
        #[text = "add"]
        Add,
        /// integer subtraction
        #[text = "sub"]
        Sub,
        /// integer multiplication
        #[text = "mul"]
        Mul,
        /// unsigned integer division
        #[text = "udiv"]
        UDiv,
        /// signed integer division
        #[text = "sdiv"]
        SDiv,
        /// bitwise and
        #[text = "and"]
        And,
        /// bitwise or
        #[text = "or"]
        Or,
        /// bitwise exclusive or
        #[text = "xor"]
        Xor,
        /// shift left
        #[text = "shl"]
        Shl,
        /// logical shift right
        #[text = "lshr"]
        LShr,
        /// arithmetic shift right
        #[text = "ashr"]
        AShr,
        /// unsigned minimum
        #[text = "umin"]
        UMin,
        /// unsigned maximum
        #[text = "umax"]
        UMax,
        /// signed minimum
        #[text = "smin"]
        SMin,
        /// signed maximum
        #[text = "smax"]
        SMax,
        /// float addition
        #[text = "fadd"]
        FAdd,
        /// float subtraction
        #[text = "fsub"]
        FSub,
        /// float multiplication
        #[text = "fmul"]
        FMul,
        /// float division
        #[text = "fdiv"]
        FDiv,
        /// float minimum
        #[text = "fmin"]
        FMin,
        /// float maximum
        #[text = "fmax"]
        FMax,
    }
}

impl_text_enum! {
    /// a comparison predicate
    pub enum CompareOp {
        /// equal
        #[text = "eq"]
        Eq,
        /// not equal
        #[text = "ne"]
        Ne,
        /// unsigned less than
        #[text = "ult"]
        ULt,
        /// unsigned less than or equal
        #[text = "ule"]
        ULe,
        /// unsigned greater than
        #[text = "ugt"]
        UGt,
        /// unsigned greater than or equal
        #[text = "uge"]
        UGe,
        /// signed less than
        #[text = "slt"]
        SLt,
        /// signed less than or equal
        #[text = "sle"]
        SLe,
        /// signed greater than
        #[text = "sgt"]
        SGt,
        /// signed greater than or equal
        #[text = "sge"]
        SGe,
        /// ordered float less than
        #[text = "flt"]
        FLt,
        /// ordered float greater than
        #[text = "fgt"]
        FGt,
    }
}

impl_text_enum! {
    /// a conversion between types
    pub enum CastOp {
        /// reinterpret the bits as another type of the same width
        #[text = "bitcast"]
        Bitcast,
        /// zero-extend an integer
        #[text = "zext"]
        ZExt,
        /// sign-extend an integer
        #[text = "sext"]
        SExt,
        /// truncate an integer
        #[text = "trunc"]
        Trunc,
        /// convert a pointer to an integer
        #[text = "ptrtoint"]
        PtrToInt,
        /// convert an integer to a pointer
        #[text = "inttoptr"]
        IntToPtr,
    }
}

impl_text_enum! {
    /// an associative operation a wave reduction combines lanes with
    pub enum ReduceOp {
        /// integer addition
        #[text = "add"]
        Add,
        /// integer multiplication
        #[text = "mul"]
        Mul,
        /// bitwise and
        #[text = "and"]
        And,
        /// bitwise or
        #[text = "or"]
        Or,
        /// bitwise exclusive or
        #[text = "xor"]
        Xor,
        /// unsigned minimum
        #[text = "umin"]
        UMin,
        /// unsigned maximum
        #[text = "umax"]
        UMax,
        /// signed minimum
        #[text = "smin"]
        SMin,
        /// signed maximum
        #[text = "smax"]
        SMax,
        /// float addition
        #[text = "fadd"]
        FAdd,
        /// float multiplication
        #[text = "fmul"]
        FMul,
        /// float minimum
        #[text = "fmin"]
        FMin,
        /// float maximum
        #[text = "fmax"]
        FMax,
    }
}

impl ReduceOp {
    /// the binary operation applied when combining two lanes
    pub fn binary_op(self) -> BinaryOp {
        match self {
            ReduceOp::Add => BinaryOp::Add,
            ReduceOp::Mul => BinaryOp::Mul,
            ReduceOp::And => BinaryOp::And,
            ReduceOp::Or => BinaryOp::Or,
            ReduceOp::Xor => BinaryOp::Xor,
            ReduceOp::UMin => BinaryOp::UMin,
            ReduceOp::UMax => BinaryOp::UMax,
            ReduceOp::SMin => BinaryOp::SMin,
            ReduceOp::SMax => BinaryOp::SMax,
            ReduceOp::FAdd => BinaryOp::FAdd,
            ReduceOp::FMul => BinaryOp::FMul,
            ReduceOp::FMin => BinaryOp::FMin,
            ReduceOp::FMax => BinaryOp::FMax,
        }
    }
}

/// a built-in operation implemented by the target
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Intrinsic {
    /// index of the current lane within its subgroup: `() -> i32`
    SubgroupLocalInvocationId,
    /// index of the current subgroup within its workgroup: `() -> i32`
    SubgroupId,
    /// number of lanes in a subgroup: `() -> i32`
    SubgroupSize,
    /// index of the invocation within its workgroup: `() -> i32`
    LocalInvocationId,
    /// index of the invocation within the dispatch: `() -> i32`
    GlobalInvocationId,
    /// index of the workgroup within the dispatch: `() -> i32`
    WorkgroupId,
    /// combine `value` across the active lanes: `(value) -> typeof value`
    WaveReduce(ReduceOp),
    /// read `value` from lane `lane`: `(value, lane) -> typeof value`
    WaveShuffle,
    /// bit mask of the active lanes where `flag` is set: `(flag) -> i64`
    WaveBallot,
    /// read from a resource: `(resource, coordinate) -> T`
    ResourceLoad,
    /// sample a resource: `(resource, sampler, coordinate) -> T`
    ResourceSample,
    /// write to a resource: `(resource, coordinate, value) -> void`
    ResourceStore,
    /// subgroup block read, lane `i` reads `address + i * size_of T`: `(address) -> T`
    BlockRead,
    /// subgroup block write, lane `i` writes `address + i * size_of T`: `(address, value) -> void`
    BlockWrite,
    /// start of a stack object's lifetime: `(pointer) -> void`
    LifetimeStart,
    /// end of a stack object's lifetime: `(pointer) -> void`
    LifetimeEnd,
    /// debug information for a value: `(value) -> void`
    DebugValue,
}

impl Intrinsic {
    /// returns `true` if calling `self` writes memory
    pub fn has_side_effects(self) -> bool {
        match self {
            Intrinsic::ResourceStore | Intrinsic::BlockWrite => true,
            _ => false,
        }
    }
    /// returns `true` for markers that have no effect on execution
    pub fn is_no_effect_marker(self) -> bool {
        match self {
            Intrinsic::LifetimeStart | Intrinsic::LifetimeEnd | Intrinsic::DebugValue => true,
            _ => false,
        }
    }
    /// returns `true` for subgroup block reads and writes
    pub fn is_block_memory_access(self) -> bool {
        match self {
            Intrinsic::BlockRead | Intrinsic::BlockWrite => true,
            _ => false,
        }
    }
    /// the index of the resource argument, for resource accesses
    pub fn resource_operand(self) -> Option<usize> {
        match self {
            Intrinsic::ResourceLoad | Intrinsic::ResourceSample | Intrinsic::ResourceStore => {
                Some(0)
            }
            _ => None,
        }
    }
    /// the index of the sampler argument, for resource accesses
    pub fn sampler_operand(self) -> Option<usize> {
        match self {
            Intrinsic::ResourceSample => Some(1),
            _ => None,
        }
    }
    /// the result type when it doesn't depend on the call site
    pub fn fixed_result_type(self) -> Option<Type> {
        match self {
            Intrinsic::SubgroupLocalInvocationId
            | Intrinsic::SubgroupId
            | Intrinsic::SubgroupSize
            | Intrinsic::LocalInvocationId
            | Intrinsic::GlobalInvocationId
            | Intrinsic::WorkgroupId => Some(Type::I32),
            Intrinsic::WaveBallot => Some(Type::I64),
            Intrinsic::ResourceStore
            | Intrinsic::BlockWrite
            | Intrinsic::LifetimeStart
            | Intrinsic::LifetimeEnd
            | Intrinsic::DebugValue => Some(Type::Void),
            Intrinsic::WaveReduce(_)
            | Intrinsic::WaveShuffle
            | Intrinsic::ResourceLoad
            | Intrinsic::ResourceSample
            | Intrinsic::BlockRead => None,
        }
    }
}

impl fmt::Display for Intrinsic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Intrinsic::SubgroupLocalInvocationId => write!(f, "subgroup_local_invocation_id"),
            Intrinsic::SubgroupId => write!(f, "subgroup_id"),
            Intrinsic::SubgroupSize => write!(f, "subgroup_size"),
            Intrinsic::LocalInvocationId => write!(f, "local_invocation_id"),
            Intrinsic::GlobalInvocationId => write!(f, "global_invocation_id"),
            Intrinsic::WorkgroupId => write!(f, "workgroup_id"),
            Intrinsic::WaveReduce(op) => write!(f, "wave_reduce.{}", op),
            Intrinsic::WaveShuffle => write!(f, "wave_shuffle"),
            Intrinsic::WaveBallot => write!(f, "wave_ballot"),
            Intrinsic::ResourceLoad => write!(f, "resource_load"),
            Intrinsic::ResourceSample => write!(f, "resource_sample"),
            Intrinsic::ResourceStore => write!(f, "resource_store"),
            Intrinsic::BlockRead => write!(f, "block_read"),
            Intrinsic::BlockWrite => write!(f, "block_write"),
            Intrinsic::LifetimeStart => write!(f, "lifetime_start"),
            Intrinsic::LifetimeEnd => write!(f, "lifetime_end"),
            Intrinsic::DebugValue => write!(f, "debug_value"),
        }
    }
}

/// the function a `Call` invokes
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum Callee {
    /// a target intrinsic
    Intrinsic(Intrinsic),
    /// a function the compiler knows nothing about
    External(String),
}

impl fmt::Display for Callee {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Callee::Intrinsic(intrinsic) => write!(f, "{}", intrinsic),
            Callee::External(name) => write!(f, "@{}", name),
        }
    }
}

/// variable part of `Instruction`
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum InstructionKind {
    /// `op lhs, rhs`
    Binary {
        /// the operation
        op: BinaryOp,
        /// the left operand
        lhs: Value,
        /// the right operand
        rhs: Value,
    },
    /// `cmp.op lhs, rhs`, produces a `bool`
    Compare {
        /// the predicate
        op: CompareOp,
        /// the left operand
        lhs: Value,
        /// the right operand
        rhs: Value,
    },
    /// convert `value` to the instruction's type
    Cast {
        /// the conversion
        op: CastOp,
        /// the converted value
        value: Value,
    },
    /// `condition ? true_value : false_value`
    Select {
        /// the `bool` condition
        condition: Value,
        /// the result when `condition` is `true`
        true_value: Value,
        /// the result when `condition` is `false`
        false_value: Value,
    },
    /// pointer offset: `base + index * stride`
    GetElementPtr {
        /// the base pointer
        base: Value,
        /// the element index
        index: Value,
        /// the size of an element in bytes
        stride: u64,
    },
    /// extract one element from a vector
    ExtractElement {
        /// the vector
        vector: Value,
        /// the element index
        index: Value,
    },
    /// merge values from predecessor blocks
    Phi {
        /// the value for each predecessor
        incoming: Vec<(Handle<Block>, Value)>,
    },
    /// read memory
    Load {
        /// the address
        pointer: Value,
    },
    /// write memory
    Store {
        /// the address
        pointer: Value,
        /// the stored value
        value: Value,
    },
    /// atomically read memory
    AtomicLoad {
        /// the address
        pointer: Value,
    },
    /// atomic compare-exchange, produces the previous memory contents
    AtomicCmpXchg {
        /// the address
        pointer: Value,
        /// the value memory must contain for the exchange to happen
        expected: Value,
        /// the value written when the exchange happens
        replacement: Value,
    },
    /// call an intrinsic or an external function
    Call {
        /// the called function
        callee: Callee,
        /// the arguments
        arguments: SmallVec<[Value; 4]>,
    },
    /// unconditional branch
    Branch {
        /// the next block
        target: Handle<Block>,
    },
    /// conditional branch
    CondBranch {
        /// the `bool` condition
        condition: Value,
        /// the next block when `condition` is `true`
        true_target: Handle<Block>,
        /// the next block when `condition` is `false`
        false_target: Handle<Block>,
    },
    /// return from the function
    Return {
        /// the returned value
        value: Option<Value>,
    },
    /// control never reaches here
    Unreachable,
}

impl InstructionKind {
    /// the values `self` reads, in operand order
    pub fn operands(&self) -> SmallVec<[Value; 4]> {
        match *self {
            InstructionKind::Binary { lhs, rhs, .. }
            | InstructionKind::Compare { lhs, rhs, .. } => smallvec::smallvec![lhs, rhs],
            InstructionKind::Cast { value, .. } => smallvec::smallvec![value],
            InstructionKind::Select {
                condition,
                true_value,
                false_value,
            } => smallvec::smallvec![condition, true_value, false_value],
            InstructionKind::GetElementPtr { base, index, .. } => smallvec::smallvec![base, index],
            InstructionKind::ExtractElement { vector, index } => smallvec::smallvec![vector, index],
            InstructionKind::Phi { ref incoming } => incoming.iter().map(|&(_, v)| v).collect(),
            InstructionKind::Load { pointer } | InstructionKind::AtomicLoad { pointer } => {
                smallvec::smallvec![pointer]
            }
            InstructionKind::Store { pointer, value } => smallvec::smallvec![pointer, value],
            InstructionKind::AtomicCmpXchg {
                pointer,
                expected,
                replacement,
            } => smallvec::smallvec![pointer, expected, replacement],
            InstructionKind::Call { ref arguments, .. } => arguments.clone(),
            InstructionKind::CondBranch { condition, .. } => smallvec::smallvec![condition],
            InstructionKind::Return { value } => value.into_iter().collect(),
            InstructionKind::Branch { .. } | InstructionKind::Unreachable => SmallVec::new(),
        }
    }
    /// mutable references to the values `self` reads, in operand order
    pub fn operands_mut(&mut self) -> SmallVec<[&mut Value; 4]> {
        match self {
            InstructionKind::Binary { lhs, rhs, .. }
            | InstructionKind::Compare { lhs, rhs, .. } => smallvec::smallvec![lhs, rhs],
            InstructionKind::Cast { value, .. } => smallvec::smallvec![value],
            InstructionKind::Select {
                condition,
                true_value,
                false_value,
            } => smallvec::smallvec![condition, true_value, false_value],
            InstructionKind::GetElementPtr { base, index, .. } => smallvec::smallvec![base, index],
            InstructionKind::ExtractElement { vector, index } => smallvec::smallvec![vector, index],
            InstructionKind::Phi { incoming } => incoming.iter_mut().map(|(_, v)| v).collect(),
            InstructionKind::Load { pointer } | InstructionKind::AtomicLoad { pointer } => {
                smallvec::smallvec![pointer]
            }
            InstructionKind::Store { pointer, value } => smallvec::smallvec![pointer, value],
            InstructionKind::AtomicCmpXchg {
                pointer,
                expected,
                replacement,
            } => smallvec::smallvec![pointer, expected, replacement],
            InstructionKind::Call { arguments, .. } => arguments.iter_mut().collect(),
            InstructionKind::CondBranch { condition, .. } => smallvec::smallvec![condition],
            InstructionKind::Return { value } => value.iter_mut().collect(),
            InstructionKind::Branch { .. } | InstructionKind::Unreachable => SmallVec::new(),
        }
    }
    /// replace every use of `old` with `new`, returning `true` if anything changed
    pub fn replace_uses_of(&mut self, old: Value, new: Value) -> bool {
        let mut changed = false;
        for operand in self.operands_mut() {
            if *operand == old {
                *operand = new;
                changed = true;
            }
        }
        changed
    }
    /// the blocks a terminator can transfer control to
    pub fn successors(&self) -> SmallVec<[Handle<Block>; 2]> {
        match *self {
            InstructionKind::Branch { target } => smallvec::smallvec![target],
            InstructionKind::CondBranch {
                true_target,
                false_target,
                ..
            } => smallvec::smallvec![true_target, false_target],
            _ => SmallVec::new(),
        }
    }
    /// redirect branch edges to `old` to `new`, returning `true` if anything changed
    pub fn replace_successor(&mut self, old: Handle<Block>, new: Handle<Block>) -> bool {
        let mut changed = false;
        let mut replace = |target: &mut Handle<Block>| {
            if *target == old {
                *target = new;
                changed = true;
            }
        };
        match self {
            InstructionKind::Branch { target } => replace(target),
            InstructionKind::CondBranch {
                true_target,
                false_target,
                ..
            } => {
                replace(true_target);
                replace(false_target);
            }
            _ => {}
        }
        changed
    }
    /// returns `true` if `self` must be the last instruction of a block
    pub fn is_terminator(&self) -> bool {
        match self {
            InstructionKind::Branch { .. }
            | InstructionKind::CondBranch { .. }
            | InstructionKind::Return { .. }
            | InstructionKind::Unreachable => true,
            _ => false,
        }
    }
    /// returns `true` if `self` is a phi
    pub fn is_phi(&self) -> bool {
        match self {
            InstructionKind::Phi { .. } => true,
            _ => false,
        }
    }
    /// returns `true` if `self` is a call
    pub fn is_call(&self) -> bool {
        match self {
            InstructionKind::Call { .. } => true,
            _ => false,
        }
    }
    /// returns `true` if `self` writes memory, is atomic or calls unknown code
    pub fn has_side_effects(&self) -> bool {
        match self {
            InstructionKind::Store { .. }
            | InstructionKind::AtomicLoad { .. }
            | InstructionKind::AtomicCmpXchg { .. } => true,
            InstructionKind::Call {
                callee: Callee::Intrinsic(intrinsic),
                ..
            } => intrinsic.has_side_effects(),
            InstructionKind::Call {
                callee: Callee::External(_),
                ..
            } => true,
            _ => false,
        }
    }
    /// the called intrinsic, if `self` is an intrinsic call
    pub fn intrinsic(&self) -> Option<Intrinsic> {
        match self {
            InstructionKind::Call {
                callee: Callee::Intrinsic(intrinsic),
                ..
            } => Some(*intrinsic),
            _ => None,
        }
    }
}

bitflags! {
    /// position of an instruction within a run of divergent resource accesses
    /// that the backend emits inside a single resource loop
    ///
    /// a run of one access is `START | END`
    #[derive(Default)]
    pub struct ResourceLoopMarker: u8 {
        /// first access of a run
        const START = 0b001;
        /// member of a run after the first
        const INSIDE = 0b010;
        /// last access of a run
        const END = 0b100;
    }
}

impl ResourceLoopMarker {
    /// not part of any run
    pub const OUTSIDE: ResourceLoopMarker = ResourceLoopMarker::empty();
}

impl fmt::Display for ResourceLoopMarker {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("outside");
        }
        let mut separator = "";
        for &(flag, text) in &[
            (ResourceLoopMarker::START, "start"),
            (ResourceLoopMarker::INSIDE, "inside"),
            (ResourceLoopMarker::END, "end"),
        ] {
            if self.contains(flag) {
                write!(f, "{}{}", separator, text)?;
                separator = "|";
            }
        }
        Ok(())
    }
}

/// an instruction and its result
#[derive(Clone, Debug)]
pub struct Instruction {
    /// what the instruction does
    pub kind: InstructionKind,
    /// the result type, `Type::Void` if there is no result
    pub ty: Type,
    /// the name of the result -- doesn't need to be unique
    pub name: String,
    /// resource loop annotation
    pub resource_loop_marker: ResourceLoopMarker,
    pub(crate) block: Option<Handle<Block>>,
}

impl Instruction {
    /// create a new detached `Instruction`
    pub fn new(kind: InstructionKind, ty: Type) -> Self {
        Instruction {
            kind,
            ty,
            name: String::new(),
            resource_loop_marker: ResourceLoopMarker::OUTSIDE,
            block: None,
        }
    }
    /// the block `self` is in, `None` if detached
    pub fn block(&self) -> Option<Handle<Block>> {
        self.block
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;

    #[test]
    fn test_text_enums() {
        assert_eq!(BinaryOp::UMin.text(), "umin");
        assert_eq!(CompareOp::Ne.to_string(), "ne");
        assert_eq!(
            Intrinsic::WaveReduce(ReduceOp::UMax).to_string(),
            "wave_reduce.umax"
        );
    }

    #[test]
    fn test_replace_uses_of() {
        let mut kind = InstructionKind::Binary {
            op: BinaryOp::Add,
            lhs: Value::Argument(0),
            rhs: Value::Argument(0),
        };
        assert!(kind.replace_uses_of(Value::Argument(0), Value::Argument(1)));
        assert_eq!(
            kind.operands().as_slice(),
            &[Value::Argument(1), Value::Argument(1)]
        );
        assert!(!kind.replace_uses_of(Value::Argument(0), Value::Argument(2)));
    }

    #[test]
    fn test_successors() {
        let mut blocks = Arena::new();
        let a = blocks.append(Block::new("a"));
        let b = blocks.append(Block::new("b"));
        let c = blocks.append(Block::new("c"));
        let mut kind = InstructionKind::CondBranch {
            condition: Value::Argument(0),
            true_target: a,
            false_target: b,
        };
        assert!(kind.is_terminator());
        assert_eq!(kind.successors().as_slice(), &[a, b]);
        assert!(kind.replace_successor(b, c));
        assert_eq!(kind.successors().as_slice(), &[a, c]);
        assert!(InstructionKind::Unreachable.successors().is_empty());
    }

    #[test]
    fn test_side_effects() {
        let call = |intrinsic| InstructionKind::Call {
            callee: Callee::Intrinsic(intrinsic),
            arguments: SmallVec::new(),
        };
        assert!(call(Intrinsic::BlockWrite).has_side_effects());
        assert!(!call(Intrinsic::BlockRead).has_side_effects());
        assert!(!call(Intrinsic::LifetimeStart).has_side_effects());
        assert!(InstructionKind::Call {
            callee: Callee::External("f".into()),
            arguments: SmallVec::new(),
        }
        .has_side_effects());
    }

    #[test]
    fn test_resource_loop_marker_display() {
        assert_eq!(ResourceLoopMarker::default(), ResourceLoopMarker::OUTSIDE);
        assert_eq!(ResourceLoopMarker::OUTSIDE.to_string(), "outside");
        assert_eq!(
            (ResourceLoopMarker::START | ResourceLoopMarker::END).to_string(),
            "start|end"
        );
    }
}
