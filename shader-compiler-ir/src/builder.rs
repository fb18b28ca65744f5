// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! instruction builder

use crate::arena::Handle;
use crate::function::Block;
use crate::function::Function;
use crate::function::InsertPoint;
use crate::instructions::BinaryOp;
use crate::instructions::Callee;
use crate::instructions::CastOp;
use crate::instructions::CompareOp;
use crate::instructions::Instruction;
use crate::instructions::InstructionKind;
use crate::instructions::Intrinsic;
use crate::instructions::ReduceOp;
use crate::types::Type;
use crate::value::Value;
use smallvec::SmallVec;

/// inserts instructions at a moving insert point, inferring result types
///
/// consecutive instructions are inserted in program order
pub struct Builder<'f> {
    function: &'f mut Function,
    point: InsertPoint,
}

impl<'f> Builder<'f> {
    /// create a builder appending to the end of `block`
    pub fn new(function: &'f mut Function, block: Handle<Block>) -> Self {
        Self::at(function, InsertPoint::BlockEnd(block))
    }
    /// create a builder inserting at `point`
    pub fn at(function: &'f mut Function, point: InsertPoint) -> Self {
        Builder { function, point }
    }
    /// the function being built
    pub fn function(&mut self) -> &mut Function {
        &mut *self.function
    }
    /// move the insert point to the end of `block`
    pub fn switch_to_block(&mut self, block: Handle<Block>) {
        self.point = InsertPoint::BlockEnd(block);
    }
    /// insert an instruction with the given kind and result type
    pub fn push(&mut self, kind: InstructionKind, ty: Type) -> Handle<Instruction> {
        let instruction = self.function.add_instruction(self.point, kind, ty);
        match self.point {
            InsertPoint::After(_) | InsertPoint::AfterPhis(_) => {
                self.point = InsertPoint::After(instruction);
            }
            InsertPoint::Before(_)
            | InsertPoint::BeforeTerminator(_)
            | InsertPoint::BlockEnd(_) => {}
        }
        instruction
    }
    /// insert an instruction and name its result
    pub fn push_named(
        &mut self,
        name: impl Into<String>,
        kind: InstructionKind,
        ty: Type,
    ) -> Value {
        let instruction = self.push(kind, ty);
        self.function.instructions[instruction].name = name.into();
        Value::Instruction(instruction)
    }
    fn value(&mut self, kind: InstructionKind, ty: Type) -> Value {
        Value::Instruction(self.push(kind, ty))
    }
    /// shorthand for `Function::const_i32`
    pub fn const_i32(&mut self, value: i32) -> Value {
        self.function.const_i32(value)
    }
    /// shorthand for `Function::const_bool`
    pub fn const_bool(&mut self, value: bool) -> Value {
        self.function.const_bool(value)
    }
    /// `op lhs, rhs` with the type of `lhs`
    pub fn binary(&mut self, op: BinaryOp, lhs: Value, rhs: Value) -> Value {
        let ty = self.function.value_type(lhs);
        self.value(InstructionKind::Binary { op, lhs, rhs }, ty)
    }
    /// `cmp.op lhs, rhs`
    pub fn compare(&mut self, op: CompareOp, lhs: Value, rhs: Value) -> Value {
        self.value(InstructionKind::Compare { op, lhs, rhs }, Type::BOOL)
    }
    /// convert `value` to `ty`
    pub fn cast(&mut self, op: CastOp, value: Value, ty: Type) -> Value {
        self.value(InstructionKind::Cast { op, value }, ty)
    }
    /// `condition ? true_value : false_value`
    pub fn select(&mut self, condition: Value, true_value: Value, false_value: Value) -> Value {
        let ty = self.function.value_type(true_value);
        self.value(
            InstructionKind::Select {
                condition,
                true_value,
                false_value,
            },
            ty,
        )
    }
    /// `base + index * stride` with the type of `base`
    pub fn gep(&mut self, base: Value, index: Value, stride: u64) -> Value {
        let ty = self.function.value_type(base);
        self.value(InstructionKind::GetElementPtr { base, index, stride }, ty)
    }
    /// extract element `index` of `vector`
    pub fn extract_element(&mut self, vector: Value, index: Value) -> Value {
        let ty = self
            .function
            .value_type(vector)
            .element_type()
            .map_or(Type::Void, Type::Scalar);
        self.value(InstructionKind::ExtractElement { vector, index }, ty)
    }
    /// a phi of type `ty`
    pub fn phi(&mut self, ty: Type, incoming: Vec<(Handle<Block>, Value)>) -> Value {
        self.value(InstructionKind::Phi { incoming }, ty)
    }
    /// read a `ty` from `pointer`
    pub fn load(&mut self, ty: Type, pointer: Value) -> Value {
        self.value(InstructionKind::Load { pointer }, ty)
    }
    /// write `value` to `pointer`
    pub fn store(&mut self, pointer: Value, value: Value) -> Handle<Instruction> {
        self.push(InstructionKind::Store { pointer, value }, Type::Void)
    }
    /// atomically read a `ty` from `pointer`
    pub fn atomic_load(&mut self, ty: Type, pointer: Value) -> Value {
        self.value(InstructionKind::AtomicLoad { pointer }, ty)
    }
    /// atomic compare-exchange, with the type of `expected`
    pub fn atomic_cmpxchg(&mut self, pointer: Value, expected: Value, replacement: Value) -> Value {
        let ty = self.function.value_type(expected);
        self.value(
            InstructionKind::AtomicCmpXchg {
                pointer,
                expected,
                replacement,
            },
            ty,
        )
    }
    /// call an intrinsic with an explicit result type
    pub fn call_intrinsic(&mut self, intrinsic: Intrinsic, arguments: &[Value], ty: Type) -> Value {
        self.value(
            InstructionKind::Call {
                callee: Callee::Intrinsic(intrinsic),
                arguments: SmallVec::from_slice(arguments),
            },
            ty,
        )
    }
    /// call an intrinsic that takes no arguments and has a fixed result type,
    /// like `Intrinsic::SubgroupLocalInvocationId`
    pub fn intrinsic(&mut self, intrinsic: Intrinsic) -> Value {
        let ty = intrinsic.fixed_result_type().unwrap_or(Type::I32);
        self.call_intrinsic(intrinsic, &[], ty)
    }
    /// call an external function
    pub fn call_external(
        &mut self,
        name: impl Into<String>,
        arguments: &[Value],
        ty: Type,
    ) -> Value {
        self.value(
            InstructionKind::Call {
                callee: Callee::External(name.into()),
                arguments: SmallVec::from_slice(arguments),
            },
            ty,
        )
    }
    /// combine `value` across the active lanes
    pub fn wave_reduce(&mut self, op: ReduceOp, value: Value) -> Value {
        let ty = self.function.value_type(value);
        self.call_intrinsic(Intrinsic::WaveReduce(op), &[value], ty)
    }
    /// read `value` from lane `lane`
    pub fn wave_shuffle(&mut self, value: Value, lane: Value) -> Value {
        let ty = self.function.value_type(value);
        self.call_intrinsic(Intrinsic::WaveShuffle, &[value, lane], ty)
    }
    /// bit mask of the active lanes where `flag` is set
    pub fn wave_ballot(&mut self, flag: Value) -> Value {
        self.call_intrinsic(Intrinsic::WaveBallot, &[flag], Type::I64)
    }
    /// read a `ty` from `resource`
    pub fn resource_load(&mut self, ty: Type, resource: Value, coordinate: Value) -> Value {
        self.call_intrinsic(Intrinsic::ResourceLoad, &[resource, coordinate], ty)
    }
    /// sample a `ty` from `resource`
    pub fn resource_sample(
        &mut self,
        ty: Type,
        resource: Value,
        sampler: Value,
        coordinate: Value,
    ) -> Value {
        self.call_intrinsic(
            Intrinsic::ResourceSample,
            &[resource, sampler, coordinate],
            ty,
        )
    }
    /// write `value` to `resource`
    pub fn resource_store(&mut self, resource: Value, coordinate: Value, value: Value) -> Value {
        self.call_intrinsic(
            Intrinsic::ResourceStore,
            &[resource, coordinate, value],
            Type::Void,
        )
    }
    /// subgroup block read of a `ty` per lane
    pub fn block_read(&mut self, ty: Type, address: Value) -> Value {
        self.call_intrinsic(Intrinsic::BlockRead, &[address], ty)
    }
    /// subgroup block write of `value`
    pub fn block_write(&mut self, address: Value, value: Value) -> Value {
        self.call_intrinsic(Intrinsic::BlockWrite, &[address, value], Type::Void)
    }
    /// unconditional branch
    pub fn branch(&mut self, target: Handle<Block>) -> Handle<Instruction> {
        self.push(InstructionKind::Branch { target }, Type::Void)
    }
    /// conditional branch
    pub fn cond_branch(
        &mut self,
        condition: Value,
        true_target: Handle<Block>,
        false_target: Handle<Block>,
    ) -> Handle<Instruction> {
        self.push(
            InstructionKind::CondBranch {
                condition,
                true_target,
                false_target,
            },
            Type::Void,
        )
    }
    /// return from the function
    pub fn ret(&mut self, value: Option<Value>) -> Handle<Instruction> {
        self.push(InstructionKind::Return { value }, Type::Void)
    }
    /// mark the end of the block unreachable
    pub fn unreachable(&mut self) -> Handle<Instruction> {
        self.push(InstructionKind::Unreachable, Type::Void)
    }
}
