// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! functions and basic blocks

use crate::arena::Arena;
use crate::arena::Handle;
use crate::consts::Constant;
use crate::instructions::Instruction;
use crate::instructions::InstructionKind;
use crate::types::Type;
use crate::value::Argument;
use crate::value::Value;
use smallvec::SmallVec;

/// a basic block: a list of instructions ending in a terminator
#[derive(Clone, Debug)]
pub struct Block {
    /// the name of the block -- doesn't need to be unique
    pub name: String,
    instructions: Vec<Handle<Instruction>>,
}

impl Block {
    /// create a new empty `Block`
    pub fn new(name: impl Into<String>) -> Self {
        Block {
            name: name.into(),
            instructions: Vec::new(),
        }
    }
    /// the instructions in `self`, in execution order
    pub fn instructions(&self) -> &[Handle<Instruction>] {
        &self.instructions
    }
}

/// whether a function is an entry point
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum FunctionKind {
    /// an entry point, launched for every invocation of a dispatch
    Kernel,
    /// a function called from other functions
    Subroutine,
}

/// where to insert an instruction
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum InsertPoint {
    /// immediately before the instruction
    Before(Handle<Instruction>),
    /// immediately after the instruction
    After(Handle<Instruction>),
    /// after the phis at the start of the block
    AfterPhis(Handle<Block>),
    /// before the block's terminator, or at the end if there is none
    BeforeTerminator(Handle<Block>),
    /// at the end of the block
    BlockEnd(Handle<Block>),
}

/// a function
///
/// instructions are owned by `instructions`; removing an instruction from its
/// block only detaches it, so handles stay valid
#[derive(Clone, Debug)]
pub struct Function {
    /// the name of the `Function` -- doesn't need to be unique
    pub name: String,
    /// whether `self` is an entry point
    pub kind: FunctionKind,
    /// the arguments
    pub arguments: Vec<Argument>,
    /// the return type
    pub return_type: Type,
    /// storage for the blocks
    pub blocks: Arena<Block>,
    /// storage for the instructions
    pub instructions: Arena<Instruction>,
    /// storage for the constants
    pub constants: Arena<Constant>,
    layout: Vec<Handle<Block>>,
}

impl Function {
    /// create a new `Function` with no blocks
    pub fn new(
        name: impl Into<String>,
        kind: FunctionKind,
        arguments: Vec<Argument>,
        return_type: Type,
    ) -> Self {
        Function {
            name: name.into(),
            kind,
            arguments,
            return_type,
            blocks: Arena::new(),
            instructions: Arena::new(),
            constants: Arena::new(),
            layout: Vec::new(),
        }
    }
    /// add a new empty block at the end of the layout.
    /// the first block added is the entry block.
    pub fn add_block(&mut self, name: impl Into<String>) -> Handle<Block> {
        let block = self.blocks.append(Block::new(name));
        self.layout.push(block);
        block
    }
    /// the blocks in layout order, the entry block first
    pub fn layout(&self) -> &[Handle<Block>] {
        &self.layout
    }
    /// the entry block
    pub fn entry_block(&self) -> Option<Handle<Block>> {
        self.layout.first().copied()
    }
    /// get a constant value, reusing an existing equal constant
    pub fn constant(&mut self, constant: Constant) -> Value {
        if let Some((handle, _)) = self.constants.iter().find(|&(_, c)| *c == constant) {
            return Value::Constant(handle);
        }
        Value::Constant(self.constants.append(constant))
    }
    /// shorthand for `self.constant(Constant::i32(value))`
    pub fn const_i32(&mut self, value: i32) -> Value {
        self.constant(Constant::i32(value))
    }
    /// shorthand for `self.constant(Constant::i64(value))`
    pub fn const_i64(&mut self, value: i64) -> Value {
        self.constant(Constant::i64(value))
    }
    /// shorthand for `self.constant(Constant::bool(value))`
    pub fn const_bool(&mut self, value: bool) -> Value {
        self.constant(Constant::bool(value))
    }
    /// the constant `value` refers to, if any
    pub fn constant_value(&self, value: Value) -> Option<Constant> {
        value.constant().map(|constant| self.constants[constant])
    }
    /// the type of `value`
    pub fn value_type(&self, value: Value) -> Type {
        match value {
            Value::Argument(index) => self
                .arguments
                .get(index as usize)
                .map_or(Type::Void, |argument| argument.ty),
            Value::Constant(constant) => self.constants[constant].value_type(),
            Value::Instruction(instruction) => self.instructions[instruction].ty,
        }
    }
    /// the block `value` is defined in: the entry block for arguments, `None` for constants
    pub fn defining_block(&self, value: Value) -> Option<Handle<Block>> {
        match value {
            Value::Argument(_) => self.entry_block(),
            Value::Constant(_) => None,
            Value::Instruction(instruction) => self.instructions[instruction].block(),
        }
    }
    /// create a detached instruction
    pub fn create_instruction(&mut self, kind: InstructionKind, ty: Type) -> Handle<Instruction> {
        self.instructions.append(Instruction::new(kind, ty))
    }
    /// attach a detached instruction at `point`
    pub fn insert_instruction(&mut self, instruction: Handle<Instruction>, point: InsertPoint) {
        debug_assert!(
            self.instructions[instruction].block.is_none(),
            "instruction is already attached"
        );
        let (block, position) = self.resolve_insert_point(point);
        self.blocks[block]
            .instructions
            .insert(position, instruction);
        self.instructions[instruction].block = Some(block);
    }
    /// create an instruction and attach it at `point`
    pub fn add_instruction(
        &mut self,
        point: InsertPoint,
        kind: InstructionKind,
        ty: Type,
    ) -> Handle<Instruction> {
        let instruction = self.create_instruction(kind, ty);
        self.insert_instruction(instruction, point);
        instruction
    }
    /// detach `instruction` from its block; the instruction's storage stays valid
    pub fn detach_instruction(&mut self, instruction: Handle<Instruction>) {
        if let Some(block) = self.instructions[instruction].block.take() {
            self.blocks[block]
                .instructions
                .retain(|&other| other != instruction);
        }
    }
    fn resolve_insert_point(&self, point: InsertPoint) -> (Handle<Block>, usize) {
        let position_of = |instruction: Handle<Instruction>| {
            let block = self.instructions[instruction]
                .block
                .expect("insert point instruction is detached");
            let position = self.blocks[block]
                .instructions
                .iter()
                .position(|&other| other == instruction)
                .expect("attached instruction is in its block");
            (block, position)
        };
        match point {
            InsertPoint::Before(instruction) => position_of(instruction),
            InsertPoint::After(instruction) => {
                let (block, position) = position_of(instruction);
                (block, position + 1)
            }
            InsertPoint::AfterPhis(block) => (block, self.phis(block).count()),
            InsertPoint::BeforeTerminator(block) => {
                let len = self.blocks[block].instructions.len();
                match self.terminator(block) {
                    Some(_) => (block, len - 1),
                    None => (block, len),
                }
            }
            InsertPoint::BlockEnd(block) => (block, self.blocks[block].instructions.len()),
        }
    }
    /// the phis at the start of `block`
    pub fn phis<'a>(
        &'a self,
        block: Handle<Block>,
    ) -> impl Iterator<Item = Handle<Instruction>> + 'a {
        self.blocks[block]
            .instructions
            .iter()
            .copied()
            .take_while(move |&instruction| self.instructions[instruction].kind.is_phi())
    }
    /// the terminator of `block`, if its last instruction is one
    pub fn terminator(&self, block: Handle<Block>) -> Option<Handle<Instruction>> {
        self.blocks[block]
            .instructions
            .last()
            .copied()
            .filter(|&instruction| self.instructions[instruction].kind.is_terminator())
    }
    /// the successors of `block`
    pub fn successors(&self, block: Handle<Block>) -> SmallVec<[Handle<Block>; 2]> {
        self.terminator(block)
            .map(|terminator| self.instructions[terminator].kind.successors())
            .unwrap_or_default()
    }
    /// redirect the edges from `block` to `old_target` to `new_target`
    pub fn redirect_branch(
        &mut self,
        block: Handle<Block>,
        old_target: Handle<Block>,
        new_target: Handle<Block>,
    ) -> bool {
        match self.terminator(block) {
            Some(terminator) => self.instructions[terminator]
                .kind
                .replace_successor(old_target, new_target),
            None => false,
        }
    }
    /// the attached instructions in layout order
    pub fn attached_instructions<'a>(&'a self) -> impl Iterator<Item = Handle<Instruction>> + 'a {
        self.layout
            .iter()
            .flat_map(move |&block| self.blocks[block].instructions.iter().copied())
    }
    /// replace every use of `old` by attached instructions with `new`
    pub fn replace_all_uses(&mut self, old: Value, new: Value) -> bool {
        let attached: Vec<_> = self.attached_instructions().collect();
        let mut changed = false;
        for instruction in attached {
            changed |= self.instructions[instruction]
                .kind
                .replace_uses_of(old, new);
        }
        changed
    }
}
