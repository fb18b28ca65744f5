// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! textual form of functions, for debugging and test failure messages

use crate::arena::Handle;
use crate::function::Block;
use crate::function::Function;
use crate::function::FunctionKind;
use crate::instructions::Instruction;
use crate::instructions::InstructionKind;
use crate::types::Type;
use crate::value::ArgumentKind;
use crate::value::Value;
use std::fmt;

/// displays a value reference, returned by `Function::display_value`
#[derive(Copy, Clone)]
pub struct DisplayValue<'a> {
    function: &'a Function,
    value: Value,
}

/// displays a block name, returned by `Function::display_block`
#[derive(Copy, Clone)]
pub struct DisplayBlock<'a> {
    function: &'a Function,
    block: Handle<Block>,
}

/// displays an instruction, returned by `Function::display_instruction`
#[derive(Copy, Clone)]
pub struct DisplayInstruction<'a> {
    function: &'a Function,
    instruction: Handle<Instruction>,
}

impl Function {
    /// get a `Display` for a reference to `value`
    pub fn display_value(&self, value: Value) -> DisplayValue {
        DisplayValue {
            function: self,
            value,
        }
    }
    /// get a `Display` for the name of `block`
    pub fn display_block(&self, block: Handle<Block>) -> DisplayBlock {
        DisplayBlock {
            function: self,
            block,
        }
    }
    /// get a `Display` for `instruction`
    pub fn display_instruction(&self, instruction: Handle<Instruction>) -> DisplayInstruction {
        DisplayInstruction {
            function: self,
            instruction,
        }
    }
}

impl fmt::Display for DisplayValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.value {
            Value::Argument(index) => match self.function.arguments.get(index as usize) {
                Some(argument) if !argument.name.is_empty() => write!(f, "%{}", argument.name),
                _ => write!(f, "%arg{}", index),
            },
            Value::Constant(constant) => match self.function.constants.try_get(constant) {
                Some(constant) => write!(f, "{}", constant),
                None => write!(f, "<invalid constant {}>", constant.index()),
            },
            Value::Instruction(instruction) => {
                match self.function.instructions.try_get(instruction) {
                    Some(data) if !data.name.is_empty() => {
                        write!(f, "%{}.{}", data.name, instruction.index())
                    }
                    _ => write!(f, "%{}", instruction.index()),
                }
            }
        }
    }
}

impl fmt::Display for DisplayBlock<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.function.blocks.try_get(self.block) {
            Some(block) if !block.name.is_empty() => write!(f, "{}", block.name),
            _ => write!(f, "bb{}", self.block.index()),
        }
    }
}

impl fmt::Display for DisplayInstruction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let function = self.function;
        let instruction = &function.instructions[self.instruction];
        let v = |value| function.display_value(value);
        let b = |block| function.display_block(block);
        if instruction.ty != Type::Void {
            write!(
                f,
                "{} = ",
                function.display_value(Value::Instruction(self.instruction))
            )?;
        }
        match instruction.kind {
            InstructionKind::Binary { op, lhs, rhs } => {
                write!(f, "{} {} {}, {}", op, instruction.ty, v(lhs), v(rhs))?
            }
            InstructionKind::Compare { op, lhs, rhs } => {
                write!(f, "cmp.{} {}, {}", op, v(lhs), v(rhs))?
            }
            InstructionKind::Cast { op, value } => {
                write!(f, "{} {} to {}", op, v(value), instruction.ty)?
            }
            InstructionKind::Select {
                condition,
                true_value,
                false_value,
            } => write!(
                f,
                "select {}, {}, {}",
                v(condition),
                v(true_value),
                v(false_value)
            )?,
            InstructionKind::GetElementPtr {
                base,
                index,
                stride,
            } => write!(f, "gep {}, {} * {}", v(base), v(index), stride)?,
            InstructionKind::ExtractElement { vector, index } => {
                write!(f, "extract_element {}, {}", v(vector), v(index))?
            }
            InstructionKind::Phi { ref incoming } => {
                write!(f, "phi {}", instruction.ty)?;
                let mut separator = " ";
                for &(block, value) in incoming {
                    write!(f, "{}[{}: {}]", separator, b(block), v(value))?;
                    separator = ", ";
                }
            }
            InstructionKind::Load { pointer } => {
                write!(f, "load {}, {}", instruction.ty, v(pointer))?
            }
            InstructionKind::Store { pointer, value } => {
                write!(f, "store {}, {}", v(pointer), v(value))?
            }
            InstructionKind::AtomicLoad { pointer } => {
                write!(f, "atomic_load {}, {}", instruction.ty, v(pointer))?
            }
            InstructionKind::AtomicCmpXchg {
                pointer,
                expected,
                replacement,
            } => write!(
                f,
                "cmpxchg {}, {}, {}",
                v(pointer),
                v(expected),
                v(replacement)
            )?,
            InstructionKind::Call {
                ref callee,
                ref arguments,
            } => {
                write!(f, "call {} {}(", instruction.ty, callee)?;
                let mut separator = "";
                for &argument in arguments {
                    write!(f, "{}{}", separator, v(argument))?;
                    separator = ", ";
                }
                write!(f, ")")?;
            }
            InstructionKind::Branch { target } => write!(f, "br {}", b(target))?,
            InstructionKind::CondBranch {
                condition,
                true_target,
                false_target,
            } => write!(
                f,
                "br {}, {}, {}",
                v(condition),
                b(true_target),
                b(false_target)
            )?,
            InstructionKind::Return { value: Some(value) } => write!(f, "ret {}", v(value))?,
            InstructionKind::Return { value: None } => write!(f, "ret")?,
            InstructionKind::Unreachable => write!(f, "unreachable")?,
        }
        if !instruction.resource_loop_marker.is_empty() {
            write!(f, " ; resource_loop {}", instruction.resource_loop_marker)?;
        }
        Ok(())
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            FunctionKind::Kernel => write!(f, "kernel")?,
            FunctionKind::Subroutine => write!(f, "fn")?,
        }
        write!(f, " @{}(", self.name)?;
        let mut separator = "";
        for (index, argument) in self.arguments.iter().enumerate() {
            let kind = match argument.kind {
                ArgumentKind::Uniform => "uniform",
                ArgumentKind::PerInvocation => "per_invocation",
            };
            write!(
                f,
                "{}{} {} {}",
                separator,
                kind,
                argument.ty,
                self.display_value(Value::Argument(index as u32))
            )?;
            separator = ", ";
        }
        writeln!(f, ") -> {} {{", self.return_type)?;
        for &block in self.layout() {
            writeln!(f, "{}:", self.display_block(block))?;
            for &instruction in self.blocks[block].instructions() {
                writeln!(f, "    {}", self.display_instruction(instruction))?;
            }
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::instructions::BinaryOp;
    use crate::instructions::CompareOp;
    use crate::value::Argument;

    #[test]
    fn test_display_function() {
        let mut function = Function::new(
            "loop_sum",
            FunctionKind::Kernel,
            vec![
                Argument::new("n", Type::I32, ArgumentKind::Uniform),
                Argument::new("", Type::I32, ArgumentKind::PerInvocation),
            ],
            Type::I32,
        );
        let entry = function.add_block("entry");
        let body = function.add_block("body");
        let exit = function.add_block("");
        let mut builder = Builder::new(&mut function, entry);
        builder.branch(body);
        builder.switch_to_block(body);
        let phi = builder.push_named("i", InstructionKind::Phi { incoming: vec![] }, Type::I32);
        let one = builder.const_i32(1);
        let next = builder.binary(BinaryOp::Add, phi, one);
        let done = builder.compare(CompareOp::Eq, next, Value::Argument(0));
        builder.cond_branch(done, exit, body);
        builder.switch_to_block(exit);
        builder.ret(Some(Value::Argument(1)));
        let zero = function.const_i32(0);
        if let InstructionKind::Phi { incoming } =
            &mut function.instructions[phi.instruction().unwrap()].kind
        {
            incoming.push((entry, zero));
            incoming.push((body, next));
        }
        let text = function.to_string();
        assert_eq!(
            text,
            concat!(
                "kernel @loop_sum(uniform i32 %n, per_invocation i32 %arg1) -> i32 {\n",
                "entry:\n",
                "    br body\n",
                "body:\n",
                "    %i.1 = phi i32 [entry: 0i32], [body: %2]\n",
                "    %2 = add i32 %i.1, 1i32\n",
                "    %3 = cmp.eq %2, %n\n",
                "    br %3, bb2, body\n",
                "bb2:\n",
                "    ret %arg1\n",
                "}"
            )
        );
    }
}
