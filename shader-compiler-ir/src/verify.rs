// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! structural verifier

use crate::function::Function;
use crate::instructions::InstructionKind;
use crate::order::InstructionOrder;
use crate::value::Value;
use hashbrown::HashMap;
use hashbrown::HashSet;
use thiserror::Error;

/// a structural problem found by `verify`
///
/// instructions and blocks are identified by their arena index
#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum VerifyError {
    /// the function has no blocks
    #[error("function has no entry block")]
    NoEntryBlock,
    /// a block doesn't end in a terminator
    #[error("block {block} doesn't end in a terminator")]
    MissingTerminator {
        /// the block
        block: usize,
    },
    /// a terminator is followed by more instructions
    #[error("terminator %{instruction} isn't the last instruction of its block")]
    TerminatorNotLast {
        /// the terminator
        instruction: usize,
    },
    /// an instruction's block link disagrees with the block containing it
    #[error("instruction %{instruction} is in block {block} but doesn't record it")]
    WrongParentBlock {
        /// the instruction
        instruction: usize,
        /// the block containing the instruction
        block: usize,
    },
    /// an operand refers to a detached or nonexistent instruction
    #[error("instruction %{instruction} uses detached or missing instruction %{operand}")]
    DanglingOperand {
        /// the user
        instruction: usize,
        /// the used instruction
        operand: usize,
    },
    /// an operand refers to a nonexistent argument
    #[error("instruction %{instruction} uses missing argument {argument}")]
    InvalidArgument {
        /// the user
        instruction: usize,
        /// the argument index
        argument: u32,
    },
    /// an operand refers to a nonexistent constant
    #[error("instruction %{instruction} uses missing constant {constant}")]
    InvalidConstant {
        /// the user
        instruction: usize,
        /// the constant index
        constant: usize,
    },
    /// a branch targets a block that isn't in the layout
    #[error("instruction %{instruction} branches to block {block} which isn't in the function")]
    InvalidBranchTarget {
        /// the branch
        instruction: usize,
        /// the target
        block: usize,
    },
    /// a phi follows a non-phi instruction
    #[error("phi %{instruction} isn't at the start of its block")]
    PhiNotAtStart {
        /// the phi
        instruction: usize,
    },
    /// a phi's incoming blocks differ from its block's predecessors
    #[error("phi %{instruction} incoming blocks don't match the block's predecessors")]
    PhiIncomingMismatch {
        /// the phi
        instruction: usize,
    },
    /// an instruction uses a value defined later in the same block
    #[error("instruction %{instruction} uses %{operand} before its definition")]
    UseBeforeDefinition {
        /// the user
        instruction: usize,
        /// the used instruction
        operand: usize,
    },
}

/// check the structure of `function`
pub fn verify(function: &Function) -> Result<(), VerifyError> {
    let entry = function.entry_block().ok_or(VerifyError::NoEntryBlock)?;
    let in_layout: HashSet<_> = function.layout().iter().copied().collect();
    let mut predecessors: HashMap<_, HashSet<_>> = HashMap::new();
    predecessors.entry(entry).or_default();
    for &block in function.layout() {
        let instructions = function.blocks[block].instructions();
        let terminator = function
            .terminator(block)
            .ok_or(VerifyError::MissingTerminator {
                block: block.index(),
            })?;
        let mut seen_non_phi = false;
        for &instruction in instructions {
            let data = &function.instructions[instruction];
            if data.block() != Some(block) {
                return Err(VerifyError::WrongParentBlock {
                    instruction: instruction.index(),
                    block: block.index(),
                });
            }
            if data.kind.is_terminator() && instruction != terminator {
                return Err(VerifyError::TerminatorNotLast {
                    instruction: instruction.index(),
                });
            }
            if data.kind.is_phi() {
                if seen_non_phi {
                    return Err(VerifyError::PhiNotAtStart {
                        instruction: instruction.index(),
                    });
                }
            } else {
                seen_non_phi = true;
            }
        }
        for successor in function.successors(block) {
            if !in_layout.contains(&successor) {
                return Err(VerifyError::InvalidBranchTarget {
                    instruction: terminator.index(),
                    block: successor.index(),
                });
            }
            predecessors.entry(successor).or_default().insert(block);
        }
    }
    let order = InstructionOrder::new(function);
    for instruction in function.attached_instructions() {
        let data = &function.instructions[instruction];
        for operand in data.kind.operands() {
            match operand {
                Value::Argument(argument) => {
                    if argument as usize >= function.arguments.len() {
                        return Err(VerifyError::InvalidArgument {
                            instruction: instruction.index(),
                            argument,
                        });
                    }
                }
                Value::Constant(constant) => {
                    if function.constants.try_get(constant).is_none() {
                        return Err(VerifyError::InvalidConstant {
                            instruction: instruction.index(),
                            constant: constant.index(),
                        });
                    }
                }
                Value::Instruction(operand) => {
                    let attached = function
                        .instructions
                        .try_get(operand)
                        .and_then(|operand| operand.block())
                        .map_or(false, |block| in_layout.contains(&block));
                    if !attached {
                        return Err(VerifyError::DanglingOperand {
                            instruction: instruction.index(),
                            operand: operand.index(),
                        });
                    }
                    if !data.kind.is_phi()
                        && (operand == instruction || order.precedes(instruction, operand))
                    {
                        return Err(VerifyError::UseBeforeDefinition {
                            instruction: instruction.index(),
                            operand: operand.index(),
                        });
                    }
                }
            }
        }
        if let InstructionKind::Phi { incoming } = &data.kind {
            let incoming_blocks: HashSet<_> = incoming.iter().map(|&(block, _)| block).collect();
            let expected = data.block().and_then(|block| predecessors.get(&block));
            let matches = match expected {
                Some(expected) => *expected == incoming_blocks && incoming.len() == expected.len(),
                None => incoming.is_empty(),
            };
            if !matches {
                return Err(VerifyError::PhiIncomingMismatch {
                    instruction: instruction.index(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::function::FunctionKind;
    use crate::instructions::BinaryOp;
    use crate::instructions::CompareOp;
    use crate::types::Type;
    use crate::value::Argument;
    use crate::value::ArgumentKind;

    fn diamond() -> Function {
        let mut function = Function::new(
            "diamond",
            FunctionKind::Kernel,
            vec![Argument::new("a", Type::I32, ArgumentKind::PerInvocation)],
            Type::I32,
        );
        let entry = function.add_block("entry");
        let left = function.add_block("left");
        let right = function.add_block("right");
        let join = function.add_block("join");
        let mut builder = Builder::new(&mut function, entry);
        let zero = builder.const_i32(0);
        let condition = builder.compare(CompareOp::SLt, Value::Argument(0), zero);
        builder.cond_branch(condition, left, right);
        builder.switch_to_block(left);
        let negated = builder.binary(BinaryOp::Sub, zero, Value::Argument(0));
        builder.branch(join);
        builder.switch_to_block(right);
        builder.branch(join);
        builder.switch_to_block(join);
        let merged = builder.phi(
            Type::I32,
            vec![(left, negated), (right, Value::Argument(0))],
        );
        builder.ret(Some(merged));
        function
    }

    #[test]
    fn test_valid() {
        assert_eq!(verify(&diamond()), Ok(()));
    }

    #[test]
    fn test_missing_terminator() {
        let mut function = diamond();
        let entry = function.entry_block().unwrap();
        let terminator = function.terminator(entry).unwrap();
        function.detach_instruction(terminator);
        assert_eq!(
            verify(&function),
            Err(VerifyError::MissingTerminator {
                block: entry.index()
            })
        );
    }

    #[test]
    fn test_dangling_operand() {
        let mut function = diamond();
        let entry = function.entry_block().unwrap();
        let condition = function.blocks[entry].instructions()[0];
        function.detach_instruction(condition);
        assert!(match verify(&function) {
            Err(VerifyError::DanglingOperand { operand, .. }) => operand == condition.index(),
            _ => false,
        });
    }

    #[test]
    fn test_phi_incoming_mismatch() {
        let mut function = diamond();
        let join = function.layout()[3];
        let phi = function.blocks[join].instructions()[0];
        if let InstructionKind::Phi { incoming } = &mut function.instructions[phi].kind {
            incoming.pop();
        }
        assert_eq!(
            verify(&function),
            Err(VerifyError::PhiIncomingMismatch {
                instruction: phi.index()
            })
        );
    }

    #[test]
    fn test_use_before_definition() {
        let mut function = diamond();
        let left = function.layout()[1];
        let negated = function.blocks[left].instructions()[0];
        let user = function.add_instruction(
            crate::function::InsertPoint::Before(negated),
            InstructionKind::Binary {
                op: BinaryOp::Add,
                lhs: Value::Instruction(negated),
                rhs: Value::Instruction(negated),
            },
            Type::I32,
        );
        assert_eq!(
            verify(&function),
            Err(VerifyError::UseBeforeDefinition {
                instruction: user.index(),
                operand: negated.index(),
            })
        );
    }
}
