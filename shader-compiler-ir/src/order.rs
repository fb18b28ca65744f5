// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! instruction order within blocks

use crate::arena::Handle;
use crate::function::Block;
use crate::function::Function;
use crate::instructions::Instruction;
use hashbrown::HashMap;

/// snapshot of the position of every attached instruction within its block
#[derive(Clone, Debug, Default)]
pub struct InstructionOrder {
    positions: HashMap<Handle<Instruction>, (Handle<Block>, usize)>,
}

impl InstructionOrder {
    /// number the instructions of every block of `function`
    pub fn new(function: &Function) -> Self {
        let mut positions = HashMap::new();
        for &block in function.layout() {
            for (position, &instruction) in function.blocks[block].instructions().iter().enumerate()
            {
                positions.insert(instruction, (block, position));
            }
        }
        InstructionOrder { positions }
    }
    /// the block and sequence index of `instruction`
    pub fn position(&self, instruction: Handle<Instruction>) -> Option<(Handle<Block>, usize)> {
        self.positions.get(&instruction).copied()
    }
    /// returns `true` if `a` and `b` are in the same block and `a` comes first
    pub fn precedes(&self, a: Handle<Instruction>, b: Handle<Instruction>) -> bool {
        match (self.position(a), self.position(b)) {
            (Some((block_a, a)), Some((block_b, b))) => block_a == block_b && a < b,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::function::FunctionKind;
    use crate::instructions::Intrinsic;
    use crate::types::Type;

    #[test]
    fn test_precedes() {
        let mut function = Function::new("f", FunctionKind::Kernel, vec![], Type::Void);
        let entry = function.add_block("entry");
        let exit = function.add_block("exit");
        let mut builder = Builder::new(&mut function, entry);
        let a = builder.intrinsic(Intrinsic::SubgroupId).instruction().unwrap();
        let b = builder.intrinsic(Intrinsic::SubgroupSize).instruction().unwrap();
        builder.branch(exit);
        builder.switch_to_block(exit);
        let c = builder.ret(None);
        let order = InstructionOrder::new(&function);
        assert!(order.precedes(a, b));
        assert!(!order.precedes(b, a));
        assert!(!order.precedes(a, a));
        assert!(!order.precedes(a, c));
        assert_eq!(order.position(c), Some((exit, 0)));
    }
}
