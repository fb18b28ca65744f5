// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! def-use information

use crate::arena::Handle;
use crate::function::Function;
use crate::instructions::Instruction;
use crate::value::Value;
use hashbrown::HashMap;
use smallvec::SmallVec;

/// snapshot of the users of every value, taken from the attached instructions
///
/// an instruction using a value more than once is listed once
#[derive(Clone, Debug, Default)]
pub struct UseMap {
    users: HashMap<Value, SmallVec<[Handle<Instruction>; 4]>>,
}

impl UseMap {
    /// compute the users of every value in `function`
    pub fn new(function: &Function) -> Self {
        let mut users: HashMap<Value, SmallVec<[Handle<Instruction>; 4]>> = HashMap::new();
        for instruction in function.attached_instructions() {
            for operand in function.instructions[instruction].kind.operands() {
                let operand_users = users.entry(operand).or_default();
                if operand_users.last() != Some(&instruction) {
                    operand_users.push(instruction);
                }
            }
        }
        UseMap { users }
    }
    /// the instructions using `value`, in layout order
    pub fn users(&self, value: Value) -> &[Handle<Instruction>] {
        self.users.get(&value).map_or(&[][..], |users| &users[..])
    }
    /// returns `true` if nothing uses `value`
    pub fn is_unused(&self, value: Value) -> bool {
        self.users(value).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::function::FunctionKind;
    use crate::instructions::BinaryOp;
    use crate::types::Type;
    use crate::value::Argument;
    use crate::value::ArgumentKind;

    #[test]
    fn test_users() {
        let mut function = Function::new(
            "f",
            FunctionKind::Kernel,
            vec![Argument::new("a", Type::I32, ArgumentKind::PerInvocation)],
            Type::I32,
        );
        let entry = function.add_block("entry");
        let mut builder = Builder::new(&mut function, entry);
        let a = Value::Argument(0);
        let doubled = builder.binary(BinaryOp::Add, a, a);
        let tripled = builder.binary(BinaryOp::Add, doubled, a);
        let ret = builder.ret(Some(tripled));
        let use_map = UseMap::new(&function);
        assert_eq!(
            use_map.users(a),
            &[doubled.instruction().unwrap(), tripled.instruction().unwrap()]
        );
        assert_eq!(use_map.users(tripled), &[ret]);
        assert!(use_map.is_unused(Value::Instruction(ret)));
    }
}
