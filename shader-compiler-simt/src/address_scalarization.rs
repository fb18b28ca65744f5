// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! compute block memory addresses once per subgroup
//!
//! a subgroup block read or write only uses the address of the first lane, so
//! the arithmetic feeding the address can run on lane 0's inputs. the
//! divergent inputs of that arithmetic are replaced by broadcasts of lane 0's
//! value, leaving the whole address chain uniform.

use crate::pass::FunctionAnalyses;
use crate::pass::FunctionPass;
use crate::pass::ADDRESS_SCALARIZATION;
use crate::uniformity::DivergenceClass;
use crate::uniformity::Uniformity;
use hashbrown::HashMap;
use hashbrown::HashSet;
use log::debug;
use log::trace;
use shader_compiler_ir::Builder;
use shader_compiler_ir::Function;
use shader_compiler_ir::Handle;
use shader_compiler_ir::InsertPoint;
use shader_compiler_ir::Instruction;
use shader_compiler_ir::InstructionKind;
use shader_compiler_ir::Intrinsic;
use shader_compiler_ir::UseMap;
use shader_compiler_ir::Value;

/// rewrites the address computations of block reads and writes to use lane 0's inputs
#[derive(Copy, Clone, Debug, Default)]
pub struct AddressScalarization;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum ScalarClass {
    /// another block memory access, ends the walk
    BlockMemOp,
    CanBeScalar,
    PreventScalar,
}

struct ChainWalker<'a> {
    function: &'a Function,
    uniformity: &'a Uniformity,
    use_map: &'a UseMap,
    /// members found to escape the chain, walked as leaves
    excluded: HashSet<Handle<Instruction>>,
}

/// whether `value` is already a broadcast of lane 0
fn is_lane0_broadcast(function: &Function, value: Value) -> bool {
    let instruction = match value {
        Value::Instruction(instruction) => instruction,
        Value::Argument(_) | Value::Constant(_) => return false,
    };
    let kind = &function.instructions[instruction].kind;
    match kind {
        InstructionKind::Call { arguments, .. }
            if kind.intrinsic() == Some(Intrinsic::WaveShuffle) =>
        {
            arguments
                .get(1)
                .and_then(|&lane| function.constant_value(lane))
                .map_or(false, |lane| lane.is_zero())
        }
        _ => false,
    }
}

fn block_memory_address(function: &Function, instruction: Handle<Instruction>) -> Option<Value> {
    let kind = &function.instructions[instruction].kind;
    match kind {
        InstructionKind::Call { arguments, .. }
            if kind.intrinsic().map_or(false, Intrinsic::is_block_memory_access) =>
        {
            arguments.first().copied()
        }
        _ => None,
    }
}

impl<'a> ChainWalker<'a> {
    fn scalar_class(&self, instruction: Handle<Instruction>) -> ScalarClass {
        let function = self.function;
        let data = &function.instructions[instruction];
        if let Some(intrinsic) = data.kind.intrinsic() {
            if intrinsic.is_block_memory_access() {
                return ScalarClass::BlockMemOp;
            }
        }
        let scalarizable_kind = match &data.kind {
            InstructionKind::Binary { .. }
            | InstructionKind::Cast { .. }
            | InstructionKind::GetElementPtr { .. }
            | InstructionKind::Phi { .. } => true,
            InstructionKind::Call { .. } => data
                .kind
                .intrinsic()
                .map_or(false, Intrinsic::is_no_effect_marker),
            _ => false,
        };
        if !scalarizable_kind || data.ty.is_vector() {
            return ScalarClass::PreventScalar;
        }
        if data
            .kind
            .operands()
            .into_iter()
            .any(|operand| function.value_type(operand).is_vector())
        {
            return ScalarClass::PreventScalar;
        }
        // lanes arriving from different predecessors pick different incoming values
        if let InstructionKind::Phi { incoming } = &data.kind {
            if incoming
                .iter()
                .any(|&(predecessor, _)| self.uniformity.is_divergent_control_flow(predecessor))
            {
                return ScalarClass::PreventScalar;
            }
        }
        match data.block() {
            Some(block) if !self.uniformity.is_divergent_control_flow(block) => {
                ScalarClass::CanBeScalar
            }
            _ => ScalarClass::PreventScalar,
        }
    }
    /// walk backward from `instruction`, appending scalarizable members to `chain`
    fn walk(
        &self,
        instruction: Handle<Instruction>,
        visited: &mut HashSet<Handle<Instruction>>,
        on_stack: &mut HashSet<Handle<Instruction>>,
        chain: &mut Vec<Handle<Instruction>>,
    ) {
        if on_stack.contains(&instruction) || !visited.insert(instruction) {
            return;
        }
        if self.excluded.contains(&instruction)
            || self.scalar_class(instruction) != ScalarClass::CanBeScalar
        {
            return;
        }
        on_stack.insert(instruction);
        for operand in self.function.instructions[instruction].kind.operands() {
            if let Value::Instruction(operand) = operand {
                self.walk(operand, visited, on_stack, chain);
            }
        }
        on_stack.remove(&instruction);
        chain.push(instruction);
    }
    /// whether every use of `member` stays in the chain or is a block memory address
    fn uses_stay_in_chain(
        &self,
        member: Handle<Instruction>,
        chain: &HashSet<Handle<Instruction>>,
    ) -> bool {
        let function = self.function;
        let member_value = Value::Instruction(member);
        self.use_map.users(member_value).iter().all(|&user| {
            if chain.contains(&user) {
                return true;
            }
            let kind = &function.instructions[user].kind;
            if kind.intrinsic().map_or(false, Intrinsic::is_no_effect_marker) {
                return true;
            }
            if block_memory_address(function, user) != Some(member_value) {
                return false;
            }
            let only_as_address = kind
                .operands()
                .into_iter()
                .skip(1)
                .all(|operand| operand != member_value);
            only_as_address
                && function.instructions[user]
                    .block()
                    .map_or(false, |block| !self.uniformity.is_divergent_control_flow(block))
        })
    }
    /// the scalarizable chain feeding `address`, in def-before-use order
    fn chain(&mut self, address: Handle<Instruction>) -> Vec<Handle<Instruction>> {
        loop {
            let mut chain = Vec::new();
            self.walk(
                address,
                &mut HashSet::new(),
                &mut HashSet::new(),
                &mut chain,
            );
            let members: HashSet<_> = chain.iter().copied().collect();
            let escaping: Vec<_> = chain
                .iter()
                .copied()
                .filter(|&member| !self.uses_stay_in_chain(member, &members))
                .collect();
            if escaping.is_empty() {
                return chain;
            }
            self.excluded.extend(escaping);
        }
    }
}

struct ScalarizationPlan {
    access: Handle<Instruction>,
    chain: Vec<Handle<Instruction>>,
    /// the divergent values feeding the chain, in discovery order
    leaves: Vec<Value>,
}

fn find_plan(
    function: &Function,
    uniformity: &Uniformity,
    use_map: &UseMap,
    access: Handle<Instruction>,
) -> Result<ScalarizationPlan, &'static str> {
    let block = function.instructions[access]
        .block()
        .ok_or("detached access")?;
    if uniformity.is_divergent_control_flow(block) {
        return Err("access in divergent control flow");
    }
    let address = block_memory_address(function, access)
        .ok_or("no address operand")?
        .instruction()
        .ok_or("address isn't computed")?;
    let mut walker = ChainWalker {
        function,
        uniformity,
        use_map,
        excluded: HashSet::new(),
    };
    let chain = walker.chain(address);
    if chain.is_empty() {
        return Err("address isn't scalarizable");
    }
    let members: HashSet<_> = chain.iter().copied().collect();
    let mut leaves = Vec::new();
    let mut seen = HashSet::new();
    for &member in &chain {
        for operand in function.instructions[member].kind.operands() {
            if operand
                .instruction()
                .map_or(false, |operand| members.contains(&operand))
            {
                continue;
            }
            if uniformity.classify(operand) != DivergenceClass::Divergent
                || is_lane0_broadcast(function, operand)
            {
                continue;
            }
            if seen.insert(operand) {
                leaves.push(operand);
            }
        }
    }
    if leaves.is_empty() {
        return Err("address chain is already uniform");
    }
    for &leaf in &leaves {
        match function.defining_block(leaf) {
            Some(block) if !uniformity.is_divergent_control_flow(block) => {}
            _ => return Err("leaf defined in divergent control flow"),
        }
    }
    Ok(ScalarizationPlan {
        access,
        chain,
        leaves,
    })
}

/// where the broadcast of `leaf` goes: right after its definition
fn broadcast_insert_point(function: &Function, leaf: Value) -> Option<InsertPoint> {
    match leaf {
        Value::Argument(_) => function.entry_block().map(InsertPoint::AfterPhis),
        Value::Constant(_) => None,
        Value::Instruction(instruction) => {
            let data = &function.instructions[instruction];
            if data.kind.is_phi() {
                data.block().map(InsertPoint::AfterPhis)
            } else {
                Some(InsertPoint::After(instruction))
            }
        }
    }
}

fn apply_plan(function: &mut Function, plan: &ScalarizationPlan) -> bool {
    let mut broadcast_cache: HashMap<Value, Value> = HashMap::new();
    let mut changed = false;
    for &leaf in &plan.leaves {
        let still_used = plan.chain.iter().any(|&member| {
            function.instructions[member]
                .kind
                .operands()
                .contains(&leaf)
        });
        // an earlier plan sharing these members already rewired them
        if !still_used {
            continue;
        }
        let point = match broadcast_insert_point(function, leaf) {
            Some(point) => point,
            None => continue,
        };
        let broadcast = match broadcast_cache.get(&leaf) {
            Some(&broadcast) => broadcast,
            None => {
                let lane = function.const_i32(0);
                let broadcast = Builder::at(function, point).wave_shuffle(leaf, lane);
                broadcast_cache.insert(leaf, broadcast);
                broadcast
            }
        };
        for &member in &plan.chain {
            changed |= function.instructions[member]
                .kind
                .replace_uses_of(leaf, broadcast);
        }
    }
    if changed {
        debug!(
            "{}: scalarized the address of {} ({} instructions, {} broadcasts)",
            function.name,
            function.display_value(Value::Instruction(plan.access)),
            plan.chain.len(),
            broadcast_cache.len()
        );
    }
    changed
}

impl FunctionPass for AddressScalarization {
    fn name(&self) -> &'static str {
        ADDRESS_SCALARIZATION
    }
    fn run_with_analyses(&self, function: &mut Function, analyses: &FunctionAnalyses) -> bool {
        let uniformity = analyses.uniformity(function);
        let use_map = UseMap::new(function);
        let accesses: Vec<_> = function
            .attached_instructions()
            .filter(|&instruction| block_memory_address(function, instruction).is_some())
            .collect();
        let mut plans = Vec::new();
        for access in accesses {
            match find_plan(function, uniformity, &use_map, access) {
                Ok(plan) => plans.push(plan),
                Err(reason) => trace!(
                    "{}: not scalarizing {}: {}",
                    function.name,
                    function.display_value(Value::Instruction(access)),
                    reason
                ),
            }
        }
        let mut changed = false;
        for plan in &plans {
            changed |= apply_plan(function, plan);
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shader_compiler_ir::prelude::*;
    use shader_compiler_ir::AddressSpace;
    use shader_compiler_ir::BinaryOp;
    use shader_compiler_ir::IntegerType;

    #[test]
    fn test_lane0_broadcast() {
        let mut function = Function::new(
            "f",
            FunctionKind::Kernel,
            vec![Argument::new("x", Type::I32, ArgumentKind::PerInvocation)],
            Type::Void,
        );
        let entry = function.add_block("entry");
        let mut builder = Builder::new(&mut function, entry);
        let zero = builder.const_i32(0);
        let one = builder.const_i32(1);
        let lane0 = builder.wave_shuffle(Value::Argument(0), zero);
        let lane1 = builder.wave_shuffle(Value::Argument(0), one);
        let sum = builder.binary(BinaryOp::Add, lane0, lane1);
        builder.ret(None);
        assert!(is_lane0_broadcast(&function, lane0));
        assert!(!is_lane0_broadcast(&function, lane1));
        assert!(!is_lane0_broadcast(&function, sum));
        assert!(!is_lane0_broadcast(&function, Value::Argument(0)));
    }

    #[test]
    fn test_scalar_class() {
        let mut function = Function::new(
            "f",
            FunctionKind::Kernel,
            vec![Argument::new(
                "base",
                Type::pointer(AddressSpace::Global),
                ArgumentKind::Uniform,
            )],
            Type::Void,
        );
        let entry = function.add_block("entry");
        let mut builder = Builder::new(&mut function, entry);
        let lane = builder.intrinsic(Intrinsic::SubgroupLocalInvocationId);
        let address = builder.gep(Value::Argument(0), lane, 4);
        let vector = builder.block_read(Type::vector(IntegerType::Int32, 2), address);
        let element = builder.extract_element(vector, lane);
        builder.ret(None);
        let function = &function;
        let cfg = crate::cfg::CFG::new(function);
        let uniformity = Uniformity::new(function, &cfg);
        let use_map = UseMap::new(function);
        let walker = ChainWalker {
            function,
            uniformity: &uniformity,
            use_map: &use_map,
            excluded: HashSet::new(),
        };
        let class = |value: Value| walker.scalar_class(value.instruction().unwrap());
        assert_eq!(class(lane), ScalarClass::PreventScalar);
        assert_eq!(class(address), ScalarClass::CanBeScalar);
        assert_eq!(class(vector), ScalarClass::BlockMemOp);
        assert_eq!(class(element), ScalarClass::PreventScalar);
    }
}
