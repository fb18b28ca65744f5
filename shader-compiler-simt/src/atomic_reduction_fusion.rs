// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! fuse compare-exchange retry loops emulating wide atomics
//!
//! targets without native 64-bit or float atomics emulate them with a loop:
//!
//! ```text
//! entry:
//!     br loop
//! loop:
//!     %read = atomic_load i64, %p
//!     %new = add i64 %read, %x
//!     %old = cmpxchg %p, %read, %new
//!     %retry = cmp.ne %old, %read
//!     br %retry, loop, exit
//! ```
//!
//! every lane of the subgroup contends on the same address. this pass reduces
//! `%x` across the subgroup first and lets only lane 0 run the loop.

use crate::pass::FunctionAnalyses;
use crate::pass::FunctionPass;
use crate::pass::ATOMIC_REDUCTION_FUSION;
use hashbrown::HashSet;
use log::debug;
use log::trace;
use shader_compiler_ir::BinaryOp;
use shader_compiler_ir::Block;
use shader_compiler_ir::Builder;
use shader_compiler_ir::CastOp;
use shader_compiler_ir::CompareOp;
use shader_compiler_ir::Function;
use shader_compiler_ir::Handle;
use shader_compiler_ir::InsertPoint;
use shader_compiler_ir::Instruction;
use shader_compiler_ir::InstructionKind;
use shader_compiler_ir::Intrinsic;
use shader_compiler_ir::ReduceOp;
use shader_compiler_ir::ScalarType;
use shader_compiler_ir::TargetProperties;
use shader_compiler_ir::UseMap;
use shader_compiler_ir::Value;

/// rewrites emulated wide-atomic retry loops into one subgroup reduction
/// followed by a retry loop run by lane 0 only
#[derive(Copy, Clone, Debug, Default)]
pub struct AtomicReductionFusion {
    target_properties: TargetProperties,
}

impl AtomicReductionFusion {
    /// create the pass for a target
    pub fn new(target_properties: TargetProperties) -> Self {
        AtomicReductionFusion { target_properties }
    }
}

/// everything the rewrite of one loop needs, found before any mutation
#[derive(Debug)]
struct FusionPlan {
    entry: Handle<Block>,
    loop_block: Handle<Block>,
    exit: Handle<Block>,
    binary: Handle<Instruction>,
    operand: Value,
    reduce_op: ReduceOp,
}

/// the cross-lane counterpart of the update in the loop;
/// `None` when the update isn't associative
fn reduce_op(op: BinaryOp) -> Option<ReduceOp> {
    Some(match op {
        BinaryOp::Add | BinaryOp::Sub => ReduceOp::Add,
        BinaryOp::Mul => ReduceOp::Mul,
        BinaryOp::And => ReduceOp::And,
        BinaryOp::Or => ReduceOp::Or,
        BinaryOp::Xor => ReduceOp::Xor,
        BinaryOp::UMin => ReduceOp::UMin,
        BinaryOp::UMax => ReduceOp::UMax,
        BinaryOp::SMin => ReduceOp::SMin,
        BinaryOp::SMax => ReduceOp::SMax,
        BinaryOp::FAdd | BinaryOp::FSub => ReduceOp::FAdd,
        BinaryOp::FMul => ReduceOp::FMul,
        BinaryOp::FMin => ReduceOp::FMin,
        BinaryOp::FMax => ReduceOp::FMax,
        BinaryOp::UDiv
        | BinaryOp::SDiv
        | BinaryOp::Shl
        | BinaryOp::LShr
        | BinaryOp::AShr
        | BinaryOp::FDiv => return None,
    })
}

/// the instruction defining `value`, if it's in `block`
fn defined_in(
    function: &Function,
    value: Value,
    block: Handle<Block>,
) -> Option<(Handle<Instruction>, &InstructionKind)> {
    let instruction = value.instruction()?;
    let data = &function.instructions[instruction];
    if data.block() == Some(block) {
        Some((instruction, &data.kind))
    } else {
        None
    }
}

fn bitcast_of(
    function: &Function,
    value: Value,
    block: Handle<Block>,
) -> Option<(Handle<Instruction>, Value)> {
    match defined_in(function, value, block)? {
        (
            instruction,
            &InstructionKind::Cast {
                op: CastOp::Bitcast,
                value,
            },
        ) => Some((instruction, value)),
        _ => None,
    }
}

fn find_plan(
    function: &Function,
    analyses: &FunctionAnalyses,
    use_map: &UseMap,
    loop_block: Handle<Block>,
) -> Result<FusionPlan, &'static str> {
    let terminator = function
        .terminator(loop_block)
        .ok_or("block has no terminator")?;
    let (condition, true_target, false_target) = match function.instructions[terminator].kind {
        InstructionKind::CondBranch {
            condition,
            true_target,
            false_target,
        } => (condition, true_target, false_target),
        _ => return Err("loop doesn't end in a conditional branch"),
    };
    let (compare_op, lhs, rhs) = match defined_in(function, condition, loop_block) {
        Some((_, &InstructionKind::Compare { op, lhs, rhs })) => (op, lhs, rhs),
        _ => return Err("branch condition isn't a comparison in the loop"),
    };
    let exit = match compare_op {
        CompareOp::Ne if true_target == loop_block => false_target,
        CompareOp::Eq if false_target == loop_block => true_target,
        CompareOp::Ne | CompareOp::Eq => return Err("predicate doesn't retry on the back edge"),
        _ => return Err("comparison isn't eq or ne"),
    };
    if exit == loop_block {
        return Err("both branch targets are the loop");
    }
    // the comparison is between the compare-exchange result and the atomic read
    let cmpxchg_of = |value: Value| match defined_in(function, value, loop_block) {
        Some((
            instruction,
            &InstructionKind::AtomicCmpXchg {
                pointer,
                expected,
                replacement,
            },
        )) => Some((instruction, pointer, expected, replacement)),
        _ => None,
    };
    let (cmpxchg, pointer, read, replacement) = match (cmpxchg_of(lhs), cmpxchg_of(rhs)) {
        (Some(found), _) if found.2 == rhs => found,
        (_, Some(found)) if found.2 == lhs => found,
        _ => return Err("comparison isn't between a compare-exchange and its expected value"),
    };
    let read_instruction = match defined_in(function, read, loop_block) {
        Some((read_instruction, &InstructionKind::AtomicLoad { pointer: read_pointer }))
            if read_pointer == pointer =>
        {
            read_instruction
        }
        _ => return Err("expected value isn't an atomic read of the same address"),
    };
    match function.value_type(read).element_type() {
        Some(ScalarType::Integer(_)) if !function.value_type(read).is_vector() => {}
        _ => return Err("atomic read isn't a scalar integer"),
    }
    // optional bitcast to the logical type and back
    let (binary_value, read_operand) = match bitcast_of(function, replacement, loop_block) {
        Some((_, cast_source)) => {
            let binary = cast_source;
            let read_operand = match defined_in(function, binary, loop_block) {
                Some((_, &InstructionKind::Binary { lhs, rhs, .. })) => [lhs, rhs]
                    .iter()
                    .copied()
                    .find(|&operand| {
                        bitcast_of(function, operand, loop_block)
                            .map_or(false, |(_, source)| source == read)
                    })
                    .ok_or("update doesn't use a bitcast of the atomic read")?,
                _ => return Err("bitcast source isn't a binary operation"),
            };
            (binary, read_operand)
        }
        None => (replacement, read),
    };
    let (binary, op, binary_lhs, binary_rhs) = match defined_in(function, binary_value, loop_block)
    {
        Some((binary, &InstructionKind::Binary { op, lhs, rhs })) => (binary, op, lhs, rhs),
        _ => return Err("replacement isn't a binary operation"),
    };
    let operand = if binary_lhs == read_operand {
        binary_rhs
    } else if binary_rhs == read_operand {
        match op {
            BinaryOp::Sub | BinaryOp::FSub => {
                return Err("subtraction with the atomic read as the right operand")
            }
            _ => binary_lhs,
        }
    } else {
        return Err("update doesn't use the atomic read");
    };
    let reduce_op = reduce_op(op).ok_or("update has no cross-lane counterpart")?;
    if defined_in(function, operand, loop_block).is_some() {
        return Err("per-lane operand is defined in the loop");
    }
    if function.value_type(operand).is_vector() {
        return Err("per-lane operand is a vector");
    }
    let cfg = analyses.cfg(function);
    let uniformity = analyses.uniformity(function);
    if !uniformity.is_uniform(pointer) {
        return Err("address is divergent");
    }
    let predecessors: HashSet<_> = cfg.predecessors(loop_block).collect();
    if predecessors.len() != 2 || !predecessors.contains(&loop_block) {
        return Err("loop doesn't have exactly one entry predecessor and itself");
    }
    let entry = predecessors
        .iter()
        .copied()
        .find(|&predecessor| predecessor != loop_block)
        .ok_or("loop has no entry predecessor")?;
    if entry == exit {
        return Err("loop exits to its entry block");
    }
    match function
        .terminator(entry)
        .map(|terminator| &function.instructions[terminator].kind)
    {
        Some(&InstructionKind::Branch { target }) if target == loop_block => {}
        _ => return Err("entry block doesn't end in an unconditional branch to the loop"),
    }
    if uniformity.is_divergent_control_flow(entry) {
        return Err("entry block is in divergent control flow");
    }
    for &instruction in function.blocks[loop_block].instructions() {
        let escapes = use_map
            .users(Value::Instruction(instruction))
            .iter()
            .any(|&user| function.instructions[user].block() != Some(loop_block));
        if escapes {
            return Err("loop value is used outside the loop");
        }
        if instruction != read_instruction
            && instruction != cmpxchg
            && function.instructions[instruction].kind.has_side_effects()
        {
            return Err("loop has other side effects");
        }
    }
    Ok(FusionPlan {
        entry,
        loop_block,
        exit,
        binary,
        operand,
        reduce_op,
    })
}

fn apply_plan(function: &mut Function, plan: &FusionPlan) {
    let FusionPlan {
        entry,
        loop_block,
        exit,
        binary,
        operand,
        reduce_op,
    } = *plan;
    let mut builder = Builder::at(function, InsertPoint::BeforeTerminator(entry));
    let reduced = builder.wave_reduce(reduce_op, operand);
    let lane = builder.intrinsic(Intrinsic::SubgroupLocalInvocationId);
    let zero = builder.const_i32(0);
    let first_lane = builder.compare(CompareOp::Eq, lane, zero);
    let changed = function.instructions[binary]
        .kind
        .replace_uses_of(operand, reduced);
    debug_assert!(changed);
    if let Some(terminator) = function.terminator(entry) {
        function.instructions[terminator].kind = InstructionKind::CondBranch {
            condition: first_lane,
            true_target: loop_block,
            false_target: exit,
        };
    }
    let phis: Vec<_> = function.phis(exit).collect();
    for phi in phis {
        if let InstructionKind::Phi { incoming } = &mut function.instructions[phi].kind {
            let from_loop = incoming
                .iter()
                .find(|&&(predecessor, _)| predecessor == loop_block)
                .map(|&(_, value)| value);
            if let Some(value) = from_loop {
                incoming.push((entry, value));
            }
        }
    }
}

impl FunctionPass for AtomicReductionFusion {
    fn name(&self) -> &'static str {
        ATOMIC_REDUCTION_FUSION
    }
    fn run_with_analyses(&self, function: &mut Function, analyses: &FunctionAnalyses) -> bool {
        // a single lane has nothing to combine
        if self.target_properties.has_native_wide_atomics
            || self.target_properties.subgroup_size <= 1
        {
            return false;
        }
        let use_map = UseMap::new(function);
        let mut plans = Vec::new();
        for &block in function.layout() {
            match find_plan(function, analyses, &use_map, block) {
                Ok(plan) => plans.push(plan),
                Err(reason) => trace!(
                    "{}: not fusing {}: {}",
                    function.name,
                    function.display_block(block),
                    reason
                ),
            }
        }
        for plan in &plans {
            debug!(
                "{}: fusing atomic retry loop {} into a {} reduction",
                function.name,
                function.display_block(plan.loop_block),
                plan.reduce_op
            );
            apply_plan(function, plan);
        }
        !plans.is_empty()
    }
}
