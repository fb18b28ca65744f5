// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! mark runs of divergent resource accesses that can share one resource loop
//!
//! a resource access whose resource handle differs between lanes is emitted as
//! a loop over the distinct handles. consecutive accesses to the same handle
//! are marked so the backend emits one loop around all of them. only the
//! markers change, never the instructions.

use crate::pass::FunctionAnalyses;
use crate::pass::FunctionPass;
use crate::pass::RESOURCE_LOOP_GROUPING;
use crate::uniformity::Uniformity;
use hashbrown::HashMap;
use hashbrown::HashSet;
use log::trace;
use shader_compiler_ir::Block;
use shader_compiler_ir::Function;
use shader_compiler_ir::Handle;
use shader_compiler_ir::Instruction;
use shader_compiler_ir::InstructionKind;
use shader_compiler_ir::Intrinsic;
use shader_compiler_ir::ResourceLoopMarker;
use shader_compiler_ir::UseMap;
use shader_compiler_ir::Value;

/// annotates runs of divergent resource loads and samples with `ResourceLoopMarker`s
#[derive(Copy, Clone, Debug, Default)]
pub struct ResourceLoopGrouping;

/// the resource loop marker of `instruction`
pub fn resource_loop_marker(
    function: &Function,
    instruction: Handle<Instruction>,
) -> ResourceLoopMarker {
    function.instructions[instruction].resource_loop_marker
}

/// the marked runs in `block`, in order
pub fn resource_loop_runs(
    function: &Function,
    block: Handle<Block>,
) -> Vec<Vec<Handle<Instruction>>> {
    let mut runs = Vec::new();
    let mut current: Option<Vec<_>> = None;
    for &instruction in function.blocks[block].instructions() {
        let marker = resource_loop_marker(function, instruction);
        if marker.contains(ResourceLoopMarker::START) {
            runs.extend(current.take());
            current = Some(vec![instruction]);
        } else if marker.contains(ResourceLoopMarker::INSIDE) {
            current.get_or_insert_with(Vec::new).push(instruction);
        }
        if marker.contains(ResourceLoopMarker::END) {
            runs.extend(current.take());
        }
    }
    runs.extend(current);
    runs
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
struct RunKey {
    intrinsic: Intrinsic,
    resource: Value,
    sampler: Option<Value>,
}

struct OpenRun {
    key: RunKey,
    last: Handle<Instruction>,
    last_position: usize,
    /// the accesses plus the element extracts absorbed into the run
    grouped: HashSet<Handle<Instruction>>,
    /// instructions computed from the run's results
    dependents: HashSet<Handle<Instruction>>,
}

impl OpenRun {
    fn depends_on(&self, kind: &InstructionKind) -> bool {
        kind.operands().into_iter().any(|operand| match operand {
            Value::Instruction(operand) => {
                self.grouped.contains(&operand) || self.dependents.contains(&operand)
            }
            Value::Argument(_) | Value::Constant(_) => false,
        })
    }
}

/// the key of `instruction` if it's a resource access worth grouping
fn candidate_key(
    function: &Function,
    uniformity: &Uniformity,
    instruction: Handle<Instruction>,
) -> Option<RunKey> {
    let data = &function.instructions[instruction];
    let (intrinsic, arguments) = match &data.kind {
        InstructionKind::Call { arguments, .. } => (data.kind.intrinsic()?, arguments),
        _ => return None,
    };
    match intrinsic {
        Intrinsic::ResourceLoad | Intrinsic::ResourceSample => {}
        _ => return None,
    }
    let element_type = data.ty.element_type()?;
    if element_type.bit_width() < 32 || data.ty.element_count() > 4 {
        return None;
    }
    let resource = *arguments.get(intrinsic.resource_operand()?)?;
    if uniformity.is_uniform(resource) {
        return None;
    }
    let sampler = match intrinsic.sampler_operand() {
        Some(index) => Some(*arguments.get(index)?),
        None => None,
    };
    Some(RunKey {
        intrinsic,
        resource,
        sampler,
    })
}

fn close_run(
    run: Option<OpenRun>,
    markers: &mut HashMap<Handle<Instruction>, ResourceLoopMarker>,
) {
    if let Some(run) = run {
        *markers.entry(run.last).or_default() |= ResourceLoopMarker::END;
    }
}

/// compute the marker of every instruction of `block` that belongs to a run
fn block_markers(
    function: &Function,
    uniformity: &Uniformity,
    use_map: &UseMap,
    block: Handle<Block>,
    markers: &mut HashMap<Handle<Instruction>, ResourceLoopMarker>,
) {
    let instructions = function.blocks[block].instructions();
    let mut run: Option<OpenRun> = None;
    for (position, &instruction) in instructions.iter().enumerate() {
        let data = &function.instructions[instruction];
        if let Some(key) = candidate_key(function, uniformity, instruction) {
            if run.as_ref().map_or(false, |run| run.depends_on(&data.kind)) {
                close_run(run.take(), markers);
            }
            let extends_run = match &run {
                Some(run) if run.key == key => instructions[run.last_position + 1..position]
                    .iter()
                    .all(|&between| {
                        run.grouped.contains(&between)
                            || use_map
                                .users(Value::Instruction(between))
                                .iter()
                                .all(|user| *user == instruction || run.grouped.contains(user))
                    }),
                _ => false,
            };
            if extends_run {
                if let Some(run) = &mut run {
                    markers.insert(instruction, ResourceLoopMarker::INSIDE);
                    run.grouped.insert(instruction);
                    run.last = instruction;
                    run.last_position = position;
                }
            } else {
                close_run(run.take(), markers);
                markers.insert(instruction, ResourceLoopMarker::START);
                let mut grouped = HashSet::new();
                grouped.insert(instruction);
                run = Some(OpenRun {
                    key,
                    last: instruction,
                    last_position: position,
                    grouped,
                    dependents: HashSet::new(),
                });
            }
            continue;
        }
        let open_run = match &mut run {
            Some(open_run) => open_run,
            None => continue,
        };
        if let InstructionKind::ExtractElement { vector, index } = data.kind {
            let absorbed = vector
                .instruction()
                .map_or(false, |vector| open_run.grouped.contains(&vector))
                && function.constant_value(index).is_some();
            if absorbed {
                open_run.grouped.insert(instruction);
                continue;
            }
        }
        let closes_run = data.kind.has_side_effects()
            || data.kind.is_call()
            || data.kind.is_terminator()
            || uniformity.is_uniform(Value::Instruction(instruction))
            || data.ty.is_flag();
        if closes_run {
            close_run(run.take(), markers);
        } else if open_run.depends_on(&data.kind) {
            open_run.dependents.insert(instruction);
        }
    }
    close_run(run, markers);
}

impl FunctionPass for ResourceLoopGrouping {
    fn name(&self) -> &'static str {
        RESOURCE_LOOP_GROUPING
    }
    fn run_with_analyses(&self, function: &mut Function, analyses: &FunctionAnalyses) -> bool {
        let uniformity = analyses.uniformity(function);
        let use_map = UseMap::new(function);
        let mut markers = HashMap::new();
        for &block in function.layout() {
            block_markers(function, uniformity, &use_map, block, &mut markers);
        }
        let mut changed = false;
        let blocks: Vec<_> = function.layout().to_vec();
        for block in blocks {
            let instructions = function.blocks[block].instructions().to_vec();
            for instruction in instructions {
                let marker = markers
                    .get(&instruction)
                    .copied()
                    .unwrap_or(ResourceLoopMarker::OUTSIDE);
                let data = &mut function.instructions[instruction];
                if data.resource_loop_marker != marker {
                    data.resource_loop_marker = marker;
                    changed = true;
                }
            }
            if log::log_enabled!(log::Level::Trace) {
                for run in resource_loop_runs(function, block) {
                    let members: Vec<_> = run
                        .iter()
                        .map(|&instruction| {
                            function
                                .display_value(Value::Instruction(instruction))
                                .to_string()
                        })
                        .collect();
                    trace!(
                        "{}: resource loop in {}: [{}]",
                        function.name,
                        function.display_block(block),
                        members.join(", ")
                    );
                }
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shader_compiler_ir::prelude::*;

    #[test]
    fn test_runs_from_markers() {
        let mut function = Function::new("f", FunctionKind::Kernel, vec![], Type::Void);
        let entry = function.add_block("entry");
        let mut builder = Builder::new(&mut function, entry);
        let handles: Vec<_> = (0..5)
            .map(|_| builder.intrinsic(Intrinsic::SubgroupSize).instruction().unwrap())
            .collect();
        builder.ret(None);
        let markers = [
            ResourceLoopMarker::START,
            ResourceLoopMarker::INSIDE,
            ResourceLoopMarker::INSIDE | ResourceLoopMarker::END,
            ResourceLoopMarker::OUTSIDE,
            ResourceLoopMarker::START | ResourceLoopMarker::END,
        ];
        for (&handle, &marker) in handles.iter().zip(markers.iter()) {
            function.instructions[handle].resource_loop_marker = marker;
        }
        assert_eq!(
            resource_loop_runs(&function, entry),
            vec![handles[0..3].to_vec(), vec![handles[4]]]
        );
    }
}
