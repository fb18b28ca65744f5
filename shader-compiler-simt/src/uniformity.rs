// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! divergence analysis: which values are the same in every lane of a subgroup

use crate::cfg::CFG;
use crate::lattice::join_all;
use crate::lattice::BottomBoundedLattice;
use crate::lattice::BoundedOrderedLattice;
use crate::lattice::JoinSemilattice;
use fixedbitset::FixedBitSet;
use hashbrown::HashMap;
use log::debug;
use shader_compiler_ir::AddressSpace;
use shader_compiler_ir::ArgumentKind;
use shader_compiler_ir::Block;
use shader_compiler_ir::Callee;
use shader_compiler_ir::Function;
use shader_compiler_ir::FunctionKind;
use shader_compiler_ir::Handle;
use shader_compiler_ir::Instruction;
use shader_compiler_ir::InstructionKind;
use shader_compiler_ir::Intrinsic;
use shader_compiler_ir::Type;
use shader_compiler_ir::UseMap;
use shader_compiler_ir::Value;
use std::cmp;
use std::collections::VecDeque;
use std::fmt;

/// a lattice for how much values vary between different lanes
/// UniformGlobal < UniformWorkgroup < UniformThread < Divergent
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum DivergenceClass {
    /// value is the same for every invocation of the dispatch
    UniformGlobal = 0,
    /// value is the same for every invocation in a workgroup
    UniformWorkgroup = 1,
    /// value is the same for every lane of a subgroup
    UniformThread = 2,
    /// value may be different in every lane
    Divergent = 3,
}

impl Default for DivergenceClass {
    fn default() -> Self {
        DivergenceClass::Divergent
    }
}

impl Ord for DivergenceClass {
    fn cmp(&self, rhs: &Self) -> cmp::Ordering {
        (*self as u32).cmp(&(*rhs as u32))
    }
}

impl PartialOrd for DivergenceClass {
    fn partial_cmp(&self, rhs: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(rhs))
    }
}

impl BoundedOrderedLattice for DivergenceClass {
    fn min_value() -> Self {
        DivergenceClass::UniformGlobal
    }
}

impl DivergenceClass {
    /// returns `true` if every lane of a subgroup has the same value
    pub fn is_uniform(self) -> bool {
        self != DivergenceClass::Divergent
    }
}

impl fmt::Display for DivergenceClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.pad(match self {
            DivergenceClass::UniformGlobal => "uniform_global",
            DivergenceClass::UniformWorkgroup => "uniform_workgroup",
            DivergenceClass::UniformThread => "uniform_thread",
            DivergenceClass::Divergent => "divergent",
        })
    }
}

/// the divergence class of every value of a function and the control
/// divergence of every block
///
/// a snapshot: instructions created after the analysis ran are `Divergent`
#[derive(Clone, Debug)]
pub struct Uniformity {
    argument_classes: Vec<DivergenceClass>,
    instruction_classes: Vec<DivergenceClass>,
    control_classes: HashMap<Handle<Block>, DivergenceClass>,
}

impl Uniformity {
    /// run the analysis to its least fixpoint
    pub fn new(function: &Function, cfg: &CFG) -> Self {
        let argument_classes = function
            .arguments
            .iter()
            .map(|argument| match (function.kind, argument.kind) {
                (FunctionKind::Kernel, ArgumentKind::Uniform) => DivergenceClass::UniformGlobal,
                (FunctionKind::Kernel, ArgumentKind::PerInvocation) => DivergenceClass::Divergent,
                // callers may pass lane-varying values
                (FunctionKind::Subroutine, _) => DivergenceClass::Divergent,
            })
            .collect();
        let mut uniformity = Uniformity {
            argument_classes,
            instruction_classes: vec![DivergenceClass::Divergent; function.instructions.len()],
            control_classes: HashMap::new(),
        };
        let mut worklist = VecDeque::new();
        let mut in_worklist = FixedBitSet::with_capacity(function.instructions.len());
        let mut regions = HashMap::new();
        // blocks unreachable from the entry come after the reachable ones
        let block_order: Vec<_> = cfg
            .reverse_postorder()
            .iter()
            .copied()
            .chain(
                function
                    .layout()
                    .iter()
                    .copied()
                    .filter(|&block| !cfg.is_reachable(block)),
            )
            .collect();
        for &block in &block_order {
            uniformity
                .control_classes
                .insert(block, DivergenceClass::bottom());
            for &instruction in function.blocks[block].instructions() {
                uniformity.instruction_classes[instruction.index()] =
                    DivergenceClass::bottom();
                in_worklist.insert(instruction.index());
                worklist.push_back(instruction);
                if let InstructionKind::CondBranch { .. } = function.instructions[instruction].kind
                {
                    regions.insert(instruction, cfg.influence_region(block));
                }
            }
        }
        let use_map = UseMap::new(function);
        while let Some(instruction) = worklist.pop_front() {
            in_worklist.set(instruction.index(), false);
            let old_class = uniformity.instruction_classes[instruction.index()];
            let new_class = old_class.join(uniformity.transfer(function, instruction));
            if new_class == old_class {
                continue;
            }
            uniformity.instruction_classes[instruction.index()] = new_class;
            let mut push = |instruction: Handle<Instruction>| {
                if !in_worklist.put(instruction.index()) {
                    worklist.push_back(instruction);
                }
            };
            for &user in use_map.users(Value::Instruction(instruction)) {
                push(user);
            }
            if let Some(region) = regions.get(&instruction) {
                for block in cfg.region_blocks(region) {
                    let control_class = uniformity
                        .control_classes
                        .entry(block)
                        .or_insert_with(DivergenceClass::bottom);
                    if *control_class >= new_class {
                        continue;
                    }
                    *control_class = new_class;
                    for &instruction in function.blocks[block].instructions() {
                        push(instruction);
                    }
                    // phis merging values from `block`
                    for successor in cfg.successors(block) {
                        for phi in function.phis(successor) {
                            push(phi);
                        }
                    }
                }
            }
        }
        let values: Vec<_> = function
            .attached_instructions()
            .filter(|&instruction| function.instructions[instruction].ty != Type::Void)
            .collect();
        let divergent_values = values
            .iter()
            .filter(|&&instruction| !uniformity.is_uniform(Value::Instruction(instruction)))
            .count();
        let divergent_blocks = function
            .layout()
            .iter()
            .filter(|&&block| uniformity.is_divergent_control_flow(block))
            .count();
        debug!(
            "uniformity of {}: {}/{} values divergent, {}/{} blocks in divergent control flow",
            function.name,
            divergent_values,
            values.len(),
            divergent_blocks,
            function.layout().len(),
        );
        uniformity
    }
    fn transfer(&self, function: &Function, instruction: Handle<Instruction>) -> DivergenceClass {
        let data = &function.instructions[instruction];
        let block_class = data
            .block()
            .map_or(DivergenceClass::bottom(), |block| {
                self.control_class(block)
            });
        let mut class = self.kind_class(function, &data.kind).join(block_class);
        if let InstructionKind::Phi { incoming } = &data.kind {
            for &(predecessor, _) in incoming {
                class = class.join(self.control_class(predecessor));
            }
        }
        class
    }
    fn join_operands(&self, kind: &InstructionKind) -> DivergenceClass {
        join_all(kind.operands().into_iter().map(|value| self.classify(value)))
    }
    fn kind_class(&self, function: &Function, kind: &InstructionKind) -> DivergenceClass {
        match *kind {
            InstructionKind::Binary { .. }
            | InstructionKind::Compare { .. }
            | InstructionKind::Cast { .. }
            | InstructionKind::GetElementPtr { .. }
            | InstructionKind::ExtractElement { .. }
            | InstructionKind::Store { .. }
            | InstructionKind::Phi { .. } => self.join_operands(kind),
            InstructionKind::Select {
                condition,
                true_value,
                false_value,
            } => match function.constant_value(condition) {
                Some(condition) if condition.bits != 0 => self.classify(true_value),
                Some(_) => self.classify(false_value),
                None => self.join_operands(kind),
            },
            InstructionKind::Load { pointer } => {
                if function.value_type(pointer).address_space() == Some(AddressSpace::Constant) {
                    self.classify(pointer)
                } else {
                    DivergenceClass::Divergent
                }
            }
            InstructionKind::AtomicLoad { .. } | InstructionKind::AtomicCmpXchg { .. } => {
                DivergenceClass::Divergent
            }
            InstructionKind::Call {
                callee: Callee::External(_),
                ..
            } => DivergenceClass::Divergent,
            InstructionKind::Call {
                callee: Callee::Intrinsic(intrinsic),
                ref arguments,
            } => self.intrinsic_class(intrinsic, arguments, kind),
            InstructionKind::CondBranch { condition, .. } => self.classify(condition),
            InstructionKind::Branch { .. }
            | InstructionKind::Return { .. }
            | InstructionKind::Unreachable => DivergenceClass::UniformGlobal,
        }
    }
    fn intrinsic_class(
        &self,
        intrinsic: Intrinsic,
        arguments: &[Value],
        kind: &InstructionKind,
    ) -> DivergenceClass {
        match intrinsic {
            Intrinsic::SubgroupLocalInvocationId
            | Intrinsic::LocalInvocationId
            | Intrinsic::GlobalInvocationId
            | Intrinsic::BlockRead => DivergenceClass::Divergent,
            Intrinsic::WorkgroupId => DivergenceClass::UniformWorkgroup,
            Intrinsic::SubgroupId | Intrinsic::WaveReduce(_) | Intrinsic::WaveBallot => {
                DivergenceClass::UniformThread
            }
            Intrinsic::SubgroupSize
            | Intrinsic::LifetimeStart
            | Intrinsic::LifetimeEnd
            | Intrinsic::DebugValue => DivergenceClass::UniformGlobal,
            Intrinsic::WaveShuffle => {
                let value_class = arguments
                    .get(0)
                    .map_or(DivergenceClass::Divergent, |&value| self.classify(value));
                let lane_class = arguments
                    .get(1)
                    .map_or(DivergenceClass::Divergent, |&lane| self.classify(lane));
                if value_class <= DivergenceClass::UniformThread {
                    value_class
                } else if lane_class <= DivergenceClass::UniformThread {
                    DivergenceClass::UniformThread
                } else {
                    DivergenceClass::Divergent
                }
            }
            Intrinsic::ResourceLoad
            | Intrinsic::ResourceSample
            | Intrinsic::ResourceStore
            | Intrinsic::BlockWrite => self.join_operands(kind),
        }
    }
    /// the divergence class of `value`
    pub fn classify(&self, value: Value) -> DivergenceClass {
        match value {
            Value::Argument(index) => self
                .argument_classes
                .get(index as usize)
                .copied()
                .unwrap_or(DivergenceClass::Divergent),
            Value::Constant(_) => DivergenceClass::UniformGlobal,
            Value::Instruction(instruction) => self
                .instruction_classes
                .get(instruction.index())
                .copied()
                .unwrap_or(DivergenceClass::Divergent),
        }
    }
    /// returns `true` if `value` is the same in every lane of a subgroup
    pub fn is_uniform(&self, value: Value) -> bool {
        self.classify(value).is_uniform()
    }
    /// the join of the classes of the branches that decide whether `block` executes
    pub fn control_class(&self, block: Handle<Block>) -> DivergenceClass {
        self.control_classes
            .get(&block)
            .copied()
            .unwrap_or(DivergenceClass::Divergent)
    }
    /// returns `true` if lanes of a subgroup may disagree about executing `block`
    pub fn is_divergent_control_flow(&self, block: Handle<Block>) -> bool {
        !self.control_class(block).is_uniform()
    }
    /// get a `Display` listing the class of every value and block of `function`
    pub fn display<'a>(&'a self, function: &'a Function) -> impl fmt::Display + 'a {
        struct DisplayUniformity<'a> {
            uniformity: &'a Uniformity,
            function: &'a Function,
        }
        impl fmt::Display for DisplayUniformity<'_> {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                let DisplayUniformity {
                    uniformity,
                    function,
                } = *self;
                for index in 0..function.arguments.len() {
                    let value = Value::Argument(index as u32);
                    writeln!(
                        f,
                        "{}: {}",
                        function.display_value(value),
                        uniformity.classify(value)
                    )?;
                }
                for &block in function.layout() {
                    let tag = if uniformity.is_divergent_control_flow(block) {
                        "divergent control flow"
                    } else {
                        "uniform control flow"
                    };
                    writeln!(f, "{}: {}", function.display_block(block), tag)?;
                    for &instruction in function.blocks[block].instructions() {
                        if function.instructions[instruction].ty == Type::Void {
                            continue;
                        }
                        let value = Value::Instruction(instruction);
                        writeln!(
                            f,
                            "    {}: {}",
                            function.display_value(value),
                            uniformity.classify(value)
                        )?;
                    }
                }
                Ok(())
            }
        }
        DisplayUniformity {
            uniformity: self,
            function,
        }
    }
}
