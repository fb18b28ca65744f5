// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! reference interpreter running a function on one subgroup of lanes
//!
//! lanes run in lockstep one block at a time: the lanes waiting at the block
//! earliest in reverse postorder run it together, so lanes that split at a
//! branch run again together once they reach the join block. this makes the
//! wave intrinsics observe the same active lanes as on a SIMT target.
//!
//! the interpreter runs a single subgroup that forms the whole workgroup:
//! lane `i` has subgroup local, local, and global invocation id `i`.

use crate::cfg::CFG;
use hashbrown::HashMap;
use log::trace;
use shader_compiler_ir::BinaryOp;
use shader_compiler_ir::Block;
use shader_compiler_ir::Callee;
use shader_compiler_ir::CastOp;
use shader_compiler_ir::CompareOp;
use shader_compiler_ir::FloatType;
use shader_compiler_ir::Function;
use shader_compiler_ir::Handle;
use shader_compiler_ir::Instruction;
use shader_compiler_ir::InstructionKind;
use shader_compiler_ir::IntegerType;
use shader_compiler_ir::Intrinsic;
use shader_compiler_ir::ScalarType;
use shader_compiler_ir::Type;
use shader_compiler_ir::Value;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use thiserror::Error;

/// the value of one lane: one entry per vector element, a single entry for scalars
pub type LaneValue = SmallVec<[u64; 4]>;

/// the maximum number of lanes, limited by the width of `wave_ballot`
pub const MAX_LANE_COUNT: usize = 64;

/// the default for `Interpreter::with_step_limit`
pub const DEFAULT_STEP_LIMIT: usize = 100_000;

/// error running a function
#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum InterpretError {
    /// the function has no blocks
    #[error("function has no entry block")]
    NoEntryBlock,
    /// the lane count is zero or larger than `MAX_LANE_COUNT`
    #[error("invalid lane count: {0}")]
    InvalidLaneCount(usize),
    /// a value was read before any definition reached it
    #[error("undefined value: {0}")]
    UndefinedValue(String),
    /// a phi has no incoming value for the block a lane came from
    #[error("phi {0} has no incoming value for the previous block")]
    MissingPhiIncoming(String),
    /// an external function or an intrinsic without a model was called
    #[error("unsupported call: {0}")]
    UnsupportedCall(String),
    /// an operation isn't defined for its operands
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    /// integer division by zero
    #[error("division by zero: {0}")]
    DivisionByZero(String),
    /// execution reached an `unreachable` instruction
    #[error("reached unreachable in block {0}")]
    ReachedUnreachable(String),
    /// execution ran off the end of a block
    #[error("block {0} has no terminator")]
    MissingTerminator(String),
    /// execution ran more instructions than allowed
    #[error("step limit of {0} exceeded")]
    StepLimitExceeded(usize),
}

/// sparse byte-addressed memory plus the contents of resources
#[derive(Clone, Default, Eq, PartialEq, Debug)]
pub struct Memory {
    bytes: BTreeMap<u64, u8>,
    resources: HashMap<(u64, u64), LaneValue>,
}

impl Memory {
    /// create an empty memory; unwritten bytes read as zero
    pub fn new() -> Self {
        Self::default()
    }
    /// read a little endian scalar
    pub fn read_scalar(&self, address: u64, scalar_type: ScalarType) -> u64 {
        let mut bits = 0;
        for byte_index in 0..scalar_type.byte_size() {
            let byte = self
                .bytes
                .get(&address.wrapping_add(byte_index))
                .copied()
                .unwrap_or(0);
            bits |= u64::from(byte) << (8 * byte_index);
        }
        bits & scalar_type.bit_mask()
    }
    /// write a little endian scalar
    pub fn write_scalar(&mut self, address: u64, scalar_type: ScalarType, bits: u64) {
        for byte_index in 0..scalar_type.byte_size() {
            self.bytes
                .insert(address.wrapping_add(byte_index), (bits >> (8 * byte_index)) as u8);
        }
    }
    /// read a value of type `ty`, vector elements stored contiguously
    pub fn read(&self, address: u64, ty: Type) -> LaneValue {
        let scalar_type = storage_type(ty);
        (0..u64::from(ty.element_count()))
            .map(|index| self.read_scalar(address + index * scalar_type.byte_size(), scalar_type))
            .collect()
    }
    /// write a value of type `ty`, vector elements stored contiguously
    pub fn write(&mut self, address: u64, ty: Type, value: &[u64]) {
        let scalar_type = storage_type(ty);
        for (index, &bits) in value.iter().enumerate() {
            self.write_scalar(
                address + index as u64 * scalar_type.byte_size(),
                scalar_type,
                bits,
            );
        }
    }
    /// read from a resource; elements never stored read as a value derived
    /// from the resource, sampler, coordinate, and element index
    pub fn read_resource(
        &self,
        resource: u64,
        sampler: Option<u64>,
        coordinate: u64,
        ty: Type,
    ) -> LaneValue {
        if let Some(value) = self.resources.get(&(resource, coordinate)) {
            return value.clone();
        }
        let mask = storage_type(ty).bit_mask();
        (0..u64::from(ty.element_count()))
            .map(|index| {
                let mut bits = resource.wrapping_mul(0x9E37_79B9_7F4A_7C15)
                    ^ sampler.unwrap_or(0).wrapping_mul(0xBF58_476D_1CE4_E5B9)
                    ^ coordinate.wrapping_add(index);
                bits ^= bits >> 31;
                bits & mask
            })
            .collect()
    }
    /// write to a resource
    pub fn write_resource(&mut self, resource: u64, coordinate: u64, value: LaneValue) {
        self.resources.insert((resource, coordinate), value);
    }
}

/// the scalar type memory holds for `ty`; handles are stored as 64-bit values
fn storage_type(ty: Type) -> ScalarType {
    ty.element_type()
        .unwrap_or(ScalarType::Integer(IntegerType::Int64))
}

fn type_byte_size(ty: Type) -> u64 {
    storage_type(ty).byte_size() * u64::from(ty.element_count())
}

fn sign_extend(bits: u64, bit_width: u32) -> i64 {
    let shift = 64 - bit_width;
    ((bits << shift) as i64) >> shift
}

fn float_type(scalar_type: ScalarType) -> Option<FloatType> {
    match scalar_type {
        ScalarType::Float(float_type) => Some(float_type),
        _ => None,
    }
}

fn bits_to_f64(float_type: FloatType, bits: u64) -> Option<f64> {
    match float_type {
        FloatType::Float16 => None,
        FloatType::Float32 => Some(f64::from(f32::from_bits(bits as u32))),
        FloatType::Float64 => Some(f64::from_bits(bits)),
    }
}

fn f64_to_bits(float_type: FloatType, value: f64) -> Option<u64> {
    match float_type {
        FloatType::Float16 => None,
        FloatType::Float32 => Some(u64::from((value as f32).to_bits())),
        FloatType::Float64 => Some(value.to_bits()),
    }
}

/// evaluate `op` on one element
fn evaluate_binary(
    op: BinaryOp,
    scalar_type: ScalarType,
    lhs: u64,
    rhs: u64,
) -> Result<u64, InterpretError> {
    let width = scalar_type.bit_width();
    let mask = scalar_type.bit_mask();
    let unsupported =
        || InterpretError::UnsupportedOperation(format!("{} on {:?}", op, scalar_type));
    let float = |f: fn(f64, f64) -> f64| -> Result<u64, InterpretError> {
        let float_type = float_type(scalar_type).ok_or_else(unsupported)?;
        let lhs = bits_to_f64(float_type, lhs).ok_or_else(unsupported)?;
        let rhs = bits_to_f64(float_type, rhs).ok_or_else(unsupported)?;
        f64_to_bits(float_type, f(lhs, rhs)).ok_or_else(unsupported)
    };
    let signed =
        |f: fn(i64, i64) -> i64| f(sign_extend(lhs, width), sign_extend(rhs, width)) as u64 & mask;
    let result = match op {
        BinaryOp::FAdd => return float(|a, b| a + b),
        BinaryOp::FSub => return float(|a, b| a - b),
        BinaryOp::FMul => return float(|a, b| a * b),
        BinaryOp::FDiv => return float(|a, b| a / b),
        BinaryOp::FMin => return float(f64::min),
        BinaryOp::FMax => return float(f64::max),
        _ if float_type(scalar_type).is_some() => return Err(unsupported()),
        BinaryOp::Add => lhs.wrapping_add(rhs),
        BinaryOp::Sub => lhs.wrapping_sub(rhs),
        BinaryOp::Mul => lhs.wrapping_mul(rhs),
        BinaryOp::UDiv => {
            if rhs == 0 {
                return Err(InterpretError::DivisionByZero(op.to_string()));
            }
            lhs / rhs
        }
        BinaryOp::SDiv => {
            if rhs == 0 {
                return Err(InterpretError::DivisionByZero(op.to_string()));
            }
            signed(i64::wrapping_div)
        }
        BinaryOp::And => lhs & rhs,
        BinaryOp::Or => lhs | rhs,
        BinaryOp::Xor => lhs ^ rhs,
        BinaryOp::Shl => lhs << (rhs % u64::from(width)),
        BinaryOp::LShr => lhs >> (rhs % u64::from(width)),
        BinaryOp::AShr => (sign_extend(lhs, width) >> (rhs % u64::from(width))) as u64,
        BinaryOp::UMin => lhs.min(rhs),
        BinaryOp::UMax => lhs.max(rhs),
        BinaryOp::SMin => signed(i64::min),
        BinaryOp::SMax => signed(i64::max),
    };
    Ok(result & mask)
}

fn evaluate_compare(
    op: CompareOp,
    scalar_type: ScalarType,
    lhs: u64,
    rhs: u64,
) -> Result<bool, InterpretError> {
    let width = scalar_type.bit_width();
    let (signed_lhs, signed_rhs) = (sign_extend(lhs, width), sign_extend(rhs, width));
    Ok(match op {
        CompareOp::Eq => lhs == rhs,
        CompareOp::Ne => lhs != rhs,
        CompareOp::ULt => lhs < rhs,
        CompareOp::ULe => lhs <= rhs,
        CompareOp::UGt => lhs > rhs,
        CompareOp::UGe => lhs >= rhs,
        CompareOp::SLt => signed_lhs < signed_rhs,
        CompareOp::SLe => signed_lhs <= signed_rhs,
        CompareOp::SGt => signed_lhs > signed_rhs,
        CompareOp::SGe => signed_lhs >= signed_rhs,
        CompareOp::FLt | CompareOp::FGt => {
            let unsupported =
                || InterpretError::UnsupportedOperation(format!("{} on {:?}", op, scalar_type));
            let float_type = float_type(scalar_type).ok_or_else(unsupported)?;
            let lhs = bits_to_f64(float_type, lhs).ok_or_else(unsupported)?;
            let rhs = bits_to_f64(float_type, rhs).ok_or_else(unsupported)?;
            if op == CompareOp::FLt {
                lhs < rhs
            } else {
                lhs > rhs
            }
        }
    })
}

fn evaluate_cast(op: CastOp, from: ScalarType, to: ScalarType, bits: u64) -> u64 {
    match op {
        CastOp::SExt => sign_extend(bits, from.bit_width()) as u64 & to.bit_mask(),
        CastOp::Bitcast | CastOp::ZExt | CastOp::Trunc | CastOp::PtrToInt | CastOp::IntToPtr => {
            bits & to.bit_mask()
        }
    }
}

fn scalar(value: &LaneValue) -> u64 {
    value.first().copied().unwrap_or(0)
}

struct LaneState {
    /// the block the lane runs next, `None` once it returned
    block: Option<Handle<Block>>,
    previous: Option<Handle<Block>>,
    values: HashMap<Handle<Instruction>, LaneValue>,
    return_value: Option<LaneValue>,
}

/// the state of every lane after a run
#[derive(Clone, Debug)]
pub struct Execution {
    values: Vec<HashMap<Handle<Instruction>, LaneValue>>,
    return_values: Vec<Option<LaneValue>>,
}

impl Execution {
    /// the number of lanes that ran
    pub fn lane_count(&self) -> usize {
        self.values.len()
    }
    /// the last value `lane` computed for `instruction`, `None` if the lane never ran it
    pub fn value(&self, lane: usize, instruction: Handle<Instruction>) -> Option<&LaneValue> {
        self.values.get(lane)?.get(&instruction)
    }
    /// each lane's return value, `None` for `void` functions
    pub fn return_values(&self) -> &[Option<LaneValue>] {
        &self.return_values
    }
}

/// runs a function for a subgroup of lanes
pub struct Interpreter<'a> {
    function: &'a Function,
    cfg: CFG,
    lane_count: usize,
    step_limit: usize,
}

impl<'a> Interpreter<'a> {
    /// create an interpreter running `function` on `lane_count` lanes
    pub fn new(function: &'a Function, lane_count: usize) -> Result<Self, InterpretError> {
        if lane_count == 0 || lane_count > MAX_LANE_COUNT {
            return Err(InterpretError::InvalidLaneCount(lane_count));
        }
        Ok(Interpreter {
            function,
            cfg: CFG::new(function),
            lane_count,
            step_limit: DEFAULT_STEP_LIMIT,
        })
    }
    /// set the maximum number of instructions run, counting each instruction
    /// once for all the lanes running it together
    pub fn with_step_limit(mut self, step_limit: usize) -> Self {
        self.step_limit = step_limit;
        self
    }
    /// the number of lanes
    pub fn lane_count(&self) -> usize {
        self.lane_count
    }
    /// run the function, returning each lane's return value.
    ///
    /// `arguments[i]` holds the value of argument `i` for every lane, or a
    /// single value shared by all lanes.
    pub fn run(
        &self,
        arguments: &[Vec<u64>],
        memory: &mut Memory,
    ) -> Result<Vec<Option<LaneValue>>, InterpretError> {
        Ok(self.execute(arguments, memory)?.return_values)
    }
    /// run the function like `run`, keeping the values every lane computed
    pub fn execute(
        &self,
        arguments: &[Vec<u64>],
        memory: &mut Memory,
    ) -> Result<Execution, InterpretError> {
        let entry = self
            .function
            .entry_block()
            .ok_or(InterpretError::NoEntryBlock)?;
        let mut lanes: Vec<LaneState> = (0..self.lane_count)
            .map(|_| LaneState {
                block: Some(entry),
                previous: None,
                values: HashMap::new(),
                return_value: None,
            })
            .collect();
        let mut steps = 0;
        loop {
            let block = lanes
                .iter()
                .filter_map(|lane| lane.block)
                .min_by_key(|&block| {
                    self.cfg
                        .reverse_postorder_index(block)
                        .unwrap_or(usize::max_value())
                });
            let block = match block {
                Some(block) => block,
                None => break,
            };
            let active: Vec<usize> = (0..self.lane_count)
                .filter(|&lane| lanes[lane].block == Some(block))
                .collect();
            trace!(
                "{}: running {} on lanes {:?}",
                self.function.name,
                self.function.display_block(block),
                active
            );
            self.run_block(block, &active, arguments, &mut lanes, memory, &mut steps)?;
        }
        let (values, return_values) = lanes
            .into_iter()
            .map(|lane| (lane.values, lane.return_value))
            .unzip();
        Ok(Execution {
            values,
            return_values,
        })
    }
    fn undefined(&self, value: Value) -> InterpretError {
        InterpretError::UndefinedValue(self.function.display_value(value).to_string())
    }
    fn operand(
        &self,
        lanes: &[LaneState],
        lane: usize,
        arguments: &[Vec<u64>],
        value: Value,
    ) -> Result<LaneValue, InterpretError> {
        match value {
            Value::Argument(index) => {
                let values = arguments
                    .get(index as usize)
                    .ok_or_else(|| self.undefined(value))?;
                let bits = match values.len() {
                    1 => values[0],
                    _ => *values.get(lane).ok_or_else(|| self.undefined(value))?,
                };
                let mask = storage_type(self.function.value_type(value)).bit_mask();
                Ok(SmallVec::from_slice(&[bits & mask]))
            }
            Value::Constant(constant) => {
                Ok(SmallVec::from_slice(&[self.function.constants[constant].bits]))
            }
            Value::Instruction(instruction) => lanes[lane]
                .values
                .get(&instruction)
                .cloned()
                .ok_or_else(|| self.undefined(value)),
        }
    }
    fn run_block(
        &self,
        block: Handle<Block>,
        active: &[usize],
        arguments: &[Vec<u64>],
        lanes: &mut [LaneState],
        memory: &mut Memory,
        steps: &mut usize,
    ) -> Result<(), InterpretError> {
        let function = self.function;
        let instructions = function.blocks[block].instructions();
        let phi_count = function.phis(block).count();
        let mut phi_values = Vec::new();
        for &phi in &instructions[..phi_count] {
            let incoming = match &function.instructions[phi].kind {
                InstructionKind::Phi { incoming } => incoming,
                _ => unreachable!(),
            };
            for &lane in active {
                let previous = lanes[lane].previous;
                let value = incoming
                    .iter()
                    .find(|&&(predecessor, _)| Some(predecessor) == previous)
                    .map(|&(_, value)| value)
                    .ok_or_else(|| {
                        InterpretError::MissingPhiIncoming(
                            function.display_value(Value::Instruction(phi)).to_string(),
                        )
                    })?;
                phi_values.push((lane, phi, self.operand(lanes, lane, arguments, value)?));
            }
        }
        for (lane, phi, value) in phi_values {
            lanes[lane].values.insert(phi, value);
        }
        for &instruction in &instructions[phi_count..] {
            *steps += 1;
            if *steps > self.step_limit {
                return Err(InterpretError::StepLimitExceeded(self.step_limit));
            }
            if function.instructions[instruction].kind.is_terminator() {
                return self.run_terminator(block, instruction, active, arguments, lanes);
            }
            self.run_instruction(instruction, active, arguments, lanes, memory)?;
        }
        Err(InterpretError::MissingTerminator(
            function.display_block(block).to_string(),
        ))
    }
    fn run_terminator(
        &self,
        block: Handle<Block>,
        instruction: Handle<Instruction>,
        active: &[usize],
        arguments: &[Vec<u64>],
        lanes: &mut [LaneState],
    ) -> Result<(), InterpretError> {
        for &lane in active {
            let next = match self.function.instructions[instruction].kind {
                InstructionKind::Branch { target } => Some(target),
                InstructionKind::CondBranch {
                    condition,
                    true_target,
                    false_target,
                } => {
                    if scalar(&self.operand(lanes, lane, arguments, condition)?) != 0 {
                        Some(true_target)
                    } else {
                        Some(false_target)
                    }
                }
                InstructionKind::Return { value } => {
                    let return_value = match value {
                        Some(value) => Some(self.operand(lanes, lane, arguments, value)?),
                        None => None,
                    };
                    lanes[lane].return_value = return_value;
                    None
                }
                InstructionKind::Unreachable => {
                    return Err(InterpretError::ReachedUnreachable(
                        self.function.display_block(block).to_string(),
                    ))
                }
                _ => unreachable!("not a terminator"),
            };
            lanes[lane].previous = Some(block);
            lanes[lane].block = next;
        }
        Ok(())
    }
    fn run_instruction(
        &self,
        instruction: Handle<Instruction>,
        active: &[usize],
        arguments: &[Vec<u64>],
        lanes: &mut [LaneState],
        memory: &mut Memory,
    ) -> Result<(), InterpretError> {
        let data = &self.function.instructions[instruction];
        if let InstructionKind::Call {
            callee: Callee::Intrinsic(intrinsic),
            arguments: call_arguments,
        } = &data.kind
        {
            let results = self.run_cross_lane(
                *intrinsic,
                data.ty,
                call_arguments,
                active,
                arguments,
                lanes,
                memory,
            )?;
            if let Some(results) = results {
                for (&lane, result) in active.iter().zip(results) {
                    if let Some(result) = result {
                        lanes[lane].values.insert(instruction, result);
                    }
                }
                return Ok(());
            }
        }
        // lane order, so stores and atomics from lower lanes happen first
        for &lane in active {
            if let Some(result) = self.run_lane(instruction, lane, arguments, lanes, memory)? {
                lanes[lane].values.insert(instruction, result);
            }
        }
        Ok(())
    }
    /// run a wave or block memory intrinsic over all active lanes at once
    #[allow(clippy::too_many_arguments)]
    fn run_cross_lane(
        &self,
        intrinsic: Intrinsic,
        ty: Type,
        call_arguments: &[Value],
        active: &[usize],
        arguments: &[Vec<u64>],
        lanes: &[LaneState],
        memory: &mut Memory,
    ) -> Result<Option<Vec<Option<LaneValue>>>, InterpretError> {
        let operand = |lane: usize, index: usize| -> Result<LaneValue, InterpretError> {
            let value = *call_arguments.get(index).ok_or_else(|| {
                InterpretError::UnsupportedOperation(format!("{} arguments", intrinsic))
            })?;
            self.operand(lanes, lane, arguments, value)
        };
        let results: Vec<Option<LaneValue>> = match intrinsic {
            Intrinsic::WaveReduce(op) => {
                let scalar_type = storage_type(ty);
                let mut total: Option<LaneValue> = None;
                for &lane in active {
                    let value = operand(lane, 0)?;
                    total = Some(match total {
                        None => value,
                        Some(total) => total
                            .iter()
                            .zip(&value)
                            .map(|(&lhs, &rhs)| {
                                evaluate_binary(op.binary_op(), scalar_type, lhs, rhs)
                            })
                            .collect::<Result<_, _>>()?,
                    });
                }
                vec![total; active.len()]
            }
            Intrinsic::WaveShuffle => active
                .iter()
                .map(|&lane| {
                    let source = scalar(&operand(lane, 1)?) as usize;
                    if source >= self.lane_count {
                        return Err(InterpretError::UnsupportedOperation(format!(
                            "{} from lane {}",
                            intrinsic, source
                        )));
                    }
                    operand(source, 0).map(Some)
                })
                .collect::<Result<_, _>>()?,
            Intrinsic::WaveBallot => {
                let mut mask = 0u64;
                for &lane in active {
                    if scalar(&operand(lane, 0)?) != 0 {
                        mask |= 1 << lane;
                    }
                }
                vec![Some(SmallVec::from_slice(&[mask])); active.len()]
            }
            Intrinsic::BlockRead => {
                let base = match active.first() {
                    Some(&lane) => scalar(&operand(lane, 0)?),
                    None => return Ok(Some(Vec::new())),
                };
                active
                    .iter()
                    .map(|&lane| Some(memory.read(base + lane as u64 * type_byte_size(ty), ty)))
                    .collect()
            }
            Intrinsic::BlockWrite => {
                let base = match active.first() {
                    Some(&lane) => scalar(&operand(lane, 0)?),
                    None => return Ok(Some(Vec::new())),
                };
                let value_type = match call_arguments.get(1) {
                    Some(&value) => self.function.value_type(value),
                    None => return Err(InterpretError::UnsupportedOperation(intrinsic.to_string())),
                };
                for &lane in active {
                    let value = operand(lane, 1)?;
                    memory.write(
                        base + lane as u64 * type_byte_size(value_type),
                        value_type,
                        &value,
                    );
                }
                vec![None; active.len()]
            }
            _ => return Ok(None),
        };
        Ok(Some(results))
    }
    /// run a single lane's share of `instruction`
    fn run_lane(
        &self,
        instruction: Handle<Instruction>,
        lane: usize,
        arguments: &[Vec<u64>],
        lanes: &[LaneState],
        memory: &mut Memory,
    ) -> Result<Option<LaneValue>, InterpretError> {
        let function = self.function;
        let data = &function.instructions[instruction];
        let operand = |value: Value| self.operand(lanes, lane, arguments, value);
        let result_type = storage_type(data.ty);
        let unsupported = || {
            InterpretError::UnsupportedOperation(
                function.display_instruction(instruction).to_string(),
            )
        };
        let result: LaneValue = match &data.kind {
            &InstructionKind::Binary { op, lhs, rhs } => {
                let scalar_type = storage_type(function.value_type(lhs));
                operand(lhs)?
                    .iter()
                    .zip(&operand(rhs)?)
                    .map(|(&lhs, &rhs)| evaluate_binary(op, scalar_type, lhs, rhs))
                    .collect::<Result<_, _>>()?
            }
            &InstructionKind::Compare { op, lhs, rhs } => {
                let scalar_type = storage_type(function.value_type(lhs));
                operand(lhs)?
                    .iter()
                    .zip(&operand(rhs)?)
                    .map(|(&lhs, &rhs)| evaluate_compare(op, scalar_type, lhs, rhs).map(u64::from))
                    .collect::<Result<_, _>>()?
            }
            &InstructionKind::Cast { op, value } => {
                let from = storage_type(function.value_type(value));
                operand(value)?
                    .iter()
                    .map(|&bits| evaluate_cast(op, from, result_type, bits))
                    .collect()
            }
            &InstructionKind::Select {
                condition,
                true_value,
                false_value,
            } => {
                if scalar(&operand(condition)?) != 0 {
                    operand(true_value)?
                } else {
                    operand(false_value)?
                }
            }
            &InstructionKind::GetElementPtr {
                base,
                index,
                stride,
            } => {
                let index_width = storage_type(function.value_type(index)).bit_width();
                let offset = sign_extend(scalar(&operand(index)?), index_width) as u64;
                SmallVec::from_slice(&[scalar(&operand(base)?)
                    .wrapping_add(offset.wrapping_mul(stride))])
            }
            &InstructionKind::ExtractElement { vector, index } => {
                let vector = operand(vector)?;
                let element = *vector
                    .get(scalar(&operand(index)?) as usize)
                    .ok_or_else(unsupported)?;
                SmallVec::from_slice(&[element])
            }
            &InstructionKind::Load { pointer } | &InstructionKind::AtomicLoad { pointer } => {
                memory.read(scalar(&operand(pointer)?), data.ty)
            }
            &InstructionKind::Store { pointer, value } => {
                let value_type = function.value_type(value);
                memory.write(scalar(&operand(pointer)?), value_type, &operand(value)?);
                return Ok(None);
            }
            &InstructionKind::AtomicCmpXchg {
                pointer,
                expected,
                replacement,
            } => {
                let address = scalar(&operand(pointer)?);
                let value_type = function.value_type(expected);
                let old = memory.read(address, value_type);
                if old == operand(expected)? {
                    memory.write(address, value_type, &operand(replacement)?);
                }
                old
            }
            InstructionKind::Call {
                callee: Callee::External(name),
                ..
            } => return Err(InterpretError::UnsupportedCall(name.clone())),
            InstructionKind::Call {
                callee: Callee::Intrinsic(intrinsic),
                arguments: call_arguments,
            } => {
                let call_operand = |index: usize| -> Result<u64, InterpretError> {
                    let value = *call_arguments.get(index).ok_or_else(unsupported)?;
                    Ok(scalar(&operand(value)?))
                };
                match *intrinsic {
                    Intrinsic::SubgroupLocalInvocationId
                    | Intrinsic::LocalInvocationId
                    | Intrinsic::GlobalInvocationId => SmallVec::from_slice(&[lane as u64]),
                    Intrinsic::SubgroupId | Intrinsic::WorkgroupId => SmallVec::from_slice(&[0]),
                    Intrinsic::SubgroupSize => SmallVec::from_slice(&[self.lane_count as u64]),
                    Intrinsic::ResourceLoad => {
                        memory.read_resource(call_operand(0)?, None, call_operand(1)?, data.ty)
                    }
                    Intrinsic::ResourceSample => memory.read_resource(
                        call_operand(0)?,
                        Some(call_operand(1)?),
                        call_operand(2)?,
                        data.ty,
                    ),
                    Intrinsic::ResourceStore => {
                        let value = *call_arguments.get(2).ok_or_else(unsupported)?;
                        memory.write_resource(call_operand(0)?, call_operand(1)?, operand(value)?);
                        return Ok(None);
                    }
                    Intrinsic::LifetimeStart | Intrinsic::LifetimeEnd | Intrinsic::DebugValue => {
                        return Ok(None)
                    }
                    Intrinsic::WaveReduce(_)
                    | Intrinsic::WaveShuffle
                    | Intrinsic::WaveBallot
                    | Intrinsic::BlockRead
                    | Intrinsic::BlockWrite => {
                        return Err(InterpretError::UnsupportedCall(intrinsic.to_string()))
                    }
                }
            }
            InstructionKind::Phi { .. }
            | InstructionKind::Branch { .. }
            | InstructionKind::CondBranch { .. }
            | InstructionKind::Return { .. }
            | InstructionKind::Unreachable => return Err(unsupported()),
        };
        Ok(Some(result))
    }
}

/// run `function` on `lane_count` lanes with the default step limit
pub fn interpret(
    function: &Function,
    lane_count: usize,
    arguments: &[Vec<u64>],
    memory: &mut Memory,
) -> Result<Vec<Option<LaneValue>>, InterpretError> {
    Interpreter::new(function, lane_count)?.run(arguments, memory)
}
