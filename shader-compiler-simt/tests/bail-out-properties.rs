// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! every pass leaves a randomly broken idiom untouched

mod common;

use common::*;
use proptest::prelude::*;
use shader_compiler_ir::prelude::*;
use shader_compiler_ir::verify;
use shader_compiler_ir::AddressSpace;
use shader_compiler_ir::BinaryOp;
use shader_compiler_ir::CastOp;
use shader_compiler_ir::CompareOp;
use shader_compiler_ir::FloatType;
use shader_compiler_ir::IntegerType;
use shader_compiler_ir::TargetProperties;
use shader_compiler_simt::AddressScalarization;
use shader_compiler_simt::AtomicReductionFusion;
use shader_compiler_simt::FunctionPass;
use shader_compiler_simt::ResourceLoopGrouping;

fn assert_left_alone(
    pass: &dyn FunctionPass,
    mut function: Function,
) -> Result<(), TestCaseError> {
    prop_assert!(verify(&function).is_ok(), "{}", function);
    let before = function.to_string();
    prop_assert!(!pass.run(&mut function), "{} changed\n{}", pass.name(), function);
    prop_assert_eq!(function.to_string(), before);
    prop_assert!(verify(&function).is_ok(), "{}", function);
    Ok(())
}

fn assert_rewritten(
    pass: &dyn FunctionPass,
    mut function: Function,
) -> Result<(), TestCaseError> {
    prop_assert!(verify(&function).is_ok(), "{}", function);
    prop_assert!(pass.run(&mut function), "{} did nothing\n{}", pass.name(), function);
    prop_assert!(verify(&function).is_ok(), "{}", function);
    Ok(())
}

const POINTER: Value = Value::Argument(0);
const X: Value = Value::Argument(1);

#[derive(Copy, Clone, Debug)]
enum AtomicBreakage {
    None,
    /// unconditional back edge
    MissingExit,
    /// `cmp.ne` with the exit on the true edge
    SwappedTargets,
    /// `cmp.eq` retrying when the exchange succeeded
    EqRetryingOnSuccess,
    OrderedPredicate(CompareOp),
    DivergentAddress,
    NonAssociative(BinaryOp),
    /// `x - read`
    SubtractFromOperand,
    /// the per-lane operand is computed in the loop
    OperandInLoop,
    StoreInLoop,
}

fn arb_associative_op() -> impl Strategy<Value = BinaryOp> {
    prop::sample::select(vec![
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::And,
        BinaryOp::Or,
        BinaryOp::Xor,
        BinaryOp::UMin,
        BinaryOp::UMax,
        BinaryOp::SMin,
        BinaryOp::SMax,
    ])
}

fn arb_atomic_breakage() -> impl Strategy<Value = AtomicBreakage> {
    prop_oneof![
        Just(AtomicBreakage::MissingExit),
        Just(AtomicBreakage::SwappedTargets),
        Just(AtomicBreakage::EqRetryingOnSuccess),
        prop::sample::select(vec![
            CompareOp::ULt,
            CompareOp::UGe,
            CompareOp::SLe,
            CompareOp::SGt,
        ])
        .prop_map(AtomicBreakage::OrderedPredicate),
        Just(AtomicBreakage::DivergentAddress),
        prop::sample::select(vec![
            BinaryOp::UDiv,
            BinaryOp::SDiv,
            BinaryOp::Shl,
            BinaryOp::LShr,
            BinaryOp::AShr,
        ])
        .prop_map(AtomicBreakage::NonAssociative),
        Just(AtomicBreakage::SubtractFromOperand),
        Just(AtomicBreakage::OperandInLoop),
        Just(AtomicBreakage::StoreInLoop),
    ]
}

/// `*p op= x` as a compare-exchange loop, broken by `breakage`
fn atomic_loop(op: BinaryOp, read_on_right: bool, breakage: AtomicBreakage) -> Function {
    let (op, read_on_right) = match breakage {
        AtomicBreakage::NonAssociative(op) => (op, read_on_right),
        AtomicBreakage::SubtractFromOperand => (BinaryOp::Sub, true),
        _ if op == BinaryOp::Sub => (op, false),
        _ => (op, read_on_right),
    };
    let address_kind = match breakage {
        AtomicBreakage::DivergentAddress => ArgumentKind::PerInvocation,
        _ => ArgumentKind::Uniform,
    };
    let mut function = kernel(
        "atomic_update",
        &[
            ("p", Type::pointer(AddressSpace::Global), address_kind),
            ("x", Type::I64, ArgumentKind::PerInvocation),
        ],
    );
    let entry = function.add_block("entry");
    let loop_block = function.add_block("loop");
    let exit = function.add_block("exit");
    let mut builder = Builder::new(&mut function, entry);
    builder.branch(loop_block);
    builder.switch_to_block(loop_block);
    let read = builder.atomic_load(Type::I64, POINTER);
    let operand = match breakage {
        AtomicBreakage::OperandInLoop => builder.binary(BinaryOp::Add, X, X),
        _ => X,
    };
    let update = if read_on_right {
        builder.binary(op, operand, read)
    } else {
        builder.binary(op, read, operand)
    };
    if let AtomicBreakage::StoreInLoop = breakage {
        builder.store(POINTER, operand);
    }
    let old = builder.atomic_cmpxchg(POINTER, read, update);
    let (predicate, retry_on_true) = match breakage {
        AtomicBreakage::SwappedTargets => (CompareOp::Ne, false),
        AtomicBreakage::EqRetryingOnSuccess => (CompareOp::Eq, true),
        AtomicBreakage::OrderedPredicate(predicate) => (predicate, true),
        _ => (CompareOp::Ne, true),
    };
    let retry = builder.compare(predicate, old, read);
    match breakage {
        AtomicBreakage::MissingExit => {
            builder.branch(loop_block);
        }
        _ if retry_on_true => {
            builder.cond_branch(retry, loop_block, exit);
        }
        _ => {
            builder.cond_branch(retry, exit, loop_block);
        }
    }
    builder.switch_to_block(exit);
    builder.ret(None);
    function
}

const BASE: Value = Value::Argument(0);
const OUT: Value = Value::Argument(1);
const INDEX: Value = Value::Argument(2);
const U: Value = Value::Argument(3);

#[derive(Copy, Clone, Debug)]
enum AddressBreakage {
    None,
    /// the offset starts from uniform values only
    UniformStart,
    /// the access is under `br lane == 0`
    DivergentBranch,
    /// the address passes through a vector bitcast
    VectorOperand,
}

fn arb_address_breakage() -> impl Strategy<Value = AddressBreakage> {
    prop_oneof![
        Just(AddressBreakage::UniformStart),
        Just(AddressBreakage::DivergentBranch),
        Just(AddressBreakage::VectorOperand),
    ]
}

/// `op` applied to the offset with `u` (`true`) or a constant (`false`)
fn arb_offset_steps() -> impl Strategy<Value = Vec<(BinaryOp, bool)>> {
    let op = prop::sample::select(vec![
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::And,
        BinaryOp::Or,
        BinaryOp::Xor,
        BinaryOp::Shl,
    ]);
    prop::collection::vec((op, any::<bool>()), 0..5)
}

/// `block_write(out, block_read(base + 4 * offset))` with `offset` built from `index + lane`
fn block_access(steps: &[(BinaryOp, bool)], breakage: AddressBreakage) -> Function {
    let global = Type::pointer(AddressSpace::Global);
    let mut function = kernel(
        "block_access",
        &[
            ("base", global, ArgumentKind::Uniform),
            ("out", global, ArgumentKind::Uniform),
            ("index", Type::I32, ArgumentKind::PerInvocation),
            ("u", Type::I32, ArgumentKind::Uniform),
        ],
    );
    let entry = function.add_block("entry");
    let access_block = match breakage {
        AddressBreakage::DivergentBranch => function.add_block("then"),
        _ => entry,
    };
    let exit = function.add_block("exit");
    let mut builder = Builder::new(&mut function, entry);
    let lane = builder.intrinsic(Intrinsic::SubgroupLocalInvocationId);
    if access_block != entry {
        let zero = builder.const_i32(0);
        let first_lane = builder.compare(CompareOp::Eq, lane, zero);
        builder.cond_branch(first_lane, access_block, exit);
        builder.switch_to_block(access_block);
    }
    let mut offset = match breakage {
        AddressBreakage::UniformStart => builder.binary(BinaryOp::Add, U, U),
        _ => builder.binary(BinaryOp::Add, INDEX, lane),
    };
    for &(op, uniform) in steps {
        let rhs = if uniform { U } else { builder.const_i32(3) };
        offset = builder.binary(op, offset, rhs);
    }
    let address = match breakage {
        AddressBreakage::VectorOperand => {
            let pair_type = Type::vector(IntegerType::Int32, 2);
            let wide = builder.cast(CastOp::ZExt, offset, Type::I64);
            let pair = builder.block_read(pair_type, BASE);
            let packed = builder.cast(CastOp::Bitcast, pair, Type::I64);
            let sum = builder.binary(BinaryOp::Add, packed, wide);
            let pointer = builder.cast(CastOp::IntToPtr, sum, global);
            let as_vector = builder.cast(CastOp::Bitcast, pointer, pair_type);
            builder.cast(CastOp::Bitcast, as_vector, global)
        }
        _ => builder.gep(BASE, offset, 4),
    };
    let value = builder.block_read(Type::I32, address);
    builder.block_write(OUT, value);
    builder.branch(exit);
    builder.switch_to_block(exit);
    builder.ret(None);
    function
}

const TEXTURE: Value = Value::Argument(0);
const COORDINATE: Value = Value::Argument(1);

#[derive(Copy, Clone, Debug)]
enum ResourceBreakage {
    None,
    UniformResource,
    /// `<2 x i16>` results
    NarrowElements,
    /// `<8 x f32>` results
    WideVector,
}

fn arb_resource_breakage() -> impl Strategy<Value = ResourceBreakage> {
    prop_oneof![
        Just(ResourceBreakage::UniformResource),
        Just(ResourceBreakage::NarrowElements),
        Just(ResourceBreakage::WideVector),
    ]
}

/// `count` back to back loads from the same resource
fn resource_loads(count: usize, breakage: ResourceBreakage) -> Function {
    let resource_kind = match breakage {
        ResourceBreakage::UniformResource => ArgumentKind::Uniform,
        _ => ArgumentKind::PerInvocation,
    };
    let mut function = kernel(
        "resource_loads",
        &[
            ("texture", Type::Resource, resource_kind),
            ("coordinate", Type::I32, ArgumentKind::PerInvocation),
        ],
    );
    let ty = match breakage {
        ResourceBreakage::NarrowElements => Type::vector(IntegerType::Int16, 2),
        ResourceBreakage::WideVector => Type::vector(FloatType::Float32, 8),
        ResourceBreakage::None | ResourceBreakage::UniformResource => {
            Type::vector(FloatType::Float32, 4)
        }
    };
    let entry = function.add_block("entry");
    let mut builder = Builder::new(&mut function, entry);
    for _ in 0..count {
        builder.resource_load(ty, TEXTURE, COORDINATE);
    }
    builder.ret(None);
    function
}

fn fusion() -> AtomicReductionFusion {
    AtomicReductionFusion::new(TargetProperties::default())
}

proptest! {
    #[test]
    fn intact_retry_loops_are_fused(op in arb_associative_op(), read_on_right in any::<bool>()) {
        assert_rewritten(&fusion(), atomic_loop(op, read_on_right, AtomicBreakage::None))?;
    }

    #[test]
    fn broken_retry_loops_are_left_alone(
        op in arb_associative_op(),
        read_on_right in any::<bool>(),
        breakage in arb_atomic_breakage(),
    ) {
        assert_left_alone(&fusion(), atomic_loop(op, read_on_right, breakage))?;
    }

    #[test]
    fn intact_addresses_are_scalarized(steps in arb_offset_steps()) {
        assert_rewritten(&AddressScalarization, block_access(&steps, AddressBreakage::None))?;
    }

    #[test]
    fn broken_addresses_are_left_alone(
        steps in arb_offset_steps(),
        breakage in arb_address_breakage(),
    ) {
        assert_left_alone(&AddressScalarization, block_access(&steps, breakage))?;
    }

    #[test]
    fn intact_resource_loads_are_grouped(count in 1..5usize) {
        assert_rewritten(&ResourceLoopGrouping, resource_loads(count, ResourceBreakage::None))?;
    }

    #[test]
    fn broken_resource_loads_are_left_alone(
        count in 1..5usize,
        breakage in arb_resource_breakage(),
    ) {
        assert_left_alone(&ResourceLoopGrouping, resource_loads(count, breakage))?;
    }
}
