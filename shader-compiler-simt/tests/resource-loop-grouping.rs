// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

mod common;

use common::*;
use shader_compiler_ir::prelude::*;
use shader_compiler_ir::AddressSpace;
use shader_compiler_ir::BinaryOp;
use shader_compiler_ir::FloatType;
use shader_compiler_ir::IntegerType;
use shader_compiler_ir::ResourceLoopMarker;
use shader_compiler_simt::resource_loop_marker;
use shader_compiler_simt::resource_loop_runs;
use shader_compiler_simt::FunctionPass;
use shader_compiler_simt::ResourceLoopGrouping;

const TEXEL: Type = Type::Vector {
    element: shader_compiler_ir::ScalarType::Float(FloatType::Float32),
    length: 4,
};

/// arguments: a divergent resource, a second divergent resource, a uniform
/// resource, a sampler, two divergent coordinates, and an output pointer
fn resources_kernel() -> (Function, Handle<Block>) {
    let mut function = kernel(
        "resources",
        &[
            ("texture", Type::Resource, ArgumentKind::PerInvocation),
            ("other", Type::Resource, ArgumentKind::PerInvocation),
            ("shared", Type::Resource, ArgumentKind::Uniform),
            ("sampler", Type::Sampler, ArgumentKind::Uniform),
            ("x", Type::I32, ArgumentKind::PerInvocation),
            ("y", Type::I32, ArgumentKind::PerInvocation),
            ("out", Type::pointer(AddressSpace::Global), ArgumentKind::Uniform),
        ],
    );
    let entry = function.add_block("entry");
    (function, entry)
}

const TEXTURE: Value = Value::Argument(0);
const OTHER: Value = Value::Argument(1);
const SHARED: Value = Value::Argument(2);
const SAMPLER: Value = Value::Argument(3);
const X: Value = Value::Argument(4);
const Y: Value = Value::Argument(5);
const OUT: Value = Value::Argument(6);

fn instruction(value: Value) -> Handle<Instruction> {
    value.instruction().unwrap()
}

fn run(function: &mut Function, block: Handle<Block>) -> Vec<Vec<Handle<Instruction>>> {
    let before = structure(function);
    ResourceLoopGrouping.run(function);
    assert_eq!(structure(function), before);
    assert_verifies(function);
    resource_loop_runs(function, block)
}

#[test]
fn test_loads_of_one_resource_form_a_run() {
    let (mut function, entry) = resources_kernel();
    let mut builder = Builder::new(&mut function, entry);
    let first = builder.resource_load(TEXEL, TEXTURE, X);
    let second = builder.resource_load(TEXEL, TEXTURE, Y);
    let one = builder.const_i32(1);
    let next = builder.binary(BinaryOp::Add, X, one);
    let third = builder.resource_load(TEXEL, TEXTURE, next);
    builder.ret(None);
    assert!(ResourceLoopGrouping.run(&mut function));
    println!("{}", function);
    assert_eq!(
        resource_loop_marker(&function, instruction(first)),
        ResourceLoopMarker::START
    );
    assert_eq!(
        resource_loop_marker(&function, instruction(second)),
        ResourceLoopMarker::INSIDE
    );
    assert_eq!(
        resource_loop_marker(&function, instruction(next)),
        ResourceLoopMarker::OUTSIDE
    );
    assert_eq!(
        resource_loop_marker(&function, instruction(third)),
        ResourceLoopMarker::INSIDE | ResourceLoopMarker::END
    );
    assert_eq!(
        resource_loop_runs(&function, entry),
        vec![vec![instruction(first), instruction(second), instruction(third)]]
    );
    assert!(!ResourceLoopGrouping.run(&mut function));
}

#[test]
fn test_samples_group_by_sampler() {
    let (mut function, entry) = resources_kernel();
    let mut builder = Builder::new(&mut function, entry);
    let first = builder.resource_sample(TEXEL, TEXTURE, SAMPLER, X);
    let second = builder.resource_sample(TEXEL, TEXTURE, SAMPLER, Y);
    let load = builder.resource_load(TEXEL, TEXTURE, X);
    builder.ret(None);
    assert_eq!(
        run(&mut function, entry),
        vec![
            vec![instruction(first), instruction(second)],
            vec![instruction(load)]
        ]
    );
    assert_eq!(
        resource_loop_marker(&function, instruction(load)),
        ResourceLoopMarker::START | ResourceLoopMarker::END
    );
}

#[test]
fn test_uniform_and_narrow_accesses_are_not_grouped() {
    let (mut function, entry) = resources_kernel();
    let mut builder = Builder::new(&mut function, entry);
    builder.resource_load(TEXEL, SHARED, X);
    builder.resource_load(TEXEL, SHARED, Y);
    builder.resource_load(Type::vector(IntegerType::Int16, 2), TEXTURE, X);
    builder.resource_load(Type::vector(FloatType::Float32, 8), TEXTURE, Y);
    builder.ret(None);
    let before = structure(&function);
    assert!(!ResourceLoopGrouping.run(&mut function));
    assert_eq!(structure(&function), before);
    assert!(resource_loop_runs(&function, entry).is_empty());
}

#[test]
fn test_different_resources_split_runs() {
    let (mut function, entry) = resources_kernel();
    let mut builder = Builder::new(&mut function, entry);
    let first = builder.resource_load(TEXEL, TEXTURE, X);
    let second = builder.resource_load(TEXEL, OTHER, X);
    let third = builder.resource_load(TEXEL, OTHER, Y);
    builder.ret(None);
    assert_eq!(
        run(&mut function, entry),
        vec![
            vec![instruction(first)],
            vec![instruction(second), instruction(third)]
        ]
    );
}

#[test]
fn test_absorbed_extracts_and_dependent_loads() {
    let (mut function, entry) = resources_kernel();
    let mut builder = Builder::new(&mut function, entry);
    let first = builder.resource_load(Type::vector(IntegerType::Int32, 2), TEXTURE, X);
    let zero = builder.const_i32(0);
    let element = builder.extract_element(first, zero);
    // independent of the run, the extract doesn't break it
    let second = builder.resource_load(Type::vector(IntegerType::Int32, 2), TEXTURE, Y);
    // the coordinate comes from the run, so this starts a new run
    let third = builder.resource_load(Type::vector(IntegerType::Int32, 2), TEXTURE, element);
    builder.ret(None);
    assert_eq!(
        run(&mut function, entry),
        vec![
            vec![instruction(first), instruction(second)],
            vec![instruction(third)]
        ]
    );
    assert_eq!(
        resource_loop_marker(&function, instruction(element)),
        ResourceLoopMarker::OUTSIDE
    );
}

#[test]
fn test_escaping_values_and_side_effects_split_runs() {
    let (mut function, entry) = resources_kernel();
    let mut builder = Builder::new(&mut function, entry);
    let first = builder.resource_load(Type::I32, TEXTURE, X);
    // used after the next load, so it can't move into the loop
    let offset = builder.binary(BinaryOp::Add, X, Y);
    let second = builder.resource_load(Type::I32, TEXTURE, Y);
    builder.store(OUT, offset);
    let third = builder.resource_load(Type::I32, TEXTURE, X);
    builder.ret(None);
    assert_eq!(
        run(&mut function, entry),
        vec![
            vec![instruction(first)],
            vec![instruction(second)],
            vec![instruction(third)]
        ]
    );
}

#[test]
fn test_flags_close_runs() {
    let (mut function, entry) = resources_kernel();
    let mut builder = Builder::new(&mut function, entry);
    let first = builder.resource_load(Type::I32, TEXTURE, X);
    let flag = builder.compare(shader_compiler_ir::CompareOp::Eq, X, Y);
    let second = builder.resource_load(Type::I32, TEXTURE, Y);
    builder.store(OUT, flag);
    builder.ret(None);
    assert_eq!(
        run(&mut function, entry),
        vec![vec![instruction(first)], vec![instruction(second)]]
    );
}

#[test]
fn test_stale_markers_are_cleared() {
    let (mut function, entry) = resources_kernel();
    let mut builder = Builder::new(&mut function, entry);
    let load = builder.resource_load(TEXEL, SHARED, X);
    builder.ret(None);
    function.instructions[instruction(load)].resource_loop_marker = ResourceLoopMarker::START;
    assert!(ResourceLoopGrouping.run(&mut function));
    assert_eq!(
        resource_loop_marker(&function, instruction(load)),
        ResourceLoopMarker::OUTSIDE
    );
    assert!(!ResourceLoopGrouping.run(&mut function));
}
