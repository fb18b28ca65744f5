// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

#![allow(dead_code)]

use shader_compiler_ir::prelude::*;
use shader_compiler_ir::verify;
use shader_compiler_simt::interpret::LaneValue;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn kernel(name: &str, arguments: &[(&str, Type, ArgumentKind)]) -> Function {
    init_logging();
    Function::new(
        name,
        FunctionKind::Kernel,
        arguments
            .iter()
            .map(|&(name, ty, kind)| Argument::new(name, ty, kind))
            .collect(),
        Type::Void,
    )
}

pub fn assert_verifies(function: &Function) {
    if let Err(error) = verify(function) {
        panic!("{}\n{}", error, function);
    }
}

/// every attached call of `intrinsic`
pub fn calls_of(function: &Function, intrinsic: Intrinsic) -> Vec<Handle<Instruction>> {
    function
        .attached_instructions()
        .filter(|&instruction| {
            function.instructions[instruction].kind.intrinsic() == Some(intrinsic)
        })
        .collect()
}

/// the instruction kinds of every block, for comparing structure
pub fn structure(function: &Function) -> Vec<Vec<InstructionKind>> {
    function
        .layout()
        .iter()
        .map(|&block| {
            function.blocks[block]
                .instructions()
                .iter()
                .map(|&instruction| function.instructions[instruction].kind.clone())
                .collect()
        })
        .collect()
}

pub fn scalar_results(results: Vec<Option<LaneValue>>) -> Vec<u64> {
    results
        .into_iter()
        .map(|result| result.map_or(0, |value| value[0]))
        .collect()
}
