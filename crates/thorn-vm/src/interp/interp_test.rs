// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Interpreter tests: shared builders plus per-area suites.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod arith_test;
mod gc_test;
mod heap_test;
mod structure_test;

use thorn_bytefile::ByteFile;
use thorn_bytefile::constant_pool::ConstantPool;
use thorn_bytefile::function::Function;
use thorn_bytefile::instruction::{Instruction, Instructions};
use thorn_bytefile::opcode::OpCode;
use thorn_bytefile::structure::Structures;
use thorn_bytefile::types::TypeCode;

use crate::exception::ExceptionCode;
use crate::interp::Interpreter;
use crate::module::{ModuleInfo, ModuleKind};
use crate::program::Program;

/// Operand bit requesting an array element type (`anew` family).
pub const ARRAY_BIT: u32 = 1 << 31;

/// `anew`/`agcnew`/`apush` operand for int elements.
pub const fn int_array() -> u32 {
    ARRAY_BIT | TypeCode::INT.0
}

/// Build an instruction stream from `(opcode, operand)` pairs.
pub fn stream(labels: Vec<u64>, code: &[(OpCode, u32)]) -> Instructions {
    let instructions = code
        .iter()
        .enumerate()
        .map(|(i, &(opcode, operand))| Instruction::new(opcode, operand, i as u64))
        .collect();
    Instructions::new(labels, instructions)
}

/// A byte file with int/long/double constants, raw structures and
/// functions.
pub fn byte_file(
    ints: Vec<u32>,
    longs: Vec<u64>,
    doubles: Vec<f64>,
    structures: Vec<Vec<(TypeCode, u64)>>,
    functions: Vec<Function>,
    entry: Instructions,
) -> ByteFile {
    ByteFile {
        path: "test.tbc".to_string(),
        constant_pool: ConstantPool::new(ints, longs, doubles),
        structures: Structures::build(structures).unwrap(),
        functions,
        entry_point: entry,
    }
}

/// Link a single byte file into a program.
pub fn single_module(file: ByteFile) -> Program {
    Program::link(vec![ModuleInfo::new(ModuleKind::ByteFile(file))], 0).unwrap()
}

/// An interpreter with a modest stack and managed heap.
pub fn interpreter(program: Program) -> Interpreter {
    let mut interp = Interpreter::new(program);
    interp.allocate_stack(64 * 1024);
    interp.init_managed_heap(1024, 4096);
    interp
}

/// Run an entry stream built from int constants and instructions;
/// interpretation must succeed.
pub fn run(ints: Vec<u32>, code: &[(OpCode, u32)]) -> Interpreter {
    run_with(ints, vec![], vec![], vec![], vec![], code)
}

/// Run with the full byte-file surface; interpretation must succeed.
pub fn run_with(
    ints: Vec<u32>,
    longs: Vec<u64>,
    doubles: Vec<f64>,
    structures: Vec<Vec<(TypeCode, u64)>>,
    functions: Vec<Function>,
    code: &[(OpCode, u32)],
) -> Interpreter {
    let file = byte_file(ints, longs, doubles, structures, functions, stream(vec![], code));
    let mut interp = interpreter(single_module(file));
    assert!(interp.interpret(), "exception: {:?}", interp.exception());
    interp
}

/// Run and expect interpretation to halt with `code`.
pub fn run_err(ints: Vec<u32>, code: &[(OpCode, u32)], expected: ExceptionCode) -> Interpreter {
    let file = byte_file(ints, vec![], vec![], vec![], vec![], stream(vec![], code));
    let mut interp = interpreter(single_module(file));
    assert!(!interp.interpret());
    assert_eq!(interp.exception().unwrap().code, expected);
    interp
}
