// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Structure values: default initialization, field addressing, copies.

use thorn_bytefile::opcode::OpCode;
use thorn_bytefile::types::TypeCode;

use crate::exception::ExceptionCode;
use crate::object::Value;

use super::{byte_file, interpreter, run_err, single_module, stream};

/// Run against a byte file with one `structure0 { int, int }` and the
/// given int constants.
fn run_with_pair_struct(ints: Vec<u32>, code: &[(OpCode, u32)]) -> crate::interp::Interpreter {
    let file = byte_file(
        ints,
        vec![],
        vec![],
        vec![vec![(TypeCode::INT, 0), (TypeCode::INT, 0)]],
        vec![],
        stream(vec![], code),
    );
    let mut interp = interpreter(single_module(file));
    assert!(interp.interpret(), "exception: {:?}", interp.exception());
    interp
}

#[test]
fn push_structure_is_default_initialized() {
    // push structure0 (operand = pool total), read field 0 through lea.
    let ints = vec![0u32; 0];
    let interp = run_with_pair_struct(
        ints,
        &[
            (OpCode::Push, 0), // pool empty: operand 0 selects structure 0
            (OpCode::Store, 0),
            (OpCode::Lea, 0),
            (OpCode::FLea, 0),
            (OpCode::TLoad, 0),
        ],
    );
    assert_eq!(interp.result(), Some(Value::Int(0)));
}

#[test]
fn field_write_then_read() {
    // Set field 1 to 11, read it back.
    let interp = run_with_pair_struct(
        vec![11],
        &[
            (OpCode::Push, 1), // structure 0 (1 int constant in the pool)
            (OpCode::Store, 0),
            (OpCode::Lea, 0),
            (OpCode::FLea, 1),
            (OpCode::Push, 0), // 11
            (OpCode::TStore, 0),
            (OpCode::Pop, 0),
            (OpCode::Pop, 0),
            (OpCode::Lea, 0),
            (OpCode::FLea, 1),
            (OpCode::TLoad, 0),
        ],
    );
    assert_eq!(interp.result(), Some(Value::Int(11)));
}

#[test]
fn sibling_field_stays_untouched() {
    // Writing field 1 leaves field 0 zero.
    let interp = run_with_pair_struct(
        vec![11],
        &[
            (OpCode::Push, 1),
            (OpCode::Store, 0),
            (OpCode::Lea, 0),
            (OpCode::FLea, 1),
            (OpCode::Push, 0),
            (OpCode::TStore, 0),
            (OpCode::Pop, 0),
            (OpCode::Pop, 0),
            (OpCode::Lea, 0),
            (OpCode::FLea, 0),
            (OpCode::TLoad, 0),
        ],
    );
    assert_eq!(interp.result(), Some(Value::Int(0)));
}

#[test]
fn flea_field_out_of_range() {
    let file = byte_file(
        vec![],
        vec![],
        vec![],
        vec![vec![(TypeCode::INT, 0)]],
        vec![],
        stream(
            vec![],
            &[
                (OpCode::Push, 0),
                (OpCode::Store, 0),
                (OpCode::Lea, 0),
                (OpCode::FLea, 5),
            ],
        ),
    );
    let mut interp = interpreter(single_module(file));
    assert!(!interp.interpret());
    assert_eq!(
        interp.exception().unwrap().code,
        ExceptionCode::StructureFieldOutOfRange
    );
}

#[test]
fn flea_on_non_structure_pointer_is_rejected() {
    run_err(
        vec![1],
        &[
            (OpCode::Push, 0),
            (OpCode::Store, 0),
            (OpCode::Lea, 0),
            (OpCode::FLea, 0),
        ],
        ExceptionCode::StructureNotStructure,
    );
}

#[test]
fn structure_load_copies_all_fields() {
    // Write into a struct local, load a copy, mutate the copy's field,
    // and confirm the original is unchanged.
    let interp = run_with_pair_struct(
        vec![5],
        &[
            (OpCode::Push, 1),  // struct local
            (OpCode::Store, 0),
            (OpCode::Lea, 0),
            (OpCode::FLea, 0),
            (OpCode::Push, 0),  // 5
            (OpCode::TStore, 0),
            (OpCode::Pop, 0),
            (OpCode::Pop, 0),
            (OpCode::Load, 0),  // copy of the structure on the stack
            (OpCode::Pop, 0),   // drop the copy
            (OpCode::Lea, 0),
            (OpCode::FLea, 0),
            (OpCode::TLoad, 0),
        ],
    );
    assert_eq!(interp.result(), Some(Value::Int(5)));
}

#[test]
fn push_unknown_structure_is_rejected() {
    run_err(
        vec![],
        &[(OpCode::Push, 3)],
        ExceptionCode::ConstantPoolOutOfRange,
    );
}

#[test]
fn gcnew_structure_initializes_fields() {
    let file = byte_file(
        vec![0],
        vec![],
        vec![],
        vec![vec![(TypeCode::INT, 0), (TypeCode::INT, 0)]],
        vec![],
        stream(
            vec![],
            &[
                (OpCode::GcNew, TypeCode::structure(0).0),
                (OpCode::FLea, 1),
                (OpCode::TLoad, 0),
            ],
        ),
    );
    let mut interp = interpreter(single_module(file));
    assert!(interp.interpret(), "exception: {:?}", interp.exception());
    assert_eq!(interp.result(), Some(Value::Int(0)));
}

#[test]
fn new_structure_tstore_through_pointer() {
    let file = byte_file(
        vec![9],
        vec![],
        vec![],
        vec![vec![(TypeCode::INT, 0), (TypeCode::INT, 0)]],
        vec![],
        stream(
            vec![],
            &[
                (OpCode::New, TypeCode::structure(0).0), // [ptr]
                (OpCode::Copy, 0),                       // [ptr, ptr]
                (OpCode::FLea, 0),                       // [ptr, f0]
                (OpCode::Push, 0),                       // [ptr, f0, 9]
                (OpCode::TStore, 0),
                (OpCode::Pop, 0),
                (OpCode::Pop, 0),                        // [ptr]
                (OpCode::FLea, 0),
                (OpCode::TLoad, 0),
            ],
        ),
    );
    let mut interp = interpreter(single_module(file));
    assert!(interp.interpret(), "exception: {:?}", interp.exception());
    assert_eq!(interp.result(), Some(Value::Int(9)));
}
