// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Unmanaged-heap opcodes: new, delete, pointer errors.

use thorn_bytefile::opcode::OpCode;
use thorn_bytefile::types::TypeCode;

use crate::exception::ExceptionCode;
use crate::object::Value;

use super::{run, run_err};

#[test]
fn new_allocates_a_zeroed_instance() {
    let interp = run(
        vec![],
        &[(OpCode::New, TypeCode::INT.0), (OpCode::TLoad, 0)],
    );
    assert_eq!(interp.result(), Some(Value::Int(0)));
    assert_eq!(interp.heap().unmanaged_count(), 1);
}

#[test]
fn tstore_then_tload_through_unmanaged_pointer() {
    let interp = run(
        vec![13],
        &[
            (OpCode::New, TypeCode::INT.0), // [ptr]
            (OpCode::Push, 0),              // [ptr, 13]
            (OpCode::TStore, 0),
            (OpCode::Pop, 0),               // [ptr]
            (OpCode::TLoad, 0),             // [13]
        ],
    );
    assert_eq!(interp.result(), Some(Value::Int(13)));
}

#[test]
fn delete_releases_the_allocation() {
    let interp = run(
        vec![],
        &[(OpCode::New, TypeCode::INT.0), (OpCode::Delete, 0)],
    );
    assert_eq!(interp.heap().unmanaged_count(), 0);
    assert_eq!(interp.stack().used(), 0);
}

#[test]
fn delete_of_null_is_a_no_op() {
    let interp = run(vec![], &[(OpCode::Null, 0), (OpCode::Delete, 0)]);
    assert_eq!(interp.stack().used(), 0);
}

#[test]
fn double_delete_is_an_unknown_address() {
    run_err(
        vec![],
        &[
            (OpCode::New, TypeCode::INT.0),
            (OpCode::Copy, 0),
            (OpCode::Delete, 0),
            (OpCode::Delete, 0),
        ],
        ExceptionCode::PointerUnknownAddress,
    );
}

#[test]
fn delete_of_non_pointer_is_rejected() {
    run_err(
        vec![1],
        &[(OpCode::Push, 0), (OpCode::Delete, 0)],
        ExceptionCode::PointerNotPointer,
    );
}

#[test]
fn tload_of_null_pointer_is_rejected() {
    run_err(
        vec![],
        &[(OpCode::Null, 0), (OpCode::TLoad, 0)],
        ExceptionCode::PointerNullPointer,
    );
    run_err(
        vec![],
        &[(OpCode::GcNull, 0), (OpCode::TLoad, 0)],
        ExceptionCode::PointerNullPointer,
    );
}

#[test]
fn tload_of_non_pointer_is_rejected() {
    run_err(
        vec![1],
        &[(OpCode::Push, 0), (OpCode::TLoad, 0)],
        ExceptionCode::PointerNotPointer,
    );
}

#[test]
fn tload_after_delete_is_an_unknown_address() {
    run_err(
        vec![],
        &[
            (OpCode::New, TypeCode::INT.0),
            (OpCode::Copy, 0),
            (OpCode::Delete, 0),
            (OpCode::TLoad, 0),
        ],
        ExceptionCode::PointerUnknownAddress,
    );
}

#[test]
fn tstore_type_mismatch_is_rejected() {
    run_err(
        vec![1],
        &[
            (OpCode::New, TypeCode::INT.0),
            (OpCode::Push, 0),
            (OpCode::ToL, 0),
            (OpCode::TStore, 0),
        ],
        ExceptionCode::StackDifferentType,
    );
}

#[test]
fn new_with_unknown_type_is_rejected() {
    run_err(
        vec![],
        &[(OpCode::New, 0x7000)],
        ExceptionCode::TypeOutOfRange,
    );
}

#[test]
fn gcnew_pushes_a_gc_pointer() {
    let interp = run(
        vec![],
        &[(OpCode::GcNew, TypeCode::LONG.0), (OpCode::TLoad, 0)],
    );
    assert_eq!(interp.result(), Some(Value::Long(0)));
}

#[test]
fn top_reinterprets_a_pointer() {
    // A long local viewed through an int-typed pointer: lea, cast the
    // pointer to int view, tload reads the low half.
    let interp = run(
        vec![],
        &[
            (OpCode::New, TypeCode::INT.0),   // [ptr:int]
            (OpCode::ToP, TypeCode::INT.0),   // same pointee type, fresh view
            (OpCode::TLoad, 0),
        ],
    );
    assert_eq!(interp.result(), Some(Value::Int(0)));
}
