// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Arithmetic, bitwise, comparison and cast behavior.

use thorn_bytefile::opcode::OpCode;

use crate::exception::ExceptionCode;
use crate::object::Value;

use super::{run, run_err, run_with};

#[test]
fn int_addition() {
    // push 7; push 5; add => 12
    let interp = run(
        vec![7, 5],
        &[(OpCode::Push, 0), (OpCode::Push, 1), (OpCode::Add, 0)],
    );
    assert_eq!(interp.result(), Some(Value::Int(12)));
}

#[test]
fn long_signed_division() {
    // 10 idiv 3 => 3 (signed)
    let interp = run_with(
        vec![],
        vec![10, 3],
        vec![],
        vec![],
        vec![],
        &[(OpCode::Push, 0), (OpCode::Push, 1), (OpCode::IDiv, 0)],
    );
    assert_eq!(interp.result(), Some(Value::Long(3)));
}

#[test]
fn double_division() {
    // 5.0 / 2.0 => 2.5
    let interp = run_with(
        vec![],
        vec![],
        vec![5.0, 2.0],
        vec![],
        vec![],
        &[(OpCode::Push, 0), (OpCode::Push, 1), (OpCode::Div, 0)],
    );
    assert_eq!(interp.result(), Some(Value::Double(2.5)));
}

#[test]
fn signed_division_of_negative_int() {
    // -6 idiv 2 => -3; unsigned div of the same bits differs.
    let minus_six = (-6i32) as u32;
    let interp = run(
        vec![minus_six, 2],
        &[(OpCode::Push, 0), (OpCode::Push, 1), (OpCode::IDiv, 0)],
    );
    assert_eq!(interp.result(), Some(Value::Int((-3i32) as u32)));

    let interp = run(
        vec![minus_six, 2],
        &[(OpCode::Push, 0), (OpCode::Push, 1), (OpCode::Div, 0)],
    );
    assert_eq!(interp.result(), Some(Value::Int(minus_six / 2)));
}

#[test]
fn division_by_zero_leaves_stack_unchanged() {
    for opcode in [OpCode::Div, OpCode::IDiv, OpCode::Mod, OpCode::IMod] {
        let interp = run_err(
            vec![9, 0],
            &[(OpCode::Push, 0), (OpCode::Push, 1), (opcode, 0)],
            ExceptionCode::ArithDivideByZero,
        );
        // Both operands still on the stack.
        assert_eq!(interp.stack().used(), 32);
        assert_eq!(interp.result(), Some(Value::Int(0)));
    }
}

#[test]
fn float_modulo_is_ieee_remainder() {
    let interp = run_with(
        vec![],
        vec![],
        vec![7.5, 2.0],
        vec![],
        vec![],
        &[(OpCode::Push, 0), (OpCode::Push, 1), (OpCode::Mod, 0)],
    );
    assert_eq!(interp.result(), Some(Value::Double(1.5)));
}

#[test]
fn mixed_types_are_rejected() {
    run_err(
        vec![1],
        &[(OpCode::Push, 0), (OpCode::Push, 0), (OpCode::ToL, 0), (OpCode::Add, 0)],
        ExceptionCode::StackDifferentType,
    );
}

#[test]
fn arith_on_pointer_is_rejected() {
    run_err(
        vec![],
        &[(OpCode::Null, 0), (OpCode::Null, 0), (OpCode::Add, 0)],
        ExceptionCode::PointerInvalidForPointer,
    );
}

#[test]
fn neg_flips_sign_in_place() {
    let interp = run(vec![5], &[(OpCode::Push, 0), (OpCode::Neg, 0)]);
    assert_eq!(interp.result(), Some(Value::Int((-5i32) as u32)));
}

#[test]
fn wrapping_multiplication() {
    let interp = run(
        vec![0x8000_0001, 2],
        &[(OpCode::Push, 0), (OpCode::Push, 1), (OpCode::Mul, 0)],
    );
    assert_eq!(interp.result(), Some(Value::Int(2)));
}

#[test]
fn bitwise_lanes() {
    let interp = run(
        vec![0b1100, 0b1010],
        &[(OpCode::Push, 0), (OpCode::Push, 1), (OpCode::And, 0)],
    );
    assert_eq!(interp.result(), Some(Value::Int(0b1000)));

    let interp = run(
        vec![0b1100, 0b1010],
        &[(OpCode::Push, 0), (OpCode::Push, 1), (OpCode::Xor, 0)],
    );
    assert_eq!(interp.result(), Some(Value::Int(0b0110)));
}

#[test]
fn shifts() {
    let interp = run(
        vec![1, 4],
        &[(OpCode::Push, 0), (OpCode::Push, 1), (OpCode::Shl, 0)],
    );
    assert_eq!(interp.result(), Some(Value::Int(16)));

    // sar sign-extends, shr does not.
    let minus_eight = (-8i32) as u32;
    let interp = run(
        vec![minus_eight, 1],
        &[(OpCode::Push, 0), (OpCode::Push, 1), (OpCode::Sar, 0)],
    );
    assert_eq!(interp.result(), Some(Value::Int((-4i32) as u32)));

    let interp = run(
        vec![minus_eight, 1],
        &[(OpCode::Push, 0), (OpCode::Push, 1), (OpCode::Shr, 0)],
    );
    assert_eq!(interp.result(), Some(Value::Int(minus_eight >> 1)));
}

#[test]
fn not_inverts_bits() {
    let interp = run(vec![0], &[(OpCode::Push, 0), (OpCode::Not, 0)]);
    assert_eq!(interp.result(), Some(Value::Int(u32::MAX)));
}

#[test]
fn compare_pushes_ordering() {
    // 7 cmp 5 => 1
    let interp = run(
        vec![7, 5],
        &[(OpCode::Push, 0), (OpCode::Push, 1), (OpCode::Cmp, 0)],
    );
    assert_eq!(interp.result(), Some(Value::Int(1)));

    // 5 cmp 5 => 0
    let interp = run(
        vec![5, 5],
        &[(OpCode::Push, 0), (OpCode::Push, 1), (OpCode::Cmp, 0)],
    );
    assert_eq!(interp.result(), Some(Value::Int(0)));

    // 3 cmp 5 => -1
    let interp = run(
        vec![3, 5],
        &[(OpCode::Push, 0), (OpCode::Push, 1), (OpCode::Cmp, 0)],
    );
    assert_eq!(interp.result(), Some(Value::Int(u32::MAX)));
}

#[test]
fn signed_compare_differs_from_unsigned() {
    let minus_one = u32::MAX;
    // Unsigned: MAX > 1.
    let interp = run(
        vec![minus_one, 1],
        &[(OpCode::Push, 0), (OpCode::Push, 1), (OpCode::Cmp, 0)],
    );
    assert_eq!(interp.result(), Some(Value::Int(1)));

    // Signed: -1 < 1.
    let interp = run(
        vec![minus_one, 1],
        &[(OpCode::Push, 0), (OpCode::Push, 1), (OpCode::ICmp, 0)],
    );
    assert_eq!(interp.result(), Some(Value::Int(u32::MAX)));
}

#[test]
fn casts_between_fundamentals() {
    // int 7 -> long
    let interp = run(vec![7], &[(OpCode::Push, 0), (OpCode::ToL, 0)]);
    assert_eq!(interp.result(), Some(Value::Long(7)));

    // int 7 -> double
    let interp = run(vec![7], &[(OpCode::Push, 0), (OpCode::ToD, 0)]);
    assert_eq!(interp.result(), Some(Value::Double(7.0)));

    // double 2.75 -> int truncates
    let interp = run_with(
        vec![],
        vec![],
        vec![2.75],
        vec![],
        vec![],
        &[(OpCode::Push, 0), (OpCode::ToI, 0)],
    );
    assert_eq!(interp.result(), Some(Value::Int(2)));

    // int -> single
    let interp = run(vec![3], &[(OpCode::Push, 0), (OpCode::ToSi, 0)]);
    assert_eq!(interp.result(), Some(Value::Single(3.0)));
}

#[test]
fn cast_on_gc_pointer_is_rejected() {
    run_err(
        vec![],
        &[(OpCode::GcNull, 0), (OpCode::ToI, 0)],
        ExceptionCode::PointerInvalidForPointer,
    );
}

#[test]
fn inc_and_dec_work_through_pointers() {
    // Store 41 in a local, lea it, inc the pointee, reload.
    let interp = run(
        vec![41],
        &[
            (OpCode::Push, 0),
            (OpCode::Store, 0),
            (OpCode::Lea, 0),
            (OpCode::Inc, 0),
            (OpCode::Load, 0),
        ],
    );
    assert_eq!(interp.result(), Some(Value::Int(42)));

    let interp = run(
        vec![41],
        &[
            (OpCode::Push, 0),
            (OpCode::Store, 0),
            (OpCode::Lea, 0),
            (OpCode::Dec, 0),
            (OpCode::Load, 0),
        ],
    );
    assert_eq!(interp.result(), Some(Value::Int(40)));
}
