// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Managed-heap behavior driven through bytecode: collections triggered
//! by allocation, with live references on the evaluation stack.

use thorn_bytefile::opcode::OpCode;

use crate::object::Value;

use super::{byte_file, int_array, interpreter, single_module, stream};

#[test]
fn survivors_stay_reachable_across_collections() {
    // Keep an int[4] in local 0, write 42 into [0], then churn the young
    // generation with garbage arrays until several minor collections
    // have run. The local's pointer must follow the moving object.
    let mut code = vec![
        (OpCode::Push, 0),            // count 4
        (OpCode::AGcNew, int_array()),
        (OpCode::Store, 0),           // local 0 = gc pointer
        (OpCode::Load, 0),
        (OpCode::Push, 1),            // index 0
        (OpCode::ALea, 0),
        (OpCode::Push, 2),            // 42
        (OpCode::TStore, 0),
        (OpCode::Pop, 0),
        (OpCode::Pop, 0),
    ];
    // Each garbage array is ~100 bytes; the young generation holds 1024,
    // so 40 rounds force several minor collections.
    for _ in 0..40 {
        code.push((OpCode::Push, 0));
        code.push((OpCode::AGcNew, int_array()));
        code.push((OpCode::Pop, 0));
    }
    code.extend_from_slice(&[
        (OpCode::Load, 0),
        (OpCode::Push, 1),
        (OpCode::ALea, 0),
        (OpCode::TLoad, 0),
    ]);

    let file = byte_file(vec![4, 0, 42], vec![], vec![], vec![], vec![], stream(vec![], &code));
    let mut interp = interpreter(single_module(file));
    assert!(interp.interpret(), "exception: {:?}", interp.exception());
    assert_eq!(interp.result(), Some(Value::Int(42)));
}

#[test]
fn gcnew_without_collector_pushes_null() {
    let file = byte_file(
        vec![],
        vec![],
        vec![],
        vec![],
        vec![],
        stream(vec![], &[(OpCode::GcNew, thorn_bytefile::types::TypeCode::INT.0)]),
    );
    let program = single_module(file);
    let mut interp = crate::interp::Interpreter::new(program);
    interp.allocate_stack(4096);
    // No managed heap configured: the push still happens, with null.
    assert!(interp.interpret());
    assert_eq!(
        interp.stack().top_type(),
        Some(thorn_bytefile::types::TypeCode::GC_POINTER)
    );
}

#[test]
fn oversized_managed_allocation_routes_to_old_generation() {
    // 120 ints exceed the 1 KiB young default; the allocation must still
    // be readable afterwards.
    let file = byte_file(
        vec![120, 0, 7],
        vec![],
        vec![],
        vec![],
        vec![],
        stream(
            vec![],
            &[
                (OpCode::Push, 0),
                (OpCode::AGcNew, int_array()),
                (OpCode::Store, 0),
                (OpCode::Load, 0),
                (OpCode::Push, 1),
                (OpCode::ALea, 0),
                (OpCode::Push, 2),
                (OpCode::TStore, 0),
                (OpCode::Pop, 0),
                (OpCode::Pop, 0),
                (OpCode::Load, 0),
                (OpCode::Push, 1),
                (OpCode::ALea, 0),
                (OpCode::TLoad, 0),
            ],
        ),
    );
    let mut interp = interpreter(single_module(file));
    assert!(interp.interpret(), "exception: {:?}", interp.exception());
    assert_eq!(interp.result(), Some(Value::Int(7)));
}

#[test]
fn gc_pointer_store_invokes_the_barrier_path() {
    // Store through a gc-pointer (tstore on the gc slot itself): the
    // write goes through make_dirty without disturbing the value.
    let file = byte_file(
        vec![9],
        vec![],
        vec![],
        vec![],
        vec![],
        stream(
            vec![],
            &[
                (OpCode::GcNew, thorn_bytefile::types::TypeCode::INT.0), // [gcptr]
                (OpCode::Push, 0),                                       // [gcptr, 9]
                (OpCode::TStore, 0),
                (OpCode::Pop, 0),
                (OpCode::TLoad, 0),
            ],
        ),
    );
    let mut interp = interpreter(single_module(file));
    assert!(interp.interpret(), "exception: {:?}", interp.exception());
    assert_eq!(interp.result(), Some(Value::Int(9)));
}
