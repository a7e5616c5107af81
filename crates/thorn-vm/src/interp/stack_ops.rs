// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Stack-traffic opcodes: push, pop, load, store, lea, copy, swap and
//! in-place array construction.

use thorn_bytefile::constant_pool::Constant;
use thorn_bytefile::types::{ARRAY_HEADER_SIZE, POINTER_SIZE, TypeCode, TypeKind};

use crate::exception::ExceptionCode;
use crate::mem::MemAddr;
use crate::object::{self, RawPointer, TypeSizes, Value};

use super::Interpreter;

/// Decoded operands of an array-allocating opcode: the resolved element
/// type, the count consumed from the stack, the size of the count slot
/// and the total array-object size.
pub(super) struct ArrayInfo {
    pub element: TypeCode,
    pub count: u64,
    pub count_size: usize,
    pub total_size: usize,
}

impl Interpreter {
    pub(super) fn interpret_push(&mut self, operand: u32) {
        let module = self
            .program
            .module(self.frame.module)
            .expect("active frame names a module");
        let pool = &module.constant_pool;
        let total = pool.total_count();

        if operand >= total {
            self.push_structure_value(operand - total);
            return;
        }

        let value = match pool.get(operand) {
            Some(Constant::Int(v)) => Value::Int(v),
            Some(Constant::Long(v)) => Value::Long(v),
            Some(Constant::Double(v)) => Value::Double(v),
            None => {
                self.occur(ExceptionCode::ConstantPoolOutOfRange);
                return;
            }
        };
        self.push_value(value);
    }

    /// Push a fundamental value, recording overflow as an exception.
    pub(super) fn push_value(&mut self, value: Value) {
        let size = value
            .type_code()
            .fundamental_size()
            .expect("fundamental values have fixed sizes");
        if !self.stack.expand(size) {
            self.occur(ExceptionCode::StackOverflow);
            return;
        }
        let used = self.stack.used();
        object::write_value(self.stack.as_bytes_mut(), used, value);
    }

    /// Push a default-initialized structure by local structure index.
    fn push_structure_value(&mut self, local_index: u32) {
        let Some(code) = self
            .program
            .resolve_type(self.frame.module, TypeCode::structure(local_index))
        else {
            self.occur(ExceptionCode::ConstantPoolOutOfRange);
            return;
        };
        let Some(size) = self.program.type_size(code) else {
            self.occur(ExceptionCode::ConstantPoolOutOfRange);
            return;
        };
        if !self.stack.expand(size) {
            self.occur(ExceptionCode::StackOverflow);
            return;
        }

        let used = self.stack.used();
        // The structure layout is read through the program while the
        // stack buffer is written; split the borrows.
        let Self { stack, program, .. } = self;
        object::init_structure(stack.as_bytes_mut(), used, program, code);
    }

    pub(super) fn interpret_pop(&mut self) {
        if self.is_local_variable(0) {
            self.local_variables.pop();
        }

        let Some(tag) = self.stack.top_type() else {
            self.occur(ExceptionCode::StackEmpty);
            return;
        };
        if !tag.is_value() {
            self.occur(ExceptionCode::StackEmpty);
            return;
        }
        let Some(size) = self.slot_size_at(self.stack.used()) else {
            self.occur(ExceptionCode::StackEmpty);
            return;
        };
        self.stack.reduce(size);
    }

    pub(super) fn interpret_load(&mut self, operand: u32) {
        let index = operand as usize + self.frame.variable_begin;
        let Some(offset) = self.local_variable_offset(index) else {
            self.occur(ExceptionCode::LocalVarOutOfRange);
            return;
        };

        let Some(size) = self.slot_size_at(offset) else {
            self.occur(ExceptionCode::StackEmpty);
            return;
        };
        if !self.stack.expand(size) {
            self.occur(ExceptionCode::StackOverflow);
            return;
        }

        let used = self.stack.used();
        self.stack
            .as_bytes_mut()
            .copy_within(offset - size..offset, used - size);
    }

    pub(super) fn interpret_store(&mut self, operand: u32) {
        if self.is_local_variable(0) {
            self.occur(ExceptionCode::StackEmpty);
            return;
        }

        let index = operand as usize + self.frame.variable_begin;
        if index > self.local_variables.len() {
            self.occur(ExceptionCode::LocalVarInvalidIndex);
            return;
        }

        if index == self.local_variables.len() {
            // Register the top slot as a new local; the value stays put.
            let Some(tag) = self.stack.top_type() else {
                self.occur(ExceptionCode::StackEmpty);
                return;
            };
            if !tag.is_value() {
                self.occur(ExceptionCode::StackEmpty);
                return;
            }
            self.local_variables.push(self.stack.used());
            return;
        }

        let Some(tag) = self.stack.top_type() else {
            self.occur(ExceptionCode::StackEmpty);
            return;
        };
        let offset = self.local_variables[index];
        let var_tag = self
            .stack
            .type_at(offset)
            .expect("local variables stay typed");
        if tag != var_tag {
            self.occur(ExceptionCode::StackDifferentType);
            return;
        }

        let used = self.stack.used();
        if tag == TypeCode::ARRAY {
            let (_, count) = object::read_array_header(self.stack.as_bytes(), used);
            let (_, var_count) = object::read_array_header(self.stack.as_bytes(), offset);
            if count != var_count {
                self.occur(ExceptionCode::ArrayCountDifferentCount);
                return;
            }
        }

        let Some(size) = self.slot_size_at(used) else {
            self.occur(ExceptionCode::StackEmpty);
            return;
        };
        self.stack
            .as_bytes_mut()
            .copy_within(used - size..used, offset - size);
        self.stack.reduce(size);
    }

    pub(super) fn interpret_lea(&mut self, operand: u32) {
        let index = operand as usize + self.frame.variable_begin;
        let Some(offset) = self.local_variable_offset(index) else {
            self.occur(ExceptionCode::LocalVarOutOfRange);
            return;
        };

        let tag = self
            .stack
            .type_at(offset)
            .expect("local variables stay typed");
        let pointer = if tag == TypeCode::ARRAY {
            let (element, count) = object::read_array_header(self.stack.as_bytes(), offset);
            RawPointer {
                type_code: element,
                count,
                addr: MemAddr::stack(offset - ARRAY_HEADER_SIZE),
            }
        } else {
            RawPointer {
                type_code: tag,
                count: 0,
                addr: MemAddr::stack(offset),
            }
        };
        self.push_pointer(pointer);
    }

    /// Push a fat pointer, recording overflow as an exception.
    pub(super) fn push_pointer(&mut self, pointer: RawPointer) {
        if !self.stack.expand(POINTER_SIZE) {
            self.occur(ExceptionCode::StackOverflow);
            return;
        }
        let used = self.stack.used();
        object::write_pointer(self.stack.as_bytes_mut(), used, pointer);
    }

    pub(super) fn interpret_copy(&mut self) {
        if self.is_local_variable(0) {
            self.occur(ExceptionCode::StackEmpty);
            return;
        }
        let Some(tag) = self.stack.top_type() else {
            self.occur(ExceptionCode::StackEmpty);
            return;
        };
        if !tag.is_value() {
            self.occur(ExceptionCode::StackEmpty);
            return;
        }
        let used = self.stack.used();
        let Some(size) = self.slot_size_at(used) else {
            self.occur(ExceptionCode::StackEmpty);
            return;
        };
        if !self.stack.expand(size) {
            self.occur(ExceptionCode::StackOverflow);
            return;
        }
        let new_used = self.stack.used();
        self.stack
            .as_bytes_mut()
            .copy_within(used - size..used, new_used - size);
    }

    pub(super) fn interpret_swap(&mut self) {
        let Some(first) = self.stack.top_type() else {
            self.occur(ExceptionCode::StackEmpty);
            return;
        };
        if !first.is_value() {
            self.occur(ExceptionCode::StackEmpty);
            return;
        }
        let used = self.stack.used();
        let Some(size) = self.slot_size_at(used) else {
            self.occur(ExceptionCode::StackEmpty);
            return;
        };

        if self.is_local_variable(0) || self.is_local_variable(size) {
            self.occur(ExceptionCode::StackEmpty);
            return;
        }
        let Some(second) = self.stack.type_at(used - size) else {
            self.occur(ExceptionCode::StackEmpty);
            return;
        };
        if first != second {
            self.occur(ExceptionCode::StackDifferentType);
            return;
        }

        if first == TypeCode::ARRAY {
            let (elem_a, count_a) = object::read_array_header(self.stack.as_bytes(), used);
            let (elem_b, count_b) = object::read_array_header(self.stack.as_bytes(), used - size);
            if elem_a != elem_b {
                self.occur(ExceptionCode::StackDifferentType);
                return;
            }
            if count_a != count_b {
                self.occur(ExceptionCode::ArrayCountDifferentCount);
                return;
            }
        }

        let bytes = self.stack.as_bytes_mut();
        let (below, top) = bytes[used - 2 * size..used].split_at_mut(size);
        below.swap_with_slice(top);
    }

    /// Decode the operands of `anew`/`agcnew`/`apush`: element type from
    /// the operand (bit 31 set), count from the stack top.
    pub(super) fn array_info(&mut self, operand: u32) -> Option<ArrayInfo> {
        if self.is_local_variable(0) {
            self.occur(ExceptionCode::StackEmpty);
            return None;
        }
        if operand >> 31 == 0 {
            self.occur(ExceptionCode::TypeOutOfRange);
            return None;
        }

        let local = TypeCode(operand & 0x7FFF_FFFF);
        let Some(element) = self.program.resolve_type(self.frame.module, local) else {
            self.occur(ExceptionCode::TypeOutOfRange);
            return None;
        };
        if !element.is_value() || matches!(element.kind(), TypeKind::Array) {
            self.occur(ExceptionCode::TypeOutOfRange);
            return None;
        }
        let Some(element_size) = self.program.type_size(element) else {
            self.occur(ExceptionCode::TypeOutOfRange);
            return None;
        };

        let used = self.stack.used();
        let count = match self.stack.top_type().map(TypeCode::kind) {
            Some(TypeKind::Int) => {
                u64::from(object::read_payload_word(self.stack.as_bytes(), used) as u32)
            }
            Some(TypeKind::Long) => object::read_payload_word(self.stack.as_bytes(), used),
            Some(_) => {
                self.occur(ExceptionCode::StackDifferentType);
                return None;
            }
            None => {
                self.occur(ExceptionCode::StackEmpty);
                return None;
            }
        };
        if count == 0 {
            self.occur(ExceptionCode::ArrayCountCannotBeZero);
            return None;
        }

        let count_size = self
            .slot_size_at(used)
            .expect("count slot was just inspected");
        Some(ArrayInfo {
            element,
            count,
            count_size,
            total_size: ARRAY_HEADER_SIZE + count as usize * element_size,
        })
    }

    pub(super) fn interpret_apush(&mut self, operand: u32) {
        let Some(info) = self.array_info(operand) else {
            return;
        };

        if self.stack.free() + info.count_size < info.total_size {
            self.occur(ExceptionCode::StackOverflow);
            return;
        }
        self.stack.reduce(info.count_size);
        assert!(self.stack.expand(info.total_size), "free space was checked");

        let used = self.stack.used();
        let Self { stack, program, .. } = self;
        object::init_array(stack.as_bytes_mut(), used, program, info.element, info.count);
    }
}
