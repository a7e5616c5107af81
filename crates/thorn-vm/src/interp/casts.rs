// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Cast opcodes: numeric conversions and pointer reinterpretation.
//!
//! `int` is unsigned in conversions (its bits zero-extend and convert as
//! an unsigned quantity), matching the stored bit-pattern semantics of
//! the arithmetic opcodes. Pointer sources convert their address bits.
//! `top` reinterprets a numeric value (or another pointer) as a pointer
//! to the operand type; with bit 31 set it additionally consumes a count
//! beneath the top and produces an array view.

use thorn_bytefile::types::{POINTER_SIZE, TypeCode, TypeKind};

use crate::exception::ExceptionCode;
use crate::mem::MemAddr;
use crate::object::{self, RawPointer, Value};

use super::Interpreter;

impl Interpreter {
    /// The top value's bits widened to u64 for conversion, if the top is
    /// numeric or a plain pointer. Records the exception otherwise.
    fn cast_source(&mut self) -> Option<(TypeCode, u64)> {
        if self.is_local_variable(0) {
            self.occur(ExceptionCode::StackEmpty);
            return None;
        }
        let Some(tag) = self.stack.top_type() else {
            self.occur(ExceptionCode::StackEmpty);
            return None;
        };

        let used = self.stack.used();
        match tag.kind() {
            TypeKind::Int | TypeKind::Long | TypeKind::Single | TypeKind::Double => {
                Some((tag, object::read_payload_word(self.stack.as_bytes(), used)))
            }
            TypeKind::Pointer => Some((
                tag,
                object::read_pointer(self.stack.as_bytes(), used).addr.to_bits(),
            )),
            TypeKind::GcPointer => {
                self.occur(ExceptionCode::PointerInvalidForPointer);
                None
            }
            TypeKind::Structure(_) => {
                self.occur(ExceptionCode::StructureInvalidForStructure);
                None
            }
            TypeKind::Array => {
                self.occur(ExceptionCode::ArrayInvalidForArray);
                None
            }
            TypeKind::None => {
                self.occur(ExceptionCode::StackEmpty);
                None
            }
        }
    }

    /// Numeric view of stored bits per source type; pointers convert
    /// through their address bits.
    fn numeric_value(tag: TypeCode, bits: u64) -> Value {
        match tag.kind() {
            TypeKind::Int => Value::Int(bits as u32),
            TypeKind::Single => Value::Single(f32::from_bits(bits as u32)),
            TypeKind::Double => Value::Double(f64::from_bits(bits)),
            _ => Value::Long(bits),
        }
    }

    pub(super) fn interpret_cast(&mut self, target: TypeCode) {
        let Some((tag, bits)) = self.cast_source() else {
            return;
        };
        if tag == target {
            return;
        }

        let source = Self::numeric_value(tag, bits);
        let converted = match (source, target.kind()) {
            (Value::Int(v), TypeKind::Long) => Value::Long(u64::from(v)),
            (Value::Int(v), TypeKind::Single) => Value::Single(v as f32),
            (Value::Int(v), TypeKind::Double) => Value::Double(f64::from(v)),
            (Value::Long(v), TypeKind::Int) => Value::Int(v as u32),
            (Value::Long(v), TypeKind::Single) => Value::Single(v as f32),
            (Value::Long(v), TypeKind::Double) => Value::Double(v as f64),
            (Value::Single(v), TypeKind::Int) => Value::Int(v as u32),
            (Value::Single(v), TypeKind::Long) => Value::Long(v as u64),
            (Value::Single(v), TypeKind::Double) => Value::Double(f64::from(v)),
            (Value::Double(v), TypeKind::Int) => Value::Int(v as u32),
            (Value::Double(v), TypeKind::Long) => Value::Long(v as u64),
            (Value::Double(v), TypeKind::Single) => Value::Single(v as f32),
            (value, _) => value,
        };

        let source_size = self
            .slot_size_at(self.stack.used())
            .expect("cast source was just inspected");
        self.stack.reduce(source_size);
        self.push_value(converted);
    }

    pub(super) fn interpret_top(&mut self, operand: u32) {
        let Some((_, bits)) = self.cast_source() else {
            return;
        };

        let local = TypeCode(operand & 0x7FFF_FFFF);
        let Some(target_type) = self.program.resolve_type(self.frame.module, local) else {
            self.occur(ExceptionCode::TypeOutOfRange);
            return;
        };
        if !target_type.is_value() || matches!(target_type.kind(), TypeKind::Array) {
            self.occur(ExceptionCode::TypeOutOfRange);
            return;
        }

        let used = self.stack.used();
        let source_size = self
            .slot_size_at(used)
            .expect("cast source was just inspected");

        // Bit 31 requests an array view: the count sits beneath the value
        // being reinterpreted.
        let mut count = 0u64;
        let mut count_size = 0usize;
        if operand >> 31 != 0 {
            if self.is_local_variable(source_size) {
                self.occur(ExceptionCode::StackEmpty);
                return;
            }
            let Some(count_tag) = self.stack.type_at(used - source_size) else {
                self.occur(ExceptionCode::StackEmpty);
                return;
            };
            count = match count_tag.kind() {
                TypeKind::Int => u64::from(
                    object::read_payload_word(self.stack.as_bytes(), used - source_size) as u32,
                ),
                TypeKind::Long => {
                    object::read_payload_word(self.stack.as_bytes(), used - source_size)
                }
                _ => {
                    self.occur(ExceptionCode::StackDifferentType);
                    return;
                }
            };
            count_size = count_tag
                .fundamental_size()
                .expect("count slot is int or long");
        }

        let removed = source_size + count_size;
        if self.stack.free() + removed < POINTER_SIZE {
            self.occur(ExceptionCode::StackOverflow);
            return;
        }

        // A reinterpreted integer rarely forms a live address; a later
        // dereference fails with an address error rather than here.
        let addr = MemAddr::from_bits(bits);

        self.stack.reduce(removed);
        self.push_pointer(RawPointer {
            type_code: target_type,
            count,
            addr,
        });
    }
}
