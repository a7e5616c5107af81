// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Arithmetic, bitwise and comparison opcodes.
//!
//! Binary operators require both operands to share one fundamental type.
//! Unsigned bit-pattern semantics by default; the signed variants
//! sign-extend the stored bits first. Integer wrap-around follows
//! two's-complement wrapping; division and remainder by zero raise
//! `ArithDivideByZero` for floats as well.
//!
//! Bitwise operators work on the raw bit patterns: `int` and `single`
//! share the 32-bit lane, `long` and `double` the 64-bit lane.

use num_traits::{CheckedDiv, CheckedRem, PrimInt, WrappingAdd, WrappingMul, WrappingSub};

use thorn_bytefile::types::{TypeCode, TypeKind};

use crate::exception::ExceptionCode;
use crate::mem::MemAddr;
use crate::object;

use super::Interpreter;

/// Binary arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ArithOp {
    Add,
    Sub,
    Mul,
    IMul,
    Div,
    IDiv,
    Mod,
    IMod,
}

/// Binary bitwise operators (`shl` and `sal` are one left shift).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum BitOp {
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Sar,
}

/// Integer lane of a binary arithmetic operator; wrapping semantics,
/// division and remainder checked for zero.
fn int_arith<T>(op: ArithOp, lhs: T, rhs: T) -> Result<T, ExceptionCode>
where
    T: PrimInt + WrappingAdd + WrappingSub + WrappingMul + CheckedDiv + CheckedRem,
{
    match op {
        ArithOp::Add => Ok(lhs.wrapping_add(&rhs)),
        ArithOp::Sub => Ok(lhs.wrapping_sub(&rhs)),
        ArithOp::Mul | ArithOp::IMul => Ok(lhs.wrapping_mul(&rhs)),
        ArithOp::Div | ArithOp::IDiv => {
            if rhs.is_zero() {
                return Err(ExceptionCode::ArithDivideByZero);
            }
            // MIN / -1 wraps back to MIN.
            Ok(lhs.checked_div(&rhs).unwrap_or_else(T::min_value))
        }
        ArithOp::Mod | ArithOp::IMod => {
            if rhs.is_zero() {
                return Err(ExceptionCode::ArithDivideByZero);
            }
            Ok(lhs.checked_rem(&rhs).unwrap_or_else(T::zero))
        }
    }
}

/// Float lane; `mod` is the IEEE remainder, zero divisors still raise.
fn float_arith(op: ArithOp, lhs: f64, rhs: f64) -> Result<f64, ExceptionCode> {
    match op {
        ArithOp::Add => Ok(lhs + rhs),
        ArithOp::Sub => Ok(lhs - rhs),
        ArithOp::Mul | ArithOp::IMul => Ok(lhs * rhs),
        ArithOp::Div | ArithOp::IDiv => {
            if rhs == 0.0 {
                return Err(ExceptionCode::ArithDivideByZero);
            }
            Ok(lhs / rhs)
        }
        ArithOp::Mod | ArithOp::IMod => {
            if rhs == 0.0 {
                return Err(ExceptionCode::ArithDivideByZero);
            }
            Ok(lhs % rhs)
        }
    }
}

/// Three-way comparison pushed as an int: 1 / 0 / -1 (as u32) for
/// greater / equal / less; NaN compares as less.
fn order<T: PartialOrd>(lhs: T, rhs: T) -> u32 {
    if lhs > rhs {
        1
    } else if lhs == rhs {
        0
    } else {
        u32::MAX
    }
}

impl Interpreter {
    /// Pop two same-typed fundamentals and leave the result in the lower
    /// slot. Returns the operand payloads and the result slot address.
    fn binary_operands(&mut self) -> Option<(TypeCode, u64, u64, usize)> {
        let Some(rhs_tag) = self.stack.top_type() else {
            self.occur(ExceptionCode::StackEmpty);
            return None;
        };

        match rhs_tag.kind() {
            TypeKind::Int | TypeKind::Long | TypeKind::Single | TypeKind::Double => {}
            TypeKind::Pointer | TypeKind::GcPointer => {
                self.occur(ExceptionCode::PointerInvalidForPointer);
                return None;
            }
            TypeKind::Structure(_) => {
                self.occur(ExceptionCode::StructureInvalidForStructure);
                return None;
            }
            TypeKind::Array => {
                self.occur(ExceptionCode::ArrayInvalidForArray);
                return None;
            }
            TypeKind::None => {
                self.occur(ExceptionCode::StackEmpty);
                return None;
            }
        }

        let size = rhs_tag
            .fundamental_size()
            .expect("numeric types have fixed sizes");
        if self.is_local_variable(0) || self.is_local_variable(size) {
            self.occur(ExceptionCode::StackEmpty);
            return None;
        }

        let used = self.stack.used();
        let Some(lhs_tag) = self.stack.type_at(used - size) else {
            self.occur(ExceptionCode::StackEmpty);
            return None;
        };
        if lhs_tag != rhs_tag {
            self.occur(ExceptionCode::StackDifferentType);
            return None;
        }

        let bytes = self.stack.as_bytes();
        let rhs = object::read_payload_word(bytes, used);
        let lhs = object::read_payload_word(bytes, used - size);
        self.stack.reduce(size);
        Some((rhs_tag, lhs, rhs, used - size))
    }

    pub(super) fn interpret_arith(&mut self, op: ArithOp) {
        let Some((tag, lhs, rhs, slot)) = self.binary_operands() else {
            return;
        };

        let result = match (tag.kind(), op) {
            (TypeKind::Int, ArithOp::IMul | ArithOp::IDiv | ArithOp::IMod) => {
                int_arith(op, lhs as u32 as i32, rhs as u32 as i32).map(|v| v as u32 as u64)
            }
            (TypeKind::Int, _) => int_arith(op, lhs as u32, rhs as u32).map(u64::from),
            (TypeKind::Long, ArithOp::IMul | ArithOp::IDiv | ArithOp::IMod) => {
                int_arith(op, lhs as i64, rhs as i64).map(|v| v as u64)
            }
            (TypeKind::Long, _) => int_arith(op, lhs, rhs),
            (TypeKind::Single, _) => float_arith(
                op,
                f64::from(f32::from_bits(lhs as u32)),
                f64::from(f32::from_bits(rhs as u32)),
            )
            .map(|v| u64::from((v as f32).to_bits())),
            (TypeKind::Double, _) => {
                float_arith(op, f64::from_bits(lhs), f64::from_bits(rhs)).map(f64::to_bits)
            }
            _ => unreachable!("binary_operands filters non-numeric tags"),
        };

        match result {
            Ok(bits) => object::write_payload_word(self.stack.as_bytes_mut(), slot, bits),
            Err(code) => {
                // Undo the pop so a failed division leaves the stack as
                // it was.
                let size = tag.fundamental_size().expect("numeric size");
                assert!(self.stack.expand(size), "operand bytes are still there");
                self.occur(code);
            }
        }
    }

    pub(super) fn interpret_bitwise(&mut self, op: BitOp) {
        let Some((tag, lhs, rhs, slot)) = self.binary_operands() else {
            return;
        };

        let wide = matches!(tag.kind(), TypeKind::Long | TypeKind::Double);
        let bits = if wide {
            match op {
                BitOp::And => lhs & rhs,
                BitOp::Or => lhs | rhs,
                BitOp::Xor => lhs ^ rhs,
                BitOp::Shl => lhs.wrapping_shl(rhs as u32),
                BitOp::Shr => lhs.wrapping_shr(rhs as u32),
                BitOp::Sar => ((lhs as i64).wrapping_shr(rhs as u32)) as u64,
            }
        } else {
            let (a, b) = (lhs as u32, rhs as u32);
            u64::from(match op {
                BitOp::And => a & b,
                BitOp::Or => a | b,
                BitOp::Xor => a ^ b,
                BitOp::Shl => a.wrapping_shl(b),
                BitOp::Shr => a.wrapping_shr(b),
                BitOp::Sar => ((a as i32).wrapping_shr(b)) as u32,
            })
        };

        object::write_payload_word(self.stack.as_bytes_mut(), slot, bits);
    }

    pub(super) fn interpret_neg(&mut self) {
        if self.is_local_variable(0) {
            self.occur(ExceptionCode::StackEmpty);
            return;
        }
        let Some(tag) = self.stack.top_type() else {
            self.occur(ExceptionCode::StackEmpty);
            return;
        };

        let used = self.stack.used();
        let bits = object::read_payload_word(self.stack.as_bytes(), used);
        let negated = match tag.kind() {
            TypeKind::Int => u64::from((bits as u32).wrapping_neg()),
            TypeKind::Long => bits.wrapping_neg(),
            TypeKind::Single => u64::from((-f32::from_bits(bits as u32)).to_bits()),
            TypeKind::Double => (-f64::from_bits(bits)).to_bits(),
            TypeKind::Pointer | TypeKind::GcPointer => {
                self.occur(ExceptionCode::PointerInvalidForPointer);
                return;
            }
            TypeKind::Structure(_) => {
                self.occur(ExceptionCode::StructureInvalidForStructure);
                return;
            }
            TypeKind::Array => {
                self.occur(ExceptionCode::ArrayInvalidForArray);
                return;
            }
            TypeKind::None => {
                self.occur(ExceptionCode::StackEmpty);
                return;
            }
        };
        object::write_payload_word(self.stack.as_bytes_mut(), used, negated);
    }

    pub(super) fn interpret_not(&mut self) {
        if self.is_local_variable(0) {
            self.occur(ExceptionCode::StackEmpty);
            return;
        }
        let Some(tag) = self.stack.top_type() else {
            self.occur(ExceptionCode::StackEmpty);
            return;
        };

        let used = self.stack.used();
        let bits = object::read_payload_word(self.stack.as_bytes(), used);
        let flipped = match tag.kind() {
            TypeKind::Int | TypeKind::Single => u64::from(!(bits as u32)),
            TypeKind::Long | TypeKind::Double => !bits,
            TypeKind::Pointer | TypeKind::GcPointer => {
                self.occur(ExceptionCode::PointerInvalidForPointer);
                return;
            }
            TypeKind::Structure(_) => {
                self.occur(ExceptionCode::StructureInvalidForStructure);
                return;
            }
            TypeKind::Array => {
                self.occur(ExceptionCode::ArrayInvalidForArray);
                return;
            }
            TypeKind::None => {
                self.occur(ExceptionCode::StackEmpty);
                return;
            }
        };
        object::write_payload_word(self.stack.as_bytes_mut(), used, flipped);
    }

    pub(super) fn interpret_cmp(&mut self, signed: bool) {
        let Some(rhs_tag) = self.stack.top_type() else {
            self.occur(ExceptionCode::StackEmpty);
            return;
        };

        let size = match rhs_tag.kind() {
            TypeKind::Int | TypeKind::Long | TypeKind::Single | TypeKind::Double
            | TypeKind::Pointer | TypeKind::GcPointer => rhs_tag
                .fundamental_size()
                .expect("comparable types have fixed sizes"),
            TypeKind::Structure(_) => {
                self.occur(ExceptionCode::StructureInvalidForStructure);
                return;
            }
            TypeKind::Array => {
                self.occur(ExceptionCode::ArrayInvalidForArray);
                return;
            }
            TypeKind::None => {
                self.occur(ExceptionCode::StackEmpty);
                return;
            }
        };

        if self.is_local_variable(0) || self.is_local_variable(size) {
            self.occur(ExceptionCode::StackEmpty);
            return;
        }
        let used = self.stack.used();
        let Some(lhs_tag) = self.stack.type_at(used - size) else {
            self.occur(ExceptionCode::StackEmpty);
            return;
        };
        if lhs_tag != rhs_tag {
            self.occur(ExceptionCode::StackDifferentType);
            return;
        }

        let bytes = self.stack.as_bytes();
        let (lhs, rhs) = match rhs_tag.kind() {
            TypeKind::Pointer => (
                object::read_pointer(bytes, used - size).addr.to_bits(),
                object::read_pointer(bytes, used).addr.to_bits(),
            ),
            TypeKind::GcPointer => (
                object::read_gc_pointer(bytes, used - size).to_bits(),
                object::read_gc_pointer(bytes, used).to_bits(),
            ),
            _ => (
                object::read_payload_word(bytes, used - size),
                object::read_payload_word(bytes, used),
            ),
        };

        let ordering = match rhs_tag.kind() {
            TypeKind::Int if signed => order(lhs as u32 as i32, rhs as u32 as i32),
            TypeKind::Int => order(lhs as u32, rhs as u32),
            TypeKind::Long if signed => order(lhs as i64, rhs as i64),
            TypeKind::Long => order(lhs, rhs),
            TypeKind::Single => order(f32::from_bits(lhs as u32), f32::from_bits(rhs as u32)),
            TypeKind::Double => order(f64::from_bits(lhs), f64::from_bits(rhs)),
            // Pointers compare by address regardless of signedness.
            _ => order(lhs, rhs),
        };

        self.stack.reduce(2 * size);
        self.push_value(crate::object::Value::Int(ordering));
    }

    pub(super) fn interpret_inc_dec(&mut self, delta: i32) {
        if self.is_local_variable(0) {
            self.occur(ExceptionCode::StackEmpty);
            return;
        }
        let Some(tag) = self.stack.top_type() else {
            self.occur(ExceptionCode::StackEmpty);
            return;
        };
        if !matches!(tag.kind(), TypeKind::Pointer | TypeKind::GcPointer) {
            self.occur(ExceptionCode::PointerNotPointer);
            return;
        }

        let used = self.stack.used();
        let (target, count): (MemAddr, u64) = if tag == TypeCode::POINTER {
            let pointer = object::read_pointer(self.stack.as_bytes(), used);
            (pointer.addr, pointer.count)
        } else {
            let gc_target = object::read_gc_pointer(self.stack.as_bytes(), used);
            if gc_target.is_null() {
                self.occur(ExceptionCode::PointerNullPointer);
                return;
            }
            let Some((tag_end, _)) = self.gc_object(gc_target) else {
                self.occur(ExceptionCode::PointerUnknownAddress);
                return;
            };
            (tag_end, 0)
        };

        if target.is_null() {
            self.occur(ExceptionCode::PointerNullPointer);
            return;
        }
        if count != 0 {
            self.occur(ExceptionCode::ArrayInvalidForArray);
            return;
        }

        let Some(pointee_tag) = self.mem_read_tag(target) else {
            self.occur(ExceptionCode::PointerUnknownAddress);
            return;
        };
        let Some(bits) = self.mem_read_payload(target) else {
            self.occur(ExceptionCode::PointerUnknownAddress);
            return;
        };
        let updated = match pointee_tag.kind() {
            TypeKind::Int => u64::from((bits as u32).wrapping_add_signed(delta)),
            TypeKind::Long => bits.wrapping_add_signed(i64::from(delta)),
            TypeKind::Single => {
                u64::from((f32::from_bits(bits as u32) + delta as f32).to_bits())
            }
            TypeKind::Double => (f64::from_bits(bits) + f64::from(delta)).to_bits(),
            TypeKind::Pointer | TypeKind::GcPointer => {
                self.occur(ExceptionCode::PointerInvalidForPointer);
                return;
            }
            TypeKind::Structure(_) => {
                self.occur(ExceptionCode::StructureInvalidForStructure);
                return;
            }
            TypeKind::Array => {
                self.occur(ExceptionCode::ArrayInvalidForArray);
                return;
            }
            TypeKind::None => {
                self.occur(ExceptionCode::StackEmpty);
                return;
            }
        };
        self.mem_write_payload(target, updated);

        let size = self
            .slot_size_at(used)
            .expect("pointer slots have fixed sizes");
        self.stack.reduce(size);
    }
}
