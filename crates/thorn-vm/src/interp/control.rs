// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Control flow: jumps, call and return.
//!
//! Jump operands index the current frame's label table; labels hold
//! absolute instruction indices assigned at parse time. A conditional
//! jump pops the tested value only when the branch is taken.
//!
//! `call` pushes the current frame as a typed record, installs the
//! callee's frame and registers the parameter slots as locals in
//! parameter order (local 0 is the deepest argument). Virtual functions
//! run immediately and return through the regular `ret` path.

use std::rc::Rc;

use thorn_bytefile::types::{FRAME_SIZE, TypeKind};

use crate::exception::ExceptionCode;
use crate::host::VirtualContext;
use crate::object;
use crate::program::FunctionBody;

use super::{FrameFunction, Interpreter, StackFrame};

/// Conditions tested against the compare-result convention
/// (1 = greater, 0 = equal, -1 = less).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum JumpCond {
    Eq0,
    Ne0,
    Eq1,
    Ne1,
    EqM1,
    NeM1,
}

impl JumpCond {
    /// Evaluate against a value normalized to 64 bits with its lane's
    /// encodings of 1 and -1.
    fn test(self, bits: u64, one: u64, minus_one: u64) -> bool {
        match self {
            Self::Eq0 => bits == 0,
            Self::Ne0 => bits != 0,
            Self::Eq1 => bits == one,
            Self::Ne1 => bits != one,
            Self::EqM1 => bits == minus_one,
            Self::NeM1 => bits != minus_one,
        }
    }
}

impl Interpreter {
    fn label_target(&mut self, operand: u32) -> Option<u64> {
        let target = self
            .current_instructions()
            .and_then(|stream| stream.label(operand));
        if target.is_none() {
            self.occur(ExceptionCode::LabelOutOfRange);
        }
        target
    }

    pub(super) fn interpret_jmp(&mut self, operand: u32) {
        let Some(target) = self.label_target(operand) else {
            return;
        };
        // The dispatch loop increments after every instruction.
        self.instruction_index = target.wrapping_sub(1);
    }

    pub(super) fn interpret_jcc(&mut self, operand: u32, cond: JumpCond) {
        if self.is_local_variable(0) {
            self.occur(ExceptionCode::StackEmpty);
            return;
        }
        let Some(target) = self.label_target(operand) else {
            return;
        };
        let Some(tag) = self.stack.top_type() else {
            self.occur(ExceptionCode::StackEmpty);
            return;
        };

        let used = self.stack.used();
        let bytes = self.stack.as_bytes();
        let taken = match tag.kind() {
            TypeKind::Int => {
                let bits = u64::from(object::read_payload_word(bytes, used) as u32);
                cond.test(bits, 1, u64::from(u32::MAX))
            }
            TypeKind::Long => {
                let bits = object::read_payload_word(bytes, used);
                cond.test(bits, 1, u64::MAX)
            }
            TypeKind::Single => {
                let value = f32::from_bits(object::read_payload_word(bytes, used) as u32);
                match cond {
                    JumpCond::Eq0 => value == 0.0,
                    JumpCond::Ne0 => value != 0.0,
                    JumpCond::Eq1 => value == 1.0,
                    JumpCond::Ne1 => value != 1.0,
                    JumpCond::EqM1 => value == -1.0,
                    JumpCond::NeM1 => value != -1.0,
                }
            }
            TypeKind::Double => {
                let value = f64::from_bits(object::read_payload_word(bytes, used));
                match cond {
                    JumpCond::Eq0 => value == 0.0,
                    JumpCond::Ne0 => value != 0.0,
                    JumpCond::Eq1 => value == 1.0,
                    JumpCond::Ne1 => value != 1.0,
                    JumpCond::EqM1 => value == -1.0,
                    JumpCond::NeM1 => value != -1.0,
                }
            }
            TypeKind::Pointer => {
                let bits = object::read_pointer(bytes, used).addr.to_bits();
                cond.test(bits, 1, u64::MAX)
            }
            TypeKind::GcPointer => {
                let bits = object::read_gc_pointer(bytes, used).to_bits();
                cond.test(bits, 1, u64::MAX)
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

        if taken {
            let size = self
                .slot_size_at(used)
                .expect("tested slot was just inspected");
            self.stack.reduce(size);
            self.instruction_index = target.wrapping_sub(1);
        }
    }

    pub(super) fn interpret_call(&mut self, operand: u32) {
        let Some(global) = self.program.resolve_function(self.frame.module, operand) else {
            self.occur(ExceptionCode::FunctionOutOfRange);
            return;
        };
        let Some(declaration) = self.program.function(global) else {
            self.occur(ExceptionCode::FunctionOutOfRange);
            return;
        };
        let arity = declaration.arity;
        let callee_module = declaration.module;
        let (function, callable) = match &declaration.body {
            FunctionBody::Bytecode(_) => (FrameFunction::Bytecode(global), None),
            FunctionBody::Virtual(callable) => {
                (FrameFunction::Virtual(global), Some(Rc::clone(callable)))
            }
        };

        // Save the caller as a typed record on the evaluation stack.
        let mut record = self.frame;
        record.caller = self.instruction_index;
        if !self.stack.expand(FRAME_SIZE) {
            self.occur(ExceptionCode::StackOverflow);
            return;
        }
        let used = self.stack.used();
        object::write_frame(self.stack.as_bytes_mut(), used, &record.to_record());

        let stack_begin = self.stack.used();

        // Walk down from beneath the record, registering one typed slot
        // per parameter. A short stack rolls the frame back.
        let mut offsets = Vec::with_capacity(arity as usize);
        let mut offset = stack_begin - FRAME_SIZE;
        for _ in 0..arity {
            let valid = self
                .stack
                .type_at(offset)
                .is_some_and(thorn_bytefile::types::TypeCode::is_value);
            if !valid {
                self.stack.reduce(FRAME_SIZE);
                self.occur(ExceptionCode::StackEmpty);
                return;
            }
            offsets.push(offset);
            let size = self.slot_size_at(offset).filter(|&size| size <= offset);
            let Some(size) = size else {
                self.stack.reduce(FRAME_SIZE);
                self.occur(ExceptionCode::StackEmpty);
                return;
            };
            offset -= size;
        }
        // Parameter order: local 0 is the first (deepest) argument.
        offsets.reverse();
        self.local_variables.extend(offsets);

        self.frame = StackFrame {
            caller: u64::MAX,
            stack_begin,
            variable_begin: self.local_variables.len() - arity as usize,
            function,
            module: callee_module,
        };
        self.depth += 1;

        match callable {
            None => {
                // Enter the callee at instruction 0 on the next step.
                self.instruction_index = u64::MAX;
            }
            Some(callable) => {
                let mut context = VirtualContext::new(self);
                if let Err(code) = callable.invoke(&mut context) {
                    self.occur(code);
                    return;
                }
                self.interpret_ret();
            }
        }
    }

    pub(super) fn interpret_ret(&mut self) {
        if self.depth == 0 {
            // Return from the program: step past the entry stream's end.
            let count = self
                .current_instructions()
                .map_or(0, thorn_bytefile::instruction::Instructions::instruction_count);
            self.instruction_index = count.wrapping_sub(1);
            return;
        }

        let (arity, has_result) = match self.frame.function {
            FrameFunction::Bytecode(index) | FrameFunction::Virtual(index) => {
                let declaration = self
                    .program
                    .function(index)
                    .expect("active frame names a function");
                (declaration.arity, declaration.has_result)
            }
            FrameFunction::Entry => (0, false),
        };

        let mut result: Option<Vec<u8>> = None;
        if has_result {
            if self.is_local_variable(0) {
                self.occur(ExceptionCode::StackEmpty);
                return;
            }
            let valid = self
                .stack
                .top_type()
                .is_some_and(thorn_bytefile::types::TypeCode::is_value);
            if !valid {
                self.occur(ExceptionCode::StackEmpty);
                return;
            }
            let used = self.stack.used();
            let size = self
                .slot_size_at(used)
                .expect("result slot was just inspected");
            result = Some(self.stack.as_bytes()[used - size..used].to_vec());
            self.stack.reduce(size);
        }

        // Drop this frame's locals, cut the stack back to the record,
        // restore the caller and pop the argument values.
        self.local_variables.truncate(self.frame.variable_begin);
        self.stack.set_used(self.frame.stack_begin);

        let record = object::read_frame(self.stack.as_bytes(), self.frame.stack_begin);
        self.stack.reduce(FRAME_SIZE);

        for _ in 0..arity {
            let used = self.stack.used();
            let Some(size) = self.slot_size_at(used).filter(|&size| size <= used) else {
                self.occur(ExceptionCode::StackEmpty);
                return;
            };
            self.stack.reduce(size);
        }

        self.depth -= 1;
        self.instruction_index = record.caller;
        self.frame = StackFrame::from_record(record);

        if let Some(bytes) = result {
            if !self.stack.expand(bytes.len()) {
                self.occur(ExceptionCode::StackOverflow);
                return;
            }
            let used = self.stack.used();
            self.stack.as_bytes_mut()[used - bytes.len()..used].copy_from_slice(&bytes);
        }
    }
}
