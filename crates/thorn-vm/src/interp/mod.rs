// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The interpreter core.
//!
//! A single-threaded loop over the active frame's instruction stream.
//! All state lives in the [`Interpreter`]: program, evaluation stack,
//! heaps, active frame, local-variable table and the pending exception.
//!
//! Opcode semantics are split across submodules the way they group in
//! the instruction set: stack traffic, arithmetic, control flow, heap
//! access and casts.

mod arith;
mod casts;
mod control;
mod memory_ops;
mod stack_ops;

#[cfg(test)]
mod interp_test;

use thorn_bytefile::instruction::{Instruction, Instructions};
use thorn_bytefile::opcode::OpCode;
use thorn_bytefile::types::{FRAME_SIZE, TAG_SIZE, TypeCode, TypeKind};

use crate::exception::{Exception, ExceptionCode, ExceptionFunction};
use crate::gc::{Collector, HEADER_SIZE};
use crate::heap::Heap;
use crate::mem::{MemAddr, Region};
use crate::object::{self, FrameRecord, RawPointer, Value};
use crate::program::{FunctionBody, Program};
use crate::stack::Stack;

/// Default evaluation-stack capacity (1 MiB).
pub const DEFAULT_STACK_SIZE: usize = 1024 * 1024;

/// What the active frame is executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFunction {
    /// The entry-point stream of the frame's module.
    Entry,
    /// A bytecode function, by global index.
    Bytecode(u32),
    /// A virtual function, by global index.
    Virtual(u32),
}

impl FrameFunction {
    const KIND_ENTRY: u64 = 0;
    const KIND_BYTECODE: u64 = 1;
    const KIND_VIRTUAL: u64 = 2;

    fn encode(self) -> u64 {
        match self {
            Self::Entry => Self::KIND_ENTRY << 32,
            Self::Bytecode(index) => Self::KIND_BYTECODE << 32 | u64::from(index),
            Self::Virtual(index) => Self::KIND_VIRTUAL << 32 | u64::from(index),
        }
    }

    fn decode(word: u64) -> Self {
        let index = word as u32;
        match word >> 32 {
            Self::KIND_BYTECODE => Self::Bytecode(index),
            Self::KIND_VIRTUAL => Self::Virtual(index),
            _ => Self::Entry,
        }
    }
}

/// The active call-stack frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackFrame {
    /// Caller's instruction index; `u64::MAX` for the outermost frame.
    pub caller: u64,
    /// Evaluation-stack used size at call time.
    pub stack_begin: usize,
    /// Local-variable table length at call time.
    pub variable_begin: usize,
    /// What this frame executes.
    pub function: FrameFunction,
    /// Module owning the running code.
    pub module: u32,
}

impl StackFrame {
    fn to_record(self) -> FrameRecord {
        FrameRecord {
            caller: self.caller,
            stack_begin: self.stack_begin as u64,
            variable_begin: self.variable_begin as u64,
            function: self.function.encode(),
            module: u64::from(self.module),
        }
    }

    fn from_record(record: FrameRecord) -> Self {
        Self {
            caller: record.caller,
            stack_begin: record.stack_begin as usize,
            variable_begin: record.variable_begin as usize,
            function: FrameFunction::decode(record.function),
            module: record.module as u32,
        }
    }
}

/// The virtual machine.
#[derive(Debug)]
pub struct Interpreter {
    program: Program,
    stack: Stack,
    heap: Heap,
    frame: StackFrame,
    depth: usize,
    instruction_index: u64,
    local_variables: Vec<usize>,
    exception: Option<Exception>,
}

impl Interpreter {
    /// Create an interpreter over a linked program. The active frame
    /// starts in the entry module's entry-point stream; the stack still
    /// needs [`Self::allocate_stack`].
    #[must_use]
    pub fn new(program: Program) -> Self {
        let entry_module = program.entry_module();
        Self {
            program,
            stack: Stack::default(),
            heap: Heap::new(),
            frame: StackFrame {
                caller: u64::MAX,
                stack_begin: 0,
                variable_begin: 0,
                function: FrameFunction::Entry,
                module: entry_module,
            },
            depth: 0,
            instruction_index: 0,
            local_variables: Vec::new(),
            exception: None,
        }
    }

    /// Allocate the evaluation stack.
    pub fn allocate_stack(&mut self, size: usize) {
        self.stack.allocate(size);
    }

    /// Resize the evaluation stack, preserving its contents.
    pub fn reallocate_stack(&mut self, new_size: usize) -> Result<(), crate::stack::ReallocateError> {
        self.stack.reallocate(new_size)
    }

    /// Configure the generational managed heap.
    pub fn init_managed_heap(&mut self, young_size: usize, old_size: usize) {
        self.heap.set_collector(Collector::new(young_size, old_size));
    }

    /// The linked program.
    #[must_use]
    pub const fn program(&self) -> &Program {
        &self.program
    }

    /// The evaluation stack (read-only; tests and diagnostics).
    #[must_use]
    pub const fn stack(&self) -> &Stack {
        &self.stack
    }

    /// The heap.
    #[must_use]
    pub const fn heap(&self) -> &Heap {
        &self.heap
    }

    /// The pending exception, if interpretation halted.
    #[must_use]
    pub const fn exception(&self) -> Option<&Exception> {
        self.exception.as_ref()
    }

    /// The program's result slot: the top of the stack when it holds a
    /// fundamental value.
    #[must_use]
    pub fn result(&self) -> Option<Value> {
        object::read_value(self.stack.as_bytes(), self.stack.used())
    }

    /// The active call stack, innermost frame first.
    #[must_use]
    pub fn call_stack(&self) -> Vec<StackFrame> {
        let mut frames = Vec::with_capacity(self.depth + 1);
        frames.push(self.frame);

        let mut frame = self.frame;
        for _ in 0..self.depth {
            let record = object::read_frame(self.stack.as_bytes(), frame.stack_begin);
            frame = StackFrame::from_record(record);
            frames.push(frame);
        }
        frames
    }

    /// Execute until completion or exception. Returns `true` when the
    /// entry-point stream ran to its end.
    pub fn interpret(&mut self) -> bool {
        loop {
            let Some(instruction) = self.fetch() else {
                break;
            };
            self.step(instruction);
            if self.exception.is_some() {
                return false;
            }
            self.instruction_index = self.instruction_index.wrapping_add(1);
        }

        if self.depth != 0 {
            self.occur(ExceptionCode::FunctionNoRetInstruction);
            return false;
        }
        true
    }

    fn fetch(&self) -> Option<Instruction> {
        self.current_instructions()?
            .instruction(self.instruction_index)
            .copied()
    }

    fn step(&mut self, instruction: Instruction) {
        let operand = instruction.operand;
        match instruction.opcode {
            OpCode::Nop => {}

            OpCode::Push => self.interpret_push(operand),
            OpCode::Pop => self.interpret_pop(),
            OpCode::Load => self.interpret_load(operand),
            OpCode::Store => self.interpret_store(operand),
            OpCode::Lea => self.interpret_lea(operand),
            OpCode::FLea => self.interpret_flea(operand),
            OpCode::TLoad => self.interpret_tload(),
            OpCode::TStore => self.interpret_tstore(),
            OpCode::Copy => self.interpret_copy(),
            OpCode::Swap => self.interpret_swap(),
            OpCode::APush => self.interpret_apush(operand),
            OpCode::ANew => self.interpret_anew(operand),
            OpCode::AGcNew => self.interpret_agcnew(operand),
            OpCode::ALea => self.interpret_alea(),
            OpCode::Count => self.interpret_count(),
            OpCode::Null => self.interpret_null(),
            OpCode::New => self.interpret_new(operand),
            OpCode::Delete => self.interpret_delete(),
            OpCode::GcNull => self.interpret_gcnull(),
            OpCode::GcNew => self.interpret_gcnew(operand),

            OpCode::Add => self.interpret_arith(arith::ArithOp::Add),
            OpCode::Sub => self.interpret_arith(arith::ArithOp::Sub),
            OpCode::Mul => self.interpret_arith(arith::ArithOp::Mul),
            OpCode::IMul => self.interpret_arith(arith::ArithOp::IMul),
            OpCode::Div => self.interpret_arith(arith::ArithOp::Div),
            OpCode::IDiv => self.interpret_arith(arith::ArithOp::IDiv),
            OpCode::Mod => self.interpret_arith(arith::ArithOp::Mod),
            OpCode::IMod => self.interpret_arith(arith::ArithOp::IMod),
            OpCode::Neg => self.interpret_neg(),
            OpCode::Inc => self.interpret_inc_dec(1),
            OpCode::Dec => self.interpret_inc_dec(-1),

            OpCode::And => self.interpret_bitwise(arith::BitOp::And),
            OpCode::Or => self.interpret_bitwise(arith::BitOp::Or),
            OpCode::Xor => self.interpret_bitwise(arith::BitOp::Xor),
            OpCode::Not => self.interpret_not(),
            OpCode::Shl | OpCode::Sal => self.interpret_bitwise(arith::BitOp::Shl),
            OpCode::Shr => self.interpret_bitwise(arith::BitOp::Shr),
            OpCode::Sar => self.interpret_bitwise(arith::BitOp::Sar),

            OpCode::Cmp => self.interpret_cmp(false),
            OpCode::ICmp => self.interpret_cmp(true),

            OpCode::Jmp => self.interpret_jmp(operand),
            OpCode::Je => self.interpret_jcc(operand, control::JumpCond::Eq0),
            OpCode::Jne => self.interpret_jcc(operand, control::JumpCond::Ne0),
            OpCode::Ja => self.interpret_jcc(operand, control::JumpCond::Eq1),
            OpCode::Jae => self.interpret_jcc(operand, control::JumpCond::NeM1),
            OpCode::Jb => self.interpret_jcc(operand, control::JumpCond::EqM1),
            OpCode::Jbe => self.interpret_jcc(operand, control::JumpCond::Ne1),
            OpCode::Call => self.interpret_call(operand),
            OpCode::Ret => self.interpret_ret(),

            OpCode::ToI => self.interpret_cast(TypeCode::INT),
            OpCode::ToL => self.interpret_cast(TypeCode::LONG),
            OpCode::ToSi => self.interpret_cast(TypeCode::SINGLE),
            OpCode::ToD => self.interpret_cast(TypeCode::DOUBLE),
            OpCode::ToP => self.interpret_top(operand),
        }
    }

    // --- shared plumbing -------------------------------------------------

    pub(crate) fn current_instructions(&self) -> Option<&Instructions> {
        match self.frame.function {
            FrameFunction::Entry => self.program.entry_point(self.frame.module),
            FrameFunction::Bytecode(index) => match &self.program.function(index)?.body {
                FunctionBody::Bytecode(instructions) => Some(instructions),
                FunctionBody::Virtual(_) => None,
            },
            FrameFunction::Virtual(_) => None,
        }
    }

    /// Record an exception and halt the loop.
    pub(crate) fn occur(&mut self, code: ExceptionCode) {
        let function = match self.frame.function {
            FrameFunction::Entry => ExceptionFunction::EntryPoint,
            FrameFunction::Bytecode(index) => ExceptionFunction::Bytecode(index),
            FrameFunction::Virtual(index) => ExceptionFunction::Virtual(index),
        };
        self.exception = Some(Exception {
            function,
            instruction_index: self.instruction_index,
            code,
        });
    }

    /// Whether the value `delta` bytes below the top is (or dips into)
    /// the most recent local variable. Opcodes that consume values call
    /// this so locals cannot be popped.
    pub(crate) fn is_local_variable(&self, delta: usize) -> bool {
        self.local_variables
            .last()
            .is_some_and(|&offset| self.stack.used() - delta <= offset)
    }

    /// Size of the stack slot at `offset`, arrays included.
    pub(crate) fn slot_size_at(&self, offset: usize) -> Option<usize> {
        object::slot_size(self.stack.as_bytes(), offset, &self.program)
    }

    /// The arena a non-null address points into.
    fn arena(&self, addr: MemAddr) -> Option<&[u8]> {
        match addr.region() {
            Region::Null => None,
            Region::Stack { .. } => Some(self.stack.as_bytes()),
            Region::Unmanaged { id, .. } => self.heap.unmanaged_bytes(id),
            Region::Managed { block, .. } => self.heap.collector()?.block_bytes(block),
        }
    }

    fn arena_mut(&mut self, addr: MemAddr) -> Option<&mut [u8]> {
        match addr.region() {
            Region::Null => None,
            Region::Stack { .. } => Some(self.stack.as_bytes_mut()),
            Region::Unmanaged { id, .. } => self.heap.unmanaged_bytes_mut(id),
            Region::Managed { block, .. } => self.heap.collector_mut()?.block_bytes_mut(block),
        }
    }

    const fn addr_offset(addr: MemAddr) -> usize {
        match addr.region() {
            Region::Null => 0,
            Region::Stack { offset }
            | Region::Unmanaged { offset, .. }
            | Region::Managed { offset, .. } => offset as usize,
        }
    }

    /// The type tag of the object at `addr` (tag-end convention).
    pub(crate) fn mem_read_tag(&self, addr: MemAddr) -> Option<TypeCode> {
        object::read_tag(self.arena(addr)?, Self::addr_offset(addr))
    }

    /// Copy the `size` bytes ending at `addr` out of its arena.
    pub(crate) fn copy_out(&self, addr: MemAddr, size: usize) -> Option<Vec<u8>> {
        let bytes = self.arena(addr)?;
        let offset = Self::addr_offset(addr);
        if offset < size || offset > bytes.len() {
            return None;
        }
        Some(bytes[offset - size..offset].to_vec())
    }

    /// Write `data` into the region ending at `addr`.
    pub(crate) fn copy_in(&mut self, addr: MemAddr, data: &[u8]) -> bool {
        let offset = Self::addr_offset(addr);
        let Some(bytes) = self.arena_mut(addr) else {
            return false;
        };
        if offset < data.len() || offset > bytes.len() {
            return false;
        }
        bytes[offset - data.len()..offset].copy_from_slice(data);
        true
    }

    /// Resolve a gc-pointer target into the addressed object's tag-end
    /// address and size.
    pub(crate) fn gc_object(&self, target: MemAddr) -> Option<(MemAddr, usize)> {
        let Region::Managed { block, offset } = target.region() else {
            return None;
        };
        let bytes = self.heap.collector()?.block_bytes(block)?;
        let start = offset as usize;
        if start < HEADER_SIZE || start > bytes.len() {
            return None;
        }
        let mut word = [0u8; 8];
        word.copy_from_slice(&bytes[start - HEADER_SIZE..start - HEADER_SIZE + 8]);
        let size = u64::from_le_bytes(word) as usize;
        (start + size <= bytes.len()).then(|| (MemAddr::managed(block, start + size), size))
    }

    /// Decode the pointer in the slot at `offset` into a raw pointer,
    /// resolving gc-pointers through their managed-heap header. Records
    /// the appropriate exception and returns `None` on failure.
    pub(crate) fn pointee(&mut self, offset: usize) -> Option<RawPointer> {
        let Some(tag) = self.stack.type_at(offset) else {
            self.occur(ExceptionCode::StackEmpty);
            return None;
        };

        match tag.kind() {
            TypeKind::Pointer => {
                let pointer = object::read_pointer(self.stack.as_bytes(), offset);
                if pointer.addr.is_null() {
                    self.occur(ExceptionCode::PointerNullPointer);
                    return None;
                }
                Some(pointer)
            }
            TypeKind::GcPointer => {
                let target = object::read_gc_pointer(self.stack.as_bytes(), offset);
                if target.is_null() {
                    self.occur(ExceptionCode::PointerNullPointer);
                    return None;
                }
                let Some((tag_end, _)) = self.gc_object(target) else {
                    self.occur(ExceptionCode::PointerUnknownAddress);
                    return None;
                };
                let end = Self::addr_offset(tag_end);
                let object_tag = self.arena(tag_end).and_then(|bytes| {
                    object::read_tag(bytes, end)
                });
                let Some(object_tag) = object_tag else {
                    self.occur(ExceptionCode::PointerUnknownAddress);
                    return None;
                };
                if object_tag == TypeCode::ARRAY {
                    let bytes = self.arena(tag_end).expect("arena resolved above");
                    let (element, count) = object::read_array_header(bytes, end);
                    Some(RawPointer {
                        type_code: element,
                        count,
                        addr: tag_end.offset_by(-(thorn_bytefile::types::ARRAY_HEADER_SIZE as i64)),
                    })
                } else {
                    Some(RawPointer {
                        type_code: object_tag,
                        count: 0,
                        addr: tag_end,
                    })
                }
            }
            _ => {
                self.occur(ExceptionCode::PointerNotPointer);
                None
            }
        }
    }

    // --- pub(crate) access for the host layer ----------------------------

    pub(crate) const fn frame(&self) -> &StackFrame {
        &self.frame
    }

    pub(crate) fn local_variable_offset(&self, index: usize) -> Option<usize> {
        self.local_variables.get(index).copied()
    }

    pub(crate) const fn stack_mut(&mut self) -> &mut Stack {
        &mut self.stack
    }

    pub(crate) const fn stack_and_program_mut(&mut self) -> (&mut Stack, &Program) {
        (&mut self.stack, &self.program)
    }

    pub(crate) fn mem_write_payload(&mut self, addr: MemAddr, value: u64) -> bool {
        let offset = Self::addr_offset(addr);
        let Some(bytes) = self.arena_mut(addr) else {
            return false;
        };
        if offset < 2 * TAG_SIZE || offset > bytes.len() {
            return false;
        }
        object::write_payload_word(bytes, offset, value);
        true
    }

    pub(crate) fn mem_read_payload(&self, addr: MemAddr) -> Option<u64> {
        let bytes = self.arena(addr)?;
        let offset = Self::addr_offset(addr);
        if offset < 2 * TAG_SIZE || offset > bytes.len() {
            return None;
        }
        Some(object::read_payload_word(bytes, offset))
    }
}

// The frame record must round-trip through its stack representation.
const _: () = assert!(FRAME_SIZE == 48);
