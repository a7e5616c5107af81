// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Heap and pointer opcodes: allocation, deallocation, dereference and
//! address arithmetic.
//!
//! `new`/`anew` allocate in the unmanaged heap; `gcnew`/`agcnew` in the
//! managed heap, possibly triggering a collection first. `tstore`
//! through a gc-pointer is the only write path that invokes the card
//! barrier.

use thorn_bytefile::types::{
    ARRAY_HEADER_SIZE, GC_POINTER_SIZE, POINTER_SIZE, TAG_SIZE, TypeCode, TypeKind,
};

use crate::exception::ExceptionCode;
use crate::mem::MemAddr;
use crate::object::{self, RawPointer, TypeSizes, Value};

use super::Interpreter;

impl Interpreter {
    pub(super) fn interpret_null(&mut self) {
        self.push_pointer(RawPointer::NULL);
    }

    pub(super) fn interpret_gcnull(&mut self) {
        if !self.stack.expand(GC_POINTER_SIZE) {
            self.occur(ExceptionCode::StackOverflow);
            return;
        }
        let used = self.stack.used();
        object::write_gc_pointer(self.stack.as_bytes_mut(), used, MemAddr::NULL);
    }

    /// Resolve a `new`/`gcnew` operand into an instantiable global type.
    fn instance_type(&mut self, operand: u32) -> Option<(TypeCode, usize)> {
        let Some(code) = self.program.resolve_type(self.frame.module, TypeCode(operand)) else {
            self.occur(ExceptionCode::TypeOutOfRange);
            return None;
        };
        if !code.is_value() || matches!(code.kind(), TypeKind::Array) {
            self.occur(ExceptionCode::TypeOutOfRange);
            return None;
        }
        let Some(size) = self.program.type_size(code) else {
            self.occur(ExceptionCode::TypeOutOfRange);
            return None;
        };
        Some((code, size))
    }

    pub(super) fn interpret_new(&mut self, operand: u32) {
        let Some((code, size)) = self.instance_type(operand) else {
            return;
        };
        if self.stack.free() < POINTER_SIZE {
            self.occur(ExceptionCode::StackOverflow);
            return;
        }

        let addr = self.heap.allocate_unmanaged(size);
        self.init_instance(addr, code);
        self.push_pointer(RawPointer {
            type_code: code,
            count: 0,
            addr,
        });
    }

    pub(super) fn interpret_gcnew(&mut self, operand: u32) {
        let Some((code, size)) = self.instance_type(operand) else {
            return;
        };
        if self.stack.free() < GC_POINTER_SIZE {
            self.occur(ExceptionCode::StackOverflow);
            return;
        }

        let Self {
            heap,
            stack,
            program,
            ..
        } = self;
        let addr = heap.allocate_managed(stack, program, size);

        assert!(self.stack.expand(GC_POINTER_SIZE), "free space was checked");
        let used = self.stack.used();
        object::write_gc_pointer(self.stack.as_bytes_mut(), used, addr);

        if !addr.is_null() {
            if let Some((tag_end, _)) = self.gc_object(addr) {
                self.init_instance(tag_end, code);
            }
        }
    }

    /// Write the type tags of a freshly allocated instance.
    fn init_instance(&mut self, addr: MemAddr, code: TypeCode) {
        if addr.is_null() {
            return;
        }
        let offset = Self::addr_offset(addr);
        let Self { heap, program, .. } = self;
        let Some(bytes) = (match addr.region() {
            crate::mem::Region::Unmanaged { id, .. } => heap.unmanaged_bytes_mut(id),
            crate::mem::Region::Managed { block, .. } => {
                heap.collector_mut().and_then(|c| c.block_bytes_mut(block))
            }
            _ => None,
        }) else {
            return;
        };

        if code.is_structure() {
            object::init_structure(bytes, offset, program, code);
        } else {
            object::write_tag(bytes, offset, code);
        }
    }

    pub(super) fn interpret_delete(&mut self) {
        if self.is_local_variable(0) {
            self.occur(ExceptionCode::StackEmpty);
            return;
        }
        let Some(tag) = self.stack.top_type() else {
            self.occur(ExceptionCode::StackEmpty);
            return;
        };
        if tag != TypeCode::POINTER {
            self.occur(ExceptionCode::PointerNotPointer);
            return;
        }

        let used = self.stack.used();
        let pointer = object::read_pointer(self.stack.as_bytes(), used);
        if !pointer.addr.is_null() && !self.heap.deallocate_unmanaged(pointer.addr) {
            self.occur(ExceptionCode::PointerUnknownAddress);
            return;
        }
        self.stack.reduce(POINTER_SIZE);
    }

    pub(super) fn interpret_anew(&mut self, operand: u32) {
        let Some(info) = self.array_info(operand) else {
            return;
        };
        if self.stack.free() < POINTER_SIZE {
            self.occur(ExceptionCode::StackOverflow);
            return;
        }

        // The allocation is a whole array object: elements, then the
        // header; the fat pointer addresses element 0.
        let total = info.total_size;
        let addr = self.heap.allocate_unmanaged(total);

        let element = info.element;
        let count = info.count;
        if let crate::mem::Region::Unmanaged { id, .. } = addr.region() {
            let Self { heap, program, .. } = self;
            if let Some(bytes) = heap.unmanaged_bytes_mut(id) {
                object::init_array(bytes, total, program, element, count);
            }
        }

        self.stack.reduce(info.count_size);
        self.push_pointer(RawPointer {
            type_code: element,
            count,
            addr: addr.offset_by(-(ARRAY_HEADER_SIZE as i64)),
        });
    }

    pub(super) fn interpret_agcnew(&mut self, operand: u32) {
        let Some(info) = self.array_info(operand) else {
            return;
        };
        if self.stack.free() < GC_POINTER_SIZE {
            self.occur(ExceptionCode::StackOverflow);
            return;
        }

        let total = info.total_size;
        let Self {
            heap,
            stack,
            program,
            ..
        } = self;
        let addr = heap.allocate_managed(stack, program, total);

        self.stack.reduce(info.count_size);
        assert!(self.stack.expand(GC_POINTER_SIZE), "free space was checked");
        let used = self.stack.used();
        object::write_gc_pointer(self.stack.as_bytes_mut(), used, addr);

        if !addr.is_null() {
            if let (Some((tag_end, _)), crate::mem::Region::Managed { block, .. }) =
                (self.gc_object(addr), addr.region())
            {
                let end = Self::addr_offset(tag_end);
                let Self { heap, program, .. } = self;
                if let Some(bytes) = heap.collector_mut().and_then(|c| c.block_bytes_mut(block)) {
                    object::init_array(bytes, end, program, info.element, info.count);
                }
            }
        }
    }

    pub(super) fn interpret_alea(&mut self) {
        if self.is_local_variable(0) {
            self.occur(ExceptionCode::StackEmpty);
            return;
        }
        if self.stack.free() < POINTER_SIZE {
            self.occur(ExceptionCode::StackOverflow);
            return;
        }

        let used = self.stack.used();
        let index = match self.stack.top_type().map(TypeCode::kind) {
            Some(TypeKind::Int) => {
                u64::from(object::read_payload_word(self.stack.as_bytes(), used) as u32)
            }
            Some(TypeKind::Long) => object::read_payload_word(self.stack.as_bytes(), used),
            Some(_) => {
                self.occur(ExceptionCode::StackDifferentType);
                return;
            }
            None => {
                self.occur(ExceptionCode::StackEmpty);
                return;
            }
        };
        let index_size = self
            .slot_size_at(used)
            .expect("index slot was just inspected");

        if self.is_local_variable(index_size) {
            self.occur(ExceptionCode::StackEmpty);
            return;
        }
        let pointer_offset = used - index_size;
        let Some(pointer) = self.pointee(pointer_offset) else {
            return;
        };
        if pointer.count == 0 {
            self.occur(ExceptionCode::ArrayNotArray);
            return;
        }
        if index >= pointer.count {
            self.occur(ExceptionCode::ArrayIndexOutOfRange);
            return;
        }

        let pointer_size = self
            .slot_size_at(pointer_offset)
            .expect("pointer slot was just inspected");
        let Some(element_size) = self.program.type_size(pointer.type_code) else {
            self.occur(ExceptionCode::TypeOutOfRange);
            return;
        };

        self.stack.reduce(index_size + pointer_size);
        self.push_pointer(RawPointer {
            type_code: pointer.type_code,
            count: 0,
            addr: pointer.addr.offset_by(-((index as usize * element_size) as i64)),
        });
    }

    pub(super) fn interpret_count(&mut self) {
        if self.is_local_variable(0) {
            self.occur(ExceptionCode::StackEmpty);
            return;
        }

        let used = self.stack.used();
        let Some(pointer) = self.pointee(used) else {
            return;
        };
        if pointer.count == 0 {
            self.occur(ExceptionCode::ArrayNotArray);
            return;
        }

        let size = self
            .slot_size_at(used)
            .expect("pointer slot was just inspected");
        self.stack.reduce(size);
        self.push_value(Value::Long(pointer.count));
    }

    pub(super) fn interpret_flea(&mut self, operand: u32) {
        if self.is_local_variable(0) {
            self.occur(ExceptionCode::StackEmpty);
            return;
        }

        let used = self.stack.used();
        let Some(pointer) = self.pointee(used) else {
            return;
        };
        if pointer.count != 0 || !pointer.type_code.is_structure() {
            self.occur(ExceptionCode::StructureNotStructure);
            return;
        }

        let Some(info) = self.program.structure(pointer.type_code) else {
            self.occur(ExceptionCode::StructureNotStructure);
            return;
        };
        let Some(field) = info.fields.get(operand as usize).copied() else {
            self.occur(ExceptionCode::StructureFieldOutOfRange);
            return;
        };

        let size = self
            .slot_size_at(used)
            .expect("pointer slot was just inspected");
        if self.stack.free() + size < POINTER_SIZE {
            self.occur(ExceptionCode::StackOverflow);
            return;
        }

        let field_pointer = if field.is_array() {
            // An embedded array field: address its first element.
            RawPointer {
                type_code: field.type_code,
                count: field.count,
                addr: pointer
                    .addr
                    .offset_by(-((field.offset + ARRAY_HEADER_SIZE) as i64)),
            }
        } else {
            RawPointer {
                type_code: field.type_code,
                count: 0,
                addr: pointer.addr.offset_by(-(field.offset as i64)),
            }
        };

        self.stack.reduce(size);
        self.push_pointer(field_pointer);
    }

    pub(super) fn interpret_tload(&mut self) {
        if self.is_local_variable(0) {
            self.occur(ExceptionCode::StackEmpty);
            return;
        }

        let used = self.stack.used();
        let Some(pointer) = self.pointee(used) else {
            return;
        };
        let pointer_size = self
            .slot_size_at(used)
            .expect("pointer slot was just inspected");

        if pointer.count != 0 {
            let Some(element_size) = self.program.type_size(pointer.type_code) else {
                self.occur(ExceptionCode::TypeOutOfRange);
                return;
            };
            let region = pointer.count as usize * element_size;
            let total = ARRAY_HEADER_SIZE + region;

            if self.stack.free() + pointer_size < total {
                self.occur(ExceptionCode::StackOverflow);
                return;
            }
            let Some(elements) = self.copy_out(pointer.addr, region) else {
                self.occur(ExceptionCode::PointerUnknownAddress);
                return;
            };

            self.stack.reduce(pointer_size);
            assert!(self.stack.expand(total), "free space was checked");
            let top = self.stack.used();
            let bytes = self.stack.as_bytes_mut();
            bytes[top - total..top - ARRAY_HEADER_SIZE].copy_from_slice(&elements);
            object::write_array_header(bytes, top, pointer.type_code, pointer.count);
        } else {
            let Some(size) = self.program.type_size(pointer.type_code) else {
                self.occur(ExceptionCode::TypeOutOfRange);
                return;
            };
            if self.stack.free() + pointer_size < size {
                self.occur(ExceptionCode::StackOverflow);
                return;
            }
            let Some(slot) = self.copy_out(pointer.addr, size) else {
                self.occur(ExceptionCode::PointerUnknownAddress);
                return;
            };

            self.stack.reduce(pointer_size);
            assert!(self.stack.expand(size), "free space was checked");
            let top = self.stack.used();
            self.stack.as_bytes_mut()[top - size..top].copy_from_slice(&slot);
        }
    }

    pub(super) fn interpret_tstore(&mut self) {
        let Some(rhs_tag) = self.stack.top_type() else {
            self.occur(ExceptionCode::StackEmpty);
            return;
        };
        if self.is_local_variable(0) {
            self.occur(ExceptionCode::StackEmpty);
            return;
        }

        let used = self.stack.used();
        let Some(rhs_size) = self.slot_size_at(used) else {
            self.occur(ExceptionCode::StackEmpty);
            return;
        };
        if self.is_local_variable(rhs_size) {
            self.occur(ExceptionCode::StackEmpty);
            return;
        }
        let lhs_offset = used - rhs_size;
        let Some(lhs_tag) = self.stack.type_at(lhs_offset) else {
            self.occur(ExceptionCode::StackEmpty);
            return;
        };
        let Some(pointer) = self.pointee(lhs_offset) else {
            return;
        };

        if pointer.count != 0 {
            if rhs_tag != TypeCode::ARRAY {
                self.occur(ExceptionCode::StackDifferentType);
                return;
            }
            let (element, count) = object::read_array_header(self.stack.as_bytes(), used);
            if element != pointer.type_code {
                self.occur(ExceptionCode::StackDifferentType);
                return;
            }
            if count != pointer.count {
                self.occur(ExceptionCode::ArrayCountDifferentCount);
                return;
            }

            let Some(element_size) = self.program.type_size(element) else {
                self.occur(ExceptionCode::TypeOutOfRange);
                return;
            };
            let region = count as usize * element_size;
            let elements =
                self.stack.as_bytes()[used - ARRAY_HEADER_SIZE - region..used - ARRAY_HEADER_SIZE]
                    .to_vec();
            if !self.copy_in(pointer.addr, &elements) {
                self.occur(ExceptionCode::PointerUnknownAddress);
                return;
            }
        } else {
            if rhs_tag == TypeCode::ARRAY || rhs_tag != pointer.type_code {
                self.occur(ExceptionCode::StackDifferentType);
                return;
            }

            // Copy the payload; the target's tag is already in place.
            let payload = self.stack.as_bytes()[used - rhs_size..used - TAG_SIZE].to_vec();
            if !self.copy_in(pointer.addr.offset_by(-(TAG_SIZE as i64)), &payload) {
                self.occur(ExceptionCode::PointerUnknownAddress);
                return;
            }
        }

        // Stores through a gc-pointer may plant a young-generation
        // reference in the old generation.
        if lhs_tag == TypeCode::GC_POINTER {
            let target = object::read_gc_pointer(self.stack.as_bytes(), lhs_offset);
            self.heap.make_dirty(target);
        }
    }
}
