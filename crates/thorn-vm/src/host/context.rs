// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The execution context handed to host functions.
//!
//! Binds the running interpreter's stack, active frame and locals.
//! Parameters are read by index, results pushed as fundamentals or
//! (default-initialized) structures and arrays; field and element
//! navigation walks live objects in place.

use thorn_bytefile::types::{ARRAY_HEADER_SIZE, TypeCode, TypeKind};

use crate::exception::ExceptionCode;
use crate::interp::Interpreter;
use crate::mem::MemAddr;
use crate::object::{self, TypeSizes, Value};

use super::VirtualObject;

/// Binary arithmetic operators of the virtual-object API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtualArith {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division (zero divisors raise).
    Div,
}

/// Interpreter binding for one virtual-function invocation.
pub struct VirtualContext<'a> {
    interp: &'a mut Interpreter,
}

impl<'a> VirtualContext<'a> {
    pub(crate) fn new(interp: &'a mut Interpreter) -> Self {
        Self { interp }
    }

    /// Global type code of the current module's structure `local_index`
    /// (own structures first, imports after).
    pub fn structure(&self, local_index: u32) -> Result<TypeCode, ExceptionCode> {
        let module = self.interp.frame().module;
        self.interp
            .program()
            .resolve_type(module, TypeCode::structure(local_index))
            .ok_or(ExceptionCode::TypeOutOfRange)
    }

    /// Parameter `index` of the running function, as a reference handle.
    pub fn parameter(&self, index: u16) -> Result<VirtualObject, ExceptionCode> {
        let frame = self.interp.frame();
        let offset = self
            .interp
            .local_variable_offset(frame.variable_begin + index as usize)
            .ok_or(ExceptionCode::LocalVarOutOfRange)?;
        Ok(VirtualObject::Ref(MemAddr::stack(offset)))
    }

    /// The type of the object a handle holds or references.
    pub fn type_of(&self, object: &VirtualObject) -> Result<TypeCode, ExceptionCode> {
        match object {
            VirtualObject::Empty => Err(ExceptionCode::StackEmpty),
            VirtualObject::Value(value) => Ok(value.type_code()),
            VirtualObject::Pointer(_) => Ok(TypeCode::POINTER),
            VirtualObject::Ref(addr) => self
                .interp
                .mem_read_tag(*addr)
                .ok_or(ExceptionCode::PointerUnknownAddress),
        }
    }

    /// Take the address of a referenced object, yielding an owned
    /// pointer value (array objects yield an array view of their
    /// elements).
    pub fn address_of(&self, object: &VirtualObject) -> Result<VirtualObject, ExceptionCode> {
        let VirtualObject::Ref(addr) = object else {
            return Err(ExceptionCode::PointerNotPointer);
        };
        let tag = self.type_of(object)?;
        let pointer = if tag == TypeCode::ARRAY {
            let header = self
                .interp
                .copy_out(*addr, ARRAY_HEADER_SIZE)
                .ok_or(ExceptionCode::PointerUnknownAddress)?;
            let (element, count) = object::read_array_header(&header, ARRAY_HEADER_SIZE);
            crate::object::RawPointer {
                type_code: element,
                count,
                addr: addr.offset_by(-(ARRAY_HEADER_SIZE as i64)),
            }
        } else {
            crate::object::RawPointer {
                type_code: tag,
                count: 0,
                addr: *addr,
            }
        };
        Ok(VirtualObject::Pointer(pointer))
    }

    /// Three-way comparison of two fundamentals; float operands compare
    /// as doubles, integer operands by their unsigned bit patterns.
    pub fn compare(
        &self,
        lhs: &VirtualObject,
        rhs: &VirtualObject,
    ) -> Result<core::cmp::Ordering, ExceptionCode> {
        use core::cmp::Ordering;

        let (lhs, rhs) = (self.value_of(lhs)?, self.value_of(rhs)?);
        let float = |value: Value| match value {
            Value::Int(v) => f64::from(v),
            Value::Long(v) => v as f64,
            Value::Single(v) => f64::from(v),
            Value::Double(v) => v,
        };

        if matches!(lhs, Value::Single(_) | Value::Double(_))
            || matches!(rhs, Value::Single(_) | Value::Double(_))
        {
            Ok(float(lhs)
                .partial_cmp(&float(rhs))
                .unwrap_or(Ordering::Less))
        } else {
            let bits = |value: Value| match value {
                Value::Int(v) => u64::from(v),
                Value::Long(v) => v,
                Value::Single(_) | Value::Double(_) => 0,
            };
            Ok(bits(lhs).cmp(&bits(rhs)))
        }
    }

    /// Binary arithmetic on two same-typed fundamentals, following the
    /// interpreter's wrapping and division semantics.
    pub fn arithmetic(
        &self,
        op: VirtualArith,
        lhs: &VirtualObject,
        rhs: &VirtualObject,
    ) -> Result<Value, ExceptionCode> {
        let (lhs, rhs) = (self.value_of(lhs)?, self.value_of(rhs)?);
        if lhs.type_code() != rhs.type_code() {
            return Err(ExceptionCode::StackDifferentType);
        }

        let zero_division = matches!(op, VirtualArith::Div)
            && match rhs {
                Value::Int(v) => v == 0,
                Value::Long(v) => v == 0,
                Value::Single(v) => v == 0.0,
                Value::Double(v) => v == 0.0,
            };
        if zero_division {
            return Err(ExceptionCode::ArithDivideByZero);
        }

        Ok(match (lhs, rhs) {
            (Value::Int(a), Value::Int(b)) => Value::Int(match op {
                VirtualArith::Add => a.wrapping_add(b),
                VirtualArith::Sub => a.wrapping_sub(b),
                VirtualArith::Mul => a.wrapping_mul(b),
                VirtualArith::Div => a / b,
            }),
            (Value::Long(a), Value::Long(b)) => Value::Long(match op {
                VirtualArith::Add => a.wrapping_add(b),
                VirtualArith::Sub => a.wrapping_sub(b),
                VirtualArith::Mul => a.wrapping_mul(b),
                VirtualArith::Div => a / b,
            }),
            (Value::Single(a), Value::Single(b)) => Value::Single(match op {
                VirtualArith::Add => a + b,
                VirtualArith::Sub => a - b,
                VirtualArith::Mul => a * b,
                VirtualArith::Div => a / b,
            }),
            (Value::Double(a), Value::Double(b)) => Value::Double(match op {
                VirtualArith::Add => a + b,
                VirtualArith::Sub => a - b,
                VirtualArith::Mul => a * b,
                VirtualArith::Div => a / b,
            }),
            _ => return Err(ExceptionCode::StackDifferentType),
        })
    }

    /// Field `index` of a referenced structure.
    pub fn field(
        &self,
        object: &VirtualObject,
        index: u32,
    ) -> Result<VirtualObject, ExceptionCode> {
        let VirtualObject::Ref(addr) = object else {
            return Err(ExceptionCode::StructureNotStructure);
        };
        let tag = self.type_of(object)?;
        if !tag.is_structure() {
            return Err(ExceptionCode::StructureNotStructure);
        }
        let info = self
            .interp
            .program()
            .structure_info(tag)
            .ok_or(ExceptionCode::StructureNotStructure)?;
        let field = info
            .fields
            .get(index as usize)
            .ok_or(ExceptionCode::StructureFieldOutOfRange)?;
        Ok(VirtualObject::Ref(addr.offset_by(-(field.offset as i64))))
    }

    /// Element `index` of a referenced array.
    pub fn element(
        &self,
        object: &VirtualObject,
        index: u64,
    ) -> Result<VirtualObject, ExceptionCode> {
        let VirtualObject::Ref(addr) = object else {
            return Err(ExceptionCode::ArrayNotArray);
        };
        let tag = self.type_of(object)?;
        if tag != TypeCode::ARRAY {
            return Err(ExceptionCode::ArrayNotArray);
        }

        let header = self
            .interp
            .copy_out(*addr, ARRAY_HEADER_SIZE)
            .ok_or(ExceptionCode::PointerUnknownAddress)?;
        let (element, count) = object::read_array_header(&header, ARRAY_HEADER_SIZE);
        if index >= count {
            return Err(ExceptionCode::StdlibArrayOutOfRange);
        }

        let element_size = self
            .interp
            .program()
            .type_size(element)
            .ok_or(ExceptionCode::TypeOutOfRange)?;
        let offset = ARRAY_HEADER_SIZE + index as usize * element_size;
        Ok(VirtualObject::Ref(addr.offset_by(-(offset as i64))))
    }

    /// Follow a pointer (owned or referenced) to its target object.
    pub fn deref(&self, object: &VirtualObject) -> Result<VirtualObject, ExceptionCode> {
        if let VirtualObject::Pointer(pointer) = object {
            if pointer.addr.is_null() {
                return Err(ExceptionCode::PointerNullPointer);
            }
            return Ok(VirtualObject::Ref(pointer.addr));
        }
        let VirtualObject::Ref(addr) = object else {
            return Err(ExceptionCode::PointerNotPointer);
        };
        let tag = self.type_of(object)?;
        match tag.kind() {
            TypeKind::Pointer => {
                let slot = self
                    .interp
                    .copy_out(*addr, thorn_bytefile::types::POINTER_SIZE)
                    .ok_or(ExceptionCode::PointerUnknownAddress)?;
                let pointer = object::read_pointer(&slot, thorn_bytefile::types::POINTER_SIZE);
                if pointer.addr.is_null() {
                    return Err(ExceptionCode::PointerNullPointer);
                }
                Ok(VirtualObject::Ref(pointer.addr))
            }
            TypeKind::GcPointer => {
                let target = MemAddr::from_bits(
                    self.interp
                        .mem_read_payload(*addr)
                        .ok_or(ExceptionCode::PointerUnknownAddress)?,
                );
                if target.is_null() {
                    return Err(ExceptionCode::PointerNullPointer);
                }
                let (tag_end, _) = self
                    .interp
                    .gc_object(target)
                    .ok_or(ExceptionCode::PointerUnknownAddress)?;
                Ok(VirtualObject::Ref(tag_end))
            }
            _ => Err(ExceptionCode::PointerNotPointer),
        }
    }

    /// Read a handle as a fundamental value.
    pub fn value_of(&self, object: &VirtualObject) -> Result<Value, ExceptionCode> {
        match object {
            VirtualObject::Empty => Err(ExceptionCode::StackEmpty),
            VirtualObject::Value(value) => Ok(*value),
            VirtualObject::Pointer(_) => Err(ExceptionCode::StdlibTypeAssertFail),
            VirtualObject::Ref(addr) => {
                let tag = self.type_of(object)?;
                let bits = self
                    .interp
                    .mem_read_payload(*addr)
                    .ok_or(ExceptionCode::PointerUnknownAddress)?;
                match tag.kind() {
                    TypeKind::Int => Ok(Value::Int(bits as u32)),
                    TypeKind::Long => Ok(Value::Long(bits)),
                    TypeKind::Single => Ok(Value::Single(f32::from_bits(bits as u32))),
                    TypeKind::Double => Ok(Value::Double(f64::from_bits(bits))),
                    _ => Err(ExceptionCode::StdlibTypeAssertFail),
                }
            }
        }
    }

    /// Convert a handle to an int (numeric conversions follow the cast
    /// opcodes).
    pub fn to_int(&self, object: &VirtualObject) -> Result<u32, ExceptionCode> {
        Ok(match self.value_of(object)? {
            Value::Int(v) => v,
            Value::Long(v) => v as u32,
            Value::Single(v) => v as u32,
            Value::Double(v) => v as u32,
        })
    }

    /// Convert a handle to a long.
    pub fn to_long(&self, object: &VirtualObject) -> Result<u64, ExceptionCode> {
        Ok(match self.value_of(object)? {
            Value::Int(v) => u64::from(v),
            Value::Long(v) => v,
            Value::Single(v) => v as u64,
            Value::Double(v) => v as u64,
        })
    }

    /// Convert a handle to a double.
    pub fn to_double(&self, object: &VirtualObject) -> Result<f64, ExceptionCode> {
        Ok(match self.value_of(object)? {
            Value::Int(v) => f64::from(v),
            Value::Long(v) => v as f64,
            Value::Single(v) => f64::from(v),
            Value::Double(v) => v,
        })
    }

    /// Assign a fundamental into a referenced slot; the slot's type must
    /// match the value exactly.
    pub fn set_value(
        &mut self,
        object: &VirtualObject,
        value: Value,
    ) -> Result<(), ExceptionCode> {
        let VirtualObject::Ref(addr) = object else {
            return Err(ExceptionCode::StdlibTypeAssertFail);
        };
        let tag = self.type_of(object)?;
        if tag != value.type_code() {
            return Err(ExceptionCode::StdlibTypeAssertFail);
        }
        if self.interp.mem_write_payload(*addr, value.payload_bits()) {
            Ok(())
        } else {
            Err(ExceptionCode::PointerUnknownAddress)
        }
    }

    /// Push a fundamental result.
    pub fn push_fundamental(&mut self, value: Value) -> Result<VirtualObject, ExceptionCode> {
        let size = value
            .type_code()
            .fundamental_size()
            .expect("fundamental values have fixed sizes");
        if !self.interp.stack_mut().expand(size) {
            return Err(ExceptionCode::StackOverflow);
        }
        let used = self.interp.stack_mut().used();
        object::write_value(self.interp.stack_mut().as_bytes_mut(), used, value);
        Ok(VirtualObject::Ref(MemAddr::stack(used)))
    }

    /// Push a default-initialized structure (`count` 0) or an array of
    /// `count` structures.
    pub fn push_structure(
        &mut self,
        structure: TypeCode,
        count: u64,
    ) -> Result<VirtualObject, ExceptionCode> {
        if !structure.is_structure() {
            return Err(ExceptionCode::StructureNotStructure);
        }
        let size = self
            .interp
            .program()
            .type_size(structure)
            .ok_or(ExceptionCode::TypeOutOfRange)?;

        let total = if count == 0 {
            size
        } else {
            ARRAY_HEADER_SIZE + count as usize * size
        };
        if !self.interp.stack_mut().expand(total) {
            return Err(ExceptionCode::StackOverflow);
        }

        let used = self.interp.stack_mut().used();
        let (stack, program) = self.interp.stack_and_program_mut();
        if count == 0 {
            object::init_structure(stack.as_bytes_mut(), used, program, structure);
        } else {
            object::init_array(stack.as_bytes_mut(), used, program, structure, count);
        }
        Ok(VirtualObject::Ref(MemAddr::stack(used)))
    }

    /// Remove the top value. Returns `false` on an empty stack.
    pub fn pop(&mut self) -> bool {
        let Some(size) = self
            .interp
            .stack()
            .top_type()
            .filter(|tag| tag.is_value())
            .and_then(|_| {
                let used = self.interp.stack().used();
                self.interp.slot_size_at(used)
            })
        else {
            return false;
        };
        self.interp.stack_mut().reduce(size);
        true
    }
}
