// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Object slot coding.
//!
//! Free functions that read and write typed slots inside a byte arena
//! (the evaluation stack, an unmanaged allocation, or a managed-heap
//! block). A slot is addressed by the byte offset just past its type tag;
//! the payload lies at negative offsets:
//!
//! ```text
//! int/long/single/double:  [value:8][tag:8]
//! gc-pointer:              [address:8][tag:8]
//! pointer:                 [pointee type:8][count:8][address:8][tag:8]
//! array:                   [elements...][element type:8][count:8][tag:8]
//! structure:               [fields...][tag:8]
//! frame record:            [caller:8][stack begin:8][variable begin:8]
//!                          [function:8][module:8][tag:8]
//! ```
//!
//! Array element `i`'s object address is `addr - HEADER - i * elem_size`;
//! a fat pointer to an array addresses element 0, so the copyable region
//! is `[addr - count * elem_size, addr)`.

#[cfg(test)]
mod object_test;

use thorn_bytefile::structure::StructureInfo;
use thorn_bytefile::types::{
    ARRAY_HEADER_SIZE, DOUBLE_SIZE, FRAME_SIZE, GC_POINTER_SIZE, INT_SIZE, LONG_SIZE, POINTER_SIZE,
    SINGLE_SIZE, TAG_SIZE, TypeCode, TypeKind,
};

use crate::mem::MemAddr;

/// Type-size oracle: resolves structure sizes and layouts. Implemented by
/// the resolved program; tests substitute fixed tables.
pub trait TypeSizes {
    /// Slot size of `code`, `None` for unknown codes.
    fn type_size(&self, code: TypeCode) -> Option<usize>;
    /// Layout of the structure designated by `code`.
    fn structure_info(&self, code: TypeCode) -> Option<&StructureInfo>;
}

/// A fundamental value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// 32-bit integer (bit pattern).
    Int(u32),
    /// 64-bit integer (bit pattern).
    Long(u64),
    /// 32-bit float.
    Single(f32),
    /// 64-bit float.
    Double(f64),
}

impl Value {
    /// Type code of this value.
    #[must_use]
    pub const fn type_code(&self) -> TypeCode {
        match self {
            Self::Int(_) => TypeCode::INT,
            Self::Long(_) => TypeCode::LONG,
            Self::Single(_) => TypeCode::SINGLE,
            Self::Double(_) => TypeCode::DOUBLE,
        }
    }

    /// Payload bits as stored in a slot.
    #[must_use]
    pub const fn payload_bits(&self) -> u64 {
        match *self {
            Self::Int(v) => v as u64,
            Self::Long(v) => v,
            Self::Single(v) => v.to_bits() as u64,
            Self::Double(v) => v.to_bits(),
        }
    }
}

/// A decoded fat pointer: pointee type, semantic count (0 = scalar) and
/// target address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPointer {
    /// Pointee (element) type.
    pub type_code: TypeCode,
    /// 0 for a scalar target, element count for an array view.
    pub count: u64,
    /// Target address.
    pub addr: MemAddr,
}

impl RawPointer {
    /// The null scalar pointer.
    pub const NULL: Self = Self {
        type_code: TypeCode::NONE,
        count: 0,
        addr: MemAddr::NULL,
    };
}

/// A decoded saved stack frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRecord {
    /// Caller's next-instruction index.
    pub caller: u64,
    /// Evaluation-stack used size at call time.
    pub stack_begin: u64,
    /// Local-variable table length at call time.
    pub variable_begin: u64,
    /// Encoded function reference (see the interpreter's frame type).
    pub function: u64,
    /// Owning module of the running function.
    pub module: u64,
}

// --- word-level accessors ------------------------------------------------

fn read_word(bytes: &[u8], end: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[end - 8..end]);
    u64::from_le_bytes(word)
}

fn write_word(bytes: &mut [u8], end: usize, value: u64) {
    bytes[end - 8..end].copy_from_slice(&value.to_le_bytes());
}

/// The type tag of the object at `addr`, `None` when out of bounds.
#[must_use]
pub fn read_tag(bytes: &[u8], addr: usize) -> Option<TypeCode> {
    if addr < TAG_SIZE || addr > bytes.len() {
        return None;
    }
    Some(TypeCode(read_word(bytes, addr) as u32))
}

/// Write the type tag of the object at `addr`.
pub fn write_tag(bytes: &mut [u8], addr: usize, code: TypeCode) {
    write_word(bytes, addr, u64::from(code.0));
}

/// Payload word of a single-word slot (fundamentals, gc-pointers).
#[must_use]
pub fn read_payload_word(bytes: &[u8], addr: usize) -> u64 {
    read_word(bytes, addr - TAG_SIZE)
}

/// Write the payload word of a single-word slot.
pub fn write_payload_word(bytes: &mut [u8], addr: usize, value: u64) {
    write_word(bytes, addr - TAG_SIZE, value);
}

/// Read a fundamental value slot. `None` when the tag is not fundamental.
#[must_use]
pub fn read_value(bytes: &[u8], addr: usize) -> Option<Value> {
    let tag = read_tag(bytes, addr)?;
    if addr < 2 * TAG_SIZE {
        return None;
    }
    let bits = read_payload_word(bytes, addr);
    match tag.kind() {
        TypeKind::Int => Some(Value::Int(bits as u32)),
        TypeKind::Long => Some(Value::Long(bits)),
        TypeKind::Single => Some(Value::Single(f32::from_bits(bits as u32))),
        TypeKind::Double => Some(Value::Double(f64::from_bits(bits))),
        _ => None,
    }
}

/// Write a fundamental value slot (payload and tag).
pub fn write_value(bytes: &mut [u8], addr: usize, value: Value) {
    write_payload_word(bytes, addr, value.payload_bits());
    write_tag(bytes, addr, value.type_code());
}

/// Read a fat pointer slot (no tag check).
#[must_use]
pub fn read_pointer(bytes: &[u8], addr: usize) -> RawPointer {
    RawPointer {
        type_code: TypeCode(read_word(bytes, addr - 24) as u32),
        count: read_word(bytes, addr - 16),
        addr: MemAddr::from_bits(read_word(bytes, addr - 8 - TAG_SIZE)),
    }
}

/// Write a fat pointer slot (payload and tag).
pub fn write_pointer(bytes: &mut [u8], addr: usize, pointer: RawPointer) {
    write_word(bytes, addr - 24, u64::from(pointer.type_code.0));
    write_word(bytes, addr - 16, pointer.count);
    write_word(bytes, addr - 8 - TAG_SIZE, pointer.addr.to_bits());
    write_tag(bytes, addr, TypeCode::POINTER);
}

/// Read a gc-pointer slot's target address.
#[must_use]
pub fn read_gc_pointer(bytes: &[u8], addr: usize) -> MemAddr {
    MemAddr::from_bits(read_payload_word(bytes, addr))
}

/// Write a gc-pointer slot (payload and tag).
pub fn write_gc_pointer(bytes: &mut [u8], addr: usize, target: MemAddr) {
    write_payload_word(bytes, addr, target.to_bits());
    write_tag(bytes, addr, TypeCode::GC_POINTER);
}

/// Read an array header: `(element type, count)`.
#[must_use]
pub fn read_array_header(bytes: &[u8], addr: usize) -> (TypeCode, u64) {
    (
        TypeCode(read_word(bytes, addr - 16) as u32),
        read_word(bytes, addr - 8),
    )
}

/// Write an array header (element type, count and tag).
pub fn write_array_header(bytes: &mut [u8], addr: usize, element: TypeCode, count: u64) {
    write_word(bytes, addr - 16, u64::from(element.0));
    write_word(bytes, addr - 8, count);
    write_tag(bytes, addr, TypeCode::ARRAY);
}

/// Read a saved frame record.
#[must_use]
pub fn read_frame(bytes: &[u8], addr: usize) -> FrameRecord {
    FrameRecord {
        caller: read_word(bytes, addr - 40),
        stack_begin: read_word(bytes, addr - 32),
        variable_begin: read_word(bytes, addr - 24),
        function: read_word(bytes, addr - 16),
        module: read_word(bytes, addr - 8),
    }
}

/// Write a saved frame record (payload and `none` tag).
pub fn write_frame(bytes: &mut [u8], addr: usize, frame: &FrameRecord) {
    write_word(bytes, addr - 40, frame.caller);
    write_word(bytes, addr - 32, frame.stack_begin);
    write_word(bytes, addr - 24, frame.variable_begin);
    write_word(bytes, addr - 16, frame.function);
    write_word(bytes, addr - 8, frame.module);
    write_tag(bytes, addr, TypeCode::NONE);
}

// Frame payload words sit between the slot bottom and the tag.
const _: () = assert!(FRAME_SIZE == 5 * 8 + TAG_SIZE);
const _: () = {
    assert!(INT_SIZE == 16 && LONG_SIZE == 16 && SINGLE_SIZE == 16 && DOUBLE_SIZE == 16);
    assert!(POINTER_SIZE == 32 && GC_POINTER_SIZE == 16 && ARRAY_HEADER_SIZE == 24);
};

// --- layout --------------------------------------------------------------

/// Total size of the array object at `addr` (header + elements).
#[must_use]
pub fn array_size<T: TypeSizes>(bytes: &[u8], addr: usize, types: &T) -> Option<usize> {
    let (element, count) = read_array_header(bytes, addr);
    let elem_size = types.type_size(element)?;
    Some(ARRAY_HEADER_SIZE + count as usize * elem_size)
}

/// Size of the slot at `addr`, resolved through its tag.
#[must_use]
pub fn slot_size<T: TypeSizes>(bytes: &[u8], addr: usize, types: &T) -> Option<usize> {
    let tag = read_tag(bytes, addr)?;
    match tag.kind() {
        TypeKind::Array => array_size(bytes, addr, types),
        _ => types.type_size(tag),
    }
}

/// Object address of array element `index` given the array's address.
#[must_use]
pub fn array_element_addr(addr: usize, elem_size: usize, index: u64) -> usize {
    addr - ARRAY_HEADER_SIZE - index as usize * elem_size
}

// --- initialization ------------------------------------------------------

/// Default-initialize a structure object at `addr`: zero the payload
/// region, then write the structure's tag and every field tag, descending
/// into nested structures and embedded arrays.
pub fn init_structure<T: TypeSizes>(bytes: &mut [u8], addr: usize, types: &T, code: TypeCode) {
    let Some(info) = types.structure_info(code) else {
        return;
    };
    let size = info.size;
    bytes[addr - size..addr].fill(0);
    init_structure_tags(bytes, addr, types, code);
}

fn init_structure_tags<T: TypeSizes>(bytes: &mut [u8], addr: usize, types: &T, code: TypeCode) {
    let Some(info) = types.structure_info(code) else {
        return;
    };
    write_tag(bytes, addr, code);

    for field in &info.fields {
        let field_addr = addr - field.offset;
        if field.is_array() {
            init_array_tags(bytes, field_addr, types, field.type_code, field.count);
        } else if field.type_code.is_structure() {
            init_structure_tags(bytes, field_addr, types, field.type_code);
        } else {
            write_tag(bytes, field_addr, field.type_code);
        }
    }
}

/// Default-initialize an array object at `addr`: zero the region, write
/// the header and every element's tags.
pub fn init_array<T: TypeSizes>(
    bytes: &mut [u8],
    addr: usize,
    types: &T,
    element: TypeCode,
    count: u64,
) {
    let elem_size = types.type_size(element).unwrap_or(0);
    let size = ARRAY_HEADER_SIZE + count as usize * elem_size;
    bytes[addr - size..addr].fill(0);
    init_array_tags(bytes, addr, types, element, count);
}

fn init_array_tags<T: TypeSizes>(
    bytes: &mut [u8],
    addr: usize,
    types: &T,
    element: TypeCode,
    count: u64,
) {
    let Some(elem_size) = types.type_size(element) else {
        return;
    };
    write_array_header(bytes, addr, element, count);

    for i in 0..count {
        let elem_addr = array_element_addr(addr, elem_size, i);
        if element.is_structure() {
            init_structure_tags(bytes, elem_addr, types, element);
        } else {
            write_tag(bytes, elem_addr, element);
        }
    }
}

// --- pointer-slot traversal (collector support) --------------------------

/// A pointer-bearing slot found inside an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerSlot {
    /// A fat pointer at the given object address.
    Fat(usize),
    /// A gc-pointer at the given object address.
    Gc(usize),
}

/// Visit every pointer-bearing slot inside the object at `addr`,
/// descending into structure fields and array elements.
pub fn for_each_pointer_slot<T: TypeSizes>(
    bytes: &[u8],
    addr: usize,
    types: &T,
    visit: &mut dyn FnMut(PointerSlot),
) {
    let Some(tag) = read_tag(bytes, addr) else {
        return;
    };
    match tag.kind() {
        TypeKind::Pointer => visit(PointerSlot::Fat(addr)),
        TypeKind::GcPointer => visit(PointerSlot::Gc(addr)),
        TypeKind::Structure(_) => {
            let Some(info) = types.structure_info(tag) else {
                return;
            };
            for field in &info.fields {
                for_each_pointer_slot(bytes, addr - field.offset, types, visit);
            }
        }
        TypeKind::Array => {
            let (element, count) = read_array_header(bytes, addr);
            if !matches!(
                element.kind(),
                TypeKind::Pointer | TypeKind::GcPointer | TypeKind::Structure(_)
            ) {
                return;
            }
            let Some(elem_size) = types.type_size(element) else {
                return;
            };
            for i in 0..count {
                for_each_pointer_slot(bytes, array_element_addr(addr, elem_size, i), types, visit);
            }
        }
        _ => {}
    }
}
