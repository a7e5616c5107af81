// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for slot coding and object traversal.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use thorn_bytefile::structure::{StructureInfo, Structures};
use thorn_bytefile::types::{
    ARRAY_HEADER_SIZE, INT_SIZE, POINTER_SIZE, TAG_SIZE, TypeCode,
};

use super::{
    FrameRecord, PointerSlot, RawPointer, TypeSizes, Value, array_element_addr, array_size,
    for_each_pointer_slot, init_array, init_structure, read_array_header, read_frame,
    read_gc_pointer, read_pointer, read_tag, read_value, slot_size, write_frame, write_gc_pointer,
    write_pointer, write_value,
};
use crate::mem::MemAddr;

/// A structure table standing in for a linked program.
struct Fixture {
    structures: Structures,
}

impl Fixture {
    fn new(raw: Vec<Vec<(TypeCode, u64)>>) -> Self {
        Self {
            structures: Structures::build(raw).unwrap(),
        }
    }
}

impl TypeSizes for Fixture {
    fn type_size(&self, code: TypeCode) -> Option<usize> {
        match code.fundamental_size() {
            Some(size) => Some(size),
            None => self.structure_info(code).map(|info| info.size),
        }
    }

    fn structure_info(&self, code: TypeCode) -> Option<&StructureInfo> {
        self.structures.get(code.structure_index()?)
    }
}

#[test]
fn value_roundtrip() {
    let mut bytes = vec![0u8; 64];
    write_value(&mut bytes, 16, Value::Int(0x1234));
    assert_eq!(read_tag(&bytes, 16), Some(TypeCode::INT));
    assert_eq!(read_value(&bytes, 16), Some(Value::Int(0x1234)));

    write_value(&mut bytes, 32, Value::Double(2.5));
    assert_eq!(read_value(&bytes, 32), Some(Value::Double(2.5)));
}

#[test]
fn pointer_roundtrip() {
    let mut bytes = vec![0u8; 64];
    let pointer = RawPointer {
        type_code: TypeCode::INT,
        count: 4,
        addr: MemAddr::unmanaged(3, 0x40),
    };
    write_pointer(&mut bytes, 32, pointer);
    assert_eq!(read_tag(&bytes, 32), Some(TypeCode::POINTER));
    assert_eq!(read_pointer(&bytes, 32), pointer);
}

#[test]
fn gc_pointer_roundtrip() {
    let mut bytes = vec![0u8; 32];
    let target = MemAddr::managed(7, 0x80);
    write_gc_pointer(&mut bytes, 16, target);
    assert_eq!(read_tag(&bytes, 16), Some(TypeCode::GC_POINTER));
    assert_eq!(read_gc_pointer(&bytes, 16), target);
}

#[test]
fn frame_roundtrip() {
    let mut bytes = vec![0u8; 64];
    let frame = FrameRecord {
        caller: 17,
        stack_begin: 0x100,
        variable_begin: 3,
        function: 0x1_0000_0002,
        module: 1,
    };
    write_frame(&mut bytes, 48, &frame);
    assert_eq!(read_tag(&bytes, 48), Some(TypeCode::NONE));
    assert_eq!(read_frame(&bytes, 48), frame);
}

#[test]
fn tag_reads_are_bounds_checked() {
    let bytes = vec![0u8; 16];
    assert!(read_tag(&bytes, 4).is_none());
    assert!(read_tag(&bytes, 24).is_none());
    assert!(read_tag(&bytes, 16).is_some());
}

#[test]
fn structure_init_writes_nested_tags() {
    // structure0 { int, int }, structure1 { structure0, long }
    let fixture = Fixture::new(vec![
        vec![(TypeCode::INT, 0), (TypeCode::INT, 0)],
        vec![(TypeCode::structure(0), 0), (TypeCode::LONG, 0)],
    ]);
    let outer = TypeCode::structure(1);
    let size = fixture.type_size(outer).unwrap();

    let mut bytes = vec![0xAAu8; size + 16];
    let addr = size + 8;
    init_structure(&mut bytes, addr, &fixture, outer);

    assert_eq!(read_tag(&bytes, addr), Some(outer));
    let info = fixture.structure_info(outer).unwrap();
    let inner_addr = addr - info.fields[0].offset;
    assert_eq!(read_tag(&bytes, inner_addr), Some(TypeCode::structure(0)));
    let long_addr = addr - info.fields[1].offset;
    assert_eq!(read_tag(&bytes, long_addr), Some(TypeCode::LONG));

    // Payloads are zeroed.
    assert_eq!(read_value(&bytes, long_addr), Some(Value::Long(0)));
}

#[test]
fn array_init_and_element_addresses() {
    let fixture = Fixture::new(vec![]);
    let count = 3u64;
    let total = ARRAY_HEADER_SIZE + count as usize * INT_SIZE;
    let mut bytes = vec![0xAAu8; total + 8];
    let addr = total;

    init_array(&mut bytes, addr, &fixture, TypeCode::INT, count);

    assert_eq!(read_tag(&bytes, addr), Some(TypeCode::ARRAY));
    assert_eq!(read_array_header(&bytes, addr), (TypeCode::INT, count));
    assert_eq!(array_size(&bytes, addr, &fixture), Some(total));

    for i in 0..count {
        let elem = array_element_addr(addr, INT_SIZE, i);
        assert_eq!(read_tag(&bytes, elem), Some(TypeCode::INT));
        assert_eq!(read_value(&bytes, elem), Some(Value::Int(0)));
    }
}

#[test]
fn slot_size_resolves_through_tags() {
    let fixture = Fixture::new(vec![vec![(TypeCode::INT, 0)]]);
    let mut bytes = vec![0u8; 128];

    write_value(&mut bytes, 16, Value::Int(0));
    assert_eq!(slot_size(&bytes, 16, &fixture), Some(INT_SIZE));

    write_pointer(&mut bytes, 64, RawPointer::NULL);
    assert_eq!(slot_size(&bytes, 64, &fixture), Some(POINTER_SIZE));

    let struct_size = TAG_SIZE + INT_SIZE;
    init_structure(&mut bytes, 96, &fixture, TypeCode::structure(0));
    assert_eq!(slot_size(&bytes, 96, &fixture), Some(struct_size));
}

#[test]
fn pointer_traversal_descends_into_structures_and_arrays() {
    // structure0 { gc-pointer, pointer }
    let fixture = Fixture::new(vec![vec![
        (TypeCode::GC_POINTER, 0),
        (TypeCode::POINTER, 0),
    ]]);
    let code = TypeCode::structure(0);
    let size = fixture.type_size(code).unwrap();

    // An array of two such structures.
    let count = 2u64;
    let total = ARRAY_HEADER_SIZE + count as usize * size;
    let mut bytes = vec![0u8; total];
    init_array(&mut bytes, total, &fixture, code, count);

    let mut found = Vec::new();
    for_each_pointer_slot(&bytes, total, &fixture, &mut |slot| found.push(slot));

    let gc = found
        .iter()
        .filter(|slot| matches!(slot, PointerSlot::Gc(_)))
        .count();
    let fat = found
        .iter()
        .filter(|slot| matches!(slot, PointerSlot::Fat(_)))
        .count();
    assert_eq!(gc, 2);
    assert_eq!(fat, 2);
}

#[test]
fn numeric_array_traversal_finds_nothing() {
    let fixture = Fixture::new(vec![]);
    let total = ARRAY_HEADER_SIZE + 4 * INT_SIZE;
    let mut bytes = vec![0u8; total];
    init_array(&mut bytes, total, &fixture, TypeCode::INT, 4);

    let mut found = Vec::new();
    for_each_pointer_slot(&bytes, total, &fixture, &mut |slot| found.push(slot));
    assert!(found.is_empty());
}
