// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for structure layout and cycle rejection.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{StructureError, Structures};
use crate::types::{ARRAY_HEADER_SIZE, INT_SIZE, LONG_SIZE, TAG_SIZE, TypeCode};

#[test]
fn scalar_layout() {
    // structure0 { int, long }
    let table = Structures::build(vec![vec![(TypeCode::INT, 0), (TypeCode::LONG, 0)]]).unwrap();
    let s = table.get(0).unwrap();

    assert_eq!(s.type_code, TypeCode::structure(0));
    assert_eq!(s.size, TAG_SIZE + INT_SIZE + LONG_SIZE);
    assert_eq!(s.size % TAG_SIZE, 0);

    // Field 0 sits directly beneath the structure tag.
    assert_eq!(s.fields[0].offset, TAG_SIZE);
    assert_eq!(s.fields[1].offset, TAG_SIZE + INT_SIZE);
}

#[test]
fn nested_structure_layout() {
    // structure0 { int, int }, structure1 { structure0, long }
    let table = Structures::build(vec![
        vec![(TypeCode::INT, 0), (TypeCode::INT, 0)],
        vec![(TypeCode::structure(0), 0), (TypeCode::LONG, 0)],
    ])
    .unwrap();

    let inner = table.get(0).unwrap().size;
    let outer = table.get(1).unwrap();
    assert_eq!(inner, TAG_SIZE + 2 * INT_SIZE);
    assert_eq!(outer.size, TAG_SIZE + inner + LONG_SIZE);
    assert_eq!(outer.fields[1].offset, TAG_SIZE + inner);
}

#[test]
fn embedded_array_field() {
    // structure0 { int[4] }
    let table = Structures::build(vec![vec![(TypeCode::INT, 4)]]).unwrap();
    let s = table.get(0).unwrap();

    assert!(s.fields[0].is_array());
    assert_eq!(s.size, TAG_SIZE + ARRAY_HEADER_SIZE + 4 * INT_SIZE);
}

#[test]
fn self_cycle_rejected() {
    let err = Structures::build(vec![vec![(TypeCode::structure(0), 0)]]).unwrap_err();
    assert!(matches!(err, StructureError::Cycle(_)));
}

#[test]
fn mutual_cycle_rejected() {
    let err = Structures::build(vec![
        vec![(TypeCode::structure(1), 0)],
        vec![(TypeCode::structure(0), 0)],
    ])
    .unwrap_err();
    assert!(matches!(err, StructureError::Cycle(_)));
}

#[test]
fn array_field_cycle_rejected() {
    // A cycle through an embedded array is still a cycle.
    let err = Structures::build(vec![vec![(TypeCode::structure(0), 3)]]).unwrap_err();
    assert!(matches!(err, StructureError::Cycle(_)));
}

#[test]
fn unknown_field_type_rejected() {
    let err = Structures::build(vec![vec![(TypeCode::structure(5), 0)]]).unwrap_err();
    assert!(matches!(err, StructureError::UnknownFieldType { .. }));
}

#[test]
fn acyclic_diamond_accepted() {
    // 2 -> {0, 1}, 1 -> 0: shared substructure, no cycle.
    let table = Structures::build(vec![
        vec![(TypeCode::INT, 0)],
        vec![(TypeCode::structure(0), 0)],
        vec![(TypeCode::structure(0), 0), (TypeCode::structure(1), 0)],
    ])
    .unwrap();
    assert_eq!(table.count(), 3);
}
