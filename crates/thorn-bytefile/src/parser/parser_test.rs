// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for the byte-file parser.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use proptest::prelude::*;

use super::{MAGIC, ParseError, Parser};
use crate::opcode::OpCode;
use crate::types::TypeCode;
use crate::version::{ByteCodeVersion, ByteFileVersion};

/// Test-side byte-file writer.
struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    fn new(file_version: ByteFileVersion, bytecode_version: ByteCodeVersion) -> Self {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC);
        bytes.extend_from_slice(&file_version.0.to_le_bytes());
        bytes.extend_from_slice(&bytecode_version.0.to_le_bytes());
        Self { bytes }
    }

    fn u8(&mut self, value: u8) -> &mut Self {
        self.bytes.push(value);
        self
    }

    fn u16(&mut self, value: u16) -> &mut Self {
        self.bytes.extend_from_slice(&value.to_le_bytes());
        self
    }

    fn u32(&mut self, value: u32) -> &mut Self {
        self.bytes.extend_from_slice(&value.to_le_bytes());
        self
    }

    fn u64(&mut self, value: u64) -> &mut Self {
        self.bytes.extend_from_slice(&value.to_le_bytes());
        self
    }

    fn constant_pool(&mut self, ints: &[u32], longs: &[u64], doubles: &[f64]) -> &mut Self {
        self.u32(ints.len() as u32);
        for &v in ints {
            self.u32(v);
        }
        self.u32(longs.len() as u32);
        for &v in longs {
            self.u64(v);
        }
        self.u32(doubles.len() as u32);
        for &v in doubles {
            self.u64(v.to_bits());
        }
        self
    }

    fn structures(&mut self, structures: &[&[(u32, u64)]]) -> &mut Self {
        self.u32(structures.len() as u32);
        for fields in structures {
            self.u32(fields.len() as u32);
            for &(code, count) in *fields {
                self.u32(code).u64(count);
            }
        }
        self
    }

    fn stream(&mut self, labels: &[u64], instructions: &[(OpCode, u32)]) -> &mut Self {
        self.u32(labels.len() as u32);
        for &label in labels {
            self.u64(label);
        }
        self.u64(instructions.len() as u64);
        for &(opcode, operand) in instructions {
            self.u8(opcode as u8);
            if opcode.has_operand() {
                self.u32(operand);
            }
        }
        self
    }
}

fn minimal_file(instructions: &[(OpCode, u32)]) -> Vec<u8> {
    let mut w = Writer::new(ByteFileVersion::LATEST, ByteCodeVersion::LATEST);
    w.constant_pool(&[7, 5], &[], &[])
        .structures(&[])
        .u32(0) // function count
        .stream(&[], instructions);
    w.bytes
}

#[test]
fn parses_minimal_file() {
    let bytes = minimal_file(&[(OpCode::Push, 0), (OpCode::Push, 1), (OpCode::Add, 0)]);
    let file = Parser::new("test.tbc", &bytes).parse().unwrap();

    assert_eq!(file.path, "test.tbc");
    assert_eq!(file.constant_pool.int_count(), 2);
    assert_eq!(file.entry_point.instruction_count(), 3);
    assert_eq!(
        file.entry_point.instruction(2).unwrap().opcode,
        OpCode::Add
    );
}

#[test]
fn instruction_offsets_count_operand_bytes() {
    let bytes = minimal_file(&[(OpCode::Push, 0), (OpCode::Pop, 0), (OpCode::Push, 1)]);
    let file = Parser::new("test.tbc", &bytes).parse().unwrap();

    let stream = &file.entry_point;
    assert_eq!(stream.instruction(0).unwrap().offset, 0);
    assert_eq!(stream.instruction(1).unwrap().offset, 5); // push + operand
    assert_eq!(stream.instruction(2).unwrap().offset, 6); // + pop
}

#[test]
fn rejects_bad_magic() {
    let mut bytes = minimal_file(&[]);
    bytes[0] = 0x00;
    let err = Parser::new("bad.tbc", &bytes).parse().unwrap_err();
    assert!(matches!(err, ParseError::InvalidMagic(_)));
}

#[test]
fn rejects_future_file_version() {
    let mut w = Writer::new(
        ByteFileVersion(ByteFileVersion::LATEST.0 + 1),
        ByteCodeVersion::LATEST,
    );
    w.constant_pool(&[], &[], &[]);
    let err = Parser::new("bad.tbc", &w.bytes).parse().unwrap_err();
    assert!(matches!(err, ParseError::IncompatibleFileVersion(_)));
}

#[test]
fn rejects_future_bytecode_version() {
    let w = Writer::new(
        ByteFileVersion::LATEST,
        ByteCodeVersion(ByteCodeVersion::LATEST.0 + 1),
    );
    let err = Parser::new("bad.tbc", &w.bytes).parse().unwrap_err();
    assert!(matches!(err, ParseError::IncompatibleByteCodeVersion(_)));
}

#[test]
fn rejects_truncated_file() {
    let bytes = minimal_file(&[(OpCode::Push, 0)]);
    let err = Parser::new("bad.tbc", &bytes[..bytes.len() - 2])
        .parse()
        .unwrap_err();
    assert!(matches!(err, ParseError::UnexpectedEof { .. }));
}

#[test]
fn rejects_unknown_opcode() {
    let mut bytes = minimal_file(&[(OpCode::Ret, 0)]);
    let at = bytes.len() - 1;
    bytes[at] = 0xEE;
    let err = Parser::new("bad.tbc", &bytes).parse().unwrap_err();
    assert!(matches!(err, ParseError::InvalidOpCode { value: 0xEE, .. }));
}

#[test]
fn rejects_structure_cycle_before_any_execution() {
    let mut w = Writer::new(ByteFileVersion::LATEST, ByteCodeVersion::LATEST);
    w.constant_pool(&[], &[], &[])
        .structures(&[
            &[(TypeCode::structure(1).0, 0)],
            &[(TypeCode::structure(0).0, 0)],
        ])
        .u32(0)
        .stream(&[], &[]);
    let err = Parser::new("cycle.tbc", &w.bytes).parse().unwrap_err();
    assert!(matches!(err, ParseError::Structure(_)));
}

#[test]
fn parses_functions_and_labels() {
    let mut w = Writer::new(ByteFileVersion::LATEST, ByteCodeVersion::LATEST);
    w.constant_pool(&[1], &[], &[]).structures(&[]).u32(1);
    // function 0: arity 1, has result
    w.u16(1).u8(1).stream(&[0, 2], &[
        (OpCode::Load, 0),
        (OpCode::Ret, 0),
        (OpCode::Jmp, 0),
    ]);
    w.stream(&[], &[(OpCode::Push, 0), (OpCode::Call, 0), (OpCode::Ret, 0)]);

    let file = Parser::new("func.tbc", &w.bytes).parse().unwrap();
    assert_eq!(file.functions.len(), 1);
    let function = &file.functions[0];
    assert_eq!(function.arity, 1);
    assert!(function.has_result);
    assert_eq!(function.instructions.label(1), Some(2));
    assert_eq!(file.entry_point.instruction_count(), 3);
}

#[test]
fn structure_table_absent_before_v0_2_0() {
    let mut w = Writer::new(ByteFileVersion::V0_1_0, ByteCodeVersion::LEAST);
    w.constant_pool(&[], &[], &[]).u32(0).stream(&[], &[]);
    let file = Parser::new("old.tbc", &w.bytes).parse().unwrap();
    assert_eq!(file.structure_count(), 0);
}

proptest! {
    #[test]
    fn wire_roundtrip(ops in proptest::collection::vec((0u8..=OpCode::ToP as u8, any::<u32>()), 0..64)) {
        let instructions: Vec<(OpCode, u32)> = ops
            .into_iter()
            .map(|(byte, operand)| (OpCode::try_from(byte).unwrap(), operand))
            .collect();

        let bytes = minimal_file(&instructions);
        let file = Parser::new("prop.tbc", &bytes).parse().unwrap();

        prop_assert_eq!(file.entry_point.instruction_count(), instructions.len() as u64);
        for (i, &(opcode, operand)) in instructions.iter().enumerate() {
            let parsed = file.entry_point.instruction(i as u64).unwrap();
            prop_assert_eq!(parsed.opcode, opcode);
            if opcode.has_operand() {
                prop_assert_eq!(parsed.operand, operand);
            }
        }
    }
}
