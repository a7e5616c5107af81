// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for the opcode table.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::OpCode;

#[test]
fn roundtrip_through_wire_byte() {
    for byte in 0..=u8::MAX {
        if let Ok(opcode) = OpCode::try_from(byte) {
            assert_eq!(opcode as u8, byte);
        }
    }
}

#[test]
fn last_opcode_decodes() {
    assert_eq!(OpCode::try_from(OpCode::ToP as u8).unwrap(), OpCode::ToP);
    assert!(OpCode::try_from(OpCode::ToP as u8 + 1).is_err());
}

#[test]
fn operand_bearing_set() {
    assert!(OpCode::Push.has_operand());
    assert!(OpCode::Load.has_operand());
    assert!(OpCode::Store.has_operand());
    assert!(OpCode::Lea.has_operand());
    assert!(OpCode::FLea.has_operand());
    assert!(OpCode::New.has_operand());
    assert!(OpCode::GcNew.has_operand());
    assert!(OpCode::ANew.has_operand());
    assert!(OpCode::AGcNew.has_operand());
    assert!(OpCode::APush.has_operand());
    assert!(OpCode::Inc.has_operand());
    assert!(OpCode::Dec.has_operand());
    assert!(OpCode::Jmp.has_operand());
    assert!(OpCode::Call.has_operand());
    assert!(OpCode::ToP.has_operand());

    assert!(!OpCode::Pop.has_operand());
    assert!(!OpCode::TLoad.has_operand());
    assert!(!OpCode::TStore.has_operand());
    assert!(!OpCode::Add.has_operand());
    assert!(!OpCode::Ret.has_operand());
    assert!(!OpCode::ALea.has_operand());
    assert!(!OpCode::Delete.has_operand());
    assert!(!OpCode::ToI.has_operand());
}

#[test]
fn mnemonics_are_lowercase() {
    for byte in 0..=u8::MAX {
        let Ok(opcode) = OpCode::try_from(byte) else {
            continue;
        };
        let mnemonic = opcode.mnemonic();
        assert!(!mnemonic.is_empty());
        assert!(mnemonic.chars().all(|c| c.is_ascii_lowercase()));
    }
}
