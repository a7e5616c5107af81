// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The Thorn instruction set.
//!
//! Instructions are one opcode byte, followed by a 32-bit little-endian
//! operand for the operand-bearing opcodes (see [`OpCode::has_operand`]).

#[cfg(test)]
mod opcode_test;

use core::fmt;
use num_enum::TryFromPrimitive;

/// Operation codes, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum OpCode {
    /// Do nothing.
    Nop = 0,

    /// Push a constant (operand < pool size) or a default-initialized
    /// structure (operand - pool size).
    Push,
    /// Remove the top value.
    Pop,
    /// Copy local variable `operand` to the top.
    Load,
    /// Store the top into local variable `operand`, or create it.
    Store,
    /// Push a pointer to local variable `operand`.
    Lea,
    /// Replace a structure pointer with a pointer to field `operand`.
    FLea,
    /// Dereference the top pointer and push a copy of the pointee.
    TLoad,
    /// Store the top value through the pointer beneath it.
    TStore,
    /// Duplicate the top value.
    Copy,
    /// Exchange the top two values.
    Swap,
    /// Build an array of element type `operand` in place on the stack.
    APush,
    /// Allocate an unmanaged array of element type `operand`.
    ANew,
    /// Allocate a managed array of element type `operand`.
    AGcNew,
    /// Replace `[array-ptr, index]` with a pointer to that element.
    ALea,
    /// Replace an array pointer with its length as `long`.
    Count,
    /// Push a null pointer.
    Null,
    /// Allocate type `operand` in the unmanaged heap and push a pointer.
    New,
    /// Release the unmanaged allocation referenced by the top pointer.
    Delete,
    /// Push a null gc-pointer.
    GcNull,
    /// Allocate type `operand` in the managed heap and push a gc-pointer.
    GcNew,

    /// Add the top two same-typed values.
    Add,
    /// Subtract the top from the value beneath it.
    Sub,
    /// Unsigned multiply.
    Mul,
    /// Signed multiply.
    IMul,
    /// Unsigned divide.
    Div,
    /// Signed divide.
    IDiv,
    /// Unsigned remainder (`fmod` on floats).
    Mod,
    /// Signed remainder (`fmod` on floats).
    IMod,
    /// Negate the top value in place.
    Neg,
    /// Add one to the fundamental referenced by the top pointer.
    Inc,
    /// Subtract one from the fundamental referenced by the top pointer.
    Dec,

    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise exclusive or.
    Xor,
    /// Bitwise complement of the top value in place.
    Not,
    /// Logical shift left.
    Shl,
    /// Arithmetic shift left.
    Sal,
    /// Logical shift right.
    Shr,
    /// Arithmetic shift right.
    Sar,

    /// Unsigned compare; pushes int 1 / 0 / -1.
    Cmp,
    /// Signed compare; pushes int 1 / 0 / -1.
    ICmp,

    /// Jump to label `operand`.
    Jmp,
    /// Jump if the top value equals zero.
    Je,
    /// Jump if the top value does not equal zero.
    Jne,
    /// Jump if the top value equals one (compare result: greater).
    Ja,
    /// Jump if the top value does not equal minus one (not less).
    Jae,
    /// Jump if the top value equals minus one (compare result: less).
    Jb,
    /// Jump if the top value does not equal one (not greater).
    Jbe,
    /// Call global function `operand`.
    Call,
    /// Return from the current function.
    Ret,

    /// Cast the top value to `int`.
    ToI,
    /// Cast the top value to `long`.
    ToL,
    /// Cast the top value to `single`.
    ToSi,
    /// Cast the top value to `double`.
    ToD,
    /// Reinterpret the top value as a pointer to type `operand`.
    ToP,
}

impl OpCode {
    /// Whether a 32-bit operand follows the opcode byte on the wire.
    #[must_use]
    pub const fn has_operand(self) -> bool {
        matches!(
            self,
            Self::Push
                | Self::Load
                | Self::Store
                | Self::Lea
                | Self::FLea
                | Self::APush
                | Self::ANew
                | Self::AGcNew
                | Self::New
                | Self::GcNew
                | Self::Inc
                | Self::Dec
                | Self::Jmp
                | Self::Je
                | Self::Jne
                | Self::Ja
                | Self::Jae
                | Self::Jb
                | Self::Jbe
                | Self::Call
                | Self::ToP
        )
    }

    /// Assembly mnemonic.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Nop => "nop",
            Self::Push => "push",
            Self::Pop => "pop",
            Self::Load => "load",
            Self::Store => "store",
            Self::Lea => "lea",
            Self::FLea => "flea",
            Self::TLoad => "tload",
            Self::TStore => "tstore",
            Self::Copy => "copy",
            Self::Swap => "swap",
            Self::APush => "apush",
            Self::ANew => "anew",
            Self::AGcNew => "agcnew",
            Self::ALea => "alea",
            Self::Count => "count",
            Self::Null => "null",
            Self::New => "new",
            Self::Delete => "delete",
            Self::GcNull => "gcnull",
            Self::GcNew => "gcnew",
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::IMul => "imul",
            Self::Div => "div",
            Self::IDiv => "idiv",
            Self::Mod => "mod",
            Self::IMod => "imod",
            Self::Neg => "neg",
            Self::Inc => "inc",
            Self::Dec => "dec",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Not => "not",
            Self::Shl => "shl",
            Self::Sal => "sal",
            Self::Shr => "shr",
            Self::Sar => "sar",
            Self::Cmp => "cmp",
            Self::ICmp => "icmp",
            Self::Jmp => "jmp",
            Self::Je => "je",
            Self::Jne => "jne",
            Self::Ja => "ja",
            Self::Jae => "jae",
            Self::Jb => "jb",
            Self::Jbe => "jbe",
            Self::Call => "call",
            Self::Ret => "ret",
            Self::ToI => "toi",
            Self::ToL => "tol",
            Self::ToSi => "tosi",
            Self::ToD => "tod",
            Self::ToP => "top",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
