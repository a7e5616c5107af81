// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Byte-file and bytecode version numbers.
//!
//! Both versions are u16 sequence numbers on the wire. The structure table
//! only exists in files of version 0.2.0 or newer.

use core::fmt;

/// File-format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ByteFileVersion(pub u16);

impl ByteFileVersion {
    /// 0.1.0 - constant pool, functions, entry point.
    pub const V0_1_0: Self = Self(0);
    /// 0.2.0 - adds the structure table.
    pub const V0_2_0: Self = Self(1);
    /// 0.3.0 - pointer types in structure fields.
    pub const V0_3_0: Self = Self(2);
    /// 0.4.0 - embedded array fields.
    pub const V0_4_0: Self = Self(3);
    /// Newest version this implementation writes and reads.
    pub const LATEST: Self = Self::V0_4_0;

    /// Whether files of this version carry a structure table.
    #[must_use]
    pub fn has_structures(self) -> bool {
        self >= Self::V0_2_0
    }
}

impl fmt::Display for ByteFileVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::V0_1_0 => write!(f, "0.1.0"),
            Self::V0_2_0 => write!(f, "0.2.0"),
            Self::V0_3_0 => write!(f, "0.3.0"),
            Self::V0_4_0 => write!(f, "0.4.0"),
            Self(n) => write!(f, "unknown({n})"),
        }
    }
}

/// Bytecode version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ByteCodeVersion(pub u16);

impl ByteCodeVersion {
    /// Oldest bytecode this implementation still executes.
    pub const LEAST: Self = Self(0);
    /// Newest bytecode this implementation executes.
    pub const LATEST: Self = Self(3);
}

impl fmt::Display for ByteCodeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
