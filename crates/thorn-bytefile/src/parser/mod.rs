// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The byte-file parser.
//!
//! Wire layout (all integers little-endian):
//!
//! ```text
//! magic "thth" | file version u16 | bytecode version u16
//! constant pool: u32 n, n x u32 | u32 n, n x u64 | u32 n, n x f64
//! structures (file version >= 0.2.0):
//!     u32 count, per structure: u32 field count,
//!     per field: u32 type code, u64 element count (0 = scalar)
//! functions: u32 count, per function: u16 arity, u8 has-result, stream
//! entry point: stream
//!
//! stream: u32 label count, labels as u64 instruction indices,
//!         u64 instruction count, per instruction: u8 opcode
//!         [+ u32 operand when the opcode is operand-bearing]
//! ```
//!
//! Big-endian input is not supported; a file that does not parse as
//! little-endian is malformed.

#[cfg(test)]
mod parser_test;

use core::fmt;

use crate::ByteFile;
use crate::constant_pool::ConstantPool;
use crate::function::Function;
use crate::instruction::{Instruction, Instructions};
use crate::opcode::OpCode;
use crate::structure::{StructureError, Structures};
use crate::types::TypeCode;
use crate::version::{ByteCodeVersion, ByteFileVersion};

/// Magic bytes at the start of every byte file.
pub const MAGIC: [u8; 4] = [0x74, 0x68, 0x74, 0x68];

/// Parse failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The input ended before the expected data.
    UnexpectedEof {
        /// Byte position of the failed read.
        at: usize,
    },
    /// The magic bytes did not match.
    InvalidMagic([u8; 4]),
    /// The file-format version is newer than this implementation.
    IncompatibleFileVersion(ByteFileVersion),
    /// The bytecode version is outside the supported range.
    IncompatibleByteCodeVersion(ByteCodeVersion),
    /// An opcode byte that names no instruction.
    InvalidOpCode {
        /// The raw byte.
        value: u8,
        /// Byte position of the opcode.
        at: usize,
    },
    /// The structure table is malformed (unknown field type or cycle).
    Structure(StructureError),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof { at } => write!(f, "unexpected end of file at byte {at}"),
            Self::InvalidMagic(magic) => write!(f, "invalid magic bytes {magic:02x?}"),
            Self::IncompatibleFileVersion(version) => {
                write!(f, "incompatible byte-file version {version}")
            }
            Self::IncompatibleByteCodeVersion(version) => {
                write!(f, "incompatible bytecode version {version}")
            }
            Self::InvalidOpCode { value, at } => {
                write!(f, "invalid opcode {value:#04x} at byte {at}")
            }
            Self::Structure(error) => error.fmt(f),
        }
    }
}

impl From<StructureError> for ParseError {
    fn from(error: StructureError) -> Self {
        Self::Structure(error)
    }
}

/// Little-endian cursor over a byte-file image.
pub struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
    path: String,
    file_version: ByteFileVersion,
    bytecode_version: ByteCodeVersion,
}

impl<'a> Parser<'a> {
    /// Create a parser over an in-memory file image.
    #[must_use]
    pub fn new(path: impl Into<String>, bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            path: path.into(),
            file_version: ByteFileVersion::LATEST,
            bytecode_version: ByteCodeVersion::LATEST,
        }
    }

    /// Parse the whole file.
    pub fn parse(mut self) -> Result<ByteFile, ParseError> {
        let magic: [u8; 4] = self.read_array()?;
        if magic != MAGIC {
            return Err(ParseError::InvalidMagic(magic));
        }

        self.file_version = ByteFileVersion(self.read_u16()?);
        self.bytecode_version = ByteCodeVersion(self.read_u16()?);

        if self.file_version > ByteFileVersion::LATEST {
            return Err(ParseError::IncompatibleFileVersion(self.file_version));
        }
        if self.bytecode_version > ByteCodeVersion::LATEST
            || self.bytecode_version < ByteCodeVersion::LEAST
        {
            return Err(ParseError::IncompatibleByteCodeVersion(
                self.bytecode_version,
            ));
        }

        let constant_pool = self.parse_constant_pool()?;
        let structures = if self.file_version.has_structures() {
            self.parse_structures()?
        } else {
            Structures::default()
        };
        let functions = self.parse_functions()?;
        let entry_point = self.parse_instructions()?;

        tracing::debug!(
            path = %self.path,
            constants = constant_pool.total_count(),
            structures = structures.count(),
            functions = functions.len(),
            "parsed byte file"
        );

        Ok(ByteFile {
            path: self.path,
            constant_pool,
            structures,
            functions,
            entry_point,
        })
    }

    fn parse_constant_pool(&mut self) -> Result<ConstantPool, ParseError> {
        let int_count = self.read_u32()? as usize;
        let mut ints = Vec::with_capacity(int_count.min(self.remaining() / 4));
        for _ in 0..int_count {
            ints.push(self.read_u32()?);
        }

        let long_count = self.read_u32()? as usize;
        let mut longs = Vec::with_capacity(long_count.min(self.remaining() / 8));
        for _ in 0..long_count {
            longs.push(self.read_u64()?);
        }

        let double_count = self.read_u32()? as usize;
        let mut doubles = Vec::with_capacity(double_count.min(self.remaining() / 8));
        for _ in 0..double_count {
            doubles.push(f64::from_bits(self.read_u64()?));
        }

        Ok(ConstantPool::new(ints, longs, doubles))
    }

    fn parse_structures(&mut self) -> Result<Structures, ParseError> {
        let struct_count = self.read_u32()? as usize;
        let mut raw = Vec::with_capacity(struct_count.min(self.remaining() / 4));

        for _ in 0..struct_count {
            let field_count = self.read_u32()? as usize;
            let mut fields = Vec::with_capacity(field_count.min(self.remaining() / 12));
            for _ in 0..field_count {
                let type_code = TypeCode(self.read_u32()?);
                let count = self.read_u64()?;
                fields.push((type_code, count));
            }
            raw.push(fields);
        }

        Ok(Structures::build(raw)?)
    }

    fn parse_functions(&mut self) -> Result<Vec<Function>, ParseError> {
        let func_count = self.read_u32()? as usize;
        let mut functions = Vec::with_capacity(func_count.min(self.remaining() / 3));

        for _ in 0..func_count {
            let arity = self.read_u16()?;
            let has_result = self.read_u8()? != 0;
            let instructions = self.parse_instructions()?;
            functions.push(Function::new(arity, has_result, instructions));
        }

        Ok(functions)
    }

    fn parse_instructions(&mut self) -> Result<Instructions, ParseError> {
        let label_count = self.read_u32()? as usize;
        let mut labels = Vec::with_capacity(label_count.min(self.remaining() / 8));
        for _ in 0..label_count {
            labels.push(self.read_u64()?);
        }

        let inst_count = self.read_u64()? as usize;
        let mut instructions = Vec::with_capacity(inst_count.min(self.remaining()));

        let mut offset = 0u64;
        for _ in 0..inst_count {
            let at = self.pos;
            let raw = self.read_u8()?;
            let opcode =
                OpCode::try_from(raw).map_err(|_| ParseError::InvalidOpCode { value: raw, at })?;

            let mut operand = 0;
            let mut width = 1;
            if opcode.has_operand() {
                operand = self.read_u32()?;
                width += 4;
            }

            instructions.push(Instruction::new(opcode, operand, offset));
            offset += width;
        }

        Ok(Instructions::new(labels, instructions))
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn read_u8(&mut self) -> Result<u8, ParseError> {
        let [byte] = self.read_array()?;
        Ok(byte)
    }

    fn read_u16(&mut self) -> Result<u16, ParseError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    fn read_u32(&mut self) -> Result<u32, ParseError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    fn read_u64(&mut self) -> Result<u64, ParseError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ParseError> {
        let end = self
            .pos
            .checked_add(N)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(ParseError::UnexpectedEof { at: self.pos })?;

        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[self.pos..end]);
        self.pos = end;
        Ok(out)
    }
}
