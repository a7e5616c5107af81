// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Structure definitions.
//!
//! A structure is a list of fields, each a scalar or embedded array of a
//! fundamental or structure type. Sizes and field offsets are computed once
//! at load time, after the field graph has been checked for cycles.
//!
//! Offsets are measured from the structure's object address (the byte just
//! past its type tag) down to each field's own object address; field 0 sits
//! directly beneath the structure tag.

#[cfg(test)]
mod structure_test;

use core::fmt;

use crate::types::{ARRAY_HEADER_SIZE, TAG_SIZE, TypeCode, pad_size};

/// A single structure field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Element type of the field.
    pub type_code: TypeCode,
    /// Element count: 0 for a scalar field, non-zero for an embedded array.
    pub count: u64,
    /// Distance from the structure's object address down to this field's
    /// object address. Computed at load time.
    pub offset: usize,
}

impl Field {
    /// Whether this field is an embedded array.
    #[must_use]
    pub const fn is_array(&self) -> bool {
        self.count != 0
    }
}

/// A structure definition with computed layout.
#[derive(Debug, Clone, Default)]
pub struct StructureInfo {
    /// The structure's own type code.
    pub type_code: TypeCode,
    /// Fields in declaration order.
    pub fields: Vec<Field>,
    /// Total slot size including the trailing tag, pointer-width padded.
    pub size: usize,
}

/// The structure table of a module.
#[derive(Debug, Clone, Default)]
pub struct Structures {
    structures: Vec<StructureInfo>,
}

/// Error computing a structure table layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructureError {
    /// A field references a type code outside the table.
    UnknownFieldType {
        /// Structure whose field is broken.
        structure: u32,
        /// The unknown code.
        type_code: u32,
    },
    /// The field graph contains a cycle; the path lists the structure
    /// indices along the cycle.
    Cycle(Vec<u32>),
}

impl fmt::Display for StructureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownFieldType {
                structure,
                type_code,
            } => write!(
                f,
                "structure {structure} references unknown type code {type_code}"
            ),
            Self::Cycle(path) => {
                write!(f, "circular reference in the structures (")?;
                for (i, index) in path.iter().enumerate() {
                    if i != 0 {
                        write!(f, "-")?;
                    }
                    write!(f, "[{index}]")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// DFS colors for the cycle check.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    White,
    Gray,
    Black,
}

impl Structures {
    /// Build the table from raw field lists: per structure, a list of
    /// `(type code, count)` pairs. Rejects unknown field types and cycles,
    /// then computes sizes and offsets.
    pub fn build(raw: Vec<Vec<(TypeCode, u64)>>) -> Result<Self, StructureError> {
        let count = raw.len() as u32;

        for (index, fields) in raw.iter().enumerate() {
            for &(type_code, _) in fields {
                let valid = type_code.is_numeric()
                    || matches!(
                        type_code.kind(),
                        crate::types::TypeKind::Pointer | crate::types::TypeKind::GcPointer
                    )
                    || type_code
                        .structure_index()
                        .is_some_and(|target| target < count);
                if !valid {
                    return Err(StructureError::UnknownFieldType {
                        structure: index as u32,
                        type_code: type_code.0,
                    });
                }
            }
        }

        Self::find_cycle(&raw)?;

        let mut sizes = vec![0usize; raw.len()];
        for index in 0..raw.len() {
            Self::calc_size(&raw, &mut sizes, index);
        }

        let structures = raw
            .into_iter()
            .enumerate()
            .map(|(index, fields)| {
                let mut offset = TAG_SIZE;
                let fields = fields
                    .into_iter()
                    .map(|(type_code, count)| {
                        let field = Field {
                            type_code,
                            count,
                            offset,
                        };
                        offset += Self::field_size(&sizes, type_code, count);
                        field
                    })
                    .collect();
                StructureInfo {
                    type_code: TypeCode::structure(index as u32),
                    fields,
                    size: sizes[index],
                }
            })
            .collect();

        Ok(Self { structures })
    }

    /// Number of structures in the table.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.structures.len() as u32
    }

    /// The structure at `index`.
    #[must_use]
    pub fn get(&self, index: u32) -> Option<&StructureInfo> {
        self.structures.get(index as usize)
    }

    /// All structures, in declaration order.
    #[must_use]
    pub fn as_slice(&self) -> &[StructureInfo] {
        &self.structures
    }

    /// Slot size of a field: scalar fields take their type's size, array
    /// fields a header plus `count` elements.
    fn field_size(sizes: &[usize], type_code: TypeCode, count: u64) -> usize {
        let element = type_code
            .fundamental_size()
            .unwrap_or_else(|| sizes[type_code.structure_index().unwrap_or(0) as usize]);
        if count == 0 {
            element
        } else {
            ARRAY_HEADER_SIZE + count as usize * element
        }
    }

    fn calc_size(raw: &[Vec<(TypeCode, u64)>], sizes: &mut [usize], index: usize) -> usize {
        if sizes[index] != 0 {
            return sizes[index];
        }

        let mut size = TAG_SIZE;
        for &(type_code, count) in &raw[index] {
            let element = match type_code.structure_index() {
                Some(target) => Self::calc_size(raw, sizes, target as usize),
                None => type_code.fundamental_size().unwrap_or(0),
            };
            size += if count == 0 {
                element
            } else {
                ARRAY_HEADER_SIZE + count as usize * element
            };
        }

        sizes[index] = pad_size(size);
        sizes[index]
    }

    /// 3-color depth-first search over the field graph.
    fn find_cycle(raw: &[Vec<(TypeCode, u64)>]) -> Result<(), StructureError> {
        let mut marks = vec![Mark::White; raw.len()];
        for start in 0..raw.len() {
            let mut path = Vec::new();
            if Self::visit(raw, &mut marks, &mut path, start) {
                path.reverse();
                return Err(StructureError::Cycle(path));
            }
        }
        Ok(())
    }

    fn visit(
        raw: &[Vec<(TypeCode, u64)>],
        marks: &mut [Mark],
        path: &mut Vec<u32>,
        node: usize,
    ) -> bool {
        match marks[node] {
            Mark::Gray => return true,
            Mark::Black => return false,
            Mark::White => {}
        }

        marks[node] = Mark::Gray;
        for &(type_code, _) in &raw[node] {
            let Some(target) = type_code.structure_index() else {
                continue;
            };
            if Self::visit(raw, marks, path, target as usize) {
                path.push(target);
                return true;
            }
        }
        marks[node] = Mark::Black;
        false
    }
}
