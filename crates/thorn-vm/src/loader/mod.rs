// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The loader: assembles byte files and virtual modules into a program.
//!
//! The v0.4 wire format carries no import section, so byte-file modules
//! acquire dependencies and import mappings through this API. Virtual
//! modules are registered under a path, populated, and linked like any
//! other module.


use core::fmt;

use thorn_bytefile::parser::{ParseError, Parser};

use crate::host::VirtualModule;
use crate::module::{Import, ModuleInfo, ModuleKind};
use crate::program::{LinkError, Program};

/// Loading failure.
#[derive(Debug)]
pub enum LoadError {
    /// Reading the file failed.
    Io(std::io::Error),
    /// The file image is malformed.
    Parse(ParseError),
    /// Linking the module set failed.
    Link(LinkError),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(error) => write!(f, "cannot read byte file: {error}"),
            Self::Parse(error) => write!(f, "cannot parse byte file: {error}"),
            Self::Link(error) => write!(f, "cannot link program: {error}"),
        }
    }
}

impl From<ParseError> for LoadError {
    fn from(error: ParseError) -> Self {
        Self::Parse(error)
    }
}

impl From<LinkError> for LoadError {
    fn from(error: LinkError) -> Self {
        Self::Link(error)
    }
}

/// Collects modules, then links them.
#[derive(Debug, Default)]
pub struct Loader {
    modules: Vec<ModuleInfo>,
}

impl Loader {
    /// Create an empty loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of collected modules.
    #[must_use]
    pub fn module_count(&self) -> u32 {
        self.modules.len() as u32
    }

    /// Parse a byte-file image and add it as a module. Returns the module
    /// index.
    pub fn load_bytes(&mut self, path: impl Into<String>, bytes: &[u8]) -> Result<u32, LoadError> {
        let file = Parser::new(path, bytes).parse()?;
        let index = self.modules.len() as u32;
        tracing::debug!(path = %file.path, index, "loaded module");
        self.modules
            .push(ModuleInfo::new(ModuleKind::ByteFile(file)));
        Ok(index)
    }

    /// Read and parse a byte file from disk. Returns the module index.
    pub fn load_file(&mut self, path: &str) -> Result<u32, LoadError> {
        let bytes = std::fs::read(path).map_err(LoadError::Io)?;
        self.load_bytes(path, &bytes)
    }

    /// Register an empty virtual module under `virtual_path`. Returns the
    /// module index.
    pub fn create(&mut self, virtual_path: impl Into<String>) -> u32 {
        let index = self.modules.len() as u32;
        self.modules.push(ModuleInfo::new(ModuleKind::Virtual(
            VirtualModule::new(virtual_path),
        )));
        index
    }

    /// The virtual module at `index`, for registration.
    pub fn virtual_module_mut(&mut self, index: u32) -> Option<&mut VirtualModule> {
        match &mut self.modules.get_mut(index as usize)?.kind {
            ModuleKind::Virtual(module) => Some(module),
            ModuleKind::ByteFile(_) => None,
        }
    }

    /// Declare that `module` depends on `dependency`. Returns the
    /// dependency-list index used by import declarations.
    pub fn add_dependency(&mut self, module: u32, dependency: u32) -> Option<u32> {
        let info = self.modules.get_mut(module as usize)?;
        let index = info.dependencies.len() as u32;
        info.dependencies.push(dependency);
        Some(index)
    }

    /// Import a structure by name from the given dependency-list entry.
    /// Returns the local structure index the import occupies.
    pub fn import_structure(
        &mut self,
        module: u32,
        dependency: u32,
        name: impl Into<String>,
    ) -> Option<u32> {
        let info = self.modules.get_mut(module as usize)?;
        let local = info.own_structure_count() + info.structure_imports.len() as u32;
        info.structure_imports.push(Import {
            dependency,
            name: name.into(),
        });
        Some(local)
    }

    /// Import a function by name from the given dependency-list entry.
    /// Returns the local function index the import occupies.
    pub fn import_function(
        &mut self,
        module: u32,
        dependency: u32,
        name: impl Into<String>,
    ) -> Option<u32> {
        let info = self.modules.get_mut(module as usize)?;
        let local = info.own_function_count() + info.function_imports.len() as u32;
        info.function_imports.push(Import {
            dependency,
            name: name.into(),
        });
        Some(local)
    }

    /// Link the collected modules into a program whose execution starts
    /// at `entry`'s entry-point stream.
    pub fn build(self, entry: u32) -> Result<Program, LoadError> {
        Ok(Program::link(self.modules, entry)?)
    }
}
