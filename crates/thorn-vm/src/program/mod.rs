// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The resolved program.
//!
//! Linking flattens a module set into global index spaces: structure type
//! codes start at the fundamental-type count and grow by per-module bases
//! assigned in dependency order; function indices likewise. Import mapping
//! entries are rewritten to absolute global indices. A cycle in the module
//! dependency graph is rejected.


use std::rc::Rc;

use core::fmt;

use thorn_bytefile::constant_pool::ConstantPool;
use thorn_bytefile::instruction::Instructions;
use thorn_bytefile::structure::{StructureError, StructureInfo, Structures};
use thorn_bytefile::types::TypeCode;

use crate::host::VirtualFn;
use crate::module::{Import, ModuleInfo, ModuleKind};
use crate::object::TypeSizes;

/// Linking failure.
#[derive(Debug)]
pub enum LinkError {
    /// The entry module index is out of range.
    UnknownModule(u32),
    /// A dependency index names no module.
    UnknownDependency {
        /// Module carrying the bad edge.
        module: u32,
        /// The out-of-range module index.
        dependency: u32,
    },
    /// The module dependency graph contains a cycle.
    DependencyCycle(Vec<String>),
    /// An import names no export of its dependency.
    UnknownSymbol {
        /// Importing module path.
        module: String,
        /// The unresolved name.
        name: String,
    },
    /// An import entry's dependency index is outside the dependency list.
    BadImport {
        /// Importing module path.
        module: String,
        /// The out-of-range dependency-list index.
        dependency: u32,
    },
    /// A virtual module's structure table is malformed.
    Structure(StructureError),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownModule(index) => write!(f, "module {index} does not exist"),
            Self::UnknownDependency { module, dependency } => {
                write!(f, "module {module} depends on unknown module {dependency}")
            }
            Self::DependencyCycle(path) => {
                write!(f, "circular module dependencies ({})", path.join(" -> "))
            }
            Self::UnknownSymbol { module, name } => {
                write!(f, "module {module} imports unknown symbol '{name}'")
            }
            Self::BadImport { module, dependency } => {
                write!(f, "module {module} has an import on dependency {dependency}")
            }
            Self::Structure(error) => error.fmt(f),
        }
    }
}

impl From<StructureError> for LinkError {
    fn from(error: StructureError) -> Self {
        Self::Structure(error)
    }
}

/// A function body after linking.
pub enum FunctionBody {
    /// Bytecode with its instruction stream.
    Bytecode(Instructions),
    /// A host callable.
    Virtual(Rc<dyn VirtualFn>),
}

impl fmt::Debug for FunctionBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytecode(instructions) => f
                .debug_tuple("Bytecode")
                .field(&instructions.instruction_count())
                .finish(),
            Self::Virtual(_) => f.write_str("Virtual"),
        }
    }
}

/// A function in the global index space.
#[derive(Debug)]
pub struct FunctionDecl {
    /// Owning module index.
    pub module: u32,
    /// Number of parameters.
    pub arity: u16,
    /// Whether the function leaves a result.
    pub has_result: bool,
    /// The body.
    pub body: FunctionBody,
}

/// Per-module state surviving into the program.
#[derive(Debug)]
pub struct ResolvedModule {
    /// Load path, for diagnostics.
    pub path: String,
    /// The module's constant pool (empty for virtual modules).
    pub constant_pool: ConstantPool,
    /// Local structure operand -> global structure index.
    pub structure_map: Vec<u32>,
    /// Local function operand -> global function index.
    pub function_map: Vec<u32>,
    /// Entry-point stream (byte files only).
    pub entry_point: Option<Instructions>,
}

/// The resolved closure of modules: flat global index spaces for types
/// and functions.
#[derive(Debug, Default)]
pub struct Program {
    modules: Vec<ResolvedModule>,
    structures: Vec<StructureInfo>,
    functions: Vec<FunctionDecl>,
    entry_module: u32,
}

impl Program {
    /// Link a module set into a program. `entry` designates the module
    /// whose entry-point stream the interpreter starts in.
    pub fn link(module_set: Vec<ModuleInfo>, entry: u32) -> Result<Self, LinkError> {
        if entry as usize >= module_set.len() {
            return Err(LinkError::UnknownModule(entry));
        }

        let order = topo_order(&module_set)?;

        // Assign global bases in dependency order.
        let mut structure_base = vec![0u32; module_set.len()];
        let mut function_base = vec![0u32; module_set.len()];
        let mut next_structure = 0u32;
        let mut next_function = 0u32;
        for &m in &order {
            structure_base[m as usize] = next_structure;
            function_base[m as usize] = next_function;
            next_structure += module_set[m as usize].own_structure_count();
            next_function += module_set[m as usize].own_function_count();
        }

        let mut program = Self {
            modules: Vec::new(),
            structures: (0..next_structure as usize)
                .map(|_| StructureInfo::default())
                .collect(),
            functions: Vec::new(),
            entry_module: entry,
        };
        let mut functions: Vec<Option<FunctionDecl>> = Vec::new();
        functions.resize_with(next_function as usize, || None);
        program.modules.reserve(module_set.len());

        let mut resolved: Vec<Option<ResolvedModule>> = Vec::new();
        resolved.resize_with(module_set.len(), || None);

        for &m in &order {
            let info = &module_set[m as usize];
            let own_structures = info.own_structure_count();
            let own_functions = info.own_function_count();

            let mut structure_map: Vec<u32> = (0..own_structures)
                .map(|i| structure_base[m as usize] + i)
                .collect();
            for import in &info.structure_imports {
                structure_map.push(resolve_import(
                    &module_set,
                    &structure_base,
                    info,
                    import,
                    ImportKind::Structure,
                )?);
            }

            let mut function_map: Vec<u32> = (0..own_functions)
                .map(|i| function_base[m as usize] + i)
                .collect();
            for import in &info.function_imports {
                function_map.push(resolve_import(
                    &module_set,
                    &function_base,
                    info,
                    import,
                    ImportKind::Function,
                )?);
            }

            resolved[m as usize] = Some(ResolvedModule {
                path: info.path().to_string(),
                constant_pool: ConstantPool::default(),
                structure_map,
                function_map,
                entry_point: None,
            });
        }

        // Move module contents into the global tables.
        for (m, info) in module_set.into_iter().enumerate() {
            let base = structure_base[m] as usize;
            let module = resolved[m].as_mut().expect("module resolved above");

            match info.kind {
                ModuleKind::ByteFile(file) => {
                    install_structures(
                        &mut program.structures,
                        base,
                        file.structures.as_slice(),
                        &module.structure_map,
                    );
                    for (i, function) in file.functions.into_iter().enumerate() {
                        functions[function_base[m] as usize + i] = Some(FunctionDecl {
                            module: m as u32,
                            arity: function.arity,
                            has_result: function.has_result,
                            body: FunctionBody::Bytecode(function.instructions),
                        });
                    }
                    module.constant_pool = file.constant_pool;
                    module.entry_point = Some(file.entry_point);
                }
                ModuleKind::Virtual(virtual_module) => {
                    let built = Structures::build(virtual_module.raw_structures())?;
                    install_structures(
                        &mut program.structures,
                        base,
                        built.as_slice(),
                        &module.structure_map,
                    );
                    for (i, function) in virtual_module.functions().iter().enumerate() {
                        functions[function_base[m] as usize + i] = Some(FunctionDecl {
                            module: m as u32,
                            arity: function.arity,
                            has_result: function.has_result,
                            body: FunctionBody::Virtual(Rc::clone(&function.callable)),
                        });
                    }
                }
            }
        }

        program.modules = resolved
            .into_iter()
            .map(|module| module.expect("every module resolved"))
            .collect();
        program.functions = functions
            .into_iter()
            .map(|function| function.expect("every function installed"))
            .collect();

        tracing::debug!(
            modules = program.modules.len(),
            structures = program.structures.len(),
            functions = program.functions.len(),
            "linked program"
        );
        Ok(program)
    }

    /// Entry module index.
    #[must_use]
    pub const fn entry_module(&self) -> u32 {
        self.entry_module
    }

    /// Entry-point stream of the given module.
    #[must_use]
    pub fn entry_point(&self, module: u32) -> Option<&Instructions> {
        self.modules.get(module as usize)?.entry_point.as_ref()
    }

    /// Per-module state.
    #[must_use]
    pub fn module(&self, module: u32) -> Option<&ResolvedModule> {
        self.modules.get(module as usize)
    }

    /// Total number of structures.
    #[must_use]
    pub fn structure_count(&self) -> u32 {
        self.structures.len() as u32
    }

    /// The structure with global type `code`.
    #[must_use]
    pub fn structure(&self, code: TypeCode) -> Option<&StructureInfo> {
        self.structures.get(code.structure_index()? as usize)
    }

    /// Total number of functions.
    #[must_use]
    pub fn function_count(&self) -> u32 {
        self.functions.len() as u32
    }

    /// The function with the given global index.
    #[must_use]
    pub fn function(&self, index: u32) -> Option<&FunctionDecl> {
        self.functions.get(index as usize)
    }

    /// Translate a type-code operand of `module` into the global space.
    #[must_use]
    pub fn resolve_type(&self, module: u32, code: TypeCode) -> Option<TypeCode> {
        match code.structure_index() {
            None => Some(code),
            Some(local) => {
                let map = &self.modules.get(module as usize)?.structure_map;
                map.get(local as usize)
                    .map(|&global| TypeCode::structure(global))
            }
        }
    }

    /// Translate a function-index operand of `module` into the global
    /// space.
    #[must_use]
    pub fn resolve_function(&self, module: u32, index: u32) -> Option<u32> {
        self.modules
            .get(module as usize)?
            .function_map
            .get(index as usize)
            .copied()
    }
}

impl TypeSizes for Program {
    fn type_size(&self, code: TypeCode) -> Option<usize> {
        match code.fundamental_size() {
            Some(size) => Some(size),
            None => self.structure(code).map(|info| info.size),
        }
    }

    fn structure_info(&self, code: TypeCode) -> Option<&StructureInfo> {
        self.structure(code)
    }
}

enum ImportKind {
    Structure,
    Function,
}

fn resolve_import(
    module_set: &[ModuleInfo],
    bases: &[u32],
    info: &ModuleInfo,
    import: &Import,
    kind: ImportKind,
) -> Result<u32, LinkError> {
    let Some(&target) = info.dependencies.get(import.dependency as usize) else {
        return Err(LinkError::BadImport {
            module: info.path().to_string(),
            dependency: import.dependency,
        });
    };

    let local = match &module_set[target as usize].kind {
        ModuleKind::Virtual(module) => match kind {
            ImportKind::Structure => module.structure_index(&import.name),
            ImportKind::Function => module.function_index(&import.name),
        },
        // Byte files export nothing by name.
        ModuleKind::ByteFile(_) => None,
    };

    local
        .map(|local| bases[target as usize] + local)
        .ok_or_else(|| LinkError::UnknownSymbol {
            module: info.path().to_string(),
            name: import.name.clone(),
        })
}

/// Copy a module's structures into the global table, rewriting field type
/// codes through the module's structure map.
fn install_structures(
    global: &mut [StructureInfo],
    base: usize,
    structures: &[StructureInfo],
    structure_map: &[u32],
) {
    for (i, info) in structures.iter().enumerate() {
        let mut info = info.clone();
        info.type_code = TypeCode::structure((base + i) as u32);
        for field in &mut info.fields {
            if let Some(local) = field.type_code.structure_index() {
                if let Some(&mapped) = structure_map.get(local as usize) {
                    field.type_code = TypeCode::structure(mapped);
                }
            }
        }
        global[base + i] = info;
    }
}

/// Depth-first topological order over module dependencies; dependencies
/// come before their dependents.
fn topo_order(module_set: &[ModuleInfo]) -> Result<Vec<u32>, LinkError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        White,
        Gray,
        Black,
    }

    fn visit(
        module_set: &[ModuleInfo],
        marks: &mut [Mark],
        order: &mut Vec<u32>,
        node: u32,
    ) -> Result<(), LinkError> {
        match marks[node as usize] {
            Mark::Gray => {
                return Err(LinkError::DependencyCycle(vec![
                    module_set[node as usize].path().to_string(),
                ]));
            }
            Mark::Black => return Ok(()),
            Mark::White => {}
        }

        marks[node as usize] = Mark::Gray;
        for &dependency in &module_set[node as usize].dependencies {
            if dependency as usize >= module_set.len() {
                return Err(LinkError::UnknownDependency {
                    module: node,
                    dependency,
                });
            }
            visit(module_set, marks, order, dependency).map_err(|error| match error {
                LinkError::DependencyCycle(mut path) => {
                    path.push(module_set[node as usize].path().to_string());
                    LinkError::DependencyCycle(path)
                }
                other => other,
            })?;
        }
        marks[node as usize] = Mark::Black;
        order.push(node);
        Ok(())
    }

    let mut marks = vec![Mark::White; module_set.len()];
    let mut order = Vec::with_capacity(module_set.len());
    for node in 0..module_set.len() as u32 {
        visit(module_set, &mut marks, &mut order, node)?;
    }
    Ok(order)
}
