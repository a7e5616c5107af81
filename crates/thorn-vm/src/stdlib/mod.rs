// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The standard library: the `/std/io` virtual module.
//!
//! Exposes a `Stream` structure (one long field holding a host-side
//! stream handle) and the functions `getStdin`, `getStdout`, `readInt`
//! and `writeInt`. Parameter types are checked exactly; a mismatch
//! raises the stdlib type-assertion code, an unknown handle the invalid
//! stream code.


use std::cell::RefCell;
use std::io::{BufRead, Write};
use std::rc::Rc;

use thorn_bytefile::types::TypeCode;

use crate::exception::ExceptionCode;
use crate::host::{VirtualContext, VirtualObject};
use crate::loader::Loader;
use crate::object::Value;

/// A host-side byte stream the bytecode can read from or write to.
pub trait IoStream {
    /// Read one whitespace-delimited decimal integer; `None` on
    /// exhaustion or parse failure.
    fn read_int(&mut self) -> Option<i32>;
    /// Write one decimal integer; `false` when the stream rejects
    /// writes.
    fn write_int(&mut self, value: i32) -> bool;
}

/// Standard input as an [`IoStream`].
#[derive(Debug, Default)]
pub struct StdinStream;

impl IoStream for StdinStream {
    fn read_int(&mut self) -> Option<i32> {
        // Scan one whitespace-delimited token from the locked stdin.
        let stdin = std::io::stdin();
        let mut locked = stdin.lock();
        let mut token = String::new();

        loop {
            let buffer = locked.fill_buf().ok()?;
            if buffer.is_empty() {
                break;
            }
            let mut consumed = 0;
            let mut stop = false;
            for &byte in buffer {
                consumed += 1;
                if byte.is_ascii_whitespace() {
                    if token.is_empty() {
                        continue;
                    }
                    stop = true;
                    break;
                }
                token.push(byte as char);
            }
            locked.consume(consumed);
            if stop {
                break;
            }
        }

        token.parse().ok()
    }

    fn write_int(&mut self, _value: i32) -> bool {
        false
    }
}

/// Standard output as an [`IoStream`].
#[derive(Debug, Default)]
pub struct StdoutStream;

impl IoStream for StdoutStream {
    fn read_int(&mut self) -> Option<i32> {
        None
    }

    fn write_int(&mut self, value: i32) -> bool {
        write!(std::io::stdout(), "{value}").is_ok()
    }
}

/// The host-side stream table; handles are table indices.
#[derive(Default)]
pub struct StreamTable {
    streams: Vec<Option<Box<dyn IoStream>>>,
}

impl StreamTable {
    /// Register a stream and return its handle.
    pub fn add(&mut self, stream: Box<dyn IoStream>) -> u64 {
        self.streams.push(Some(stream));
        (self.streams.len() - 1) as u64
    }

    /// Remove a stream. Returns `false` for unknown handles.
    pub fn remove(&mut self, handle: u64) -> bool {
        match self.streams.get_mut(handle as usize) {
            Some(slot @ Some(_)) => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    /// Whether `handle` names a live stream.
    #[must_use]
    pub fn is_valid(&self, handle: u64) -> bool {
        matches!(self.streams.get(handle as usize), Some(Some(_)))
    }

    fn get_mut(&mut self, handle: u64) -> Option<&mut Box<dyn IoStream>> {
        self.streams.get_mut(handle as usize)?.as_mut()
    }
}

/// State of the `/std/io` module: the stream table plus the well-known
/// stdin/stdout handles.
pub struct StdIo {
    streams: Rc<RefCell<StreamTable>>,
    stdin: u64,
    stdout: u64,
    /// Local index of the `Stream` structure within the module.
    stream_structure: u32,
    /// Module index in the loader.
    module: u32,
}

impl StdIo {
    /// Virtual path the module registers under.
    pub const PATH: &'static str = "/std/io";

    /// Register `/std/io` with stdin/stdout attached. Returns the state
    /// handle; the module index is [`Self::module`].
    pub fn register(loader: &mut Loader) -> Self {
        Self::register_with(
            loader,
            Box::new(StdinStream),
            Box::new(StdoutStream),
        )
    }

    /// Register `/std/io` with caller-provided standard streams (tests
    /// substitute in-memory streams).
    pub fn register_with(
        loader: &mut Loader,
        stdin: Box<dyn IoStream>,
        stdout: Box<dyn IoStream>,
    ) -> Self {
        let mut table = StreamTable::default();
        let stdin = table.add(stdin);
        let stdout = table.add(stdout);
        let streams = Rc::new(RefCell::new(table));

        let module = loader.create(Self::PATH);
        let io = loader
            .virtual_module_mut(module)
            .expect("module was just created");

        let stream_structure = io.add_structure("Stream", vec![(TypeCode::LONG, 0)]);

        io.add_function("getStdin", 0, true, {
            move |ctx: &mut VirtualContext<'_>| push_stream(ctx, stream_structure, stdin)
        });
        io.add_function("getStdout", 0, true, {
            move |ctx: &mut VirtualContext<'_>| push_stream(ctx, stream_structure, stdout)
        });

        let read_streams = Rc::clone(&streams);
        io.add_function("readInt", 1, true, move |ctx: &mut VirtualContext<'_>| {
            let handle = stream_handle(ctx, stream_structure, 0)?;
            let mut table = read_streams.borrow_mut();
            let stream = table
                .get_mut(handle)
                .ok_or(ExceptionCode::StdlibIoInvalidStream)?;
            let value = stream.read_int().unwrap_or(0);
            ctx.push_fundamental(Value::Int(value as u32))?;
            Ok(())
        });

        let write_streams = Rc::clone(&streams);
        io.add_function("writeInt", 2, false, move |ctx: &mut VirtualContext<'_>| {
            let handle = stream_handle(ctx, stream_structure, 0)?;
            let value = ctx.parameter(1)?;
            if ctx.type_of(&value)? != TypeCode::INT {
                return Err(ExceptionCode::StdlibTypeAssertFail);
            }
            let value = ctx.to_int(&value)? as i32;

            let mut table = write_streams.borrow_mut();
            let stream = table
                .get_mut(handle)
                .ok_or(ExceptionCode::StdlibIoInvalidStream)?;
            if !stream.write_int(value) {
                return Err(ExceptionCode::StdlibIoInvalidStream);
            }
            Ok(())
        });

        tracing::debug!(module, "registered /std/io");
        Self {
            streams,
            stdin,
            stdout,
            stream_structure,
            module,
        }
    }

    /// Module index in the loader (and the linked program).
    #[must_use]
    pub const fn module(&self) -> u32 {
        self.module
    }

    /// Handle of the registered stdin stream.
    #[must_use]
    pub const fn stdin(&self) -> u64 {
        self.stdin
    }

    /// Handle of the registered stdout stream.
    #[must_use]
    pub const fn stdout(&self) -> u64 {
        self.stdout
    }

    /// Local index of the `Stream` structure.
    #[must_use]
    pub const fn stream_structure(&self) -> u32 {
        self.stream_structure
    }

    /// The stream table, for embedders adding their own streams.
    #[must_use]
    pub fn streams(&self) -> Rc<RefCell<StreamTable>> {
        Rc::clone(&self.streams)
    }
}

/// Push a `Stream` structure carrying `handle`.
fn push_stream(
    ctx: &mut VirtualContext<'_>,
    stream_structure: u32,
    handle: u64,
) -> Result<(), ExceptionCode> {
    let code = ctx.structure(stream_structure)?;
    let result = ctx.push_structure(code, 0)?;
    let field = ctx.field(&result, 0)?;
    ctx.set_value(&field, Value::Long(handle))?;
    Ok(())
}

/// Read parameter `index` as a `Stream` structure and return its handle;
/// exact type check per the stdlib contract.
fn stream_handle(
    ctx: &VirtualContext<'_>,
    stream_structure: u32,
    index: u16,
) -> Result<u64, ExceptionCode> {
    let parameter = ctx.parameter(index)?;
    let expected = ctx.structure(stream_structure)?;
    if ctx.type_of(&parameter)? != expected {
        return Err(ExceptionCode::StdlibTypeAssertFail);
    }
    let field = ctx.field(&parameter, 0)?;
    let VirtualObject::Ref(_) = field else {
        return Err(ExceptionCode::StdlibTypeAssertFail);
    };
    ctx.to_long(&field)
}
