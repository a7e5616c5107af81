// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Thorn CLI: load a byte file, run it, print the result slot and the
//! elapsed time.

use std::process::ExitCode;
use std::time::Instant;

use tracing_subscriber::EnvFilter;

use thorn_vm::interp::{DEFAULT_STACK_SIZE, Interpreter};
use thorn_vm::loader::Loader;
use thorn_vm::object::Value;
use thorn_vm::options::ProgramOption;
use thorn_vm::stdlib::StdIo;

/// Default young-generation block size in bytes.
const DEFAULT_YOUNG: u64 = 2 * 1024 * 1024;
/// Default old-generation block size in bytes.
const DEFAULT_OLD: u64 = 8 * 1024 * 1024;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        println!("Usage: thorn <File> [Options...]");
        return ExitCode::FAILURE;
    }

    let mut options = ProgramOption::new();
    options
        .add_variable("stack", DEFAULT_STACK_SIZE as u64)
        .add_variable("young", DEFAULT_YOUNG)
        .add_variable("old", DEFAULT_OLD)
        .add_flag("stdlib", true);

    if let Err(error) = options.parse(&args).and_then(|()| options.verify()) {
        println!("Error: {error}.");
        return ExitCode::FAILURE;
    }
    for warning in options.warnings() {
        println!("Warning: {warning}.");
    }

    let start = Instant::now();

    let mut loader = Loader::new();
    if options.flag("stdlib") {
        StdIo::register(&mut loader);
    }
    let entry = match loader.load_file(&options.path) {
        Ok(module) => module,
        Err(error) => {
            println!("Error: {error}.");
            return ExitCode::FAILURE;
        }
    };
    let program = match loader.build(entry) {
        Ok(program) => program,
        Err(error) => {
            println!("Error: {error}.");
            return ExitCode::FAILURE;
        }
    };

    let mut interpreter = Interpreter::new(program);
    interpreter.allocate_stack(options.variable("stack") as usize);
    interpreter.init_managed_heap(
        options.variable("young") as usize,
        options.variable("old") as usize,
    );

    let success = interpreter.interpret();
    let runtime = start.elapsed();

    if !success {
        if let Some(exception) = interpreter.exception() {
            println!("Error: {exception}");
        }
        return ExitCode::FAILURE;
    }

    match interpreter.result() {
        Some(Value::Int(value)) => println!("Result: {value}"),
        Some(Value::Long(value)) => println!("Result: {value}"),
        Some(Value::Single(value)) => println!("Result: {value}"),
        Some(Value::Double(value)) => println!("Result: {value}"),
        None => {}
    }
    println!("Runtime: {}s", runtime.as_secs_f64());

    ExitCode::SUCCESS
}
