//! JIT execution engine.
//!
//! Target initialisation and LLVM option parsing happen once per process,
//! no matter how many compilers exist. Every invocation converts the module
//! afresh into its own context, builds an engine with no optimisation
//! pipeline and calls the packed wrapper.

use super::codegen::{convert_to_llvm, invoke_symbol};
use crate::core::memory::{subgraph_jit_allocate, ALLOCATE_SYMBOL};
use crate::core::EngineError;
use crate::ir;
use inkwell::context::Context;
use inkwell::targets::{InitializationConfig, Target};
use inkwell::OptimizationLevel;
use std::ffi::{c_void, CString};
use std::os::raw::c_char;
use std::sync::OnceLock;

/// Outcome of the first initialisation: the LLVM options applied, or why it failed.
static NATIVE_TARGET: OnceLock<Result<Vec<String>, String>> = OnceLock::new();

type PackedFn = unsafe extern "C" fn(*mut *mut c_void);

/// Initialise the native target and forward `llvm_options` to LLVM.
///
/// Only the first call does any work; later calls return its outcome. LLVM
/// parses its command line once per process, so options passed by a later
/// call are not applied and a warning is logged when they differ.
pub fn initialize_native_target(llvm_options: &[String]) -> Result<(), EngineError> {
    let outcome = NATIVE_TARGET.get_or_init(|| {
        Target::initialize_native(&InitializationConfig::default())?;
        if !llvm_options.is_empty() {
            parse_llvm_options(llvm_options)?;
        }
        log::debug!("native target initialised");
        Ok(llvm_options.to_vec())
    });
    match outcome {
        Ok(applied) => {
            if applied.as_slice() != llvm_options {
                log::warn!(
                    "LLVM options {:?} ignored; {:?} were applied at initialisation",
                    llvm_options,
                    applied
                );
            }
            Ok(())
        }
        Err(reason) => Err(EngineError::EngineCreation {
            reason: reason.clone(),
        }),
    }
}

/// LLVM options in effect, once the native target has been initialised.
pub fn applied_llvm_options() -> Option<&'static [String]> {
    match NATIVE_TARGET.get() {
        Some(Ok(applied)) => Some(applied.as_slice()),
        _ => None,
    }
}

fn parse_llvm_options(options: &[String]) -> Result<(), String> {
    let args = std::iter::once("subgraph-jit")
        .chain(options.iter().map(String::as_str))
        .map(CString::new)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid LLVM option: {e}"))?;
    let argv: Vec<*const c_char> = args.iter().map(|arg| arg.as_ptr()).collect();
    let overview = CString::default();
    log::debug!("forwarding LLVM options: {:?}", options);
    unsafe {
        llvm_sys::support::LLVMParseCommandLineOptions(
            argv.len() as i32,
            argv.as_ptr(),
            overview.as_ptr(),
        );
    }
    Ok(())
}

/// Convert `module`, JIT it and call the packed wrapper of `function`.
///
/// # Safety
///
/// `args` must hold one valid pointer per parameter of `function`, laid out
/// the way the packed wrapper expects, and every buffer those pointers reach
/// must be large enough for the shapes the function was compiled for.
pub unsafe fn invoke_packed(
    module: &ir::Module,
    function: &str,
    args: &mut [*mut c_void],
    llvm_options: &[String],
) -> Result<(), EngineError> {
    initialize_native_target(llvm_options)?;

    let context = Context::create();
    let llvm_module = convert_to_llvm(&context, module)?;
    let engine = llvm_module
        .create_jit_execution_engine(OptimizationLevel::None)
        .map_err(|e| EngineError::EngineCreation {
            reason: e.to_string(),
        })?;
    if let Some(hook) = llvm_module.get_function(ALLOCATE_SYMBOL) {
        engine.add_global_mapping(&hook, subgraph_jit_allocate as usize);
    }

    let symbol = invoke_symbol(function);
    let entry = engine
        .get_function::<PackedFn>(&symbol)
        .map_err(|e| EngineError::FunctionLookup {
            name: symbol.clone(),
            reason: e.to_string(),
        })?;
    log::debug!("invoking {} with {} packed arguments", symbol, args.len());
    entry.call(args.as_mut_ptr());
    Ok(())
}
