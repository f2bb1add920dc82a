// This module is the compiler driver. A JitCompiler borrows the graph, owns a copy of the
// subgraph node list and of the caller's buffer pointers, and runs one compile-and-run cycle
// through six stages: build the tensor-dialect module from the subgraph, lower the dialect to
// loops over buffers and canonicalize, lower the loops to an unstructured CFG, bind the
// caller's buffers into argument descriptors, convert to LLVM and invoke through the JIT, and
// finally clean up. Each stage runs its own pass manager. Cleanup is owned by a guard that is
// dropped on every exit path, a returned error or an unwinding panic alike, so descriptors
// and scratch memory never outlive a cycle. The only error a caller sees as a value is an
// unsupported operation; every other failure is a broken invariant that aborts through
// jit_assert!/jit_fail!.

//! Subgraph compiler driver.
//!
//! # Example
//! ```ignore
//! let mut compiler = JitCompiler::new(&graph, &[add], &buffers);
//! unsafe { compiler.compile_and_run()? };
//! println!("{}", compiler.stats());
//! ```

pub mod dispatch;
pub mod invoke;

pub use invoke::{ArgumentPack, MemRefDescriptor};

use crate::config::JitConfig;
use crate::core::boundary::{self, Boundary};
use crate::core::type_mapper::map_tensor_type;
use crate::core::{CompileStats, JitError, JitResult, MemoryManager, ValueBindingTable};
use crate::graph::{Graph, NodeId, TensorId};
use crate::ir::{Function, FunctionBuilder, Location, Module, TensorBinary, ValueId};
use crate::passes::{self, PassManager};
use crate::{jit_assert, jit_fail};
use invoke::mem_mgr_arg_id;
use std::cell::Cell;
use std::ffi::c_void;
use std::rc::Rc;

/// Name of the single function built per subgraph.
pub const FUNCTION_NAME: &str = "main";

/// Compiles one subgraph and runs it against caller-owned buffers.
pub struct JitCompiler<'g> {
    graph: &'g Graph,
    subgraph: Vec<NodeId>,
    external_tensors: Vec<*mut c_void>,
    config: JitConfig,
    boundary: Option<Boundary>,
    module: Option<Module>,
    bindings: ValueBindingTable,
    builder: Option<FunctionBuilder>,
    invoke_args: Option<ArgumentPack>,
    mem_mgr: Box<MemoryManager>,
    live_descriptors: Rc<Cell<usize>>,
    stats: CompileStats,
}

/// Runs cleanup when a cycle ends, however it ends.
struct CompileCycle<'a, 'g> {
    compiler: &'a mut JitCompiler<'g>,
}

impl Drop for CompileCycle<'_, '_> {
    fn drop(&mut self) {
        self.compiler.cleanup();
    }
}

impl<'g> JitCompiler<'g> {
    /// `external_tensors` holds one buffer per external input, then one per
    /// external output, in boundary discovery order.
    pub fn new(graph: &'g Graph, subgraph: &[NodeId], external_tensors: &[*mut c_void]) -> Self {
        Self {
            graph,
            subgraph: subgraph.to_vec(),
            external_tensors: external_tensors.to_vec(),
            config: JitConfig::global().clone(),
            boundary: None,
            module: None,
            bindings: ValueBindingTable::new(),
            builder: None,
            invoke_args: None,
            mem_mgr: Box::default(),
            live_descriptors: Rc::new(Cell::new(0)),
            stats: CompileStats::default(),
        }
    }

    /// Replace the process-wide configuration for this compiler.
    ///
    /// `dump_ir` applies per compiler; `llvm_options` only take effect if this
    /// compiler is the first in the process to execute (see
    /// [`JitConfig::llvm_options`]).
    pub fn with_config(mut self, config: JitConfig) -> Self {
        self.config = config;
        self
    }

    /// Build, lower, bind, execute and clean up.
    ///
    /// # Safety
    ///
    /// Every external tensor pointer must reference a live buffer large enough
    /// for its tensor's element type and shape, and output buffers must be
    /// writable. The buffers stay owned by the caller.
    pub unsafe fn compile_and_run(&mut self) -> JitResult<()> {
        log::info!("compiling subgraph of {} nodes", self.subgraph.len());
        let cycle = CompileCycle { compiler: self };
        cycle.compiler.build_module()?;
        cycle.compiler.lower_dialect();
        cycle.compiler.optimize();
        cycle.compiler.bind_arguments();
        cycle.compiler.execute();
        log::debug!("{}", cycle.compiler.stats);
        Ok(())
    }

    /// Run every stage up to and including loop lowering, without executing.
    pub fn compile_only(&mut self) -> JitResult<()> {
        let cycle = CompileCycle { compiler: self };
        cycle.compiler.build_module()?;
        cycle.compiler.lower_dialect();
        cycle.compiler.optimize();
        Ok(())
    }

    /// Analyze the boundary and build the tensor-dialect module.
    pub fn build_module(&mut self) -> JitResult<()> {
        let boundary = boundary::analyze(self.graph, &self.subgraph);
        self.bindings.clear();
        self.module = None;

        let param_types = boundary
            .inputs
            .iter()
            .map(|t| map_tensor_type(self.graph.tensor(*t)))
            .collect();
        let result_types = boundary
            .outputs
            .iter()
            .map(|t| map_tensor_type(self.graph.tensor(*t)))
            .collect();
        let function = Function::new(FUNCTION_NAME, param_types, result_types);
        for (tensor, value) in boundary.inputs.iter().zip(function.params()) {
            self.bindings.bind(*tensor, *value);
        }
        self.builder = Some(FunctionBuilder::new(function));
        self.boundary = Some(boundary);

        self.build_nodes()?;
        self.create_return();

        let function = match self.builder.take() {
            Some(builder) => builder.finish(),
            None => jit_fail!("IR builder released during module construction"),
        };
        let mut module = Module::new();
        module.push_function(function);
        self.module = Some(module);
        self.dump("build_module");
        Ok(())
    }

    fn build_nodes(&mut self) -> JitResult<()> {
        jit_assert!(
            self.subgraph.len() == 1,
            "Supporting code-gen for a single node for now"
        );
        let graph = self.graph;
        for index in 0..self.subgraph.len() {
            let node_id = self.subgraph[index];
            let node = graph.node(node_id);
            let lower = dispatch::lowering_for(node.kind).ok_or_else(|| {
                log::warn!("no lowering for {} ({})", node.name, node.description());
                JitError::UnsupportedOp {
                    name: node.description().to_string(),
                }
            })?;
            log::trace!("lowering {}", node.name);
            if let Some(value) = lower(self, node_id) {
                self.bindings.bind(node.results[0], value);
            }
            self.stats.nodes_lowered += 1;
        }
        Ok(())
    }

    /// Lower the tensor dialect to buffers and loops, then canonicalize.
    pub fn lower_dialect(&mut self) {
        let mut pm = PassManager::new();
        pm.add_pass(passes::create_dialect_lowering_pass());
        pm.add_pass(passes::create_canonicalizer_pass());
        self.run_passes(&mut pm, "Failed to lower the tensor dialect");
        self.dump("lower_dialect");
    }

    /// Lower structured loops to an unstructured CFG.
    pub fn optimize(&mut self) {
        let mut pm = PassManager::new();
        pm.add_pass(passes::create_lower_affine_pass());
        self.run_passes(&mut pm, "Failed to lower affine loops");
    }

    fn run_passes(&mut self, pm: &mut PassManager, context: &str) {
        let module = match self.module.as_mut() {
            Some(module) => module,
            None => jit_fail!("{}: module has not been built", context),
        };
        if let Err(err) = pm.run(module) {
            jit_fail!("{}: {}", context, err);
        }
        self.stats.passes_run += pm.passes_run();
        log::debug!("ran {} passes", pm.passes_run());
    }

    fn lowered_function(&self) -> &Function {
        match self.module.as_ref().and_then(|m| m.named_function(FUNCTION_NAME)) {
            Some(function) => function,
            None => jit_fail!("function '{}' not found in module", FUNCTION_NAME),
        }
    }

    fn bind_arguments(&mut self) {
        let function = self.lowered_function();
        let mem_mgr_slot = mem_mgr_arg_id(function);
        let mut args = ArgumentPack::allocate_memref_args(function, self.live_descriptors.clone());
        args.bind_data_pointers(&self.external_tensors);
        args.push_memory_manager(&mut *self.mem_mgr, mem_mgr_slot);
        jit_assert!(
            args.len() == self.boundary.as_ref().map_or(0, Boundary::num_external) + 1,
            "Argument descriptor count {} does not match the boundary",
            args.len()
        );

        self.stats.descriptors_allocated += args.len();
        self.invoke_args = Some(args);
    }

    unsafe fn execute(&mut self) {
        let mut pointers = match self.invoke_args.as_mut() {
            Some(args) => args.as_mut_ptrs(),
            None => jit_fail!("arguments were not bound before execution"),
        };
        let module = match self.module.as_ref() {
            Some(module) => module,
            None => jit_fail!("module has not been built"),
        };
        if let Err(err) =
            crate::llvm::invoke_packed(module, FUNCTION_NAME, &mut pointers, &self.config.llvm_options)
        {
            jit_fail!("JIT invocation failed: {}", err);
        }
        self.stats.invocations += 1;
        self.stats.scratch_allocations += self.mem_mgr.live_allocations();
    }

    fn cleanup(&mut self) {
        if let Some(args) = self.invoke_args.take() {
            log::trace!("releasing {} argument slots", args.len());
        }
        self.builder = None;
        self.mem_mgr.free_all();
    }

    /// Emit the tensor-dialect op for a two-operand node.
    pub(crate) fn create_binary_op(&mut self, node: NodeId, kind: TensorBinary) -> ValueId {
        let node = self.graph.node(node);
        jit_assert!(
            node.operands.len() == 2,
            "{} expects two operands, got {}",
            node.description(),
            node.operands.len()
        );
        let lhs = self.bindings.value(node.operands[0]);
        let rhs = self.bindings.value(node.operands[1]);
        let builder = match self.builder.as_mut() {
            Some(builder) => builder,
            None => jit_fail!("no IR builder while lowering {}", node.name),
        };
        let value = builder.create_tensor_binary(kind, lhs, rhs, Location::Named(node.name.clone()));
        self.stats.record_op(node.description());
        value
    }

    fn create_return(&mut self) {
        let outputs = match self.boundary.as_ref() {
            Some(boundary) => boundary
                .outputs
                .iter()
                .map(|t| self.bindings.value(*t))
                .collect(),
            None => jit_fail!("return built before boundary analysis"),
        };
        match self.builder.as_mut() {
            Some(builder) => builder.create_tensor_return(outputs),
            None => jit_fail!("no IR builder for the return"),
        }
    }

    fn dump(&self, stage: &str) {
        let Some(text) = self.ir_dump(stage) else {
            return;
        };
        if log::log_enabled!(log::Level::Info) {
            log::info!("{}", text);
        } else {
            eprintln!("{}", text);
        }
    }

    /// Dump text for the current module, or `None` when dumping is off or
    /// no module has been built.
    pub fn ir_dump(&self, stage: &str) -> Option<String> {
        if !self.config.dump_ir {
            return None;
        }
        let module = self.module.as_ref()?;
        Some(format!("*** IR Dump After {} ***\n{}", stage, module))
    }

    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    pub fn config(&self) -> &JitConfig {
        &self.config
    }

    pub fn boundary(&self) -> Option<&Boundary> {
        self.boundary.as_ref()
    }

    pub fn input_tensors(&self) -> &[TensorId] {
        match &self.boundary {
            Some(boundary) => &boundary.inputs,
            None => &[],
        }
    }

    pub fn output_tensors(&self) -> &[TensorId] {
        match &self.boundary {
            Some(boundary) => &boundary.outputs,
            None => &[],
        }
    }

    /// The module as left by the last stage that ran.
    pub fn module(&self) -> Option<&Module> {
        self.module.as_ref()
    }

    pub fn bindings(&self) -> &ValueBindingTable {
        &self.bindings
    }

    pub fn stats(&self) -> &CompileStats {
        &self.stats
    }

    /// Argument slots currently allocated.
    pub fn live_descriptors(&self) -> usize {
        self.live_descriptors.get()
    }

    pub fn memory_manager(&self) -> &MemoryManager {
        &self.mem_mgr
    }
}

/// Compile `subgraph` and run it once.
///
/// # Safety
///
/// Same contract as [`JitCompiler::compile_and_run`].
pub unsafe fn compile_and_run(
    graph: &Graph,
    subgraph: &[NodeId],
    external_tensors: &[*mut c_void],
) -> JitResult<()> {
    JitCompiler::new(graph, subgraph, external_tensors).compile_and_run()
}
