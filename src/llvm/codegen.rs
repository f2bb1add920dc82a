// This module converts a fully lowered IR module (unstructured control flow, memref parameters,
// no tensor ops, no structured loops) into an LLVM module through inkwell. Every function is
// emitted as `void @name(ptr, ..., ptr)`: memref parameters are pointers to a MemRefDescriptor
// whose first field is the data pointer, and the memory-manager parameter is the raw manager
// pointer. A prologue block loads each descriptor's data pointer once before branching to the
// first IR block. Block arguments become phi nodes created up front, so branches can add their
// incoming values while blocks are emitted in order. Loads and stores linearise their indices
// row-major over the static memref shape. Each function also gets a packed wrapper
// `_invoke_<name>(ptr args)` that takes the type-erased argument list the invocation engine
// builds: memref slots are descriptor pointers passed through as-is, and the trailing
// memory-manager slot points at a cell holding the manager pointer, which is dereferenced once.

//! IR to LLVM IR conversion.

use crate::core::memory::ALLOCATE_SYMBOL;
use crate::core::EngineError;
use crate::ir::{self, BinaryKind, BlockId, Constant, Function, MemRefType, Op, ScalarType, Type, ValueId};
use hashbrown::HashMap;
use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::types::{BasicMetadataTypeEnum, BasicTypeEnum, StructType};
use inkwell::values::{
    AnyValue, BasicMetadataValueEnum, BasicValue, BasicValueEnum, FunctionValue, IntValue, PhiValue,
    PointerValue,
};
use inkwell::{AddressSpace, IntPredicate};

/// Prefix of the packed entry point generated for every function.
pub const INVOKE_PREFIX: &str = "_invoke_";

/// Name of the packed wrapper for `function`.
pub fn invoke_symbol(function: &str) -> String {
    format!("{INVOKE_PREFIX}{function}")
}

/// Convert `module` into a verified LLVM module owned by `context`.
pub fn convert_to_llvm<'ctx>(
    context: &'ctx Context,
    module: &ir::Module,
) -> Result<Module<'ctx>, EngineError> {
    let llvm_module = context.create_module("subgraph_jit");
    let ptr_type = context.ptr_type(AddressSpace::default());
    let allocate = llvm_module.add_function(
        ALLOCATE_SYMBOL,
        ptr_type.fn_type(&[ptr_type.into(), context.i64_type().into()], false),
        None,
    );
    let descriptor = context.struct_type(&[ptr_type.into()], false);

    for function in module.functions() {
        let mut lowering = FunctionConversion::new(context, &llvm_module, function, descriptor, allocate)?;
        lowering.emit()?;
        emit_invoke_wrapper(context, &llvm_module, function, lowering.llvm_function)?;
        log::trace!("converted @{} to LLVM", function.name);
    }

    llvm_module
        .verify()
        .map_err(|e| EngineError::conversion(format!("LLVM module verification: {}", e.to_string())))?;
    Ok(llvm_module)
}

/// Textual LLVM IR of the converted module.
pub fn emit_llvm_ir(module: &ir::Module) -> Result<String, EngineError> {
    let context = Context::create();
    let llvm_module = convert_to_llvm(&context, module)?;
    Ok(llvm_module.print_to_string().to_string())
}

fn scalar_type<'ctx>(context: &'ctx Context, scalar: ScalarType) -> BasicTypeEnum<'ctx> {
    match scalar {
        ScalarType::F32 => context.f32_type().into(),
        ScalarType::F64 => context.f64_type().into(),
        ScalarType::I8 => context.i8_type().into(),
        ScalarType::I16 => context.i16_type().into(),
        ScalarType::I32 => context.i32_type().into(),
        ScalarType::I64 => context.i64_type().into(),
    }
}

fn value_type<'ctx>(context: &'ctx Context, ty: &Type) -> Result<BasicTypeEnum<'ctx>, EngineError> {
    match ty {
        Type::Scalar(s) => Ok(scalar_type(context, *s)),
        Type::Index => Ok(context.i64_type().into()),
        Type::I1 => Ok(context.bool_type().into()),
        Type::MemRef(_) | Type::MemoryManager => Ok(context.ptr_type(AddressSpace::default()).into()),
        Type::Tensor(_) => Err(EngineError::conversion(format!(
            "tensor type {ty} reached LLVM conversion"
        ))),
    }
}

/// A memref in scope: its data pointer and static shape.
#[derive(Clone)]
struct Buffer<'ctx> {
    data: PointerValue<'ctx>,
    element: ScalarType,
    shape: Vec<usize>,
}

struct FunctionConversion<'a, 'ctx> {
    context: &'ctx Context,
    function: &'a Function,
    llvm_function: FunctionValue<'ctx>,
    builder: Builder<'ctx>,
    allocate: FunctionValue<'ctx>,
    descriptor: StructType<'ctx>,
    blocks: Vec<BasicBlock<'ctx>>,
    phis: HashMap<BlockId, Vec<PhiValue<'ctx>>>,
    values: HashMap<ValueId, BasicValueEnum<'ctx>>,
    buffers: HashMap<ValueId, Buffer<'ctx>>,
}

impl<'a, 'ctx> FunctionConversion<'a, 'ctx> {
    fn new(
        context: &'ctx Context,
        llvm_module: &Module<'ctx>,
        function: &'a Function,
        descriptor: StructType<'ctx>,
        allocate: FunctionValue<'ctx>,
    ) -> Result<Self, EngineError> {
        if !function.result_types().is_empty() {
            return Err(EngineError::conversion(format!(
                "@{} still returns values; lower the tensor dialect first",
                function.name
            )));
        }
        let param_types = function
            .param_types()
            .map(|ty| value_type(context, ty).map(BasicMetadataTypeEnum::from))
            .collect::<Result<Vec<_>, _>>()?;
        let fn_type = context.void_type().fn_type(&param_types, false);
        let llvm_function = llvm_module.add_function(&function.name, fn_type, None);

        Ok(Self {
            context,
            function,
            llvm_function,
            builder: context.create_builder(),
            allocate,
            descriptor,
            blocks: Vec::with_capacity(function.blocks.len()),
            phis: HashMap::new(),
            values: HashMap::new(),
            buffers: HashMap::new(),
        })
    }

    fn emit(&mut self) -> Result<(), EngineError> {
        if self.function.blocks.is_empty() {
            return Err(EngineError::conversion(format!("@{} has no body", self.function.name)));
        }
        let prologue = self.context.append_basic_block(self.llvm_function, "prologue");
        for index in 0..self.function.blocks.len() {
            let block = self
                .context
                .append_basic_block(self.llvm_function, &format!("bb{index}"));
            self.blocks.push(block);
        }

        self.builder.position_at_end(prologue);
        self.bind_params()?;
        self.builder.build_unconditional_branch(self.blocks[0])?;

        self.create_phis()?;
        let function = self.function;
        for (index, block) in function.blocks.iter().enumerate() {
            self.builder.position_at_end(self.blocks[index]);
            for op in &block.ops {
                self.emit_op(op, BlockId(index as u32))?;
            }
        }
        Ok(())
    }

    fn bind_params(&mut self) -> Result<(), EngineError> {
        let ptr_type = self.context.ptr_type(AddressSpace::default());
        let function = self.function;
        for (index, param) in function.params().iter().enumerate() {
            let llvm_param = self.llvm_function.get_nth_param(index as u32).ok_or_else(|| {
                EngineError::conversion(format!("missing LLVM parameter {index}"))
            })?;
            match function.value_type(*param) {
                Type::MemRef(memref) => {
                    let field = self.builder.build_struct_gep(
                        self.descriptor,
                        llvm_param.into_pointer_value(),
                        0,
                        "data_field",
                    )?;
                    let data = self.builder.build_load(ptr_type, field, "data")?;
                    self.insert_buffer(*param, data.into_pointer_value(), memref)?;
                }
                _ => {
                    self.values.insert(*param, llvm_param);
                }
            }
        }
        Ok(())
    }

    fn insert_buffer(
        &mut self,
        value: ValueId,
        data: PointerValue<'ctx>,
        memref: &MemRefType,
    ) -> Result<(), EngineError> {
        let shape = memref.static_shape().ok_or_else(|| {
            EngineError::conversion(format!("{value} has dynamic memref type {memref:?}"))
        })?;
        self.buffers.insert(
            value,
            Buffer {
                data,
                element: memref.element,
                shape,
            },
        );
        self.values.insert(value, data.as_basic_value_enum());
        Ok(())
    }

    fn create_phis(&mut self) -> Result<(), EngineError> {
        let function = self.function;
        for (index, block) in function.blocks.iter().enumerate() {
            if block.args.is_empty() {
                continue;
            }
            self.builder.position_at_end(self.blocks[index]);
            let mut phis = Vec::with_capacity(block.args.len());
            for arg in &block.args {
                let ty = value_type(self.context, function.value_type(*arg))?;
                let phi = self.builder.build_phi(ty, &format!("arg{}", arg.0))?;
                self.values.insert(*arg, phi.as_basic_value());
                phis.push(phi);
            }
            self.phis.insert(BlockId(index as u32), phis);
        }
        Ok(())
    }

    fn value(&self, id: ValueId) -> Result<BasicValueEnum<'ctx>, EngineError> {
        self.values
            .get(&id)
            .copied()
            .ok_or_else(|| EngineError::conversion(format!("{id} used before definition")))
    }

    fn int(&self, id: ValueId) -> Result<IntValue<'ctx>, EngineError> {
        match self.value(id)? {
            BasicValueEnum::IntValue(v) => Ok(v),
            other => Err(EngineError::conversion(format!(
                "{id} is not an integer: {other:?}"
            ))),
        }
    }

    fn buffer(&self, id: ValueId) -> Result<Buffer<'ctx>, EngineError> {
        self.buffers
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::conversion(format!("{id} is not a memref in scope")))
    }

    fn define(&mut self, id: ValueId, value: BasicValueEnum<'ctx>) {
        self.values.insert(id, value);
    }

    /// Address of `buffer[indices]`, row-major.
    fn element_address(
        &self,
        buffer: &Buffer<'ctx>,
        indices: &[ValueId],
    ) -> Result<PointerValue<'ctx>, EngineError> {
        if indices.len() != buffer.shape.len() {
            return Err(EngineError::conversion(format!(
                "{} subscripts for a rank-{} memref",
                indices.len(),
                buffer.shape.len()
            )));
        }
        let i64_type = self.context.i64_type();
        let mut offset = i64_type.const_zero();
        for (dim, index) in buffer.shape.iter().zip(indices) {
            let scaled = self
                .builder
                .build_int_mul(offset, i64_type.const_int(*dim as u64, false), "stride")?;
            offset = self.builder.build_int_add(scaled, self.int(*index)?, "offset")?;
        }
        let element = scalar_type(self.context, buffer.element);
        let address =
            unsafe { self.builder.build_in_bounds_gep(element, buffer.data, &[offset], "addr") }?;
        Ok(address)
    }

    fn add_incoming(&self, dest: BlockId, args: &[ValueId], from: BasicBlock<'ctx>) -> Result<(), EngineError> {
        let phis = self.phis.get(&dest).map(Vec::as_slice).unwrap_or_default();
        if phis.len() != args.len() {
            return Err(EngineError::conversion(format!(
                "branch to {dest} passes {} arguments, block takes {}",
                args.len(),
                phis.len()
            )));
        }
        for (phi, arg) in phis.iter().zip(args) {
            let value = self.value(*arg)?;
            phi.add_incoming(&[(&value as &dyn BasicValue<'ctx>, from)]);
        }
        Ok(())
    }

    fn llvm_block(&self, id: BlockId) -> Result<BasicBlock<'ctx>, EngineError> {
        self.blocks
            .get(id.0 as usize)
            .copied()
            .ok_or_else(|| EngineError::conversion(format!("branch to missing block {id}")))
    }

    fn emit_op(&mut self, op: &Op, block: BlockId) -> Result<(), EngineError> {
        let current = self.llvm_block(block)?;
        match op {
            Op::Constant { value, result } => {
                let ty = self.function.value_type(*result);
                let constant: BasicValueEnum<'ctx> = match (value, ty) {
                    (Constant::Index(v), Type::Index) => {
                        self.context.i64_type().const_int(*v as u64, true).into()
                    }
                    (Constant::Int(v), Type::Scalar(s)) if !s.is_float() => scalar_type(self.context, *s)
                        .into_int_type()
                        .const_int(*v as u64, true)
                        .into(),
                    (Constant::Float(v), Type::Scalar(s)) if s.is_float() => {
                        scalar_type(self.context, *s).into_float_type().const_float(*v).into()
                    }
                    _ => {
                        return Err(EngineError::conversion(format!(
                            "constant {value:?} does not fit type {ty}"
                        )))
                    }
                };
                self.define(*result, constant);
            }
            Op::Alloc { mem_mgr, result } => {
                let memref = self
                    .function
                    .value_type(*result)
                    .as_memref()
                    .cloned()
                    .ok_or_else(|| EngineError::conversion(format!("alloc result {result} is not a memref")))?;
                let bytes = memref.element_count().ok_or_else(|| {
                    EngineError::conversion(format!("alloc of dynamic memref {result}"))
                })? * memref.element.size_in_bytes();
                let manager = self.value(*mem_mgr)?;
                let call = self.builder.build_call(
                    self.allocate,
                    &[
                        BasicMetadataValueEnum::from(manager),
                        self.context.i64_type().const_int(bytes as u64, false).into(),
                    ],
                    "scratch",
                )?;
                let data = call.as_any_value_enum().into_pointer_value();
                self.insert_buffer(*result, data, &memref)?;
            }
            Op::Load {
                memref,
                indices,
                result,
            } => {
                let buffer = self.buffer(*memref)?;
                let address = self.element_address(&buffer, indices)?;
                let element = scalar_type(self.context, buffer.element);
                let loaded = self.builder.build_load(element, address, "load")?;
                self.define(*result, loaded);
            }
            Op::Store {
                value,
                memref,
                indices,
            } => {
                let buffer = self.buffer(*memref)?;
                let address = self.element_address(&buffer, indices)?;
                self.builder.build_store(address, self.value(*value)?)?;
            }
            Op::Binary {
                kind,
                lhs,
                rhs,
                result,
            } => {
                let value: BasicValueEnum<'ctx> = match kind {
                    BinaryKind::AddF | BinaryKind::MulF => {
                        let l = self.value(*lhs)?.into_float_value();
                        let r = self.value(*rhs)?.into_float_value();
                        if *kind == BinaryKind::AddF {
                            self.builder.build_float_add(l, r, "addf")?.into()
                        } else {
                            self.builder.build_float_mul(l, r, "mulf")?.into()
                        }
                    }
                    BinaryKind::AddI => self
                        .builder
                        .build_int_add(self.int(*lhs)?, self.int(*rhs)?, "addi")?
                        .into(),
                    BinaryKind::MulI => self
                        .builder
                        .build_int_mul(self.int(*lhs)?, self.int(*rhs)?, "muli")?
                        .into(),
                };
                self.define(*result, value);
            }
            Op::CmpLt { lhs, rhs, result } => {
                let cmp = self.builder.build_int_compare(
                    IntPredicate::SLT,
                    self.int(*lhs)?,
                    self.int(*rhs)?,
                    "cmp",
                )?;
                self.define(*result, cmp.into());
            }
            Op::Br { dest, args } => {
                self.add_incoming(*dest, args, current)?;
                self.builder.build_unconditional_branch(self.llvm_block(*dest)?)?;
            }
            Op::CondBr {
                cond,
                true_dest,
                true_args,
                false_dest,
                false_args,
            } => {
                self.add_incoming(*true_dest, true_args, current)?;
                self.add_incoming(*false_dest, false_args, current)?;
                self.builder.build_conditional_branch(
                    self.int(*cond)?,
                    self.llvm_block(*true_dest)?,
                    self.llvm_block(*false_dest)?,
                )?;
            }
            Op::Return { operands } => {
                if !operands.is_empty() {
                    return Err(EngineError::conversion("return with operands in a void function"));
                }
                self.builder.build_return(None)?;
            }
            Op::TensorAdd { .. } | Op::TensorMatmulBias { .. } | Op::TensorReturn { .. } | Op::For { .. } => {
                return Err(EngineError::conversion(format!(
                    "'{}' must be lowered before LLVM conversion",
                    op.name()
                )))
            }
        }
        Ok(())
    }
}

fn emit_invoke_wrapper<'ctx>(
    context: &'ctx Context,
    llvm_module: &Module<'ctx>,
    function: &Function,
    target: FunctionValue<'ctx>,
) -> Result<(), EngineError> {
    let ptr_type = context.ptr_type(AddressSpace::default());
    let wrapper = llvm_module.add_function(
        &invoke_symbol(&function.name),
        context.void_type().fn_type(&[ptr_type.into()], false),
        None,
    );
    let builder = context.create_builder();
    builder.position_at_end(context.append_basic_block(wrapper, "entry"));

    let packed = wrapper
        .get_nth_param(0)
        .ok_or_else(|| EngineError::conversion("packed wrapper has no parameter"))?
        .into_pointer_value();
    let mut args: Vec<BasicMetadataValueEnum<'ctx>> = Vec::with_capacity(function.num_params());
    for (index, ty) in function.param_types().enumerate() {
        let slot_address = unsafe {
            builder.build_in_bounds_gep(
                ptr_type,
                packed,
                &[context.i64_type().const_int(index as u64, false)],
                "slot_addr",
            )
        }?;
        let slot = builder.build_load(ptr_type, slot_address, "slot")?;
        let arg = match ty {
            Type::MemRef(_) => slot,
            Type::MemoryManager => builder.build_load(ptr_type, slot.into_pointer_value(), "mem_mgr")?,
            other => {
                let value_ty = value_type(context, other)?;
                builder.build_load(value_ty, slot.into_pointer_value(), "arg")?
            }
        };
        args.push(arg.into());
    }
    builder.build_call(target, &args, "")?;
    builder.build_return(None)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionBuilder, TensorType};
    use crate::passes::{LowerAffineLoops, Pass};

    fn memref(shape: Vec<usize>) -> Type {
        Type::MemRef(MemRefType::from_tensor(&TensorType::new(ScalarType::F32, shape)))
    }

    fn copy_module(with_scratch: bool) -> ir::Module {
        let f = Function::new(
            "main",
            vec![memref(vec![2, 2]), memref(vec![2, 2]), Type::MemoryManager],
            vec![],
        );
        let (src, dst, mgr) = (f.param(0), f.param(1), f.param(2));
        let mut b = FunctionBuilder::new(f);
        let via = if with_scratch {
            let tmp = b.create_alloc(mgr, MemRefType::from_tensor(&TensorType::new(ScalarType::F32, vec![2, 2])));
            let ivs = b.begin_loop_nest(&[2, 2]);
            let v = b.create_load(src, ivs.clone());
            b.create_store(v, tmp, ivs.clone());
            b.end_loop_nest(2);
            tmp
        } else {
            src
        };
        let ivs = b.begin_loop_nest(&[2, 2]);
        let v = b.create_load(via, ivs.clone());
        b.create_store(v, dst, ivs.clone());
        b.end_loop_nest(2);
        b.create_return(vec![]);
        let mut f = b.finish();
        LowerAffineLoops.run_on_function(&mut f).unwrap();

        let mut module = ir::Module::new();
        module.push_function(f);
        module
    }

    #[test]
    fn test_emits_function_and_wrapper() {
        let text = emit_llvm_ir(&copy_module(false)).unwrap();
        assert!(text.contains("define void @main(ptr"));
        assert!(text.contains("define void @_invoke_main(ptr"));
        assert!(text.contains("phi i64"));
    }

    #[test]
    fn test_convert_to_llvm_declares_entry_points() {
        let context = Context::create();
        let llvm_module = convert_to_llvm(&context, &copy_module(false)).unwrap();
        assert!(llvm_module.get_function("main").is_some());
        assert!(llvm_module.get_function(&invoke_symbol("main")).is_some());
        assert!(llvm_module.get_function(ALLOCATE_SYMBOL).is_some());
    }

    #[test]
    fn test_scratch_buffer_calls_allocate_hook() {
        let text = emit_llvm_ir(&copy_module(true)).unwrap();
        assert!(text.contains(&format!("call ptr @{ALLOCATE_SYMBOL}")));
    }

    #[test]
    fn test_structured_loops_rejected() {
        let f = Function::new("main", vec![memref(vec![4])], vec![]);
        let mut b = FunctionBuilder::new(f);
        b.begin_for(0, 4, 1);
        b.end_for();
        b.create_return(vec![]);
        let mut module = ir::Module::new();
        module.push_function(b.finish());

        let err = emit_llvm_ir(&module).unwrap_err();
        assert!(err.to_string().contains("affine.for"));
    }

    #[test]
    fn test_tensor_parameters_rejected() {
        let t = Type::Tensor(TensorType::new(ScalarType::F32, vec![4]));
        let mut module = ir::Module::new();
        module.push_function(Function::new("main", vec![t], vec![]));
        assert!(matches!(emit_llvm_ir(&module), Err(EngineError::Conversion { .. })));
    }
}
