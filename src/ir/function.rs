//! Modules, functions and blocks.
//!
//! A [`Function`] owns the type of every value it defines. Values are plain
//! indices ([`ValueId`]) into that table, so ops stay cheap to clone and
//! rewrite.

use super::ops::{walk_ops, Op};
use super::types::Type;
use std::fmt;

/// SSA value handle, local to one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Block handle, local to one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "^bb{}", self.0)
    }
}

/// Straight-line list of ops with optional block arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub args: Vec<ValueId>,
    pub ops: Vec<Op>,
}

impl Block {
    pub fn terminator(&self) -> Option<&Op> {
        self.ops.last().filter(|op| op.is_terminator())
    }
}

/// A function with formal parameters and declared result types.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    values: Vec<Type>,
    params: Vec<ValueId>,
    result_types: Vec<Type>,
    pub blocks: Vec<Block>,
}

impl Function {
    /// Create a function with one value per parameter type and no blocks.
    pub fn new(name: impl Into<String>, param_types: Vec<Type>, result_types: Vec<Type>) -> Self {
        let mut function = Self {
            name: name.into(),
            values: Vec::new(),
            params: Vec::new(),
            result_types,
            blocks: Vec::new(),
        };
        function.params = param_types
            .into_iter()
            .map(|ty| function.new_value(ty))
            .collect();
        function
    }

    /// Append the entry block. Must be the first block added.
    pub fn add_entry_block(&mut self) -> BlockId {
        debug_assert!(self.blocks.is_empty(), "entry block already exists");
        self.push_block(Vec::new())
    }

    pub fn push_block(&mut self, args: Vec<ValueId>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block { args, ops: Vec::new() });
        id
    }

    pub fn new_value(&mut self, ty: Type) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(ty);
        id
    }

    pub fn value_type(&self, value: ValueId) -> &Type {
        &self.values[value.0 as usize]
    }

    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    pub fn params(&self) -> &[ValueId] {
        &self.params
    }

    pub fn param(&self, index: usize) -> ValueId {
        self.params[index]
    }

    pub fn num_params(&self) -> usize {
        self.params.len()
    }

    pub fn param_types(&self) -> impl Iterator<Item = &Type> + '_ {
        self.params.iter().map(|p| self.value_type(*p))
    }

    pub fn result_types(&self) -> &[Type] {
        &self.result_types
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.0 as usize]
    }

    pub fn entry_block(&self) -> Option<&Block> {
        self.blocks.first()
    }

    /// Visit every op in every block, loop bodies included.
    pub fn walk<'a>(&'a self, mut f: impl FnMut(&'a Op)) {
        for block in &self.blocks {
            walk_ops(&block.ops, &mut f);
        }
    }

    /// Count ops matching `pred` anywhere in the function.
    pub fn count_ops(&self, mut pred: impl FnMut(&Op) -> bool) -> usize {
        let mut count = 0;
        self.walk(|op| {
            if pred(op) {
                count += 1;
            }
        });
        count
    }
}

/// Top-level container handed between pipeline stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    functions: Vec<Function>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_function(&mut self, function: Function) {
        self.functions.push(function);
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn functions_mut(&mut self) -> &mut [Function] {
        &mut self.functions
    }

    pub fn named_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn named_function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::{ScalarType, TensorType};

    #[test]
    fn test_params_get_values_in_order() {
        let t = Type::Tensor(TensorType::new(ScalarType::F32, vec![4]));
        let f = Function::new("main", vec![t.clone(), t.clone()], vec![t.clone()]);
        assert_eq!(f.params(), &[ValueId(0), ValueId(1)]);
        assert_eq!(f.value_type(ValueId(1)), &t);
        assert_eq!(f.result_types().len(), 1);
    }

    #[test]
    fn test_named_function_lookup() {
        let mut module = Module::new();
        module.push_function(Function::new("main", vec![], vec![]));
        assert!(module.named_function("main").is_some());
        assert!(module.named_function("other").is_none());
    }
}
