//! Tensor to IR value binding table.
//!
//! Each tensor is bound exactly once: function parameters are bound when the
//! signature is built, op results when their node is lowered. Rebinding or
//! reading an unbound tensor means the build order is broken and aborts.

use crate::graph::TensorId;
use crate::ir::ValueId;
use crate::jit_fail;
use hashbrown::hash_map::Entry;
use hashbrown::HashMap;

/// What the table records for a bound tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorInfo {
    pub value: ValueId,
}

#[derive(Debug, Default)]
pub struct ValueBindingTable {
    map: HashMap<TensorId, TensorInfo>,
}

impl ValueBindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `tensor` to `value`. Aborts if the tensor already has a value.
    pub fn bind(&mut self, tensor: TensorId, value: ValueId) {
        match self.map.entry(tensor) {
            Entry::Occupied(_) => jit_fail!("tensor value already defined: {:?}", tensor),
            Entry::Vacant(slot) => {
                log::trace!("bind {:?} -> {}", tensor, value);
                slot.insert(TensorInfo { value });
            }
        }
    }

    /// Value bound to `tensor`. Aborts if there is none.
    pub fn get(&self, tensor: TensorId) -> TensorInfo {
        match self.map.get(&tensor) {
            Some(info) => *info,
            None => jit_fail!("Undefined tensor: {:?}", tensor),
        }
    }

    pub fn value(&self, tensor: TensorId) -> ValueId {
        self.get(tensor).value
    }

    pub fn contains(&self, tensor: TensorId) -> bool {
        self.map.contains_key(&tensor)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_and_get() {
        let mut table = ValueBindingTable::new();
        table.bind(TensorId(4), ValueId(0));
        table.bind(TensorId(7), ValueId(1));
        assert_eq!(table.value(TensorId(7)), ValueId(1));
        assert!(table.contains(TensorId(4)));
        assert_eq!(table.len(), 2);
    }

    #[test]
    #[should_panic(expected = "tensor value already defined")]
    fn test_double_bind_rejected() {
        let mut table = ValueBindingTable::new();
        table.bind(TensorId(1), ValueId(0));
        table.bind(TensorId(1), ValueId(2));
    }

    #[test]
    #[should_panic(expected = "Undefined tensor")]
    fn test_unbound_lookup_rejected() {
        let table = ValueBindingTable::new();
        table.get(TensorId(9));
    }
}
