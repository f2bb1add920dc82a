// This module builds the type-erased argument list handed to the packed entry point. One heap
// descriptor is allocated per memref parameter of the compiled function; a descriptor only
// borrows the caller's buffer through its data pointer and owns nothing but itself. The
// memory-manager handle goes into one more heap cell appended right after the last memref
// slot, which must be the function's memory-manager parameter index. Descriptors and the
// manager cell are released when the pack is dropped, never the buffers they point at. A
// shared live counter tracks how many slots exist so cleanup can be observed from outside.

//! Argument descriptors for JIT invocation.

use crate::core::MemoryManager;
use crate::ir::{Function, Type};
use crate::jit_assert;
use std::cell::Cell;
use std::ffi::c_void;
use std::ptr;
use std::rc::Rc;

/// Native view of a memref argument. Only the data pointer is carried.
#[repr(C)]
#[derive(Debug)]
pub struct MemRefDescriptor {
    pub data: *mut c_void,
}

#[derive(Debug)]
enum ArgSlot {
    MemRef(Box<MemRefDescriptor>),
    MemoryManager(Box<*mut MemoryManager>),
}

/// Owned argument slots for one invocation.
#[derive(Debug)]
pub struct ArgumentPack {
    slots: Vec<ArgSlot>,
    live: Rc<Cell<usize>>,
}

impl ArgumentPack {
    /// Allocate one empty descriptor per memref parameter of `function`.
    ///
    /// Aborts on parameters with dynamic dimensions.
    pub fn allocate_memref_args(function: &Function, live: Rc<Cell<usize>>) -> Self {
        let mut pack = Self {
            slots: Vec::with_capacity(function.num_params()),
            live,
        };
        for ty in function.param_types() {
            if let Type::MemRef(memref) = ty {
                jit_assert!(
                    memref.num_dynamic_dims() == 0,
                    "Dynamic shapes are not supported: {}",
                    ty
                );
                pack.push(ArgSlot::MemRef(Box::new(MemRefDescriptor {
                    data: ptr::null_mut(),
                })));
            }
        }
        log::trace!("allocated {} argument descriptors", pack.len());
        pack
    }

    fn push(&mut self, slot: ArgSlot) {
        self.slots.push(slot);
        self.live.set(self.live.get() + 1);
    }

    /// Point descriptor `i` at `pointers[i]`, in parameter order.
    ///
    /// Aborts unless there is exactly one pointer per descriptor.
    pub fn bind_data_pointers(&mut self, pointers: &[*mut c_void]) {
        let descriptors = self.num_descriptors();
        jit_assert!(
            descriptors == pointers.len(),
            "Number of external tensors doesn't match number of function params: {} vs {}",
            pointers.len(),
            descriptors
        );
        let memrefs = self.slots.iter_mut().filter_map(|slot| match slot {
            ArgSlot::MemRef(descriptor) => Some(descriptor),
            ArgSlot::MemoryManager(_) => None,
        });
        for (descriptor, pointer) in memrefs.zip(pointers) {
            descriptor.data = *pointer;
        }
    }

    /// Append the memory-manager cell; it must land at `expected_slot`.
    pub fn push_memory_manager(&mut self, mem_mgr: *mut MemoryManager, expected_slot: usize) {
        jit_assert!(
            self.slots.len() == expected_slot,
            "Memory manager slot mismatch: slot {} but the function expects {}",
            self.slots.len(),
            expected_slot
        );
        self.push(ArgSlot::MemoryManager(Box::new(mem_mgr)));
    }

    /// Type-erased pointer to every slot, in order.
    pub fn as_mut_ptrs(&mut self) -> Vec<*mut c_void> {
        self.slots
            .iter_mut()
            .map(|slot| match slot {
                ArgSlot::MemRef(descriptor) => {
                    &mut **descriptor as *mut MemRefDescriptor as *mut c_void
                }
                ArgSlot::MemoryManager(cell) => &mut **cell as *mut *mut MemoryManager as *mut c_void,
            })
            .collect()
    }

    /// Memref descriptor at slot `index`, if that slot is one.
    pub fn descriptor(&self, index: usize) -> Option<&MemRefDescriptor> {
        match self.slots.get(index)? {
            ArgSlot::MemRef(descriptor) => Some(descriptor),
            ArgSlot::MemoryManager(_) => None,
        }
    }

    pub fn num_descriptors(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot, ArgSlot::MemRef(_)))
            .count()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Drop for ArgumentPack {
    fn drop(&mut self) {
        self.live.set(self.live.get() - self.slots.len());
    }
}

/// Index of the memory-manager parameter: the last one.
pub fn mem_mgr_arg_id(function: &Function) -> usize {
    let last = function.num_params().saturating_sub(1);
    jit_assert!(
        function.param_types().last() == Some(&Type::MemoryManager),
        "@{} has no trailing memory manager parameter",
        function.name
    );
    last
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Dim, MemRefType, ScalarType};

    fn lowered_signature(dims: Vec<Dim>) -> Function {
        let memref = Type::MemRef(MemRefType::new(ScalarType::F32, dims));
        Function::new(
            "main",
            vec![memref.clone(), memref.clone(), memref, Type::MemoryManager],
            vec![],
        )
    }

    #[test]
    fn test_pack_layout() {
        let f = lowered_signature(vec![Dim::Static(4)]);
        let live = Rc::new(Cell::new(0));
        let mut buffers = [[0f32; 4]; 3];
        let pointers: Vec<*mut c_void> = buffers
            .iter_mut()
            .map(|b| b.as_mut_ptr() as *mut c_void)
            .collect();
        let mut manager = MemoryManager::new();

        let mut pack = ArgumentPack::allocate_memref_args(&f, live.clone());
        pack.bind_data_pointers(&pointers);
        pack.push_memory_manager(&mut manager, mem_mgr_arg_id(&f));

        assert_eq!(pack.len(), 4);
        assert_eq!(live.get(), 4);
        assert_eq!(pack.descriptor(1).map(|d| d.data), Some(pointers[1]));
        assert!(pack.descriptor(3).is_none());

        let raw = pack.as_mut_ptrs();
        let cell = unsafe { *(raw[3] as *mut *mut MemoryManager) };
        assert_eq!(cell, &mut manager as *mut MemoryManager);

        drop(pack);
        assert_eq!(live.get(), 0);
    }

    #[test]
    #[should_panic(expected = "Number of external tensors doesn't match")]
    fn test_pointer_count_mismatch() {
        let f = lowered_signature(vec![Dim::Static(4)]);
        let mut pack = ArgumentPack::allocate_memref_args(&f, Rc::new(Cell::new(0)));
        pack.bind_data_pointers(&[ptr::null_mut()]);
    }

    #[test]
    #[should_panic(expected = "Dynamic shapes are not supported")]
    fn test_dynamic_dims_rejected() {
        let f = lowered_signature(vec![Dim::Dynamic]);
        ArgumentPack::allocate_memref_args(&f, Rc::new(Cell::new(0)));
    }

    #[test]
    fn test_counter_released_on_panic() {
        let f = lowered_signature(vec![Dim::Static(2)]);
        let live = Rc::new(Cell::new(0));
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut pack = ArgumentPack::allocate_memref_args(&f, live.clone());
            pack.push_memory_manager(ptr::null_mut(), 0);
        }));
        assert!(result.is_err());
        assert_eq!(live.get(), 0);
    }
}
