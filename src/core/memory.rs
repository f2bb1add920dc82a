// This module provides the runtime memory manager handed to JIT-compiled code. Generated
// code that needs scratch buffers (temporaries that are neither inputs nor outputs) calls
// the exported subgraph_jit_allocate hook with the manager pointer it received as its last
// argument. Allocations come from a bumpalo arena and are never freed individually; the
// compiler calls free_all once per compile-and-run cycle, which resets the arena in bulk.
// Live allocation and byte counters make that round trip observable.

//! Arena-backed scratch memory for compiled code.

use bumpalo::Bump;
use std::alloc::Layout;
use std::ptr;

/// Alignment of every scratch buffer.
pub const SCRATCH_ALIGN: usize = 64;

/// Symbol name generated code calls to obtain scratch memory.
pub const ALLOCATE_SYMBOL: &str = "subgraph_jit_allocate";

/// Scratch allocator threaded into every compiled function.
#[derive(Debug, Default)]
pub struct MemoryManager {
    arena: Bump,
    live_allocations: usize,
    live_bytes: usize,
    total_allocations: usize,
}

impl MemoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate `size` bytes aligned to [`SCRATCH_ALIGN`].
    ///
    /// Returns null if the size cannot form a valid layout.
    pub fn allocate(&mut self, size: usize) -> *mut u8 {
        let layout = match Layout::from_size_align(size.max(1), SCRATCH_ALIGN) {
            Ok(layout) => layout,
            Err(_) => return ptr::null_mut(),
        };
        let block = self.arena.alloc_layout(layout);
        self.live_allocations += 1;
        self.live_bytes += size;
        self.total_allocations += 1;
        log::trace!("memmgr: allocated {} bytes ({} live)", size, self.live_allocations);
        block.as_ptr()
    }

    /// Release every allocation made since the last call.
    pub fn free_all(&mut self) {
        if self.live_allocations > 0 {
            log::debug!(
                "memmgr: freeing {} allocations ({} bytes)",
                self.live_allocations,
                self.live_bytes
            );
        }
        self.arena.reset();
        self.live_allocations = 0;
        self.live_bytes = 0;
    }

    pub fn live_allocations(&self) -> usize {
        self.live_allocations
    }

    pub fn live_bytes(&self) -> usize {
        self.live_bytes
    }

    /// Allocations made over the manager's whole lifetime.
    pub fn total_allocations(&self) -> usize {
        self.total_allocations
    }
}

/// Allocation hook called from generated code.
///
/// # Safety
///
/// `mem_mgr` must be null or point to a live [`MemoryManager`] that nothing
/// else is accessing for the duration of the call.
pub unsafe extern "C" fn subgraph_jit_allocate(mem_mgr: *mut MemoryManager, size: u64) -> *mut u8 {
    match mem_mgr.as_mut() {
        Some(manager) => manager.allocate(size as usize),
        None => ptr::null_mut(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocations_are_aligned() {
        let mut manager = MemoryManager::new();
        let a = manager.allocate(12);
        let b = manager.allocate(1);
        assert!(!a.is_null() && !b.is_null());
        assert_eq!(a as usize % SCRATCH_ALIGN, 0);
        assert_eq!(b as usize % SCRATCH_ALIGN, 0);
        assert_ne!(a, b);
    }

    #[test]
    fn test_free_all_round_trip() {
        let mut manager = MemoryManager::new();
        let before = manager.live_allocations();
        manager.allocate(256);
        manager.allocate(64);
        assert_eq!(manager.live_allocations(), 2);
        assert_eq!(manager.live_bytes(), 320);

        manager.free_all();
        assert_eq!(manager.live_allocations(), before);
        assert_eq!(manager.live_bytes(), 0);
        assert_eq!(manager.total_allocations(), 2);
    }

    #[test]
    fn test_hook_writes_through_manager() {
        let mut manager = MemoryManager::new();
        let block = unsafe { subgraph_jit_allocate(&mut manager, 16) };
        assert!(!block.is_null());
        unsafe { block.write_bytes(0xAB, 16) };
        assert_eq!(manager.live_allocations(), 1);

        let null = unsafe { subgraph_jit_allocate(ptr::null_mut(), 16) };
        assert!(null.is_null());
    }
}
