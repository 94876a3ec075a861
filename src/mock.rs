//! In-memory `Process`/`Target` fixtures for tests and benchmarks.
//!
//! Grounded in the core allocator's own style of exercising behavior
//! through small, fully in-process doubles rather than a live target —
//! see the allocator's own deterministic-trace test. Exposed as a
//! regular module (not `#[cfg(test)]`-gated) so both this crate's unit
//! tests and its `tests/` integration suite can share one fixture.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::address::{ByteOrderKind, Permissions};
use crate::error::{MemoryMapError, Result};
use crate::external::{Process, Target};

/// A fake remote process backed by a handful of in-memory regions.
pub struct MockProcess {
    alive: Cell<bool>,
    supports_jit: Cell<bool>,
    byte_order: ByteOrderKind,
    address_byte_size: usize,
    next_addr: Cell<u64>,
    regions: RefCell<HashMap<u64, Vec<u8>>>,
    dealloc_calls: RefCell<Vec<u64>>,
    fail_next_alloc: Cell<bool>,
}

impl MockProcess {
    #[must_use]
    pub fn new(byte_order: ByteOrderKind, address_byte_size: usize) -> Self {
        Self::starting_at(0, byte_order, address_byte_size)
    }

    #[must_use]
    pub fn starting_at(base: u64, byte_order: ByteOrderKind, address_byte_size: usize) -> Self {
        Self {
            alive: Cell::new(true),
            supports_jit: Cell::new(true),
            byte_order,
            address_byte_size,
            next_addr: Cell::new(base),
            regions: RefCell::new(HashMap::new()),
            dealloc_calls: RefCell::new(Vec::new()),
            fail_next_alloc: Cell::new(false),
        }
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.set(alive);
    }

    pub fn set_supports_jit(&self, supports_jit: bool) {
        self.supports_jit.set(supports_jit);
    }

    pub fn fail_next_alloc(&self) {
        self.fail_next_alloc.set(true);
    }

    /// Addresses passed to `deallocate`, in call order.
    #[must_use]
    pub fn dealloc_calls(&self) -> Vec<u64> {
        self.dealloc_calls.borrow().clone()
    }

    fn region_for(&self, addr: u64, size: u64) -> Option<u64> {
        self.regions
            .borrow()
            .iter()
            .find(|(base, buf)| addr >= **base && addr + size <= **base + buf.len() as u64)
            .map(|(&base, _)| base)
    }
}

impl Process for MockProcess {
    fn alive(&self) -> bool {
        self.alive.get()
    }

    fn supports_jit(&self) -> bool {
        self.supports_jit.get()
    }

    fn allocate(&self, size: u64, _permissions: Permissions) -> Result<u64> {
        if self.fail_next_alloc.replace(false) {
            return Err(MemoryMapError::RemoteAllocFailed {
                size,
                message: "mock remote allocator is out of memory".into(),
            });
        }
        let addr = self.next_addr.get();
        self.next_addr.set(addr + size);
        self.regions
            .borrow_mut()
            .insert(addr, vec![0xAAu8; size as usize]);
        Ok(addr)
    }

    fn zero_allocate(&self, size: u64, permissions: Permissions) -> Result<u64> {
        let addr = self.allocate(size, permissions)?;
        if let Some(region) = self.regions.borrow_mut().get_mut(&addr) {
            region.iter_mut().for_each(|b| *b = 0);
        }
        Ok(addr)
    }

    fn deallocate(&self, addr: u64) -> Result<()> {
        self.dealloc_calls.borrow_mut().push(addr);
        self.regions.borrow_mut().remove(&addr);
        Ok(())
    }

    fn read(&self, addr: u64, out: &mut [u8]) -> Result<()> {
        let size = out.len() as u64;
        let base = self
            .region_for(addr, size)
            .ok_or(MemoryMapError::OutOfRange { addr, size })?;
        let regions = self.regions.borrow();
        let region = &regions[&base];
        let offset = (addr - base) as usize;
        out.copy_from_slice(&region[offset..offset + out.len()]);
        Ok(())
    }

    fn write(&self, addr: u64, bytes: &[u8]) -> Result<()> {
        let size = bytes.len() as u64;
        let base = self
            .region_for(addr, size)
            .ok_or(MemoryMapError::OutOfRange { addr, size })?;
        let mut regions = self.regions.borrow_mut();
        let region = regions.get_mut(&base).expect("region_for found it");
        let offset = (addr - base) as usize;
        region[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn byte_order(&self) -> ByteOrderKind {
        self.byte_order
    }

    fn address_byte_size(&self) -> usize {
        self.address_byte_size
    }
}

/// A fake architecture/target descriptor with optional static memory.
pub struct MockTarget {
    byte_order: ByteOrderKind,
    address_byte_size: usize,
    static_memory: RefCell<HashMap<u64, Vec<u8>>>,
}

impl MockTarget {
    #[must_use]
    pub fn new(byte_order: ByteOrderKind, address_byte_size: usize) -> Self {
        Self {
            byte_order,
            address_byte_size,
            static_memory: RefCell::new(HashMap::new()),
        }
    }

    pub fn set_static_memory(&self, addr: u64, bytes: Vec<u8>) {
        self.static_memory.borrow_mut().insert(addr, bytes);
    }
}

impl Target for MockTarget {
    fn byte_order(&self) -> ByteOrderKind {
        self.byte_order
    }

    fn address_byte_size(&self) -> usize {
        self.address_byte_size
    }

    fn read_static(&self, addr: u64, out: &mut [u8]) -> Result<()> {
        let size = out.len() as u64;
        let memory = self.static_memory.borrow();
        let base = memory
            .iter()
            .find(|(base, buf)| addr >= **base && addr + size <= **base + buf.len() as u64)
            .map(|(&base, _)| base)
            .ok_or(MemoryMapError::OutOfRange { addr, size })?;
        let offset = (addr - base) as usize;
        out.copy_from_slice(&memory[&base][offset..offset + out.len()]);
        Ok(())
    }
}
