//! The dual-space memory map itself.

use std::rc::{Rc, Weak};

use crate::address::{
    ByteOrderKind, INVALID_ADDR, INVALID_ADDRESS_BYTE_SIZE, PERM_READ, PERM_WRITE, Permissions,
};
use crate::allocation::Allocation;
use crate::error::{MemoryMapError, Result};
use crate::external::{Process, Target};
use crate::index::AllocationIndex;
use crate::log::{MapLog, MapLogLevel, MapLogRecord};
use crate::policy::AllocationPolicy;
use crate::scalar::{self, USE_NATURAL_SIZE};

/// Rounds `size` up to the next multiple of `alignment`, except that a
/// `size` already a multiple of `alignment` is returned unchanged
/// (i.e. it is never padded to the *next* multiple). When `size` is
/// zero, the allocation size becomes `alignment`.
///
/// This reproduces the source's rounding expression exactly, including
/// the case where a non-multiple size is padded by adding a full
/// `alignment` before masking, which can over-pad by up to
/// `alignment - 1` bytes beyond the minimal next multiple. Do not
/// "fix" this; the test suite in `tests/` asserts it.
#[must_use]
pub fn round_alloc_size(size: u64, alignment: u64) -> u64 {
    if size == 0 {
        return alignment;
    }
    let mask = alignment - 1;
    if size & mask != 0 {
        (size + alignment) & !mask
    } else {
        size
    }
}

/// A host/remote dual-space memory map.
///
/// Holds only weak references to its process and target collaborators
/// (see [`crate::external`]); every method re-resolves them for the
/// duration of the call and takes the degraded path if resolution
/// fails. Not `Send`/`Sync`: the map is single-threaded by contract,
/// and callers must serialize access to a shared instance themselves.
pub struct MemoryMap {
    index: AllocationIndex,
    process: Option<Weak<dyn Process>>,
    target: Option<Weak<dyn Target>>,
    log: MapLog,
}

impl MemoryMap {
    /// A map with neither a remote process nor a target attached. All
    /// allocations degrade to `HostOnly`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            index: AllocationIndex::new(),
            process: None,
            target: None,
            log: MapLog::default(),
        }
    }

    #[must_use]
    pub fn with_process(process: &Rc<dyn Process>) -> Self {
        let mut map = Self::new();
        map.attach_process(process);
        map
    }

    #[must_use]
    pub fn with_target(target: &Rc<dyn Target>) -> Self {
        let mut map = Self::new();
        map.attach_target(target);
        map
    }

    #[must_use]
    pub fn with_process_and_target(process: &Rc<dyn Process>, target: &Rc<dyn Target>) -> Self {
        let mut map = Self::new();
        map.attach_process(process);
        map.attach_target(target);
        map
    }

    pub fn attach_process(&mut self, process: &Rc<dyn Process>) {
        self.process = Some(Rc::downgrade(process));
    }

    pub fn attach_target(&mut self, target: &Rc<dyn Target>) {
        self.target = Some(Rc::downgrade(target));
    }

    fn live_process(&self) -> Option<Rc<dyn Process>> {
        self.process.as_ref()?.upgrade().filter(|p| p.alive())
    }

    fn live_jit_process(&self) -> Option<Rc<dyn Process>> {
        self.live_process().filter(|p| p.supports_jit())
    }

    /// Pushes a `Debug`-level map-size snapshot: active allocation count
    /// and total reserved bytes, taken after every state-changing
    /// operation.
    fn record_map_stats(&mut self, operation: &'static str) {
        let active_count = self.index.len() as u64;
        let total_bytes = self.index.total_size();
        self.log.push(
            MapLogLevel::Debug,
            operation,
            None,
            None,
            "snapshot",
            format!("active_count={active_count};total_bytes={total_bytes}"),
        );
    }

    /// Diagnostics accumulated so far, oldest first.
    #[must_use]
    pub fn log(&self) -> &[MapLogRecord] {
        self.log.records()
    }

    /// Removes and returns every accumulated diagnostic record.
    pub fn drain_log(&mut self) -> Vec<MapLogRecord> {
        self.log.drain()
    }

    /// The remote process's byte order; the target's architectural
    /// byte order if the process is gone; `Invalid` if neither exists.
    #[must_use]
    pub fn byte_order(&self) -> ByteOrderKind {
        if let Some(process) = self.live_process() {
            return process.byte_order();
        }
        if let Some(target) = self.target.as_ref().and_then(Weak::upgrade) {
            return target.byte_order();
        }
        ByteOrderKind::Invalid
    }

    /// Same fallback chain as [`Self::byte_order`]; `usize::MAX` if
    /// neither collaborator is available.
    #[must_use]
    pub fn address_byte_size(&self) -> usize {
        if let Some(process) = self.live_process() {
            return process.address_byte_size();
        }
        if let Some(target) = self.target.as_ref().and_then(Weak::upgrade) {
            return target.address_byte_size();
        }
        INVALID_ADDRESS_BYTE_SIZE
    }

    /// True iff some live allocation intersects `[addr, addr+size)`.
    #[must_use]
    pub fn intersects_allocation(&self, addr: u64, size: u64) -> bool {
        self.index.intersects(addr, size)
    }

    /// Finds an address suitable for a new host-only region, without
    /// recording an allocation. If a live remote process supports JIT
    /// allocation, the search is delegated to it — this actually
    /// allocates the region in the remote, so the returned address is
    /// safe from colliding with real process memory even though the
    /// region's bytes only ever live in a host shadow buffer.
    pub fn find_space(&self, size: u64) -> Result<u64> {
        match self.find_free_space(size) {
            INVALID_ADDR => Err(MemoryMapError::AddressSpaceFull { size }),
            addr => Ok(addr),
        }
    }

    fn find_free_space(&self, size: u64) -> u64 {
        if let Some(process) = self.live_jit_process() {
            return process
                .allocate(size, PERM_READ | PERM_WRITE)
                .unwrap_or(INVALID_ADDR);
        }
        self.index.host_only_next_address()
    }

    /// Allocates a region of at least `size` bytes, `alignment`-aligned,
    /// under `policy`. Returns the user-visible `aligned_start`.
    pub fn malloc(
        &mut self,
        size: u64,
        alignment: u64,
        permissions: Permissions,
        policy: AllocationPolicy,
        zero_memory: bool,
    ) -> Result<u64> {
        let alloc_size = round_alloc_size(size, alignment);
        let mask = alignment - 1;

        let (raw_start, effective_policy) = match policy {
            AllocationPolicy::HostOnly => {
                let raw = self.find_free_space(alloc_size);
                if raw == INVALID_ADDR {
                    self.log.push(
                        MapLogLevel::Warn,
                        "malloc",
                        None,
                        Some(alloc_size),
                        "denied",
                        "host_only_address_space_full",
                    );
                    return Err(MemoryMapError::AddressSpaceFull { size: alloc_size });
                }
                (raw, AllocationPolicy::HostOnly)
            }
            AllocationPolicy::Mirror => match self.live_jit_process() {
                Some(process) => {
                    let raw = remote_alloc(&process, alloc_size, permissions, zero_memory)?;
                    (raw, AllocationPolicy::Mirror)
                }
                None => {
                    let raw = self.find_free_space(alloc_size);
                    if raw == INVALID_ADDR {
                        return Err(MemoryMapError::AddressSpaceFull { size: alloc_size });
                    }
                    self.log.push(
                        MapLogLevel::Info,
                        "malloc",
                        None,
                        Some(alloc_size),
                        "downgraded",
                        "mirror_downgraded_to_host_only",
                    );
                    (raw, AllocationPolicy::HostOnly)
                }
            },
            AllocationPolicy::ProcessOnly => {
                let Some(process) = self.live_process() else {
                    return Err(MemoryMapError::RemoteRequired);
                };
                if !process.supports_jit() {
                    return Err(MemoryMapError::RemoteUnsupported);
                }
                let raw = remote_alloc(&process, alloc_size, permissions, zero_memory)?;
                (raw, AllocationPolicy::ProcessOnly)
            }
        };

        let aligned_start = (raw_start + mask) & !mask;
        let shadow = match effective_policy {
            AllocationPolicy::ProcessOnly => None,
            _ => Some(vec![0u8; alloc_size as usize]),
        };

        self.index.insert(Allocation {
            raw_start,
            aligned_start,
            size: alloc_size,
            permissions,
            alignment,
            policy: effective_policy,
            shadow,
            leak: false,
        });

        self.log.push(
            MapLogLevel::Trace,
            "malloc",
            Some(aligned_start),
            Some(alloc_size),
            "success",
            format!("policy={effective_policy:?}"),
        );
        self.record_map_stats("malloc");
        Ok(aligned_start)
    }

    /// Frees the allocation at the exact address `aligned_start`
    /// returned by `malloc`.
    pub fn free(&mut self, addr: u64) -> Result<()> {
        let Some(allocation) = self.index.remove(addr) else {
            self.log
                .push(MapLogLevel::Warn, "free", Some(addr), None, "not_found", "");
            return Err(MemoryMapError::NotFound { addr });
        };

        match allocation.policy {
            AllocationPolicy::HostOnly => {
                if let Some(process) = self.live_jit_process() {
                    let _ = process.deallocate(allocation.raw_start);
                }
            }
            AllocationPolicy::Mirror | AllocationPolicy::ProcessOnly => {
                if let Some(process) = self.live_process() {
                    let _ = process.deallocate(allocation.raw_start);
                }
            }
        }

        self.log
            .push(MapLogLevel::Trace, "free", Some(addr), None, "success", "");
        self.record_map_stats("free");
        Ok(())
    }

    /// Marks the allocation at `addr` as not-to-be-freed on shutdown.
    /// Idempotent: leaking an already-leaked allocation is a no-op.
    pub fn leak(&mut self, addr: u64) -> Result<()> {
        match self.index.get_mut(addr) {
            Some(allocation) => {
                allocation.leak = true;
                self.log
                    .push(MapLogLevel::Trace, "leak", Some(addr), None, "success", "");
                Ok(())
            }
            None => {
                self.log
                    .push(MapLogLevel::Warn, "leak", Some(addr), None, "not_found", "");
                Err(MemoryMapError::NotFound { addr })
            }
        }
    }

    /// Writes `bytes` at `addr`.
    pub fn write_memory(&mut self, addr: u64, bytes: &[u8]) -> Result<()> {
        let size = bytes.len() as u64;
        let process = self.live_process();

        match self.index.find_containing_mut(addr, size) {
            None => match &process {
                Some(process) => process.write(addr, bytes),
                None => {
                    self.log.push(
                        MapLogLevel::Warn,
                        "write_memory",
                        Some(addr),
                        Some(size),
                        "out_of_range",
                        "",
                    );
                    Err(MemoryMapError::OutOfRange { addr, size })
                }
            },
            Some(allocation) => {
                let offset = allocation.offset_of(addr) as usize;
                match allocation.policy {
                    AllocationPolicy::HostOnly => {
                        let shadow = allocation
                            .shadow
                            .as_mut()
                            .ok_or(MemoryMapError::EmptyShadow { addr })?;
                        shadow[offset..offset + bytes.len()].copy_from_slice(bytes);
                        Ok(())
                    }
                    AllocationPolicy::Mirror => {
                        let shadow = allocation
                            .shadow
                            .as_mut()
                            .ok_or(MemoryMapError::EmptyShadow { addr })?;
                        shadow[offset..offset + bytes.len()].copy_from_slice(bytes);
                        if let Some(process) = &process {
                            process.write(addr, bytes)?;
                        }
                        Ok(())
                    }
                    AllocationPolicy::ProcessOnly => {
                        if let Some(process) = &process {
                            process.write(addr, bytes)?;
                        }
                        Ok(())
                    }
                }
            }
        }
    }

    /// Reads `out.len()` bytes from `addr` into `out`.
    pub fn read_memory(&mut self, out: &mut [u8], addr: u64) -> Result<()> {
        let size = out.len() as u64;
        let process = self.live_process();
        let target = self.target.as_ref().and_then(Weak::upgrade);

        match self.index.find_containing(addr, size) {
            None => {
                if let Some(process) = &process {
                    return process.read(addr, out);
                }
                if let Some(target) = &target {
                    return target.read_static(addr, out);
                }
                self.log.push(
                    MapLogLevel::Warn,
                    "read_memory",
                    Some(addr),
                    Some(size),
                    "out_of_range",
                    "",
                );
                Err(MemoryMapError::OutOfRange { addr, size })
            }
            Some(allocation) => {
                let offset = allocation.offset_of(addr);
                if offset > allocation.size {
                    self.log.push(
                        MapLogLevel::Warn,
                        "read_memory",
                        Some(addr),
                        Some(size),
                        "out_of_range",
                        "",
                    );
                    return Err(MemoryMapError::OutOfRange { addr, size });
                }
                let offset = offset as usize;
                match allocation.policy {
                    AllocationPolicy::HostOnly => read_from_shadow(allocation, offset, out),
                    AllocationPolicy::Mirror => match &process {
                        Some(process) => process.read(addr, out),
                        None => read_from_shadow(allocation, offset, out),
                    },
                    AllocationPolicy::ProcessOnly => match &process {
                        Some(process) => process.read(addr, out),
                        None => Ok(()),
                    },
                }
            }
        }
    }

    /// Bytes from `addr` to the end of its containing allocation.
    pub fn get_alloc_size(&self, addr: u64) -> Result<u64> {
        match self.index.predecessor(addr) {
            Some(allocation) if addr < allocation.end() => Ok(allocation.end() - addr),
            _ => Err(MemoryMapError::NotFound { addr }),
        }
    }

    /// A byte view of `size` bytes at `addr` suitable for structured
    /// decoding. `Mirror` refreshes its entire shadow from the remote
    /// first; `ProcessOnly` has no host view at all.
    pub fn get_memory_data(&mut self, addr: u64, size: u64) -> Result<Vec<u8>> {
        let process = self.live_process();

        match self.index.find_containing_mut(addr, size) {
            None => {
                self.log.push(
                    MapLogLevel::Warn,
                    "get_memory_data",
                    Some(addr),
                    Some(size),
                    "out_of_range",
                    "",
                );
                Err(MemoryMapError::OutOfRange { addr, size })
            }
            Some(allocation) => match allocation.policy {
                AllocationPolicy::ProcessOnly => Err(MemoryMapError::HostUnavailable { addr }),
                AllocationPolicy::Mirror => {
                    if let Some(process) = &process {
                        let full_size = allocation.size as usize;
                        let shadow = allocation
                            .shadow
                            .as_mut()
                            .ok_or(MemoryMapError::EmptyShadow { addr })?;
                        process.read(allocation.aligned_start, &mut shadow[..full_size])?;
                    }
                    let offset = allocation.offset_of(addr) as usize;
                    view_from_shadow(allocation, offset, size as usize, addr)
                }
                AllocationPolicy::HostOnly => {
                    let offset = allocation.offset_of(addr) as usize;
                    view_from_shadow(allocation, offset, size as usize, addr)
                }
            },
        }
    }

    /// Encodes `value` in the current byte order and writes it at
    /// `addr`. `size` is the width in bytes, or [`USE_NATURAL_SIZE`]
    /// to use the natural width of a `u64` (8 bytes).
    pub fn write_scalar(&mut self, addr: u64, value: u64, size: u64) -> Result<()> {
        if size == 0 {
            return Err(MemoryMapError::ZeroSize);
        }
        let width = if size == USE_NATURAL_SIZE { 8 } else { size };
        let order = self.byte_order();
        let buf = scalar::encode_scalar(value, width, order)?;
        self.write_memory(addr, &buf[..width as usize])
    }

    /// Reads a `size`-byte unsigned integer at `addr` in the current
    /// byte order. `size` must be one of {1, 2, 4, 8}.
    pub fn read_scalar(&mut self, addr: u64, size: u64) -> Result<u64> {
        let width = scalar::scalar_width(size)?;
        let mut buf = vec![0u8; width];
        self.read_memory(&mut buf, addr)?;
        scalar::decode_scalar(&buf, self.byte_order())
    }

    /// Shorthand for `write_scalar` at [`Self::address_byte_size`].
    pub fn write_pointer(&mut self, addr: u64, value: u64) -> Result<()> {
        self.write_scalar(addr, value, self.address_byte_size() as u64)
    }

    /// Shorthand for `read_scalar` at [`Self::address_byte_size`].
    pub fn read_pointer(&mut self, addr: u64) -> Result<u64> {
        self.read_scalar(addr, self.address_byte_size() as u64)
    }
}

impl Default for MemoryMap {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryMap {
    fn drop(&mut self) {
        let entries = self.index.drain();
        let mut freed = 0u64;
        let mut leaked = 0u64;

        for allocation in entries {
            if allocation.leak {
                leaked += 1;
                continue;
            }
            match allocation.policy {
                AllocationPolicy::HostOnly => {
                    if let Some(process) = self.live_jit_process() {
                        let _ = process.deallocate(allocation.raw_start);
                    }
                }
                AllocationPolicy::Mirror | AllocationPolicy::ProcessOnly => {
                    if let Some(process) = self.live_process() {
                        let _ = process.deallocate(allocation.raw_start);
                    }
                }
            }
            freed += 1;
        }

        self.log.push(
            MapLogLevel::Info,
            "shutdown",
            None,
            None,
            "complete",
            format!("freed={freed} leaked={leaked}"),
        );
    }
}

fn remote_alloc(
    process: &Rc<dyn Process>,
    size: u64,
    permissions: Permissions,
    zero_memory: bool,
) -> Result<u64> {
    let result = if zero_memory {
        process.zero_allocate(size, permissions)
    } else {
        process.allocate(size, permissions)
    };
    result.map_err(|err| match err {
        MemoryMapError::RemoteAllocFailed { .. } | MemoryMapError::RemoteIoFailed { .. } => err,
        other => MemoryMapError::RemoteAllocFailed {
            size,
            message: other.to_string(),
        },
    })
}

fn read_from_shadow(allocation: &Allocation, offset: usize, out: &mut [u8]) -> Result<()> {
    let addr = allocation.aligned_start + offset as u64;
    let shadow = allocation
        .shadow
        .as_ref()
        .ok_or(MemoryMapError::EmptyShadow { addr })?;
    if offset + out.len() > shadow.len() {
        return Err(MemoryMapError::ShortShadow {
            offset: offset as u64,
            size: out.len() as u64,
        });
    }
    out.copy_from_slice(&shadow[offset..offset + out.len()]);
    Ok(())
}

fn view_from_shadow(
    allocation: &Allocation,
    offset: usize,
    size: usize,
    addr: u64,
) -> Result<Vec<u8>> {
    let shadow = allocation
        .shadow
        .as_ref()
        .ok_or(MemoryMapError::EmptyShadow { addr })?;
    if offset + size > shadow.len() {
        return Err(MemoryMapError::ShortShadow {
            offset: offset as u64,
            size: size as u64,
        });
    }
    Ok(shadow[offset..offset + size].to_vec())
}
