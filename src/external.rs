//! Collaborator interfaces the map consumes but does not own.
//!
//! The map holds only weak references to implementors of these traits
//! (see [`crate::map::MemoryMap`]); it never decides their lifetime.

use crate::address::{ByteOrderKind, Permissions};
use crate::error::Result;

/// Read-only description of the debuggee's architecture and its
/// static (file-backed) memory.
pub trait Target {
    /// Architectural byte order.
    fn byte_order(&self) -> ByteOrderKind;
    /// Architectural pointer width, in bytes.
    fn address_byte_size(&self) -> usize;
    /// Reads `out.len()` bytes of static memory (e.g. a loaded
    /// section) at `addr`. Fails if no such static memory exists.
    fn read_static(&self, addr: u64, out: &mut [u8]) -> Result<()>;
}

/// The remote (inferior) process under examination. May be absent or
/// may refuse JIT allocation even while alive.
pub trait Process {
    /// Whether the process is still attached and usable.
    fn alive(&self) -> bool;
    /// Whether the process supports allocating JIT memory at all.
    fn supports_jit(&self) -> bool;
    /// Allocates `size` bytes with `permissions`, uninitialized.
    fn allocate(&self, size: u64, permissions: Permissions) -> Result<u64>;
    /// Allocates `size` bytes with `permissions`, zero-initialized.
    fn zero_allocate(&self, size: u64, permissions: Permissions) -> Result<u64>;
    /// Releases a previously allocated remote region.
    fn deallocate(&self, addr: u64) -> Result<()>;
    /// Reads `out.len()` bytes from the remote at `addr`.
    fn read(&self, addr: u64, out: &mut [u8]) -> Result<()>;
    /// Writes `bytes` to the remote at `addr`.
    fn write(&self, addr: u64, bytes: &[u8]) -> Result<()>;
    /// Byte order of the remote process.
    fn byte_order(&self) -> ByteOrderKind;
    /// Pointer width of the remote process, in bytes.
    fn address_byte_size(&self) -> usize;
}
