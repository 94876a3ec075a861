//! # expr-memmap
//!
//! A dual-space memory map for an expression evaluator's JIT allocator:
//! it lets the host allocate, read, and write regions that live only on
//! the host, only inside a remote (inferior) process, or mirrored on
//! both sides, addressing every region uniformly by a remote-style
//! address.
//!
//! This crate owns the interval allocator, the three allocation
//! policies and their read/write semantics, degraded-mode fallback
//! when the remote is unavailable, and endian/pointer-width-correct
//! scalar marshalling. It does not own the remote process, the target
//! descriptor, or any higher-level expression machinery — those are
//! consumed through the [`external`] traits.
#![deny(unsafe_code)]

pub mod address;
pub mod allocation;
pub mod error;
pub mod external;
pub mod index;
pub mod log;
pub mod map;
pub mod mock;
pub mod policy;
pub mod scalar;

pub use address::{
    ByteOrderKind, INVALID_ADDR, INVALID_ADDRESS_BYTE_SIZE, PERM_EXEC, PERM_READ, PERM_WRITE,
    Permissions,
};
pub use allocation::Allocation;
pub use error::{MemoryMapError, Result};
pub use external::{Process, Target};
pub use log::{MapLog, MapLogLevel, MapLogRecord};
pub use map::{MemoryMap, round_alloc_size};
pub use policy::AllocationPolicy;
pub use scalar::USE_NATURAL_SIZE;
