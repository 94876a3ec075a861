//! Error taxonomy for the dual-space memory map.

use thiserror::Error;

/// Every failure kind a [`crate::MemoryMap`] operation can return.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryMapError {
    /// An `AllocationPolicy` value reached a branch that should be
    /// unreachable by contract; defensive only.
    #[error("invalid allocation policy")]
    InvalidPolicy,

    /// The host pseudo-heap search produced `INVALID_ADDR`.
    #[error("host address space exhausted while allocating {size} bytes")]
    AddressSpaceFull { size: u64 },

    /// The remote allocator returned an error.
    #[error("remote allocation of {size} bytes failed: {message}")]
    RemoteAllocFailed { size: u64, message: String },

    /// `ProcessOnly` was requested but there is no remote process.
    #[error("process-only allocation requires a live remote process")]
    RemoteRequired,

    /// The remote is alive but cannot satisfy JIT allocation requests.
    #[error("remote process does not support JIT allocation")]
    RemoteUnsupported,

    /// `Free`/`Leak` referenced an `aligned_start` with no allocation.
    #[error("no allocation at address {addr:#x}")]
    NotFound { addr: u64 },

    /// A read/write range is covered by no allocation and no remote or
    /// target fallback is available.
    #[error("address range {addr:#x}..+{size} is out of range")]
    OutOfRange { addr: u64, size: u64 },

    /// A shadow buffer was required but absent.
    #[error("allocation at {addr:#x} has no host shadow buffer")]
    EmptyShadow { addr: u64 },

    /// A read would run past the end of the shadow buffer.
    #[error("read of {size} bytes at offset {offset} would pass the end of the shadow buffer")]
    ShortShadow { offset: u64, size: u64 },

    /// A scalar read size was not one of {1, 2, 4, 8}.
    #[error("unsupported scalar size {size}, expected 1, 2, 4, or 8 bytes")]
    UnsupportedSize { size: u64 },

    /// A read/write/scalar operation of size zero was attempted where
    /// disallowed.
    #[error("zero-size operation is not allowed here")]
    ZeroSize,

    /// `get_memory_data` was called on a `ProcessOnly` allocation.
    #[error("no host-side view exists for this process-only allocation")]
    HostUnavailable { addr: u64 },

    /// The remote process's I/O call itself failed.
    #[error("remote I/O at {addr:#x} failed: {message}")]
    RemoteIoFailed { addr: u64, message: String },
}

pub type Result<T> = std::result::Result<T, MemoryMapError>;
