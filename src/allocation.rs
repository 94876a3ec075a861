//! Per-region allocation metadata.

use crate::address::Permissions;
use crate::policy::AllocationPolicy;

/// One live region tracked by the map.
///
/// `shadow` is `Some` iff `policy` needs a host buffer, i.e. for
/// `HostOnly` and `Mirror` (including a `Mirror` that was downgraded to
/// `HostOnly` at creation time).
#[derive(Debug, Clone)]
pub struct Allocation {
    /// Unaligned base returned by the backing allocator.
    pub raw_start: u64,
    /// User-visible start; `raw_start` rounded up to `alignment`. The
    /// key under which this record lives in the allocation index.
    pub aligned_start: u64,
    /// Rounded-up allocation size (see `crate::map::round_alloc_size`).
    pub size: u64,
    /// Advisory read/write/execute bitmask, forwarded to the remote
    /// verbatim; never enforced by the map itself.
    pub permissions: Permissions,
    /// Requested power-of-two alignment.
    pub alignment: u64,
    /// Effective policy, possibly downgraded from `Mirror` at creation.
    pub policy: AllocationPolicy,
    /// Host-side mirror of the region's bytes, zero-initialized.
    pub shadow: Option<Vec<u8>>,
    /// If true, shutdown does not free this allocation.
    pub leak: bool,
}

impl Allocation {
    /// Exclusive end of the allocation's half-open interval.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.aligned_start + self.size
    }

    /// Offset of `addr` from `aligned_start`. Callers must first check
    /// containment; this does not saturate.
    #[must_use]
    pub fn offset_of(&self, addr: u64) -> u64 {
        addr - self.aligned_start
    }

    /// True iff `[addr, addr+size)` lies entirely within this
    /// allocation's interval.
    #[must_use]
    pub fn contains(&self, addr: u64, size: u64) -> bool {
        addr >= self.aligned_start && addr + size <= self.end()
    }
}
