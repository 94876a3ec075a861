//! The three allocation policies.

/// Which side(s) own the bytes of an allocation.
///
/// Kept as a small tagged variant rather than a trait hierarchy: the
/// behavior differences between policies are a handful of branches per
/// operation, and an exhaustive `match` is clearer here than
/// polymorphism over an `Allocation` trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationPolicy {
    /// Lives only in a host-side shadow buffer; the address is
    /// synthesized and not valid in the remote.
    HostOnly,
    /// Lives only in the remote process; no host shadow.
    ProcessOnly,
    /// Lives on both sides; writes propagate to both, reads prefer the
    /// remote once it is live.
    Mirror,
}
