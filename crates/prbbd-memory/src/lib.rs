//! Physical memory windows for RAM-backed block devices.
//!
//! A block device in `prbbd` is backed by a fixed range of physical memory that the host
//! reserved ahead of time. This crate models the two pieces the driver needs from the host:
//!
//! - [`PhysicalMemory`]: the mapping service that turns a physical byte range into an
//!   addressable view (or refuses to).
//! - [`MappedRegion`]: that view. It only supports bounds-checked copy-in/copy-out, so no code
//!   outside of this crate ever performs address arithmetic on mapped memory.
//!
//! [`ReservedRam`] is the in-process implementation: a contiguous window of physical address
//! space with claim tracking, so two devices can never map overlapping ranges.

#![forbid(unsafe_code)]

mod error;
mod ram;
mod region;

pub use error::{MapError, MapResult, RegionError};
pub use ram::ReservedRam;
pub use region::MappedRegion;

/// Host virtual-memory service used to map device backing memory.
pub trait PhysicalMemory: Send + Sync {
    /// Maps the physical byte range `[start, start + len)`.
    ///
    /// The returned region stays claimed until it is dropped (or explicitly
    /// [`MappedRegion::unmap`]ped).
    fn map(&self, start: u64, len: u64) -> MapResult<MappedRegion>;
}

impl<T: PhysicalMemory + ?Sized> PhysicalMemory for &T {
    fn map(&self, start: u64, len: u64) -> MapResult<MappedRegion> {
        (**self).map(start, len)
    }
}

impl<T: PhysicalMemory + ?Sized> PhysicalMemory for std::sync::Arc<T> {
    fn map(&self, start: u64, len: u64) -> MapResult<MappedRegion> {
        (**self).map(start, len)
    }
}
