//! Block devices backed by reserved physical memory.
//!
//! Each device is described by a `name,start,length` string. The range
//! `[start, start + length)` of reserved physical memory is mapped and published to the host
//! block layer as a disk of `length / 512` sectors; every read or write is a bounds-checked copy
//! into or out of that range.
//!
//! - [`Descriptor`]: parsed device description (see [`descriptor::parse`])
//! - [`StartupQueue`] / [`Driver`]: two-phase startup. Strings are queued before the driver
//!   exists and replayed in order by [`Driver::init`], which rolls everything back on the first
//!   failure.
//! - [`Registry`]: owns the live [`Device`]s, builds and tears them down
//! - [`DispatchMode`]: whole-request draining or per-segment bio dispatch
//! - [`BlockLayer`]: the host block subsystem ([`LocalBlockLayer`] is an in-process one)
//!
//! Memory mapping is provided by [`prbbd_memory`].

#![forbid(unsafe_code)]

pub mod descriptor;
mod device;
pub mod dispatch;
mod driver;
mod error;
mod geometry;
pub mod host;
mod registry;
mod transfer;

pub use descriptor::Descriptor;
pub use device::Device;
pub use dispatch::{Bio, Direction, DispatchMode, IoStatus, Request, RequestKind};
pub use driver::{Driver, StartupQueue, QUEUE_MAX_LEN};
pub use error::{
    CreateError, HostError, NumberField, ParseError, StartupError, TransferError,
};
pub use geometry::Geometry;
pub use host::{BlockLayer, DiskInfo, Fault, LocalBlockLayer};
pub use registry::{DeviceHandle, Registry};
pub use transfer::{transfer, Buffer};

pub use prbbd_memory::{MapError, PhysicalMemory, ReservedRam};

/// Name the driver registers its block major under.
pub const DRIVER_NAME: &str = "prbbd";

pub const SECTOR_SHIFT: u32 = 9;
pub const SECTOR_SIZE: usize = 1 << SECTOR_SHIFT;

/// Minor numbers reserved per device (whole disk plus partitions).
pub const MINORS_PER_DEVICE: u32 = 16;
