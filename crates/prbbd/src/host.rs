//! The host block subsystem as seen by the driver.
//!
//! The driver needs four things from the host: a block major number, a request queue object per
//! device, a disk identity per device, and a way to publish/unpublish that identity. Each
//! allocation has a matching release; the driver wraps them in guards so that release order is
//! enforced by ownership rather than by hand.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::{DispatchMode, Geometry, HostError};

/// Host-side request queue object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueueId(pub u64);

/// Host-side disk identity (allocated, not necessarily published).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DiskId(pub u64);

/// What the host learns about a published disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskInfo {
    pub name: String,
    pub major: u32,
    pub first_minor: u32,
    pub minors: u32,
    /// Capacity in 512-byte sectors.
    pub capacity: u64,
    pub logical_block_size: u32,
    pub geometry: Geometry,
    pub queue: QueueId,
}

/// Host block layer services used during device setup and teardown.
///
/// All methods take `&self`: the host is a shared service and the driver keeps handles to it
/// inside per-device guards.
pub trait BlockLayer: Send + Sync {
    /// Registers a block major for `name`, returning the allocated number.
    fn register_major(&self, name: &str) -> Result<u32, HostError>;
    fn unregister_major(&self, major: u32, name: &str);

    /// Allocates the request queue object for a device dispatching in `mode`.
    fn alloc_queue(&self, mode: DispatchMode) -> Result<QueueId, HostError>;
    fn cleanup_queue(&self, queue: QueueId);

    /// Allocates a disk identity spanning `minors` minor numbers.
    fn alloc_disk(&self, minors: u32) -> Result<DiskId, HostError>;
    /// Makes the disk visible. I/O may arrive as soon as this returns.
    fn add_disk(&self, disk: DiskId, info: DiskInfo) -> Result<(), HostError>;
    /// Hides the disk again. No new I/O arrives after this returns.
    fn del_disk(&self, disk: DiskId);
    fn put_disk(&self, disk: DiskId);
}

/// Failure points of [`LocalBlockLayer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    RegisterMajor,
    AllocQueue,
    AllocDisk,
    AddDisk,
}

#[derive(Debug)]
struct DiskSlot {
    minors: u32,
    published: Option<DiskInfo>,
}

#[derive(Debug, Default)]
struct LocalState {
    majors: BTreeMap<u32, String>,
    queues: BTreeMap<QueueId, DispatchMode>,
    disks: BTreeMap<DiskId, DiskSlot>,
    next_id: u64,
    faults: Vec<Fault>,
}

impl LocalState {
    fn take_fault(&mut self, fault: Fault) -> bool {
        match self.faults.iter().position(|f| *f == fault) {
            Some(idx) => {
                self.faults.remove(idx);
                true
            }
            None => false,
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// In-process [`BlockLayer`] that keeps the host's bookkeeping in memory.
///
/// Majors are handed out dynamically from 254 downwards. Faults can be injected with
/// [`LocalBlockLayer::inject`]; each injected fault fails the next matching call once.
#[derive(Debug, Default)]
pub struct LocalBlockLayer {
    state: Mutex<LocalState>,
}

impl LocalBlockLayer {
    const FIRST_DYNAMIC_MAJOR: u32 = 254;
    const LAST_DYNAMIC_MAJOR: u32 = 234;

    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next call matching `fault` with [`HostError::NoMemory`].
    pub fn inject(&self, fault: Fault) {
        self.lock().faults.push(fault);
    }

    /// Published disks ordered by major, then first minor.
    pub fn published(&self) -> Vec<DiskInfo> {
        let mut disks: Vec<DiskInfo> = self
            .lock()
            .disks
            .values()
            .filter_map(|slot| slot.published.clone())
            .collect();
        disks.sort_by_key(|d| (d.major, d.first_minor));
        disks
    }

    pub fn find_disk(&self, name: &str) -> Option<DiskInfo> {
        self.published().into_iter().find(|d| d.name == name)
    }

    pub fn live_queues(&self) -> usize {
        self.lock().queues.len()
    }

    /// Disk identities allocated and not yet put, published or not.
    pub fn allocated_disks(&self) -> usize {
        self.lock().disks.len()
    }

    pub fn registered_majors(&self) -> Vec<(u32, String)> {
        self.lock()
            .majors
            .iter()
            .map(|(major, name)| (*major, name.clone()))
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LocalState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl BlockLayer for LocalBlockLayer {
    fn register_major(&self, name: &str) -> Result<u32, HostError> {
        let mut state = self.lock();
        if state.take_fault(Fault::RegisterMajor) {
            return Err(HostError::NoMajor(name.to_string()));
        }
        let major = (Self::LAST_DYNAMIC_MAJOR..=Self::FIRST_DYNAMIC_MAJOR)
            .rev()
            .find(|major| !state.majors.contains_key(major))
            .ok_or_else(|| HostError::NoMajor(name.to_string()))?;
        state.majors.insert(major, name.to_string());
        Ok(major)
    }

    fn unregister_major(&self, major: u32, name: &str) {
        let mut state = self.lock();
        match state.majors.get(&major) {
            Some(owner) if owner == name => {
                state.majors.remove(&major);
            }
            _ => tracing::warn!(major, name, "unregistering a major that is not ours"),
        }
    }

    fn alloc_queue(&self, mode: DispatchMode) -> Result<QueueId, HostError> {
        let mut state = self.lock();
        if state.take_fault(Fault::AllocQueue) {
            return Err(HostError::NoMemory);
        }
        let id = QueueId(state.next_id());
        state.queues.insert(id, mode);
        Ok(id)
    }

    fn cleanup_queue(&self, queue: QueueId) {
        if self.lock().queues.remove(&queue).is_none() {
            tracing::warn!(?queue, "cleaning up an unknown queue");
        }
    }

    fn alloc_disk(&self, minors: u32) -> Result<DiskId, HostError> {
        let mut state = self.lock();
        if state.take_fault(Fault::AllocDisk) {
            return Err(HostError::NoMemory);
        }
        let id = DiskId(state.next_id());
        state.disks.insert(
            id,
            DiskSlot {
                minors,
                published: None,
            },
        );
        Ok(id)
    }

    fn add_disk(&self, disk: DiskId, info: DiskInfo) -> Result<(), HostError> {
        let mut state = self.lock();
        if state.take_fault(Fault::AddDisk) {
            return Err(HostError::NoMemory);
        }

        let end = info.first_minor + info.minors;
        for other in state.disks.values().filter_map(|s| s.published.as_ref()) {
            if other.name == info.name {
                return Err(HostError::DuplicateName(info.name));
            }
            if other.major == info.major
                && other.first_minor < end
                && info.first_minor < other.first_minor + other.minors
            {
                return Err(HostError::MinorsInUse {
                    major: info.major,
                    first_minor: info.first_minor,
                    end,
                });
            }
        }

        let slot = state.disks.get_mut(&disk).ok_or(HostError::NoMemory)?;
        debug_assert_eq!(slot.minors, info.minors);
        slot.published = Some(info);
        Ok(())
    }

    fn del_disk(&self, disk: DiskId) {
        let mut state = self.lock();
        if let Some(slot) = state.disks.get_mut(&disk) {
            slot.published = None;
        }
    }

    fn put_disk(&self, disk: DiskId) {
        if self.lock().disks.remove(&disk).is_none() {
            tracing::warn!(?disk, "putting an unknown disk");
        }
    }
}
