use std::sync::{Arc, Mutex};

use prbbd_memory::PhysicalMemory;

use crate::device::{DiskHandle, QueueHandle};
use crate::dispatch::QueueState;
use crate::{
    BlockLayer, CreateError, Descriptor, Device, DiskInfo, DispatchMode, Geometry, HostError,
    MINORS_PER_DEVICE, SECTOR_SHIFT, SECTOR_SIZE,
};

/// Names a device by its creation index.
///
/// Creation indices are never reused, so a handle stops resolving once its device is destroyed
/// instead of pointing at a later device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(usize);

impl DeviceHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Owns every live device, in creation order.
///
/// Only fully constructed devices ever enter the registry; a failed [`Registry::create`]
/// releases whatever it had acquired before returning.
pub struct Registry {
    memory: Arc<dyn PhysicalMemory>,
    host: Arc<dyn BlockLayer>,
    major: u32,
    mode: DispatchMode,
    devices: Vec<Device>,
    /// Creation index of the next device. Advances only on success.
    next_index: usize,
}

impl Registry {
    /// An empty registry publishing disks under `major`, dispatching new devices in `mode`.
    pub fn new(
        memory: Arc<dyn PhysicalMemory>,
        host: Arc<dyn BlockLayer>,
        major: u32,
        mode: DispatchMode,
    ) -> Self {
        Self {
            memory,
            host,
            major,
            mode,
            devices: Vec::new(),
            next_index: 0,
        }
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    pub fn create(&mut self, desc: &Descriptor) -> Result<DeviceHandle, CreateError> {
        self.create_with_mode(desc, self.mode)
    }

    /// Maps the range, builds the dispatch plumbing and publishes the disk.
    ///
    /// Any failure unwinds the steps already taken, newest first.
    pub fn create_with_mode(
        &mut self,
        desc: &Descriptor,
        mode: DispatchMode,
    ) -> Result<DeviceHandle, CreateError> {
        let index = self.next_index;

        let region = self.memory.map(desc.start, desc.len).map_err(|err| {
            tracing::error!(device = %desc.name, %err, "mapping failed");
            CreateError::MapFailed(err)
        })?;

        let queue = QueueHandle::alloc(&self.host, mode).map_err(|err| {
            tracing::error!(device = %desc.name, %err, "request queue initialisation failed");
            CreateError::QueueInitFailed(err)
        })?;

        let disk_failed = |err: HostError| {
            tracing::error!(device = %desc.name, %err, "disk allocation failed");
            CreateError::DiskAllocFailed(err)
        };
        let first_minor = u32::try_from(index)
            .ok()
            .and_then(|index| index.checked_mul(MINORS_PER_DEVICE))
            .ok_or_else(|| {
                disk_failed(HostError::MinorsInUse {
                    major: self.major,
                    first_minor: u32::MAX,
                    end: u32::MAX,
                })
            })?;
        let mut disk = DiskHandle::alloc(&self.host, MINORS_PER_DEVICE).map_err(disk_failed)?;

        let capacity = desc.len >> SECTOR_SHIFT;
        disk.publish(DiskInfo {
            name: desc.name.clone(),
            major: self.major,
            first_minor,
            minors: MINORS_PER_DEVICE,
            capacity,
            logical_block_size: SECTOR_SIZE as u32,
            geometry: Geometry::from_capacity(capacity),
            queue: queue.id(),
        })
        .map_err(disk_failed)?;

        self.devices.push(Device {
            disk,
            queue,
            region,
            lock: Mutex::new(QueueState::default()),
            name: desc.name.clone(),
            capacity,
            mode,
            index,
            major: self.major,
            first_minor,
        });
        self.next_index += 1;

        tracing::info!("{} device: {:#x} at {:#x}", desc.name, desc.len, desc.start);
        Ok(DeviceHandle(index))
    }

    /// Tears down every device in creation order: unpublish, release the queue, unmap.
    pub fn destroy_all(&mut self) {
        for device in self.devices.drain(..) {
            tracing::debug!(device = %device.name, "destroying device");
            drop(device);
        }
    }

    pub fn get(&self, handle: DeviceHandle) -> Option<&Device> {
        // Devices are kept in creation order, so their indices are sorted.
        self.devices
            .binary_search_by_key(&handle.0, |dev| dev.index)
            .ok()
            .map(|pos| &self.devices[pos])
    }

    pub fn find(&self, name: &str) -> Option<&Device> {
        self.devices.iter().find(|dev| dev.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> + '_ {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("major", &self.major)
            .field("mode", &self.mode)
            .field("devices", &self.devices)
            .field("next_index", &self.next_index)
            .finish_non_exhaustive()
    }
}
