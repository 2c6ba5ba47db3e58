use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use prbbd_memory::MappedRegion;

use crate::dispatch::{bio, request, QueueState};
use crate::host::{DiskId, QueueId};
use crate::{
    Bio, BlockLayer, DiskInfo, DispatchMode, Geometry, HostError, IoStatus, Request, SECTOR_SHIFT,
};

/// Request queue object owned by one device. Dropping it cleans the queue up on the host.
pub(crate) struct QueueHandle {
    host: Arc<dyn BlockLayer>,
    id: QueueId,
}

impl QueueHandle {
    pub(crate) fn alloc(host: &Arc<dyn BlockLayer>, mode: DispatchMode) -> Result<Self, HostError> {
        let id = host.alloc_queue(mode)?;
        Ok(Self {
            host: Arc::clone(host),
            id,
        })
    }

    pub(crate) fn id(&self) -> QueueId {
        self.id
    }
}

impl Drop for QueueHandle {
    fn drop(&mut self) {
        self.host.cleanup_queue(self.id);
    }
}

/// Disk identity owned by one device. Dropping it unpublishes (if published) and puts the disk.
pub(crate) struct DiskHandle {
    host: Arc<dyn BlockLayer>,
    id: DiskId,
    published: bool,
}

impl DiskHandle {
    pub(crate) fn alloc(host: &Arc<dyn BlockLayer>, minors: u32) -> Result<Self, HostError> {
        let id = host.alloc_disk(minors)?;
        Ok(Self {
            host: Arc::clone(host),
            id,
            published: false,
        })
    }

    pub(crate) fn publish(&mut self, info: DiskInfo) -> Result<(), HostError> {
        self.host.add_disk(self.id, info)?;
        self.published = true;
        Ok(())
    }
}

impl Drop for DiskHandle {
    fn drop(&mut self) {
        if self.published {
            self.host.del_disk(self.id);
        }
        self.host.put_disk(self.id);
    }
}

/// A live block device: a published disk backed by a mapped physical range.
///
/// Fields drop in declaration order, which is also the teardown order: the disk is unpublished
/// first so no new I/O arrives, then the queue is released, then the region is unmapped.
pub struct Device {
    pub(crate) disk: DiskHandle,
    pub(crate) queue: QueueHandle,
    pub(crate) region: MappedRegion,
    pub(crate) lock: Mutex<QueueState>,
    pub(crate) name: String,
    /// In 512-byte sectors.
    pub(crate) capacity: u64,
    pub(crate) mode: DispatchMode,
    pub(crate) index: usize,
    pub(crate) major: u32,
    pub(crate) first_minor: u32,
}

impl Device {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Capacity in 512-byte sectors.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.capacity << SECTOR_SHIFT
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Position of the device in creation order.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn first_minor(&self) -> u32 {
        self.first_minor
    }

    /// Physical address the device's sector 0 lives at.
    pub fn phys_start(&self) -> u64 {
        self.region.phys_start()
    }

    pub fn geometry(&self) -> Geometry {
        Geometry::from_capacity(self.capacity)
    }

    pub(crate) fn region(&self) -> &MappedRegion {
        &self.region
    }

    pub(crate) fn queue_id(&self) -> QueueId {
        self.queue.id()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Submits a bio and returns it completed.
    ///
    /// Bio-mode devices dispatch it segment by segment. Request-mode devices wrap it in a
    /// file-system request and drain their queue.
    pub fn submit_bio(&self, bio: Bio) -> Bio {
        match self.mode {
            DispatchMode::Bio => bio::make_request(self, bio),
            DispatchMode::Request => self.submit_request(Request::fs(bio)).into_bio(),
        }
    }

    /// Runs `request` to completion and returns it.
    ///
    /// Requests are drained under the device lock, so the queue is always empty when the lock is
    /// taken and the request can be processed in place.
    pub fn submit_request(&self, mut request: Request) -> Request {
        match self.mode {
            DispatchMode::Request => {
                let _queue = self.lock();
                request::process(self, &mut request);
            }
            DispatchMode::Bio => self.reject_request(&mut request),
        }
        request
    }

    /// Queues every request, then drains the queue; completed requests come back in queue order.
    ///
    /// A bio-mode device has no request queue, so each request fails with an I/O error.
    pub fn submit_requests(&self, requests: impl IntoIterator<Item = Request>) -> Vec<Request> {
        match self.mode {
            DispatchMode::Request => {
                let mut queue = self.lock();
                for request in requests {
                    queue.enqueue(request);
                }
                request::drain(self, &mut queue)
            }
            DispatchMode::Bio => requests
                .into_iter()
                .map(|mut request| {
                    self.reject_request(&mut request);
                    request
                })
                .collect(),
        }
    }

    fn reject_request(&self, request: &mut Request) {
        tracing::warn!(device = %self.name, "request submitted to a bio-mode device");
        request.end_all(IoStatus::IoError);
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("mode", &self.mode)
            .field("index", &self.index)
            .field("major", &self.major)
            .field("first_minor", &self.first_minor)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}
