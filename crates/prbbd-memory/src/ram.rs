use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use crate::{MapError, MapResult, MappedRegion, PhysicalMemory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Claim {
    id: u64,
    start: u64,
    end: u64,
}

pub(crate) struct RamInner {
    base: u64,
    bytes: Box<[AtomicU8]>,
    claims: Mutex<Vec<Claim>>,
    next_claim: AtomicU64,
}

impl RamInner {
    fn limit(&self) -> u64 {
        // `ReservedRam::new` rejects windows whose end overflows.
        self.base + self.bytes.len() as u64
    }

    fn window(&self, paddr: u64, len: usize) -> Option<&[AtomicU8]> {
        let start = usize::try_from(paddr.checked_sub(self.base)?).ok()?;
        let end = start.checked_add(len)?;
        self.bytes.get(start..end)
    }

    /// Copies `dst.len()` bytes starting at physical address `paddr` into `dst`.
    ///
    /// Returns `false` without touching `dst` if the range is not inside the window.
    pub(crate) fn load(&self, paddr: u64, dst: &mut [u8]) -> bool {
        let Some(src) = self.window(paddr, dst.len()) else {
            return false;
        };
        // Byte-granular atomics: several devices (and the host) may touch the window from
        // different threads, and a plain memcpy would be a data race.
        for (slot, byte) in dst.iter_mut().zip(src) {
            *slot = byte.load(Ordering::Relaxed);
        }
        true
    }

    pub(crate) fn store(&self, paddr: u64, src: &[u8]) -> bool {
        let Some(dst) = self.window(paddr, src.len()) else {
            return false;
        };
        for (byte, value) in dst.iter().zip(src.iter().copied()) {
            byte.store(value, Ordering::Relaxed);
        }
        true
    }

    pub(crate) fn release(&self, claim: u64) {
        let mut claims = self
            .claims
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = claims.len();
        claims.retain(|c| c.id != claim);
        debug_assert_eq!(before, claims.len() + 1, "claim {claim} released twice");
    }
}

impl fmt::Debug for RamInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RamInner")
            .field("base", &format_args!("{:#x}", self.base))
            .field("size", &format_args!("{:#x}", self.bytes.len()))
            .finish_non_exhaustive()
    }
}

/// A window of physical address space set aside for RAM-backed disks.
///
/// The window spans `[base, base + size)`. Mappings handed out by [`PhysicalMemory::map`] must
/// lie entirely inside it and must not overlap each other. Contents survive unmapping, which is
/// what makes a device re-created over the same range see the same data.
#[derive(Clone, Debug)]
pub struct ReservedRam {
    inner: Arc<RamInner>,
}

impl ReservedRam {
    pub fn new(base: u64, size: u64) -> MapResult<Self> {
        let size_usize = usize::try_from(size).map_err(|_| MapError::SizeTooLarge { size })?;
        base.checked_add(size)
            .ok_or(MapError::AddressOverflow { start: base, len: size })?;

        let bytes = (0..size_usize).map(|_| AtomicU8::new(0)).collect();
        Ok(Self {
            inner: Arc::new(RamInner {
                base,
                bytes,
                claims: Mutex::new(Vec::new()),
                next_claim: AtomicU64::new(0),
            }),
        })
    }

    pub fn base(&self) -> u64 {
        self.inner.base
    }

    pub fn size(&self) -> u64 {
        self.inner.bytes.len() as u64
    }

    /// Number of live mappings. Zero once every device built on this window is gone.
    pub fn mapped_regions(&self) -> usize {
        self.inner
            .claims
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Host-side read of physical memory, independent of any mapping.
    pub fn read_physical(&self, paddr: u64, dst: &mut [u8]) -> MapResult<()> {
        if self.inner.load(paddr, dst) {
            Ok(())
        } else {
            Err(self.unavailable(paddr, dst.len()))
        }
    }

    /// Host-side write of physical memory, independent of any mapping.
    pub fn write_physical(&self, paddr: u64, src: &[u8]) -> MapResult<()> {
        if self.inner.store(paddr, src) {
            Ok(())
        } else {
            Err(self.unavailable(paddr, src.len()))
        }
    }

    fn unavailable(&self, start: u64, len: usize) -> MapError {
        MapError::Unavailable {
            start,
            end: start.saturating_add(len as u64),
            base: self.inner.base,
            limit: self.inner.limit(),
        }
    }
}

impl PhysicalMemory for ReservedRam {
    fn map(&self, start: u64, len: u64) -> MapResult<MappedRegion> {
        if len == 0 {
            return Err(MapError::EmptyRange { start });
        }
        let end = start
            .checked_add(len)
            .ok_or(MapError::AddressOverflow { start, len })?;
        if start < self.inner.base || end > self.inner.limit() {
            return Err(MapError::Unavailable {
                start,
                end,
                base: self.inner.base,
                limit: self.inner.limit(),
            });
        }

        let mut claims = self
            .inner
            .claims
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(other) = claims.iter().find(|c| c.start < end && start < c.end) {
            return Err(MapError::AlreadyClaimed {
                start,
                end,
                other_start: other.start,
                other_end: other.end,
            });
        }

        let id = self.inner.next_claim.fetch_add(1, Ordering::Relaxed);
        claims.push(Claim { id, start, end });
        drop(claims);

        tracing::debug!("mapped physical range {start:#x}..{end:#x}");
        Ok(MappedRegion::new(self.inner.clone(), id, start, len))
    }
}
