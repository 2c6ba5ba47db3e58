use std::fmt;
use std::sync::Arc;

use crate::ram::RamInner;
use crate::RegionError;

/// An addressable view over a claimed physical byte range.
///
/// Offsets are relative to the start of the region. The region only supports whole-range
/// copies; every access is checked against [`MappedRegion::len`] before any byte moves, so a
/// rejected access never copies partially.
///
/// The claim on the physical range is released when the region is dropped. Because
/// [`MappedRegion::unmap`] takes the region by value, a range can be unmapped at most once.
pub struct MappedRegion {
    ram: Arc<RamInner>,
    claim: u64,
    phys_start: u64,
    len: u64,
}

impl MappedRegion {
    pub(crate) fn new(ram: Arc<RamInner>, claim: u64, phys_start: u64, len: u64) -> Self {
        Self {
            ram,
            claim,
            phys_start,
            len,
        }
    }

    /// Physical address of the first byte of the region.
    pub fn phys_start(&self) -> u64 {
        self.phys_start
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copies `src` into the region at `offset`.
    pub fn copy_in(&self, offset: u64, src: &[u8]) -> Result<(), RegionError> {
        if src.is_empty() {
            return Ok(());
        }
        let paddr = self.translate(offset, src.len())?;
        let stored = self.ram.store(paddr, src);
        debug_assert!(stored, "claimed range must lie inside reserved memory");
        Ok(())
    }

    /// Copies bytes from the region at `offset` into `dst`.
    pub fn copy_out(&self, offset: u64, dst: &mut [u8]) -> Result<(), RegionError> {
        if dst.is_empty() {
            return Ok(());
        }
        let paddr = self.translate(offset, dst.len())?;
        let loaded = self.ram.load(paddr, dst);
        debug_assert!(loaded, "claimed range must lie inside reserved memory");
        Ok(())
    }

    /// Releases the mapping.
    pub fn unmap(self) {
        drop(self);
    }

    fn translate(&self, offset: u64, len: usize) -> Result<u64, RegionError> {
        let out_of_range = RegionError::OutOfRange {
            offset,
            len,
            size: self.len,
        };
        let end = offset.checked_add(len as u64).ok_or(out_of_range.clone())?;
        if end > self.len {
            return Err(out_of_range);
        }
        // Cannot overflow: `phys_start + len` was validated when the range was claimed.
        Ok(self.phys_start + offset)
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        self.ram.release(self.claim);
        tracing::debug!(
            "unmapped physical range {:#x}..{:#x}",
            self.phys_start,
            self.phys_start + self.len
        );
    }
}

impl fmt::Debug for MappedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedRegion")
            .field("phys_start", &format_args!("{:#x}", self.phys_start))
            .field("len", &format_args!("{:#x}", self.len))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{PhysicalMemory, RegionError, ReservedRam};

    #[test]
    fn copies_are_relative_to_region_start() {
        let ram = ReservedRam::new(0x4000, 0x2000).unwrap();
        let region = ram.map(0x5000, 0x400).unwrap();

        region.copy_in(4, &[0xde, 0xad, 0xbe, 0xef]).unwrap();

        let mut raw = [0u8; 4];
        ram.read_physical(0x5004, &mut raw).unwrap();
        assert_eq!(raw, [0xde, 0xad, 0xbe, 0xef]);

        let mut back = [0u8; 4];
        region.copy_out(4, &mut back).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn out_of_range_access_copies_nothing() {
        let ram = ReservedRam::new(0, 0x1000).unwrap();
        let region = ram.map(0x200, 0x200).unwrap();
        region.copy_in(0x1f0, &[0x11; 0x10]).unwrap();

        let err = region.copy_in(0x1f8, &[0xff; 0x10]).unwrap_err();
        assert_eq!(
            err,
            RegionError::OutOfRange {
                offset: 0x1f8,
                len: 0x10,
                size: 0x200
            }
        );

        let mut tail = [0u8; 0x10];
        region.copy_out(0x1f0, &mut tail).unwrap();
        assert_eq!(tail, [0x11; 0x10]);

        let mut beyond = [0u8; 8];
        assert!(region.copy_out(0x200, &mut beyond).is_err());
        assert!(region.copy_out(u64::MAX, &mut beyond).is_err());
    }

    #[test]
    fn empty_copies_succeed_even_at_the_end() {
        let ram = ReservedRam::new(0, 0x100).unwrap();
        let region = ram.map(0, 0x100).unwrap();
        region.copy_in(0x100, &[]).unwrap();
        region.copy_out(0x100, &mut []).unwrap();
    }
}
