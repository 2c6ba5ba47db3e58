use crate::{Device, Direction, TransferError, SECTOR_SIZE};

/// Caller buffer for a transfer; the variant selects the direction.
#[derive(Debug)]
pub enum Buffer<'a> {
    /// Device → buffer.
    Read(&'a mut [u8]),
    /// Buffer → device.
    Write(&'a [u8]),
}

impl Buffer<'_> {
    pub fn direction(&self) -> Direction {
        match self {
            Buffer::Read(_) => Direction::Read,
            Buffer::Write(_) => Direction::Write,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Buffer::Read(buf) => buf.len(),
            Buffer::Write(buf) => buf.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Copies `nsect` sectors starting at `sector` between `device`'s backing memory and `buffer`.
///
/// Accesses reaching past the end of the device are logged and rejected before any byte moves.
/// Only the first `nsect * 512` bytes of `buffer` take part.
///
/// This does not take the device lock; dispatchers serialize calls themselves.
pub fn transfer(
    device: &Device,
    sector: u64,
    nsect: u64,
    buffer: Buffer<'_>,
) -> Result<(), TransferError> {
    let sector_size = SECTOR_SIZE as u64;
    let (offset, nbytes) = match (sector.checked_mul(sector_size), nsect.checked_mul(sector_size))
    {
        (Some(offset), Some(nbytes)) => (offset, nbytes),
        _ => {
            tracing::warn!(
                device = device.name(),
                sector,
                nsect,
                "beyond-end access (offset overflow)"
            );
            return Err(TransferError::OffsetOverflow);
        }
    };

    let capacity = device.capacity_bytes();
    if offset.checked_add(nbytes).map_or(true, |end| end > capacity) {
        tracing::warn!(
            device = device.name(),
            "beyond-end access (offset: {offset:#x} / bytes: {nbytes:#x})"
        );
        return Err(TransferError::OutOfRange {
            offset,
            len: nbytes,
            capacity,
        });
    }

    let len = match usize::try_from(nbytes) {
        Ok(len) if len <= buffer.len() => len,
        _ => {
            return Err(TransferError::ShortBuffer {
                need: nbytes,
                have: buffer.len(),
            })
        }
    };

    let region = device.region();
    let copied = match buffer {
        Buffer::Write(src) => region.copy_in(offset, &src[..len]),
        Buffer::Read(dst) => region.copy_out(offset, &mut dst[..len]),
    };
    // The region is at least `capacity` bytes long, so this only fires on a broken invariant.
    copied.map_err(|_| TransferError::OutOfRange {
        offset,
        len: nbytes,
        capacity,
    })
}
