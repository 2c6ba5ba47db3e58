use crate::{transfer, Bio, Buffer, Device, Direction, IoStatus, SECTOR_SHIFT};

/// Transfers every segment of `bio` and completes it with the aggregate status.
///
/// The device lock is held for the whole segment loop.
pub(crate) fn make_request(device: &Device, mut bio: Bio) -> Bio {
    let status = {
        let _serialized = device.lock();
        xfer_bio(device, &mut bio)
    };
    bio.complete(status);
    bio
}

fn xfer_bio(device: &Device, bio: &mut Bio) -> IoStatus {
    let direction = bio.direction();
    let mut sector = bio.sector();
    let mut status = IoStatus::Ok;

    for segment in bio.segments_mut() {
        let nsect = (segment.len() >> SECTOR_SHIFT) as u64;
        let buffer = match direction {
            Direction::Read => Buffer::Read(segment),
            Direction::Write => Buffer::Write(segment),
        };
        if transfer(device, sector, nsect, buffer).is_err() {
            status = IoStatus::IoError;
        }
        sector = sector.saturating_add(nsect);
    }

    status
}
