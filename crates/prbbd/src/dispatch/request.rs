use crate::dispatch::QueueState;
use crate::{transfer, Buffer, Device, Direction, IoStatus, Request, RequestKind, SECTOR_SHIFT};

/// Drains every queued request of `device`, returning them in completion order.
///
/// The caller holds the device lock (it owns `queue` through the lock guard).
pub(crate) fn drain(device: &Device, queue: &mut QueueState) -> Vec<Request> {
    let mut done = Vec::new();
    while let Some(mut req) = queue.fetch() {
        process(device, &mut req);
        done.push(req);
    }
    done
}

/// Runs one request to completion, chunk by chunk. The caller holds the device lock.
pub(crate) fn process(device: &Device, req: &mut Request) {
    if req.kind() != RequestKind::Fs {
        tracing::info!(device = device.name(), kind = ?req.kind(), "skip non-fs request");
        req.end_all(IoStatus::IoError);
        return;
    }

    let direction = req.direction();
    loop {
        let chunk = req
            .current_chunk()
            .map(|(pos, buf)| transfer_chunk(device, direction, pos, buf));
        match chunk {
            Some(status) => {
                if !req.end_current(status) {
                    return;
                }
            }
            None => {
                // Nothing to move; a zero-length request still completes.
                req.end_all(IoStatus::Ok);
                return;
            }
        }
    }
}

fn transfer_chunk(device: &Device, direction: Direction, pos: u64, buf: &mut [u8]) -> IoStatus {
    let nsect = (buf.len() >> SECTOR_SHIFT) as u64;
    let buffer = match direction {
        Direction::Read => Buffer::Read(buf),
        Direction::Write => Buffer::Write(buf),
    };
    match transfer(device, pos, nsect, buffer) {
        Ok(()) => IoStatus::Ok,
        Err(_) => IoStatus::IoError,
    }
}
