//! I/O work items and the two dispatch strategies.
//!
//! A [`Bio`] is an ordered list of segments covering consecutive sectors, each segment with its
//! own buffer. A [`Request`] wraps a bio for the request-queue path, adding a kind (only
//! [`RequestKind::Fs`] requests carry file-system data) and a cursor over its chunks.
//!
//! - [`DispatchMode::Request`] drains the device queue one request at a time, transferring and
//!   completing the current chunk until the request is exhausted. The drain runs with the device
//!   lock held.
//! - [`DispatchMode::Bio`] takes bios straight from the submitter and transfers each segment in
//!   turn. The device lock is taken around the whole segment loop, so bios on one device are
//!   serialized.

pub(crate) mod bio;
pub(crate) mod request;

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::SECTOR_SHIFT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// Completion status of a request or bio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoStatus {
    Ok,
    IoError,
}

impl IoStatus {
    /// Folds another chunk's status in; any failure sticks.
    pub(crate) fn and(self, other: IoStatus) -> IoStatus {
        match (self, other) {
            (IoStatus::Ok, IoStatus::Ok) => IoStatus::Ok,
            _ => IoStatus::IoError,
        }
    }
}

/// How a device receives I/O from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// Whole-request draining from a host-managed request queue.
    Request,
    /// Per-segment dispatch of bios, bypassing the request queue.
    #[default]
    Bio,
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchMode::Request => f.write_str("request"),
            DispatchMode::Bio => f.write_str("bio"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown dispatch mode {0:?} (expected `request` or `bio`)")]
pub struct UnknownDispatchMode(pub String);

impl FromStr for DispatchMode {
    type Err = UnknownDispatchMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "request" | "rq" => Ok(DispatchMode::Request),
            "bio" | "noqueue" => Ok(DispatchMode::Bio),
            _ => Err(UnknownDispatchMode(s.to_string())),
        }
    }
}

/// A block I/O: consecutive sectors starting at [`Bio::sector`], split into segments.
///
/// Each segment covers `len >> 9` sectors; trailing bytes of a segment that is not a multiple of
/// 512 are neither read nor written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bio {
    direction: Direction,
    sector: u64,
    segments: Vec<Vec<u8>>,
    status: Option<IoStatus>,
}

impl Bio {
    /// A read into zeroed segments of the given byte lengths.
    pub fn read(sector: u64, segment_lens: impl IntoIterator<Item = usize>) -> Self {
        Self {
            direction: Direction::Read,
            sector,
            segments: segment_lens.into_iter().map(|len| vec![0u8; len]).collect(),
            status: None,
        }
    }

    /// A write of the given segments, in order.
    pub fn write(sector: u64, segments: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Self {
            direction: Direction::Write,
            sector,
            segments: segments.into_iter().collect(),
            status: None,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// First sector addressed by the bio.
    pub fn sector(&self) -> u64 {
        self.sector
    }

    /// Total number of sectors covered by all segments.
    pub fn sectors(&self) -> u64 {
        self.segments
            .iter()
            .map(|seg| (seg.len() >> SECTOR_SHIFT) as u64)
            .sum()
    }

    pub fn segments(&self) -> &[Vec<u8>] {
        &self.segments
    }

    pub(crate) fn segments_mut(&mut self) -> &mut [Vec<u8>] {
        &mut self.segments
    }

    /// Segment buffers concatenated.
    pub fn data(&self) -> Vec<u8> {
        self.segments.concat()
    }

    pub fn into_segments(self) -> Vec<Vec<u8>> {
        self.segments
    }

    /// `None` until the bio has been completed.
    pub fn status(&self) -> Option<IoStatus> {
        self.status
    }

    pub(crate) fn complete(&mut self, status: IoStatus) {
        debug_assert!(self.status.is_none(), "bio completed twice");
        self.status = Some(status);
    }
}

/// Kind of a queued request. Only [`RequestKind::Fs`] requests move data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Ordinary file-system read/write.
    Fs,
    /// Command passthrough (SCSI-style packet commands).
    Passthrough,
    /// Driver-private request.
    Special,
}

/// A queued request: a bio plus a cursor over its chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    kind: RequestKind,
    bio: Bio,
    /// Next chunk to transfer.
    chunk: usize,
    /// Sector the next chunk starts at.
    pos: u64,
    status: IoStatus,
}

impl Request {
    pub fn new(kind: RequestKind, bio: Bio) -> Self {
        let pos = bio.sector;
        Self {
            kind,
            bio,
            chunk: 0,
            pos,
            status: IoStatus::Ok,
        }
    }

    /// An ordinary data request.
    pub fn fs(bio: Bio) -> Self {
        Self::new(RequestKind::Fs, bio)
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn bio(&self) -> &Bio {
        &self.bio
    }

    pub fn into_bio(self) -> Bio {
        self.bio
    }

    /// `None` until the request has been completed.
    pub fn status(&self) -> Option<IoStatus> {
        self.bio.status
    }

    pub(crate) fn direction(&self) -> Direction {
        self.bio.direction
    }

    /// Start sector and buffer of the current chunk, if any remain.
    pub(crate) fn current_chunk(&mut self) -> Option<(u64, &mut Vec<u8>)> {
        let pos = self.pos;
        self.bio.segments.get_mut(self.chunk).map(|buf| (pos, buf))
    }

    /// Completes the current chunk with `status`.
    ///
    /// Returns `true` while chunks remain. Once the last chunk is done the request is completed
    /// with the aggregate status of all its chunks.
    pub(crate) fn end_current(&mut self, status: IoStatus) -> bool {
        if let Some(buf) = self.bio.segments.get(self.chunk) {
            self.pos = self.pos.saturating_add((buf.len() >> SECTOR_SHIFT) as u64);
            self.chunk += 1;
        }
        self.status = self.status.and(status);
        if self.chunk < self.bio.segments.len() {
            return true;
        }
        self.bio.complete(self.status);
        false
    }

    /// Completes the whole request with `status`, skipping any remaining chunks.
    pub(crate) fn end_all(&mut self, status: IoStatus) {
        self.chunk = self.bio.segments.len();
        self.status = self.status.and(status);
        self.bio.complete(self.status);
    }
}

/// State guarded by the per-device lock.
#[derive(Debug, Default)]
pub(crate) struct QueueState {
    pending: VecDeque<Request>,
}

impl QueueState {
    pub(crate) fn enqueue(&mut self, request: Request) {
        self.pending.push_back(request);
    }

    pub(crate) fn fetch(&mut self) -> Option<Request> {
        self.pending.pop_front()
    }
}
