use std::fmt;

use prbbd_memory::MapError;
use thiserror::Error;

use crate::descriptor::MAX_NAME_LEN;

/// Numeric field of a device descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberField {
    Start,
    Length,
}

impl fmt::Display for NumberField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumberField::Start => f.write_str("start address"),
            NumberField::Length => f.write_str("device length"),
        }
    }
}

/// Malformed `name,start,length` descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("parameter too long ({len} bytes, at most {max})")]
    ParameterTooLong { len: usize, max: usize },

    #[error("not enough arguments")]
    TooFewFields,

    #[error("too many arguments")]
    TooManyFields,

    #[error("empty device name")]
    EmptyName,

    #[error("device name is {len} bytes (limit {})", MAX_NAME_LEN)]
    NameTooLong { len: usize },

    #[error("illegal {field} {text:?}")]
    InvalidNumber { field: NumberField, text: String },
}

/// Failures reported by the host block layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("out of memory")]
    NoMemory,

    #[error("no free block major for {0:?}")]
    NoMajor(String),

    #[error("a disk named {0:?} is already published")]
    DuplicateName(String),

    #[error("minors {first_minor}..{end} of major {major} are already in use")]
    MinorsInUse { major: u32, first_minor: u32, end: u32 },
}

/// Device construction failed; every resource acquired so far has been released.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CreateError {
    #[error("mapping failed")]
    MapFailed(#[source] MapError),

    #[error("request queue initialisation failed")]
    QueueInitFailed(#[source] HostError),

    #[error("disk allocation failed")]
    DiskAllocFailed(#[source] HostError),
}

/// A single transfer could not be carried out. No bytes were copied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("beyond-end access (offset: {offset:#x} / bytes: {len:#x}, capacity: {capacity:#x})")]
    OutOfRange { offset: u64, len: u64, capacity: u64 },

    #[error("integer overflow while computing byte offsets")]
    OffsetOverflow,

    #[error("buffer of {have} bytes cannot hold a {need}-byte transfer")]
    ShortBuffer { need: u64, have: usize },
}

/// Driver initialisation failed. Nothing created during the attempt survives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartupError {
    #[error("register_blkdev failed")]
    MajorRegistration(#[source] HostError),

    #[error("bad device parameter {entry:?}")]
    Parse {
        entry: String,
        #[source]
        source: ParseError,
    },

    #[error("cannot create device from {entry:?}")]
    Create {
        entry: String,
        #[source]
        source: CreateError,
    },
}
