use thiserror::Error;

pub type MapResult<T> = Result<T, MapError>;

/// Reasons the host refused to map a physical range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    #[error("cannot map an empty range at {start:#x}")]
    EmptyRange { start: u64 },

    #[error("physical range {start:#x}+{len:#x} overflows the address space")]
    AddressOverflow { start: u64, len: u64 },

    #[error(
        "physical range {start:#x}..{end:#x} is outside reserved memory {base:#x}..{limit:#x}"
    )]
    Unavailable {
        start: u64,
        end: u64,
        base: u64,
        limit: u64,
    },

    #[error("physical range {start:#x}..{end:#x} overlaps an existing mapping at {other_start:#x}..{other_end:#x}")]
    AlreadyClaimed {
        start: u64,
        end: u64,
        other_start: u64,
        other_end: u64,
    },

    #[error("reserved memory size {size} does not fit in usize")]
    SizeTooLarge { size: u64 },
}

/// Access outside of a [`crate::MappedRegion`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegionError {
    #[error("region access out of range: offset={offset:#x} len={len} size={size:#x}")]
    OutOfRange { offset: u64, len: usize, size: u64 },
}
