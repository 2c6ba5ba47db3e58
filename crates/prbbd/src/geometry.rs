/// Legacy CHS geometry reported for a device.
///
/// RAM has no physical geometry; this is made up from the capacity alone so that tools asking
/// for `HDIO_GETGEO`-style data get something consistent. It carries no addressing meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub cylinders: u64,
    pub heads: u8,
    pub sectors: u8,
    pub start: u64,
}

impl Geometry {
    pub const HEADS: u8 = 4;
    pub const SECTORS_PER_TRACK: u8 = 16;

    /// Geometry for a device of `capacity` 512-byte sectors.
    pub fn from_capacity(capacity: u64) -> Self {
        Self {
            cylinders: (capacity & !0x3f) >> 6,
            heads: Self::HEADS,
            sectors: Self::SECTORS_PER_TRACK,
            start: 0,
        }
    }
}
