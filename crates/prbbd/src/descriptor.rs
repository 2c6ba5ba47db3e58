//! `name,start,length` device descriptors.
//!
//! `start` and `length` are byte quantities written in octal (`0…`), decimal or hexadecimal
//! (`0x…`), optionally followed by `K`, `M` or `G` (binary multiples). Examples:
//!
//! ```text
//! swap,64M,128M
//! test,0x1000000,0x100000
//! ```

use std::str::FromStr;

use crate::{NumberField, ParseError};

/// Longest accepted device name, in bytes.
pub const MAX_NAME_LEN: usize = 63;

/// Size of the parameter buffer: a maximal name, two 20-digit numbers and the terminator.
///
/// [`parse`] takes descriptors strictly shorter than this. Startup entries are held to one byte
/// less (see `StartupQueue::push`).
pub const PARAM_LIMIT: usize = 64 + 20 + 20 + 1;

/// A parsed device description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub name: String,
    /// Physical start address, in bytes.
    pub start: u64,
    /// Length of the backing range, in bytes.
    pub len: u64,
}

impl FromStr for Descriptor {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

/// Parses a raw `name,start,length` string.
///
/// A single trailing newline is ignored. Zero is rejected for both the start address and the
/// length.
pub fn parse(raw: &str) -> Result<Descriptor, ParseError> {
    if raw.len() >= PARAM_LIMIT {
        return Err(ParseError::ParameterTooLong {
            len: raw.len(),
            max: PARAM_LIMIT - 1,
        });
    }
    let raw = raw.strip_suffix('\n').unwrap_or(raw);

    let mut fields = raw.splitn(4, ',');
    let name = fields.next().unwrap_or_default();
    let start = fields.next();
    let len = fields.next();
    if fields.next().is_some() {
        return Err(ParseError::TooManyFields);
    }
    let (Some(start), Some(len)) = (start, len) else {
        return Err(ParseError::TooFewFields);
    };

    if name.is_empty() {
        return Err(ParseError::EmptyName);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(ParseError::NameTooLong { len: name.len() });
    }

    Ok(Descriptor {
        name: name.to_string(),
        start: parse_field(NumberField::Start, start)?,
        len: parse_field(NumberField::Length, len)?,
    })
}

fn parse_field(field: NumberField, text: &str) -> Result<u64, ParseError> {
    match parse_size(text) {
        Some(value) if value != 0 => Ok(value),
        _ => Err(ParseError::InvalidNumber {
            field,
            text: text.to_string(),
        }),
    }
}

/// Parses a byte quantity with an optional `K`/`M`/`G` suffix.
///
/// Returns `None` for malformed text or if the value does not fit in a `u64`.
pub fn parse_size(text: &str) -> Option<u64> {
    let (number, shift) = match text.as_bytes().last()? {
        b'k' | b'K' => (&text[..text.len() - 1], 10),
        b'm' | b'M' => (&text[..text.len() - 1], 20),
        b'g' | b'G' => (&text[..text.len() - 1], 30),
        _ => (text, 0),
    };

    let (digits, radix) = if let Some(hex) = number
        .strip_prefix("0x")
        .or_else(|| number.strip_prefix("0X"))
    {
        (hex, 16)
    } else if number.len() > 1 && number.starts_with('0') {
        (&number[1..], 8)
    } else {
        (number, 10)
    };

    // `from_str_radix` tolerates a leading `+`; plain digits only here.
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    u64::from_str_radix(digits, radix)
        .ok()?
        .checked_mul(1u64 << shift)
}
