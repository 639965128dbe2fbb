//! Target addresses for locating and patching.
//!
//! The addressing mode follows the operand width: four hex digits name a
//! flat 16-bit offset, eight hex digits name a page (high 16 bits, selected
//! by an Extended Linear Address record) plus an offset within it.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("address '{0}' must be 4 (flat) or 8 (extended) hex digits")]
    InvalidWidth(String),

    #[error("address '{0}' contains a non-hex digit")]
    InvalidDigit(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Address {
    /// 16-bit mode: an offset with no page context
    Flat(u16),
    /// 32-bit extended linear mode
    Linear { page: u16, offset: u16 },
}

impl Address {
    /// Build a linear address from its 32-bit value.
    pub fn linear(value: u32) -> Self {
        Address::Linear {
            page: (value >> 16) as u16,
            offset: value as u16,
        }
    }

    /// Low 16 bits, relative to the page (or the whole address in flat mode).
    pub fn offset(&self) -> u16 {
        match self {
            Address::Flat(offset) => *offset,
            Address::Linear { offset, .. } => *offset,
        }
    }

    pub fn page(&self) -> Option<u16> {
        match self {
            Address::Flat(_) => None,
            Address::Linear { page, .. } => Some(*page),
        }
    }

    /// Same addressing mode and page, different offset.
    pub fn with_offset(&self, offset: u16) -> Self {
        match self {
            Address::Flat(_) => Address::Flat(offset),
            Address::Linear { page, .. } => Address::Linear {
                page: *page,
                offset,
            },
        }
    }

    /// Offset `len` bytes further on, or `None` if that leaves the page.
    pub fn checked_add(&self, len: usize) -> Option<Self> {
        let end = usize::from(self.offset()).checked_add(len)?;
        let end = u16::try_from(end).ok()?;
        Some(self.with_offset(end))
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .trim()
            .trim_start_matches("0x")
            .trim_start_matches("0X");

        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AddressError::InvalidDigit(s.to_string()));
        }

        match digits.len() {
            4 => u16::from_str_radix(digits, 16)
                .map(Address::Flat)
                .map_err(|_| AddressError::InvalidDigit(s.to_string())),
            8 => u32::from_str_radix(digits, 16)
                .map(Address::linear)
                .map_err(|_| AddressError::InvalidDigit(s.to_string())),
            _ => Err(AddressError::InvalidWidth(s.to_string())),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Flat(offset) => write!(f, "{offset:04X}"),
            Address::Linear { page, offset } => write!(f, "{page:04X}{offset:04X}"),
        }
    }
}
