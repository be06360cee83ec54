//! KNX Individual Address implementation.
//!
//! Individual addresses identify physical devices on the KNX bus, including
//! the tunnel endpoint the gateway assigns to this client.
//! Format: Area.Line.Device (e.g., 1.1.5)
//! - Area: 0-15 (4 bits)
//! - Line: 0-15 (4 bits)
//! - Device: 0-255 (8 bits)

use super::parse_components;
use crate::error::{KnxError, Result};
use core::fmt;

/// KNX Individual Address
///
/// # Examples
///
/// ```
/// use knx_tunnel::addressing::IndividualAddress;
///
/// let addr: IndividualAddress = "1.1.100".parse()?;
/// assert_eq!(addr.raw(), 0x1164);
/// # Ok::<(), knx_tunnel::KnxError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IndividualAddress {
    raw: u16,
}

impl IndividualAddress {
    /// Maximum area value (4 bits)
    pub const MAX_AREA: u8 = 15;
    /// Maximum line value (4 bits)
    pub const MAX_LINE: u8 = 15;
    /// Maximum device value (8 bits)
    pub const MAX_DEVICE: u8 = 255;

    /// `0.0.0`: lets the gateway substitute the tunnel's own address.
    pub const UNASSIGNED: Self = Self { raw: 0 };

    /// Create an individual address from its components.
    pub fn new(area: u8, line: u8, device: u8) -> Result<Self> {
        if area > Self::MAX_AREA || line > Self::MAX_LINE {
            return Err(KnxError::address_out_of_range());
        }

        let raw = (u16::from(area) << 12) | (u16::from(line) << 8) | u16::from(device);
        Ok(Self { raw })
    }

    /// Raw 16-bit value
    #[inline(always)]
    pub const fn raw(self) -> u16 {
        self.raw
    }

    /// Area (0-15)
    #[inline(always)]
    pub const fn area(self) -> u8 {
        ((self.raw >> 12) & 0x0F) as u8
    }

    /// Line (0-15)
    #[inline(always)]
    pub const fn line(self) -> u8 {
        ((self.raw >> 8) & 0x0F) as u8
    }

    /// Device (0-255)
    #[inline(always)]
    pub const fn device(self) -> u8 {
        (self.raw & 0xFF) as u8
    }

    /// Write the address big-endian into `buf`.
    #[inline]
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() < 2 {
            return Err(KnxError::buffer_too_small());
        }
        buf[0..2].copy_from_slice(&self.raw.to_be_bytes());
        Ok(2)
    }

    /// Read a big-endian address from the first two bytes of `buf`.
    #[inline]
    pub fn decode(buf: &[u8]) -> Result<Self> {
        match buf {
            [hi, lo, ..] => Ok(Self {
                raw: u16::from_be_bytes([*hi, *lo]),
            }),
            _ => Err(KnxError::truncated_body()),
        }
    }
}

impl fmt::Display for IndividualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.area(), self.line(), self.device())
    }
}

impl From<u16> for IndividualAddress {
    #[inline(always)]
    fn from(raw: u16) -> Self {
        Self { raw }
    }
}

impl From<IndividualAddress> for u16 {
    #[inline(always)]
    fn from(addr: IndividualAddress) -> u16 {
        addr.raw
    }
}

impl core::str::FromStr for IndividualAddress {
    type Err = KnxError;

    fn from_str(s: &str) -> Result<Self> {
        let fields = parse_components(s, '.')?;
        let [area, line, device] = fields.as_slice() else {
            return Err(KnxError::invalid_address_format());
        };

        if *area > u16::from(Self::MAX_AREA) || *line > u16::from(Self::MAX_LINE) || *device > u16::from(Self::MAX_DEVICE) {
            return Err(KnxError::invalid_address_format());
        }

        Self::new(*area as u8, *line as u8, *device as u8)
    }
}
