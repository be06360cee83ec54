//! KNX Group Address implementation.
//!
//! Group addresses name a function on the bus ("kitchen light") rather than a
//! device. Two notations share the same 16-bit value:
//! - 3-level: Main/Middle/Sub (e.g., 1/2/3), 5/3/8 bits
//! - 2-level: Main/Sub (e.g., 1/515), 5/11 bits
//!
//! Parsing also accepts the dotted spelling `1.2.3` some gateway tools print.

use super::parse_components;
use crate::error::{KnxError, Result};
use core::fmt;

/// KNX Group Address
///
/// # Examples
///
/// ```
/// use knx_tunnel::addressing::GroupAddress;
///
/// let addr = GroupAddress::new(1, 1, 1)?;
/// assert_eq!(addr.raw(), 0x0901);
///
/// let parsed: GroupAddress = "1/1/1".parse()?;
/// assert_eq!(parsed, addr);
/// # Ok::<(), knx_tunnel::KnxError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GroupAddress {
    raw: u16,
}

impl GroupAddress {
    /// Maximum main group value (5 bits)
    pub const MAX_MAIN: u8 = 31;
    /// Maximum middle group value (3 bits)
    pub const MAX_MIDDLE: u8 = 7;
    /// Maximum sub group value in 3-level notation (8 bits)
    pub const MAX_SUB: u8 = 255;
    /// Maximum sub group value in 2-level notation (11 bits)
    pub const MAX_SUB_2LEVEL: u16 = 2047;

    /// Create a group address from 3-level notation.
    ///
    /// Returns an error if `main` > 31 or `middle` > 7.
    pub fn new(main: u8, middle: u8, sub: u8) -> Result<Self> {
        if main > Self::MAX_MAIN || middle > Self::MAX_MIDDLE {
            return Err(KnxError::address_out_of_range());
        }

        let raw = (u16::from(main) << 11) | (u16::from(middle) << 8) | u16::from(sub);
        Ok(Self { raw })
    }

    /// Create a group address from 2-level notation.
    ///
    /// Returns an error if `main` > 31 or `sub` > 2047.
    pub fn new_2level(main: u8, sub: u16) -> Result<Self> {
        if main > Self::MAX_MAIN || sub > Self::MAX_SUB_2LEVEL {
            return Err(KnxError::address_out_of_range());
        }

        Ok(Self {
            raw: (u16::from(main) << 11) | sub,
        })
    }

    /// Raw 16-bit value
    #[inline(always)]
    pub const fn raw(self) -> u16 {
        self.raw
    }

    /// Main group (0-31)
    #[inline(always)]
    pub const fn main(self) -> u8 {
        ((self.raw >> 11) & 0x1F) as u8
    }

    /// Middle group (0-7)
    #[inline(always)]
    pub const fn middle(self) -> u8 {
        ((self.raw >> 8) & 0x07) as u8
    }

    /// Sub group in 3-level notation (0-255)
    #[inline(always)]
    pub const fn sub(self) -> u8 {
        (self.raw & 0xFF) as u8
    }

    /// Sub group in 2-level notation (0-2047)
    #[inline(always)]
    pub const fn sub_2level(self) -> u16 {
        self.raw & 0x07FF
    }

    /// Format as `main/sub`.
    pub fn to_string_2level(&self) -> heapless::String<16> {
        use core::fmt::Write;
        let mut s = heapless::String::new();
        // "31/2047" always fits in 16 bytes
        let _ = write!(s, "{}/{}", self.main(), self.sub_2level());
        s
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

impl From<u16> for GroupAddress {
    #[inline(always)]
    fn from(raw: u16) -> Self {
        Self { raw }
    }
}

impl From<GroupAddress> for u16 {
    #[inline(always)]
    fn from(addr: GroupAddress) -> u16 {
        addr.raw
    }
}

impl fmt::Display for GroupAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.main(), self.middle(), self.sub())
    }
}

impl core::str::FromStr for GroupAddress {
    type Err = KnxError;

    fn from_str(s: &str) -> Result<Self> {
        let separator = if s.contains('/') { '/' } else { '.' };
        let fields = parse_components(s, separator)?;

        let main = u8::try_from(fields[0])
            .ok()
            .filter(|m| *m <= Self::MAX_MAIN)
            .ok_or_else(KnxError::invalid_address_format)?;

        match fields.len() {
            3 => {
                let middle = u8::try_from(fields[1])
                    .ok()
                    .filter(|m| *m <= Self::MAX_MIDDLE)
                    .ok_or_else(KnxError::invalid_address_format)?;
                let sub = u8::try_from(fields[2]).map_err(|_| KnxError::invalid_address_format())?;
                Self::new(main, middle, sub)
            }
            2 if fields[1] <= Self::MAX_SUB_2LEVEL => Self::new_2level(main, fields[1]),
            _ => Err(KnxError::invalid_address_format()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_3level_valid() {
        let addr = GroupAddress::new(1, 2, 3).unwrap();
        assert_eq!(addr.main(), 1);
        assert_eq!(addr.middle(), 2);
        assert_eq!(addr.sub(), 3);
    }

    #[test]
    fn test_new_rejects_out_of_range() {
        assert!(GroupAddress::new(32, 0, 0).unwrap_err().is_addressing());
        assert!(GroupAddress::new(0, 8, 0).is_err());
        assert!(GroupAddress::new_2level(0, 2048).is_err());
    }

    #[test]
    fn test_1_1_1_encoding() {
        // 00001 001 00000001
        let addr: GroupAddress = "1/1/1".parse().unwrap();
        assert_eq!(addr.raw(), 0x0901);
    }

    #[test]
    fn test_from_raw() {
        let addr = GroupAddress::from(0x0A03u16);
        assert_eq!(addr.main(), 1);
        assert_eq!(addr.middle(), 2);
        assert_eq!(addr.sub(), 3);
        assert_eq!(u16::from(addr), 0x0A03);
    }

    #[test]
    fn test_encode_decode() {
        let addr = GroupAddress::new(31, 7, 255).unwrap();
        let mut buf = [0u8; 2];
        addr.encode(&mut buf).unwrap();
        assert_eq!(buf, [0xFF, 0xFF]);
        assert_eq!(GroupAddress::decode(&buf).unwrap(), addr);
        assert!(GroupAddress::decode(&buf[..1]).is_err());
    }

    #[test]
    fn test_display() {
        let addr = GroupAddress::new(1, 2, 3).unwrap();
        assert_eq!(format!("{}", addr), "1/2/3");
        assert_eq!(addr.to_string_2level().as_str(), "1/515");
    }

    #[test]
    fn test_parse_2level() {
        let addr: GroupAddress = "1/515".parse().unwrap();
        assert_eq!(addr, GroupAddress::new(1, 2, 3).unwrap());
    }

    #[test]
    fn test_parse_dotted() {
        let addr: GroupAddress = "1.1.99".parse().unwrap();
        assert_eq!(addr, GroupAddress::new(1, 1, 99).unwrap());
    }

    #[test]
    fn test_parse_invalid_format() {
        for input in ["", "1", "1/2/3/4", "32/0/0", "1/8/0", "1/2/256", "1/2048", "a/b/c", "1//3", "+1/2/3", " 1/2/3"] {
            let err = input.parse::<GroupAddress>().unwrap_err();
            assert!(err.is_addressing(), "{input:?} should be rejected");
        }
    }

    #[test]
    fn test_round_trip_all_3level() {
        for raw in (0..=u16::MAX).step_by(7) {
            let addr = GroupAddress::from(raw);
            let text = format!("{}", addr);
            assert_eq!(text.parse::<GroupAddress>().unwrap(), addr);
        }
    }
}
