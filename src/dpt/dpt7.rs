//! DPT 7.xxx - 2-byte Unsigned Value
//!
//! 16-bit unsigned, big-endian, full 0-65535 range for every subtype.
//!
//! ## Common Subtypes
//!
//! - **7.001** - Pulses
//! - **7.002** - Time Period (ms)
//! - **7.005** - Time Period (s)
//! - **7.007** - Time Period (h)
//! - **7.012** - Current (mA)
//! - **7.013** - Brightness (lux)
//! - **7.600** - Color Temperature (K)

use crate::dpt::{DptDecode, DptEncode};
use crate::error::{KnxError, Result};

/// DPT 7.xxx 16-bit unsigned types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Dpt7 {
    /// DPT 7.001 - Pulses (0-65535)
    Pulses,
    /// DPT 7.002 - Time Period (ms)
    TimePeriodMs,
    /// DPT 7.005 - Time Period (s)
    TimePeriodSec,
    /// DPT 7.007 - Time Period (h)
    TimePeriodHr,
    /// DPT 7.012 - Current (mA)
    CurrentMa,
    /// DPT 7.013 - Brightness (lux)
    Brightness,
    /// DPT 7.600 - Color Temperature (K)
    ColorTemperature,
}

impl Dpt7 {
    /// Every subtype.
    pub const ALL: [Dpt7; 7] = [
        Dpt7::Pulses,
        Dpt7::TimePeriodMs,
        Dpt7::TimePeriodSec,
        Dpt7::TimePeriodHr,
        Dpt7::CurrentMa,
        Dpt7::Brightness,
        Dpt7::ColorTemperature,
    ];

    /// Get the DPT identifier string (e.g., "7.001")
    #[inline]
    pub const fn identifier(&self) -> &'static str {
        match self {
            Dpt7::Pulses => "7.001",
            Dpt7::TimePeriodMs => "7.002",
            Dpt7::TimePeriodSec => "7.005",
            Dpt7::TimePeriodHr => "7.007",
            Dpt7::CurrentMa => "7.012",
            Dpt7::Brightness => "7.013",
            Dpt7::ColorTemperature => "7.600",
        }
    }

    /// Get the unit string for this DPT
    #[inline]
    pub const fn unit(&self) -> &'static str {
        match self {
            Dpt7::Pulses => "pulses",
            Dpt7::TimePeriodMs => "ms",
            Dpt7::TimePeriodSec => "s",
            Dpt7::TimePeriodHr => "h",
            Dpt7::CurrentMa => "mA",
            Dpt7::Brightness => "lux",
            Dpt7::ColorTemperature => "K",
        }
    }
}

impl DptEncode<u16> for Dpt7 {
    fn encode(&self, value: u16, buf: &mut [u8]) -> Result<usize> {
        let out = buf.get_mut(..2).ok_or_else(KnxError::buffer_too_small)?;
        out.copy_from_slice(&value.to_be_bytes());
        Ok(2)
    }
}

impl DptDecode<u16> for Dpt7 {
    fn decode(&self, data: &[u8]) -> Result<u16> {
        match data {
            [hi, lo, ..] => Ok(u16::from_be_bytes([*hi, *lo])),
            _ => Err(KnxError::invalid_dpt_data()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brightness() {
        assert_eq!(Dpt7::Brightness.decode(&[0x13, 0x88]).unwrap(), 5000);
        let mut buf = [0u8; 2];
        Dpt7::Pulses.encode(1234, &mut buf).unwrap();
        assert_eq!(buf, [0x04, 0xD2]);
    }

    #[test]
    fn test_short_input() {
        assert!(Dpt7::ColorTemperature.decode(&[0x0F]).is_err());
        assert!(Dpt7::Pulses.encode(1, &mut [0u8; 1]).is_err());
    }
}
