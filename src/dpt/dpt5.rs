//! DPT 5.xxx - 8-bit Unsigned Value (1 byte)
//!
//! ## Common Subtypes
//!
//! - **5.001** - Percentage (0-100%), scaled onto 0-255
//! - **5.003** - Angle (0-360°), scaled onto 0-255
//! - **5.004** - Percentage (0-255%), raw
//! - **5.005** - Ratio (0-255), raw
//! - **5.010** - Counter pulses (0-255), raw
//!
//! Scaling rounds to the nearest step, so every whole percentage survives an
//! encode/decode round trip.
//!
//! ## Example
//!
//! ```
//! use knx_tunnel::dpt::{Dpt5, DptDecode, DptEncode};
//!
//! let mut buf = [0u8; 1];
//! Dpt5::Percentage.encode(75, &mut buf)?;
//! assert_eq!(buf, [191]);
//! assert_eq!(Dpt5::Percentage.decode(&buf)?, 75);
//! # Ok::<(), knx_tunnel::KnxError>(())
//! ```

use crate::dpt::{DptDecode, DptEncode};
use crate::error::{KnxError, Result};

/// DPT 5.xxx 8-bit unsigned types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Dpt5 {
    /// DPT 5.001 - Percentage (0-100%)
    Percentage,
    /// DPT 5.003 - Angle (0-360°)
    Angle,
    /// DPT 5.004 - Percentage 0-255
    PercentU8,
    /// DPT 5.005 - Ratio (0-255)
    Ratio,
    /// DPT 5.010 - Counter pulses (0-255)
    Counter,
}

impl Dpt5 {
    /// Every subtype.
    pub const ALL: [Dpt5; 5] = [
        Dpt5::Percentage,
        Dpt5::Angle,
        Dpt5::PercentU8,
        Dpt5::Ratio,
        Dpt5::Counter,
    ];

    /// Get the DPT identifier string (e.g., "5.001")
    pub const fn identifier(&self) -> &'static str {
        match self {
            Dpt5::Percentage => "5.001",
            Dpt5::Angle => "5.003",
            Dpt5::PercentU8 => "5.004",
            Dpt5::Ratio => "5.005",
            Dpt5::Counter => "5.010",
        }
    }

    /// Get the unit string for this DPT
    pub const fn unit(&self) -> &'static str {
        match self {
            Dpt5::Percentage | Dpt5::PercentU8 => "%",
            Dpt5::Angle => "°",
            Dpt5::Ratio => "",
            Dpt5::Counter => "pulses",
        }
    }

    /// Largest application value.
    pub const fn max(&self) -> u16 {
        match self {
            Dpt5::Percentage => 100,
            Dpt5::Angle => 360,
            Dpt5::PercentU8 | Dpt5::Ratio | Dpt5::Counter => 255,
        }
    }
}

impl DptEncode<u16> for Dpt5 {
    fn encode(&self, value: u16, buf: &mut [u8]) -> Result<usize> {
        if value > self.max() {
            return Err(KnxError::dpt_value_out_of_range());
        }
        let slot = buf.first_mut().ok_or_else(KnxError::buffer_too_small)?;

        let max = u32::from(self.max());
        *slot = ((u32::from(value) * 255 + max / 2) / max) as u8;
        Ok(1)
    }
}

impl DptDecode<u16> for Dpt5 {
    fn decode(&self, data: &[u8]) -> Result<u16> {
        let raw = u32::from(*data.first().ok_or_else(KnxError::invalid_dpt_data)?);
        let max = u32::from(self.max());
        Ok(((raw * max + 127) / 255) as u16)
    }
}
