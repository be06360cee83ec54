//! DPT 3.xxx - 3-bit controlled (dimming and blinds)
//!
//! ## Format
//!
//! 4 bits total, packed into the APCI octet like DPT 1:
//! - Bit 3: control bit (direction)
//! - Bits 0-2: stepcode (0 = break, 1-7 = 1, 2, 4 ... 64 intervals)
//!
//! ```text
//! ┌─────────┬─────────────┐
//! │ Control │  Stepcode   │
//! │  (1b)   │    (3b)     │
//! └─────────┴─────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use knx_tunnel::dpt::{ControlCommand, Dpt3, DptEncode, StepCode};
//!
//! let mut buf = [0u8; 1];
//! let cmd = ControlCommand { control: true, stepcode: StepCode::Intervals4 };
//! Dpt3::Dimming.encode(cmd, &mut buf)?;
//! assert_eq!(buf, [0x0B]);
//! # Ok::<(), knx_tunnel::KnxError>(())
//! ```

use crate::dpt::{DptDecode, DptEncode};
use crate::error::{KnxError, Result};

/// DPT 3.xxx 3-bit controlled types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Dpt3 {
    /// DPT 3.007 - Dimming control (decrease/increase)
    Dimming,
    /// DPT 3.008 - Blind control (up/down)
    Blind,
}

/// Stepcode: number of intervals the range is divided into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum StepCode {
    /// Stop the running operation
    Break = 0,
    Intervals1 = 1,
    Intervals2 = 2,
    Intervals4 = 3,
    Intervals8 = 4,
    Intervals16 = 5,
    Intervals32 = 6,
    Intervals64 = 7,
}

/// Direction plus stepcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ControlCommand {
    /// false = decrease/up, true = increase/down
    pub control: bool,
    pub stepcode: StepCode,
}

impl Dpt3 {
    /// Every subtype.
    pub const ALL: [Dpt3; 2] = [Dpt3::Dimming, Dpt3::Blind];

    /// Get the DPT identifier string (e.g., "3.007")
    pub const fn identifier(&self) -> &'static str {
        match self {
            Dpt3::Dimming => "3.007",
            Dpt3::Blind => "3.008",
        }
    }

    /// Labels for the two control directions.
    pub const fn control_labels(&self) -> (&'static str, &'static str) {
        match self {
            Dpt3::Dimming => ("decrease", "increase"),
            Dpt3::Blind => ("up", "down"),
        }
    }
}

impl StepCode {
    /// Stepcode from its 3-bit value.
    pub fn from_u8(value: u8) -> Result<Self> {
        Ok(match value {
            0 => StepCode::Break,
            1 => StepCode::Intervals1,
            2 => StepCode::Intervals2,
            3 => StepCode::Intervals4,
            4 => StepCode::Intervals8,
            5 => StepCode::Intervals16,
            6 => StepCode::Intervals32,
            7 => StepCode::Intervals64,
            _ => return Err(KnxError::invalid_dpt_data()),
        })
    }

    /// 0 for Break, otherwise 1, 2, 4, ... 64.
    pub const fn intervals(&self) -> u8 {
        match self {
            StepCode::Break => 0,
            step => 1 << (*step as u8 - 1),
        }
    }
}

impl DptEncode<ControlCommand> for Dpt3 {
    fn encode(&self, value: ControlCommand, buf: &mut [u8]) -> Result<usize> {
        let slot = buf.first_mut().ok_or_else(KnxError::buffer_too_small)?;
        *slot = (u8::from(value.control) << 3) | (value.stepcode as u8);
        Ok(1)
    }
}

impl DptDecode<ControlCommand> for Dpt3 {
    fn decode(&self, data: &[u8]) -> Result<ControlCommand> {
        let byte = *data.first().ok_or_else(KnxError::invalid_dpt_data)?;
        Ok(ControlCommand {
            control: byte & 0x08 != 0,
            stepcode: StepCode::from_u8(byte & 0x07)?,
        })
    }
}
