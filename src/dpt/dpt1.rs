//! DPT 1.xxx - Boolean (1 bit)
//!
//! Boolean datapoint types represent binary states.
//! On the wire the bit travels packed into the low bits of the APCI octet.
//!
//! ## Common Subtypes
//!
//! - **1.001** - Switch (off/on)
//! - **1.002** - Bool (false/true)
//! - **1.003** - Enable (disable/enable)
//! - **1.008** - UpDown (up/down)
//! - **1.009** - OpenClose (open/close)
//!
//! ## Example
//!
//! ```
//! use knx_tunnel::dpt::{Dpt1, DptDecode, DptEncode};
//!
//! let mut buf = [0u8; 1];
//! let len = Dpt1::Switch.encode(true, &mut buf)?;
//! assert_eq!(&buf[..len], &[0x01]);
//!
//! assert!(Dpt1::Switch.decode(&[0x01])?);
//! # Ok::<(), knx_tunnel::KnxError>(())
//! ```

use crate::dpt::{DptDecode, DptEncode};
use crate::error::{KnxError, Result};

/// DPT 1.xxx Boolean types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Dpt1 {
    /// DPT 1.001 - Switch (off/on)
    Switch,
    /// DPT 1.002 - Bool (false/true)
    Bool,
    /// DPT 1.003 - Enable (disable/enable)
    Enable,
    /// DPT 1.005 - Alarm (no alarm/alarm)
    Alarm,
    /// DPT 1.007 - Step (decrease/increase)
    Step,
    /// DPT 1.008 - UpDown (up/down)
    UpDown,
    /// DPT 1.009 - OpenClose (open/close)
    OpenClose,
    /// DPT 1.010 - Start (stop/start)
    Start,
    /// DPT 1.011 - State (inactive/active)
    State,
}

impl Dpt1 {
    /// Every subtype, in identifier order.
    pub const ALL: [Dpt1; 9] = [
        Dpt1::Switch,
        Dpt1::Bool,
        Dpt1::Enable,
        Dpt1::Alarm,
        Dpt1::Step,
        Dpt1::UpDown,
        Dpt1::OpenClose,
        Dpt1::Start,
        Dpt1::State,
    ];

    /// Get the DPT identifier string (e.g., "1.001")
    pub const fn identifier(&self) -> &'static str {
        match self {
            Dpt1::Switch => "1.001",
            Dpt1::Bool => "1.002",
            Dpt1::Enable => "1.003",
            Dpt1::Alarm => "1.005",
            Dpt1::Step => "1.007",
            Dpt1::UpDown => "1.008",
            Dpt1::OpenClose => "1.009",
            Dpt1::Start => "1.010",
            Dpt1::State => "1.011",
        }
    }

    /// Labels for the `false` and `true` states.
    pub const fn labels(&self) -> (&'static str, &'static str) {
        match self {
            Dpt1::Switch => ("off", "on"),
            Dpt1::Bool => ("false", "true"),
            Dpt1::Enable => ("disable", "enable"),
            Dpt1::Alarm => ("no alarm", "alarm"),
            Dpt1::Step => ("decrease", "increase"),
            Dpt1::UpDown => ("up", "down"),
            Dpt1::OpenClose => ("open", "close"),
            Dpt1::Start => ("stop", "start"),
            Dpt1::State => ("inactive", "active"),
        }
    }

    /// Label for a concrete state.
    pub const fn label(&self, value: bool) -> &'static str {
        let (off, on) = self.labels();
        if value { on } else { off }
    }
}

impl DptEncode<bool> for Dpt1 {
    fn encode(&self, value: bool, buf: &mut [u8]) -> Result<usize> {
        let slot = buf.first_mut().ok_or_else(KnxError::buffer_too_small)?;
        *slot = u8::from(value);
        Ok(1)
    }
}

impl DptDecode<bool> for Dpt1 {
    fn decode(&self, data: &[u8]) -> Result<bool> {
        data.first()
            .map(|b| b & 0x01 != 0)
            .ok_or_else(KnxError::invalid_dpt_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode() {
        let mut buf = [0xFFu8; 1];
        assert_eq!(Dpt1::Switch.encode(false, &mut buf).unwrap(), 1);
        assert_eq!(buf, [0x00]);
        Dpt1::Switch.encode(true, &mut buf).unwrap();
        assert_eq!(buf, [0x01]);
    }

    #[test]
    fn test_encode_empty_buffer() {
        assert!(Dpt1::Switch.encode(true, &mut []).is_err());
    }

    #[test]
    fn test_decode_masks_upper_bits() {
        // APCI bits may still be present in a raw packed octet
        assert!(Dpt1::Switch.decode(&[0x81]).unwrap());
        assert!(!Dpt1::Switch.decode(&[0x80]).unwrap());
        assert!(Dpt1::Switch.decode(&[]).is_err());
    }

    #[test]
    fn test_labels() {
        assert_eq!(Dpt1::Switch.label(true), "on");
        assert_eq!(Dpt1::UpDown.label(false), "up");
    }
}
