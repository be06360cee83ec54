//! KNX Datapoint Types (DPT).
//!
//! Each family module implements [`DptEncode`] / [`DptDecode`] for its plain
//! Rust value type. [`DatapointType`] wraps the families behind one enum and
//! converts between [`DptValue`] and the application data carried in a cEMI
//! frame ([`ApduData`]), including the 6-bit packing used by DPT 1.xxx and
//! 3.xxx.
//!
//! ## Supported families
//!
//! - **DPT 1.xxx** - Boolean (switch, up/down, open/close, ...)
//! - **DPT 3.xxx** - 4-bit step control (dimming, blinds)
//! - **DPT 5.xxx** - 8-bit unsigned (percentage, angle, counter)
//! - **DPT 7.xxx** - 16-bit unsigned (pulses, lux, colour temperature)
//! - **DPT 9.xxx** - 2-byte float (temperature, humidity, lux)
//!
//! ```
//! use knx_tunnel::dpt::{DatapointType, Dpt5, DptValue};
//!
//! let dpt: DatapointType = "5.001".parse()?;
//! assert_eq!(dpt, DatapointType::Dpt5(Dpt5::Percentage));
//!
//! let data = dpt.encode(DptValue::Unsigned(100))?;
//! assert_eq!(data.as_bytes(), &[0xFF]);
//! # Ok::<(), knx_tunnel::KnxError>(())
//! ```

use crate::error::{KnxError, Result};
use crate::protocol::cemi::ApduData;
use core::fmt;

pub mod dpt1;
pub mod dpt3;
pub mod dpt5;
pub mod dpt7;
pub mod dpt9;

#[doc(inline)]
pub use dpt1::Dpt1;
#[doc(inline)]
pub use dpt3::{ControlCommand, Dpt3, StepCode};
#[doc(inline)]
pub use dpt5::Dpt5;
#[doc(inline)]
pub use dpt7::Dpt7;
#[doc(inline)]
pub use dpt9::Dpt9;

/// Encode a value into its KNX byte representation.
pub trait DptEncode<T> {
    /// Write the encoded value into `buf`, returning the number of bytes used.
    fn encode(&self, value: T, buf: &mut [u8]) -> Result<usize>;
}

/// Decode KNX bytes into a value.
pub trait DptDecode<T> {
    /// Decode the value from the start of `data`.
    fn decode(&self, data: &[u8]) -> Result<T>;
}

/// A decoded datapoint value.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DptValue {
    /// DPT 1.xxx
    Bool(bool),
    /// DPT 3.xxx
    Control(ControlCommand),
    /// DPT 5.xxx and 7.xxx
    Unsigned(u16),
    /// DPT 9.xxx
    Float(f32),
}

impl DptValue {
    /// The boolean, if this is a DPT 1 value.
    pub fn as_bool(self) -> Option<bool> {
        match self {
            DptValue::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// Numeric view: booleans become 0/1, control commands their step count.
    pub fn as_f32(self) -> f32 {
        match self {
            DptValue::Bool(b) => f32::from(u8::from(b)),
            DptValue::Control(c) => f32::from(c.stepcode.intervals()),
            DptValue::Unsigned(v) => f32::from(v),
            DptValue::Float(v) => v,
        }
    }
}

impl fmt::Display for DptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DptValue::Bool(b) => write!(f, "{b}"),
            DptValue::Control(c) => write!(f, "{}{}", if c.control { '+' } else { '-' }, c.stepcode.intervals()),
            DptValue::Unsigned(v) => write!(f, "{v}"),
            DptValue::Float(v) => write!(f, "{v:.2}"),
        }
    }
}

/// A concrete datapoint type with its family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DatapointType {
    Dpt1(Dpt1),
    Dpt3(Dpt3),
    Dpt5(Dpt5),
    Dpt7(Dpt7),
    Dpt9(Dpt9),
}

impl DatapointType {
    /// DPT identifier such as `"9.001"`.
    pub const fn identifier(&self) -> &'static str {
        match self {
            DatapointType::Dpt1(d) => d.identifier(),
            DatapointType::Dpt3(d) => d.identifier(),
            DatapointType::Dpt5(d) => d.identifier(),
            DatapointType::Dpt7(d) => d.identifier(),
            DatapointType::Dpt9(d) => d.identifier(),
        }
    }

    /// Whether the value travels inside the APCI octet (6 bits or less).
    pub const fn is_packed(&self) -> bool {
        matches!(self, DatapointType::Dpt1(_) | DatapointType::Dpt3(_))
    }

    /// Encode `value` into application data ready for a group telegram.
    pub fn encode(&self, value: DptValue) -> Result<ApduData> {
        let mut buf = [0u8; 2];
        let len = match (self, value) {
            (DatapointType::Dpt1(d), DptValue::Bool(b)) => d.encode(b, &mut buf)?,
            (DatapointType::Dpt3(d), DptValue::Control(c)) => d.encode(c, &mut buf)?,
            (DatapointType::Dpt5(d), DptValue::Unsigned(v)) => d.encode(v, &mut buf)?,
            (DatapointType::Dpt7(d), DptValue::Unsigned(v)) => d.encode(v, &mut buf)?,
            (DatapointType::Dpt9(d), DptValue::Float(v)) => d.encode(v, &mut buf)?,
            (DatapointType::Dpt9(d), DptValue::Unsigned(v)) => d.encode(f32::from(v), &mut buf)?,
            _ => return Err(KnxError::dpt_type_mismatch()),
        };

        if self.is_packed() {
            Ok(ApduData::packed(buf[0]))
        } else {
            ApduData::from_slice(&buf[..len])
        }
    }

    /// Decode application data received in a group telegram.
    pub fn decode(&self, data: &[u8]) -> Result<DptValue> {
        Ok(match self {
            DatapointType::Dpt1(d) => DptValue::Bool(d.decode(data)?),
            DatapointType::Dpt3(d) => DptValue::Control(d.decode(data)?),
            DatapointType::Dpt5(d) => DptValue::Unsigned(d.decode(data)?),
            DatapointType::Dpt7(d) => DptValue::Unsigned(d.decode(data)?),
            DatapointType::Dpt9(d) => DptValue::Float(d.decode(data)?),
        })
    }
}

impl From<Dpt1> for DatapointType {
    fn from(d: Dpt1) -> Self {
        DatapointType::Dpt1(d)
    }
}

impl From<Dpt3> for DatapointType {
    fn from(d: Dpt3) -> Self {
        DatapointType::Dpt3(d)
    }
}

impl From<Dpt5> for DatapointType {
    fn from(d: Dpt5) -> Self {
        DatapointType::Dpt5(d)
    }
}

impl From<Dpt7> for DatapointType {
    fn from(d: Dpt7) -> Self {
        DatapointType::Dpt7(d)
    }
}

impl From<Dpt9> for DatapointType {
    fn from(d: Dpt9) -> Self {
        DatapointType::Dpt9(d)
    }
}

impl fmt::Display for DatapointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

impl core::str::FromStr for DatapointType {
    type Err = KnxError;

    /// Accepts `"1.001"` and `"DPT1.001"`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let id = match s.get(..3) {
            Some(prefix) if prefix.eq_ignore_ascii_case("dpt") => &s[3..],
            _ => s,
        };

        Dpt1::ALL
            .iter()
            .map(|d| DatapointType::Dpt1(*d))
            .chain(Dpt3::ALL.iter().map(|d| DatapointType::Dpt3(*d)))
            .chain(Dpt5::ALL.iter().map(|d| DatapointType::Dpt5(*d)))
            .chain(Dpt7::ALL.iter().map(|d| DatapointType::Dpt7(*d)))
            .chain(Dpt9::ALL.iter().map(|d| DatapointType::Dpt9(*d)))
            .find(|d| d.identifier() == id)
            .ok_or_else(KnxError::unknown_dpt)
    }
}
