//! DPT 9.xxx - 2-byte Float Value
//!
//! ## Format
//!
//! ```text
//! SEEE EMMM MMMM MMMM
//! value = 0.01 * M * 2^E
//! ```
//!
//! M is a 12-bit two's complement mantissa (sign bit S plus 11 bits), E a
//! 4-bit exponent. The representable range is -671 088.64 to 670 760.96.
//! The encoder picks the smallest exponent that fits, which keeps the most
//! precision.
//!
//! ## Common Subtypes
//!
//! - **9.001** - Temperature (°C)
//! - **9.004** - Illuminance (lux)
//! - **9.005** - Wind speed (m/s)
//! - **9.007** - Humidity (%)
//! - **9.008** - Air quality (ppm)

use crate::dpt::{DptDecode, DptEncode};
use crate::error::{KnxError, Result};

/// DPT 9.xxx 2-byte float types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Dpt9 {
    /// DPT 9.001 - Temperature (°C)
    Temperature,
    /// DPT 9.002 - Temperature difference (K)
    TemperatureDifference,
    /// DPT 9.004 - Illuminance (lux)
    Illuminance,
    /// DPT 9.005 - Wind speed (m/s)
    WindSpeed,
    /// DPT 9.006 - Pressure (Pa)
    Pressure,
    /// DPT 9.007 - Humidity (%)
    Humidity,
    /// DPT 9.008 - Air quality (ppm)
    AirQuality,
}

impl Dpt9 {
    /// Every subtype.
    pub const ALL: [Dpt9; 7] = [
        Dpt9::Temperature,
        Dpt9::TemperatureDifference,
        Dpt9::Illuminance,
        Dpt9::WindSpeed,
        Dpt9::Pressure,
        Dpt9::Humidity,
        Dpt9::AirQuality,
    ];

    /// Get the DPT identifier string (e.g., "9.001")
    pub const fn identifier(&self) -> &'static str {
        match self {
            Dpt9::Temperature => "9.001",
            Dpt9::TemperatureDifference => "9.002",
            Dpt9::Illuminance => "9.004",
            Dpt9::WindSpeed => "9.005",
            Dpt9::Pressure => "9.006",
            Dpt9::Humidity => "9.007",
            Dpt9::AirQuality => "9.008",
        }
    }

    /// Get the unit string for this DPT
    pub const fn unit(&self) -> &'static str {
        match self {
            Dpt9::Temperature => "°C",
            Dpt9::TemperatureDifference => "K",
            Dpt9::Illuminance => "lux",
            Dpt9::WindSpeed => "m/s",
            Dpt9::Pressure => "Pa",
            Dpt9::Humidity => "%",
            Dpt9::AirQuality => "ppm",
        }
    }
}

/// Round half away from zero; `f32::round` needs std.
#[inline]
fn round(x: f32) -> i32 {
    if x >= 0.0 {
        (x + 0.5) as i32
    } else {
        (x - 0.5) as i32
    }
}

impl DptEncode<f32> for Dpt9 {
    fn encode(&self, value: f32, buf: &mut [u8]) -> Result<usize> {
        let out = buf.get_mut(..2).ok_or_else(KnxError::buffer_too_small)?;
        if !value.is_finite() {
            return Err(KnxError::dpt_value_out_of_range());
        }

        let scaled = value * 100.0;
        for exponent in 0u16..=15 {
            let mantissa = round(scaled / (1u32 << exponent) as f32);
            if (-2048..=2047).contains(&mantissa) {
                let sign = if mantissa < 0 { 0x8000 } else { 0 };
                let raw = sign | (exponent << 11) | (mantissa as u16 & 0x07FF);
                out.copy_from_slice(&raw.to_be_bytes());
                return Ok(2);
            }
        }

        Err(KnxError::dpt_value_out_of_range())
    }
}

impl DptDecode<f32> for Dpt9 {
    fn decode(&self, data: &[u8]) -> Result<f32> {
        let [hi, lo, ..] = data else {
            return Err(KnxError::invalid_dpt_data());
        };
        let raw = u16::from_be_bytes([*hi, *lo]);

        let exponent = (raw >> 11) & 0x0F;
        let mut mantissa = i32::from(raw & 0x07FF);
        if raw & 0x8000 != 0 {
            mantissa -= 2048;
        }

        Ok(0.01 * mantissa as f32 * (1u32 << exponent) as f32)
    }
}
