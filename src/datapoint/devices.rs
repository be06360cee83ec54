//! Device-shaped wrappers over [`DataPoint`].
//!
//! - [`Switch`]: DPT 1.001 on/off
//! - [`Dimmer`]: DPT 5.001 brightness in percent
//! - [`Sensor`]: any numeric type, read-only

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::addressing::GroupAddress;
use crate::datapoint::DataPoint;
use crate::dpt::{DatapointType, Dpt1, Dpt5, DptValue};
use crate::error::{KnxError, Result};
use crate::knx_client::KnxClient;
use crate::net::AsyncTransport;

/// Something switched on and off, usually a light or a relay.
pub struct Switch<'c, M: RawMutex, T: AsyncTransport> {
    point: DataPoint<'c, M, T>,
}

impl<'c, M: RawMutex, T: AsyncTransport> Switch<'c, M, T> {
    pub fn new(client: &'c KnxClient<M, T>, address: GroupAddress) -> Result<Self> {
        Ok(Self {
            point: DataPoint::bind(client, address, Dpt1::Switch.into())?,
        })
    }

    #[inline]
    pub fn address(&self) -> GroupAddress {
        self.point.address()
    }

    pub async fn write(&self, on: bool) -> Result<()> {
        self.point.write(DptValue::Bool(on)).await
    }

    pub async fn on(&self) -> Result<()> {
        self.write(true).await
    }

    pub async fn off(&self) -> Result<()> {
        self.write(false).await
    }

    /// Invert the cached state; an unknown state counts as off.
    pub async fn toggle(&self) -> Result<()> {
        self.write(!self.state().unwrap_or(false)).await
    }

    /// Query the actuator for its state.
    pub async fn read(&self) -> Result<bool> {
        self.point.read().await?.as_bool().ok_or_else(KnxError::dpt_type_mismatch)
    }

    /// Cached state, `None` until a value was written or received.
    pub fn state(&self) -> Option<bool> {
        self.point.value().and_then(DptValue::as_bool)
    }

    /// Underlying data point.
    pub fn point(&self) -> &DataPoint<'c, M, T> {
        &self.point
    }
}

/// A dimming actuator driven by absolute brightness.
pub struct Dimmer<'c, M: RawMutex, T: AsyncTransport> {
    point: DataPoint<'c, M, T>,
}

impl<'c, M: RawMutex, T: AsyncTransport> Dimmer<'c, M, T> {
    pub fn new(client: &'c KnxClient<M, T>, address: GroupAddress) -> Result<Self> {
        Ok(Self {
            point: DataPoint::bind(client, address, Dpt5::Percentage.into())?,
        })
    }

    #[inline]
    pub fn address(&self) -> GroupAddress {
        self.point.address()
    }

    /// Set the brightness, 0 to 100 percent.
    ///
    /// # Errors
    ///
    /// `Dpt(ValueOutOfRange)` above 100.
    pub async fn set_level(&self, percent: u8) -> Result<()> {
        self.point.write(DptValue::Unsigned(u16::from(percent))).await
    }

    /// Query the actuator for its brightness.
    pub async fn read(&self) -> Result<u8> {
        level_of(self.point.read().await?).ok_or_else(KnxError::dpt_type_mismatch)
    }

    /// Cached brightness.
    pub fn level(&self) -> Option<u8> {
        self.point.value().and_then(level_of)
    }

    pub fn point(&self) -> &DataPoint<'c, M, T> {
        &self.point
    }
}

macro_rules! debug_via_point {
    ($($device:ident),*) => {$(
        impl<M: RawMutex, T: AsyncTransport> core::fmt::Debug for $device<'_, M, T> {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.debug_tuple(stringify!($device)).field(&self.point).finish()
            }
        }
    )*};
}

debug_via_point!(Switch, Dimmer, Sensor);

fn level_of(value: DptValue) -> Option<u8> {
    match value {
        DptValue::Unsigned(level) => u8::try_from(level).ok(),
        _ => None,
    }
}

/// A read-only measurement such as temperature, humidity or brightness.
pub struct Sensor<'c, M: RawMutex, T: AsyncTransport> {
    point: DataPoint<'c, M, T>,
}

impl<'c, M: RawMutex, T: AsyncTransport> Sensor<'c, M, T> {
    /// Bind a sensor; `dpt` must be a DPT 5, 7 or 9 type.
    ///
    /// # Errors
    ///
    /// `Dpt(TypeMismatch)` for boolean and control types.
    pub fn new(client: &'c KnxClient<M, T>, address: GroupAddress, dpt: impl Into<DatapointType>) -> Result<Self> {
        let dpt = dpt.into();
        if !matches!(
            dpt,
            DatapointType::Dpt5(_) | DatapointType::Dpt7(_) | DatapointType::Dpt9(_)
        ) {
            return Err(KnxError::dpt_type_mismatch());
        }
        Ok(Self {
            point: DataPoint::bind(client, address, dpt)?,
        })
    }

    #[inline]
    pub fn address(&self) -> GroupAddress {
        self.point.address()
    }

    #[inline]
    pub fn dpt(&self) -> DatapointType {
        self.point.dpt()
    }

    /// Ask the sensor for a fresh reading.
    pub async fn read(&self) -> Result<f32> {
        Ok(self.point.read().await?.as_f32())
    }

    /// Last reading seen on the bus.
    pub fn value(&self) -> Option<f32> {
        self.point.value().map(DptValue::as_f32)
    }

    /// Wait for the sensor's next report.
    pub async fn wait_update(&self) -> f32 {
        self.point.wait_update().await.as_f32()
    }

    pub fn point(&self) -> &DataPoint<'c, M, T> {
        &self.point
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TunnelConfig;
    use crate::dpt::{Dpt3, Dpt9};
    use crate::net::{IpEndpoint, MockGateway};
    use crate::protocol::cemi::{ApduData, GroupService};
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    fn gateway() -> MockGateway<NoopRawMutex> {
        MockGateway::new(IpEndpoint::from(([192, 168, 1, 10], 3671)))
    }

    #[test]
    fn test_switch_state_follows_bus() {
        let gateway = gateway();
        let client = KnxClient::<NoopRawMutex, _>::new(gateway.transport(), TunnelConfig::new(gateway.endpoint()));
        let address = GroupAddress::new(1, 1, 1).unwrap();
        let switch = Switch::new(&client, address).unwrap();
        assert_eq!(switch.state(), None);

        client
            .registry()
            .on_group_telegram(GroupService::Write, address, &ApduData::packed(1));
        assert_eq!(switch.state(), Some(true));
    }

    #[test]
    fn test_dimmer_level() {
        let gateway = gateway();
        let client = KnxClient::<NoopRawMutex, _>::new(gateway.transport(), TunnelConfig::new(gateway.endpoint()));
        let address = GroupAddress::new(2, 0, 1).unwrap();
        let dimmer = Dimmer::new(&client, address).unwrap();

        // 0x80 is 50 percent
        let data = ApduData::from_slice(&[0x80]).unwrap();
        client.registry().on_group_telegram(GroupService::Response, address, &data);
        assert_eq!(dimmer.level(), Some(50));
    }

    #[test]
    fn test_sensor_accepts_numeric_types_only() {
        let gateway = gateway();
        let client = KnxClient::<NoopRawMutex, _>::new(gateway.transport(), TunnelConfig::new(gateway.endpoint()));
        let address = GroupAddress::new(3, 0, 1).unwrap();

        assert!(Sensor::new(&client, address, Dpt1::Switch).unwrap_err().is_dpt());
        assert!(Sensor::new(&client, address, Dpt3::Dimming).unwrap_err().is_dpt());

        let sensor = Sensor::new(&client, address, Dpt9::Temperature).unwrap();
        let data = ApduData::from_slice(&[0x0C, 0x1A]).unwrap();
        client.registry().on_group_telegram(GroupService::Write, address, &data);
        let celsius = sensor.value().unwrap();
        assert!((celsius - 21.0).abs() < 0.01);
    }
}
