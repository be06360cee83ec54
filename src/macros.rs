//! Address literals and shorthand for client calls.
//!
//! `ga!` and `ia!` build addresses from their parts, range checked at
//! compile time. The `knx_*!` macros wrap the client calls that
//! take a group address so a call site reads like the ETS project.

/// A [`GroupAddress`](crate::addressing::GroupAddress) in 3-level notation.
///
/// ```
/// use knx_tunnel::{ga, GroupAddress};
///
/// assert_eq!(ga!(1 / 1 / 1), GroupAddress::from(0x0901));
/// assert_eq!(ga!(31 / 7 / 255).raw(), 0xFFFF);
/// ```
///
/// Out of range parts are rejected by the compiler:
///
/// ```compile_fail
/// let address = knx_tunnel::ga!(1 / 8 / 0);
/// ```
#[macro_export]
macro_rules! ga {
    ($main:literal / $middle:literal / $sub:literal) => {{
        const RAW: u16 = {
            assert!($main <= 31, "main group is 0-31");
            assert!($middle <= 7, "middle group is 0-7");
            assert!($sub <= 255, "sub group is 0-255");
            ($main << 11) | ($middle << 8) | $sub
        };
        $crate::addressing::GroupAddress::from(RAW)
    }};
}

/// An [`IndividualAddress`](crate::addressing::IndividualAddress) from its
/// area, line and device.
///
/// ```
/// use knx_tunnel::{ia, IndividualAddress};
///
/// assert_eq!(ia!(1, 1, 250), IndividualAddress::from(0x11FA));
/// ```
///
/// ```compile_fail
/// let address = knx_tunnel::ia!(16, 0, 1);
/// ```
#[macro_export]
macro_rules! ia {
    ($area:literal, $line:literal, $device:literal) => {{
        const RAW: u16 = {
            assert!($area <= 15, "area is 0-15");
            assert!($line <= 15, "line is 0-15");
            assert!($device <= 255, "device is 0-255");
            ($area << 12) | ($line << 8) | $device
        };
        $crate::addressing::IndividualAddress::from(RAW)
    }};
}

/// `client.write(ga!(..), data)`.
///
/// ```rust,ignore
/// knx_write!(client, 1 / 1 / 1, ApduData::packed(1)).await?;
/// ```
#[macro_export]
macro_rules! knx_write {
    ($client:expr, $main:literal / $middle:literal / $sub:literal, $data:expr) => {
        $client.write($crate::ga!($main / $middle / $sub), $data)
    };
}

/// `client.read(ga!(..))`, resolving to the response data.
///
/// ```rust,ignore
/// let data = knx_read!(client, 3 / 0 / 1).await?;
/// ```
#[macro_export]
macro_rules! knx_read {
    ($client:expr, $main:literal / $middle:literal / $sub:literal) => {
        $client.read($crate::ga!($main / $middle / $sub))
    };
}

/// `client.respond(ga!(..), data)`.
#[macro_export]
macro_rules! knx_respond {
    ($client:expr, $main:literal / $middle:literal / $sub:literal, $data:expr) => {
        $client.respond($crate::ga!($main / $middle / $sub), $data)
    };
}

/// Bind several data points in one go, yielding a tuple of handles.
///
/// ```rust,ignore
/// let (hall, outside) = bind_points!(&client,
///     1 / 1 / 1 => Dpt1::Switch,
///     3 / 0 / 1 => Dpt9::Temperature,
/// )?;
/// ```
#[macro_export]
macro_rules! bind_points {
    ($client:expr, $( $main:literal / $middle:literal / $sub:literal => $dpt:expr ),+ $(,)?) => {
        (|| -> $crate::Result<_> {
            Ok(($(
                $crate::datapoint::DataPoint::bind(
                    $client,
                    $crate::ga!($main / $middle / $sub),
                    $dpt.into(),
                )?,
            )+))
        })()
    };
}

#[cfg(test)]
mod tests {
    use crate::addressing::{GroupAddress, IndividualAddress};
    use crate::config::TunnelConfig;
    use crate::dpt::{Dpt1, Dpt9};
    use crate::knx_client::KnxClient;
    use crate::net::{IpEndpoint, MockGateway};
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    #[test]
    fn test_ga_matches_constructor() {
        assert_eq!(ga!(1 / 1 / 1), GroupAddress::new(1, 1, 1).unwrap());
        assert_eq!(ga!(5 / 3 / 100), GroupAddress::from(0x2B64));
        assert_eq!(ga!(0 / 0 / 0).raw(), 0);
    }

    #[test]
    fn test_ia_matches_constructor() {
        assert_eq!(ia!(1, 1, 250), IndividualAddress::new(1, 1, 250).unwrap());
        assert_eq!(ia!(15, 15, 255).raw(), 0xFFFF);
    }

    #[test]
    fn test_bind_points() {
        let gateway: MockGateway<NoopRawMutex> = MockGateway::new(IpEndpoint::from(([192, 168, 1, 10], 3671)));
        let client = KnxClient::<NoopRawMutex, _>::new(gateway.transport(), TunnelConfig::new(gateway.endpoint()));

        let (light, outside) = bind_points!(&client,
            1 / 1 / 1 => Dpt1::Switch,
            3 / 0 / 1 => Dpt9::Temperature,
        )
        .unwrap();
        assert_eq!(light.address(), ga!(1 / 1 / 1));
        assert_eq!(outside.dpt(), Dpt9::Temperature.into());
        assert_eq!(client.registry().binding_count(), 2);
    }
}
