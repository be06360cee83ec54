//! Network types and the transport boundary.
//!
//! The tunnel never touches a socket directly: it talks to an
//! [`AsyncTransport`](transport::AsyncTransport), implemented over an
//! `embassy-net` UDP socket for real gateways and by
//! [`MockGateway`](mock_transport::MockGateway) for tests.

use core::fmt;

use crate::error::KnxError;

pub mod mock_transport;
pub mod transport;

#[cfg(feature = "embassy-net")]
pub mod embassy_adapter;

pub use mock_transport::{MockGateway, MockTransport};
pub use transport::AsyncTransport;

/// IPv4 address.
///
/// # Examples
///
/// ```
/// use knx_tunnel::net::Ipv4Addr;
///
/// let addr = Ipv4Addr::from([192, 168, 1, 10]);
/// assert_eq!(addr, Ipv4Addr::new(192, 168, 1, 10));
/// assert_eq!(addr, "192.168.1.10".parse()?);
/// # Ok::<(), knx_tunnel::KnxError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ipv4Addr {
    octets: [u8; 4],
}

impl Ipv4Addr {
    #[inline]
    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Self {
            octets: [a, b, c, d],
        }
    }

    #[inline]
    pub const fn octets(&self) -> [u8; 4] {
        self.octets
    }

    /// 0.0.0.0, used for NAT mode HPAIs.
    pub const UNSPECIFIED: Self = Self::new(0, 0, 0, 0);

    pub const LOCALHOST: Self = Self::new(127, 0, 0, 1);
}

impl From<[u8; 4]> for Ipv4Addr {
    #[inline]
    fn from(octets: [u8; 4]) -> Self {
        Self { octets }
    }
}

impl From<Ipv4Addr> for [u8; 4] {
    #[inline]
    fn from(addr: Ipv4Addr) -> [u8; 4] {
        addr.octets
    }
}

impl From<u32> for Ipv4Addr {
    #[inline]
    fn from(ip: u32) -> Self {
        Self {
            octets: ip.to_be_bytes(),
        }
    }
}

impl fmt::Display for Ipv4Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.octets;
        write!(f, "{a}.{b}.{c}.{d}")
    }
}

impl core::str::FromStr for Ipv4Addr {
    type Err = KnxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        let mut octets = [0u8; 4];

        for octet in &mut octets {
            let part = parts.next().ok_or_else(KnxError::invalid_config_value)?;
            *octet = part.parse().map_err(|_| KnxError::invalid_config_value())?;
        }

        if parts.next().is_some() {
            return Err(KnxError::invalid_config_value());
        }

        Ok(Self { octets })
    }
}

/// IPv4 address and UDP port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IpEndpoint {
    pub addr: Ipv4Addr,
    pub port: u16,
}

impl IpEndpoint {
    pub const UNSPECIFIED: Self = Self::new(Ipv4Addr::UNSPECIFIED, 0);

    #[inline]
    pub const fn new(addr: Ipv4Addr, port: u16) -> Self {
        Self { addr, port }
    }
}

impl From<([u8; 4], u16)> for IpEndpoint {
    #[inline]
    fn from((octets, port): ([u8; 4], u16)) -> Self {
        Self::new(Ipv4Addr::from(octets), port)
    }
}

impl fmt::Display for IpEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_u32() {
        let addr = Ipv4Addr::from(0xC0A8_010A);
        assert_eq!(addr.octets(), [192, 168, 1, 10]);
    }

    #[test]
    fn test_display() {
        let endpoint = IpEndpoint::new(Ipv4Addr::new(192, 168, 1, 10), 3671);
        assert_eq!(format!("{endpoint}"), "192.168.1.10:3671");
    }

    #[test]
    fn test_from_str_invalid() {
        assert!("192.168.1".parse::<Ipv4Addr>().is_err());
        assert!("192.168.1.256".parse::<Ipv4Addr>().is_err());
        assert!("192.168.1.10.5".parse::<Ipv4Addr>().is_err());
        assert!("a.b.c.d".parse::<Ipv4Addr>().unwrap_err().is_config());
    }
}
