//! `embassy-net` UDP socket as an [`AsyncTransport`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use embassy_net::udp::PacketMetadata;
//! use knx_tunnel::net::embassy_adapter::EmbassyUdpTransport;
//!
//! let mut rx_meta = [PacketMetadata::EMPTY; 4];
//! let mut rx_buffer = [0u8; 1024];
//! let mut tx_meta = [PacketMetadata::EMPTY; 4];
//! let mut tx_buffer = [0u8; 1024];
//!
//! let mut transport = EmbassyUdpTransport::new(stack, &mut rx_meta, &mut rx_buffer, &mut tx_meta, &mut tx_buffer);
//! transport.bind(0)?;
//! let client: KnxClient<CriticalSectionRawMutex, _> = KnxClient::new(transport, config);
//! ```

use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{IpAddress, IpEndpoint as EmbassyEndpoint, Stack};

use crate::error::{KnxError, Result};
use crate::net::transport::AsyncTransport;
use crate::net::{IpEndpoint, Ipv4Addr};

/// UDP transport over an `embassy-net` stack.
pub struct EmbassyUdpTransport<'a> {
    socket: UdpSocket<'a>,
}

impl core::fmt::Debug for EmbassyUdpTransport<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EmbassyUdpTransport")
            .field("open", &self.socket.is_open())
            .finish()
    }
}

impl<'a> EmbassyUdpTransport<'a> {
    pub fn new(
        stack: Stack<'a>,
        rx_meta: &'a mut [PacketMetadata],
        rx_buffer: &'a mut [u8],
        tx_meta: &'a mut [PacketMetadata],
        tx_buffer: &'a mut [u8],
    ) -> Self {
        Self {
            socket: UdpSocket::new(stack, rx_meta, rx_buffer, tx_meta, tx_buffer),
        }
    }

    /// Bind to a local port; 0 picks an ephemeral one.
    pub fn bind(&mut self, port: u16) -> Result<()> {
        self.socket.bind(port).map_err(|_| KnxError::send_failed())
    }
}

impl AsyncTransport for EmbassyUdpTransport<'_> {
    async fn send_to(&self, data: &[u8], endpoint: IpEndpoint) -> Result<()> {
        self.socket
            .send_to(data, to_embassy_endpoint(endpoint))
            .await
            .map_err(|_| KnxError::send_failed())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, IpEndpoint)> {
        let (len, meta) = self.socket.recv_from(buf).await.map_err(|_| KnxError::receive_failed())?;
        Ok((len, from_embassy_endpoint(meta.endpoint)))
    }

    fn is_ready(&self) -> bool {
        self.socket.is_open()
    }

    fn close(&mut self) {
        self.socket.close();
    }
}

#[inline]
fn to_embassy_endpoint(endpoint: IpEndpoint) -> EmbassyEndpoint {
    let [a, b, c, d] = endpoint.addr.octets();
    EmbassyEndpoint::new(IpAddress::v4(a, b, c, d), endpoint.port)
}

#[inline]
#[allow(unreachable_patterns, reason = "IPv6 arm only exists with embassy-net/proto-ipv6")]
fn from_embassy_endpoint(endpoint: EmbassyEndpoint) -> IpEndpoint {
    match endpoint.addr {
        IpAddress::Ipv4(addr) => IpEndpoint::new(Ipv4Addr::from(addr.octets()), endpoint.port),
        // KNXnet/IP tunneling is IPv4 only
        _ => IpEndpoint::UNSPECIFIED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_conversion() {
        let endpoint = IpEndpoint::new(Ipv4Addr::new(192, 168, 1, 10), 3671);
        assert_eq!(from_embassy_endpoint(to_embassy_endpoint(endpoint)), endpoint);
    }
}
