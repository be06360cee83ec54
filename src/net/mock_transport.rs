//! In-memory gateway for testing the tunnel without a network.
//!
//! A [`MockGateway`] holds two datagram queues. The client side gets a
//! [`MockTransport`] borrowing the gateway; the test plays the gateway by
//! reading what the client sent and injecting replies.
//!
//! ## Example
//!
//! ```
//! use embassy_sync::blocking_mutex::raw::NoopRawMutex;
//! use knx_tunnel::net::{AsyncTransport, IpEndpoint, MockGateway};
//! use knx_tunnel::protocol::frame::Frame;
//! use knx_tunnel::protocol::services::ConnectionStateResponse;
//!
//! let gateway: MockGateway<NoopRawMutex> = MockGateway::new(IpEndpoint::from(([192, 168, 1, 10], 3671)));
//! let transport = gateway.transport();
//!
//! embassy_futures::block_on(async {
//!     gateway.reply(ConnectionStateResponse { channel_id: 1, status: 0 }).await?;
//!     let mut buf = [0u8; 64];
//!     let (len, from) = transport.recv_from(&mut buf).await?;
//!     assert_eq!(from, gateway.endpoint());
//!     assert!(matches!(Frame::decode(&buf[..len])?, Frame::ConnectionStateResponse(_)));
//!     Ok::<(), knx_tunnel::KnxError>(())
//! })?;
//! # Ok::<(), knx_tunnel::KnxError>(())
//! ```

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;

use crate::addressing::IndividualAddress;
use crate::error::{KnxError, Result};
use crate::net::transport::AsyncTransport;
use crate::net::IpEndpoint;
use crate::protocol::frame::{Frame, FrameBuffer, Hpai};
use crate::protocol::services::{ConnectRequest, ConnectResponse, Crd, TunnelingRequest};

/// Datagrams buffered in each direction.
pub const MOCK_QUEUE_DEPTH: usize = 16;

type Datagram = (FrameBuffer, IpEndpoint);

/// Simulated KNXnet/IP gateway.
pub struct MockGateway<M: RawMutex> {
    endpoint: IpEndpoint,
    to_client: Channel<M, Datagram, MOCK_QUEUE_DEPTH>,
    from_client: Channel<M, Datagram, MOCK_QUEUE_DEPTH>,
    fail_sends: Mutex<M, Cell<bool>>,
}

impl<M: RawMutex> core::fmt::Debug for MockGateway<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MockGateway")
            .field("endpoint", &self.endpoint)
            .field("pending_to_client", &self.to_client.len())
            .field("pending_from_client", &self.from_client.len())
            .finish()
    }
}

impl<M: RawMutex> MockGateway<M> {
    pub const fn new(endpoint: IpEndpoint) -> Self {
        Self {
            endpoint,
            to_client: Channel::new(),
            from_client: Channel::new(),
            fail_sends: Mutex::new(Cell::new(false)),
        }
    }

    /// Address the gateway sends from.
    #[inline]
    pub fn endpoint(&self) -> IpEndpoint {
        self.endpoint
    }

    /// Client-side transport bound to this gateway.
    pub fn transport(&self) -> MockTransport<'_, M> {
        MockTransport {
            gateway: self,
            closed: false,
        }
    }

    /// Make every client `send_to` fail, as an unreachable port would.
    pub fn set_send_failure(&self, fail: bool) {
        self.fail_sends.lock(|cell| cell.set(fail));
    }

    /// Deliver raw bytes to the client from `from`.
    pub async fn inject_from(&self, data: &[u8], from: IpEndpoint) -> Result<()> {
        let datagram = FrameBuffer::from_slice(data).map_err(|_| KnxError::buffer_too_small())?;
        self.to_client.send((datagram, from)).await;
        Ok(())
    }

    /// Deliver raw bytes to the client from the gateway endpoint.
    pub async fn inject(&self, data: &[u8]) -> Result<()> {
        self.inject_from(data, self.endpoint).await
    }

    /// Encode and deliver a frame to the client.
    pub async fn reply(&self, frame: impl Into<Frame>) -> Result<()> {
        let bytes = frame.into().to_bytes()?;
        self.inject(&bytes).await
    }

    /// Next datagram the client sent, raw.
    pub async fn next_datagram(&self) -> (FrameBuffer, IpEndpoint) {
        self.from_client.receive().await
    }

    /// Next frame the client sent.
    pub async fn next_frame(&self) -> Result<Frame> {
        let (bytes, _) = self.from_client.receive().await;
        Frame::decode(&bytes)
    }

    /// Next frame if the client already sent one.
    pub fn try_next_frame(&self) -> Option<Result<Frame>> {
        self.from_client.try_receive().ok().map(|(bytes, _)| Frame::decode(&bytes))
    }

    /// Wait for a CONNECT_REQUEST and accept it on `channel_id`.
    pub async fn accept_connect(&self, channel_id: u8) -> Result<ConnectRequest> {
        let Frame::ConnectRequest(request) = self.next_frame().await? else {
            return Err(KnxError::unexpected_frame());
        };
        self.reply(ConnectResponse {
            channel_id,
            status: 0,
            data_endpoint: Some(Hpai::from(self.endpoint)),
            crd: Some(Crd::tunnel(IndividualAddress::from(0x11FF))),
        })
        .await?;
        Ok(request)
    }

    /// Wait for a CONNECT_REQUEST and refuse it with `status`.
    pub async fn reject_connect(&self, status: u8) -> Result<ConnectRequest> {
        let Frame::ConnectRequest(request) = self.next_frame().await? else {
            return Err(KnxError::unexpected_frame());
        };
        self.reply(ConnectResponse {
            channel_id: 0,
            status,
            data_endpoint: None,
            crd: None,
        })
        .await?;
        Ok(request)
    }

    /// Wait for the next TUNNELING_REQUEST and ack it with `status`.
    pub async fn ack_next(&self, status: u8) -> Result<TunnelingRequest> {
        let Frame::TunnelingRequest(request) = self.next_frame().await? else {
            return Err(KnxError::unexpected_frame());
        };
        self.reply(request.ack(status)).await?;
        Ok(request)
    }
}

/// Client end of a [`MockGateway`].
pub struct MockTransport<'a, M: RawMutex> {
    gateway: &'a MockGateway<M>,
    closed: bool,
}

impl<M: RawMutex> core::fmt::Debug for MockTransport<'_, M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MockTransport").field("closed", &self.closed).finish()
    }
}

impl<M: RawMutex> AsyncTransport for MockTransport<'_, M> {
    async fn send_to(&self, data: &[u8], endpoint: IpEndpoint) -> Result<()> {
        if self.closed {
            return Err(KnxError::transport_closed());
        }
        if self.gateway.fail_sends.lock(Cell::get) {
            return Err(KnxError::send_failed());
        }

        let datagram = FrameBuffer::from_slice(data).map_err(|_| KnxError::buffer_too_small())?;
        // drop the oldest datagram rather than block the client on a test that stopped reading
        if let Err(embassy_sync::channel::TrySendError::Full(datagram)) =
            self.gateway.from_client.try_send((datagram, endpoint))
        {
            let _ = self.gateway.from_client.try_receive();
            let _ = self.gateway.from_client.try_send(datagram);
        }
        Ok(())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, IpEndpoint)> {
        if self.closed {
            return Err(KnxError::transport_closed());
        }
        let (datagram, from) = self.gateway.to_client.receive().await;
        let out = buf.get_mut(..datagram.len()).ok_or_else(KnxError::buffer_too_small)?;
        out.copy_from_slice(&datagram);
        Ok((datagram.len(), from))
    }

    fn is_ready(&self) -> bool {
        !self.closed
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
