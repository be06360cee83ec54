//! High-level KNX client.
//!
//! [`KnxClient`] ties the tunnel, the dispatcher and the data point registry
//! together. It is an ordinary value: build as many as there are gateways,
//! each with its own transport. The client does not spawn anything; its
//! [`run`](KnxClient::run) future drives receive, send and heartbeat and
//! must be polled alongside the calls that use the session.
//!
//! ## Example
//!
//! ```rust,ignore
//! use embassy_futures::join::join;
//! use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
//! use knx_tunnel::{ga, KnxClient, TunnelConfig};
//! use knx_tunnel::datapoint::Switch;
//!
//! let client: KnxClient<CriticalSectionRawMutex, _> = KnxClient::new(transport, config);
//!
//! join(client.run(), async {
//!     client.connect().await?;
//!     let light = Switch::new(&client, ga!(1 / 1 / 1))?;
//!     light.on().await?;
//!     client.close().await;
//!     Ok::<(), knx_tunnel::KnxError>(())
//! })
//! .await;
//! ```

use embassy_futures::join::join3;
use embassy_futures::select::select;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;
use embassy_time::with_timeout;

use crate::addressing::GroupAddress;
use crate::config::TunnelConfig;
use crate::datapoint::registry::Registry;
use crate::dispatch;
use crate::dpt::{DatapointType, DptValue};
use crate::error::{KnxError, Result};
use crate::event::EventSubscriber;
use crate::net::AsyncTransport;
use crate::protocol::async_tunnel::AsyncTunnel;
use crate::protocol::cemi::{ApduData, CemiFrame};
use crate::protocol::tunnel::{ConnectionState, ConnectionStatus};

/// KNXnet/IP tunneling client.
pub struct KnxClient<M: RawMutex, T: AsyncTransport> {
    tunnel: AsyncTunnel<M, T>,
    registry: Registry<M>,
    shutdown: Signal<M, ()>,
}

impl<M: RawMutex, T: AsyncTransport> core::fmt::Debug for KnxClient<M, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KnxClient")
            .field("tunnel", &self.tunnel)
            .field("registry", &self.registry)
            .finish()
    }
}

impl<M: RawMutex, T: AsyncTransport> KnxClient<M, T> {
    /// Create a client; nothing is sent until [`connect`](Self::connect).
    pub fn new(transport: T, config: TunnelConfig) -> Self {
        config.log_level.apply();
        Self {
            tunnel: AsyncTunnel::new(transport, config),
            registry: Registry::new(),
            shutdown: Signal::new(),
        }
    }

    /// Drive the session until [`close`](Self::close) is called.
    ///
    /// Runs the dispatcher, the send queue and the heartbeat. Dropping this
    /// future stops all three and their timers.
    pub async fn run(&self) {
        let driver = join3(
            dispatch::run(&self.tunnel, &self.registry),
            self.tunnel.run_sender(),
            self.tunnel.run_heartbeat(),
        );
        select(driver, self.shutdown.wait()).await;
        knx_log!(debug, "Client driver stopped");
    }

    /// Open the tunnel, returning the channel ID.
    pub async fn connect(&self) -> Result<u8> {
        self.tunnel.connect().await
    }

    /// Close the tunnel; see [`AsyncTunnel::disconnect`].
    pub async fn disconnect(&self) -> Result<()> {
        self.tunnel.disconnect().await
    }

    /// Disconnect if connected, then stop [`run`](Self::run).
    pub async fn close(&self) {
        if self.status().is_connected() {
            if let Err(err) = self.tunnel.disconnect().await {
                knx_log!(warn, "Disconnect during close failed: {}", err.kind());
            }
        }
        self.shutdown.signal(());
    }

    pub fn status(&self) -> ConnectionStatus {
        self.tunnel.status()
    }

    /// Channel ID while connected.
    pub fn channel_id(&self) -> Option<u8> {
        self.tunnel.channel_id()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.tunnel.connection_state()
    }

    pub fn config(&self) -> &TunnelConfig {
        self.tunnel.config()
    }

    /// The tunnel driver, for lower-level access.
    pub fn tunnel(&self) -> &AsyncTunnel<M, T> {
        &self.tunnel
    }

    /// Group address bindings of this client.
    pub fn registry(&self) -> &Registry<M> {
        &self.registry
    }

    /// Receive lifecycle, error and bus events from now on.
    ///
    /// # Errors
    ///
    /// `Tunneling(TooManySubscribers)` once every subscriber slot is taken.
    pub fn subscribe(&self) -> Result<EventSubscriber<'_, M>> {
        self.tunnel.events().subscribe()
    }

    /// Send a cEMI frame and wait for the gateway's ack.
    pub async fn send_cemi(&self, cemi: CemiFrame) -> Result<()> {
        self.tunnel.send_cemi(cemi).await
    }

    /// Queue a GroupValueWrite. Returns once queued; a failed delivery is
    /// published as an `Error` event.
    pub async fn write(&self, address: GroupAddress, data: ApduData) -> Result<()> {
        let cemi = CemiFrame::group_value_write(self.tunnel.source_address(), address, data);
        self.tunnel.enqueue(cemi).await
    }

    /// Encode `value` with `dpt` and queue a GroupValueWrite.
    pub async fn write_value(&self, address: GroupAddress, dpt: DatapointType, value: DptValue) -> Result<()> {
        self.write(address, dpt.encode(value)?).await
    }

    /// Answer a GroupValueRead with a GroupValueResponse.
    pub async fn respond(&self, address: GroupAddress, data: ApduData) -> Result<()> {
        let cemi = CemiFrame::group_value_response(self.tunnel.source_address(), address, data);
        self.tunnel.enqueue(cemi).await
    }

    /// Send a GroupValueRead and wait for the response data.
    ///
    /// # Errors
    ///
    /// - `NotConnected` without a session
    /// - `TooManyPendingReads` when every read slot is taken
    /// - any [`send_cemi`](Self::send_cemi) error for the GroupValueRead itself
    /// - `Timeout(Read)` if no response arrives in `read_timeout`
    pub async fn read(&self, address: GroupAddress) -> Result<ApduData> {
        let pending = self.registry.begin_read(address)?;
        let cemi = CemiFrame::group_value_read(self.tunnel.source_address(), address);
        // registered first, so a response racing the ack still lands
        self.tunnel.send_cemi(cemi).await?;

        with_timeout(self.config().read_timeout, pending.response())
            .await
            .map_err(|_| {
                knx_log!(warn, "No response from {}", address);
                KnxError::read_timeout()
            })
    }

    /// Read `address` and decode the response with `dpt`.
    pub async fn read_value(&self, address: GroupAddress, dpt: DatapointType) -> Result<DptValue> {
        let data = self.read(address).await?;
        dpt.decode(data.as_bytes())
    }
}

impl<M: RawMutex, T: AsyncTransport> Drop for KnxClient<M, T> {
    fn drop(&mut self) {
        self.tunnel.transport_mut().close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{IpEndpoint, MockGateway};
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    #[test]
    fn test_new_client_is_idle() {
        let gateway: MockGateway<NoopRawMutex> = MockGateway::new(IpEndpoint::from(([192, 168, 1, 10], 3671)));
        let client = KnxClient::<NoopRawMutex, _>::new(gateway.transport(), TunnelConfig::new(gateway.endpoint()));

        assert_eq!(client.status(), ConnectionStatus::Disconnected);
        assert_eq!(client.channel_id(), None);
        assert!(gateway.try_next_frame().is_none());
    }

    #[test]
    fn test_calls_need_a_session() {
        let gateway: MockGateway<NoopRawMutex> = MockGateway::new(IpEndpoint::from(([192, 168, 1, 10], 3671)));
        let client = KnxClient::<NoopRawMutex, _>::new(gateway.transport(), TunnelConfig::new(gateway.endpoint()));
        let address = GroupAddress::new(1, 1, 1).unwrap();

        assert!(block_on(client.write(address, ApduData::packed(1))).unwrap_err().is_not_connected());
        assert!(block_on(client.read(address)).unwrap_err().is_not_connected());
        assert!(block_on(client.disconnect()).unwrap_err().is_not_connected());
        // the failed read released its slot
        assert_eq!(client.registry().pending_reads(), 0);
    }

    #[test]
    fn test_close_stops_run() {
        let gateway: MockGateway<NoopRawMutex> = MockGateway::new(IpEndpoint::from(([192, 168, 1, 10], 3671)));
        let client = KnxClient::<NoopRawMutex, _>::new(gateway.transport(), TunnelConfig::new(gateway.endpoint()));
        block_on(embassy_futures::join::join(client.run(), client.close()));
        assert_eq!(client.status(), ConnectionStatus::Disconnected);
    }
}
