//! KNXnet/IP tunnel connection state machine.
//!
//! [`TunnelMachine`] performs no I/O and keeps no timers. Each transition
//! takes the frame that arrived (or the fact that a wait expired) and returns
//! the frame to send, so the async driver in
//! [`async_tunnel`](crate::protocol::async_tunnel) only moves bytes and
//! measures time.
//!
//! ## State Machine
//!
//! ```text
//!                connect_request()
//! Disconnected ───────────────────▶ Connecting
//!      ▲                               │ handle_connect_response(ok)
//!      │ rejected / timed out          ▼
//!      ├─────────────────────────── Connected ◀──────────┐
//!      │                               │ heartbeat_request()│ response ok
//!      │ heartbeat lost                ▼                    │
//!      ├───────────────────────── HeartbeatPending ────────┘
//!      │                               │ disconnect_request()
//!      │ response / timeout            ▼
//!      └─────────────────────────── Disconnecting
//! ```
//!
//! Tunneling requests may be sent in both `Connected` and
//! `HeartbeatPending`. At most one request is outstanding; the send sequence
//! advances only when its ack arrives with a matching sequence number.
//!
//! ## Example
//!
//! ```
//! use knx_tunnel::protocol::frame::Hpai;
//! use knx_tunnel::protocol::services::{ConnectResponse, TunnelingAck};
//! use knx_tunnel::protocol::tunnel::{ConnectionStatus, TunnelMachine};
//! use knx_tunnel::protocol::cemi::CemiFrame;
//! use embassy_time::Instant;
//!
//! let mut machine = TunnelMachine::new(Hpai::UNSPECIFIED, 2);
//! let _request = machine.connect_request()?;
//! let response = ConnectResponse { channel_id: 5, status: 0, data_endpoint: None, crd: None };
//! machine.handle_connect_response(&response, Instant::from_ticks(0))?;
//! assert_eq!(machine.status(), ConnectionStatus::Connected);
//!
//! let cemi = CemiFrame::group_value_read(Default::default(), "1/2/3".parse()?);
//! let request = machine.tunneling_request(&cemi)?;
//! machine.handle_tunneling_ack(&request.ack(0), Instant::from_ticks(0))?;
//! assert_eq!(machine.state().send_sequence, 1);
//! # Ok::<(), knx_tunnel::KnxError>(())
//! ```

use embassy_time::Instant;

use crate::addressing::IndividualAddress;
use crate::error::{KnxError, Result};
use crate::protocol::cemi::CemiFrame;
use crate::protocol::constants::E_NO_ERROR;
use crate::protocol::frame::Hpai;
use crate::protocol::services::{
    ConnectRequest, ConnectResponse, ConnectionStateRequest, ConnectionStateResponse, DisconnectRequest,
    DisconnectResponse, TunnelingAck, TunnelingRequest,
};

/// Lifecycle of the tunnel connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    /// CONNECT_REQUEST sent
    Connecting,
    Connected,
    /// Connected, CONNECTIONSTATE_REQUEST sent and unanswered
    HeartbeatPending,
    /// DISCONNECT_REQUEST sent
    Disconnecting,
}

impl ConnectionStatus {
    /// Whether tunneling requests may be sent.
    #[inline]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::HeartbeatPending)
    }
}

/// Snapshot of the connection bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectionState {
    /// Channel assigned by the gateway; meaningful while connected
    pub channel_id: u8,
    /// Sequence number of the next outbound tunneling request
    pub send_sequence: u8,
    /// Sequence number expected on the next inbound tunneling request
    pub recv_sequence: u8,
    pub status: ConnectionStatus,
    /// Last frame received on the current channel
    pub last_activity: Option<Instant>,
}

/// What to do after a heartbeat went unanswered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HeartbeatOutcome {
    /// Send this request again and keep waiting.
    Retry(ConnectionStateRequest),
    /// Miss limit reached; the machine is now `Disconnected`.
    Lost,
    /// No heartbeat was pending: it was answered or the session ended.
    Stale,
}

/// Connection state machine of one tunnel.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TunnelMachine {
    state: ConnectionState,
    control_endpoint: Hpai,
    /// Sequence of the request awaiting its ack
    outstanding: Option<u8>,
    heartbeat_misses: u8,
    max_heartbeat_misses: u8,
    assigned_address: Option<IndividualAddress>,
}

impl TunnelMachine {
    /// `control_endpoint` is announced in every request; use
    /// [`Hpai::UNSPECIFIED`] behind NAT.
    pub fn new(control_endpoint: Hpai, max_heartbeat_misses: u8) -> Self {
        Self {
            state: ConnectionState::default(),
            control_endpoint,
            outstanding: None,
            heartbeat_misses: 0,
            max_heartbeat_misses: max_heartbeat_misses.max(1),
            assigned_address: None,
        }
    }

    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[inline]
    pub fn status(&self) -> ConnectionStatus {
        self.state.status
    }

    /// Channel ID while connected.
    pub fn channel_id(&self) -> Option<u8> {
        self.state.status.is_connected().then_some(self.state.channel_id)
    }

    /// Individual address the gateway assigned in its CONNECT_RESPONSE.
    pub fn assigned_address(&self) -> Option<IndividualAddress> {
        self.assigned_address
    }

    /// Whether a tunneling request awaits its ack.
    #[inline]
    pub fn is_awaiting_ack(&self) -> bool {
        self.outstanding.is_some()
    }

    /// Refresh `last_activity`.
    #[inline]
    pub fn record_activity(&mut self, now: Instant) {
        self.state.last_activity = Some(now);
    }

    fn check_channel(&self, channel_id: u8) -> Result<()> {
        if channel_id == self.state.channel_id {
            Ok(())
        } else {
            Err(KnxError::channel_mismatch())
        }
    }

    fn require_connected(&self) -> Result<()> {
        if self.state.status.is_connected() {
            Ok(())
        } else {
            Err(KnxError::not_connected())
        }
    }

    // -------------------------------------------------------------------------
    // Connect
    // -------------------------------------------------------------------------

    /// Start connecting: `Disconnected → Connecting`.
    pub fn connect_request(&mut self) -> Result<ConnectRequest> {
        if self.state.status != ConnectionStatus::Disconnected {
            return Err(KnxError::invalid_state());
        }
        self.state.status = ConnectionStatus::Connecting;
        Ok(ConnectRequest::new(self.control_endpoint, self.control_endpoint))
    }

    /// Apply the gateway's CONNECT_RESPONSE, returning the channel ID.
    ///
    /// A non-zero status returns the machine to `Disconnected` and fails with
    /// `ConnectionRejected(status)`.
    pub fn handle_connect_response(&mut self, response: &ConnectResponse, now: Instant) -> Result<u8> {
        if self.state.status != ConnectionStatus::Connecting {
            return Err(KnxError::unexpected_frame());
        }

        if response.status != E_NO_ERROR {
            self.state.status = ConnectionStatus::Disconnected;
            return Err(KnxError::connection_rejected(response.status));
        }

        self.state = ConnectionState {
            channel_id: response.channel_id,
            send_sequence: 0,
            recv_sequence: 0,
            status: ConnectionStatus::Connected,
            last_activity: Some(now),
        };
        self.outstanding = None;
        self.heartbeat_misses = 0;
        self.assigned_address = response.assigned_address();
        Ok(response.channel_id)
    }

    /// The connect wait expired: `Connecting → Disconnected`.
    pub fn connect_timed_out(&mut self) {
        if self.state.status == ConnectionStatus::Connecting {
            self.state.status = ConnectionStatus::Disconnected;
        }
    }

    // -------------------------------------------------------------------------
    // Tunneling
    // -------------------------------------------------------------------------

    /// Stamp `cemi` with the current send sequence and mark it outstanding.
    ///
    /// Retransmissions reuse the returned request; the sequence does not
    /// change until [`handle_tunneling_ack`](Self::handle_tunneling_ack)
    /// accepts an ack.
    pub fn tunneling_request(&mut self, cemi: &CemiFrame) -> Result<TunnelingRequest> {
        self.require_connected()?;
        if self.outstanding.is_some() {
            return Err(KnxError::invalid_state());
        }

        let request = TunnelingRequest::new(self.state.channel_id, self.state.send_sequence, cemi)?;
        self.outstanding = Some(request.sequence);
        Ok(request)
    }

    /// Validate an ack against the outstanding request.
    ///
    /// # Errors
    ///
    /// - `ChannelMismatch` for another channel's ack
    /// - `UnexpectedFrame` when nothing is outstanding
    /// - `SequenceMismatch` when the sequence differs; the request stays
    ///   outstanding and the counter does not move
    /// - `AckStatus(code)` for a negative ack; the request is dropped
    pub fn handle_tunneling_ack(&mut self, ack: &TunnelingAck, now: Instant) -> Result<()> {
        self.require_connected().map_err(|_| KnxError::unexpected_frame())?;
        self.check_channel(ack.channel_id)?;
        self.record_activity(now);

        let Some(expected) = self.outstanding else {
            return Err(KnxError::unexpected_frame());
        };
        if ack.sequence != expected {
            return Err(KnxError::sequence_mismatch());
        }

        self.outstanding = None;
        if ack.status != E_NO_ERROR {
            return Err(KnxError::ack_status(ack.status));
        }

        self.state.send_sequence = self.state.send_sequence.wrapping_add(1);
        Ok(())
    }

    /// Give up on the outstanding request after its retries ran out.
    pub fn abandon_request(&mut self) {
        self.outstanding = None;
    }

    /// Accept an inbound tunneling request, returning the ack to send.
    ///
    /// The receive counter resynchronises to the request's sequence plus one;
    /// the gateway's numbering is independent of ours.
    pub fn handle_tunneling_request(&mut self, request: &TunnelingRequest, now: Instant) -> Result<TunnelingAck> {
        self.require_connected()?;
        self.check_channel(request.channel_id)?;
        self.record_activity(now);

        self.state.recv_sequence = request.sequence.wrapping_add(1);
        Ok(request.ack(E_NO_ERROR))
    }

    // -------------------------------------------------------------------------
    // Heartbeat
    // -------------------------------------------------------------------------

    /// Start a heartbeat: `Connected → HeartbeatPending`.
    pub fn heartbeat_request(&mut self) -> Result<ConnectionStateRequest> {
        self.require_connected()?;
        self.state.status = ConnectionStatus::HeartbeatPending;
        Ok(self.connection_state_request())
    }

    fn connection_state_request(&self) -> ConnectionStateRequest {
        ConnectionStateRequest {
            channel_id: self.state.channel_id,
            control_endpoint: self.control_endpoint,
        }
    }

    /// Apply a CONNECTIONSTATE_RESPONSE.
    ///
    /// A non-zero status means the gateway no longer knows the channel: the
    /// machine goes to `Disconnected` and the call fails with `Lost`.
    pub fn handle_heartbeat_response(&mut self, response: &ConnectionStateResponse, now: Instant) -> Result<()> {
        if self.state.status != ConnectionStatus::HeartbeatPending {
            return Err(KnxError::unexpected_frame());
        }
        self.check_channel(response.channel_id)?;
        self.record_activity(now);

        if response.status != E_NO_ERROR {
            self.force_disconnected();
            return Err(KnxError::connection_lost());
        }

        self.heartbeat_misses = 0;
        self.state.status = ConnectionStatus::Connected;
        Ok(())
    }

    /// A heartbeat response did not arrive in time.
    pub fn heartbeat_missed(&mut self) -> HeartbeatOutcome {
        if self.state.status != ConnectionStatus::HeartbeatPending {
            return HeartbeatOutcome::Stale;
        }

        self.heartbeat_misses = self.heartbeat_misses.saturating_add(1);
        if self.heartbeat_misses >= self.max_heartbeat_misses {
            self.force_disconnected();
            HeartbeatOutcome::Lost
        } else {
            HeartbeatOutcome::Retry(self.connection_state_request())
        }
    }

    /// Consecutive heartbeats without response.
    #[inline]
    pub fn heartbeat_misses(&self) -> u8 {
        self.heartbeat_misses
    }

    // -------------------------------------------------------------------------
    // Disconnect
    // -------------------------------------------------------------------------

    /// Start a client-side disconnect: `Connected → Disconnecting`.
    pub fn disconnect_request(&mut self) -> Result<DisconnectRequest> {
        self.require_connected()?;
        self.state.status = ConnectionStatus::Disconnecting;
        self.outstanding = None;
        Ok(DisconnectRequest {
            channel_id: self.state.channel_id,
            control_endpoint: self.control_endpoint,
        })
    }

    /// Apply the gateway's DISCONNECT_RESPONSE.
    pub fn handle_disconnect_response(&mut self, response: &DisconnectResponse) -> Result<()> {
        if self.state.status != ConnectionStatus::Disconnecting {
            return Err(KnxError::unexpected_frame());
        }
        self.check_channel(response.channel_id)?;
        self.force_disconnected();
        Ok(())
    }

    /// Handle a gateway-initiated DISCONNECT_REQUEST, returning the response.
    pub fn handle_disconnect_request(&mut self, request: &DisconnectRequest) -> Result<DisconnectResponse> {
        if !self.state.status.is_connected() && self.state.status != ConnectionStatus::Disconnecting {
            return Err(KnxError::unexpected_frame());
        }
        self.check_channel(request.channel_id)?;
        self.force_disconnected();
        Ok(DisconnectResponse {
            channel_id: request.channel_id,
            status: E_NO_ERROR,
        })
    }

    /// Drop the session without a handshake.
    ///
    /// Returns `true` if the machine was not already `Disconnected`, so the
    /// caller reports the loss exactly once.
    pub fn force_disconnected(&mut self) -> bool {
        let changed = self.state.status != ConnectionStatus::Disconnected;
        self.state.status = ConnectionStatus::Disconnected;
        self.outstanding = None;
        self.heartbeat_misses = 0;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::GroupAddress;
    use crate::protocol::cemi::ApduData;

    fn now() -> Instant {
        Instant::from_ticks(0)
    }

    fn connected(channel_id: u8) -> TunnelMachine {
        let mut machine = TunnelMachine::new(Hpai::UNSPECIFIED, 2);
        machine.connect_request().unwrap();
        let response = ConnectResponse {
            channel_id,
            status: 0,
            data_endpoint: Some(Hpai::UNSPECIFIED),
            crd: None,
        };
        machine.handle_connect_response(&response, now()).unwrap();
        machine
    }

    fn cemi() -> CemiFrame {
        CemiFrame::group_value_write(
            IndividualAddress::UNASSIGNED,
            GroupAddress::new(1, 1, 1).unwrap(),
            ApduData::packed(1),
        )
    }

    #[test]
    fn test_connect_success_resets_counters() {
        let machine = connected(5);
        let state = machine.state();
        assert_eq!(state.status, ConnectionStatus::Connected);
        assert_eq!(state.channel_id, 5);
        assert_eq!(state.send_sequence, 0);
        assert_eq!(state.recv_sequence, 0);
        assert_eq!(machine.channel_id(), Some(5));
    }

    #[test]
    fn test_connect_rejected() {
        let mut machine = TunnelMachine::new(Hpai::UNSPECIFIED, 2);
        machine.connect_request().unwrap();
        let response = ConnectResponse {
            channel_id: 0,
            status: 0x24,
            data_endpoint: None,
            crd: None,
        };
        let err = machine.handle_connect_response(&response, now()).unwrap_err();
        assert!(err.is_connection_rejected());
        assert_eq!(machine.status(), ConnectionStatus::Disconnected);
        assert_eq!(machine.channel_id(), None);
    }

    #[test]
    fn test_connect_twice_is_invalid() {
        let mut machine = TunnelMachine::new(Hpai::UNSPECIFIED, 2);
        machine.connect_request().unwrap();
        assert!(machine.connect_request().unwrap_err().is_invalid_state());
        machine.connect_timed_out();
        assert!(machine.connect_request().is_ok());
    }

    #[test]
    fn test_send_requires_connection() {
        let mut machine = TunnelMachine::new(Hpai::UNSPECIFIED, 2);
        assert!(machine.tunneling_request(&cemi()).unwrap_err().is_not_connected());
    }

    #[test]
    fn test_sequence_wraps_after_n_sends() {
        let mut machine = connected(1);
        for _ in 0..300 {
            let request = machine.tunneling_request(&cemi()).unwrap();
            machine.handle_tunneling_ack(&request.ack(0), now()).unwrap();
        }
        assert_eq!(machine.state().send_sequence, (300 % 256) as u8);
    }

    #[test]
    fn test_one_request_in_flight() {
        let mut machine = connected(1);
        machine.tunneling_request(&cemi()).unwrap();
        assert!(machine.tunneling_request(&cemi()).unwrap_err().is_invalid_state());
        machine.abandon_request();
        assert!(machine.tunneling_request(&cemi()).is_ok());
    }

    #[test]
    fn test_ack_sequence_mismatch_does_not_advance() {
        let mut machine = connected(1);
        let request = machine.tunneling_request(&cemi()).unwrap();

        let wrong = TunnelingAck {
            channel_id: 1,
            sequence: request.sequence.wrapping_add(1),
            status: 0,
        };
        assert!(machine.handle_tunneling_ack(&wrong, now()).unwrap_err().is_sequence_mismatch());
        assert_eq!(machine.state().send_sequence, 0);
        assert!(machine.is_awaiting_ack());

        // the right ack still completes the request
        machine.handle_tunneling_ack(&request.ack(0), now()).unwrap();
        assert_eq!(machine.state().send_sequence, 1);
    }

    #[test]
    fn test_ack_without_request() {
        let mut machine = connected(1);
        let ack = TunnelingAck {
            channel_id: 1,
            sequence: 0,
            status: 0,
        };
        assert!(machine.handle_tunneling_ack(&ack, now()).unwrap_err().is_protocol());
    }

    #[test]
    fn test_negative_ack() {
        let mut machine = connected(1);
        let request = machine.tunneling_request(&cemi()).unwrap();
        let err = machine.handle_tunneling_ack(&request.ack(0x29), now()).unwrap_err();
        assert!(matches!(err, KnxError::Tunneling(_)));
        assert_eq!(machine.state().send_sequence, 0);
        assert!(!machine.is_awaiting_ack());
    }

    #[test]
    fn test_inbound_request_acked_and_resynced() {
        let mut machine = connected(3);
        let request = TunnelingRequest::new(3, 41, &cemi()).unwrap();
        let ack = machine.handle_tunneling_request(&request, Instant::from_ticks(10)).unwrap();
        assert_eq!((ack.channel_id, ack.sequence, ack.status), (3, 41, 0));
        assert_eq!(machine.state().recv_sequence, 42);
        assert_eq!(machine.state().last_activity, Some(Instant::from_ticks(10)));

        let foreign = TunnelingRequest::new(4, 0, &cemi()).unwrap();
        assert!(machine.handle_tunneling_request(&foreign, now()).unwrap_err().is_protocol());
        assert_eq!(machine.state().recv_sequence, 42);
    }

    #[test]
    fn test_heartbeat_round_trip() {
        let mut machine = connected(1);
        machine.heartbeat_request().unwrap();
        assert_eq!(machine.status(), ConnectionStatus::HeartbeatPending);

        // tunneling is still allowed while the heartbeat is pending
        assert!(machine.tunneling_request(&cemi()).is_ok());

        let response = ConnectionStateResponse { channel_id: 1, status: 0 };
        machine.handle_heartbeat_response(&response, now()).unwrap();
        assert_eq!(machine.status(), ConnectionStatus::Connected);
    }

    #[test]
    fn test_heartbeat_miss_threshold() {
        let mut machine = connected(1);
        machine.heartbeat_request().unwrap();

        assert!(matches!(machine.heartbeat_missed(), HeartbeatOutcome::Retry(_)));
        assert_eq!(machine.status(), ConnectionStatus::HeartbeatPending);
        assert_eq!(machine.heartbeat_misses(), 1);

        assert_eq!(machine.heartbeat_missed(), HeartbeatOutcome::Lost);
        assert_eq!(machine.status(), ConnectionStatus::Disconnected);
        // already down: nothing left to report
        assert_eq!(machine.heartbeat_missed(), HeartbeatOutcome::Stale);
        assert!(!machine.force_disconnected());
    }

    #[test]
    fn test_heartbeat_error_status_drops_session() {
        let mut machine = connected(1);
        machine.heartbeat_request().unwrap();
        let response = ConnectionStateResponse {
            channel_id: 1,
            status: 0x21,
        };
        assert!(machine.handle_heartbeat_response(&response, now()).is_err());
        assert_eq!(machine.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_client_disconnect() {
        let mut machine = connected(7);
        let request = machine.disconnect_request().unwrap();
        assert_eq!(request.channel_id, 7);
        assert_eq!(machine.status(), ConnectionStatus::Disconnecting);
        assert!(machine.tunneling_request(&cemi()).is_err());

        machine
            .handle_disconnect_response(&DisconnectResponse { channel_id: 7, status: 0 })
            .unwrap();
        assert_eq!(machine.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_gateway_disconnect() {
        let mut machine = connected(7);
        let request = DisconnectRequest {
            channel_id: 7,
            control_endpoint: Hpai::UNSPECIFIED,
        };
        let response = machine.handle_disconnect_request(&request).unwrap();
        assert_eq!(response.status, 0);
        assert_eq!(machine.status(), ConnectionStatus::Disconnected);
        assert!(machine.handle_disconnect_request(&request).is_err());
    }
}
