//! Timed driver around [`TunnelMachine`].
//!
//! [`AsyncTunnel`] owns the transport and the machine and turns the machine's
//! transitions into datagrams, timers and wakeups. Three loops share it by
//! reference:
//!
//! - the dispatcher in [`crate::dispatch`] reads datagrams and feeds them to
//!   [`AsyncTunnel::handle_frame`],
//! - [`AsyncTunnel::run_sender`] drains the send queue, one request in flight,
//! - [`AsyncTunnel::run_heartbeat`] keeps the channel alive.
//!
//! Callers interact through `connect`, `disconnect`, `send_cemi` and
//! `enqueue`. Every wait is an `embassy-time` future owned by the waiting
//! call, so dropping the call or the loops drops the timer with it.
//!
//! All shared state sits in blocking mutexes that are released before any
//! `.await`. Completions travel through [`Signal`]s: one per kind of
//! response, plus a fixed set of slots for callers of `send_cemi`.

use core::cell::{Cell, RefCell};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Instant, Timer};

use crate::addressing::IndividualAddress;
use crate::config::TunnelConfig;
use crate::error::{KnxError, Result};
use crate::event::{DisconnectReason, EventBus, KnxEvent};
use crate::net::{AsyncTransport, IpEndpoint};
use crate::protocol::cemi::CemiFrame;
use crate::protocol::constants::status_name;
use crate::protocol::frame::Frame;
use crate::protocol::services::{ConnectResponse, TunnelingAck, TunnelingRequest};
use crate::protocol::tunnel::{ConnectionState, ConnectionStatus, HeartbeatOutcome, TunnelMachine};

/// Queued tunneling requests.
pub const SEND_QUEUE_DEPTH: usize = 8;
/// Concurrent `send_cemi` callers.
pub const SEND_SLOTS: usize = 4;

struct SendJob {
    cemi: CemiFrame,
    /// Completion slot, `None` for fire-and-forget sends
    slot: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Free,
    Waiting,
    Done,
    /// Caller went away before completion
    Abandoned,
}

type SlotStates<M> = Mutex<M, RefCell<[SlotState; SEND_SLOTS]>>;

/// Returns the slot to the pool when the caller finishes or is dropped.
struct SlotGuard<'a, M: RawMutex> {
    states: &'a SlotStates<M>,
    slot: usize,
    enqueued: bool,
}

impl<M: RawMutex> Drop for SlotGuard<'_, M> {
    fn drop(&mut self) {
        let enqueued = self.enqueued;
        self.states.lock(|states| {
            let mut states = states.borrow_mut();
            states[self.slot] = match states[self.slot] {
                // the sender still holds the job and frees the slot on completion
                SlotState::Waiting if enqueued => SlotState::Abandoned,
                _ => SlotState::Free,
            };
        });
    }
}

/// The job [`AsyncTunnel::run_sender`] is delivering.
///
/// Dropped mid-delivery (the sender loop was cancelled), it clears the
/// outstanding request and completes the caller's slot so the slot returns
/// to the pool.
struct InFlight<'a, M: RawMutex, T: AsyncTransport> {
    tunnel: &'a AsyncTunnel<M, T>,
    slot: Option<usize>,
    finished: bool,
}

impl<M: RawMutex, T: AsyncTransport> Drop for InFlight<'_, M, T> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.tunnel.with_machine(TunnelMachine::abandon_request);
        if let Some(slot) = self.slot {
            self.tunnel.complete_slot(slot, Err(KnxError::connection_lost()));
        }
    }
}

/// KNXnet/IP tunnel session over an [`AsyncTransport`].
pub struct AsyncTunnel<M: RawMutex, T: AsyncTransport> {
    transport: T,
    config: TunnelConfig,
    machine: Mutex<M, RefCell<TunnelMachine>>,
    /// Where tunneling frames go; taken from the CONNECT_RESPONSE
    data_endpoint: Mutex<M, Cell<IpEndpoint>>,
    events: EventBus<M>,

    connect_done: Signal<M, Result<u8>>,
    ack_done: Signal<M, Result<()>>,
    confirmation: Signal<M, Result<()>>,
    heartbeat_done: Signal<M, Result<()>>,
    disconnect_done: Signal<M, ()>,
    session_up: Signal<M, ()>,

    queue: Channel<M, SendJob, SEND_QUEUE_DEPTH>,
    slots: [Signal<M, Result<()>>; SEND_SLOTS],
    slot_states: SlotStates<M>,
}

impl<M: RawMutex, T: AsyncTransport> core::fmt::Debug for AsyncTunnel<M, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AsyncTunnel")
            .field("gateway", &self.config.gateway)
            .field("state", &self.connection_state())
            .finish_non_exhaustive()
    }
}

impl<M: RawMutex, T: AsyncTransport> AsyncTunnel<M, T> {
    pub fn new(transport: T, config: TunnelConfig) -> Self {
        Self {
            transport,
            machine: Mutex::new(RefCell::new(TunnelMachine::new(
                config.local_endpoint,
                config.heartbeat_max_misses,
            ))),
            data_endpoint: Mutex::new(Cell::new(config.gateway)),
            config,
            events: EventBus::new(),
            connect_done: Signal::new(),
            ack_done: Signal::new(),
            confirmation: Signal::new(),
            heartbeat_done: Signal::new(),
            disconnect_done: Signal::new(),
            session_up: Signal::new(),
            queue: Channel::new(),
            slots: [const { Signal::new() }; SEND_SLOTS],
            slot_states: Mutex::new(RefCell::new([SlotState::Free; SEND_SLOTS])),
        }
    }

    #[inline]
    pub fn config(&self) -> &TunnelConfig {
        &self.config
    }

    #[inline]
    pub fn events(&self) -> &EventBus<M> {
        &self.events
    }

    #[inline]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub(crate) fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn status(&self) -> ConnectionStatus {
        self.with_machine(|m| m.status())
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.with_machine(|m| m.state())
    }

    /// Channel ID while connected.
    pub fn channel_id(&self) -> Option<u8> {
        self.with_machine(|m| m.channel_id())
    }

    /// Individual address the gateway assigned to this tunnel.
    pub fn assigned_address(&self) -> Option<IndividualAddress> {
        self.with_machine(|m| m.assigned_address())
    }

    /// Source address for outgoing telegrams.
    pub fn source_address(&self) -> IndividualAddress {
        self.config.individual_address
    }

    fn with_machine<R>(&self, f: impl FnOnce(&mut TunnelMachine) -> R) -> R {
        self.machine.lock(|machine| f(&mut machine.borrow_mut()))
    }

    fn data_endpoint(&self) -> IpEndpoint {
        self.data_endpoint.lock(Cell::get)
    }

    fn require_connected(&self) -> Result<()> {
        if self.status().is_connected() {
            Ok(())
        } else {
            Err(KnxError::not_connected())
        }
    }

    /// Whether a datagram from `endpoint` belongs to this session.
    pub(crate) fn is_gateway(&self, endpoint: IpEndpoint) -> bool {
        endpoint.addr == self.config.gateway.addr || endpoint == self.data_endpoint()
    }

    // -------------------------------------------------------------------------
    // Connection lifecycle
    // -------------------------------------------------------------------------

    /// Open a tunnel, returning the channel ID.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if the tunnel is not disconnected
    /// - `ConnectionRejected(status)` if the gateway refuses
    /// - `Timeout(Connect)` if no response arrives in `connect_timeout`
    pub async fn connect(&self) -> Result<u8> {
        let request = self.with_machine(|m| m.connect_request())?;
        let gateway = self.config.gateway;

        self.connect_done.reset();
        self.data_endpoint.lock(|cell| cell.set(gateway));
        knx_log!(info, "Connecting to {}", gateway);
        self.events.publish(KnxEvent::Connecting { gateway });
        self.transmit(request, gateway).await?;

        match with_timeout(self.config.connect_timeout, self.connect_done.wait()).await {
            Ok(result) => result,
            Err(_) => {
                self.with_machine(TunnelMachine::connect_timed_out);
                // the response may have been applied as the timer fired
                self.channel_id().ok_or_else(|| {
                    knx_log!(warn, "No CONNECT_RESPONSE from {}", gateway);
                    KnxError::connect_timeout()
                })
            }
        }
    }

    /// Close the tunnel.
    ///
    /// The session ends even when the gateway does not answer; that case is
    /// reported as `Timeout(Disconnect)` after `disconnect_timeout`.
    pub async fn disconnect(&self) -> Result<()> {
        let request = self.with_machine(|m| m.disconnect_request())?;
        knx_log!(info, "Disconnecting channel {}", request.channel_id);

        self.disconnect_done.reset();
        // release a request waiting for its ack
        self.ack_done.signal(Err(KnxError::not_connected()));
        self.transmit(request, self.config.gateway).await?;

        let answered = with_timeout(self.config.disconnect_timeout, self.disconnect_done.wait()).await;
        if self.with_machine(TunnelMachine::force_disconnected) {
            self.session_lost(DisconnectReason::Requested);
        }
        answered.map_err(|_| KnxError::disconnect_timeout())
    }

    /// End the session and wake everything that waits on it.
    ///
    /// Called once, by whoever observed the transition to `Disconnected`.
    fn session_lost(&self, reason: DisconnectReason) {
        knx_log!(info, "Session ended: {:?}", reason);

        self.ack_done.signal(Err(KnxError::connection_lost()));
        self.confirmation.signal(Err(KnxError::connection_lost()));
        self.heartbeat_done.signal(Err(KnxError::connection_lost()));
        self.disconnect_done.signal(());

        while let Ok(job) = self.queue.try_receive() {
            match job.slot {
                Some(slot) => self.complete_slot(slot, Err(KnxError::connection_lost())),
                None => knx_log!(debug, "Dropping queued request to {}", job.cemi.ldata.destination),
            }
        }

        self.events.publish(KnxEvent::Disconnected { reason });
    }

    /// Send one datagram; a failure takes the session down.
    async fn send_datagram(&self, bytes: &[u8], endpoint: IpEndpoint) -> Result<()> {
        let result = self.transport.send_to(bytes, endpoint).await;
        if let Err(err) = &result {
            knx_log!(error, "Send to {} failed: {}", endpoint, err.kind());
            self.transport_failed(err);
        }
        result
    }

    async fn transmit(&self, frame: impl Into<Frame>, endpoint: IpEndpoint) -> Result<()> {
        let bytes = frame.into().to_bytes()?;
        self.send_datagram(&bytes, endpoint).await
    }

    /// Report a transport error and drop the session if one is up.
    ///
    /// `Disconnected` is only published for a session that was announced
    /// with `Connected`; a pending `connect` fails instead.
    pub(crate) fn transport_failed(&self, err: &KnxError) {
        self.events.publish_error(err);
        let previous = self.with_machine(|m| {
            let previous = m.status();
            m.force_disconnected();
            previous
        });
        match previous {
            ConnectionStatus::Disconnected => {}
            ConnectionStatus::Connecting => self.connect_done.signal(Err(KnxError::connection_lost())),
            _ => self.session_lost(DisconnectReason::TransportError),
        }
    }

    // -------------------------------------------------------------------------
    // Sending
    // -------------------------------------------------------------------------

    /// Send a cEMI frame and wait until the gateway acks it.
    ///
    /// With `await_confirmation` the call also waits for L_Data.con.
    ///
    /// # Errors
    ///
    /// - `NotConnected` without a session
    /// - `QueueFull` when every completion slot is taken
    /// - `Timeout(Ack)` after the retries ran out
    /// - `AckStatus(code)` for a negative ack
    /// - `Timeout(Confirmation)` / `NegativeConfirmation`
    pub async fn send_cemi(&self, cemi: CemiFrame) -> Result<()> {
        self.require_connected()?;
        let slot = self.claim_slot().ok_or_else(KnxError::queue_full)?;
        let mut guard = SlotGuard {
            states: &self.slot_states,
            slot,
            enqueued: false,
        };

        self.queue.send(SendJob { cemi, slot: Some(slot) }).await;
        guard.enqueued = true;
        self.slots[slot].wait().await
    }

    /// Queue a cEMI frame without waiting for its ack.
    ///
    /// Waits only while the queue is full. A later failure is published as
    /// [`KnxEvent::Error`].
    pub async fn enqueue(&self, cemi: CemiFrame) -> Result<()> {
        self.require_connected()?;
        self.queue.send(SendJob { cemi, slot: None }).await;
        Ok(())
    }

    fn claim_slot(&self) -> Option<usize> {
        self.slot_states.lock(|states| {
            let mut states = states.borrow_mut();
            let slot = states.iter().position(|s| *s == SlotState::Free)?;
            states[slot] = SlotState::Waiting;
            self.slots[slot].reset();
            Some(slot)
        })
    }

    fn complete_slot(&self, slot: usize, result: Result<()>) {
        self.slot_states.lock(|states| {
            let mut states = states.borrow_mut();
            match states[slot] {
                SlotState::Waiting => {
                    states[slot] = SlotState::Done;
                    self.slots[slot].signal(result);
                }
                SlotState::Abandoned => states[slot] = SlotState::Free,
                SlotState::Free | SlotState::Done => {}
            }
        });
    }

    /// Drain the send queue. Runs for the lifetime of the client.
    pub async fn run_sender(&self) {
        loop {
            let job = self.queue.receive().await;
            let mut in_flight = InFlight {
                tunnel: self,
                slot: job.slot,
                finished: false,
            };
            let result = self.deliver(&job.cemi).await;
            in_flight.finished = true;

            match job.slot {
                Some(slot) => self.complete_slot(slot, result),
                None => {
                    if let Err(err) = result {
                        knx_log!(warn, "Queued request to {} failed: {}", job.cemi.ldata.destination, err.kind());
                        self.events.publish_error(&err);
                    }
                }
            }

            Timer::after(self.config.send_queue_interval).await;
        }
    }

    /// One tunneling request: send, await the ack, retransmit on timeout.
    async fn deliver(&self, cemi: &CemiFrame) -> Result<()> {
        let request = self.with_machine(|m| m.tunneling_request(cemi))?;
        let sequence = request.sequence;
        let bytes = match Frame::from(request).to_bytes() {
            Ok(bytes) => bytes,
            Err(err) => {
                self.with_machine(TunnelMachine::abandon_request);
                return Err(err);
            }
        };
        let endpoint = self.data_endpoint();

        self.ack_done.reset();
        self.confirmation.reset();

        let mut attempt = 0;
        loop {
            self.send_datagram(&bytes, endpoint).await?;

            match with_timeout(self.config.ack_timeout, self.ack_done.wait()).await {
                Ok(result) => break result?,
                Err(_) if attempt < self.config.ack_retries => {
                    attempt += 1;
                    knx_log!(warn, "No ack for seq {}, retry {}/{}", sequence, attempt, self.config.ack_retries);
                }
                Err(_) => {
                    knx_log!(warn, "Giving up on seq {}", sequence);
                    self.with_machine(TunnelMachine::abandon_request);
                    return Err(KnxError::ack_timeout());
                }
            }
        }

        if self.config.await_confirmation {
            with_timeout(self.config.confirmation_timeout, self.confirmation.wait())
                .await
                .map_err(|_| KnxError::confirmation_timeout())??;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Heartbeat
    // -------------------------------------------------------------------------

    /// Send CONNECTIONSTATE_REQUESTs every `heartbeat_interval` while a
    /// session is up. Runs for the lifetime of the client.
    pub async fn run_heartbeat(&self) {
        loop {
            if !self.status().is_connected() {
                self.session_up.wait().await;
                continue;
            }

            Timer::after(self.config.heartbeat_interval).await;
            if let Err(err) = self.heartbeat().await {
                knx_log!(debug, "Heartbeat ended: {}", err.kind());
            }
        }
    }

    async fn heartbeat(&self) -> Result<()> {
        let request = self.with_machine(|m| m.heartbeat_request())?;
        let gateway = self.config.gateway;

        self.heartbeat_done.reset();
        self.transmit(request, gateway).await?;

        loop {
            match with_timeout(self.config.heartbeat_timeout, self.heartbeat_done.wait()).await {
                Ok(result) => return result,
                Err(_) => match self.with_machine(TunnelMachine::heartbeat_missed) {
                    HeartbeatOutcome::Retry(request) => {
                        knx_log!(
                            warn,
                            "Heartbeat unanswered on channel {} ({} missed)",
                            request.channel_id,
                            self.with_machine(|m| m.heartbeat_misses())
                        );
                        self.transmit(request, gateway).await?;
                    }
                    HeartbeatOutcome::Lost => {
                        knx_log!(error, "Gateway stopped answering heartbeats");
                        self.session_lost(DisconnectReason::HeartbeatLost);
                        return Err(KnxError::connection_lost());
                    }
                    HeartbeatOutcome::Stale => return self.require_connected(),
                },
            }
        }
    }

    // -------------------------------------------------------------------------
    // Inbound frames
    // -------------------------------------------------------------------------

    /// Apply a frame received from the gateway.
    ///
    /// Returns the cEMI of an inbound L_Data.ind for routing; everything else
    /// is consumed here.
    pub(crate) async fn handle_frame(&self, frame: Frame) -> Option<CemiFrame> {
        let now = Instant::now();

        match frame {
            Frame::ConnectResponse(response) => self.on_connect_response(&response, now),
            Frame::ConnectionStateResponse(response) => {
                match self.with_machine(|m| m.handle_heartbeat_response(&response, now)) {
                    Ok(()) => self.heartbeat_done.signal(Ok(())),
                    Err(err) if err.is_protocol() => {
                        knx_log!(debug, "Ignoring CONNECTIONSTATE_RESPONSE: {}", err.kind());
                    }
                    Err(_) => {
                        knx_log!(
                            warn,
                            "Gateway dropped channel {}: {}",
                            response.channel_id,
                            status_name(response.status)
                        );
                        self.session_lost(DisconnectReason::HeartbeatLost);
                    }
                }
            }
            Frame::DisconnectRequest(request) => match self.with_machine(|m| m.handle_disconnect_request(&request)) {
                Ok(response) => {
                    knx_log!(info, "Gateway closed channel {}", request.channel_id);
                    // a failed reply is already reported and the session is down either way
                    let _ = self.transmit(response, self.config.gateway).await;
                    self.session_lost(DisconnectReason::GatewayRequest);
                }
                Err(err) => knx_log!(debug, "Ignoring DISCONNECT_REQUEST: {}", err.kind()),
            },
            Frame::DisconnectResponse(response) => match self.with_machine(|m| m.handle_disconnect_response(&response)) {
                Ok(()) => self.session_lost(DisconnectReason::Requested),
                Err(err) => knx_log!(debug, "Ignoring DISCONNECT_RESPONSE: {}", err.kind()),
            },
            Frame::TunnelingAck(ack) => self.on_tunneling_ack(&ack, now),
            Frame::TunnelingRequest(request) => return self.on_tunneling_request(request, now).await,
            other => knx_log!(debug, "Ignoring {:?} from gateway", other.service_type()),
        }
        None
    }

    fn on_connect_response(&self, response: &ConnectResponse, now: Instant) {
        let result = self.with_machine(|m| m.handle_connect_response(response, now));
        match &result {
            Ok(channel_id) => {
                let data_endpoint = response
                    .data_endpoint
                    .filter(|hpai| !hpai.is_unspecified())
                    .map_or(self.config.gateway, |hpai| hpai.endpoint());
                self.data_endpoint.lock(|cell| cell.set(data_endpoint));

                knx_log!(info, "Connected on channel {}", channel_id);
                self.events.publish(KnxEvent::Connected { channel_id: *channel_id });
                self.session_up.signal(());
            }
            Err(err) if err.is_protocol() => {
                knx_log!(debug, "Ignoring CONNECT_RESPONSE: {}", err.kind());
                return;
            }
            Err(_) => knx_log!(warn, "Connection refused: {}", status_name(response.status)),
        }
        self.connect_done.signal(result);
    }

    fn on_tunneling_ack(&self, ack: &TunnelingAck, now: Instant) {
        match self.with_machine(|m| m.handle_tunneling_ack(ack, now)) {
            Ok(()) => self.ack_done.signal(Ok(())),
            Err(err @ KnxError::Tunneling(_)) => {
                knx_log!(warn, "Gateway refused seq {}: {}", ack.sequence, status_name(ack.status));
                self.ack_done.signal(Err(err));
            }
            Err(err) => {
                knx_log!(warn, "Rejected ack seq {} on channel {}: {}", ack.sequence, ack.channel_id, err.kind());
                self.events.publish_error(&err);
            }
        }
    }

    async fn on_tunneling_request(&self, request: TunnelingRequest, now: Instant) -> Option<CemiFrame> {
        let ack = match self.with_machine(|m| m.handle_tunneling_request(&request, now)) {
            Ok(ack) => ack,
            Err(err) => {
                knx_log!(debug, "Dropping request for channel {}: {}", request.channel_id, err.kind());
                return None;
            }
        };
        // ack first; a failed ack is reported by the transport path
        let _ = self.transmit(ack, self.data_endpoint()).await;

        match request.cemi() {
            Ok(cemi) if cemi.is_confirmation() => {
                let result = if cemi.ldata.ctrl1.has_error() {
                    Err(KnxError::negative_confirmation())
                } else {
                    Ok(())
                };
                self.confirmation.signal(result);
                None
            }
            Ok(cemi) if cemi.is_indication() => Some(cemi),
            Ok(cemi) => {
                knx_log!(debug, "Ignoring cEMI message {:?}", cemi.message_code);
                None
            }
            Err(err) => {
                knx_log!(warn, "Undecodable cEMI in seq {}: {}", request.sequence, err.kind());
                self.events.publish_error(&err);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::GroupAddress;
    use crate::net::MockGateway;
    use crate::protocol::cemi::ApduData;
    use crate::protocol::services::ConnectionStateResponse;
    use embassy_futures::block_on;
    use embassy_futures::join::join;
    use embassy_futures::select::select;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use embassy_time::Duration;

    fn gateway() -> MockGateway<NoopRawMutex> {
        MockGateway::new(IpEndpoint::from(([192, 168, 1, 10], 3671)))
    }

    fn config(gateway: &MockGateway<NoopRawMutex>) -> TunnelConfig {
        TunnelConfig::new(gateway.endpoint())
            .with_connect_timeout(Duration::from_millis(100))
            .with_ack(Duration::from_millis(50), 1)
    }

    fn write_cemi() -> CemiFrame {
        CemiFrame::group_value_write(
            IndividualAddress::UNASSIGNED,
            GroupAddress::new(1, 1, 1).unwrap(),
            ApduData::packed(1),
        )
    }

    /// Feed one frame the gateway sent into the tunnel.
    async fn pump(tunnel: &AsyncTunnel<NoopRawMutex, crate::net::MockTransport<'_, NoopRawMutex>>) {
        let mut buf = [0u8; 256];
        let (len, _) = tunnel.transport().recv_from(&mut buf).await.unwrap();
        tunnel.handle_frame(Frame::decode(&buf[..len]).unwrap()).await;
    }

    #[test]
    fn test_connect_and_status() {
        let gateway = gateway();
        let tunnel = AsyncTunnel::<NoopRawMutex, _>::new(gateway.transport(), config(&gateway));

        let (result, _) = block_on(join(tunnel.connect(), async {
            gateway.accept_connect(5).await.unwrap();
            pump(&tunnel).await;
        }));

        assert_eq!(result.unwrap(), 5);
        assert_eq!(tunnel.status(), ConnectionStatus::Connected);
        assert_eq!(tunnel.assigned_address(), Some(IndividualAddress::from(0x11FF)));
    }

    #[test]
    fn test_connect_timeout() {
        let gateway = gateway();
        let tunnel = AsyncTunnel::<NoopRawMutex, _>::new(gateway.transport(), config(&gateway));
        let err = block_on(tunnel.connect()).unwrap_err();
        assert!(err.is_connect_timeout());
        assert_eq!(tunnel.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_send_requires_connection() {
        let gateway = gateway();
        let tunnel = AsyncTunnel::<NoopRawMutex, _>::new(gateway.transport(), config(&gateway));
        assert!(block_on(tunnel.send_cemi(write_cemi())).unwrap_err().is_not_connected());
        assert!(block_on(tunnel.enqueue(write_cemi())).unwrap_err().is_not_connected());
    }

    #[test]
    fn test_deliver_retransmits_then_times_out() {
        let gateway = gateway();
        let tunnel = AsyncTunnel::<NoopRawMutex, _>::new(gateway.transport(), config(&gateway));
        block_on(join(tunnel.connect(), async {
            gateway.accept_connect(1).await.unwrap();
            pump(&tunnel).await;
        }))
        .0
        .unwrap();

        let err = block_on(tunnel.deliver(&write_cemi())).unwrap_err();
        assert!(err.is_ack_timeout());

        // first send plus one retry, same sequence
        let mut sequences = heapless::Vec::<u8, 4>::new();
        while let Some(frame) = gateway.try_next_frame() {
            if let Frame::TunnelingRequest(request) = frame.unwrap() {
                sequences.push(request.sequence).unwrap();
            }
        }
        assert_eq!(sequences.as_slice(), &[0, 0]);
        assert_eq!(tunnel.connection_state().send_sequence, 0);
    }

    #[test]
    fn test_slot_released_on_drop() {
        let gateway = gateway();
        let tunnel = AsyncTunnel::<NoopRawMutex, _>::new(gateway.transport(), config(&gateway));
        for _ in 0..SEND_SLOTS {
            let slot = tunnel.claim_slot().unwrap();
            drop(SlotGuard {
                states: &tunnel.slot_states,
                slot,
                enqueued: false,
            });
        }
        assert!(tunnel.claim_slot().is_some());
    }

    #[test]
    fn test_abandoned_slot_freed_by_completion() {
        let gateway = gateway();
        let tunnel = AsyncTunnel::<NoopRawMutex, _>::new(gateway.transport(), config(&gateway));
        let slot = tunnel.claim_slot().unwrap();
        drop(SlotGuard {
            states: &tunnel.slot_states,
            slot,
            enqueued: true,
        });
        assert_eq!(tunnel.slot_states.lock(|s| s.borrow()[slot]), SlotState::Abandoned);
        tunnel.complete_slot(slot, Ok(()));
        assert_eq!(tunnel.slot_states.lock(|s| s.borrow()[slot]), SlotState::Free);
    }

    #[test]
    fn test_cancelled_sender_returns_slot() {
        let gateway = gateway();
        let tunnel = AsyncTunnel::<NoopRawMutex, _>::new(gateway.transport(), config(&gateway));
        block_on(join(tunnel.connect(), async {
            gateway.accept_connect(3).await.unwrap();
            pump(&tunnel).await;
        }))
        .0
        .unwrap();

        // stop both sides while the request waits for its ack
        block_on(select(
            join(tunnel.run_sender(), tunnel.send_cemi(write_cemi())),
            Timer::after(Duration::from_millis(10)),
        ));
        assert!(matches!(gateway.try_next_frame(), Some(Ok(Frame::TunnelingRequest(_)))));

        let states = tunnel.slot_states.lock(|s| *s.borrow());
        assert!(states.iter().all(|state| *state == SlotState::Free));
        assert!(!tunnel.with_machine(|m| m.is_awaiting_ack()));
    }

    #[test]
    fn test_cancelled_sender_completes_waiting_caller() {
        let gateway = gateway();
        let tunnel = AsyncTunnel::<NoopRawMutex, _>::new(gateway.transport(), config(&gateway));
        block_on(join(tunnel.connect(), async {
            gateway.accept_connect(3).await.unwrap();
            pump(&tunnel).await;
        }))
        .0
        .unwrap();

        let slot = tunnel.claim_slot().unwrap();
        drop(InFlight {
            tunnel: &tunnel,
            slot: Some(slot),
            finished: false,
        });
        assert_eq!(
            block_on(tunnel.slots[slot].wait()).unwrap_err().kind(),
            crate::error::ErrorKind::Connection(crate::error::ConnectionErrorKind::Lost)
        );
        drop(SlotGuard {
            states: &tunnel.slot_states,
            slot,
            enqueued: true,
        });
        assert_eq!(tunnel.slot_states.lock(|s| s.borrow()[slot]), SlotState::Free);
    }

    #[test]
    fn test_heartbeat_error_status_ends_session() {
        let gateway = gateway();
        let tunnel = AsyncTunnel::<NoopRawMutex, _>::new(gateway.transport(), config(&gateway));
        let mut events = tunnel.events().subscribe().unwrap();
        block_on(join(tunnel.connect(), async {
            gateway.accept_connect(2).await.unwrap();
            pump(&tunnel).await;
        }))
        .0
        .unwrap();

        tunnel.with_machine(|m| m.heartbeat_request()).unwrap();
        block_on(tunnel.handle_frame(Frame::from(ConnectionStateResponse {
            channel_id: 2,
            status: 0x21,
        })));

        assert_eq!(tunnel.status(), ConnectionStatus::Disconnected);
        assert!(matches!(events.try_next_message_pure(), Some(KnxEvent::Connecting { .. })));
        assert_eq!(events.try_next_message_pure(), Some(KnxEvent::Connected { channel_id: 2 }));
        assert_eq!(
            events.try_next_message_pure(),
            Some(KnxEvent::Disconnected {
                reason: DisconnectReason::HeartbeatLost
            })
        );
    }
}
