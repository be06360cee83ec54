//! Shared fixtures: an in-memory gateway, fast timings, and a driver that
//! polls the client alongside a test scenario.

#![allow(dead_code, reason = "each test binary uses a subset of the fixtures")]

use core::future::Future;

use embassy_futures::block_on;
use embassy_futures::join::join;
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_time::{with_timeout, Duration, Timer};

use knx_tunnel::event::EventSubscriber;
use knx_tunnel::net::{IpEndpoint, MockGateway, MockTransport};
use knx_tunnel::protocol::cemi::{ApduData, CemiFrame, ControlField1, GroupService};
use knx_tunnel::protocol::constants::CEMIMessageCode;
use knx_tunnel::protocol::frame::Frame;
use knx_tunnel::protocol::services::TunnelingRequest;
use knx_tunnel::{GroupAddress, IndividualAddress, KnxClient, KnxEvent, TunnelConfig};

pub type Gateway = MockGateway<NoopRawMutex>;
pub type Client<'a> = KnxClient<NoopRawMutex, MockTransport<'a, NoopRawMutex>>;

pub const CHANNEL: u8 = 5;

/// Upper bound for anything a test waits on.
pub const PATIENCE: Duration = Duration::from_secs(2);

pub fn gateway() -> Gateway {
    MockGateway::new(IpEndpoint::from(([192, 168, 1, 10], 3671)))
}

/// Short timeouts so failure paths finish quickly.
pub fn fast_config(gateway: &Gateway) -> TunnelConfig {
    TunnelConfig::new(gateway.endpoint())
        .with_connect_timeout(Duration::from_millis(200))
        .with_ack(Duration::from_millis(100), 1)
        .with_read_timeout(Duration::from_millis(100))
        .with_disconnect_timeout(Duration::from_millis(100))
        .with_send_queue_interval(Duration::from_millis(1))
}

pub fn client<'a>(gateway: &'a Gateway, config: TunnelConfig) -> Client<'a> {
    KnxClient::new(gateway.transport(), config)
}

/// Run `scenario` while the client's driver is polled.
pub fn drive<F: Future>(client: &Client<'_>, scenario: F) -> F::Output {
    match block_on(select(client.run(), scenario)) {
        Either::First(()) => panic!("client driver stopped before the scenario finished"),
        Either::Second(output) => output,
    }
}

/// Connect with the gateway accepting on [`CHANNEL`].
pub async fn connect(client: &Client<'_>, gateway: &Gateway) {
    let (channel, accepted) = join(client.connect(), gateway.accept_connect(CHANNEL)).await;
    accepted.expect("gateway saw no CONNECT_REQUEST");
    assert_eq!(channel.expect("connect failed"), CHANNEL);
}

/// Poll `condition` until it holds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let polled = with_timeout(PATIENCE, async {
        while !condition() {
            Timer::after(Duration::from_millis(1)).await;
        }
    })
    .await;
    assert!(polled.is_ok(), "condition not reached in time");
}

/// Next event, skipping lag notices.
pub async fn next_event(events: &mut EventSubscriber<'_, NoopRawMutex>) -> KnxEvent {
    with_timeout(PATIENCE, events.next_message_pure())
        .await
        .expect("no event in time")
}

/// Next TUNNELING_REQUEST the client sent, skipping anything else.
pub async fn next_tunneling_request(gateway: &Gateway) -> TunnelingRequest {
    loop {
        if let Frame::TunnelingRequest(request) = gateway.next_frame().await.expect("undecodable frame") {
            return request;
        }
    }
}

/// An L_Data.ind as a bus device would send it.
pub fn indication(destination: GroupAddress, service: GroupService, data: ApduData) -> CemiFrame {
    let source = IndividualAddress::new(1, 1, 20).expect("valid address");
    let mut cemi = CemiFrame::group_request(source, destination, service, data);
    cemi.message_code = CEMIMessageCode::LDataInd;
    cemi
}

/// The L_Data.con a gateway returns for `request` once the bus has seen it.
pub fn confirmation(request: &TunnelingRequest, failed: bool) -> CemiFrame {
    let mut cemi = request.cemi().expect("client sent valid cEMI");
    cemi.message_code = CEMIMessageCode::LDataCon;
    if failed {
        cemi.ldata.ctrl1 = ControlField1::from(cemi.ldata.ctrl1.raw() | 0x01);
    }
    cemi
}

/// Send `cemi` to the client in a tunneling request with `sequence`.
pub async fn send_to_client(gateway: &Gateway, sequence: u8, cemi: &CemiFrame) {
    let request = TunnelingRequest::new(CHANNEL, sequence, cemi).expect("encodable cEMI");
    gateway.reply(request).await.expect("gateway queue full");
}
