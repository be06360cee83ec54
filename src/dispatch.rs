//! Inbound datagram dispatch.
//!
//! The dispatcher owns the receive side of the transport for the whole life
//! of the client. Each datagram is checked against the gateway address and
//! decoded; connection management frames go to the tunnel, and bus
//! indications are routed to bound data points and published as
//! [`KnxEvent::Bus`]. A bad datagram is reported and skipped, never fatal.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Timer};

use crate::addressing::KnxAddress;
use crate::datapoint::registry::Registry;
use crate::error::{ErrorKind, TransportErrorKind};
use crate::event::{BusEvent, EventBus, KnxEvent};
use crate::net::AsyncTransport;
use crate::protocol::async_tunnel::AsyncTunnel;
use crate::protocol::cemi::{CemiFrame, LData};
use crate::protocol::constants::MAX_FRAME_SIZE;
use crate::protocol::frame::Frame;

/// Pause after a receive error so a dead socket does not spin the executor.
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Receive and dispatch datagrams until the future is dropped.
pub(crate) async fn run<M: RawMutex, T: AsyncTransport>(tunnel: &AsyncTunnel<M, T>, registry: &Registry<M>) {
    let mut buf = [0u8; MAX_FRAME_SIZE];

    loop {
        let (len, from) = match tunnel.transport().recv_from(&mut buf).await {
            Ok(received) => received,
            Err(err) if err.kind() == ErrorKind::Transport(TransportErrorKind::BufferTooSmall) => {
                knx_log!(warn, "Dropping oversized datagram");
                tunnel.events().publish_error(&err);
                continue;
            }
            Err(err) => {
                tunnel.transport_failed(&err);
                Timer::after(RECEIVE_ERROR_BACKOFF).await;
                continue;
            }
        };

        if !tunnel.is_gateway(from) {
            knx_log!(debug, "Ignoring datagram from {}", from);
            continue;
        }

        let frame = match Frame::decode(&buf[..len]) {
            Ok(frame) => frame,
            Err(err) => {
                knx_log!(warn, "Undecodable datagram ({} bytes): {}", len, err.kind());
                tunnel.events().publish_error(&err);
                continue;
            }
        };

        if let Some(cemi) = tunnel.handle_frame(frame).await {
            route(tunnel.events(), registry, cemi);
        }
    }
}

/// Deliver an L_Data.ind to the registry and to subscribers.
pub(crate) fn route<M: RawMutex>(events: &EventBus<M>, registry: &Registry<M>, cemi: CemiFrame) {
    let LData {
        source,
        destination,
        apci,
        data,
        ..
    } = cemi.ldata;

    // transport layer control frames carry no application data
    let Some(apci) = apci else {
        knx_log!(trace, "Ignoring control frame from {}", source);
        return;
    };

    let value = match (destination, apci.group_service()) {
        (KnxAddress::Group(address), Some(service)) => {
            knx_log!(debug, "{:?} {} -> {}", service, source, address);
            registry.on_group_telegram(service, address, &data)
        }
        _ => None,
    };

    events.publish(KnxEvent::Bus(BusEvent {
        source,
        destination,
        apci,
        data,
        value,
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::{GroupAddress, IndividualAddress};
    use crate::dpt::{Dpt9, DptValue};
    use crate::protocol::cemi::{ApduData, GroupService};
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    fn indication(service: GroupService, data: ApduData) -> CemiFrame {
        let mut cemi = CemiFrame::group_request(
            IndividualAddress::new(1, 1, 20).unwrap(),
            GroupAddress::new(3, 0, 1).unwrap(),
            service,
            data,
        );
        cemi.message_code = crate::protocol::constants::CEMIMessageCode::LDataInd;
        cemi
    }

    #[test]
    fn test_route_bound_address() {
        let events: EventBus<NoopRawMutex> = EventBus::new();
        let registry: Registry<NoopRawMutex> = Registry::new();
        let mut sub = events.subscribe().unwrap();
        registry
            .bind(GroupAddress::new(3, 0, 1).unwrap(), Dpt9::Temperature.into())
            .unwrap();

        // 21.0 degrees
        let data = ApduData::from_slice(&[0x0C, 0x1A]).unwrap();
        route(&events, &registry, indication(GroupService::Write, data));

        let Some(KnxEvent::Bus(bus)) = sub.try_next_message_pure() else {
            panic!("expected a bus event");
        };
        assert_eq!(bus.service(), Some(GroupService::Write));
        assert_eq!(bus.source, IndividualAddress::new(1, 1, 20).unwrap());
        let Some(DptValue::Float(celsius)) = bus.value else {
            panic!("expected a decoded float");
        };
        assert!((celsius - 21.0).abs() < 0.01);
    }

    #[test]
    fn test_route_unbound_address() {
        let events: EventBus<NoopRawMutex> = EventBus::new();
        let registry: Registry<NoopRawMutex> = Registry::new();
        let mut sub = events.subscribe().unwrap();

        route(&events, &registry, indication(GroupService::Read, ApduData::empty()));

        let Some(KnxEvent::Bus(bus)) = sub.try_next_message_pure() else {
            panic!("expected a bus event");
        };
        assert_eq!(bus.service(), Some(GroupService::Read));
        assert_eq!(bus.value, None);
    }
}
