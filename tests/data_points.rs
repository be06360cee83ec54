//! Data point reads, writes and updates through a live session.

mod common;

use common::*;
use embassy_futures::join::{join, join3};
use embassy_time::Duration;

use knx_tunnel::dpt::{Dpt9, DptValue};
use knx_tunnel::error::{TimeoutErrorKind, TunnelingErrorKind};
use knx_tunnel::protocol::cemi::{Apci, ApduData, GroupService};
use knx_tunnel::protocol::frame::Frame;
use knx_tunnel::{ga, DataPoint, Dimmer, ErrorKind, GroupAddress, KnxEvent, Sensor, Switch};

/// 21.0 degrees as DPT 9.001
const TWENTY_ONE: [u8; 2] = [0x0C, 0x1A];

/// Ack the client's GroupValueRead for `address` and answer it.
async fn answer_read(gateway: &Gateway, address: GroupAddress, data: &[u8], sequence: u8) {
    let request = gateway.ack_next(0).await.unwrap();
    let cemi = request.cemi().unwrap();
    assert_eq!(cemi.ldata.apci, Some(Apci::GroupValueRead));
    assert_eq!(cemi.ldata.destination.as_group(), Some(address));

    let response = indication(address, GroupService::Response, ApduData::from_slice(data).unwrap());
    send_to_client(gateway, sequence, &response).await;
}

#[test]
fn test_sensor_read_resolves_with_response() {
    let gateway = gateway();
    let client = client(&gateway, fast_config(&gateway).with_read_timeout(Duration::from_secs(1)));

    drive(&client, async {
        connect(&client, &gateway).await;
        let outside = Sensor::new(&client, ga!(3 / 0 / 1), Dpt9::Temperature).unwrap();

        let (celsius, ()) = join(outside.read(), answer_read(&gateway, ga!(3 / 0 / 1), &TWENTY_ONE, 0)).await;
        assert!((celsius.unwrap() - 21.0).abs() < 0.01);
        // the response also refreshed the cache
        assert!((outside.value().unwrap() - 21.0).abs() < 0.01);
    });
    assert_eq!(client.registry().pending_reads(), 0);
}

#[test]
fn test_sensor_read_times_out() {
    let gateway = gateway();
    let client = client(&gateway, fast_config(&gateway));

    drive(&client, async {
        connect(&client, &gateway).await;
        let outside = Sensor::new(&client, ga!(3 / 0 / 1), Dpt9::Temperature).unwrap();

        let (result, acked) = join(outside.read(), gateway.ack_next(0)).await;
        acked.unwrap();
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Timeout(TimeoutErrorKind::Read));
    });
    assert_eq!(client.registry().pending_reads(), 0);
}

#[test]
fn test_concurrent_reads_share_one_response() {
    let gateway = gateway();
    let client = client(&gateway, fast_config(&gateway).with_read_timeout(Duration::from_secs(1)));

    drive(&client, async {
        connect(&client, &gateway).await;
        let address = ga!(3 / 0 / 1);

        let (first, second, ()) = join3(client.read(address), client.read(address), async {
            // both GroupValueReads go out; one response answers both
            gateway.ack_next(0).await.unwrap();
            answer_read(&gateway, address, &TWENTY_ONE, 0).await;
        })
        .await;

        assert_eq!(first.unwrap().as_bytes(), &TWENTY_ONE);
        assert_eq!(second.unwrap().as_bytes(), &TWENTY_ONE);
    });
}

#[test]
fn test_response_for_other_address_does_not_complete_read() {
    let gateway = gateway();
    let client = client(&gateway, fast_config(&gateway));

    drive(&client, async {
        connect(&client, &gateway).await;

        let (result, ()) = join(client.read(ga!(3 / 0 / 1)), async {
            let request = gateway.ack_next(0).await.unwrap();
            assert_eq!(request.cemi().unwrap().ldata.destination.as_group(), Some(ga!(3 / 0 / 1)));
            // a neighbour answers its own read
            let response = indication(ga!(3 / 0 / 2), GroupService::Response, ApduData::from_slice(&TWENTY_ONE).unwrap());
            send_to_client(&gateway, 0, &response).await;
        })
        .await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Timeout(TimeoutErrorKind::Read));
    });
    assert_eq!(client.registry().pending_reads(), 0);
}

#[test]
fn test_refused_read_reports_the_ack_status() {
    let gateway = gateway();
    let client = client(&gateway, fast_config(&gateway).with_read_timeout(Duration::from_secs(1)));

    drive(&client, async {
        connect(&client, &gateway).await;
        let outside = Sensor::new(&client, ga!(3 / 0 / 1), Dpt9::Temperature).unwrap();

        // E_TUNNELLING_LAYER
        let (result, acked) = join(outside.read(), gateway.ack_next(0x29)).await;
        acked.unwrap();
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Tunneling(TunnelingErrorKind::AckStatus(0x29)));
    });
    assert_eq!(client.registry().pending_reads(), 0);
}

#[test]
fn test_dimmer_set_level_encodes_percentage() {
    let gateway = gateway();
    let client = client(&gateway, fast_config(&gateway));

    drive(&client, async {
        connect(&client, &gateway).await;
        let dimmer = Dimmer::new(&client, ga!(1 / 2 / 3)).unwrap();

        dimmer.set_level(100).await.unwrap();
        let cemi = gateway.ack_next(0).await.unwrap().cemi().unwrap();
        assert_eq!(cemi.ldata.apci, Some(Apci::GroupValueWrite));
        assert_eq!(cemi.ldata.data.as_bytes(), &[0xFF]);
        assert!(!cemi.ldata.data.is_packed());
        assert_eq!(dimmer.level(), Some(100));

        assert!(dimmer.set_level(101).await.unwrap_err().is_dpt());
    });
}

#[test]
fn test_switch_toggle_follows_bus_state() {
    let gateway = gateway();
    let client = client(&gateway, fast_config(&gateway));

    drive(&client, async {
        connect(&client, &gateway).await;
        let light = Switch::new(&client, ga!(1 / 1 / 1)).unwrap();

        // someone else turned the light on
        send_to_client(&gateway, 0, &indication(ga!(1 / 1 / 1), GroupService::Write, ApduData::packed(1))).await;
        let Frame::TunnelingAck(_) = gateway.next_frame().await.unwrap() else {
            panic!("expected the client's ack");
        };
        eventually(|| light.state() == Some(true)).await;

        light.toggle().await.unwrap();
        let cemi = gateway.ack_next(0).await.unwrap().cemi().unwrap();
        assert_eq!(cemi.ldata.data.as_bytes(), &[0x00]);
        assert_eq!(light.state(), Some(false));
    });
}

#[test]
fn test_wait_update_and_bus_event_carry_decoded_value() {
    let gateway = gateway();
    let client = client(&gateway, fast_config(&gateway));
    let mut events = client.subscribe().unwrap();

    drive(&client, async {
        connect(&client, &gateway).await;
        let outside = DataPoint::bind(&client, ga!(3 / 0 / 1), Dpt9::Temperature.into()).unwrap();

        let report = indication(ga!(3 / 0 / 1), GroupService::Write, ApduData::from_slice(&TWENTY_ONE).unwrap());
        let (value, ()) = join(outside.wait_update(), send_to_client(&gateway, 0, &report)).await;
        assert!(matches!(value, DptValue::Float(v) if (v - 21.0).abs() < 0.01));

        loop {
            if let KnxEvent::Bus(bus) = next_event(&mut events).await {
                assert_eq!(bus.value, Some(value));
                break;
            }
        }
    });
}

#[test]
fn test_respond_sends_group_value_response() {
    let gateway = gateway();
    let client = client(&gateway, fast_config(&gateway));

    drive(&client, async {
        connect(&client, &gateway).await;
        let setpoint = DataPoint::bind(&client, ga!(4 / 0 / 1), Dpt9::Temperature.into()).unwrap();

        setpoint.respond(DptValue::Float(21.0)).await.unwrap();
        let cemi = gateway.ack_next(0).await.unwrap().cemi().unwrap();
        assert_eq!(cemi.ldata.apci, Some(Apci::GroupValueResponse));
        assert_eq!(cemi.ldata.data.as_bytes(), &TWENTY_ONE);
    });
}

#[test]
fn test_dropped_point_releases_address() {
    let gateway = gateway();
    let client = client(&gateway, fast_config(&gateway));

    {
        let _light = Switch::new(&client, ga!(1 / 1 / 1)).unwrap();
        assert_eq!(client.registry().binding_count(), 1);
    }
    assert_eq!(client.registry().binding_count(), 0);
    // the address is free for another type now
    let _outside = Sensor::new(&client, ga!(1 / 1 / 1), Dpt9::Temperature).unwrap();
}
