//! Session and bus notifications.
//!
//! The client publishes a [`KnxEvent`] for every lifecycle transition, every
//! error that has no caller to return to, and every telegram seen on the bus.
//! Subscribers each get their own cursor into a bounded queue; one that falls
//! behind sees `WaitResult::Lagged(n)` and continues with the oldest message
//! still queued.
//!
//! ```rust,ignore
//! let mut events = client.subscribe()?;
//! loop {
//!     match events.next_message().await {
//!         WaitResult::Message(KnxEvent::Bus(bus)) => handle(bus),
//!         WaitResult::Message(KnxEvent::Disconnected { reason }) => break,
//!         WaitResult::Message(_) => {}
//!         WaitResult::Lagged(_missed) => {}
//!     }
//! }
//! ```

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::pubsub::{PubSubChannel, Subscriber};

use crate::addressing::{IndividualAddress, KnxAddress};
use crate::dpt::DptValue;
use crate::error::{ErrorKind, KnxError, Result};
use crate::net::IpEndpoint;
use crate::protocol::cemi::{ApduData, Apci, GroupService};

/// Queued events per subscriber.
pub const EVENT_QUEUE_DEPTH: usize = 16;
/// Concurrent subscribers.
pub const MAX_SUBSCRIBERS: usize = 4;
/// The client is the only publisher.
const MAX_PUBLISHERS: usize = 1;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DisconnectReason {
    /// `disconnect()` or `close()` was called
    Requested,
    /// The gateway sent a DISCONNECT_REQUEST
    GatewayRequest,
    /// Heartbeats went unanswered or the gateway reported the channel gone
    HeartbeatLost,
    /// The transport failed to send
    TransportError,
}

/// A telegram received from the bus.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusEvent {
    pub source: IndividualAddress,
    pub destination: KnxAddress,
    pub apci: Apci,
    pub data: ApduData,
    /// Decoded with the datapoint type bound to the destination, if any
    pub value: Option<DptValue>,
}

impl BusEvent {
    /// Group service of the telegram, if it is one.
    pub fn service(&self) -> Option<GroupService> {
        self.apci.group_service()
    }
}

/// Notification published by the client.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KnxEvent {
    Connecting { gateway: IpEndpoint },
    Connected { channel_id: u8 },
    Disconnected { reason: DisconnectReason },
    Error(ErrorKind),
    Bus(BusEvent),
}

/// Subscription handle returned by [`EventBus::subscribe`].
pub type EventSubscriber<'a, M> = Subscriber<'a, M, KnxEvent, EVENT_QUEUE_DEPTH, MAX_SUBSCRIBERS, MAX_PUBLISHERS>;

/// Multi-subscriber event queue.
pub struct EventBus<M: RawMutex> {
    channel: PubSubChannel<M, KnxEvent, EVENT_QUEUE_DEPTH, MAX_SUBSCRIBERS, MAX_PUBLISHERS>,
}

impl<M: RawMutex> EventBus<M> {
    pub const fn new() -> Self {
        Self {
            channel: PubSubChannel::new(),
        }
    }

    /// Publish without waiting; the oldest event is dropped when full.
    pub fn publish(&self, event: KnxEvent) {
        self.channel.immediate_publisher().publish_immediate(event);
    }

    /// Shorthand for `publish(KnxEvent::Error(err.kind()))`.
    pub(crate) fn publish_error(&self, err: &KnxError) {
        self.publish(KnxEvent::Error(err.kind()));
    }

    /// Start receiving events published from now on.
    pub fn subscribe(&self) -> Result<EventSubscriber<'_, M>> {
        self.channel.subscriber().map_err(|_| KnxError::too_many_subscribers())
    }
}

impl<M: RawMutex> Default for EventBus<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex> core::fmt::Debug for EventBus<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use embassy_sync::pubsub::WaitResult;

    #[test]
    fn test_every_subscriber_sees_event() {
        let bus: EventBus<NoopRawMutex> = EventBus::new();
        let mut first = bus.subscribe().unwrap();
        let mut second = bus.subscribe().unwrap();

        bus.publish(KnxEvent::Connected { channel_id: 5 });

        assert_eq!(first.try_next_message_pure(), Some(KnxEvent::Connected { channel_id: 5 }));
        assert_eq!(second.try_next_message_pure(), Some(KnxEvent::Connected { channel_id: 5 }));
        assert_eq!(first.try_next_message_pure(), None);
    }

    #[test]
    fn test_subscriber_limit() {
        let bus: EventBus<NoopRawMutex> = EventBus::new();
        let _subs: [_; MAX_SUBSCRIBERS] = core::array::from_fn(|_| bus.subscribe().unwrap());
        assert!(bus.subscribe().is_err());
    }

    #[test]
    fn test_slow_subscriber_lags() {
        let bus: EventBus<NoopRawMutex> = EventBus::new();
        let mut sub = bus.subscribe().unwrap();
        for channel_id in 0..(EVENT_QUEUE_DEPTH as u8 + 2) {
            bus.publish(KnxEvent::Connected { channel_id });
        }
        assert_eq!(sub.try_next_message(), Some(WaitResult::Lagged(2)));
        assert_eq!(
            sub.try_next_message(),
            Some(WaitResult::Message(KnxEvent::Connected { channel_id: 2 }))
        );
    }
}
