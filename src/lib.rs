#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
#![doc = include_str!("../README.md")]

//! ## Layout
//!
//! - [`protocol`]: KNXnet/IP frames, cEMI and the tunnel state machine
//! - [`addressing`] and [`dpt`]: addresses and datapoint codecs
//! - [`datapoint`]: typed handles bound to group addresses
//! - [`event`]: lifecycle, error and bus notifications
//! - [`net`]: the transport boundary, with an `embassy-net` adapter and a
//!   mock gateway
//! - [`knx_client`]: the client tying it together

// must precede the modules that log
#[macro_use]
pub mod logging;
#[macro_use]
pub mod macros;

pub mod addressing;
pub mod config;
pub mod datapoint;
mod dispatch;
pub mod dpt;
pub mod error;
pub mod event;
pub mod knx_client;
pub mod net;
pub mod protocol;

#[doc(inline)]
pub use addressing::{GroupAddress, IndividualAddress, KnxAddress};
#[doc(inline)]
pub use config::TunnelConfig;
#[doc(inline)]
pub use datapoint::{DataPoint, Dimmer, Sensor, Switch};
#[doc(inline)]
pub use dpt::{DatapointType, Dpt1, Dpt3, Dpt5, Dpt7, Dpt9, DptValue};
#[doc(inline)]
pub use error::{ErrorKind, KnxError, Result};
#[doc(inline)]
pub use event::{BusEvent, DisconnectReason, KnxEvent};
#[doc(inline)]
pub use knx_client::KnxClient;
#[doc(inline)]
pub use logging::LogLevel;
#[doc(inline)]
pub use net::{AsyncTransport, IpEndpoint, Ipv4Addr};
#[doc(inline)]
pub use protocol::cemi::ApduData;
#[doc(inline)]
pub use protocol::tunnel::{ConnectionState, ConnectionStatus};
