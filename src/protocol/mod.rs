//! KNXnet/IP tunneling protocol.
//!
//! Bottom-up: [`constants`] and [`frame`] handle the 6-byte header, HPAIs and
//! dispatch on service type, [`services`] holds one struct per tunneling
//! service, and [`cemi`] decodes the L_Data payload carried in tunneling
//! requests. [`tunnel`] is the pure connection state machine and
//! [`async_tunnel`] drives it over a transport with timers.

pub mod async_tunnel;
pub mod cemi;
pub mod constants;
pub mod frame;
pub mod services;
pub mod tunnel;

pub use cemi::*;
pub use constants::*;
pub use frame::*;
pub use services::*;
pub use tunnel::*;
