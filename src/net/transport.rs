//! Datagram transport abstraction.
//!
//! The client owns one transport and shares it between the dispatcher, which
//! sits in `recv_from` for the whole session, and the sender and heartbeat
//! loops, which call `send_to`. Both methods therefore take `&self`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use knx_tunnel::net::{AsyncTransport, IpEndpoint};
//! use knx_tunnel::Result;
//!
//! struct SerialBridge { /* ... */ }
//!
//! impl AsyncTransport for SerialBridge {
//!     async fn send_to(&self, data: &[u8], endpoint: IpEndpoint) -> Result<()> {
//!         // frame and write `data`
//!         Ok(())
//!     }
//!
//!     async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, IpEndpoint)> {
//!         // read one datagram into `buf`
//!         Ok((len, endpoint))
//!     }
//! }
//! ```

use crate::error::Result;
use crate::net::IpEndpoint;

/// Asynchronous datagram transport.
///
/// Errors are reported as `KnxError::Transport`; the client treats any of
/// them as loss of the session.
#[allow(async_fn_in_trait, reason = "the client is generic over the transport and never boxes it")]
pub trait AsyncTransport {
    /// Send one datagram to `endpoint`.
    async fn send_to(&self, data: &[u8], endpoint: IpEndpoint) -> Result<()>;

    /// Wait for the next datagram, returning its length and source.
    ///
    /// Fails with `BufferTooSmall` if the datagram does not fit in `buf`.
    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, IpEndpoint)>;

    /// Whether the transport can send. Defaults to `true`.
    fn is_ready(&self) -> bool {
        true
    }

    /// Release the underlying socket. Defaults to a no-op.
    fn close(&mut self) {}
}
