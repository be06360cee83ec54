//! Typed handles on group addresses.
//!
//! A [`DataPoint`] binds one group address to a [`DatapointType`] in the
//! client's [`Registry`](registry::Registry). Inbound writes and responses
//! for the address are decoded with that type, cached, and handed to
//! [`DataPoint::wait_update`]. The device wrappers in [`devices`] put a
//! plain Rust API on top for the common cases.
//!
//! ```rust,ignore
//! use knx_tunnel::datapoint::DataPoint;
//! use knx_tunnel::dpt::{Dpt9, DptValue};
//!
//! let outside = DataPoint::bind(&client, ga!(3 / 0 / 1), Dpt9::Temperature.into())?;
//! if let DptValue::Float(celsius) = outside.read().await? {
//!     // ...
//! }
//! ```

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::addressing::GroupAddress;
use crate::dpt::{DatapointType, DptValue};
use crate::error::Result;
use crate::knx_client::KnxClient;
use crate::net::AsyncTransport;

pub mod devices;
pub mod registry;

#[doc(inline)]
pub use devices::{Dimmer, Sensor, Switch};
#[doc(inline)]
pub use registry::{Registry, MAX_BINDINGS, MAX_PENDING_READS};

use registry::BindingId;

/// A group address bound to a datapoint type.
///
/// Handles on the same address share the binding and its cached value.
/// Dropping the last one releases the address.
pub struct DataPoint<'c, M: RawMutex, T: AsyncTransport> {
    client: &'c KnxClient<M, T>,
    address: GroupAddress,
    dpt: DatapointType,
    binding: BindingId,
}

impl<M: RawMutex, T: AsyncTransport> core::fmt::Debug for DataPoint<'_, M, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DataPoint")
            .field("address", &self.address)
            .field("dpt", &self.dpt)
            .field("value", &self.value())
            .finish()
    }
}

impl<'c, M: RawMutex, T: AsyncTransport> DataPoint<'c, M, T> {
    /// Bind `address` with `dpt`.
    ///
    /// # Errors
    ///
    /// - `Dpt(TypeMismatch)` if the address is already bound with another type
    /// - `Tunneling(RegistryFull)` if every binding slot is taken
    pub fn bind(client: &'c KnxClient<M, T>, address: GroupAddress, dpt: DatapointType) -> Result<Self> {
        let binding = client.registry().bind(address, dpt)?;
        knx_log!(debug, "Bound {} as {}", address, dpt.identifier());
        Ok(Self {
            client,
            address,
            dpt,
            binding,
        })
    }

    #[inline]
    pub fn address(&self) -> GroupAddress {
        self.address
    }

    #[inline]
    pub fn dpt(&self) -> DatapointType {
        self.dpt
    }

    /// Last value seen on the bus or written through any handle.
    pub fn value(&self) -> Option<DptValue> {
        self.client.registry().value(self.binding)
    }

    /// Wait for the next value arriving from the bus.
    pub async fn wait_update(&self) -> DptValue {
        self.client.registry().wait_update(self.binding).await
    }

    /// Ask the bus for the current value.
    ///
    /// The response also updates [`value`](Self::value).
    pub async fn read(&self) -> Result<DptValue> {
        self.client.read_value(self.address, self.dpt).await
    }

    /// Queue a GroupValueWrite of `value`.
    ///
    /// The cached value is updated once the write is queued.
    pub async fn write(&self, value: DptValue) -> Result<()> {
        let data = self.dpt.encode(value)?;
        self.client.write(self.address, data).await?;
        self.client.registry().store(self.binding, value);
        Ok(())
    }

    /// Answer a GroupValueRead with `value`.
    pub async fn respond(&self, value: DptValue) -> Result<()> {
        let data = self.dpt.encode(value)?;
        self.client.respond(self.address, data).await
    }
}

impl<M: RawMutex, T: AsyncTransport> Drop for DataPoint<'_, M, T> {
    fn drop(&mut self) {
        self.client.registry().unbind(self.binding);
    }
}
