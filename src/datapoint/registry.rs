//! Group address bindings and outstanding reads.
//!
//! The registry is the meeting point of the application side (data points
//! binding to addresses, reads waiting for responses) and the dispatcher
//! (inbound telegrams). Bindings are reference counted per address, so any
//! number of data points may share one address and see the same cached
//! value.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;

use crate::addressing::GroupAddress;
use crate::dpt::{DatapointType, DptValue};
use crate::error::{KnxError, Result};
use crate::protocol::cemi::{ApduData, GroupService};

/// Distinct group addresses that can be bound at once.
pub const MAX_BINDINGS: usize = 32;
/// Reads waiting for a GroupValueResponse at once.
pub const MAX_PENDING_READS: usize = 8;

#[derive(Debug, Clone, Copy)]
struct Binding {
    address: GroupAddress,
    dpt: DatapointType,
    refs: u16,
    value: Option<DptValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadSlot {
    Free,
    Waiting(GroupAddress),
    /// Response delivered, not yet taken by the reader
    Answered,
}

/// Index of a binding slot, held by a data point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct BindingId(usize);

/// Address bindings and pending reads of one client.
pub struct Registry<M: RawMutex> {
    bindings: Mutex<M, RefCell<[Option<Binding>; MAX_BINDINGS]>>,
    updates: [Signal<M, DptValue>; MAX_BINDINGS],
    reads: Mutex<M, RefCell<[ReadSlot; MAX_PENDING_READS]>>,
    responses: [Signal<M, ApduData>; MAX_PENDING_READS],
}

impl<M: RawMutex> core::fmt::Debug for Registry<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Registry")
            .field("bindings", &self.binding_count())
            .field("pending_reads", &self.pending_reads())
            .finish()
    }
}

impl<M: RawMutex> Default for Registry<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex> Registry<M> {
    pub const fn new() -> Self {
        Self {
            bindings: Mutex::new(RefCell::new([None; MAX_BINDINGS])),
            updates: [const { Signal::new() }; MAX_BINDINGS],
            reads: Mutex::new(RefCell::new([ReadSlot::Free; MAX_PENDING_READS])),
            responses: [const { Signal::new() }; MAX_PENDING_READS],
        }
    }

    /// Addresses currently bound.
    pub fn binding_count(&self) -> usize {
        self.bindings.lock(|b| b.borrow().iter().flatten().count())
    }

    /// Reads currently waiting for a response.
    pub fn pending_reads(&self) -> usize {
        self.reads
            .lock(|r| r.borrow().iter().filter(|slot| **slot != ReadSlot::Free).count())
    }

    /// Datapoint type bound to `address`.
    pub fn dpt(&self, address: GroupAddress) -> Option<DatapointType> {
        self.bindings.lock(|b| {
            b.borrow()
                .iter()
                .flatten()
                .find(|binding| binding.address == address)
                .map(|binding| binding.dpt)
        })
    }

    /// Bind `address`, sharing an existing binding of the same address.
    ///
    /// # Errors
    ///
    /// - `Dpt(TypeMismatch)` if the address is bound with another type
    /// - `Tunneling(RegistryFull)` if no slot is free
    pub(crate) fn bind(&self, address: GroupAddress, dpt: DatapointType) -> Result<BindingId> {
        self.bindings.lock(|b| {
            let mut bindings = b.borrow_mut();

            if let Some((index, binding)) = find_mut(&mut bindings[..], address) {
                if binding.dpt != dpt {
                    return Err(KnxError::dpt_type_mismatch());
                }
                binding.refs = binding.refs.checked_add(1).ok_or_else(KnxError::registry_full)?;
                return Ok(BindingId(index));
            }

            let index = bindings.iter().position(Option::is_none).ok_or_else(KnxError::registry_full)?;
            bindings[index] = Some(Binding {
                address,
                dpt,
                refs: 1,
                value: None,
            });
            self.updates[index].reset();
            Ok(BindingId(index))
        })
    }

    /// Drop one reference; the slot is freed with the last one.
    pub(crate) fn unbind(&self, id: BindingId) {
        self.bindings.lock(|b| {
            let mut bindings = b.borrow_mut();
            if let Some(binding) = bindings[id.0].as_mut() {
                binding.refs = binding.refs.saturating_sub(1);
                if binding.refs == 0 {
                    bindings[id.0] = None;
                }
            }
        });
    }

    /// Last value written or reported for the binding.
    pub(crate) fn value(&self, id: BindingId) -> Option<DptValue> {
        self.bindings.lock(|b| b.borrow()[id.0].and_then(|binding| binding.value))
    }

    /// Record a value sent from this side, so `value()` reflects it.
    pub(crate) fn store(&self, id: BindingId, value: DptValue) {
        self.bindings.lock(|b| {
            if let Some(binding) = b.borrow_mut()[id.0].as_mut() {
                binding.value = Some(value);
            }
        });
    }

    /// Wait for the next value received for the binding.
    ///
    /// One waiter per address; a second waiter on the same address competes
    /// for the same wakeup.
    pub(crate) async fn wait_update(&self, id: BindingId) -> DptValue {
        let signal = &self.updates[id.0];
        signal.reset();
        signal.wait().await
    }

    /// Register interest in the next GroupValueResponse for `address`.
    ///
    /// Register before sending the GroupValueRead so a fast response is not
    /// missed.
    pub(crate) fn begin_read(&self, address: GroupAddress) -> Result<PendingRead<'_, M>> {
        self.reads.lock(|r| {
            let mut reads = r.borrow_mut();
            let slot = reads
                .iter()
                .position(|slot| *slot == ReadSlot::Free)
                .ok_or_else(KnxError::too_many_pending_reads)?;
            reads[slot] = ReadSlot::Waiting(address);
            self.responses[slot].reset();
            Ok(PendingRead { registry: self, slot })
        })
    }

    /// Apply an inbound group telegram.
    ///
    /// Updates the binding's value on write and response, completes every
    /// pending read of the address on response, and returns the value decoded
    /// with the bound type.
    pub(crate) fn on_group_telegram(
        &self,
        service: GroupService,
        address: GroupAddress,
        data: &ApduData,
    ) -> Option<DptValue> {
        if service == GroupService::Response {
            self.reads.lock(|r| {
                for (slot, pending) in r.borrow_mut().iter_mut().enumerate() {
                    if *pending == ReadSlot::Waiting(address) {
                        *pending = ReadSlot::Answered;
                        self.responses[slot].signal(data.clone());
                    }
                }
            });
        }

        if service == GroupService::Read {
            return None;
        }

        self.bindings.lock(|b| {
            let mut bindings = b.borrow_mut();
            let (index, binding) = find_mut(&mut bindings[..], address)?;

            match binding.dpt.decode(data.as_bytes()) {
                Ok(value) => {
                    binding.value = Some(value);
                    self.updates[index].signal(value);
                    Some(value)
                }
                Err(err) => {
                    knx_log!(warn, "Cannot decode {} as {}: {}", address, binding.dpt.identifier(), err.kind());
                    None
                }
            }
        })
    }
}

fn find_mut(bindings: &mut [Option<Binding>], address: GroupAddress) -> Option<(usize, &mut Binding)> {
    bindings
        .iter_mut()
        .enumerate()
        .find_map(|(index, slot)| slot.as_mut().filter(|b| b.address == address).map(|b| (index, b)))
}

/// A read waiting for its response; dropping it withdraws the read.
pub(crate) struct PendingRead<'a, M: RawMutex> {
    registry: &'a Registry<M>,
    slot: usize,
}

impl<M: RawMutex> PendingRead<'_, M> {
    /// Data of the matching GroupValueResponse.
    pub(crate) async fn response(&self) -> ApduData {
        self.registry.responses[self.slot].wait().await
    }
}

impl<M: RawMutex> Drop for PendingRead<'_, M> {
    fn drop(&mut self) {
        self.registry.reads.lock(|r| r.borrow_mut()[self.slot] = ReadSlot::Free);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dpt::{Dpt1, Dpt9};
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    fn ga(main: u8, middle: u8, sub: u8) -> GroupAddress {
        GroupAddress::new(main, middle, sub).unwrap()
    }

    #[test]
    fn test_bindings_are_shared_and_counted() {
        let registry: Registry<NoopRawMutex> = Registry::new();
        let first = registry.bind(ga(1, 1, 1), Dpt1::Switch.into()).unwrap();
        let second = registry.bind(ga(1, 1, 1), Dpt1::Switch.into()).unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.binding_count(), 1);

        registry.unbind(first);
        assert_eq!(registry.dpt(ga(1, 1, 1)), Some(Dpt1::Switch.into()));
        registry.unbind(second);
        assert_eq!(registry.dpt(ga(1, 1, 1)), None);
    }

    #[test]
    fn test_reference_count_saturates() {
        let registry: Registry<NoopRawMutex> = Registry::new();
        let id = registry.bind(ga(1, 1, 1), Dpt1::Switch.into()).unwrap();
        registry.bindings.lock(|b| {
            if let Some(binding) = b.borrow_mut()[id.0].as_mut() {
                binding.refs = u16::MAX;
            }
        });

        assert!(matches!(
            registry.bind(ga(1, 1, 1), Dpt1::Switch.into()),
            Err(KnxError::Tunneling(_))
        ));
        assert_eq!(registry.bindings.lock(|b| b.borrow()[id.0].as_ref().map(|b| b.refs)), Some(u16::MAX));
    }

    #[test]
    fn test_conflicting_type() {
        let registry: Registry<NoopRawMutex> = Registry::new();
        registry.bind(ga(1, 1, 1), Dpt1::Switch.into()).unwrap();
        assert!(registry.bind(ga(1, 1, 1), Dpt9::Temperature.into()).unwrap_err().is_dpt());
    }

    #[test]
    fn test_registry_full() {
        let registry: Registry<NoopRawMutex> = Registry::new();
        for sub in 0..MAX_BINDINGS as u8 {
            registry.bind(ga(2, 0, sub), Dpt1::Switch.into()).unwrap();
        }
        assert!(matches!(
            registry.bind(ga(3, 0, 0), Dpt1::Switch.into()),
            Err(KnxError::Tunneling(_))
        ));
    }

    #[test]
    fn test_write_updates_value() {
        let registry: Registry<NoopRawMutex> = Registry::new();
        let id = registry.bind(ga(1, 1, 1), Dpt1::Switch.into()).unwrap();

        let value = registry.on_group_telegram(GroupService::Write, ga(1, 1, 1), &ApduData::packed(1));
        assert_eq!(value, Some(DptValue::Bool(true)));
        assert_eq!(registry.value(id), Some(DptValue::Bool(true)));

        // unbound addresses decode to nothing
        assert_eq!(
            registry.on_group_telegram(GroupService::Write, ga(1, 1, 2), &ApduData::packed(1)),
            None
        );
    }

    #[test]
    fn test_response_completes_matching_reads() {
        let registry: Registry<NoopRawMutex> = Registry::new();
        let first = registry.begin_read(ga(1, 2, 3)).unwrap();
        let second = registry.begin_read(ga(1, 2, 3)).unwrap();
        let other = registry.begin_read(ga(1, 2, 4)).unwrap();

        let data = ApduData::from_slice(&[0x0C, 0x1A]).unwrap();
        registry.on_group_telegram(GroupService::Response, ga(1, 2, 3), &data);

        assert_eq!(block_on(first.response()), data);
        assert_eq!(block_on(second.response()), data);
        drop((first, second));
        assert_eq!(registry.pending_reads(), 1);
        drop(other);
        assert_eq!(registry.pending_reads(), 0);
    }

    #[test]
    fn test_too_many_reads() {
        let registry: Registry<NoopRawMutex> = Registry::new();
        let _reads: [_; MAX_PENDING_READS] = core::array::from_fn(|_| registry.begin_read(ga(1, 1, 1)).unwrap());
        assert!(registry.begin_read(ga(1, 1, 1)).is_err());
    }
}
