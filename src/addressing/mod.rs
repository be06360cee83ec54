//! KNX addressing: individual (device) and group (function) addresses.
//!
//! Both kinds are 16-bit values. [`KnxAddress`] carries either one, as found
//! in the destination field of a cEMI frame, and [`parse_address`] parses a
//! string for an explicitly requested kind.

pub mod group;
pub mod individual;

pub use group::GroupAddress;
pub use individual::IndividualAddress;

use crate::error::{KnxError, Result};
use core::fmt;

/// Which address space a string or a raw value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressKind {
    Individual,
    Group,
}

/// An individual or a group address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum KnxAddress {
    Individual(IndividualAddress),
    Group(GroupAddress),
}

impl KnxAddress {
    /// Interpret a raw value in the given address space.
    pub fn from_raw(raw: u16, kind: AddressKind) -> Self {
        match kind {
            AddressKind::Individual => KnxAddress::Individual(IndividualAddress::from(raw)),
            AddressKind::Group => KnxAddress::Group(GroupAddress::from(raw)),
        }
    }

    /// Raw 16-bit value
    pub const fn raw(self) -> u16 {
        match self {
            KnxAddress::Individual(a) => a.raw(),
            KnxAddress::Group(a) => a.raw(),
        }
    }

    /// Address space of this address
    pub const fn kind(self) -> AddressKind {
        match self {
            KnxAddress::Individual(_) => AddressKind::Individual,
            KnxAddress::Group(_) => AddressKind::Group,
        }
    }

    /// The group address, if this is one.
    pub const fn as_group(self) -> Option<GroupAddress> {
        match self {
            KnxAddress::Group(a) => Some(a),
            KnxAddress::Individual(_) => None,
        }
    }
}

impl From<GroupAddress> for KnxAddress {
    fn from(addr: GroupAddress) -> Self {
        KnxAddress::Group(addr)
    }
}

impl From<IndividualAddress> for KnxAddress {
    fn from(addr: IndividualAddress) -> Self {
        KnxAddress::Individual(addr)
    }
}

impl fmt::Display for KnxAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KnxAddress::Individual(a) => fmt::Display::fmt(a, f),
            KnxAddress::Group(a) => fmt::Display::fmt(a, f),
        }
    }
}

/// Parse `s` as an address of the requested kind.
///
/// # Examples
///
/// ```
/// use knx_tunnel::addressing::{parse_address, AddressKind, KnxAddress};
///
/// let addr = parse_address("1/1/1", AddressKind::Group)?;
/// assert_eq!(addr.raw(), 0x0901);
/// assert!(parse_address("1/1/1", AddressKind::Individual).is_err());
/// # Ok::<(), knx_tunnel::KnxError>(())
/// ```
pub fn parse_address(s: &str, kind: AddressKind) -> Result<KnxAddress> {
    Ok(match kind {
        AddressKind::Individual => KnxAddress::Individual(s.parse()?),
        AddressKind::Group => KnxAddress::Group(s.parse()?),
    })
}

/// Split `s` on `separator` into 1 to 3 unsigned decimal fields.
///
/// Fields must be non-empty runs of ASCII digits that fit a `u16`.
pub(crate) fn parse_components(s: &str, separator: char) -> Result<heapless::Vec<u16, 3>> {
    let mut fields = heapless::Vec::new();

    for part in s.split(separator) {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(KnxError::invalid_address_format());
        }
        let value = part
            .parse::<u16>()
            .map_err(|_| KnxError::invalid_address_format())?;
        fields
            .push(value)
            .map_err(|_| KnxError::invalid_address_format())?;
    }

    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_by_kind() {
        let group = parse_address("1/2/3", AddressKind::Group).unwrap();
        assert_eq!(group, KnxAddress::Group(GroupAddress::new(1, 2, 3).unwrap()));
        assert_eq!(group.kind(), AddressKind::Group);

        let individual = parse_address("1.1.100", AddressKind::Individual).unwrap();
        assert_eq!(individual.raw(), 0x1164);
        assert_eq!(individual.as_group(), None);
    }

    #[test]
    fn test_dotted_group_is_not_individual() {
        let as_group = parse_address("1.1.99", AddressKind::Group).unwrap();
        let as_individual = parse_address("1.1.99", AddressKind::Individual).unwrap();
        // same text, different spaces
        assert_ne!(as_group, as_individual);
        assert_eq!(as_group.raw(), 0x0963);
        assert_eq!(as_individual.raw(), 0x1163);
    }

    #[test]
    fn test_display_depends_on_kind() {
        let raw = 0x0901;
        assert_eq!(format!("{}", KnxAddress::from_raw(raw, AddressKind::Group)), "1/1/1");
        assert_eq!(format!("{}", KnxAddress::from_raw(raw, AddressKind::Individual)), "0.9.1");
    }

    #[test]
    fn test_components_reject_overflow() {
        assert!(parse_components("70000/1", '/').is_err());
        assert_eq!(parse_components("1/2", '/').unwrap().as_slice(), &[1, 2]);
    }
}
