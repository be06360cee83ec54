//! Common External Message Interface (cEMI) frames.
//!
//! A tunneling request carries one cEMI message. On a link layer tunnel this
//! is always an `L_Data` service: `.req` from client to gateway, `.con` as the
//! gateway's local confirmation of that request, and `.ind` for every telegram
//! seen on the bus.
//!
//! ## Frame Structure
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ Message Code (1 byte)                    │
//! │ Additional Info Length (1 byte)          │
//! │ Additional Info (variable)               │
//! ├──────────────────────────────────────────┤
//! │ Control Field 1 (1 byte)                 │
//! │ Control Field 2 (1 byte)                 │
//! │ Source Address (2 bytes)                 │
//! │ Destination Address (2 bytes)            │
//! │ NPDU Length (1 byte)                     │
//! │ TPCI | APCI high (1 byte)                │
//! │ APCI low | 6-bit data (1 byte)           │
//! │ Data (variable)                          │
//! └──────────────────────────────────────────┘
//! ```
//!
//! The NPDU length counts the octets after the TPCI octet. Values of at most
//! 6 bits (DPT 1, DPT 3) are packed into the APCI octet and the length is 1.
//!
//! ## Example
//!
//! ```
//! use knx_tunnel::addressing::{GroupAddress, IndividualAddress};
//! use knx_tunnel::protocol::cemi::{ApduData, CemiFrame};
//!
//! let frame = CemiFrame::group_value_write(
//!     IndividualAddress::UNASSIGNED,
//!     GroupAddress::new(1, 1, 1)?,
//!     ApduData::packed(1),
//! );
//! let bytes = frame.to_bytes()?;
//! assert_eq!(&bytes[..], &[0x11, 0x00, 0xBC, 0xE0, 0x00, 0x00, 0x09, 0x01, 0x01, 0x00, 0x81]);
//! assert_eq!(CemiFrame::parse(&bytes)?, frame);
//! # Ok::<(), knx_tunnel::KnxError>(())
//! ```

use crate::addressing::{AddressKind, GroupAddress, IndividualAddress, KnxAddress};
use crate::error::{KnxError, Result};
use crate::protocol::constants::{CEMIMessageCode, Priority, MAX_CEMI_SIZE};

/// Largest application payload kept after the APCI octet.
pub const MAX_APDU_DATA: usize = 32;

/// Largest additional-info block kept.
pub const MAX_ADDITIONAL_INFO: usize = 16;

/// Encoded cEMI message.
pub type CemiBuffer = heapless::Vec<u8, MAX_CEMI_SIZE>;

// =============================================================================
// Application data
// =============================================================================

/// Application data of a group telegram.
///
/// `packed` data is a single value of at most 6 bits that travels inside the
/// APCI octet; otherwise the bytes follow the APCI octet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ApduData {
    bytes: heapless::Vec<u8, MAX_APDU_DATA>,
    packed: bool,
}

impl ApduData {
    /// No data (GroupValueRead).
    pub const fn empty() -> Self {
        Self {
            bytes: heapless::Vec::new(),
            packed: false,
        }
    }

    /// A value of at most 6 bits packed into the APCI octet.
    pub fn packed(value: u8) -> Self {
        let mut bytes = heapless::Vec::new();
        // capacity is well above 1
        let _ = bytes.push(value & 0x3F);
        Self { bytes, packed: true }
    }

    /// Data octets following the APCI octet.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let bytes = heapless::Vec::from_slice(data).map_err(|_| KnxError::invalid_cemi())?;
        Ok(Self { bytes, packed: false })
    }

    /// Data as bytes; a packed value is a single byte.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn is_packed(&self) -> bool {
        self.packed
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Octets this data adds after the APCI octet.
    #[inline]
    fn trailing_len(&self) -> usize {
        if self.packed { 0 } else { self.bytes.len() }
    }
}

// =============================================================================
// Control fields
// =============================================================================

/// Control Field 1: frame type, repeat, broadcast, priority, ack, confirm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlField1 {
    raw: u8,
}

impl From<u8> for ControlField1 {
    #[inline(always)]
    fn from(raw: u8) -> Self {
        Self { raw }
    }
}

impl ControlField1 {
    #[inline(always)]
    pub const fn raw(self) -> u8 {
        self.raw
    }

    /// Standard (true) or extended frame
    #[inline(always)]
    pub const fn is_standard_frame(self) -> bool {
        (self.raw & 0x80) != 0
    }

    #[inline(always)]
    pub const fn do_not_repeat(self) -> bool {
        (self.raw & 0x20) != 0
    }

    #[inline(always)]
    pub const fn priority(self) -> Priority {
        Priority::from_u8((self.raw >> 2) & 0x03)
    }

    /// Confirm flag: set in an L_Data.con when the bus transmission failed
    #[inline(always)]
    pub const fn has_error(self) -> bool {
        (self.raw & 0x01) != 0
    }

    pub const fn new(standard_frame: bool, do_not_repeat: bool, broadcast: bool, priority: Priority) -> Self {
        let mut raw = (priority.to_u8() & 0x03) << 2;
        if standard_frame {
            raw |= 0x80;
        }
        if do_not_repeat {
            raw |= 0x20;
        }
        if broadcast {
            raw |= 0x10;
        }
        Self { raw }
    }
}

impl Default for ControlField1 {
    /// 0xBC: standard frame, no repeat, broadcast, low priority
    #[inline]
    fn default() -> Self {
        Self::new(true, true, true, Priority::Low)
    }
}

/// Control Field 2: address type, hop count, extended frame format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlField2 {
    raw: u8,
}

impl From<u8> for ControlField2 {
    #[inline(always)]
    fn from(raw: u8) -> Self {
        Self { raw }
    }
}

impl ControlField2 {
    #[inline(always)]
    pub const fn raw(self) -> u8 {
        self.raw
    }

    #[inline(always)]
    pub const fn is_group_address(self) -> bool {
        (self.raw & 0x80) != 0
    }

    #[inline(always)]
    pub const fn hop_count(self) -> u8 {
        (self.raw >> 4) & 0x07
    }

    pub const fn new(is_group: bool, hop_count: u8) -> Self {
        let mut raw = (hop_count & 0x07) << 4;
        if is_group {
            raw |= 0x80;
        }
        Self { raw }
    }

    const fn with_group_flag(self, is_group: bool) -> Self {
        Self {
            raw: if is_group { self.raw | 0x80 } else { self.raw & 0x7F },
        }
    }
}

impl Default for ControlField2 {
    /// 0xE0: group destination, hop count 6
    #[inline]
    fn default() -> Self {
        Self::new(true, 6)
    }
}

// =============================================================================
// TPCI / APCI
// =============================================================================

/// Transport layer control (upper 6 bits of the TPCI octet).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Tpci {
    /// T_Data_Group / T_Data_Broadcast / T_Data_Individual
    UnnumberedData,
    /// T_Data_Connected
    NumberedData { sequence: u8 },
    /// T_Connect (code 0) / T_Disconnect (code 1)
    UnnumberedControl { code: u8 },
    /// T_ACK (code 2) / T_NAK (code 3)
    NumberedControl { sequence: u8, code: u8 },
}

impl Tpci {
    pub const fn from_byte(byte: u8) -> Self {
        let sequence = (byte >> 2) & 0x0F;
        let code = byte & 0x03;
        match byte >> 6 {
            0b00 => Self::UnnumberedData,
            0b01 => Self::NumberedData { sequence },
            0b10 => Self::UnnumberedControl { code },
            _ => Self::NumberedControl { sequence, code },
        }
    }

    /// TPCI bits; data variants leave the low 2 bits for the APCI.
    pub const fn to_byte(self) -> u8 {
        match self {
            Self::UnnumberedData => 0x00,
            Self::NumberedData { sequence } => 0x40 | ((sequence & 0x0F) << 2),
            Self::UnnumberedControl { code } => 0x80 | (code & 0x03),
            Self::NumberedControl { sequence, code } => 0xC0 | ((sequence & 0x0F) << 2) | (code & 0x03),
        }
    }

    pub const fn is_data(self) -> bool {
        matches!(self, Self::UnnumberedData | Self::NumberedData { .. })
    }
}

/// The group services a telegram can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GroupService {
    Read,
    Response,
    Write,
}

/// Application layer control: 10-bit service code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Apci {
    GroupValueRead,
    GroupValueResponse,
    GroupValueWrite,
    /// Any other service, as its 10-bit code
    Other(u16),
}

impl Apci {
    pub const fn from_u16(code: u16) -> Self {
        match code & 0x03FF {
            0x000 => Self::GroupValueRead,
            0x040 => Self::GroupValueResponse,
            0x080 => Self::GroupValueWrite,
            other => Self::Other(other),
        }
    }

    pub const fn to_u16(self) -> u16 {
        match self {
            Self::GroupValueRead => 0x000,
            Self::GroupValueResponse => 0x040,
            Self::GroupValueWrite => 0x080,
            Self::Other(code) => code & 0x03FF,
        }
    }

    pub const fn group_service(self) -> Option<GroupService> {
        match self {
            Self::GroupValueRead => Some(GroupService::Read),
            Self::GroupValueResponse => Some(GroupService::Response),
            Self::GroupValueWrite => Some(GroupService::Write),
            Self::Other(_) => None,
        }
    }
}

impl From<GroupService> for Apci {
    fn from(service: GroupService) -> Self {
        match service {
            GroupService::Read => Apci::GroupValueRead,
            GroupService::Response => Apci::GroupValueResponse,
            GroupService::Write => Apci::GroupValueWrite,
        }
    }
}

// =============================================================================
// L_Data
// =============================================================================

/// `L_Data` service information.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LData {
    pub ctrl1: ControlField1,
    /// The group flag is derived from `destination` when encoding.
    pub ctrl2: ControlField2,
    pub source: IndividualAddress,
    pub destination: KnxAddress,
    pub tpci: Tpci,
    /// `None` for transport control telegrams without an APDU
    pub apci: Option<Apci>,
    pub data: ApduData,
}

impl LData {
    /// Fixed part before the TPDU: ctrl1, ctrl2, source, destination, length.
    const HEADER_SIZE: usize = 7;

    /// Group service and group destination, for group telegrams.
    pub fn group_service(&self) -> Option<(GroupService, GroupAddress)> {
        let service = self.apci?.group_service()?;
        Some((service, self.destination.as_group()?))
    }

    fn encoded_len(&self) -> usize {
        let tpdu = match self.apci {
            None => 1,
            Some(_) => 2 + self.data.trailing_len(),
        };
        Self::HEADER_SIZE + tpdu
    }

    fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let len = self.encoded_len();
        if buf.len() < len {
            return Err(KnxError::buffer_too_small());
        }

        let is_group = matches!(self.destination, KnxAddress::Group(_));
        buf[0] = self.ctrl1.raw();
        buf[1] = self.ctrl2.with_group_flag(is_group).raw();
        buf[2..4].copy_from_slice(&self.source.raw().to_be_bytes());
        buf[4..6].copy_from_slice(&self.destination.raw().to_be_bytes());

        let tpci = self.tpci.to_byte();
        match self.apci {
            None => {
                buf[6] = 0;
                buf[7] = tpci;
            }
            Some(apci) => {
                let code = apci.to_u16();
                buf[6] = (len - Self::HEADER_SIZE - 1) as u8;
                buf[7] = (tpci & 0xFC) | (code >> 8) as u8;
                buf[8] = (code & 0xFF) as u8;
                let data = self.data.as_bytes();
                if self.data.is_packed() {
                    buf[8] |= data[0] & 0x3F;
                } else {
                    buf[9..len].copy_from_slice(data);
                }
            }
        }

        Ok(len)
    }

    fn parse(data: &[u8]) -> Result<Self> {
        let [ctrl1, ctrl2, src_hi, src_lo, dst_hi, dst_lo, npdu_len, tpdu @ ..] = data else {
            return Err(KnxError::invalid_cemi());
        };

        let ctrl2 = ControlField2::from(*ctrl2);
        let kind = if ctrl2.is_group_address() {
            AddressKind::Group
        } else {
            AddressKind::Individual
        };
        let npdu_len = usize::from(*npdu_len);
        let tpdu = tpdu.get(..=npdu_len).ok_or_else(KnxError::invalid_cemi)?;
        let tpci_byte = tpdu[0];

        let (apci, payload) = match tpdu {
            [_] => (None, ApduData::empty()),
            [_, apci_low] => {
                let apci = Apci::from_u16((u16::from(tpci_byte & 0x03) << 8) | u16::from(apci_low & 0xC0));
                let packed = apci_low & 0x3F;
                let payload = if apci == Apci::GroupValueRead && packed == 0 {
                    ApduData::empty()
                } else {
                    ApduData::packed(packed)
                };
                (Some(apci), payload)
            }
            [_, apci_low, rest @ ..] => {
                let apci = Apci::from_u16((u16::from(tpci_byte & 0x03) << 8) | u16::from(*apci_low));
                (Some(apci), ApduData::from_slice(rest)?)
            }
            [] => return Err(KnxError::invalid_cemi()),
        };

        let tpci = if apci.is_some() {
            Tpci::from_byte(tpci_byte & 0xFC)
        } else {
            Tpci::from_byte(tpci_byte)
        };

        Ok(Self {
            ctrl1: ControlField1::from(*ctrl1),
            ctrl2,
            source: IndividualAddress::from(u16::from_be_bytes([*src_hi, *src_lo])),
            destination: KnxAddress::from_raw(u16::from_be_bytes([*dst_hi, *dst_lo]), kind),
            tpci,
            apci,
            data: payload,
        })
    }
}

// =============================================================================
// cEMI frame
// =============================================================================

/// A complete cEMI message as carried in a tunneling request.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CemiFrame {
    pub message_code: CEMIMessageCode,
    pub additional_info: heapless::Vec<u8, MAX_ADDITIONAL_INFO>,
    pub ldata: LData,
}

impl CemiFrame {
    /// Build an L_Data.req group telegram with default control fields.
    pub fn group_request(source: IndividualAddress, destination: GroupAddress, service: GroupService, data: ApduData) -> Self {
        Self {
            message_code: CEMIMessageCode::LDataReq,
            additional_info: heapless::Vec::new(),
            ldata: LData {
                ctrl1: ControlField1::default(),
                ctrl2: ControlField2::default(),
                source,
                destination: KnxAddress::Group(destination),
                tpci: Tpci::UnnumberedData,
                apci: Some(Apci::from(service)),
                data,
            },
        }
    }

    pub fn group_value_read(source: IndividualAddress, destination: GroupAddress) -> Self {
        Self::group_request(source, destination, GroupService::Read, ApduData::empty())
    }

    pub fn group_value_write(source: IndividualAddress, destination: GroupAddress, data: ApduData) -> Self {
        Self::group_request(source, destination, GroupService::Write, data)
    }

    pub fn group_value_response(source: IndividualAddress, destination: GroupAddress, data: ApduData) -> Self {
        Self::group_request(source, destination, GroupService::Response, data)
    }

    /// Parse a cEMI message. Trailing bytes after the TPDU are ignored.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let [code, info_len, rest @ ..] = data else {
            return Err(KnxError::invalid_cemi());
        };

        let message_code = CEMIMessageCode::from_u8(*code).ok_or_else(KnxError::unsupported_message_code)?;
        let info_len = usize::from(*info_len);
        let info = rest.get(..info_len).ok_or_else(KnxError::invalid_cemi)?;

        Ok(Self {
            message_code,
            additional_info: heapless::Vec::from_slice(info).map_err(|_| KnxError::invalid_cemi())?,
            ldata: LData::parse(&rest[info_len..])?,
        })
    }

    /// Encode into `buf`, returning the number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let info_len = self.additional_info.len();
        if buf.len() < 2 + info_len {
            return Err(KnxError::buffer_too_small());
        }

        buf[0] = self.message_code.to_u8();
        buf[1] = info_len as u8;
        buf[2..2 + info_len].copy_from_slice(&self.additional_info);
        let ldata_len = self.ldata.encode(&mut buf[2 + info_len..])?;
        Ok(2 + info_len + ldata_len)
    }

    /// Encode into an owned buffer.
    pub fn to_bytes(&self) -> Result<CemiBuffer> {
        let mut buf = [0u8; MAX_CEMI_SIZE];
        let len = self.encode(&mut buf)?;
        CemiBuffer::from_slice(&buf[..len]).map_err(|_| KnxError::buffer_too_small())
    }

    #[inline]
    pub fn is_indication(&self) -> bool {
        self.message_code == CEMIMessageCode::LDataInd
    }

    #[inline]
    pub fn is_confirmation(&self) -> bool {
        self.message_code == CEMIMessageCode::LDataCon
    }
}
