//! KNXnet/IP frame parsing and encoding.
//!
//! Every datagram exchanged with the gateway is one frame: a fixed 6-byte
//! header followed by a service-specific body.
//!
//! ## Frame Structure
//!
//! ```text
//! ┌─────────────────────────────┐
//! │  Header (6 bytes)           │
//! │  - Header Length: 0x06      │
//! │  - Protocol Version: 0x10   │
//! │  - Service Type: 2 bytes    │
//! │  - Total Length: 2 bytes    │
//! ├─────────────────────────────┤
//! │  Body (variable)            │
//! │  - Service-specific data    │
//! └─────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use knx_tunnel::protocol::frame::Frame;
//! use knx_tunnel::protocol::services::TunnelingAck;
//!
//! let ack = Frame::TunnelingAck(TunnelingAck { channel_id: 5, sequence: 3, status: 0 });
//! let bytes = ack.to_bytes()?;
//! assert_eq!(&bytes[..], &[0x06, 0x10, 0x04, 0x21, 0x00, 0x0A, 0x04, 0x05, 0x03, 0x00]);
//! assert_eq!(Frame::decode(&bytes)?, ack);
//! # Ok::<(), knx_tunnel::KnxError>(())
//! ```

use crate::error::{KnxError, Result};
use crate::net::{IpEndpoint, Ipv4Addr};
use crate::protocol::constants::{ServiceType, HEADER_SIZE_10, HPAI_SIZE, IPV4_UDP, KNXNETIP_VERSION_10, MAX_FRAME_SIZE};
use crate::protocol::services::{
    ConnectRequest, ConnectResponse, ConnectionStateRequest, ConnectionStateResponse, DisconnectRequest,
    DisconnectResponse, ServiceBody, TunnelingAck, TunnelingRequest,
};

/// Encoded frame.
pub type FrameBuffer = heapless::Vec<u8, MAX_FRAME_SIZE>;

/// KNXnet/IP frame header (6 bytes)
///
/// ```text
/// ┌──────────────┬──────────────┬─────────────────────┐
/// │ Header Len   │ Protocol Ver │  Service Type ID    │
/// │   (1 byte)   │   (1 byte)   │     (2 bytes)       │
/// ├──────────────┴──────────────┴─────────────────────┤
/// │           Total Length (2 bytes)                   │
/// └────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KnxnetIpHeader {
    pub service_type: ServiceType,
    /// Header plus body
    pub total_length: u16,
}

impl KnxnetIpHeader {
    pub const SIZE: usize = 6;

    pub const fn new(service_type: ServiceType, body_length: u16) -> Self {
        Self {
            service_type,
            total_length: body_length.saturating_add(Self::SIZE as u16),
        }
    }

    /// Parse and validate the header of a complete datagram.
    ///
    /// # Errors
    ///
    /// - `MalformedHeader` if the datagram is shorter than 6 bytes, the
    ///   header length or protocol version is wrong, or the total length
    ///   field does not match the datagram length
    /// - `UnknownServiceType` for services other than the tunneling set
    pub fn parse(data: &[u8]) -> Result<Self> {
        let [header_length, version, st_hi, st_lo, len_hi, len_lo, ..] = *data else {
            return Err(KnxError::malformed_header());
        };

        if header_length != HEADER_SIZE_10 || version != KNXNETIP_VERSION_10 {
            return Err(KnxError::malformed_header());
        }

        let total_length = u16::from_be_bytes([len_hi, len_lo]);
        if usize::from(total_length) != data.len() {
            return Err(KnxError::malformed_header());
        }

        let service_type =
            ServiceType::from_u16(u16::from_be_bytes([st_hi, st_lo])).ok_or_else(KnxError::unknown_service_type)?;

        Ok(Self {
            service_type,
            total_length,
        })
    }

    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let out = buf.get_mut(..Self::SIZE).ok_or_else(KnxError::buffer_too_small)?;
        out[0] = HEADER_SIZE_10;
        out[1] = KNXNETIP_VERSION_10;
        out[2..4].copy_from_slice(&self.service_type.to_u16().to_be_bytes());
        out[4..6].copy_from_slice(&self.total_length.to_be_bytes());
        Ok(Self::SIZE)
    }

    /// Body bytes announced by `total_length`; zero if it is shorter than a header.
    #[inline]
    pub const fn body_length(&self) -> usize {
        (self.total_length as usize).saturating_sub(Self::SIZE)
    }
}

/// Host Protocol Address Information (HPAI)
///
/// ```text
/// ┌──────────────┬──────────────┬─────────────────────┐
/// │ Structure Len│ Host Protocol│   IP Address        │
/// │   (1 byte)   │   (1 byte)   │   (4 bytes IPv4)    │
/// ├──────────────┴──────────────┴─────────────────────┤
/// │                Port (2 bytes)                      │
/// └────────────────────────────────────────────────────┘
/// ```
///
/// [`Hpai::UNSPECIFIED`] asks the gateway to answer to the datagram's source
/// address (NAT mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Hpai {
    pub host_protocol: u8,
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl Hpai {
    pub const SIZE: usize = HPAI_SIZE as usize;

    /// 0.0.0.0:0 over UDP
    pub const UNSPECIFIED: Self = Self::new(Ipv4Addr::UNSPECIFIED, 0);

    pub const fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self {
            host_protocol: IPV4_UDP,
            ip,
            port,
        }
    }

    /// Parse an HPAI at the start of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let [len, host_protocol, a, b, c, d, port_hi, port_lo, ..] = *data else {
            return Err(KnxError::truncated_body());
        };
        if len != HPAI_SIZE {
            return Err(KnxError::truncated_body());
        }

        Ok(Self {
            host_protocol,
            ip: Ipv4Addr::new(a, b, c, d),
            port: u16::from_be_bytes([port_hi, port_lo]),
        })
    }

    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let out = buf.get_mut(..Self::SIZE).ok_or_else(KnxError::buffer_too_small)?;
        out[0] = HPAI_SIZE;
        out[1] = self.host_protocol;
        out[2..6].copy_from_slice(&self.ip.octets());
        out[6..8].copy_from_slice(&self.port.to_be_bytes());
        Ok(Self::SIZE)
    }

    #[inline]
    pub const fn endpoint(&self) -> IpEndpoint {
        IpEndpoint::new(self.ip, self.port)
    }

    #[inline]
    pub fn is_unspecified(&self) -> bool {
        self.ip == Ipv4Addr::UNSPECIFIED && self.port == 0
    }
}

impl From<IpEndpoint> for Hpai {
    fn from(endpoint: IpEndpoint) -> Self {
        Self::new(endpoint.addr, endpoint.port)
    }
}

/// A decoded KNXnet/IP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Frame {
    ConnectRequest(ConnectRequest),
    ConnectResponse(ConnectResponse),
    ConnectionStateRequest(ConnectionStateRequest),
    ConnectionStateResponse(ConnectionStateResponse),
    DisconnectRequest(DisconnectRequest),
    DisconnectResponse(DisconnectResponse),
    TunnelingRequest(TunnelingRequest),
    TunnelingAck(TunnelingAck),
}

impl Frame {
    pub const fn service_type(&self) -> ServiceType {
        match self {
            Self::ConnectRequest(_) => ServiceType::ConnectRequest,
            Self::ConnectResponse(_) => ServiceType::ConnectResponse,
            Self::ConnectionStateRequest(_) => ServiceType::ConnectionStateRequest,
            Self::ConnectionStateResponse(_) => ServiceType::ConnectionStateResponse,
            Self::DisconnectRequest(_) => ServiceType::DisconnectRequest,
            Self::DisconnectResponse(_) => ServiceType::DisconnectResponse,
            Self::TunnelingRequest(_) => ServiceType::TunnelingRequest,
            Self::TunnelingAck(_) => ServiceType::TunnelingAck,
        }
    }

    /// Decode one complete datagram.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let header = KnxnetIpHeader::parse(data)?;
        let body = &data[KnxnetIpHeader::SIZE..];

        Ok(match header.service_type {
            ServiceType::ConnectRequest => Self::ConnectRequest(ConnectRequest::decode_body(body)?),
            ServiceType::ConnectResponse => Self::ConnectResponse(ConnectResponse::decode_body(body)?),
            ServiceType::ConnectionStateRequest => {
                Self::ConnectionStateRequest(ConnectionStateRequest::decode_body(body)?)
            }
            ServiceType::ConnectionStateResponse => {
                Self::ConnectionStateResponse(ConnectionStateResponse::decode_body(body)?)
            }
            ServiceType::DisconnectRequest => Self::DisconnectRequest(DisconnectRequest::decode_body(body)?),
            ServiceType::DisconnectResponse => Self::DisconnectResponse(DisconnectResponse::decode_body(body)?),
            ServiceType::TunnelingRequest => Self::TunnelingRequest(TunnelingRequest::decode_body(body)?),
            ServiceType::TunnelingAck => Self::TunnelingAck(TunnelingAck::decode_body(body)?),
        })
    }

    /// Encode header and body into `buf`, returning the frame length.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let body_buf = buf.get_mut(KnxnetIpHeader::SIZE..).ok_or_else(KnxError::buffer_too_small)?;
        let body_len = match self {
            Self::ConnectRequest(body) => body.encode_body(body_buf)?,
            Self::ConnectResponse(body) => body.encode_body(body_buf)?,
            Self::ConnectionStateRequest(body) => body.encode_body(body_buf)?,
            Self::ConnectionStateResponse(body) => body.encode_body(body_buf)?,
            Self::DisconnectRequest(body) => body.encode_body(body_buf)?,
            Self::DisconnectResponse(body) => body.encode_body(body_buf)?,
            Self::TunnelingRequest(body) => body.encode_body(body_buf)?,
            Self::TunnelingAck(body) => body.encode_body(body_buf)?,
        };

        KnxnetIpHeader::new(self.service_type(), body_len as u16).encode(buf)?;
        Ok(KnxnetIpHeader::SIZE + body_len)
    }

    /// Encode into an owned buffer.
    pub fn to_bytes(&self) -> Result<FrameBuffer> {
        let mut buf = [0u8; MAX_FRAME_SIZE];
        let len = self.encode(&mut buf)?;
        FrameBuffer::from_slice(&buf[..len]).map_err(|_| KnxError::buffer_too_small())
    }

    /// Channel the frame belongs to, if it carries one.
    pub fn channel_id(&self) -> Option<u8> {
        match self {
            Self::ConnectRequest(_) => None,
            Self::ConnectResponse(f) => Some(f.channel_id),
            Self::ConnectionStateRequest(f) => Some(f.channel_id),
            Self::ConnectionStateResponse(f) => Some(f.channel_id),
            Self::DisconnectRequest(f) => Some(f.channel_id),
            Self::DisconnectResponse(f) => Some(f.channel_id),
            Self::TunnelingRequest(f) => Some(f.channel_id),
            Self::TunnelingAck(f) => Some(f.channel_id),
        }
    }
}

macro_rules! frame_from_body {
    ($($body:ident),* $(,)?) => {
        $(
            impl From<$body> for Frame {
                #[inline]
                fn from(body: $body) -> Self {
                    Frame::$body(body)
                }
            }
        )*
    };
}

frame_from_body!(
    ConnectRequest,
    ConnectResponse,
    ConnectionStateRequest,
    ConnectionStateResponse,
    DisconnectRequest,
    DisconnectResponse,
    TunnelingRequest,
    TunnelingAck,
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::{GroupAddress, IndividualAddress};
    use crate::protocol::cemi::{ApduData, CemiFrame};
    use crate::protocol::services::{Crd, Cri};

    fn gateway_hpai() -> Hpai {
        Hpai::new(Ipv4Addr::new(192, 168, 1, 10), 3671)
    }

    #[test]
    fn test_header_parse() {
        let data = [0x06, 0x10, 0x02, 0x08, 0x00, 0x08, 0x05, 0x00];
        let header = KnxnetIpHeader::parse(&data).unwrap();
        assert_eq!(header.service_type, ServiceType::ConnectionStateResponse);
        assert_eq!(header.total_length, 8);
        assert_eq!(header.body_length(), 2);
    }

    #[test]
    fn test_header_length_bounds() {
        let short = KnxnetIpHeader {
            service_type: ServiceType::TunnelingAck,
            total_length: 4,
        };
        assert_eq!(short.body_length(), 0);
        assert_eq!(KnxnetIpHeader::new(ServiceType::TunnelingAck, u16::MAX).total_length, u16::MAX);
    }

    #[test]
    fn test_header_errors() {
        // too short
        assert!(Frame::decode(&[0x06, 0x10, 0x02]).unwrap_err().is_malformed_header());
        // wrong header length
        assert!(Frame::decode(&[0x05, 0x10, 0x02, 0x08, 0x00, 0x08, 0x05, 0x00]).unwrap_err().is_malformed_header());
        // wrong version
        assert!(Frame::decode(&[0x06, 0x20, 0x02, 0x08, 0x00, 0x08, 0x05, 0x00]).unwrap_err().is_malformed_header());
        // total length disagrees with datagram length
        assert!(Frame::decode(&[0x06, 0x10, 0x02, 0x08, 0x00, 0x09, 0x05, 0x00]).unwrap_err().is_malformed_header());
        assert!(Frame::decode(&[0x06, 0x10, 0x02, 0x08, 0x00, 0x08, 0x05, 0x00, 0x00]).unwrap_err().is_malformed_header());
    }

    #[test]
    fn test_unknown_service() {
        // SEARCH_REQUEST is valid KNXnet/IP but not a tunneling service
        let data = [0x06, 0x10, 0x02, 0x01, 0x00, 0x0E, 0x08, 0x01, 0, 0, 0, 0, 0, 0];
        assert!(Frame::decode(&data).unwrap_err().is_unknown_service_type());
    }

    #[test]
    fn test_truncated_bodies() {
        // connection state response without status
        assert!(Frame::decode(&[0x06, 0x10, 0x02, 0x08, 0x00, 0x07, 0x05]).unwrap_err().is_truncated_body());
        // tunneling ack with a 3-byte connection header
        assert!(Frame::decode(&[0x06, 0x10, 0x04, 0x21, 0x00, 0x09, 0x04, 0x05, 0x00]).unwrap_err().is_truncated_body());
        // successful connect response without HPAI and CRD
        assert!(Frame::decode(&[0x06, 0x10, 0x02, 0x06, 0x00, 0x08, 0x05, 0x00]).unwrap_err().is_truncated_body());
    }

    #[test]
    fn test_hpai_bytes() {
        let mut buf = [0u8; 8];
        assert_eq!(gateway_hpai().encode(&mut buf).unwrap(), 8);
        assert_eq!(buf, [0x08, 0x01, 192, 168, 1, 10, 0x0E, 0x57]);
        assert_eq!(Hpai::parse(&buf).unwrap(), gateway_hpai());
        assert!(Hpai::UNSPECIFIED.is_unspecified());
    }

    #[test]
    fn test_connect_request_bytes() {
        let frame = Frame::from(ConnectRequest::new(Hpai::UNSPECIFIED, Hpai::UNSPECIFIED));
        let bytes = frame.to_bytes().unwrap();
        assert_eq!(bytes.len(), 26);
        assert_eq!(&bytes[..6], &[0x06, 0x10, 0x02, 0x05, 0x00, 0x1A]);
        assert_eq!(&bytes[22..], &[0x04, 0x04, 0x02, 0x00]);
    }

    #[test]
    fn test_round_trip_every_service() {
        let cemi = CemiFrame::group_value_write(
            IndividualAddress::UNASSIGNED,
            GroupAddress::new(1, 1, 1).unwrap(),
            ApduData::packed(1),
        );

        let frames = [
            Frame::from(ConnectRequest {
                control_endpoint: gateway_hpai(),
                data_endpoint: Hpai::UNSPECIFIED,
                cri: Cri::TUNNEL_LINK_LAYER,
            }),
            Frame::from(ConnectResponse {
                channel_id: 5,
                status: 0,
                data_endpoint: Some(gateway_hpai()),
                crd: Some(Crd::tunnel("1.1.250".parse().unwrap())),
            }),
            Frame::from(ConnectResponse {
                channel_id: 0,
                status: 0x24,
                data_endpoint: None,
                crd: None,
            }),
            Frame::from(ConnectionStateRequest {
                channel_id: 5,
                control_endpoint: Hpai::UNSPECIFIED,
            }),
            Frame::from(ConnectionStateResponse { channel_id: 5, status: 0 }),
            Frame::from(DisconnectRequest {
                channel_id: 5,
                control_endpoint: gateway_hpai(),
            }),
            Frame::from(DisconnectResponse { channel_id: 5, status: 0 }),
            Frame::from(TunnelingRequest::new(5, 200, &cemi).unwrap()),
            Frame::from(TunnelingAck {
                channel_id: 5,
                sequence: 255,
                status: 0,
            }),
        ];

        for frame in frames {
            let bytes = frame.to_bytes().unwrap();
            assert_eq!(Frame::decode(&bytes).unwrap(), frame);
        }
    }

    #[test]
    fn test_encode_buffer_too_small() {
        let frame = Frame::from(ConnectRequest::new(Hpai::UNSPECIFIED, Hpai::UNSPECIFIED));
        let mut buf = [0u8; 20];
        assert!(frame.encode(&mut buf).unwrap_err().is_transport());
    }
}
