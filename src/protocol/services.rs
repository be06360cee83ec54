//! KNXnet/IP tunneling service bodies.
//!
//! Each struct is the body of one service type; [`Frame`](crate::protocol::frame::Frame)
//! adds the header.
//!
//! ## Protocol Flow
//!
//! ```text
//! Client                          Gateway
//!   |                                |
//!   |------- CONNECT_REQUEST ------->|
//!   |<------ CONNECT_RESPONSE -------|
//!   |                                |
//!   |------ TUNNELING_REQUEST ------>|
//!   |<------ TUNNELING_ACK ----------|
//!   |                                |
//!   |<----- TUNNELING_REQUEST -------|  (bus traffic)
//!   |------- TUNNELING_ACK --------->|
//!   |                                |
//!   |--- CONNECTIONSTATE_REQUEST --->|  (every 60s)
//!   |<-- CONNECTIONSTATE_RESPONSE ---|
//!   |                                |
//!   |------ DISCONNECT_REQUEST ----->|
//!   |<----- DISCONNECT_RESPONSE -----|
//! ```

use crate::addressing::IndividualAddress;
use crate::error::{KnxError, Result};
use crate::protocol::cemi::{CemiBuffer, CemiFrame};
use crate::protocol::constants::{ServiceType, CONNECTION_HEADER_SIZE, TUNNEL_CONNECTION, TUNNEL_LINKLAYER};
use crate::protocol::frame::Hpai;

/// Body encoding shared by every service.
pub trait ServiceBody: Sized {
    const SERVICE: ServiceType;

    /// Encode the body into `buf`, returning its length.
    fn encode_body(&self, buf: &mut [u8]) -> Result<usize>;

    /// Decode a body; fails with `TruncatedBody` when it is too short.
    fn decode_body(body: &[u8]) -> Result<Self>;
}

#[inline]
fn body_slice(buf: &mut [u8], len: usize) -> Result<&mut [u8]> {
    buf.get_mut(..len).ok_or_else(KnxError::buffer_too_small)
}

/// Connection Request Information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cri {
    pub connection_type: u8,
    pub knx_layer: u8,
}

impl Cri {
    pub const SIZE: usize = 4;

    pub const TUNNEL_LINK_LAYER: Self = Self {
        connection_type: TUNNEL_CONNECTION,
        knx_layer: TUNNEL_LINKLAYER,
    };

    fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        body_slice(buf, Self::SIZE)?.copy_from_slice(&[Self::SIZE as u8, self.connection_type, self.knx_layer, 0]);
        Ok(Self::SIZE)
    }

    fn parse(data: &[u8]) -> Result<Self> {
        match *data {
            [4, connection_type, knx_layer, _, ..] => Ok(Self {
                connection_type,
                knx_layer,
            }),
            _ => Err(KnxError::truncated_body()),
        }
    }
}

/// Connection Response Data: carries the individual address the gateway
/// assigned to the tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Crd {
    pub connection_type: u8,
    pub individual_address: IndividualAddress,
}

impl Crd {
    pub const SIZE: usize = 4;

    pub const fn tunnel(individual_address: IndividualAddress) -> Self {
        Self {
            connection_type: TUNNEL_CONNECTION,
            individual_address,
        }
    }

    fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let out = body_slice(buf, Self::SIZE)?;
        out[0] = Self::SIZE as u8;
        out[1] = self.connection_type;
        out[2..4].copy_from_slice(&self.individual_address.raw().to_be_bytes());
        Ok(Self::SIZE)
    }

    fn parse(data: &[u8]) -> Result<Self> {
        match *data {
            [4, connection_type, hi, lo, ..] => Ok(Self {
                connection_type,
                individual_address: IndividualAddress::from(u16::from_be_bytes([hi, lo])),
            }),
            _ => Err(KnxError::truncated_body()),
        }
    }
}

/// `CONNECT_REQUEST` (0x0205)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectRequest {
    pub control_endpoint: Hpai,
    pub data_endpoint: Hpai,
    pub cri: Cri,
}

impl ConnectRequest {
    /// Link layer tunnel request.
    pub const fn new(control_endpoint: Hpai, data_endpoint: Hpai) -> Self {
        Self {
            control_endpoint,
            data_endpoint,
            cri: Cri::TUNNEL_LINK_LAYER,
        }
    }
}

impl ServiceBody for ConnectRequest {
    const SERVICE: ServiceType = ServiceType::ConnectRequest;

    fn encode_body(&self, buf: &mut [u8]) -> Result<usize> {
        let mut offset = self.control_endpoint.encode(buf)?;
        offset += self.data_endpoint.encode(&mut buf[offset..])?;
        offset += self.cri.encode(&mut buf[offset..])?;
        Ok(offset)
    }

    fn decode_body(body: &[u8]) -> Result<Self> {
        let control_endpoint = Hpai::parse(body)?;
        let data_endpoint = Hpai::parse(&body[Hpai::SIZE..])?;
        let cri = Cri::parse(&body[2 * Hpai::SIZE..])?;
        Ok(Self {
            control_endpoint,
            data_endpoint,
            cri,
        })
    }
}

/// `CONNECT_RESPONSE` (0x0206)
///
/// Error responses may stop after the status octet, so the data endpoint and
/// CRD are optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectResponse {
    pub channel_id: u8,
    pub status: u8,
    pub data_endpoint: Option<Hpai>,
    pub crd: Option<Crd>,
}

impl ConnectResponse {
    #[inline]
    pub const fn is_ok(&self) -> bool {
        self.status == 0
    }

    /// Individual address the gateway assigned, if it sent a CRD.
    pub fn assigned_address(&self) -> Option<IndividualAddress> {
        self.crd.map(|crd| crd.individual_address)
    }
}

impl ServiceBody for ConnectResponse {
    const SERVICE: ServiceType = ServiceType::ConnectResponse;

    fn encode_body(&self, buf: &mut [u8]) -> Result<usize> {
        body_slice(buf, 2)?.copy_from_slice(&[self.channel_id, self.status]);
        let mut offset = 2;
        if let (Some(hpai), Some(crd)) = (self.data_endpoint, self.crd) {
            offset += hpai.encode(&mut buf[offset..])?;
            offset += crd.encode(&mut buf[offset..])?;
        }
        Ok(offset)
    }

    fn decode_body(body: &[u8]) -> Result<Self> {
        let [channel_id, status, rest @ ..] = body else {
            return Err(KnxError::truncated_body());
        };

        let (data_endpoint, crd) = if *status == 0 || !rest.is_empty() {
            let hpai = Hpai::parse(rest)?;
            let crd = Crd::parse(&rest[Hpai::SIZE..])?;
            (Some(hpai), Some(crd))
        } else {
            (None, None)
        };

        Ok(Self {
            channel_id: *channel_id,
            status: *status,
            data_endpoint,
            crd,
        })
    }
}

/// Body shared by CONNECTIONSTATE_REQUEST and DISCONNECT_REQUEST:
/// `[channel][reserved][control HPAI]`.
fn encode_channel_request(channel_id: u8, control_endpoint: &Hpai, buf: &mut [u8]) -> Result<usize> {
    body_slice(buf, 2)?.copy_from_slice(&[channel_id, 0]);
    Ok(2 + control_endpoint.encode(&mut buf[2..])?)
}

fn decode_channel_request(body: &[u8]) -> Result<(u8, Hpai)> {
    let [channel_id, _, rest @ ..] = body else {
        return Err(KnxError::truncated_body());
    };
    Ok((*channel_id, Hpai::parse(rest)?))
}

/// Body shared by the two channel responses: `[channel][status]`.
fn decode_channel_response(body: &[u8]) -> Result<(u8, u8)> {
    match *body {
        [channel_id, status, ..] => Ok((channel_id, status)),
        _ => Err(KnxError::truncated_body()),
    }
}

/// `CONNECTIONSTATE_REQUEST` (0x0207): heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectionStateRequest {
    pub channel_id: u8,
    pub control_endpoint: Hpai,
}

impl ServiceBody for ConnectionStateRequest {
    const SERVICE: ServiceType = ServiceType::ConnectionStateRequest;

    fn encode_body(&self, buf: &mut [u8]) -> Result<usize> {
        encode_channel_request(self.channel_id, &self.control_endpoint, buf)
    }

    fn decode_body(body: &[u8]) -> Result<Self> {
        let (channel_id, control_endpoint) = decode_channel_request(body)?;
        Ok(Self {
            channel_id,
            control_endpoint,
        })
    }
}

/// `CONNECTIONSTATE_RESPONSE` (0x0208)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectionStateResponse {
    pub channel_id: u8,
    pub status: u8,
}

impl ServiceBody for ConnectionStateResponse {
    const SERVICE: ServiceType = ServiceType::ConnectionStateResponse;

    fn encode_body(&self, buf: &mut [u8]) -> Result<usize> {
        body_slice(buf, 2)?.copy_from_slice(&[self.channel_id, self.status]);
        Ok(2)
    }

    fn decode_body(body: &[u8]) -> Result<Self> {
        let (channel_id, status) = decode_channel_response(body)?;
        Ok(Self { channel_id, status })
    }
}

/// `DISCONNECT_REQUEST` (0x0209), sent by either side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DisconnectRequest {
    pub channel_id: u8,
    pub control_endpoint: Hpai,
}

impl ServiceBody for DisconnectRequest {
    const SERVICE: ServiceType = ServiceType::DisconnectRequest;

    fn encode_body(&self, buf: &mut [u8]) -> Result<usize> {
        encode_channel_request(self.channel_id, &self.control_endpoint, buf)
    }

    fn decode_body(body: &[u8]) -> Result<Self> {
        let (channel_id, control_endpoint) = decode_channel_request(body)?;
        Ok(Self {
            channel_id,
            control_endpoint,
        })
    }
}

/// `DISCONNECT_RESPONSE` (0x020A)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DisconnectResponse {
    pub channel_id: u8,
    pub status: u8,
}

impl ServiceBody for DisconnectResponse {
    const SERVICE: ServiceType = ServiceType::DisconnectResponse;

    fn encode_body(&self, buf: &mut [u8]) -> Result<usize> {
        body_slice(buf, 2)?.copy_from_slice(&[self.channel_id, self.status]);
        Ok(2)
    }

    fn decode_body(body: &[u8]) -> Result<Self> {
        let (channel_id, status) = decode_channel_response(body)?;
        Ok(Self { channel_id, status })
    }
}

/// Connection header of tunneling requests and acks:
/// `[structure length = 4][channel][sequence][reserved | status]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectionHeader {
    pub channel_id: u8,
    pub sequence: u8,
    pub status: u8,
}

impl ConnectionHeader {
    pub const SIZE: usize = CONNECTION_HEADER_SIZE as usize;

    fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        body_slice(buf, Self::SIZE)?.copy_from_slice(&[
            CONNECTION_HEADER_SIZE,
            self.channel_id,
            self.sequence,
            self.status,
        ]);
        Ok(Self::SIZE)
    }

    fn parse(data: &[u8]) -> Result<Self> {
        match *data {
            [CONNECTION_HEADER_SIZE, channel_id, sequence, status, ..] => Ok(Self {
                channel_id,
                sequence,
                status,
            }),
            _ => Err(KnxError::truncated_body()),
        }
    }
}

/// `TUNNELING_REQUEST` (0x0420)
///
/// The cEMI message is kept as raw bytes: the receiver has to ack the request
/// even when the cEMI itself cannot be parsed. Use [`TunnelingRequest::cemi`]
/// to decode it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TunnelingRequest {
    pub channel_id: u8,
    pub sequence: u8,
    pub cemi: CemiBuffer,
}

impl TunnelingRequest {
    pub fn new(channel_id: u8, sequence: u8, cemi: &CemiFrame) -> Result<Self> {
        Ok(Self {
            channel_id,
            sequence,
            cemi: cemi.to_bytes()?,
        })
    }

    /// Parse the carried cEMI message.
    pub fn cemi(&self) -> Result<CemiFrame> {
        CemiFrame::parse(&self.cemi)
    }

    /// The ack for this request.
    pub const fn ack(&self, status: u8) -> TunnelingAck {
        TunnelingAck {
            channel_id: self.channel_id,
            sequence: self.sequence,
            status,
        }
    }
}

impl ServiceBody for TunnelingRequest {
    const SERVICE: ServiceType = ServiceType::TunnelingRequest;

    fn encode_body(&self, buf: &mut [u8]) -> Result<usize> {
        let header = ConnectionHeader {
            channel_id: self.channel_id,
            sequence: self.sequence,
            status: 0,
        };
        let offset = header.encode(buf)?;
        let len = offset + self.cemi.len();
        body_slice(buf, len)?[offset..].copy_from_slice(&self.cemi);
        Ok(len)
    }

    fn decode_body(body: &[u8]) -> Result<Self> {
        let header = ConnectionHeader::parse(body)?;
        let cemi = CemiBuffer::from_slice(&body[ConnectionHeader::SIZE..]).map_err(|_| KnxError::invalid_cemi())?;
        Ok(Self {
            channel_id: header.channel_id,
            sequence: header.sequence,
            cemi,
        })
    }
}

/// `TUNNELING_ACK` (0x0421)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TunnelingAck {
    pub channel_id: u8,
    pub sequence: u8,
    pub status: u8,
}

impl TunnelingAck {
    #[inline]
    pub const fn is_ok(&self) -> bool {
        self.status == 0
    }
}

impl ServiceBody for TunnelingAck {
    const SERVICE: ServiceType = ServiceType::TunnelingAck;

    fn encode_body(&self, buf: &mut [u8]) -> Result<usize> {
        ConnectionHeader {
            channel_id: self.channel_id,
            sequence: self.sequence,
            status: self.status,
        }
        .encode(buf)
    }

    fn decode_body(body: &[u8]) -> Result<Self> {
        let header = ConnectionHeader::parse(body)?;
        Ok(Self {
            channel_id: header.channel_id,
            sequence: header.sequence,
            status: header.status,
        })
    }
}
