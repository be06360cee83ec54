//! KNXnet/IP tunneling constants and service type identifiers.

/// KNXnet/IP protocol version 1.0
pub const KNXNETIP_VERSION_10: u8 = 0x10;

/// Header structure length for version 1.0
pub const HEADER_SIZE_10: u8 = 0x06;

/// Default KNXnet/IP gateway port
pub const KNXNETIP_DEFAULT_PORT: u16 = 3671;

/// Largest datagram the codec produces or accepts
pub const MAX_FRAME_SIZE: usize = 256;

/// Largest cEMI payload carried in a tunneling request
pub const MAX_CEMI_SIZE: usize = 64;

/// Structure length of an HPAI
pub const HPAI_SIZE: u8 = 8;

/// Structure length of the tunneling connection header
pub const CONNECTION_HEADER_SIZE: u8 = 4;

// =============================================================================
// Service Type Identifiers
// =============================================================================

pub const SERVICE_CONNECT_REQUEST: u16 = 0x0205;
pub const SERVICE_CONNECT_RESPONSE: u16 = 0x0206;
pub const SERVICE_CONNECTIONSTATE_REQUEST: u16 = 0x0207;
pub const SERVICE_CONNECTIONSTATE_RESPONSE: u16 = 0x0208;
pub const SERVICE_DISCONNECT_REQUEST: u16 = 0x0209;
pub const SERVICE_DISCONNECT_RESPONSE: u16 = 0x020A;
pub const SERVICE_TUNNELING_REQUEST: u16 = 0x0420;
pub const SERVICE_TUNNELING_ACK: u16 = 0x0421;

/// The services a tunneling client exchanges with its gateway.
///
/// Anything else on the wire (search, routing, secure wrappers) is reported
/// as an unknown service type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum ServiceType {
    ConnectRequest = SERVICE_CONNECT_REQUEST,
    ConnectResponse = SERVICE_CONNECT_RESPONSE,
    ConnectionStateRequest = SERVICE_CONNECTIONSTATE_REQUEST,
    ConnectionStateResponse = SERVICE_CONNECTIONSTATE_RESPONSE,
    DisconnectRequest = SERVICE_DISCONNECT_REQUEST,
    DisconnectResponse = SERVICE_DISCONNECT_RESPONSE,
    TunnelingRequest = SERVICE_TUNNELING_REQUEST,
    TunnelingAck = SERVICE_TUNNELING_ACK,
}

impl ServiceType {
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            SERVICE_CONNECT_REQUEST => Some(Self::ConnectRequest),
            SERVICE_CONNECT_RESPONSE => Some(Self::ConnectResponse),
            SERVICE_CONNECTIONSTATE_REQUEST => Some(Self::ConnectionStateRequest),
            SERVICE_CONNECTIONSTATE_RESPONSE => Some(Self::ConnectionStateResponse),
            SERVICE_DISCONNECT_REQUEST => Some(Self::DisconnectRequest),
            SERVICE_DISCONNECT_RESPONSE => Some(Self::DisconnectResponse),
            SERVICE_TUNNELING_REQUEST => Some(Self::TunnelingRequest),
            SERVICE_TUNNELING_ACK => Some(Self::TunnelingAck),
            _ => None,
        }
    }

    pub const fn to_u16(self) -> u16 {
        self as u16
    }
}

// =============================================================================
// Connection Type and Host Protocol Codes
// =============================================================================

/// Tunnel connection (CRI/CRD connection type)
pub const TUNNEL_CONNECTION: u8 = 0x04;

/// Tunnel on the data link layer (CRI KNX layer)
pub const TUNNEL_LINKLAYER: u8 = 0x02;

/// IPv4 over UDP (HPAI host protocol code)
pub const IPV4_UDP: u8 = 0x01;

// =============================================================================
// Status Codes
// =============================================================================

pub const E_NO_ERROR: u8 = 0x00;

/// Unknown channel ID (connection state / disconnect / ack)
pub const E_CONNECTION_ID: u8 = 0x21;

pub const E_CONNECTION_TYPE: u8 = 0x22;

pub const E_CONNECTION_OPTION: u8 = 0x23;

pub const E_NO_MORE_CONNECTIONS: u8 = 0x24;

/// Out-of-order sequence number in a tunneling ack
pub const E_SEQUENCE_NUMBER: u8 = 0x04;

pub const E_DATA_CONNECTION: u8 = 0x26;

pub const E_KNX_CONNECTION: u8 = 0x27;

pub const E_TUNNELLING_LAYER: u8 = 0x29;

// =============================================================================
// cEMI Message Codes
// =============================================================================

/// cEMI message codes used on a link layer tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CEMIMessageCode {
    /// Data request from client to bus
    LDataReq = 0x11,
    /// Data indication from bus to client
    LDataInd = 0x29,
    /// Local confirmation of a request
    LDataCon = 0x2E,
}

impl CEMIMessageCode {
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x11 => Some(Self::LDataReq),
            0x29 => Some(Self::LDataInd),
            0x2E => Some(Self::LDataCon),
            _ => None,
        }
    }

    pub const fn to_u8(self) -> u8 {
        self as u8
    }
}

// =============================================================================
// KNX Priority
// =============================================================================

/// Telegram priority (control field 1, bits 3-2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Priority {
    System = 0b00,
    Normal = 0b01,
    Urgent = 0b10,
    #[default]
    Low = 0b11,
}

impl Priority {
    pub const fn from_u8(value: u8) -> Self {
        match value & 0b11 {
            0b00 => Self::System,
            0b01 => Self::Normal,
            0b10 => Self::Urgent,
            _ => Self::Low,
        }
    }

    pub const fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Human-readable name of a KNXnet/IP status code.
pub const fn status_name(status: u8) -> &'static str {
    match status {
        E_NO_ERROR => "E_NO_ERROR",
        E_SEQUENCE_NUMBER => "E_SEQUENCE_NUMBER",
        E_CONNECTION_ID => "E_CONNECTION_ID",
        E_CONNECTION_TYPE => "E_CONNECTION_TYPE",
        E_CONNECTION_OPTION => "E_CONNECTION_OPTION",
        E_NO_MORE_CONNECTIONS => "E_NO_MORE_CONNECTIONS",
        E_DATA_CONNECTION => "E_DATA_CONNECTION",
        E_KNX_CONNECTION => "E_KNX_CONNECTION",
        E_TUNNELLING_LAYER => "E_TUNNELLING_LAYER",
        _ => "E_UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_type_round_trip() {
        for raw in [0x0205, 0x0206, 0x0207, 0x0208, 0x0209, 0x020A, 0x0420, 0x0421] {
            let service = ServiceType::from_u16(raw).unwrap();
            assert_eq!(service.to_u16(), raw);
        }
        // search request and routing indication are not tunneling services
        assert_eq!(ServiceType::from_u16(0x0201), None);
        assert_eq!(ServiceType::from_u16(0x0530), None);
    }

    #[test]
    fn test_message_codes() {
        assert_eq!(CEMIMessageCode::from_u8(0x29), Some(CEMIMessageCode::LDataInd));
        assert_eq!(CEMIMessageCode::from_u8(0x2B), None);
    }

    #[test]
    fn test_status_name() {
        assert_eq!(status_name(E_NO_MORE_CONNECTIONS), "E_NO_MORE_CONNECTIONS");
        assert_eq!(status_name(0x99), "E_UNKNOWN");
    }
}
