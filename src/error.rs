//! Error types for KNX tunneling operations.
//!
//! Every failure is a [`KnxError`] whose variant names the category (decode,
//! protocol, timeout, transport, ...) and whose payload struct carries a
//! `kind` enum plus, when the `std` feature is enabled, a captured backtrace.
//!
//! Errors that travel through the event channel are flattened into the
//! `Copy` type [`ErrorKind`]; [`KnxError::kind`] produces it and
//! `KnxError::from(kind)` turns it back into a full error.

use core::fmt;

#[cfg(feature = "std")]
use std::backtrace::Backtrace;

/// Result type alias for KNX operations.
pub type Result<T> = core::result::Result<T, KnxError>;

// =============================================================================
// Error Kind Enums
// =============================================================================

/// Wire data that could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeErrorKind {
    /// Fewer than 6 bytes, bad header length/version, or total length mismatch.
    MalformedHeader,
    /// Service type is not one of the tunneling services.
    UnknownServiceType,
    /// Body shorter than the service requires.
    TruncatedBody,
    /// cEMI payload is inconsistent.
    InvalidCemi,
    /// cEMI message code other than L_Data.req/.ind/.con.
    UnsupportedMessageCode,
}

/// Protocol rule violations by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolErrorKind {
    /// Ack sequence does not match the outstanding request.
    SequenceMismatch,
    /// Frame addressed to another channel.
    ChannelMismatch,
    /// Response arrived in a state that does not expect it.
    UnexpectedFrame,
}

/// Which wait expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimeoutErrorKind {
    Connect,
    Ack,
    Read,
    Disconnect,
    Confirmation,
}

/// Socket level failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportErrorKind {
    SendFailed,
    ReceiveFailed,
    BufferTooSmall,
    Closed,
}

/// Session lifecycle failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionErrorKind {
    /// Gateway answered the connect request with this status code.
    Rejected(u8),
    NotConnected,
    /// Operation not allowed in the current connection status.
    InvalidState,
    /// Heartbeat reported the session as gone.
    Lost,
}

/// Tunneling request delivery failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TunnelingErrorKind {
    /// Gateway acked with a non-zero status.
    AckStatus(u8),
    /// L_Data.con arrived with the error flag set.
    NegativeConfirmation,
    QueueFull,
    TooManyPendingReads,
    RegistryFull,
    TooManySubscribers,
}

/// Address parsing and range errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressingErrorKind {
    InvalidFormat,
    OutOfRange,
}

/// Datapoint type codec errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DptErrorKind {
    InvalidData,
    ValueOutOfRange,
    /// Value variant does not fit the datapoint type.
    TypeMismatch,
    UnknownType,
}

/// Configuration loading errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigErrorKind {
    MissingKey,
    InvalidValue,
}

/// Flattened, copyable error classification.
///
/// Used as the payload of [`crate::event::KnxEvent::Error`] and as the
/// completion value of queued requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorKind {
    Decode(DecodeErrorKind),
    Protocol(ProtocolErrorKind),
    Timeout(TimeoutErrorKind),
    Transport(TransportErrorKind),
    Connection(ConnectionErrorKind),
    Tunneling(TunnelingErrorKind),
    Addressing(AddressingErrorKind),
    Dpt(DptErrorKind),
    Config(ConfigErrorKind),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Decode(kind) => write!(f, "Decode error: {kind:?}"),
            ErrorKind::Protocol(kind) => write!(f, "Protocol error: {kind:?}"),
            ErrorKind::Timeout(kind) => write!(f, "Timeout: {kind:?}"),
            ErrorKind::Transport(kind) => write!(f, "Transport error: {kind:?}"),
            ErrorKind::Connection(kind) => write!(f, "Connection error: {kind:?}"),
            ErrorKind::Tunneling(kind) => write!(f, "Tunneling error: {kind:?}"),
            ErrorKind::Addressing(kind) => write!(f, "Addressing error: {kind:?}"),
            ErrorKind::Dpt(kind) => write!(f, "DPT error: {kind:?}"),
            ErrorKind::Config(kind) => write!(f, "Configuration error: {kind:?}"),
        }
    }
}

// =============================================================================
// Structured Error Types
// =============================================================================

macro_rules! error_struct {
    ($(#[$meta:meta])* $name:ident, $kind:ty) => {
        $(#[$meta])*
        #[derive(Debug)]
        pub struct $name {
            kind: $kind,
            #[cfg(feature = "std")]
            backtrace: Backtrace,
        }

        impl $name {
            pub(crate) fn new(kind: $kind) -> Self {
                Self {
                    kind,
                    #[cfg(feature = "std")]
                    backtrace: Backtrace::capture(),
                }
            }

            /// The specific failure.
            pub fn kind(&self) -> $kind {
                self.kind
            }

            /// Backtrace captured where the error was created.
            #[cfg(feature = "std")]
            pub fn backtrace(&self) -> &Backtrace {
                &self.backtrace
            }
        }
    };
}

error_struct!(
    /// Undecodable wire data.
    DecodeError,
    DecodeErrorKind
);
error_struct!(
    /// Gateway broke a protocol rule.
    ProtocolError,
    ProtocolErrorKind
);
error_struct!(
    /// A bounded wait expired.
    TimeoutError,
    TimeoutErrorKind
);
error_struct!(
    /// Socket failure.
    TransportError,
    TransportErrorKind
);
error_struct!(
    /// Session lifecycle failure.
    ConnectionError,
    ConnectionErrorKind
);
error_struct!(
    /// Tunneling delivery failure.
    TunnelingError,
    TunnelingErrorKind
);
error_struct!(
    /// Invalid address.
    AddressingError,
    AddressingErrorKind
);
error_struct!(
    /// Datapoint codec failure.
    DptError,
    DptErrorKind
);
error_struct!(
    /// Configuration failure.
    ConfigError,
    ConfigErrorKind
);

// =============================================================================
// Main Error Type
// =============================================================================

/// KNX tunneling error.
///
/// This is the error type returned by all fallible operations in the crate.
#[derive(Debug)]
pub enum KnxError {
    /// Malformed or unknown wire data
    Decode(DecodeError),
    /// Sequence mismatch, unexpected response, foreign channel
    Protocol(ProtocolError),
    /// Connect, ack, read or disconnect wait expired
    Timeout(TimeoutError),
    /// Socket-level failure
    Transport(TransportError),
    /// Connection lifecycle errors
    Connection(ConnectionError),
    /// Tunneling delivery errors
    Tunneling(TunnelingError),
    /// Address parsing errors
    Addressing(AddressingError),
    /// Datapoint Type errors
    Dpt(DptError),
    /// Configuration errors
    Config(ConfigError),
}

impl KnxError {
    // Decode constructors

    pub(crate) fn malformed_header() -> Self {
        Self::Decode(DecodeError::new(DecodeErrorKind::MalformedHeader))
    }

    pub(crate) fn unknown_service_type() -> Self {
        Self::Decode(DecodeError::new(DecodeErrorKind::UnknownServiceType))
    }

    pub(crate) fn truncated_body() -> Self {
        Self::Decode(DecodeError::new(DecodeErrorKind::TruncatedBody))
    }

    pub(crate) fn invalid_cemi() -> Self {
        Self::Decode(DecodeError::new(DecodeErrorKind::InvalidCemi))
    }

    pub(crate) fn unsupported_message_code() -> Self {
        Self::Decode(DecodeError::new(DecodeErrorKind::UnsupportedMessageCode))
    }

    // Protocol constructors

    pub(crate) fn sequence_mismatch() -> Self {
        Self::Protocol(ProtocolError::new(ProtocolErrorKind::SequenceMismatch))
    }

    pub(crate) fn channel_mismatch() -> Self {
        Self::Protocol(ProtocolError::new(ProtocolErrorKind::ChannelMismatch))
    }

    pub(crate) fn unexpected_frame() -> Self {
        Self::Protocol(ProtocolError::new(ProtocolErrorKind::UnexpectedFrame))
    }

    // Timeout constructors

    pub(crate) fn connect_timeout() -> Self {
        Self::Timeout(TimeoutError::new(TimeoutErrorKind::Connect))
    }

    pub(crate) fn ack_timeout() -> Self {
        Self::Timeout(TimeoutError::new(TimeoutErrorKind::Ack))
    }

    pub(crate) fn read_timeout() -> Self {
        Self::Timeout(TimeoutError::new(TimeoutErrorKind::Read))
    }

    pub(crate) fn disconnect_timeout() -> Self {
        Self::Timeout(TimeoutError::new(TimeoutErrorKind::Disconnect))
    }

    pub(crate) fn confirmation_timeout() -> Self {
        Self::Timeout(TimeoutError::new(TimeoutErrorKind::Confirmation))
    }

    // Transport constructors

    pub(crate) fn send_failed() -> Self {
        Self::Transport(TransportError::new(TransportErrorKind::SendFailed))
    }

    #[cfg(feature = "embassy-net")]
    pub(crate) fn receive_failed() -> Self {
        Self::Transport(TransportError::new(TransportErrorKind::ReceiveFailed))
    }

    pub(crate) fn buffer_too_small() -> Self {
        Self::Transport(TransportError::new(TransportErrorKind::BufferTooSmall))
    }

    pub(crate) fn transport_closed() -> Self {
        Self::Transport(TransportError::new(TransportErrorKind::Closed))
    }

    // Connection constructors

    pub(crate) fn connection_rejected(status: u8) -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::Rejected(status)))
    }

    pub(crate) fn not_connected() -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::NotConnected))
    }

    pub(crate) fn invalid_state() -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::InvalidState))
    }

    pub(crate) fn connection_lost() -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::Lost))
    }

    // Tunneling constructors

    pub(crate) fn ack_status(status: u8) -> Self {
        Self::Tunneling(TunnelingError::new(TunnelingErrorKind::AckStatus(status)))
    }

    pub(crate) fn negative_confirmation() -> Self {
        Self::Tunneling(TunnelingError::new(TunnelingErrorKind::NegativeConfirmation))
    }

    pub(crate) fn queue_full() -> Self {
        Self::Tunneling(TunnelingError::new(TunnelingErrorKind::QueueFull))
    }

    pub(crate) fn too_many_pending_reads() -> Self {
        Self::Tunneling(TunnelingError::new(TunnelingErrorKind::TooManyPendingReads))
    }

    pub(crate) fn too_many_subscribers() -> Self {
        Self::Tunneling(TunnelingError::new(TunnelingErrorKind::TooManySubscribers))
    }

    pub(crate) fn registry_full() -> Self {
        Self::Tunneling(TunnelingError::new(TunnelingErrorKind::RegistryFull))
    }

    // Addressing constructors

    pub(crate) fn invalid_address_format() -> Self {
        Self::Addressing(AddressingError::new(AddressingErrorKind::InvalidFormat))
    }

    pub(crate) fn address_out_of_range() -> Self {
        Self::Addressing(AddressingError::new(AddressingErrorKind::OutOfRange))
    }

    // DPT constructors

    pub(crate) fn invalid_dpt_data() -> Self {
        Self::Dpt(DptError::new(DptErrorKind::InvalidData))
    }

    pub(crate) fn dpt_value_out_of_range() -> Self {
        Self::Dpt(DptError::new(DptErrorKind::ValueOutOfRange))
    }

    pub(crate) fn dpt_type_mismatch() -> Self {
        Self::Dpt(DptError::new(DptErrorKind::TypeMismatch))
    }

    pub(crate) fn unknown_dpt() -> Self {
        Self::Dpt(DptError::new(DptErrorKind::UnknownType))
    }

    // Config constructors

    pub(crate) fn missing_config_key() -> Self {
        Self::Config(ConfigError::new(ConfigErrorKind::MissingKey))
    }

    pub(crate) fn invalid_config_value() -> Self {
        Self::Config(ConfigError::new(ConfigErrorKind::InvalidValue))
    }

    /// Copyable classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            KnxError::Decode(e) => ErrorKind::Decode(e.kind),
            KnxError::Protocol(e) => ErrorKind::Protocol(e.kind),
            KnxError::Timeout(e) => ErrorKind::Timeout(e.kind),
            KnxError::Transport(e) => ErrorKind::Transport(e.kind),
            KnxError::Connection(e) => ErrorKind::Connection(e.kind),
            KnxError::Tunneling(e) => ErrorKind::Tunneling(e.kind),
            KnxError::Addressing(e) => ErrorKind::Addressing(e.kind),
            KnxError::Dpt(e) => ErrorKind::Dpt(e.kind),
            KnxError::Config(e) => ErrorKind::Config(e.kind),
        }
    }

    /// Check if this is any decode error
    pub fn is_decode(&self) -> bool {
        matches!(self, KnxError::Decode(_))
    }

    /// Check if the header was malformed
    pub fn is_malformed_header(&self) -> bool {
        self.kind() == ErrorKind::Decode(DecodeErrorKind::MalformedHeader)
    }

    /// Check if the service type was not recognized
    pub fn is_unknown_service_type(&self) -> bool {
        self.kind() == ErrorKind::Decode(DecodeErrorKind::UnknownServiceType)
    }

    /// Check if the body was too short for its service
    pub fn is_truncated_body(&self) -> bool {
        self.kind() == ErrorKind::Decode(DecodeErrorKind::TruncatedBody)
    }

    /// Check if this is a protocol error
    pub fn is_protocol(&self) -> bool {
        matches!(self, KnxError::Protocol(_))
    }

    /// Check if an ack carried the wrong sequence number
    pub fn is_sequence_mismatch(&self) -> bool {
        self.kind() == ErrorKind::Protocol(ProtocolErrorKind::SequenceMismatch)
    }

    /// Check if this is any timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, KnxError::Timeout(_))
    }

    /// Check if a connect attempt timed out
    pub fn is_connect_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout(TimeoutErrorKind::Connect)
    }

    /// Check if a tunneling request was never acknowledged
    pub fn is_ack_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout(TimeoutErrorKind::Ack)
    }

    /// Check if a group read got no response
    pub fn is_read_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout(TimeoutErrorKind::Read)
    }

    /// Check if this is a transport error
    pub fn is_transport(&self) -> bool {
        matches!(self, KnxError::Transport(_))
    }

    /// Check if the gateway refused the connection
    pub fn is_connection_rejected(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Connection(ConnectionErrorKind::Rejected(_))
        )
    }

    /// Check if the operation needed an open session
    pub fn is_not_connected(&self) -> bool {
        self.kind() == ErrorKind::Connection(ConnectionErrorKind::NotConnected)
    }

    /// Check if the operation was not valid in the current status
    pub fn is_invalid_state(&self) -> bool {
        self.kind() == ErrorKind::Connection(ConnectionErrorKind::InvalidState)
    }

    /// Check if this is an addressing error
    pub fn is_addressing(&self) -> bool {
        matches!(self, KnxError::Addressing(_))
    }

    /// Check if this is a DPT error
    pub fn is_dpt(&self) -> bool {
        matches!(self, KnxError::Dpt(_))
    }

    /// Check if this is a configuration error
    pub fn is_config(&self) -> bool {
        matches!(self, KnxError::Config(_))
    }
}

impl From<ErrorKind> for KnxError {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Decode(k) => KnxError::Decode(DecodeError::new(k)),
            ErrorKind::Protocol(k) => KnxError::Protocol(ProtocolError::new(k)),
            ErrorKind::Timeout(k) => KnxError::Timeout(TimeoutError::new(k)),
            ErrorKind::Transport(k) => KnxError::Transport(TransportError::new(k)),
            ErrorKind::Connection(k) => KnxError::Connection(ConnectionError::new(k)),
            ErrorKind::Tunneling(k) => KnxError::Tunneling(TunnelingError::new(k)),
            ErrorKind::Addressing(k) => KnxError::Addressing(AddressingError::new(k)),
            ErrorKind::Dpt(k) => KnxError::Dpt(DptError::new(k)),
            ErrorKind::Config(k) => KnxError::Config(ConfigError::new(k)),
        }
    }
}

impl fmt::Display for KnxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.kind(), f)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for KnxError {
    fn format(&self, f: defmt::Formatter<'_>) {
        defmt::write!(f, "{}", self.kind());
    }
}

#[cfg(feature = "std")]
impl std::error::Error for KnxError {}
