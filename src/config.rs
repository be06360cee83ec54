//! Tunnel configuration.
//!
//! [`TunnelConfig`] collects every timing and addressing knob of a session.
//! It is built either in code with the `with_*` setters or from a block of
//! `KEY=VALUE` lines, the format used for board-level configuration files:
//!
//! ```
//! use knx_tunnel::config::TunnelConfig;
//! use embassy_time::Duration;
//!
//! const CONFIG: &str = r#"
//! # gateway in the distribution board
//! KNX_GATEWAY_IP=192.168.1.10
//! KNX_HEARTBEAT_INTERVAL_MS=30000
//! KNX_ACK_RETRIES=2
//! "#;
//!
//! let config = TunnelConfig::from_kv_str(CONFIG)?;
//! assert_eq!(config.gateway.port, 3671);
//! assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
//! assert_eq!(config.ack_retries, 2);
//! # Ok::<(), knx_tunnel::KnxError>(())
//! ```

use embassy_time::Duration;

use crate::addressing::IndividualAddress;
use crate::error::{KnxError, Result};
use crate::logging::LogLevel;
use crate::net::{IpEndpoint, Ipv4Addr};
use crate::protocol::frame::Hpai;

/// Standard KNXnet/IP port.
pub const DEFAULT_GATEWAY_PORT: u16 = 3671;

/// Settings for one tunneling session.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TunnelConfig {
    /// Gateway control endpoint
    pub gateway: IpEndpoint,
    /// Control and data endpoint announced to the gateway; unspecified for NAT
    pub local_endpoint: Hpai,
    /// Source address of outgoing telegrams; 0.0.0 lets the gateway fill it in
    pub individual_address: IndividualAddress,
    pub connect_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    /// Consecutive unanswered heartbeats before the session is considered lost
    pub heartbeat_max_misses: u8,
    pub ack_timeout: Duration,
    /// Retransmissions after the first ack timeout
    pub ack_retries: u8,
    pub read_timeout: Duration,
    pub disconnect_timeout: Duration,
    /// Wait for L_Data.con after the ack before a send completes
    pub await_confirmation: bool,
    pub confirmation_timeout: Duration,
    /// Minimum gap between two tunneling requests
    pub send_queue_interval: Duration,
    pub log_level: LogLevel,
}

impl TunnelConfig {
    pub const fn new(gateway: IpEndpoint) -> Self {
        Self {
            gateway,
            local_endpoint: Hpai::UNSPECIFIED,
            individual_address: IndividualAddress::UNASSIGNED,
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(60),
            heartbeat_timeout: Duration::from_secs(10),
            heartbeat_max_misses: 2,
            ack_timeout: Duration::from_secs(1),
            ack_retries: 1,
            read_timeout: Duration::from_secs(3),
            disconnect_timeout: Duration::from_secs(10),
            await_confirmation: false,
            confirmation_timeout: Duration::from_secs(3),
            send_queue_interval: Duration::from_millis(25),
            log_level: LogLevel::Info,
        }
    }

    pub const fn with_local_endpoint(mut self, endpoint: Hpai) -> Self {
        self.local_endpoint = endpoint;
        self
    }

    pub const fn with_individual_address(mut self, address: IndividualAddress) -> Self {
        self.individual_address = address;
        self
    }

    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Heartbeat period, response window and miss tolerance.
    pub const fn with_heartbeat(mut self, interval: Duration, timeout: Duration, max_misses: u8) -> Self {
        self.heartbeat_interval = interval;
        self.heartbeat_timeout = timeout;
        self.heartbeat_max_misses = max_misses;
        self
    }

    pub const fn with_ack(mut self, timeout: Duration, retries: u8) -> Self {
        self.ack_timeout = timeout;
        self.ack_retries = retries;
        self
    }

    pub const fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub const fn with_disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.disconnect_timeout = timeout;
        self
    }

    /// Make sends wait for the gateway's L_Data.con.
    pub const fn with_confirmation(mut self, timeout: Duration) -> Self {
        self.await_confirmation = true;
        self.confirmation_timeout = timeout;
        self
    }

    pub const fn with_send_queue_interval(mut self, interval: Duration) -> Self {
        self.send_queue_interval = interval;
        self
    }

    pub const fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Parse `KEY=VALUE` lines.
    ///
    /// Blank lines and lines starting with `#` are skipped, unknown keys are
    /// ignored. `KNX_GATEWAY_IP` is required.
    ///
    /// # Errors
    ///
    /// - `Config(MissingKey)` without `KNX_GATEWAY_IP`
    /// - `Config(InvalidValue)` for a value that does not parse
    pub fn from_kv_str(text: &str) -> Result<Self> {
        let gateway_ip: Ipv4Addr = lookup(text, "KNX_GATEWAY_IP")
            .ok_or_else(KnxError::missing_config_key)?
            .parse()?;
        let port = match lookup(text, "KNX_GATEWAY_PORT") {
            Some(value) => parse_number(value)?,
            None => DEFAULT_GATEWAY_PORT,
        };

        let mut config = Self::new(IpEndpoint::new(gateway_ip, port));

        for (key, value) in entries(text) {
            match key {
                "KNX_INDIVIDUAL_ADDRESS" => {
                    config.individual_address = value.parse().map_err(|_| KnxError::invalid_config_value())?;
                }
                "KNX_CONNECT_TIMEOUT_MS" => config.connect_timeout = parse_millis(value)?,
                "KNX_HEARTBEAT_INTERVAL_MS" => config.heartbeat_interval = parse_millis(value)?,
                "KNX_HEARTBEAT_TIMEOUT_MS" => config.heartbeat_timeout = parse_millis(value)?,
                "KNX_HEARTBEAT_MAX_MISSES" => config.heartbeat_max_misses = parse_number(value)?,
                "KNX_ACK_TIMEOUT_MS" => config.ack_timeout = parse_millis(value)?,
                "KNX_ACK_RETRIES" => config.ack_retries = parse_number(value)?,
                "KNX_READ_TIMEOUT_MS" => config.read_timeout = parse_millis(value)?,
                "KNX_DISCONNECT_TIMEOUT_MS" => config.disconnect_timeout = parse_millis(value)?,
                "KNX_CONFIRMATION_TIMEOUT_MS" => config.confirmation_timeout = parse_millis(value)?,
                "KNX_SEND_QUEUE_INTERVAL_MS" => config.send_queue_interval = parse_millis(value)?,
                "KNX_AWAIT_CONFIRMATION" => config.await_confirmation = parse_bool(value)?,
                "KNX_LOG_LEVEL" => {
                    config.log_level = LogLevel::from_name(value).ok_or_else(KnxError::invalid_config_value)?;
                }
                _ => {}
            }
        }

        Ok(config)
    }
}

/// `(key, value)` pairs of the non-comment lines, both trimmed.
fn entries(text: &str) -> impl Iterator<Item = (&str, &str)> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()))
}

/// Value of the first line starting with `key=`.
fn lookup<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    entries(text).find(|(k, _)| *k == key).map(|(_, v)| v)
}

fn parse_number<T: core::str::FromStr>(value: &str) -> Result<T> {
    value.parse().map_err(|_| KnxError::invalid_config_value())
}

fn parse_millis(value: &str) -> Result<Duration> {
    parse_number(value).map(Duration::from_millis)
}

fn parse_bool(value: &str) -> Result<bool> {
    match value {
        "1" => Ok(true),
        "0" => Ok(false),
        v if v.eq_ignore_ascii_case("true") => Ok(true),
        v if v.eq_ignore_ascii_case("false") => Ok(false),
        _ => Err(KnxError::invalid_config_value()),
    }
}
