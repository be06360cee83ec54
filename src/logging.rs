//! Logging facade for the tunneling stack.
//!
//! `knx_log!` forwards to `defmt` when the `defmt` feature is enabled, to the
//! `log` crate when only `log` is enabled, and compiles to nothing otherwise.
//! The arguments are still type-checked in the silent configuration so a
//! build without logging cannot hide a broken format string.
//!
//! ```rust,ignore
//! knx_log!(info, "Connected on channel {}", channel_id);
//! knx_log!(warn, "Ack timeout for seq {}, retry {}/{}", seq, attempt, retries);
//! ```
//!
//! Only pass arguments that implement both `Display` and `defmt::Format`
//! (integers, `&str`, and the crate's address and error kind types).

#[cfg(feature = "defmt")]
macro_rules! knx_log {
    (trace, $($arg:tt)*) => { defmt::trace!($($arg)*) };
    (debug, $($arg:tt)*) => { defmt::debug!($($arg)*) };
    (info, $($arg:tt)*) => { defmt::info!($($arg)*) };
    (warn, $($arg:tt)*) => { defmt::warn!($($arg)*) };
    (error, $($arg:tt)*) => { defmt::error!($($arg)*) };
}

#[cfg(all(feature = "log", not(feature = "defmt")))]
macro_rules! knx_log {
    (trace, $($arg:tt)*) => { log::trace!($($arg)*) };
    (debug, $($arg:tt)*) => { log::debug!($($arg)*) };
    (info, $($arg:tt)*) => { log::info!($($arg)*) };
    (warn, $($arg:tt)*) => { log::warn!($($arg)*) };
    (error, $($arg:tt)*) => { log::error!($($arg)*) };
}

#[cfg(not(any(feature = "log", feature = "defmt")))]
macro_rules! knx_log {
    ($level:ident, $($arg:tt)*) => {{
        if false {
            let _ = ::core::format_args!($($arg)*);
        }
    }};
}

/// Log verbosity accepted by [`TunnelConfig`](crate::config::TunnelConfig).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Parse a level name, case-insensitive (`"debug"`, `"WARN"`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        const NAMES: [(&str, LogLevel); 6] = [
            ("off", LogLevel::Off),
            ("error", LogLevel::Error),
            ("warn", LogLevel::Warn),
            ("info", LogLevel::Info),
            ("debug", LogLevel::Debug),
            ("trace", LogLevel::Trace),
        ];

        NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name.trim()))
            .map(|(_, level)| *level)
    }

    /// Install this level as the global maximum for the `log` crate.
    ///
    /// `defmt` filters at compile time (`DEFMT_LOG`), so this is a no-op
    /// without the `log` feature.
    pub fn apply(self) {
        #[cfg(feature = "log")]
        log::set_max_level(self.to_level_filter());
    }

    #[cfg(feature = "log")]
    fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_name() {
        assert_eq!(LogLevel::from_name("debug"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_name(" WARN "), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_name("verbose"), None);
    }

    #[test]
    fn test_levels_are_ordered() {
        assert!(LogLevel::Error < LogLevel::Debug);
        assert_eq!(LogLevel::default(), LogLevel::Info);
    }

    #[test]
    fn test_macro_accepts_arguments() {
        let channel = 5u8;
        knx_log!(info, "channel {}", channel);
        knx_log!(debug, "no arguments");
    }
}
