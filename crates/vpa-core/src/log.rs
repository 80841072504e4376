//! Leveled logging for the VPA tools.
//!
//! All output goes to stderr: in inetd mode stdout is the client socket and
//! a stray log line there would corrupt the reply.
//!
//! # Environment Variables
//!
//! - `VPA_LOG_LEVEL=<level>` - 0=off, 1=error, 2=warn, 3=info, 4=debug, 5=trace
//!   (names accepted too, default info)
//! - `RUST_LOG` - full `tracing` filter directive; wins over `VPA_LOG_LEVEL`
//!
//! # Usage
//!
//! ```ignore
//! vpa_core::log::init();
//! tracing::info!(port, "listening");
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::EnvFilter;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    #[default]
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    /// Accepts a level name or digit. Unknown text yields `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "off" | "0" => Some(LogLevel::Off),
            "error" | "1" => Some(LogLevel::Error),
            "warn" | "warning" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    /// Filter directive understood by `EnvFilter`.
    pub fn directive(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Level from `VPA_LOG_LEVEL`, defaulting to `Info`.
    pub fn from_env() -> Self {
        std::env::var("VPA_LOG_LEVEL")
            .ok()
            .and_then(|v| LogLevel::parse(&v))
            .unwrap_or_default()
    }
}

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Install the stderr subscriber using the level from the environment.
///
/// Safe to call more than once; only the first call has any effect.
pub fn init() {
    init_with(LogLevel::from_env());
}

/// Install the stderr subscriber at `level` unless `RUST_LOG` is set.
pub fn init_with(level: LogLevel) {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.directive()));

    // Another subscriber may already be installed (tests, embedding apps)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names_and_digits() {
        assert_eq!(LogLevel::parse("off"), Some(LogLevel::Off));
        assert_eq!(LogLevel::parse("WARN"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse(" 4 "), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("loud"), None);
    }

    #[test]
    fn test_from_u8_saturates() {
        assert_eq!(LogLevel::from_u8(0), LogLevel::Off);
        assert_eq!(LogLevel::from_u8(3), LogLevel::Info);
        assert_eq!(LogLevel::from_u8(200), LogLevel::Trace);
    }

    #[test]
    fn test_directive_round_trips_through_parse() {
        for v in 0..=5u8 {
            let lvl = LogLevel::from_u8(v);
            assert_eq!(LogLevel::parse(lvl.directive()), Some(lvl));
        }
    }

    #[test]
    fn test_init_is_idempotent() {
        init_with(LogLevel::Off);
        init_with(LogLevel::Trace);
        assert!(INITIALIZED.load(Ordering::SeqCst));
    }
}
