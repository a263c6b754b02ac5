use std::time::Duration;

use thiserror::Error;

// -------------------------------------------------------------------------------------------------
// ---- LogLevel -----------------------------------------------------------------------------------

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

// -------------------------------------------------------------------------------------------------
// ---- Limits -------------------------------------------------------------------------------------

/// Per-target ceilings on client traffic. Zero means unlimited.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Limits {
    /// Bytes per minute.
    pub bandwidth: u64,
    /// Messages per minute.
    pub pdu: u64,
    /// Records per retrieval request.
    pub retrieve: u32,
}

// -------------------------------------------------------------------------------------------------
// ---- KeepAlive ----------------------------------------------------------------------------------

/// A back-end connection that has received more than this is not returned
/// to the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeepAlive {
    pub bandwidth: u64,
    pub pdu: u64,
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self {
            bandwidth: 500_000,
            pdu: 1000,
        }
    }
}

impl KeepAlive {
    pub fn allows(&self, bytes: u64, pdus: u64) -> bool {
        bytes < self.bandwidth && pdus < self.pdu
    }
}

// -------------------------------------------------------------------------------------------------
// ---- Durations ----------------------------------------------------------------------------------

#[derive(Debug, Error)]
#[error("bad duration for {field}: {value:?} ({source})")]
pub struct DurationError {
    pub field: &'static str,
    pub value: String,
    #[source]
    pub source: humantime::DurationError,
}

/// `"30s"`, `"10m"`, `"1h 30m"`.
pub fn parse_duration(field: &'static str, raw: &str) -> Result<Duration, DurationError> {
    humantime::parse_duration(raw.trim()).map_err(|source| DurationError {
        field,
        value: raw.to_owned(),
        source,
    })
}

pub fn parse_opt_duration(
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<Duration>, DurationError> {
    raw.map(|r| parse_duration(field, r)).transpose()
}

// -------------------------------------------------------------------------------------------------
// ---- Tests --------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keepalive_is_strict() {
        let k = KeepAlive::default();
        assert!(k.allows(499_999, 999));
        assert!(!k.allows(500_000, 1));
        assert!(!k.allows(1, 1000));
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("x", "10m").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_opt_duration("x", None).unwrap(), None);
        let err = parse_duration("client_timeout", "soon").unwrap_err();
        assert_eq!(err.field, "client_timeout");
    }
}

// -------------------------------------------------------------------------------------------------
// -------------------------------------------------------------------------------------------------
