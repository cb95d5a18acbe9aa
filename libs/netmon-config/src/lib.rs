// [libs/netmon-config/src/lib.rs]
//! Runtime configuration, loaded once at boot from the process
//! environment (optionally hydrated from a `.env` file first, see
//! [`NetmonConfig::from_env`]).
//!
//! Every other crate in the core takes its tunables through this
//! struct's fields rather than reading `std::env` itself, so a test
//! can construct one by hand without touching the real environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable `{0}`")]
    Missing(&'static str),
    #[error("environment variable `{0}` could not be parsed: {1}")]
    Invalid(&'static str, String),
    #[error("ENCRYPTION_KEY must decode to exactly 32 bytes, got {0}")]
    BadKeyLength(usize),
    #[error("ENCRYPTION_KEY is not valid base64: {0}")]
    BadKeyEncoding(#[from] base64::DecodeError),
}

#[derive(Debug, Clone)]
pub struct NetmonConfig {
    /// Raw 32-byte AES-256-GCM key for the credential/target vault.
    pub encryption_key: [u8; 32],
    pub database_url: String,
    pub database_auth_token: Option<String>,
    /// Directory scanned at boot for `manifest.json` plugin descriptors.
    pub plugin_directory: PathBuf,
    /// Address the health/status endpoint (if any embedding app exposes one) binds to.
    pub listen_address: SocketAddr,

    /// Scheduler tick period. One tick evaluates the due-heap once.
    pub tick_interval: Duration,
    pub liveness_timeout: Duration,
    /// Max concurrent liveness checks in flight across all monitors.
    pub liveness_slots: usize,
    /// Max concurrent plugin subprocess invocations across all monitors.
    pub plugin_slots: usize,
    /// Consecutive liveness failures before a monitor transitions to `down`.
    pub down_threshold: u32,

    pub batch_size: usize,
    pub flush_interval: Duration,
    pub max_consecutive_flush_failures: u32,

    pub discovery_channel_capacity: usize,
    pub device_validated_channel_capacity: usize,
    pub cache_invalidate_channel_capacity: usize,
    pub monitor_state_channel_capacity: usize,
}

impl NetmonConfig {
    /// Loads `.env` if present (missing is not an error) then reads every
    /// field from the process environment, applying the defaults listed
    /// below for anything not explicitly set.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let encryption_key = decode_key(&require("ENCRYPTION_KEY")?)?;

        Ok(Self {
            encryption_key,
            database_url: require("DATABASE_URL")?,
            database_auth_token: std::env::var("DATABASE_AUTH_TOKEN").ok(),
            plugin_directory: parse_or("PLUGIN_DIRECTORY", PathBuf::from("./plugins"))?,
            listen_address: parse_or("LISTEN_ADDRESS", "0.0.0.0:9000".parse().unwrap())?,

            tick_interval: millis_or("TICK_INTERVAL_MS", 1_000)?,
            liveness_timeout: millis_or("LIVENESS_TIMEOUT_MS", 5_000)?,
            liveness_slots: parse_or("LIVENESS_SLOTS", 32)?,
            plugin_slots: parse_or("PLUGIN_SLOTS", 16)?,
            down_threshold: parse_or("DOWN_THRESHOLD", 3)?,

            batch_size: parse_or("BATCH_SIZE", 500)?,
            flush_interval: millis_or("FLUSH_INTERVAL_MS", 2_000)?,
            max_consecutive_flush_failures: parse_or("MAX_CONSECUTIVE_FLUSH_FAILURES", 5)?,

            discovery_channel_capacity: parse_or("DISCOVERY_CHANNEL_CAPACITY", 256)?,
            device_validated_channel_capacity: parse_or("DEVICE_VALIDATED_CHANNEL_CAPACITY", 1024)?,
            cache_invalidate_channel_capacity: parse_or("CACHE_INVALIDATE_CHANNEL_CAPACITY", 256)?,
            monitor_state_channel_capacity: parse_or("MONITOR_STATE_CHANNEL_CAPACITY", 256)?,
        })
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

fn millis_or(name: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    parse_or(name, default_ms).map(Duration::from_millis)
}

fn decode_key(raw: &str) -> Result<[u8; 32], ConfigError> {
    use base64::{engine::general_purpose::STANDARD, Engine};
    let bytes = STANDARD.decode(raw)?;
    bytes
        .try_into()
        .map_err(|bytes: Vec<u8>| ConfigError::BadKeyLength(bytes.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_key_rejects_wrong_length() {
        use base64::{engine::general_purpose::STANDARD, Engine};
        let short = STANDARD.encode([0u8; 16]);
        assert!(matches!(decode_key(&short), Err(ConfigError::BadKeyLength(16))));
    }

    #[test]
    fn decode_key_accepts_32_bytes() {
        use base64::{engine::general_purpose::STANDARD, Engine};
        let good = STANDARD.encode([9u8; 32]);
        assert_eq!(decode_key(&good).unwrap(), [9u8; 32]);
    }
}
