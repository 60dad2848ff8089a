//! Application configuration: runtime pacing plus transport settings in one
//! serde/TOML document (spec.md §3 AMBIENT: configuration).
//!
//! Grounded on `gamecore::config::GameConfig`'s `Server`/`Game` split and
//! its `Default` + `serdeconv`-backed `load` associated function, widened
//! to cover the constructor arguments spec.md §5/§6 hand to `start(port,
//! interval, timeoutMs)` calls so a host configures them instead of
//! hardcoding them.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_PORT: u16 = 28008;

/// Active Object Runtime pacing (spec.md §4.1, §4.9 Frame pacing).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Fixed ticks-per-second the frame pacer steps at.
    pub tick_hz: u32,
    /// Upper bound on catch-up updates run in a single `tick()` call before
    /// the pacer declares itself capped (spec.md §4.9 "capped").
    pub max_consecutive_updates: u32,
}

impl Default for RuntimeConfig {
    fn default() -> RuntimeConfig {
        RuntimeConfig {
            tick_hz: 60,
            max_consecutive_updates: 5,
        }
    }
}

/// TCP/UDP transport settings (spec.md §4.3 "TCP session", §4.4 "UDP
/// session").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    pub address: Option<String>,
    /// Shared passphrase checked during the connect handshake.
    pub passphrase: String,
    pub max_clients: u16,
    /// Milliseconds of inactivity before a connected peer is timed out.
    pub timeout_ms: u64,
    /// Ticks between handshake/keepalive resend attempts.
    pub interval_ticks: u32,
}

impl Default for TransportConfig {
    fn default() -> TransportConfig {
        TransportConfig {
            address: Some(format!("0.0.0.0:{}", DEFAULT_PORT)),
            passphrase: String::new(),
            max_clients: 256,
            timeout_ms: 5_000,
            interval_ticks: 10,
        }
    }
}

impl TransportConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Top-level application config, split into a runtime and a transport
/// section the way `GameConfig` splits `game` from `server`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub runtime: RuntimeConfig,
    pub transport: TransportConfig,
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<AppConfig, ConfigError> {
        serdeconv::from_toml_file(path).map_err(ConfigError::Load)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        serdeconv::to_toml_string(self).map_err(ConfigError::Save)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = AppConfig::default();
        let toml = config.to_toml_string().expect("serialize");
        let parsed: AppConfig = serdeconv::from_toml_str(&toml).expect("deserialize");
        assert_eq!(parsed.runtime.tick_hz, config.runtime.tick_hz);
        assert_eq!(parsed.transport.max_clients, config.transport.max_clients);
    }

    #[test]
    fn default_transport_timeout_matches_configured_milliseconds() {
        let config = TransportConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(5_000));
    }
}
