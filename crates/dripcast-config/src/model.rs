// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for dripcast.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so a misspelled key is
//! reported at startup instead of silently falling back to a default.

use serde::{Deserialize, Serialize};

/// Top-level dripcast configuration.
///
/// Every section is optional and defaults to the values below.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DripcastConfig {
    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Device pairing and reconnect behaviour.
    #[serde(default)]
    pub pairing: PairingConfig,

    /// Broadcast dispatch pacing and campaign rules.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Background contact registration checks.
    #[serde(default)]
    pub registration: RegistrationConfig,

    #[serde(default)]
    pub daemon: DaemonConfig,
}

/// Service identity and logging.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "dripcast".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("dripcast").join("dripcast.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("dripcast.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Pairing and reconnect configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PairingConfig {
    /// Rendered QR image size in pixels.
    #[serde(default = "default_qr_size")]
    pub qr_size: u32,

    /// Maximum wait for the first pairing code after connecting.
    #[serde(default = "default_code_wait_secs")]
    pub code_wait_secs: u64,

    /// Timeout reported to callers on the reconnect path.
    #[serde(default = "default_reconnect_timeout_secs")]
    pub reconnect_timeout_secs: u64,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            qr_size: default_qr_size(),
            code_wait_secs: default_code_wait_secs(),
            reconnect_timeout_secs: default_reconnect_timeout_secs(),
        }
    }
}

fn default_qr_size() -> u32 {
    256
}

fn default_code_wait_secs() -> u64 {
    30
}

fn default_reconnect_timeout_secs() -> u64 {
    30
}

/// Broadcast dispatch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Run the broadcast tick.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Lower bound of the jittered interval between broadcast ticks.
    #[serde(default = "default_dispatch_interval_min")]
    pub interval_min_secs: u64,

    /// Upper bound of the jittered interval between broadcast ticks.
    #[serde(default = "default_dispatch_interval_max")]
    pub interval_max_secs: u64,

    /// Lower bound of the simulated typing delay before each send.
    #[serde(default = "default_typing_delay_min")]
    pub typing_delay_min_secs: u64,

    #[serde(default = "default_typing_delay_max")]
    pub typing_delay_max_secs: u64,

    /// Minimum campaign message length in characters.
    #[serde(default = "default_min_message_length")]
    pub min_message_length: usize,

    /// Country code substituted for a leading `0` in phone numbers.
    #[serde(default = "default_country_code")]
    pub default_country_code: String,

    /// Rows per page in campaign and recipient listings.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// When set, a recurring sweep marks `reserved` recipients older than
    /// this many seconds as failed.
    #[serde(default)]
    pub stale_reservation_secs: Option<u64>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_min_secs: default_dispatch_interval_min(),
            interval_max_secs: default_dispatch_interval_max(),
            typing_delay_min_secs: default_typing_delay_min(),
            typing_delay_max_secs: default_typing_delay_max(),
            min_message_length: default_min_message_length(),
            default_country_code: default_country_code(),
            page_size: default_page_size(),
            stale_reservation_secs: None,
        }
    }
}

/// Slack on top of the longest typing delay before a reservation counts as stale.
pub const STALE_RESERVATION_MARGIN_SECS: u64 = 60;

impl DispatchConfig {
    /// Youngest reservation age that can be swept without racing a tick
    /// that is still between reserving and sending.
    pub fn min_stale_reservation_secs(&self) -> u64 {
        self.typing_delay_max_secs
            .saturating_add(STALE_RESERVATION_MARGIN_SECS)
    }
}

fn default_true() -> bool {
    true
}

fn default_dispatch_interval_min() -> u64 {
    540
}

fn default_dispatch_interval_max() -> u64 {
    660
}

fn default_typing_delay_min() -> u64 {
    5
}

fn default_typing_delay_max() -> u64 {
    9
}

fn default_min_message_length() -> usize {
    100
}

fn default_country_code() -> String {
    "62".to_string()
}

fn default_page_size() -> u32 {
    20
}

/// Contact registration check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RegistrationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_registration_interval_min")]
    pub interval_min_secs: u64,

    #[serde(default = "default_registration_interval_max")]
    pub interval_max_secs: u64,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_min_secs: default_registration_interval_min(),
            interval_max_secs: default_registration_interval_max(),
        }
    }
}

fn default_registration_interval_min() -> u64 {
    180
}

fn default_registration_interval_max() -> u64 {
    300
}

/// Process lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    /// How long shutdown waits for background tasks before abandoning them.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = DripcastConfig::default();
        assert_eq!(config.service.name, "dripcast");
        assert_eq!(config.pairing.qr_size, 256);
        assert_eq!(config.dispatch.interval_min_secs, 540);
        assert_eq!(config.dispatch.interval_max_secs, 660);
        assert_eq!(config.dispatch.min_message_length, 100);
        assert_eq!(config.dispatch.default_country_code, "62");
        assert_eq!(config.dispatch.stale_reservation_secs, None);
        assert_eq!(config.registration.interval_min_secs, 180);
        assert_eq!(config.daemon.shutdown_grace_secs, 5);
        assert!(config.storage.database_path.ends_with("dripcast.db"));
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let toml_str = r#"
[dispatch]
page_size = 50
"#;
        let config: DripcastConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.dispatch.page_size, 50);
        assert!(config.dispatch.enabled);
        assert_eq!(config.dispatch.typing_delay_max_secs, 9);
    }
}
