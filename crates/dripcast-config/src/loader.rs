// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! `./dripcast.toml` > `~/.config/dripcast/dripcast.toml` > `/etc/dripcast/dripcast.toml`,
//! with `DRIPCAST_*` environment variables on top.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::DripcastConfig;

/// Sections recognised in environment variable names, in match order.
const ENV_SECTIONS: &[&str] = &[
    "service",
    "storage",
    "pairing",
    "dispatch",
    "registration",
    "daemon",
];

/// Load configuration from the standard hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/dripcast/dripcast.toml`
/// 3. `~/.config/dripcast/dripcast.toml`
/// 4. `./dripcast.toml`
/// 5. `DRIPCAST_*` environment variables
pub fn load_config() -> Result<DripcastConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string over the compiled defaults only.
pub fn load_config_from_str(toml_content: &str) -> Result<DripcastConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DripcastConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<DripcastConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DripcastConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The Figment used by [`load_config`], before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(DripcastConfig::default()))
        .merge(Toml::file("/etc/dripcast/dripcast.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("dripcast/dripcast.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("dripcast.toml"))
        .merge(env_provider())
}

/// Environment provider mapping `DRIPCAST_<SECTION>_<KEY>` to `section.key`.
///
/// Only the first underscore after a known section name becomes a dot, so
/// `DRIPCAST_DISPATCH_INTERVAL_MIN_SECS` maps to `dispatch.interval_min_secs`.
fn env_provider() -> Env {
    Env::prefixed("DRIPCAST_").map(|key| env_key_to_path(key.as_str()).into())
}

fn env_key_to_path(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
