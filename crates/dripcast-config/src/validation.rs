// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks applied after deserialization.

use crate::diagnostic::ConfigError;
use crate::model::{DripcastConfig, STALE_RESERVATION_MARGIN_SECS};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration.
///
/// Collects every failure instead of stopping at the first one.
pub fn validate_config(config: &DripcastConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.service.log_level.as_str()) {
        fail(format!(
            "service.log_level `{}` must be one of {}",
            config.service.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    if config.pairing.qr_size == 0 {
        fail("pairing.qr_size must be greater than 0".to_string());
    }
    if config.pairing.code_wait_secs == 0 {
        fail("pairing.code_wait_secs must be greater than 0".to_string());
    }

    let dispatch = &config.dispatch;
    check_range(
        &mut fail,
        "dispatch.interval",
        dispatch.interval_min_secs,
        dispatch.interval_max_secs,
        false,
    );
    check_range(
        &mut fail,
        "dispatch.typing_delay",
        dispatch.typing_delay_min_secs,
        dispatch.typing_delay_max_secs,
        true,
    );
    check_range(
        &mut fail,
        "registration.interval",
        config.registration.interval_min_secs,
        config.registration.interval_max_secs,
        false,
    );

    if dispatch.default_country_code.is_empty()
        || !dispatch
            .default_country_code
            .bytes()
            .all(|b| b.is_ascii_digit())
    {
        fail(format!(
            "dispatch.default_country_code `{}` must be digits only",
            dispatch.default_country_code
        ));
    }

    if dispatch.page_size == 0 {
        fail("dispatch.page_size must be greater than 0".to_string());
    }

    if let Some(secs) = dispatch.stale_reservation_secs {
        let min = dispatch.min_stale_reservation_secs();
        if secs < min {
            fail(format!(
                "dispatch.stale_reservation_secs ({secs}) must be at least {min} \
                 (typing_delay_max_secs plus {STALE_RESERVATION_MARGIN_SECS}s)"
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_range(fail: &mut impl FnMut(String), prefix: &str, min: u64, max: u64, allow_zero: bool) {
    if !allow_zero && min == 0 {
        fail(format!("{prefix}_min_secs must be greater than 0"));
    }
    if min > max {
        fail(format!(
            "{prefix}_min_secs ({min}) must not exceed {prefix}_max_secs ({max})"
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(config: &DripcastConfig) -> Vec<String> {
        validate_config(config)
            .unwrap_err()
            .into_iter()
            .map(|e| e.to_string())
            .collect()
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&DripcastConfig::default()).is_ok());
    }

    #[test]
    fn inverted_interval_fails() {
        let mut config = DripcastConfig::default();
        config.dispatch.interval_min_secs = 700;
        let errors = messages(&config);
        assert!(errors.iter().any(|m| m.contains("dispatch.interval_min_secs (700)")));
    }

    #[test]
    fn zero_tick_interval_fails_but_zero_typing_delay_passes() {
        let mut config = DripcastConfig::default();
        config.registration.interval_min_secs = 0;
        config.dispatch.typing_delay_min_secs = 0;
        config.dispatch.typing_delay_max_secs = 0;
        let errors = messages(&config);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("registration.interval_min_secs"));
    }

    #[test]
    fn collects_every_failure() {
        let mut config = DripcastConfig::default();
        config.storage.database_path = " ".to_string();
        config.dispatch.default_country_code = "+62".to_string();
        config.dispatch.page_size = 0;
        config.service.log_level = "loud".to_string();
        assert_eq!(messages(&config).len(), 4);
    }

    #[test]
    fn stale_reservation_age_must_outlast_typing_delay() {
        let mut config = DripcastConfig::default();
        config.dispatch.typing_delay_max_secs = 9;
        config.dispatch.stale_reservation_secs = Some(30);
        let errors = messages(&config);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("stale_reservation_secs (30) must be at least 69"));

        config.dispatch.stale_reservation_secs = Some(69);
        assert!(validate_config(&config).is_ok());
    }
}
