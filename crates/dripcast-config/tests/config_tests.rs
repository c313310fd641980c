// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the dripcast configuration system.

use dripcast_config::diagnostic::ConfigError;
use dripcast_config::{load_and_validate_path, load_and_validate_str, load_config_from_str};

#[test]
fn full_toml_deserializes() {
    let toml = r#"
[service]
name = "drip-test"
log_level = "debug"

[storage]
database_path = "/tmp/dripcast-test.db"
wal_mode = false

[pairing]
qr_size = 512
code_wait_secs = 10
reconnect_timeout_secs = 15

[dispatch]
enabled = false
interval_min_secs = 60
interval_max_secs = 90
typing_delay_min_secs = 1
typing_delay_max_secs = 2
min_message_length = 10
default_country_code = "44"
page_size = 5
stale_reservation_secs = 3600

[registration]
enabled = false
interval_min_secs = 30
interval_max_secs = 40

[daemon]
shutdown_grace_secs = 2
"#;

    let config = load_and_validate_str(toml).expect("valid TOML should load");
    assert_eq!(config.service.name, "drip-test");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.pairing.qr_size, 512);
    assert!(!config.dispatch.enabled);
    assert_eq!(config.dispatch.default_country_code, "44");
    assert_eq!(config.dispatch.stale_reservation_secs, Some(3600));
    assert!(!config.registration.enabled);
    assert_eq!(config.daemon.shutdown_grace_secs, 2);
}

#[test]
fn empty_toml_yields_defaults() {
    let config = load_config_from_str("").expect("empty config is valid");
    assert!(config.dispatch.enabled);
    assert_eq!(config.dispatch.page_size, 20);
    assert_eq!(config.pairing.reconnect_timeout_secs, 30);
}

#[test]
fn unknown_key_gets_a_suggestion() {
    let toml = r#"
[dispatch]
page_sise = 10
"#;
    let errors = load_and_validate_str(toml).expect_err("typo must be rejected");
    let hit = errors.iter().find_map(|e| match e {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } => Some((key.clone(), suggestion.clone())),
        _ => None,
    });
    assert_eq!(
        hit,
        Some(("page_sise".to_string(), Some("page_size".to_string())))
    );
}

#[test]
fn unknown_section_is_rejected() {
    let errors = load_and_validate_str("[telegram]\nbot_token = \"x\"\n").unwrap_err();
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::UnknownKey { key, .. } if key == "telegram"))
    );
}

#[test]
fn wrong_type_is_reported() {
    let errors = load_and_validate_str("[pairing]\nqr_size = \"big\"\n").unwrap_err();
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { key, .. } if key.contains("qr_size")))
    );
}

#[test]
fn semantic_validation_runs_after_parsing() {
    let toml = r#"
[registration]
interval_min_secs = 500
interval_max_secs = 100
"#;
    let errors = load_and_validate_str(toml).unwrap_err();
    assert!(matches!(&errors[0], ConfigError::Validation { message } if message.contains("registration.interval")));
}

#[test]
fn explicit_path_loads_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dripcast.toml");
    std::fs::write(&path, "[dispatch]\nmin_message_length = 12\n").unwrap();

    let config = load_and_validate_path(&path).expect("file should load");
    assert_eq!(config.dispatch.min_message_length, 12);
}
