// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` overrides `log_level`.
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

fn default_filter(log_level: &str) -> EnvFilter {
    EnvFilter::new(format!("dripcast={log_level},warn"))
}
