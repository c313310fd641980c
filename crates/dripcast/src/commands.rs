// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator commands that work on the database alone, without any device
//! sessions.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use dripcast_config::model::DripcastConfig;
use dripcast_core::{DripcastError, HealthStatus, StorageAdapter};
use dripcast_dispatch::{CampaignService, sweep_stale_reservations};
use dripcast_storage::SqliteStorage;

async fn open(config: &DripcastConfig) -> Result<SqliteStorage, DripcastError> {
    SqliteStorage::open(config.storage.clone()).await
}

/// Open the database and report its health.
pub async fn check(config: &DripcastConfig) -> Result<HealthStatus, DripcastError> {
    let storage = open(config).await?;
    let health = storage.health_check().await?;
    storage.close().await?;
    Ok(health)
}

/// Fail every reservation older than `older_than_secs`, returning a JSON
/// summary of the affected rows.
pub async fn sweep(config: &DripcastConfig, older_than_secs: u64) -> Result<Value, DripcastError> {
    check_sweep_age(config, older_than_secs)?;
    let storage = open(config).await?;
    let swept =
        sweep_stale_reservations(&storage, Duration::from_secs(older_than_secs)).await?;
    storage.close().await?;
    Ok(json!({
        "swept": swept.len(),
        "recipients": swept
            .iter()
            .map(|r| json!({
                "campaign_id": r.campaign_id,
                "recipient_id": r.id,
                "phone": r.phone,
                "reserved_at": r.reserved_at,
            }))
            .collect::<Vec<_>>(),
    }))
}

/// Reject ages short enough to fail a reservation whose tick is still
/// waiting out its typing delay.
pub fn check_sweep_age(config: &DripcastConfig, older_than_secs: u64) -> Result<(), DripcastError> {
    let min = config.dispatch.min_stale_reservation_secs();
    if older_than_secs < min {
        return Err(DripcastError::Validation(format!(
            "sweep age must be at least {min}s, got {older_than_secs}s"
        )));
    }
    Ok(())
}

/// One page of an owner's campaigns on a device.
pub async fn campaigns(
    config: &DripcastConfig,
    owner_user_id: i64,
    device_id: &str,
    page: u32,
) -> Result<Value, DripcastError> {
    let storage = Arc::new(open(config).await?);
    let service = CampaignService::new(storage.clone(), config.dispatch.clone());
    let listing = service.list(owner_user_id, device_id, page).await?;
    storage.close().await?;
    Ok(json!({
        "page": listing.page,
        "total": listing.total,
        "prev_page": listing.prev_page,
        "next_page": listing.next_page,
        "items": listing
            .items
            .iter()
            .map(|c| json!({
                "id": c.id,
                "name": c.name,
                "status": c.status(),
                "target_mode": c.target_mode,
                "scheduled_start": c.scheduled_start,
                "completed_at": c.completed_at,
            }))
            .collect::<Vec<_>>(),
    }))
}
