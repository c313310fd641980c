// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Owner-facing campaign operations and the stale reservation sweep.
//!
//! Targeting is fixed at creation. After that a campaign can only be
//! paused, resumed or deleted.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use dripcast_config::model::DispatchConfig;
use dripcast_core::{
    Campaign, CampaignStore, ContactFilter, DeviceStore, DripcastError, MediaAttachment,
    NewCampaign, Page, Recipient, RecipientStore, Storage, TargetMode, ToggleAction,
    normalize_phone_list,
};

use crate::runner::RecurringTask;

/// Creation request, before validation and normalisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignRequest {
    pub name: String,
    pub body: String,
    #[serde(default)]
    pub media: Option<MediaAttachment>,
    pub target_mode: TargetMode,
    #[serde(default = "default_filter")]
    pub target_filter: ContactFilter,
    #[serde(default)]
    pub explicit_phones: Vec<String>,
    /// Defaults to now.
    #[serde(default)]
    pub scheduled_start: Option<DateTime<Utc>>,
}

fn default_filter() -> ContactFilter {
    ContactFilter::All
}

pub struct CampaignService {
    storage: Arc<dyn Storage>,
    config: DispatchConfig,
}

impl CampaignService {
    pub fn new(storage: Arc<dyn Storage>, config: DispatchConfig) -> Self {
        Self { storage, config }
    }

    /// Validate and store a campaign. It becomes due at `scheduled_start`.
    pub async fn create(
        &self,
        owner_user_id: i64,
        device_id: &str,
        request: CampaignRequest,
    ) -> Result<Campaign, DripcastError> {
        self.storage
            .get_device(device_id)
            .await?
            .filter(|d| d.owner_user_id == owner_user_id)
            .ok_or_else(|| DripcastError::not_found("device", device_id))?;

        let name = request.name.trim();
        if name.is_empty() {
            return Err(DripcastError::Validation(
                "campaign name must not be empty".to_string(),
            ));
        }
        let body_len = request.body.chars().count();
        if body_len < self.config.min_message_length {
            return Err(DripcastError::Validation(format!(
                "message must be at least {} characters (got {body_len})",
                self.config.min_message_length
            )));
        }
        if let Some(media) = &request.media {
            media.decode()?;
        }
        if request.target_mode == TargetMode::DeviceContacts
            && matches!(request.target_filter, ContactFilter::Group(_))
        {
            return Err(DripcastError::Validation(
                "group filter is not available for device contacts".to_string(),
            ));
        }

        let (target_filter, explicit_phones) = match request.target_mode {
            TargetMode::ExplicitPhones => {
                let country = &self.config.default_country_code;
                (
                    ContactFilter::All,
                    normalize_phone_list(&request.explicit_phones, country)?,
                )
            }
            _ => (request.target_filter, Vec::new()),
        };

        let new = NewCampaign {
            owner_user_id,
            device_id: device_id.to_string(),
            name: name.to_string(),
            body: request.body,
            media: request.media,
            target_mode: request.target_mode,
            target_filter,
            explicit_phones,
            scheduled_start: request.scheduled_start.unwrap_or_else(Utc::now),
        };
        if self.audience_size(&new).await? == 0 {
            return Err(DripcastError::Validation("no recipients".to_string()));
        }

        let campaign = self.storage.insert_campaign(&new).await?;
        info!(
            campaign_id = campaign.id,
            device_id,
            mode = %campaign.target_mode,
            "campaign created"
        );
        Ok(campaign)
    }

    /// Eligible audience of a campaign that has not been stored yet.
    async fn audience_size(&self, new: &NewCampaign) -> Result<usize, DripcastError> {
        let now = Utc::now();
        let draft = Campaign {
            id: 0,
            owner_user_id: new.owner_user_id,
            device_id: new.device_id.clone(),
            name: new.name.clone(),
            body: String::new(),
            media: None,
            target_mode: new.target_mode,
            target_filter: new.target_filter.clone(),
            explicit_phones: new.explicit_phones.clone(),
            scheduled_start: new.scheduled_start,
            completed: false,
            completed_at: None,
            paused: false,
            created_at: now,
        };
        Ok(self.storage.eligible_candidates(&draft).await?.len())
    }

    async fn owned(&self, owner_user_id: i64, id: i64) -> Result<Campaign, DripcastError> {
        self.storage
            .get_campaign(id)
            .await?
            .filter(|c| c.owner_user_id == owner_user_id)
            .ok_or_else(|| DripcastError::not_found("campaign", id))
    }

    /// Pause or resume a campaign.
    pub async fn toggle(
        &self,
        owner_user_id: i64,
        id: i64,
        action: ToggleAction,
    ) -> Result<Campaign, DripcastError> {
        let campaign = self.owned(owner_user_id, id).await?;
        if campaign.completed {
            return Err(DripcastError::Validation(
                "campaign is already complete".to_string(),
            ));
        }
        let paused = action == ToggleAction::Pause;
        self.storage.set_paused(id, paused).await?;
        info!(campaign_id = id, %action, "campaign toggled");
        Ok(Campaign { paused, ..campaign })
    }

    pub async fn list(
        &self,
        owner_user_id: i64,
        device_id: &str,
        page: u32,
    ) -> Result<Page<Campaign>, DripcastError> {
        self.storage
            .list_campaigns(owner_user_id, device_id, page, self.config.page_size)
            .await
    }

    pub async fn recipients(
        &self,
        owner_user_id: i64,
        id: i64,
        page: u32,
    ) -> Result<Page<Recipient>, DripcastError> {
        self.owned(owner_user_id, id).await?;
        self.storage
            .list_recipients(id, page, self.config.page_size)
            .await
    }

    pub async fn delete(&self, owner_user_id: i64, id: i64) -> Result<(), DripcastError> {
        self.owned(owner_user_id, id).await?;
        self.storage.delete_campaign(id).await?;
        info!(campaign_id = id, "campaign deleted");
        Ok(())
    }
}

/// Mark reservations older than `older_than` as failed and return them.
///
/// Nothing is re-sent; the phones stay excluded from their campaigns.
pub async fn sweep_stale_reservations(
    storage: &dyn Storage,
    older_than: Duration,
) -> Result<Vec<Recipient>, DripcastError> {
    let age = chrono::Duration::from_std(older_than)
        .map_err(|e| DripcastError::Validation(format!("sweep age out of range: {e}")))?;
    let swept = storage.sweep_stale_reservations(Utc::now() - age).await?;
    for recipient in &swept {
        warn!(
            campaign_id = recipient.campaign_id,
            recipient_id = recipient.id,
            reserved_at = %recipient.reserved_at,
            "stale reservation marked failed"
        );
    }
    info!(swept = swept.len(), "stale reservation sweep finished");
    Ok(swept)
}

/// Recurring wrapper around [`sweep_stale_reservations`].
pub struct ReservationSweeper {
    storage: Arc<dyn Storage>,
    older_than: Duration,
}

impl ReservationSweeper {
    pub fn new(storage: Arc<dyn Storage>, older_than: Duration) -> Self {
        Self {
            storage,
            older_than,
        }
    }
}

#[async_trait]
impl RecurringTask for ReservationSweeper {
    fn name(&self) -> &'static str {
        "reservation-sweep"
    }

    async fn run_once(&self) -> Result<(), DripcastError> {
        sweep_stale_reservations(self.storage.as_ref(), self.older_than).await?;
        Ok(())
    }
}
