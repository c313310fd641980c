// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence seams used by the session pool and the dispatch engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DripcastError;
use crate::events::ReceiptType;
use crate::types::{
    Campaign, Candidate, ChatMessage, Contact, Device, HealthStatus, NewCampaign, Page, Recipient,
    RosterEntry, SendStatus,
};

/// Lifecycle of a storage backend.
#[async_trait]
pub trait StorageAdapter: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Opens connections and applies migrations.
    async fn initialize(&self) -> Result<(), DripcastError>;

    /// Flushes and closes the backend.
    async fn close(&self) -> Result<(), DripcastError>;

    async fn health_check(&self) -> Result<HealthStatus, DripcastError>;
}

#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn insert_device(&self, device: &Device) -> Result<(), DripcastError>;

    async fn get_device(&self, id: &str) -> Result<Option<Device>, DripcastError>;

    async fn list_devices(&self, owner_user_id: i64) -> Result<Vec<Device>, DripcastError>;

    /// Every device with a link identifier, across all owners.
    async fn list_linked_devices(&self) -> Result<Vec<Device>, DripcastError>;

    /// Records the link identifier and marks the device connected.
    ///
    /// An existing link identifier is never overwritten. Returns `false`
    /// when the device does not exist.
    async fn set_link_id(&self, id: &str, link_id: &str) -> Result<bool, DripcastError>;

    async fn set_connected(&self, id: &str, connected: bool) -> Result<bool, DripcastError>;

    /// Returns `false` when there was nothing to delete.
    async fn delete_device(&self, id: &str) -> Result<bool, DripcastError>;
}

#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn insert_contact(
        &self,
        owner_user_id: i64,
        name: &str,
        phone: &str,
    ) -> Result<Contact, DripcastError>;

    async fn list_contacts(&self, owner_user_id: i64) -> Result<Vec<Contact>, DripcastError>;

    /// A random contact whose registration has not been confirmed yet.
    async fn random_unchecked_contact(&self) -> Result<Option<Contact>, DripcastError>;

    /// Marks a contact registered, replacing its name with the verified one if given.
    async fn mark_contact_registered(
        &self,
        id: i64,
        verified_name: Option<&str>,
    ) -> Result<(), DripcastError>;

    async fn delete_contact(&self, id: i64) -> Result<bool, DripcastError>;

    async fn create_group(&self, owner_user_id: i64, name: &str) -> Result<i64, DripcastError>;

    async fn add_group_member(&self, group_id: i64, contact_id: i64)
    -> Result<(), DripcastError>;

    /// Replaces a device's synced roster. Returns the stored entry count.
    async fn replace_roster(
        &self,
        device_id: &str,
        entries: &[RosterEntry],
    ) -> Result<usize, DripcastError>;

    async fn list_roster(&self, device_id: &str) -> Result<Vec<RosterEntry>, DripcastError>;
}

#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn insert_campaign(&self, campaign: &NewCampaign) -> Result<Campaign, DripcastError>;

    async fn get_campaign(&self, id: i64) -> Result<Option<Campaign>, DripcastError>;

    /// A random campaign that is due at `now`, not paused and not completed.
    async fn pick_due_campaign(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<Campaign>, DripcastError>;

    async fn set_paused(&self, id: i64, paused: bool) -> Result<bool, DripcastError>;

    /// Marks the campaign completed. A no-op on an already completed campaign.
    async fn mark_completed(&self, id: i64, at: DateTime<Utc>) -> Result<bool, DripcastError>;

    async fn list_campaigns(
        &self,
        owner_user_id: i64,
        device_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<Page<Campaign>, DripcastError>;

    /// Deletes a campaign together with its recipient rows.
    async fn delete_campaign(&self, id: i64) -> Result<bool, DripcastError>;
}

#[async_trait]
pub trait RecipientStore: Send + Sync {
    /// All phones eligible for the campaign that have no recipient row yet.
    async fn eligible_candidates(
        &self,
        campaign: &Campaign,
    ) -> Result<Vec<Candidate>, DripcastError>;

    /// Creates the `reserved` row for a candidate.
    ///
    /// Returns `None` when the phone already has a row for this campaign.
    async fn reserve_recipient(
        &self,
        campaign_id: i64,
        candidate: &Candidate,
        at: DateTime<Utc>,
    ) -> Result<Option<Recipient>, DripcastError>;

    async fn mark_sent(
        &self,
        recipient_id: i64,
        message_id: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<bool, DripcastError>;

    /// Moves every recipient of the device's campaigns matching one of
    /// `message_ids` forward to `status`. Rows already at or past `status`
    /// are left alone.
    /// Returns the number of rows changed.
    async fn advance_receipts(
        &self,
        device_id: &str,
        message_ids: &[String],
        status: SendStatus,
    ) -> Result<usize, DripcastError>;

    async fn list_recipients(
        &self,
        campaign_id: i64,
        page: u32,
        limit: u32,
    ) -> Result<Page<Recipient>, DripcastError>;

    /// Marks `reserved` rows reserved before `cutoff` as `failed` and returns them.
    async fn sweep_stale_reservations(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Recipient>, DripcastError>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert_message(&self, message: &ChatMessage) -> Result<(), DripcastError>;

    /// Records `receipt` on the device's outbound messages unless a later
    /// receipt is already stored. Returns rows changed.
    async fn update_message_receipt(
        &self,
        device_id: &str,
        message_ids: &[String],
        receipt: ReceiptType,
    ) -> Result<usize, DripcastError>;

    /// Most recent messages of a conversation, newest first.
    async fn list_messages(
        &self,
        device_id: &str,
        remote_phone: &str,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, DripcastError>;
}

/// Every persistence seam in one object.
pub trait Storage:
    StorageAdapter + DeviceStore + ContactStore + CampaignStore + RecipientStore + MessageStore
{
}

impl<T> Storage for T where
    T: StorageAdapter + DeviceStore + ContactStore + CampaignStore + RecipientStore + MessageStore
{
}
