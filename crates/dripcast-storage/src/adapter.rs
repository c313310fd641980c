// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the storage traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use dripcast_config::model::StorageConfig;
use dripcast_core::traits::{
    CampaignStore, ContactStore, DeviceStore, MessageStore, RecipientStore, StorageAdapter,
};
use dripcast_core::{
    Campaign, Candidate, ChatMessage, Contact, Device, DripcastError, HealthStatus, NewCampaign,
    Page, ReceiptType, Recipient, RosterEntry, SendStatus,
};

use crate::database::{Database, map_tr_err};
use crate::queries;

/// SQLite-backed storage.
///
/// The database is opened lazily by [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Build and initialize in one step.
    pub async fn open(config: StorageConfig) -> Result<Self, DripcastError> {
        let storage = Self::new(config);
        storage.initialize().await?;
        Ok(storage)
    }

    fn db(&self) -> Result<&Database, DripcastError> {
        self.db.get().ok_or_else(|| DripcastError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn initialize(&self) -> Result<(), DripcastError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| DripcastError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), DripcastError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> rusqlite::Result<()> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthStatus, DripcastError> {
        let Some(db) = self.db.get() else {
            return Ok(HealthStatus::Unhealthy("not initialized".to_string()));
        };
        let integrity: String = db
            .connection()
            .call(|conn| -> rusqlite::Result<_> {
                conn.query_row("PRAGMA quick_check", [], |row| row.get(0))
            })
            .await
            .map_err(map_tr_err)?;
        if integrity == "ok" {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Degraded(integrity))
        }
    }
}

#[async_trait]
impl DeviceStore for SqliteStorage {
    async fn insert_device(&self, device: &Device) -> Result<(), DripcastError> {
        queries::devices::insert_device(self.db()?, device).await
    }

    async fn get_device(&self, id: &str) -> Result<Option<Device>, DripcastError> {
        queries::devices::get_device(self.db()?, id).await
    }

    async fn list_devices(&self, owner_user_id: i64) -> Result<Vec<Device>, DripcastError> {
        queries::devices::list_devices(self.db()?, owner_user_id).await
    }

    async fn list_linked_devices(&self) -> Result<Vec<Device>, DripcastError> {
        queries::devices::list_linked_devices(self.db()?).await
    }

    async fn set_link_id(&self, id: &str, link_id: &str) -> Result<bool, DripcastError> {
        queries::devices::set_link_id(self.db()?, id, link_id).await
    }

    async fn set_connected(&self, id: &str, connected: bool) -> Result<bool, DripcastError> {
        queries::devices::set_connected(self.db()?, id, connected).await
    }

    async fn delete_device(&self, id: &str) -> Result<bool, DripcastError> {
        queries::devices::delete_device(self.db()?, id).await
    }
}

#[async_trait]
impl ContactStore for SqliteStorage {
    async fn insert_contact(
        &self,
        owner_user_id: i64,
        name: &str,
        phone: &str,
    ) -> Result<Contact, DripcastError> {
        queries::contacts::insert_contact(self.db()?, owner_user_id, name, phone).await
    }

    async fn list_contacts(&self, owner_user_id: i64) -> Result<Vec<Contact>, DripcastError> {
        queries::contacts::list_contacts(self.db()?, owner_user_id).await
    }

    async fn random_unchecked_contact(&self) -> Result<Option<Contact>, DripcastError> {
        queries::contacts::random_unchecked_contact(self.db()?).await
    }

    async fn mark_contact_registered(
        &self,
        id: i64,
        verified_name: Option<&str>,
    ) -> Result<(), DripcastError> {
        queries::contacts::mark_contact_registered(self.db()?, id, verified_name).await
    }

    async fn delete_contact(&self, id: i64) -> Result<bool, DripcastError> {
        queries::contacts::delete_contact(self.db()?, id).await
    }

    async fn create_group(&self, owner_user_id: i64, name: &str) -> Result<i64, DripcastError> {
        queries::contacts::create_group(self.db()?, owner_user_id, name).await
    }

    async fn add_group_member(
        &self,
        group_id: i64,
        contact_id: i64,
    ) -> Result<(), DripcastError> {
        queries::contacts::add_group_member(self.db()?, group_id, contact_id).await
    }

    async fn replace_roster(
        &self,
        device_id: &str,
        entries: &[RosterEntry],
    ) -> Result<usize, DripcastError> {
        queries::contacts::replace_roster(self.db()?, device_id, entries).await
    }

    async fn list_roster(&self, device_id: &str) -> Result<Vec<RosterEntry>, DripcastError> {
        queries::contacts::list_roster(self.db()?, device_id).await
    }
}

#[async_trait]
impl CampaignStore for SqliteStorage {
    async fn insert_campaign(&self, campaign: &NewCampaign) -> Result<Campaign, DripcastError> {
        queries::campaigns::insert_campaign(self.db()?, campaign).await
    }

    async fn get_campaign(&self, id: i64) -> Result<Option<Campaign>, DripcastError> {
        queries::campaigns::get_campaign(self.db()?, id).await
    }

    async fn pick_due_campaign(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<Campaign>, DripcastError> {
        queries::campaigns::pick_due_campaign(self.db()?, now).await
    }

    async fn set_paused(&self, id: i64, paused: bool) -> Result<bool, DripcastError> {
        queries::campaigns::set_paused(self.db()?, id, paused).await
    }

    async fn mark_completed(&self, id: i64, at: DateTime<Utc>) -> Result<bool, DripcastError> {
        queries::campaigns::mark_completed(self.db()?, id, at).await
    }

    async fn list_campaigns(
        &self,
        owner_user_id: i64,
        device_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<Page<Campaign>, DripcastError> {
        queries::campaigns::list_campaigns(self.db()?, owner_user_id, device_id, page, limit).await
    }

    async fn delete_campaign(&self, id: i64) -> Result<bool, DripcastError> {
        queries::campaigns::delete_campaign(self.db()?, id).await
    }
}

#[async_trait]
impl RecipientStore for SqliteStorage {
    async fn eligible_candidates(
        &self,
        campaign: &Campaign,
    ) -> Result<Vec<Candidate>, DripcastError> {
        queries::recipients::eligible_candidates(self.db()?, campaign).await
    }

    async fn reserve_recipient(
        &self,
        campaign_id: i64,
        candidate: &Candidate,
        at: DateTime<Utc>,
    ) -> Result<Option<Recipient>, DripcastError> {
        queries::recipients::reserve_recipient(self.db()?, campaign_id, candidate, at).await
    }

    async fn mark_sent(
        &self,
        recipient_id: i64,
        message_id: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<bool, DripcastError> {
        queries::recipients::mark_sent(self.db()?, recipient_id, message_id, sent_at).await
    }

    async fn advance_receipts(
        &self,
        device_id: &str,
        message_ids: &[String],
        status: SendStatus,
    ) -> Result<usize, DripcastError> {
        queries::recipients::advance_receipts(self.db()?, device_id, message_ids, status).await
    }

    async fn list_recipients(
        &self,
        campaign_id: i64,
        page: u32,
        limit: u32,
    ) -> Result<Page<Recipient>, DripcastError> {
        queries::recipients::list_recipients(self.db()?, campaign_id, page, limit).await
    }

    async fn sweep_stale_reservations(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Recipient>, DripcastError> {
        queries::recipients::sweep_stale_reservations(self.db()?, cutoff).await
    }
}

#[async_trait]
impl MessageStore for SqliteStorage {
    async fn insert_message(&self, message: &ChatMessage) -> Result<(), DripcastError> {
        queries::messages::insert_message(self.db()?, message).await
    }

    async fn update_message_receipt(
        &self,
        device_id: &str,
        message_ids: &[String],
        receipt: ReceiptType,
    ) -> Result<usize, DripcastError> {
        queries::messages::update_message_receipt(self.db()?, device_id, message_ids, receipt)
            .await
    }

    async fn list_messages(
        &self,
        device_id: &str,
        remote_phone: &str,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, DripcastError> {
        queries::messages::list_messages(self.db()?, device_id, remote_phone, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config(dir: &tempfile::TempDir) -> StorageConfig {
        StorageConfig {
            database_path: dir.path().join("test.db").to_string_lossy().into_owned(),
            wal_mode: true,
        }
    }

    #[tokio::test]
    async fn operations_fail_before_initialize() {
        let dir = tempdir().unwrap();
        let storage = SqliteStorage::new(config(&dir));
        assert!(storage.get_device("x").await.is_err());
        assert_eq!(
            storage.health_check().await.unwrap(),
            HealthStatus::Unhealthy("not initialized".to_string())
        );
    }

    #[tokio::test]
    async fn initialize_twice_is_rejected() {
        let dir = tempdir().unwrap();
        let storage = SqliteStorage::open(config(&dir)).await.unwrap();
        assert!(storage.initialize().await.is_err());
        assert_eq!(storage.health_check().await.unwrap(), HealthStatus::Healthy);
        storage.close().await.unwrap();
    }
}
