// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end dispatch tests.
//!
//! `TestHarness` wires a temp SQLite database, the session pool with a
//! [`MockClientFactory`], and the dispatch components with seeded
//! randomness and no typing delay.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;

use dripcast_config::model::{DispatchConfig, PairingConfig, StorageConfig};
use dripcast_core::{
    Contact, ContactStore, Device, DeviceStore, DripcastError, ProtocolClient, Storage,
};
use dripcast_dispatch::{BroadcastDispatcher, CampaignService, PacingPolicy, RegistrationChecker};
use dripcast_session::{Messenger, SessionPool};
use dripcast_storage::SqliteStorage;

use crate::mock_client::{MockClient, MockClientFactory};

/// Builder for [`TestHarness`].
pub struct TestHarnessBuilder {
    seed: u64,
    typing: PacingPolicy,
    dispatch: DispatchConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            seed: 7,
            typing: PacingPolicy::immediate(),
            dispatch: DispatchConfig {
                min_message_length: 10,
                ..DispatchConfig::default()
            },
        }
    }

    /// Seed for recipient picks and delays.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_typing_delay(mut self, typing: PacingPolicy) -> Self {
        self.typing = typing;
        self
    }

    pub fn with_dispatch_config(mut self, dispatch: DispatchConfig) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub async fn build(self) -> Result<TestHarness, DripcastError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| DripcastError::Storage { source: e.into() })?;
        let storage = SqliteStorage::open(StorageConfig {
            database_path: temp_dir.path().join("test.db").to_string_lossy().into_owned(),
            wal_mode: true,
        })
        .await?;
        let storage: Arc<dyn Storage> = Arc::new(storage);

        let factory = Arc::new(MockClientFactory::new());
        let pairing = PairingConfig {
            code_wait_secs: 1,
            ..PairingConfig::default()
        };
        let pool = SessionPool::new(storage.clone(), factory.clone(), pairing);

        let dispatcher = BroadcastDispatcher::new(
            storage.clone(),
            pool.clone(),
            self.typing,
            StdRng::seed_from_u64(self.seed),
        );
        let campaigns = CampaignService::new(storage.clone(), self.dispatch.clone());
        let messenger = Messenger::new(
            pool.clone(),
            storage.clone(),
            self.dispatch.default_country_code.clone(),
        );
        let registration = RegistrationChecker::new(storage.clone(), pool.clone());

        Ok(TestHarness {
            storage,
            factory,
            pool,
            dispatcher,
            campaigns,
            messenger,
            registration,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete dispatch stack over mock clients and temp storage.
pub struct TestHarness {
    pub storage: Arc<dyn Storage>,
    pub factory: Arc<MockClientFactory>,
    pub pool: Arc<SessionPool>,
    pub dispatcher: BroadcastDispatcher,
    pub campaigns: CampaignService,
    pub messenger: Messenger,
    pub registration: RegistrationChecker,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Store a device that is already paired, without connecting it.
    pub async fn linked_device(
        &self,
        owner_user_id: i64,
        id: &str,
    ) -> Result<Device, DripcastError> {
        let device = Device {
            id: id.to_string(),
            owner_user_id,
            name: format!("device {id}"),
            link_id: Some(format!("link-{id}")),
            connected: false,
            created_at: Utc::now(),
        };
        self.storage.insert_device(&device).await?;
        Ok(device)
    }

    /// Store a paired device and log its mock client in.
    pub async fn connected_device(
        &self,
        owner_user_id: i64,
        id: &str,
    ) -> Result<Arc<MockClient>, DripcastError> {
        self.linked_device(owner_user_id, id).await?;
        self.pool.request_login(id).await?;
        let client = self
            .factory
            .client(id)
            .ok_or_else(|| DripcastError::Internal(format!("no mock client for {id}")))?;
        if !client.is_logged_in() {
            return Err(DripcastError::Internal(format!("{id} did not log in")));
        }
        Ok(client)
    }

    /// Add an address-book contact, optionally already confirmed registered.
    pub async fn contact(
        &self,
        owner_user_id: i64,
        name: &str,
        phone: &str,
        registered: bool,
    ) -> Result<Contact, DripcastError> {
        let contact = self.storage.insert_contact(owner_user_id, name, phone).await?;
        if registered {
            self.storage.mark_contact_registered(contact.id, None).await?;
        }
        Ok(contact)
    }
}

/// Poll `check` until it holds, for up to two seconds.
pub async fn wait_until<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
