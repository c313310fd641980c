// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Device session pool.
//!
//! The pool owns at most one protocol client per device id. Every
//! operation that creates, connects or tears down a client runs under that
//! device's slot lock, so pairing and reconnects on one device are
//! serialized while other devices proceed independently.
//!
//! Each pooled client gets an event pump task that feeds its event stream
//! through the [`Reconciler`]. The pump only holds a weak reference to the
//! pool, so dropping the pool stops the pumps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use dripcast_config::model::PairingConfig;
use dripcast_core::{
    ClientFactory, Device, DeviceStore, DripcastError, LoginOutcome, ProtocolClient,
    ProtocolEvent, SessionState, Storage,
};

use crate::qr::render_qr_data_url;
use crate::reconciler::{DeviceTransitions, Reconciler};

#[derive(Default)]
struct DeviceSlot {
    inner: Mutex<SlotInner>,
    /// A pairing code has been handed out and the link is not yet stored.
    pairing: AtomicBool,
}

#[derive(Default)]
struct SlotInner {
    client: Option<Arc<dyn ProtocolClient>>,
    pump: Option<JoinHandle<()>>,
    code_drain: Option<JoinHandle<()>>,
    /// Set once the slot has been evicted; a waiter that acquires the lock
    /// afterwards must not revive it.
    retired: bool,
}

/// Registry of live protocol clients, keyed by device id.
pub struct SessionPool {
    storage: Arc<dyn Storage>,
    factory: Arc<dyn ClientFactory>,
    config: PairingConfig,
    reconciler: Reconciler,
    slots: DashMap<String, Arc<DeviceSlot>>,
    this: Weak<SessionPool>,
}

impl SessionPool {
    pub fn new(
        storage: Arc<dyn Storage>,
        factory: Arc<dyn ClientFactory>,
        config: PairingConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            reconciler: Reconciler::new(storage.clone()),
            storage,
            factory,
            config,
            slots: DashMap::new(),
            this: this.clone(),
        })
    }

    fn slot(&self, device_id: &str) -> Arc<DeviceSlot> {
        let entry = self.slots.entry(device_id.to_string()).or_default();
        Arc::clone(&*entry)
    }

    /// Register a new, unlinked device for `owner_user_id`.
    pub async fn provision_device(
        &self,
        owner_user_id: i64,
        name: &str,
    ) -> Result<Device, DripcastError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DripcastError::Validation(
                "device name must not be empty".to_string(),
            ));
        }
        let device = Device {
            id: uuid::Uuid::new_v4().to_string(),
            owner_user_id,
            name: name.to_string(),
            link_id: None,
            connected: false,
            created_at: Utc::now(),
        };
        self.storage.insert_device(&device).await?;
        info!(device_id = %device.id, owner_user_id, "device provisioned");
        Ok(device)
    }

    /// Fetch a device, treating another owner's device as missing.
    pub async fn owned_device(
        &self,
        owner_user_id: i64,
        device_id: &str,
    ) -> Result<Device, DripcastError> {
        self.storage
            .get_device(device_id)
            .await?
            .filter(|d| d.owner_user_id == owner_user_id)
            .ok_or_else(|| DripcastError::not_found("device", device_id))
    }

    /// Delete a device and drop its pooled client.
    pub async fn remove_device(
        &self,
        owner_user_id: i64,
        device_id: &str,
    ) -> Result<(), DripcastError> {
        let device = self.owned_device(owner_user_id, device_id).await?;
        self.storage.delete_device(&device.id).await?;
        self.evict(&device.id).await;
        info!(device_id, "device removed");
        Ok(())
    }

    /// Start pairing for an unlinked device, or reconnect a linked one.
    pub async fn request_login(&self, device_id: &str) -> Result<LoginOutcome, DripcastError> {
        // Unknown ids never get a slot.
        if self.storage.get_device(device_id).await?.is_none() {
            return Err(DripcastError::not_found("device", device_id));
        }

        let slot = self.slot(device_id);
        let mut inner = slot.inner.lock().await;
        let device = self.recheck(device_id, &slot, &mut inner).await?;
        let client = self.ensure_client(&device, &mut inner)?;

        if device.is_linked() || client.link_id().is_some() {
            client.disconnect().await;
            client.connect().await?;
            info!(device_id, "linked device reconnected");
            return Ok(LoginOutcome::Reconnected {
                timeout_secs: self.config.reconnect_timeout_secs,
            });
        }

        match self.start_pairing(device_id, &client, &mut inner).await {
            Ok(outcome) => {
                slot.pairing.store(true, Ordering::SeqCst);
                info!(device_id, "pairing code issued");
                Ok(outcome)
            }
            Err(e) => {
                warn!(device_id, error = %e, "pairing failed");
                Self::discard_client(&mut inner).await;
                Err(e)
            }
        }
    }

    async fn start_pairing(
        &self,
        device_id: &str,
        client: &Arc<dyn ProtocolClient>,
        inner: &mut SlotInner,
    ) -> Result<LoginOutcome, DripcastError> {
        let mut codes = client
            .pairing_channel()
            .await
            .map_err(|e| DripcastError::Pairing(format!("cannot open pairing channel: {e}")))?;
        if !client.is_connected() {
            client
                .connect()
                .await
                .map_err(|e| DripcastError::Pairing(format!("connect failed: {e}")))?;
        }

        let wait = Duration::from_secs(self.config.code_wait_secs);
        let first = match tokio::time::timeout(wait, codes.recv()).await {
            Ok(Some(code)) => code,
            Ok(None) => {
                return Err(DripcastError::Pairing(
                    "pairing channel closed before issuing a code".to_string(),
                ));
            }
            Err(_) => return Err(DripcastError::Timeout { duration: wait }),
        };
        let image = render_qr_data_url(&first.code, self.config.qr_size)?;

        // Later codes replace the first one on the client side; keep the
        // channel drained so the client never blocks on it.
        let id = device_id.to_string();
        let drain = tokio::spawn(async move {
            while let Some(code) = codes.recv().await {
                debug!(device_id = %id, expires_in = ?code.expires_in, "pairing code rotated");
            }
        });
        if let Some(previous) = inner.code_drain.replace(drain) {
            previous.abort();
        }

        Ok(LoginOutcome::QrCode {
            image,
            timeout_secs: first.expires_in.as_secs(),
        })
    }

    /// Re-read the device row once its slot lock is held. A device deleted
    /// in the meantime has its slot retired and dropped from the map, so a
    /// racing eviction cannot leave a client behind for it.
    async fn recheck(
        &self,
        device_id: &str,
        slot: &Arc<DeviceSlot>,
        inner: &mut SlotInner,
    ) -> Result<Device, DripcastError> {
        if !inner.retired {
            if let Some(device) = self.storage.get_device(device_id).await? {
                return Ok(device);
            }
            inner.retired = true;
            self.slots.remove_if(device_id, |_, s| Arc::ptr_eq(s, slot));
            Self::discard_client(inner).await;
            debug!(device_id, "device deleted while waiting for its slot");
        }
        Err(DripcastError::not_found("device", device_id))
    }

    fn ensure_client(
        &self,
        device: &Device,
        inner: &mut SlotInner,
    ) -> Result<Arc<dyn ProtocolClient>, DripcastError> {
        if let Some(client) = &inner.client {
            return Ok(client.clone());
        }
        let client = self.factory.create(device)?;
        inner.pump = Some(self.spawn_pump(device.id.clone(), client.clone()));
        inner.client = Some(client.clone());
        debug!(device_id = %device.id, linked = device.is_linked(), "protocol client created");
        Ok(client)
    }

    async fn discard_client(inner: &mut SlotInner) {
        if let Some(drain) = inner.code_drain.take() {
            drain.abort();
        }
        if let Some(client) = inner.client.take() {
            client.disconnect().await;
        }
        if let Some(pump) = inner.pump.take() {
            pump.abort();
        }
    }

    fn spawn_pump(&self, device_id: String, client: Arc<dyn ProtocolClient>) -> JoinHandle<()> {
        let mut events = client.subscribe();
        let pool = self.this.clone();
        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(device_id = %device_id, skipped, "event stream lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(pool) = pool.upgrade() else { break };
                let terminal = matches!(event, ProtocolEvent::LoggedOut { .. });
                pool.reconciler
                    .handle(&device_id, client.as_ref(), &event, pool.as_ref())
                    .await;
                if terminal {
                    break;
                }
            }
            debug!(device_id = %device_id, "event pump stopped");
        })
    }

    /// The device's client, only if it is logged in.
    ///
    /// Never waits: a device busy with a login request is reported as not
    /// ready.
    pub fn live_client(&self, device_id: &str) -> Option<Arc<dyn ProtocolClient>> {
        let slot = self.slots.get(device_id).map(|s| Arc::clone(s.value()))?;
        let inner = slot.inner.try_lock().ok()?;
        inner
            .client
            .as_ref()
            .filter(|client| client.is_logged_in())
            .cloned()
    }

    /// Where the device currently is in its lifecycle.
    pub async fn state(&self, device_id: &str) -> Result<SessionState, DripcastError> {
        let Some(device) = self.storage.get_device(device_id).await? else {
            return Ok(SessionState::Absent);
        };
        if !device.is_linked() {
            let pairing = self
                .slots
                .get(device_id)
                .is_some_and(|s| s.pairing.load(Ordering::SeqCst));
            return Ok(if pairing {
                SessionState::Pairing
            } else {
                SessionState::Provisioned
            });
        }
        Ok(if self.live_client(device_id).is_some() {
            SessionState::Connected
        } else {
            SessionState::LinkedDisconnected
        })
    }

    /// Whether the pool holds a slot for the device.
    pub fn is_pooled(&self, device_id: &str) -> bool {
        self.slots.contains_key(device_id)
    }

    /// Reconnect every linked device. Failures are logged and skipped.
    pub async fn restore_linked_devices(&self) -> Result<usize, DripcastError> {
        let devices = self.storage.list_linked_devices().await?;
        let total = devices.len();
        let mut restored = 0;
        for device in devices {
            match self.connect_device(&device).await {
                Ok(()) => restored += 1,
                Err(e) => warn!(device_id = %device.id, error = %e, "reconnect failed"),
            }
        }
        info!(restored, total, "linked devices restored");
        Ok(restored)
    }

    async fn connect_device(&self, device: &Device) -> Result<(), DripcastError> {
        let slot = self.slot(&device.id);
        let mut inner = slot.inner.lock().await;
        let device = self.recheck(&device.id, &slot, &mut inner).await?;
        let client = self.ensure_client(&device, &mut inner)?;
        if !client.is_connected() {
            client.connect().await?;
        }
        Ok(())
    }

    /// Drop the device's client, if any. The next reference starts fresh.
    pub async fn evict(&self, device_id: &str) {
        let Some((_, slot)) = self.slots.remove(device_id) else {
            return;
        };
        slot.pairing.store(false, Ordering::SeqCst);
        let mut inner = slot.inner.lock().await;
        inner.retired = true;
        Self::discard_client(&mut inner).await;
        debug!(device_id, "pooled client evicted");
    }

    /// Disconnect every pooled client.
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.slots.iter().map(|e| e.key().clone()).collect();
        let count = ids.len();
        for id in ids {
            self.evict(&id).await;
        }
        info!(count, "session pool shut down");
    }
}

#[async_trait]
impl DeviceTransitions for SessionPool {
    async fn paired(&self, device_id: &str, link_id: &str) -> Result<(), DripcastError> {
        if self.storage.set_link_id(device_id, link_id).await? {
            info!(device_id, "device paired");
        } else {
            warn!(device_id, "pairing ignored: device missing or already linked");
        }
        if let Some(slot) = self.slots.get(device_id) {
            slot.pairing.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn logged_out(&self, device_id: &str) -> Result<(), DripcastError> {
        self.storage.delete_device(device_id).await?;
        info!(device_id, "device logged out and removed");
        // Eviction aborts the event pump, which may be the caller; keep it last.
        self.evict(device_id).await;
        Ok(())
    }
}
