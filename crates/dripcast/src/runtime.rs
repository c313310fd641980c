// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process wiring: storage, the session pool, and the recurring tasks.
//!
//! [`Runtime::start`] opens the database, reconnects every linked device,
//! and spawns the broadcast, registration and reservation-sweep loops.
//! [`Runtime::shutdown`] cancels the loops, waits up to the configured
//! grace period for in-flight ticks, then disconnects every client.

use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use dripcast_config::model::DripcastConfig;
use dripcast_core::{ClientFactory, DripcastError, Recipient, Storage, StorageAdapter};
use dripcast_dispatch::{
    BroadcastDispatcher, CampaignService, PacingPolicy, RecurringTask, RegistrationChecker,
    ReservationSweeper, spawn_recurring, sweep_stale_reservations,
};
use dripcast_session::{Messenger, SessionPool};
use dripcast_storage::SqliteStorage;

pub struct Runtime {
    storage: Arc<dyn Storage>,
    pool: Arc<SessionPool>,
    campaigns: CampaignService,
    messenger: Messenger,
    cancel: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    grace: Duration,
    min_sweep_age: Duration,
}

impl Runtime {
    /// Open storage and start background work.
    ///
    /// Cancelling `cancel` stops the recurring loops; call
    /// [`Runtime::shutdown`] afterwards to release clients and storage.
    pub async fn start(
        config: &DripcastConfig,
        factory: Arc<dyn ClientFactory>,
        cancel: CancellationToken,
    ) -> Result<Self, DripcastError> {
        let storage: Arc<dyn Storage> =
            Arc::new(SqliteStorage::open(config.storage.clone()).await?);
        Self::start_with_storage(config, storage, factory, cancel).await
    }

    /// Like [`Runtime::start`] over an already opened store.
    pub async fn start_with_storage(
        config: &DripcastConfig,
        storage: Arc<dyn Storage>,
        factory: Arc<dyn ClientFactory>,
        cancel: CancellationToken,
    ) -> Result<Self, DripcastError> {
        let pool = SessionPool::new(storage.clone(), factory, config.pairing.clone());
        let restored = pool.restore_linked_devices().await?;
        info!(restored, "linked devices reconnected");

        let dispatch = &config.dispatch;
        let mut tasks = Vec::new();

        if dispatch.enabled {
            let typing = PacingPolicy::from_secs(
                dispatch.typing_delay_min_secs,
                dispatch.typing_delay_max_secs,
            );
            let dispatcher = BroadcastDispatcher::new(
                storage.clone(),
                pool.clone(),
                typing,
                StdRng::from_entropy(),
            );
            let interval =
                PacingPolicy::from_secs(dispatch.interval_min_secs, dispatch.interval_max_secs);
            tasks.push(spawn(Arc::new(dispatcher), interval, &cancel));
        }

        let registration = &config.registration;
        if registration.enabled {
            let checker = RegistrationChecker::new(storage.clone(), pool.clone());
            let interval = PacingPolicy::from_secs(
                registration.interval_min_secs,
                registration.interval_max_secs,
            );
            tasks.push(spawn(Arc::new(checker), interval, &cancel));
        }

        if let Some(secs) = dispatch.stale_reservation_secs {
            let sweeper = ReservationSweeper::new(storage.clone(), Duration::from_secs(secs));
            // Sweep at the same cadence as the reservation age itself.
            let interval = PacingPolicy::from_secs(secs, secs);
            tasks.push(spawn(Arc::new(sweeper), interval, &cancel));
        }

        info!(tasks = tasks.len(), "runtime started");
        Ok(Self {
            campaigns: CampaignService::new(storage.clone(), dispatch.clone()),
            messenger: Messenger::new(
                pool.clone(),
                storage.clone(),
                dispatch.default_country_code.clone(),
            ),
            storage,
            pool,
            cancel,
            tasks,
            grace: Duration::from_secs(config.daemon.shutdown_grace_secs),
            min_sweep_age: Duration::from_secs(dispatch.min_stale_reservation_secs()),
        })
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    pub fn campaigns(&self) -> &CampaignService {
        &self.campaigns
    }

    pub fn messenger(&self) -> &Messenger {
        &self.messenger
    }

    /// Names of the recurring tasks that were started.
    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|(name, _)| *name).collect()
    }

    /// Mark reservations older than `older_than` as failed.
    ///
    /// Ages shorter than the longest typing delay plus a margin are
    /// rejected, since they could fail a reservation that is mid-send.
    pub async fn sweep(&self, older_than: Duration) -> Result<Vec<Recipient>, DripcastError> {
        if older_than < self.min_sweep_age {
            return Err(DripcastError::Validation(format!(
                "sweep age must be at least {}s, got {}s",
                self.min_sweep_age.as_secs(),
                older_than.as_secs()
            )));
        }
        sweep_stale_reservations(self.storage.as_ref(), older_than).await
    }

    /// Block until `cancel` fires.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// Stop the loops, disconnect every client and close storage.
    pub async fn shutdown(self) -> Result<(), DripcastError> {
        self.cancel.cancel();
        for (name, handle) in self.tasks {
            match tokio::time::timeout(self.grace, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(task = name, error = %e, "task ended abnormally"),
                Err(_) => warn!(
                    task = name,
                    grace_secs = self.grace.as_secs(),
                    "task still running after grace period, abandoning"
                ),
            }
        }
        self.pool.shutdown().await;
        self.storage.close().await?;
        info!("runtime stopped");
        Ok(())
    }
}

fn spawn(
    task: Arc<dyn RecurringTask>,
    interval: PacingPolicy,
    cancel: &CancellationToken,
) -> (&'static str, JoinHandle<()>) {
    let name = task.name();
    (
        name,
        spawn_recurring(task, interval, StdRng::from_entropy(), cancel.clone()),
    )
}

/// Run until SIGINT or SIGTERM, then shut down.
pub async fn serve(
    config: &DripcastConfig,
    factory: Arc<dyn ClientFactory>,
) -> Result<(), DripcastError> {
    serve_until(config, factory, crate::shutdown::install_signal_handler()).await
}

/// Run until `cancel` fires, then shut down.
pub async fn serve_until(
    config: &DripcastConfig,
    factory: Arc<dyn ClientFactory>,
    cancel: CancellationToken,
) -> Result<(), DripcastError> {
    let runtime = Runtime::start(config, factory, cancel).await?;
    runtime.cancelled().await;
    info!("shutdown requested");
    runtime.shutdown().await
}
