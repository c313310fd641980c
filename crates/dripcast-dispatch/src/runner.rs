// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Jittered recurring task loop.
//!
//! Each task waits a randomized interval, then runs one tick to completion.
//! Ticks of the same task never overlap. A failing or panicking tick is
//! logged and the loop carries on. Cancellation is observed between ticks
//! only.

use std::sync::Arc;

use async_trait::async_trait;
use rand::rngs::StdRng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use dripcast_core::DripcastError;

use crate::pacing::PacingPolicy;

/// One unit of recurring background work.
#[async_trait]
pub trait RecurringTask: Send + Sync + 'static {
    /// Label used in logs.
    fn name(&self) -> &'static str;

    async fn run_once(&self) -> Result<(), DripcastError>;
}

/// Run `task` until `cancel` fires.
pub fn spawn_recurring(
    task: Arc<dyn RecurringTask>,
    interval: PacingPolicy,
    mut rng: StdRng,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let name = task.name();
        info!(
            task = name,
            min_secs = interval.min().as_secs(),
            max_secs = interval.max().as_secs(),
            "recurring task started"
        );
        loop {
            let delay = interval.sample(&mut rng);
            debug!(task = name, delay_ms = delay.as_millis() as u64, "next tick scheduled");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            run_tick(task.clone()).await;
        }
        info!(task = name, "recurring task stopped");
    })
}

/// Run one tick in its own task so a panic stays contained.
pub async fn run_tick(task: Arc<dyn RecurringTask>) -> bool {
    let name = task.name();
    match tokio::spawn(async move { task.run_once().await }).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(task = name, error = %e, "tick failed");
            false
        }
        Err(e) => {
            error!(task = name, error = %e, "tick aborted");
            false
        }
    }
}
