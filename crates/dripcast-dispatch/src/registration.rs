// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registration check: confirm one unchecked contact per tick.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use dripcast_core::{ContactStore, DeviceStore, DripcastError, Storage};
use dripcast_session::SessionPool;

use crate::runner::RecurringTask;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// Every contact has been checked.
    Idle,
    /// None of the owner's devices has a live session.
    NotReady { contact_id: i64 },
    Registered { contact_id: i64 },
    /// The phone has no account; the contact was deleted.
    Removed { contact_id: i64 },
}

pub struct RegistrationChecker {
    storage: Arc<dyn Storage>,
    pool: Arc<SessionPool>,
}

impl RegistrationChecker {
    pub fn new(storage: Arc<dyn Storage>, pool: Arc<SessionPool>) -> Self {
        Self { storage, pool }
    }

    pub async fn check_once(&self) -> Result<RegistrationOutcome, DripcastError> {
        let Some(contact) = self.storage.random_unchecked_contact().await? else {
            return Ok(RegistrationOutcome::Idle);
        };
        let contact_id = contact.id;

        let devices = self.storage.list_devices(contact.owner_user_id).await?;
        let Some(client) = devices.iter().find_map(|d| self.pool.live_client(&d.id)) else {
            debug!(
                contact_id,
                owner_user_id = contact.owner_user_id,
                "no live device for registration check"
            );
            return Ok(RegistrationOutcome::NotReady { contact_id });
        };

        let result = client
            .is_registered(std::slice::from_ref(&contact.phone))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DripcastError::protocol("registration lookup returned no result"))?;

        if result.registered {
            self.storage
                .mark_contact_registered(contact_id, result.verified_name.as_deref())
                .await?;
            info!(contact_id, "contact confirmed registered");
            Ok(RegistrationOutcome::Registered { contact_id })
        } else {
            self.storage.delete_contact(contact_id).await?;
            info!(contact_id, "unregistered contact removed");
            Ok(RegistrationOutcome::Removed { contact_id })
        }
    }
}

#[async_trait]
impl RecurringTask for RegistrationChecker {
    fn name(&self) -> &'static str {
        "registration"
    }

    async fn run_once(&self) -> Result<(), DripcastError> {
        let outcome = self.check_once().await?;
        debug!(?outcome, "registration tick finished");
        Ok(())
    }
}
