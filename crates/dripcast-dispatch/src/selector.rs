// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recipient selection.

use std::sync::{Arc, Mutex};

use rand::Rng;
use rand::rngs::StdRng;

use dripcast_core::{Campaign, Candidate, DripcastError, RecipientStore, Storage};

/// Result of asking for the next recipient of a campaign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// `remaining` counts the eligible pool before removing `candidate`.
    Next {
        candidate: Candidate,
        remaining: usize,
    },
    /// Nobody left to contact. This is the completion signal.
    Exhausted,
}

/// Picks recipients uniformly at random from a campaign's eligible pool.
///
/// Selection is read-only; reserving the pick is up to the caller.
pub struct RecipientSelector {
    storage: Arc<dyn Storage>,
    rng: Mutex<StdRng>,
}

impl RecipientSelector {
    pub fn new(storage: Arc<dyn Storage>, rng: StdRng) -> Self {
        Self {
            storage,
            rng: Mutex::new(rng),
        }
    }

    pub async fn select_next(&self, campaign: &Campaign) -> Result<Selection, DripcastError> {
        let mut eligible = self.storage.eligible_candidates(campaign).await?;
        let remaining = eligible.len();
        if remaining == 0 {
            return Ok(Selection::Exhausted);
        }
        let index = {
            let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
            rng.gen_range(0..remaining)
        };
        Ok(Selection::Next {
            candidate: eligible.swap_remove(index),
            remaining,
        })
    }
}
