// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Broadcast dispatch: one recipient of one due campaign per tick.
//!
//! A tick reserves its recipient before it touches the protocol client, so
//! a phone is never picked twice for a campaign even if the send is lost.
//! Reservations whose send never happened stay `reserved` until swept.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use dripcast_core::{CampaignStore, ChatPresence, DripcastError, RecipientStore, Storage};
use dripcast_session::{SessionPool, record_outbound, send_payload};

use crate::pacing::PacingPolicy;
use crate::runner::RecurringTask;
use crate::selector::{RecipientSelector, Selection};

/// What one broadcast tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No campaign was due.
    Idle,
    /// The campaign had nobody left and was marked complete.
    Completed { campaign_id: i64 },
    Sent {
        campaign_id: i64,
        recipient_id: i64,
        message_id: String,
        /// Whether this send also completed the campaign.
        completed: bool,
    },
    /// The reservation was taken concurrently; nothing was sent.
    ReservationLost { campaign_id: i64 },
    /// The campaign's device has no live session. The reservation is kept.
    SessionNotReady {
        campaign_id: i64,
        recipient_id: i64,
    },
    /// The message went out, but the reservation had already been swept to
    /// `failed`, so the row carries no message id.
    SentAfterSweep {
        campaign_id: i64,
        recipient_id: i64,
        message_id: String,
        completed: bool,
    },
    /// The client rejected the send. The reservation is kept.
    SendFailed {
        campaign_id: i64,
        recipient_id: i64,
        error: String,
    },
}

pub struct BroadcastDispatcher {
    storage: Arc<dyn Storage>,
    pool: Arc<SessionPool>,
    selector: RecipientSelector,
    typing: PacingPolicy,
    rng: Mutex<StdRng>,
}

impl BroadcastDispatcher {
    /// `rng` drives both recipient picks and typing delays.
    pub fn new(
        storage: Arc<dyn Storage>,
        pool: Arc<SessionPool>,
        typing: PacingPolicy,
        mut rng: StdRng,
    ) -> Self {
        let selector_rng = StdRng::seed_from_u64(rng.r#gen());
        Self {
            selector: RecipientSelector::new(storage.clone(), selector_rng),
            storage,
            pool,
            typing,
            rng: Mutex::new(rng),
        }
    }

    pub async fn tick(&self) -> Result<TickOutcome, DripcastError> {
        let Some(campaign) = self.storage.pick_due_campaign(Utc::now()).await? else {
            debug!("no campaign due");
            return Ok(TickOutcome::Idle);
        };
        let campaign_id = campaign.id;

        let (candidate, remaining) = match self.selector.select_next(&campaign).await? {
            Selection::Exhausted => {
                self.storage.mark_completed(campaign_id, Utc::now()).await?;
                info!(campaign_id, "campaign exhausted and completed");
                return Ok(TickOutcome::Completed { campaign_id });
            }
            Selection::Next {
                candidate,
                remaining,
            } => (candidate, remaining),
        };

        let Some(recipient) = self
            .storage
            .reserve_recipient(campaign_id, &candidate, Utc::now())
            .await?
        else {
            warn!(campaign_id, "recipient already reserved by another tick");
            return Ok(TickOutcome::ReservationLost { campaign_id });
        };
        let recipient_id = recipient.id;
        debug!(campaign_id, recipient_id, remaining, "recipient reserved");

        let Some(client) = self.pool.live_client(&campaign.device_id) else {
            warn!(
                campaign_id,
                recipient_id,
                device_id = %campaign.device_id,
                "device not ready, reservation kept"
            );
            return Ok(TickOutcome::SessionNotReady {
                campaign_id,
                recipient_id,
            });
        };

        if let Err(e) = client
            .send_chat_presence(&recipient.phone, ChatPresence::Composing)
            .await
        {
            warn!(campaign_id, recipient_id, error = %e, "composing presence failed");
        }
        let delay = {
            let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
            self.typing.sample(&mut *rng)
        };
        tokio::time::sleep(delay).await;

        let receipt = match send_payload(
            client.as_ref(),
            &recipient.phone,
            &campaign.body,
            campaign.media.as_ref(),
        )
        .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(campaign_id, recipient_id, error = %e, "send failed, reservation kept");
                return Ok(TickOutcome::SendFailed {
                    campaign_id,
                    recipient_id,
                    error: e.to_string(),
                });
            }
        };

        let marked = self
            .storage
            .mark_sent(recipient_id, &receipt.message_id, receipt.timestamp)
            .await?;
        if !marked {
            warn!(
                campaign_id,
                recipient_id,
                message_id = %receipt.message_id,
                "reservation swept during send, row left failed"
            );
        }
        record_outbound(
            self.storage.as_ref(),
            &campaign.device_id,
            &recipient.phone,
            &campaign.body,
            campaign.media.is_some(),
            &receipt,
        )
        .await;
        info!(
            campaign_id,
            recipient_id,
            message_id = %receipt.message_id,
            remaining = remaining - 1,
            "broadcast message sent"
        );

        let completed = remaining == 1;
        if completed {
            self.storage.mark_completed(campaign_id, Utc::now()).await?;
            info!(campaign_id, "campaign completed");
        }
        let message_id = receipt.message_id;
        Ok(if marked {
            TickOutcome::Sent {
                campaign_id,
                recipient_id,
                message_id,
                completed,
            }
        } else {
            TickOutcome::SentAfterSweep {
                campaign_id,
                recipient_id,
                message_id,
                completed,
            }
        })
    }
}

#[async_trait]
impl RecurringTask for BroadcastDispatcher {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    async fn run_once(&self) -> Result<(), DripcastError> {
        let outcome = self.tick().await?;
        debug!(?outcome, "broadcast tick finished");
        Ok(())
    }
}
