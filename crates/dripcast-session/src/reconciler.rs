// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Protocol event reconciliation.
//!
//! Each event is first turned into a list of [`Effect`]s by the pure
//! [`plan`] function, then [`Reconciler::apply`] performs them against
//! storage, the client and the owning pool. Every effect is idempotent, so
//! duplicate or reordered events are harmless.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use dripcast_core::{
    ChatMessage, DeviceStore, DripcastError, MessageStore, ProtocolClient, ProtocolEvent,
    ReceiptType, RecipientStore, SendStatus, Storage,
};

/// Device lifecycle transitions owned by the session pool.
#[async_trait]
pub trait DeviceTransitions: Send + Sync {
    /// Pairing completed with the given link identifier.
    async fn paired(&self, device_id: &str, link_id: &str) -> Result<(), DripcastError>;

    /// The account was unlinked; the device is gone.
    async fn logged_out(&self, device_id: &str) -> Result<(), DripcastError>;
}

/// One state change implied by a protocol event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    AnnouncePresence,
    MarkConnected(bool),
    PersistLink { link_id: String },
    StoreMessage(ChatMessage),
    AdvanceReceipts {
        message_ids: Vec<String>,
        status: SendStatus,
    },
    RecordReceipt {
        message_ids: Vec<String>,
        receipt: ReceiptType,
    },
    RemoveDevice,
}

impl Effect {
    fn label(&self) -> &'static str {
        match self {
            Effect::AnnouncePresence => "announce_presence",
            Effect::MarkConnected(_) => "mark_connected",
            Effect::PersistLink { .. } => "persist_link",
            Effect::StoreMessage(_) => "store_message",
            Effect::AdvanceReceipts { .. } => "advance_receipts",
            Effect::RecordReceipt { .. } => "record_receipt",
            Effect::RemoveDevice => "remove_device",
        }
    }
}

/// Decide what an event means for `device_id`.
///
/// `push_name` is the client's current account display name; connection
/// events are only acted on once it is known.
pub fn plan(device_id: &str, event: &ProtocolEvent, push_name: Option<&str>) -> Vec<Effect> {
    match event {
        ProtocolEvent::Connected | ProtocolEvent::PushNameSet { .. } => {
            let name = match event {
                ProtocolEvent::PushNameSet { name } => Some(name.as_str()),
                _ => push_name,
            };
            if name.is_some_and(|n| !n.trim().is_empty()) {
                vec![Effect::AnnouncePresence, Effect::MarkConnected(true)]
            } else {
                Vec::new()
            }
        }
        ProtocolEvent::Paired { link_id } => vec![Effect::PersistLink {
            link_id: link_id.clone(),
        }],
        ProtocolEvent::Disconnected => vec![Effect::MarkConnected(false)],
        ProtocolEvent::LoggedOut { .. } => vec![Effect::RemoveDevice],
        ProtocolEvent::Receipt {
            message_ids,
            receipt_type,
            ..
        } => match receipt_type.send_status() {
            Some(status) if !message_ids.is_empty() => vec![
                Effect::AdvanceReceipts {
                    message_ids: message_ids.clone(),
                    status,
                },
                Effect::RecordReceipt {
                    message_ids: message_ids.clone(),
                    receipt: *receipt_type,
                },
            ],
            _ => Vec::new(),
        },
        ProtocolEvent::Message(inbound) => vec![Effect::StoreMessage(ChatMessage {
            id: inbound.id.clone(),
            device_id: device_id.to_string(),
            remote_phone: inbound.remote_phone.clone(),
            from_me: false,
            kind: inbound.kind,
            body: inbound.body.clone(),
            push_name: inbound.push_name.clone(),
            timestamp: inbound.timestamp,
            receipt: None,
        })],
    }
}

/// Applies planned effects for one device.
pub struct Reconciler {
    storage: Arc<dyn Storage>,
}

impl Reconciler {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Plan and apply one event.
    pub async fn handle(
        &self,
        device_id: &str,
        client: &dyn ProtocolClient,
        event: &ProtocolEvent,
        transitions: &dyn DeviceTransitions,
    ) -> usize {
        let push_name = client.push_name();
        let effects = plan(device_id, event, push_name.as_deref());
        debug!(
            device_id,
            event = event.kind(),
            effects = effects.len(),
            "reconciling protocol event"
        );
        self.apply(device_id, client, effects, transitions).await
    }

    /// Apply every effect, logging failures. Returns the number that failed.
    pub async fn apply(
        &self,
        device_id: &str,
        client: &dyn ProtocolClient,
        effects: Vec<Effect>,
        transitions: &dyn DeviceTransitions,
    ) -> usize {
        let mut failed = 0;
        for effect in effects {
            let label = effect.label();
            if let Err(e) = self.apply_one(device_id, client, effect, transitions).await {
                failed += 1;
                warn!(device_id, effect = label, error = %e, "event effect failed");
            }
        }
        failed
    }

    async fn apply_one(
        &self,
        device_id: &str,
        client: &dyn ProtocolClient,
        effect: Effect,
        transitions: &dyn DeviceTransitions,
    ) -> Result<(), DripcastError> {
        match effect {
            Effect::AnnouncePresence => client.send_presence_available().await,
            Effect::MarkConnected(connected) => {
                self.storage.set_connected(device_id, connected).await?;
                Ok(())
            }
            Effect::PersistLink { link_id } => transitions.paired(device_id, &link_id).await,
            Effect::StoreMessage(message) => self.storage.insert_message(&message).await,
            Effect::AdvanceReceipts {
                message_ids,
                status,
            } => {
                let advanced = self
                    .storage
                    .advance_receipts(device_id, &message_ids, status)
                    .await?;
                if advanced > 0 {
                    info!(device_id, %status, advanced, "recipient receipts advanced");
                }
                Ok(())
            }
            Effect::RecordReceipt {
                message_ids,
                receipt,
            } => {
                self.storage
                    .update_message_receipt(device_id, &message_ids, receipt)
                    .await?;
                Ok(())
            }
            Effect::RemoveDevice => transitions.logged_out(device_id).await,
        }
    }
}
