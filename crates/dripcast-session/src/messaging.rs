// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Direct sends and account queries through a device's live client.

use std::sync::Arc;

use tracing::{debug, info, warn};

use dripcast_core::{
    ChatMessage, ChatPresence, ContactStore, DripcastError, MediaAttachment, MessageKind,
    MessageStore, ProtocolClient, RegistrationResult, RosterEntry, SendReceipt, Storage,
    normalize_phone, normalize_phone_list,
};

use crate::pool::SessionPool;

/// Send a text, or an image captioned with `body` when `media` is given.
pub async fn send_payload(
    client: &dyn ProtocolClient,
    to: &str,
    body: &str,
    media: Option<&MediaAttachment>,
) -> Result<SendReceipt, DripcastError> {
    match media {
        Some(media) => {
            let bytes = media.decode()?;
            client.send_media(to, bytes, &media.mime, body).await
        }
        None => client.send_text(to, body).await,
    }
}

/// Store an accepted outbound message in the conversation history.
///
/// History is best effort: failures are logged, never returned.
pub async fn record_outbound(
    storage: &dyn Storage,
    device_id: &str,
    to: &str,
    body: &str,
    has_media: bool,
    receipt: &SendReceipt,
) {
    let message = ChatMessage {
        id: receipt.message_id.clone(),
        device_id: device_id.to_string(),
        remote_phone: to.to_string(),
        from_me: true,
        kind: if has_media {
            MessageKind::Media
        } else {
            MessageKind::Text
        },
        body: body.to_string(),
        push_name: None,
        timestamp: receipt.timestamp,
        receipt: None,
    };
    if let Err(e) = storage.insert_message(&message).await {
        warn!(
            device_id,
            message_id = %receipt.message_id,
            error = %e,
            "failed to record outbound message"
        );
    }
}

/// Operations that act on a device's account outside of campaigns.
pub struct Messenger {
    pool: Arc<SessionPool>,
    storage: Arc<dyn Storage>,
    country_code: String,
}

impl Messenger {
    pub fn new(
        pool: Arc<SessionPool>,
        storage: Arc<dyn Storage>,
        country_code: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            storage,
            country_code: country_code.into(),
        }
    }

    fn client(&self, device_id: &str) -> Result<Arc<dyn ProtocolClient>, DripcastError> {
        self.pool
            .live_client(device_id)
            .ok_or_else(|| DripcastError::SessionNotReady {
                device_id: device_id.to_string(),
            })
    }

    pub async fn send_direct(
        &self,
        device_id: &str,
        to: &str,
        text: &str,
        media: Option<&MediaAttachment>,
    ) -> Result<SendReceipt, DripcastError> {
        let phone = normalize_phone(to, &self.country_code)?;
        if text.trim().is_empty() && media.is_none() {
            return Err(DripcastError::Validation(
                "message must have text or media".to_string(),
            ));
        }
        let client = self.client(device_id)?;
        let receipt = send_payload(client.as_ref(), &phone, text, media).await?;
        record_outbound(
            self.storage.as_ref(),
            device_id,
            &phone,
            text,
            media.is_some(),
            &receipt,
        )
        .await;
        info!(device_id, message_id = %receipt.message_id, "direct message sent");
        Ok(receipt)
    }

    pub async fn send_chat_presence(
        &self,
        device_id: &str,
        to: &str,
        presence: ChatPresence,
    ) -> Result<(), DripcastError> {
        let phone = normalize_phone(to, &self.country_code)?;
        self.client(device_id)?
            .send_chat_presence(&phone, presence)
            .await
    }

    /// Look up which phones hold an account on the protocol.
    pub async fn check_registration(
        &self,
        device_id: &str,
        phones: &[String],
    ) -> Result<Vec<RegistrationResult>, DripcastError> {
        let phones = normalize_phone_list(phones, &self.country_code)?;
        if phones.is_empty() {
            return Ok(Vec::new());
        }
        self.client(device_id)?.is_registered(&phones).await
    }

    /// Replace the stored roster with the client's current one.
    ///
    /// Entries whose phone cannot be normalised are skipped.
    pub async fn sync_roster(&self, device_id: &str) -> Result<usize, DripcastError> {
        let roster = self.client(device_id)?.roster().await?;
        let fetched = roster.len();
        let mut entries: Vec<RosterEntry> = Vec::with_capacity(fetched);
        for entry in roster {
            match normalize_phone(&entry.phone, &self.country_code) {
                Ok(phone) if !entries.iter().any(|e| e.phone == phone) => {
                    entries.push(RosterEntry {
                        phone,
                        full_name: entry.full_name,
                    });
                }
                Ok(_) => {}
                Err(e) => debug!(device_id, error = %e, "skipping roster entry"),
            }
        }
        let stored = self.storage.replace_roster(device_id, &entries).await?;
        info!(device_id, fetched, stored, "roster synced");
        Ok(stored)
    }

    /// Latest messages exchanged with `remote`, newest first.
    pub async fn conversation(
        &self,
        device_id: &str,
        remote: &str,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, DripcastError> {
        let phone = normalize_phone(remote, &self.country_code)?;
        self.storage.list_messages(device_id, &phone, limit).await
    }
}
