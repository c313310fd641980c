// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability surface of the chat-protocol client.
//!
//! The wire protocol, pairing cryptography and transport live behind these
//! traits; the embedding application supplies a [`ClientFactory`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use crate::error::DripcastError;
use crate::events::{ChatPresence, PairingCode, ProtocolEvent, RegistrationResult, SendReceipt};
use crate::types::{Device, RosterEntry};

/// One long-lived protocol session bound to a single device.
#[async_trait]
pub trait ProtocolClient: Send + Sync + 'static {
    /// Opens the transport connection (and authenticates if linked).
    async fn connect(&self) -> Result<(), DripcastError>;

    /// Closes the transport connection. Never fails.
    async fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Whether the session is connected and authenticated.
    fn is_logged_in(&self) -> bool;

    /// Link identifier held by the client's own store, if paired.
    fn link_id(&self) -> Option<String>;

    /// Account display name, once known.
    fn push_name(&self) -> Option<String>;

    /// Opens the pairing channel. Must be called before [`connect`](Self::connect)
    /// on an unlinked client; the channel yields successive codes until
    /// pairing succeeds or times out.
    async fn pairing_channel(&self) -> Result<mpsc::Receiver<PairingCode>, DripcastError>;

    /// Subscribes to the client's inbound event stream.
    fn subscribe(&self) -> broadcast::Receiver<ProtocolEvent>;

    async fn send_text(&self, to: &str, text: &str) -> Result<SendReceipt, DripcastError>;

    /// Uploads and sends an image with a caption.
    async fn send_media(
        &self,
        to: &str,
        bytes: Vec<u8>,
        mime: &str,
        caption: &str,
    ) -> Result<SendReceipt, DripcastError>;

    async fn send_chat_presence(
        &self,
        to: &str,
        presence: ChatPresence,
    ) -> Result<(), DripcastError>;

    /// Announces the account as available.
    async fn send_presence_available(&self) -> Result<(), DripcastError>;

    async fn is_registered(
        &self,
        phones: &[String],
    ) -> Result<Vec<RegistrationResult>, DripcastError>;

    /// The account's synced contact roster.
    async fn roster(&self) -> Result<Vec<RosterEntry>, DripcastError>;
}

/// Builds a fresh protocol client for a device.
///
/// Clients for linked devices must resume from the stored link.
pub trait ClientFactory: Send + Sync + 'static {
    fn create(&self, device: &Device) -> Result<Arc<dyn ProtocolClient>, DripcastError>;
}
