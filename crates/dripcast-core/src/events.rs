// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Values exchanged with the chat-protocol client: pairing codes, send
//! receipts, registration results, and the inbound event stream.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::types::{MessageKind, SendStatus};

/// One pairing code emitted by the client's pairing channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingCode {
    /// Opaque string to be rendered as a QR image.
    pub code: String,
    /// How long the code stays valid.
    pub expires_in: Duration,
}

/// Identifier and server timestamp of an accepted outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Registration lookup result for one phone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationResult {
    pub phone: String,
    pub registered: bool,
    pub verified_name: Option<String>,
}

/// Ephemeral per-chat presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChatPresence {
    Composing,
    Paused,
}

/// Receipt kinds reported by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReceiptType {
    Delivered,
    Read,
    ReadSelf,
    Played,
    Sender,
    Retry,
}

impl ReceiptType {
    /// Recipient status implied by this receipt, if any.
    pub fn send_status(self) -> Option<SendStatus> {
        match self {
            ReceiptType::Delivered => Some(SendStatus::Delivered),
            ReceiptType::Read => Some(SendStatus::Read),
            _ => None,
        }
    }

    /// Whether the receipt marks delivery progress worth keeping in history.
    pub fn tracks_progress(self) -> bool {
        matches!(
            self,
            ReceiptType::Delivered | ReceiptType::Read | ReceiptType::Played
        )
    }

    /// Stored receipts that `self` replaces. Anything else already stored
    /// is at least as far along and stays.
    pub fn supersedes(self) -> &'static [ReceiptType] {
        match self {
            ReceiptType::Read => &[ReceiptType::Delivered],
            ReceiptType::Played => &[ReceiptType::Delivered, ReceiptType::Read],
            _ => &[],
        }
    }
}

/// An inbound chat message delivered to a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub id: String,
    pub remote_phone: String,
    pub push_name: Option<String>,
    pub kind: MessageKind,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

/// Closed set of events a protocol client reports for its device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// Pairing finished; `link_id` is the durable account link.
    Paired { link_id: String },
    /// Transport connected and authenticated.
    Connected,
    /// The account's display name became known or changed.
    PushNameSet { name: String },
    Disconnected,
    /// The account was unlinked remotely. Terminal for the device.
    LoggedOut { reason: Option<String> },
    Receipt {
        message_ids: Vec<String>,
        receipt_type: ReceiptType,
        remote_phone: String,
    },
    Message(InboundMessage),
}

impl ProtocolEvent {
    /// Short label used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolEvent::Paired { .. } => "paired",
            ProtocolEvent::Connected => "connected",
            ProtocolEvent::PushNameSet { .. } => "push_name_set",
            ProtocolEvent::Disconnected => "disconnected",
            ProtocolEvent::LoggedOut { .. } => "logged_out",
            ProtocolEvent::Receipt { .. } => "receipt",
            ProtocolEvent::Message(_) => "message",
        }
    }
}

/// Result of a login request on a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoginOutcome {
    /// Fresh pairing: a QR image (data URL) and the code's lifetime.
    QrCode { image: String, timeout_secs: u64 },
    /// The linked client was disconnected and reconnected.
    Reconnected { timeout_secs: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_delivered_and_read_map_to_status() {
        assert_eq!(
            ReceiptType::Delivered.send_status(),
            Some(SendStatus::Delivered)
        );
        assert_eq!(ReceiptType::Read.send_status(), Some(SendStatus::Read));
        assert_eq!(ReceiptType::ReadSelf.send_status(), None);
        assert_eq!(ReceiptType::Played.send_status(), None);
    }

    #[test]
    fn later_receipts_supersede_earlier_ones() {
        assert!(ReceiptType::Read.supersedes().contains(&ReceiptType::Delivered));
        assert!(!ReceiptType::Delivered.supersedes().contains(&ReceiptType::Read));
        assert!(ReceiptType::Delivered.tracks_progress());
        assert!(!ReceiptType::Retry.tracks_progress());
    }

    #[test]
    fn login_outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(LoginOutcome::Reconnected { timeout_secs: 30 }).unwrap();
        assert_eq!(json["status"], "reconnected");
        assert_eq!(json["timeout_secs"], 30);
    }
}
