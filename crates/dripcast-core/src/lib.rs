// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for dripcast.
//!
//! Holds the shared error type, the persistent domain entities, the values
//! exchanged with the chat-protocol client, and the capability traits that
//! the session pool and the dispatch engine are written against.

pub mod error;
pub mod events;
pub mod phone;
pub mod traits;
pub mod types;

pub use error::DripcastError;
pub use events::{
    ChatPresence, InboundMessage, LoginOutcome, PairingCode, ProtocolEvent, ReceiptType,
    RegistrationResult, SendReceipt,
};
pub use phone::{normalize_phone, normalize_phone_list};
pub use traits::{
    CampaignStore, ClientFactory, ContactStore, DeviceStore, MessageStore, ProtocolClient,
    RecipientStore, Storage, StorageAdapter,
};
pub use types::{
    Campaign, CampaignStatus, Candidate, ChatMessage, Contact, ContactFilter, Device,
    HealthStatus, MediaAttachment, MessageKind, NewCampaign, Page, Recipient, RosterEntry,
    SendStatus, SessionState, TargetMode, ToggleAction,
};
