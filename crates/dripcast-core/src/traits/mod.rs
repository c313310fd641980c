// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability traits at the edges of the dispatch core.
//!
//! All traits use `#[async_trait]` so they can be held as trait objects.

pub mod client;
pub mod storage;

pub use client::{ClientFactory, ProtocolClient};
pub use storage::{
    CampaignStore, ContactStore, DeviceStore, MessageStore, RecipientStore, Storage,
    StorageAdapter,
};
