// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistent domain entities: devices, campaigns, recipients, contacts,
//! and conversation history.

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::DripcastError;

/// One linked protocol account slot owned by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// UUID assigned at provisioning time.
    pub id: String,
    pub owner_user_id: i64,
    /// Human label chosen by the owner.
    pub name: String,
    /// Opaque link identifier, set once on successful pairing.
    pub link_id: Option<String>,
    pub connected: bool,
    pub created_at: DateTime<Utc>,
}

impl Device {
    /// Whether the device has completed pairing at least once.
    pub fn is_linked(&self) -> bool {
        self.link_id.is_some()
    }
}

/// Health of a backing component, reported by `dripcast check`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

/// Lifecycle state of a device as seen by the session pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    /// No device row exists (never provisioned, removed, or logged out).
    Absent,
    /// Device row exists without a link identifier.
    Provisioned,
    /// A pairing code has been issued and the client is waiting for a scan.
    Pairing,
    /// Paired, but the pooled client is not currently logged in.
    LinkedDisconnected,
    /// Paired and the pooled client is logged in.
    Connected,
}

/// Source of the eligible recipient pool for a campaign.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TargetMode {
    /// The owner's address book, restricted to registered contacts.
    Contacts,
    /// The device's synced contact roster.
    DeviceContacts,
    /// A static phone list stored on the campaign.
    ExplicitPhones,
}

/// Optional predicate narrowing the contact-based target modes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ContactFilter {
    All,
    /// Phone number starts with the given digits.
    PhonePrefix(String),
    /// Name starts with the given text (case-insensitive).
    NamePrefix(String),
    /// Contact is a member of the given group id.
    Group(i64),
}

impl ContactFilter {
    /// Storage discriminator for the filter.
    pub fn kind(&self) -> &'static str {
        match self {
            ContactFilter::All => "all",
            ContactFilter::PhonePrefix(_) => "phone",
            ContactFilter::NamePrefix(_) => "name",
            ContactFilter::Group(_) => "group",
        }
    }

    /// Storage value for the filter; empty for [`ContactFilter::All`].
    pub fn value(&self) -> String {
        match self {
            ContactFilter::All => String::new(),
            ContactFilter::PhonePrefix(v) | ContactFilter::NamePrefix(v) => v.clone(),
            ContactFilter::Group(id) => id.to_string(),
        }
    }

    /// Rebuild a filter from its stored `(kind, value)` pair.
    pub fn from_parts(kind: &str, value: &str) -> Result<Self, DripcastError> {
        match kind {
            "" | "all" => Ok(ContactFilter::All),
            "phone" => Ok(ContactFilter::PhonePrefix(value.to_string())),
            "name" => Ok(ContactFilter::NamePrefix(value.to_string())),
            "group" => value
                .parse::<i64>()
                .map(ContactFilter::Group)
                .map_err(|_| DripcastError::Validation(format!("invalid group id `{value}`"))),
            other => Err(DripcastError::Validation(format!(
                "unknown contact filter `{other}`"
            ))),
        }
    }
}

/// An image attached to a campaign or direct message.
///
/// Held as a `data:image/<type>;base64,<payload>` URL until send time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub name: String,
    pub mime: String,
    pub data_url: String,
}

impl MediaAttachment {
    /// Decode the data URL into raw bytes.
    ///
    /// Only base64 image payloads are accepted.
    pub fn decode(&self) -> Result<Vec<u8>, DripcastError> {
        let rest = self.data_url.strip_prefix("data:image/").ok_or_else(|| {
            DripcastError::Validation(
                "media data must start with \"data:image/<type>;base64,\"".to_string(),
            )
        })?;
        let (_, payload) = rest.split_once(";base64,").ok_or_else(|| {
            DripcastError::Validation("media data URL is not base64 encoded".to_string())
        })?;
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| DripcastError::Validation(format!("invalid media payload: {e}")))
    }
}

/// A bulk-send job targeting a dynamically selected audience.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: i64,
    pub owner_user_id: i64,
    pub device_id: String,
    pub name: String,
    pub body: String,
    pub media: Option<MediaAttachment>,
    pub target_mode: TargetMode,
    pub target_filter: ContactFilter,
    pub explicit_phones: Vec<String>,
    pub scheduled_start: DateTime<Utc>,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub paused: bool,
    pub created_at: DateTime<Utc>,
}

impl Campaign {
    /// Derived status for listings.
    pub fn status(&self) -> CampaignStatus {
        if self.completed {
            CampaignStatus::Complete
        } else if self.paused {
            CampaignStatus::Paused
        } else {
            CampaignStatus::Pending
        }
    }
}

/// Creation payload for a campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCampaign {
    pub owner_user_id: i64,
    pub device_id: String,
    pub name: String,
    pub body: String,
    pub media: Option<MediaAttachment>,
    pub target_mode: TargetMode,
    pub target_filter: ContactFilter,
    pub explicit_phones: Vec<String>,
    pub scheduled_start: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Pending,
    Paused,
    Complete,
}

/// Start or pause request for a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ToggleAction {
    Start,
    Pause,
}

/// Per-recipient delivery state.
///
/// Transitions only move forward: `reserved → sent → delivered → read`,
/// or `reserved → failed`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    Reserved,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl SendStatus {
    /// Position in the forward-only progression. `Failed` is terminal.
    pub fn rank(self) -> u8 {
        match self {
            SendStatus::Reserved => 0,
            SendStatus::Sent => 1,
            SendStatus::Delivered => 2,
            SendStatus::Read => 3,
            SendStatus::Failed => u8::MAX,
        }
    }

    /// Whether moving from `self` to `next` is a forward transition.
    pub fn can_advance_to(self, next: SendStatus) -> bool {
        match (self, next) {
            (SendStatus::Failed, _) => false,
            (SendStatus::Reserved, SendStatus::Failed) => true,
            (_, SendStatus::Failed) => false,
            (current, next) => next.rank() > current.rank(),
        }
    }
}

/// A single (campaign, phone) send attempt record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: i64,
    pub campaign_id: i64,
    pub phone: String,
    pub display_name: String,
    pub send_status: SendStatus,
    pub message_id: Option<String>,
    pub reserved_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// An eligible, not yet contacted phone for a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    pub phone: String,
    pub display_name: String,
}

/// An entry in an owner's address book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,
    pub owner_user_id: i64,
    pub name: String,
    pub phone: String,
    /// Confirmed as registered on the protocol by the registration-check task.
    pub registered: bool,
    pub verified_name: Option<String>,
}

/// An entry of a device's synced contact roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub phone: String,
    pub full_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Media,
}

/// A conversation-history entry, inbound or outbound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub device_id: String,
    pub remote_phone: String,
    pub from_me: bool,
    pub kind: MessageKind,
    pub body: String,
    pub push_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub receipt: Option<String>,
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub prev_page: Option<u32>,
    pub next_page: Option<u32>,
}

impl<T> Page<T> {
    /// Build a page, deriving neighbour page numbers from the totals.
    pub fn new(items: Vec<T>, total: u64, page: u32, limit: u32) -> Self {
        let page = page.max(1);
        let prev_page = (page > 1).then(|| page - 1);
        let seen = u64::from(page) * u64::from(limit);
        let next_page = (seen < total).then(|| page + 1);
        Self {
            items,
            total,
            page,
            limit,
            prev_page,
            next_page,
        }
    }

    /// Row offset for a 1-based page number.
    pub fn offset(page: u32, limit: u32) -> u64 {
        u64::from(page.max(1) - 1) * u64::from(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn send_status_only_moves_forward() {
        assert!(SendStatus::Reserved.can_advance_to(SendStatus::Sent));
        assert!(SendStatus::Sent.can_advance_to(SendStatus::Read));
        assert!(SendStatus::Delivered.can_advance_to(SendStatus::Read));
        assert!(!SendStatus::Read.can_advance_to(SendStatus::Delivered));
        assert!(!SendStatus::Delivered.can_advance_to(SendStatus::Delivered));
        assert!(SendStatus::Reserved.can_advance_to(SendStatus::Failed));
        assert!(!SendStatus::Sent.can_advance_to(SendStatus::Failed));
        assert!(!SendStatus::Failed.can_advance_to(SendStatus::Sent));
    }

    #[test]
    fn send_status_round_trips_through_strings() {
        for status in [
            SendStatus::Reserved,
            SendStatus::Sent,
            SendStatus::Delivered,
            SendStatus::Read,
            SendStatus::Failed,
        ] {
            let parsed = SendStatus::from_str(&status.to_string()).unwrap();
            assert_eq!(parsed, status);
        }
        assert_eq!(TargetMode::DeviceContacts.to_string(), "device_contacts");
    }

    #[test]
    fn contact_filter_storage_parts() {
        let filter = ContactFilter::Group(7);
        assert_eq!(filter.kind(), "group");
        assert_eq!(
            ContactFilter::from_parts(filter.kind(), &filter.value()).unwrap(),
            filter
        );
        assert_eq!(ContactFilter::from_parts("", "").unwrap(), ContactFilter::All);
        assert!(ContactFilter::from_parts("group", "abc").is_err());
        assert!(ContactFilter::from_parts("city", "x").is_err());
    }

    #[test]
    fn media_decode_accepts_image_data_urls_only() {
        let media = MediaAttachment {
            name: "a.png".into(),
            mime: "image/png".into(),
            data_url: "data:image/png;base64,aGVsbG8=".into(),
        };
        assert_eq!(media.decode().unwrap(), b"hello");

        let pdf = MediaAttachment {
            data_url: "data:application/pdf;base64,aGVsbG8=".into(),
            ..media.clone()
        };
        assert!(pdf.decode().is_err());

        let raw = MediaAttachment {
            data_url: "data:image/png,hello".into(),
            ..media
        };
        assert!(raw.decode().is_err());
    }

    #[test]
    fn page_neighbours() {
        let page: Page<u8> = Page::new(vec![], 45, 1, 20);
        assert_eq!(page.prev_page, None);
        assert_eq!(page.next_page, Some(2));

        let last: Page<u8> = Page::new(vec![], 45, 3, 20);
        assert_eq!(last.prev_page, Some(2));
        assert_eq!(last.next_page, None);

        assert_eq!(Page::<u8>::offset(3, 20), 40);
        assert_eq!(Page::<u8>::offset(0, 20), 0);
    }

    #[test]
    fn campaign_status_prefers_complete() {
        let now = Utc::now();
        let mut campaign = Campaign {
            id: 1,
            owner_user_id: 1,
            device_id: "d".into(),
            name: "c".into(),
            body: "b".into(),
            media: None,
            target_mode: TargetMode::ExplicitPhones,
            target_filter: ContactFilter::All,
            explicit_phones: vec![],
            scheduled_start: now,
            completed: false,
            completed_at: None,
            paused: true,
            created_at: now,
        };
        assert_eq!(campaign.status(), CampaignStatus::Paused);
        campaign.completed = true;
        assert_eq!(campaign.status(), CampaignStatus::Complete);
    }
}
