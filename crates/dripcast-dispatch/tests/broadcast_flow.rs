// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end broadcast dispatch over mock clients and temp SQLite.

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use dripcast_core::{
    CampaignStatus, CampaignStore, ContactFilter, ContactStore, DripcastError, MediaAttachment,
    MessageStore, ReceiptType, RecipientStore, RosterEntry, SendStatus, TargetMode, ToggleAction,
};
use dripcast_dispatch::{
    CampaignRequest, PacingPolicy, RegistrationOutcome, TickOutcome, sweep_stale_reservations,
};
use dripcast_test_utils::{TestHarness, wait_until};

const BODY: &str = "Hello from the shop, new stock arrived today!";

fn explicit(phones: &[&str]) -> CampaignRequest {
    CampaignRequest {
        name: "Launch".into(),
        body: BODY.into(),
        media: None,
        target_mode: TargetMode::ExplicitPhones,
        target_filter: ContactFilter::All,
        explicit_phones: phones.iter().map(|p| p.to_string()).collect(),
        scheduled_start: None,
    }
}

fn contacts(filter: ContactFilter) -> CampaignRequest {
    CampaignRequest {
        target_mode: TargetMode::Contacts,
        target_filter: filter,
        explicit_phones: Vec::new(),
        ..explicit(&[])
    }
}

async fn recipient_statuses(h: &TestHarness, campaign_id: i64) -> Vec<(String, SendStatus)> {
    h.storage
        .list_recipients(campaign_id, 1, 100)
        .await
        .unwrap()
        .items
        .into_iter()
        .map(|r| (r.phone, r.send_status))
        .collect()
}

#[tokio::test]
async fn two_phone_campaign_completes_in_two_ticks() {
    let h = TestHarness::builder().build().await.unwrap();
    let client = h.connected_device(1, "dev").await.unwrap();
    let campaign = h
        .campaigns
        .create(1, "dev", explicit(&["6281111", "6282222"]))
        .await
        .unwrap();

    let first = h.dispatcher.tick().await.unwrap();
    assert!(matches!(first, TickOutcome::Sent { completed: false, .. }), "{first:?}");
    let rows = recipient_statuses(&h, campaign.id).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].1, SendStatus::Sent);

    let second = h.dispatcher.tick().await.unwrap();
    assert!(matches!(second, TickOutcome::Sent { completed: true, .. }), "{second:?}");
    let stored = h.storage.get_campaign(campaign.id).await.unwrap().unwrap();
    assert!(stored.completed);
    assert!(stored.completed_at.is_some());
    assert_eq!(stored.status(), CampaignStatus::Complete);

    assert_eq!(h.dispatcher.tick().await.unwrap(), TickOutcome::Idle);

    let sent: HashSet<_> = client.sent_messages().into_iter().map(|m| m.to).collect();
    assert_eq!(sent, HashSet::from(["6281111".to_string(), "6282222".to_string()]));
    assert_eq!(client.presences().len(), 2);
}

#[tokio::test]
async fn phones_are_never_selected_twice() {
    let h = TestHarness::builder().with_seed(99).build().await.unwrap();
    let client = h.connected_device(1, "dev").await.unwrap();
    let phones = ["6281", "6282", "6283", "6284", "6285"];
    let campaign = h.campaigns.create(1, "dev", explicit(&phones)).await.unwrap();

    for _ in 0..8 {
        h.dispatcher.tick().await.unwrap();
    }
    let rows = recipient_statuses(&h, campaign.id).await;
    let unique: HashSet<_> = rows.iter().map(|(p, _)| p.clone()).collect();
    assert_eq!(rows.len(), phones.len());
    assert_eq!(unique.len(), phones.len());
    assert_eq!(client.sent_count(), phones.len());
    assert!(h.storage.get_campaign(campaign.id).await.unwrap().unwrap().completed);
}

#[tokio::test]
async fn missing_session_keeps_reservation() {
    let h = TestHarness::builder().build().await.unwrap();
    h.linked_device(1, "offline").await.unwrap();
    let campaign = h
        .campaigns
        .create(1, "offline", explicit(&["6281111", "6282222"]))
        .await
        .unwrap();

    let outcome = h.dispatcher.tick().await.unwrap();
    assert!(matches!(outcome, TickOutcome::SessionNotReady { .. }), "{outcome:?}");
    let rows = recipient_statuses(&h, campaign.id).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].1, SendStatus::Reserved);
    assert!(!h.storage.get_campaign(campaign.id).await.unwrap().unwrap().completed);
}

#[tokio::test]
async fn failed_send_stays_reserved_until_swept() {
    let h = TestHarness::builder().build().await.unwrap();
    let client = h.connected_device(1, "dev").await.unwrap();
    client.fail_sends(true);
    let campaign = h
        .campaigns
        .create(1, "dev", explicit(&["6281111", "6282222"]))
        .await
        .unwrap();

    let outcome = h.dispatcher.tick().await.unwrap();
    let TickOutcome::SendFailed { recipient_id, .. } = outcome else {
        panic!("expected a send failure, got {outcome:?}");
    };
    assert_eq!(
        recipient_statuses(&h, campaign.id).await[0].1,
        SendStatus::Reserved
    );

    tokio::time::sleep(Duration::from_millis(5)).await;
    let swept = sweep_stale_reservations(h.storage.as_ref(), Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(swept.len(), 1);
    assert_eq!(swept[0].id, recipient_id);
    assert_eq!(
        recipient_statuses(&h, campaign.id).await[0].1,
        SendStatus::Failed
    );

    // The failed phone stays excluded; only the other one remains.
    client.fail_sends(false);
    let next = h.dispatcher.tick().await.unwrap();
    assert!(matches!(next, TickOutcome::Sent { completed: true, .. }), "{next:?}");
}

#[tokio::test]
async fn receipts_only_move_status_forward() {
    let h = TestHarness::builder().build().await.unwrap();
    let client = h.connected_device(1, "dev").await.unwrap();
    let campaign = h.campaigns.create(1, "dev", explicit(&["6281111"])).await.unwrap();
    let TickOutcome::Sent { message_id, .. } = h.dispatcher.tick().await.unwrap() else {
        panic!("expected a send");
    };

    // Unknown ids are ignored.
    client.emit_receipt(&["m1"], ReceiptType::Read, "6289999");
    client.emit_receipt(&[message_id.as_str()], ReceiptType::Read, "6281111");

    let storage = h.storage.clone();
    let id = campaign.id;
    assert!(
        wait_until(|| {
            let storage = storage.clone();
            async move {
                storage.list_recipients(id, 1, 10).await.unwrap().items[0].send_status
                    == SendStatus::Read
            }
        })
        .await
    );

    client.emit_receipt(&[message_id.as_str()], ReceiptType::Delivered, "6281111");
    client.emit_receipt(&[message_id.as_str()], ReceiptType::Delivered, "6281111");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        recipient_statuses(&h, campaign.id).await,
        vec![("6281111".to_string(), SendStatus::Read)]
    );
    let history = h.storage.list_messages("dev", "6281111", 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].receipt.as_deref(), Some("read"));
}

#[tokio::test]
async fn receipts_only_touch_the_sending_device() {
    let h = TestHarness::builder().build().await.unwrap();
    let first = h.connected_device(1, "dev-a").await.unwrap();
    let second = h.connected_device(1, "dev-b").await.unwrap();
    let a = h.campaigns.create(1, "dev-a", explicit(&["6281111"])).await.unwrap();
    let b = h.campaigns.create(1, "dev-b", explicit(&["6281111"])).await.unwrap();
    for _ in 0..2 {
        let outcome = h.dispatcher.tick().await.unwrap();
        assert!(matches!(outcome, TickOutcome::Sent { .. }), "{outcome:?}");
    }
    // Both mock clients number their messages from one.
    assert_eq!(first.sent_messages()[0].message_id, "mock-msg-1");
    assert_eq!(second.sent_messages()[0].message_id, "mock-msg-1");

    second.emit_receipt(&["mock-msg-1"], ReceiptType::Read, "6281111");
    let storage = h.storage.clone();
    let id = b.id;
    assert!(
        wait_until(|| {
            let storage = storage.clone();
            async move {
                storage.list_recipients(id, 1, 10).await.unwrap().items[0].send_status
                    == SendStatus::Read
            }
        })
        .await
    );

    assert_eq!(recipient_statuses(&h, a.id).await[0].1, SendStatus::Sent);
    let history = h.storage.list_messages("dev-a", "6281111", 10).await.unwrap();
    assert_eq!(history[0].receipt, None);
}

#[tokio::test]
async fn reservation_swept_mid_send_is_reported() {
    let h = TestHarness::builder()
        .with_typing_delay(PacingPolicy::fixed(Duration::from_millis(300)))
        .build()
        .await
        .unwrap();
    let client = h.connected_device(1, "dev").await.unwrap();
    let campaign = h.campaigns.create(1, "dev", explicit(&["6281111"])).await.unwrap();

    let sweep = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        sweep_stale_reservations(h.storage.as_ref(), Duration::ZERO).await
    };
    let (outcome, swept) = tokio::join!(h.dispatcher.tick(), sweep);
    assert_eq!(swept.unwrap().len(), 1);

    let outcome = outcome.unwrap();
    let TickOutcome::SentAfterSweep { message_id, .. } = outcome else {
        panic!("expected a swept send, got {outcome:?}");
    };
    assert_eq!(client.sent_count(), 1);

    let stored = &h.storage.list_recipients(campaign.id, 1, 10).await.unwrap().items[0];
    assert_eq!(stored.send_status, SendStatus::Failed);
    assert_eq!(stored.message_id, None);
    // The message itself still lands in history.
    let history = h.storage.list_messages("dev", "6281111", 10).await.unwrap();
    assert_eq!(history[0].id, message_id);
}

#[tokio::test]
async fn contacts_mode_sends_to_registered_matches_only() {
    let h = TestHarness::builder().build().await.unwrap();
    let client = h.connected_device(1, "dev").await.unwrap();
    h.contact(1, "Ann", "6281100", true).await.unwrap();
    h.contact(1, "Ben", "6281200", false).await.unwrap();
    h.contact(1, "Cat", "6290000", true).await.unwrap();
    h.contact(2, "Other owner", "6281300", true).await.unwrap();

    let campaign = h
        .campaigns
        .create(1, "dev", contacts(ContactFilter::PhonePrefix("6281".into())))
        .await
        .unwrap();
    for _ in 0..3 {
        h.dispatcher.tick().await.unwrap();
    }
    let rows = recipient_statuses(&h, campaign.id).await;
    assert_eq!(rows, vec![("6281100".to_string(), SendStatus::Sent)]);
    assert_eq!(client.sent_messages()[0].to, "6281100");
    assert!(h.storage.get_campaign(campaign.id).await.unwrap().unwrap().completed);
}

#[tokio::test]
async fn device_contacts_mode_uses_synced_roster() {
    let h = TestHarness::builder().build().await.unwrap();
    let client = h.connected_device(1, "dev").await.unwrap();
    client.set_roster(vec![
        RosterEntry {
            phone: "6281100".into(),
            full_name: "Ann".into(),
        },
        RosterEntry {
            phone: "6281200".into(),
            full_name: "Ben".into(),
        },
    ]);
    assert_eq!(h.messenger.sync_roster("dev").await.unwrap(), 2);

    let request = CampaignRequest {
        target_mode: TargetMode::DeviceContacts,
        ..contacts(ContactFilter::NamePrefix("an".into()))
    };
    let campaign = h.campaigns.create(1, "dev", request).await.unwrap();
    h.dispatcher.tick().await.unwrap();
    assert_eq!(
        recipient_statuses(&h, campaign.id).await,
        vec![("6281100".to_string(), SendStatus::Sent)]
    );
}

#[tokio::test]
async fn media_campaign_sends_image_with_caption() {
    let h = TestHarness::builder().build().await.unwrap();
    let client = h.connected_device(1, "dev").await.unwrap();
    let request = CampaignRequest {
        media: Some(MediaAttachment {
            name: "logo.png".into(),
            mime: "image/png".into(),
            data_url: "data:image/png;base64,iVBORw0KGgo=".into(),
        }),
        ..explicit(&["6281111"])
    };
    h.campaigns.create(1, "dev", request).await.unwrap();
    h.dispatcher.tick().await.unwrap();

    let sent = client.sent_messages();
    assert_eq!(sent[0].text, BODY);
    assert_eq!(sent[0].media, Some(("image/png".to_string(), 8)));
}

#[tokio::test]
async fn paused_and_future_campaigns_are_not_dispatched() {
    let h = TestHarness::builder().build().await.unwrap();
    h.connected_device(1, "dev").await.unwrap();
    let later = CampaignRequest {
        scheduled_start: Some(Utc::now() + chrono::Duration::hours(1)),
        ..explicit(&["6281111"])
    };
    h.campaigns.create(1, "dev", later).await.unwrap();
    let now = h.campaigns.create(1, "dev", explicit(&["6282222"])).await.unwrap();

    let paused = h.campaigns.toggle(1, now.id, ToggleAction::Pause).await.unwrap();
    assert_eq!(paused.status(), CampaignStatus::Paused);
    assert_eq!(h.dispatcher.tick().await.unwrap(), TickOutcome::Idle);

    h.campaigns.toggle(1, now.id, ToggleAction::Start).await.unwrap();
    assert!(matches!(
        h.dispatcher.tick().await.unwrap(),
        TickOutcome::Sent { completed: true, .. }
    ));
    assert!(matches!(
        h.campaigns.toggle(1, now.id, ToggleAction::Start).await,
        Err(DripcastError::Validation(_))
    ));
}

#[tokio::test]
async fn creation_is_validated() {
    let h = TestHarness::builder().build().await.unwrap();
    h.linked_device(1, "dev").await.unwrap();

    let short = CampaignRequest {
        body: "hi".into(),
        ..explicit(&["6281111"])
    };
    assert!(matches!(
        h.campaigns.create(1, "dev", short).await,
        Err(DripcastError::Validation(_))
    ));
    assert!(matches!(
        h.campaigns.create(2, "dev", explicit(&["6281111"])).await,
        Err(DripcastError::NotFound { .. })
    ));
    let group_on_roster = CampaignRequest {
        target_mode: TargetMode::DeviceContacts,
        ..contacts(ContactFilter::Group(1))
    };
    assert!(matches!(
        h.campaigns.create(1, "dev", group_on_roster).await,
        Err(DripcastError::Validation(_))
    ));
    let empty = h
        .campaigns
        .create(1, "dev", contacts(ContactFilter::All))
        .await
        .unwrap_err();
    assert_eq!(empty.to_string(), "validation error: no recipients");
    assert!(h.campaigns.create(1, "dev", explicit(&["12ab"])).await.is_err());

    let campaign = h
        .campaigns
        .create(1, "dev", explicit(&["0811", "+62811", "62822"]))
        .await
        .unwrap();
    assert_eq!(campaign.explicit_phones, vec!["62811", "62822"]);
}

#[tokio::test]
async fn listings_are_scoped_to_owner() {
    let h = TestHarness::builder().build().await.unwrap();
    h.connected_device(1, "dev").await.unwrap();
    let campaign = h.campaigns.create(1, "dev", explicit(&["6281111"])).await.unwrap();
    h.dispatcher.tick().await.unwrap();

    let page = h.campaigns.list(1, "dev", 1).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(h.campaigns.list(2, "dev", 1).await.unwrap().total, 0);
    assert_eq!(
        h.campaigns.recipients(1, campaign.id, 1).await.unwrap().total,
        1
    );
    assert!(h.campaigns.recipients(2, campaign.id, 1).await.is_err());

    assert!(h.campaigns.delete(2, campaign.id).await.is_err());
    h.campaigns.delete(1, campaign.id).await.unwrap();
    assert!(h.storage.get_campaign(campaign.id).await.unwrap().is_none());
}

#[tokio::test]
async fn registration_check_confirms_or_removes_contacts() {
    let h = TestHarness::builder().build().await.unwrap();
    assert_eq!(
        h.registration.check_once().await.unwrap(),
        RegistrationOutcome::Idle
    );

    let yes = h.contact(1, "Shop", "6281100", false).await.unwrap();
    assert_eq!(
        h.registration.check_once().await.unwrap(),
        RegistrationOutcome::NotReady { contact_id: yes.id }
    );

    let client = h.connected_device(1, "dev").await.unwrap();
    client.set_registered("6281100", Some("Verified Shop"));
    assert_eq!(
        h.registration.check_once().await.unwrap(),
        RegistrationOutcome::Registered { contact_id: yes.id }
    );
    let stored = h.storage.list_contacts(1).await.unwrap();
    assert!(stored[0].registered);
    assert_eq!(stored[0].name, "Verified Shop");

    let no = h.contact(1, "Ghost", "6289999", false).await.unwrap();
    assert_eq!(
        h.registration.check_once().await.unwrap(),
        RegistrationOutcome::Removed { contact_id: no.id }
    );
    assert_eq!(h.storage.list_contacts(1).await.unwrap().len(), 1);
}
