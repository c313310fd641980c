// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recipient selection pool, reservation, send outcome, receipts, and sweep.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use dripcast_core::{
    Campaign, Candidate, ContactFilter, DripcastError, Page, Recipient, SendStatus, TargetMode,
};
use rusqlite::params;
use rusqlite::types::Value;

use crate::database::{
    Database, enum_column, format_ts, map_tr_err, opt_ts_column, placeholders, ts_column,
};

const RECIPIENT_COLUMNS: &str =
    "id, campaign_id, phone, display_name, send_status, message_id, reserved_at, sent_at";

fn recipient_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Recipient> {
    Ok(Recipient {
        id: row.get(0)?,
        campaign_id: row.get(1)?,
        phone: row.get(2)?,
        display_name: row.get(3)?,
        send_status: enum_column(row, 4)?,
        message_id: row.get(5)?,
        reserved_at: ts_column(row, 6)?,
        sent_at: opt_ts_column(row, 7)?,
    })
}

/// Escape `LIKE` wildcards so a filter value matches literally as a prefix.
fn like_prefix(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 1);
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

/// Build the eligibility query for the contact-backed target modes.
///
/// `?1` is the campaign id, `?2` the owner or device id, `?3` the filter value.
fn contact_pool_sql(mode: TargetMode, filter: &ContactFilter) -> Option<(String, Option<Value>)> {
    let (source, phone_col, name_col, scope) = match mode {
        TargetMode::Contacts => (
            "contacts c",
            "c.phone",
            "c.name",
            "c.owner_user_id = ?2 AND c.registered = 1",
        ),
        TargetMode::DeviceContacts => (
            "device_contacts c",
            "c.phone",
            "c.full_name",
            "c.device_id = ?2",
        ),
        TargetMode::ExplicitPhones => return None,
    };

    let (predicate, value) = match filter {
        ContactFilter::All => (String::new(), None),
        ContactFilter::PhonePrefix(v) => (
            format!(" AND {phone_col} LIKE ?3 ESCAPE '\\'"),
            Some(Value::Text(like_prefix(v))),
        ),
        ContactFilter::NamePrefix(v) => (
            format!(" AND {name_col} LIKE ?3 ESCAPE '\\'"),
            Some(Value::Text(like_prefix(v))),
        ),
        ContactFilter::Group(id) => (
            " AND EXISTS (SELECT 1 FROM contact_group_members m
                          WHERE m.contact_id = c.id AND m.group_id = ?3)"
                .to_string(),
            Some(Value::Integer(*id)),
        ),
    };

    let sql = format!(
        "SELECT {phone_col}, {name_col} FROM {source}
         WHERE {scope}{predicate}
           AND NOT EXISTS (SELECT 1 FROM recipients r
                           WHERE r.campaign_id = ?1 AND r.phone = {phone_col})
         ORDER BY {phone_col}"
    );
    Some((sql, value))
}

/// Every candidate eligible for the campaign that has no recipient row yet.
pub async fn eligible_candidates(
    db: &Database,
    campaign: &Campaign,
) -> Result<Vec<Candidate>, DripcastError> {
    if campaign.target_mode == TargetMode::DeviceContacts
        && matches!(campaign.target_filter, ContactFilter::Group(_))
    {
        return Err(DripcastError::Validation(
            "group filter is not available for device contacts".to_string(),
        ));
    }

    let campaign = campaign.clone();
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            match contact_pool_sql(campaign.target_mode, &campaign.target_filter) {
                Some((sql, filter_value)) => {
                    let scope_key = match campaign.target_mode {
                        TargetMode::DeviceContacts => Value::Text(campaign.device_id.clone()),
                        _ => Value::Integer(campaign.owner_user_id),
                    };
                    let mut values = vec![Value::Integer(campaign.id), scope_key];
                    values.extend(filter_value);

                    let mut stmt = conn.prepare(&sql)?;
                    let rows = stmt.query_map(rusqlite::params_from_iter(values), |row| {
                        Ok(Candidate {
                            phone: row.get(0)?,
                            display_name: row.get(1)?,
                        })
                    })?;
                    rows.collect()
                }
                None => {
                    let mut stmt =
                        conn.prepare("SELECT phone FROM recipients WHERE campaign_id = ?1")?;
                    let taken = stmt
                        .query_map(params![campaign.id], |row| row.get::<_, String>(0))?
                        .collect::<rusqlite::Result<HashSet<_>>>()?;
                    let mut seen = HashSet::new();
                    Ok(campaign
                        .explicit_phones
                        .iter()
                        .filter(|phone| !taken.contains(*phone) && seen.insert(phone.as_str()))
                        .map(|phone| Candidate {
                            phone: phone.clone(),
                            display_name: phone.clone(),
                        })
                        .collect())
                }
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Insert the `reserved` row; `None` if the phone already has one for this campaign.
pub async fn reserve_recipient(
    db: &Database,
    campaign_id: i64,
    candidate: &Candidate,
    at: DateTime<Utc>,
) -> Result<Option<Recipient>, DripcastError> {
    let candidate = candidate.clone();
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            let inserted = conn.execute(
                "INSERT INTO recipients (campaign_id, phone, display_name, send_status, reserved_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (campaign_id, phone) DO NOTHING",
                params![
                    campaign_id,
                    candidate.phone,
                    candidate.display_name,
                    SendStatus::Reserved.to_string(),
                    format_ts(at),
                ],
            )?;
            if inserted == 0 {
                return Ok(None);
            }
            let id = conn.last_insert_rowid();
            conn.query_row(
                &format!("SELECT {RECIPIENT_COLUMNS} FROM recipients WHERE id = ?1"),
                params![id],
                recipient_from_row,
            )
            .map(Some)
        })
        .await
        .map_err(map_tr_err)
}

/// Record a successful send on a reserved row.
pub async fn mark_sent(
    db: &Database,
    recipient_id: i64,
    message_id: &str,
    sent_at: DateTime<Utc>,
) -> Result<bool, DripcastError> {
    let message_id = message_id.to_string();
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            let changed = conn.execute(
                "UPDATE recipients SET send_status = ?2, message_id = ?3, sent_at = ?4
                 WHERE id = ?1 AND send_status = ?5",
                params![
                    recipient_id,
                    SendStatus::Sent.to_string(),
                    message_id,
                    format_ts(sent_at),
                    SendStatus::Reserved.to_string(),
                ],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Statuses from which `target` is a forward move.
fn predecessors(target: SendStatus) -> Vec<String> {
    [
        SendStatus::Reserved,
        SendStatus::Sent,
        SendStatus::Delivered,
        SendStatus::Read,
        SendStatus::Failed,
    ]
    .into_iter()
    .filter(|s| s.can_advance_to(target))
    .map(|s| s.to_string())
    .collect()
}

/// Move matching recipients forward to `status`; never downgrades.
pub async fn advance_receipts(
    db: &Database,
    device_id: &str,
    message_ids: &[String],
    status: SendStatus,
) -> Result<usize, DripcastError> {
    let allowed = predecessors(status);
    if message_ids.is_empty() || allowed.is_empty() {
        return Ok(0);
    }
    let ids = message_ids.to_vec();
    let device_id = device_id.to_string();
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            let sql = format!(
                "UPDATE recipients SET send_status = ?1
                 WHERE campaign_id IN (SELECT id FROM campaigns WHERE device_id = ?2)
                   AND send_status IN ({}) AND message_id IN ({})",
                placeholders(3, allowed.len()),
                placeholders(3 + allowed.len(), ids.len()),
            );
            let values = [status.to_string(), device_id]
                .into_iter()
                .chain(allowed)
                .chain(ids);
            conn.execute(&sql, rusqlite::params_from_iter(values))
        })
        .await
        .map_err(map_tr_err)
}

/// Recipients of one campaign in reservation order.
pub async fn list_recipients(
    db: &Database,
    campaign_id: i64,
    page: u32,
    limit: u32,
) -> Result<Page<Recipient>, DripcastError> {
    let offset = Page::<Recipient>::offset(page, limit) as i64;
    let row_limit = i64::from(limit);
    let (items, total) = db
        .connection()
        .call(move |conn| -> rusqlite::Result<_> {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM recipients WHERE campaign_id = ?1",
                params![campaign_id],
                |row| row.get(0),
            )?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {RECIPIENT_COLUMNS} FROM recipients WHERE campaign_id = ?1
                 ORDER BY id ASC LIMIT ?2 OFFSET ?3"
            ))?;
            let items = stmt
                .query_map(params![campaign_id, row_limit, offset], recipient_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok((items, total))
        })
        .await
        .map_err(map_tr_err)?;
    Ok(Page::new(items, total.max(0) as u64, page, limit))
}

/// Mark `reserved` rows older than `cutoff` as `failed`, returning them.
pub async fn sweep_stale_reservations(
    db: &Database,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Recipient>, DripcastError> {
    let cutoff = format_ts(cutoff);
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            let tx = conn.transaction()?;
            let stale = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {RECIPIENT_COLUMNS} FROM recipients
                     WHERE send_status = ?1 AND reserved_at < ?2 ORDER BY id"
                ))?;
                stmt.query_map(
                    params![SendStatus::Reserved.to_string(), cutoff],
                    recipient_from_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?
            };
            {
                let mut stmt = tx.prepare(
                    "UPDATE recipients SET send_status = ?2 WHERE id = ?1 AND send_status = ?3",
                )?;
                for recipient in &stale {
                    stmt.execute(params![
                        recipient.id,
                        SendStatus::Failed.to_string(),
                        SendStatus::Reserved.to_string(),
                    ])?;
                }
            }
            tx.commit()?;
            Ok(stale
                .into_iter()
                .map(|r| Recipient {
                    send_status: SendStatus::Failed,
                    ..r
                })
                .collect())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::campaigns::{insert_campaign, tests::explicit_campaign};
    use crate::queries::contacts::{
        add_group_member, create_group, insert_contact, mark_contact_registered, replace_roster,
    };
    use crate::queries::devices::insert_device;
    use chrono::Duration;
    use dripcast_core::{Device, RosterEntry};
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn candidate(phone: &str) -> Candidate {
        Candidate {
            phone: phone.to_string(),
            display_name: phone.to_string(),
        }
    }

    fn phones(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.phone.as_str()).collect()
    }

    #[tokio::test]
    async fn explicit_pool_excludes_reserved_phones() {
        let (db, _dir) = setup_db().await;
        let campaign = insert_campaign(&db, &explicit_campaign(&["6281111", "6282222"]))
            .await
            .unwrap();

        let pool = eligible_candidates(&db, &campaign).await.unwrap();
        assert_eq!(phones(&pool), vec!["6281111", "6282222"]);

        let reserved = reserve_recipient(&db, campaign.id, &pool[0], Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reserved.send_status, SendStatus::Reserved);

        let pool = eligible_candidates(&db, &campaign).await.unwrap();
        assert_eq!(phones(&pool), vec!["6282222"]);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn second_reservation_of_same_phone_is_refused() {
        let (db, _dir) = setup_db().await;
        let campaign = insert_campaign(&db, &explicit_campaign(&["6281111"])).await.unwrap();
        let c = candidate("6281111");
        assert!(reserve_recipient(&db, campaign.id, &c, Utc::now()).await.unwrap().is_some());
        assert!(reserve_recipient(&db, campaign.id, &c, Utc::now()).await.unwrap().is_none());
        assert_eq!(list_recipients(&db, campaign.id, 1, 20).await.unwrap().total, 1);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn contacts_pool_requires_registration_and_applies_filters() {
        let (db, _dir) = setup_db().await;
        let budi = insert_contact(&db, 1, "Budi", "6281111").await.unwrap();
        let bunga = insert_contact(&db, 1, "bunga", "6291111").await.unwrap();
        let sari = insert_contact(&db, 1, "Sari", "6282222").await.unwrap();
        insert_contact(&db, 1, "unchecked", "6283333").await.unwrap();
        insert_contact(&db, 2, "other owner", "6284444").await.unwrap();
        for id in [budi.id, bunga.id, sari.id] {
            mark_contact_registered(&db, id, None).await.unwrap();
        }
        let vip = create_group(&db, 1, "vip").await.unwrap();
        add_group_member(&db, vip, sari.id).await.unwrap();

        let mut new = explicit_campaign(&[]);
        new.target_mode = TargetMode::Contacts;
        let all = insert_campaign(&db, &new).await.unwrap();
        assert_eq!(
            phones(&eligible_candidates(&db, &all).await.unwrap()),
            vec!["6281111", "6282222", "6291111"]
        );

        new.target_filter = ContactFilter::NamePrefix("BU".into());
        let by_name = insert_campaign(&db, &new).await.unwrap();
        assert_eq!(
            phones(&eligible_candidates(&db, &by_name).await.unwrap()),
            vec!["6281111", "6291111"]
        );

        new.target_filter = ContactFilter::PhonePrefix("6282".into());
        let by_phone = insert_campaign(&db, &new).await.unwrap();
        assert_eq!(
            phones(&eligible_candidates(&db, &by_phone).await.unwrap()),
            vec!["6282222"]
        );

        new.target_filter = ContactFilter::Group(vip);
        let by_group = insert_campaign(&db, &new).await.unwrap();
        let pool = eligible_candidates(&db, &by_group).await.unwrap();
        assert_eq!(pool[0].display_name, "Sari");
        assert_eq!(phones(&pool), vec!["6282222"]);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn like_wildcards_match_literally() {
        let (db, _dir) = setup_db().await;
        let a = insert_contact(&db, 1, "100%", "6281").await.unwrap();
        let b = insert_contact(&db, 1, "1000", "6282").await.unwrap();
        mark_contact_registered(&db, a.id, None).await.unwrap();
        mark_contact_registered(&db, b.id, None).await.unwrap();

        let mut new = explicit_campaign(&[]);
        new.target_mode = TargetMode::Contacts;
        new.target_filter = ContactFilter::NamePrefix("100%".into());
        let campaign = insert_campaign(&db, &new).await.unwrap();
        assert_eq!(
            phones(&eligible_candidates(&db, &campaign).await.unwrap()),
            vec!["6281"]
        );
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn device_contacts_pool_uses_roster() {
        let (db, _dir) = setup_db().await;
        insert_device(
            &db,
            &Device {
                id: "dev-1".into(),
                owner_user_id: 1,
                name: "main".into(),
                link_id: Some("link".into()),
                connected: true,
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap();
        replace_roster(
            &db,
            "dev-1",
            &[RosterEntry {
                phone: "6285555".into(),
                full_name: "Roster Friend".into(),
            }],
        )
        .await
        .unwrap();

        let mut new = explicit_campaign(&[]);
        new.target_mode = TargetMode::DeviceContacts;
        let campaign = insert_campaign(&db, &new).await.unwrap();
        let pool = eligible_candidates(&db, &campaign).await.unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool[0].display_name, "Roster Friend");

        let mut grouped = campaign.clone();
        grouped.target_filter = ContactFilter::Group(1);
        assert!(matches!(
            eligible_candidates(&db, &grouped).await,
            Err(DripcastError::Validation(_))
        ));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn receipts_only_move_forward() {
        let (db, _dir) = setup_db().await;
        let campaign = insert_campaign(&db, &explicit_campaign(&["6281111"])).await.unwrap();
        let r = reserve_recipient(&db, campaign.id, &candidate("6281111"), Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert!(mark_sent(&db, r.id, "m1", Utc::now()).await.unwrap());
        assert!(!mark_sent(&db, r.id, "m1", Utc::now()).await.unwrap());

        let ids = vec!["m1".to_string()];
        assert_eq!(advance_receipts(&db, "dev-2", &ids, SendStatus::Read).await.unwrap(), 0);
        assert_eq!(advance_receipts(&db, "dev-1", &ids, SendStatus::Read).await.unwrap(), 1);
        assert_eq!(advance_receipts(&db, "dev-1", &ids, SendStatus::Delivered).await.unwrap(), 0);
        assert_eq!(advance_receipts(&db, "dev-1", &ids, SendStatus::Read).await.unwrap(), 0);

        let stored = &list_recipients(&db, campaign.id, 1, 20).await.unwrap().items[0];
        assert_eq!(stored.send_status, SendStatus::Read);
        assert_eq!(stored.message_id.as_deref(), Some("m1"));
        assert!(stored.sent_at.is_some());

        let unknown = vec!["nope".to_string()];
        assert_eq!(advance_receipts(&db, "dev-1", &unknown, SendStatus::Read).await.unwrap(), 0);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn sweep_fails_only_old_reservations() {
        let (db, _dir) = setup_db().await;
        let campaign = insert_campaign(&db, &explicit_campaign(&["1", "2", "3"]))
            .await
            .unwrap();
        let old = Utc::now() - Duration::hours(2);
        let stale = reserve_recipient(&db, campaign.id, &candidate("1"), old)
            .await
            .unwrap()
            .unwrap();
        let sent = reserve_recipient(&db, campaign.id, &candidate("2"), old)
            .await
            .unwrap()
            .unwrap();
        mark_sent(&db, sent.id, "m2", Utc::now()).await.unwrap();
        reserve_recipient(&db, campaign.id, &candidate("3"), Utc::now())
            .await
            .unwrap()
            .unwrap();

        let swept = sweep_stale_reservations(&db, Utc::now() - Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].id, stale.id);
        assert_eq!(swept[0].send_status, SendStatus::Failed);

        // Failed rows still exclude the phone from selection.
        let pool = eligible_candidates(&db, &campaign).await.unwrap();
        assert!(pool.is_empty());
        assert!(
            sweep_stale_reservations(&db, Utc::now() - Duration::hours(1))
                .await
                .unwrap()
                .is_empty()
        );
        db.close().await.unwrap();
    }
}
