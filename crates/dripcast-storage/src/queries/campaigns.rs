// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Campaign CRUD, due-campaign pick, and completion.

use chrono::{DateTime, Utc};
use dripcast_core::{Campaign, ContactFilter, DripcastError, MediaAttachment, NewCampaign, Page};
use rusqlite::params;

use crate::database::{Database, enum_column, format_ts, map_tr_err, opt_ts_column, ts_column};

const CAMPAIGN_COLUMNS: &str = "id, owner_user_id, device_id, name, body, media_name, media_mime, \
     media_data, target_mode, filter_kind, filter_value, explicit_phones, scheduled_start, \
     paused, completed, completed_at, created_at";

fn conversion_err(idx: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn campaign_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Campaign> {
    let media_name: Option<String> = row.get(5)?;
    let media_mime: Option<String> = row.get(6)?;
    let media_data: Option<String> = row.get(7)?;
    let media = match (media_name, media_mime, media_data) {
        (Some(name), Some(mime), Some(data_url)) => Some(MediaAttachment {
            name,
            mime,
            data_url,
        }),
        _ => None,
    };

    let filter_kind: String = row.get(9)?;
    let filter_value: String = row.get(10)?;
    let target_filter =
        ContactFilter::from_parts(&filter_kind, &filter_value).map_err(|e| conversion_err(9, e))?;

    let phones_json: String = row.get(11)?;
    let explicit_phones: Vec<String> =
        serde_json::from_str(&phones_json).map_err(|e| conversion_err(11, e))?;

    Ok(Campaign {
        id: row.get(0)?,
        owner_user_id: row.get(1)?,
        device_id: row.get(2)?,
        name: row.get(3)?,
        body: row.get(4)?,
        media,
        target_mode: enum_column(row, 8)?,
        target_filter,
        explicit_phones,
        scheduled_start: ts_column(row, 12)?,
        paused: row.get(13)?,
        completed: row.get(14)?,
        completed_at: opt_ts_column(row, 15)?,
        created_at: ts_column(row, 16)?,
    })
}

fn fetch_campaign(conn: &rusqlite::Connection, id: i64) -> rusqlite::Result<Option<Campaign>> {
    let result = conn.query_row(
        &format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1"),
        params![id],
        campaign_from_row,
    );
    match result {
        Ok(campaign) => Ok(Some(campaign)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Insert a campaign and return the stored row.
pub async fn insert_campaign(db: &Database, new: &NewCampaign) -> Result<Campaign, DripcastError> {
    let new = new.clone();
    let phones_json = serde_json::to_string(&new.explicit_phones)
        .map_err(|e| DripcastError::Internal(format!("encode phone list: {e}")))?;
    let created_at = format_ts(Utc::now());
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            let (media_name, media_mime, media_data) = match &new.media {
                Some(m) => (Some(&m.name), Some(&m.mime), Some(&m.data_url)),
                None => (None, None, None),
            };
            conn.execute(
                "INSERT INTO campaigns (owner_user_id, device_id, name, body, media_name,
                     media_mime, media_data, target_mode, filter_kind, filter_value,
                     explicit_phones, scheduled_start, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    new.owner_user_id,
                    new.device_id,
                    new.name,
                    new.body,
                    media_name,
                    media_mime,
                    media_data,
                    new.target_mode.to_string(),
                    new.target_filter.kind(),
                    new.target_filter.value(),
                    phones_json,
                    format_ts(new.scheduled_start),
                    created_at,
                ],
            )?;
            let id = conn.last_insert_rowid();
            fetch_campaign(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_campaign(db: &Database, id: i64) -> Result<Option<Campaign>, DripcastError> {
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> { fetch_campaign(conn, id) })
        .await
        .map_err(map_tr_err)
}

/// One random campaign due at `now` that is neither paused nor completed.
pub async fn pick_due_campaign(
    db: &Database,
    now: DateTime<Utc>,
) -> Result<Option<Campaign>, DripcastError> {
    let now = format_ts(now);
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            let result = conn.query_row(
                &format!(
                    "SELECT {CAMPAIGN_COLUMNS} FROM campaigns
                     WHERE completed = 0 AND paused = 0 AND scheduled_start <= ?1
                     ORDER BY RANDOM() LIMIT 1"
                ),
                params![now],
                campaign_from_row,
            );
            match result {
                Ok(campaign) => Ok(Some(campaign)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

pub async fn set_paused(db: &Database, id: i64, paused: bool) -> Result<bool, DripcastError> {
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            let changed = conn.execute(
                "UPDATE campaigns SET paused = ?2 WHERE id = ?1",
                params![id, paused],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Mark completed; returns `false` if the campaign was already completed or is gone.
pub async fn mark_completed(
    db: &Database,
    id: i64,
    at: DateTime<Utc>,
) -> Result<bool, DripcastError> {
    let at = format_ts(at);
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            let changed = conn.execute(
                "UPDATE campaigns SET completed = 1, completed_at = ?2
                 WHERE id = ?1 AND completed = 0",
                params![id, at],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Campaigns of one owner and device, newest first.
pub async fn list_campaigns(
    db: &Database,
    owner_user_id: i64,
    device_id: &str,
    page: u32,
    limit: u32,
) -> Result<Page<Campaign>, DripcastError> {
    let device_id = device_id.to_string();
    let offset = Page::<Campaign>::offset(page, limit) as i64;
    let row_limit = i64::from(limit);
    let (items, total) = db
        .connection()
        .call(move |conn| -> rusqlite::Result<_> {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM campaigns WHERE owner_user_id = ?1 AND device_id = ?2",
                params![owner_user_id, device_id],
                |row| row.get(0),
            )?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {CAMPAIGN_COLUMNS} FROM campaigns
                 WHERE owner_user_id = ?1 AND device_id = ?2
                 ORDER BY id DESC LIMIT ?3 OFFSET ?4"
            ))?;
            let items = stmt
                .query_map(
                    params![owner_user_id, device_id, row_limit, offset],
                    campaign_from_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok((items, total))
        })
        .await
        .map_err(map_tr_err)?;
    Ok(Page::new(items, total.max(0) as u64, page, limit))
}

/// Delete a campaign; its recipient rows go with it.
pub async fn delete_campaign(db: &Database, id: i64) -> Result<bool, DripcastError> {
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            Ok(conn.execute("DELETE FROM campaigns WHERE id = ?1", params![id])? > 0)
        })
        .await
        .map_err(map_tr_err)
}
