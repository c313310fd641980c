// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation history.

use dripcast_core::{ChatMessage, DripcastError, ReceiptType};
use rusqlite::params;

use crate::database::{Database, enum_column, format_ts, map_tr_err, placeholders, ts_column};

/// Store a message. Re-delivery of the same id on the same device is ignored.
pub async fn insert_message(db: &Database, message: &ChatMessage) -> Result<(), DripcastError> {
    let message = message.clone();
    db.connection()
        .call(move |conn| -> rusqlite::Result<()> {
            conn.execute(
                "INSERT OR IGNORE INTO messages
                     (id, device_id, remote_phone, from_me, kind, body, push_name, timestamp, receipt)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    message.id,
                    message.device_id,
                    message.remote_phone,
                    message.from_me,
                    message.kind.to_string(),
                    message.body,
                    message.push_name,
                    format_ts(message.timestamp),
                    message.receipt,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Record `receipt` on the device's outbound messages. A stored receipt is
/// only replaced by one that supersedes it, so late or duplicate receipts
/// never rewind history.
pub async fn update_message_receipt(
    db: &Database,
    device_id: &str,
    message_ids: &[String],
    receipt: ReceiptType,
) -> Result<usize, DripcastError> {
    if message_ids.is_empty() || !receipt.tracks_progress() {
        return Ok(0);
    }
    let ids = message_ids.to_vec();
    let superseded: Vec<String> = receipt.supersedes().iter().map(|r| r.to_string()).collect();
    let device_id = device_id.to_string();
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            let previous = if superseded.is_empty() {
                String::new()
            } else {
                format!(" OR receipt IN ({})", placeholders(3, superseded.len()))
            };
            let sql = format!(
                "UPDATE messages SET receipt = ?1
                 WHERE device_id = ?2 AND from_me = 1 AND (receipt IS NULL{previous})
                   AND id IN ({})",
                placeholders(3 + superseded.len(), ids.len())
            );
            let values = [receipt.to_string(), device_id]
                .into_iter()
                .chain(superseded)
                .chain(ids);
            conn.execute(&sql, rusqlite::params_from_iter(values))
        })
        .await
        .map_err(map_tr_err)
}

/// Latest messages exchanged with one remote party, newest first.
pub async fn list_messages(
    db: &Database,
    device_id: &str,
    remote_phone: &str,
    limit: u32,
) -> Result<Vec<ChatMessage>, DripcastError> {
    let device_id = device_id.to_string();
    let remote_phone = remote_phone.to_string();
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            let mut stmt = conn.prepare(
                "SELECT id, device_id, remote_phone, from_me, kind, body, push_name, timestamp, receipt
                 FROM messages WHERE device_id = ?1 AND remote_phone = ?2
                 ORDER BY timestamp DESC LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![device_id, remote_phone, i64::from(limit)], |row| {
                Ok(ChatMessage {
                    id: row.get(0)?,
                    device_id: row.get(1)?,
                    remote_phone: row.get(2)?,
                    from_me: row.get(3)?,
                    kind: enum_column(row, 4)?,
                    body: row.get(5)?,
                    push_name: row.get(6)?,
                    timestamp: ts_column(row, 7)?,
                    receipt: row.get(8)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
