// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Device CRUD operations.

use dripcast_core::{Device, DripcastError};
use rusqlite::params;

use crate::database::{Database, format_ts, map_tr_err, ts_column};

const DEVICE_COLUMNS: &str = "id, owner_user_id, name, link_id, connected, created_at";

fn device_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Device> {
    Ok(Device {
        id: row.get(0)?,
        owner_user_id: row.get(1)?,
        name: row.get(2)?,
        link_id: row.get(3)?,
        connected: row.get(4)?,
        created_at: ts_column(row, 5)?,
    })
}

pub async fn insert_device(db: &Database, device: &Device) -> Result<(), DripcastError> {
    let device = device.clone();
    db.connection()
        .call(move |conn| -> rusqlite::Result<()> {
            conn.execute(
                "INSERT INTO devices (id, owner_user_id, name, link_id, connected, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    device.id,
                    device.owner_user_id,
                    device.name,
                    device.link_id,
                    device.connected,
                    format_ts(device.created_at),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_device(db: &Database, id: &str) -> Result<Option<Device>, DripcastError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            let result = conn.query_row(
                &format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE id = ?1"),
                params![id],
                device_from_row,
            );
            match result {
                Ok(device) => Ok(Some(device)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Devices of one owner, oldest first.
pub async fn list_devices(db: &Database, owner_user_id: i64) -> Result<Vec<Device>, DripcastError> {
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {DEVICE_COLUMNS} FROM devices WHERE owner_user_id = ?1
                 ORDER BY created_at ASC, id ASC"
            ))?;
            let rows = stmt.query_map(params![owner_user_id], device_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_linked_devices(db: &Database) -> Result<Vec<Device>, DripcastError> {
    db.connection()
        .call(|conn| -> rusqlite::Result<_> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {DEVICE_COLUMNS} FROM devices WHERE link_id IS NOT NULL
                 ORDER BY created_at ASC, id ASC"
            ))?;
            let rows = stmt.query_map([], device_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Store the link identifier (first one wins) and mark the device connected.
pub async fn set_link_id(db: &Database, id: &str, link_id: &str) -> Result<bool, DripcastError> {
    let id = id.to_string();
    let link_id = link_id.to_string();
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            let changed = conn.execute(
                "UPDATE devices SET link_id = COALESCE(link_id, ?2), connected = 1 WHERE id = ?1",
                params![id, link_id],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn set_connected(db: &Database, id: &str, connected: bool) -> Result<bool, DripcastError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            let changed = conn.execute(
                "UPDATE devices SET connected = ?2 WHERE id = ?1",
                params![id, connected],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn delete_device(db: &Database, id: &str) -> Result<bool, DripcastError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            let changed = conn.execute("DELETE FROM devices WHERE id = ?1", params![id])?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}
