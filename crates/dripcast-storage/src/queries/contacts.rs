// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Address book, contact groups, and synced device rosters.

use dripcast_core::{Contact, DripcastError, RosterEntry};
use rusqlite::params;

use crate::database::{Database, map_tr_err};

const CONTACT_COLUMNS: &str = "id, owner_user_id, name, phone, registered, verified_name";

fn contact_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Contact> {
    Ok(Contact {
        id: row.get(0)?,
        owner_user_id: row.get(1)?,
        name: row.get(2)?,
        phone: row.get(3)?,
        registered: row.get(4)?,
        verified_name: row.get(5)?,
    })
}

/// Add a contact. The phone must already be normalised.
pub async fn insert_contact(
    db: &Database,
    owner_user_id: i64,
    name: &str,
    phone: &str,
) -> Result<Contact, DripcastError> {
    let name = name.to_string();
    let phone = phone.to_string();
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            conn.execute(
                "INSERT INTO contacts (owner_user_id, name, phone) VALUES (?1, ?2, ?3)",
                params![owner_user_id, name, phone],
            )?;
            Ok(Contact {
                id: conn.last_insert_rowid(),
                owner_user_id,
                name,
                phone,
                registered: false,
                verified_name: None,
            })
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_contacts(db: &Database, owner_user_id: i64) -> Result<Vec<Contact>, DripcastError> {
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONTACT_COLUMNS} FROM contacts WHERE owner_user_id = ?1 ORDER BY name, id"
            ))?;
            let rows = stmt.query_map(params![owner_user_id], contact_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// A random contact, across all owners, not yet confirmed registered.
pub async fn random_unchecked_contact(db: &Database) -> Result<Option<Contact>, DripcastError> {
    db.connection()
        .call(|conn| -> rusqlite::Result<_> {
            let result = conn.query_row(
                &format!(
                    "SELECT {CONTACT_COLUMNS} FROM contacts WHERE registered = 0
                     ORDER BY RANDOM() LIMIT 1"
                ),
                [],
                contact_from_row,
            );
            match result {
                Ok(contact) => Ok(Some(contact)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Mark a contact registered. A verified name also replaces the display name.
pub async fn mark_contact_registered(
    db: &Database,
    id: i64,
    verified_name: Option<&str>,
) -> Result<(), DripcastError> {
    let verified_name = verified_name.map(str::to_string);
    db.connection()
        .call(move |conn| -> rusqlite::Result<()> {
            conn.execute(
                "UPDATE contacts
                 SET registered = 1,
                     verified_name = COALESCE(?2, verified_name),
                     name = COALESCE(?2, name)
                 WHERE id = ?1",
                params![id, verified_name],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn delete_contact(db: &Database, id: i64) -> Result<bool, DripcastError> {
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            Ok(conn.execute("DELETE FROM contacts WHERE id = ?1", params![id])? > 0)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn create_group(db: &Database, owner_user_id: i64, name: &str) -> Result<i64, DripcastError> {
    let name = name.to_string();
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            conn.execute(
                "INSERT INTO contact_groups (owner_user_id, name) VALUES (?1, ?2)",
                params![owner_user_id, name],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Add a contact to a group. Adding an existing member is a no-op.
pub async fn add_group_member(
    db: &Database,
    group_id: i64,
    contact_id: i64,
) -> Result<(), DripcastError> {
    db.connection()
        .call(move |conn| -> rusqlite::Result<()> {
            conn.execute(
                "INSERT OR IGNORE INTO contact_group_members (group_id, contact_id) VALUES (?1, ?2)",
                params![group_id, contact_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Replace the stored roster of a device in one transaction.
pub async fn replace_roster(
    db: &Database,
    device_id: &str,
    entries: &[RosterEntry],
) -> Result<usize, DripcastError> {
    let device_id = device_id.to_string();
    let entries = entries.to_vec();
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM device_contacts WHERE device_id = ?1",
                params![device_id],
            )?;
            let mut stored = 0;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR REPLACE INTO device_contacts (device_id, phone, full_name)
                     VALUES (?1, ?2, ?3)",
                )?;
                for entry in &entries {
                    stored += stmt.execute(params![device_id, entry.phone, entry.full_name])?;
                }
            }
            tx.commit()?;
            Ok(stored)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_roster(db: &Database, device_id: &str) -> Result<Vec<RosterEntry>, DripcastError> {
    let device_id = device_id.to_string();
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            let mut stmt = conn.prepare(
                "SELECT phone, full_name FROM device_contacts WHERE device_id = ?1 ORDER BY phone",
            )?;
            let rows = stmt.query_map(params![device_id], |row| {
                Ok(RosterEntry {
                    phone: row.get(0)?,
                    full_name: row.get(1)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::devices::insert_device;
    use chrono::Utc;
    use dripcast_core::Device;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn registration_updates_name_and_flag() {
        let (db, _dir) = setup_db().await;
        let contact = insert_contact(&db, 1, "budi", "6281111").await.unwrap();

        let picked = random_unchecked_contact(&db).await.unwrap().unwrap();
        assert_eq!(picked.id, contact.id);

        mark_contact_registered(&db, contact.id, Some("Budi Santoso"))
            .await
            .unwrap();
        let stored = &list_contacts(&db, 1).await.unwrap()[0];
        assert!(stored.registered);
        assert_eq!(stored.name, "Budi Santoso");
        assert!(random_unchecked_contact(&db).await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn registration_without_verified_name_keeps_name() {
        let (db, _dir) = setup_db().await;
        let contact = insert_contact(&db, 1, "sari", "6282222").await.unwrap();
        mark_contact_registered(&db, contact.id, None).await.unwrap();
        let stored = &list_contacts(&db, 1).await.unwrap()[0];
        assert_eq!(stored.name, "sari");
        assert!(stored.verified_name.is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_phone_per_owner_is_rejected() {
        let (db, _dir) = setup_db().await;
        insert_contact(&db, 1, "a", "6281111").await.unwrap();
        assert!(insert_contact(&db, 1, "b", "6281111").await.is_err());
        insert_contact(&db, 2, "a", "6281111").await.unwrap();
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn deleting_contact_drops_group_membership() {
        let (db, _dir) = setup_db().await;
        let contact = insert_contact(&db, 1, "a", "6281111").await.unwrap();
        let group = create_group(&db, 1, "vip").await.unwrap();
        add_group_member(&db, group, contact.id).await.unwrap();
        add_group_member(&db, group, contact.id).await.unwrap();

        assert!(delete_contact(&db, contact.id).await.unwrap());
        let members: i64 = db
            .connection()
            .call(|conn| -> rusqlite::Result<_> {
                conn.query_row("SELECT COUNT(*) FROM contact_group_members", [], |r| r.get(0))
            })
            .await
            .unwrap();
        assert_eq!(members, 0);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn roster_is_replaced_wholesale() {
        let (db, _dir) = setup_db().await;
        insert_device(
            &db,
            &Device {
                id: "dev-1".into(),
                owner_user_id: 1,
                name: "main".into(),
                link_id: None,
                connected: false,
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap();

        let first = vec![
            RosterEntry {
                phone: "6281111".into(),
                full_name: "A".into(),
            },
            RosterEntry {
                phone: "6282222".into(),
                full_name: "B".into(),
            },
        ];
        assert_eq!(replace_roster(&db, "dev-1", &first).await.unwrap(), 2);
        assert_eq!(replace_roster(&db, "dev-1", &first[1..]).await.unwrap(), 1);

        let roster = list_roster(&db, "dev-1").await.unwrap();
        assert_eq!(roster, first[1..].to_vec());
        db.close().await.unwrap();
    }
}
