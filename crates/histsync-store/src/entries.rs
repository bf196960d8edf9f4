use histsync_shared::constants::QUERY_READ_COUNT_LIMIT;
use rusqlite::{params, Connection};

use crate::database::{db_time, parse_db_time, Database};
use crate::deletions::{apply_deletion_request, deletion_requests_for};
use crate::devices::mailbox_ids;
use crate::error::{Result, StoreError};
use crate::models::EncHistoryEntry;
use crate::usage::upsert_usage;

const ENTRY_COLUMNS: &str =
    "enc_data, nonce, device_id, user_id, end_time, entry_id, read_count";

impl Database {
    /// Fan each entry out to every mailbox of its user.
    ///
    /// The incoming `device_id` only identifies the source device for
    /// telemetry; each stored copy carries its destination mailbox instead.
    /// Runs as one transaction: if any entry belongs to a user with no
    /// registered device, nothing is written. Returns the number of rows
    /// inserted.
    pub fn submit_entries(&mut self, entries: &[EncHistoryEntry]) -> Result<usize> {
        let tx = self.write_tx()?;
        let mut inserted = 0;

        for entry in entries {
            upsert_usage(&tx, &entry.user_id, &entry.device_id, 1)?;

            let mailboxes = mailbox_ids(&tx, &entry.user_id)?;
            if mailboxes.is_empty() {
                return Err(StoreError::NoDevices {
                    user_id: entry.user_id.clone(),
                });
            }

            let mut copy = entry.clone();
            copy.read_count = 0;
            for mailbox in mailboxes {
                copy.device_id = mailbox;
                insert_entry(&tx, &copy, &entry.device_id)?;
                inserted += 1;
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    /// Poll one mailbox.
    ///
    /// Every row in the mailbox has its read count bumped *before* anything
    /// is read, then pending deletions for this device are applied, then rows
    /// still inside the visibility window are returned. Rows are never
    /// deleted here.
    pub fn query_entries(&mut self, user_id: &str, device_id: &str) -> Result<Vec<EncHistoryEntry>> {
        let tx = self.write_tx()?;

        tx.execute(
            "UPDATE enc_history_entries SET read_count = read_count + 1
             WHERE user_id = ?1 AND device_id = ?2",
            params![user_id, device_id],
        )?;

        for request in deletion_requests_for(&tx, user_id, device_id)? {
            apply_deletion_request(&tx, &request)?;
        }

        let entries = select_entries(
            &tx,
            "WHERE user_id = ?1 AND device_id = ?2 AND read_count < ?3",
            params![user_id, device_id, QUERY_READ_COUNT_LIMIT],
        )?;

        tx.commit()?;
        Ok(entries)
    }

    /// Every row in every mailbox of `user_id`, regardless of read count.
    pub fn bootstrap_entries(&self, user_id: &str) -> Result<Vec<EncHistoryEntry>> {
        select_entries(self.conn(), "WHERE user_id = ?1", params![user_id])
    }
}

/// Insert one mailbox row. `source_device_id` is the device the entry
/// originated on; deletion requests match against it, never the mailbox.
pub(crate) fn insert_entry(
    conn: &Connection,
    entry: &EncHistoryEntry,
    source_device_id: &str,
) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO enc_history_entries ({ENTRY_COLUMNS}, source_device_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
        ),
        params![
            entry.enc_data,
            entry.nonce,
            entry.device_id,
            entry.user_id,
            db_time(&entry.end_time),
            entry.entry_id,
            entry.read_count,
            source_device_id,
        ],
    )?;
    Ok(())
}

fn select_entries(
    conn: &Connection,
    filter: &str,
    args: impl rusqlite::Params,
) -> Result<Vec<EncHistoryEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM enc_history_entries {filter} ORDER BY id"
    ))?;

    let rows = stmt.query_map(args, row_to_entry)?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<EncHistoryEntry> {
    let end_time: String = row.get(4)?;
    Ok(EncHistoryEntry {
        enc_data: row.get(0)?,
        nonce: row.get(1)?,
        device_id: row.get(2)?,
        user_id: row.get(3)?,
        end_time: parse_db_time(4, &end_time)?,
        entry_id: row.get(5)?,
        read_count: row.get(6)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};

    pub(crate) fn entry(user_id: &str, device_id: &str, entry_id: &str, end_time: DateTime<Utc>) -> EncHistoryEntry {
        EncHistoryEntry {
            enc_data: format!("ciphertext-{entry_id}").into_bytes(),
            nonce: vec![7; 12],
            device_id: device_id.to_string(),
            user_id: user_id.to_string(),
            end_time,
            entry_id: entry_id.to_string(),
            read_count: 0,
        }
    }

    fn db_with_devices(user_id: &str, devices: &[&str]) -> Database {
        let mut db = Database::open_in_memory().unwrap();
        for device in devices {
            db.register_device(user_id, device, "127.0.0.1").unwrap();
        }
        db
    }

    #[test]
    fn submit_fans_out_to_every_device() {
        let mut db = db_with_devices("u", &["a", "b", "c"]);
        let inserted = db
            .submit_entries(&[entry("u", "a", "e1", Utc::now())])
            .unwrap();
        assert_eq!(inserted, 3);

        for device in ["a", "b", "c"] {
            let got = db.query_entries("u", device).unwrap();
            assert_eq!(got.len(), 1, "device {device}");
            assert_eq!(got[0].device_id, device);
            assert_eq!(got[0].entry_id, "e1");
            assert_eq!(got[0].enc_data, b"ciphertext-e1");
        }

        let usage = db.usage_data("u", "a").unwrap().unwrap();
        assert_eq!(usage.num_entries_handled, 1);
    }

    #[test]
    fn submit_without_devices_writes_nothing() {
        let mut db = db_with_devices("u", &["a"]);
        let err = db
            .submit_entries(&[
                entry("u", "a", "e1", Utc::now()),
                entry("ghost", "x", "e2", Utc::now()),
            ])
            .unwrap_err();
        assert!(matches!(err, StoreError::NoDevices { ref user_id } if user_id == "ghost"));
        assert!(db.bootstrap_entries("u").unwrap().is_empty());
    }

    #[test]
    fn query_respects_visibility_window() {
        let mut db = db_with_devices("u", &["a"]);
        db.submit_entries(&[entry("u", "a", "e1", Utc::now())]).unwrap();

        for poll in 1..=4 {
            let got = db.query_entries("u", "a").unwrap();
            assert_eq!(got.len(), 1, "poll {poll}");
            assert_eq!(got[0].read_count, poll);
        }
        assert!(db.query_entries("u", "a").unwrap().is_empty());
        assert!(db.query_entries("u", "a").unwrap().is_empty());

        let all = db.bootstrap_entries("u").unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].read_count, 6);
    }

    #[test]
    fn query_only_touches_own_mailbox() {
        let mut db = db_with_devices("u", &["a", "b"]);
        db.submit_entries(&[entry("u", "a", "e1", Utc::now())]).unwrap();

        for _ in 0..5 {
            db.query_entries("u", "a").unwrap();
        }
        assert_eq!(db.query_entries("u", "b").unwrap().len(), 1);
    }

    #[test]
    fn query_applies_pending_deletions() {
        let mut db = db_with_devices("u", &["a", "b"]);
        let t = Utc::now() - Duration::minutes(1);
        db.submit_entries(&[entry("u", "a", "e1", t), entry("u", "a", "e2", Utc::now())])
            .unwrap();

        // Simulate a deletion request that arrived after its eager apply
        // ran, e.g. from a second server process.
        db.conn()
            .execute(
                "INSERT INTO deletion_requests
                 (user_id, destination_device_id, send_time, messages, read_count)
                 VALUES ('u', 'b', ?1, ?2, 0)",
                params![
                    db_time(&Utc::now()),
                    format!(
                        r#"{{"ids":[{{"device_id":"a","end_time":"{}","entry_id":"e1"}}]}}"#,
                        t.to_rfc3339()
                    )
                ],
            )
            .unwrap();

        let got = db.query_entries("u", "b").unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].entry_id, "e2");
    }

    #[test]
    fn bootstrap_returns_all_mailboxes() {
        let mut db = db_with_devices("u", &["a", "b"]);
        db.submit_entries(&[entry("u", "a", "e1", Utc::now())]).unwrap();
        db.register_device("other", "z", "127.0.0.1").unwrap();
        db.submit_entries(&[entry("other", "z", "e9", Utc::now())]).unwrap();

        let all = db.bootstrap_entries("u").unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|e| e.user_id == "u"));
    }
}
