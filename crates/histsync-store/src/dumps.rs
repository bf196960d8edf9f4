use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::database::{db_time, parse_db_time, Database};
use crate::entries::insert_entry;
use crate::error::{Result, StoreError};
use crate::models::{DumpRequest, EncHistoryEntry};
use crate::usage::upsert_usage;

impl Database {
    /// Dump requests of `user_id` that `device_id` could service, i.e. all
    /// of them except the ones it raised itself.
    pub fn pending_dump_requests(&self, user_id: &str, device_id: &str) -> Result<Vec<DumpRequest>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id, requesting_device_id, request_time
             FROM dump_requests
             WHERE user_id = ?1 AND requesting_device_id != ?2
             ORDER BY id",
        )?;

        let rows = stmt.query_map(params![user_id, device_id], |row| {
            let request_time: String = row.get(2)?;
            Ok(DumpRequest {
                user_id: row.get(0)?,
                requesting_device_id: row.get(1)?,
                request_time: parse_db_time(2, &request_time)?,
            })
        })?;

        let mut requests = Vec::new();
        for row in rows {
            requests.push(row?);
        }
        Ok(requests)
    }

    /// Apply a full-history dump from `source_device_id` into the mailbox of
    /// `requesting_device_id`, then clear the matching dump request.
    ///
    /// All or nothing: a batch containing an entry of another user is
    /// rejected without inserting anything. Peers racing to service the same
    /// request each insert their batch; the first commit clears the request
    /// and later ones find nothing to delete. Returns the number of entries
    /// inserted.
    pub fn submit_dump(
        &mut self,
        user_id: &str,
        source_device_id: &str,
        requesting_device_id: &str,
        entries: &[EncHistoryEntry],
    ) -> Result<usize> {
        let tx = self.write_tx()?;

        for entry in entries {
            if entry.user_id != user_id {
                return Err(StoreError::UserMismatch {
                    expected: user_id.to_string(),
                    found: entry.user_id.clone(),
                });
            }
            let mut copy = entry.clone();
            copy.device_id = requesting_device_id.to_string();
            copy.read_count = 0;
            insert_entry(&tx, &copy, &entry.device_id)?;
        }

        let cleared = tx.execute(
            "DELETE FROM dump_requests WHERE user_id = ?1 AND requesting_device_id = ?2",
            params![user_id, requesting_device_id],
        )?;
        upsert_usage(&tx, user_id, source_device_id, entries.len() as i64)?;

        tx.commit()?;

        tracing::debug!(
            user_id,
            source_device_id,
            requesting_device_id,
            entries = entries.len(),
            cleared,
            "applied dump"
        );
        Ok(entries.len())
    }
}

pub(crate) fn insert_dump_request(
    conn: &Connection,
    user_id: &str,
    requesting_device_id: &str,
    request_time: &DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO dump_requests (user_id, requesting_device_id, request_time)
         VALUES (?1, ?2, ?3)",
        params![user_id, requesting_device_id, db_time(request_time)],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entries::tests::entry;

    fn two_device_user() -> Database {
        let mut db = Database::open_in_memory().unwrap();
        db.register_device("u", "old", "127.0.0.1").unwrap();
        db.register_device("u", "new", "127.0.0.1").unwrap();
        db
    }

    #[test]
    fn requester_never_sees_own_request() {
        let db = two_device_user();
        assert!(db.pending_dump_requests("u", "new").unwrap().is_empty());
        assert_eq!(db.pending_dump_requests("u", "old").unwrap().len(), 1);
        assert!(db.pending_dump_requests("other", "old").unwrap().is_empty());
    }

    #[test]
    fn dump_lands_in_requesting_mailbox_and_clears_request() {
        let mut db = two_device_user();
        let batch = vec![
            entry("u", "old", "e1", Utc::now()),
            entry("u", "old", "e2", Utc::now()),
        ];

        let inserted = db.submit_dump("u", "old", "new", &batch).unwrap();
        assert_eq!(inserted, 2);

        let got = db.query_entries("u", "new").unwrap();
        assert_eq!(got.len(), 2);
        assert!(got.iter().all(|e| e.device_id == "new"));
        assert!(db.query_entries("u", "old").unwrap().is_empty());

        assert!(db.pending_dump_requests("u", "old").unwrap().is_empty());
        assert_eq!(db.usage_data("u", "old").unwrap().unwrap().num_entries_handled, 2);
    }

    #[test]
    fn second_peer_finds_request_already_cleared() {
        let mut db = two_device_user();
        db.register_device("u", "third", "127.0.0.1").unwrap();
        let batch = vec![entry("u", "old", "e1", Utc::now())];

        db.submit_dump("u", "old", "new", &batch).unwrap();
        db.submit_dump("u", "third", "new", &batch).unwrap();

        assert_eq!(db.query_entries("u", "new").unwrap().len(), 2);
        let pending = db.pending_dump_requests("u", "old").unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].requesting_device_id, "third");
    }

    #[test]
    fn foreign_entry_rejects_whole_batch() {
        let mut db = two_device_user();
        let batch = vec![
            entry("u", "old", "e1", Utc::now()),
            entry("mallory", "old", "e2", Utc::now()),
        ];

        let err = db.submit_dump("u", "old", "new", &batch).unwrap_err();
        assert!(matches!(err, StoreError::UserMismatch { ref found, .. } if found == "mallory"));

        assert!(db.bootstrap_entries("u").unwrap().is_empty());
        assert!(db.bootstrap_entries("mallory").unwrap().is_empty());
        assert_eq!(db.pending_dump_requests("u", "old").unwrap().len(), 1);
    }
}
