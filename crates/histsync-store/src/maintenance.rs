//! Housekeeping run by the janitor and test-mode endpoints.

use histsync_shared::constants::{DELETION_GC_READ_COUNT, ENTRY_GC_READ_COUNT};
use rusqlite::params;

use crate::database::Database;
use crate::error::Result;
use crate::models::GcStats;

impl Database {
    /// Delete entries and deletion requests that every live device has
    /// already had ample chance to read.
    pub fn collect_garbage(&self) -> Result<GcStats> {
        let entries_deleted = self.conn().execute(
            "DELETE FROM enc_history_entries WHERE read_count > ?1",
            params![ENTRY_GC_READ_COUNT],
        )?;
        let deletion_requests_deleted = self.conn().execute(
            "DELETE FROM deletion_requests WHERE read_count > ?1",
            params![DELETION_GC_READ_COUNT],
        )?;

        Ok(GcStats {
            entries_deleted,
            deletion_requests_deleted,
        })
    }

    /// Drop every entry row. Only reachable in test mode.
    pub fn wipe_entries(&self) -> Result<usize> {
        Ok(self.conn().execute("DELETE FROM enc_history_entries", [])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entries::tests::entry;
    use crate::models::{DeletionRequest, MessageIdentifiers};
    use chrono::Utc;

    #[test]
    fn gc_thresholds() {
        let mut db = Database::open_in_memory().unwrap();
        db.register_device("u", "a", "127.0.0.1").unwrap();
        db.register_device("u", "b", "127.0.0.1").unwrap();
        db.submit_entries(&[entry("u", "a", "e1", Utc::now())]).unwrap();
        db.add_deletion_request(&DeletionRequest {
            user_id: "u".into(),
            destination_device_id: String::new(),
            send_time: Utc::now(),
            messages: MessageIdentifiers::default(),
            read_count: 0,
        })
        .unwrap();

        // Ten polls leave the row at the threshold, not past it.
        for _ in 0..10 {
            db.query_entries("u", "a").unwrap();
        }
        assert_eq!(db.collect_garbage().unwrap(), GcStats::default());

        db.query_entries("u", "a").unwrap();
        for _ in 0..101 {
            db.pending_deletion_requests("u", "b").unwrap();
        }

        let stats = db.collect_garbage().unwrap();
        assert_eq!(stats.entries_deleted, 1);
        assert_eq!(stats.deletion_requests_deleted, 1);

        // Device b's copy was never polled and survives.
        assert_eq!(db.bootstrap_entries("u").unwrap().len(), 1);
        assert_eq!(db.pending_deletion_requests("u", "a").unwrap().len(), 1);
    }

    #[test]
    fn wipe_clears_entries_only() {
        let mut db = Database::open_in_memory().unwrap();
        db.register_device("u", "a", "127.0.0.1").unwrap();
        db.submit_entries(&[entry("u", "a", "e1", Utc::now())]).unwrap();

        assert_eq!(db.wipe_entries().unwrap(), 1);
        assert!(db.bootstrap_entries("u").unwrap().is_empty());
        assert_eq!(db.count_devices("u").unwrap(), 1);
    }
}
