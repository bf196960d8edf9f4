use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::database::{db_time, parse_db_time, Database};
use crate::error::Result;
use crate::models::{UsageData, UsageReportRow};

impl Database {
    /// Mark `(user_id, device_id)` as seen now and add `num_entries` to its
    /// handled-entries counter.
    pub fn record_usage(&self, user_id: &str, device_id: &str, num_entries: i64) -> Result<()> {
        upsert_usage(self.conn(), user_id, device_id, num_entries)
    }

    pub fn usage_data(&self, user_id: &str, device_id: &str) -> Result<Option<UsageData>> {
        let usage = self
            .conn()
            .query_row(
                "SELECT user_id, device_id, last_used, num_entries_handled
                 FROM usage_data WHERE user_id = ?1 AND device_id = ?2",
                params![user_id, device_id],
                |row| {
                    let last_used: String = row.get(2)?;
                    Ok(UsageData {
                        user_id: row.get(0)?,
                        device_id: row.get(1)?,
                        last_used: parse_db_time(2, &last_used)?,
                        num_entries_handled: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(usage)
    }

    /// Per-user aggregate of registrations and telemetry, oldest user first.
    ///
    /// Devices that registered more than once are counted once.
    pub fn usage_report(&self) -> Result<Vec<UsageReportRow>> {
        let mut stmt = self.conn().prepare(
            "SELECT MIN(d.first_registered) AS registration_date,
                    COUNT(*),
                    SUM(u.num_entries_handled),
                    MAX(u.last_used)
             FROM (SELECT user_id, device_id, MIN(registration_date) AS first_registered
                   FROM devices GROUP BY user_id, device_id) d
             INNER JOIN usage_data u
                 ON d.user_id = u.user_id AND d.device_id = u.device_id
             GROUP BY d.user_id
             ORDER BY registration_date, d.user_id",
        )?;

        let rows = stmt.query_map([], |row| {
            let registered: String = row.get(0)?;
            let last_used: String = row.get(3)?;
            Ok(UsageReportRow {
                registration_date: parse_db_time(0, &registered)?.date_naive(),
                num_devices: row.get(1)?,
                num_entries: row.get(2)?,
                last_used: parse_db_time(3, &last_used)?.date_naive(),
            })
        })?;

        let mut report = Vec::new();
        for row in rows {
            report.push(row?);
        }
        Ok(report)
    }
}

pub(crate) fn upsert_usage(
    conn: &Connection,
    user_id: &str,
    device_id: &str,
    num_entries: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO usage_data (user_id, device_id, last_used, num_entries_handled)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (user_id, device_id) DO UPDATE SET
             last_used = excluded.last_used,
             num_entries_handled = usage_data.num_entries_handled + excluded.num_entries_handled",
        params![user_id, device_id, db_time(&Utc::now()), num_entries],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_accumulates() {
        let db = Database::open_in_memory().unwrap();
        db.record_usage("u", "d", 0).unwrap();
        let first = db.usage_data("u", "d").unwrap().unwrap();
        assert_eq!(first.num_entries_handled, 0);

        db.record_usage("u", "d", 3).unwrap();
        db.record_usage("u", "d", 2).unwrap();
        let usage = db.usage_data("u", "d").unwrap().unwrap();
        assert_eq!(usage.num_entries_handled, 5);
        assert!(usage.last_used >= first.last_used);

        assert!(db.usage_data("u", "other").unwrap().is_none());
    }

    #[test]
    fn report_groups_by_user() {
        let mut db = Database::open_in_memory().unwrap();
        db.register_device("alice", "a1", "127.0.0.1").unwrap();
        db.register_device("alice", "a2", "127.0.0.1").unwrap();
        db.register_device("alice", "a2", "127.0.0.1").unwrap();
        db.register_device("bob", "b1", "127.0.0.1").unwrap();
        db.record_usage("alice", "a1", 4).unwrap();
        db.record_usage("alice", "a2", 1).unwrap();

        let report = db.usage_report().unwrap();
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].num_devices, 2);
        assert_eq!(report[0].num_entries, 5);
        assert_eq!(report[1].num_devices, 1);
        assert_eq!(report[1].num_entries, 0);
        assert!(report[0].registration_date <= report[1].registration_date);
    }
}
