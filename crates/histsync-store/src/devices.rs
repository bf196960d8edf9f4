use chrono::Utc;
use rusqlite::{params, Connection};

use crate::database::{db_time, parse_db_time, Database};
use crate::dumps::insert_dump_request;
use crate::error::Result;
use crate::models::Device;
use crate::usage::upsert_usage;

impl Database {
    /// Register `device_id` as a mailbox of `user_id`.
    ///
    /// The registry is additive: registering the same pair twice is not an
    /// error. When the user already had at least one device, a dump request
    /// is queued so a peer bootstraps the newcomer. Returns whether that
    /// happened.
    pub fn register_device(
        &mut self,
        user_id: &str,
        device_id: &str,
        registration_ip: &str,
    ) -> Result<bool> {
        let tx = self.write_tx()?;

        let existing = count_devices(&tx, user_id)?;
        let now = Utc::now();
        tx.execute(
            "INSERT INTO devices (user_id, device_id, registration_ip, registration_date)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, device_id, registration_ip, db_time(&now)],
        )?;

        let needs_dump = existing > 0;
        if needs_dump {
            insert_dump_request(&tx, user_id, device_id, &now)?;
        }
        upsert_usage(&tx, user_id, device_id, 0)?;

        tx.commit()?;

        tracing::debug!(user_id, device_id, existing, needs_dump, "registered device");
        Ok(needs_dump)
    }

    pub fn count_devices(&self, user_id: &str) -> Result<i64> {
        count_devices(self.conn(), user_id)
    }

    /// Every registration row for `user_id`, oldest first.
    pub fn devices_for_user(&self, user_id: &str) -> Result<Vec<Device>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id, device_id, registration_ip, registration_date
             FROM devices WHERE user_id = ?1 ORDER BY id",
        )?;

        let rows = stmt.query_map(params![user_id], |row| {
            let registered: String = row.get(3)?;
            Ok(Device {
                user_id: row.get(0)?,
                device_id: row.get(1)?,
                registration_ip: row.get(2)?,
                registration_date: parse_db_time(3, &registered)?,
            })
        })?;

        let mut devices = Vec::new();
        for row in rows {
            devices.push(row?);
        }
        Ok(devices)
    }
}

fn count_devices(conn: &Connection, user_id: &str) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM devices WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Distinct mailbox ids of `user_id`: the fan-out targets.
pub(crate) fn mailbox_ids(conn: &Connection, user_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT device_id FROM devices WHERE user_id = ?1
         GROUP BY device_id ORDER BY MIN(id)",
    )?;
    let rows = stmt.query_map(params![user_id], |row| row.get(0))?;

    let mut ids = Vec::new();
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_device_does_not_request_dump() {
        let mut db = Database::open_in_memory().unwrap();
        assert!(!db.register_device("u", "d1", "10.0.0.1").unwrap());
        assert!(db.pending_dump_requests("u", "someone-else").unwrap().is_empty());
    }

    #[test]
    fn later_devices_request_dump() {
        let mut db = Database::open_in_memory().unwrap();
        db.register_device("u", "d1", "10.0.0.1").unwrap();
        assert!(db.register_device("u", "d2", "10.0.0.2").unwrap());

        let pending = db.pending_dump_requests("u", "d1").unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].requesting_device_id, "d2");
    }

    #[test]
    fn duplicate_registration_is_additive() {
        let mut db = Database::open_in_memory().unwrap();
        db.register_device("u", "d1", "10.0.0.1").unwrap();
        db.register_device("u", "d1", "10.0.0.1").unwrap();

        assert_eq!(db.count_devices("u").unwrap(), 2);
        assert_eq!(db.devices_for_user("u").unwrap().len(), 2);
        assert_eq!(mailbox_ids(db.conn(), "u").unwrap(), vec!["d1".to_string()]);
    }

    #[test]
    fn registration_records_usage_and_ip() {
        let mut db = Database::open_in_memory().unwrap();
        db.register_device("u", "d1", "192.168.1.7").unwrap();

        let devices = db.devices_for_user("u").unwrap();
        assert_eq!(devices[0].registration_ip, "192.168.1.7");
        assert!(db.usage_data("u", "d1").unwrap().is_some());
        assert_eq!(db.count_devices("other").unwrap(), 0);
    }
}
