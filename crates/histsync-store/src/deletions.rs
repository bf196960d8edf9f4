use rusqlite::{params, params_from_iter, Connection};

use crate::database::{db_time, parse_db_time, Database};
use crate::devices::mailbox_ids;
use crate::error::{Result, StoreError};
use crate::models::{DeletionRequest, MessageIdentifiers};

/// Identifiers matched per DELETE statement; keeps us well under SQLite's
/// bound-parameter limit.
const DELETE_CHUNK: usize = 250;

impl Database {
    /// Store `request` once per device of its user, then delete every entry
    /// it names from all mailboxes right away.
    ///
    /// The stored copies let devices that are offline now catch up on their
    /// next poll. Returns the number of entry rows deleted.
    pub fn add_deletion_request(&mut self, request: &DeletionRequest) -> Result<usize> {
        let tx = self.write_tx()?;

        let mailboxes = mailbox_ids(&tx, &request.user_id)?;
        if mailboxes.is_empty() {
            return Err(StoreError::NoDevices {
                user_id: request.user_id.clone(),
            });
        }

        let messages = serde_json::to_string(&request.messages)?;
        for mailbox in &mailboxes {
            tx.execute(
                "INSERT INTO deletion_requests
                 (user_id, destination_device_id, send_time, messages, read_count)
                 VALUES (?1, ?2, ?3, ?4, 0)",
                params![request.user_id, mailbox, db_time(&request.send_time), messages],
            )?;
        }

        let deleted = apply_deletion_request(&tx, request)?;
        tx.commit()?;

        tracing::debug!(
            user_id = %request.user_id,
            devices = mailboxes.len(),
            messages = request.messages.ids.len(),
            deleted,
            "stored deletion request"
        );
        Ok(deleted)
    }

    /// Deletion requests addressed to `device_id`, after marking them read.
    pub fn pending_deletion_requests(
        &mut self,
        user_id: &str,
        device_id: &str,
    ) -> Result<Vec<DeletionRequest>> {
        let tx = self.write_tx()?;
        tx.execute(
            "UPDATE deletion_requests SET read_count = read_count + 1
             WHERE user_id = ?1 AND destination_device_id = ?2",
            params![user_id, device_id],
        )?;
        let requests = deletion_requests_for(&tx, user_id, device_id)?;
        tx.commit()?;
        Ok(requests)
    }
}

pub(crate) fn deletion_requests_for(
    conn: &Connection,
    user_id: &str,
    device_id: &str,
) -> Result<Vec<DeletionRequest>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, destination_device_id, send_time, messages, read_count
         FROM deletion_requests
         WHERE user_id = ?1 AND destination_device_id = ?2
         ORDER BY id",
    )?;

    let rows = stmt.query_map(params![user_id, device_id], |row| {
        let send_time: String = row.get(2)?;
        let messages: String = row.get(3)?;
        Ok((
            DeletionRequest {
                user_id: row.get(0)?,
                destination_device_id: row.get(1)?,
                send_time: parse_db_time(2, &send_time)?,
                messages: MessageIdentifiers::default(),
                read_count: row.get(4)?,
            },
            messages,
        ))
    })?;

    let mut requests = Vec::new();
    for row in rows {
        let (mut request, messages) = row?;
        request.messages = serde_json::from_str(&messages)?;
        requests.push(request);
    }
    Ok(requests)
}

/// Delete every entry row of the request's user whose originating device
/// and end time match one of its identifiers, in any mailbox.
pub(crate) fn apply_deletion_request(conn: &Connection, request: &DeletionRequest) -> Result<usize> {
    let mut deleted = 0;

    for chunk in request.messages.ids.chunks(DELETE_CHUNK) {
        let disjunction = vec!["(source_device_id = ? AND end_time = ?)"; chunk.len()].join(" OR ");
        let sql = format!("DELETE FROM enc_history_entries WHERE user_id = ? AND ({disjunction})");

        let mut args = Vec::with_capacity(1 + chunk.len() * 2);
        args.push(request.user_id.clone());
        for id in chunk {
            args.push(id.device_id.clone());
            args.push(db_time(&id.end_time));
        }

        deleted += conn.execute(&sql, params_from_iter(args.iter()))?;
    }

    Ok(deleted)
}
