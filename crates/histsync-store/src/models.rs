//! Row types persisted by the relay.
//!
//! Entries, dump requests and deletion requests travel over the wire
//! unchanged, so they are the `histsync-shared` types re-exported here.
//! The remaining structs only exist server-side.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub use histsync_shared::{
    DeletionRequest, DumpRequest, EncHistoryEntry, MessageIdentifier, MessageIdentifiers,
};

// ---------------------------------------------------------------------------
// Device
// ---------------------------------------------------------------------------

/// One registered (user, device) pair. Never mutated, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Device {
    pub user_id: String,
    pub device_id: String,
    /// Address the registration request came from.
    pub registration_ip: String,
    pub registration_date: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Usage telemetry
// ---------------------------------------------------------------------------

/// Advisory per-device counters; nothing in the protocol reads them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageData {
    pub user_id: String,
    pub device_id: String,
    pub last_used: DateTime<Utc>,
    pub num_entries_handled: i64,
}

/// One line of the internal usage report, aggregated per user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageReportRow {
    pub registration_date: NaiveDate,
    pub num_devices: i64,
    pub num_entries: i64,
    pub last_used: NaiveDate,
}

// ---------------------------------------------------------------------------
// Janitor
// ---------------------------------------------------------------------------

/// Rows reclaimed by one garbage-collection pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    pub entries_deleted: usize,
    pub deletion_requests_deleted: usize,
}
