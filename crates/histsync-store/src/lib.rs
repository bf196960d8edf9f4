//! # histsync-store
//!
//! Relational storage for the histsync relay, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and implements every relay operation (registration,
//! fan-out, bounded redelivery, dump exchange, deletion propagation, usage
//! telemetry and garbage collection) as a typed method. All protocol state
//! lives in the tables; the handle itself holds nothing else, so several
//! server processes may share one database file.

pub mod database;
pub mod deletions;
pub mod devices;
pub mod dumps;
pub mod entries;
pub mod maintenance;
pub mod migrations;
pub mod models;
pub mod usage;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
