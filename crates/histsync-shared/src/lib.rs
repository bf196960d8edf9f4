//! # histsync-shared
//!
//! Wire types and protocol constants shared between shell clients and the
//! sync relay. Payloads are end-to-end encrypted on the client, so every
//! type here treats them as opaque bytes.

pub mod constants;
pub mod types;
pub mod update;

pub use types::*;
pub use update::UpdateInfo;
