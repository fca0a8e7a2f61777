//! Core of holidir: apply or remove a holiday catalog across many mailbox
//! calendars.
//!
//! - [`holiday`]: the catalog and the all-day entries derived from it
//! - [`mailbox`]: mailboxes, shard keys, and mailbox list sources
//! - [`remote`]: the calendar service capability and its provider client
//! - [`batch`]: per-shard batch engine with its retry queue
//! - [`coordinator`]: drives all 36 shards
//! - [`run_log`]: the append-only log operators review after a run

pub mod batch;
pub mod coordinator;
pub mod error;
pub mod holiday;
pub mod mailbox;
pub mod remote;
pub mod run_log;
pub mod settings;

pub use error::{ApiError, HolidirError, HolidirResult};
