//! # tandem-store
//!
//! SQLite persistence for profiles, swipes, matches and messages.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection`. Plain CRUD helpers live next to the guarded
//! writes (`activate_match`, `end_match`, `insert_message_if_active`,
//! `mark_read`) which each run as one `IMMEDIATE` transaction so the
//! match-status invariants hold under concurrent callers.

pub mod database;
pub mod matches;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod profiles;
pub mod swipes;

mod error;
mod sql;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
