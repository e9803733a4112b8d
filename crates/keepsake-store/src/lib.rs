//! `keepsake-store`: persistence for messages, recipients and delivery tokens.
//!
//! The release engine only talks to the [`Store`] trait. [`SqliteStore`] is
//! the production implementation; it also exposes authoring helpers
//! (`insert_message`, `link_recipient`, …) used by seeding and tests, which
//! are not part of the trait.

pub mod db;
pub mod error;
pub mod sqlite;
pub mod store;

pub use error::{Result, StoreError};
pub use sqlite::SqliteStore;
pub use store::{StatusUpdate, Store};
