//! `keepsake-core`: domain types and configuration shared by every Keepsake crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::KeepsakeConfig;
pub use error::{KeepsakeError, Result};
