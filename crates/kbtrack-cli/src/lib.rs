//! kbtrack CLI - Text reports
//!
//! Turns a [`kbtrack_store::Snapshot`] into the text printed by
//! `kbtrack status`, `kbtrack history` and `kbtrack stats`. Every renderer
//! is a pure function returning a `String`; the binary only prints.

pub mod error;
pub mod render;

pub use error::{CliError, Result};
pub use render::{history, stats, stats_json, status};
