//! Practice Arena common types, IDs, and errors.
//!
//! This crate provides foundational types shared across arena-core modules:
//! - Loadout, run, and practice-session identity types
//! - Store schema and snapshot format versions
//! - The error taxonomy surfaced to callers
//! - Output format selection

pub mod error;
pub mod id;
pub mod output;
pub mod schema;

pub use error::{Error, Result};
pub use id::{LoadoutId, LoadoutUuid, PracticeSessionId, RunId};
pub use output::OutputFormat;
pub use schema::{SNAPSHOT_FORMAT_VERSION, STORE_SCHEMA_VERSION};
