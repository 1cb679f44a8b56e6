//! Practice Arena core library.
//!
//! Stores named character loadouts and the results of practice fights in
//! SQLite, and protects the host's real save file while a practice session
//! is active.
//!
//! # Modules
//!
//! - [`model`]: character state, loadouts, run state, and run records
//! - [`codec`]: versioned snapshot envelope and stored-column encoding
//! - [`store`]: the SQLite store, its migrations, and history queries
//! - [`session`]: practice begin/record/end around a backed-up save
//! - [`recovery`]: startup restore after an interrupted session
//! - [`stats`]: per-encounter win rates and Pareto-optimal victories

pub mod cli;
pub mod codec;
pub mod exit_codes;
pub mod logging;
pub mod model;
pub mod recovery;
pub mod session;
pub mod stats;
pub mod store;

pub use exit_codes::ExitCode;
