//! Store schema and snapshot format versions.

/// Schema version of the relational store.
///
/// Bumped by exactly one for every forward migration. A store whose recorded
/// version is newer than this is refused rather than repaired.
pub const STORE_SCHEMA_VERSION: u32 = 2;

/// Current snapshot envelope format version written by the codec.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 2;

/// Oldest snapshot format the codec can still upgrade.
pub const MIN_SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Format tag written into encoded collection columns.
pub const COLUMN_FORMAT_VERSION: u32 = 1;

/// Check whether a snapshot format version can be decoded.
pub fn is_supported_snapshot(version: u32) -> bool {
    (MIN_SNAPSHOT_FORMAT_VERSION..=SNAPSHOT_FORMAT_VERSION).contains(&version)
}
