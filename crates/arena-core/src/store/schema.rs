//! Schema migrations.
//!
//! Migrations are forward-only and numbered from 1. Each runs in its own
//! transaction together with the `schema_version` bump, so a crash leaves
//! the database at a whole version. A database recording a version newer
//! than [`CURRENT_VERSION`] is refused untouched.

use arena_common::STORE_SCHEMA_VERSION;
use rusqlite::{params, Connection, Transaction};
use tracing::{info, warn};

use super::StoreError;
use crate::codec;
use crate::model::{CardEntry, Multiset};

/// Schema version this build writes.
pub const CURRENT_VERSION: u32 = STORE_SCHEMA_VERSION;

struct Migration {
    version: u32,
    description: &'static str,
    apply: fn(&Transaction<'_>) -> Result<(), StoreError>,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "loadouts and arena_runs",
        apply: v1_initial,
    },
    Migration {
        version: 2,
        description: "potion slots, content hashes, favourites",
        apply: v2_content_hash,
    },
];

/// Version recorded in `schema_version`, 0 for a fresh database.
pub fn read_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
        row.get(0)
    })
}

/// Bring the database up to [`CURRENT_VERSION`].
pub(crate) fn migrate(conn: &mut Connection) -> Result<(), StoreError> {
    migrate_to(conn, CURRENT_VERSION)
}

pub(crate) fn migrate_to(conn: &mut Connection, target: u32) -> Result<(), StoreError> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;
    let rows: i64 = conn.query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))?;
    if rows == 0 {
        conn.execute("INSERT INTO schema_version (version) VALUES (0)", [])?;
    }

    let found = read_version(conn)?;
    if found > CURRENT_VERSION {
        return Err(StoreError::SchemaMismatch {
            found,
            supported: CURRENT_VERSION,
        });
    }

    for migration in MIGRATIONS
        .iter()
        .filter(|m| m.version > found && m.version <= target)
    {
        let tx = conn.transaction()?;
        (migration.apply)(&tx)?;
        tx.execute(
            "UPDATE schema_version SET version = ?1",
            params![migration.version],
        )?;
        tx.commit()?;
        info!(
            version = migration.version,
            description = migration.description,
            "applied store migration"
        );
    }
    Ok(())
}

fn v1_initial(tx: &Transaction<'_>) -> Result<(), StoreError> {
    tx.execute_batch(
        "CREATE TABLE loadouts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            character_class TEXT NOT NULL,
            ascension_level INTEGER NOT NULL DEFAULT 0,
            max_hp INTEGER NOT NULL,
            current_hp INTEGER NOT NULL,
            gold INTEGER NOT NULL DEFAULT 0,
            deck_json TEXT NOT NULL,
            relics_json TEXT NOT NULL,
            potions_json TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX idx_loadouts_uuid ON loadouts(uuid);
        CREATE INDEX idx_loadouts_character ON loadouts(character_class);

        CREATE TABLE arena_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            loadout_id INTEGER REFERENCES loadouts(id) ON DELETE SET NULL,
            encounter_id TEXT NOT NULL,
            encounter_name TEXT NOT NULL,
            character_class TEXT NOT NULL,
            ascension_level INTEGER NOT NULL,
            deck_json TEXT NOT NULL,
            relics_json TEXT NOT NULL,
            potions_json TEXT NOT NULL,
            outcome TEXT NOT NULL CHECK (outcome IN ('VICTORY', 'DEFEAT')),
            starting_hp INTEGER NOT NULL,
            ending_hp INTEGER NOT NULL,
            turns_taken INTEGER NOT NULL,
            damage_dealt INTEGER NOT NULL,
            damage_taken INTEGER NOT NULL,
            potions_used_json TEXT NOT NULL,
            floor_num INTEGER NOT NULL DEFAULT 0,
            fought_at INTEGER NOT NULL
        );
        CREATE INDEX idx_arena_runs_encounter ON arena_runs(encounter_id);
        CREATE INDEX idx_arena_runs_character ON arena_runs(character_class);
        CREATE INDEX idx_arena_runs_fought_at ON arena_runs(fought_at DESC);
        CREATE INDEX idx_arena_runs_loadout ON arena_runs(loadout_id);",
    )?;
    Ok(())
}

fn v2_content_hash(tx: &Transaction<'_>) -> Result<(), StoreError> {
    tx.execute_batch(
        "ALTER TABLE loadouts ADD COLUMN potion_slots INTEGER NOT NULL DEFAULT 3;
        ALTER TABLE loadouts ADD COLUMN content_hash TEXT NOT NULL DEFAULT '';
        ALTER TABLE loadouts ADD COLUMN is_favorite INTEGER NOT NULL DEFAULT 0;
        ALTER TABLE arena_runs ADD COLUMN content_hash TEXT;",
    )?;

    // Backfill hashes for loadouts written before v2.
    let mut stmt = tx.prepare("SELECT id, deck_json, relics_json, potions_json FROM loadouts")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (id, deck, relics, potions) in rows {
        let decoded = codec::decode_column::<Vec<CardEntry>>(&deck).and_then(|deck| {
            let relics = codec::decode_column::<Multiset>(&relics)?;
            let potions = codec::decode_column::<Multiset>(&potions)?;
            Ok(codec::content_hash(&deck, &relics, &potions))
        });
        match decoded {
            Ok(hash) => {
                tx.execute(
                    "UPDATE loadouts SET content_hash = ?1 WHERE id = ?2",
                    params![hash, id],
                )?;
            }
            Err(e) => warn!(loadout_id = id, error = %e, "cannot hash loadout during migration"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            == 1
    }

    #[test]
    fn migrations_end_at_current_version() {
        let last = MIGRATIONS.last().map(|m| m.version);
        assert_eq!(last, Some(CURRENT_VERSION));
        for (i, m) in MIGRATIONS.iter().enumerate() {
            assert_eq!(m.version, i as u32 + 1);
        }
    }

    #[test]
    fn fresh_database_migrates_fully() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        assert_eq!(read_version(&conn).unwrap(), CURRENT_VERSION);
        assert!(table_exists(&conn, "loadouts"));
        assert!(table_exists(&conn, "arena_runs"));
    }

    #[test]
    fn migrate_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn newer_schema_refused() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        conn.execute("UPDATE schema_version SET version = 99", [])
            .unwrap();
        match migrate(&mut conn) {
            Err(StoreError::SchemaMismatch { found, supported }) => {
                assert_eq!(found, 99);
                assert_eq!(supported, CURRENT_VERSION);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn v2_backfills_content_hash() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate_to(&mut conn, 1).unwrap();
        assert_eq!(read_version(&conn).unwrap(), 1);

        let deck = vec![CardEntry::new("Strike_R"), CardEntry::new("Bash")];
        let relics: Multiset = ["Burning Blood"].into_iter().collect();
        let potions = Multiset::new();
        conn.execute(
            "INSERT INTO loadouts (uuid, name, character_class, max_hp, current_hp,
                deck_json, relics_json, potions_json, created_at, updated_at)
             VALUES ('u-1', 'old', 'IRONCLAD', 80, 80, ?1, ?2, ?3, 0, 0)",
            params![
                codec::encode_column(&deck).unwrap(),
                codec::encode_column(&relics).unwrap(),
                codec::encode_column(&potions).unwrap(),
            ],
        )
        .unwrap();

        migrate(&mut conn).unwrap();
        let (hash, slots): (String, u32) = conn
            .query_row(
                "SELECT content_hash, potion_slots FROM loadouts WHERE uuid = 'u-1'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(hash, codec::content_hash(&deck, &relics, &potions));
        assert_eq!(slots, 3);
    }
}
