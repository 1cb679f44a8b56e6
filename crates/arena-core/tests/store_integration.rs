//! Integration tests for the SQLite store: schema, migrations, referential
//! integrity, and history ordering against a real database file.

mod common;

use arena_core::model::{NewLoadout, NewRunRecord, Outcome};
use arena_core::store::schema::CURRENT_VERSION;
use arena_core::store::{ArenaStore, HistoryFilter, StoreError};
use chrono::{Duration, TimeZone, Utc};
use rusqlite::Connection;
use tempfile::TempDir;

use common::{fight, silent_starter};

use std::thread;

fn sqlite_names(conn: &Connection, kind: &str) -> Vec<String> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = ?1 AND name NOT LIKE 'sqlite_%' ORDER BY name")
        .unwrap();
    stmt.query_map([kind], |row| row.get(0))
        .unwrap()
        .collect::<Result<Vec<String>, _>>()
        .unwrap()
}

mod schema_tests {
    use super::*;

    #[test]
    fn fresh_store_has_tables_and_indexes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("arena.db");
        let store = ArenaStore::open(&path).unwrap();
        assert_eq!(store.schema_version().unwrap(), CURRENT_VERSION);
        drop(store);

        let conn = Connection::open(&path).unwrap();
        let tables = sqlite_names(&conn, "table");
        for table in ["arena_runs", "loadouts", "schema_version"] {
            assert!(tables.contains(&table.to_string()), "missing table {table}");
        }
        let indexes = sqlite_names(&conn, "index");
        for index in [
            "idx_arena_runs_character",
            "idx_arena_runs_encounter",
            "idx_arena_runs_fought_at",
            "idx_arena_runs_loadout",
            "idx_loadouts_character",
            "idx_loadouts_uuid",
        ] {
            assert!(indexes.contains(&index.to_string()), "missing index {index}");
        }
    }

    #[test]
    fn reopen_keeps_data_and_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("arena.db");

        let id = {
            let store = ArenaStore::open(&path).unwrap();
            store
                .save_loadout(&NewLoadout::new("Poison", silent_starter()))
                .unwrap()
        };

        let store = ArenaStore::open(&path).unwrap();
        assert_eq!(store.schema_version().unwrap(), CURRENT_VERSION);
        let loadout = store.get_loadout(id).unwrap();
        assert_eq!(loadout.name, "Poison");
        assert_eq!(loadout.character, silent_starter());
    }

    #[test]
    fn newer_schema_is_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("arena.db");
        drop(ArenaStore::open(&path).unwrap());

        let conn = Connection::open(&path).unwrap();
        conn.execute("UPDATE schema_version SET version = 99", [])
            .unwrap();
        drop(conn);

        match ArenaStore::open(&path) {
            Err(StoreError::SchemaMismatch { found, supported }) => {
                assert_eq!(found, 99);
                assert_eq!(supported, CURRENT_VERSION);
            }
            other => panic!("expected SchemaMismatch, got {other:?}"),
        }

        // The refused database is left as it was.
        let conn = Connection::open(&path).unwrap();
        let version: u32 = conn
            .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, 99);
    }

    #[test]
    fn unopenable_path_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let err = ArenaStore::open(blocker.join("arena.db")).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { .. }), "{err:?}");
    }
}

mod integrity_tests {
    use super::*;

    #[test]
    fn deleting_loadout_detaches_every_run() {
        let dir = TempDir::new().unwrap();
        let store = ArenaStore::open(dir.path().join("arena.db")).unwrap();
        let id = store
            .save_loadout(&NewLoadout::new("Shivs", silent_starter()))
            .unwrap();
        let loadout = store.get_loadout(id).unwrap();

        let mut run_ids = Vec::new();
        for i in 0..7 {
            let outcome = if i % 2 == 0 {
                Outcome::Victory
            } else {
                Outcome::Defeat
            };
            let run = NewRunRecord::from_fight(&loadout, fight("Lagavulin", outcome, 6, 12), Utc::now());
            run_ids.push(store.record_run(&run).unwrap());
        }

        assert_eq!(store.delete_loadout(id).unwrap(), 7);
        assert!(matches!(store.get_loadout(id), Err(StoreError::NotFound(_))));

        let remaining: Vec<_> = store
            .query_history(HistoryFilter::all())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(remaining.len(), 7);
        assert!(remaining.iter().all(|run| run.loadout_id.is_none()));
        for id in run_ids {
            let run = store.get_run(id).unwrap();
            assert_eq!(run.deck, silent_starter().deck);
        }

        // Detached runs no longer count toward any loadout's stats.
        assert!(store.query_stats(None).unwrap().is_empty());
    }

    #[test]
    fn run_for_missing_loadout_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = ArenaStore::open(dir.path().join("arena.db")).unwrap();
        let id = store
            .save_loadout(&NewLoadout::new("Gone", silent_starter()))
            .unwrap();
        let loadout = store.get_loadout(id).unwrap();
        store.delete_loadout(id).unwrap();

        let run = NewRunRecord::from_fight(&loadout, fight("Sentries", Outcome::Victory, 4, 3), Utc::now());
        let err = store.record_run(&run).unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation(_)), "{err:?}");
    }
}

mod history_tests {
    use super::*;

    #[test]
    fn history_is_newest_first_across_pages() {
        let dir = TempDir::new().unwrap();
        let store = ArenaStore::open(dir.path().join("arena.db"))
            .unwrap()
            .with_page_size(3);
        let id = store
            .save_loadout(&NewLoadout::new("Catalyst", silent_starter()))
            .unwrap();
        let loadout = store.get_loadout(id).unwrap();

        let base = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        // Written out of order; two runs share a timestamp.
        for minutes in [5, 1, 9, 3, 9, 7, 2] {
            let run = NewRunRecord::from_fight(
                &loadout,
                fight("Gremlin_Nob", Outcome::Victory, minutes, 0),
                base + Duration::minutes(i64::from(minutes)),
            );
            store.record_run(&run).unwrap();
        }

        let runs: Vec<_> = store
            .query_history(HistoryFilter::all())
            .collect::<Result<_, _>>()
            .unwrap();
        let turns: Vec<u32> = runs.iter().map(|r| r.turns_taken).collect();
        assert_eq!(turns, vec![9, 9, 7, 5, 3, 2, 1]);
        // Ties on fought_at fall back to the newer id.
        assert!(runs[0].id > runs[1].id);

        let limited: Vec<_> = store
            .query_history(HistoryFilter::all().limit(4))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(limited.len(), 4);
        assert_eq!(limited[3].turns_taken, 5);
    }

    #[test]
    fn history_filters_combine() {
        let dir = TempDir::new().unwrap();
        let store = ArenaStore::open(dir.path().join("arena.db")).unwrap();
        let id = store
            .save_loadout(&NewLoadout::new("Mixed", silent_starter()))
            .unwrap();
        let loadout = store.get_loadout(id).unwrap();
        for (encounter, outcome) in [
            ("Hexaghost", Outcome::Victory),
            ("Hexaghost", Outcome::Defeat),
            ("Slime_Boss", Outcome::Victory),
        ] {
            store
                .record_run(&NewRunRecord::from_fight(
                    &loadout,
                    fight(encounter, outcome, 5, 10),
                    Utc::now(),
                ))
                .unwrap();
        }

        let hex_wins: Vec<_> = store
            .query_history(
                HistoryFilter::all()
                    .loadout(id)
                    .encounter("Hexaghost")
                    .outcome(Outcome::Victory),
            )
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(hex_wins.len(), 1);
        assert_eq!(hex_wins[0].encounter_id, "Hexaghost");
        assert_eq!(hex_wins[0].outcome, Outcome::Victory);
    }
}

mod concurrency_tests {
    use super::*;

    const THREADS: usize = 8;
    const PER_THREAD: usize = 10;

    #[test]
    fn cloned_handles_serialize_writes_across_threads() {
        let dir = TempDir::new().unwrap();
        let store = ArenaStore::open(dir.path().join("arena.db")).unwrap();

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..PER_THREAD {
                        let id = store
                            .save_loadout(&NewLoadout::new(format!("T{t}-{i}"), silent_starter()))
                            .unwrap();
                        let loadout = store.get_loadout(id).unwrap();
                        let run = NewRunRecord::from_fight(
                            &loadout,
                            fight("Cultist", Outcome::Victory, 3, 2),
                            Utc::now(),
                        );
                        store.record_run(&run).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("writer thread panicked");
        }

        let loadouts = store.list_loadouts().unwrap();
        assert_eq!(loadouts.len(), THREADS * PER_THREAD);
        let runs: Vec<_> = store
            .query_history(HistoryFilter::all())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(runs.len(), THREADS * PER_THREAD);
        assert!(runs.iter().all(|run| run.loadout_id.is_some()));

        let stats = store.query_stats(None).unwrap();
        assert_eq!(stats.len(), THREADS * PER_THREAD);
        assert!(stats.iter().all(|group| group.wins == 1));
    }
}
