//! Run record persistence and grouped queries.

use arena_common::{LoadoutId, RunId};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{from_millis, is_constraint, to_millis, ArenaStore, StoreError};
use crate::codec::{self, CodecError};
use crate::model::{CharacterClass, NewRunRecord, Outcome, RunRecord, VictoryMetrics};

pub(super) const RUN_COLUMNS: &str = "id, loadout_id, encounter_id, encounter_name, \
     character_class, ascension_level, deck_json, relics_json, potions_json, outcome, \
     starting_hp, ending_hp, turns_taken, damage_dealt, damage_taken, potions_used_json, \
     floor_num, fought_at, content_hash";

/// Per-(loadout, encounter) totals computed in SQL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCounts {
    pub loadout_id: LoadoutId,
    pub encounter_id: String,
    pub encounter_name: String,
    pub total_runs: u32,
    pub wins: u32,
    pub losses: u32,
}

/// Decoded victories of one (loadout, encounter) group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Victories {
    pub metrics: Vec<VictoryMetrics>,
    /// Victory rows that could not be decoded.
    pub skipped: u32,
}

/// Most recent result of a loadout against one encounter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncounterOutcome {
    pub encounter_id: String,
    pub encounter_name: String,
    pub outcome: Outcome,
    pub fought_at: DateTime<Utc>,
}

/// A run row before its collection columns are decoded.
pub(super) struct RunRow {
    id: i64,
    loadout_id: Option<i64>,
    encounter_id: String,
    encounter_name: String,
    character_class: String,
    ascension_level: u32,
    deck_json: String,
    relics_json: String,
    potions_json: String,
    outcome: String,
    starting_hp: u32,
    ending_hp: u32,
    turns_taken: u32,
    damage_dealt: u32,
    damage_taken: u32,
    potions_used_json: String,
    floor_num: u32,
    pub(super) fought_at: i64,
    content_hash: Option<String>,
}

pub(super) fn row_to_run_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRow> {
    Ok(RunRow {
        id: row.get(0)?,
        loadout_id: row.get(1)?,
        encounter_id: row.get(2)?,
        encounter_name: row.get(3)?,
        character_class: row.get(4)?,
        ascension_level: row.get(5)?,
        deck_json: row.get(6)?,
        relics_json: row.get(7)?,
        potions_json: row.get(8)?,
        outcome: row.get(9)?,
        starting_hp: row.get(10)?,
        ending_hp: row.get(11)?,
        turns_taken: row.get(12)?,
        damage_dealt: row.get(13)?,
        damage_taken: row.get(14)?,
        potions_used_json: row.get(15)?,
        floor_num: row.get(16)?,
        fought_at: row.get(17)?,
        content_hash: row.get(18)?,
    })
}

fn parse_outcome(raw: &str) -> Result<Outcome, CodecError> {
    match raw {
        "VICTORY" => Ok(Outcome::Victory),
        "DEFEAT" => Ok(Outcome::Defeat),
        other => Err(CodecError::Decode(format!("unknown outcome '{other}'"))),
    }
}

impl RunRow {
    pub(super) fn id(&self) -> i64 {
        self.id
    }

    pub(super) fn decode(self) -> Result<RunRecord, StoreError> {
        let id = self.id;
        let decode_err = |source: CodecError| StoreError::Decode {
            table: "arena_runs",
            id,
            source,
        };
        Ok(RunRecord {
            id: RunId(self.id),
            loadout_id: self.loadout_id.map(LoadoutId),
            encounter_id: self.encounter_id,
            encounter_name: self.encounter_name,
            character_class: CharacterClass(self.character_class),
            ascension_level: self.ascension_level,
            deck: codec::decode_column(&self.deck_json).map_err(decode_err)?,
            relics: codec::decode_column(&self.relics_json).map_err(decode_err)?,
            potions: codec::decode_column(&self.potions_json).map_err(decode_err)?,
            content_hash: self.content_hash,
            outcome: parse_outcome(&self.outcome).map_err(decode_err)?,
            turns_taken: self.turns_taken,
            damage_dealt: self.damage_dealt,
            damage_taken: self.damage_taken,
            starting_hp: self.starting_hp,
            ending_hp: self.ending_hp,
            potions_used: codec::decode_column(&self.potions_used_json).map_err(decode_err)?,
            floor_num: self.floor_num,
            fought_at: from_millis(self.fought_at),
        })
    }
}

impl ArenaStore {
    /// Append a run record. Records are never updated afterwards.
    pub fn record_run(&self, run: &NewRunRecord) -> Result<RunId, StoreError> {
        run.validate()?;
        let encode_err = |e: CodecError| StoreError::ConstraintViolation(e.to_string());
        let deck = codec::encode_column(&run.deck).map_err(encode_err)?;
        let relics = codec::encode_column(&run.relics).map_err(encode_err)?;
        let potions = codec::encode_column(&run.potions).map_err(encode_err)?;
        let potions_used = codec::encode_column(&run.potions_used).map_err(encode_err)?;

        let id = self
            .with_tx(|tx| {
                tx.execute(
                    "INSERT INTO arena_runs (loadout_id, encounter_id, encounter_name, \
                     character_class, ascension_level, deck_json, relics_json, potions_json, \
                     outcome, starting_hp, ending_hp, turns_taken, damage_dealt, damage_taken, \
                     potions_used_json, floor_num, fought_at, content_hash) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, \
                     ?16, ?17, ?18)",
                    params![
                        run.loadout_id.map(|id| id.0),
                        run.encounter_id,
                        run.encounter_name,
                        run.character_class.as_str(),
                        run.ascension_level,
                        deck,
                        relics,
                        potions,
                        run.outcome.as_str(),
                        run.starting_hp,
                        run.ending_hp,
                        run.turns_taken,
                        run.damage_dealt,
                        run.damage_taken,
                        potions_used,
                        run.floor_num,
                        to_millis(run.fought_at),
                        run.content_hash,
                    ],
                )?;
                Ok(RunId(tx.last_insert_rowid()))
            })
            .map_err(|e| match e {
                StoreError::Sqlite(e) if is_constraint(&e) => {
                    StoreError::ConstraintViolation(format!("run references unknown loadout: {e}"))
                }
                other => other,
            })?;

        info!(
            run_id = %id,
            encounter = %run.encounter_id,
            outcome = %run.outcome,
            loadout_id = ?run.loadout_id.map(|l| l.0),
            "run recorded"
        );
        Ok(id)
    }

    pub fn get_run(&self, id: RunId) -> Result<RunRecord, StoreError> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {RUN_COLUMNS} FROM arena_runs WHERE id = ?1");
            conn.query_row(&sql, params![id.0], row_to_run_row)
                .optional()?
                .ok_or_else(|| StoreError::NotFound(format!("run {id}")))?
                .decode()
        })
    }

    /// Totals per (loadout, encounter), counting only runs whose loadout
    /// still exists.
    pub fn query_stats(&self, loadout: Option<LoadoutId>) -> Result<Vec<GroupCounts>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.loadout_id, r.encounter_id, MAX(r.encounter_name), COUNT(*), \
                 SUM(CASE WHEN r.outcome = 'VICTORY' THEN 1 ELSE 0 END), \
                 SUM(CASE WHEN r.outcome = 'DEFEAT' THEN 1 ELSE 0 END) \
                 FROM arena_runs r JOIN loadouts l ON l.id = r.loadout_id \
                 WHERE ?1 IS NULL OR r.loadout_id = ?1 \
                 GROUP BY r.loadout_id, r.encounter_id \
                 ORDER BY r.loadout_id, r.encounter_id",
            )?;
            let groups = stmt
                .query_map(params![loadout.map(|l| l.0)], |row| {
                    Ok(GroupCounts {
                        loadout_id: LoadoutId(row.get(0)?),
                        encounter_id: row.get(1)?,
                        encounter_name: row.get(2)?,
                        total_runs: row.get(3)?,
                        wins: row.get(4)?,
                        losses: row.get(5)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(groups)
        })
    }

    /// Every victory of `loadout` against `encounter_id`, oldest first.
    ///
    /// Rows that fail to decode are left out and counted in
    /// [`Victories::skipped`].
    pub fn victories_for(
        &self,
        loadout: LoadoutId,
        encounter_id: &str,
    ) -> Result<Victories, StoreError> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {RUN_COLUMNS} FROM arena_runs \
                 WHERE loadout_id = ?1 AND encounter_id = ?2 AND outcome = 'VICTORY' \
                 ORDER BY fought_at, id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![loadout.0, encounter_id], row_to_run_row)?
                .collect::<Result<Vec<_>, _>>()?;

            let mut victories = Victories::default();
            for row in rows {
                let id = row.id();
                match row.decode() {
                    Ok(run) => victories.metrics.push(run.metrics()),
                    Err(e) => {
                        warn!(run_id = id, error = %e, "skipping undecodable victory");
                        victories.skipped += 1;
                    }
                }
            }
            Ok(victories)
        })
    }

    /// Latest outcome per encounter for one loadout.
    pub fn encounter_outcomes(
        &self,
        loadout: LoadoutId,
    ) -> Result<Vec<EncounterOutcome>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.encounter_id, r.encounter_name, r.outcome, r.fought_at \
                 FROM arena_runs r \
                 WHERE r.loadout_id = ?1 AND r.id = ( \
                     SELECT r2.id FROM arena_runs r2 \
                     WHERE r2.loadout_id = ?1 AND r2.encounter_id = r.encounter_id \
                     ORDER BY r2.fought_at DESC, r2.id DESC LIMIT 1) \
                 ORDER BY r.encounter_id",
            )?;
            let rows = stmt
                .query_map(params![loadout.0], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut outcomes = Vec::with_capacity(rows.len());
            for (encounter_id, encounter_name, outcome, fought_at) in rows {
                match parse_outcome(&outcome) {
                    Ok(outcome) => outcomes.push(EncounterOutcome {
                        encounter_id,
                        encounter_name,
                        outcome,
                        fought_at: from_millis(fought_at),
                    }),
                    Err(e) => warn!(encounter = %encounter_id, error = %e, "skipping outcome"),
                }
            }
            Ok(outcomes)
        })
    }

    /// Distinct content hashes this loadout was fought with, oldest first.
    pub fn content_hashes_for(&self, loadout: LoadoutId) -> Result<Vec<String>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT content_hash FROM arena_runs \
                 WHERE loadout_id = ?1 AND content_hash IS NOT NULL \
                 GROUP BY content_hash ORDER BY MIN(fought_at), MIN(id)",
            )?;
            let hashes = stmt
                .query_map(params![loadout.0], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(hashes)
        })
    }

    /// Delete every run record. Loadouts are kept.
    pub fn clear_history(&self) -> Result<usize, StoreError> {
        let deleted = self.with_tx(|tx| Ok(tx.execute("DELETE FROM arena_runs", [])?))?;
        info!(deleted, "run history cleared");
        Ok(deleted)
    }
}
