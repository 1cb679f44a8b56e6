//! Loadout persistence.

use arena_common::{LoadoutId, LoadoutUuid};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use super::{from_millis, now, to_millis, ArenaStore, StoreError};
use crate::codec::{self, CodecError};
use crate::model::{
    CardEntry, CharacterClass, CharacterState, Loadout, LoadoutUpdate, Multiset, NewLoadout,
};

const LOADOUT_COLUMNS: &str = "id, uuid, name, character_class, ascension_level, max_hp, \
     current_hp, gold, deck_json, relics_json, potions_json, created_at, updated_at, \
     potion_slots, content_hash, is_favorite";

/// A loadout row before its collection columns are decoded.
struct LoadoutRow {
    id: i64,
    uuid: String,
    name: String,
    character_class: String,
    ascension_level: u32,
    max_hp: u32,
    current_hp: u32,
    gold: u32,
    deck_json: String,
    relics_json: String,
    potions_json: String,
    created_at: i64,
    updated_at: i64,
    potion_slots: u32,
    content_hash: String,
    is_favorite: bool,
}

fn row_to_loadout_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LoadoutRow> {
    Ok(LoadoutRow {
        id: row.get(0)?,
        uuid: row.get(1)?,
        name: row.get(2)?,
        character_class: row.get(3)?,
        ascension_level: row.get(4)?,
        max_hp: row.get(5)?,
        current_hp: row.get(6)?,
        gold: row.get(7)?,
        deck_json: row.get(8)?,
        relics_json: row.get(9)?,
        potions_json: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
        potion_slots: row.get(13)?,
        content_hash: row.get(14)?,
        is_favorite: row.get(15)?,
    })
}

impl LoadoutRow {
    fn decode(self) -> Result<Loadout, StoreError> {
        let id = self.id;
        let decode_err = |source: CodecError| StoreError::Decode {
            table: "loadouts",
            id,
            source,
        };
        let uuid = LoadoutUuid::parse(&self.uuid)
            .ok_or_else(|| decode_err(CodecError::Decode(format!("bad uuid '{}'", self.uuid))))?;
        let deck: Vec<CardEntry> = codec::decode_column(&self.deck_json).map_err(decode_err)?;
        let relics: Multiset = codec::decode_column(&self.relics_json).map_err(decode_err)?;
        let potions: Multiset = codec::decode_column(&self.potions_json).map_err(decode_err)?;
        Ok(Loadout {
            id: LoadoutId(self.id),
            uuid,
            name: self.name,
            character: CharacterState {
                character_class: CharacterClass(self.character_class),
                ascension_level: self.ascension_level,
                max_hp: self.max_hp,
                current_hp: self.current_hp,
                gold: self.gold,
                deck,
                relics,
                potions,
            },
            potion_slots: self.potion_slots,
            content_hash: self.content_hash,
            is_favorite: self.is_favorite,
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
        })
    }
}

/// Encoded collection columns plus the hash derived from them.
struct EncodedContents {
    deck: String,
    relics: String,
    potions: String,
    hash: String,
}

fn encode_contents(character: &CharacterState) -> Result<EncodedContents, StoreError> {
    let encode_err = |e: CodecError| StoreError::ConstraintViolation(e.to_string());
    Ok(EncodedContents {
        deck: codec::encode_column(&character.deck).map_err(encode_err)?,
        relics: codec::encode_column(&character.relics).map_err(encode_err)?,
        potions: codec::encode_column(&character.potions).map_err(encode_err)?,
        hash: codec::content_hash(&character.deck, &character.relics, &character.potions),
    })
}

pub(super) fn fetch_loadout(conn: &Connection, id: LoadoutId) -> Result<Loadout, StoreError> {
    let sql = format!("SELECT {LOADOUT_COLUMNS} FROM loadouts WHERE id = ?1");
    conn.query_row(&sql, params![id.0], row_to_loadout_row)
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("loadout {id}")))?
        .decode()
}

impl ArenaStore {
    fn check_pool(&self, character: &CharacterState) -> Result<(), StoreError> {
        if let Some(pool) = self.card_pool() {
            character.validate_pool(pool)?;
        }
        Ok(())
    }

    /// Insert a new loadout with a fresh uuid.
    pub fn save_loadout(&self, loadout: &NewLoadout) -> Result<LoadoutId, StoreError> {
        loadout.validate()?;
        self.check_pool(&loadout.character)?;
        let contents = encode_contents(&loadout.character)?;
        let uuid = LoadoutUuid::new();
        let ts = to_millis(now());
        let c = &loadout.character;

        let id = self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO loadouts (uuid, name, character_class, ascension_level, max_hp, \
                 current_hp, gold, deck_json, relics_json, potions_json, created_at, updated_at, \
                 potion_slots, content_hash, is_favorite) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11, ?12, ?13, 0)",
                params![
                    uuid.to_string(),
                    loadout.name,
                    c.character_class.as_str(),
                    c.ascension_level,
                    c.max_hp,
                    c.current_hp,
                    c.gold,
                    contents.deck,
                    contents.relics,
                    contents.potions,
                    ts,
                    loadout.potion_slots,
                    contents.hash,
                ],
            )?;
            Ok(LoadoutId(tx.last_insert_rowid()))
        })?;

        info!(
            loadout_id = %id,
            uuid = %uuid,
            name = %loadout.name,
            class = %c.character_class,
            "loadout saved"
        );
        Ok(id)
    }

    /// Overwrite selected fields of a stored loadout.
    ///
    /// The character class can never change; an update that tries is a
    /// constraint violation and leaves the row as it was.
    pub fn update_loadout(&self, id: LoadoutId, update: &LoadoutUpdate) -> Result<(), StoreError> {
        if let Some(character) = &update.character {
            self.check_pool(character)?;
        }
        self.with_tx(|tx| {
            let current = fetch_loadout(tx, id)?;
            if update.is_empty() {
                return Ok(());
            }
            let next = update.apply_to(&current)?;
            let contents = encode_contents(&next.character)?;
            let c = &next.character;
            tx.execute(
                "UPDATE loadouts SET name = ?1, ascension_level = ?2, max_hp = ?3, \
                 current_hp = ?4, gold = ?5, deck_json = ?6, relics_json = ?7, \
                 potions_json = ?8, potion_slots = ?9, content_hash = ?10, updated_at = ?11 \
                 WHERE id = ?12",
                params![
                    next.name,
                    c.ascension_level,
                    c.max_hp,
                    c.current_hp,
                    c.gold,
                    contents.deck,
                    contents.relics,
                    contents.potions,
                    next.potion_slots,
                    contents.hash,
                    to_millis(now()),
                    id.0,
                ],
            )?;
            if contents.hash != current.content_hash {
                debug!(loadout_id = %id, from = %current.content_hash, to = %contents.hash, "loadout contents changed");
            }
            Ok(())
        })?;
        info!(loadout_id = %id, "loadout updated");
        Ok(())
    }

    pub fn rename_loadout(&self, id: LoadoutId, name: &str) -> Result<(), StoreError> {
        self.update_loadout(id, &LoadoutUpdate::rename(name))
    }

    /// Delete a loadout. Its run records are kept and detached; returns how
    /// many were detached.
    pub fn delete_loadout(&self, id: LoadoutId) -> Result<usize, StoreError> {
        let detached = self.with_tx(|tx| {
            let runs: i64 = tx.query_row(
                "SELECT COUNT(*) FROM arena_runs WHERE loadout_id = ?1",
                params![id.0],
                |row| row.get(0),
            )?;
            let deleted = tx.execute("DELETE FROM loadouts WHERE id = ?1", params![id.0])?;
            if deleted == 0 {
                return Err(StoreError::NotFound(format!("loadout {id}")));
            }
            Ok(runs as usize)
        })?;
        info!(loadout_id = %id, detached_runs = detached, "loadout deleted");
        Ok(detached)
    }

    /// All loadouts, favourites first, then newest first.
    ///
    /// Rows that fail to decode are skipped and logged.
    pub fn list_loadouts(&self) -> Result<Vec<Loadout>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {LOADOUT_COLUMNS} FROM loadouts \
                 ORDER BY is_favorite DESC, created_at DESC, id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], row_to_loadout_row)?
                .collect::<Result<Vec<_>, _>>()?;
            let mut loadouts = Vec::with_capacity(rows.len());
            for row in rows {
                match row.decode() {
                    Ok(loadout) => loadouts.push(loadout),
                    Err(e) => warn!(error = %e, "skipping undecodable loadout"),
                }
            }
            Ok(loadouts)
        })
    }

    pub fn get_loadout(&self, id: LoadoutId) -> Result<Loadout, StoreError> {
        self.with_conn(|conn| fetch_loadout(conn, id))
    }

    pub fn get_loadout_by_uuid(&self, uuid: LoadoutUuid) -> Result<Loadout, StoreError> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {LOADOUT_COLUMNS} FROM loadouts WHERE uuid = ?1");
            conn.query_row(&sql, params![uuid.to_string()], row_to_loadout_row)
                .optional()?
                .ok_or_else(|| StoreError::NotFound(format!("loadout {uuid}")))?
                .decode()
        })
    }

    /// Flip the favourite flag, returning the new value.
    pub fn toggle_favorite(&self, id: LoadoutId) -> Result<bool, StoreError> {
        let favorite = self.with_tx(|tx| {
            let changed = tx.execute(
                "UPDATE loadouts SET is_favorite = 1 - is_favorite WHERE id = ?1",
                params![id.0],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("loadout {id}")));
            }
            Ok(tx.query_row(
                "SELECT is_favorite FROM loadouts WHERE id = ?1",
                params![id.0],
                |row| row.get::<_, bool>(0),
            )?)
        })?;
        debug!(loadout_id = %id, favorite, "favourite toggled");
        Ok(favorite)
    }

    /// Whether the stored contents differ from those fingerprinted by `hash`.
    pub fn has_loadout_changed(&self, id: LoadoutId, hash: &str) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let stored: Option<String> = conn
                .query_row(
                    "SELECT content_hash FROM loadouts WHERE id = ?1",
                    params![id.0],
                    |row| row.get(0),
                )
                .optional()?;
            match stored {
                Some(stored) => Ok(stored != hash),
                None => Err(StoreError::NotFound(format!("loadout {id}"))),
            }
        })
    }
}
