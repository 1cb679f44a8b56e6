//! Snapshot codec.
//!
//! Run states are written inside a versioned envelope:
//!
//! ```json
//! {"format_version": 2, "loadout_id": 7, "state": { ... }}
//! ```
//!
//! `loadout_id` is present only for session snapshots. Format 1 is the legacy
//! flat shape (deck, relics and potions as plain id lists, no resume fields)
//! and is upgraded on decode. Anything newer than [`SNAPSHOT_FORMAT_VERSION`]
//! is refused with [`CodecError::UnsupportedFormat`] so a newer writer's data
//! is never misread.
//!
//! Collection columns in the store use a smaller tag, `{"v": 1, "data": ...}`.

use arena_common::schema::{
    is_supported_snapshot, COLUMN_FORMAT_VERSION, SNAPSHOT_FORMAT_VERSION,
};
use arena_common::LoadoutId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::model::{CardEntry, CharacterClass, CharacterState, Multiset, RunState};

/// Number of hex characters kept from the SHA-256 digest in a content hash.
pub const CONTENT_HASH_LEN: usize = 16;

/// Errors from encoding or decoding snapshots and columns.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed payload: {0}")]
    Decode(String),

    #[error("unsupported format version {found} (newest supported: {supported})")]
    UnsupportedFormat { found: u32, supported: u32 },
}

impl From<CodecError> for arena_common::Error {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Decode(msg) => arena_common::Error::Decode(msg),
            CodecError::UnsupportedFormat { found, supported } => {
                arena_common::Error::UnsupportedFormat { found, supported }
            }
        }
    }
}

fn malformed(e: serde_json::Error) -> CodecError {
    CodecError::Decode(e.to_string())
}

/// A live run state paired with the loadout being practised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub loadout_id: LoadoutId,
    pub state: RunState,
}

#[derive(Serialize)]
struct EnvelopeOut<'a> {
    format_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    loadout_id: Option<LoadoutId>,
    state: &'a RunState,
}

#[derive(Deserialize)]
struct EnvelopeIn {
    format_version: u32,
    #[serde(default)]
    loadout_id: Option<LoadoutId>,
    state: Value,
}

/// Format 1 state: flat gameplay fields, collections as id lists.
#[derive(Deserialize)]
struct LegacyState {
    character_class: String,
    ascension_level: u32,
    max_hp: u32,
    current_hp: u32,
    gold: u32,
    deck: Vec<String>,
    #[serde(default)]
    relics: Vec<String>,
    #[serde(default)]
    potions: Vec<String>,
    #[serde(default)]
    floor_num: u32,
}

impl LegacyState {
    fn upgrade(self) -> RunState {
        let character = CharacterState {
            character_class: CharacterClass::new(&self.character_class),
            ascension_level: self.ascension_level,
            max_hp: self.max_hp,
            current_hp: self.current_hp,
            gold: self.gold,
            deck: self.deck.iter().map(String::as_str).map(legacy_card).collect(),
            relics: self.relics.into_iter().collect(),
            potions: self.potions.into_iter().collect(),
        };
        RunState {
            floor_num: self.floor_num,
            ..RunState::new(character)
        }
    }
}

/// Legacy decks wrote upgrades as a `+N` suffix (`Bash+1`).
fn legacy_card(raw: &str) -> CardEntry {
    if let Some((id, level)) = raw.rsplit_once('+') {
        if let Ok(upgrades) = level.parse::<u32>() {
            return CardEntry::upgraded(id, upgrades);
        }
    }
    CardEntry::new(raw)
}

fn encode_envelope(state: &RunState, loadout_id: Option<LoadoutId>) -> Result<String, CodecError> {
    let envelope = EnvelopeOut {
        format_version: SNAPSHOT_FORMAT_VERSION,
        loadout_id,
        state,
    };
    serde_json::to_string(&envelope).map_err(malformed)
}

fn decode_envelope(input: &str) -> Result<(Option<LoadoutId>, RunState), CodecError> {
    let envelope: EnvelopeIn = serde_json::from_str(input).map_err(malformed)?;
    if !is_supported_snapshot(envelope.format_version) {
        return Err(CodecError::UnsupportedFormat {
            found: envelope.format_version,
            supported: SNAPSHOT_FORMAT_VERSION,
        });
    }
    let state = match envelope.format_version {
        1 => serde_json::from_value::<LegacyState>(envelope.state)
            .map_err(malformed)?
            .upgrade(),
        _ => serde_json::from_value::<RunState>(envelope.state).map_err(malformed)?,
    };
    state
        .validate()
        .map_err(|e| CodecError::Decode(e.to_string()))?;
    Ok((envelope.loadout_id, state))
}

/// Encode a run state in the current envelope format.
pub fn encode(state: &RunState) -> Result<String, CodecError> {
    encode_envelope(state, None)
}

/// Decode a run state, upgrading older formats.
pub fn decode(input: &str) -> Result<RunState, CodecError> {
    decode_envelope(input).map(|(_, state)| state)
}

/// Encode a session snapshot (run state plus practised loadout).
pub fn encode_snapshot(snapshot: &SessionSnapshot) -> Result<String, CodecError> {
    encode_envelope(&snapshot.state, Some(snapshot.loadout_id))
}

/// Decode a session snapshot. A missing `loadout_id` is malformed.
pub fn decode_snapshot(input: &str) -> Result<SessionSnapshot, CodecError> {
    let (loadout_id, state) = decode_envelope(input)?;
    let loadout_id =
        loadout_id.ok_or_else(|| CodecError::Decode("snapshot has no loadout_id".to_string()))?;
    Ok(SessionSnapshot { loadout_id, state })
}

#[derive(Serialize)]
struct ColumnOut<'a, T> {
    v: u32,
    data: &'a T,
}

#[derive(Deserialize)]
struct ColumnIn {
    v: u32,
    data: Value,
}

/// Encode a collection column with its format tag.
pub fn encode_column<T: Serialize>(data: &T) -> Result<String, CodecError> {
    serde_json::to_string(&ColumnOut {
        v: COLUMN_FORMAT_VERSION,
        data,
    })
    .map_err(malformed)
}

/// Decode a tagged collection column.
pub fn decode_column<T: DeserializeOwned>(input: &str) -> Result<T, CodecError> {
    let column: ColumnIn = serde_json::from_str(input).map_err(malformed)?;
    if column.v != COLUMN_FORMAT_VERSION {
        return Err(CodecError::UnsupportedFormat {
            found: column.v,
            supported: COLUMN_FORMAT_VERSION,
        });
    }
    serde_json::from_value(column.data).map_err(malformed)
}

/// Fingerprint of a loadout's gameplay contents.
///
/// Changes whenever the deck (order and upgrades included), relics or
/// potions change. HP, gold and name do not contribute.
pub fn content_hash(deck: &[CardEntry], relics: &Multiset, potions: &Multiset) -> String {
    let mut hasher = Sha256::new();
    for part in [
        serde_json::to_string(deck),
        serde_json::to_string(relics),
        serde_json::to_string(potions),
    ] {
        // Vec, BTreeMap<String, u32>: serialization cannot fail.
        hasher.update(part.unwrap_or_default().as_bytes());
        hasher.update(b"|");
    }
    let mut hex = hex::encode(hasher.finalize());
    hex.truncate(CONTENT_HASH_LEN);
    hex
}

/// SHA-256 hex digest of raw bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::character::tests::ironclad_starter;
    use crate::model::ShopState;

    fn midrun_state() -> RunState {
        let mut character = ironclad_starter();
        character.deck.push(CardEntry::upgraded("Inflame", 1));
        character.potions.insert_n("Fire Potion", 2);
        character.current_hp = 54;
        let mut state = RunState::new(character);
        state.floor_num = 22;
        state.act_num = 2;
        state.relic_counters.insert("Pen Nib".to_string(), 7);
        state.shop = Some(ShopState {
            cards: vec!["Shrug It Off".to_string()],
            relics: vec![],
            potions: vec!["Block Potion".to_string()],
            purge_cost: 100,
        });
        state.extras.insert("seed".to_string(), "4VM6JKC3".to_string());
        state
    }

    #[test]
    fn roundtrip_current_format() {
        let state = midrun_state();
        let encoded = encode(&state).unwrap();
        assert!(encoded.contains("\"format_version\":2"));
        assert_eq!(decode(&encoded).unwrap(), state);
    }

    #[test]
    fn multisets_encode_as_count_maps() {
        let encoded = encode(&midrun_state()).unwrap();
        let value: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["state"]["character"]["potions"]["Fire Potion"], 2);
    }

    #[test]
    fn newer_format_is_refused() {
        let input = r#"{"format_version": 3, "state": {}}"#;
        match decode(input) {
            Err(CodecError::UnsupportedFormat { found, supported }) => {
                assert_eq!(found, 3);
                assert_eq!(supported, SNAPSHOT_FORMAT_VERSION);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(decode("not json"), Err(CodecError::Decode(_))));
        assert!(matches!(
            decode(r#"{"format_version": 2, "state": {"floor_num": 1}}"#),
            Err(CodecError::Decode(_))
        ));
    }

    #[test]
    fn zero_count_multiset_rejected() {
        let state = midrun_state();
        let mut value: Value = serde_json::from_str(&encode(&state).unwrap()).unwrap();
        value["state"]["character"]["relics"]["Burning Blood"] = Value::from(0);
        assert!(matches!(
            decode(&value.to_string()),
            Err(CodecError::Decode(_))
        ));
    }

    #[test]
    fn legacy_format_is_upgraded() {
        let input = r#"{
            "format_version": 1,
            "state": {
                "character_class": "ironclad",
                "ascension_level": 5,
                "max_hp": 75,
                "current_hp": 60,
                "gold": 120,
                "deck": ["Strike_R", "Bash+1", "Defend_R"],
                "relics": ["Burning Blood", "Vajra"],
                "potions": ["Fire Potion", "Fire Potion"],
                "floor_num": 16
            }
        }"#;
        let state = decode(input).unwrap();
        assert_eq!(state.character.character_class.as_str(), "IRONCLAD");
        assert_eq!(state.character.deck[1], CardEntry::upgraded("Bash", 1));
        assert_eq!(state.character.potions.count("Fire Potion"), 2);
        assert_eq!(state.floor_num, 16);
        assert_eq!(state.potion_slots, crate::model::DEFAULT_POTION_SLOTS);
        assert!(state.shop.is_none());
    }

    #[test]
    fn invalid_state_rejected_on_decode() {
        let mut state = midrun_state();
        state.character.current_hp = state.character.max_hp + 5;
        let encoded = encode(&state).unwrap();
        assert!(matches!(decode(&encoded), Err(CodecError::Decode(_))));
    }

    #[test]
    fn snapshot_carries_loadout_id() {
        let snapshot = SessionSnapshot {
            loadout_id: LoadoutId(12),
            state: midrun_state(),
        };
        let encoded = encode_snapshot(&snapshot).unwrap();
        assert_eq!(decode_snapshot(&encoded).unwrap(), snapshot);

        let bare = encode(&snapshot.state).unwrap();
        assert!(matches!(decode_snapshot(&bare), Err(CodecError::Decode(_))));
    }

    #[test]
    fn column_tag_checked() {
        let deck = vec![CardEntry::new("Bash")];
        let encoded = encode_column(&deck).unwrap();
        assert_eq!(encoded, r#"{"v":1,"data":[{"id":"Bash","upgrades":0}]}"#);
        assert_eq!(decode_column::<Vec<CardEntry>>(&encoded).unwrap(), deck);

        let future = r#"{"v":9,"data":[]}"#;
        assert!(matches!(
            decode_column::<Vec<CardEntry>>(future),
            Err(CodecError::UnsupportedFormat { found: 9, .. })
        ));
    }

    #[test]
    fn content_hash_tracks_contents_only() {
        let base = ironclad_starter();
        let hash = content_hash(&base.deck, &base.relics, &base.potions);
        assert_eq!(hash.len(), CONTENT_HASH_LEN);

        let mut richer = base.clone();
        richer.gold += 500;
        richer.current_hp -= 10;
        assert_eq!(
            content_hash(&richer.deck, &richer.relics, &richer.potions),
            hash
        );

        richer.deck[9] = CardEntry::upgraded("Bash", 1);
        assert_ne!(
            content_hash(&richer.deck, &richer.relics, &richer.potions),
            hash
        );
    }

    #[test]
    fn sha256_hex_known_value() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
