//! Saved loadouts.

use arena_common::{LoadoutId, LoadoutUuid};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::character::{CharacterState, InvariantViolation};
use super::run_state::RunState;

/// Potion slots a loadout gets when none were captured.
pub const DEFAULT_POTION_SLOTS: u32 = 3;

/// A loadout to be inserted. The store assigns id, uuid, hash and timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLoadout {
    pub name: String,
    pub character: CharacterState,
    pub potion_slots: u32,
}

impl NewLoadout {
    pub fn new(name: impl Into<String>, character: CharacterState) -> Self {
        Self {
            name: name.into(),
            character,
            potion_slots: DEFAULT_POTION_SLOTS,
        }
    }

    /// Capture the gameplay portion of a live run.
    pub fn from_run_state(name: impl Into<String>, state: &RunState) -> Self {
        Self {
            name: name.into(),
            character: state.character.clone(),
            potion_slots: state.potion_slots,
        }
    }

    pub fn validate(&self) -> Result<(), InvariantViolation> {
        if self.name.trim().is_empty() {
            return Err(InvariantViolation::Blank { field: "name" });
        }
        self.character.validate()
    }
}

/// A stored loadout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loadout {
    pub id: LoadoutId,
    pub uuid: LoadoutUuid,
    pub name: String,
    pub character: CharacterState,
    pub potion_slots: u32,
    /// Fingerprint of deck, relics and potions.
    pub content_hash: String,
    pub is_favorite: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial overwrite of a stored loadout ("save & fight").
///
/// `None` leaves the field as stored. The character class inside a
/// replacement `character` must match the stored class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadoutUpdate {
    pub name: Option<String>,
    pub character: Option<CharacterState>,
    pub potion_slots: Option<u32>,
}

impl LoadoutUpdate {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.character.is_none() && self.potion_slots.is_none()
    }

    /// Apply this update to `current`, checking every loadout invariant on
    /// the result. `current` is left untouched on error.
    pub fn apply_to(&self, current: &Loadout) -> Result<Loadout, InvariantViolation> {
        let mut next = current.clone();
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(InvariantViolation::Blank { field: "name" });
            }
            next.name = name.clone();
        }
        if let Some(character) = &self.character {
            if character.character_class != current.character.character_class {
                return Err(InvariantViolation::ClassChanged {
                    from: current.character.character_class.clone(),
                    to: character.character_class.clone(),
                });
            }
            character.validate()?;
            next.character = character.clone();
        }
        if let Some(slots) = self.potion_slots {
            next.potion_slots = slots;
        }
        Ok(next)
    }
}
