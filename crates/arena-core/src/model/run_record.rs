//! Fight results and the immutable run records written from them.

use arena_common::{LoadoutId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::character::{CardEntry, CharacterClass, InvariantViolation, Multiset};
use super::loadout::Loadout;

/// How a practice fight ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Victory,
    Defeat,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Victory => "VICTORY",
            Outcome::Defeat => "DEFEAT",
        }
    }

    pub fn is_victory(&self) -> bool {
        matches!(self, Outcome::Victory)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "VICTORY" | "WIN" => Ok(Outcome::Victory),
            "DEFEAT" | "LOSS" => Ok(Outcome::Defeat),
            other => Err(format!("unknown outcome '{other}'")),
        }
    }
}

/// Combat result reported by the host when a practice fight concludes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FightResult {
    pub encounter_id: String,
    pub encounter_name: String,
    pub outcome: Outcome,
    pub turns_taken: u32,
    pub damage_dealt: u32,
    pub damage_taken: u32,
    pub starting_hp: u32,
    pub ending_hp: u32,
    #[serde(default)]
    pub potions_used: Vec<String>,
    #[serde(default)]
    pub floor_num: u32,
}

/// A run record ready to be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRunRecord {
    pub loadout_id: Option<LoadoutId>,
    pub encounter_id: String,
    pub encounter_name: String,
    pub character_class: CharacterClass,
    pub ascension_level: u32,
    pub deck: Vec<CardEntry>,
    pub relics: Multiset,
    pub potions: Multiset,
    pub content_hash: String,
    pub outcome: Outcome,
    pub turns_taken: u32,
    pub damage_dealt: u32,
    pub damage_taken: u32,
    pub starting_hp: u32,
    pub ending_hp: u32,
    pub potions_used: Vec<String>,
    pub floor_num: u32,
    pub fought_at: DateTime<Utc>,
}

impl NewRunRecord {
    /// Build a record snapshotting the loadout's contents at fight time.
    pub fn from_fight(loadout: &Loadout, fight: FightResult, fought_at: DateTime<Utc>) -> Self {
        let character = &loadout.character;
        Self {
            loadout_id: Some(loadout.id),
            encounter_id: fight.encounter_id,
            encounter_name: fight.encounter_name,
            character_class: character.character_class.clone(),
            ascension_level: character.ascension_level,
            deck: character.deck.clone(),
            relics: character.relics.clone(),
            potions: character.potions.clone(),
            content_hash: loadout.content_hash.clone(),
            outcome: fight.outcome,
            turns_taken: fight.turns_taken,
            damage_dealt: fight.damage_dealt,
            damage_taken: fight.damage_taken,
            starting_hp: fight.starting_hp,
            ending_hp: fight.ending_hp,
            potions_used: fight.potions_used,
            floor_num: fight.floor_num,
            fought_at,
        }
    }

    pub fn validate(&self) -> Result<(), InvariantViolation> {
        if self.encounter_id.trim().is_empty() {
            return Err(InvariantViolation::Blank {
                field: "encounter_id",
            });
        }
        if self.deck.is_empty() {
            return Err(InvariantViolation::EmptyDeck);
        }
        Ok(())
    }
}

/// A stored run record. Never updated after insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    /// `None` once the loadout has been deleted.
    pub loadout_id: Option<LoadoutId>,
    pub encounter_id: String,
    pub encounter_name: String,
    pub character_class: CharacterClass,
    pub ascension_level: u32,
    pub deck: Vec<CardEntry>,
    pub relics: Multiset,
    pub potions: Multiset,
    pub content_hash: Option<String>,
    pub outcome: Outcome,
    pub turns_taken: u32,
    pub damage_dealt: u32,
    pub damage_taken: u32,
    pub starting_hp: u32,
    pub ending_hp: u32,
    pub potions_used: Vec<String>,
    pub floor_num: u32,
    pub fought_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn metrics(&self) -> VictoryMetrics {
        VictoryMetrics {
            run_id: self.id,
            turns_taken: self.turns_taken,
            damage_taken: self.damage_taken,
            potions_used: self.potions_used.len() as u32,
            damage_dealt: self.damage_dealt,
            ending_hp: self.ending_hp,
            fought_at: self.fought_at,
        }
    }
}

/// The numbers a victory is ranked on. Fewer is better for all three of
/// turns, damage taken and potions used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VictoryMetrics {
    pub run_id: RunId,
    pub turns_taken: u32,
    pub damage_taken: u32,
    pub potions_used: u32,
    pub damage_dealt: u32,
    pub ending_hp: u32,
    pub fought_at: DateTime<Utc>,
}

impl VictoryMetrics {
    /// True when `other` is no worse on every axis and strictly better on one.
    pub fn dominated_by(&self, other: &VictoryMetrics) -> bool {
        let no_worse = other.turns_taken <= self.turns_taken
            && other.damage_taken <= self.damage_taken
            && other.potions_used <= self.potions_used;
        let strictly_better = other.turns_taken < self.turns_taken
            || other.damage_taken < self.damage_taken
            || other.potions_used < self.potions_used;
        no_worse && strictly_better
    }
}
