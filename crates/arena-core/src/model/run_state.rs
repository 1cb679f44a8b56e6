//! Live run state as captured from the host game before a practice fight.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::character::{CharacterState, InvariantViolation};
use super::loadout::DEFAULT_POTION_SLOTS;

/// Shop contents, kept only so a resumed run reopens the same shop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopState {
    pub cards: Vec<String>,
    pub relics: Vec<String>,
    pub potions: Vec<String>,
    pub purge_cost: u32,
}

/// Everything needed to resume the player's run after practice.
///
/// `extras` carries host-specific values the core never interprets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    pub character: CharacterState,
    pub floor_num: u32,
    pub act_num: u32,
    pub potion_slots: u32,
    #[serde(default)]
    pub relic_counters: BTreeMap<String, i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shop: Option<ShopState>,
    #[serde(default)]
    pub extras: BTreeMap<String, String>,
}

impl RunState {
    /// A run state at floor 0 with no resume data.
    pub fn new(character: CharacterState) -> Self {
        Self {
            character,
            floor_num: 0,
            act_num: 1,
            potion_slots: DEFAULT_POTION_SLOTS,
            relic_counters: BTreeMap::new(),
            shop: None,
            extras: BTreeMap::new(),
        }
    }

    pub fn validate(&self) -> Result<(), InvariantViolation> {
        self.character.validate()
    }
}
