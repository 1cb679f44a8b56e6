//! Fixtures shared by the integration suites.

#![allow(dead_code)]

use arena_core::model::{
    CardEntry, CharacterClass, CharacterState, FightResult, Outcome, RunState,
};

/// Silent starter deck at ascension 5.
pub fn silent_starter() -> CharacterState {
    let mut deck: Vec<CardEntry> = (0..5).map(|_| CardEntry::new("Strike_G")).collect();
    deck.extend((0..5).map(|_| CardEntry::new("Defend_G")));
    deck.push(CardEntry::new("Neutralize"));
    deck.push(CardEntry::upgraded("Survivor", 1));
    CharacterState {
        character_class: CharacterClass::new(CharacterClass::SILENT),
        ascension_level: 5,
        max_hp: 70,
        current_hp: 64,
        gold: 112,
        deck,
        relics: ["Ring of the Snake"].into_iter().collect(),
        potions: ["Poison Potion"].into_iter().collect(),
    }
}

pub fn run_state() -> RunState {
    let mut state = RunState::new(silent_starter());
    state.floor_num = 16;
    state.act_num = 1;
    state
}

pub fn fight(encounter: &str, outcome: Outcome, turns: u32, damage_taken: u32) -> FightResult {
    FightResult {
        encounter_id: encounter.to_string(),
        encounter_name: encounter.replace('_', " "),
        outcome,
        turns_taken: turns,
        damage_dealt: 150,
        damage_taken,
        starting_hp: 64,
        ending_hp: 64u32.saturating_sub(damage_taken),
        potions_used: Vec::new(),
        floor_num: 16,
    }
}
