//! Gameplay-relevant character contents shared by loadouts, run state, and
//! run records.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use thiserror::Error;

/// Character class identifier as the host game names it (`IRONCLAD`,
/// `THE_SILENT`, ...). Modded classes are allowed, so this is open-ended.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacterClass(pub String);

impl CharacterClass {
    pub const IRONCLAD: &'static str = "IRONCLAD";
    pub const SILENT: &'static str = "THE_SILENT";
    pub const DEFECT: &'static str = "DEFECT";
    pub const WATCHER: &'static str = "WATCHER";

    /// Build a class id, normalising to the host's upper-case form.
    pub fn new(name: &str) -> Self {
        CharacterClass(name.trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CharacterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One card in a deck. Order of entries in a deck is significant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CardEntry {
    pub id: String,
    #[serde(default)]
    pub upgrades: u32,
}

impl CardEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            upgrades: 0,
        }
    }

    pub fn upgraded(id: impl Into<String>, upgrades: u32) -> Self {
        Self {
            id: id.into(),
            upgrades,
        }
    }
}

/// Unordered collection of ids with multiplicity (relics, potions).
///
/// Counts are always at least one; an id with no copies is absent. Encoded
/// as an `{id: count}` map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, u32>", into = "BTreeMap<String, u32>")]
pub struct Multiset {
    counts: BTreeMap<String, u32>,
}

impl Multiset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one copy of `id`.
    pub fn insert(&mut self, id: impl Into<String>) {
        self.insert_n(id, 1);
    }

    /// Add `n` copies of `id`. Adding zero copies is a no-op; counts
    /// saturate at `u32::MAX`.
    pub fn insert_n(&mut self, id: impl Into<String>, n: u32) {
        if n == 0 {
            return;
        }
        let count = self.counts.entry(id.into()).or_insert(0);
        *count = count.saturating_add(n);
    }

    /// Remove one copy of `id`, returning whether one was present.
    pub fn remove_one(&mut self, id: &str) -> bool {
        match self.counts.get_mut(id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                self.counts.remove(id);
                true
            }
            None => false,
        }
    }

    pub fn count(&self, id: &str) -> u32 {
        self.counts.get(id).copied().unwrap_or(0)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.counts.contains_key(id)
    }

    /// Total number of items, counting multiplicity. Saturates.
    pub fn total(&self) -> u32 {
        self.counts
            .values()
            .fold(0u32, |total, n| total.saturating_add(*n))
    }

    /// Number of distinct ids.
    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Iterate `(id, count)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.counts.iter().map(|(id, n)| (id.as_str(), *n))
    }
}

impl<S: Into<String>> FromIterator<S> for Multiset {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Multiset::new();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

impl TryFrom<BTreeMap<String, u32>> for Multiset {
    type Error = String;

    fn try_from(counts: BTreeMap<String, u32>) -> Result<Self, Self::Error> {
        if let Some((id, _)) = counts.iter().find(|(_, n)| **n == 0) {
            return Err(format!("zero count for '{id}'"));
        }
        Ok(Multiset { counts })
    }
}

impl From<Multiset> for BTreeMap<String, u32> {
    fn from(set: Multiset) -> Self {
        set.counts
    }
}

/// Violations of loadout / run-state invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("deck must contain at least one card")]
    EmptyDeck,

    #[error("max HP must be positive")]
    ZeroMaxHp,

    #[error("current HP {current} exceeds max HP {max}")]
    HpExceedsMax { current: u32, max: u32 },

    #[error("{field} must not be blank")]
    Blank { field: &'static str },

    #[error("character class is fixed: {from} cannot become {to}")]
    ClassChanged {
        from: CharacterClass,
        to: CharacterClass,
    },

    #[error("card '{card}' is not available to {class}")]
    CardNotInPool { card: String, class: CharacterClass },
}

/// Which cards a class may hold. Supplied by the host game; the core only
/// asks the question.
pub trait CardPool {
    fn allows(&self, class: &CharacterClass, card_id: &str) -> bool;
}

/// A card pool built from explicit per-class lists plus cards any class may
/// hold (colorless, curses, statuses).
#[derive(Debug, Clone, Default)]
pub struct StaticCardPool {
    by_class: HashMap<CharacterClass, HashSet<String>>,
    universal: HashSet<String>,
}

impl StaticCardPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_class_cards<I, S>(mut self, class: CharacterClass, cards: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.by_class
            .entry(class)
            .or_default()
            .extend(cards.into_iter().map(Into::into));
        self
    }

    pub fn with_universal_cards<I, S>(mut self, cards: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.universal.extend(cards.into_iter().map(Into::into));
        self
    }
}

impl CardPool for StaticCardPool {
    fn allows(&self, class: &CharacterClass, card_id: &str) -> bool {
        self.universal.contains(card_id)
            || self
                .by_class
                .get(class)
                .is_some_and(|cards| cards.contains(card_id))
    }
}

/// Gameplay fields common to a loadout, a live run, and a fight snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterState {
    pub character_class: CharacterClass,
    pub ascension_level: u32,
    pub max_hp: u32,
    pub current_hp: u32,
    pub gold: u32,
    pub deck: Vec<CardEntry>,
    pub relics: Multiset,
    pub potions: Multiset,
}

impl CharacterState {
    /// Check structural invariants (HP bounds, non-empty deck).
    pub fn validate(&self) -> Result<(), InvariantViolation> {
        if self.character_class.0.trim().is_empty() {
            return Err(InvariantViolation::Blank {
                field: "character_class",
            });
        }
        if self.max_hp == 0 {
            return Err(InvariantViolation::ZeroMaxHp);
        }
        if self.current_hp > self.max_hp {
            return Err(InvariantViolation::HpExceedsMax {
                current: self.current_hp,
                max: self.max_hp,
            });
        }
        if self.deck.is_empty() {
            return Err(InvariantViolation::EmptyDeck);
        }
        Ok(())
    }

    /// Check every card against the class pool.
    pub fn validate_pool(&self, pool: &dyn CardPool) -> Result<(), InvariantViolation> {
        for card in &self.deck {
            if !pool.allows(&self.character_class, &card.id) {
                return Err(InvariantViolation::CardNotInPool {
                    card: card.id.clone(),
                    class: self.character_class.clone(),
                });
            }
        }
        Ok(())
    }
}
