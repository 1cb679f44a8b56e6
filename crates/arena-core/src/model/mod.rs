//! Domain model: character contents, run state, loadouts, and run records.

pub mod character;
pub mod loadout;
pub mod run_record;
pub mod run_state;

pub use character::{
    CardEntry, CardPool, CharacterClass, CharacterState, InvariantViolation, Multiset,
    StaticCardPool,
};
pub use loadout::{Loadout, LoadoutUpdate, NewLoadout, DEFAULT_POTION_SLOTS};
pub use run_record::{FightResult, NewRunRecord, Outcome, RunRecord, VictoryMetrics};
pub use run_state::{RunState, ShopState};
