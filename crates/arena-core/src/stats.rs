//! Per-encounter statistics and Pareto-optimal victories.

use arena_common::LoadoutId;
use serde::Serialize;
use tracing::debug;

use crate::model::VictoryMetrics;
use crate::store::{ArenaStore, StoreError};

/// Results of one loadout against one encounter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncounterStats {
    pub loadout_id: LoadoutId,
    pub encounter_id: String,
    pub encounter_name: String,
    pub total_runs: u32,
    pub wins: u32,
    pub losses: u32,
    pub win_rate: f64,
    /// Victories not dominated by any other victory in the group.
    pub pareto_victories: Vec<VictoryMetrics>,
    /// Victories counted in `wins` but left out of the frontier because
    /// their stored row could not be decoded.
    pub skipped_victories: u32,
}

/// `wins / total`, or 0.0 with no runs.
pub fn win_rate(wins: u32, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        f64::from(wins) / f64::from(total)
    }
}

/// Victories that no other victory dominates.
///
/// Compares every pair, so the whole group must be supplied. Identical
/// victories do not dominate each other and are all kept. Input order is
/// preserved.
pub fn pareto_frontier(victories: &[VictoryMetrics]) -> Vec<VictoryMetrics> {
    victories
        .iter()
        .filter(|candidate| !victories.iter().any(|other| candidate.dominated_by(other)))
        .cloned()
        .collect()
}

/// Builds [`EncounterStats`] from the store.
#[derive(Debug, Clone)]
pub struct StatsAggregator {
    store: ArenaStore,
}

impl StatsAggregator {
    pub fn new(store: ArenaStore) -> Self {
        Self { store }
    }

    /// Stats for every (loadout, encounter) group, or only `loadout`'s.
    ///
    /// Runs detached from a deleted loadout are not counted.
    pub fn stats_for(&self, loadout: Option<LoadoutId>) -> Result<Vec<EncounterStats>, StoreError> {
        let groups = self.store.query_stats(loadout)?;
        let mut stats = Vec::with_capacity(groups.len());
        for group in groups {
            let victories = self
                .store
                .victories_for(group.loadout_id, &group.encounter_id)?;
            let pareto_victories = pareto_frontier(&victories.metrics);
            debug!(
                loadout_id = %group.loadout_id,
                encounter = %group.encounter_id,
                victories = victories.metrics.len(),
                skipped = victories.skipped,
                frontier = pareto_victories.len(),
                "computed encounter stats"
            );
            stats.push(EncounterStats {
                win_rate: win_rate(group.wins, group.total_runs),
                loadout_id: group.loadout_id,
                encounter_id: group.encounter_id,
                encounter_name: group.encounter_name,
                total_runs: group.total_runs,
                wins: group.wins,
                losses: group.losses,
                pareto_victories,
                skipped_victories: victories.skipped,
            });
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::character::tests::ironclad_starter;
    use crate::model::run_record::tests::fight;
    use crate::model::{NewLoadout, NewRunRecord, Outcome};
    use crate::store::tests::test_store;
    use arena_common::RunId;
    use chrono::Utc;
    use rusqlite::params;

    fn v(id: i64, turns: u32, damage: u32, potions: u32) -> VictoryMetrics {
        VictoryMetrics {
            run_id: RunId(id),
            turns_taken: turns,
            damage_taken: damage,
            potions_used: potions,
            damage_dealt: 0,
            ending_hp: 0,
            fought_at: Utc::now(),
        }
    }

    fn triples(frontier: &[VictoryMetrics]) -> Vec<(u32, u32, u32)> {
        frontier
            .iter()
            .map(|m| (m.turns_taken, m.damage_taken, m.potions_used))
            .collect()
    }

    #[test]
    fn worked_example() {
        let frontier = pareto_frontier(&[v(1, 5, 8, 1), v(2, 4, 8, 1), v(3, 4, 8, 2)]);
        assert_eq!(triples(&frontier), vec![(4, 8, 1)]);
    }

    #[test]
    fn identical_victories_both_kept() {
        let frontier = pareto_frontier(&[v(1, 4, 8, 1), v(2, 4, 8, 1), v(3, 9, 9, 9)]);
        assert_eq!(frontier.len(), 2);
        assert_eq!(frontier[0].run_id, RunId(1));
        assert_eq!(frontier[1].run_id, RunId(2));
    }

    #[test]
    fn tradeoffs_all_kept() {
        let frontier = pareto_frontier(&[v(1, 3, 20, 0), v(2, 6, 2, 0), v(3, 5, 5, 2)]);
        assert_eq!(frontier.len(), 3);
    }

    #[test]
    fn empty_group() {
        assert!(pareto_frontier(&[]).is_empty());
        assert_eq!(win_rate(0, 0), 0.0);
    }

    #[test]
    fn win_rate_three_of_five() {
        assert!((win_rate(3, 5) - 0.6).abs() < 1e-12);
    }

    #[test]
    fn aggregates_from_store() {
        let store = test_store();
        let id = store
            .save_loadout(&NewLoadout::new("L", ironclad_starter()))
            .unwrap();
        let loadout = store.get_loadout(id).unwrap();
        let results = [
            fight("Hexaghost", Outcome::Victory, 5, 8),
            fight("Hexaghost", Outcome::Victory, 4, 8),
            fight("Hexaghost", Outcome::Victory, 4, 8),
            fight("Hexaghost", Outcome::Defeat, 7, 80),
            fight("Hexaghost", Outcome::Defeat, 9, 80),
        ];
        for result in results {
            store
                .record_run(&NewRunRecord::from_fight(&loadout, result, Utc::now()))
                .unwrap();
        }

        let stats = StatsAggregator::new(store).stats_for(Some(id)).unwrap();
        assert_eq!(stats.len(), 1);
        let hex = &stats[0];
        assert_eq!(hex.total_runs, 5);
        assert_eq!(hex.wins, 3);
        assert_eq!(hex.losses, 2);
        assert!((hex.win_rate - 0.6).abs() < 1e-12);
        assert_eq!(triples(&hex.pareto_victories), vec![(4, 8, 0), (4, 8, 0)]);
        assert_eq!(hex.skipped_victories, 0);
    }

    #[test]
    fn undecodable_victory_is_counted_as_skipped() {
        let store = test_store();
        let id = store
            .save_loadout(&NewLoadout::new("L", ironclad_starter()))
            .unwrap();
        let loadout = store.get_loadout(id).unwrap();
        let mut run_ids = Vec::new();
        for turns in [5, 4, 3] {
            let run = NewRunRecord::from_fight(
                &loadout,
                fight("Slime_Boss", Outcome::Victory, turns, 8),
                Utc::now(),
            );
            run_ids.push(store.record_run(&run).unwrap());
        }
        let best = run_ids[2];
        store
            .with_conn(|conn| {
                conn.execute(
                    "UPDATE arena_runs SET potions_used_json = 'not json' WHERE id = ?1",
                    params![best.0],
                )?;
                Ok(())
            })
            .unwrap();

        let stats = StatsAggregator::new(store).stats_for(Some(id)).unwrap();
        let slime = &stats[0];
        assert_eq!(slime.wins, 3);
        assert_eq!(slime.skipped_victories, 1);
        assert_eq!(triples(&slime.pareto_victories), vec![(4, 8, 0)]);
    }
}
