//! Property-based tests for Pareto-optimal victory selection.

use arena_common::RunId;
use arena_core::model::VictoryMetrics;
use arena_core::stats::{pareto_frontier, win_rate};
use chrono::{TimeZone, Utc};
use proptest::prelude::*;

fn victories_strategy() -> impl Strategy<Value = Vec<VictoryMetrics>> {
    // Small ranges so ties and dominance both show up often.
    prop::collection::vec((1u32..8, 0u32..10, 0u32..3), 0..30).prop_map(|triples| {
        triples
            .into_iter()
            .enumerate()
            .map(|(i, (turns, damage, potions))| VictoryMetrics {
                run_id: RunId(i as i64 + 1),
                turns_taken: turns,
                damage_taken: damage,
                potions_used: potions,
                damage_dealt: 100,
                ending_hp: 80u32.saturating_sub(damage),
                fought_at: Utc.timestamp_opt(1_750_000_000 + i as i64, 0).unwrap(),
            })
            .collect()
    })
}

fn key(v: &VictoryMetrics) -> (u32, u32, u32) {
    (v.turns_taken, v.damage_taken, v.potions_used)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// No frontier member dominates another.
    #[test]
    fn frontier_is_mutually_non_dominated(victories in victories_strategy()) {
        let frontier = pareto_frontier(&victories);
        for a in &frontier {
            for b in &frontier {
                prop_assert!(!a.dominated_by(b), "{:?} dominated by {:?}", key(a), key(b));
            }
        }
    }

    /// Every excluded victory is dominated by something on the frontier.
    #[test]
    fn excluded_victories_are_dominated(victories in victories_strategy()) {
        let frontier = pareto_frontier(&victories);
        for v in &victories {
            if frontier.iter().any(|f| f.run_id == v.run_id) {
                continue;
            }
            prop_assert!(
                frontier.iter().any(|f| v.dominated_by(f)),
                "{:?} excluded but not dominated by the frontier", key(v)
            );
        }
    }

    /// The frontier is a non-empty, order-preserving subsequence of the input.
    #[test]
    fn frontier_preserves_input_order(victories in victories_strategy()) {
        let frontier = pareto_frontier(&victories);
        prop_assert_eq!(frontier.is_empty(), victories.is_empty());
        let ids: Vec<i64> = frontier.iter().map(|v| v.run_id.0).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        prop_assert_eq!(ids, sorted);
    }

    /// Duplicates of a frontier victory are all kept.
    #[test]
    fn duplicates_share_fate(victories in victories_strategy()) {
        let frontier = pareto_frontier(&victories);
        for v in &victories {
            let on_frontier = frontier.iter().any(|f| f.run_id == v.run_id);
            for w in &victories {
                if key(v) == key(w) {
                    let w_on = frontier.iter().any(|f| f.run_id == w.run_id);
                    prop_assert_eq!(on_frontier, w_on);
                }
            }
        }
    }

    #[test]
    fn win_rate_is_a_fraction(wins in 0u32..500, extra in 0u32..500) {
        let rate = win_rate(wins, wins + extra);
        prop_assert!((0.0..=1.0).contains(&rate));
    }
}

#[test]
fn worked_example_keeps_only_the_fastest_cheapest() {
    let victories = [(5, 8, 1), (4, 8, 1), (4, 8, 2)]
        .into_iter()
        .enumerate()
        .map(|(i, (turns, damage, potions))| VictoryMetrics {
            run_id: RunId(i as i64 + 1),
            turns_taken: turns,
            damage_taken: damage,
            potions_used: potions,
            damage_dealt: 0,
            ending_hp: 0,
            fought_at: Utc::now(),
        })
        .collect::<Vec<_>>();
    let frontier = pareto_frontier(&victories);
    assert_eq!(frontier.len(), 1);
    assert_eq!(key(&frontier[0]), (4, 8, 1));
    assert_eq!(frontier[0].run_id, RunId(2));
}
