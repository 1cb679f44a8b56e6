//! Lazily paged run history.

use std::collections::VecDeque;

use arena_common::LoadoutId;
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use tracing::{debug, warn};

use super::runs::{row_to_run_row, RUN_COLUMNS};
use super::{ArenaStore, StoreError};
use crate::model::{CharacterClass, Outcome, RunRecord};

/// Restricts which runs [`ArenaStore::query_history`] yields.
///
/// Filters combine with AND. `limit` caps the total number of records; with
/// no limit the iterator walks the whole history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    pub loadout: Option<LoadoutId>,
    pub encounter_id: Option<String>,
    pub character_class: Option<CharacterClass>,
    pub outcome: Option<Outcome>,
    pub limit: Option<usize>,
}

impl HistoryFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn loadout(mut self, id: LoadoutId) -> Self {
        self.loadout = Some(id);
        self
    }

    pub fn encounter(mut self, encounter_id: impl Into<String>) -> Self {
        self.encounter_id = Some(encounter_id.into());
        self
    }

    pub fn character_class(mut self, class: CharacterClass) -> Self {
        self.character_class = Some(class);
        self
    }

    pub fn outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn where_clause(&self, cursor: Option<(i64, i64)>) -> (String, Vec<Value>) {
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        if let Some(id) = self.loadout {
            clauses.push("loadout_id = ?");
            values.push(Value::Integer(id.0));
        }
        if let Some(encounter) = &self.encounter_id {
            clauses.push("encounter_id = ?");
            values.push(Value::Text(encounter.clone()));
        }
        if let Some(class) = &self.character_class {
            clauses.push("character_class = ?");
            values.push(Value::Text(class.0.clone()));
        }
        if let Some(outcome) = self.outcome {
            clauses.push("outcome = ?");
            values.push(Value::Text(outcome.as_str().to_string()));
        }
        if let Some((fought_at, id)) = cursor {
            clauses.push("(fought_at < ? OR (fought_at = ? AND id < ?))");
            values.push(Value::Integer(fought_at));
            values.push(Value::Integer(fought_at));
            values.push(Value::Integer(id));
        }
        if clauses.is_empty() {
            (String::new(), values)
        } else {
            (format!("WHERE {}", clauses.join(" AND ")), values)
        }
    }
}

/// Iterator over run records, newest first (`fought_at` then `id`,
/// descending).
///
/// Pages are fetched on demand with a keyset cursor, so records written
/// while iterating never shift the pages already read. Undecodable rows are
/// skipped and logged; a database error is yielded once and ends iteration.
pub struct HistoryIter {
    store: ArenaStore,
    filter: HistoryFilter,
    page_size: usize,
    cursor: Option<(i64, i64)>,
    buffer: VecDeque<RunRecord>,
    yielded: usize,
    skipped: usize,
    exhausted: bool,
}

impl HistoryIter {
    /// Rows skipped so far because they could not be decoded.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn remaining(&self) -> Option<usize> {
        self.filter.limit.map(|limit| limit.saturating_sub(self.yielded))
    }

    fn fetch_page(&mut self) -> Result<(), StoreError> {
        let page = match self.remaining() {
            Some(remaining) => remaining.min(self.page_size),
            None => self.page_size,
        };
        let (where_sql, mut values) = self.filter.where_clause(self.cursor);
        values.push(Value::Integer(page as i64));
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM arena_runs {where_sql} \
             ORDER BY fought_at DESC, id DESC LIMIT ?"
        );

        let rows = self.store.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), row_to_run_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        debug!(rows = rows.len(), page, "fetched history page");
        if rows.len() < page {
            self.exhausted = true;
        }
        for row in rows {
            self.cursor = Some((row.fought_at, row.id()));
            match row.decode() {
                Ok(record) => self.buffer.push_back(record),
                Err(e) => {
                    self.skipped += 1;
                    warn!(error = %e, "skipping undecodable run record");
                }
            }
        }
        Ok(())
    }
}

impl Iterator for HistoryIter {
    type Item = Result<RunRecord, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.remaining() == Some(0) {
                return None;
            }
            if let Some(record) = self.buffer.pop_front() {
                self.yielded += 1;
                return Some(Ok(record));
            }
            if self.exhausted {
                return None;
            }
            if let Err(e) = self.fetch_page() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
    }
}

impl ArenaStore {
    /// Walk run history matching `filter`, newest first.
    pub fn query_history(&self, filter: HistoryFilter) -> HistoryIter {
        HistoryIter {
            store: self.clone(),
            filter,
            page_size: self.page_size(),
            cursor: None,
            buffer: VecDeque::new(),
            yielded: 0,
            skipped: 0,
            exhausted: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::character::tests::ironclad_starter;
    use crate::model::{NewLoadout, NewRunRecord};
    use crate::model::run_record::tests::fight;
    use crate::store::tests::test_store;
    use chrono::Duration;
    use rusqlite::params;

    fn seeded(page_size: usize, runs: usize) -> (ArenaStore, LoadoutId) {
        let store = test_store().with_page_size(page_size);
        let id = store
            .save_loadout(&NewLoadout::new("L", ironclad_starter()))
            .unwrap();
        let loadout = store.get_loadout(id).unwrap();
        let t0 = crate::store::now();
        for i in 0..runs {
            let outcome = if i % 2 == 0 {
                Outcome::Victory
            } else {
                Outcome::Defeat
            };
            let encounter = if i % 3 == 0 { "Byrd" } else { "Chosen" };
            store
                .record_run(&NewRunRecord::from_fight(
                    &loadout,
                    fight(encounter, outcome, 5, 10),
                    t0 + Duration::seconds((i / 2) as i64),
                ))
                .unwrap();
        }
        (store, id)
    }

    fn is_newest_first(records: &[RunRecord]) -> bool {
        records
            .windows(2)
            .all(|w| (w[0].fought_at, w[0].id) > (w[1].fought_at, w[1].id))
    }

    #[test]
    fn walks_every_page_in_order() {
        let (store, _) = seeded(3, 10);
        let records: Vec<RunRecord> = store
            .query_history(HistoryFilter::all())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(records.len(), 10);
        assert!(is_newest_first(&records));
    }

    #[test]
    fn limit_caps_results() {
        let (store, _) = seeded(3, 10);
        let records: Vec<RunRecord> = store
            .query_history(HistoryFilter::all().limit(4))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(records.len(), 4);
        assert!(is_newest_first(&records));
    }

    #[test]
    fn filters_combine() {
        let (store, id) = seeded(4, 12);
        let records: Vec<RunRecord> = store
            .query_history(
                HistoryFilter::all()
                    .loadout(id)
                    .encounter("Byrd")
                    .outcome(Outcome::Victory),
            )
            .collect::<Result<_, _>>()
            .unwrap();
        // i in {0, 6}: divisible by 3 and even.
        assert_eq!(records.len(), 2);
        assert!(records
            .iter()
            .all(|r| r.encounter_id == "Byrd" && r.outcome == Outcome::Victory));

        let none = store
            .query_history(HistoryFilter::all().character_class(CharacterClass::new("WATCHER")))
            .count();
        assert_eq!(none, 0);
    }

    #[test]
    fn undecodable_rows_skipped() {
        let (store, _) = seeded(2, 5);
        store
            .with_conn(|conn| {
                conn.execute(
                    "UPDATE arena_runs SET deck_json = '[' WHERE id = 3",
                    params![],
                )?;
                Ok(())
            })
            .unwrap();
        let mut iter = store.query_history(HistoryFilter::all());
        let records: Vec<RunRecord> = iter.by_ref().collect::<Result<_, _>>().unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(iter.skipped(), 1);
    }

    #[test]
    fn includes_detached_runs() {
        let (store, id) = seeded(5, 3);
        store.delete_loadout(id).unwrap();
        let records: Vec<RunRecord> = store
            .query_history(HistoryFilter::all())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.loadout_id.is_none()));
    }
}
