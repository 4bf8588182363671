//! Turns cumulative plan-cache execution counters into per-interval increases.
//!
//! `sys.dm_exec_query_stats` reports execution counts accumulated since a plan
//! was cached. A plan instance is identified by its plan handle, statement hash
//! and creation time; a recompiled plan keeps the handle but gets a new
//! creation time and restarts its counters, so it must be treated as a new
//! identity.
//!
//! The engine holds no lock. It is owned by exactly one endpoint and only
//! reached through `&mut` from the task polling that endpoint; polls never
//! overlap.

use crate::queries::{CounterClass, DmlActivity, DmlIncrease};
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlanKey {
    pub plan_handle: Vec<u8>,
    pub sql_statement_hash: Vec<u8>,
    pub creation_time: Option<NaiveDateTime>,
}

impl From<&DmlActivity> for PlanKey {
    fn from(row: &DmlActivity) -> Self {
        Self {
            plan_handle: row.plan_handle.clone(),
            sql_statement_hash: row.sql_statement_hash.clone(),
            creation_time: row.creation_time,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub reads: i64,
    pub writes: i64,
}

impl Counts {
    fn add(&mut self, class: CounterClass, value: i64) {
        match class {
            CounterClass::Reads => self.reads += value,
            CounterClass::Writes => self.writes += value,
        }
    }

    fn increase_since(self, previous: Self) -> Self {
        Self {
            reads: (self.reads - previous.reads).max(0),
            writes: (self.writes - previous.writes).max(0),
        }
    }
}

#[derive(Debug, Default)]
pub struct DeltaEngine {
    // None until the first poll has seeded it. An empty map is a seeded
    // baseline that saw no rows.
    baseline: Option<HashMap<PlanKey, Counts>>,
}

impl DeltaEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_seeded(&self) -> bool {
        self.baseline.is_some()
    }

    /// Number of plan instances tracked. Entries are never evicted.
    pub fn len(&self) -> usize {
        self.baseline.as_ref().map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fold one poll of activity rows into the baseline and return the total
    /// increase since the previous poll.
    ///
    /// Always returns a value, `(0, 0)` on the first poll or when nothing ran.
    pub fn calculate_increase<'a, I>(&mut self, rows: I) -> DmlIncrease
    where
        I: IntoIterator<Item = &'a DmlActivity>,
    {
        let mut current: HashMap<PlanKey, Counts> = HashMap::new();
        for row in rows {
            current
                .entry(PlanKey::from(row))
                .or_default()
                .add(row.query_type, row.execution_count);
        }

        let Some(baseline) = self.baseline.as_mut() else {
            self.baseline = Some(current);
            return DmlIncrease::default();
        };

        let mut total = DmlIncrease::default();
        for (key, counts) in current {
            let increase = match baseline.entry(key) {
                Entry::Occupied(mut entry) => {
                    let increase = counts.increase_since(*entry.get());
                    entry.insert(counts);
                    increase
                }
                Entry::Vacant(entry) => {
                    entry.insert(counts);
                    counts.increase_since(Counts::default())
                }
            };

            total.reads += increase.reads;
            total.writes += increase.writes;
        }

        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(handle: &str, hash: &str, class: CounterClass, count: i64) -> DmlActivity {
        DmlActivity {
            plan_handle: handle.as_bytes().to_vec(),
            sql_statement_hash: hash.as_bytes().to_vec(),
            creation_time: None,
            execution_count: count,
            query_type: class,
        }
    }

    fn writes(handle: &str, count: i64) -> DmlActivity {
        row(handle, "hash", CounterClass::Writes, count)
    }

    fn reads(handle: &str, count: i64) -> DmlActivity {
        row(handle, "hash", CounterClass::Reads, count)
    }

    fn at(mut activity: DmlActivity, day: u32) -> DmlActivity {
        activity.creation_time = NaiveDate::from_ymd_opt(2024, 1, day)
            .and_then(|d| d.and_hms_opt(0, 0, 0));
        activity
    }

    fn increase(reads: i64, writes: i64) -> DmlIncrease {
        DmlIncrease { reads, writes }
    }

    #[test]
    fn test_first_poll_seeds_and_reports_zero() {
        let mut engine = DeltaEngine::new();
        let result = engine.calculate_increase(&[writes("K1", 10), reads("K2", 500)]);

        assert_eq!(result, increase(0, 0));
        assert!(engine.is_seeded());
        assert_eq!(engine.len(), 2);
    }

    #[test]
    fn test_steady_state_delta() {
        let mut engine = DeltaEngine::new();
        engine.calculate_increase(&[writes("K1", 10)]);

        assert_eq!(engine.calculate_increase(&[writes("K1", 14)]), increase(0, 4));
        assert_eq!(engine.calculate_increase(&[writes("K1", 20)]), increase(0, 6));
    }

    #[test]
    fn test_new_key_after_first_poll_counts_in_full() {
        let mut engine = DeltaEngine::new();
        engine.calculate_increase(&[writes("K1", 10)]);

        let result = engine.calculate_increase(&[writes("K1", 10), reads("K2", 7)]);
        assert_eq!(result, increase(7, 0));
    }

    #[test]
    fn test_recompiled_plan_is_a_new_identity() {
        let mut engine = DeltaEngine::new();
        engine.calculate_increase(&[at(writes("K1", 10), 1), at(writes("K1", 12), 2)]);

        let result = engine.calculate_increase(&[at(writes("K1", 10), 1), at(writes("K1", 15), 2)]);
        assert_eq!(result, increase(0, 3));
        assert_eq!(engine.len(), 2);
    }

    #[test]
    fn test_duplicate_rows_are_summed() {
        let mut engine = DeltaEngine::new();
        engine.calculate_increase(&[writes("K2", 8)]);

        let result = engine.calculate_increase(&[writes("K2", 18), writes("K2", 2)]);
        assert_eq!(result, increase(0, 12));
    }

    #[test]
    fn test_decrease_is_clamped_to_zero() {
        let mut engine = DeltaEngine::new();
        engine.calculate_increase(&[writes("K1", 10), reads("K2", 5)]);

        let result = engine.calculate_increase(&[writes("K1", 3), reads("K2", 9)]);
        assert_eq!(result, increase(4, 0));

        // the lower value is the new baseline
        assert_eq!(engine.calculate_increase(&[writes("K1", 5)]), increase(0, 2));
    }

    #[test]
    fn test_absent_keys_keep_their_baseline() {
        let mut engine = DeltaEngine::new();
        engine.calculate_increase(&[writes("K1", 10)]);
        engine.calculate_increase(&[reads("K2", 1)]);

        assert_eq!(engine.len(), 2);
        assert_eq!(engine.calculate_increase(&[writes("K1", 11)]), increase(0, 1));
    }

    #[test]
    fn test_empty_poll_reports_zero() {
        let none: Vec<DmlActivity> = Vec::new();
        let mut engine = DeltaEngine::new();
        assert_eq!(engine.calculate_increase(&none), increase(0, 0));
        // an empty first poll still seeds the engine
        assert!(engine.is_seeded());
        assert_eq!(engine.calculate_increase(&[writes("K1", 3)]), increase(0, 3));
        assert_eq!(engine.calculate_increase(&none), increase(0, 0));
    }

    #[test]
    fn test_two_poll_scenario() {
        let mut engine = DeltaEngine::new();
        let first = engine.calculate_increase(&[writes("K1", 10), writes("K2", 8)]);
        assert_eq!(first, increase(0, 0));

        let second = engine.calculate_increase(&[
            writes("K1", 14),
            writes("K2", 18),
            writes("K2", 2),
            reads("K3", 550),
        ]);
        assert_eq!(second, increase(550, 16));
    }

    #[test]
    fn test_mixed_statements_and_plans() {
        let mut engine = DeltaEngine::new();
        engine.calculate_increase(&[
            row("AA11", "FOO", CounterClass::Writes, 10),
            row("AA11", "BAR", CounterClass::Writes, 8),
            row("BB12", "BAZ", CounterClass::Reads, 500),
            row("CC12", "BAZ", CounterClass::Reads, 600),
            row("EE12", "BAZ", CounterClass::Reads, 100),
        ]);

        let result = engine.calculate_increase(&[
            row("AA11", "FOO", CounterClass::Writes, 14),
            row("AA11", "BAR", CounterClass::Writes, 18),
            row("AA11", "BAR", CounterClass::Writes, 2),
            row("BB12", "BAZ", CounterClass::Reads, 550),
            row("CC12", "BAZ", CounterClass::Reads, 625),
            row("DD12", "BAZ", CounterClass::Reads, 1),
        ]);

        assert_eq!(result, increase(76, 16));
    }
}
