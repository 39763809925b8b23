//! The usage processing pipeline
//!
//! Takes an ordered snapshot sequence through partitioning, per-slot
//! diffing and ranking, and seals the result into one immutable
//! `UsageSnapshot` that readers share without locking.

mod coalesce;
mod diff;
mod partition;
mod ranking;
mod selection;

pub use coalesce::{assemble_snapshot, canonicalize, coalesce, recoalesce};
pub use diff::diff_slot;
pub use partition::{DaySlot, HourSlot, Timeline, HOUR_WINDOWS_PER_DAY};
pub use ranking::rank;
pub use selection::Selection;

use crate::core::{
    BatteryLevelSeries, DeviceSnapshot, DiffEntry, RankingConfig, SeriesScope, SlotIndex,
};
use crate::policy::UsagePolicy;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Ranked diff lists keyed by `(day, hour)`.
///
/// Concrete keys cover each charted day aggregate and each populated
/// 2-hour window; `(All, All)` holds the whole-window aggregate,
/// computed from the outermost boundary snapshots rather than by
/// summing per-slot lists.
#[derive(Debug, Clone, Default)]
pub struct DiffIndex {
    lists: BTreeMap<(SlotIndex, SlotIndex), Vec<DiffEntry>>,
}

impl DiffIndex {
    pub fn get(&self, day: SlotIndex, hour: SlotIndex) -> Option<&[DiffEntry]> {
        self.lists.get(&(day, hour)).map(|list| list.as_slice())
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}

/// One fully built, immutable publication of the pipeline output.
#[derive(Debug, Clone)]
pub struct UsageSnapshot {
    timeline: Timeline,
    index: DiffIndex,
    generation: u64,
}

impl UsageSnapshot {
    pub fn empty() -> Self {
        Self {
            timeline: Timeline::empty(),
            index: DiffIndex::default(),
            generation: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn day_count(&self) -> usize {
        self.timeline.day_count()
    }

    pub fn is_single_day(&self) -> bool {
        self.timeline.is_single_day()
    }

    /// Level series for the chart. The daily series is withheld when
    /// the window spans a single day; the hourly series accepts `All`
    /// only in that single-day case, where it means the one day there is.
    pub fn level_series(&self, scope: SeriesScope, day: SlotIndex) -> Option<BatteryLevelSeries> {
        match scope {
            SeriesScope::Daily => {
                if self.is_single_day() {
                    None
                } else {
                    Some(self.timeline.daily_series())
                }
            }
            SeriesScope::Hourly => match day {
                SlotIndex::At(d) => self.timeline.hourly_series(d),
                SlotIndex::All => {
                    if self.is_single_day() {
                        self.timeline.hourly_series(0)
                    } else {
                        None
                    }
                }
            },
        }
    }

    /// Ranked entries for a slot, with the default-hidden ones removed.
    /// Missing slots yield an empty list.
    pub fn diff_entries(&self, day: SlotIndex, hour: SlotIndex) -> Vec<DiffEntry> {
        self.index
            .get(day, hour)
            .map(|list| {
                list.iter()
                    .filter(|entry| !entry.is_policy_hidden)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Ranked entries for a slot including the default-hidden ones.
    pub fn diff_entries_with_hidden(&self, day: SlotIndex, hour: SlotIndex) -> Vec<DiffEntry> {
        self.index
            .get(day, hour)
            .map(|list| list.to_vec())
            .unwrap_or_default()
    }
}

/// Runs the full pipeline over a snapshot sequence.
pub struct UsageEngine {
    policy: Arc<dyn UsagePolicy + Send + Sync>,
    ranking: RankingConfig,
}

impl UsageEngine {
    pub fn new(policy: Arc<dyn UsagePolicy + Send + Sync>, ranking: RankingConfig) -> Self {
        Self { policy, ranking }
    }

    pub fn policy(&self) -> &(dyn UsagePolicy + Send + Sync) {
        self.policy.as_ref()
    }

    /// Partition, diff and rank an ordered snapshot sequence into a
    /// publishable snapshot tagged with `generation`.
    pub fn rebuild(&self, snapshots: Vec<DeviceSnapshot>, generation: u64) -> UsageSnapshot {
        let timeline = Timeline::build(snapshots);
        let mut lists: BTreeMap<(SlotIndex, SlotIndex), Vec<DiffEntry>> = BTreeMap::new();

        if let Some((start, end)) = timeline.window_boundaries() {
            lists.insert(
                (SlotIndex::All, SlotIndex::All),
                self.ranked_slot(start, end),
            );
        }

        for (day_index, day) in timeline.days().iter().enumerate() {
            if let Some((start, end)) = timeline.day_boundaries(day_index) {
                lists.insert(
                    (SlotIndex::At(day_index), SlotIndex::All),
                    self.ranked_slot(start, end),
                );
            }
            for slot in &day.hours {
                if let Some((start, end)) = timeline.hour_boundaries(day_index, slot.window) {
                    lists.insert(
                        (SlotIndex::At(day_index), SlotIndex::At(slot.window)),
                        self.ranked_slot(start, end),
                    );
                }
            }
        }

        log::debug!(
            "rebuilt usage data: {} snapshots, {} days, {} ranked lists (generation {})",
            timeline.snapshot_count(),
            timeline.day_count(),
            lists.len(),
            generation
        );

        UsageSnapshot {
            timeline,
            index: DiffIndex { lists },
            generation,
        }
    }

    fn ranked_slot(&self, start: &DeviceSnapshot, end: &DeviceSnapshot) -> Vec<DiffEntry> {
        let entries = diff_slot(start, end);
        rank(
            self.policy.as_ref(),
            &self.ranking,
            entries,
            end.total_consumed_power_mah,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DeviceReading, RawConsumerTuple, SampleBatch};
    use crate::policy::StaticPolicy;

    const HOUR_MS: i64 = 3_600_000;
    const EPSILON: f64 = 1e-9;

    fn engine() -> UsageEngine {
        UsageEngine::new(Arc::new(StaticPolicy::default()), RankingConfig::default())
    }

    fn batch(ts_ms: i64, level: u8, total: f64, consumers: Vec<RawConsumerTuple>) -> SampleBatch {
        SampleBatch::new(
            DeviceReading::new(ts_ms, "UTC", level).with_total_power(total),
            consumers,
        )
    }

    fn snapshots_for_example() -> Vec<DeviceSnapshot> {
        let policy = StaticPolicy::default();
        let batches = vec![
            batch(0, 100, 0.0, vec![RawConsumerTuple::app(10042, 0.0)]),
            batch(HOUR_MS, 98, 10.0, vec![RawConsumerTuple::app(10042, 5.0)]),
            batch(
                2 * HOUR_MS,
                96,
                20.0,
                vec![
                    RawConsumerTuple::app(10042, 12.0),
                    RawConsumerTuple::app(10077, 3.0),
                ],
            ),
        ];
        batches
            .iter()
            .map(|b| assemble_snapshot(&policy, b).unwrap())
            .collect()
    }

    #[test]
    fn test_single_window_example_scenario() {
        let published = engine().rebuild(snapshots_for_example(), 1);

        assert!(published.is_single_day());

        let entries = published.diff_entries(SlotIndex::At(0), SlotIndex::At(0));
        let keys: Vec<&str> = entries.iter().map(|e| e.identity_key.as_str()).collect();
        assert_eq!(keys, vec!["10042", "1000", "10077"]);

        assert!((entries[0].consumed_power_delta_mah - 12.0).abs() < EPSILON);
        assert!((entries[0].percent_of_total - 60.0).abs() < EPSILON);
        assert!((entries[2].consumed_power_delta_mah - 3.0).abs() < EPSILON);
        assert!((entries[2].percent_of_total - 15.0).abs() < EPSILON);

        let displayed: f64 = entries.iter().map(|e| e.consumed_power_delta_mah).sum();
        assert!((displayed - 20.0).abs() < EPSILON);
    }

    #[test]
    fn test_whole_window_aggregate_matches_outer_boundaries() {
        let published = engine().rebuild(snapshots_for_example(), 1);

        let all = published.diff_entries(SlotIndex::All, SlotIndex::All);
        let window = published.diff_entries(SlotIndex::At(0), SlotIndex::At(0));
        assert_eq!(all, window);
    }

    #[test]
    fn test_missing_slot_yields_empty_list() {
        let published = engine().rebuild(snapshots_for_example(), 1);

        assert!(published
            .diff_entries(SlotIndex::At(0), SlotIndex::At(7))
            .is_empty());
        assert!(published
            .diff_entries(SlotIndex::All, SlotIndex::At(0))
            .is_empty());
        assert!(published
            .diff_entries(SlotIndex::At(9), SlotIndex::All)
            .is_empty());
    }

    #[test]
    fn test_single_day_withholds_daily_series() {
        let published = engine().rebuild(snapshots_for_example(), 1);

        assert!(published
            .level_series(SeriesScope::Daily, SlotIndex::All)
            .is_none());
        let hourly = published
            .level_series(SeriesScope::Hourly, SlotIndex::All)
            .unwrap();
        let levels: Vec<u8> = hourly.points.iter().map(|p| p.level).collect();
        assert_eq!(levels, vec![100, 96]);
    }

    #[test]
    fn test_multi_day_serves_daily_series() {
        let policy = StaticPolicy::default();
        let batches = vec![
            batch(0, 100, 0.0, vec![]),
            batch(6 * HOUR_MS, 90, 5.0, vec![]),
            batch(24 * HOUR_MS, 83, 8.0, vec![]),
            batch(30 * HOUR_MS, 70, 12.0, vec![]),
        ];
        let snapshots: Vec<DeviceSnapshot> = batches
            .iter()
            .map(|b| assemble_snapshot(&policy, b).unwrap())
            .collect();
        let published = engine().rebuild(snapshots, 3);

        assert!(!published.is_single_day());
        let daily = published
            .level_series(SeriesScope::Daily, SlotIndex::All)
            .unwrap();
        let levels: Vec<u8> = daily.points.iter().map(|p| p.level).collect();
        assert_eq!(levels, vec![100, 83, 70]);
        assert_eq!(published.generation(), 3);
    }

    #[test]
    fn test_determinism_across_rebuilds() {
        let first = engine().rebuild(snapshots_for_example(), 1);
        let second = engine().rebuild(snapshots_for_example(), 1);

        for day in [SlotIndex::All, SlotIndex::At(0)] {
            for hour in [SlotIndex::All, SlotIndex::At(0)] {
                assert_eq!(
                    first.diff_entries_with_hidden(day, hour),
                    second.diff_entries_with_hidden(day, hour)
                );
            }
        }
    }

    #[test]
    fn test_hidden_entries_only_in_show_all_view() {
        let policy_config = crate::core::PolicyConfig {
            hidden_by_default: vec!["10042".to_string()],
            ..crate::core::PolicyConfig::default()
        };
        let engine = UsageEngine::new(
            Arc::new(StaticPolicy::new(&policy_config)),
            RankingConfig::default(),
        );
        let published = engine.rebuild(snapshots_for_example(), 1);

        let default_view = published.diff_entries(SlotIndex::At(0), SlotIndex::At(0));
        assert!(default_view.iter().all(|e| e.identity_key != "10042"));

        let full_view = published.diff_entries_with_hidden(SlotIndex::At(0), SlotIndex::At(0));
        assert!(full_view.iter().any(|e| e.identity_key == "10042"));
    }
}
