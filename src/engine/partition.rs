//! Calendar partitioning of the snapshot sequence
//!
//! Groups an ordered snapshot sequence into calendar-day buckets and
//! fixed 2-hour windows inside each day, and derives the battery level
//! series for charting. Every chart point is a real snapshot; nothing
//! is interpolated.

use crate::core::{BatteryLevelSeries, DeviceSnapshot, LevelPoint};
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;

/// Number of 2-hour windows in a day.
pub const HOUR_WINDOWS_PER_DAY: usize = 12;

const WINDOW_MS: i64 = 2 * 3_600_000;

/// One 2-hour window inside a day that has both boundary snapshots.
/// Window `w` covers local clock time `[2w, 2w+2]`; a snapshot sitting
/// exactly on an interior boundary closes one window and opens the next,
/// the same shared point the chart draws.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HourSlot {
    pub window: usize,
    /// Index of the first snapshot inside the window.
    pub start: usize,
    /// Index of the last snapshot inside the window.
    pub end: usize,
}

/// One charted calendar day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySlot {
    /// Local date of the bucket, for labeling.
    pub date: NaiveDate,
    /// Indices of this bucket's snapshots, in time order.
    pub members: Vec<usize>,
    /// Hour windows with at least two member snapshots.
    pub hours: Vec<HourSlot>,
}

/// The partitioned snapshot sequence.
///
/// Built once per recomputation and published read-only alongside the
/// diff index; all lookups are by value-copied indices into the owned
/// snapshot vector.
#[derive(Debug, Clone)]
pub struct Timeline {
    snapshots: Vec<DeviceSnapshot>,
    days: Vec<DaySlot>,
}

/// Local calendar date of a snapshot, in the snapshot's own zone.
/// The zone was validated at ingestion; a row that somehow carries an
/// unknown zone falls back to UTC rather than failing the rebuild.
fn local_date(snapshot: &DeviceSnapshot) -> NaiveDate {
    let tz: Tz = snapshot.timezone_id.parse().unwrap_or(chrono_tz::UTC);
    utc_time(snapshot).with_timezone(&tz).date_naive()
}

/// Milliseconds since local midnight, in the snapshot's own zone.
fn local_time_of_day_ms(snapshot: &DeviceSnapshot) -> i64 {
    let tz: Tz = snapshot.timezone_id.parse().unwrap_or(chrono_tz::UTC);
    let local = utc_time(snapshot).with_timezone(&tz);
    local.num_seconds_from_midnight() as i64 * 1000 + local.timestamp_subsec_millis() as i64
}

fn utc_time(snapshot: &DeviceSnapshot) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(snapshot.timestamp_ms).unwrap_or_default()
}

impl Timeline {
    /// Partition an ordered, deduplicated snapshot sequence.
    pub fn build(snapshots: Vec<DeviceSnapshot>) -> Self {
        let days = partition_days(&snapshots);
        Self { snapshots, days }
    }

    pub fn empty() -> Self {
        Self {
            snapshots: Vec::new(),
            days: Vec::new(),
        }
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    pub fn snapshots(&self) -> &[DeviceSnapshot] {
        &self.snapshots
    }

    pub fn days(&self) -> &[DaySlot] {
        &self.days
    }

    pub fn day_count(&self) -> usize {
        self.days.len()
    }

    /// True when the retained window spans one calendar day. Callers
    /// suppress the day selector and daily chart in that case.
    pub fn is_single_day(&self) -> bool {
        self.days.len() <= 1
    }

    /// Boundary snapshots of a day slot. A day reaches to the first
    /// snapshot of the following day; the last day ends at its own last
    /// snapshot. None when the slot has fewer than two boundaries.
    pub fn day_boundaries(&self, day: usize) -> Option<(&DeviceSnapshot, &DeviceSnapshot)> {
        let bucket = self.days.get(day)?;
        let start = *bucket.members.first()?;
        let end = match self.days.get(day + 1) {
            Some(next) => *next.members.first()?,
            None => *bucket.members.last()?,
        };
        if start == end {
            return None;
        }
        Some((&self.snapshots[start], &self.snapshots[end]))
    }

    /// Boundary snapshots of one 2-hour window of a day.
    pub fn hour_boundaries(
        &self,
        day: usize,
        window: usize,
    ) -> Option<(&DeviceSnapshot, &DeviceSnapshot)> {
        let bucket = self.days.get(day)?;
        let slot = bucket.hours.iter().find(|h| h.window == window)?;
        Some((&self.snapshots[slot.start], &self.snapshots[slot.end]))
    }

    /// First and last snapshot of the whole retained window.
    pub fn window_boundaries(&self) -> Option<(&DeviceSnapshot, &DeviceSnapshot)> {
        if self.snapshots.len() < 2 {
            return None;
        }
        Some((&self.snapshots[0], &self.snapshots[self.snapshots.len() - 1]))
    }

    /// Level points at day boundaries: each day's first snapshot plus
    /// the final snapshot of the window.
    pub fn daily_series(&self) -> BatteryLevelSeries {
        let mut points = Vec::with_capacity(self.days.len() + 1);
        for bucket in &self.days {
            if let Some(&first) = bucket.members.first() {
                points.push(level_point(&self.snapshots[first]));
            }
        }
        if let Some(last) = self.snapshots.last() {
            let last_point = level_point(last);
            if points.last() != Some(&last_point) {
                points.push(last_point);
            }
        }
        BatteryLevelSeries::new(points)
    }

    /// Level points at 2-hour boundaries of one day: both boundary
    /// snapshots of every populated window, shared points emitted once.
    pub fn hourly_series(&self, day: usize) -> Option<BatteryLevelSeries> {
        let bucket = self.days.get(day)?;
        let mut points: Vec<LevelPoint> = Vec::with_capacity(bucket.hours.len() + 1);
        for slot in &bucket.hours {
            for idx in [slot.start, slot.end] {
                let point = level_point(&self.snapshots[idx]);
                if points.last() != Some(&point) {
                    points.push(point);
                }
            }
        }
        Some(BatteryLevelSeries::new(points))
    }
}

fn level_point(snapshot: &DeviceSnapshot) -> LevelPoint {
    LevelPoint {
        timestamp_ms: snapshot.timestamp_ms,
        level: snapshot.battery_level_percent,
    }
}

/// Group snapshot indices into day buckets and their hour windows.
fn partition_days(snapshots: &[DeviceSnapshot]) -> Vec<DaySlot> {
    if snapshots.is_empty() {
        return Vec::new();
    }

    // Consecutive runs of equal local date become one bucket.
    let mut buckets: Vec<(NaiveDate, Vec<usize>)> = Vec::new();
    for (idx, snapshot) in snapshots.iter().enumerate() {
        let date = local_date(snapshot);
        match buckets.last_mut() {
            Some((day, members)) if *day == date => members.push(idx),
            _ => buckets.push((date, vec![idx])),
        }
    }

    merge_short_days(&mut buckets);

    buckets
        .into_iter()
        .map(|(date, members)| {
            let hours = hour_slots(snapshots, &members, date);
            DaySlot {
                date,
                members,
                hours,
            }
        })
        .collect()
}

/// Fold buckets with fewer than two snapshots into a neighbor, keeping
/// snapshot order. The following day absorbs when one exists, otherwise
/// the preceding day; the absorbing bucket keeps its own date.
fn merge_short_days(buckets: &mut Vec<(NaiveDate, Vec<usize>)>) {
    loop {
        let pos = match buckets.iter().position(|(_, members)| members.len() < 2) {
            Some(pos) => pos,
            None => return,
        };
        if buckets.len() == 1 {
            return;
        }
        let (_, members) = buckets.remove(pos);
        if pos < buckets.len() {
            // Absorbed by the following day; the sliver leads it.
            let target = &mut buckets[pos].1;
            let mut combined = members;
            combined.append(target);
            *target = combined;
        } else {
            buckets[pos - 1].1.extend(members);
        }
    }
}

/// Windows of a bucket that contain at least two snapshots. A merged
/// bucket can hold snapshots from a neighboring date; those widen the
/// day-level boundaries but stay out of the hour windows, which belong
/// to the bucket's charted date.
fn hour_slots(snapshots: &[DeviceSnapshot], members: &[usize], date: NaiveDate) -> Vec<HourSlot> {
    let mut slots = Vec::new();
    for window in 0..HOUR_WINDOWS_PER_DAY {
        let lo = window as i64 * WINDOW_MS;
        let hi = lo + WINDOW_MS;
        let inside: Vec<usize> = members
            .iter()
            .copied()
            .filter(|&idx| {
                if local_date(&snapshots[idx]) != date {
                    return false;
                }
                let tod = local_time_of_day_ms(&snapshots[idx]);
                tod >= lo && tod <= hi
            })
            .collect();
        if inside.len() >= 2 {
            slots.push(HourSlot {
                window,
                start: inside[0],
                end: inside[inside.len() - 1],
            });
        }
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR_MS: i64 = 3_600_000;

    fn snap(ts_ms: i64, level: u8) -> DeviceSnapshot {
        snap_in(ts_ms, level, "UTC")
    }

    fn snap_in(ts_ms: i64, level: u8, zone: &str) -> DeviceSnapshot {
        DeviceSnapshot {
            timestamp_ms: ts_ms,
            timezone_id: zone.to_string(),
            battery_level_percent: level,
            total_consumed_power_mah: 0.0,
            discharge_percent: 0,
            consumers: Vec::new(),
        }
    }

    #[test]
    fn test_daily_series_spans_day_starts_and_final_point() {
        let timeline = Timeline::build(vec![
            snap(0, 100),
            snap(6 * HOUR_MS, 90),
            snap(23 * HOUR_MS, 85),
            snap(24 * HOUR_MS, 83),
            snap(30 * HOUR_MS, 70),
            snap(48 * HOUR_MS, 59),
            snap(71 * HOUR_MS, 41),
        ]);

        assert_eq!(timeline.day_count(), 3);
        assert!(!timeline.is_single_day());

        let series = timeline.daily_series();
        let levels: Vec<u8> = series.points.iter().map(|p| p.level).collect();
        assert_eq!(levels, vec![100, 83, 59, 41]);
        assert_eq!(series.points[1].timestamp_ms, 24 * HOUR_MS);
    }

    #[test]
    fn test_day_slots_share_midnight_boundary() {
        let timeline = Timeline::build(vec![
            snap(0, 100),
            snap(6 * HOUR_MS, 90),
            snap(24 * HOUR_MS, 83),
            snap(30 * HOUR_MS, 70),
        ]);

        let (start0, end0) = timeline.day_boundaries(0).unwrap();
        let (start1, end1) = timeline.day_boundaries(1).unwrap();

        assert_eq!(start0.timestamp_ms, 0);
        // Day 0 reaches to day 1's first snapshot.
        assert_eq!(end0.timestamp_ms, 24 * HOUR_MS);
        assert_eq!(start1.timestamp_ms, 24 * HOUR_MS);
        assert_eq!(end1.timestamp_ms, 30 * HOUR_MS);
    }

    #[test]
    fn test_leading_sliver_merges_into_following_day() {
        // One snapshot late on day 0, full data on day 1.
        let timeline = Timeline::build(vec![
            snap(23 * HOUR_MS, 95),
            snap(25 * HOUR_MS, 90),
            snap(26 * HOUR_MS, 88),
        ]);

        assert_eq!(timeline.day_count(), 1);
        assert!(timeline.is_single_day());
        let day = &timeline.days()[0];
        assert_eq!(day.members, vec![0, 1, 2]);
        // The absorbing day keeps its own date (1970-01-02).
        assert_eq!(day.date, NaiveDate::from_ymd_opt(1970, 1, 2).unwrap());
    }

    #[test]
    fn test_merged_sliver_stays_out_of_hour_windows() {
        let ts = |h: f64| (h * HOUR_MS as f64) as i64;
        // A late-evening sliver on day 0 merges forward into day 1,
        // which has its own snapshots in the same evening window.
        let timeline = Timeline::build(vec![
            snap(ts(23.5), 95),
            snap(ts(25.0), 90),
            snap(ts(26.0), 88),
            snap(ts(47.0), 70),
            snap(ts(47.5), 68),
        ]);

        assert_eq!(timeline.day_count(), 1);
        assert_eq!(
            timeline.days()[0].date,
            NaiveDate::from_ymd_opt(1970, 1, 2).unwrap()
        );

        // Window 11 pairs only the charted date's snapshots; the sliver
        // at 23:30 of the previous date does not stretch it to a day.
        let (start, end) = timeline.hour_boundaries(0, 11).unwrap();
        assert_eq!(start.timestamp_ms, ts(47.0));
        assert_eq!(end.timestamp_ms, ts(47.5));

        let (start, end) = timeline.hour_boundaries(0, 0).unwrap();
        assert_eq!(start.timestamp_ms, ts(25.0));
        assert_eq!(end.timestamp_ms, ts(26.0));
    }

    #[test]
    fn test_trailing_sliver_merges_into_preceding_day() {
        let timeline = Timeline::build(vec![
            snap(HOUR_MS, 95),
            snap(5 * HOUR_MS, 90),
            snap(25 * HOUR_MS, 80),
        ]);

        assert_eq!(timeline.day_count(), 1);
        assert_eq!(timeline.days()[0].members, vec![0, 1, 2]);
        assert_eq!(
            timeline.days()[0].date,
            NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()
        );
    }

    #[test]
    fn test_hour_windows_need_two_snapshots() {
        let ts = |h: f64| (h * HOUR_MS as f64) as i64;
        let timeline = Timeline::build(vec![
            snap(ts(0.2), 100),
            snap(ts(1.8), 97),
            snap(ts(4.5), 93),
            snap(ts(24.0), 90),
            snap(ts(25.0), 88),
        ]);

        // Day 0: window 0 has two snapshots, window 2 only one.
        let day0 = &timeline.days()[0];
        assert_eq!(day0.hours.len(), 1);
        assert_eq!(day0.hours[0].window, 0);

        let (start, end) = timeline.hour_boundaries(0, 0).unwrap();
        assert_eq!(start.battery_level_percent, 100);
        assert_eq!(end.battery_level_percent, 97);
        assert!(timeline.hour_boundaries(0, 2).is_none());
    }

    #[test]
    fn test_hourly_series_points() {
        let ts = |h: f64| (h * HOUR_MS as f64) as i64;
        let timeline = Timeline::build(vec![
            snap(ts(0.2), 100),
            snap(ts(1.8), 97),
            snap(ts(2.3), 96),
            snap(ts(3.9), 92),
        ]);

        let series = timeline.hourly_series(0).unwrap();
        let levels: Vec<u8> = series.points.iter().map(|p| p.level).collect();
        assert_eq!(levels, vec![100, 97, 96, 92]);
    }

    #[test]
    fn test_snapshot_on_window_boundary_closes_and_opens() {
        let ts = |h: f64| (h * HOUR_MS as f64) as i64;
        let timeline = Timeline::build(vec![
            snap(ts(0.5), 100),
            snap(ts(2.0), 97),
            snap(ts(3.0), 95),
        ]);

        let (_, end0) = timeline.hour_boundaries(0, 0).unwrap();
        let (start1, end1) = timeline.hour_boundaries(0, 1).unwrap();
        // The 02:00 snapshot is window 0's end and window 1's start.
        assert_eq!(end0.timestamp_ms, ts(2.0));
        assert_eq!(start1.timestamp_ms, ts(2.0));
        assert_eq!(end1.timestamp_ms, ts(3.0));

        let series = timeline.hourly_series(0).unwrap();
        let levels: Vec<u8> = series.points.iter().map(|p| p.level).collect();
        // The shared 02:00 point is emitted once.
        assert_eq!(levels, vec![100, 97, 95]);
    }

    #[test]
    fn test_zone_is_authoritative_for_day_assignment() {
        // 1970-01-01T23:30Z is already Jan 2 in Paris (UTC+1).
        let ts = 23 * HOUR_MS + 30 * 60_000;
        let timeline = Timeline::build(vec![
            snap_in(ts, 95, "Europe/Paris"),
            snap_in(ts + HOUR_MS, 90, "Europe/Paris"),
        ]);

        assert_eq!(
            timeline.days()[0].date,
            NaiveDate::from_ymd_opt(1970, 1, 2).unwrap()
        );
    }

    #[test]
    fn test_degenerate_inputs() {
        let empty = Timeline::build(Vec::new());
        assert_eq!(empty.day_count(), 0);
        assert!(empty.window_boundaries().is_none());
        assert!(empty.daily_series().is_empty());

        let single = Timeline::build(vec![snap(0, 100)]);
        assert_eq!(single.day_count(), 1);
        assert!(single.day_boundaries(0).is_none());
        assert!(single.window_boundaries().is_none());
    }

    #[test]
    fn test_two_single_snapshot_days_merge_together() {
        let timeline = Timeline::build(vec![snap(23 * HOUR_MS, 95), snap(47 * HOUR_MS, 60)]);

        assert_eq!(timeline.day_count(), 1);
        let (start, end) = timeline.day_boundaries(0).unwrap();
        assert_eq!(start.timestamp_ms, 23 * HOUR_MS);
        assert_eq!(end.timestamp_ms, 47 * HOUR_MS);
    }
}
