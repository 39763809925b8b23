//! Per-consumer deltas across a slot
//!
//! Compares the two boundary snapshots of a slot and produces one entry
//! per consumer present at the end boundary. Device counters reset when
//! the battery recharges, so a delta can come out negative; that case
//! falls back to the end snapshot's raw value, reading the window as
//! "everything since the last reset". Negative values never leave this
//! module.

use crate::core::{ConsumerRecord, DeviceSnapshot, DiffEntry};
use std::collections::BTreeMap;

fn clamped_f64(end: f64, start: f64) -> f64 {
    let delta = end - start;
    if delta < 0.0 {
        end
    } else {
        delta
    }
}

fn clamped_i64(end: i64, start: i64) -> i64 {
    let delta = end - start;
    if delta < 0 {
        end
    } else {
        delta
    }
}

/// Consumption deltas between a slot's boundary snapshots.
///
/// Consumers present at both boundaries get field-wise deltas, consumers
/// first seen at the end boundary count in full, and consumers that
/// vanished before the end boundary contribute nothing. Percentages are
/// left at zero; the ranking stage owns normalization.
pub fn diff_slot(start: &DeviceSnapshot, end: &DeviceSnapshot) -> Vec<DiffEntry> {
    let start_by_key: BTreeMap<&str, &ConsumerRecord> = start
        .consumers
        .iter()
        .map(|record| (record.identity_key.as_str(), record))
        .collect();

    let mut entries = Vec::with_capacity(end.consumers.len());
    for end_record in &end.consumers {
        let mut entry = DiffEntry::new(&end_record.identity_key, end_record.kind);
        entry.label_hint = end_record.package_hint.clone();

        match start_by_key.get(end_record.identity_key.as_str()) {
            Some(start_record) => {
                entry.consumed_power_delta_mah = clamped_f64(
                    end_record.consumed_power_mah,
                    start_record.consumed_power_mah,
                );
                entry.foreground_delta_ms = clamped_i64(
                    end_record.foreground_time_ms,
                    start_record.foreground_time_ms,
                );
                entry.background_delta_ms = clamped_i64(
                    end_record.background_time_ms,
                    start_record.background_time_ms,
                );
                entry.is_policy_hidden =
                    end_record.is_policy_hidden || start_record.is_policy_hidden;
                if entry.label_hint.is_none() {
                    entry.label_hint = start_record.package_hint.clone();
                }
            }
            None => {
                entry.consumed_power_delta_mah = end_record.consumed_power_mah;
                entry.foreground_delta_ms = end_record.foreground_time_ms;
                entry.background_delta_ms = end_record.background_time_ms;
                entry.is_policy_hidden = end_record.is_policy_hidden;
            }
        }
        entries.push(entry);
    }
    entries
}
