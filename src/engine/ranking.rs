//! Ranking and normalization of diff lists
//!
//! Turns raw slot diffs into the displayed form: percent-of-total
//! normalization, noise and policy filtering, a deterministic ordering,
//! and a size cap. The OS system bucket doubles as the conservation
//! sink: device-reported total power that no displayed entry accounts
//! for (unattributed overhead, capped-off tails, sub-threshold noise)
//! is folded into it so the displayed list sums to the window total.

use crate::core::{ConsumerKind, DiffEntry, RankingConfig};
use crate::policy::UsagePolicy;

fn percent_of(delta: f64, total: f64) -> f64 {
    if total > 0.0 {
        delta / total * 100.0
    } else {
        0.0
    }
}

/// Descending by power, ties broken by ascending identity key.
fn sort_entries(entries: &mut [DiffEntry]) {
    entries.sort_by(|a, b| {
        b.consumed_power_delta_mah
            .partial_cmp(&a.consumed_power_delta_mah)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.identity_key.cmp(&b.identity_key))
    });
}

/// Shape one slot's diff entries for display.
///
/// `total_power_mah` is the end boundary's device-reported total, the
/// denominator for every percentage. The OS system bucket is exempt
/// from the noise threshold and the hidden lists; everything else can
/// be filtered.
pub fn rank(
    policy: &dyn UsagePolicy,
    config: &RankingConfig,
    mut entries: Vec<DiffEntry>,
    total_power_mah: f64,
) -> Vec<DiffEntry> {
    let system_key = policy.os_system_id().to_string();

    for entry in &mut entries {
        entry.percent_of_total = percent_of(entry.consumed_power_delta_mah, total_power_mah);
        entry.is_policy_hidden =
            entry.is_policy_hidden || policy.is_hidden_by_default(&entry.identity_key);
    }

    entries.retain(|entry| {
        if entry.identity_key == system_key {
            return true;
        }
        if policy.is_hidden_always(&entry.identity_key) {
            return false;
        }
        entry.percent_of_total.round() >= config.min_percent_threshold
    });

    sort_entries(&mut entries);

    let max = config.max_displayed_entries.max(1);
    if entries.len() > max {
        let mut overflow = entries.split_off(max);
        // The system bucket survives capping; the lowest-ranked kept
        // entry takes its place in the overflow.
        if let Some(pos) = overflow
            .iter()
            .position(|entry| entry.identity_key == system_key)
        {
            let system_entry = overflow.remove(pos);
            if let Some(evicted) = entries.pop() {
                overflow.push(evicted);
            }
            entries.push(system_entry);
        }
    }

    let attributed: f64 = entries.iter().map(|e| e.consumed_power_delta_mah).sum();
    let mut remainder = total_power_mah - attributed;
    if remainder > 0.0 {
        let has_system = entries.iter().any(|e| e.identity_key == system_key);
        if !has_system {
            if entries.len() >= max {
                if let Some(evicted) = entries.pop() {
                    remainder += evicted.consumed_power_delta_mah;
                }
            }
            let mut system_entry = DiffEntry::new(&system_key, ConsumerKind::App);
            system_entry.consumed_power_delta_mah = 0.0;
            entries.push(system_entry);
        }
        if let Some(system_entry) = entries.iter_mut().find(|e| e.identity_key == system_key) {
            system_entry.consumed_power_delta_mah += remainder;
            system_entry.percent_of_total =
                percent_of(system_entry.consumed_power_delta_mah, total_power_mah);
        }
        sort_entries(&mut entries);
    }

    entries
}
