//! Identity coalescing
//!
//! Collapses raw attribution tuples that represent the same logical
//! consumer before a snapshot is sealed: multi-process apps reporting
//! under synthetic shared-group uids fold into their owning app, and
//! the crowd of OS service uids folds into one system bucket.

use crate::core::{
    ConsumerKind, ConsumerRecord, DeviceSnapshot, Error, RawConsumerTuple, Result, SampleBatch,
};
use crate::policy::UsagePolicy;
use std::collections::{BTreeMap, HashSet};

/// Rewrite an app uid to its canonical owner.
///
/// Shared-group uids map back to the owning app id first; whatever id
/// remains inside the OS-reserved range is attributed to the canonical
/// system uid, unless the package hint names an always-separate service.
fn canonical_app_id(policy: &dyn UsagePolicy, raw_id: i64, package_hint: Option<&str>) -> i64 {
    let (gid_start, gid_end) = policy.shared_gid_range();
    let id = if raw_id >= gid_start && raw_id <= gid_end {
        raw_id - gid_start
    } else {
        raw_id
    };

    let (os_min, os_max) = policy.os_reserved_range();
    let exempt = package_hint
        .map(|hint| policy.is_excluded_service(hint))
        .unwrap_or(false);
    if id >= os_min && id <= os_max && !exempt {
        policy.os_system_id()
    } else {
        id
    }
}

/// Convert one raw tuple into a record under its canonical identity.
/// System and user identities pass through untouched; only app uids are
/// rewritten.
pub fn canonicalize(policy: &dyn UsagePolicy, tuple: &RawConsumerTuple) -> ConsumerRecord {
    let canonical_id = match tuple.kind {
        ConsumerKind::App => canonical_app_id(policy, tuple.raw_id, tuple.package_hint.as_deref()),
        ConsumerKind::System | ConsumerKind::User => tuple.raw_id,
    };
    let mut record = ConsumerRecord::new(tuple.kind, canonical_id);
    record.absorb(tuple);
    record.is_policy_hidden = policy.is_hidden_by_default(&record.identity_key);
    record
}

fn merge(records: Vec<ConsumerRecord>) -> Vec<ConsumerRecord> {
    let mut by_key: BTreeMap<String, ConsumerRecord> = BTreeMap::new();
    for record in records {
        match by_key.get_mut(&record.identity_key) {
            Some(existing) => existing.merge_from(&record),
            None => {
                by_key.insert(record.identity_key.clone(), record);
            }
        }
    }
    by_key.into_values().collect()
}

/// Coalesce a raw batch into records with unique identity keys,
/// ordered by key.
pub fn coalesce(policy: &dyn UsagePolicy, tuples: &[RawConsumerTuple]) -> Vec<ConsumerRecord> {
    merge(tuples.iter().map(|t| canonicalize(policy, t)).collect())
}

/// Re-run canonicalization over already-built records. For a coalesced
/// input this returns an identical list.
pub fn recoalesce(policy: &dyn UsagePolicy, records: &[ConsumerRecord]) -> Vec<ConsumerRecord> {
    let rewritten = records
        .iter()
        .map(|record| {
            let canonical_id = match record.kind {
                ConsumerKind::App => {
                    canonical_app_id(policy, record.raw_id, record.package_hint.as_deref())
                }
                ConsumerKind::System | ConsumerKind::User => record.raw_id,
            };
            let mut out = record.clone();
            out.raw_id = canonical_id;
            out.identity_key = record.kind.identity_key(canonical_id);
            out.is_policy_hidden =
                record.is_policy_hidden || policy.is_hidden_by_default(&out.identity_key);
            out
        })
        .collect();
    merge(rewritten)
}

/// Identity keys of a sealed snapshot must be unique. `coalesce` output
/// satisfies this by construction; the sealing path verifies it for any
/// record source.
fn verify_distinct_identities(records: &[ConsumerRecord]) -> Result<()> {
    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
        if !seen.insert(record.identity_key.as_str()) {
            return Err(Error::InvalidSample(format!(
                "duplicate identity key '{}'",
                record.identity_key
            )));
        }
    }
    Ok(())
}

/// Validate one sampling batch and seal it into a snapshot.
///
/// Rejects negative power or usage times anywhere in the batch, levels
/// above 100 and zone names chrono-tz cannot resolve. Sealed consumer
/// lists carry unique identity keys. Ordering against previously
/// accepted snapshots is enforced by the ingestion pipeline, not here.
pub fn assemble_snapshot(policy: &dyn UsagePolicy, batch: &SampleBatch) -> Result<DeviceSnapshot> {
    let device = &batch.device;

    if device.battery_level_percent > 100 {
        return Err(Error::InvalidSample(format!(
            "battery level {} out of range",
            device.battery_level_percent
        )));
    }
    if device.total_consumed_power_mah < 0.0 {
        return Err(Error::InvalidSample(format!(
            "negative device total power {}",
            device.total_consumed_power_mah
        )));
    }
    if device.timezone_id.parse::<chrono_tz::Tz>().is_err() {
        return Err(Error::InvalidSample(format!(
            "unknown timezone '{}'",
            device.timezone_id
        )));
    }
    for tuple in &batch.consumers {
        if tuple.consumed_power_mah < 0.0 {
            return Err(Error::InvalidSample(format!(
                "negative power {} for raw id {}",
                tuple.consumed_power_mah, tuple.raw_id
            )));
        }
        if tuple.foreground_time_ms < 0 || tuple.background_time_ms < 0 {
            return Err(Error::InvalidSample(format!(
                "negative usage time for raw id {}",
                tuple.raw_id
            )));
        }
    }

    let consumers = coalesce(policy, &batch.consumers);
    verify_distinct_identities(&consumers)?;

    Ok(DeviceSnapshot {
        timestamp_ms: device.timestamp_ms,
        timezone_id: device.timezone_id.clone(),
        battery_level_percent: device.battery_level_percent,
        total_consumed_power_mah: device.total_consumed_power_mah,
        discharge_percent: device.discharge_percent,
        consumers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DeviceReading, PolicyConfig};
    use crate::policy::StaticPolicy;

    fn policy() -> StaticPolicy {
        StaticPolicy::default()
    }

    #[test]
    fn test_shared_gid_folds_into_owner() {
        let tuples = vec![
            RawConsumerTuple::app(1042, 2.0),
            RawConsumerTuple::app(98042, 3.0),
        ];
        let records = coalesce(&policy(), &tuples);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].identity_key, "1042");
        assert_eq!(records[0].consumed_power_mah, 5.0);
    }

    #[test]
    fn test_os_range_collapses_to_system_bucket() {
        let tuples = vec![
            RawConsumerTuple::app(0, 1.0),
            RawConsumerTuple::app(500, 2.0).with_times(10, 20),
            RawConsumerTuple::app(1000, 3.0),
        ];
        let records = coalesce(&policy(), &tuples);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].identity_key, "1000");
        assert_eq!(records[0].consumed_power_mah, 6.0);
        assert_eq!(records[0].foreground_time_ms, 10);
    }

    #[test]
    fn test_excluded_service_stays_separate() {
        let tuples = vec![
            RawConsumerTuple::app(600, 1.5).with_package("mediaserver"),
            RawConsumerTuple::app(500, 2.0),
        ];
        let records = coalesce(&policy(), &tuples);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].identity_key, "1000");
        assert_eq!(records[1].identity_key, "600");
        assert_eq!(records[1].consumed_power_mah, 1.5);
    }

    #[test]
    fn test_system_and_user_kinds_pass_through() {
        let tuples = vec![
            RawConsumerTuple::system(3, 4.0),
            RawConsumerTuple {
                raw_id: 10,
                kind: ConsumerKind::User,
                consumed_power_mah: 1.0,
                foreground_time_ms: 0,
                background_time_ms: 0,
                package_hint: None,
            },
        ];
        let records = coalesce(&policy(), &tuples);

        let keys: Vec<&str> = records.iter().map(|r| r.identity_key.as_str()).collect();
        assert_eq!(keys, vec!["S|3", "U|10"]);
    }

    #[test]
    fn test_coalescing_is_idempotent() {
        let tuples = vec![
            RawConsumerTuple::app(98042, 3.0),
            RawConsumerTuple::app(1042, 2.0),
            RawConsumerTuple::app(77, 0.5),
            RawConsumerTuple::system(1, 9.0),
        ];
        let p = policy();
        let once = coalesce(&p, &tuples);
        let twice = recoalesce(&p, &once);

        assert_eq!(once, twice);
    }

    #[test]
    fn test_hidden_by_default_flag_comes_from_policy() {
        let config = PolicyConfig {
            hidden_by_default: vec!["1042".to_string()],
            ..PolicyConfig::default()
        };
        let p = StaticPolicy::new(&config);
        let records = coalesce(&p, &[RawConsumerTuple::app(98042, 1.0)]);

        assert_eq!(records[0].identity_key, "1042");
        assert!(records[0].is_policy_hidden);
    }

    #[test]
    fn test_duplicate_identities_are_rejected() {
        let records = vec![
            ConsumerRecord::new(ConsumerKind::App, 1042),
            ConsumerRecord::new(ConsumerKind::App, 1042),
        ];

        assert!(matches!(
            verify_distinct_identities(&records),
            Err(Error::InvalidSample(_))
        ));
        assert!(verify_distinct_identities(&records[..1]).is_ok());
    }

    #[test]
    fn test_assemble_rejects_negative_power() {
        let device = DeviceReading::new(1_000, "UTC", 80);
        let batch = SampleBatch::new(device, vec![RawConsumerTuple::app(1042, -1.0)]);

        assert!(matches!(
            assemble_snapshot(&policy(), &batch),
            Err(Error::InvalidSample(_))
        ));
    }

    #[test]
    fn test_assemble_rejects_unknown_zone() {
        let device = DeviceReading::new(1_000, "Mars/Olympus", 80);
        let batch = SampleBatch::new(device, vec![]);

        assert!(matches!(
            assemble_snapshot(&policy(), &batch),
            Err(Error::InvalidSample(_))
        ));
    }

    #[test]
    fn test_assemble_seals_coalesced_consumers() {
        let device = DeviceReading::new(1_000, "Europe/Paris", 80).with_total_power(10.0);
        let batch = SampleBatch::new(
            device,
            vec![
                RawConsumerTuple::app(98042, 3.0),
                RawConsumerTuple::app(1042, 2.0),
            ],
        );
        let snapshot = assemble_snapshot(&policy(), &batch).unwrap();

        assert_eq!(snapshot.consumers.len(), 1);
        assert_eq!(snapshot.consumers[0].identity_key, "1042");
        assert_eq!(snapshot.timezone_id, "Europe/Paris");
    }
}
