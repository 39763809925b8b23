//! Common types used across the application

use serde::{Deserialize, Serialize};

/// Consumer category. Closed set; every pipeline stage matches exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumerKind {
    /// An installed application, identified by uid.
    App,
    /// A system-level drain category (screen, idle, cellular, ...).
    System,
    /// A whole-user aggregate on multi-user devices.
    User,
}

impl ConsumerKind {
    /// Canonical identity key for a raw id of this kind.
    pub fn identity_key(&self, raw_id: i64) -> String {
        match self {
            ConsumerKind::App => raw_id.to_string(),
            ConsumerKind::System => format!("S|{}", raw_id),
            ConsumerKind::User => format!("U|{}", raw_id),
        }
    }

    /// Integer tag used in the database schema.
    pub fn to_db(&self) -> i64 {
        match self {
            ConsumerKind::App => 0,
            ConsumerKind::System => 1,
            ConsumerKind::User => 2,
        }
    }

    pub fn from_db(tag: i64) -> Option<Self> {
        match tag {
            0 => Some(ConsumerKind::App),
            1 => Some(ConsumerKind::System),
            2 => Some(ConsumerKind::User),
            _ => None,
        }
    }
}

/// One consumer's attribution as delivered by the sample source,
/// before identity coalescing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawConsumerTuple {
    pub raw_id: i64,
    pub kind: ConsumerKind,
    pub consumed_power_mah: f64,
    pub foreground_time_ms: i64,
    pub background_time_ms: i64,
    pub package_hint: Option<String>,
}

impl RawConsumerTuple {
    pub fn app(uid: i64, consumed_power_mah: f64) -> Self {
        Self {
            raw_id: uid,
            kind: ConsumerKind::App,
            consumed_power_mah,
            foreground_time_ms: 0,
            background_time_ms: 0,
            package_hint: None,
        }
    }

    pub fn system(drain_type: i64, consumed_power_mah: f64) -> Self {
        Self {
            raw_id: drain_type,
            kind: ConsumerKind::System,
            consumed_power_mah,
            foreground_time_ms: 0,
            background_time_ms: 0,
            package_hint: None,
        }
    }

    pub fn user(user_id: i64, consumed_power_mah: f64) -> Self {
        Self {
            raw_id: user_id,
            kind: ConsumerKind::User,
            consumed_power_mah,
            foreground_time_ms: 0,
            background_time_ms: 0,
            package_hint: None,
        }
    }

    pub fn with_times(mut self, foreground_ms: i64, background_ms: i64) -> Self {
        self.foreground_time_ms = foreground_ms;
        self.background_time_ms = background_ms;
        self
    }

    pub fn with_package(mut self, package: &str) -> Self {
        self.package_hint = Some(package.to_string());
        self
    }
}

/// One coalesced consumer inside a snapshot. Immutable once the snapshot
/// is sealed; the numeric fields accumulate only during coalescing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumerRecord {
    pub identity_key: String,
    pub raw_id: i64,
    pub kind: ConsumerKind,
    pub consumed_power_mah: f64,
    pub foreground_time_ms: i64,
    pub background_time_ms: i64,
    pub package_hint: Option<String>,
    /// Derived from policy when the record is coalesced.
    pub is_policy_hidden: bool,
}

impl ConsumerRecord {
    pub fn new(kind: ConsumerKind, raw_id: i64) -> Self {
        Self {
            identity_key: kind.identity_key(raw_id),
            raw_id,
            kind,
            consumed_power_mah: 0.0,
            foreground_time_ms: 0,
            background_time_ms: 0,
            package_hint: None,
            is_policy_hidden: false,
        }
    }

    /// Fold a raw tuple for the same identity into this record.
    pub fn absorb(&mut self, other: &RawConsumerTuple) {
        self.consumed_power_mah += other.consumed_power_mah;
        self.foreground_time_ms += other.foreground_time_ms;
        self.background_time_ms += other.background_time_ms;
        if self.package_hint.is_none() {
            self.package_hint = other.package_hint.clone();
        }
    }

    /// Fold another record for the same identity into this one.
    pub fn merge_from(&mut self, other: &ConsumerRecord) {
        self.consumed_power_mah += other.consumed_power_mah;
        self.foreground_time_ms += other.foreground_time_ms;
        self.background_time_ms += other.background_time_ms;
        if self.package_hint.is_none() {
            self.package_hint = other.package_hint.clone();
        }
        self.is_policy_hidden = self.is_policy_hidden || other.is_policy_hidden;
    }
}

/// Device-level fields of one sampling event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceReading {
    /// UTC epoch milliseconds of the sample.
    pub timestamp_ms: i64,
    /// IANA zone the device was in when the sample was taken.
    pub timezone_id: String,
    /// Battery level 0-100.
    pub battery_level_percent: u8,
    /// Device-reported cumulative attributed power since last stats reset.
    pub total_consumed_power_mah: f64,
    /// Percent of battery discharged since last stats reset.
    pub discharge_percent: i32,
}

impl DeviceReading {
    pub fn new(timestamp_ms: i64, timezone_id: &str, battery_level_percent: u8) -> Self {
        Self {
            timestamp_ms,
            timezone_id: timezone_id.to_string(),
            battery_level_percent,
            total_consumed_power_mah: 0.0,
            discharge_percent: 0,
        }
    }

    pub fn with_total_power(mut self, total_consumed_power_mah: f64) -> Self {
        self.total_consumed_power_mah = total_consumed_power_mah;
        self
    }

    pub fn with_discharge(mut self, discharge_percent: i32) -> Self {
        self.discharge_percent = discharge_percent;
        self
    }
}

/// One full sampling event as handed to ingestion: the device-level
/// reading plus the raw per-consumer attribution tuples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleBatch {
    pub device: DeviceReading,
    pub consumers: Vec<RawConsumerTuple>,
}

impl SampleBatch {
    pub fn new(device: DeviceReading, consumers: Vec<RawConsumerTuple>) -> Self {
        Self { device, consumers }
    }
}

/// One validated, coalesced device-wide sample. Never mutated after
/// construction; ordered strictly by `timestamp_ms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub timestamp_ms: i64,
    pub timezone_id: String,
    pub battery_level_percent: u8,
    pub total_consumed_power_mah: f64,
    pub discharge_percent: i32,
    /// Coalesced consumers; `identity_key` is unique across this list.
    pub consumers: Vec<ConsumerRecord>,
}

impl DeviceSnapshot {
    pub fn consumer(&self, identity_key: &str) -> Option<&ConsumerRecord> {
        self.consumers.iter().find(|c| c.identity_key == identity_key)
    }
}

/// Chart index: either the "everything" sentinel or one concrete slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotIndex {
    /// Aggregate across the whole retained window.
    All,
    /// One concrete day or hour-window position.
    At(usize),
}

/// Raw integer encoding of the `All` sentinel, used for persistence.
pub const SELECT_ALL_RAW: i64 = -1;

impl SlotIndex {
    pub fn is_all(&self) -> bool {
        matches!(self, SlotIndex::All)
    }

    /// Integer form for save/restore (-1 encodes `All`).
    pub fn to_raw(&self) -> i64 {
        match self {
            SlotIndex::All => SELECT_ALL_RAW,
            SlotIndex::At(i) => *i as i64,
        }
    }

    /// Decode the integer form; negative values other than -1 are invalid.
    pub fn from_raw(raw: i64) -> Option<Self> {
        if raw == SELECT_ALL_RAW {
            Some(SlotIndex::All)
        } else if raw >= 0 {
            Some(SlotIndex::At(raw as usize))
        } else {
            None
        }
    }
}

/// Which level series a caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesScope {
    /// One point per day boundary across the retained window.
    Daily,
    /// One point per 2-hour boundary within one day.
    Hourly,
}

/// Battery level at real snapshot boundaries, for the level chart.
/// Points are never interpolated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryLevelSeries {
    pub points: Vec<LevelPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelPoint {
    pub timestamp_ms: i64,
    pub level: u8,
}

impl BatteryLevelSeries {
    pub fn new(points: Vec<LevelPoint>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// One consumer's computed consumption across a slot's boundaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub identity_key: String,
    pub kind: ConsumerKind,
    pub consumed_power_delta_mah: f64,
    pub foreground_delta_ms: i64,
    pub background_delta_ms: i64,
    pub percent_of_total: f64,
    pub is_system_kind: bool,
    /// Shown only when the caller opts into the show-all view.
    pub is_policy_hidden: bool,
    pub label_hint: Option<String>,
}

impl DiffEntry {
    pub fn new(identity_key: &str, kind: ConsumerKind) -> Self {
        Self {
            identity_key: identity_key.to_string(),
            kind,
            consumed_power_delta_mah: 0.0,
            foreground_delta_ms: 0,
            background_delta_ms: 0,
            percent_of_total: 0.0,
            is_system_kind: matches!(kind, ConsumerKind::System),
            is_policy_hidden: false,
            label_hint: None,
        }
    }
}
