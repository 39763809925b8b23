//! Core module - Configuration, errors, and the common data model

mod config;
mod error;
mod types;

pub use config::{Config, GeneralConfig, PolicyConfig, RankingConfig};
pub use error::{Error, Result};
pub use types::{
    BatteryLevelSeries, ConsumerKind, ConsumerRecord, DeviceReading, DeviceSnapshot, DiffEntry,
    LevelPoint, RawConsumerTuple, SampleBatch, SeriesScope, SlotIndex, SELECT_ALL_RAW,
};
