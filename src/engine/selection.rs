//! Day and hour selection state machine
//!
//! A persistent cursor over the published chart data. Day and hour are
//! selected together through `select`; picking a day always resets the
//! hour to the aggregate, and a concrete hour is only addressable under
//! a concrete day. The cursor round-trips through two integers for
//! process and view recreation.

use crate::core::{Error, Result, SlotIndex};
use crate::engine::partition::HOUR_WINDOWS_PER_DAY;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    day: SlotIndex,
    hour: SlotIndex,
}

impl Selection {
    pub fn new() -> Self {
        Self {
            day: SlotIndex::All,
            hour: SlotIndex::All,
        }
    }

    pub fn current(&self) -> (SlotIndex, SlotIndex) {
        (self.day, self.hour)
    }

    /// Move the cursor. Rejections leave the previous selection intact.
    pub fn select(&mut self, day: SlotIndex, hour: SlotIndex, day_count: usize) -> Result<()> {
        if let SlotIndex::At(d) = day {
            if d >= day_count {
                return Err(Error::InvalidSelection(format!(
                    "day {} out of range (have {})",
                    d, day_count
                )));
            }
        }
        if let SlotIndex::At(h) = hour {
            if day.is_all() {
                return Err(Error::InvalidSelection(
                    "hour selection requires a concrete day".to_string(),
                ));
            }
            if h >= HOUR_WINDOWS_PER_DAY {
                return Err(Error::InvalidSelection(format!(
                    "hour window {} out of range",
                    h
                )));
            }
        }
        self.day = day;
        self.hour = hour;
        Ok(())
    }

    /// Pick a day; the hour resets to the day aggregate.
    pub fn select_day(&mut self, day: SlotIndex, day_count: usize) -> Result<()> {
        self.select(day, SlotIndex::All, day_count)
    }

    /// Pick an hour window under the currently selected day.
    pub fn select_hour(&mut self, hour: SlotIndex, day_count: usize) -> Result<()> {
        self.select(self.day, hour, day_count)
    }

    /// Integer form of the cursor for persistence.
    pub fn save(&self) -> (i64, i64) {
        (self.day.to_raw(), self.hour.to_raw())
    }

    /// Rebuild the cursor from its integer form. Values that no longer
    /// address anything (the dataset may have shifted while the cursor
    /// was saved) fall back to the full aggregate rather than failing.
    pub fn restore(&mut self, raw_day: i64, raw_hour: i64, day_count: usize) {
        let decoded = match (SlotIndex::from_raw(raw_day), SlotIndex::from_raw(raw_hour)) {
            (Some(day), Some(hour)) => {
                let mut candidate = *self;
                match candidate.select(day, hour, day_count) {
                    Ok(()) => Some(candidate),
                    Err(_) => None,
                }
            }
            _ => None,
        };
        match decoded {
            Some(candidate) => *self = candidate,
            None => {
                log::warn!(
                    "saved selection ({}, {}) no longer valid, showing everything",
                    raw_day,
                    raw_hour
                );
                *self = Selection::new();
            }
        }
    }
}

impl Default for Selection {
    fn default() -> Self {
        Self::new()
    }
}
