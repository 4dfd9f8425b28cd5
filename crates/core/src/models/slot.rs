//! Time slot model - the bookable unit of a provider's day

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A fixed-width time interval on a provider's day, e.g. "08:00-09:00".
///
/// Slots order by start time and serialize as their display form, which is
/// also the key the store uses for conflict detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeSlot {
    start: NaiveTime,
    end: NaiveTime,
}

impl TimeSlot {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, Error> {
        if end <= start {
            return Err(Error::Validation(format!(
                "slot end {} must be after start {}",
                end.format("%H:%M"),
                start.format("%H:%M")
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    pub fn width(&self) -> Duration {
        self.end - self.start
    }

    /// Concrete UTC window of this slot on the given calendar day.
    pub fn window_on(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.from_utc_datetime(&date.and_time(self.start)),
            Utc.from_utc_datetime(&date.and_time(self.end)),
        )
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.start.format("%H:%M"),
            self.end.format("%H:%M")
        )
    }
}

impl FromStr for TimeSlot {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| Error::Validation(format!("malformed time slot: {s}")))?;
        let parse = |part: &str| {
            NaiveTime::parse_from_str(part.trim(), "%H:%M")
                .map_err(|_| Error::Validation(format!("malformed time slot: {s}")))
        };
        Self::new(parse(start)?, parse(end)?)
    }
}

impl TryFrom<String> for TimeSlot {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Error> {
        s.parse()
    }
}

impl From<TimeSlot> for String {
    fn from(slot: TimeSlot) -> Self {
        slot.to_string()
    }
}

/// Sort a slot list ascending and drop duplicates.
pub fn normalize_slots(mut slots: Vec<TimeSlot>) -> Vec<TimeSlot> {
    slots.sort();
    slots.dedup();
    slots
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display_roundtrip() {
        let slot: TimeSlot = "08:00-09:00".parse().unwrap();
        assert_eq!(slot.to_string(), "08:00-09:00");
        assert_eq!(slot.width(), Duration::minutes(60));
    }

    #[test]
    fn test_rejects_malformed() {
        assert!("08:00".parse::<TimeSlot>().is_err());
        assert!("8am-9am".parse::<TimeSlot>().is_err());
        assert!("09:00-08:00".parse::<TimeSlot>().is_err());
        assert!("09:00-09:00".parse::<TimeSlot>().is_err());
    }

    #[test]
    fn test_orders_by_start() {
        let early: TimeSlot = "08:00-09:00".parse().unwrap();
        let late: TimeSlot = "10:00-11:00".parse().unwrap();
        assert!(early < late);
    }

    #[test]
    fn test_window_on_date() {
        let slot: TimeSlot = "08:00-09:00".parse().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let (start, end) = slot.window_on(date);
        assert_eq!(start.to_rfc3339(), "2024-06-01T08:00:00+00:00");
        assert_eq!(end - start, Duration::minutes(60));
    }

    #[test]
    fn test_normalize_sorts_and_dedups() {
        let slots = vec![
            "10:00-11:00".parse().unwrap(),
            "08:00-09:00".parse().unwrap(),
            "10:00-11:00".parse().unwrap(),
        ];
        let normalized = normalize_slots(slots);
        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized[0].to_string(), "08:00-09:00");
    }
}
