//! Day-of-week sets, time-of-day values and slot arithmetic used by agendas.
//!
//! Time-of-day values are wall-clock seconds past local midnight in the
//! agenda's IANA timezone. Instants are always persisted in UTC and only
//! projected into the agenda timezone when checking or listing slots.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize};

pub const SECONDS_PER_DAY: u32 = 86_400;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalendarError {
    #[error("invalid day {0}: expected a value between 0 and 6")]
    InvalidDay(i64),

    #[error("working days must not be empty")]
    EmptyWorkingDays,

    #[error("working day {0} is listed more than once")]
    DuplicateDay(u8),

    #[error("invalid time of day {0}: expected seconds between 0 and 86400")]
    InvalidTimeOfDay(i64),

    #[error("invalid interval {0}: expected seconds between 1 and 86400")]
    InvalidInterval(i64),

    #[error("opening time {opens_at} must be positive and before closing time {closed_at}")]
    InvalidWindow { opens_at: u32, closed_at: u32 },

    #[error("interval {interval} does not evenly divide the {span}s opening window")]
    UnevenInterval { interval: u32, span: u32 },

    #[error("unknown timezone {0:?}")]
    UnknownTimezone(String),
}

// ============================================================================
// Day of week
// ============================================================================

/// Day of week where 0 is Sunday and 6 is Saturday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "u8")]
pub struct Day(u8);

impl Day {
    pub fn of(date: NaiveDate) -> Self {
        Day(date.weekday().num_days_from_sunday() as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Day {
    type Error = CalendarError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if (0..=6).contains(&value) {
            Ok(Day(value as u8))
        } else {
            Err(CalendarError::InvalidDay(value))
        }
    }
}

impl From<Day> for u8 {
    fn from(day: Day) -> Self {
        day.0
    }
}

impl<'de> Deserialize<'de> for Day {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        Day::try_from(raw).map_err(serde::de::Error::custom)
    }
}

/// Non-empty set of working days. Equality is set equality, so the order the
/// days were supplied in never matters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkingDays(BTreeSet<Day>);

impl WorkingDays {
    pub fn contains(&self, day: Day) -> bool {
        self.0.contains(&day)
    }

    pub fn iter(&self) -> impl Iterator<Item = Day> + '_ {
        self.0.iter().copied()
    }

    /// JSON array form used by the `working_days` column.
    pub fn to_json(&self) -> String {
        let days: Vec<u8> = self.iter().map(Day::value).collect();
        serde_json::to_string(&days).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn from_json(raw: &str) -> Result<Self, CalendarError> {
        let days: Vec<i64> =
            serde_json::from_str(raw).map_err(|_| CalendarError::EmptyWorkingDays)?;
        WorkingDays::try_from(days)
    }
}

impl TryFrom<Vec<i64>> for WorkingDays {
    type Error = CalendarError;

    fn try_from(values: Vec<i64>) -> Result<Self, Self::Error> {
        if values.is_empty() {
            return Err(CalendarError::EmptyWorkingDays);
        }
        let mut days = BTreeSet::new();
        for value in values {
            let day = Day::try_from(value)?;
            if !days.insert(day) {
                return Err(CalendarError::DuplicateDay(day.value()));
            }
        }
        Ok(WorkingDays(days))
    }
}

impl<'de> Deserialize<'de> for WorkingDays {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Vec::<i64>::deserialize(deserializer)?;
        WorkingDays::try_from(raw).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Time of day and intervals
// ============================================================================

/// Seconds past local midnight, within `0..=86400`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "u32")]
pub struct TimeOfDay(u32);

impl TimeOfDay {
    pub fn seconds(self) -> u32 {
        self.0
    }
}

impl TryFrom<i64> for TimeOfDay {
    type Error = CalendarError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if (0..=SECONDS_PER_DAY as i64).contains(&value) {
            Ok(TimeOfDay(value as u32))
        } else {
            Err(CalendarError::InvalidTimeOfDay(value))
        }
    }
}

impl From<TimeOfDay> for u32 {
    fn from(tod: TimeOfDay) -> Self {
        tod.0
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        TimeOfDay::try_from(raw).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.0 / 3600, (self.0 / 60) % 60, self.0 % 60)
    }
}

/// Slot length in seconds, within `1..=86400`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "u32")]
pub struct Interval(u32);

impl Interval {
    pub fn seconds(self) -> u32 {
        self.0
    }
}

impl TryFrom<i64> for Interval {
    type Error = CalendarError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if (1..=SECONDS_PER_DAY as i64).contains(&value) {
            Ok(Interval(value as u32))
        } else {
            Err(CalendarError::InvalidInterval(value))
        }
    }
}

impl From<Interval> for u32 {
    fn from(interval: Interval) -> Self {
        interval.0
    }
}

impl<'de> Deserialize<'de> for Interval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        Interval::try_from(raw).map_err(serde::de::Error::custom)
    }
}

/// Opening window of a single day: slots start at `opens_at + k * interval`
/// and must be strictly before `closed_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    opens_at: TimeOfDay,
    closed_at: TimeOfDay,
    interval: Interval,
}

impl Window {
    pub fn new(
        opens_at: TimeOfDay,
        closed_at: TimeOfDay,
        interval: Interval,
    ) -> Result<Self, CalendarError> {
        if opens_at.0 == 0 || opens_at >= closed_at {
            return Err(CalendarError::InvalidWindow {
                opens_at: opens_at.0,
                closed_at: closed_at.0,
            });
        }
        let span = closed_at.0 - opens_at.0;
        if span % interval.0 != 0 {
            return Err(CalendarError::UnevenInterval {
                interval: interval.0,
                span,
            });
        }
        Ok(Window {
            opens_at,
            closed_at,
            interval,
        })
    }

    pub fn opens_at(&self) -> TimeOfDay {
        self.opens_at
    }

    pub fn closed_at(&self) -> TimeOfDay {
        self.closed_at
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    pub fn slot_count(&self) -> u32 {
        (self.closed_at.0 - self.opens_at.0) / self.interval.0
    }

    /// Start of slot `k`, or `None` once the slot would reach `closed_at`.
    pub fn slot(&self, k: u32) -> Option<TimeOfDay> {
        let start = self
            .opens_at
            .0
            .checked_add(k.checked_mul(self.interval.0)?)?;
        (start < self.closed_at.0).then_some(TimeOfDay(start))
    }

    pub fn slots(&self) -> impl Iterator<Item = TimeOfDay> + '_ {
        (0..self.slot_count()).filter_map(|k| self.slot(k))
    }

    /// Half-open `[opens_at, closed_at)` membership plus interval alignment.
    pub fn admits(&self, seconds: u32) -> bool {
        seconds >= self.opens_at.0
            && seconds < self.closed_at.0
            && (seconds - self.opens_at.0) % self.interval.0 == 0
    }
}

// ============================================================================
// Timezone projection
// ============================================================================

pub fn parse_timezone(name: &str) -> Result<Tz, CalendarError> {
    name.parse::<Tz>()
        .map_err(|_| CalendarError::UnknownTimezone(name.to_string()))
}

/// An instant seen from an agenda's timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalInstant {
    pub date: NaiveDate,
    pub seconds: u32,
    /// Non-zero when the instant is not on a whole second; such an instant
    /// never lands on a slot.
    pub nanos: u32,
}

impl LocalInstant {
    pub fn day(&self) -> Day {
        Day::of(self.date)
    }
}

pub fn project(instant: DateTime<Utc>, tz: Tz) -> LocalInstant {
    let local = instant.with_timezone(&tz).naive_local();
    LocalInstant {
        date: local.date(),
        seconds: local.time().num_seconds_from_midnight(),
        nanos: local.time().nanosecond(),
    }
}

/// UTC instant for a time of day on a local calendar date. Returns `None` when
/// the wall-clock time does not exist in `tz` (DST gap). Ambiguous wall-clock
/// times resolve to the earlier instant.
pub fn anchor(date: NaiveDate, tod: TimeOfDay, tz: Tz) -> Option<DateTime<Utc>> {
    let local = date.and_time(NaiveTime::MIN) + Duration::seconds(i64::from(tod.0));
    tz.from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}
