use std::fmt;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use slack_morphism::prelude::SlackTs;

use crate::error::{AppError, Result};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const SECONDS_PER_DAY: i64 = 86_400;

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).map_err(|_| AppError::InvalidDate(s.to_string()))
}

pub fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Tomorrow, so that messages posted today are covered in any timezone.
pub fn default_end_date() -> NaiveDate {
    let today = Local::now().date_naive();
    today.succ_opt().unwrap_or(today)
}

/// A Slack message timestamp split into its ordering components.
///
/// Slack encodes timestamps as `"<seconds>.<microseconds>"` strings which also
/// act as message identifiers inside a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    seconds: i64,
    micros: u32,
}

impl Timestamp {
    pub fn new(seconds: i64, micros: u32) -> Self {
        Self {
            seconds,
            micros: micros.min(999_999),
        }
    }

    pub fn parse(ts: &str) -> Option<Self> {
        let (secs, frac) = match ts.split_once('.') {
            Some((secs, frac)) => (secs, frac),
            None => (ts, ""),
        };
        let seconds = secs.parse::<i64>().ok()?;
        if !frac.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let mut digits: String = frac.chars().take(6).collect();
        while digits.len() < 6 {
            digits.push('0');
        }
        let micros = digits.parse::<u32>().ok()?;
        Some(Self { seconds, micros })
    }

    pub fn from_slack_ts(ts: &SlackTs) -> Option<Self> {
        Self::parse(&ts.0)
    }

    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    /// Formats the timestamp the way the Slack API expects `oldest`/`latest`.
    pub fn to_api_string(&self) -> String {
        format!("{}.{:06}", self.seconds, self.micros)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.seconds, self.micros)
    }
}

/// Timezone used to interpret date arguments and to print message times.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayZone {
    #[default]
    Local,
    Utc,
}

impl DisplayZone {
    fn start_of_day(self, date: NaiveDate) -> Option<i64> {
        let midnight: NaiveDateTime = date.and_hms_opt(0, 0, 0)?;
        match self {
            DisplayZone::Local => Local
                .from_local_datetime(&midnight)
                .earliest()
                .map(|dt| dt.timestamp()),
            DisplayZone::Utc => Some(Utc.from_utc_datetime(&midnight).timestamp()),
        }
    }

    pub fn format(self, ts: Timestamp) -> String {
        let Some(utc) = DateTime::<Utc>::from_timestamp(ts.seconds, 0) else {
            return ts.to_string();
        };
        match self {
            DisplayZone::Local => utc.with_timezone(&Local).format(DISPLAY_FORMAT).to_string(),
            DisplayZone::Utc => utc.format(DISPLAY_FORMAT).to_string(),
        }
    }
}

/// Inclusive window of message timestamps, from the first second of `start`
/// to the last microsecond of `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    oldest: Timestamp,
    latest: Timestamp,
}

impl DateRange {
    pub fn from_dates(start: NaiveDate, end: NaiveDate, zone: DisplayZone) -> Result<Self> {
        if start > end {
            return Err(AppError::InvalidDateRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        let oldest = zone
            .start_of_day(start)
            .ok_or_else(|| AppError::InvalidDate(start.to_string()))?;
        let next_day = end
            .succ_opt()
            .ok_or_else(|| AppError::InvalidDate(end.to_string()))?;
        let latest = zone
            .start_of_day(next_day)
            .map(|secs| secs - 1)
            .or_else(|| zone.start_of_day(end).map(|secs| secs + SECONDS_PER_DAY - 1))
            .ok_or_else(|| AppError::InvalidDate(end.to_string()))?;

        Ok(Self {
            oldest: Timestamp::new(oldest, 0),
            latest: Timestamp::new(latest, 999_999),
        })
    }

    pub fn oldest(&self) -> Timestamp {
        self.oldest
    }

    pub fn latest(&self) -> Timestamp {
        self.latest
    }

    pub fn contains(&self, ts: Timestamp) -> bool {
        self.oldest <= ts && ts <= self.latest
    }
}
