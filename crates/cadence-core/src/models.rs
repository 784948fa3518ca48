use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::error::CoreError;

/// Base unit of a recurrence pattern.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Frequency::Daily => write!(f, "DAILY"),
            Frequency::Weekly => write!(f, "WEEKLY"),
            Frequency::Monthly => write!(f, "MONTHLY"),
            Frequency::Yearly => write!(f, "YEARLY"),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid frequency: {0}")]
pub struct ParseFrequencyError(String);

impl FromStr for Frequency {
    type Err = ParseFrequencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            "yearly" => Ok(Frequency::Yearly),
            _ => Err(ParseFrequencyError(s.to_string())),
        }
    }
}

/// Which week of the month an `NthWeekday` pattern targets.
///
/// `SecondLast` and `Last` resolve against the actual last day of each
/// specific month, so "last Friday" lands correctly in 28- and 31-day months.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WeekOfMonth {
    First,
    Second,
    Third,
    Fourth,
    SecondLast,
    Last,
}

impl WeekOfMonth {
    /// BYDAY ordinal prefix: 1..4 from the front, -2/-1 from the back.
    pub fn ordinal(&self) -> i8 {
        match self {
            WeekOfMonth::First => 1,
            WeekOfMonth::Second => 2,
            WeekOfMonth::Third => 3,
            WeekOfMonth::Fourth => 4,
            WeekOfMonth::SecondLast => -2,
            WeekOfMonth::Last => -1,
        }
    }

    pub fn from_ordinal(ordinal: i8) -> Option<Self> {
        match ordinal {
            1 => Some(WeekOfMonth::First),
            2 => Some(WeekOfMonth::Second),
            3 => Some(WeekOfMonth::Third),
            4 => Some(WeekOfMonth::Fourth),
            -2 => Some(WeekOfMonth::SecondLast),
            -1 => Some(WeekOfMonth::Last),
            _ => None,
        }
    }
}

/// Refinement for monthly patterns.
///
/// `FixedDate` months shorter than `day_of_month` are skipped, not clamped:
/// a day-31 pattern simply produces no occurrence in February. This matches
/// RFC 5545 BYMONTHDAY semantics and is the deliberate policy here.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum MonthlyMode {
    FixedDate {
        /// 1-31
        day_of_month: u32,
    },
    NthWeekday {
        week_of_month: WeekOfMonth,
        /// 0=Sunday .. 6=Saturday
        day_of_week: u8,
    },
}

/// How (or whether) a series terminates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Boundary {
    /// Continuous series with no terminating date or count.
    #[default]
    Unbounded,
    /// Inclusive final date for the series.
    Until { date: NaiveDate },
    /// Fixed number of occurrences.
    Count { count: u32 },
}

/// Normalized description of a repeating schedule.
///
/// The structured fields are the source of truth for regeneration;
/// `explicit_rule` is a cache of the last compiled canonical form and is
/// reused by the compiler only when still consistent with the requested
/// boundedness.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecurrencePattern {
    pub frequency: Frequency,
    /// Repeat every N units of `frequency`. Must be >= 1.
    pub interval: u32,
    /// Fixed weekday for weekly patterns (0=Sunday .. 6=Saturday). When
    /// absent, weekly series follow the anchor date's weekday.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekly_day_of_week: Option<u8>,
    /// Required when `frequency` is monthly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_mode: Option<MonthlyMode>,
    /// Cached canonical rule string, if one was previously compiled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explicit_rule: Option<String>,
    #[serde(default)]
    pub boundary: Boundary,
}

impl Default for RecurrencePattern {
    fn default() -> Self {
        Self {
            frequency: Frequency::Daily,
            interval: 1,
            weekly_day_of_week: None,
            monthly_mode: None,
            explicit_rule: None,
            boundary: Boundary::Unbounded,
        }
    }
}

impl RecurrencePattern {
    /// Checks the structural invariants that must hold before compilation.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.interval < 1 {
            return Err(CoreError::InvalidPattern(
                "interval must be at least 1".to_string(),
            ));
        }
        if let Some(day) = self.weekly_day_of_week {
            if day > 6 {
                return Err(CoreError::InvalidPattern(format!(
                    "day of week out of range: {}",
                    day
                )));
            }
        }
        match (self.frequency, &self.monthly_mode) {
            (Frequency::Monthly, None) => {
                return Err(CoreError::InvalidPattern(
                    "monthly pattern requires a monthly mode".to_string(),
                ));
            }
            (Frequency::Monthly, Some(MonthlyMode::FixedDate { day_of_month })) => {
                if !(1..=31).contains(day_of_month) {
                    return Err(CoreError::InvalidPattern(format!(
                        "day of month out of range: {}",
                        day_of_month
                    )));
                }
            }
            (Frequency::Monthly, Some(MonthlyMode::NthWeekday { day_of_week, .. })) => {
                if *day_of_week > 6 {
                    return Err(CoreError::InvalidPattern(format!(
                        "day of week out of range: {}",
                        day_of_week
                    )));
                }
            }
            (_, Some(_)) => {
                return Err(CoreError::InvalidPattern(
                    "monthly mode is only valid for monthly patterns".to_string(),
                ));
            }
            (_, None) => {}
        }
        if let Boundary::Count { count } = self.boundary {
            if count == 0 {
                return Err(CoreError::InvalidPattern(
                    "occurrence count must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// A weekly pattern fixed on the given date's weekday.
    pub fn weekly_on(date: NaiveDate, interval: u32) -> Self {
        Self {
            frequency: Frequency::Weekly,
            interval,
            weekly_day_of_week: Some(date.weekday().num_days_from_sunday() as u8),
            ..Default::default()
        }
    }
}

/// One of the two shapes recurrence data is persisted in.
///
/// Older rows carry discrete fields; newer rows carry the canonical rule
/// string. Both resolve to the same internal [`RecurrencePattern`] at the
/// storage boundary so nothing downstream branches on which shape arrived.
/// Going forward the canonical string is always regenerated as the persisted
/// form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum StoredRecurrence {
    Legacy {
        frequency: Frequency,
        interval: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        day_of_week: Option<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        day_of_month: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end_date: Option<NaiveDate>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        count: Option<u32>,
    },
    Canonical { rule: String },
}

impl StoredRecurrence {
    /// Converts either stored shape into the internal pattern.
    pub fn resolve(&self) -> Result<RecurrencePattern, CoreError> {
        match self {
            StoredRecurrence::Legacy {
                frequency,
                interval,
                day_of_week,
                day_of_month,
                end_date,
                count,
            } => {
                let monthly_mode = match (frequency, day_of_month) {
                    (Frequency::Monthly, Some(day)) => {
                        Some(MonthlyMode::FixedDate { day_of_month: *day })
                    }
                    _ => None,
                };
                let boundary = match (end_date, count) {
                    (Some(date), _) => Boundary::Until { date: *date },
                    (None, Some(count)) => Boundary::Count { count: *count },
                    (None, None) => Boundary::Unbounded,
                };
                let pattern = RecurrencePattern {
                    frequency: *frequency,
                    interval: *interval,
                    weekly_day_of_week: if *frequency == Frequency::Weekly {
                        *day_of_week
                    } else {
                        None
                    },
                    monthly_mode,
                    explicit_rule: None,
                    boundary,
                };
                pattern.validate()?;
                Ok(pattern)
            }
            StoredRecurrence::Canonical { rule } => crate::rule::parse(rule),
        }
    }
}

/// One concrete dated instance generated by expanding a recurrence pattern.
///
/// Occurrences are derived on demand from a pattern and a window; the core
/// never persists them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Occurrence {
    /// 1-based position in the expanded series.
    pub sequence_number: usize,
    pub date: DateTime<Utc>,
}

/// A phase (or milestone) as seen by the consistency rules: a named slice of
/// the project with an hour allocation. A recurring template is a single
/// record standing in for an entire series; its `recurrence_rule` lets the
/// budget analyzers expand it themselves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhaseAllocation {
    pub id: Uuid,
    pub name: String,
    pub start_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    /// Fallback date used when `end_date` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    pub allocated_hours: f64,
    pub is_recurring_template: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence_rule: Option<String>,
}

impl PhaseAllocation {
    /// End date preferred, due date as fallback.
    pub fn effective_date(&self) -> Option<NaiveDate> {
        self.end_date.or(self.due_date)
    }

    pub fn duration_days(&self) -> Option<i64> {
        self.end_date.map(|end| (end - self.start_date).num_days())
    }
}

impl Default for PhaseAllocation {
    fn default() -> Self {
        Self {
            id: Uuid::now_v7(),
            name: String::new(),
            start_date: NaiveDate::default(),
            end_date: None,
            due_date: None,
            allocated_hours: 0.0,
            is_recurring_template: false,
            recurrence_rule: None,
        }
    }
}
