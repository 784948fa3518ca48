//! Pattern detection for legacy series without an explicit rule.
//!
//! Reverse-engineers a [`RecurrencePattern`] from a sorted list of concrete
//! dates. Classification uses only the delta between the first two dates —
//! the lenient behavior legacy data was created under — and later deltas
//! only grade the confidence of the result, never reject it.

use chrono::{Datelike, NaiveDate};

use crate::models::{Frequency, RecurrencePattern};

/// How trustworthy a detected pattern is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    /// Single-date default, fallback classification, or inconsistent deltas.
    Low,
    /// First-pair classification that the rest of the series agrees with.
    High,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectedPattern {
    pub pattern: RecurrencePattern,
    pub confidence: Confidence,
}

/// Detects a recurrence pattern from ascending, distinct dates.
///
/// Returns `None` when no pattern can be found: the input is empty, or the
/// first two dates are not strictly ascending. A single date cannot pin an
/// interval and defaults to weekly/interval 1 on that date's weekday, with
/// low confidence.
pub fn detect(dates: &[NaiveDate]) -> Option<DetectedPattern> {
    let first = *dates.first()?;

    if dates.len() == 1 {
        return Some(DetectedPattern {
            pattern: RecurrencePattern::weekly_on(first, 1),
            confidence: Confidence::Low,
        });
    }

    let delta = (dates[1] - first).num_days();
    let (frequency, interval, confidence) = match delta {
        1 => (Frequency::Daily, 1, Confidence::High),
        7 => (Frequency::Weekly, 1, Confidence::High),
        d if d > 0 && d % 7 == 0 => (Frequency::Weekly, (d / 7) as u32, Confidence::High),
        28..=31 => (Frequency::Monthly, 1, Confidence::High),
        365..=366 => (Frequency::Yearly, 1, Confidence::High),
        // Best-effort fallback for irregular gaps.
        d if d > 0 => (Frequency::Daily, d as u32, Confidence::Low),
        _ => return None,
    };

    let confidence = if deltas_consistent(dates, delta) {
        confidence
    } else {
        Confidence::Low
    };

    let weekly_day_of_week = if frequency == Frequency::Weekly {
        Some(first.weekday().num_days_from_sunday() as u8)
    } else {
        None
    };

    Some(DetectedPattern {
        pattern: RecurrencePattern {
            frequency,
            interval,
            weekly_day_of_week,
            ..Default::default()
        },
        confidence,
    })
}

/// Do all later deltas fall in the same class as the first one? Monthly and
/// yearly deltas vary with month/leap length, so they compare as ranges.
fn deltas_consistent(dates: &[NaiveDate], reference: i64) -> bool {
    dates.windows(2).all(|pair| {
        let delta = (pair[1] - pair[0]).num_days();
        match reference {
            28..=31 => (28..=31).contains(&delta),
            365..=366 => (365..=366).contains(&delta),
            r => delta == r,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[rstest]
    #[case(1, Frequency::Daily, 1)]
    #[case(7, Frequency::Weekly, 1)]
    #[case(14, Frequency::Weekly, 2)]
    #[case(21, Frequency::Weekly, 3)]
    #[case(28, Frequency::Weekly, 4)] // multiple-of-7 wins over the monthly range
    #[case(30, Frequency::Monthly, 1)]
    #[case(31, Frequency::Monthly, 1)]
    #[case(365, Frequency::Yearly, 1)]
    #[case(366, Frequency::Yearly, 1)]
    #[case(11, Frequency::Daily, 11)] // fallback
    fn test_first_pair_classification(
        #[case] delta: i64,
        #[case] frequency: Frequency,
        #[case] interval: u32,
    ) {
        let first = date(2025, 3, 1);
        let second = first + chrono::Duration::days(delta);
        let detected = detect(&[first, second]).unwrap();
        assert_eq!(detected.pattern.frequency, frequency);
        assert_eq!(detected.pattern.interval, interval);
    }

    #[test]
    fn test_weekly_pair() {
        let detected = detect(&[date(2025, 3, 1), date(2025, 3, 8)]).unwrap();
        assert_eq!(detected.pattern.frequency, Frequency::Weekly);
        assert_eq!(detected.pattern.interval, 1);
        // 2025-03-01 is a Saturday
        assert_eq!(detected.pattern.weekly_day_of_week, Some(6));
        assert_eq!(detected.confidence, Confidence::High);
    }

    #[test]
    fn test_empty_input_finds_nothing() {
        assert_eq!(detect(&[]), None);
    }

    #[test]
    fn test_single_date_defaults_to_weekly_low_confidence() {
        let detected = detect(&[date(2025, 1, 6)]).unwrap();
        assert_eq!(detected.pattern.frequency, Frequency::Weekly);
        assert_eq!(detected.pattern.interval, 1);
        assert_eq!(detected.pattern.weekly_day_of_week, Some(1));
        assert_eq!(detected.confidence, Confidence::Low);
    }

    #[test]
    fn test_unsorted_pair_finds_nothing() {
        assert_eq!(detect(&[date(2025, 3, 8), date(2025, 3, 1)]), None);
    }

    #[test]
    fn test_inconsistent_series_keeps_pattern_but_lowers_confidence() {
        // First pair says weekly; the third date disagrees. The lenient
        // first-pair classification stands, flagged low-confidence.
        let detected = detect(&[date(2025, 3, 1), date(2025, 3, 8), date(2025, 3, 10)]).unwrap();
        assert_eq!(detected.pattern.frequency, Frequency::Weekly);
        assert_eq!(detected.confidence, Confidence::Low);
    }

    #[test]
    fn test_monthly_series_with_varying_month_lengths_stays_high_confidence() {
        let dates = [
            date(2025, 1, 31),
            date(2025, 2, 28),
            date(2025, 3, 31),
            date(2025, 4, 30),
        ];
        let detected = detect(&dates).unwrap();
        assert_eq!(detected.pattern.frequency, Frequency::Monthly);
        assert_eq!(detected.confidence, Confidence::High);
    }
}
