//! Occurrence expansion for compiled recurrence rules.
//!
//! Expands a canonical rule string into concrete, ordered occurrences within
//! a date window. Bounded series get an inclusive window and a hard safety
//! cap; continuous series are expanded over a rolling window around "now",
//! which is supplied by an injectable clock so tests can pin it.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rrule::{RRuleSet, Tz as RRuleTz};

use crate::models::Occurrence;

/// Source of "now" for continuous-series windows.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time. The default for production callers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A frozen clock, for deterministic expansion in tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Caps and window spans for expansion.
#[derive(Debug, Clone)]
pub struct ExpansionConfig {
    /// Hard limit for bounded (non-continuous) expansion.
    pub max_bounded: u16,
    /// Limit for continuous expansion over the rolling window.
    pub max_unbounded: u16,
    /// Rolling window reaches this far behind "now" (days).
    pub lookback_days: i64,
    /// Rolling window reaches this far past "now" (days).
    pub lookahead_days: i64,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            max_bounded: 365,
            max_unbounded: 200,
            lookback_days: 365,
            lookahead_days: 730,
        }
    }
}

/// Result of an expansion. A malformed rule yields an empty occurrence list
/// with `diagnostic` set, never an error: downstream budget and consistency
/// checks must be able to proceed with zero occurrences.
#[derive(Debug, Clone, Default)]
pub struct Expansion {
    pub occurrences: Vec<Occurrence>,
    pub diagnostic: Option<String>,
}

impl Expansion {
    /// True when the rule failed to parse and the empty list is a fallback.
    pub fn is_degraded(&self) -> bool {
        self.diagnostic.is_some()
    }

    fn from_dates(dates: Vec<DateTime<RRuleTz>>) -> Self {
        let occurrences = dates
            .into_iter()
            .enumerate()
            .map(|(i, dt)| Occurrence {
                sequence_number: i + 1,
                date: dt.with_timezone(&Utc),
            })
            .collect();
        Self {
            occurrences,
            diagnostic: None,
        }
    }

    fn degraded(diagnostic: String) -> Self {
        Self {
            occurrences: Vec::new(),
            diagnostic: Some(diagnostic),
        }
    }
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0).unwrap().and_utc()
}

fn day_end(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(23, 59, 59).unwrap().and_utc()
}

/// Expands rule strings into occurrence sequences.
///
/// Expansion is a pure function of (rule, window, cap) apart from the
/// documented "now"-relative window used for continuous series.
#[derive(Debug)]
pub struct OccurrenceExpander<C: Clock = SystemClock> {
    config: ExpansionConfig,
    clock: C,
}

impl OccurrenceExpander<SystemClock> {
    pub fn with_defaults() -> Self {
        Self::new(ExpansionConfig::default(), SystemClock)
    }
}

impl<C: Clock> OccurrenceExpander<C> {
    pub fn new(config: ExpansionConfig, clock: C) -> Self {
        Self { config, clock }
    }

    pub fn config(&self) -> &ExpansionConfig {
        &self.config
    }

    /// Expands `rule` within the window.
    ///
    /// With `window_end` supplied, returns every occurrence in the inclusive
    /// window `[window_start, window_end]` in ascending order, capped at
    /// `max_occurrences` (default [`ExpansionConfig::max_bounded`]).
    ///
    /// Without `window_end` the series is continuous: occurrences come from
    /// the rolling window `max(window_start, now − lookback) ..= now +
    /// lookahead`, capped at `max_occurrences` (default
    /// [`ExpansionConfig::max_unbounded`]). If that window is empty — a very
    /// sparse rule whose next hit lies further out — the first
    /// `max_occurrences` occurrences from `window_start` are returned
    /// instead.
    pub fn expand(
        &self,
        rule: &str,
        window_start: NaiveDate,
        window_end: Option<NaiveDate>,
        max_occurrences: Option<u16>,
    ) -> Expansion {
        let rrule_set = match parse_rule_set(rule, window_start) {
            Ok(set) => set,
            Err(diagnostic) => {
                tracing::warn!(
                    rule,
                    error = %diagnostic,
                    "recurrence rule failed to parse; expanding to empty sequence"
                );
                return Expansion::degraded(diagnostic);
            }
        };

        match window_end {
            Some(end) => self.expand_bounded(
                &rrule_set,
                window_start,
                end,
                max_occurrences.unwrap_or(self.config.max_bounded),
            ),
            None => self.expand_continuous(
                &rrule_set,
                window_start,
                max_occurrences.unwrap_or(self.config.max_unbounded),
            ),
        }
    }

    fn expand_bounded(
        &self,
        rrule_set: &RRuleSet,
        start: NaiveDate,
        end: NaiveDate,
        cap: u16,
    ) -> Expansion {
        // after/before are exclusive; pad by a second so midnight occurrences
        // on the window edges are included.
        let after = (day_start(start) - Duration::seconds(1)).with_timezone(&RRuleTz::UTC);
        let before = (day_end(end) + Duration::seconds(1)).with_timezone(&RRuleTz::UTC);

        let (dates, limited) = rrule_set.clone().after(after).before(before).all(cap);
        if limited {
            tracing::debug!(cap, "bounded expansion truncated at safety cap");
        }
        Expansion::from_dates(dates)
    }

    fn expand_continuous(&self, rrule_set: &RRuleSet, start: NaiveDate, cap: u16) -> Expansion {
        let now = self.clock.now();
        let lower = day_start(start).max(now - Duration::days(self.config.lookback_days));
        let upper = now + Duration::days(self.config.lookahead_days);

        let after = (lower - Duration::seconds(1)).with_timezone(&RRuleTz::UTC);
        let before = (upper + Duration::seconds(1)).with_timezone(&RRuleTz::UTC);

        let (dates, _) = rrule_set.clone().after(after).before(before).all(cap);
        if !dates.is_empty() {
            return Expansion::from_dates(dates);
        }

        // Sparse series whose next hit lies beyond the rolling window: take
        // the first occurrences from the series start instead.
        let fallback_after =
            (day_start(start) - Duration::seconds(1)).with_timezone(&RRuleTz::UTC);
        let (dates, _) = rrule_set.clone().after(fallback_after).all(cap);
        Expansion::from_dates(dates)
    }
}

fn parse_rule_set(rule: &str, anchor: NaiveDate) -> Result<RRuleSet, String> {
    let input = if rule.contains("DTSTART") {
        rule.to_string()
    } else {
        format!(
            "DTSTART:{}T000000Z\nRRULE:{}",
            anchor.format("%Y%m%d"),
            rule.trim().trim_start_matches("RRULE:")
        )
    };
    input.parse::<RRuleSet>().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn fixed_expander(y: i32, m: u32, d: u32) -> OccurrenceExpander<FixedClock> {
        let now = Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap();
        OccurrenceExpander::new(ExpansionConfig::default(), FixedClock(now))
    }

    #[test]
    fn test_weekly_bounded_window() {
        let expander = OccurrenceExpander::with_defaults();
        let result = expander.expand(
            "FREQ=WEEKLY;INTERVAL=1;BYDAY=MO",
            date(2025, 1, 6),
            Some(date(2025, 2, 3)),
            None,
        );
        let days: Vec<NaiveDate> = result
            .occurrences
            .iter()
            .map(|o| o.date.date_naive())
            .collect();
        assert_eq!(
            days,
            vec![
                date(2025, 1, 6),
                date(2025, 1, 13),
                date(2025, 1, 20),
                date(2025, 1, 27),
                date(2025, 2, 3),
            ]
        );
        assert_eq!(result.occurrences[0].sequence_number, 1);
        assert_eq!(result.occurrences[4].sequence_number, 5);
    }

    #[test]
    fn test_monthly_last_friday() {
        let expander = OccurrenceExpander::with_defaults();
        let result = expander.expand(
            "FREQ=MONTHLY;INTERVAL=1;BYDAY=-1FR",
            date(2025, 1, 1),
            Some(date(2025, 3, 31)),
            None,
        );
        let days: Vec<NaiveDate> = result
            .occurrences
            .iter()
            .map(|o| o.date.date_naive())
            .collect();
        assert_eq!(
            days,
            vec![date(2025, 1, 31), date(2025, 2, 28), date(2025, 3, 28)]
        );
    }

    #[test]
    fn test_monthly_day_31_skips_short_months() {
        let expander = OccurrenceExpander::with_defaults();
        let result = expander.expand(
            "FREQ=MONTHLY;INTERVAL=1;BYMONTHDAY=31",
            date(2025, 1, 1),
            Some(date(2025, 4, 30)),
            None,
        );
        let days: Vec<NaiveDate> = result
            .occurrences
            .iter()
            .map(|o| o.date.date_naive())
            .collect();
        // February and April lack a 31st and are skipped, not clamped.
        assert_eq!(days, vec![date(2025, 1, 31), date(2025, 3, 31)]);
    }

    #[test]
    fn test_continuous_daily_capped() {
        let expander = fixed_expander(2025, 6, 1);
        let start = date(2025, 6, 1);
        let result = expander.expand("FREQ=DAILY;INTERVAL=1", start, None, Some(10));
        assert_eq!(result.occurrences.len(), 10);
        assert!(result
            .occurrences
            .iter()
            .all(|o| o.date.date_naive() >= start));
    }

    #[test]
    fn test_continuous_sparse_falls_back_to_series_start() {
        // Next hit is years past the rolling window's lookahead.
        let expander = fixed_expander(2025, 6, 1);
        let result = expander.expand("FREQ=YEARLY;INTERVAL=10", date(2030, 1, 1), None, Some(3));
        assert_eq!(result.occurrences.len(), 3);
        assert_eq!(
            result.occurrences[0].date.date_naive(),
            date(2030, 1, 1)
        );
        assert!(result.diagnostic.is_none());
    }

    #[test]
    fn test_malformed_rule_degrades_to_empty() {
        let expander = OccurrenceExpander::with_defaults();
        let result = expander.expand("FREQ=SOMETIMES", date(2025, 1, 1), Some(date(2025, 2, 1)), None);
        assert!(result.occurrences.is_empty());
        assert!(result.is_degraded());
    }

    #[test]
    fn test_bounded_cap_respected() {
        let expander = OccurrenceExpander::with_defaults();
        // Daily over four years would be ~1460 occurrences without the cap.
        let result = expander.expand(
            "FREQ=DAILY;INTERVAL=1",
            date(2025, 1, 1),
            Some(date(2028, 12, 31)),
            None,
        );
        assert_eq!(result.occurrences.len(), 365);
    }

    #[test]
    fn test_until_inside_rule_bounds_expansion() {
        let expander = OccurrenceExpander::with_defaults();
        let result = expander.expand(
            "FREQ=DAILY;INTERVAL=1;UNTIL=20250105T235959Z",
            date(2025, 1, 1),
            Some(date(2025, 12, 31)),
            None,
        );
        assert_eq!(result.occurrences.len(), 5);
    }

    proptest! {
        #[test]
        fn prop_expansion_is_strictly_ascending_and_capped(
            interval in 1u32..=14,
            span_days in 1i64..=400,
            cap in 1u16..=50,
        ) {
            let expander = OccurrenceExpander::with_defaults();
            let start = date(2025, 1, 1);
            let end = start + Duration::days(span_days);
            let rule = format!("FREQ=DAILY;INTERVAL={}", interval);
            let result = expander.expand(&rule, start, Some(end), Some(cap));

            prop_assert!(result.occurrences.len() <= cap as usize);
            for pair in result.occurrences.windows(2) {
                prop_assert!(pair[0].date < pair[1].date);
            }
            for (i, occurrence) in result.occurrences.iter().enumerate() {
                prop_assert_eq!(occurrence.sequence_number, i + 1);
            }
        }
    }
}
