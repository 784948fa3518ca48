//! Canonical recurrence-rule compilation and parsing.
//!
//! Compiles a [`RecurrencePattern`] into an RFC 5545 rule string
//! (`FREQ=...;INTERVAL=...;BYDAY=...;UNTIL=...`) and parses the canonical
//! shape back into a pattern at the storage boundary. The string form is
//! portable to any compliant recurrence library and human-inspectable in
//! storage.

use chrono::NaiveDate;
use rrule::RRuleSet;

use crate::error::CoreError;
use crate::models::{Boundary, Frequency, MonthlyMode, RecurrencePattern, WeekOfMonth};

/// BYDAY codes indexed by day-of-week (0=Sunday .. 6=Saturday).
const DAY_CODES: [&str; 7] = ["SU", "MO", "TU", "WE", "TH", "FR", "SA"];

fn day_code(day_of_week: u8) -> Result<&'static str, CoreError> {
    DAY_CODES
        .get(day_of_week as usize)
        .copied()
        .ok_or_else(|| CoreError::InvalidPattern(format!("day of week out of range: {}", day_of_week)))
}

fn code_to_day(code: &str) -> Option<u8> {
    DAY_CODES.iter().position(|c| *c == code).map(|i| i as u8)
}

/// Inclusive upper bound: end of the bound date in UTC, so an occurrence on
/// the bound date itself is still produced.
fn format_until(date: NaiveDate) -> String {
    format!("{}T235959Z", date.format("%Y%m%d"))
}

fn has_upper_bound(rule: &str) -> bool {
    let upper = rule.to_ascii_uppercase();
    upper.contains("UNTIL=") || upper.contains("COUNT=")
}

/// Checks that a rule body parses when anchored at the given date.
fn parses_at(rule: &str, anchor: NaiveDate) -> bool {
    let input = format!(
        "DTSTART:{}T000000Z\nRRULE:{}",
        anchor.format("%Y%m%d"),
        rule.trim_start_matches("RRULE:")
    );
    input.parse::<RRuleSet>().is_ok()
}

/// Compiles a pattern into its canonical rule string.
///
/// When `continuous` is true no upper bound is encoded, even if the pattern's
/// own boundary or a stale cached rule carries one; recompiling a continuous
/// series always strips the bound. When `continuous` is false, `bound` (if
/// supplied) takes precedence over the pattern's boundary and is encoded as
/// an inclusive UNTIL.
///
/// If the pattern carries a cached `explicit_rule` that still parses and
/// whose boundedness matches what `continuous`/`bound` imply, it is returned
/// unchanged instead of being regenerated.
pub fn compile(
    pattern: &RecurrencePattern,
    anchor: NaiveDate,
    bound: Option<NaiveDate>,
    continuous: bool,
) -> Result<String, CoreError> {
    pattern.validate()?;
    if let Some(bound) = bound {
        if bound < anchor {
            return Err(CoreError::InvalidPattern(format!(
                "bound date {} precedes anchor date {}",
                bound, anchor
            )));
        }
    }
    if let Boundary::Until { date } = pattern.boundary {
        if date < anchor {
            return Err(CoreError::InvalidPattern(format!(
                "end date {} precedes anchor date {}",
                date, anchor
            )));
        }
    }

    let wants_bound = !continuous
        && (bound.is_some() || !matches!(pattern.boundary, Boundary::Unbounded));
    if let Some(cached) = &pattern.explicit_rule {
        if parses_at(cached, anchor) && has_upper_bound(cached) == wants_bound {
            return Ok(cached.clone());
        }
    }

    let mut parts = vec![
        format!("FREQ={}", pattern.frequency),
        format!("INTERVAL={}", pattern.interval),
    ];
    match pattern.frequency {
        Frequency::Weekly => {
            if let Some(day) = pattern.weekly_day_of_week {
                parts.push(format!("BYDAY={}", day_code(day)?));
            }
        }
        Frequency::Monthly => match &pattern.monthly_mode {
            Some(MonthlyMode::FixedDate { day_of_month }) => {
                parts.push(format!("BYMONTHDAY={}", day_of_month));
            }
            Some(MonthlyMode::NthWeekday {
                week_of_month,
                day_of_week,
            }) => {
                parts.push(format!(
                    "BYDAY={}{}",
                    week_of_month.ordinal(),
                    day_code(*day_of_week)?
                ));
            }
            // validate() already rejected this
            None => {
                return Err(CoreError::InvalidPattern(
                    "monthly pattern requires a monthly mode".to_string(),
                ));
            }
        },
        Frequency::Daily | Frequency::Yearly => {}
    }

    if !continuous {
        if let Some(bound) = bound {
            parts.push(format!("UNTIL={}", format_until(bound)));
        } else {
            match pattern.boundary {
                Boundary::Until { date } => parts.push(format!("UNTIL={}", format_until(date))),
                Boundary::Count { count } => parts.push(format!("COUNT={}", count)),
                Boundary::Unbounded => {}
            }
        }
    }

    let rule = parts.join(";");
    if !parses_at(&rule, anchor) {
        return Err(CoreError::InvalidPattern(format!(
            "compiled rule does not parse: {}",
            rule
        )));
    }
    Ok(rule)
}

fn parse_byday(value: &str) -> Result<(Option<i8>, u8), CoreError> {
    if value.contains(',') {
        return Err(CoreError::MalformedRule(format!(
            "multiple BYDAY entries are not supported: {}",
            value
        )));
    }
    let value = value.trim();
    if !value.is_ascii() {
        return Err(CoreError::MalformedRule(format!(
            "unknown BYDAY value: {}",
            value
        )));
    }
    let split = value.len().saturating_sub(2);
    let (ordinal_part, code) = value.split_at(split);
    let day = code_to_day(code)
        .ok_or_else(|| CoreError::MalformedRule(format!("unknown BYDAY value: {}", value)))?;
    if ordinal_part.is_empty() {
        return Ok((None, day));
    }
    let ordinal: i8 = ordinal_part
        .trim_start_matches('+')
        .parse()
        .map_err(|_| CoreError::MalformedRule(format!("invalid BYDAY ordinal: {}", value)))?;
    Ok((Some(ordinal), day))
}

fn parse_until(value: &str) -> Result<NaiveDate, CoreError> {
    let date_part = value.get(..8).ok_or_else(|| {
        CoreError::MalformedRule(format!("invalid UNTIL value: {}", value))
    })?;
    NaiveDate::parse_from_str(date_part, "%Y%m%d")
        .map_err(|_| CoreError::MalformedRule(format!("invalid UNTIL value: {}", value)))
}

/// Parses a canonical rule string back into a [`RecurrencePattern`].
///
/// Accepts the rule body with or without a leading `RRULE:` marker. Unknown
/// parts (e.g. `WKST`) are tolerated and ignored; the parsed pattern keeps
/// the original body as its `explicit_rule` cache.
pub fn parse(rule: &str) -> Result<RecurrencePattern, CoreError> {
    let body = rule.trim().trim_start_matches("RRULE:");
    if body.is_empty() {
        return Err(CoreError::MalformedRule("empty rule".to_string()));
    }

    let mut frequency = None;
    let mut interval: u32 = 1;
    let mut byday = None;
    let mut bymonthday = None;
    let mut until = None;
    let mut count = None;

    for part in body.split(';') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| CoreError::MalformedRule(format!("expected KEY=VALUE, got: {}", part)))?;
        match key.to_ascii_uppercase().as_str() {
            "FREQ" => {
                frequency = Some(
                    value
                        .parse::<Frequency>()
                        .map_err(|e| CoreError::MalformedRule(e.to_string()))?,
                );
            }
            "INTERVAL" => {
                interval = value
                    .parse()
                    .map_err(|_| CoreError::MalformedRule(format!("invalid INTERVAL: {}", value)))?;
            }
            "BYDAY" => byday = Some(parse_byday(value)?),
            "BYMONTHDAY" => {
                bymonthday = Some(value.parse::<u32>().map_err(|_| {
                    CoreError::MalformedRule(format!("invalid BYMONTHDAY: {}", value))
                })?);
            }
            "UNTIL" => until = Some(parse_until(value)?),
            "COUNT" => {
                count = Some(value.parse::<u32>().map_err(|_| {
                    CoreError::MalformedRule(format!("invalid COUNT: {}", value))
                })?);
            }
            _ => {}
        }
    }

    let frequency =
        frequency.ok_or_else(|| CoreError::MalformedRule("missing FREQ".to_string()))?;

    let mut weekly_day_of_week = None;
    let mut monthly_mode = None;
    match frequency {
        Frequency::Weekly => {
            if let Some((_, day)) = byday {
                weekly_day_of_week = Some(day);
            }
        }
        Frequency::Monthly => {
            if let Some(day_of_month) = bymonthday {
                monthly_mode = Some(MonthlyMode::FixedDate { day_of_month });
            } else if let Some((ordinal, day_of_week)) = byday {
                let ordinal = ordinal.ok_or_else(|| {
                    CoreError::MalformedRule(
                        "monthly BYDAY requires a week ordinal".to_string(),
                    )
                })?;
                let week_of_month = WeekOfMonth::from_ordinal(ordinal).ok_or_else(|| {
                    CoreError::MalformedRule(format!("unsupported BYDAY ordinal: {}", ordinal))
                })?;
                monthly_mode = Some(MonthlyMode::NthWeekday {
                    week_of_month,
                    day_of_week,
                });
            } else {
                return Err(CoreError::MalformedRule(
                    "monthly rule requires BYMONTHDAY or an ordinal BYDAY".to_string(),
                ));
            }
        }
        Frequency::Daily | Frequency::Yearly => {}
    }

    let boundary = match (until, count) {
        (Some(date), _) => Boundary::Until { date },
        (None, Some(count)) => Boundary::Count { count },
        (None, None) => Boundary::Unbounded,
    };

    let pattern = RecurrencePattern {
        frequency,
        interval,
        weekly_day_of_week,
        monthly_mode,
        explicit_rule: Some(body.to_string()),
        boundary,
    };
    pattern.validate()?;
    Ok(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 6).unwrap()
    }

    #[test]
    fn test_compile_weekly_fixed_day() {
        let pattern = RecurrencePattern {
            frequency: Frequency::Weekly,
            interval: 1,
            weekly_day_of_week: Some(1),
            ..Default::default()
        };
        let rule = compile(&pattern, anchor(), None, true).unwrap();
        assert_eq!(rule, "FREQ=WEEKLY;INTERVAL=1;BYDAY=MO");
    }

    #[test]
    fn test_compile_monthly_fixed_date() {
        let pattern = RecurrencePattern {
            frequency: Frequency::Monthly,
            interval: 2,
            monthly_mode: Some(MonthlyMode::FixedDate { day_of_month: 15 }),
            ..Default::default()
        };
        let rule = compile(&pattern, anchor(), None, true).unwrap();
        assert_eq!(rule, "FREQ=MONTHLY;INTERVAL=2;BYMONTHDAY=15");
    }

    #[test]
    fn test_compile_monthly_last_friday() {
        let pattern = RecurrencePattern {
            frequency: Frequency::Monthly,
            interval: 1,
            monthly_mode: Some(MonthlyMode::NthWeekday {
                week_of_month: WeekOfMonth::Last,
                day_of_week: 5,
            }),
            ..Default::default()
        };
        let rule = compile(&pattern, anchor(), None, true).unwrap();
        assert_eq!(rule, "FREQ=MONTHLY;INTERVAL=1;BYDAY=-1FR");
    }

    #[test]
    fn test_compile_bound_date_encodes_inclusive_until() {
        let pattern = RecurrencePattern {
            frequency: Frequency::Daily,
            interval: 1,
            ..Default::default()
        };
        let bound = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
        let rule = compile(&pattern, anchor(), Some(bound), false).unwrap();
        assert_eq!(rule, "FREQ=DAILY;INTERVAL=1;UNTIL=20250201T235959Z");
    }

    #[test]
    fn test_compile_continuous_strips_stale_until() {
        // Cached rule carries a bound, but the series is now continuous:
        // the bound must be stripped, and a second compile must agree.
        let pattern = RecurrencePattern {
            frequency: Frequency::Weekly,
            interval: 1,
            weekly_day_of_week: Some(1),
            explicit_rule: Some("FREQ=WEEKLY;INTERVAL=1;BYDAY=MO;UNTIL=20250301T235959Z".to_string()),
            ..Default::default()
        };
        let first = compile(&pattern, anchor(), None, true).unwrap();
        let second = compile(&pattern, anchor(), None, true).unwrap();
        assert_eq!(first, "FREQ=WEEKLY;INTERVAL=1;BYDAY=MO");
        assert_eq!(first, second);
    }

    #[test]
    fn test_compile_reuses_matching_cached_rule() {
        let cached = "FREQ=WEEKLY;INTERVAL=1;BYDAY=MO".to_string();
        let pattern = RecurrencePattern {
            frequency: Frequency::Weekly,
            // Interval disagrees with the cache; the cache still wins because
            // it parses and its boundedness matches.
            interval: 2,
            weekly_day_of_week: Some(1),
            explicit_rule: Some(cached.clone()),
            ..Default::default()
        };
        let rule = compile(&pattern, anchor(), None, true).unwrap();
        assert_eq!(rule, cached);
    }

    #[test]
    fn test_compile_ignores_unparseable_cached_rule() {
        let pattern = RecurrencePattern {
            frequency: Frequency::Daily,
            interval: 1,
            explicit_rule: Some("NOT_A_RULE".to_string()),
            ..Default::default()
        };
        let rule = compile(&pattern, anchor(), None, true).unwrap();
        assert_eq!(rule, "FREQ=DAILY;INTERVAL=1");
    }

    #[test]
    fn test_compile_monthly_without_mode_fails() {
        let pattern = RecurrencePattern {
            frequency: Frequency::Monthly,
            interval: 1,
            ..Default::default()
        };
        assert!(matches!(
            compile(&pattern, anchor(), None, true),
            Err(CoreError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_compile_bound_before_anchor_fails() {
        let pattern = RecurrencePattern::default();
        let bound = NaiveDate::from_ymd_opt(2024, 12, 1).unwrap();
        assert!(compile(&pattern, anchor(), Some(bound), false).is_err());
    }

    #[test]
    fn test_compile_count_boundary() {
        let pattern = RecurrencePattern {
            frequency: Frequency::Daily,
            interval: 3,
            boundary: Boundary::Count { count: 5 },
            ..Default::default()
        };
        let rule = compile(&pattern, anchor(), None, false).unwrap();
        assert_eq!(rule, "FREQ=DAILY;INTERVAL=3;COUNT=5");
    }

    #[test]
    fn test_parse_round_trips_compiled_rule() {
        let pattern = RecurrencePattern {
            frequency: Frequency::Monthly,
            interval: 1,
            monthly_mode: Some(MonthlyMode::NthWeekday {
                week_of_month: WeekOfMonth::SecondLast,
                day_of_week: 2,
            }),
            ..Default::default()
        };
        let rule = compile(&pattern, anchor(), None, true).unwrap();
        let parsed = parse(&rule).unwrap();
        assert_eq!(parsed.frequency, Frequency::Monthly);
        assert_eq!(parsed.monthly_mode, pattern.monthly_mode);
        assert_eq!(parsed.explicit_rule.as_deref(), Some(rule.as_str()));
    }

    #[test]
    fn test_parse_until_boundary() {
        let parsed = parse("FREQ=DAILY;INTERVAL=1;UNTIL=20250601T235959Z").unwrap();
        assert_eq!(
            parsed.boundary,
            Boundary::Until {
                date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
            }
        );
    }

    #[test]
    fn test_parse_tolerates_rrule_prefix_and_unknown_keys() {
        let parsed = parse("RRULE:FREQ=WEEKLY;INTERVAL=1;BYDAY=FR;WKST=MO").unwrap();
        assert_eq!(parsed.frequency, Frequency::Weekly);
        assert_eq!(parsed.weekly_day_of_week, Some(5));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(parse("not a rule"), Err(CoreError::MalformedRule(_))));
        assert!(matches!(parse(""), Err(CoreError::MalformedRule(_))));
        assert!(matches!(
            parse("INTERVAL=2"),
            Err(CoreError::MalformedRule(_))
        ));
    }

    #[test]
    fn test_parse_monthly_byday_requires_ordinal() {
        assert!(matches!(
            parse("FREQ=MONTHLY;INTERVAL=1;BYDAY=MO"),
            Err(CoreError::MalformedRule(_))
        ));
    }
}
