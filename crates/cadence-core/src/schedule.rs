//! Schedule consistency rules.
//!
//! Pure functions that validate and adjust a set of phases against a project
//! timeframe and budget. Business-rule outcomes come back as structured
//! results, never as errors; only API misuse (an unknown phase id) is an
//! error.

use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::CoreError;
use crate::expand::{Clock, OccurrenceExpander};
use crate::models::PhaseAllocation;

#[derive(Debug, Clone, Default)]
pub struct TimeframeValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Validates every phase's effective date against the project timeframe.
///
/// A continuous project has no meaningful end: the end-vs-start ordering and
/// the after-project-end checks are skipped for it.
pub fn validate_timeframe(
    project_start: NaiveDate,
    project_end: NaiveDate,
    phases: &[PhaseAllocation],
    continuous: bool,
) -> TimeframeValidation {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if !continuous && project_end <= project_start {
        errors.push("Project end date must be after the start date".to_string());
    }

    for phase in phases {
        match phase.effective_date() {
            Some(date) if date < project_start => {
                errors.push(format!(
                    "Phase '{}' ends on {}, before the project starts",
                    phase.name, date
                ));
            }
            Some(date) if !continuous && date > project_end => {
                errors.push(format!(
                    "Phase '{}' ends on {}, after the project ends",
                    phase.name, date
                ));
            }
            Some(_) => {}
            None => {
                warnings.push(format!("Phase '{}' has no end or due date", phase.name));
            }
        }
    }

    TimeframeValidation {
        is_valid: errors.is_empty(),
        errors,
        warnings,
    }
}

#[derive(Debug, Clone, Default)]
pub struct DateConflict {
    pub has_conflict: bool,
    pub message: Option<String>,
}

/// Reports whether the candidate date collides with an existing phase.
///
/// Conflict is exact calendar-date equality; time of day is ignored. Pass
/// `exclude` when updating a phase so it does not conflict with itself.
pub fn check_date_conflict(
    candidate: NaiveDate,
    phases: &[PhaseAllocation],
    exclude: Option<Uuid>,
) -> DateConflict {
    for phase in phases {
        if exclude == Some(phase.id) {
            continue;
        }
        if phase.effective_date() == Some(candidate) {
            return DateConflict {
                has_conflict: true,
                message: Some(format!(
                    "'{}' is already scheduled on {}",
                    phase.name, candidate
                )),
            };
        }
    }
    DateConflict::default()
}

/// Earliest legal end date for a phase.
///
/// A phase still carrying positive allocated hours cannot be scheduled
/// entirely in the past, so a past effective date is pulled up to today.
/// Phases without any date get today as their floor.
pub fn calculate_minimum_end_date(phase: &PhaseAllocation, today: NaiveDate) -> NaiveDate {
    match phase.effective_date() {
        Some(end) if phase.allocated_hours > 0.0 && end < today => today,
        Some(end) => end,
        None => today,
    }
}

#[derive(Debug, Clone)]
pub struct CascadeResult {
    /// All phases, in start-date order, with adjustments applied.
    pub phases: Vec<PhaseAllocation>,
    /// Set when the cascade pushed the last phase past the project end.
    pub extended_project_end: Option<NaiveDate>,
    pub warnings: Vec<String>,
}

/// Moves one phase's end date and pushes every later phase out of overlap.
///
/// Walks the series in start-date order from the adjusted phase forward.
/// Each subsequent phase is shifted only far enough that it starts no
/// earlier than its predecessor's end, with start, end and due dates all
/// moved by the same amount so the phase's duration is preserved. If the
/// cascade ends past `project_end`, the extended end is surfaced as a
/// warning rather than silently dropped.
pub fn cascade_adjustments(
    phases: &[PhaseAllocation],
    from_id: Uuid,
    new_end: NaiveDate,
    project_end: Option<NaiveDate>,
) -> Result<CascadeResult, CoreError> {
    let mut ordered: Vec<PhaseAllocation> = phases.to_vec();
    ordered.sort_by_key(|phase| phase.start_date);

    let index = ordered
        .iter()
        .position(|phase| phase.id == from_id)
        .ok_or_else(|| CoreError::InvalidInput(format!("unknown phase id: {}", from_id)))?;

    ordered[index].end_date = Some(new_end);

    let mut previous_end = new_end;
    for phase in ordered.iter_mut().skip(index + 1) {
        if phase.start_date < previous_end {
            let shift = previous_end - phase.start_date;
            phase.start_date += shift;
            if let Some(end) = phase.end_date {
                phase.end_date = Some(end + shift);
            }
            if let Some(due) = phase.due_date {
                phase.due_date = Some(due + shift);
            }
        }
        previous_end = phase.effective_date().unwrap_or(phase.start_date);
    }

    let mut warnings = Vec::new();
    let mut extended_project_end = None;
    if let Some(project_end) = project_end {
        let last_end = ordered.iter().filter_map(|phase| phase.effective_date()).max();
        if let Some(last_end) = last_end {
            if last_end > project_end {
                warnings.push(format!(
                    "Project end extended from {} to {} to fit the adjusted phases",
                    project_end, last_end
                ));
                extended_project_end = Some(last_end);
            }
        }
    }

    Ok(CascadeResult {
        phases: ordered,
        extended_project_end,
        warnings,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct BudgetCheck {
    pub is_valid: bool,
    pub total_allocated: f64,
    pub overage: f64,
    pub utilization_percentage: f64,
}

/// Sums phase allocations against the project budget.
///
/// Non-template phases contribute their hours once. A recurring template
/// contributes its per-occurrence hours multiplied by its expanded
/// occurrence count, which this function computes itself via `expander`
/// (bounded by the expander's caps) so callers never pre-expand unbounded
/// series. A template whose rule is missing or malformed expands to zero
/// occurrences and contributes nothing.
pub fn check_budget_constraint<C: Clock>(
    phases: &[PhaseAllocation],
    total_budget_hours: f64,
    expander: &OccurrenceExpander<C>,
) -> BudgetCheck {
    let mut total_allocated = 0.0;
    for phase in phases {
        let multiplier = if phase.is_recurring_template {
            recurring_occurrence_count(phase, expander) as f64
        } else {
            1.0
        };
        total_allocated += phase.allocated_hours * multiplier;
    }

    let overage = (total_allocated - total_budget_hours).max(0.0);
    let utilization_percentage = if total_budget_hours > 0.0 {
        total_allocated / total_budget_hours * 100.0
    } else {
        0.0
    };

    BudgetCheck {
        is_valid: total_allocated <= total_budget_hours,
        total_allocated,
        overage,
        utilization_percentage,
    }
}

fn recurring_occurrence_count<C: Clock>(
    phase: &PhaseAllocation,
    expander: &OccurrenceExpander<C>,
) -> usize {
    match &phase.recurrence_rule {
        Some(rule) => {
            expander
                .expand(rule, phase.start_date, phase.end_date, None)
                .occurrences
                .len()
        }
        None => 0,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecurringExclusivity {
    pub has_recurring_template: bool,
    pub has_split_phases: bool,
}

/// Reports whether a project mixes a recurring template with manually split
/// phases. A project may have one or the other, never both; this only
/// reports the current state, the caller decides how to react.
pub fn check_recurring_exclusivity(phases: &[PhaseAllocation]) -> RecurringExclusivity {
    RecurringExclusivity {
        has_recurring_template: phases.iter().any(|phase| phase.is_recurring_template),
        has_split_phases: phases.iter().any(|phase| !phase.is_recurring_template),
    }
}
