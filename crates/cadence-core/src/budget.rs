//! Budget allocation analysis.
//!
//! Aggregates phase allocations (expanding recurring templates itself,
//! bounded by the expander's caps) against a total budget and classifies the
//! result for display. The detail lines are shown to users verbatim.

use crate::expand::{Clock, OccurrenceExpander, SystemClock};
use crate::models::PhaseAllocation;
use crate::schedule::{check_budget_constraint, BudgetCheck};

/// Classification of a project's budget state. Critical outranks Warning
/// when both apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetHealth {
    Healthy,
    Warning,
    Critical,
}

impl std::fmt::Display for BudgetHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BudgetHealth::Healthy => write!(f, "healthy"),
            BudgetHealth::Warning => write!(f, "warning"),
            BudgetHealth::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BudgetReport {
    pub health: BudgetHealth,
    /// Human-readable findings, one per line.
    pub details: Vec<String>,
    /// The underlying totals.
    pub check: BudgetCheck,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BudgetSuggestion {
    pub suggested_budget: f64,
    pub adjustment_needed: bool,
    pub reason: String,
}

/// Utilization above this is flagged even when still within budget.
const UTILIZATION_WARNING_PERCENT: f64 = 95.0;

/// Band around the target utilization inside which no adjustment is
/// suggested.
const SUGGESTION_TOLERANCE: f64 = 0.05;

/// Stateless analyzer; owns an expander so recurring templates never have to
/// be pre-expanded by callers.
#[derive(Debug)]
pub struct BudgetAnalyzer<C: Clock = SystemClock> {
    expander: OccurrenceExpander<C>,
}

impl BudgetAnalyzer<SystemClock> {
    pub fn with_defaults() -> Self {
        Self::new(OccurrenceExpander::with_defaults())
    }
}

impl<C: Clock> BudgetAnalyzer<C> {
    pub fn new(expander: OccurrenceExpander<C>) -> Self {
        Self { expander }
    }

    /// Classifies the allocation state of a set of phases.
    ///
    /// Critical: over budget. Warning: date conflicts between phases,
    /// utilization above 95%, or no phases defined. Healthy otherwise.
    pub fn analyze(&self, phases: &[PhaseAllocation], budget_hours: f64) -> BudgetReport {
        let check = check_budget_constraint(phases, budget_hours, &self.expander);
        let mut details = Vec::new();

        if !check.is_valid {
            details.push(format!(
                "Allocated {:.1}h exceeds the {:.1}h budget by {:.1}h",
                check.total_allocated, budget_hours, check.overage
            ));
        }
        let conflicts = internal_date_conflicts(phases);
        if conflicts {
            details.push("Two or more phases fall on the same date".to_string());
        }
        let near_limit = check.is_valid && check.utilization_percentage > UTILIZATION_WARNING_PERCENT;
        if near_limit {
            details.push(format!(
                "Budget utilization is at {:.1}%",
                check.utilization_percentage
            ));
        }
        if phases.is_empty() {
            details.push("No phases are defined for this project".to_string());
        }

        let health = if !check.is_valid {
            BudgetHealth::Critical
        } else if conflicts || near_limit || phases.is_empty() {
            BudgetHealth::Warning
        } else {
            BudgetHealth::Healthy
        };

        if details.is_empty() {
            details.push(format!(
                "Allocated {:.1}h of {:.1}h ({:.1}%)",
                check.total_allocated, budget_hours, check.utilization_percentage
            ));
        }

        BudgetReport {
            health,
            details,
            check,
        }
    }
}

/// Proposes a budget that would bring utilization to the target.
///
/// Returns `adjustment_needed: false` when current utilization already sits
/// within the tolerance band around the target, or when there is nothing
/// allocated to size the budget against.
pub fn suggest_adjustment(
    current_budget: f64,
    total_allocated: f64,
    target_utilization: f64,
) -> BudgetSuggestion {
    if total_allocated <= 0.0 {
        return BudgetSuggestion {
            suggested_budget: current_budget,
            adjustment_needed: false,
            reason: "Nothing is allocated yet".to_string(),
        };
    }
    if current_budget <= 0.0 {
        return BudgetSuggestion {
            suggested_budget: total_allocated / target_utilization,
            adjustment_needed: true,
            reason: "No budget is set".to_string(),
        };
    }

    let utilization = total_allocated / current_budget;
    if (utilization - target_utilization).abs() <= SUGGESTION_TOLERANCE {
        return BudgetSuggestion {
            suggested_budget: current_budget,
            adjustment_needed: false,
            reason: format!(
                "Utilization {:.0}% is within the target band",
                utilization * 100.0
            ),
        };
    }

    let suggested_budget = total_allocated / target_utilization;
    let reason = if utilization > target_utilization {
        format!(
            "Over-utilized at {:.0}%; raising the budget to {:.1}h targets {:.0}%",
            utilization * 100.0,
            suggested_budget,
            target_utilization * 100.0
        )
    } else {
        format!(
            "Under-utilized at {:.0}%; lowering the budget to {:.1}h targets {:.0}%",
            utilization * 100.0,
            suggested_budget,
            target_utilization * 100.0
        )
    };

    BudgetSuggestion {
        suggested_budget,
        adjustment_needed: true,
        reason,
    }
}

/// Any two phases sharing the same effective date?
fn internal_date_conflicts(phases: &[PhaseAllocation]) -> bool {
    let mut dates: Vec<_> = phases.iter().filter_map(|p| p.effective_date()).collect();
    dates.sort();
    dates.windows(2).any(|pair| pair[0] == pair[1])
}
