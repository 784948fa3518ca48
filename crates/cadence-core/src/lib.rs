//! # Cadence Core Library
//!
//! The algorithmic core of the Cadence project planner: recurrence-rule
//! compilation and occurrence expansion for recurring phases, milestones and
//! work hours, plus the schedule-consistency and budget rules built on top
//! of them.
//!
//! ## Features
//!
//! - **Canonical Recurrence Rules**: patterns compile to portable RFC 5545
//!   rule strings (`FREQ=...;INTERVAL=...;BYDAY=...`) and parse back, so
//!   legacy discrete-field rows and canonical rows resolve to one model
//! - **Bounded Expansion**: occurrence generation is windowed and capped;
//!   continuous series expand over a rolling window around an injectable
//!   clock
//! - **Pattern Detection**: legacy date lists without a stored rule are
//!   reverse-engineered into a pattern with a confidence grade
//! - **Consistency Rules**: timeframe validation, date-conflict detection,
//!   minimum-end-date policy and duration-preserving cascade adjustment
//! - **Budget Analysis**: allocation totals over expanded recurring
//!   templates, with healthy/warning/critical classification
//!
//! Everything here is pure and synchronous: no I/O, no shared mutable
//! state. Persistence and UI live in other layers and consume these results.
//!
//! ## Core Modules
//!
//! - [`models`]: core data structures (patterns, occurrences, phases)
//! - [`rule`]: canonical rule compilation and parsing
//! - [`expand`]: windowed, capped occurrence expansion
//! - [`detect`]: pattern detection from concrete date lists
//! - [`schedule`]: schedule consistency rules
//! - [`budget`]: budget allocation analysis
//! - [`error`]: crate error types
//!
//! ## Example Usage
//!
//! ```rust
//! use cadence_core::models::{Frequency, RecurrencePattern};
//! use cadence_core::expand::OccurrenceExpander;
//! use chrono::NaiveDate;
//!
//! fn main() -> Result<(), cadence_core::error::CoreError> {
//!     let pattern = RecurrencePattern {
//!         frequency: Frequency::Weekly,
//!         interval: 1,
//!         weekly_day_of_week: Some(1), // Monday
//!         ..Default::default()
//!     };
//!
//!     let anchor = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
//!     let rule = cadence_core::rule::compile(&pattern, anchor, None, true)?;
//!
//!     let expander = OccurrenceExpander::with_defaults();
//!     let window_end = NaiveDate::from_ymd_opt(2025, 2, 3).unwrap();
//!     let expansion = expander.expand(&rule, anchor, Some(window_end), None);
//!     assert_eq!(expansion.occurrences.len(), 5);
//!
//!     Ok(())
//! }
//! ```

pub mod budget;
pub mod detect;
pub mod error;
pub mod expand;
pub mod models;
pub mod rule;
pub mod schedule;
