//! Reporting over tracked time.
//!
//! Per-day, per-week and per-month totals, overall and broken down by
//! category, always including the live running session.

mod report;

pub use report::{CategoryMinutes, DayMinutes, Period, PeriodReport, Report};
