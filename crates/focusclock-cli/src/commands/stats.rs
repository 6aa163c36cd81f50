use clap::Subcommand;
use focusclock_core::Period;

use super::{open_engine, print_json};

#[derive(Subcommand)]
pub enum StatsAction {
    /// Today's totals
    Today,
    /// This week (from Monday) with daily buckets
    Week,
    /// This month with daily buckets
    Month,
}

pub fn run(action: StatsAction) -> Result<(), Box<dyn std::error::Error>> {
    let (engine, _config) = open_engine()?;
    let period = match action {
        StatsAction::Today => Period::Today,
        StatsAction::Week => Period::Week,
        StatsAction::Month => Period::Month,
    };
    print_json(&engine.report().period(period))
}
