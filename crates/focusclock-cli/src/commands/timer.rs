use clap::{Subcommand, ValueEnum};
use focusclock_core::SessionKind;

use super::{open_engine, print_json};

#[derive(Clone, Copy, ValueEnum)]
pub enum KindArg {
    Focus,
    ShortBreak,
    LongBreak,
}

impl From<KindArg> for SessionKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Focus => SessionKind::Focus,
            KindArg::ShortBreak => SessionKind::ShortBreak,
            KindArg::LongBreak => SessionKind::LongBreak,
        }
    }
}

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start tracking a session
    Start {
        #[arg(long, value_enum, default_value = "focus")]
        kind: KindArg,
    },
    /// Pause the running session, or resume a paused one
    Pause,
    /// Close any session and go idle
    Reset,
    /// Print current timer state as JSON
    Status,
}

pub fn run(action: TimerAction) -> Result<(), Box<dyn std::error::Error>> {
    let (mut engine, _config) = open_engine()?;

    match action {
        TimerAction::Start { kind } => print_json(&engine.start_timer(kind.into()))?,
        TimerAction::Pause => print_json(&engine.pause_timer())?,
        TimerAction::Reset => print_json(&engine.reset_timer())?,
        TimerAction::Status => print_json(&engine.snapshot())?,
    }
    Ok(())
}
