use clap::Subcommand;

use super::{open_engine, print_json};

#[derive(Subcommand)]
pub enum PomodoroAction {
    /// Start or resume the current phase
    Start,
    /// Pause the current phase
    Pause,
    /// Back to the first work phase
    Reset,
    /// End the current phase early
    Skip,
    /// Print Pomodoro state as JSON
    Status,
}

pub fn run(action: PomodoroAction) -> Result<(), Box<dyn std::error::Error>> {
    let (mut engine, _config) = open_engine()?;

    match action {
        PomodoroAction::Start => print_json(&engine.start_pomodoro_timer())?,
        PomodoroAction::Pause => print_json(&engine.pause_pomodoro_timer())?,
        PomodoroAction::Reset => print_json(&engine.reset_pomodoro_timer())?,
        PomodoroAction::Skip => print_json(&engine.skip_pomodoro_phase())?,
        PomodoroAction::Status => {
            let now_ms = engine.now().timestamp_millis();
            let state = engine.pomodoro();
            print_json(&serde_json::json!({
                "pomodoro": state,
                "remaining_ms": state.remaining_ms(now_ms),
            }))?;
        }
    }
    Ok(())
}
