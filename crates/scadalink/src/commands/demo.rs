//! `demo on|off|status`.

use scadalink_core::Supervisor;

use crate::cli::{DemoState, GlobalOpts};
use crate::error::CliError;
use crate::output;

pub fn handle(supervisor: &Supervisor, state: DemoState, global: &GlobalOpts) -> Result<(), CliError> {
    match state {
        DemoState::On => supervisor.set_demo_mode(true)?,
        DemoState::Off => supervisor.set_demo_mode(false)?,
        DemoState::Status => {}
    }
    let enabled = supervisor.demo_mode();
    let out = output::render(global.output, &serde_json::json!({"demoMode": enabled}), |_| {
        format!("demo mode {}", if enabled { "on" } else { "off" })
    })?;
    output::print_output(&out, global);
    Ok(())
}
