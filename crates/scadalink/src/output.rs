//! Output formatting: plain text or JSON, with optional color.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use serde::Serialize;

use scadalink_core::ConnectionState;

use crate::cli::{ColorMode, GlobalOpts, OutputFormat};
use crate::error::CliError;

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render `data` as JSON for the JSON formats, or via `plain_fn`.
pub fn render<T: Serialize + ?Sized>(
    format: OutputFormat,
    data: &T,
    plain_fn: impl FnOnce(&T) -> String,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Plain => Ok(plain_fn(data)),
        OutputFormat::Json => to_json(data, false),
        OutputFormat::JsonCompact => to_json(data, true),
    }
}

/// Pretty JSON in every format; raw responses have no better plain form.
pub fn render_value(format: OutputFormat, value: &serde_json::Value) -> Result<String, CliError> {
    to_json(value, format == OutputFormat::JsonCompact)
}

fn to_json<T: Serialize + ?Sized>(data: &T, compact: bool) -> Result<String, CliError> {
    let text = if compact {
        serde_json::to_string(data)
    } else {
        serde_json::to_string_pretty(data)
    };
    text.map_err(|e| CliError::Protocol {
        message: format!("cannot render output: {e}"),
    })
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, global: &GlobalOpts) {
    if global.quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

/// Status line on stderr, suppressed by `--quiet`.
pub fn notice(message: &str, global: &GlobalOpts) {
    if !global.quiet {
        eprintln!("{message}");
    }
}

// ── Connection state ─────────────────────────────────────────────────

pub fn paint_state(state: ConnectionState, color: bool) -> String {
    let text = state.to_string();
    if !color {
        return text;
    }
    match state {
        ConnectionState::Connected => text.green().bold().to_string(),
        ConnectionState::Connecting | ConnectionState::Reconnecting { .. } => {
            text.yellow().to_string()
        }
        ConnectionState::Disconnected => text.red().to_string(),
    }
}

pub fn paint_online(online: bool, color: bool) -> String {
    let text = if online { "online" } else { "offline" };
    match (color, online) {
        (false, _) => text.to_owned(),
        (true, true) => text.green().to_string(),
        (true, false) => text.dimmed().to_string(),
    }
}
