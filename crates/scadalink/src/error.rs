//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use scadalink_config::ConfigError;
use scadalink_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Settings ─────────────────────────────────────────────────────
    #[error("Server is not configured correctly: {reason}")]
    #[diagnostic(
        code(scadalink::settings),
        help(
            "Set the server address with: scadalink settings set --host <host> --port <port>\n\
             Relayed servers (port 443) also need: scadalink agents select <id>"
        )
    )]
    Settings { reason: String },

    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the server: {reason}")]
    #[diagnostic(
        code(scadalink::connection_failed),
        help("Check the host and port with: scadalink settings show")
    )]
    ConnectionFailed { reason: String },

    #[error("Not connected (state: {state})")]
    #[diagnostic(
        code(scadalink::not_connected),
        help("Retry with a longer --wait, or check: scadalink settings show")
    )]
    NotConnected { state: String },

    // ── Server ───────────────────────────────────────────────────────
    #[error("Server error (HTTP {status}): {message}")]
    #[diagnostic(code(scadalink::server))]
    Server { status: u16, message: String },

    #[error("Unexpected response: {message}")]
    #[diagnostic(code(scadalink::protocol))]
    Protocol { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(scadalink::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(
        code(scadalink::config),
        help("Config lives in $SCADALINK_CONFIG_DIR or the platform config directory.")
    )]
    Config(#[from] ConfigError),

    // ── IO ───────────────────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Settings { .. } | Self::Validation { .. } => exit_code::USAGE,
            Self::ConnectionFailed { .. } | Self::NotConnected { .. } => exit_code::CONNECTION,
            Self::Server { status: 404, .. } => exit_code::NOT_FOUND,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Config { message } => Self::Settings { reason: message },
            CoreError::Transport { message } => Self::ConnectionFailed { reason: message },
            CoreError::Server { status, message } => Self::Server { status, message },
            CoreError::Protocol { message } => Self::Protocol { message },
            err @ CoreError::IdentityMismatch { .. } => Self::Protocol {
                message: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_kind() {
        let settings: CliError = CoreError::Config {
            message: "server host is not configured".into(),
        }
        .into();
        assert_eq!(settings.exit_code(), exit_code::USAGE);

        let missing: CliError = CoreError::Server {
            status: 404,
            message: "no such analyzer".into(),
        }
        .into();
        assert_eq!(missing.exit_code(), exit_code::NOT_FOUND);

        let down: CliError = CoreError::Transport {
            message: "connection refused".into(),
        }
        .into();
        assert_eq!(down.exit_code(), exit_code::CONNECTION);
    }
}
