// ── Core error types ──
//
// Caller-facing taxonomy for the connection layer. The
// `From<scadalink_api::Error>` impl classifies transport-layer failures;
// only `Config`, `Server` and `Transport` ever reach callers. `Protocol`
// and `IdentityMismatch` are logged and turned into empty results inside
// the gateway and broker.

use thiserror::Error;

use crate::store::StoreError;

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// Missing or invalid settings; recoverable by reconfiguring.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Network unreachable, refused or timed out; recoverable by retry.
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Non-2xx answer from the server or relay. Never retried automatically.
    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// Payload did not have the expected shape.
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// A result arrived for an agent that is no longer selected.
    #[error("Response for agent {got} discarded, current agent is {expected}")]
    IdentityMismatch { expected: String, got: String },
}

impl CoreError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether this error propagates to callers rather than being absorbed.
    pub fn is_surfaced(&self) -> bool {
        matches!(
            self,
            Self::Config { .. } | Self::Server { .. } | Self::Transport { .. }
        )
    }

    /// Whether the supervisor's retry schedule applies.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<scadalink_api::Error> for CoreError {
    fn from(err: scadalink_api::Error) -> Self {
        use scadalink_api::Error as Api;

        match err {
            Api::InvalidHost(_) | Api::PlaintextRejected(_) | Api::InvalidUrl(_) => {
                CoreError::Config {
                    message: err.to_string(),
                }
            }
            Api::Transport(ref e) => match e.status() {
                Some(status) => CoreError::Server {
                    status: status.as_u16(),
                    message: e.to_string(),
                },
                None => CoreError::Transport {
                    message: e.to_string(),
                },
            },
            Api::Timeout { .. } | Api::StreamConnect(_) | Api::StreamClosed { .. } => {
                CoreError::Transport {
                    message: err.to_string(),
                }
            }
            Api::Server { status, message } => CoreError::Server { status, message },
            Api::Deserialization { message, .. } | Api::Protocol(message) => {
                CoreError::Protocol { message }
            }
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        CoreError::Config {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let server = CoreError::from(scadalink_api::Error::Server {
            status: 500,
            message: "boom".into(),
        });
        assert!(server.is_surfaced());
        assert!(!server.is_retryable());

        let timeout = CoreError::from(scadalink_api::Error::Timeout { timeout_secs: 5 });
        assert!(matches!(timeout, CoreError::Transport { .. }));
        assert!(timeout.is_retryable());

        let protocol = CoreError::from(scadalink_api::Error::Protocol("bad".into()));
        assert!(!protocol.is_surfaced());

        let plaintext =
            CoreError::from(scadalink_api::Error::PlaintextRejected("http://x".into()));
        assert!(matches!(plaintext, CoreError::Config { .. }));
    }
}
