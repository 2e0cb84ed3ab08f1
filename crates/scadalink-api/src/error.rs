use thiserror::Error;

/// Top-level error type for the `scadalink-api` crate.
///
/// Covers every failure mode of the transport layer: HTTP, relay proxying,
/// compact payload expansion, and the live stream. `scadalink-core` maps
/// these into its caller-facing taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Addressing ──────────────────────────────────────────────────
    /// The configured host is empty or cannot form a URL.
    #[error("Invalid host: {0}")]
    InvalidHost(String),

    /// A plaintext (`http`/`ws`) endpoint was requested.
    #[error("Plaintext transport rejected for {0}: only https/wss are permitted")]
    PlaintextRejected(String),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Server ──────────────────────────────────────────────────────
    /// Non-2xx response, with the server-provided message when present.
    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// A payload did not have the shape the codec expects.
    #[error("Protocol error: {0}")]
    Protocol(String),

    // ── Live stream ─────────────────────────────────────────────────
    /// Stream connection failed.
    #[error("Stream connection failed: {0}")]
    StreamConnect(String),

    /// Stream closed unexpectedly.
    #[error("Stream closed (code {code}): {reason}")]
    StreamClosed { code: u16, reason: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Timeout { .. } | Self::StreamConnect(_) | Self::StreamClosed { .. } => true,
            Self::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Server { status: 404, .. } => true,
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            _ => false,
        }
    }

    /// HTTP status code, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
