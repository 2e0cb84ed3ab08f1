// ── Runtime connection configuration ──
//
// `ServerSettings` is the persisted, user-editable part: where the server
// is. `ClientConfig` is tuning the application hands in at construction:
// timeouts and retry policies. Neither touches disk here.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use scadalink_api::RouteMode;

use crate::error::CoreError;
use crate::retry::RetryPolicy;

/// Port the relay listens on. Settings using it are routed through the relay.
pub const RELAY_PORT: u16 = 443;

/// Where the SCADA server (or relay) lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    pub host: String,
    /// Accepts `443` or `"443"` on input; always written as a number.
    #[serde(deserialize_with = "port_from_string_or_number")]
    pub port: u16,
    /// Must stay `true`; plaintext transport is rejected by [`validate`](Self::validate).
    pub use_tls: bool,
    /// Connect on launch and after settings changes.
    pub auto_connect: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: RELAY_PORT,
            use_tls: true,
            auto_connect: false,
        }
    }
}

impl ServerSettings {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// The relay is assumed to listen only on the standard TLS port.
    pub fn uses_relay(&self) -> bool {
        self.port == RELAY_PORT
    }

    pub fn route_mode(&self) -> RouteMode {
        if self.uses_relay() {
            RouteMode::Relay
        } else {
            RouteMode::Direct
        }
    }

    /// Reject settings that cannot form a secure endpoint.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.host.trim().is_empty() {
            return Err(CoreError::config("server host is not configured"));
        }
        if self.port == 0 {
            return Err(CoreError::config("server port must be between 1 and 65535"));
        }
        if !self.use_tls {
            return Err(CoreError::config(
                "plaintext transport is not permitted; useTls must be true",
            ));
        }
        let host = self.host.trim();
        if host.starts_with("http://") || host.starts_with("ws://") {
            return Err(CoreError::config(format!(
                "host {host} uses a plaintext scheme"
            )));
        }
        Ok(())
    }
}

fn port_from_string_or_number<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(n) => Ok(n),
        Port::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid port: {s:?}"))),
    }
}

/// Tuning for one connection layer instance.
///
/// Built by the application (usually from `scadalink-config`) and passed
/// to [`Supervisor::new`](crate::Supervisor::new).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Timeout for data calls.
    pub request_timeout: Duration,
    /// Timeout for the health probe.
    pub probe_timeout: Duration,
    /// Distinct API port for direct routes, if the server splits them.
    pub api_port: Option<u16>,
    pub user_agent: String,
    /// Supervisor probe retries.
    pub connect_retry: RetryPolicy,
    /// Live stream reconnects.
    pub stream_retry: RetryPolicy,
    /// Replace the settings-derived origin (loopback mock servers in tests).
    #[cfg(feature = "test-util")]
    pub origin_override: Option<url::Url>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            api_port: None,
            user_agent: concat!("scadalink/", env!("CARGO_PKG_VERSION")).into(),
            connect_retry: RetryPolicy::fixed(Duration::from_secs(10)),
            stream_retry: RetryPolicy::fixed(Duration::from_secs(5)),
            #[cfg(feature = "test-util")]
            origin_override: None,
        }
    }
}
