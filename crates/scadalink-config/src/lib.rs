//! Shared configuration for scadalink tools.
//!
//! Tuning knobs come from `config.toml` in the platform config directory,
//! overridden by `SCADALINK_*` environment variables, and translate into a
//! `scadalink_core::ClientConfig`. Persisted connection state (server
//! settings, selected agent, demo flag) lives next to it in `state.toml`,
//! managed by [`FileStore`].

mod file_store;

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use scadalink_core::{ClientConfig, RetryPolicy};

pub use file_store::FileStore;

/// Overrides the directory holding `config.toml` and `state.toml`.
pub const CONFIG_DIR_ENV: &str = "SCADALINK_CONFIG_DIR";
pub const CONFIG_FILE: &str = "config.toml";
pub const STATE_FILE: &str = "state.toml";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("state file {} is corrupt: {message}", path.display())]
    CorruptState { path: PathBuf, message: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level `config.toml`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientSection,

    #[serde(default)]
    pub retry: RetrySection,
}

/// Request tuning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ClientSection {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Separate API port on direct routes, when the server splits them.
    pub api_port: Option<u16>,

    pub user_agent: Option<String>,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            probe_timeout_secs: default_probe_timeout(),
            api_port: None,
            user_agent: None,
        }
    }
}

/// Retry schedules. A `*_max_delay_secs` switches that schedule to
/// exponential backoff starting at `*_delay_secs`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RetrySection {
    #[serde(default = "default_connect_delay")]
    pub connect_delay_secs: u64,
    pub connect_max_delay_secs: Option<u64>,
    pub connect_max_attempts: Option<u32>,

    #[serde(default = "default_stream_delay")]
    pub stream_delay_secs: u64,
    pub stream_max_delay_secs: Option<u64>,
    pub stream_max_attempts: Option<u32>,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            connect_delay_secs: default_connect_delay(),
            connect_max_delay_secs: None,
            connect_max_attempts: None,
            stream_delay_secs: default_stream_delay(),
            stream_max_delay_secs: None,
            stream_max_attempts: None,
        }
    }
}

fn default_request_timeout() -> u64 {
    30
}
fn default_probe_timeout() -> u64 {
    5
}
fn default_connect_delay() -> u64 {
    10
}
fn default_stream_delay() -> u64 {
    5
}

// ── Paths ───────────────────────────────────────────────────────────

/// Directory holding config and state: `$SCADALINK_CONFIG_DIR`, else the
/// platform config dir.
pub fn config_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    ProjectDirs::from("com", "scadalink", "scadalink").map_or_else(
        || {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("scadalink");
            p
        },
        |dirs| dirs.config_dir().to_path_buf(),
    )
}

pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE)
}

pub fn state_path() -> PathBuf {
    config_dir().join(STATE_FILE)
}

// ── Loading ─────────────────────────────────────────────────────────

/// Load `config.toml` from [`config_dir`] merged with the environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Defaults, then `path` (if present), then `SCADALINK_*` variables
/// (`SCADALINK_CLIENT__REQUEST_TIMEOUT_SECS=10`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("SCADALINK_").split("__"));

    let config: Config = figment.extract()?;
    config.validate()?;
    Ok(config)
}

/// Open the persisted connection state in [`config_dir`].
pub fn open_state_store() -> Result<FileStore, ConfigError> {
    FileStore::open(state_path())
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("client.request_timeout_secs", self.client.request_timeout_secs)?;
        positive("client.probe_timeout_secs", self.client.probe_timeout_secs)?;
        positive("retry.connect_delay_secs", self.retry.connect_delay_secs)?;
        positive("retry.stream_delay_secs", self.retry.stream_delay_secs)?;
        if self.client.api_port == Some(0) {
            return Err(ConfigError::Validation {
                field: "client.api_port".into(),
                reason: "must be between 1 and 65535".into(),
            });
        }
        Ok(())
    }

    /// Translate into the connection layer's tuning.
    pub fn to_client_config(&self) -> ClientConfig {
        let mut config = ClientConfig {
            request_timeout: Duration::from_secs(self.client.request_timeout_secs),
            probe_timeout: Duration::from_secs(self.client.probe_timeout_secs),
            api_port: self.client.api_port,
            connect_retry: policy(
                self.retry.connect_delay_secs,
                self.retry.connect_max_delay_secs,
                self.retry.connect_max_attempts,
            ),
            stream_retry: policy(
                self.retry.stream_delay_secs,
                self.retry.stream_max_delay_secs,
                self.retry.stream_max_attempts,
            ),
            ..ClientConfig::default()
        };
        if let Some(agent) = &self.client.user_agent {
            config.user_agent.clone_from(agent);
        }
        config
    }
}

fn positive(field: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Validation {
            field: field.into(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(())
}

fn policy(delay_secs: u64, max_delay_secs: Option<u64>, max_attempts: Option<u32>) -> RetryPolicy {
    let delay = Duration::from_secs(delay_secs);
    let policy = match max_delay_secs {
        Some(max) => RetryPolicy::exponential(delay, Duration::from_secs(max).max(delay)),
        None => RetryPolicy::fixed(delay),
    };
    match max_attempts {
        Some(n) => policy.with_max_attempts(n),
        None => policy,
    }
}

#[cfg(test)]
mod tests {
    use figment::Jail;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_match_connection_layer() {
        let config = Config::default().to_client_config();
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.probe_timeout, Duration::from_secs(5));
        assert_eq!(config.connect_retry, RetryPolicy::fixed(Duration::from_secs(10)));
        assert_eq!(config.stream_retry, RetryPolicy::fixed(Duration::from_secs(5)));
    }

    #[test]
    fn file_then_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE,
                r#"
                    [client]
                    request_timeout_secs = 12
                    api_port = 8080

                    [retry]
                    stream_delay_secs = 2
                    stream_max_delay_secs = 60
                    stream_max_attempts = 8
                "#,
            )?;
            jail.set_env("SCADALINK_CLIENT__PROBE_TIMEOUT_SECS", "3");

            let config = load_config_from(Path::new(CONFIG_FILE)).unwrap();
            assert_eq!(config.client.request_timeout_secs, 12);
            assert_eq!(config.client.probe_timeout_secs, 3);

            let client = config.to_client_config();
            assert_eq!(client.api_port, Some(8080));
            assert_eq!(
                client.stream_retry,
                RetryPolicy::exponential(Duration::from_secs(2), Duration::from_secs(60))
                    .with_max_attempts(8)
            );
            Ok(())
        });
    }

    #[test]
    fn missing_file_uses_defaults() {
        Jail::expect_with(|_| {
            let config = load_config_from(Path::new("absent.toml")).unwrap();
            assert_eq!(config, Config::default());
            Ok(())
        });
    }

    #[test]
    fn zero_timeout_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file(CONFIG_FILE, "[client]\nprobe_timeout_secs = 0\n")?;
            let err = load_config_from(Path::new(CONFIG_FILE)).unwrap_err();
            assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "client.probe_timeout_secs"));
            Ok(())
        });
    }
}
