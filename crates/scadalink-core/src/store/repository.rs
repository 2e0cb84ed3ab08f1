// Typed access to persisted state.
//
// Every value is stored as a versioned JSON record:
//   {"version": 1, "value": <payload>}
// A bare payload without the envelope predates versioning and is read as
// version 0. Unknown versions and unreadable records are treated as absent.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::{KeyValueStore, StoreError};
use crate::config::ServerSettings;
use crate::model::AgentId;

pub const RECORD_VERSION: u32 = 1;

const KEY_SETTINGS: &str = "server_settings";
const KEY_AGENT: &str = "selected_agent";
const KEY_DEMO: &str = "demo_mode";

#[derive(Serialize)]
struct RecordOut<'a, T> {
    version: u32,
    value: &'a T,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RecordIn {
    version: u32,
    value: Value,
}

/// Typed persistence over a [`KeyValueStore`].
#[derive(Clone)]
pub struct SettingsRepository {
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for SettingsRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsRepository").finish_non_exhaustive()
    }
}

impl SettingsRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    // ── Server settings ──────────────────────────────────────────────

    /// Persisted settings, or defaults when nothing usable is stored.
    pub fn load_settings(&self) -> Result<ServerSettings, StoreError> {
        Ok(self.read(KEY_SETTINGS)?.unwrap_or_default())
    }

    pub fn save_settings(&self, settings: &ServerSettings) -> Result<(), StoreError> {
        self.write(KEY_SETTINGS, settings)
    }

    // ── Selected agent ───────────────────────────────────────────────

    pub fn load_agent(&self) -> Result<Option<AgentId>, StoreError> {
        self.read(KEY_AGENT)
    }

    /// Persist the selection; `None` removes it.
    pub fn save_agent(&self, agent: Option<&AgentId>) -> Result<(), StoreError> {
        match agent {
            Some(agent) => self.write(KEY_AGENT, agent),
            None => self.store.remove(KEY_AGENT),
        }
    }

    // ── Demo mode ────────────────────────────────────────────────────

    pub fn load_demo_mode(&self) -> Result<bool, StoreError> {
        Ok(self.read(KEY_DEMO)?.unwrap_or(false))
    }

    pub fn save_demo_mode(&self, enabled: bool) -> Result<(), StoreError> {
        self.write(KEY_DEMO, &enabled)
    }

    // ── Record codec ─────────────────────────────────────────────────

    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.store.get(key)? else {
            return Ok(None);
        };
        Ok(decode_record(key, &raw))
    }

    fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let record = RecordOut {
            version: RECORD_VERSION,
            value,
        };
        let raw = serde_json::to_string(&record).map_err(|e| StoreError::Encode {
            key: key.to_owned(),
            message: e.to_string(),
        })?;
        self.store.set(key, &raw)
    }
}

fn decode_record<T: DeserializeOwned>(key: &str, raw: &str) -> Option<T> {
    let json: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        // Pre-JSON agent ids were stored as the bare string.
        Err(_) => Value::String(raw.to_owned()),
    };

    let (version, payload) = match serde_json::from_value::<RecordIn>(json.clone()) {
        Ok(record) => (record.version, record.value),
        Err(_) => (0, json),
    };

    if version > RECORD_VERSION {
        warn!(key, version, "persisted record has unknown version, ignoring");
        return None;
    }

    match serde_json::from_value(payload) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, version, error = %e, "persisted record unreadable, ignoring");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::store::MemoryStore;

    fn repo() -> (Arc<MemoryStore>, SettingsRepository) {
        let store = Arc::new(MemoryStore::new());
        let repo = SettingsRepository::new(store.clone());
        (store, repo)
    }

    #[test]
    fn defaults_when_nothing_persisted() {
        let (_, repo) = repo();
        assert_eq!(repo.load_settings().unwrap(), ServerSettings::default());
        assert_eq!(repo.load_agent().unwrap(), None);
        assert!(!repo.load_demo_mode().unwrap());
    }

    #[test]
    fn saves_versioned_records() {
        let (store, repo) = repo();
        repo.save_settings(&ServerSettings::new("demo.example.com", 443))
            .unwrap();
        repo.save_agent(Some(&AgentId::new("agent-7"))).unwrap();

        let raw = store.get(KEY_AGENT).unwrap().unwrap();
        assert_eq!(raw, r#"{"version":1,"value":"agent-7"}"#);
        assert_eq!(repo.load_settings().unwrap().host, "demo.example.com");
        assert_eq!(repo.load_agent().unwrap(), Some(AgentId::new("agent-7")));

        repo.save_agent(None).unwrap();
        assert_eq!(store.get(KEY_AGENT).unwrap(), None);
    }

    #[test]
    fn legacy_bare_values_are_read_as_version_zero() {
        let (store, repo) = repo();
        store
            .set(KEY_SETTINGS, r#"{"host":"10.0.0.5","port":"8443","useTls":true,"autoConnect":true}"#)
            .unwrap();
        store.set(KEY_AGENT, "agent-legacy").unwrap();
        store.set(KEY_DEMO, "true").unwrap();

        let settings = repo.load_settings().unwrap();
        assert_eq!(settings.port, 8443);
        assert!(settings.auto_connect);
        assert_eq!(repo.load_agent().unwrap(), Some(AgentId::new("agent-legacy")));
        assert!(repo.load_demo_mode().unwrap());
    }

    #[test]
    fn unknown_version_is_treated_as_absent() {
        let (store, repo) = repo();
        store
            .set(KEY_SETTINGS, r#"{"version":9,"value":{"host":"future"}}"#)
            .unwrap();
        assert_eq!(repo.load_settings().unwrap(), ServerSettings::default());
    }
}
