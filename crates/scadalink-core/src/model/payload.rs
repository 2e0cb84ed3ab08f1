// ── Relay payload records ──

use serde::{Deserialize, Serialize};

/// Agent as listed by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub id: super::AgentId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub online: bool,
}
