// scadalink-core: Connection supervision, agent routing and live register
// subscriptions on top of scadalink-api.

pub mod agent;
pub mod broker;
pub mod config;
pub mod demo;
pub mod error;
pub mod gateway;
pub mod model;
pub mod retry;
pub mod store;
pub mod supervisor;

// ── Primary re-exports ──────────────────────────────────────────────
pub use agent::{AgentSelector, AgentTag, AgentView};
pub use broker::{ClientFrame, LiveBroker, ValueCallback, ValueStream};
pub use config::{ClientConfig, RELAY_PORT, ServerSettings};
pub use error::CoreError;
pub use gateway::RequestGateway;
pub use retry::{Backoff, RetryPolicy};
pub use store::{KeyValueStore, MemoryStore, SettingsRepository, StoreError};
pub use supervisor::{Supervisor, SupervisorEvent};

pub use model::{
    // Identity & state
    AgentId, ConnectionState,
    // Live data
    ByteOrder, LiveValue, RegisterSubscriptionKey,
    // Relay
    AgentSummary,
};

// Transport types callers need alongside the supervisor.
pub use scadalink_api::{HttpMethod, RouteMode, StreamConnector, StreamLink, WsConnector};
