// ── Domain model ──

mod identity;
mod payload;
mod register;
mod state;

pub use identity::AgentId;
pub use payload::AgentSummary;
pub use register::{ByteOrder, LiveValue, RegisterSubscriptionKey};
pub use state::ConnectionState;
