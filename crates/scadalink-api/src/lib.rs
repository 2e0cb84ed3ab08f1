// scadalink-api: Async transport for SCADA mobile APIs (direct + Cloud Bridge relay)

pub mod client;
pub mod compact;
pub mod error;
pub mod relay;
pub mod transport;
pub mod websocket;

pub use client::ScadaClient;
pub use error::Error;
pub use relay::{HttpMethod, RelayEnvelope};
pub use transport::{RouteMode, TransportConfig, TransportRouter};
pub use websocket::{StreamConnector, StreamLink, WsConnector};
