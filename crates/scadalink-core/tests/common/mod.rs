// Shared fixtures for scadalink-core integration tests.
#![allow(dead_code, clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

use scadalink_api::{Error, StreamConnector, StreamLink};
use scadalink_core::{
    AgentId, ByteOrder, ClientConfig, KeyValueStore, MemoryStore, RegisterSubscriptionKey,
    RetryPolicy, ServerSettings, SettingsRepository,
};

// ── Mock stream connector ───────────────────────────────────────────

/// Server side of one link opened through [`MockConnector`].
pub struct ServerEnd {
    pub url: Url,
    /// Text frames the client sent.
    pub from_client: mpsc::UnboundedReceiver<String>,
    /// Push text frames to the client. Dropping this ends the link.
    pub to_client: mpsc::UnboundedSender<String>,
}

impl ServerEnd {
    /// Next client frame, parsed.
    pub async fn next_frame(&mut self) -> Value {
        let text = tokio::time::timeout(Duration::from_secs(5), self.from_client.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("link closed");
        serde_json::from_str(&text).unwrap()
    }

    /// Every frame already sent, without waiting.
    pub fn drain_frames(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(text) = self.from_client.try_recv() {
            frames.push(serde_json::from_str(&text).unwrap());
        }
        frames
    }

    pub fn push(&self, frame: &Value) {
        self.to_client.send(frame.to_string()).unwrap();
    }
}

/// In-process connector: every `open` hands its server end to the test.
#[derive(Clone)]
pub struct MockConnector {
    ends: mpsc::UnboundedSender<ServerEnd>,
    failing: Arc<AtomicBool>,
    opens: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerEnd>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                ends: tx,
                failing: Arc::new(AtomicBool::new(false)),
                opens: Arc::new(AtomicUsize::new(0)),
            },
            rx,
        )
    }

    /// Make subsequent opens fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of open attempts so far, failed ones included.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl StreamConnector for MockConnector {
    fn open(&self, url: Url) -> BoxFuture<'static, Result<StreamLink, Error>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing.load(Ordering::SeqCst);
        let ends = self.ends.clone();
        Box::pin(async move {
            if failing {
                return Err(Error::StreamConnect("connection refused".into()));
            }
            let (link, from_client, to_client) = StreamLink::pair();
            let _ = ends.send(ServerEnd {
                url,
                from_client,
                to_client,
            });
            Ok(link)
        })
    }
}

pub async fn next_end(ends: &mut mpsc::UnboundedReceiver<ServerEnd>) -> ServerEnd {
    tokio::time::timeout(Duration::from_secs(30), ends.recv())
        .await
        .expect("timed out waiting for a stream open")
        .expect("connector dropped")
}

// ── Settings & config ───────────────────────────────────────────────

pub const RELAY_HOST: &str = "bridge.example.com";

/// Store pre-seeded with relay settings and, optionally, an agent.
pub fn relay_store(agent: Option<&str>) -> Arc<dyn KeyValueStore> {
    seeded_store(&ServerSettings::new(RELAY_HOST, 443), agent)
}

/// Store pre-seeded with direct-route settings.
pub fn direct_store() -> Arc<dyn KeyValueStore> {
    seeded_store(&ServerSettings::new("plant.example.com", 8443), None)
}

pub fn seeded_store(settings: &ServerSettings, agent: Option<&str>) -> Arc<dyn KeyValueStore> {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let repo = SettingsRepository::new(Arc::clone(&store));
    repo.save_settings(settings).unwrap();
    if let Some(agent) = agent {
        repo.save_agent(Some(&AgentId::new(agent))).unwrap();
    }
    store
}

/// Config routed at `origin` (a mock server or an unused loopback port).
pub fn config_for(origin: &str) -> ClientConfig {
    ClientConfig {
        request_timeout: Duration::from_secs(5),
        probe_timeout: Duration::from_millis(500),
        stream_retry: RetryPolicy::fixed(Duration::from_secs(5)),
        origin_override: Some(Url::parse(origin).unwrap()),
        ..ClientConfig::default()
    }
}

/// Origin nothing listens on; route building succeeds, connects fail.
pub const DEAD_ORIGIN: &str = "http://127.0.0.1:9";

// ── Keys ────────────────────────────────────────────────────────────

pub fn key(register_id: u64) -> RegisterSubscriptionKey {
    RegisterSubscriptionKey {
        analyzer_id: 1,
        address: 3200 + u32::try_from(register_id).unwrap(),
        data_type: "float32".into(),
        scale: 0.1,
        byte_order: ByteOrder::Cdab,
        bit_offset: None,
        register_id,
    }
}

pub fn key_json(register_id: u64) -> Value {
    serde_json::to_value(key(register_id)).unwrap()
}

pub fn push_frame(register_id: u64, value: f64) -> Value {
    serde_json::json!({
        "type": "value",
        "key": key_json(register_id),
        "value": value,
        "timestamp": 1_700_000_000_000_i64
    })
}

/// Let spawned tasks run until they block.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
