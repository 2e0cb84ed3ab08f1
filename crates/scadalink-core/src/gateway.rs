// ── Request gateway ──
//
// One-shot request/response calls. Resolves the route lazily from the
// persisted settings, short-circuits in demo mode, wraps relayed calls in
// an envelope for the current agent, and classifies every failure. Only
// `Config`, `Server` and `Transport` errors reach the caller; protocol
// failures and stale-agent results come back as `Value::Null`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwap;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use scadalink_api::{HttpMethod, RelayEnvelope, ScadaClient, TransportConfig, TransportRouter, relay};

use crate::agent::{AgentTag, AgentView};
use crate::config::ClientConfig;
use crate::demo;
use crate::error::CoreError;
use crate::model::{AgentId, AgentSummary};
use crate::store::SettingsRepository;

type RouteCell = OnceCell<Arc<ScadaClient>>;

/// Cheaply cloneable handle; clones share routing state.
#[derive(Clone)]
pub struct RequestGateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    repo: SettingsRepository,
    agents: AgentView,
    config: ClientConfig,
    /// Swapped wholesale by `reinitialize`; concurrent first callers share
    /// the one in-flight initialization of the current cell.
    route: ArcSwap<RouteCell>,
    demo: AtomicBool,
}

impl std::fmt::Debug for RequestGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestGateway")
            .field("initialized", &self.inner.route.load().initialized())
            .field("demo", &self.demo_mode())
            .finish_non_exhaustive()
    }
}

impl RequestGateway {
    pub fn new(repo: SettingsRepository, agents: AgentView, config: ClientConfig) -> Self {
        let demo = repo.load_demo_mode().unwrap_or_else(|e| {
            warn!(error = %e, "cannot read demo-mode flag, assuming off");
            false
        });
        Self {
            inner: Arc::new(GatewayInner {
                repo,
                agents,
                config,
                route: ArcSwap::from_pointee(OnceCell::new()),
                demo: AtomicBool::new(demo),
            }),
        }
    }

    // ── Routing state ────────────────────────────────────────────────

    /// Resolve the route, building it on first use.
    ///
    /// Concurrent callers share one initialization. Fails with
    /// [`CoreError::Config`] when the settings cannot form a secure route.
    pub async fn ensure_initialized(&self) -> Result<Arc<ScadaClient>, CoreError> {
        let cell = self.inner.route.load_full();
        let client = cell.get_or_try_init(|| self.build_route()).await?;
        Ok(Arc::clone(client))
    }

    /// Router of the current route.
    pub async fn router(&self) -> Result<TransportRouter, CoreError> {
        Ok(self.ensure_initialized().await?.router().clone())
    }

    /// Drop the current route; the next call rebuilds it from settings.
    pub fn reinitialize(&self) {
        debug!("request gateway reinitialized");
        self.inner.route.store(Arc::new(OnceCell::new()));
    }

    async fn build_route(&self) -> Result<Arc<ScadaClient>, CoreError> {
        let settings = self.inner.repo.load_settings()?;
        settings.validate()?;
        let config = &self.inner.config;

        #[cfg(feature = "test-util")]
        let router = match &config.origin_override {
            Some(origin) => TransportRouter::with_origin(origin, settings.route_mode())?,
            None => TransportRouter::new(
                &settings.host,
                settings.port,
                settings.route_mode(),
                config.api_port,
            )?,
        };
        #[cfg(not(feature = "test-util"))]
        let router = TransportRouter::new(
            &settings.host,
            settings.port,
            settings.route_mode(),
            config.api_port,
        )?;

        let transport = TransportConfig {
            timeout: config.request_timeout,
            user_agent: config.user_agent.clone(),
        };
        let client = ScadaClient::new(router, &transport, config.probe_timeout)?;
        info!(
            base_url = %client.router().base_url(),
            mode = %client.router().mode(),
            "route initialized"
        );
        Ok(Arc::new(client))
    }

    // ── Demo mode ────────────────────────────────────────────────────

    pub fn demo_mode(&self) -> bool {
        self.inner.demo.load(Ordering::Acquire)
    }

    /// Toggle canned responses; persisted.
    pub fn set_demo_mode(&self, enabled: bool) -> Result<(), CoreError> {
        self.inner.repo.save_demo_mode(enabled)?;
        self.inner.demo.store(enabled, Ordering::Release);
        info!(enabled, "demo mode changed");
        Ok(())
    }

    // ── Requests ─────────────────────────────────────────────────────

    /// Execute one call against the current agent.
    pub async fn request(
        &self,
        path: &str,
        method: HttpMethod,
        body: Option<Value>,
    ) -> Result<Value, CoreError> {
        let tag = self.inner.agents.current();
        match self.request_tagged(&tag, path, method, body).await {
            Ok(value) => Ok(value),
            Err(e) if e.is_surfaced() => Err(e),
            Err(e) => {
                warn!(path, error = %e, "request result discarded");
                Ok(Value::Null)
            }
        }
    }

    pub async fn get(&self, path: &str) -> Result<Value, CoreError> {
        self.request(path, HttpMethod::Get, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value, CoreError> {
        self.request(path, HttpMethod::Post, Some(body)).await
    }

    /// Like [`request`](Self::request) but every failure is returned,
    /// including protocol errors and stale-agent discards.
    pub async fn request_strict(
        &self,
        path: &str,
        method: HttpMethod,
        body: Option<Value>,
    ) -> Result<Value, CoreError> {
        let tag = self.inner.agents.current();
        self.request_tagged(&tag, path, method, body).await
    }

    async fn request_tagged(
        &self,
        tag: &AgentTag,
        path: &str,
        method: HttpMethod,
        body: Option<Value>,
    ) -> Result<Value, CoreError> {
        if self.demo_mode() {
            debug!(path, %method, "demo response");
            return Ok(relay::decode(demo::respond(method, path))?);
        }

        let client = self.ensure_initialized().await?;
        let call = async {
            if client.router().uses_relay() {
                let agent = tag.agent.as_ref().ok_or_else(|| {
                    CoreError::config("no agent selected; relayed requests need a target agent")
                })?;
                let envelope = RelayEnvelope::encode(method, path, body, agent.as_str());
                Ok::<_, CoreError>(client.proxy(&envelope).await?)
            } else {
                Ok(client.send(method, path, body.as_ref()).await?)
            }
        };

        let raw = tokio::select! {
            biased;
            () = tag.superseded() => return Err(self.mismatch(tag)),
            result = call => result?,
        };

        if !self.inner.agents.is_current(tag) {
            return Err(self.mismatch(tag));
        }
        Ok(relay::decode(raw)?)
    }

    fn mismatch(&self, tag: &AgentTag) -> CoreError {
        CoreError::IdentityMismatch {
            expected: describe(self.inner.agents.selected().as_ref()),
            got: describe(tag.agent.as_ref()),
        }
    }

    // ── Probes and listings ──────────────────────────────────────────

    /// Health probe. Never errors; any failure is `false`.
    pub async fn test_connection(&self) -> bool {
        if self.demo_mode() {
            return true;
        }
        let client = match self.ensure_initialized().await {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "health probe skipped");
                return false;
            }
        };
        match client.probe().await {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "health probe failed");
                false
            }
        }
    }

    /// Agents known to the server. Through the relay this is answered by
    /// the relay itself, so no agent needs to be selected.
    pub async fn list_agents(&self) -> Result<Vec<AgentSummary>, CoreError> {
        let raw = if self.demo_mode() {
            demo::respond(HttpMethod::Get, "agents")
        } else {
            let client = self.ensure_initialized().await?;
            client.send(HttpMethod::Get, "agents", None).await?
        };

        let raw = match relay::decode(raw) {
            Ok(Value::Null) => return Ok(Vec::new()),
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "agent list discarded");
                return Ok(Vec::new());
            }
        };
        let list = raw.get("agents").cloned().unwrap_or(raw);
        Ok(serde_json::from_value(list).unwrap_or_else(|e| {
            warn!(error = %e, "agent list has unexpected shape");
            Vec::new()
        }))
    }
}

fn describe(agent: Option<&AgentId>) -> String {
    agent.map_or_else(|| "<none>".to_owned(), ToString::to_string)
}
