// ── Connection supervisor ──
//
// Top-level state machine and the only component applications talk to.
// Wires the settings repository, agent selector, request gateway and live
// broker together; probes the server, schedules retries through a
// `RetryPolicy`, and mirrors the live stream's recovery into its own
// state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use scadalink_api::{HttpMethod, StreamConnector};

use crate::agent::{self, AgentSelector};
use crate::broker::{LiveBroker, ValueCallback, ValueStream};
use crate::config::{ClientConfig, ServerSettings};
use crate::error::CoreError;
use crate::gateway::RequestGateway;
use crate::model::{AgentId, AgentSummary, ConnectionState, RegisterSubscriptionKey};
use crate::store::{KeyValueStore, SettingsRepository};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Notifications for the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// Connected (or recovered); screens should reload their data.
    RefreshRequested,
    /// A health probe failed; `attempt` counts probes in this cycle.
    ProbeFailed { attempt: u32 },
    /// Retry `attempt` will probe again after `delay`.
    RetryScheduled { attempt: u32, delay: Duration },
    SettingsUpdated,
    AgentChanged(Option<AgentId>),
}

/// Explicitly constructed connection layer. Cheaply cloneable.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<SupervisorInner>,
}

struct SupervisorInner {
    repo: SettingsRepository,
    config: ClientConfig,
    gateway: RequestGateway,
    broker: LiveBroker,
    selector: AgentSelector,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<SupervisorEvent>,
    /// Parent of every per-cycle token.
    cancel: CancellationToken,
    /// Cancels the retry loop and bridge of the current connection cycle.
    cycle: Mutex<CancellationToken>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Serializes connect/disconnect/retry probes.
    lifecycle: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("state", &self.connection_state())
            .field("agent", &self.selected_agent())
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Wire the layer over `store`, opening live streams via `connector`.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        connector: Arc<dyn StreamConnector>,
        config: ClientConfig,
    ) -> Self {
        let repo = SettingsRepository::new(store);
        let initial_agent = repo.load_agent().unwrap_or_else(|e| {
            warn!(error = %e, "cannot restore selected agent");
            None
        });

        let (tags, view) = agent::channel(initial_agent);
        let gateway = RequestGateway::new(repo.clone(), view.clone(), config.clone());
        let broker = LiveBroker::new(connector, gateway.clone(), view, config.stream_retry);
        let selector = AgentSelector::new(repo.clone(), tags, broker.clone(), gateway.clone());

        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let cycle = Mutex::new(cancel.child_token());

        Self {
            inner: Arc::new(SupervisorInner {
                repo,
                config,
                gateway,
                broker,
                selector,
                state,
                events,
                cancel,
                cycle,
                tasks: Mutex::new(Vec::new()),
                lifecycle: tokio::sync::Mutex::new(()),
            }),
        }
    }

    // ── State & events ───────────────────────────────────────────────

    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Receiver for connection-state changes.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.inner.events.subscribe()
    }

    pub fn settings(&self) -> Result<ServerSettings, CoreError> {
        Ok(self.inner.repo.load_settings()?)
    }

    pub fn selected_agent(&self) -> Option<AgentId> {
        self.inner.selector.selected()
    }

    pub fn gateway(&self) -> &RequestGateway {
        &self.inner.gateway
    }

    pub fn broker(&self) -> &LiveBroker {
        &self.inner.broker
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Connect on launch when the persisted settings ask for it.
    pub async fn start(&self) -> Result<ConnectionState, CoreError> {
        let settings = self.inner.repo.load_settings()?;
        if settings.auto_connect {
            info!(host = %settings.host, "auto-connecting");
            self.connect().await
        } else {
            Ok(self.connection_state())
        }
    }

    /// Probe the server and bring the layer up.
    ///
    /// Returns the current state without probing when already connected.
    /// A failed probe leaves the state `Disconnected` and schedules retries;
    /// only invalid settings are an error.
    pub async fn connect(&self) -> Result<ConnectionState, CoreError> {
        let _lifecycle = self.inner.lifecycle.lock().await;

        let current = self.connection_state();
        if current.is_established() {
            debug!(state = %current, "connect: already established");
            return Ok(current);
        }

        let cycle = self.new_cycle();
        if self.probe(1).await? {
            Ok(ConnectionState::Connected)
        } else {
            self.spawn_task(retry_loop(self.clone(), cycle));
            Ok(self.connection_state())
        }
    }

    /// Cancel pending retries and stop the live stream.
    pub async fn disconnect(&self) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.shutdown_cycle().await;
        info!("disconnected");
    }

    /// Ask consumers to reload. `false` when not connected.
    pub fn refresh(&self) -> bool {
        if self.connection_state().is_established() {
            self.emit(SupervisorEvent::RefreshRequested);
            true
        } else {
            false
        }
    }

    /// Validate, persist and apply new settings.
    ///
    /// When connected, the connection is torn down and re-established only
    /// if `settings.auto_connect` is set.
    pub async fn update_settings(
        &self,
        settings: ServerSettings,
    ) -> Result<ConnectionState, CoreError> {
        settings.validate()?;
        self.inner.repo.save_settings(&settings)?;
        self.inner.gateway.reinitialize();
        self.emit(SupervisorEvent::SettingsUpdated);
        info!(host = %settings.host, port = settings.port, "settings updated");

        if self.connection_state().is_established() {
            self.disconnect().await;
            if settings.auto_connect {
                return self.connect().await;
            }
        }
        Ok(self.connection_state())
    }

    // ── Agent selection ──────────────────────────────────────────────

    /// Select `agent` and confirm it answers `system-info`. A failed
    /// confirmation clears the selection and returns the error.
    pub async fn select_agent(&self, agent: AgentId) -> Result<(), CoreError> {
        self.inner.selector.set_selected(Some(agent.clone())).await?;
        self.emit(SupervisorEvent::AgentChanged(Some(agent.clone())));

        match self
            .inner
            .gateway
            .request_strict("system-info", HttpMethod::Get, None)
            .await
        {
            Ok(_) => {
                info!(%agent, "agent confirmed");
                self.ensure_stream().await;
                self.emit(SupervisorEvent::RefreshRequested);
                Ok(())
            }
            Err(e) => {
                warn!(%agent, error = %e, "agent confirmation failed, clearing selection");
                self.inner.selector.set_selected(None).await?;
                self.emit(SupervisorEvent::AgentChanged(None));
                Err(e)
            }
        }
    }

    /// Forget the selected agent and disconnect.
    pub async fn logout(&self) -> Result<(), CoreError> {
        self.inner.selector.set_selected(None).await?;
        self.emit(SupervisorEvent::AgentChanged(None));
        self.disconnect().await;
        Ok(())
    }

    pub async fn list_agents(&self) -> Result<Vec<AgentSummary>, CoreError> {
        self.inner.gateway.list_agents().await
    }

    // ── Requests & subscriptions ─────────────────────────────────────

    pub async fn request(
        &self,
        path: &str,
        method: HttpMethod,
        body: Option<Value>,
    ) -> Result<Value, CoreError> {
        self.inner.gateway.request(path, method, body).await
    }

    pub fn watch(&self, key: RegisterSubscriptionKey, callback: ValueCallback) {
        self.inner.broker.watch(key, callback);
    }

    pub fn unwatch(&self, key: &RegisterSubscriptionKey, callback: &ValueCallback) {
        self.inner.broker.unwatch(key, callback);
    }

    pub fn watch_stream(&self, key: RegisterSubscriptionKey) -> ValueStream {
        self.inner.broker.watch_stream(key)
    }

    pub fn demo_mode(&self) -> bool {
        self.inner.gateway.demo_mode()
    }

    pub fn set_demo_mode(&self, enabled: bool) -> Result<(), CoreError> {
        self.inner.gateway.set_demo_mode(enabled)
    }

    // ── Internals ────────────────────────────────────────────────────

    /// One health probe. `Ok(true)` brings the layer up.
    async fn probe(&self, attempt: u32) -> Result<bool, CoreError> {
        self.set_state(ConnectionState::Connecting);

        let settings = self.inner.repo.load_settings()?;
        if let Err(e) = settings.validate() {
            self.set_state(ConnectionState::Disconnected);
            return Err(e);
        }

        if !self.inner.gateway.test_connection().await {
            self.set_state(ConnectionState::Disconnected);
            self.emit(SupervisorEvent::ProbeFailed { attempt });
            warn!(host = %settings.host, attempt, "health probe failed");
            return Ok(false);
        }

        self.set_state(ConnectionState::Connected);
        info!(host = %settings.host, relay = settings.uses_relay(), "connected");
        self.emit(SupervisorEvent::RefreshRequested);

        if self.inner.gateway.demo_mode() {
            debug!("demo mode, live stream not started");
        } else {
            let stream_state = self.inner.broker.state();
            self.spawn_task(bridge_stream_state(
                self.clone(),
                stream_state,
                self.current_cycle(),
            ));
            if let Err(e) = self.inner.broker.connect().await {
                warn!(error = %e, "live stream unavailable");
            }
        }
        Ok(true)
    }

    /// Start the live stream when the layer is up without one, e.g. a relay
    /// connected before any agent was chosen.
    async fn ensure_stream(&self) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        if !self.connection_state().is_established() || self.inner.gateway.demo_mode() {
            return;
        }
        if let Err(e) = self.inner.broker.connect().await {
            warn!(error = %e, "live stream unavailable");
        }
    }

    /// Cancel the previous cycle and start a fresh one.
    fn new_cycle(&self) -> CancellationToken {
        let mut cycle = self.cycle();
        cycle.cancel();
        *cycle = self.inner.cancel.child_token();
        cycle.clone()
    }

    fn current_cycle(&self) -> CancellationToken {
        self.cycle().clone()
    }

    async fn shutdown_cycle(&self) {
        self.new_cycle();
        let handles: Vec<_> = self
            .inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            let _ = handle.await;
        }
        self.inner.broker.disconnect().await;
        self.set_state(ConnectionState::Disconnected);
    }

    fn spawn_task<F>(&self, fut: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|t| !t.is_finished());
        tasks.push(tokio::spawn(fut));
    }

    fn cycle(&self) -> MutexGuard<'_, CancellationToken> {
        self.inner.cycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ConnectionState) {
        self.inner.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                debug!(from = %current, to = %state, "connection state");
                *current = state;
                true
            }
        });
    }

    fn emit(&self, event: SupervisorEvent) {
        // no subscribers is fine
        let _ = self.inner.events.send(event);
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Probe again on the connect retry schedule until connected, cancelled
/// or out of attempts.
async fn retry_loop(supervisor: Supervisor, cancel: CancellationToken) {
    let policy = supervisor.inner.config.connect_retry;
    let mut attempt: u32 = 1;

    loop {
        let Some(delay) = policy.delay_for(attempt) else {
            warn!(attempts = attempt, "connect retries exhausted");
            return;
        };
        supervisor.emit(SupervisorEvent::RetryScheduled { attempt, delay });
        info!(attempt, delay_secs = delay.as_secs(), "connect retry scheduled");

        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }

        let _lifecycle = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            guard = supervisor.inner.lifecycle.lock() => guard,
        };

        attempt = attempt.saturating_add(1);
        match supervisor.probe(attempt).await {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                warn!(error = %e, "connect retry stopped");
                return;
            }
        }
    }
}

/// Mirror live stream recovery into the supervisor state.
async fn bridge_stream_state(
    supervisor: Supervisor,
    mut stream_state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
) {

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            changed = stream_state.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }

        let live = *stream_state.borrow_and_update();
        let current = supervisor.connection_state();
        match (live, current) {
            (ConnectionState::Reconnecting { attempt }, current) if current.is_established() => {
                supervisor.set_state(ConnectionState::Reconnecting { attempt });
            }
            (ConnectionState::Connected, ConnectionState::Reconnecting { .. }) => {
                supervisor.set_state(ConnectionState::Connected);
                supervisor.emit(SupervisorEvent::RefreshRequested);
            }
            (ConnectionState::Disconnected, ConnectionState::Reconnecting { .. }) => {
                warn!("live stream reconnects exhausted");
                supervisor.set_state(ConnectionState::Disconnected);
            }
            _ => {}
        }
    }
}
