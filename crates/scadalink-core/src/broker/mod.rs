// ── Live subscription broker ──
//
// Owns the persistent streaming connection and the registry of value
// subscriptions. Server-side watch/unwatch frames are sent only on a key's
// 0→1 and 1→0 callback transitions. After a drop the session reconnects
// through its `RetryPolicy` and re-issues `watch` for every registered key;
// a per-connection set of server-side subscriptions keeps frames unique.
//
// Pushes are dispatched under the read side of a gate. `clear_all` takes
// the write side, so once it returns no callback from the old registry is
// running or will run.

mod protocol;
mod registry;

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::task::{Context, Poll};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::Stream;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use scadalink_api::{StreamConnector, StreamLink};

use crate::agent::{AgentTag, AgentView};
use crate::error::CoreError;
use crate::gateway::RequestGateway;
use crate::model::{ConnectionState, LiveValue, RegisterSubscriptionKey};
use crate::retry::RetryPolicy;

pub use protocol::ClientFrame;
pub use registry::ValueCallback;

use protocol::ServerFrame;
use registry::Registry;

/// Cheaply cloneable handle; clones share one registry and one session.
#[derive(Clone)]
pub struct LiveBroker {
    inner: Arc<BrokerInner>,
}

struct BrokerInner {
    connector: Arc<dyn StreamConnector>,
    gateway: RequestGateway,
    agents: AgentView,
    retry: RetryPolicy,
    registry: Mutex<Registry>,
    gate: RwLock<()>,
    /// Bumped by `clear_all`; sessions started before it stop dispatching.
    generation: AtomicU64,
    frames: Mutex<Option<mpsc::UnboundedSender<ClientFrame>>>,
    state: watch::Sender<ConnectionState>,
    session: tokio::sync::Mutex<Option<Session>>,
}

struct Session {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Session {
    fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl std::fmt::Debug for LiveBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveBroker")
            .field("state", &*self.inner.state.borrow())
            .field("keys", &self.inner.registry().keys().len())
            .finish_non_exhaustive()
    }
}

impl LiveBroker {
    pub fn new(
        connector: Arc<dyn StreamConnector>,
        gateway: RequestGateway,
        agents: AgentView,
        retry: RetryPolicy,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(BrokerInner {
                connector,
                gateway,
                agents,
                retry,
                registry: Mutex::new(Registry::default()),
                gate: RwLock::new(()),
                generation: AtomicU64::new(0),
                frames: Mutex::new(None),
                state,
                session: tokio::sync::Mutex::new(None),
            }),
        }
    }

    // ── State ────────────────────────────────────────────────────────

    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Receiver for state changes.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Keys with at least one callback.
    pub fn active_keys(&self) -> Vec<RegisterSubscriptionKey> {
        self.inner.registry().keys()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Open the stream for the current agent. A no-op while a session runs.
    ///
    /// A failed first open hands over to the retry schedule, as a dropped
    /// link would. Fails with [`CoreError::Config`] on a relayed route with
    /// no agent selected, and with [`CoreError::Transport`] if the open
    /// fails and the policy allows no retries.
    pub async fn connect(&self) -> Result<(), CoreError> {
        let mut session = self.inner.session.lock().await;
        if session.as_ref().is_some_and(Session::is_running) {
            debug!("live stream already running");
            return Ok(());
        }

        let tag = self.inner.agents.current();
        let router = self.inner.gateway.router().await?;
        if router.uses_relay() && tag.agent.is_none() {
            return Err(CoreError::config(
                "no agent selected; the relayed live stream needs a target agent",
            ));
        }
        let url = router.build_websocket_url(tag.agent_str());

        self.inner.set_state(ConnectionState::Connecting);
        let link = match self.inner.connector.open(url.clone()).await {
            Ok(link) => {
                self.inner.set_state(ConnectionState::Connected);
                info!(%url, "live stream session started");
                Some(link)
            }
            Err(e) if self.inner.retry.delay_for(1).is_none() => {
                warn!(%url, error = %e, "live stream open failed");
                self.inner.set_state(ConnectionState::Disconnected);
                return Err(e.into());
            }
            Err(e) => {
                warn!(%url, error = %e, "live stream open failed, retrying");
                None
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        *self.inner.frames() = Some(tx);

        let cancel = CancellationToken::new();
        let ctx = SessionCtx {
            inner: Arc::clone(&self.inner),
            tag,
            url,
            generation: self.inner.generation.load(Ordering::Acquire),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(run_session(ctx, link, rx));
        *session = Some(Session { cancel, task });
        Ok(())
    }

    /// Close the stream. Subscriptions stay registered and are re-issued
    /// on the next `connect`.
    pub async fn disconnect(&self) {
        let session = self.inner.session.lock().await.take();
        *self.inner.frames() = None;
        if let Some(session) = session {
            session.cancel.cancel();
            let _ = session.task.await;
            info!("live stream session stopped");
        }
        self.inner.set_state(ConnectionState::Disconnected);
    }

    /// Restart a running session so it targets the current agent. Does
    /// nothing when no session runs; see [`connect`](Self::connect).
    pub async fn rebind(&self) {
        let running = self
            .inner
            .session
            .lock()
            .await
            .as_ref()
            .is_some_and(Session::is_running);
        if !running {
            return;
        }
        self.disconnect().await;
        if let Err(e) = self.connect().await {
            warn!(error = %e, "live stream could not rebind to the new agent");
        }
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Register `callback` for pushes on `key`.
    pub fn watch(&self, key: RegisterSubscriptionKey, callback: ValueCallback) {
        let mut registry = self.inner.registry();
        if registry.add(key.clone(), callback) {
            debug!(%key, "first watcher, subscribing");
            self.inner.send_frame(ClientFrame::Watch { key });
        }
    }

    /// Remove `callback` from `key`. Unknown callbacks are ignored.
    pub fn unwatch(&self, key: &RegisterSubscriptionKey, callback: &ValueCallback) {
        let mut registry = self.inner.registry();
        if registry.remove(key, callback) {
            debug!(%key, "last watcher gone, unsubscribing");
            self.inner.send_frame(ClientFrame::Unwatch { key: key.clone() });
        }
    }

    /// Subscribe as a stream. Dropping the stream unwatches.
    pub fn watch_stream(&self, key: RegisterSubscriptionKey) -> ValueStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback: ValueCallback = Arc::new(move |value: &LiveValue| {
            let _ = tx.send(value.clone());
        });
        self.watch(key.clone(), Arc::clone(&callback));
        ValueStream {
            values: UnboundedReceiverStream::new(rx),
            broker: self.clone(),
            key,
            callback,
        }
    }

    /// Drop every subscription, sending `unwatch` for each active key.
    ///
    /// Blocks until no dispatch is in flight; afterwards the current
    /// session no longer dispatches at all.
    pub fn clear_all(&self) {
        let _gate = self
            .inner
            .gate
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        let keys = self.inner.registry().drain();
        info!(count = keys.len(), "live registry cleared");
        for key in keys {
            self.inner.send_frame(ClientFrame::Unwatch { key });
        }
    }
}

impl BrokerInner {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn frames(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<ClientFrame>>> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send_frame(&self, frame: ClientFrame) {
        if let Some(tx) = self.frames().as_ref() {
            let _ = tx.send(frame);
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                debug!(from = %current, to = %state, "live stream state");
                *current = state;
                true
            }
        });
    }

    /// Parse one inbound frame and fan it out.
    fn dispatch(&self, text: &str, tag: &AgentTag, generation: u64) {
        let frame: ServerFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "malformed live frame dropped");
                return;
            }
        };
        let ServerFrame::Value(push) = frame else {
            trace!("non-value live frame ignored");
            return;
        };

        let _gate = self.gate.read().unwrap_or_else(PoisonError::into_inner);
        if self.generation.load(Ordering::Acquire) != generation || !self.agents.is_current(tag)
        {
            debug!(key = %push.key, "push for a previous agent discarded");
            return;
        }
        if let (Some(from), Some(current)) = (push.agent_id.as_deref(), tag.agent_str()) {
            if from != current {
                debug!(key = %push.key, from, current, "push tagged for another agent discarded");
                return;
            }
        }

        let Some(callbacks) = self.registry().callbacks(&push.key) else {
            debug!(key = %push.key, "push for unwatched key dropped");
            return;
        };
        let value = push.into_live_value();
        for callback in &callbacks {
            callback(&value);
        }
    }
}

// ── Session task ─────────────────────────────────────────────────────

struct SessionCtx {
    inner: Arc<BrokerInner>,
    tag: AgentTag,
    url: Url,
    generation: u64,
    cancel: CancellationToken,
}

enum PumpExit {
    Cancelled,
    Dropped,
}

/// Connected → pump until drop → reconnect with retry → resubscribe.
/// Starts in the retry schedule when the first open failed.
async fn run_session(
    ctx: SessionCtx,
    first: Option<StreamLink>,
    mut frames: mpsc::UnboundedReceiver<ClientFrame>,
) {
    let mut link = match first {
        Some(link) => link,
        None => match reconnect(&ctx).await {
            Some(link) => link,
            None => return,
        },
    };
    loop {
        let mut subscribed = HashSet::new();
        resubscribe(&ctx, &link, &mut subscribed);

        match pump(&ctx, &mut link, &mut frames, &mut subscribed).await {
            PumpExit::Cancelled => return,
            PumpExit::Dropped => warn!(url = %ctx.url, "live stream dropped"),
        }

        match reconnect(&ctx).await {
            Some(next) => link = next,
            None => return,
        }
    }
}

/// Issue `watch` for every registered key on a fresh connection.
fn resubscribe(
    ctx: &SessionCtx,
    link: &StreamLink,
    subscribed: &mut HashSet<RegisterSubscriptionKey>,
) {
    let keys = ctx.inner.registry().keys();
    if !keys.is_empty() {
        debug!(count = keys.len(), "re-issuing watches");
    }
    for key in keys {
        forward(link, subscribed, ClientFrame::Watch { key });
    }
}

async fn pump(
    ctx: &SessionCtx,
    link: &mut StreamLink,
    frames: &mut mpsc::UnboundedReceiver<ClientFrame>,
    subscribed: &mut HashSet<RegisterSubscriptionKey>,
) -> PumpExit {
    loop {
        tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => return PumpExit::Cancelled,
            frame = frames.recv() => {
                let Some(frame) = frame else {
                    return PumpExit::Cancelled;
                };
                if !forward(link, subscribed, frame) {
                    return PumpExit::Dropped;
                }
            }
            text = link.inbound.recv() => {
                let Some(text) = text else {
                    return PumpExit::Dropped;
                };
                ctx.inner.dispatch(&text, &ctx.tag, ctx.generation);
            }
        }
    }
}

/// Send `frame` unless it would duplicate server-side state. Returns
/// `false` once the link is gone.
fn forward(
    link: &StreamLink,
    subscribed: &mut HashSet<RegisterSubscriptionKey>,
    frame: ClientFrame,
) -> bool {
    let changed = match &frame {
        ClientFrame::Watch { key } => subscribed.insert(key.clone()),
        ClientFrame::Unwatch { key } => subscribed.remove(key),
    };
    if !changed {
        trace!(key = %frame.key(), "duplicate frame suppressed");
        return true;
    }
    match serde_json::to_string(&frame) {
        Ok(text) => link.outbound.send(text).is_ok(),
        Err(e) => {
            warn!(error = %e, "cannot encode live frame");
            true
        }
    }
}

/// Retry opening the link. `None` when cancelled or out of attempts.
async fn reconnect(ctx: &SessionCtx) -> Option<StreamLink> {
    let mut attempt: u32 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        let Some(delay) = ctx.inner.retry.delay_for(attempt) else {
            warn!(attempts = attempt - 1, "live stream retries exhausted");
            if !ctx.cancel.is_cancelled() {
                *ctx.inner.frames() = None;
                ctx.inner.set_state(ConnectionState::Disconnected);
            }
            return None;
        };

        ctx.inner
            .set_state(ConnectionState::Reconnecting { attempt });
        info!(attempt, delay_ms = delay.as_millis(), "live stream reconnecting");

        tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => return None,
            () = tokio::time::sleep(delay) => {}
        }

        let opened = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => return None,
            opened = ctx.inner.connector.open(ctx.url.clone()) => opened,
        };
        match opened {
            Ok(link) => {
                ctx.inner.set_state(ConnectionState::Connected);
                info!(attempt, "live stream re-established");
                return Some(link);
            }
            Err(e) => warn!(attempt, error = %e, "live stream reconnect failed"),
        }
    }
}

// ── ValueStream ──────────────────────────────────────────────────────

/// Push values for one key as a `Stream`. Unwatches on drop.
pub struct ValueStream {
    values: UnboundedReceiverStream<LiveValue>,
    broker: LiveBroker,
    key: RegisterSubscriptionKey,
    callback: ValueCallback,
}

impl ValueStream {
    pub fn key(&self) -> &RegisterSubscriptionKey {
        &self.key
    }
}

impl Stream for ValueStream {
    type Item = LiveValue;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.values).poll_next(cx)
    }
}

impl Drop for ValueStream {
    fn drop(&mut self) {
        self.broker.unwatch(&self.key, &self.callback);
    }
}
