// ── Agent selection ──
//
// Single source of truth for which agent is addressed. Every selection
// change publishes a new `AgentTag` epoch and cancels the previous epoch's
// token, so requests and stream sessions issued under the old agent can
// tell they are stale. Switching to a different agent clears the live
// registry before anything else happens.

use tokio::sync::{Mutex, watch};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, info};

use crate::broker::LiveBroker;
use crate::error::CoreError;
use crate::gateway::RequestGateway;
use crate::model::AgentId;
use crate::store::SettingsRepository;

// ── AgentTag ────────────────────────────────────────────────────────

/// The agent current at one point in time, stamped with a monotonically
/// increasing epoch.
#[derive(Debug, Clone)]
pub struct AgentTag {
    pub agent: Option<AgentId>,
    pub epoch: u64,
    cancel: CancellationToken,
}

impl AgentTag {
    fn first(agent: Option<AgentId>) -> Self {
        Self {
            agent,
            epoch: 0,
            cancel: CancellationToken::new(),
        }
    }

    /// Resolves once this epoch has been superseded.
    pub fn superseded(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    pub fn is_superseded(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn agent_str(&self) -> Option<&str> {
        self.agent.as_ref().map(AgentId::as_str)
    }
}

// ── AgentView ───────────────────────────────────────────────────────

/// Read-only handle on the current [`AgentTag`].
#[derive(Debug, Clone)]
pub struct AgentView(watch::Receiver<AgentTag>);

impl AgentView {
    pub fn current(&self) -> AgentTag {
        self.0.borrow().clone()
    }

    pub fn selected(&self) -> Option<AgentId> {
        self.0.borrow().agent.clone()
    }

    /// Whether `tag` is still the current epoch.
    pub fn is_current(&self, tag: &AgentTag) -> bool {
        self.0.borrow().epoch == tag.epoch
    }

    /// A fresh receiver for change notifications.
    pub fn subscribe(&self) -> watch::Receiver<AgentTag> {
        self.0.clone()
    }
}

/// Create the tag channel with `initial` as epoch 0.
pub fn channel(initial: Option<AgentId>) -> (watch::Sender<AgentTag>, AgentView) {
    let (tx, rx) = watch::channel(AgentTag::first(initial));
    (tx, AgentView(rx))
}

// ── AgentSelector ───────────────────────────────────────────────────

/// Owns the tag sender. Switches are serialized and complete all their
/// side effects before returning.
pub struct AgentSelector {
    repo: SettingsRepository,
    tags: watch::Sender<AgentTag>,
    broker: LiveBroker,
    gateway: RequestGateway,
    switch: Mutex<()>,
}

impl std::fmt::Debug for AgentSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSelector")
            .field("current", &*self.tags.borrow())
            .finish_non_exhaustive()
    }
}

impl AgentSelector {
    pub fn new(
        repo: SettingsRepository,
        tags: watch::Sender<AgentTag>,
        broker: LiveBroker,
        gateway: RequestGateway,
    ) -> Self {
        Self {
            repo,
            tags,
            broker,
            gateway,
            switch: Mutex::new(()),
        }
    }

    pub fn selected(&self) -> Option<AgentId> {
        self.tags.borrow().agent.clone()
    }

    pub fn view(&self) -> AgentView {
        AgentView(self.tags.subscribe())
    }

    /// Change the addressed agent.
    ///
    /// A different non-null agent: clear the live registry, persist,
    /// publish the new epoch, then reinitialize the gateway and rebind the
    /// stream. `None`: persist and publish only. The current value: no-op.
    pub async fn set_selected(&self, next: Option<AgentId>) -> Result<(), CoreError> {
        let _switch = self.switch.lock().await;

        let current = self.selected();
        if current == next {
            debug!(agent = ?next, "agent unchanged");
            return Ok(());
        }

        match next {
            None => {
                self.repo.save_agent(None)?;
                self.publish(None);
                info!(previous = ?current, "agent selection cleared");
            }
            Some(agent) => {
                self.broker.clear_all();
                self.repo.save_agent(Some(&agent))?;
                self.publish(Some(agent.clone()));
                self.gateway.reinitialize();
                self.broker.rebind().await;
                info!(previous = ?current, %agent, "agent switched");
            }
        }
        Ok(())
    }

    fn publish(&self, agent: Option<AgentId>) {
        self.tags.send_modify(|tag| {
            tag.cancel.cancel();
            *tag = AgentTag {
                agent,
                epoch: tag.epoch.wrapping_add(1),
                cancel: CancellationToken::new(),
            };
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_tracks_epochs() {
        let (tx, view) = channel(Some(AgentId::new("a")));
        let first = view.current();
        assert!(view.is_current(&first));
        assert_eq!(first.agent_str(), Some("a"));

        tx.send_modify(|tag| {
            tag.cancel.cancel();
            *tag = AgentTag {
                agent: Some(AgentId::new("b")),
                epoch: tag.epoch + 1,
                cancel: CancellationToken::new(),
            };
        });

        assert!(!view.is_current(&first));
        assert!(first.is_superseded());
        assert_eq!(view.selected(), Some(AgentId::new("b")));
    }
}
