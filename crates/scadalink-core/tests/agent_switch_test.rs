#![allow(clippy::unwrap_used)]
// Agent switching: registry reset, stream rebind and stale-result discard.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use scadalink_core::agent;
use scadalink_core::{
    AgentId, AgentSelector, LiveBroker, LiveValue, RequestGateway, SettingsRepository,
    ValueCallback,
};

use common::{
    DEAD_ORIGIN, MockConnector, ServerEnd, config_for, key, key_json, next_end, push_frame,
    relay_store, settle,
};

// ── Helpers ─────────────────────────────────────────────────────────

struct Harness {
    repo: SettingsRepository,
    gateway: RequestGateway,
    broker: LiveBroker,
    selector: AgentSelector,
    connector: MockConnector,
    ends: mpsc::UnboundedReceiver<ServerEnd>,
}

fn harness(origin: &str) -> Harness {
    let repo = SettingsRepository::new(relay_store(Some("agent-a")));
    let config = config_for(origin);
    let (tags, view) = agent::channel(repo.load_agent().unwrap());
    let gateway = RequestGateway::new(repo.clone(), view.clone(), config.clone());
    let (connector, ends) = MockConnector::new();
    let broker = LiveBroker::new(
        Arc::new(connector.clone()),
        gateway.clone(),
        view,
        config.stream_retry,
    );
    let selector = AgentSelector::new(repo.clone(), tags, broker.clone(), gateway.clone());
    Harness {
        repo,
        gateway,
        broker,
        selector,
        connector,
        ends,
    }
}

fn counter() -> (ValueCallback, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&hits);
    let callback: ValueCallback = Arc::new(move |_: &LiveValue| {
        sink.fetch_add(1, Ordering::SeqCst);
    });
    (callback, hits)
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn switching_agent_clears_registry_and_rebinds_stream() {
    let mut h = harness(DEAD_ORIGIN);
    h.broker.connect().await.unwrap();
    let mut end_a = next_end(&mut h.ends).await;
    assert_eq!(end_a.url.query(), Some("agentId=agent-a"));

    let (old_cb, old_hits) = counter();
    h.broker.watch(key(1), old_cb);
    assert_eq!(end_a.next_frame().await["type"], "watch");

    h.selector
        .set_selected(Some(AgentId::new("agent-b")))
        .await
        .unwrap();

    assert!(h.broker.active_keys().is_empty());
    assert_eq!(h.repo.load_agent().unwrap(), Some(AgentId::new("agent-b")));

    let mut end_b = next_end(&mut h.ends).await;
    assert_eq!(end_b.url.query(), Some("agentId=agent-b"));

    // Same key, new agent: one fresh watch on the new link only.
    let (new_cb, new_hits) = counter();
    h.broker.watch(key(1), new_cb);
    assert_eq!(
        end_b.next_frame().await,
        json!({"type": "watch", "key": key_json(1)})
    );

    // Late push from the old agent's link must not reach anyone.
    let _ = end_a.to_client.send(push_frame(1, 9.0).to_string());
    end_b.push(&push_frame(1, 1.0));
    settle().await;

    assert_eq!(old_hits.load(Ordering::SeqCst), 0);
    assert_eq!(new_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn selecting_the_current_agent_is_a_noop() {
    let mut h = harness(DEAD_ORIGIN);
    h.broker.connect().await.unwrap();
    let _end = next_end(&mut h.ends).await;

    let (cb, _) = counter();
    h.broker.watch(key(2), cb);

    h.selector
        .set_selected(Some(AgentId::new("agent-a")))
        .await
        .unwrap();

    assert_eq!(h.connector.opens(), 1);
    assert_eq!(h.broker.active_keys(), vec![key(2)]);
}

#[tokio::test]
async fn clearing_selection_keeps_subscriptions() {
    let h = harness(DEAD_ORIGIN);
    let (cb, _) = counter();
    h.broker.watch(key(3), cb);

    h.selector.set_selected(None).await.unwrap();

    assert_eq!(h.selector.selected(), None);
    assert_eq!(h.repo.load_agent().unwrap(), None);
    assert_eq!(h.broker.active_keys(), vec![key(3)]);
}

#[tokio::test]
async fn in_flight_result_for_previous_agent_is_discarded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/proxy"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"id": 1}]))
                .set_delay(Duration::from_millis(800)),
        )
        .mount(&server)
        .await;

    let h = harness(&server.uri());
    let gateway = h.gateway.clone();
    let pending = tokio::spawn(async move { gateway.get("analyzers").await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    h.selector
        .set_selected(Some(AgentId::new("agent-b")))
        .await
        .unwrap();

    let result = pending.await.unwrap().unwrap();
    assert_eq!(result, Value::Null);
}
