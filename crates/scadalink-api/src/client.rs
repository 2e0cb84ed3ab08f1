// HTTP client for the SCADA mobile API, direct or through the relay.
//
// Returns raw `serde_json::Value` bodies; compact expansion and agent
// tagging are the caller's concern.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::relay::{HttpMethod, RelayEnvelope};
use crate::transport::{TransportConfig, TransportRouter};

/// Raw HTTP client bound to one [`TransportRouter`].
#[derive(Debug, Clone)]
pub struct ScadaClient {
    http: reqwest::Client,
    router: TransportRouter,
    request_timeout: Duration,
    probe_timeout: Duration,
}

/// Error body shape shared by the relay and the mobile API.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ScadaClient {
    /// Build a client with a fresh `reqwest::Client` from `transport`.
    pub fn new(
        router: TransportRouter,
        transport: &TransportConfig,
        probe_timeout: Duration,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, router, transport.timeout, probe_timeout))
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        router: TransportRouter,
        request_timeout: Duration,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            http,
            router,
            request_timeout,
            probe_timeout,
        }
    }

    pub fn router(&self) -> &TransportRouter {
        &self.router
    }

    // ── Calls ────────────────────────────────────────────────────────

    /// Direct call against `{api}/api/mobile/{path}`.
    pub async fn send(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, Error> {
        let url = self.router.resource_url(path);
        debug!(%method, %url, "direct request");

        let mut req = self
            .http
            .request(method.into(), url)
            .timeout(self.request_timeout);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await.map_err(|e| map_send_error(e, self.request_timeout))?;
        self.handle_response(resp).await
    }

    /// Relayed call: `POST {base}/api/proxy` with `envelope` as the body.
    pub async fn proxy(&self, envelope: &RelayEnvelope) -> Result<Value, Error> {
        let url = self.router.proxy_url();
        debug!(
            method = %envelope.method,
            path = %envelope.path,
            agent = %envelope.target_agent_id,
            "relay request"
        );

        let resp = self
            .http
            .post(url)
            .timeout(self.request_timeout)
            .json(envelope)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.request_timeout))?;
        self.handle_response(resp).await
    }

    /// Health probe against [`TransportRouter::health_url`]. Any 2xx passes.
    pub async fn probe(&self) -> Result<(), Error> {
        let url: Url = self.router.health_url();
        debug!(%url, "health probe");

        let resp = self
            .http
            .get(url)
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.probe_timeout))?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Self::parse_error(status, resp).await)
        }
    }

    // ── Response handling ────────────────────────────────────────────

    async fn handle_response(&self, resp: reqwest::Response) -> Result<Value, Error> {
        let status = resp.status();
        if !status.is_success() {
            return Err(Self::parse_error(status, resp).await);
        }

        let body = resp
            .text()
            .await
            .map_err(|e| map_send_error(e, self.request_timeout))?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(200).collect();
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body,
            }
        })
    }

    async fn parse_error(status: reqwest::StatusCode, resp: reqwest::Response) -> Error {
        let raw = resp.text().await.unwrap_or_default();

        let message = serde_json::from_str::<ErrorResponse>(&raw)
            .ok()
            .and_then(|err| err.message.or(err.error))
            .unwrap_or_else(|| {
                if raw.trim().is_empty() {
                    status.to_string()
                } else {
                    raw
                }
            });

        Error::Server {
            status: status.as_u16(),
            message,
        }
    }
}

fn map_send_error(err: reqwest::Error, timeout: Duration) -> Error {
    if err.is_timeout() {
        Error::Timeout {
            timeout_secs: timeout.as_secs(),
        }
    } else {
        Error::Transport(err)
    }
}
