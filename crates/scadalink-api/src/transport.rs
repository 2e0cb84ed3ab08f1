// Shared transport configuration and per-request routing.
//
// `TransportConfig` builds the reqwest client; `TransportRouter` owns every
// URL the layer talks to, direct or through the Cloud Bridge relay.

use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::relay;

/// Path of the relay's health endpoint.
pub const RELAY_HEALTH_PATH: &str = "/health";
/// Path of the direct API's lightweight info endpoint, used as health probe.
pub const DIRECT_HEALTH_PATH: &str = "/api/mobile/system-info";
/// Path of the relay proxy endpoint.
pub const PROXY_PATH: &str = "/api/proxy";
/// Query parameter carrying the agent identity on the stream URL.
pub const AGENT_QUERY_PARAM: &str = "agentId";

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Default timeout applied to every request.
    pub timeout: Duration,
    /// `User-Agent` header value.
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: concat!("scadalink/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    ///
    /// The client refuses plaintext URLs outright.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.clone());

        #[cfg(not(feature = "test-util"))]
        let builder = builder.https_only(true);

        builder.build().map_err(Error::Transport)
    }
}

/// How requests reach the SCADA API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum RouteMode {
    /// Straight to the SCADA server's mobile API.
    Direct,
    /// Wrapped in a relay envelope and addressed to one agent.
    Relay,
}

/// Owns base-URL construction for one server configuration.
///
/// `base_url` is always `https://{host}:{port}`. `api_url` differs only for
/// direct routes with a distinct API port configured.
#[derive(Debug, Clone)]
pub struct TransportRouter {
    mode: RouteMode,
    base_url: Url,
    api_url: Url,
    stream_base: Url,
}

impl TransportRouter {
    /// Build a router for `host:port`.
    ///
    /// `host` may carry an `https://` prefix or a trailing slash; an explicit
    /// `http://` prefix is rejected.
    pub fn new(
        host: &str,
        port: u16,
        mode: RouteMode,
        api_port: Option<u16>,
    ) -> Result<Self, Error> {
        let host = sanitize_host(host)?;

        let base_url = parse_origin("https", &host, port)?;
        let api_url = match (mode, api_port) {
            (RouteMode::Direct, Some(p)) if p != port => parse_origin("https", &host, p)?,
            _ => base_url.clone(),
        };
        let stream_base = parse_origin("wss", &host, port)?;

        debug!(%base_url, %api_url, %mode, "transport router initialized");
        Ok(Self {
            mode,
            base_url,
            api_url,
            stream_base,
        })
    }

    /// Build a router from an arbitrary origin, plaintext included.
    ///
    /// Only available to test harnesses that point the layer at a local
    /// mock server.
    #[cfg(feature = "test-util")]
    pub fn with_origin(origin: &Url, mode: RouteMode) -> Result<Self, Error> {
        let mut base_url = origin.clone();
        base_url.set_path("/");
        base_url.set_query(None);

        let stream_scheme = if base_url.scheme() == "https" { "wss" } else { "ws" };
        let host = base_url
            .host_str()
            .ok_or_else(|| Error::InvalidHost(origin.to_string()))?
            .to_owned();
        let port = base_url
            .port_or_known_default()
            .ok_or_else(|| Error::InvalidHost(origin.to_string()))?;
        let stream_base = parse_origin(stream_scheme, &host, port)?;

        Ok(Self {
            mode,
            api_url: base_url.clone(),
            base_url,
            stream_base,
        })
    }

    pub fn mode(&self) -> RouteMode {
        self.mode
    }

    pub fn uses_relay(&self) -> bool {
        self.mode == RouteMode::Relay
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    /// `GET {base}/health` through the relay, `GET {api}/api/mobile/system-info` direct.
    pub fn health_url(&self) -> Url {
        match self.mode {
            RouteMode::Relay => with_path(&self.base_url, RELAY_HEALTH_PATH),
            RouteMode::Direct => with_path(&self.api_url, DIRECT_HEALTH_PATH),
        }
    }

    /// `POST {base}/api/proxy`.
    pub fn proxy_url(&self) -> Url {
        with_path(&self.base_url, PROXY_PATH)
    }

    /// Direct URL for a mobile-API resource, e.g. `registers?analyzerId=3`.
    pub fn resource_url(&self, path: &str) -> Url {
        let normalized = relay::normalize_path(path);
        let (path_part, query) = match normalized.split_once('?') {
            Some((p, q)) => (p.to_owned(), Some(q.to_owned())),
            None => (normalized, None),
        };
        let mut url = with_path(&self.api_url, &path_part);
        url.set_query(query.as_deref());
        url
    }

    /// Secure streaming URL, with the agent identity as a query parameter
    /// when one is present.
    pub fn build_websocket_url(&self, agent_id: Option<&str>) -> Url {
        let mut url = self.stream_base.clone();
        if let Some(agent) = agent_id {
            url.query_pairs_mut().append_pair(AGENT_QUERY_PARAM, agent);
        }
        url
    }
}

fn sanitize_host(raw: &str) -> Result<String, Error> {
    let trimmed = raw.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("ws://") {
        return Err(Error::PlaintextRejected(trimmed.to_owned()));
    }
    let host = trimmed
        .trim_start_matches("https://")
        .trim_start_matches("wss://")
        .trim_end_matches('/');
    if host.is_empty() || host.contains(['/', '?', '#', ' ']) {
        return Err(Error::InvalidHost(raw.to_owned()));
    }
    Ok(host.to_owned())
}

fn parse_origin(scheme: &str, host: &str, port: u16) -> Result<Url, Error> {
    Url::parse(&format!("{scheme}://{host}:{port}/")).map_err(|e| match e {
        url::ParseError::EmptyHost
        | url::ParseError::InvalidDomainCharacter
        | url::ParseError::InvalidIpv4Address
        | url::ParseError::InvalidIpv6Address => Error::InvalidHost(host.to_owned()),
        other => Error::InvalidUrl(other),
    })
}

fn with_path(origin: &Url, path: &str) -> Url {
    let mut url = origin.clone();
    url.set_path(path);
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_route_uses_base_url_for_everything() {
        let router =
            TransportRouter::new("demo.example.com", 443, RouteMode::Relay, Some(8080)).unwrap();

        assert!(router.uses_relay());
        assert_eq!(router.base_url().as_str(), "https://demo.example.com/");
        assert_eq!(router.api_url(), router.base_url());
        assert_eq!(
            router.health_url().as_str(),
            "https://demo.example.com/health"
        );
        assert_eq!(
            router.proxy_url().as_str(),
            "https://demo.example.com/api/proxy"
        );
    }

    #[test]
    fn direct_route_with_distinct_api_port() {
        let router =
            TransportRouter::new("10.0.0.5", 8443, RouteMode::Direct, Some(8444)).unwrap();

        assert_eq!(router.base_url().as_str(), "https://10.0.0.5:8443/");
        assert_eq!(router.api_url().as_str(), "https://10.0.0.5:8444/");
        assert_eq!(
            router.health_url().as_str(),
            "https://10.0.0.5:8444/api/mobile/system-info"
        );
        assert_eq!(
            router.resource_url("registers?analyzerId=3").as_str(),
            "https://10.0.0.5:8444/api/mobile/registers?analyzerId=3"
        );
    }

    #[test]
    fn websocket_url_is_always_secure() {
        let router = TransportRouter::new("scada.local", 8443, RouteMode::Direct, None).unwrap();

        assert_eq!(
            router.build_websocket_url(None).as_str(),
            "wss://scada.local:8443/"
        );
        assert_eq!(
            router.build_websocket_url(Some("agent 7")).as_str(),
            "wss://scada.local:8443/?agentId=agent+7"
        );
    }

    #[test]
    fn https_prefix_is_tolerated_and_http_rejected() {
        let router =
            TransportRouter::new("https://scada.local/", 443, RouteMode::Relay, None).unwrap();
        assert_eq!(router.base_url().as_str(), "https://scada.local/");

        let err = TransportRouter::new("http://scada.local", 80, RouteMode::Direct, None)
            .unwrap_err();
        assert!(matches!(err, Error::PlaintextRejected(_)));
    }

    #[test]
    fn empty_host_is_rejected() {
        let err = TransportRouter::new("  ", 443, RouteMode::Relay, None).unwrap_err();
        assert!(matches!(err, Error::InvalidHost(_)));
    }
}
