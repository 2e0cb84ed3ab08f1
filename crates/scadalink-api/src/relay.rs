// Cloud Bridge relay envelope codec.
//
// Through the relay every call becomes `POST /api/proxy` carrying a JSON
// envelope that names the real method, mobile-API path and target agent.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::compact;
use crate::error::Error;

/// Prefix every mobile-API resource lives under.
pub const MOBILE_API_PREFIX: &str = "/api/mobile";

/// HTTP method carried inside an envelope, or used for a direct call.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Self::GET,
            HttpMethod::Post => Self::POST,
            HttpMethod::Put => Self::PUT,
            HttpMethod::Delete => Self::DELETE,
        }
    }
}

/// Normalize a resource path to `/api/mobile/{resource}`.
///
/// Accepts `registers`, `/registers`, `api/mobile/registers` or
/// `/api/mobile/registers` and never double-prefixes. A query string, if
/// present, is kept verbatim.
pub fn normalize_path(path: &str) -> String {
    let (raw, query) = match path.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path, None),
    };

    let mut resource = raw.trim().trim_start_matches('/');
    let bare_prefix = MOBILE_API_PREFIX.trim_start_matches('/');
    while let Some(rest) = resource.strip_prefix(bare_prefix) {
        if rest.is_empty() {
            resource = rest;
            break;
        }
        match rest.strip_prefix('/') {
            Some(rest) => resource = rest.trim_start_matches('/'),
            // e.g. "api/mobilestats": not our prefix
            None => break,
        }
    }

    let mut normalized = if resource.is_empty() {
        MOBILE_API_PREFIX.to_owned()
    } else {
        format!("{MOBILE_API_PREFIX}/{resource}")
    };
    if let Some(q) = query.filter(|q| !q.is_empty()) {
        normalized.push('?');
        normalized.push_str(q);
    }
    normalized
}

/// Body of a `POST /api/proxy` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayEnvelope {
    pub method: HttpMethod,
    pub path: String,
    /// Always serialized; `null` when the call has no body.
    pub body: Option<Value>,
    pub target_agent_id: String,
}

impl RelayEnvelope {
    /// Build an envelope addressed to `agent_id`, normalizing `path`.
    pub fn encode(
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
        agent_id: impl Into<String>,
    ) -> Self {
        Self {
            method,
            path: normalize_path(path),
            body,
            target_agent_id: agent_id.into(),
        }
    }
}

/// Decode a relay (or direct) response body into canonical form.
///
/// Compact payloads are expanded; standard ones pass through unchanged.
pub fn decode(value: Value) -> Result<Value, Error> {
    compact::expand(value)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn normalize_never_double_prefixes() {
        for input in [
            "registers",
            "/registers",
            "api/mobile/registers",
            "/api/mobile/registers",
            "/api/mobile//api/mobile/registers",
        ] {
            assert_eq!(normalize_path(input), "/api/mobile/registers", "{input}");
        }
    }

    #[test]
    fn normalize_keeps_query_and_foreign_prefixes() {
        assert_eq!(
            normalize_path("trend-logs?analyzerId=4&limit=10"),
            "/api/mobile/trend-logs?analyzerId=4&limit=10"
        );
        assert_eq!(normalize_path("api/mobilestats"), "/api/mobile/api/mobilestats");
    }

    #[test]
    fn envelope_serializes_camel_case_with_null_body() {
        let envelope = RelayEnvelope::encode(HttpMethod::Get, "system-info", None, "agent-1");
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(
            json,
            json!({
                "method": "GET",
                "path": "/api/mobile/system-info",
                "body": null,
                "targetAgentId": "agent-1",
            })
        );
    }

    #[test]
    fn method_parses_case_insensitively() {
        assert_eq!("post".parse::<HttpMethod>().unwrap(), HttpMethod::Post);
        assert_eq!(HttpMethod::Delete.to_string(), "DELETE");
    }
}
