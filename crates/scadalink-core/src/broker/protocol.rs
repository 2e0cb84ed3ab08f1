// Live stream frames.
//
//   client → server  {"type":"watch",   "key":{...}}
//                    {"type":"unwatch", "key":{...}}
//   server → client  {"type":"value",   "key":{...}, "value":..., "timestamp":..., "agentId":...}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{LiveValue, RegisterSubscriptionKey};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    Watch { key: RegisterSubscriptionKey },
    Unwatch { key: RegisterSubscriptionKey },
}

impl ClientFrame {
    pub fn key(&self) -> &RegisterSubscriptionKey {
        match self {
            Self::Watch { key } | Self::Unwatch { key } => key,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum ServerFrame {
    Value(PushFrame),
    /// Heartbeats, acks and anything newer than this client.
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PushFrame {
    pub key: RegisterSubscriptionKey,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub timestamp: Option<PushTimestamp>,
    /// Present when the relay stamps pushes with their origin agent.
    #[serde(default)]
    pub agent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum PushTimestamp {
    Millis(i64),
    Text(String),
}

impl PushTimestamp {
    fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Millis(ms) => DateTime::from_timestamp_millis(*ms),
            Self::Text(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

impl PushFrame {
    pub fn into_live_value(self) -> LiveValue {
        LiveValue {
            timestamp: self.timestamp.as_ref().and_then(PushTimestamp::to_utc),
            key: self.key,
            value: self.value,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::model::ByteOrder;

    fn key_json() -> Value {
        json!({"analyzerId": 1, "address": 3204, "dataType": "float32", "scale": 0.1,
               "byteOrder": "CDAB", "bitOffset": null, "registerId": 40})
    }

    #[test]
    fn watch_frame_shape() {
        let key: RegisterSubscriptionKey = serde_json::from_value(key_json()).unwrap();
        assert_eq!(key.byte_order, ByteOrder::Cdab);

        let frame = serde_json::to_value(ClientFrame::Watch { key }).unwrap();
        assert_eq!(frame, json!({"type": "watch", "key": key_json()}));
    }

    #[test]
    fn push_frame_with_millis_timestamp() {
        let text = json!({"type": "value", "key": key_json(), "value": 231.4,
                          "timestamp": 1_700_000_000_000_i64})
        .to_string();
        let ServerFrame::Value(push) = serde_json::from_str(&text).unwrap() else {
            panic!("expected value frame");
        };
        let live = push.into_live_value();
        assert_eq!(live.value, json!(231.4));
        assert_eq!(live.timestamp.unwrap().timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn unknown_frame_types_are_other() {
        let frame: ServerFrame = serde_json::from_str(r#"{"type":"pong"}"#).unwrap();
        assert!(matches!(frame, ServerFrame::Other));
    }
}
