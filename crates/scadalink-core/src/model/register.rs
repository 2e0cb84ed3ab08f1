// ── Register identity and live values ──
//
// `RegisterSubscriptionKey` names one live value stream. It travels on the
// wire inside watch/unwatch/value frames, so its serde shape is fixed.

use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── ByteOrder ───────────────────────────────────────────────────────

/// Word/byte ordering of a multi-register value.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum ByteOrder {
    /// Big-endian.
    #[default]
    #[serde(rename = "ABCD", alias = "abcd")]
    #[strum(to_string = "ABCD", serialize = "big")]
    Abcd,
    /// Little-endian.
    #[serde(rename = "DCBA", alias = "dcba")]
    #[strum(to_string = "DCBA", serialize = "little")]
    Dcba,
    /// Byte swap within words.
    #[serde(rename = "BADC", alias = "badc")]
    #[strum(serialize = "BADC")]
    Badc,
    /// Word swap.
    #[serde(rename = "CDAB", alias = "cdab")]
    #[strum(serialize = "CDAB")]
    Cdab,
}

// ── RegisterSubscriptionKey ─────────────────────────────────────────

/// Identity of a single live value stream.
///
/// Equality and hashing are structural over every field; `scale` is
/// compared by bit pattern so the key can live in a `HashMap`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterSubscriptionKey {
    pub analyzer_id: u64,
    pub address: u32,
    pub data_type: String,
    pub scale: f64,
    pub byte_order: ByteOrder,
    #[serde(default)]
    pub bit_offset: Option<u8>,
    pub register_id: u64,
}

impl PartialEq for RegisterSubscriptionKey {
    fn eq(&self, other: &Self) -> bool {
        self.analyzer_id == other.analyzer_id
            && self.address == other.address
            && self.data_type == other.data_type
            && self.scale.to_bits() == other.scale.to_bits()
            && self.byte_order == other.byte_order
            && self.bit_offset == other.bit_offset
            && self.register_id == other.register_id
    }
}

impl Eq for RegisterSubscriptionKey {}

impl Hash for RegisterSubscriptionKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.analyzer_id.hash(state);
        self.address.hash(state);
        self.data_type.hash(state);
        self.scale.to_bits().hash(state);
        self.byte_order.hash(state);
        self.bit_offset.hash(state);
        self.register_id.hash(state);
    }
}

impl fmt::Display for RegisterSubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "analyzer {} @{} {}x{} {}",
            self.analyzer_id, self.address, self.data_type, self.scale, self.byte_order
        )?;
        if let Some(bit) = self.bit_offset {
            write!(f, " bit {bit}")?;
        }
        write!(f, " (register {})", self.register_id)
    }
}

// ── LiveValue ───────────────────────────────────────────────────────

/// One decoded push update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveValue {
    pub key: RegisterSubscriptionKey,
    pub value: Value,
    pub timestamp: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use serde_json::json;

    use super::*;

    fn key(scale: f64) -> RegisterSubscriptionKey {
        RegisterSubscriptionKey {
            analyzer_id: 2,
            address: 3204,
            data_type: "float32".into(),
            scale,
            byte_order: ByteOrder::Cdab,
            bit_offset: None,
            register_id: 40,
        }
    }

    #[test]
    fn hashing_is_structural() {
        let mut set = HashSet::new();
        set.insert(key(0.1));
        assert!(set.contains(&key(0.1)));
        assert!(!set.contains(&key(0.01)));
    }

    #[test]
    fn wire_shape_is_camel_case() {
        let json = serde_json::to_value(key(1.0)).unwrap();
        assert_eq!(
            json,
            json!({
                "analyzerId": 2,
                "address": 3204,
                "dataType": "float32",
                "scale": 1.0,
                "byteOrder": "CDAB",
                "bitOffset": null,
                "registerId": 40,
            })
        );
    }

    #[test]
    fn byte_order_parses_aliases() {
        assert_eq!("big".parse::<ByteOrder>().unwrap(), ByteOrder::Abcd);
        assert_eq!("cdab".parse::<ByteOrder>().unwrap(), ByteOrder::Cdab);
        assert_eq!(ByteOrder::Badc.to_string(), "BADC");
    }
}
