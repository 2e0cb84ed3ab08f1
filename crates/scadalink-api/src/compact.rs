// Compact wire-format expansion.
//
// High-cardinality endpoints may answer with `"dataFormat": "compact"`:
// short field names and epoch-millisecond timestamps. Every short-key
// mapping lives in the tables below; nothing else in the workspace knows
// the compact names.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::error::Error;

/// Discriminator key carried by payloads that may be compact.
pub const DATA_FORMAT_KEY: &str = "dataFormat";
pub const FORMAT_COMPACT: &str = "compact";
pub const FORMAT_STANDARD: &str = "standard";

// ── Mapping tables ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Field {
    short: &'static str,
    long: &'static str,
    timestamp: bool,
}

const fn f(short: &'static str, long: &'static str) -> Field {
    Field {
        short,
        long,
        timestamp: false,
    }
}

const fn ts(short: &'static str, long: &'static str) -> Field {
    Field {
        short,
        long,
        timestamp: true,
    }
}

/// One compact payload block: its short and canonical key, and its fields.
#[derive(Debug, Clone, Copy)]
struct Shape {
    short: &'static str,
    long: &'static str,
    fields: &'static [Field],
}

const COMPARISON: Shape = Shape {
    short: "c",
    long: "comparison",
    fields: &[
        f("pv", "previousValue"),
        f("cv", "currentValue"),
        ts("pt", "previousTimestamp"),
        ts("ct", "currentTimestamp"),
        f("pc", "percentageChange"),
        f("tf", "timeFilter"),
    ],
};

const MONTHLY: Shape = Shape {
    short: "m",
    long: "monthlyData",
    fields: &[
        f("y", "year"),
        f("mo", "month"),
        f("t", "total"),
        f("mn", "minimum"),
        f("mx", "maximum"),
        f("av", "average"),
        f("n", "sampleCount"),
        ts("ps", "periodStart"),
        ts("pe", "periodEnd"),
    ],
};

const TREND_LOGS: Shape = Shape {
    short: "tl",
    long: "trendLogs",
    fields: &[
        f("i", "id"),
        f("n", "name"),
        f("ai", "analyzerId"),
        f("a", "address"),
        f("dt", "dataType"),
        f("s", "scale"),
        f("bo", "byteOrder"),
        f("bi", "bitOffset"),
        f("ri", "registerId"),
        f("iv", "interval"),
        f("u", "unit"),
        f("ac", "active"),
        ts("ca", "createdAt"),
        ts("ua", "updatedAt"),
    ],
};

const WIDGETS: Shape = Shape {
    short: "w",
    long: "widgets",
    fields: &[
        f("i", "id"),
        f("ty", "type"),
        f("ti", "title"),
        f("tl", "trendLogId"),
        f("p", "position"),
        f("sz", "size"),
        f("cfg", "config"),
        ts("ua", "updatedAt"),
    ],
};

const BILLINGS: Shape = Shape {
    short: "b",
    long: "billings",
    fields: &[
        f("i", "id"),
        f("n", "name"),
        f("tl", "trendLogId"),
        f("up", "unitPrice"),
        f("cu", "currency"),
        f("u", "usage"),
        f("tc", "totalCost"),
        ts("ps", "periodStart"),
        ts("pe", "periodEnd"),
        ts("ca", "createdAt"),
    ],
};

const REGISTERS: Shape = Shape {
    short: "r",
    long: "registers",
    fields: &[
        f("i", "id"),
        f("n", "name"),
        f("ai", "analyzerId"),
        f("a", "address"),
        f("dt", "dataType"),
        f("s", "scale"),
        f("bo", "byteOrder"),
        f("bi", "bitOffset"),
        f("u", "unit"),
    ],
};

const SHAPES: &[Shape] = &[COMPARISON, MONTHLY, TREND_LOGS, WIDGETS, BILLINGS, REGISTERS];

// ── Expansion ────────────────────────────────────────────────────────

/// Expand a payload carrying `"dataFormat": "compact"` into canonical form.
///
/// Payloads without the discriminator, or marked `"standard"`, are returned
/// unchanged. The discriminator itself is dropped from expanded payloads.
pub fn expand(value: Value) -> Result<Value, Error> {
    let Value::Object(mut root) = value else {
        return Ok(value);
    };

    match root.get(DATA_FORMAT_KEY).map(Value::as_str) {
        None | Some(Some(FORMAT_STANDARD)) => return Ok(Value::Object(root)),
        Some(Some(FORMAT_COMPACT)) => {}
        Some(_) => {
            let other = root.remove(DATA_FORMAT_KEY).unwrap_or_default();
            return Err(Error::Protocol(format!("unknown {DATA_FORMAT_KEY}: {other}")));
        }
    }
    root.remove(DATA_FORMAT_KEY);

    let mut out = Map::with_capacity(root.len());
    for (key, block) in root {
        match shape_by_short(&key) {
            Some(shape) => {
                out.insert(shape.long.to_owned(), map_block(shape, block, expand_fields)?);
            }
            None => {
                out.insert(key, block);
            }
        }
    }
    Ok(Value::Object(out))
}

/// Encode a canonical payload in compact form. Exact inverse of [`expand`]
/// for payloads whose timestamps are RFC 3339 strings.
pub fn compact(value: Value) -> Result<Value, Error> {
    let Value::Object(root) = value else {
        return Err(Error::Protocol("compact payload must be an object".into()));
    };

    let mut out = Map::with_capacity(root.len() + 1);
    out.insert(DATA_FORMAT_KEY.to_owned(), Value::from(FORMAT_COMPACT));
    for (key, block) in root {
        match shape_by_long(&key) {
            Some(shape) => {
                let block = map_block(shape, block, |s, obj| Ok(compact_fields(s, obj)))?;
                out.insert(shape.short.to_owned(), block);
            }
            None => {
                out.insert(key, block);
            }
        }
    }
    Ok(Value::Object(out))
}

fn shape_by_short(key: &str) -> Option<&'static Shape> {
    SHAPES.iter().find(|s| s.short == key)
}

fn shape_by_long(key: &str) -> Option<&'static Shape> {
    SHAPES.iter().find(|s| s.long == key)
}

/// Apply `convert` to a shape block: one object, an array of objects, or null.
fn map_block(
    shape: &Shape,
    block: Value,
    convert: impl Fn(&Shape, Map<String, Value>) -> Result<Map<String, Value>, Error>,
) -> Result<Value, Error> {
    match block {
        Value::Null => Ok(Value::Null),
        Value::Object(obj) => Ok(Value::Object(convert(shape, obj)?)),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(obj) => convert(shape, obj).map(Value::Object),
                other => Err(Error::Protocol(format!(
                    "{} entry must be an object, got {}",
                    shape.long,
                    kind(&other)
                ))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Err(Error::Protocol(format!(
            "{} must be an object or array, got {}",
            shape.long,
            kind(&other)
        ))),
    }
}

fn expand_fields(shape: &Shape, obj: Map<String, Value>) -> Result<Map<String, Value>, Error> {
    let mut out = Map::with_capacity(obj.len());
    for (key, value) in obj {
        match shape.fields.iter().find(|fd| fd.short == key) {
            Some(field) if field.timestamp => {
                out.insert(field.long.to_owned(), expand_timestamp(field, value)?);
            }
            Some(field) => {
                out.insert(field.long.to_owned(), value);
            }
            None => {
                out.insert(key, value);
            }
        }
    }
    Ok(out)
}

fn compact_fields(shape: &Shape, obj: Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::with_capacity(obj.len());
    for (key, value) in obj {
        match shape.fields.iter().find(|fd| fd.long == key) {
            Some(field) if field.timestamp => {
                out.insert(field.short.to_owned(), compact_timestamp(value));
            }
            Some(field) => {
                out.insert(field.short.to_owned(), value);
            }
            None => {
                out.insert(key, value);
            }
        }
    }
    out
}

/// Epoch milliseconds become RFC 3339 UTC; strings and null are kept.
fn expand_timestamp(field: &Field, value: Value) -> Result<Value, Error> {
    match value {
        Value::Number(ref n) => {
            let millis = n.as_i64().ok_or_else(|| {
                Error::Protocol(format!("{}: timestamp {n} is not an integer", field.long))
            })?;
            let dt = DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
                Error::Protocol(format!("{}: timestamp {millis} out of range", field.long))
            })?;
            Ok(Value::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true)))
        }
        Value::String(_) | Value::Null => Ok(value),
        other => Err(Error::Protocol(format!(
            "{}: timestamp must be a number, got {}",
            field.long,
            kind(&other)
        ))),
    }
}

fn compact_timestamp(value: Value) -> Value {
    if let Some(dt) = value.as_str().and_then(|s| DateTime::parse_from_rfc3339(s).ok()) {
        return Value::from(dt.timestamp_millis());
    }
    value
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
