// ── Demo fixtures ──
//
// Canned responses served while demo mode is on, so the whole stack can be
// exercised with no backend. Trend-log comparison data is served in compact
// form to keep the expansion path honest.

use serde_json::{Value, json};

use scadalink_api::HttpMethod;
use scadalink_api::relay::normalize_path;

/// Canned response for `method path`.
pub fn respond(method: HttpMethod, path: &str) -> Value {
    if method != HttpMethod::Get {
        return json!({"success": true});
    }

    let normalized = normalize_path(path);
    let resource = normalized
        .trim_start_matches(scadalink_api::relay::MOBILE_API_PREFIX)
        .trim_start_matches('/');
    let resource = resource.split_once('?').map_or(resource, |(r, _)| r);

    match resource {
        "system-info" | "health" => system_info(),
        "agents" => agents(),
        "analyzers" => analyzers(),
        "registers" => registers(),
        "trend-logs" => trend_logs(),
        "trend-logs/comparison" | "comparison" => comparison(),
        "trend-logs/monthly" | "monthly" => monthly(),
        "widgets" => widgets(),
        "billings" => billings(),
        "system-logs" => system_logs(),
        _ => Value::Null,
    }
}

fn system_info() -> Value {
    json!({
        "name": "Demo Plant",
        "version": "3.4.1",
        "uptimeSeconds": 864_000,
        "status": "ok"
    })
}

fn agents() -> Value {
    json!({
        "agents": [
            {"id": "demo-agent-1", "name": "Main substation", "online": true},
            {"id": "demo-agent-2", "name": "Pump station", "online": false}
        ]
    })
}

fn analyzers() -> Value {
    json!([
        {"id": 1, "name": "Incomer A", "slaveId": 1, "active": true},
        {"id": 2, "name": "Chiller feeder", "slaveId": 4, "active": true}
    ])
}

fn registers() -> Value {
    json!({
        "dataFormat": "compact",
        "r": [
            {"i": 40, "n": "Active energy", "ai": 1, "a": 3204, "dt": "float32",
             "s": 0.1, "bo": "CDAB", "bi": null, "u": "kWh"},
            {"i": 41, "n": "Breaker closed", "ai": 1, "a": 100, "dt": "bool",
             "s": 1.0, "bo": "ABCD", "bi": 3, "u": null}
        ]
    })
}

fn trend_logs() -> Value {
    json!({
        "dataFormat": "compact",
        "tl": [
            {"i": 7, "n": "Incomer kWh", "ai": 1, "a": 3204, "dt": "float32", "s": 0.1,
             "bo": "CDAB", "bi": null, "ri": 40, "iv": 900, "u": "kWh", "ac": true,
             "ca": 1_685_606_400_000_i64, "ua": 1_704_450_600_000_i64}
        ]
    })
}

fn comparison() -> Value {
    json!({
        "dataFormat": "compact",
        "c": {"pv": 10, "cv": 12, "pt": 1_700_000_000_000_i64, "ct": 1_700_003_600_000_i64,
              "pc": 20, "tf": "month"}
    })
}

fn monthly() -> Value {
    json!({
        "dataFormat": "compact",
        "m": [
            {"y": 2024, "mo": 3, "t": 410.2, "mn": 1.0, "mx": 22.5, "av": 13.2, "n": 31,
             "ps": 1_709_251_200_000_i64, "pe": 1_711_929_599_999_i64}
        ]
    })
}

fn widgets() -> Value {
    json!({
        "dataFormat": "compact",
        "w": [
            {"i": 3, "ty": "gauge", "ti": "Incomer load", "tl": 7,
             "p": {"x": 0, "y": 0}, "sz": "m", "cfg": {"min": 0, "max": 400},
             "ua": 1_712_750_400_000_i64}
        ]
    })
}

fn billings() -> Value {
    json!({
        "dataFormat": "compact",
        "b": [
            {"i": 11, "n": "March", "tl": 7, "up": 2.35, "cu": "TRY", "u": 410.2,
             "tc": 963.97, "ps": 1_709_251_200_000_i64, "pe": 1_711_929_599_999_i64,
             "ca": 1_711_951_200_000_i64}
        ]
    })
}

fn system_logs() -> Value {
    json!([
        {"level": "info", "message": "Polling cycle completed", "timestamp": "2024-04-10T12:00:00Z"},
        {"level": "warn", "message": "Analyzer 2 slow response", "timestamp": "2024-04-10T12:00:05Z"}
    ])
}
