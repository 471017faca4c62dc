use serde_json::Value;

/// Substring markers for secret-bearing keys. Deliberately aggressive:
/// over-redacting an indicator beats leaking a credential into an audit
/// file that outlives the process.
const SECRET_KEY_MARKERS: &[&str] = &[
    "key",
    "token",
    "secret",
    "password",
    "passwd",
    "authorization",
    "cookie",
    "set-cookie",
    "api_key",
    "apikey",
    "bearer",
];

const REDACTED: &str = "***REDACTED***";

fn is_secret_key(key: &str) -> bool {
    let k = key.trim().to_lowercase();
    SECRET_KEY_MARKERS.iter().any(|marker| k.contains(marker))
}

/// Recursively replace values under secret-looking keys before anything is
/// persisted or logged.
pub fn redact_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                if is_secret_key(k) {
                    out.insert(k.clone(), Value::String(REDACTED.to_string()));
                } else {
                    out.insert(k.clone(), redact_value(v));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
        other => other.clone(),
    }
}
