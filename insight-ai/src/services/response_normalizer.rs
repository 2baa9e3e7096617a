//! Response normalizer
//!
//! Turns free-form model output into a well-shaped domain object. Never fails:
//! unparseable output degrades to the domain default and is logged.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// Raw text kept in diagnostics when parsing fails
const LOG_RAW_CHARS: usize = 500;

/// Normalize `raw` into `T`
///
/// Parsed fields are merged over `T::default()`: missing fields keep their
/// defaults, unknown fields are dropped, and a field whose JSON type does not
/// match the default's keeps the default.
pub fn normalize<T>(raw: &str, domain: &str) -> T
where
    T: Default + Serialize + DeserializeOwned,
{
    let default = T::default();

    let Some(candidate) = extract_json_candidate(raw) else {
        log_fallback(domain, raw, "no JSON object found");
        return default;
    };

    let parsed: Value = match serde_json::from_str(candidate) {
        Ok(value) => value,
        Err(e) => {
            log_fallback(domain, raw, &e.to_string());
            return default;
        }
    };

    let Value::Object(parsed) = parsed else {
        log_fallback(domain, raw, "top-level JSON is not an object");
        return default;
    };

    let Ok(Value::Object(default_fields)) = serde_json::to_value(&default) else {
        tracing::warn!(domain, "Default shape is not a JSON object, using default");
        return default;
    };

    let mut merged = merge_object(&default_fields, &parsed);
    if let Ok(value) = serde_json::from_value::<T>(Value::Object(merged.clone())) {
        return value;
    }

    // A field of the right JSON type can still fail typed deserialization
    // (e.g. 400 into a u8); probe each changed field alone and revert those.
    for (key, value) in merged.iter_mut() {
        let Some(default_value) = default_fields.get(key) else {
            continue;
        };
        if *value == *default_value {
            continue;
        }
        let mut probe = default_fields.clone();
        probe.insert(key.clone(), value.clone());
        if let Err(e) = serde_json::from_value::<T>(Value::Object(probe)) {
            tracing::debug!(domain, field = %key, error = %e, "Field reverted to default");
            *value = default_value.clone();
        }
    }

    match serde_json::from_value::<T>(Value::Object(merged)) {
        Ok(value) => value,
        Err(e) => {
            log_fallback(domain, raw, &e.to_string());
            default
        }
    }
}

/// Locate the JSON object text inside raw model output
///
/// Prefers a fenced code block that contains an object; otherwise the span
/// from the first `{` to the last `}`.
pub fn extract_json_candidate(raw: &str) -> Option<&str> {
    if let Some(inner) = fenced_block(raw) {
        if let Some(span) = brace_span(inner) {
            return Some(span);
        }
    }
    brace_span(raw)
}

fn fenced_block(raw: &str) -> Option<&str> {
    let open = raw.find("```")?;
    let after_open = &raw[open + 3..];
    // Skip an optional language tag on the opening fence line
    let body_start = match after_open.find('\n') {
        Some(newline) if !after_open[..newline].contains('{') => newline + 1,
        _ => 0,
    };
    let body = &after_open[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim())
}

fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn merge_object(defaults: &Map<String, Value>, parsed: &Map<String, Value>) -> Map<String, Value> {
    defaults
        .iter()
        .map(|(key, default)| {
            let value = match parsed.get(key) {
                Some(candidate) => coerce(default, candidate).unwrap_or_else(|| default.clone()),
                None => default.clone(),
            };
            (key.clone(), value)
        })
        .collect()
}

/// `candidate` reshaped to the JSON type of `default`, if compatible
fn coerce(default: &Value, candidate: &Value) -> Option<Value> {
    match (default, candidate) {
        (_, Value::Null) => None,
        // Option fields default to null and accept anything
        (Value::Null, value) => Some(value.clone()),
        (Value::Bool(_), Value::Bool(b)) => Some(Value::Bool(*b)),
        (Value::Number(d), Value::Number(n)) => coerce_number(d, n),
        (Value::Number(d), Value::String(s)) => {
            let n: serde_json::Number = s.trim().parse::<f64>().ok().and_then(serde_json::Number::from_f64)?;
            coerce_number(d, &n)
        }
        (Value::String(_), Value::String(s)) => Some(Value::String(s.clone())),
        (Value::String(_), Value::Number(n)) => Some(Value::String(n.to_string())),
        (Value::Array(_), Value::Array(items)) => Some(Value::Array(items.clone())),
        (Value::Object(d), Value::Object(p)) => Some(Value::Object(merge_object(d, p))),
        _ => None,
    }
}

fn coerce_number(default: &serde_json::Number, candidate: &serde_json::Number) -> Option<Value> {
    if default.is_f64() {
        return candidate.as_f64().and_then(serde_json::Number::from_f64).map(Value::Number);
    }
    if candidate.is_i64() || candidate.is_u64() {
        return Some(Value::Number(candidate.clone()));
    }
    let rounded = candidate.as_f64()?.round();
    if rounded >= 0.0 && rounded <= u64::MAX as f64 {
        Some(Value::from(rounded as u64))
    } else if rounded >= i64::MIN as f64 {
        Some(Value::from(rounded as i64))
    } else {
        None
    }
}

fn log_fallback(domain: &str, raw: &str, reason: &str) {
    let truncated: String = raw.chars().take(LOG_RAW_CHARS).collect();
    tracing::warn!(
        domain,
        reason,
        raw = %truncated,
        "Malformed model response, using default result"
    );
}
