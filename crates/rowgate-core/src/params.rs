use serde_json::{Map, Value};

/// Flat per-request parameter bag. Built fresh for every request from the
/// JSON body, query string, and form fields; the authorization gate may
/// later inject the verified identity under `userID` / `userName`.
pub type ParamBag = Map<String, Value>;

/// Insert `key` only if it is not present yet — within one source the
/// first value for a repeated key wins.
pub fn insert_first(bag: &mut ParamBag, key: &str, value: Value) {
    if !bag.contains_key(key) {
        bag.insert(key.to_string(), value);
    }
}

/// Natural string form of a bag value as it appears in rendered query
/// text: strings pass through unquoted, numbers and booleans via their
/// display form, null renders empty, nested values render as compact JSON.
pub fn value_fragment(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Coerce a value that may arrive as a float, an integer, or a numeric
/// string. Drivers and JSON bodies disagree on how numeric ids travel, so
/// every consumption site goes through this.
pub fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Non-empty trimmed string parameter, or `None`.
pub fn string_param<'a>(bag: &'a ParamBag, key: &str) -> Option<&'a str> {
    bag.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
