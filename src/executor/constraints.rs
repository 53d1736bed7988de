use serde_json::Value;
use std::collections::BTreeMap;

/// Keys that describe the request itself rather than a constraint on it.
const META_KEYS: &[&str] = &[
    "what",
    "title",
    "search_query",
    "category",
    "is_service",
    "service_category",
];

const PRICE_KEYS: &[&str] = &["min_price", "max_price"];

/// Clean a plan's constraint map into the flat shape the service stores:
/// meta keys and nulls dropped, prices numeric, everything else strings.
pub fn normalize_constraints(raw: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    let mut normalized = BTreeMap::new();

    for (key, value) in raw {
        if META_KEYS.contains(&key.as_str()) || value.is_null() {
            continue;
        }

        if PRICE_KEYS.contains(&key.as_str()) {
            match parse_price(value) {
                Some(price) => {
                    normalized.insert(key.clone(), Value::from(price));
                }
                None => {
                    tracing::debug!(key = key.as_str(), value = %value, "Dropping unparseable price");
                }
            }
            continue;
        }

        let cleaned = match value {
            Value::String(s) => Value::String(s.trim().to_string()),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .filter(|item| !item.is_null())
                    .map(|item| Value::String(scalar_text(item)))
                    .collect(),
            ),
            other => Value::String(scalar_text(other)),
        };
        normalized.insert(key.clone(), cleaned);
    }

    if let (Some(min), Some(max)) = (
        normalized.get("min_price").and_then(Value::as_f64),
        normalized.get("max_price").and_then(Value::as_f64),
    ) && min > max
    {
        normalized.insert("min_price".into(), Value::from(max));
        normalized.insert("max_price".into(), Value::from(min));
    }

    normalized
}

/// `is_service` / `service_category` hints carried in a raw constraint map.
pub fn service_hints(raw: &BTreeMap<String, Value>) -> (bool, Option<String>) {
    let is_service = match raw.get("is_service") {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    };
    let category = raw
        .get("service_category")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    (is_service || category.is_some(), category)
}

fn parse_price(value: &Value) -> Option<f64> {
    let price = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .trim()
            .trim_start_matches('$')
            .replace([',', ' '], "")
            .parse()
            .ok(),
        _ => None,
    };
    price.filter(|price| price.is_finite() && *price >= 0.0)
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}
