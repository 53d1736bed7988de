use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use strum::{Display, EnumString};

/// One offer returned by a provider. Fields the engine does not interpret
/// are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProviderState {
    Ok,
    Error,
    Timeout,
    Exhausted,
    RateLimited,
}

impl<'de> Deserialize<'de> for ProviderState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        // Unknown states from newer providers count as failures.
        Ok(Self::from_str(&raw.to_ascii_lowercase()).unwrap_or(Self::Error))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub provider_id: String,
    pub status: ProviderState,
    #[serde(default)]
    pub result_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// One provider's incremental contribution to a streaming search.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchBatch {
    pub provider: String,
    #[serde(default)]
    pub results: Vec<SearchResult>,
    #[serde(default)]
    pub status: Option<ProviderStatus>,
    #[serde(default)]
    pub more_incoming: bool,
    #[serde(default)]
    pub total_results_so_far: u64,
    #[serde(default)]
    pub providers_remaining: Option<u64>,
}

/// The final frame of a search stream.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CompleteFrame {
    #[serde(default)]
    pub provider_statuses: Option<Vec<ProviderStatus>>,
    #[serde(default)]
    pub total_results: Option<u64>,
    #[serde(default)]
    pub user_message: Option<String>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_start_matches('$').replace(',', "").parse().ok(),
        _ => None,
    })
}
