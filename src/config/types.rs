use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path the config was read from - not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub reliability: ReliabilityConfig,

    #[serde(default)]
    pub planner: PlannerConfig,

    #[serde(default)]
    pub outreach: OutreachConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            log_level: default_log_level(),
            backend: BackendConfig::default(),
            reliability: ReliabilityConfig::default(),
            planner: PlannerConfig::default(),
            outreach: OutreachConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

/// Request/search service connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub base_url: String,
    /// Bearer token used when the caller did not forward an `Authorization` header.
    #[serde(default)]
    pub auth_token: Option<String>,
}

fn default_backend_url() -> String {
    "http://127.0.0.1:8000".into()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            auth_token: None,
        }
    }
}

/// Timeout tiers and retry constants, all in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    #[serde(default = "default_context_timeout_ms")]
    pub context_timeout_ms: u64,
    #[serde(default = "default_context_retries")]
    pub context_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_mutation_timeout_ms")]
    pub mutation_timeout_ms: u64,
    #[serde(default = "default_search_timeout_ms")]
    pub search_timeout_ms: u64,
    #[serde(default = "default_outreach_timeout_ms")]
    pub outreach_timeout_ms: u64,
}

fn default_context_timeout_ms() -> u64 {
    8_000
}

fn default_context_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_mutation_timeout_ms() -> u64 {
    15_000
}

fn default_search_timeout_ms() -> u64 {
    30_000
}

fn default_outreach_timeout_ms() -> u64 {
    15_000
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            context_timeout_ms: default_context_timeout_ms(),
            context_retries: default_context_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            mutation_timeout_ms: default_mutation_timeout_ms(),
            search_timeout_ms: default_search_timeout_ms(),
            outreach_timeout_ms: default_outreach_timeout_ms(),
        }
    }
}

impl ReliabilityConfig {
    pub fn context_timeout(&self) -> Duration {
        Duration::from_millis(self.context_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn mutation_timeout(&self) -> Duration {
        Duration::from_millis(self.mutation_timeout_ms)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }

    pub fn outreach_timeout(&self) -> Duration {
        Duration::from_millis(self.outreach_timeout_ms)
    }
}

/// LLM-backed plan generation. When disabled or missing an API key the
/// rule-based planner is used on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_planner_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_planner_model")]
    pub model: String,
    #[serde(default = "default_planner_temperature")]
    pub temperature: f64,
    #[serde(default = "default_planner_timeout_ms")]
    pub timeout_ms: u64,
    /// Number of trailing conversation messages passed to the model.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

fn default_true() -> bool {
    true
}

fn default_planner_api_url() -> String {
    "https://openrouter.ai/api/v1/chat/completions".into()
}

fn default_planner_model() -> String {
    "google/gemini-2.0-flash-001".into()
}

fn default_planner_temperature() -> f64 {
    0.2
}

fn default_planner_timeout_ms() -> u64 {
    30_000
}

fn default_history_window() -> usize {
    6
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: default_planner_api_url(),
            api_key: None,
            model: default_planner_model(),
            temperature: default_planner_temperature(),
            timeout_ms: default_planner_timeout_ms(),
            history_window: default_history_window(),
        }
    }
}

impl PlannerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// True when the LLM planner can actually be called.
    pub fn is_usable(&self) -> bool {
        self.enabled && self.api_key.as_deref().is_some_and(|key| !key.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutreachConfig {
    /// Vendor limit applied when a plan's outreach action omits one.
    #[serde(default = "default_vendor_limit")]
    pub default_vendor_limit: u32,
}

fn default_vendor_limit() -> u32 {
    10
}

impl Default for OutreachConfig {
    fn default() -> Self {
        Self {
            default_vendor_limit: default_vendor_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway port (default: 8080)
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Gateway host (default: 127.0.0.1)
    #[serde(default = "default_gateway_host")]
    pub host: String,
    /// Maximum accepted chat request body in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Outbound event channel capacity per session
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Allowed CORS origins; empty disables the CORS layer
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_gateway_port() -> u16 {
    8080
}

fn default_gateway_host() -> String {
    "127.0.0.1".into()
}

fn default_max_body_bytes() -> usize {
    262_144
}

fn default_event_buffer() -> usize {
    64
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            host: default_gateway_host(),
            max_body_bytes: default_max_body_bytes(),
            event_buffer: default_event_buffer(),
            cors_origins: Vec::new(),
        }
    }
}
