use super::Config;

fn env_value(primary: &str, alias: Option<&str>) -> Option<String> {
    std::env::var(primary)
        .ok()
        .or_else(|| alias.and_then(|name| std::env::var(name).ok()))
        .filter(|value| !value.is_empty())
}

fn env_parsed<T: std::str::FromStr>(primary: &str, alias: Option<&str>) -> Option<T> {
    env_value(primary, alias).and_then(|value| value.parse::<T>().ok())
}

impl Config {
    pub fn apply_env_overrides(&mut self) {
        if let Some(url) = env_value("PLANSTREAM_BACKEND_URL", Some("BACKEND_URL")) {
            self.backend.base_url = url;
        }

        if let Some(token) = env_value("PLANSTREAM_BACKEND_TOKEN", None) {
            self.backend.auth_token = Some(token);
        }

        if let Some(ms) = env_parsed("PLANSTREAM_CONTEXT_TIMEOUT_MS", None) {
            self.reliability.context_timeout_ms = ms;
        }

        if let Some(retries) = env_parsed("PLANSTREAM_CONTEXT_RETRIES", None) {
            self.reliability.context_retries = retries;
        }

        if let Some(ms) = env_parsed("PLANSTREAM_RETRY_DELAY_MS", None) {
            self.reliability.retry_delay_ms = ms;
        }

        if let Some(ms) = env_parsed("PLANSTREAM_MUTATION_TIMEOUT_MS", None) {
            self.reliability.mutation_timeout_ms = ms;
        }

        if let Some(ms) = env_parsed("PLANSTREAM_SEARCH_TIMEOUT_MS", None) {
            self.reliability.search_timeout_ms = ms;
        }

        if let Some(ms) = env_parsed("PLANSTREAM_OUTREACH_TIMEOUT_MS", None) {
            self.reliability.outreach_timeout_ms = ms;
        }

        if let Some(enabled) = env_parsed::<bool>("PLANSTREAM_PLANNER_ENABLED", None) {
            self.planner.enabled = enabled;
        }

        if let Some(key) = env_value("PLANSTREAM_PLANNER_API_KEY", Some("OPENROUTER_API_KEY")) {
            self.planner.api_key = Some(key);
        }

        if let Some(url) = env_value("PLANSTREAM_PLANNER_URL", None) {
            self.planner.api_url = url;
        }

        if let Some(model) = env_value("PLANSTREAM_PLANNER_MODEL", None) {
            self.planner.model = model;
        }

        if let Some(port) = env_parsed::<u16>("PLANSTREAM_GATEWAY_PORT", Some("PORT")) {
            self.gateway.port = port;
        }

        if let Some(host) = env_value("PLANSTREAM_GATEWAY_HOST", Some("HOST")) {
            self.gateway.host = host;
        }

        if let Some(level) = env_value("PLANSTREAM_LOG_LEVEL", None) {
            self.log_level = level;
        }
    }
}
