use super::Config;
use crate::error::ConfigError;
use directories::UserDirs;
use std::fs;
use std::path::{Path, PathBuf};

impl Config {
    /// `~/.planstream/config.toml`, when a home directory can be resolved.
    pub fn default_path() -> Option<PathBuf> {
        UserDirs::new().map(|u| u.home_dir().join(".planstream").join("config.toml"))
    }

    /// Load configuration: explicit path (must exist) or the default path
    /// (optional), then environment overrides, then validation.
    pub fn load(explicit: Option<&str>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(raw) => Some(PathBuf::from(shellexpand::tilde(raw).into_owned())),
            None => Self::default_path(),
        };

        let mut config = match path.as_deref() {
            Some(p) if p.exists() => Self::from_file(p)?,
            Some(p) if explicit.is_some() => {
                return Err(ConfigError::Load(format!(
                    "config file not found: {}",
                    p.display()
                )));
            }
            _ => Self::default(),
        };
        if let Some(p) = path {
            config.config_path = p;
        }

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?;
        config.config_path = path.to_path_buf();
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = url::Url::parse(&self.backend.base_url).map_err(|e| {
            ConfigError::Validation(format!(
                "backend.base_url {:?} is not a valid URL: {e}",
                self.backend.base_url
            ))
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ConfigError::Validation(format!(
                "backend.base_url must use http or https, got {}",
                base.scheme()
            )));
        }

        let r = &self.reliability;
        for (name, value) in [
            ("context_timeout_ms", r.context_timeout_ms),
            ("mutation_timeout_ms", r.mutation_timeout_ms),
            ("search_timeout_ms", r.search_timeout_ms),
            ("outreach_timeout_ms", r.outreach_timeout_ms),
            ("planner.timeout_ms", self.planner.timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Validation(format!("{name} must be > 0")));
            }
        }

        if self.gateway.event_buffer == 0 {
            return Err(ConfigError::Validation(
                "gateway.event_buffer must be > 0".into(),
            ));
        }

        if self.log_level.parse::<tracing::Level>().is_err() {
            return Err(ConfigError::Validation(format!(
                "unknown log_level {:?}",
                self.log_level
            )));
        }

        Ok(())
    }
}
