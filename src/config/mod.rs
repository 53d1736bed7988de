mod env_overrides;
mod loader;
mod types;

pub use types::{
    BackendConfig, Config, GatewayConfig, OutreachConfig, PlannerConfig, ReliabilityConfig,
};
