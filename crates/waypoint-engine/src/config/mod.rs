pub mod loader;
pub mod schema;

pub use loader::{ConfigError, ConfigLoader};
pub use schema::{
    ArtifactConfig, BrowserConfig, EnvOverrides, ReportConfig, TargetConfig, TimeoutConfig,
    WaypointConfig,
};
