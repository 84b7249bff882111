//! Config loading and persistence.

mod load;
mod merge;
mod schema;

pub use load::{
    ConfigError, config_path, load, load_from, load_local_config, load_or_init,
    load_user_config, local_config_path, write_config,
};
pub use merge::{apply_env_overrides, apply_overrides_from, merge_layers};
pub use schema::{
    ApiConfig, ApiConfigOverride, Config, ConfigLayer, FileLoggingConfig,
    FileLoggingConfigOverride, LogRotation, LoggingConfig, LoggingConfigOverride,
    NotificationsConfig, NotificationsConfigOverride, RealtimeConfig, RealtimeConfigOverride,
};
