use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::realtime::{BridgeConfig, Endpoint};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub api: ApiConfig,
    pub realtime: RealtimeConfig,
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogRotation {
    Daily,
    Hourly,
    Never,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
/// Console output is an indented span tree on stderr; the file log is one
/// json object per line.
pub struct LoggingConfig {
    pub stdout: bool,
    pub filter: Option<String>,
    pub file: FileLoggingConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stdout: true,
            filter: None,
            file: FileLoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLoggingConfig {
    pub enabled: bool,
    pub dir: Option<PathBuf>,
    pub rotation: LogRotation,
    pub retention_max_age_days: Option<u64>,
    pub retention_max_files: Option<usize>,
}

impl Default for FileLoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: None,
            rotation: LogRotation::Daily,
            retention_max_age_days: Some(7),
            retention_max_files: Some(10),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/api".to_string(),
            token: None,
            timeout_ms: 15_000,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub endpoint: String,
    pub host: Option<String>,
    pub login: Option<String>,
    pub passcode: Option<String>,
    pub reconnect_delay_ms: u64,
    pub heartbeat_ms: u64,
    pub connect_timeout_ms: u64,
    pub max_frame_bytes: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:61613".to_string(),
            host: None,
            login: None,
            passcode: None,
            reconnect_delay_ms: 5_000,
            heartbeat_ms: 4_000,
            connect_timeout_ms: 5_000,
            max_frame_bytes: 1 << 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub duration_ms: u64,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self { duration_ms: 3_000 }
    }
}

impl NotificationsConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

impl Config {
    /// Bridge settings for `topic`. The API token doubles as the broker's
    /// bearer credential.
    pub fn bridge_config(&self, topic: impl Into<String>) -> BridgeConfig {
        let rt = &self.realtime;
        let mut endpoint = Endpoint::new(rt.endpoint.clone());
        endpoint.host = rt.host.clone();
        endpoint.login = rt.login.clone();
        endpoint.passcode = rt.passcode.clone();
        endpoint.bearer_token = self.api.token.clone();
        endpoint.heartbeat = Duration::from_millis(rt.heartbeat_ms);
        endpoint.connect_timeout = Duration::from_millis(rt.connect_timeout_ms);
        endpoint.max_frame_bytes = rt.max_frame_bytes;

        let mut config = BridgeConfig::new(endpoint, topic);
        config.reconnect_delay = Duration::from_millis(rt.reconnect_delay_ms);
        config.toast_duration = self.notifications.duration();
        config
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfigOverride {
    pub stdout: Option<bool>,
    pub filter: Option<String>,
    pub file: Option<FileLoggingConfigOverride>,
}

impl LoggingConfigOverride {
    pub fn apply_to(&self, target: &mut LoggingConfig) {
        if let Some(stdout) = self.stdout {
            target.stdout = stdout;
        }
        if let Some(filter) = self.filter.as_ref() {
            target.filter = Some(filter.clone());
        }
        if let Some(file) = self.file.as_ref() {
            file.apply_to(&mut target.file);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FileLoggingConfigOverride {
    pub enabled: Option<bool>,
    pub dir: Option<PathBuf>,
    pub rotation: Option<LogRotation>,
    pub retention_max_age_days: Option<u64>,
    pub retention_max_files: Option<usize>,
}

impl FileLoggingConfigOverride {
    pub fn apply_to(&self, target: &mut FileLoggingConfig) {
        if let Some(enabled) = self.enabled {
            target.enabled = enabled;
        }
        if let Some(dir) = self.dir.as_ref() {
            target.dir = Some(dir.clone());
        }
        if let Some(rotation) = self.rotation {
            target.rotation = rotation;
        }
        if let Some(days) = self.retention_max_age_days {
            target.retention_max_age_days = Some(days);
        }
        if let Some(files) = self.retention_max_files {
            target.retention_max_files = Some(files);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ApiConfigOverride {
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub timeout_ms: Option<u64>,
}

impl ApiConfigOverride {
    pub fn apply_to(&self, target: &mut ApiConfig) {
        if let Some(base_url) = self.base_url.as_ref() {
            target.base_url = base_url.clone();
        }
        if let Some(token) = self.token.as_ref() {
            target.token = Some(token.clone());
        }
        if let Some(timeout_ms) = self.timeout_ms {
            target.timeout_ms = timeout_ms;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RealtimeConfigOverride {
    pub endpoint: Option<String>,
    pub host: Option<String>,
    pub login: Option<String>,
    pub passcode: Option<String>,
    pub reconnect_delay_ms: Option<u64>,
    pub heartbeat_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub max_frame_bytes: Option<usize>,
}

impl RealtimeConfigOverride {
    pub fn apply_to(&self, target: &mut RealtimeConfig) {
        if let Some(endpoint) = self.endpoint.as_ref() {
            target.endpoint = endpoint.clone();
        }
        if let Some(host) = self.host.as_ref() {
            target.host = Some(host.clone());
        }
        if let Some(login) = self.login.as_ref() {
            target.login = Some(login.clone());
        }
        if let Some(passcode) = self.passcode.as_ref() {
            target.passcode = Some(passcode.clone());
        }
        if let Some(value) = self.reconnect_delay_ms {
            target.reconnect_delay_ms = value;
        }
        if let Some(value) = self.heartbeat_ms {
            target.heartbeat_ms = value;
        }
        if let Some(value) = self.connect_timeout_ms {
            target.connect_timeout_ms = value;
        }
        if let Some(value) = self.max_frame_bytes {
            target.max_frame_bytes = value;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NotificationsConfigOverride {
    pub duration_ms: Option<u64>,
}

/// One partially-specified config file. Unset fields leave the layer below
/// untouched.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConfigLayer {
    pub logging: LoggingConfigOverride,
    pub api: ApiConfigOverride,
    pub realtime: RealtimeConfigOverride,
    pub notifications: NotificationsConfigOverride,
}

impl ConfigLayer {
    pub fn apply_to(&self, base: &mut Config) {
        self.logging.apply_to(&mut base.logging);
        self.api.apply_to(&mut base.api);
        self.realtime.apply_to(&mut base.realtime);
        if let Some(duration_ms) = self.notifications.duration_ms {
            base.notifications.duration_ms = duration_ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_timings() {
        let config = Config::default();
        assert_eq!(config.realtime.reconnect_delay_ms, 5_000);
        assert_eq!(config.realtime.heartbeat_ms, 4_000);
        assert_eq!(config.notifications.duration_ms, 3_000);
    }

    #[test]
    fn bridge_config_carries_realtime_and_token() {
        let mut config = Config::default();
        config.api.token = Some("tok".into());
        config.realtime.login = Some("ops".into());
        config.realtime.reconnect_delay_ms = 250;
        config.notifications.duration_ms = 1_000;

        let bridge = config.bridge_config("/topic/payments");
        assert_eq!(bridge.topic, "/topic/payments");
        assert_eq!(bridge.reconnect_delay, Duration::from_millis(250));
        assert_eq!(bridge.toast_duration, Duration::from_secs(1));
        assert_eq!(bridge.endpoint.bearer_token.as_deref(), Some("tok"));
        assert_eq!(bridge.endpoint.login.as_deref(), Some("ops"));
        assert_eq!(bridge.endpoint.heartbeat, Duration::from_millis(4_000));
    }

    #[test]
    fn partial_layer_parses_from_toml() {
        let layer: ConfigLayer = toml::from_str(
            r#"
            [api]
            base_url = "https://mfi.example/api"

            [realtime]
            heartbeat_ms = 0

            [logging.file]
            rotation = "hourly"
            retention_max_files = 3
            "#,
        )
        .unwrap();
        let mut config = Config::default();
        layer.apply_to(&mut config);
        assert_eq!(config.api.base_url, "https://mfi.example/api");
        assert_eq!(config.api.timeout_ms, 15_000);
        assert_eq!(config.realtime.heartbeat_ms, 0);
        assert_eq!(config.realtime.reconnect_delay_ms, 5_000);
        assert_eq!(config.logging.file.rotation, LogRotation::Hourly);
        assert_eq!(config.logging.file.retention_max_files, Some(3));
        assert_eq!(config.logging.file.retention_max_age_days, Some(7));
    }
}
