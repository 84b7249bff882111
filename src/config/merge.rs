use std::str::FromStr;

use super::{Config, ConfigLayer};

pub fn merge_layers(user: Option<ConfigLayer>, local: Option<ConfigLayer>) -> Config {
    let mut config = Config::default();
    if let Some(layer) = user {
        layer.apply_to(&mut config);
    }
    if let Some(layer) = local {
        layer.apply_to(&mut config);
    }
    config
}

pub fn apply_env_overrides(config: &mut Config) {
    apply_overrides_from(config, |key| std::env::var(key).ok());
}

/// Apply `MFI_*` overrides read through `lookup`. Empty values are skipped;
/// unparsable numbers are logged and ignored.
pub fn apply_overrides_from(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let get = |key: &str| {
        lookup(key)
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
    };

    if let Some(url) = get("MFI_API_URL") {
        config.api.base_url = url;
    }
    if let Some(token) = get("MFI_API_TOKEN") {
        config.api.token = Some(token);
    }
    if let Some(endpoint) = get("MFI_REALTIME_ENDPOINT") {
        config.realtime.endpoint = endpoint;
    }
    if let Some(value) = parse_env::<u64>("MFI_RECONNECT_DELAY_MS", get("MFI_RECONNECT_DELAY_MS")) {
        config.realtime.reconnect_delay_ms = value;
    }
    if let Some(value) = parse_env::<u64>("MFI_HEARTBEAT_MS", get("MFI_HEARTBEAT_MS")) {
        config.realtime.heartbeat_ms = value;
    }
}

fn parse_env<T>(key: &str, raw: Option<String>) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = raw?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!("invalid {key}, ignoring: {err}");
            None
        }
    }
}
