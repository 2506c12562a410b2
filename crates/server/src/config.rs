use std::{fs, path::Path, str::FromStr, time::Duration};

use relay::{RelayConfig, DEFAULT_BASE_URL};
use serde::Deserialize;
use tracing::warn;

pub const SETTINGS_FILE: &str = "relay.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_bind: String,
    pub inference_base_url: String,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub max_upload_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8080".into(),
            inference_base_url: DEFAULT_BASE_URL.into(),
            request_timeout_secs: 30,
            connect_timeout_secs: 5,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Settings {
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig::from_base_url(self.inference_base_url.clone()).with_timeouts(
            Duration::from_secs(self.request_timeout_secs),
            Duration::from_secs(self.connect_timeout_secs),
        )
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    bind_addr: Option<String>,
    inference_server_url: Option<String>,
    request_timeout_secs: Option<u64>,
    connect_timeout_secs: Option<u64>,
    max_upload_bytes: Option<usize>,
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then the settings file, then environment variables. Later
/// layers win.
pub fn load_settings_from(
    file: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(file) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => apply_file_settings(&mut settings, file_cfg),
            Err(error) => warn!(path = %file.display(), %error, "ignoring unreadable settings file"),
        }
    }

    if let Some(v) = env("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = env("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = env("PYTHON_SERVER_URL") {
        settings.inference_base_url = v;
    }
    if let Some(v) = env("INFERENCE_SERVER_URL") {
        settings.inference_base_url = v;
    }
    if let Some(v) = env("APP__INFERENCE_SERVER_URL") {
        settings.inference_base_url = v;
    }

    if let Some(v) = parsed_env(&env, "APP__REQUEST_TIMEOUT_SECS") {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = parsed_env(&env, "APP__CONNECT_TIMEOUT_SECS") {
        settings.connect_timeout_secs = v;
    }
    if let Some(v) = parsed_env(&env, "APP__MAX_UPLOAD_BYTES") {
        settings.max_upload_bytes = v;
    }

    settings
}

fn apply_file_settings(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.bind_addr {
        settings.server_bind = v;
    }
    if let Some(v) = file_cfg.inference_server_url {
        settings.inference_base_url = v;
    }
    if let Some(v) = file_cfg.request_timeout_secs {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = file_cfg.connect_timeout_secs {
        settings.connect_timeout_secs = v;
    }
    if let Some(v) = file_cfg.max_upload_bytes {
        settings.max_upload_bytes = v;
    }
}

fn parsed_env<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable environment override");
            None
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
