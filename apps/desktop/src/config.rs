use std::{collections::HashMap, fs, path::Path, path::PathBuf, time::Duration};

use anyhow::Result;
use client_core::{base_url_for_target_ip, ViewerConfig};
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub base_url: String,
    pub target_ip: Option<String>,
    pub state_file: PathBuf,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1/pfodWeb".into(),
            target_ip: None,
            state_file: PathBuf::from("./data/viewer_state.json"),
            max_retries: client_core::config::DEFAULT_MAX_RETRIES,
            retry_delay_ms: client_core::config::DEFAULT_RETRY_DELAY.as_millis() as u64,
            log_filter: "info".into(),
        }
    }
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new("viewer.toml"), |key| std::env::var(key).ok())
}

/// Defaults, then `path` (flat string keys), then environment overrides.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<HashMap<String, String>>(&raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.get("base_url") {
                    settings.base_url = v.clone();
                }
                if let Some(v) = file_cfg.get("target_ip") {
                    settings.target_ip = Some(v.clone());
                }
                if let Some(v) = file_cfg.get("state_file") {
                    settings.state_file = PathBuf::from(v);
                }
                if let Some(v) = file_cfg.get("log_filter") {
                    settings.log_filter = v.clone();
                }
            }
            Err(err) => warn!(path = %path.display(), error = %err, "ignoring unreadable settings file"),
        }
    }

    if let Some(v) = env("VIEWER_BASE_URL") {
        settings.base_url = v;
    }
    if let Some(v) = env("APP__BASE_URL") {
        settings.base_url = v;
    }

    if let Some(v) = env("VIEWER_TARGET_IP") {
        settings.target_ip = Some(v);
    }

    if let Some(v) = env("APP__STATE_FILE") {
        settings.state_file = PathBuf::from(v);
    }

    if let Some(v) = env("APP__MAX_RETRIES") {
        if let Ok(parsed) = v.parse::<u32>() {
            settings.max_retries = parsed;
        }
    }
    if let Some(v) = env("APP__RETRY_DELAY_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.retry_delay_ms = parsed;
        }
    }

    if let Some(v) = env("APP__LOG_FILTER") {
        settings.log_filter = v;
    }

    settings
}

/// Builds the core configuration. A valid target IP wins over the base URL.
pub fn viewer_config(settings: &Settings) -> Result<ViewerConfig> {
    let target = settings.target_ip.as_deref().and_then(|ip| {
        let url = base_url_for_target_ip(ip);
        if url.is_none() {
            warn!(target_ip = ip, "ignoring invalid target ip");
        }
        url
    });
    let mut config = match target {
        Some(url) => ViewerConfig::new(url),
        None => ViewerConfig::parse(&settings.base_url)?,
    };
    config.max_retries = settings.max_retries;
    config.retry_delay = Duration::from_millis(settings.retry_delay_ms);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::{
        env,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn file_then_env_overrides_defaults() {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let path = env::temp_dir().join(format!("viewer_settings_test_{suffix}.toml"));
        fs::write(
            &path,
            "base_url = \"http://10.0.0.5/pfodWeb\"\nstate_file = \"/tmp/state.json\"\n",
        )
        .expect("write settings");

        let from_file = load_settings_from(&path, no_env);
        assert_eq!(from_file.base_url, "http://10.0.0.5/pfodWeb");
        assert_eq!(from_file.state_file, PathBuf::from("/tmp/state.json"));
        assert_eq!(from_file.max_retries, 5);

        let overridden = load_settings_from(&path, |key| match key {
            "APP__BASE_URL" => Some("http://10.0.0.9/pfodWeb".into()),
            "APP__MAX_RETRIES" => Some("2".into()),
            "APP__RETRY_DELAY_MS" => Some("not-a-number".into()),
            _ => None,
        });
        assert_eq!(overridden.base_url, "http://10.0.0.9/pfodWeb");
        assert_eq!(overridden.max_retries, 2);
        assert_eq!(overridden.retry_delay_ms, 10);

        fs::remove_file(path).expect("cleanup");
    }

    #[test]
    fn missing_file_keeps_defaults() {
        let settings = load_settings_from(Path::new("/nonexistent/viewer.toml"), no_env);
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn valid_target_ip_replaces_base_url() {
        let settings = Settings {
            target_ip: Some("192.168.4.1".into()),
            retry_delay_ms: 25,
            ..Settings::default()
        };
        let config = viewer_config(&settings).expect("config");
        assert_eq!(config.base_url.as_str(), "http://192.168.4.1/pfodWeb");
        assert_eq!(config.retry_delay, Duration::from_millis(25));

        let settings = Settings {
            target_ip: Some("999.1.1.1".into()),
            ..Settings::default()
        };
        let config = viewer_config(&settings).expect("config");
        assert_eq!(config.base_url.as_str(), "http://127.0.0.1/pfodWeb");
    }
}
