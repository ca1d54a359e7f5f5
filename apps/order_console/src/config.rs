use std::{collections::HashMap, fs, path::Path, time::Duration};

use client_core::SyncOptions;
use serde::Deserialize;

const SETTINGS_FILE: &str = "orders.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    pub graphql_url: String,
    pub api_token: Option<String>,
    pub page_size: u32,
    pub search_debounce_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            graphql_url: "http://127.0.0.1:8000/graphql".into(),
            api_token: None,
            page_size: 20,
            search_debounce_ms: 1000,
        }
    }
}

impl Settings {
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            page_size: self.page_size,
            search_quiet_period: Duration::from_millis(self.search_debounce_ms),
            ..SyncOptions::default()
        }
    }
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, toml::Value>>(&raw) {
            if let Some(v) = file_cfg.get("graphql_url").and_then(toml::Value::as_str) {
                settings.graphql_url = v.to_string();
            }
            if let Some(v) = file_cfg.get("api_token").and_then(toml::Value::as_str) {
                settings.api_token = Some(v.to_string());
            }
            if let Some(v) = file_cfg
                .get("page_size")
                .and_then(toml::Value::as_integer)
                .and_then(|v| u32::try_from(v).ok())
                .filter(|v| *v > 0)
            {
                settings.page_size = v;
            }
            if let Some(v) = file_cfg
                .get("search_debounce_ms")
                .and_then(toml::Value::as_integer)
                .and_then(|v| u64::try_from(v).ok())
            {
                settings.search_debounce_ms = v;
            }
        }
    }

    if let Some(v) = env("ORDERS_GRAPHQL_URL") {
        settings.graphql_url = v;
    }
    if let Some(v) = env("APP__GRAPHQL_URL") {
        settings.graphql_url = v;
    }

    if let Some(v) = env("ORDERS_API_TOKEN") {
        settings.api_token = Some(v);
    }
    if let Some(v) = env("APP__API_TOKEN") {
        settings.api_token = Some(v);
    }

    if let Some(v) = env("APP__PAGE_SIZE") {
        if let Ok(parsed) = v.parse::<u32>() {
            if parsed > 0 {
                settings.page_size = parsed;
            }
        }
    }
    if let Some(v) = env("APP__SEARCH_DEBOUNCE_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.search_debounce_ms = parsed;
        }
    }

    settings
}

#[cfg(test)]
mod tests {
    use std::{
        env,
        path::PathBuf,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;

    fn temp_settings_file(contents: &str) -> PathBuf {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let dir = env::temp_dir().join(format!("order_console_config_test_{suffix}"));
        fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join(SETTINGS_FILE);
        fs::write(&path, contents).expect("write settings");
        path
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_apply_without_file_or_env() {
        let settings = load_settings_from(Path::new("/nonexistent/orders.toml"), no_env);
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.sync_options().page_size, 20);
        assert_eq!(
            settings.sync_options().search_quiet_period,
            Duration::from_millis(1000)
        );
    }

    #[test]
    fn file_values_override_defaults() {
        let path = temp_settings_file(
            "graphql_url = \"https://erp.example/graphql\"\npage_size = 50\nsearch_debounce_ms = 250\n",
        );
        let settings = load_settings_from(&path, no_env);
        assert_eq!(settings.graphql_url, "https://erp.example/graphql");
        assert_eq!(settings.page_size, 50);
        assert_eq!(settings.search_debounce_ms, 250);
        assert_eq!(settings.api_token, None);
        fs::remove_dir_all(path.parent().expect("parent")).expect("cleanup");
    }

    #[test]
    fn env_overrides_file_and_app_prefix_wins() {
        let path = temp_settings_file("graphql_url = \"https://file/graphql\"\n");
        let settings = load_settings_from(&path, |key| match key {
            "ORDERS_GRAPHQL_URL" => Some("https://legacy/graphql".into()),
            "APP__GRAPHQL_URL" => Some("https://app/graphql".into()),
            "ORDERS_API_TOKEN" => Some("token-1".into()),
            "APP__PAGE_SIZE" => Some("10".into()),
            _ => None,
        });
        assert_eq!(settings.graphql_url, "https://app/graphql");
        assert_eq!(settings.api_token.as_deref(), Some("token-1"));
        assert_eq!(settings.page_size, 10);
        fs::remove_dir_all(path.parent().expect("parent")).expect("cleanup");
    }

    #[test]
    fn invalid_numbers_are_ignored() {
        let path = temp_settings_file("page_size = 0\n");
        let settings = load_settings_from(&path, |key| match key {
            "APP__PAGE_SIZE" => Some("many".into()),
            "APP__SEARCH_DEBOUNCE_MS" => Some("-5".into()),
            _ => None,
        });
        assert_eq!(settings.page_size, 20);
        assert_eq!(settings.search_debounce_ms, 1000);
        fs::remove_dir_all(path.parent().expect("parent")).expect("cleanup");
    }
}
