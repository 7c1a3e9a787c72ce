use serde::Deserialize;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::api::DEFAULT_API_URL;

const DEFAULT_STEP_DELAY_MS: u64 = 800;

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub debug: Option<bool>,
    pub api: Option<ApiConfig>,
    pub thinking: Option<ThinkingConfig>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    pub base_url: Option<String>,
}

/// Simulated "thinking" steps shown while a chat request is in flight.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingConfig {
    pub enabled: Option<bool>,
    pub step_delay_ms: Option<u64>,
    pub steps: Option<Vec<String>>,
}

fn default_steps() -> Vec<String> {
    [
        "Reading your question",
        "Checking your trusted sources",
        "Consulting the medical assistant",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Config {
    pub fn load() -> Self {
        let config_paths = [
            dirs::home_dir().map(|p| p.join(".medchat.json")),
            dirs::config_dir().map(|p| p.join("medchat/.medchat.json")),
            Some(PathBuf::from("./.medchat.json")),
        ];
        let mut cfg = Self::load_from_paths(config_paths.iter().flatten());
        cfg.apply_env(|key| env::var(key).ok());
        log::debug!("Loaded config: {:?}", cfg);
        cfg
    }

    /// Merges every readable file in order; later files override earlier ones.
    pub fn load_from_paths<'a>(paths: impl IntoIterator<Item = &'a PathBuf>) -> Self {
        let mut config = Config::default();
        for path in paths {
            if !path.exists() {
                continue;
            }
            log::debug!("Attempting to load config from: {:?}", path);
            match fs::read_to_string(path) {
                Ok(content) => match serde_json::from_str::<Config>(&content) {
                    Ok(loaded) => {
                        config.merge(loaded);
                        log::info!("Successfully loaded and merged config from: {:?}", path);
                    }
                    Err(e) => log::warn!("Failed to parse config file at {:?}: {}", path, e),
                },
                Err(e) => log::warn!("Failed to read config file at {:?}: {}", path, e),
            }
        }
        config
    }

    pub fn merge(&mut self, other: Config) {
        if other.debug.is_some() {
            self.debug = other.debug;
        }
        if let Some(loaded_api) = other.api {
            let current = self.api.get_or_insert_with(Default::default);
            if loaded_api.base_url.is_some() {
                current.base_url = loaded_api.base_url;
            }
        }
        if let Some(loaded) = other.thinking {
            let current = self.thinking.get_or_insert_with(Default::default);
            if loaded.enabled.is_some() {
                current.enabled = loaded.enabled;
            }
            if loaded.step_delay_ms.is_some() {
                current.step_delay_ms = loaded.step_delay_ms;
            }
            if loaded.steps.is_some() {
                current.steps = loaded.steps;
            }
        }
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("MEDCHAT_API_URL").filter(|u| !u.trim().is_empty()) {
            self.api.get_or_insert_with(Default::default).base_url = Some(url);
        }
        if let Some(debug_env) = lookup("MEDCHAT_DEBUG").and_then(|s| s.parse::<bool>().ok()) {
            self.debug = Some(debug_env);
        }
    }

    pub fn api_url(&self) -> String {
        self.api
            .as_ref()
            .and_then(|a| a.base_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    pub fn thinking_enabled(&self) -> bool {
        self.thinking.as_ref().and_then(|t| t.enabled).unwrap_or(true)
    }

    pub fn thinking_delay(&self) -> Duration {
        let ms = self.thinking.as_ref().and_then(|t| t.step_delay_ms).unwrap_or(DEFAULT_STEP_DELAY_MS);
        Duration::from_millis(ms)
    }

    pub fn thinking_steps(&self) -> Vec<String> {
        self.thinking.as_ref().and_then(|t| t.steps.clone()).unwrap_or_else(default_steps)
    }
}
