use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NimbusError, Result};

/// Chat-completion provider settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: None,
            base_url: None,
            organization: None,
        }
    }
}

fn default_model() -> String {
    "gpt-4o".into()
}

/// OpenWeatherMap settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeatherConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_weather_endpoint")]
    pub endpoint: String,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: default_weather_endpoint(),
        }
    }
}

fn default_weather_endpoint() -> String {
    "https://api.openweathermap.org/data/2.5/weather".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let cfg: Self = toml::from_str(&raw)
            .map_err(|err| NimbusError::Config(format!("failed to parse configuration: {err}")))?;
        Ok(cfg)
    }

    /// Load `nimbus.toml` when present, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut cfg = if path.as_ref().exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = env::var("OPENAI_API_KEY") {
            self.model.api_key = Some(key);
        }
        if let Ok(endpoint) = env::var("NIMBUS_OPENAI_ENDPOINT") {
            self.model.base_url = Some(endpoint);
        }
        if let Ok(model) = env::var("NIMBUS_MODEL") {
            self.model.model = model;
        }
        if let Ok(org) = env::var("NIMBUS_OPENAI_ORG") {
            self.model.organization = Some(org);
        }
        if let Ok(key) = env::var("OPEN_WEATHER_MAP_API_KEY") {
            self.weather.api_key = Some(key);
        }
        if let Ok(endpoint) = env::var("NIMBUS_WEATHER_ENDPOINT") {
            self.weather.endpoint = endpoint;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn loads_file_and_applies_overrides() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[model]\nmodel='gpt-4o-mini'\n[weather]\napi_key='file-key'"
        )
        .unwrap();

        env::set_var("OPEN_WEATHER_MAP_API_KEY", "env-key");
        let cfg = AppConfig::load(file.path()).unwrap();
        env::remove_var("OPEN_WEATHER_MAP_API_KEY");

        assert_eq!(cfg.model.model, "gpt-4o-mini");
        assert_eq!(cfg.weather.api_key.as_deref(), Some("env-key"));
        assert_eq!(cfg.weather.endpoint, default_weather_endpoint());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = AppConfig::load("/nonexistent/nimbus.toml").unwrap();
        assert_eq!(cfg.model.model, "gpt-4o");
        assert!(cfg.weather.endpoint.contains("openweathermap"));
    }
}
