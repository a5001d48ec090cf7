use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::PathBuf, time::Duration};

use crate::{
    cache::CachePolicy,
    provider::{ProviderId, ProviderMode},
    resolver::ResolverSettings,
    retry::RetryPolicy,
    units::Units,
};

/// Environment variable that overrides the stored primary-provider key.
pub const API_KEY_ENV: &str = "SKYLINE_OPENWEATHER_API_KEY";

/// Configuration for a single provider (e.g., API key).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,
}

/// Resolution preferences.
///
/// Example TOML:
/// [resolver]
/// units = "imperial"
/// provider_mode = "auto"
/// default_region = "IN"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSection {
    pub units: Units,
    pub provider_mode: ProviderMode,
    /// Region appended to unqualified place names when geocoding.
    pub default_region: Option<String>,
    pub timeout_secs: u64,
    /// Extra attempts per GET on transient failures; 0 disables retry.
    pub retries: u32,
    pub cache_ttl_secs: u64,
    pub serve_stale: bool,
}

impl Default for ResolverSection {
    fn default() -> Self {
        Self {
            units: Units::Metric,
            provider_mode: ProviderMode::Auto,
            default_region: None,
            timeout_secs: 10,
            retries: 0,
            cache_ttl_secs: 300,
            serve_stale: false,
        }
    }
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Example TOML:
    /// [providers.openweather]
    /// api_key = "..."
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    #[serde(default)]
    pub resolver: ResolverSection,
}

impl Config {
    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load config and apply environment overrides. Do not `save()` the result.
    pub fn load_with_env() -> Result<Self> {
        let mut cfg = Self::load()?;
        cfg.apply_env_overrides(std::env::var(API_KEY_ENV).ok());
        Ok(cfg)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Invalid configuration TOML")
    }

    fn apply_env_overrides(&mut self, api_key: Option<String>) {
        if let Some(key) = api_key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty()) {
            self.providers
                .insert(ProviderId::OpenWeather.as_str().to_string(), ProviderConfig { api_key: key });
        }
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "skyline", "skyline")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Path to the snapshot cache shared between runs.
    pub fn cache_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "skyline", "skyline")
            .ok_or_else(|| anyhow!("Could not determine platform cache directory"))?;

        Ok(dirs.cache_dir().join("snapshots.json"))
    }

    /// Set or replace a provider API key.
    pub fn upsert_provider_api_key(&mut self, provider_id: ProviderId, api_key: String) {
        self.providers
            .insert(provider_id.as_str().to_string(), ProviderConfig { api_key });
    }

    /// Returns API key for a provider, if present and non-blank.
    pub fn provider_api_key(&self, provider_id: ProviderId) -> Option<&str> {
        self.providers
            .get(provider_id.as_str())
            .map(|cfg| cfg.api_key.trim())
            .filter(|key| !key.is_empty())
    }

    pub fn is_provider_configured(&self, provider_id: ProviderId) -> bool {
        !provider_id.requires_api_key() || self.provider_api_key(provider_id).is_some()
    }

    pub fn set_provider_mode(&mut self, mode: ProviderMode) {
        self.resolver.provider_mode = mode;
    }

    pub fn resolver_settings(&self) -> ResolverSettings {
        let retry = (self.resolver.retries > 0).then(|| RetryPolicy {
            max_retries: self.resolver.retries,
            ..RetryPolicy::default()
        });

        ResolverSettings {
            timeout: Duration::from_secs(self.resolver.timeout_secs.max(1)),
            retry,
            default_region: self.resolver.default_region.clone(),
        }
    }

    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            ttl: Duration::from_secs(self.resolver.cache_ttl_secs),
            serve_stale_on_failure: self.resolver.serve_stale,
        }
    }
}
