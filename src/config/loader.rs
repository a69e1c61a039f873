//! Configuration Loader
//!
//! Handles loading and merging router configuration from multiple sources.

use crate::config::provider::{
    CacheSettings, ProviderDescriptor, ProviderId, RouterConfig, RoutingSettings,
    UserLimitSettings,
};
use crate::error::{Result, RouterError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment variable naming an extra config file
pub const CONFIG_PATH_ENV: &str = "LLMROUTE_CONFIG";

/// Environment variable overriding `routing.fallback_enabled`
pub const FALLBACK_ENV: &str = "LLMROUTE_FALLBACK_ENABLED";

/// One config source; absent sections leave earlier values alone
#[derive(Debug, Default, Deserialize)]
struct ConfigLayer {
    #[serde(default)]
    providers: BTreeMap<ProviderId, ProviderDescriptor>,
    cache: Option<CacheSettings>,
    routing: Option<RoutingSettings>,
    user_limits: Option<UserLimitSettings>,
}

/// Configuration loader with support for multiple sources
pub struct ConfigLoader {
    config: RouterConfig,
}

impl ConfigLoader {
    /// Create a new config loader and load from default locations
    pub fn new() -> Result<Self> {
        let mut loader = Self {
            config: RouterConfig::default(),
        };

        loader.load_builtin_defaults()?;
        loader.load_from_default_paths()?;
        loader.apply_env_overrides();

        Ok(loader)
    }

    /// Create a loader with a specific config file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let mut loader = Self {
            config: RouterConfig::default(),
        };

        loader.load_builtin_defaults()?;
        loader.load_from_file(path)?;
        loader.apply_env_overrides();

        Ok(loader)
    }

    /// Load built-in provider defaults
    fn load_builtin_defaults(&mut self) -> Result<()> {
        let defaults = include_str!("../../providers.json");
        let layer: ConfigLayer = serde_json::from_str(defaults).map_err(|e| {
            RouterError::Config(format!("Failed to parse built-in providers.json: {}", e))
        })?;

        self.merge_layer(layer);
        Ok(())
    }

    /// Load configuration from default paths
    fn load_from_default_paths(&mut self) -> Result<()> {
        for path in Self::get_config_paths() {
            if path.exists() {
                tracing::debug!(path = %path.display(), "loading router config");
                self.load_from_file(&path)?;
            }
        }

        Ok(())
    }

    /// Get list of config paths to check, lowest precedence first
    fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".llmroute").join("config.json"));
        }

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("llmroute").join("config.json"));
        }

        paths.push(PathBuf::from("llmroute.json"));

        if let Ok(custom_path) = std::env::var(CONFIG_PATH_ENV) {
            paths.push(PathBuf::from(custom_path));
        }

        paths
    }

    /// Load configuration from a specific file
    fn load_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RouterError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let layer: ConfigLayer = serde_json::from_str(&content).map_err(|e| {
            RouterError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        self.merge_layer(layer);
        Ok(())
    }

    /// Merge another layer into this one (later layers override earlier)
    fn merge_layer(&mut self, layer: ConfigLayer) {
        self.config.providers.extend(layer.providers);

        if let Some(cache) = layer.cache {
            self.config.cache = cache;
        }
        if let Some(routing) = layer.routing {
            self.config.routing = routing;
        }
        if let Some(user_limits) = layer.user_limits {
            self.config.user_limits = user_limits;
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Some(enabled) = std::env::var(FALLBACK_ENV).ok().and_then(|v| parse_bool(&v)) {
            self.config.routing.fallback_enabled = enabled;
        }
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Take ownership of the configuration
    pub fn into_config(self) -> RouterConfig {
        self.config
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn builtin() -> ConfigLoader {
        let mut loader = ConfigLoader {
            config: RouterConfig::default(),
        };
        loader.load_builtin_defaults().unwrap();
        loader
    }

    #[test]
    fn test_load_builtin_defaults() {
        let loader = builtin();
        let providers = &loader.config().providers;

        assert_eq!(providers.len(), 3);
        assert_eq!(providers[&ProviderId::Gemini].priority, 1);
        assert_eq!(providers[&ProviderId::OpenAi].priority, 2);
        assert_eq!(providers[&ProviderId::Anthropic].max_requests_per_window, 50);
        assert_eq!(loader.config().cache.max_cache_size, 1000);
    }

    #[test]
    fn test_load_from_custom_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{
                "providers": {{
                    "local": {{
                        "api_key_env": "LOCAL_LLM_KEY",
                        "base_url": "http://localhost:8080/v1",
                        "priority": 0
                    }}
                }},
                "cache": {{ "ttl_seconds": 10, "max_cache_size": 5 }}
            }}"#
        )
        .unwrap();

        let loader = ConfigLoader::from_path(file.path()).unwrap();
        let config = loader.config();

        assert!(config.providers.contains_key(&ProviderId::Local));
        assert!(config.providers.contains_key(&ProviderId::Gemini));
        assert_eq!(config.cache.max_cache_size, 5);
        assert_eq!(config.routing.max_attempts, 3);
    }

    #[test]
    fn test_layer_overrides_provider() {
        let mut loader = builtin();
        let layer: ConfigLayer = serde_json::from_str(
            r#"{ "providers": { "openai": { "api_key_env": "MY_KEY", "enabled": false } } }"#,
        )
        .unwrap();

        loader.merge_layer(layer);

        let openai = &loader.config().providers[&ProviderId::OpenAi];
        assert_eq!(openai.api_key_env, "MY_KEY");
        assert!(!openai.enabled);
        assert_eq!(loader.config().providers.len(), 3);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = ConfigLoader::from_path("/definitely/not/here.json")
            .err()
            .unwrap();
        assert!(matches!(err, RouterError::Config(_)));
    }

    #[test]
    fn test_config_path_precedence() {
        let custom = std::env::temp_dir().join("llmroute-precedence-test.json");
        std::env::set_var(CONFIG_PATH_ENV, &custom);
        let paths = ConfigLoader::get_config_paths();
        std::env::remove_var(CONFIG_PATH_ENV);

        // Later entries override earlier ones
        assert_eq!(paths.last(), Some(&custom));
        let local = paths
            .iter()
            .position(|p| p == Path::new("llmroute.json"))
            .unwrap();
        assert_eq!(local, paths.len() - 2);
        if let Some(home) = dirs::home_dir() {
            assert_eq!(paths[0], home.join(".llmroute").join("config.json"));
        }
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" no "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
