use std::env;
use std::path::PathBuf;

use serde_json::Value;

use super::config::Config;
use crate::error::Result;

/// Keys that may be overridden through `COMPOSER_*` environment variables
const ENV_KEYS: &[&str] = &[
    "cache-dir",
    "cache-files-dir",
    "cache-files-ttl",
    "cache-files-maxsize",
    "cache-read-only",
];

/// Resolves environment overrides and platform directories
#[derive(Debug)]
pub struct ConfigLoader {
    use_environment: bool,
}

impl ConfigLoader {
    pub fn new(use_environment: bool) -> Self {
        Self { use_environment }
    }

    /// Get a non-empty COMPOSER_* environment variable
    pub fn get_composer_env(&self, var: &str) -> Option<String> {
        if !self.use_environment {
            return None;
        }

        env::var(var).ok().filter(|s| !s.is_empty())
    }

    /// Environment value for a config key, `cache-files-ttl` -> `COMPOSER_CACHE_FILES_TTL`
    pub fn get_env_config(&self, key: &str) -> Option<String> {
        let var = format!("COMPOSER_{}", key.to_uppercase().replace('-', "_"));
        self.get_composer_env(&var)
    }

    /// Get the composer home directory
    pub fn get_composer_home(&self) -> PathBuf {
        if let Some(home) = self.get_composer_env("COMPOSER_HOME") {
            return PathBuf::from(home);
        }

        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "composer") {
            proj_dirs.config_dir().to_path_buf()
        } else if let Some(base_dirs) = directories::BaseDirs::new() {
            base_dirs.home_dir().join(".composer")
        } else {
            PathBuf::from(".composer")
        }
    }

    /// Get the cache directory
    pub fn get_cache_dir(&self) -> PathBuf {
        if let Some(cache) = self.get_composer_env("COMPOSER_CACHE_DIR") {
            return PathBuf::from(cache);
        }

        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "composer") {
            proj_dirs.cache_dir().to_path_buf()
        } else {
            self.get_composer_home().join("cache")
        }
    }

    pub(crate) fn apply_env_overrides(&self, config: &mut Config) -> Result<()> {
        for key in ENV_KEYS {
            let Some(raw) = self.get_env_config(key) else {
                continue;
            };

            let value = match *key {
                "cache-read-only" => Value::Bool(matches!(raw.as_str(), "1" | "true" | "yes")),
                _ => Value::String(raw),
            };
            log::debug!("Config {} overridden from environment", key);
            config.merge_value(key, value)?;
        }
        Ok(())
    }
}
