use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::loader::ConfigLoader;
use crate::error::{DownloadError, Result};

/// Read access to configuration values by their composer.json key.
pub trait ConfigSource: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
}

/// Cache related configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "cache-dir", default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    #[serde(rename = "cache-files-dir", default, skip_serializing_if = "Option::is_none")]
    pub cache_files_dir: Option<PathBuf>,

    #[serde(rename = "cache-ttl", default = "default_cache_ttl")]
    pub cache_ttl: u64,

    #[serde(rename = "cache-files-ttl", default, skip_serializing_if = "Option::is_none")]
    pub cache_files_ttl: Option<u64>,

    #[serde(rename = "cache-files-maxsize", default = "default_cache_files_maxsize")]
    pub cache_files_maxsize: u64,

    #[serde(rename = "cache-read-only", default)]
    pub cache_read_only: bool,

    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

fn default_cache_ttl() -> u64 {
    15552000 // 6 months in seconds
}

fn default_cache_files_maxsize() -> u64 {
    300 * 1024 * 1024 // 300 MiB
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: None,
            cache_files_dir: None,
            cache_ttl: default_cache_ttl(),
            cache_files_ttl: None,
            cache_files_maxsize: default_cache_files_maxsize(),
            cache_read_only: false,
            base_dir: None,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Config whose relative paths resolve against `base_dir`
    pub fn with_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: Some(base_dir.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    /// Build configuration from defaults, an optional config file and the
    /// environment, in increasing priority.
    pub fn build(config_file: Option<&Path>, use_environment: bool) -> Result<Self> {
        let loader = ConfigLoader::new(use_environment);
        let mut config = Self::default();

        if let Some(path) = config_file {
            config.base_dir = path.parent().map(Path::to_path_buf);
            config.merge_file(path)?;
        }

        loader.apply_env_overrides(&mut config)?;
        config.resolve_paths(&loader);

        Ok(config)
    }

    /// Merge the `config` section of a composer.json-style file.
    ///
    /// A missing file is ignored. Files without a `config` key are read as a
    /// flat map of settings.
    pub fn merge_file(&mut self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| DownloadError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let raw: Value = serde_json::from_str(&contents)?;

        let section = match raw.get("config") {
            Some(section) => section.clone(),
            None => raw,
        };

        let Value::Object(map) = section else {
            return Err(DownloadError::Config(format!(
                "{}: config must be an object",
                path.display()
            )));
        };

        for (key, value) in map {
            self.merge_value(&key, value)?;
        }

        Ok(())
    }

    /// Merge a single configuration value; unknown keys are ignored
    pub fn merge_value(&mut self, key: &str, value: Value) -> Result<()> {
        match key {
            "cache-dir" => {
                if let Some(s) = value.as_str() {
                    self.cache_dir = Some(PathBuf::from(s));
                }
            }
            "cache-files-dir" => {
                if let Some(s) = value.as_str() {
                    self.cache_files_dir = Some(PathBuf::from(s));
                }
            }
            "cache-ttl" => {
                self.cache_ttl = parse_ttl(&value).ok_or_else(|| invalid_value(key, &value))?;
            }
            "cache-files-ttl" => {
                self.cache_files_ttl = Some(parse_ttl(&value).ok_or_else(|| invalid_value(key, &value))?);
            }
            "cache-files-maxsize" => {
                self.cache_files_maxsize =
                    parse_size_value(&value).ok_or_else(|| invalid_value(key, &value))?;
            }
            "cache-read-only" => {
                if let Some(b) = value.as_bool() {
                    self.cache_read_only = b;
                }
            }
            _ => log::debug!("Ignoring config key {}", key),
        }
        Ok(())
    }

    /// Effective ttl of cached dist files, falling back to `cache-ttl`
    pub fn files_ttl(&self) -> u64 {
        self.cache_files_ttl.unwrap_or(self.cache_ttl)
    }

    /// Directory holding cached dist files
    pub fn get_cache_files_dir(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.cache_files_dir {
            return Some(self.resolve_path(dir));
        }
        self.cache_dir
            .as_ref()
            .map(|dir| self.resolve_path(dir).join("files"))
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    fn resolve_paths(&mut self, loader: &ConfigLoader) {
        if self.cache_dir.is_none() {
            self.cache_dir = Some(loader.get_cache_dir());
        }
    }
}

impl ConfigSource for Config {
    fn get(&self, key: &str) -> Option<Value> {
        match key {
            "cache-dir" => self
                .cache_dir
                .as_ref()
                .map(|p| Value::String(self.resolve_path(p).to_string_lossy().into_owned())),
            "cache-files-dir" => self
                .get_cache_files_dir()
                .map(|p| Value::String(p.to_string_lossy().into_owned())),
            "cache-ttl" => Some(Value::from(self.cache_ttl)),
            "cache-files-ttl" => Some(Value::from(self.files_ttl())),
            "cache-files-maxsize" => Some(Value::from(self.cache_files_maxsize)),
            "cache-read-only" => Some(Value::Bool(self.cache_read_only)),
            _ => None,
        }
    }
}

fn invalid_value(key: &str, value: &Value) -> DownloadError {
    DownloadError::Config(format!("Could not parse the value of '{}': {}", key, value))
}

fn parse_ttl(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_size_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => parse_size(s),
        _ => None,
    }
}

fn size_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"(?i)^\s*([0-9.]+)\s*(?:([kmg])(?:i?b)?)?\s*$").unwrap())
}

/// Parse a byte size such as `"500M"`, `"1.5GiB"`, `"300kb"` or `"1024"`.
///
/// Suffixes are binary: `K` is 1024 bytes.
pub fn parse_size(value: &str) -> Option<u64> {
    let captures = size_regex().captures(value)?;
    let number: f64 = captures.get(1)?.as_str().parse().ok()?;

    let multiplier = match captures.get(2).map(|m| m.as_str().to_ascii_lowercase()) {
        Some(unit) if unit == "g" => 1024.0 * 1024.0 * 1024.0,
        Some(unit) if unit == "m" => 1024.0 * 1024.0,
        Some(unit) if unit == "k" => 1024.0,
        _ => 1.0,
    };

    Some((number * multiplier).round() as u64)
}

/// Garbage collection bounds for the files cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcParams {
    pub ttl: Duration,
    pub max_size: u64,
}

impl Default for GcParams {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(default_cache_ttl()),
            max_size: default_cache_files_maxsize(),
        }
    }
}

impl GcParams {
    /// Read `cache-files-ttl` and `cache-files-maxsize`, in that order.
    ///
    /// Missing or unparsable values fall back to the defaults with a warning;
    /// garbage collection settings never fail a download.
    pub fn from_config(config: &dyn ConfigSource) -> Self {
        let defaults = Self::default();

        let ttl = match config.get("cache-files-ttl") {
            Some(value) => parse_ttl(&value).map(Duration::from_secs).unwrap_or_else(|| {
                log::warn!("Invalid cache-files-ttl {}, using default", value);
                defaults.ttl
            }),
            None => defaults.ttl,
        };

        let max_size = match config.get("cache-files-maxsize") {
            Some(value) => parse_size_value(&value).unwrap_or_else(|| {
                log::warn!("Invalid cache-files-maxsize {}, using default", value);
                defaults.max_size
            }),
            None => defaults.max_size,
        };

        Self { ttl, max_size }
    }
}
