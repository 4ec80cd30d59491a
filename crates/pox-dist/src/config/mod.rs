//! Configuration for the dist downloader.
//!
//! Only the cache settings are read here. Values are merged from built-in
//! defaults, a composer.json-style file and `COMPOSER_*` environment variables,
//! in increasing priority.
//!
//! ```rust,no_run
//! use pox_dist::config::{Config, ConfigSource, GcParams};
//! use std::path::Path;
//!
//! let config = Config::build(Some(Path::new("/path/to/project/composer.json")), true).unwrap();
//! let gc = GcParams::from_config(&config);
//! println!("files cache: {:?}, ttl {:?}", config.get("cache-files-dir"), gc.ttl);
//! ```

#[allow(clippy::module_inception)]
mod config;
mod loader;

pub use config::{parse_size, Config, ConfigSource, GcParams};
pub use loader::ConfigLoader;
