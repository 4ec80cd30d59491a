use std::collections::HashMap;
use std::fs::{self, File, FileTimes};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime};

use parking_lot::{Mutex, RwLock};
use regex::Regex;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use super::ArtifactCache;
use crate::config::Config;

fn sanitize_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new("[^a-z0-9._]").unwrap())
}

/// A cached file as seen by garbage collection
struct Entry {
    path: PathBuf,
    size: u64,
    modified: SystemTime,
    accessed: SystemTime,
}

/// Filesystem cache for downloaded dist files.
///
/// Entries are flat files under `root`, one per sanitized key. Reads refresh
/// the access time so that size-bounded collection evicts the least recently
/// used files first.
pub struct Cache {
    root: PathBuf,
    enabled: bool,
    read_only: bool,
    usable: OnceLock<bool>,
    /// Set once this instance has run garbage collection
    collected: AtomicBool,
    /// Serializes operations on the same key
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Held exclusively while collecting or clearing
    gc_lock: RwLock<()>,
}

impl Cache {
    /// Create a new cache instance
    ///
    /// # Example
    /// ```no_run
    /// use std::path::PathBuf;
    /// use pox_dist::cache::Cache;
    ///
    /// let cache = Cache::new(PathBuf::from("/tmp/composer-cache/files"));
    /// ```
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            enabled: true,
            read_only: false,
            usable: OnceLock::new(),
            collected: AtomicBool::new(false),
            key_locks: Mutex::new(HashMap::new()),
            gc_lock: RwLock::new(()),
        }
    }

    /// Cache for dist files as configured, `None` without a cache directory
    pub fn from_config(config: &Config) -> Option<Self> {
        let mut cache = Self::new(config.get_cache_files_dir()?);
        cache.set_read_only(config.cache_read_only);
        Some(cache)
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Check if cache is enabled and its root usable.
    ///
    /// The root is probed once: created if missing and, unless read-only,
    /// checked for writability.
    pub fn is_enabled(&self) -> bool {
        self.enabled && *self.usable.get_or_init(|| self.probe_root())
    }

    fn probe_root(&self) -> bool {
        if !Self::is_usable(&self.root) {
            return false;
        }

        if self.read_only {
            return self.root.is_dir();
        }

        if !self.root.exists() && fs::create_dir_all(&self.root).is_err() {
            return false;
        }

        let test_file = self.root.join(".cache_test");
        if File::create(&test_file).is_ok() {
            let _ = fs::remove_file(&test_file);
            true
        } else {
            log::warn!("Cache directory {} is not writable, caching disabled", self.root.display());
            false
        }
    }

    /// Check if a cache path is usable (not /dev/null, nul, etc.)
    ///
    /// Only whole path components count: `/home/arnulf/.cache` is usable.
    pub fn is_usable(path: &Path) -> bool {
        let normalized = path.to_string_lossy().replace('\\', "/");
        let components: Vec<&str> = normalized.split('/').collect();

        let null_device = components
            .windows(2)
            .any(|pair| pair[0] == "dev" && pair[1] == "null");

        !(null_device || components.iter().any(|c| matches!(*c, "nul" | "NUL" | "$null")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    fn sanitize_key(&self, key: &str) -> String {
        sanitize_regex().replace_all(key, "-").into_owned()
    }

    fn get_path(&self, key: &str) -> PathBuf {
        self.root.join(self.sanitize_key(key))
    }

    /// Run `f` holding the lock of `key`, dropping the lock entry once unused
    fn with_key_lock<T>(&self, key: &str, f: impl FnOnce(PathBuf) -> T) -> T {
        let key = self.sanitize_key(key);
        let lock = self.key_locks.lock().entry(key.clone()).or_default().clone();

        let result = {
            let _guard = lock.lock();
            f(self.root.join(&key))
        };

        // Clones are only handed out under the map lock, so a count of two
        // (map and ours) means nobody else is waiting on this key
        let mut locks = self.key_locks.lock();
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&key);
        }

        result
    }

    /// Check if a file exists in the cache
    pub fn has(&self, key: &str) -> bool {
        self.is_enabled() && self.get_path(key).is_file()
    }

    /// Read data from cache
    ///
    /// # Returns
    /// * `Ok(Some(data))` - Data was found and read successfully
    /// * `Ok(None)` - Cache is disabled or key doesn't exist
    /// * `Err(e)` - IO error occurred
    pub fn read(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        if !self.is_enabled() {
            return Ok(None);
        }

        let _gc = self.gc_lock.read();
        self.with_key_lock(key, |path| {
            let data = match fs::read(&path) {
                Ok(data) => data,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e),
            };

            if !self.read_only {
                if let Err(e) = touch_accessed(&path) {
                    log::debug!("Could not refresh access time of {}: {}", path.display(), e);
                }
            }

            Ok(Some(data))
        })
    }

    /// Write data to cache.
    ///
    /// Data lands in a temporary file first and is renamed into place, so a
    /// concurrent reader sees either the old entry or the complete new one.
    pub fn write(&self, key: &str, data: &[u8]) -> io::Result<()> {
        if !self.is_enabled() || self.read_only {
            return Ok(());
        }

        let _gc = self.gc_lock.read();
        self.with_key_lock(key, |path| {
            let mut temp = NamedTempFile::new_in(&self.root)?;
            temp.write_all(data)?;
            temp.flush()?;
            temp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
    }

    /// Delete a file from cache
    pub fn remove(&self, key: &str) -> io::Result<()> {
        if !self.is_enabled() || self.read_only {
            return Ok(());
        }

        let _gc = self.gc_lock.read();
        self.with_key_lock(key, |path| match fs::remove_file(path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        })
    }

    /// Remove every entry under the cache root
    pub fn clear(&self) -> io::Result<()> {
        if !self.is_enabled() || self.read_only {
            return Ok(());
        }

        let _gc = self.gc_lock.write();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }

        Ok(())
    }

    /// Whether garbage collection would remove anything.
    ///
    /// False once this instance has collected, so a shared cache is collected
    /// at most once per process.
    pub fn gc_is_necessary(&self, ttl: Duration, max_size: u64) -> bool {
        if self.collected.load(Ordering::Acquire) || !self.is_enabled() || self.read_only {
            return false;
        }

        let _gc = self.gc_lock.read();
        let now = SystemTime::now();
        let mut total = 0u64;

        for entry in self.entries() {
            if is_expired(&entry, now, ttl) {
                return true;
            }
            total += entry.size;
            if total > max_size {
                return true;
            }
        }

        false
    }

    /// Garbage collect cache entries
    ///
    /// Removes files last written more than `ttl` ago, then evicts the least
    /// recently accessed files until the cache fits in `max_size` bytes.
    ///
    /// # Returns
    /// Number of bytes freed
    pub fn gc(&self, ttl: Duration, max_size: u64) -> io::Result<u64> {
        if !self.is_enabled() || self.read_only {
            return Ok(0);
        }

        let _gc = self.gc_lock.write();
        let now = SystemTime::now();
        let mut freed = 0u64;
        let mut remaining = Vec::new();

        for entry in self.entries() {
            if is_expired(&entry, now, ttl) {
                if fs::remove_file(&entry.path).is_ok() {
                    freed += entry.size;
                }
            } else {
                remaining.push(entry);
            }
        }

        let mut total: u64 = remaining.iter().map(|e| e.size).sum();
        if total > max_size {
            remaining.sort_by_key(|e| e.accessed);
            for entry in remaining {
                if total <= max_size {
                    break;
                }
                if fs::remove_file(&entry.path).is_ok() {
                    freed += entry.size;
                    total -= entry.size;
                }
            }
        }

        self.collected.store(true, Ordering::Release);
        log::debug!("Cache garbage collection freed {} bytes in {}", freed, self.root.display());

        Ok(freed)
    }

    /// Hex sha256 of a cached entry, streamed from disk
    pub fn sha256(&self, key: &str) -> io::Result<Option<String>> {
        if !self.is_enabled() {
            return Ok(None);
        }

        let mut file = match File::open(self.get_path(key)) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let mut hasher = Sha256::new();
        io::copy(&mut file, &mut hasher)?;

        Ok(Some(format!("{:x}", hasher.finalize())))
    }

    /// Get the total size of the cache in bytes
    pub fn size(&self) -> io::Result<u64> {
        if !self.is_enabled() {
            return Ok(0);
        }
        Ok(self.entries().iter().map(|e| e.size).sum())
    }

    fn entries(&self) -> Vec<Entry> {
        WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter_map(|entry| {
                let metadata = entry.metadata().ok()?;
                if !metadata.is_file() {
                    return None;
                }
                let modified = metadata.modified().ok()?;
                Some(Entry {
                    path: entry.into_path(),
                    size: metadata.len(),
                    modified,
                    accessed: metadata.accessed().unwrap_or(modified),
                })
            })
            .collect()
    }
}

fn is_expired(entry: &Entry, now: SystemTime, ttl: Duration) -> bool {
    now.duration_since(entry.modified)
        .map(|age| age > ttl)
        .unwrap_or(false)
}

fn touch_accessed(path: &Path) -> io::Result<()> {
    let file = File::options().write(true).open(path)?;
    file.set_times(FileTimes::new().set_accessed(SystemTime::now()))
}

impl ArtifactCache for Cache {
    fn is_enabled(&self) -> bool {
        Cache::is_enabled(self)
    }

    fn get(&self, key: &str) -> Option<Vec<u8>> {
        match self.read(key) {
            Ok(data) => data,
            Err(e) => {
                log::debug!("Cache read of {} failed: {}", key, e);
                None
            }
        }
    }

    fn put(&self, key: &str, data: &[u8]) -> io::Result<()> {
        self.write(key, data)
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        Cache::remove(self, key)
    }

    fn gc_is_necessary(&self, ttl: Duration, max_size: u64) -> bool {
        Cache::gc_is_necessary(self, ttl, max_size)
    }

    fn gc(&self, ttl: Duration, max_size: u64) -> io::Result<u64> {
        Cache::gc(self, ttl, max_size)
    }
}
