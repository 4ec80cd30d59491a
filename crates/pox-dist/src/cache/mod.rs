// Local store for downloaded dist artifacts

#[allow(clippy::module_inception)]
mod cache;

use std::io;
use std::time::Duration;

pub use cache::Cache;

/// Cache capability used by the downloader.
///
/// Reads never fail: a missing or unreadable entry is a miss. Write failures
/// are reported but callers treat them as best-effort.
pub trait ArtifactCache: Send + Sync {
    fn is_enabled(&self) -> bool;

    fn get(&self, key: &str) -> Option<Vec<u8>>;

    fn put(&self, key: &str, data: &[u8]) -> io::Result<()>;

    fn remove(&self, key: &str) -> io::Result<()>;

    fn gc_is_necessary(&self, ttl: Duration, max_size: u64) -> bool;

    /// Returns the number of bytes freed
    fn gc(&self, ttl: Duration, max_size: u64) -> io::Result<u64>;
}
