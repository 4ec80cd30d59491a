//! Dist file downloader.
//!
//! Fetches a package's dist file from the cache or from its dist urls,
//! verifies it and places it in the install path. Updates replace an existing
//! install; failed installs leave neither files nor cache entries behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};

use super::checksum::verify_checksum;
use super::install::{get_file_name, InstallTarget, Installer};
use super::sources::{try_each_source, DistSource, DistSources};
use crate::cache::ArtifactCache;
use crate::config::{ConfigSource, GcParams};
use crate::event::{DownloadEvent, EventDispatcher, PostFileDownloadEvent, PreFileDownloadEvent};
use crate::filesystem::{Filesystem, LocalFilesystem};
use crate::http::RemoteFetcher;
use crate::output::Io;
use crate::package::Package;
use crate::version::is_upgrade;
use crate::{DownloadError, Result};

/// Where fetched bytes came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactOrigin {
    Cache,
    Remote(DistSource),
}

/// A verified dist file held in memory
#[derive(Debug, Clone)]
pub struct FetchedArtifact {
    pub bytes: Vec<u8>,
    pub origin: ArtifactOrigin,
    pub cache_key: String,
    /// Whether this fetch stored the bytes in the cache
    pub cached: bool,
}

impl FetchedArtifact {
    pub fn is_from_cache(&self) -> bool {
        self.origin == ArtifactOrigin::Cache
    }

    /// Url the bytes were downloaded from, `None` for cache hits
    pub fn url(&self) -> Option<&str> {
        match &self.origin {
            ArtifactOrigin::Cache => None,
            ArtifactOrigin::Remote(source) => Some(&source.url),
        }
    }
}

/// Downloader for single-file dists.
pub struct FileDownloader {
    io: Arc<dyn Io>,
    config: Arc<dyn ConfigSource>,
    transport: Arc<dyn RemoteFetcher>,
    cache: Option<Arc<dyn ArtifactCache>>,
    events: Option<Arc<EventDispatcher>>,
    filesystem: Arc<dyn Filesystem>,
}

impl FileDownloader {
    /// Create a downloader without cache or event listeners
    pub fn new(io: Arc<dyn Io>, config: Arc<dyn ConfigSource>, transport: Arc<dyn RemoteFetcher>) -> Self {
        Self {
            io,
            config,
            transport,
            cache: None,
            events: None,
            filesystem: Arc::new(LocalFilesystem),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ArtifactCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_event_dispatcher(mut self, events: Arc<EventDispatcher>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_filesystem(mut self, filesystem: Arc<dyn Filesystem>) -> Self {
        self.filesystem = filesystem;
        self
    }

    /// Cache key of a package's dist file.
    ///
    /// Unique per package, version, dist reference and primary dist url.
    pub fn cache_key(&self, package: &Package) -> String {
        let mut hasher = Sha256::new();
        hasher.update(package.name.as_bytes());
        hasher.update(package.version.as_bytes());
        hasher.update(package.dist_reference().unwrap_or_default().as_bytes());
        hasher.update(package.dist_url().unwrap_or_default().as_bytes());

        let name: String = package
            .name
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '_' { c } else { '-' })
            .collect();

        format!("{}-{:x}.{}", name, hasher.finalize(), package.dist_type())
    }

    /// Fetch and verify a package's dist file.
    ///
    /// A verified cache entry is returned without touching the network.
    /// Otherwise dist urls are tried in order until one yields bytes matching
    /// the declared checksum. Cache garbage collection runs once afterwards,
    /// whatever the outcome.
    pub async fn fetch(&self, package: &Package, use_cache: bool) -> Result<FetchedArtifact> {
        self.fetch_for(package, use_cache, None).await
    }

    /// `fetch` for an install; `file_name` is reported in the post-download event
    async fn fetch_for(&self, package: &Package, use_cache: bool, file_name: Option<&Path>) -> Result<FetchedArtifact> {
        require_dist_url(package)?;

        let result = self.fetch_artifact(package, use_cache, file_name).await;
        self.collect_garbage();
        result
    }

    async fn fetch_artifact(
        &self,
        package: &Package,
        use_cache: bool,
        file_name: Option<&Path>,
    ) -> Result<FetchedArtifact> {
        let post_download = |url: Option<String>| {
            let event = PostFileDownloadEvent::new(&package.name, url.clone(), url.is_none());
            match file_name {
                Some(file_name) => event.with_file_name(file_name.to_path_buf()),
                None => event,
            }
        };

        let cache_key = self.cache_key(package);
        let checksum = package.dist_checksum();
        let cache = self.cache.as_deref().filter(|c| use_cache && c.is_enabled());

        if let Some(cache) = cache {
            if let Some(bytes) = cache.get(&cache_key) {
                match verify_checksum(&bytes, checksum) {
                    Ok(()) => {
                        log::debug!("Loaded {} from cache entry {}", package.name, cache_key);
                        self.dispatch(&post_download(None));
                        return Ok(FetchedArtifact {
                            bytes,
                            origin: ArtifactOrigin::Cache,
                            cache_key,
                            cached: false,
                        });
                    }
                    Err(failure) => {
                        log::warn!(
                            "Cached file for {} is corrupt (expected {}, got {}), downloading again",
                            package.name,
                            failure.expected,
                            failure.actual
                        );
                        if let Err(e) = cache.remove(&cache_key) {
                            log::debug!("Could not remove corrupt cache entry {}: {}", cache_key, e);
                        }
                    }
                }
            }
        }

        let options = package.transport_options();
        let options = &options;
        let io = self.io.as_ref();

        let (bytes, source) = try_each_source(
            &package.name,
            DistSources::for_package(package),
            |_, error, has_next| {
                if has_next {
                    io.write_error("    Failed, trying the next URL");
                    if io.is_verbose() {
                        io.write_error(&format!("    {}", error));
                    }
                }
            },
            move |source| async move {
                self.dispatch(&PreFileDownloadEvent::new(&package.name, &source.url));

                let bytes = self
                    .transport
                    .fetch(&source.url, options)
                    .await
                    .map_err(|e| DownloadError::TransportFailure {
                        url: source.url.clone(),
                        source: e,
                    })?;

                verify_checksum(&bytes, checksum).map_err(|failure| DownloadError::ChecksumMismatch {
                    package: package.name.clone(),
                    url: source.url.clone(),
                    expected: failure.expected,
                    actual: failure.actual,
                })?;

                Ok(bytes)
            },
        )
        .await?;

        let cached = match cache {
            Some(cache) => match cache.put(&cache_key, &bytes) {
                Ok(()) => true,
                Err(e) => {
                    log::debug!("Could not write {} to the cache: {}", cache_key, e);
                    false
                }
            },
            None => false,
        };

        self.dispatch(&post_download(Some(source.url.clone())));

        Ok(FetchedArtifact {
            bytes,
            origin: ArtifactOrigin::Remote(source),
            cache_key,
            cached,
        })
    }

    /// Download a package's dist file into `path`, returning the file written.
    pub async fn download(&self, package: &Package, path: &Path) -> Result<PathBuf> {
        require_dist_url(package)?;

        self.io.write(&format!(
            "  - Installing {} ({})",
            package.name,
            package.full_pretty_version()
        ));

        self.install(package, path).await
    }

    /// Replace the install of `initial` in `path` with `target`.
    ///
    /// The old install is removed before the new one is fetched and is not
    /// restored if that fails.
    pub async fn update(&self, initial: &Package, target: &Package, path: &Path) -> Result<PathBuf> {
        require_dist_url(target)?;
        Installer::new(self.filesystem.clone()).check_destination(path)?;

        let versions = format!(
            "{} ({} => {})",
            target.name,
            initial.full_pretty_version(),
            target.full_pretty_version()
        );
        if is_upgrade(&initial.version, &target.version) {
            self.io.write(&format!("  - Updating {}", versions));
        } else {
            self.io.write_error(&format!("  - Downgrading {}", versions));
        }

        self.remove_path(path)?;
        self.install(target, path).await
    }

    /// Remove an installed package
    pub fn remove(&self, package: &Package, path: &Path) -> Result<()> {
        self.io.write(&format!(
            "  - Removing {} ({})",
            package.name,
            package.full_pretty_version()
        ));

        self.remove_path(path)
    }

    fn remove_path(&self, path: &Path) -> Result<()> {
        self.filesystem
            .remove_directory(path)
            .map_err(|e| DownloadError::RemovalFailure {
                path: path.to_path_buf(),
                source: e,
            })
    }

    async fn install(&self, package: &Package, path: &Path) -> Result<PathBuf> {
        let installer = Installer::new(self.filesystem.clone());
        let target = installer.prepare(path, get_file_name(package, path))?;

        let artifact = match self.fetch_for(package, true, Some(&target.file)).await {
            Ok(artifact) => artifact,
            Err(e) => {
                installer.rollback(&target);
                return Err(e);
            }
        };

        if artifact.is_from_cache() {
            self.io.write("    Loading from cache");
        } else {
            self.io.write("    Downloading");
        }

        let url = artifact.url().or(package.dist_url()).unwrap_or_default();
        match installer.write(&target, &artifact.bytes, url) {
            Ok(file) => {
                log::debug!("Installed {} to {}", package.name, file.display());
                Ok(file)
            }
            Err(e) => {
                self.abort_install(&installer, &target, &artifact);
                Err(e)
            }
        }
    }

    fn abort_install(&self, installer: &Installer, target: &InstallTarget, artifact: &FetchedArtifact) {
        installer.rollback(target);

        // The bytes may be what broke the install, do not serve them again
        if artifact.cached {
            if let Some(cache) = &self.cache {
                if let Err(e) = cache.remove(&artifact.cache_key) {
                    log::debug!("Could not evict cache entry {}: {}", artifact.cache_key, e);
                }
            }
        }
    }

    fn collect_garbage(&self) {
        let Some(cache) = &self.cache else {
            return;
        };

        let params = GcParams::from_config(self.config.as_ref());
        if !cache.gc_is_necessary(params.ttl, params.max_size) {
            return;
        }

        match cache.gc(params.ttl, params.max_size) {
            Ok(freed) => log::debug!("Cache garbage collection freed {} bytes", freed),
            Err(e) => log::warn!("Cache garbage collection failed: {}", e),
        }
    }

    fn dispatch<E: DownloadEvent>(&self, event: &E) {
        if let Some(events) = &self.events {
            events.dispatch(event);
        }
    }
}

fn require_dist_url(package: &Package) -> Result<()> {
    match package.dist_url() {
        Some(_) => Ok(()),
        None => Err(DownloadError::InvalidArgument {
            package: package.name.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::Value;
    use tempfile::TempDir;

    use crate::cache::Cache;
    use crate::event::{EventListener, EventType, ListenerError};
    use crate::http::{TransportError, TransportOptions};
    use crate::output::BufferOutput;
    use crate::package::{Dist, Mirror};

    const SCRIPT: &[u8] = b"console.log('hello');";

    /// Serves fixed bodies per url; unknown urls fail
    #[derive(Default)]
    struct FakeTransport {
        bodies: HashMap<String, Vec<u8>>,
        requests: Mutex<Vec<String>>,
    }

    impl FakeTransport {
        fn serving(url: &str, body: &[u8]) -> Self {
            let mut transport = Self::default();
            transport.bodies.insert(url.to_string(), body.to_vec());
            transport
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().clone()
        }
    }

    #[async_trait]
    impl RemoteFetcher for FakeTransport {
        async fn fetch(&self, url: &str, _options: &TransportOptions) -> std::result::Result<Vec<u8>, TransportError> {
            self.requests.lock().push(url.to_string());
            self.bodies.get(url).cloned().ok_or_else(|| TransportError::Status {
                status: 404,
                url: url.to_string(),
            })
        }
    }

    #[derive(Default)]
    struct MapConfig(HashMap<String, Value>);

    impl MapConfig {
        fn with(mut self, key: &str, value: &str) -> Self {
            self.0.insert(key.to_string(), Value::String(value.to_string()));
            self
        }
    }

    impl ConfigSource for MapConfig {
        fn get(&self, key: &str) -> Option<Value> {
            self.0.get(key).cloned()
        }
    }

    /// Cache that always wants collecting and records gc calls
    #[derive(Default)]
    struct RecordingCache {
        entries: Mutex<HashMap<String, Vec<u8>>>,
        gc_calls: Mutex<Vec<(Duration, u64)>>,
        reads: AtomicUsize,
        full: bool,
    }

    impl ArtifactCache for RecordingCache {
        fn is_enabled(&self) -> bool {
            true
        }

        fn get(&self, key: &str) -> Option<Vec<u8>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.entries.lock().get(key).cloned()
        }

        fn put(&self, key: &str, data: &[u8]) -> io::Result<()> {
            if self.full {
                return Err(io::Error::new(io::ErrorKind::StorageFull, "disk full"));
            }
            self.entries.lock().insert(key.to_string(), data.to_vec());
            Ok(())
        }

        fn remove(&self, key: &str) -> io::Result<()> {
            self.entries.lock().remove(key);
            Ok(())
        }

        fn gc_is_necessary(&self, _ttl: Duration, _max_size: u64) -> bool {
            true
        }

        fn gc(&self, ttl: Duration, max_size: u64) -> io::Result<u64> {
            self.gc_calls.lock().push((ttl, max_size));
            Ok(0)
        }
    }

    /// Records removals, never writes file contents
    #[derive(Default)]
    struct TrackingFilesystem {
        removed_dirs: Mutex<Vec<PathBuf>>,
        drop_writes: bool,
        deny_removals: bool,
    }

    impl Filesystem for TrackingFilesystem {
        fn ensure_directory_exists(&self, path: &Path) -> io::Result<()> {
            LocalFilesystem.ensure_directory_exists(path)
        }

        fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
            if self.drop_writes {
                return Ok(());
            }
            LocalFilesystem.write_file(path, contents)
        }

        fn remove_file(&self, path: &Path) -> io::Result<()> {
            LocalFilesystem.remove_file(path)
        }

        fn remove_directory(&self, path: &Path) -> io::Result<()> {
            self.removed_dirs.lock().push(path.to_path_buf());
            if self.deny_removals {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only mount"));
            }
            LocalFilesystem.remove_directory(path)
        }
    }

    /// Keeps regular and diagnostic lines apart
    #[derive(Default)]
    struct ChannelOutput {
        lines: Mutex<Vec<(&'static str, String)>>,
    }

    impl Io for ChannelOutput {
        fn write(&self, message: &str) {
            self.lines.lock().push(("write", message.to_string()));
        }

        fn write_error(&self, message: &str) {
            self.lines.lock().push(("write_error", message.to_string()));
        }
    }

    fn script_package(version: &str, pretty: &str) -> Package {
        Package::new("vendor/script", version)
            .with_pretty_version(pretty)
            .with_dist(Dist::file("https://example.com/script.js"))
    }

    fn downloader(io: Arc<BufferOutput>, transport: Arc<FakeTransport>) -> FileDownloader {
        FileDownloader::new(io, Arc::new(MapConfig::default()), transport)
    }

    #[tokio::test]
    async fn test_missing_dist_url_is_invalid() {
        let io = Arc::new(BufferOutput::new());
        let transport = Arc::new(FakeTransport::default());
        let cache = Arc::new(RecordingCache::default());
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vendor/script");

        let downloader = downloader(io.clone(), transport.clone()).with_cache(cache.clone());
        let package = Package::new("vendor/script", "1.0.0.0").with_dist(Dist::file(""));

        let err = downloader.download(&package, &path).await.unwrap_err();
        assert!(matches!(err, DownloadError::InvalidArgument { .. }));

        assert!(transport.requests().is_empty());
        assert_eq!(cache.reads.load(Ordering::SeqCst), 0);
        assert!(cache.gc_calls.lock().is_empty());
        assert!(io.lines().is_empty());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_destination_file_conflict() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("c123");
        fs::write(&path, b"original").unwrap();

        let transport = Arc::new(FakeTransport::serving("https://example.com/script.js", SCRIPT));
        let downloader = downloader(Arc::new(BufferOutput::new()), transport.clone());

        let err = downloader
            .download(&script_package("1.0.0.0", "1.0.0"), &path)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::PathConflict { .. }));
        assert!(err.to_string().contains("exists and is not a directory"));
        assert_eq!(fs::read(&path).unwrap(), b"original");
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_download_writes_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vendor/script");
        let io = Arc::new(BufferOutput::new());
        let transport = Arc::new(FakeTransport::serving("https://example.com/script.js", SCRIPT));

        let file = downloader(io.clone(), transport)
            .download(&script_package("1.0.0.0", "1.0.0"), &path)
            .await
            .unwrap();

        assert_eq!(file, path.join("script.js"));
        assert_eq!(fs::read(&file).unwrap(), SCRIPT);
        assert_eq!(io.lines(), vec!["  - Installing vendor/script (1.0.0)", "    Downloading"]);
    }

    #[tokio::test]
    async fn test_all_sources_fail_checksum() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vendor/script");

        let mut transport = FakeTransport::serving("https://example.com/script.js", SCRIPT);
        transport
            .bodies
            .insert("https://mirror.example.com/script.js".to_string(), SCRIPT.to_vec());
        let transport = Arc::new(transport);

        let package = Package::new("vendor/script", "1.0.0.0").with_dist(
            Dist::file("https://example.com/script.js")
                .with_shasum("0000000000000000000000000000000000000000")
                .with_mirrors(vec![Mirror::fallback("https://mirror.example.com/script.js")]),
        );

        let io = Arc::new(BufferOutput::new());
        let err = downloader(io.clone(), transport.clone())
            .download(&package, &path)
            .await
            .unwrap_err();

        match err {
            DownloadError::SourcesExhausted { failures, .. } => {
                assert_eq!(failures.len(), 2);
                assert!(failures
                    .iter()
                    .all(|f| matches!(f, DownloadError::ChecksumMismatch { .. })));
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(transport.requests().len(), 2);
        assert!(!path.join("script.js").exists());
        assert!(!path.exists());
        assert!(io.lines().contains(&"    Failed, trying the next URL".to_string()));
    }

    #[tokio::test]
    async fn test_fallback_to_next_source() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vendor/script");
        let transport = Arc::new(FakeTransport::serving("https://mirror.example.com/script.js", SCRIPT));

        let package = Package::new("vendor/script", "1.0.0.0").with_dist(
            Dist::file("https://example.com/script.js")
                .with_mirrors(vec![Mirror::fallback("https://mirror.example.com/script.js")]),
        );

        let downloader = downloader(Arc::new(BufferOutput::new()), transport.clone());
        let artifact = downloader.fetch(&package, false).await.unwrap();

        assert_eq!(artifact.bytes, SCRIPT);
        assert_eq!(artifact.url(), Some("https://mirror.example.com/script.js"));
        assert_eq!(
            artifact.origin,
            ArtifactOrigin::Remote(DistSource {
                index: 1,
                url: "https://mirror.example.com/script.js".to_string(),
            })
        );
        assert_eq!(transport.requests().len(), 2);

        downloader.download(&package, &path).await.unwrap();
        assert_eq!(fs::read(path.join("script.js")).unwrap(), SCRIPT);
    }

    #[tokio::test]
    async fn test_unconfirmed_write_cleans_up() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vendor/script");
        let transport = Arc::new(FakeTransport::serving("https://example.com/script.js", SCRIPT));
        let cache = Arc::new(RecordingCache::default());
        let filesystem = Arc::new(TrackingFilesystem {
            drop_writes: true,
            ..Default::default()
        });

        let downloader = downloader(Arc::new(BufferOutput::new()), transport)
            .with_cache(cache.clone())
            .with_filesystem(filesystem);
        let package = script_package("1.0.0.0", "1.0.0");

        let err = downloader.download(&package, &path).await.unwrap_err();

        assert!(matches!(err, DownloadError::WriteFailure { .. }));
        assert!(!path.exists());
        // The entry written during this call is evicted again
        assert!(!cache.entries.lock().contains_key(&downloader.cache_key(&package)));
    }

    #[tokio::test]
    async fn test_gc_runs_once_with_configured_params() {
        let temp = TempDir::new().unwrap();
        let cache = Arc::new(RecordingCache::default());
        let config = MapConfig::default()
            .with("cache-files-ttl", "99999999")
            .with("cache-files-maxsize", "500M");
        let transport = Arc::new(FakeTransport::serving("https://example.com/script.js", SCRIPT));

        let downloader = FileDownloader::new(Arc::new(BufferOutput::new()), Arc::new(config), transport)
            .with_cache(cache.clone());

        downloader
            .download(&script_package("1.0.0.0", "1.0.0"), &temp.path().join("ok"))
            .await
            .unwrap();
        assert_eq!(*cache.gc_calls.lock(), vec![(Duration::from_secs(99999999), 524288000)]);

        // Failing downloads collect too
        let broken = Package::new("vendor/broken", "1.0.0.0").with_dist(Dist::file("https://example.com/404.js"));
        downloader
            .download(&broken, &temp.path().join("broken"))
            .await
            .unwrap_err();
        assert_eq!(cache.gc_calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_downgrade_message_and_removal() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vendor/script");
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join("old.js"), b"old").unwrap();

        let io = Arc::new(ChannelOutput::default());
        let filesystem = Arc::new(TrackingFilesystem::default());
        let transport = Arc::new(FakeTransport::serving("https://example.com/script.js", SCRIPT));
        let downloader = FileDownloader::new(io.clone(), Arc::new(MapConfig::default()), transport)
            .with_filesystem(filesystem.clone());

        let initial = script_package("1.2.0.0", "1.2.0");
        let target = script_package("1.0.0.0", "1.0.0");
        downloader.update(&initial, &target, &path).await.unwrap();

        let lines = io.lines.lock().clone();
        assert_eq!(
            lines[0],
            ("write_error", "  - Downgrading vendor/script (1.2.0 => 1.0.0)".to_string())
        );
        assert_eq!(*filesystem.removed_dirs.lock(), vec![path.clone()]);
        assert!(!path.join("old.js").exists());
        assert_eq!(fs::read(path.join("script.js")).unwrap(), SCRIPT);
    }

    #[tokio::test]
    async fn test_upgrade_is_not_a_downgrade() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vendor/script");
        let io = Arc::new(BufferOutput::new());
        let transport = Arc::new(FakeTransport::serving("https://example.com/script.js", SCRIPT));

        downloader(io.clone(), transport)
            .update(&script_package("1.0.0.0", "1.0.0"), &script_package("1.2.0.0", "1.2.0"), &path)
            .await
            .unwrap();

        assert_eq!(io.lines()[0], "  - Updating vendor/script (1.0.0 => 1.2.0)");
        assert!(!io.output().contains("Downgrading"));
    }

    #[tokio::test]
    async fn test_second_download_served_from_cache() {
        let temp = TempDir::new().unwrap();
        let cache = Arc::new(Cache::new(temp.path().join("cache")));
        let package = script_package("1.0.0.0", "1.0.0");

        let online = Arc::new(FakeTransport::serving("https://example.com/script.js", SCRIPT));
        downloader(Arc::new(BufferOutput::new()), online)
            .with_cache(cache.clone())
            .download(&package, &temp.path().join("first"))
            .await
            .unwrap();

        let offline = Arc::new(FakeTransport::default());
        let io = Arc::new(BufferOutput::new());
        let file = downloader(io.clone(), offline.clone())
            .with_cache(cache)
            .download(&package, &temp.path().join("second"))
            .await
            .unwrap();

        assert_eq!(fs::read(file).unwrap(), SCRIPT);
        assert!(offline.requests().is_empty());
        assert!(io.lines().contains(&"    Loading from cache".to_string()));
    }

    #[tokio::test]
    async fn test_corrupt_cache_entry_is_refetched() {
        let cache = Arc::new(RecordingCache::default());
        let transport = Arc::new(FakeTransport::serving("https://example.com/script.js", SCRIPT));
        let package = Package::new("vendor/script", "1.0.0.0").with_dist(
            Dist::file("https://example.com/script.js")
                .with_sha256(crate::downloader::ChecksumType::Sha256.compute(SCRIPT)),
        );

        let downloader = downloader(Arc::new(BufferOutput::new()), transport.clone()).with_cache(cache.clone());
        cache
            .entries
            .lock()
            .insert(downloader.cache_key(&package), b"truncated".to_vec());

        let artifact = downloader.fetch(&package, true).await.unwrap();
        assert!(!artifact.is_from_cache());
        assert_eq!(artifact.bytes, SCRIPT);
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(cache.entries.lock().get(&artifact.cache_key).map(Vec::as_slice), Some(SCRIPT));
    }

    #[tokio::test]
    async fn test_update_over_file_is_conflict() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("c123");
        fs::write(&path, b"original").unwrap();

        let io = Arc::new(BufferOutput::new());
        let transport = Arc::new(FakeTransport::serving("https://example.com/script.js", SCRIPT));
        let err = downloader(io.clone(), transport.clone())
            .update(&script_package("1.0.0.0", "1.0.0"), &script_package("1.2.0.0", "1.2.0"), &path)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::PathConflict { .. }));
        assert_eq!(fs::read(&path).unwrap(), b"original");
        assert!(transport.requests().is_empty());
        assert!(io.lines().is_empty());
    }

    #[tokio::test]
    async fn test_remove() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vendor/script");
        fs::create_dir_all(&path).unwrap();

        let io = Arc::new(BufferOutput::new());
        downloader(io.clone(), Arc::new(FakeTransport::default()))
            .remove(&script_package("1.0.0.0", "1.0.0"), &path)
            .unwrap();

        assert!(!path.exists());
        assert_eq!(io.lines(), vec!["  - Removing vendor/script (1.0.0)"]);
    }

    #[tokio::test]
    async fn test_events_dispatched() {
        struct Recorder(Arc<Mutex<Vec<String>>>);

        impl EventListener for Recorder {
            fn handle(&self, event: &dyn DownloadEvent) -> std::result::Result<(), ListenerError> {
                let file_name = event
                    .as_any()
                    .downcast_ref::<PostFileDownloadEvent>()
                    .and_then(|e| e.file_name.as_ref())
                    .map(|f| format!(" {}", f.display()))
                    .unwrap_or_default();
                self.0.lock().push(format!("{}{}", event.name(), file_name));
                Ok(())
            }
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut events = EventDispatcher::new();
        for event_type in EventType::all() {
            events.add_listener(*event_type, Arc::new(Recorder(seen.clone())));
        }

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vendor/script");
        let transport = Arc::new(FakeTransport::serving("https://example.com/script.js", SCRIPT));
        let downloader = downloader(Arc::new(BufferOutput::new()), transport).with_event_dispatcher(Arc::new(events));

        downloader
            .fetch(&script_package("1.0.0.0", "1.0.0"), false)
            .await
            .unwrap();
        assert_eq!(*seen.lock(), vec!["pre-file-download", "post-file-download"]);

        seen.lock().clear();
        downloader
            .download(&script_package("1.0.0.0", "1.0.0"), &path)
            .await
            .unwrap();
        assert_eq!(
            *seen.lock(),
            vec![
                "pre-file-download".to_string(),
                format!("post-file-download {}", path.join("script.js").display()),
            ]
        );
    }

    #[tokio::test]
    async fn test_cache_write_failure_is_not_fatal() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vendor/script");
        let cache = Arc::new(RecordingCache {
            full: true,
            ..Default::default()
        });
        let transport = Arc::new(FakeTransport::serving("https://example.com/script.js", SCRIPT));
        let downloader = downloader(Arc::new(BufferOutput::new()), transport).with_cache(cache.clone());
        let package = script_package("1.0.0.0", "1.0.0");

        let artifact = downloader.fetch(&package, true).await.unwrap();
        assert!(!artifact.cached);
        assert_eq!(artifact.bytes, SCRIPT);

        let file = downloader.download(&package, &path).await.unwrap();
        assert_eq!(fs::read(file).unwrap(), SCRIPT);
        assert!(cache.entries.lock().is_empty());
    }

    #[tokio::test]
    async fn test_update_aborts_when_removal_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vendor/script");
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join("old.js"), b"old").unwrap();

        let transport = Arc::new(FakeTransport::serving("https://example.com/script.js", SCRIPT));
        let filesystem = Arc::new(TrackingFilesystem {
            deny_removals: true,
            ..Default::default()
        });
        let downloader = downloader(Arc::new(BufferOutput::new()), transport.clone()).with_filesystem(filesystem);

        let err = downloader
            .update(&script_package("1.0.0.0", "1.0.0"), &script_package("1.2.0.0", "1.2.0"), &path)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::RemovalFailure { path: ref p, .. } if p == &path));
        assert!(err.to_string().contains("Could not completely delete"));
        assert!(transport.requests().is_empty());
        assert!(!path.join("script.js").exists());
        assert_eq!(fs::read(path.join("old.js")).unwrap(), b"old");
    }

    #[test]
    fn test_cache_key() {
        let downloader = downloader(Arc::new(BufferOutput::new()), Arc::new(FakeTransport::default()));
        let a = downloader.cache_key(&script_package("1.0.0.0", "1.0.0"));
        let b = downloader.cache_key(&script_package("1.2.0.0", "1.2.0"));

        assert!(a.starts_with("vendor-script-"));
        assert!(a.ends_with(".file"));
        assert_eq!(a.len(), "vendor-script-".len() + 64 + ".file".len());
        assert_ne!(a, b);
    }
}
