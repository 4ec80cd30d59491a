//! Placing verified artifacts at their install path.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::filesystem::Filesystem;
use crate::package::Package;
use crate::{DownloadError, Result};

/// Path the artifact of `package` is written to when installed into `path`.
///
/// Uses the last segment of the dist url's path, ignoring any query string
/// or fragment; without one, `<name>.<dist type>`.
pub fn get_file_name(package: &Package, path: &Path) -> PathBuf {
    let name = package
        .dist_url()
        .and_then(url_file_name)
        .unwrap_or_else(|| format!("{}.{}", sanitize_name(&package.name), package.dist_type()));

    path.join(name)
}

fn url_file_name(dist_url: &str) -> Option<String> {
    let segment = match url::Url::parse(dist_url) {
        Ok(url) => url.path_segments()?.filter(|s| !s.is_empty()).last()?.to_string(),
        // Local paths and other non-urls
        Err(_) => {
            let end = dist_url.find(['?', '#']).unwrap_or(dist_url.len());
            dist_url[..end]
                .rsplit(['/', '\\'])
                .find(|s| !s.is_empty())?
                .to_string()
        }
    };

    (segment != "." && segment != "..").then_some(segment)
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '_' { c } else { '-' })
        .collect()
}

/// An install in progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallTarget {
    pub destination: PathBuf,
    pub file: PathBuf,
    /// Whether the destination directory was created for this install
    pub created_directory: bool,
}

/// Writes artifacts below an install path and undoes partial installs.
pub struct Installer {
    filesystem: Arc<dyn Filesystem>,
}

impl Installer {
    pub fn new(filesystem: Arc<dyn Filesystem>) -> Self {
        Self { filesystem }
    }

    /// Fails with [`DownloadError::PathConflict`] when `destination` is a file.
    /// Nothing is touched either way.
    pub fn check_destination(&self, destination: &Path) -> Result<()> {
        match fs::metadata(destination) {
            Ok(meta) if !meta.is_dir() => Err(DownloadError::PathConflict {
                path: destination.to_path_buf(),
            }),
            _ => Ok(()),
        }
    }

    /// Make sure the destination directory exists before fetching.
    pub fn prepare(&self, destination: &Path, file: PathBuf) -> Result<InstallTarget> {
        self.check_destination(destination)?;

        let existed = destination.is_dir();
        self.filesystem
            .ensure_directory_exists(destination)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => DownloadError::PathConflict {
                    path: destination.to_path_buf(),
                },
                _ => DownloadError::Io(e),
            })?;

        Ok(InstallTarget {
            destination: destination.to_path_buf(),
            file,
            created_directory: !existed,
        })
    }

    /// Write `bytes` to the target file and confirm they landed on disk.
    pub fn write(&self, target: &InstallTarget, bytes: &[u8], url: &str) -> Result<PathBuf> {
        let write_failure = || DownloadError::WriteFailure {
            url: url.to_string(),
            path: target.file.clone(),
        };

        if let Err(e) = self.filesystem.write_file(&target.file, bytes) {
            log::debug!("Writing {} failed: {}", target.file.display(), e);
            return Err(write_failure());
        }

        match fs::metadata(&target.file) {
            Ok(meta) if meta.is_file() && meta.len() == bytes.len() as u64 => Ok(target.file.clone()),
            Ok(meta) => {
                log::debug!(
                    "{} holds {} bytes, expected {}",
                    target.file.display(),
                    meta.len(),
                    bytes.len()
                );
                Err(write_failure())
            }
            Err(e) => {
                log::debug!("{} is missing after write: {}", target.file.display(), e);
                Err(write_failure())
            }
        }
    }

    /// Undo a failed install: drop the file and any directory we created.
    pub fn rollback(&self, target: &InstallTarget) {
        if let Err(e) = self.filesystem.remove_file(&target.file) {
            log::warn!("Could not remove {}: {}", target.file.display(), e);
        }

        if target.created_directory {
            if let Err(e) = self.filesystem.remove_directory(&target.destination) {
                log::warn!("Could not remove {}: {}", target.destination.display(), e);
            }
        }
    }
}
