//! Filesystem operations used when installing and removing artifacts.

use std::fs;
use std::io;
use std::path::Path;

pub trait Filesystem: Send + Sync {
    /// Create `path` and its parents if missing.
    ///
    /// Fails if `path` exists and is not a directory.
    fn ensure_directory_exists(&self, path: &Path) -> io::Result<()>;

    fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Remove a file; a missing file is not an error
    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Remove a directory and everything below it; a missing directory is not an error
    fn remove_directory(&self, path: &Path) -> io::Result<()>;
}

/// [`Filesystem`] backed by `std::fs`
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFilesystem;

impl Filesystem for LocalFilesystem {
    fn ensure_directory_exists(&self, path: &Path) -> io::Result<()> {
        if path.exists() {
            if path.is_dir() {
                return Ok(());
            }
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} exists and is not a directory", path.display()),
            ));
        }
        fs::create_dir_all(path)
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        fs::write(path, contents)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        match fs::remove_file(path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn remove_directory(&self, path: &Path) -> io::Result<()> {
        // Symlinked installs are unlinked, not followed
        match fs::symlink_metadata(path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
            Ok(_) => fs::remove_file(path),
        }
    }
}
