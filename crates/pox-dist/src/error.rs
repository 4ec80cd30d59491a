use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::http::TransportError;

#[derive(Error, Debug)]
pub enum DownloadError {
    // Precondition errors
    #[error("The given package is missing url information: {package}")]
    InvalidArgument { package: String },

    #[error("{} exists and is not a directory", path.display())]
    PathConflict { path: PathBuf },

    // Per-source errors, recovered by falling through to the next dist url
    #[error("Transport failure for {url}: {source}")]
    TransportFailure {
        url: String,
        #[source]
        source: TransportError,
    },

    #[error("The checksum verification of the file failed (downloaded from {url})")]
    ChecksumMismatch {
        package: String,
        url: String,
        expected: String,
        actual: String,
    },

    #[error("All dist urls failed for {package}: {}", SourceFailures(failures))]
    SourcesExhausted {
        package: String,
        failures: Vec<DownloadError>,
    },

    // Installation errors
    #[error("{url} could not be saved to {}, make sure the directory is writable and you have internet connectivity", path.display())]
    WriteFailure { url: String, path: PathBuf },

    #[error("Could not completely delete {}, aborting: {source}", path.display())]
    RemovalFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse config: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl DownloadError {
    /// Whether the error only concerns one dist url, so the next one may be tried
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DownloadError::TransportFailure { .. } | DownloadError::ChecksumMismatch { .. }
        )
    }
}

struct SourceFailures<'a>(&'a [DownloadError]);

impl fmt::Display for SourceFailures<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "no dist url was tried");
        }
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;
