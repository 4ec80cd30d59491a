//! Dist file downloading.
//!
//! [`FileDownloader`] is the entry point. The pieces it is built from are
//! public so that downloaders for other dist types can reuse them:
//! [`try_each_source`] for mirror fallback, [`verify_checksum`] and the
//! [`Installer`].

mod checksum;
mod file;
mod install;
mod sources;

pub use checksum::{verify_checksum, ChecksumFailure, ChecksumType};
pub use file::{ArtifactOrigin, FetchedArtifact, FileDownloader};
pub use install::{get_file_name, InstallTarget, Installer};
pub use sources::{try_each_source, DistSource, DistSources};
