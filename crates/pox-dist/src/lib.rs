pub mod cache;
pub mod config;
pub mod downloader;
pub mod error;
pub mod event;
pub mod filesystem;
pub mod http;
pub mod output;
pub mod package;
pub mod version;

pub use error::{DownloadError, Result};
pub use cache::{ArtifactCache, Cache};
pub use config::{Config, ConfigSource, GcParams};
pub use downloader::{ArtifactOrigin, FetchedArtifact, FileDownloader};
pub use event::{
    DownloadEvent, EventDispatcher, EventListener, EventType,
    PostFileDownloadEvent, PreFileDownloadEvent,
};
pub use filesystem::{Filesystem, LocalFilesystem};
pub use http::{HttpClient, RemoteFetcher, TransportError, TransportOptions};
pub use output::{BufferOutput, ConsoleOutput, Io, NullOutput};
pub use package::{Dist, Mirror, Package};
