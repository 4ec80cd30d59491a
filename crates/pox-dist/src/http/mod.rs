//! Transport layer for dist downloads.

mod client;
mod transport;

pub use client::{HttpClient, HttpClientConfig};
pub use transport::{RemoteFetcher, TransportError, TransportOptions};
