//! reqwest-backed transport for dist downloads.
//!
//! Wraps a pooled `reqwest::Client` with:
//! - Automatic retry with exponential backoff on 5xx, 429 and connection errors
//! - Custom User-Agent and gzip Accept-Encoding
//! - Connect and request timeouts
//! - Proxy and custom CA certificate support
//! - Per-package request headers taken from the transport options
//!
//! ```no_run
//! use pox_dist::http::{HttpClient, HttpClientConfig, RemoteFetcher, TransportOptions};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HttpClientConfig::new()
//!     .with_timeout(Duration::from_secs(60))
//!     .with_max_retries(5);
//! let client = HttpClient::with_config(config)?;
//!
//! let bytes = client
//!     .fetch("https://example.com/package.zip", &TransportOptions::new())
//!     .await?;
//! println!("{} bytes", bytes.len());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, Response, StatusCode};

use super::transport::{RemoteFetcher, TransportError, TransportOptions};

const DEFAULT_USER_AGENT: &str = "Composer/2.0 (pox-dist)";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);
/// Upper bound for pre-allocating a body from its Content-Length
const MAX_PREALLOCATION: usize = 8 * 1024 * 1024;

pub struct HttpClient {
    client: Client,
    user_agent: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl HttpClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_config(HttpClientConfig::default())
    }

    pub fn with_config(config: HttpClientConfig) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .gzip(true)
            .user_agent(&config.user_agent);

        if let Some(proxy_url) = &config.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
        }

        if let Some(cafile) = &config.cafile {
            match std::fs::read(cafile) {
                Ok(pem) => builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?),
                Err(e) => log::warn!("Ignoring unreadable cafile {}: {}", cafile.display(), e),
            }
        }

        Ok(Self {
            client: builder.build()?,
            user_agent: config.user_agent,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
        })
    }

    /// Perform a GET request, retrying transient failures
    pub async fn get(&self, url: &str, options: &TransportOptions) -> Result<Response, TransportError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            match self.execute_get(url, options).await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    let error = TransportError::Status {
                        status: status.as_u16(),
                        url: url.to_string(),
                    };
                    // Client errors other than 429 will not get better on retry
                    if !(status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS) {
                        return Err(error);
                    }
                    last_error = Some(error);
                }
                Err(e) => last_error = Some(e),
            }

            if attempt < self.max_retries {
                log::debug!("Download of {} failed, retrying...", url);
                tokio::time::sleep(backoff_delay(self.retry_delay, attempt)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| TransportError::MaxRetries {
            url: url.to_string(),
        }))
    }

    async fn execute_get(&self, url: &str, options: &TransportOptions) -> Result<Response, TransportError> {
        let mut request = self.client.get(url).header("Accept-Encoding", "gzip");

        for (name, value) in options.headers() {
            request = request.header(name, value);
        }

        Ok(request.send().await?)
    }

    /// Download a response body into memory
    pub async fn download_bytes(&self, url: &str, options: &TransportOptions) -> Result<Vec<u8>, TransportError> {
        let response = self.get(url, options).await?;
        let mut body = Vec::with_capacity(initial_capacity(response.content_length()));

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk?);
        }

        Ok(body)
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2_u32.saturating_pow(attempt))
}

/// The advertised length is untrusted, so it only seeds the buffer up to a bound
fn initial_capacity(content_length: Option<u64>) -> usize {
    content_length
        .and_then(|len| usize::try_from(len).ok())
        .unwrap_or(0)
        .min(MAX_PREALLOCATION)
}

#[async_trait]
impl RemoteFetcher for HttpClient {
    async fn fetch(&self, url: &str, options: &TransportOptions) -> Result<Vec<u8>, TransportError> {
        self.download_bytes(url, options).await
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub proxy: Option<String>,
    pub cafile: Option<PathBuf>,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            proxy: None,
            cafile: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl HttpClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_cafile(mut self, cafile: PathBuf) -> Self {
        self.cafile = Some(cafile);
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }
}
