//! Transport capability used by the dist downloader.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status}: {url}")]
    Status { status: u16, url: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Max retries exceeded for {url}")]
    MaxRetries { url: String },

    #[error("{url} is unreachable: {reason}")]
    Unreachable { url: String, reason: String },
}

impl TransportError {
    /// HTTP status code of the failure, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            TransportError::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Per-package transport options.
///
/// Opaque to the downloader and handed to the transport as-is. The only key the
/// bundled `HttpClient` understands is `http.header`, a list of `"Name: value"`
/// strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransportOptions(pub HashMap<String, Value>);

impl TransportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Adds a request header under `http.header`
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        let http = self
            .0
            .entry("http".to_string())
            .or_insert_with(|| Value::Object(Default::default()));
        if let Value::Object(map) = http {
            let headers = map
                .entry("header".to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(list) = headers {
                list.push(Value::String(format!("{}: {}", name, value)));
            }
        }
        self
    }

    /// Request headers as (name, value) pairs; malformed entries are skipped
    pub fn headers(&self) -> Vec<(String, String)> {
        let Some(list) = self
            .0
            .get("http")
            .and_then(|http| http.get("header"))
            .and_then(|h| h.as_array())
        else {
            return Vec::new();
        };

        list.iter()
            .filter_map(|v| v.as_str())
            .filter_map(|line| {
                let (name, value) = line.split_once(':')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                Some((name.to_string(), value.trim().to_string()))
            })
            .collect()
    }
}

impl From<HashMap<String, Value>> for TransportOptions {
    fn from(map: HashMap<String, Value>) -> Self {
        Self(map)
    }
}

/// Fetches the raw bytes behind a dist url.
///
/// Retry and timeout policy belong to the implementation.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch(&self, url: &str, options: &TransportOptions) -> Result<Vec<u8>, TransportError>;
}
