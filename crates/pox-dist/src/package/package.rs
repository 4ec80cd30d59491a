use serde::{Deserialize, Serialize};

use super::dist::Dist;
use crate::http::TransportOptions;

/// The parts of a resolved package the dist downloader needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,

    /// Normalized version (e.g. `1.2.0.0`, `dev-main`)
    pub version: String,

    /// Version as written by the package author (e.g. `v1.2.0`)
    #[serde(rename = "pretty-version")]
    pub pretty_version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dist: Option<Dist>,

    /// VCS reference of the installed source, if any
    #[serde(rename = "source-reference", default, skip_serializing_if = "Option::is_none")]
    pub source_reference: Option<String>,
}

impl Package {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        let version = version.into();
        Self {
            name: name.into(),
            pretty_version: version.clone(),
            version,
            dist: None,
            source_reference: None,
        }
    }

    pub fn with_pretty_version(mut self, pretty_version: impl Into<String>) -> Self {
        self.pretty_version = pretty_version.into();
        self
    }

    pub fn with_dist(mut self, dist: Dist) -> Self {
        self.dist = Some(dist);
        self
    }

    pub fn with_source_reference(mut self, reference: impl Into<String>) -> Self {
        self.source_reference = Some(reference.into());
        self
    }

    pub fn is_dev(&self) -> bool {
        self.version.starts_with("dev-") || self.version.ends_with("-dev")
    }

    /// Pretty version, suffixed with the short commit hash for dev versions
    pub fn full_pretty_version(&self) -> String {
        if !self.is_dev() {
            return self.pretty_version.clone();
        }

        let reference = self
            .source_reference
            .as_deref()
            .or_else(|| self.dist.as_ref().and_then(|d| d.reference.as_deref()));

        match reference {
            // Only commit hashes are abbreviated; other references are meaningless to users
            Some(r) if r.len() == 40 && r.bytes().all(|b| b.is_ascii_hexdigit()) => {
                format!("{} {}", self.pretty_version, &r[..7])
            }
            _ => self.pretty_version.clone(),
        }
    }

    /// Primary dist url, if one is declared
    pub fn dist_url(&self) -> Option<&str> {
        self.dist
            .as_ref()
            .map(|d| d.url.as_str())
            .filter(|url| !url.is_empty())
    }

    /// All candidate dist urls, most preferred first
    pub fn dist_urls(&self) -> Vec<String> {
        match &self.dist {
            Some(dist) => dist.urls(&self.name, &self.version, &self.pretty_version),
            None => Vec::new(),
        }
    }

    pub fn dist_type(&self) -> &str {
        self.dist.as_ref().map(|d| d.dist_type.as_str()).unwrap_or("file")
    }

    pub fn dist_reference(&self) -> Option<&str> {
        self.dist.as_ref().and_then(|d| d.reference.as_deref())
    }

    pub fn dist_checksum(&self) -> Option<&str> {
        self.dist.as_ref().and_then(|d| d.checksum())
    }

    pub fn transport_options(&self) -> TransportOptions {
        self.dist
            .as_ref()
            .and_then(|d| d.transport_options.clone())
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.full_pretty_version())
    }
}
