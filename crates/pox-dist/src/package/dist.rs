use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::http::TransportOptions;

/// Distribution information for a package (archive or single-file download)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dist {
    /// Type of distribution (zip, tar, file, ...)
    #[serde(rename = "type")]
    pub dist_type: String,

    /// Primary download url, may contain mirror placeholders
    pub url: String,

    /// Reference (usually same as version or commit hash)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    /// SHA-1 checksum of the artifact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shasum: Option<String>,

    /// SHA-256 checksum of the artifact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirrors: Option<Vec<Mirror>>,

    #[serde(rename = "transport-options", default, skip_serializing_if = "Option::is_none")]
    pub transport_options: Option<TransportOptions>,
}

impl Dist {
    pub fn new(dist_type: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            dist_type: dist_type.into(),
            url: url.into(),
            reference: None,
            shasum: None,
            sha256: None,
            mirrors: None,
            transport_options: None,
        }
    }

    /// Creates a plain file distribution
    pub fn file(url: impl Into<String>) -> Self {
        Self::new("file", url)
    }

    pub fn zip(url: impl Into<String>) -> Self {
        Self::new("zip", url)
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_shasum(mut self, shasum: impl Into<String>) -> Self {
        self.shasum = Some(shasum.into());
        self
    }

    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.sha256 = Some(sha256.into());
        self
    }

    pub fn with_mirrors(mut self, mirrors: Vec<Mirror>) -> Self {
        self.mirrors = Some(mirrors);
        self
    }

    pub fn with_transport_options(mut self, options: TransportOptions) -> Self {
        self.transport_options = Some(options);
        self
    }

    /// Declared checksum, sha256 preferred over shasum
    pub fn checksum(&self) -> Option<&str> {
        self.sha256
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.shasum.as_deref().filter(|s| !s.is_empty()))
    }

    /// Returns all urls (primary + mirrors) ordered by preference.
    ///
    /// Placeholders (`%package%`, `%version%`, `%reference%`, `%type%`,
    /// `%prettyVersion%`) are expanded for the given package. Preferred mirrors
    /// come first, fallback mirrors last, duplicates are dropped. An empty
    /// primary url yields no urls at all.
    pub fn urls(&self, package_name: &str, version: &str, pretty_version: &str) -> Vec<String> {
        if self.url.is_empty() {
            return Vec::new();
        }

        let expand = |template: &str| {
            expand_url_template(
                template,
                package_name,
                version,
                self.reference.as_deref(),
                &self.dist_type,
                pretty_version,
            )
        };

        let mut urls = vec![expand(&self.url)];

        for mirror in self.mirrors.iter().flatten() {
            let url = expand(&mirror.url);
            if urls.contains(&url) {
                continue;
            }
            if mirror.preferred {
                urls.insert(0, url);
            } else {
                urls.push(url);
            }
        }

        urls
    }
}

impl Default for Dist {
    fn default() -> Self {
        Self::new("zip", "")
    }
}

fn md5_hex(value: &str) -> String {
    format!("{:x}", Md5::digest(value.as_bytes()))
}

/// Expand mirror placeholders in a dist url
pub fn expand_url_template(
    template: &str,
    package_name: &str,
    version: &str,
    reference: Option<&str>,
    dist_type: &str,
    pretty_version: &str,
) -> String {
    if !template.contains('%') {
        return template.to_string();
    }

    // References and versions end up in url paths; anything unsafe is hashed
    let reference = match reference {
        Some(r) if r == "%reference%" || r.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) => {
            r.to_string()
        }
        Some(r) => md5_hex(r),
        None => String::new(),
    };
    let version = if version.contains('/') {
        md5_hex(version)
    } else {
        version.to_string()
    };

    template
        .replace("%package%", package_name)
        .replace("%version%", &version)
        .replace("%reference%", &reference)
        .replace("%type%", dist_type)
        .replace("%prettyVersion%", pretty_version)
}

/// Mirror configuration for a dist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mirror {
    pub url: String,
    /// Whether this mirror should be tried before the primary url
    #[serde(default)]
    pub preferred: bool,
}

impl Mirror {
    pub fn new(url: impl Into<String>, preferred: bool) -> Self {
        Self {
            url: url.into(),
            preferred,
        }
    }

    pub fn preferred(url: impl Into<String>) -> Self {
        Self::new(url, true)
    }

    pub fn fallback(url: impl Into<String>) -> Self {
        Self::new(url, false)
    }
}
