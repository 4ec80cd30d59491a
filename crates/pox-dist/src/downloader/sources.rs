//! Ordered dist urls and the fallback loop over them.

use std::future::Future;
use std::iter::Peekable;

use crate::package::Package;
use crate::{DownloadError, Result};

/// One candidate url for an artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistSource {
    /// Position in the preference order, 0 is tried first
    pub index: usize,
    pub url: String,
}

/// Lazy iterator over a package's dist urls, most preferred first.
#[derive(Debug)]
pub struct DistSources {
    urls: std::vec::IntoIter<String>,
    next_index: usize,
}

impl DistSources {
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            urls: urls.into_iter(),
            next_index: 0,
        }
    }

    pub fn for_package(package: &Package) -> Self {
        Self::new(package.dist_urls())
    }
}

impl Iterator for DistSources {
    type Item = DistSource;

    fn next(&mut self) -> Option<Self::Item> {
        let url = self.urls.next()?;
        let index = self.next_index;
        self.next_index += 1;
        Some(DistSource { index, url })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.urls.size_hint()
    }
}

/// Try `attempt` on each source in order until one succeeds.
///
/// Recoverable failures (transport, checksum) advance to the next source;
/// `on_failure` sees each of them along with whether another source remains.
/// Any other error aborts immediately. When every source failed the result is
/// [`DownloadError::SourcesExhausted`] carrying all failures in order.
pub async fn try_each_source<I, T, F, Fut, N>(
    package: &str,
    sources: I,
    mut on_failure: N,
    mut attempt: F,
) -> Result<(T, DistSource)>
where
    I: IntoIterator<Item = DistSource>,
    F: FnMut(DistSource) -> Fut,
    Fut: Future<Output = Result<T>>,
    N: FnMut(&DistSource, &DownloadError, bool),
{
    let mut sources: Peekable<I::IntoIter> = sources.into_iter().peekable();
    let mut failures = Vec::new();

    while let Some(source) = sources.next() {
        match attempt(source.clone()).await {
            Ok(value) => return Ok((value, source)),
            Err(e) if e.is_recoverable() => {
                log::debug!("Dist url {} (#{}) failed: {}", source.url, source.index, e);
                on_failure(&source, &e, sources.peek().is_some());
                failures.push(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(DownloadError::SourcesExhausted {
        package: package.to_string(),
        failures,
    })
}
