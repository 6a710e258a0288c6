//! Index page fetching for image mirrors

#[cfg(test)]
use mockall::automock;

use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Url;
use tracing::{debug, info};

use crate::cache;
use crate::error::FetchError;
use crate::package::matcher::matches;

static HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<a\s[^>]*?href\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
        .expect("valid href pattern")
});

/// Trait for fetching the text of an index page
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait IndexFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Fetches index pages over HTTP with a bounded wait
pub struct HttpIndexFetcher {
    client: reqwest::Client,
}

impl HttpIndexFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("release-checker/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl IndexFetcher for HttpIndexFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        info!("Fetching index from: {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.text().await?)
    }
}

/// Returns the index page, reusing `snapshot` while it is younger than `max_age`
///
/// A successful fetch refreshes the snapshot.
pub async fn fetch_with_snapshot(
    fetcher: &dyn IndexFetcher,
    url: &str,
    snapshot: &Path,
    max_age: Duration,
) -> Result<String, FetchError> {
    if let Some(content) = cache::read_fresh(snapshot, max_age) {
        debug!("Using cached index {:?}", snapshot);
        return Ok(content);
    }

    let content = fetcher.fetch(url).await?;
    cache::store(snapshot, &content)?;
    Ok(content)
}

/// Link targets of every `<a href>` in an HTML page, in document order
pub fn extract_links(html: &str) -> Vec<&str> {
    HREF_RE
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)))
        .map(|m| m.as_str())
        .collect()
}

/// Absolute URLs of links whose file name matches one of `patterns`
pub fn find_matching_urls(base_url: &str, html: &str, patterns: &[String]) -> Vec<String> {
    let base = Url::parse(base_url).ok();

    let urls: Vec<String> = extract_links(html)
        .into_iter()
        .filter(|href| {
            let file_name = href.rsplit('/').next().unwrap_or_default();
            patterns.iter().any(|pattern| matches(file_name, pattern))
        })
        .filter_map(|href| match &base {
            Some(base) => base.join(href).ok().map(String::from),
            None => Some(href.to_string()),
        })
        .collect();

    debug!("Found {} matching URLs at {}", urls.len(), base_url);
    urls
}
