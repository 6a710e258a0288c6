//! Index fetcher test utilities

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use release_checker::error::FetchError;
use release_checker::sources::IndexFetcher;

/// Serves fixed pages; unknown URLs answer 404
#[derive(Default)]
pub struct StaticIndexFetcher {
    pages: HashMap<String, String>,
    requests: AtomicUsize,
}

impl StaticIndexFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndexFetcher for StaticIndexFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.pages.get(url).cloned().ok_or_else(|| FetchError::Status {
            url: url.to_string(),
            status: 404,
        })
    }
}
