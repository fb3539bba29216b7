//! Remote activity feed abstraction.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use crate::auth::AccessToken;
use crate::error::{RideError, Result};
use crate::RemoteActivity;

/// Paged activity list from the fitness provider. Pages are 1-based; an
/// empty page means the feed is exhausted.
#[async_trait]
pub trait ActivityFeed: Send + Sync {
    async fn fetch_page(
        &self,
        page: u32,
        per_page: u32,
        token: &AccessToken,
    ) -> Result<Vec<RemoteActivity>>;
}

/// Feed serving a fixed list of pages. Pages past the end are empty.
///
/// Useful for replaying exported activity history and for tests. `fail_at`
/// makes a given page return a fetch error.
#[derive(Debug, Default)]
pub struct MemoryFeed {
    pages: Vec<Vec<RemoteActivity>>,
    fail_at: Option<u32>,
    requests: AtomicU32,
}

impl MemoryFeed {
    pub fn new(pages: Vec<Vec<RemoteActivity>>) -> Self {
        Self {
            pages,
            fail_at: None,
            requests: AtomicU32::new(0),
        }
    }

    pub fn failing_at(mut self, page: u32) -> Self {
        self.fail_at = Some(page);
        self
    }

    /// Number of page requests served so far.
    pub fn request_count(&self) -> u32 {
        self.requests.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ActivityFeed for MemoryFeed {
    async fn fetch_page(
        &self,
        page: u32,
        _per_page: u32,
        _token: &AccessToken,
    ) -> Result<Vec<RemoteActivity>> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if self.fail_at == Some(page) {
            return Err(RideError::fetch(Some(page), Some(503), "feed unavailable"));
        }
        let index = page.checked_sub(1).map(|i| i as usize);
        Ok(index
            .and_then(|i| self.pages.get(i))
            .cloned()
            .unwrap_or_default())
    }
}
