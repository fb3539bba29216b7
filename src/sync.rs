//! Ingestion synchronizer.
//!
//! Walks the remote activity feed one page at a time:
//!
//! ```text
//! Start -> FetchPage(1) -> [filter, dedup, persist] -> FetchPage(2) -> ... -> Done
//! ```
//!
//! Pages are strictly sequential because whether to fetch page `n + 1` depends
//! on what page `n` contained. A run that fails part-way leaves earlier pages
//! committed; running again is safe since already-stored activities are
//! skipped.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::auth::{AccessToken, TokenState};
use crate::error::{RideError, Result, SyncFailure};
use crate::feed::ActivityFeed;
use crate::repository::RouteRepository;
use crate::RouteRecord;

/// What to do with a non-empty page that has no qualifying activities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TerminationPolicy {
    /// End the run. Can miss rides that follow a page of other activities.
    #[default]
    StopOnUnqualifiedPage,
    /// Continue with the next page; only an empty page ends the run.
    SkipUnqualifiedPages,
}

/// Configuration for a synchronization run.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Activities requested per page.
    /// Default: 200 (provider maximum)
    pub per_page: u32,

    /// Activity type to ingest.
    /// Default: "Ride"
    pub activity_type: String,

    /// Default: StopOnUnqualifiedPage
    pub termination: TerminationPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            per_page: 200,
            activity_type: "Ride".to_string(),
            termination: TerminationPolicy::default(),
        }
    }
}

/// Why a run finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The feed returned an empty page
    EmptyPage { page: u32 },
    /// The page had activities but none qualified (under `StopOnUnqualifiedPage`)
    NoQualifyingActivities { page: u32 },
    /// Cancelled before `next_page` was requested
    Cancelled { next_page: u32 },
}

/// Position in the page walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Start,
    FetchPage(u32),
    Done(StopReason),
}

/// Result of processing a single page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    Empty,
    NoQualifying {
        fetched: usize,
    },
    Persisted {
        fetched: usize,
        qualifying: usize,
        already_stored: usize,
        inserted: usize,
    },
}

/// State after `page` produced `outcome`.
pub fn next_state(page: u32, outcome: &PageOutcome, policy: TerminationPolicy) -> SyncState {
    match (outcome, policy) {
        (PageOutcome::Empty, _) => SyncState::Done(StopReason::EmptyPage { page }),
        (PageOutcome::NoQualifying { .. }, TerminationPolicy::StopOnUnqualifiedPage) => {
            SyncState::Done(StopReason::NoQualifyingActivities { page })
        }
        (PageOutcome::NoQualifying { .. }, TerminationPolicy::SkipUnqualifiedPages)
        | (PageOutcome::Persisted { .. }, _) => SyncState::FetchPage(page + 1),
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// New routes written
    pub inserted: usize,
    /// Pages fetched, including the final empty page
    pub pages_fetched: u32,
    /// Activities returned by the feed
    pub activities_seen: usize,
    /// Qualifying activities that were already stored
    pub skipped_existing: usize,
    /// Activities that were not rides, lacked geometry or an ID, or repeated within a page
    pub filtered_out: usize,
    pub stop: Option<StopReason>,
}

impl SyncReport {
    fn record(&mut self, outcome: &PageOutcome) {
        self.pages_fetched += 1;
        match *outcome {
            PageOutcome::Empty => {}
            PageOutcome::NoQualifying { fetched } => {
                self.activities_seen += fetched;
                self.filtered_out += fetched;
            }
            PageOutcome::Persisted {
                fetched,
                qualifying,
                already_stored,
                inserted,
            } => {
                self.activities_seen += fetched;
                self.filtered_out += fetched - qualifying;
                self.skipped_existing += already_stored;
                self.inserted += inserted;
            }
        }
    }

    fn finish(mut self, reason: StopReason, elapsed: Duration) -> Self {
        self.stop = Some(reason);
        info!(
            "[Synchronizer] Complete: {} new, {} existing, {} filtered, {} pages, {:.2}s ({:?})",
            self.inserted,
            self.skipped_existing,
            self.filtered_out,
            self.pages_fetched,
            elapsed.as_secs_f64(),
            reason
        );
        self
    }

    fn failure(&self, source: RideError) -> SyncFailure {
        SyncFailure {
            inserted: self.inserted,
            pages_completed: self.pages_fetched,
            source,
        }
    }
}

/// Shared flag for aborting a run between pages.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Synchronizes the remote feed into a route repository.
pub struct Synchronizer {
    feed: Arc<dyn ActivityFeed>,
    repo: Arc<dyn RouteRepository>,
    config: SyncConfig,
    cancel: CancelFlag,
}

impl Synchronizer {
    pub fn new(
        feed: Arc<dyn ActivityFeed>,
        repo: Arc<dyn RouteRepository>,
        config: SyncConfig,
    ) -> Self {
        Self {
            feed,
            repo,
            config,
            cancel: CancelFlag::default(),
        }
    }

    /// Use an externally owned cancel flag.
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle that cancels this synchronizer's runs.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Run a full synchronization.
    ///
    /// Fails with `Unauthenticated` before any request if `credentials` holds
    /// no usable token. On any later fault the run stops and the failure
    /// reports how many routes were committed first.
    pub async fn run(
        &self,
        credentials: &TokenState,
    ) -> std::result::Result<SyncReport, SyncFailure> {
        let start = Instant::now();
        let mut report = SyncReport::default();
        let mut state = SyncState::Start;

        loop {
            state = match state {
                SyncState::Start => {
                    credentials.bearer().map_err(|e| report.failure(e))?;
                    info!(
                        "[Synchronizer] Starting sync: {} activities, {} per page, {:?}",
                        self.config.activity_type, self.config.per_page, self.config.termination
                    );
                    SyncState::FetchPage(1)
                }
                SyncState::FetchPage(page) if self.cancel.is_cancelled() => {
                    SyncState::Done(StopReason::Cancelled { next_page: page })
                }
                SyncState::FetchPage(page) => {
                    let token = credentials.bearer().map_err(|e| report.failure(e))?;
                    let outcome = match self.process_page(page, token).await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            warn!(
                                "[Synchronizer] Page {} failed after {} new routes: {}",
                                page, report.inserted, e
                            );
                            return Err(report.failure(e));
                        }
                    };
                    report.record(&outcome);
                    next_state(page, &outcome, self.config.termination)
                }
                SyncState::Done(reason) => {
                    return Ok(report.finish(reason, start.elapsed()));
                }
            };
        }
    }

    /// Fetch, filter, dedup and persist one page.
    pub async fn process_page(&self, page: u32, token: &AccessToken) -> Result<PageOutcome> {
        let activities = self
            .feed
            .fetch_page(page, self.config.per_page, token)
            .await?;
        if activities.is_empty() {
            debug!("[Synchronizer] Page {} is empty", page);
            return Ok(PageOutcome::Empty);
        }

        let fetched = activities.len();
        let mut ids = HashSet::with_capacity(fetched);
        let candidates: Vec<RouteRecord> = activities
            .iter()
            .filter(|a| a.qualifies(&self.config.activity_type))
            .filter_map(RouteRecord::from_remote)
            .filter(|r| ids.insert(r.activity_id))
            .collect();

        if candidates.is_empty() {
            debug!(
                "[Synchronizer] Page {}: none of {} activities qualify",
                page, fetched
            );
            return Ok(PageOutcome::NoQualifying { fetched });
        }

        let qualifying = candidates.len();
        let existing = self
            .with_repository("find_existing_ids", move |repo| {
                repo.find_existing_ids(&ids)
            })
            .await?;

        let new_routes: Vec<RouteRecord> = candidates
            .into_iter()
            .filter(|r| !existing.contains(&r.activity_id))
            .collect();
        let already_stored = qualifying - new_routes.len();

        let inserted = if new_routes.is_empty() {
            0
        } else {
            self.with_repository("insert_new", move |repo| repo.insert_new(&new_routes))
                .await?
        };

        debug!(
            "[Synchronizer] Page {}: {} fetched, {} qualifying, {} already stored, {} inserted",
            page, fetched, qualifying, already_stored, inserted
        );

        Ok(PageOutcome::Persisted {
            fetched,
            qualifying,
            already_stored,
            inserted,
        })
    }

    /// Run a repository call on the blocking pool.
    async fn with_repository<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&dyn RouteRepository) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let repo = Arc::clone(&self.repo);
        tokio::task::spawn_blocking(move || f(repo.as_ref()))
            .await
            .map_err(|e| RideError::storage(operation, format!("blocking task failed: {}", e)))?
    }
}
