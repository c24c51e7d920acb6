// Price search orchestration
// Starts a server-side search job, waits for the time the server asked for, then polls for
// results with a bounded linear backoff. Starting a new search supersedes the running one:
// its token is cancelled on the server and every late continuation of it is discarded.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    api::{ApiError, TourApi},
    config::RetryConfig,
    types::{Price, PricesMap},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchStatus {
    #[default]
    Idle,
    Waiting,
    Fetching,
    Success,
    Error,
    Cancelling,
}

impl SearchStatus {
    pub fn is_loading(self) -> bool {
        matches!(
            self,
            SearchStatus::Waiting | SearchStatus::Fetching | SearchStatus::Cancelling
        )
    }
}

// Only the message of these ever reaches the UI
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    #[error("{0}")]
    StartFailed(ApiError),

    #[error("{source}")]
    PollFailed { attempts: u32, source: ApiError },
}

/// State of the most recent search, as last committed by its own request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchJob {
    pub request_id: u64,
    // Live server-side job, if any; cancelled when a newer search starts
    pub token: Option<String>,
    pub status: SearchStatus,
    pub wait_until: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub prices: Vec<Price>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    // This request reached a terminal state; the snapshot is what it committed
    Settled(SearchJob),
    // A newer request (or detach) took over; nothing from this one was kept
    Superseded,
}

impl SearchOutcome {
    pub fn job(&self) -> Option<&SearchJob> {
        match self {
            SearchOutcome::Settled(job) => Some(job),
            SearchOutcome::Superseded => None,
        }
    }
}

/// Sorts polled prices by amount, cheapest first. Ties fall back to the id so the
/// order does not depend on map iteration.
pub fn sorted_by_amount(prices: PricesMap) -> Vec<Price> {
    let mut list: Vec<Price> = prices.into_values().collect();
    list.sort_by(|a, b| a.amount.total_cmp(&b.amount).then_with(|| a.id.cmp(&b.id)));
    list
}

pub struct SearchOrchestrator<A: TourApi> {
    api: Arc<A>,
    retry: RetryConfig,
    generation: AtomicU64,
    alive: AtomicBool,
    job: RwLock<SearchJob>,
}

impl<A: TourApi> SearchOrchestrator<A> {
    pub fn new(api: Arc<A>, retry: RetryConfig) -> Self {
        Self {
            api,
            retry,
            generation: AtomicU64::new(0),
            alive: AtomicBool::new(true),
            job: RwLock::new(SearchJob::default()),
        }
    }

    pub fn snapshot(&self) -> SearchJob {
        self.job.read().clone()
    }

    pub fn status(&self) -> SearchStatus {
        self.job.read().status
    }

    pub fn is_loading(&self) -> bool {
        self.status().is_loading()
    }

    /// The consumer is gone: no in-flight or future request may commit anything.
    pub fn detach(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn is_current(&self, request_id: u64) -> bool {
        self.alive.load(Ordering::SeqCst) && self.generation.load(Ordering::SeqCst) == request_id
    }

    // Applies `update` only while `request_id` is still the live request. The
    // check happens under the write lock so a newer request can't interleave.
    fn commit_with<T>(
        &self,
        request_id: u64,
        update: impl FnOnce(&mut SearchJob),
        view: impl FnOnce(&SearchJob) -> T,
    ) -> Option<T> {
        let mut job = self.job.write();
        if !self.is_current(request_id) {
            return None;
        }
        job.request_id = request_id;
        update(&mut job);
        Some(view(&job))
    }

    fn commit(&self, request_id: u64, update: impl FnOnce(&mut SearchJob)) -> bool {
        self.commit_with(request_id, update, |_| ()).is_some()
    }

    fn settle(&self, request_id: u64, update: impl FnOnce(&mut SearchJob)) -> SearchOutcome {
        match self.commit_with(request_id, update, SearchJob::clone) {
            Some(job) => SearchOutcome::Settled(job),
            None => {
                debug!(request_id, "dropping result of superseded search");
                SearchOutcome::Superseded
            }
        }
    }

    async fn cancel_quietly(&self, request_id: u64, token: &str) {
        match self.api.stop_search(token).await {
            Ok(()) => debug!(request_id, token, "cancelled previous search"),
            Err(err) => warn!(request_id, token, error = %err, "failed to cancel previous search"),
        }
    }

    pub async fn start(&self, country_id: &str) -> SearchOutcome {
        let request_id = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(request_id, country_id, "starting price search");

        let mut previous = None;
        let claimed = self.commit(request_id, |job| {
            if let Some(token) = job.token.take() {
                job.status = SearchStatus::Cancelling;
                previous = Some(token);
            }
        });
        if !claimed {
            return SearchOutcome::Superseded;
        }

        if let Some(token) = previous {
            self.cancel_quietly(request_id, &token).await;
        }

        let reset = self.commit(request_id, |job| {
            job.prices.clear();
            job.error = None;
            job.attempts = 0;
            job.wait_until = None;
            job.status = SearchStatus::Waiting;
        });
        if !reset {
            return SearchOutcome::Superseded;
        }

        let ticket = match self.api.start_search(country_id).await {
            Ok(ticket) => ticket,
            Err(err) => {
                warn!(request_id, country_id, error = %err, "failed to start price search");
                let message = SearchError::StartFailed(err).to_string();
                return self.settle(request_id, |job| {
                    job.status = SearchStatus::Error;
                    job.error = Some(message);
                });
            }
        };

        let token = ticket.token.clone();
        let wait_until = ticket.wait_until;
        let stored = self.commit(request_id, |job| {
            job.token = Some(ticket.token);
            job.wait_until = Some(wait_until);
        });
        if !stored {
            // Nobody else knows about this job, so nobody else would cancel it
            self.cancel_quietly(request_id, &token).await;
            return SearchOutcome::Superseded;
        }

        let delay = (wait_until - Utc::now()).to_std().unwrap_or_default();
        debug!(request_id, token = %token, delay_ms = delay.as_millis() as u64, "waiting for search results");
        tokio::time::sleep(delay).await;

        if !self.commit(request_id, |job| job.status = SearchStatus::Fetching) {
            return SearchOutcome::Superseded;
        }

        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            if !self.commit(request_id, |job| job.attempts = attempt) {
                return SearchOutcome::Superseded;
            }

            match self.api.search_results(&token).await {
                Ok(prices) => {
                    let prices = sorted_by_amount(prices);
                    info!(request_id, attempt, count = prices.len(), "price search finished");
                    return self.settle(request_id, |job| {
                        job.prices = prices;
                        job.error = None;
                        job.token = None;
                        job.status = SearchStatus::Success;
                    });
                }
                Err(err) => {
                    warn!(request_id, attempt, error = %err, "polling search results failed");
                    last_error = Some(err);
                    if attempt < max_attempts {
                        tokio::time::sleep(self.retry.backoff(attempt)).await;
                    }
                }
            }
        }

        let source = last_error
            .unwrap_or_else(|| ApiError::Malformed("no polling attempt was made".to_string()));
        let message = SearchError::PollFailed {
            attempts: max_attempts,
            source,
        }
        .to_string();

        self.settle(request_id, |job| {
            job.status = SearchStatus::Error;
            job.error = Some(message);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_server::{sample_price, MockTourApi};
    use rand::Rng;
    use std::time::Duration;
    use tokio::time::Instant;

    fn orchestrator_with(api: Arc<MockTourApi>) -> Arc<SearchOrchestrator<MockTourApi>> {
        Arc::new(SearchOrchestrator::new(api, RetryConfig::default()))
    }

    fn price_ids(job: &SearchJob) -> Vec<&str> {
        job.prices.iter().map(|p| p.id.as_str()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_succeeds_with_sorted_prices() {
        let api = Arc::new(MockTourApi::new());
        api.set_wait(Duration::from_secs(2));
        api.add_price("UA", sample_price("p1", "h1", 500.0)).await;
        api.add_price("UA", sample_price("p2", "h2", 200.0)).await;

        let search = orchestrator_with(api.clone());
        let started = Instant::now();
        let outcome = search.start("UA").await;

        let job = outcome.job().expect("search should settle");
        assert_eq!(job.status, SearchStatus::Success);
        assert_eq!(price_ids(job), vec!["p2", "p1"]);
        assert_eq!(job.error, None);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.token, None);
        assert_eq!(search.snapshot(), *job);

        // polling only starts once waitUntil has passed
        assert!(started.elapsed() >= Duration::from_millis(1900));
        assert_eq!(api.start_calls(), 1);
        assert_eq!(api.poll_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_retries_three_times_with_linear_backoff() {
        let api = Arc::new(MockTourApi::new());
        api.fail_next_polls(10);

        let search = orchestrator_with(api.clone());
        let outcome = search.start("UA").await;

        let job = outcome.job().unwrap();
        assert_eq!(job.status, SearchStatus::Error);
        assert_eq!(job.error.as_deref(), Some("search results unavailable (poll 3)"));
        assert_eq!(job.attempts, 3);
        assert!(job.prices.is_empty());

        let polls = api.poll_log().await;
        assert_eq!(polls.len(), 3);
        assert_eq!(polls[1].1 - polls[0].1, Duration::from_millis(500));
        assert_eq!(polls[2].1 - polls[1].1, Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_recovers_before_retries_run_out() {
        let api = Arc::new(MockTourApi::new());
        api.add_price("UA", sample_price("p1", "h1", 100.0)).await;
        api.fail_next_polls(2);

        let search = orchestrator_with(api.clone());
        let job = search.start("UA").await.job().cloned().unwrap();

        assert_eq!(job.status, SearchStatus::Success);
        assert_eq!(job.attempts, 3);
        assert_eq!(api.poll_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_failure_messages() {
        let api = Arc::new(MockTourApi::new());
        let search = orchestrator_with(api.clone());

        api.fail_start(Some(ApiError::Rejected {
            status: 500,
            message: None,
        }))
        .await;
        let job = search.start("UA").await.job().cloned().unwrap();
        assert_eq!(job.status, SearchStatus::Error);
        assert_eq!(job.error.as_deref(), Some("request failed with status 500"));

        api.fail_start(Some(ApiError::Rejected {
            status: 400,
            message: Some("unknown country".to_string()),
        }))
        .await;
        let job = search.start("XX").await.job().cloned().unwrap();
        assert_eq!(job.error.as_deref(), Some("unknown country"));

        api.fail_start(Some(ApiError::Transport("dns failure".to_string())))
            .await;
        let job = search.start("UA").await.job().cloned().unwrap();
        assert_eq!(job.error.as_deref(), Some("network error: dns failure"));
        assert_eq!(api.poll_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_search_supersedes_waiting_one() {
        let api = Arc::new(MockTourApi::new());
        api.set_wait(Duration::from_secs(2));
        api.add_price("UA", sample_price("ua-1", "h1", 300.0)).await;
        api.add_price("PL", sample_price("pl-1", "h2", 700.0)).await;

        let search = orchestrator_with(api.clone());
        let first = tokio::spawn({
            let search = search.clone();
            async move { search.start("UA").await }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(search.status(), SearchStatus::Waiting);

        let second = search.start("PL").await;
        let first = first.await.unwrap();

        assert_eq!(first, SearchOutcome::Superseded);
        let job = second.job().unwrap();
        assert_eq!(price_ids(job), vec!["pl-1"]);
        assert_eq!(search.snapshot().status, SearchStatus::Success);
        assert_eq!(price_ids(&search.snapshot()), vec!["pl-1"]);

        // the old job was cancelled and never polled
        assert_eq!(api.cancelled_tokens().await, vec!["t1".to_string()]);
        let polled: Vec<String> = api.poll_log().await.into_iter().map(|(t, _)| t).collect();
        assert_eq!(polled, vec!["t2".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_poll_of_old_search_is_discarded() {
        let api = Arc::new(MockTourApi::new());
        api.set_wait(Duration::from_secs(1));
        api.set_poll_delay("t1", Duration::from_secs(10)).await;
        api.add_price("UA", sample_price("ua-1", "h1", 300.0)).await;
        api.add_price("PL", sample_price("pl-1", "h2", 700.0)).await;

        let search = orchestrator_with(api.clone());
        let first = tokio::spawn({
            let search = search.clone();
            async move { search.start("UA").await }
        });

        // first search is now stuck in its slow poll
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(search.status(), SearchStatus::Fetching);

        let second = search.start("PL").await;
        assert!(matches!(second, SearchOutcome::Settled(_)));

        assert_eq!(first.await.unwrap(), SearchOutcome::Superseded);
        let job = search.snapshot();
        assert_eq!(job.status, SearchStatus::Success);
        assert_eq!(price_ids(&job), vec!["pl-1"]);
        assert_eq!(job.request_id, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cancel_does_not_block_new_search() {
        let api = Arc::new(MockTourApi::new());
        api.set_wait(Duration::from_secs(5));
        api.set_stop_delay(Duration::from_millis(500));
        api.fail_stop(true);
        api.add_price("PL", sample_price("pl-1", "h2", 700.0)).await;

        let search = orchestrator_with(api.clone());
        let first = tokio::spawn({
            let search = search.clone();
            async move { search.start("UA").await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = tokio::spawn({
            let search = search.clone();
            async move { search.start("PL").await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(search.status(), SearchStatus::Cancelling);
        assert!(search.is_loading());
        assert_eq!(search.snapshot().token, None);

        let second = second.await.unwrap();
        assert_eq!(second.job().unwrap().status, SearchStatus::Success);
        assert_eq!(first.await.unwrap(), SearchOutcome::Superseded);
        assert_eq!(api.stop_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_start_of_replaced_search_is_cancelled() {
        let api = Arc::new(MockTourApi::new());
        api.add_price("UA", sample_price("ua-1", "h1", 300.0)).await;
        api.add_price("PL", sample_price("pl-1", "h2", 700.0)).await;
        api.delay_next_start(Duration::from_secs(5)).await;

        let search = orchestrator_with(api.clone());
        let first = tokio::spawn({
            let search = search.clone();
            async move { search.start("UA").await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        // nothing to cancel yet: the first token hasn't arrived
        let second = search.start("PL").await;
        assert_eq!(second.job().unwrap().status, SearchStatus::Success);
        assert!(api.cancelled_tokens().await.is_empty());

        assert_eq!(first.await.unwrap(), SearchOutcome::Superseded);
        assert_eq!(api.cancelled_tokens().await, vec!["t1".to_string()]);

        let polled: Vec<String> = api.poll_log().await.into_iter().map(|(t, _)| t).collect();
        assert_eq!(polled, vec!["t2".to_string()]);

        let job = search.snapshot();
        assert_eq!(job.token, None);
        assert_eq!(price_ids(&job), vec!["pl-1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_last_of_rapid_starts_is_polled() {
        let api = Arc::new(MockTourApi::new());
        api.set_wait(Duration::from_secs(1));
        api.add_price("DE", sample_price("de-1", "h3", 900.0)).await;
        api.delay_next_start(Duration::from_secs(3)).await;

        let search = orchestrator_with(api.clone());
        let a = tokio::spawn({
            let search = search.clone();
            async move { search.start("UA").await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let b = tokio::spawn({
            let search = search.clone();
            async move { search.start("PL").await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let c = search.start("DE").await;
        assert_eq!(a.await.unwrap(), SearchOutcome::Superseded);
        assert_eq!(b.await.unwrap(), SearchOutcome::Superseded);
        assert_eq!(c.job().unwrap().status, SearchStatus::Success);

        let mut cancelled = api.cancelled_tokens().await;
        cancelled.sort();
        assert_eq!(cancelled, vec!["t1".to_string(), "t2".to_string()]);

        let polled: Vec<String> = api.poll_log().await.into_iter().map(|(t, _)| t).collect();
        assert_eq!(polled, vec!["t3".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_keeps_token_for_next_cancel() {
        let api = Arc::new(MockTourApi::new());
        api.fail_next_polls(3);
        let search = orchestrator_with(api.clone());

        let job = search.start("UA").await.job().cloned().unwrap();
        assert_eq!(job.status, SearchStatus::Error);
        assert_eq!(job.token.as_deref(), Some("t1"));

        search.start("UA").await;
        assert_eq!(api.cancelled_tokens().await, vec!["t1".to_string()]);
        assert_eq!(search.status(), SearchStatus::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detach_discards_in_flight_search() {
        let api = Arc::new(MockTourApi::new());
        api.set_wait(Duration::from_secs(2));
        api.add_price("UA", sample_price("ua-1", "h1", 300.0)).await;

        let search = orchestrator_with(api.clone());
        let running = tokio::spawn({
            let search = search.clone();
            async move { search.start("UA").await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        search.detach();
        assert_eq!(running.await.unwrap(), SearchOutcome::Superseded);
        assert_eq!(search.status(), SearchStatus::Waiting);
        assert!(search.snapshot().prices.is_empty());

        assert_eq!(search.start("UA").await, SearchOutcome::Superseded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_past_wait_until_polls_immediately() {
        let api = Arc::new(MockTourApi::new());
        api.set_wait_ms(-5_000);

        let search = orchestrator_with(api.clone());
        let started = Instant::now();
        let job = search.start("UA").await.job().cloned().unwrap();

        assert_eq!(job.status, SearchStatus::Success);
        assert!(job.prices.is_empty());
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_sorted_by_amount_is_non_decreasing() {
        let mut rng = rand::thread_rng();
        let prices: PricesMap = (0..200)
            .map(|i| {
                let id = format!("p{}", i);
                let amount = rng.gen_range(0..5_000) as f64 / 4.0;
                (id.clone(), sample_price(&id, "h1", amount))
            })
            .collect();

        let sorted = sorted_by_amount(prices);
        assert_eq!(sorted.len(), 200);
        assert!(sorted.windows(2).all(|w| w[0].amount <= w[1].amount));
    }

    #[test]
    fn test_loading_statuses() {
        assert!(SearchStatus::Waiting.is_loading());
        assert!(SearchStatus::Fetching.is_loading());
        assert!(SearchStatus::Cancelling.is_loading());
        assert!(!SearchStatus::Idle.is_loading());
        assert!(!SearchStatus::Success.is_loading());
        assert!(!SearchStatus::Error.is_loading());
    }
}
