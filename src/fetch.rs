//! Page fetching with a retry decorator and ordered URL fallback.
//!
//! - [`FetchPage`]: the seam every scraper fetches through
//! - [`HttpFetcher`]: the reqwest-backed implementation
//! - [`RetryFetch`]: decorator adding exponential backoff with jitter
//! - [`fetch_first`]: try a venue's listing URLs in order until one answers

use crate::error::FetchError;
use rand::{Rng, rng};
use reqwest::{Client, StatusCode};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Hosts that publish headlines or resell other venues' listings. They are
/// never scraped as a venue's own source.
const BLACKLIST: &[&str] = &[
    "thestar.com",
    "blogto.com",
    "nowtoronto.com",
    "citynews.ca",
    "google.com",
    "ticketmaster.ca",
    "songkick.com",
    "allevents.in",
    "eventbrite.ca/d/canada--toronto",
];

pub fn is_blacklisted(url: &str) -> bool {
    let lower = url.to_lowercase();
    BLACKLIST.iter().any(|domain| lower.contains(domain))
}

/// Anything that can turn a URL into an HTML body.
pub trait FetchPage {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

impl<T: FetchPage> FetchPage for &T {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        (**self).fetch(url).await
    }
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/html,application/xhtml+xml"));
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| FetchError::Request {
                url: String::new(),
                source,
            })?;
        Ok(Self { client })
    }
}

impl FetchPage for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let t0 = Instant::now();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.text().await.map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })?;
        debug!(
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched page"
        );
        Ok(body)
    }
}

/// Wrapper that adds exponential backoff retry to any [`FetchPage`].
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
///
/// A 404 or a blacklisted URL is not retried.
pub struct RetryFetch<T> {
    inner: T,
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T: FetchPage> RetryFetch<T> {
    pub fn new(inner: T, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(10),
        }
    }

    fn backoff(&self, attempt: usize) -> Duration {
        let shift = (attempt.saturating_sub(1)).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + Duration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

fn is_permanent(e: &FetchError) -> bool {
    matches!(
        e,
        FetchError::Blacklisted(_)
            | FetchError::NotFound(_)
            | FetchError::Status { status: 404 | 410, .. }
    )
}

impl<T: FetchPage> FetchPage for RetryFetch<T> {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.fetch(url).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    attempt += 1;
                    if is_permanent(&e) || attempt > self.max_retries {
                        debug!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                            error = %e,
                            "fetch() giving up"
                        );
                        return Err(e);
                    }
                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max = self.max_retries,
                        ?delay,
                        error = %e,
                        "fetch() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Try each URL in order and return the first body with the URL that
/// produced it. Blacklisted URLs are skipped without a request.
#[instrument(level = "info", skip_all, fields(candidates = urls.len()))]
pub async fn fetch_first<F: FetchPage>(
    fetcher: &F,
    urls: &[String],
) -> Result<(String, String), FetchError> {
    let mut attempted = 0usize;
    for url in urls {
        if is_blacklisted(url) {
            debug!(%url, "Skipping blacklisted URL");
            continue;
        }
        attempted += 1;
        match fetcher.fetch(url).await {
            Ok(body) => {
                info!(%url, bytes = body.len(), "Listing page fetched");
                return Ok((url.clone(), body));
            }
            Err(e) => warn!(%url, error = %e, "Listing page failed; trying next URL"),
        }
    }
    if attempted == 0 {
        if let Some(first) = urls.first() {
            return Err(FetchError::Blacklisted(first.clone()));
        }
    }
    error!(attempted, "No listing URL answered");
    Err(FetchError::Exhausted { attempted })
}


#[cfg(test)]
mod tests {
    use super::testing::StaticFetcher;
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Flaky {
        failures_left: AtomicUsize,
        calls: AtomicUsize,
    }

    impl FetchPage for Flaky {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: 503,
                });
            }
            Ok("<html></html>".to_string())
        }
    }

    #[test]
    fn test_blacklist() {
        assert!(is_blacklisted("https://www.blogto.com/events/"));
        assert!(is_blacklisted("HTTPS://ALLEVENTS.IN/toronto"));
        assert!(!is_blacklisted("https://www.masseyhall.com/events"));
    }

    #[tokio::test]
    async fn test_fetch_first_falls_through_to_next_url() {
        let fetcher = StaticFetcher::new().with_page("https://b.example/events", "<p>ok</p>");
        let urls = vec![
            "https://a.example/events".to_string(),
            "https://www.blogto.com/x".to_string(),
            "https://b.example/events".to_string(),
        ];
        let (url, body) = fetch_first(&fetcher, &urls).await.unwrap();
        assert_eq!(url, "https://b.example/events");
        assert_eq!(body, "<p>ok</p>");
        // The blacklisted URL is never requested.
        assert_eq!(
            fetcher.hits(),
            vec!["https://a.example/events", "https://b.example/events"]
        );
    }

    #[tokio::test]
    async fn test_fetch_first_exhausted() {
        let fetcher = StaticFetcher::new();
        let urls = vec!["https://a.example".to_string()];
        let err = fetch_first(&fetcher, &urls).await.unwrap_err();
        assert!(matches!(err, FetchError::Exhausted { attempted: 1 }));
    }

    #[tokio::test]
    async fn test_fetch_first_only_blacklisted() {
        let fetcher = StaticFetcher::new();
        let urls = vec!["https://www.songkick.com/venues/1".to_string()];
        let err = fetch_first(&fetcher, &urls).await.unwrap_err();
        assert!(matches!(err, FetchError::Blacklisted(_)));
        assert!(fetcher.hits().is_empty());
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_errors() {
        let flaky = Flaky {
            failures_left: AtomicUsize::new(2),
            calls: AtomicUsize::new(0),
        };
        let retry = RetryFetch::new(&flaky, 3, Duration::from_millis(1));
        assert!(retry.fetch("https://x.example").await.is_ok());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max() {
        let flaky = Flaky {
            failures_left: AtomicUsize::new(10),
            calls: AtomicUsize::new(0),
        };
        let retry = RetryFetch::new(&flaky, 2, Duration::from_millis(1));
        assert!(retry.fetch("https://x.example").await.is_err());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_does_not_retry_not_found() {
        let fetcher = StaticFetcher::new();
        let retry = RetryFetch::new(&fetcher, 5, Duration::from_millis(1));
        assert!(retry.fetch("https://missing.example").await.is_err());
        assert_eq!(fetcher.hits().len(), 1);
    }
}
