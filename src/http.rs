use crate::config::{FetchConfig, RateLimitConfig, SiteConfig};
use crate::error::{Result, ScraperError};
use backoff::ExponentialBackoff;
use rand::seq::SliceRandom;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Fixed-bound retry schedule: attempt `n` (from 0) is followed by a wait
/// of `base_delay * 2^n`, with no jitter.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn delay_for(&self, attempt_index: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt_index))
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.base_delay,
            initial_interval: self.base_delay,
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: self.delay_for(self.max_attempts),
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        }
    }
}

/// HTTP GET with bounded exponential back-off and a rotating User-Agent.
///
/// Page fetches and image downloads keep separate back-off bases. Image
/// downloads also honour HTTP 429 by sleeping for `Retry-After` and asking
/// again without spending one of the attempts.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    user_agents: Arc<[String]>,
    page_policy: RetryPolicy,
    image_policy: RetryPolicy,
    image_headers: HeaderMap,
    default_retry_after: Duration,
    max_rate_limit_waits: Option<u32>,
}

impl Fetcher {
    pub fn new(site: &SiteConfig, fetch: &FetchConfig, rate_limit: &RateLimitConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(fetch.timeout_secs))
            .connect_timeout(Duration::from_secs(fetch.connect_timeout_secs))
            .build()?;

        let mut image_headers = HeaderMap::new();
        image_headers.insert(
            header::REFERER,
            HeaderValue::from_str(&site.referer)
                .map_err(|e| ScraperError::invalid_config(format!("site.referer: {}", e)))?,
        );
        image_headers.insert(header::ACCEPT, HeaderValue::from_static("image/*"));
        image_headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate, br"));
        image_headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        Ok(Self {
            client,
            user_agents: site.user_agents.clone().into(),
            page_policy: RetryPolicy::new(fetch.max_attempts, fetch.base_delay()),
            image_policy: RetryPolicy::new(fetch.max_attempts, fetch.image_base_delay()),
            image_headers,
            default_retry_after: rate_limit.default_retry_after(),
            max_rate_limit_waits: rate_limit.max_rate_limit_waits,
        })
    }

    pub fn user_agents(&self) -> &[String] {
        &self.user_agents
    }

    fn random_user_agent(&self) -> &str {
        self.user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Fetch a page as text.
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        with_retry(url, self.page_policy, || async move {
            let response = self
                .client
                .get(url)
                .header(header::USER_AGENT, self.random_user_agent())
                .send()
                .await?
                .error_for_status()?;
            Ok(response.text().await?)
        })
        .await
    }

    /// Download image bytes.
    pub async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        with_retry(url, self.image_policy, || self.fetch_image_once(url)).await
    }

    async fn fetch_image_once(&self, url: &str) -> Result<Vec<u8>> {
        let mut waits = 0u32;
        loop {
            let response = self
                .client
                .get(url)
                .headers(self.image_headers.clone())
                .header(header::USER_AGENT, self.random_user_agent())
                .send()
                .await?;

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                if let Some(max) = self.max_rate_limit_waits {
                    if waits >= max {
                        return Err(ScraperError::RateLimited {
                            url: url.to_string(),
                            waits,
                        });
                    }
                }
                let wait = parse_retry_after(response.headers(), self.default_retry_after);
                waits += 1;
                warn!("[FETCHER] Rate limited by {}. Waiting {:?}...", url, wait);
                tokio::time::sleep(wait).await;
                continue;
            }

            let response = response.error_for_status()?;
            let bytes = response.bytes().await?;
            debug!("[FETCHER] Downloaded {} bytes from {}", bytes.len(), url);
            return Ok(bytes.to_vec());
        }
    }
}

/// `Retry-After` as whole seconds, falling back to `default` when the
/// header is missing or not an integer.
pub fn parse_retry_after(headers: &HeaderMap, default: Duration) -> Duration {
    headers
        .get(header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

async fn with_retry<T, F, Fut>(url: &str, policy: RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts;
    let mut attempt = 0u32;

    let result = backoff::future::retry_notify(
        policy.backoff(),
        || {
            attempt += 1;
            let current = attempt;
            let fut = operation();
            async move {
                fut.await.map_err(|err| {
                    if err.is_transient() && current < max_attempts {
                        backoff::Error::transient(err)
                    } else {
                        backoff::Error::permanent(err)
                    }
                })
            }
        },
        |err: ScraperError, wait: Duration| {
            warn!("[FETCHER] Request to {} failed: {}. Retrying in {:?}...", url, err, wait);
        },
    )
    .await;

    if let Err(err) = &result {
        error!("[FETCHER] Failed to fetch {} after {} attempts: {}", url, attempt, err);
    }
    result
}
