//! Retrying HTTP transport
//!
//! One logical call may take several attempts. Each attempt is classified:
//!
//! - 2xx, 403, 404 and other non-retryable statuses return immediately
//! - 5xx, 429 and connection failures are retried
//!
//! Between attempts the transport waits `min(max_wait, min_wait * 2^attempt)`,
//! except on a 429 that carries a rate-limit reset time, where it waits until
//! that time plus one second.

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Client, Request, Response, StatusCode};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{Result, SyncError};

// ============================================================================
// Retry Constants
// ============================================================================

/// Response header holding the rate-limit reset time, in epoch milliseconds.
pub const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

/// Retries after the first attempt.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// First backoff wait.
pub const DEFAULT_MIN_WAIT: Duration = Duration::from_secs(1);

/// Upper bound on exponential backoff.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(30);

/// Added to a rate-limit reset wait.
pub const RATE_LIMIT_SLACK: Duration = Duration::from_secs(1);

/// Backoff configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_attempts: u32,
    pub min_wait: Duration,
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            min_wait: DEFAULT_MIN_WAIT,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

impl RetryPolicy {
    /// Whether a response status is worth another attempt
    pub fn is_retryable(status: StatusCode) -> bool {
        status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
    }

    /// `min(max_wait, min_wait * 2^attempt)`, saturating at `max_wait`
    pub fn exponential(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.min_wait.checked_mul(factor))
            .map_or(self.max_wait, |wait| wait.min(self.max_wait))
    }

    /// Wait before the attempt following `attempt`
    pub fn backoff(
        &self,
        attempt: u32,
        status: StatusCode,
        headers: &HeaderMap,
        now: DateTime<Utc>,
    ) -> Duration {
        if status == StatusCode::TOO_MANY_REQUESTS {
            if let Some(wait) = rate_limit_wait(headers, now) {
                return wait;
            }
        }
        self.exponential(attempt)
    }
}

/// Time until the advertised reset, plus slack. `None` when the header is absent or unparsable.
pub fn rate_limit_wait(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let reset_ms: i64 = headers
        .get(RATE_LIMIT_RESET_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()?;

    let until_reset = reset_ms.saturating_sub(now.timestamp_millis()).max(0);
    Some(Duration::from_millis(until_reset.unsigned_abs()) + RATE_LIMIT_SLACK)
}

/// A completed call and how it got there
#[derive(Debug)]
pub struct TransportResponse {
    pub response: Response,
    /// Wall time across all attempts, waits included
    pub elapsed: Duration,
    pub attempts: u32,
    /// Backoff waits applied before each retry
    pub waits: Vec<Duration>,
}

impl TransportResponse {
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }
}

/// HTTP client wrapper applying a [`RetryPolicy`]
#[derive(Debug, Clone)]
pub struct RetryingTransport {
    client: Client,
    policy: RetryPolicy,
}

impl RetryingTransport {
    pub fn new(client: Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Execute `request`, retrying transient failures.
    ///
    /// Requests with streaming bodies cannot be replayed and are rejected.
    pub async fn execute(&self, request: Request) -> Result<TransportResponse> {
        let target = format!("{} {}", request.method(), request.url());
        let started = Instant::now();
        let mut waits = Vec::new();

        for attempt in 0..=self.policy.max_attempts {
            let attempt_request = request.try_clone().ok_or_else(|| {
                SyncError::config(format!("{} has a body that cannot be retried", target))
            })?;

            let wait = match self.client.execute(attempt_request).await {
                Ok(response) if !RetryPolicy::is_retryable(response.status()) => {
                    let elapsed = started.elapsed();
                    debug!(
                        target_url = %target,
                        status = response.status().as_u16(),
                        attempts = attempt + 1,
                        duration_ms = elapsed.as_millis() as u64,
                        "HTTP call complete"
                    );
                    return Ok(TransportResponse {
                        response,
                        elapsed,
                        attempts: attempt + 1,
                        waits,
                    });
                },
                Ok(response) => {
                    let status = response.status();
                    let wait =
                        self.policy
                            .backoff(attempt, status, response.headers(), Utc::now());
                    warn!(
                        target_url = %target,
                        status = status.as_u16(),
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        "retryable response"
                    );
                    wait
                },
                Err(err) => {
                    let wait = self.policy.exponential(attempt);
                    warn!(
                        target_url = %target,
                        error = %err,
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        "request failed"
                    );
                    wait
                },
            };

            if attempt == self.policy.max_attempts {
                break;
            }
            waits.push(wait);
            tokio::time::sleep(wait).await;
        }

        Err(SyncError::GiveUp {
            target,
            attempts: self.policy.max_attempts + 1,
        })
    }
}
