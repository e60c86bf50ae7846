use std::time::Duration;

use log::{debug, warn};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{RequestBuilder, Response, StatusCode};
use tokio::time::Instant;

use crate::error::{RefsError, Result};

const REMAINING_HEADER: &str = "ratelimit-remaining";
const REMAINING_HEADER_ALT: &str = "x-ratelimit-remaining";
const RESET_HEADER: &str = "ratelimit-resettime";
const RESET_HEADER_ALT: &str = "x-ratelimit-reset";

/// Thresholds and intervals used by [`RateGovernor`].
#[derive(Debug, Clone, PartialEq)]
pub struct RatePolicy {
    /// Spacing between request starts before any quota warning
    pub base_interval: Duration,
    /// Remaining quota at or below which requests slow to `cautious_interval`
    pub cautious_remaining: u64,
    pub cautious_interval: Duration,
    /// Remaining quota at or below which requests slow to `critical_interval`
    pub critical_remaining: u64,
    pub critical_interval: Duration,
    /// Hard stop used for a 429 without a usable `Retry-After`
    pub default_retry_after: Duration,
    /// How many times a throttled request is re-issued before giving up
    pub max_throttle_retries: u32,
}

impl Default for RatePolicy {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(100),
            cautious_remaining: 10,
            cautious_interval: Duration::from_secs(1),
            critical_remaining: 5,
            critical_interval: Duration::from_secs(5),
            default_retry_after: Duration::from_secs(60),
            max_throttle_retries: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RateTier {
    Normal,
    Cautious,
    Critical,
}

/// Paces outbound requests against a remote request budget.
///
/// Two signals feed it. The remaining-quota header ratchets the spacing
/// between request starts through `Normal -> Cautious -> Critical` and never
/// back down. A 429 response triggers a one-off blocking wait for the
/// server's `Retry-After`, independent of the ambient spacing.
///
/// Callers must pair every request with `before_request` and
/// `after_response`; the governor is owned by exactly one request loop.
#[derive(Debug)]
pub struct RateGovernor {
    policy: RatePolicy,
    last_request: Option<Instant>,
    min_interval: Duration,
    tier: RateTier,
}

impl RateGovernor {
    pub fn new(policy: RatePolicy) -> Self {
        let min_interval = policy.base_interval;
        Self {
            policy,
            last_request: None,
            min_interval,
            tier: RateTier::Normal,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn tier(&self) -> RateTier {
        self.tier
    }

    /// Waits until `min_interval` has passed since the previous request start,
    /// then marks now as the start of the next request.
    pub async fn before_request(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                debug!("Respecting API rate limits, waiting {wait:?} before next request");
                tokio::time::sleep(wait).await;
            }
        }
        self.last_request = Some(Instant::now());
    }

    /// Updates pacing from a response.
    ///
    /// Returns `true` when the response was a 429; by then the hard-stop wait
    /// has already elapsed and the caller may re-issue the request.
    pub async fn after_response(&mut self, headers: &HeaderMap, status: StatusCode) -> bool {
        if let Some(remaining) = header_u64(headers, REMAINING_HEADER, REMAINING_HEADER_ALT) {
            self.observe_remaining(remaining);
        }

        if let Some(reset) = header_str(headers, RESET_HEADER, RESET_HEADER_ALT) {
            debug!("Rate limit resets at {reset}");
        }

        if status != StatusCode::TOO_MANY_REQUESTS {
            return false;
        }

        let wait = headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(self.policy.default_retry_after, Duration::from_secs);

        warn!("API rate limit exceeded, waiting {wait:?} as requested by server");
        tokio::time::sleep(wait).await;
        true
    }

    /// Sends one logical request under this governor's pacing.
    ///
    /// `build` is called once per attempt. A 429 is re-issued after the
    /// hard-stop wait, up to `max_throttle_retries` times; any other non-2xx
    /// status becomes [`RefsError::Api`] carrying the response body.
    pub async fn send<F>(&mut self, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempts = 0;
        loop {
            self.before_request().await;
            let response = build().send().await?;
            attempts += 1;

            let status = response.status();
            if self.after_response(response.headers(), status).await {
                if attempts > self.policy.max_throttle_retries {
                    return Err(RefsError::Throttled { attempts });
                }
                continue;
            }

            if !status.is_success() {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unable to read error response".to_string());
                return Err(RefsError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            return Ok(response);
        }
    }

    fn observe_remaining(&mut self, remaining: u64) {
        let signalled = if remaining <= self.policy.critical_remaining {
            RateTier::Critical
        } else if remaining <= self.policy.cautious_remaining {
            RateTier::Cautious
        } else {
            RateTier::Normal
        };

        if signalled <= self.tier {
            return;
        }

        self.tier = signalled;
        let target = match signalled {
            RateTier::Normal => self.policy.base_interval,
            RateTier::Cautious => self.policy.cautious_interval,
            RateTier::Critical => self.policy.critical_interval,
        };
        self.min_interval = self.min_interval.max(target);

        warn!(
            "Rate limit {:?}: only {remaining} requests remaining, spacing requests by {:?}",
            self.tier, self.min_interval
        );
    }
}

fn header_str<'a>(headers: &'a HeaderMap, primary: &str, fallback: &str) -> Option<&'a str> {
    headers
        .get(primary)
        .or_else(|| headers.get(fallback))
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

fn header_u64(headers: &HeaderMap, primary: &str, fallback: &str) -> Option<u64> {
    header_str(headers, primary, fallback).and_then(|v| v.trim().parse().ok())
}
