//! rate-paced concurrent polling of many station departure boards.
//!
//! a cycle splits the station list into two interleaved halves. each half is
//! fanned out under a token bucket sized to half the per-minute call
//! budget, and the second half starts no earlier than 60 seconds after the
//! first began, so a full cycle never exceeds the vendor cap.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::client::ApiClient;

/// vendor call budget per minute, shared by all in-flight requests
pub const DEFAULT_MAX_PER_MINUTE: u32 = 300;

/// concurrent in-flight requests per half
pub const DEFAULT_CONCURRENCY: usize = 64;

/// minimum spacing between the starts of the two half-lists
const HALF_PERIOD: Duration = Duration::from_secs(60);

/// the raw outcome of polling one station; `body` is None when the station
/// failed for this cycle (logged, never fatal)
#[derive(Debug, Clone)]
pub struct StationPayload {
    pub station: String,
    pub body: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub max_per_minute: u32,
    pub concurrency: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        PollerConfig {
            max_per_minute: DEFAULT_MAX_PER_MINUTE,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

pub struct StationPoller {
    client: Arc<ApiClient>,
    config: PollerConfig,
}

impl StationPoller {
    pub fn new(client: Arc<ApiClient>, config: PollerConfig) -> StationPoller {
        StationPoller { client, config }
    }

    /// polls every station once, pacing the two halves a minute apart.
    /// results arrive in completion order.
    pub async fn poll_cycle(&self, stations: &[String]) -> Vec<StationPayload> {
        self.poll_cycle_until(stations, None).await
    }

    /// like [`poll_cycle`], but stops scheduling new requests once the
    /// deadline passes. requests already in flight complete; stations never
    /// scheduled come back with no body.
    ///
    /// [`poll_cycle`]: StationPoller::poll_cycle
    pub async fn poll_cycle_until(
        &self,
        stations: &[String],
        deadline: Option<Instant>,
    ) -> Vec<StationPayload> {
        let (first, second) = split_halves(stations);
        let mut payloads = Vec::with_capacity(stations.len());

        let half_begin = Instant::now();
        payloads.extend(self.poll_group(&first, deadline).await);

        if !second.is_empty() {
            let elapsed = half_begin.elapsed();
            let wait = remaining_half_wait(elapsed);
            if wait.is_zero() {
                log::warn!(
                    "first half took more than one minute: {} seconds",
                    elapsed.as_secs()
                );
            } else {
                log::info!(
                    "first half done in {}s, waiting {}s before second half",
                    elapsed.as_secs(),
                    wait.as_secs()
                );
                tokio::time::sleep(wait).await;
            }
            payloads.extend(self.poll_group(&second, deadline).await);
        }

        payloads
    }

    /// fans one station group out under the token bucket. each half-group
    /// is capped at half the per-minute budget, so a full cycle stays
    /// inside the vendor cap. a failed or never-scheduled station yields a
    /// payload with no body.
    async fn poll_group(
        &self,
        stations: &[String],
        deadline: Option<Instant>,
    ) -> Vec<StationPayload> {
        let bucket = Arc::new(TokenBucket::per_minute(half_rate(
            self.config.max_per_minute,
        )));
        log::info!("polling {} stations", stations.len());

        stream::iter(stations.iter().cloned())
            .map(|station| {
                let client = self.client.clone();
                let bucket = bucket.clone();
                async move {
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        log::debug!("station {station} not scheduled: cycle deadline passed");
                        return StationPayload {
                            station,
                            body: None,
                        };
                    }
                    bucket.acquire().await;
                    match client.request_station(&station).await {
                        Ok(body) => StationPayload {
                            station,
                            body: Some(body),
                        },
                        Err(e) => {
                            log::warn!("station {station} failed this cycle: {e}");
                            StationPayload {
                                station,
                                body: None,
                            }
                        }
                    }
                }
            })
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await
    }
}

/// splits a station list into two interleaved halves (even and odd indices)
pub fn split_halves(stations: &[String]) -> (Vec<String>, Vec<String>) {
    let first = stations.iter().step_by(2).cloned().collect();
    let second = stations.iter().skip(1).step_by(2).cloned().collect();
    (first, second)
}

/// how long to wait after a half before starting the next one
pub fn remaining_half_wait(elapsed: Duration) -> Duration {
    HALF_PERIOD.saturating_sub(elapsed)
}

/// the per-minute rate of one half-group: half the global budget
pub fn half_rate(max_per_minute: u32) -> u32 {
    (max_per_minute / 2).max(1)
}

/// a token bucket refilled continuously at a fixed per-minute rate.
/// `acquire` suspends until a token is available; no lock is held across
/// the sleep.
pub struct TokenBucket {
    state: Mutex<BucketState>,
    capacity: f64,
    tokens_per_sec: f64,
}

struct BucketState {
    tokens: f64,
    refilled_at: Instant,
}

impl TokenBucket {
    pub fn per_minute(rate: u32) -> TokenBucket {
        let capacity = rate as f64;
        TokenBucket {
            state: Mutex::new(BucketState {
                tokens: capacity,
                refilled_at: Instant::now(),
            }),
            capacity,
            tokens_per_sec: capacity / 60.0,
        }
    }

    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                refill(
                    &mut state,
                    now,
                    self.capacity,
                    self.tokens_per_sec,
                );
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                seconds_until_token(state.tokens, self.tokens_per_sec)
            };
            tokio::time::sleep(wait).await;
        }
    }
}

fn refill(state: &mut BucketState, now: Instant, capacity: f64, tokens_per_sec: f64) {
    let elapsed = now.duration_since(state.refilled_at).as_secs_f64();
    state.tokens = (state.tokens + elapsed * tokens_per_sec).min(capacity);
    state.refilled_at = now;
}

fn seconds_until_token(tokens: f64, tokens_per_sec: f64) -> Duration {
    let missing = (1.0 - tokens).max(0.0);
    Duration::from_secs_f64(missing / tokens_per_sec)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stations(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("8739{i:04}")).collect()
    }

    #[test]
    fn test_split_halves_interleaves() {
        let list = stations(5);
        let (first, second) = split_halves(&list);
        assert_eq!(first, vec!["87390000", "87390002", "87390004"]);
        assert_eq!(second, vec!["87390001", "87390003"]);
    }

    #[test]
    fn test_split_halves_sizes_differ_by_at_most_one() {
        for n in [0, 1, 2, 7, 600] {
            let (first, second) = split_halves(&stations(n));
            assert_eq!(first.len() + second.len(), n);
            assert!(first.len() as i64 - second.len() as i64 <= 1);
        }
    }

    #[test]
    fn test_half_rate() {
        assert_eq!(half_rate(300), 150);
        assert_eq!(half_rate(301), 150);
        // a degenerate budget still makes progress
        assert_eq!(half_rate(1), 1);
    }

    #[test]
    fn test_remaining_half_wait() {
        assert_eq!(
            remaining_half_wait(Duration::from_secs(42)),
            Duration::from_secs(18)
        );
        assert_eq!(
            remaining_half_wait(Duration::from_secs(60)),
            Duration::ZERO
        );
        assert_eq!(
            remaining_half_wait(Duration::from_secs(90)),
            Duration::ZERO
        );
    }

    #[test]
    fn test_bucket_refill_caps_at_capacity() {
        let now = Instant::now();
        let mut state = BucketState {
            tokens: 0.0,
            refilled_at: now,
        };
        refill(
            &mut state,
            now + Duration::from_secs(3600),
            300.0,
            5.0,
        );
        assert_eq!(state.tokens, 300.0);
    }

    #[test]
    fn test_seconds_until_token() {
        // at 5 tokens/sec a fully drained bucket refills one token in 200ms
        assert_eq!(
            seconds_until_token(0.0, 5.0),
            Duration::from_millis(200)
        );
        assert_eq!(seconds_until_token(1.0, 5.0), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_bucket_burst_within_capacity_does_not_block() {
        let bucket = TokenBucket::per_minute(300);
        let begin = Instant::now();
        for _ in 0..50 {
            bucket.acquire().await;
        }
        assert!(begin.elapsed() < Duration::from_secs(1));
    }
}
