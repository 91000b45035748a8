//! Rate limiting for LLM and HTTP traffic.
//!
//! No component issues an LLM call or outbound HTTP request without going
//! through a limiter; this is the single coordination point preventing
//! thundering herds across concurrent tasks.
//!
//! The LLM side runs two sliding-window buckets (requests/minute and
//! tokens/minute) behind a FIFO admission gate: a waiter that arrived
//! earlier always acquires before a later one. The crawler side keeps one
//! token bucket per host.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{sleep, Instant};

use crate::error::{Error, Result};

/// Sliding-window dual bucket for completion traffic.
pub struct LlmRateLimiter {
    requests_per_minute: u32,
    tokens_per_minute: u64,
    window: Duration,
    /// FIFO admission gate: tokio mutexes queue waiters fairly, so holding
    /// the gate across the wait loop preserves arrival order.
    admission: AsyncMutex<()>,
    state: Mutex<VecDeque<Acquisition>>,
}

#[derive(Debug, Clone, Copy)]
struct Acquisition {
    at: Instant,
    tokens: u64,
}

impl LlmRateLimiter {
    pub fn new(requests_per_minute: u32, tokens_per_minute: u64) -> Self {
        Self {
            requests_per_minute,
            tokens_per_minute,
            window: Duration::from_secs(60),
            admission: AsyncMutex::new(()),
            state: Mutex::new(VecDeque::new()),
        }
    }

    /// Acquire one request and `estimated_tokens` from the window, waiting
    /// asynchronously until both buckets allow it.
    pub async fn acquire(&self, estimated_tokens: u64) -> Result<()> {
        if estimated_tokens > self.tokens_per_minute {
            return Err(Error::config(format!(
                "estimated_tokens {} exceeds tokens_per_minute cap {}",
                estimated_tokens, self.tokens_per_minute
            )));
        }

        let _gate = self.admission.lock().await;
        loop {
            let wait = {
                let mut window = self.state.lock().expect("limiter lock poisoned");
                let now = Instant::now();
                while let Some(front) = window.front() {
                    if now.duration_since(front.at) >= self.window {
                        window.pop_front();
                    } else {
                        break;
                    }
                }

                let used_tokens: u64 = window.iter().map(|a| a.tokens).sum();
                if (window.len() as u32) < self.requests_per_minute
                    && used_tokens + estimated_tokens <= self.tokens_per_minute
                {
                    window.push_back(Acquisition {
                        at: now,
                        tokens: estimated_tokens,
                    });
                    None
                } else {
                    // Wait for the oldest acquisition to leave the window.
                    window
                        .front()
                        .map(|front| self.window.saturating_sub(now.duration_since(front.at)))
                }
            };

            match wait {
                None => return Ok(()),
                Some(d) => sleep(d.max(Duration::from_millis(10))).await,
            }
        }
    }

    /// Record actual token usage for a completed call, replacing the
    /// estimate recorded at acquisition time.
    pub fn record_usage(&self, estimated_tokens: u64, actual_tokens: u64) {
        let mut window = self.state.lock().expect("limiter lock poisoned");
        if let Some(last) = window
            .iter_mut()
            .rev()
            .find(|a| a.tokens == estimated_tokens)
        {
            last.tokens = actual_tokens;
        }
    }
}

/// Exponential backoff with jitter for transient failures.
///
/// Delay is `base * 2^attempt * uniform(0.5, 1.5)`, capped, and a
/// server-supplied retry-after hint overrides the computed delay.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Compute the delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32, retry_after_ms: Option<u64>) -> Duration {
        if let Some(hint) = retry_after_ms {
            return Duration::from_millis(hint.min(self.max_delay_ms));
        }
        let exponential = self.base_delay_ms.saturating_mul(1u64 << attempt.min(16));
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        let millis = ((exponential as f64) * jitter).round() as u64;
        Duration::from_millis(millis.min(self.max_delay_ms))
    }

    /// Sleep before retry number `attempt`, or fail once the budget is
    /// exhausted.
    pub async fn backoff(&self, attempt: u32, retry_after_ms: Option<u64>) -> Result<()> {
        if attempt >= self.max_attempts {
            return Err(Error::RetryExhausted {
                attempts: self.max_attempts,
            });
        }
        sleep(self.delay_for(attempt, retry_after_ms)).await;
        Ok(())
    }
}

struct HostBucket {
    tokens: f64,
    rate: f64,
    last_refill: Instant,
}

/// Per-host token buckets for outbound HTTP.
pub struct HostRateLimiter {
    default_rate: f64,
    overrides: HashMap<String, f64>,
    buckets: Mutex<HashMap<String, HostBucket>>,
}

impl HostRateLimiter {
    pub fn new(default_rate_per_second: f64, overrides: HashMap<String, f64>) -> Self {
        Self {
            default_rate: default_rate_per_second.max(0.01),
            overrides,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    fn rate_for(&self, host: &str) -> f64 {
        self.overrides
            .get(host)
            .copied()
            .unwrap_or(self.default_rate)
            .max(0.01)
    }

    /// Acquire one request slot for `host`, waiting until the bucket allows.
    pub async fn acquire(&self, host: &str) {
        loop {
            let wait = {
                let mut buckets = self.buckets.lock().expect("limiter lock poisoned");
                let rate = self.rate_for(host);
                let now = Instant::now();
                let bucket = buckets.entry(host.to_string()).or_insert(HostBucket {
                    tokens: rate.max(1.0),
                    rate,
                    last_refill: now,
                });

                let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * bucket.rate).min(bucket.rate.max(1.0));
                bucket.last_refill = now;

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    None
                } else {
                    Some(Duration::from_secs_f64((1.0 - bucket.tokens) / bucket.rate))
                }
            };

            match wait {
                None => return,
                Some(d) => sleep(d).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn llm_acquisition_is_fifo() {
        // 3 rpm / 2000 tpm: five 800-token tasks must complete in arrival
        // order, with no later task overtaking an earlier waiter.
        let limiter = Arc::new(LlmRateLimiter::new(3, 2_000));
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for n in 0..5u32 {
            let limiter = Arc::clone(&limiter);
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                // Stagger arrivals so admission order is well-defined.
                sleep(Duration::from_millis(u64::from(n) * 10)).await;
                limiter.acquire(800).await.unwrap();
                order.lock().unwrap().push(n);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn token_bucket_blocks_over_budget() {
        let limiter = LlmRateLimiter::new(10, 2_000);
        let start = Instant::now();

        limiter.acquire(800).await.unwrap();
        limiter.acquire(800).await.unwrap();
        // 2400 > 2000: third acquisition must wait for the window to roll.
        limiter.acquire(800).await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(59));
    }

    #[tokio::test(start_paused = true)]
    async fn request_bucket_blocks_at_rpm() {
        let limiter = LlmRateLimiter::new(2, 100_000);
        let start = Instant::now();

        limiter.acquire(10).await.unwrap();
        limiter.acquire(10).await.unwrap();
        limiter.acquire(10).await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(59));
    }

    #[tokio::test]
    async fn oversized_estimate_is_rejected() {
        let limiter = LlmRateLimiter::new(10, 1_000);
        assert!(limiter.acquire(5_000).await.is_err());
    }

    #[test]
    fn backoff_delay_grows_and_caps() {
        let policy = RetryPolicy {
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            max_attempts: 5,
        };
        for attempt in 0..5 {
            let d = policy.delay_for(attempt, None).as_millis() as u64;
            let exponential = 100 * (1 << attempt);
            assert!(d <= 1_000, "attempt {attempt}: {d}ms over cap");
            assert!(
                d >= (exponential / 2).min(1_000),
                "attempt {attempt}: {d}ms under jitter floor"
            );
        }
    }

    #[test]
    fn retry_after_hint_overrides_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(4, Some(1_234)), Duration::from_millis(1_234));
    }

    #[tokio::test]
    async fn backoff_budget_exhausts_at_max_attempts() {
        let policy = RetryPolicy {
            base_delay_ms: 1,
            max_delay_ms: 2,
            max_attempts: 5,
        };
        assert!(policy.backoff(4, None).await.is_ok());
        assert!(matches!(
            policy.backoff(5, None).await,
            Err(Error::RetryExhausted { attempts: 5 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn host_bucket_enforces_per_host_rate() {
        let limiter = HostRateLimiter::new(2.0, HashMap::new());
        let start = Instant::now();

        limiter.acquire("example.com").await;
        limiter.acquire("example.com").await;
        limiter.acquire("example.com").await;

        // Burst of 2, then one refill at 2/s.
        assert!(start.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn host_override_takes_precedence() {
        let mut overrides = HashMap::new();
        overrides.insert("slow.example".to_string(), 0.5);
        let limiter = HostRateLimiter::new(10.0, overrides);
        let start = Instant::now();

        limiter.acquire("slow.example").await;
        limiter.acquire("slow.example").await;

        assert!(start.elapsed() >= Duration::from_secs(1));
    }
}
