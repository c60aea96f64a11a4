//! Retry policy layered over any transport
//!
//! Transports never retry on their own. [`RetryingTransport`] wraps one and
//! re-issues a call when it fails with `Error::Transport`, waiting between
//! attempts as the [`RetryStrategy`] says. Node-reported errors
//! (`Error::Rpc`) and malformed replies are returned immediately: repeating
//! them would only produce the same answer.
//!
//! Each attempt is a fresh request with a fresh id.
//!
//! # Built-in Strategies
//!
//! - **ExponentialBackoff**: doubling delays, capped, optional jitter
//! - **FixedDelay**: constant delay
//! - **NoRetry**: fail on the first error
//!
//! # Examples
//!
//! ```rust,no_run
//! use ethrpc_client::{ExponentialBackoff, HttpTransport, RetryingTransport, Transport};
//! use ethrpc_core::params;
//! use std::time::Duration;
//!
//! # async fn example() -> ethrpc_core::Result<()> {
//! let node = RetryingTransport::new(
//!     HttpTransport::new("http://127.0.0.1:8545")?,
//!     ExponentialBackoff::new(Duration::from_millis(200), Duration::from_secs(5)).with_max_attempts(4),
//! );
//! let block = node.execute("eth_blockNumber", params![]).await?;
//! # Ok(())
//! # }
//! ```

use crate::transport::Transport;
use async_trait::async_trait;
use ethrpc_core::{BaseTransport, Result};
use serde_json::Value;
use std::time::Duration;

/// Decides whether and when to retry a failed call
pub trait RetryStrategy: Send + Sync {
    /// Delay before retry number `attempt` (0-indexed), or `None` to give up
    fn next_delay(&self, attempt: u32) -> Option<Duration>;
}

/// Exponential backoff with optional jitter
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    min_delay: Duration,
    max_delay: Duration,
    max_attempts: Option<u32>,
    jitter: bool,
}

impl ExponentialBackoff {
    /// Start at `min_delay`, double each time, never exceed `max_delay`
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay,
            max_attempts: None,
            jitter: false,
        }
    }

    /// Give up after this many retries
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Add up to 25% random extra delay
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(30))
            .with_max_attempts(5)
            .with_jitter()
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if attempt >= max {
                return None;
            }
        }

        let min_ms = u64::try_from(self.min_delay.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);
        let delay = 2u64
            .checked_pow(attempt)
            .and_then(|factor| min_ms.checked_mul(factor))
            .map_or(max_ms, |ms| ms.min(max_ms));

        if self.jitter && delay >= 4 {
            use rand::Rng;
            let jitter_ms = rand::thread_rng().gen_range(0..=(delay / 4));
            return Some(Duration::from_millis(delay.saturating_add(jitter_ms)));
        }

        Some(Duration::from_millis(delay))
    }
}

/// Constant delay between retries
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<u32>,
}

impl FixedDelay {
    /// Wait `delay` before every retry
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    /// Give up after this many retries
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

impl RetryStrategy for FixedDelay {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        match self.max_attempts {
            Some(max) if attempt >= max => None,
            _ => Some(self.delay),
        }
    }
}

/// Never retry
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryStrategy for NoRetry {
    fn next_delay(&self, _attempt: u32) -> Option<Duration> {
        None
    }
}

/// A transport that retries connection-level failures
pub struct RetryingTransport<T> {
    inner: T,
    strategy: Box<dyn RetryStrategy>,
}

impl<T: Transport> RetryingTransport<T> {
    /// Wrap `inner` with `strategy`
    pub fn new(inner: T, strategy: impl RetryStrategy + 'static) -> Self {
        Self {
            inner,
            strategy: Box::new(strategy),
        }
    }

    /// The wrapped transport
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Unwrap
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[async_trait]
impl<T: Transport> Transport for RetryingTransport<T> {
    fn base(&self) -> &BaseTransport {
        self.inner.base()
    }

    async fn execute(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let mut attempt = 0;
        loop {
            let error = match self.inner.execute(method, params.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transport() => e,
                Err(e) => return Err(e),
            };

            let Some(delay) = self.strategy.next_delay(attempt) else {
                return Err(error);
            };

            self.inner.base().log(format!(
                "{} failed ({}), retry {} in {:?}",
                method,
                error,
                attempt + 1,
                delay
            ));
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }
}
