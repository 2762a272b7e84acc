//! Retry policy for completion gateways.
//!
//! Transient failures (network, rate limiting, 5xx) are retried with
//! randomized exponential backoff; authentication and quota failures
//! propagate on the first attempt.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::warn;

use crate::conversation::AssistantContent;
use crate::provider::{CompletionGateway, CompletionRequest, LlmError};

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one (default 3).
    pub max_attempts: u32,
    /// Base delay (default 1s).
    pub base_delay: Duration,
    /// Upper bound for any single delay (default 40s).
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(40),
        }
    }
}

impl RetryPolicy {
    /// Upper bound of the backoff window after `attempt` failures (0-indexed):
    /// `min(max_delay, base_delay * 2^attempt)`.
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Full-jitter delay drawn uniformly from `[0, backoff_ceiling(attempt)]`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let ceiling = self.backoff_ceiling(attempt).as_millis() as u64;
        if ceiling == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling))
    }

    /// Delay before retrying `err`: the jittered backoff, raised to the
    /// server's `retry-after` hint when one was given, capped at `max_delay`.
    pub fn delay_for_error(&self, attempt: u32, err: &LlmError) -> Duration {
        let jitter = self.delay_for_attempt(attempt);
        match err {
            LlmError::RateLimited { retry_after_secs } => jitter
                .max(Duration::from_secs(*retry_after_secs))
                .min(self.max_delay),
            _ => jitter,
        }
    }
}

// ---------------------------------------------------------------------------
// Retrying gateway
// ---------------------------------------------------------------------------

/// Wraps a gateway so every request goes through [`RetryPolicy`].
pub struct RetryingGateway {
    inner: Arc<dyn CompletionGateway>,
    policy: RetryPolicy,
}

impl RetryingGateway {
    pub fn new(inner: Arc<dyn CompletionGateway>) -> Self {
        Self {
            inner,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl CompletionGateway for RetryingGateway {
    async fn complete(&self, request: CompletionRequest) -> Result<AssistantContent, LlmError> {
        let mut attempt = 0;

        loop {
            match self.inner.complete(request.clone()).await {
                Ok(message) => return Ok(message),
                Err(err) => {
                    attempt += 1;
                    if !err.is_transient() {
                        return Err(err);
                    }
                    if attempt >= self.policy.max_attempts {
                        warn!(
                            provider = self.inner.provider_name(),
                            attempts = attempt,
                            err = %err,
                            "max retries exceeded"
                        );
                        return Err(err);
                    }

                    let delay = self.policy.delay_for_error(attempt - 1, &err);
                    warn!(
                        provider = self.inner.provider_name(),
                        attempt,
                        max = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        err = %err,
                        "retrying completion after error"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Message;
    use crate::testing::ScriptedGateway;

    fn request() -> CompletionRequest {
        CompletionRequest::new("test-model", vec![Message::User("hi".into())])
    }

    #[test]
    fn ceiling_doubles_then_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_ceiling(0), Duration::from_secs(1));
        assert_eq!(policy.backoff_ceiling(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_ceiling(5), Duration::from_secs(32));
        assert_eq!(policy.backoff_ceiling(6), Duration::from_secs(40));
        assert_eq!(policy.backoff_ceiling(40), Duration::from_secs(40));
    }

    #[test]
    fn jittered_delay_stays_in_window() {
        let policy = RetryPolicy::default();
        for attempt in 0..8 {
            let delay = policy.delay_for_attempt(attempt);
            assert!(delay <= policy.backoff_ceiling(attempt));
        }
    }

    #[test]
    fn rate_limit_hint_raises_delay_up_to_cap() {
        let policy = RetryPolicy::default();
        let hinted = LlmError::RateLimited { retry_after_secs: 7 };
        for _ in 0..16 {
            assert!(policy.delay_for_error(0, &hinted) >= Duration::from_secs(7));
        }

        let huge = LlmError::RateLimited { retry_after_secs: 600 };
        assert_eq!(policy.delay_for_error(0, &huge), Duration::from_secs(40));

        let network = LlmError::NetworkError("reset".into());
        assert!(policy.delay_for_error(0, &network) <= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_retry_waits_for_hint() {
        let inner = Arc::new(ScriptedGateway::new());
        inner.push_error(LlmError::RateLimited { retry_after_secs: 5 });
        inner.push_text("ok");

        let gateway = RetryingGateway::new(inner.clone());
        let started = tokio::time::Instant::now();
        gateway.complete(request()).await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(5));
        assert_eq!(inner.request_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors_until_success() {
        let inner = Arc::new(ScriptedGateway::new());
        inner.push_error(LlmError::NetworkError("connection reset".into()));
        inner.push_error(LlmError::RateLimited { retry_after_secs: 1 });
        inner.push_text("recovered");

        let gateway = RetryingGateway::new(inner.clone());
        let reply = gateway.complete(request()).await.unwrap();

        assert_eq!(reply.text.as_deref(), Some("recovered"));
        assert_eq!(inner.request_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_three_attempts() {
        let inner = Arc::new(ScriptedGateway::new());
        for _ in 0..4 {
            inner.push_error(LlmError::ApiError {
                status: 502,
                message: "bad gateway".into(),
            });
        }

        let gateway = RetryingGateway::new(inner.clone());
        let err = gateway.complete(request()).await.unwrap_err();

        assert!(matches!(err, LlmError::ApiError { status: 502, .. }));
        assert_eq!(inner.request_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn auth_and_quota_fail_fast() {
        let inner = Arc::new(ScriptedGateway::new());
        inner.push_error(LlmError::AuthError("invalid api key".into()));
        let gateway = RetryingGateway::new(inner.clone());
        assert!(matches!(
            gateway.complete(request()).await,
            Err(LlmError::AuthError(_))
        ));
        assert_eq!(inner.request_count(), 1);

        let inner = Arc::new(ScriptedGateway::new());
        inner.push_error(LlmError::QuotaExceeded("insufficient_quota".into()));
        let gateway = RetryingGateway::new(inner.clone());
        assert!(matches!(
            gateway.complete(request()).await,
            Err(LlmError::QuotaExceeded(_))
        ));
        assert_eq!(inner.request_count(), 1);
    }
}
