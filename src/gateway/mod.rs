//! Transport boundary to the generative model.
//!
//! [`ModelGateway`] owns the timeout and retry policy; a [`ModelBackend`] makes a
//! single attempt. The gateway never looks inside a response body, shape
//! checking belongs to `recipe_parser`.

mod fake;

pub use fake::{FakeBackend, FakeReply};

use async_trait::async_trait;
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::GatewayError;
use crate::ingredients::IngredientSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayRequest {
    TextPrompt { ingredients: IngredientSet },
    ImageExtract { image_bytes: Vec<u8> },
}

impl GatewayRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayRequest::TextPrompt { .. } => "text_prompt",
            GatewayRequest::ImageExtract { .. } => "image_extract",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Ok,
    RateLimited,
    TransientError,
    PermanentError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayResponse {
    pub status: ResponseStatus,
    pub body: String,
}

impl GatewayResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Ok,
            body: body.into(),
        }
    }

    pub fn with_status(status: ResponseStatus, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// One attempt against a model provider.
///
/// `Err` means the attempt never produced a response (connection refused, body
/// read failure); the gateway treats it according to [`GatewayError::is_retryable`].
#[async_trait]
pub trait ModelBackend: Send + Sync + fmt::Debug {
    async fn send(&self, request: &GatewayRequest) -> Result<GatewayResponse, GatewayError>;

    /// Short name for logs, e.g. "openrouter" or "fake".
    fn backend_name(&self) -> &'static str;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempt_timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(20),
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): doubling base plus jitter.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        let base = self.base_delay.saturating_mul(1u32 << exponent);
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        base + jitter
    }
}

#[derive(Debug, Clone)]
pub struct ModelGateway {
    backend: Arc<dyn ModelBackend>,
    policy: RetryPolicy,
}

impl ModelGateway {
    pub fn new(backend: Arc<dyn ModelBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    /// Raw text of the model's multi-recipe reply.
    pub async fn generate_recipes(&self, ingredients: &IngredientSet) -> Result<String, GatewayError> {
        self.call(GatewayRequest::TextPrompt {
            ingredients: ingredients.clone(),
        })
        .await
    }

    /// Raw comma-separated ingredient text for a photo.
    pub async fn extract_ingredients(&self, image_bytes: &[u8]) -> Result<String, GatewayError> {
        self.call(GatewayRequest::ImageExtract {
            image_bytes: image_bytes.to_vec(),
        })
        .await
    }

    async fn call(&self, request: GatewayRequest) -> Result<String, GatewayError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match self.attempt(&request).await {
                Ok(body) => {
                    tracing::debug!(
                        backend = self.backend.backend_name(),
                        kind = request.kind(),
                        attempt,
                        "Model call succeeded"
                    );
                    return Ok(body);
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                tracing::warn!(
                    backend = self.backend.backend_name(),
                    kind = request.kind(),
                    error = %err,
                    "Model call failed permanently"
                );
                return Err(err);
            }

            if attempt > self.policy.max_retries {
                tracing::warn!(
                    backend = self.backend.backend_name(),
                    kind = request.kind(),
                    attempts = attempt,
                    error = %err,
                    "Model call retries exhausted"
                );
                return Err(GatewayError::Exhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let delay = self.policy.backoff_delay(attempt);
            tracing::warn!(
                backend = self.backend.backend_name(),
                kind = request.kind(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient model failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt(&self, request: &GatewayRequest) -> Result<String, GatewayError> {
        let response = tokio::time::timeout(self.policy.attempt_timeout, self.backend.send(request))
            .await
            .map_err(|_| GatewayError::Timeout)??;

        match response.status {
            ResponseStatus::Ok => Ok(response.body),
            ResponseStatus::RateLimited => Err(GatewayError::RateLimited),
            ResponseStatus::TransientError => Err(GatewayError::Transient(response.body)),
            ResponseStatus::PermanentError => Err(GatewayError::Permanent(response.body)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingredients::normalize;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            attempt_timeout: Duration::from_secs(20),
            max_retries: 2,
            base_delay: Duration::from_millis(100),
            max_jitter: Duration::ZERO,
        }
    }

    fn gateway(backend: &Arc<FakeBackend>) -> ModelGateway {
        ModelGateway::new(backend.clone(), fast_policy())
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = fast_policy();
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_jitter_is_bounded() {
        let policy = RetryPolicy {
            max_jitter: Duration::from_millis(50),
            ..fast_policy()
        };
        for _ in 0..100 {
            let delay = policy.backoff_delay(1);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_transient_failures_then_success() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_recipe_reply(FakeReply::status(ResponseStatus::TransientError, "503"));
        backend.push_recipe_reply(FakeReply::fail(GatewayError::Transient("reset".to_string())));
        backend.push_recipe_reply(FakeReply::ok("[]"));

        let body = gateway(&backend)
            .generate_recipes(&normalize(["egg"]))
            .await
            .unwrap();
        assert_eq!(body, "[]");
        assert_eq!(backend.recipe_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_is_not_retried() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_recipe_reply(FakeReply::status(ResponseStatus::PermanentError, "invalid key"));
        backend.push_recipe_reply(FakeReply::ok("[]"));

        let err = gateway(&backend)
            .generate_recipes(&normalize(["egg"]))
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::Permanent("invalid key".to_string()));
        assert_eq!(backend.recipe_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhaust_after_three_attempts() {
        let backend = Arc::new(FakeBackend::new());
        for _ in 0..4 {
            backend.push_recipe_reply(FakeReply::status(ResponseStatus::RateLimited, ""));
        }

        let err = gateway(&backend)
            .generate_recipes(&normalize(["egg"]))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GatewayError::Exhausted {
                attempts: 3,
                last: Box::new(GatewayError::RateLimited),
            }
        );
        assert_eq!(backend.recipe_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempt_times_out_and_is_retried() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_recipe_reply(FakeReply::ok("late").delayed(Duration::from_secs(60)));
        backend.push_recipe_reply(FakeReply::ok("on time"));

        let body = gateway(&backend)
            .generate_recipes(&normalize(["egg"]))
            .await
            .unwrap();
        assert_eq!(body, "on time");
        assert_eq!(backend.recipe_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_surface_as_exhausted_timeout() {
        let backend = Arc::new(FakeBackend::new());
        for _ in 0..3 {
            backend.push_recipe_reply(FakeReply::ok("late").delayed(Duration::from_secs(60)));
        }

        let err = gateway(&backend)
            .generate_recipes(&normalize(["egg"]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Exhausted { attempts: 3, ref last } if **last == GatewayError::Timeout
        ));
    }

    #[tokio::test]
    async fn test_image_requests_use_their_own_script() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_image_reply(FakeReply::ok("tomato, basil"));

        let text = gateway(&backend)
            .extract_ingredients(b"\xff\xd8\xff")
            .await
            .unwrap();
        assert_eq!(text, "tomato, basil");
        assert_eq!(backend.image_calls(), 1);
        assert_eq!(backend.recipe_calls(), 0);
    }
}
