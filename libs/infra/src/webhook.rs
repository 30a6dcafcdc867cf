//! Outbound webhook delivery with retry and a dead-letter queue
//!
//! Attempts are spaced by jittered exponential backoff. 2xx is success;
//! 4xx other than 408/429 is terminal; everything else retries until the
//! attempt cap. Terminal failures land in an in-memory DLQ.

use std::sync::Mutex;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

// =============================================================================
// Errors & Config
// =============================================================================

/// Webhook delivery failure
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Delivery failed permanently; a dead letter was recorded
    #[error("Webhook delivery to '{url}' failed after {attempts} attempts: {message}")]
    Delivery {
        url: String,
        attempts: u32,
        message: String,
    },
}

/// Retry policy for webhook delivery
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Attempts beyond the first
    pub max_retries: u32,

    /// First backoff interval
    pub initial_interval: Duration,

    /// Ceiling for backoff growth
    pub max_interval: Duration,

    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
        }
    }
}

// =============================================================================
// Dead Letters
// =============================================================================

/// A permanently failed delivery
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub id: Uuid,
    pub url: String,
    pub attempts: u32,
    pub last_error: String,
    pub body: Vec<u8>,
    pub headers: Vec<(String, String)>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Sender
// =============================================================================

/// Webhook sender with retry and DLQ
pub struct WebhookSender {
    client: reqwest::Client,
    config: WebhookConfig,
    dead_letters: Mutex<Vec<DeadLetter>>,
}

impl Default for WebhookSender {
    fn default() -> Self {
        Self::new(WebhookConfig::default())
    }
}

impl WebhookSender {
    /// Create a sender with the given retry policy
    #[must_use]
    pub fn new(config: WebhookConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            dead_letters: Mutex::new(Vec::new()),
        }
    }

    /// POST `body` to `url`, retrying on transient failures
    pub async fn send(
        &self,
        url: &str,
        body: &[u8],
        headers: &[(String, String)],
    ) -> Result<(), WebhookError> {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.config.initial_interval,
            max_interval: self.config.max_interval,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };

        let max_attempts = self.config.max_retries + 1;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.attempt(url, body, headers).await {
                Ok(()) => return Ok(()),
                Err(AttemptError::Terminal(message)) => {
                    self.record_dead_letter(url, attempt, &message, body, headers);
                    return Err(WebhookError::Delivery {
                        url: url.to_string(),
                        attempts: attempt,
                        message,
                    });
                }
                Err(AttemptError::Transient(message)) => {
                    tracing::debug!(url, attempt, error = %message, "webhook attempt failed");
                    last_error = message;
                }
            }

            if attempt < max_attempts {
                // next_backoff is None only when an elapsed-time cap is set.
                let delay = backoff.next_backoff().unwrap_or(self.config.max_interval);
                tokio::time::sleep(delay).await;
            }
        }

        self.record_dead_letter(url, max_attempts, &last_error, body, headers);
        Err(WebhookError::Delivery {
            url: url.to_string(),
            attempts: max_attempts,
            message: last_error,
        })
    }

    /// Snapshot of the dead-letter queue
    #[must_use]
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        let dlq = self.dead_letters.lock().unwrap_or_else(|e| e.into_inner());
        dlq.clone()
    }

    async fn attempt(
        &self,
        url: &str,
        body: &[u8],
        headers: &[(String, String)],
    ) -> Result<(), AttemptError> {
        let mut request = self
            .client
            .post(url)
            .timeout(self.config.request_timeout)
            .body(body.to_vec());
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|err| AttemptError::Transient(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = format!("unexpected status {status}");
        let retryable = !status.is_client_error() || status.as_u16() == 408 || status.as_u16() == 429;
        if retryable {
            Err(AttemptError::Transient(message))
        } else {
            Err(AttemptError::Terminal(message))
        }
    }

    fn record_dead_letter(
        &self,
        url: &str,
        attempts: u32,
        message: &str,
        body: &[u8],
        headers: &[(String, String)],
    ) {
        tracing::warn!(url, attempts, error = message, "webhook delivery dead-lettered");
        let mut dlq = self.dead_letters.lock().unwrap_or_else(|e| e.into_inner());
        dlq.push(DeadLetter {
            id: Uuid::new_v4(),
            url: url.to_string(),
            attempts,
            last_error: message.to_string(),
            body: body.to_vec(),
            headers: headers.to_vec(),
            created_at: Utc::now(),
        });
    }
}

enum AttemptError {
    /// Worth retrying
    Transient(String),
    /// Do not retry
    Terminal(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Router;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn fast_sender(max_retries: u32) -> WebhookSender {
        WebhookSender::new(WebhookConfig {
            max_retries,
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(5),
            request_timeout: Duration::from_secs(2),
        })
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let base = serve(Router::new().route("/hook", post(|| async { StatusCode::OK }))).await;
        let sender = fast_sender(3);

        sender
            .send(&format!("{base}/hook"), b"{}", &[])
            .await
            .unwrap();
        assert!(sender.dead_letters().is_empty());
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let base = serve(Router::new().route(
            "/flaky",
            post(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        StatusCode::INTERNAL_SERVER_ERROR
                    } else {
                        StatusCode::OK
                    }
                }
            }),
        ))
        .await;

        let sender = fast_sender(3);
        sender
            .send(&format!("{base}/flaky"), b"{}", &[])
            .await
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!(sender.dead_letters().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_retries_dead_letter() {
        let base = serve(Router::new().route(
            "/down",
            post(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        ))
        .await;

        let sender = fast_sender(2);
        let err = sender
            .send(&format!("{base}/down"), b"payload", &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("after 3 attempts"));

        let dlq = sender.dead_letters();
        assert_eq!(dlq.len(), 1);
        assert_eq!(dlq[0].attempts, 3);
        assert_eq!(dlq[0].body, b"payload");
    }

    #[tokio::test]
    async fn test_client_error_is_terminal() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let base = serve(Router::new().route(
            "/reject",
            post(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { StatusCode::BAD_REQUEST }
            }),
        ))
        .await;

        let sender = fast_sender(5);
        let err = sender
            .send(&format!("{base}/reject"), b"{}", &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("400"));

        // No retries after a non-retryable status.
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(sender.dead_letters().len(), 1);
    }
}
