//! HTTP delivery of a finished task's result to a caller-supplied callback URL.

use std::time::Duration;

use rand::Rng;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::callback::CallbackConfig;
use crate::envelope::NotificationEnvelope;
use crate::error::{WireError, WireResult};

const MAX_ATTEMPTS: u32 = 5;
const BASE_DELAY: Duration = Duration::from_secs(1);
const PER_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Delivers `NotificationEnvelope`s to callback URLs, retrying transport
/// errors and 5xx responses with jittered exponential backoff. A 4xx is
/// treated as a terminal, non-retryable rejection.
#[derive(Debug, Clone)]
pub struct CallbackClient {
    http: Client,
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for CallbackClient {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackClient {
    pub fn new() -> Self {
        Self {
            http: Client::builder()
                .timeout(PER_ATTEMPT_TIMEOUT)
                .build()
                .expect("reqwest client builds with static TLS config"),
            max_attempts: MAX_ATTEMPTS,
            base_delay: BASE_DELAY,
        }
    }

    /// Overrides the attempt budget and base delay, for tests.
    pub fn with_policy(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            ..Self::new()
        }
    }

    /// POSTs `envelope` to `config.url`, retrying as described above. Returns
    /// `Ok(())` only on a 2xx response.
    pub async fn deliver(
        &self,
        config: &CallbackConfig,
        envelope: &NotificationEnvelope,
    ) -> WireResult<()> {
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            let mut request = self.http.post(config.url.clone()).json(envelope);
            if let Some(auth) = &config.auth {
                let (name, value) = auth.header();
                request = request.header(name, value);
            }

            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(attempt, status = %response.status(), "callback delivered");
                    return Ok(());
                }
                Ok(response) if response.status().is_client_error() => {
                    let status = response.status();
                    warn!(attempt, %status, "callback rejected, not retrying");
                    return Err(WireError::Rejected { status: status.as_u16() });
                }
                Ok(response) => {
                    last_error = format!("HTTP {}", response.status());
                }
                Err(err) => {
                    last_error = err.to_string();
                }
            }

            if attempt < self.max_attempts {
                let delay = self.backoff_delay(attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %last_error, "callback attempt failed, retrying");
                tokio::time::sleep(delay).await;
            }
        }

        Err(WireError::Exhausted {
            attempts: self.max_attempts,
            last_error,
        })
    }

    /// Full-jitter exponential backoff: `rand(0, base * 2^(attempt-1))`.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_millis() as u64 * (1u64 << (attempt - 1));
        let jittered = rand::thread_rng().gen_range(0..=exp);
        Duration::from_millis(jittered)
    }
}

/// True if `status` is one this client treats as worth retrying.
pub fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::CallbackAuth;
    use chrono::Utc;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_envelope() -> NotificationEnvelope {
        NotificationEnvelope {
            task_id: "t1".into(),
            status: "completed".into(),
            outputs: serde_json::json!({}),
            failed_profiles: serde_json::json!({}),
            face_detection: serde_json::json!(null),
            error: None,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn succeeds_immediately_on_200() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let config = CallbackConfig {
            url: format!("{}/hook", server.uri()).parse().unwrap(),
            auth: None,
        };
        let client = CallbackClient::with_policy(5, Duration::from_millis(1));
        client.deliver(&config, &sample_envelope()).await.unwrap();
    }

    #[tokio::test]
    async fn retries_503_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(3)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let config = CallbackConfig {
            url: format!("{}/hook", server.uri()).parse().unwrap(),
            auth: None,
        };
        let client = CallbackClient::with_policy(5, Duration::from_millis(1));
        client.deliver(&config, &sample_envelope()).await.unwrap();
    }

    #[tokio::test]
    async fn does_not_retry_4xx() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let config = CallbackConfig {
            url: format!("{}/hook", server.uri()).parse().unwrap(),
            auth: None,
        };
        let client = CallbackClient::with_policy(5, Duration::from_millis(1));
        let err = client.deliver(&config, &sample_envelope()).await.unwrap_err();
        assert!(matches!(err, WireError::Rejected { status: 400 }));
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts_of_5xx() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let config = CallbackConfig {
            url: format!("{}/hook", server.uri()).parse().unwrap(),
            auth: None,
        };
        let client = CallbackClient::with_policy(3, Duration::from_millis(1));
        let err = client.deliver(&config, &sample_envelope()).await.unwrap_err();
        assert!(matches!(err, WireError::Exhausted { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn sends_bearer_auth_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("authorization", "Bearer secret-token"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let config = CallbackConfig {
            url: format!("{}/hook", server.uri()).parse().unwrap(),
            auth: Some(CallbackAuth::Bearer { token: "secret-token".into() }),
        };
        let client = CallbackClient::with_policy(5, Duration::from_millis(1));
        client.deliver(&config, &sample_envelope()).await.unwrap();
    }
}
