//! Condition-driven retry around one outbound call.
//!
//! On the first failure the effective handler list (local entries before
//! global ones) is scanned and the first handler whose condition renders to
//! "true" is locked in for the rest of the invocation: every retry waits the
//! handler's fixed backoff and the attempt count is bounded by its
//! max-retries. No matching handler means the original failure propagates
//! immediately.

use std::sync::Arc;
use std::time::Duration;

use restgate_core::{GatewayResult, RetryHandler, SubstitutionEngine};
use serde_json::json;

use crate::http::executor::{ExecutedResponse, HttpExecutor, HttpFailure};
use crate::http::request::OutboundRequest;

pub struct RetryEvaluator {
    engine: Arc<SubstitutionEngine>,
}

impl RetryEvaluator {
    pub fn new(engine: Arc<SubstitutionEngine>) -> Self {
        Self { engine }
    }

    /// Execute `request`, retrying per the first matching handler.
    pub async fn execute(
        &self,
        executor: &HttpExecutor,
        request: &OutboundRequest,
        handlers: &[RetryHandler],
    ) -> GatewayResult<ExecutedResponse> {
        let mut matched: Option<&RetryHandler> = None;
        let mut retries: u32 = 0;

        loop {
            let failure = match executor.attempt(request).await {
                Ok(response) => return Ok(response),
                Err(failure) => failure,
            };

            if retries == 0 && failure.is_retryable() {
                matched = handlers.iter().find(|handler| self.matches(handler, &failure));
                if let Some(handler) = matched {
                    tracing::info!(condition = %handler.retry_condition, "found matching retry handler");
                }
            }

            match matched {
                Some(handler) if retries < handler.retry_policy.max_retries => {
                    let delay = Duration::from_secs(handler.retry_policy.back_off_seconds);
                    tracing::debug!(retries, delay_seconds = handler.retry_policy.back_off_seconds, "retrying request");
                    tokio::time::sleep(delay).await;
                    retries += 1;
                }
                _ => {
                    return failure
                        .into_result(&format!("{}:{}", request.method, request.url));
                }
            }
        }
    }

    /// A condition that fails to render never matches; the failure is logged
    /// and the scan continues.
    fn matches(&self, handler: &RetryHandler, failure: &HttpFailure) -> bool {
        let context = retry_substitution_context(failure);
        match self.engine.render(&handler.retry_condition, &context) {
            Ok(rendered) => rendered.eq_ignore_ascii_case("true"),
            Err(error) => {
                tracing::error!(
                    condition = %handler.retry_condition,
                    %error,
                    "error processing retry handler condition"
                );
                false
            }
        }
    }
}

/// Substitution context of a failed attempt: `response.code`,
/// `response.headers` (single-valued), `response.body` (JSON-parsed when
/// possible) and `connectionTimeout`.
fn retry_substitution_context(failure: &HttpFailure) -> serde_json::Value {
    let response = match failure.error_response() {
        Some(response) => {
            let headers: serde_json::Map<String, serde_json::Value> = response
                .headers
                .iter()
                .filter_map(|(name, values)| {
                    values.first().map(|v| (name.clone(), serde_json::Value::String(v.clone())))
                })
                .collect();
            let body = response.body_string();
            let body = serde_json::from_str::<serde_json::Value>(&body)
                .unwrap_or(serde_json::Value::String(body));
            json!({"code": response.status, "headers": headers, "body": body})
        }
        None => json!({"code": null, "headers": {}, "body": null}),
    };
    json!({
        "connectionTimeout": failure.connection_timeout(),
        "response": response,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::executor::PoolSettings;
    use httpmock::prelude::*;
    use restgate_core::RetryPolicy;

    fn handler(condition: &str, max_retries: u32) -> RetryHandler {
        RetryHandler {
            retry_condition: condition.to_string(),
            retry_policy: RetryPolicy { max_retries, back_off_seconds: 0 },
        }
    }

    fn evaluator() -> RetryEvaluator {
        RetryEvaluator::new(Arc::new(SubstitutionEngine::new()))
    }

    fn get_request(url: String) -> OutboundRequest {
        let mut request = OutboundRequest::new();
        request.url = url;
        request.method = "GET".to_string();
        request
    }

    #[tokio::test]
    async fn test_retry_exhaustion_returns_last_error_response() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/flaky");
                then.status(503);
            })
            .await;

        let executor = HttpExecutor::internal(PoolSettings::default());
        let handlers = vec![handler("{{ response.code == 503 }}", 2)];
        let response = evaluator()
            .execute(&executor, &get_request(server.url("/flaky")), &handlers)
            .await
            .unwrap();

        // 1 initial attempt + 2 retries, final 503 flows back as a response
        assert_eq!(response.status, 503);
        mock.assert_hits_async(3).await;
    }

    #[tokio::test]
    async fn test_no_matching_handler_means_no_retry() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/flaky");
                then.status(503);
            })
            .await;

        let executor = HttpExecutor::internal(PoolSettings::default());
        let handlers = vec![handler("{{ response.code == 418 }}", 5)];
        let response = evaluator()
            .execute(&executor, &get_request(server.url("/flaky")), &handlers)
            .await
            .unwrap();

        assert_eq!(response.status, 503);
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_first_matching_handler_wins() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/flaky");
                then.status(503);
            })
            .await;

        let executor = HttpExecutor::internal(PoolSettings::default());
        // the first (local) handler allows one retry, the second would allow four
        let handlers = vec![
            handler("{{ response.code == 503 }}", 1),
            handler("{{ response.code == 503 }}", 4),
        ];
        evaluator()
            .execute(&executor, &get_request(server.url("/flaky")), &handlers)
            .await
            .unwrap();
        mock.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn test_condition_on_response_body() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/flaky");
                then.status(500).json_body(serde_json::json!({"state": "BUSY"}));
            })
            .await;

        let executor = HttpExecutor::internal(PoolSettings::default());
        let handlers = vec![handler("{{ response.body.state == 'BUSY' }}", 1)];
        evaluator()
            .execute(&executor, &get_request(server.url("/flaky")), &handlers)
            .await
            .unwrap();
        mock.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn test_connection_failure_with_matching_handler_propagates_after_retries() {
        let executor = HttpExecutor::internal(PoolSettings::default());
        let handlers = vec![handler("{{ connectionTimeout }}", 1)];
        let err = evaluator()
            .execute(&executor, &get_request("http://127.0.0.1:9/none".to_string()), &handlers)
            .await
            .unwrap_err();
        assert!(matches!(err, restgate_core::GatewayError::HttpExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn test_broken_condition_counts_as_non_match() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/flaky");
                then.status(503);
            })
            .await;

        let executor = HttpExecutor::internal(PoolSettings::default());
        let handlers = vec![handler("{{ missing.var }}", 3)];
        let response = evaluator()
            .execute(&executor, &get_request(server.url("/flaky")), &handlers)
            .await
            .unwrap();
        assert_eq!(response.status, 503);
        mock.assert_hits_async(1).await;
    }
}
