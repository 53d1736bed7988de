use super::request::{HttpRequest, HttpResponse};
use crate::config::ReliabilityConfig;
use crate::error::HttpError;
use reqwest::Client;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Shared `reqwest` client. Per-call deadlines are applied by [`HttpClient`],
/// so only the connect phase is bounded here.
pub fn build_http_client() -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Capped retry with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    /// Policy for idempotent context reads.
    pub fn for_context_reads(config: &ReliabilityConfig) -> Self {
        Self::new(config.context_retries, config.retry_delay())
    }
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    pub fn new() -> Self {
        Self::with_client(build_http_client())
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn builder(&self, request: &HttpRequest) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        builder
    }

    /// Issue one call and read the full body. Gives up after `timeout`;
    /// a timeout is reported exactly like a connection failure.
    pub async fn call_once(
        &self,
        request: &HttpRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, HttpError> {
        let builder = self.builder(request);
        let exchange = async move {
            let response = builder.send().await?;
            let status = response.status();
            let text = response.text().await?;
            Ok::<_, reqwest::Error>((status, text))
        };

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(HttpError::Cancelled),
            outcome = tokio::time::timeout(timeout, exchange) => outcome,
        };

        match outcome {
            Err(_elapsed) => Err(timed_out(&request.url, timeout)),
            Ok(Err(err)) => Err(classify(&request.url, &err)),
            Ok(Ok((status, text))) => {
                let data = serde_json::from_str(&text).ok();
                Ok(HttpResponse {
                    ok: status.is_success(),
                    status: status.as_u16(),
                    data,
                    text,
                })
            }
        }
    }

    /// `call_once` plus up to `policy.retries` extra attempts on transient
    /// failures. Error statuses are returned as-is, never retried.
    ///
    /// Non-idempotent requests get exactly one attempt regardless of policy.
    pub async fn call_with_retry(
        &self,
        request: &HttpRequest,
        timeout: Duration,
        policy: RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, HttpError> {
        if !request.is_idempotent() {
            tracing::warn!(
                method = %request.method,
                url = request.url.as_str(),
                "Refusing to retry non-idempotent request; issuing a single attempt"
            );
            return self.call_once(request, timeout, cancel).await;
        }

        let mut attempt: u32 = 0;
        loop {
            match self.call_once(request, timeout, cancel).await {
                Ok(response) => {
                    if attempt > 0 {
                        tracing::info!(
                            url = request.url.as_str(),
                            attempt,
                            "Request recovered after retries"
                        );
                    }
                    return Ok(response);
                }
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) => {
                    if attempt >= policy.retries {
                        return Err(HttpError::RetriesExhausted {
                            attempts: attempt + 1,
                            last: Box::new(err),
                        });
                    }
                    tracing::warn!(
                        url = request.url.as_str(),
                        attempt = attempt + 1,
                        max_retries = policy.retries,
                        "Transient failure, retrying: {err}"
                    );
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Err(HttpError::Cancelled),
                        () = tokio::time::sleep(policy.delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Send a request and hand back the response as soon as headers arrive,
    /// leaving the body to be streamed by the caller.
    pub async fn open_stream(
        &self,
        request: &HttpRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, HttpError> {
        let send = self.builder(request).send();
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(HttpError::Cancelled),
            outcome = tokio::time::timeout(timeout, send) => outcome,
        };

        match outcome {
            Err(_elapsed) => Err(timed_out(&request.url, timeout)),
            Ok(Err(err)) => Err(classify(&request.url, &err)),
            Ok(Ok(response)) => Ok(response),
        }
    }
}

fn timed_out(url: &str, timeout: Duration) -> HttpError {
    HttpError::Transient {
        url: url.to_string(),
        message: format!("timed out after {}ms", timeout.as_millis()),
    }
}

fn classify(url: &str, err: &reqwest::Error) -> HttpError {
    if err.is_builder() {
        HttpError::Request {
            url: url.to_string(),
            message: err.to_string(),
        }
    } else {
        HttpError::Transient {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}
