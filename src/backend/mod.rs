//! Client for the request/search service: row and project reads, row
//! mutations, the streaming search endpoint and outreach triggers.

mod types;

pub use types::{Project, Row, RowDraft, RowPatch};

use crate::config::{Config, ReliabilityConfig};
use crate::error::{EngineError, ExecutionError, UpstreamError};
use crate::http::{HttpClient, HttpRequest, HttpResponse, RetryPolicy};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

pub struct BackendClient {
    http: HttpClient,
    base_url: String,
    auth_token: Option<String>,
    reliability: ReliabilityConfig,
}

impl BackendClient {
    pub fn new(config: &Config) -> Self {
        Self::with_http(HttpClient::new(), config)
    }

    pub fn with_http(http: HttpClient, config: &Config) -> Self {
        Self {
            http,
            base_url: config.backend.base_url.trim_end_matches('/').to_string(),
            auth_token: config
                .backend
                .auth_token
                .clone()
                .filter(|token| !token.is_empty()),
            reliability: config.reliability.clone(),
        }
    }

    pub fn reliability(&self) -> &ReliabilityConfig {
        &self.reliability
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Attach the forwarded headers, falling back to the configured token
    /// when the caller sent no `Authorization`.
    fn authorize(&self, request: HttpRequest, headers: &BTreeMap<String, String>) -> HttpRequest {
        let forwarded = headers
            .keys()
            .any(|name| name.eq_ignore_ascii_case("authorization"));
        let request = request.headers(headers);
        match (&self.auth_token, forwarded) {
            (Some(token), false) => request.header("Authorization", format!("Bearer {token}")),
            _ => request,
        }
    }

    pub async fn fetch_row(
        &self,
        row_id: i64,
        headers: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<Option<Row>, EngineError> {
        self.fetch("read row", &format!("/rows/{row_id}"), headers, cancel)
            .await
    }

    pub async fn fetch_project(
        &self,
        project_id: i64,
        headers: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<Option<Project>, EngineError> {
        self.fetch(
            "read project",
            &format!("/projects/{project_id}"),
            headers,
            cancel,
        )
        .await
    }

    /// Idempotent context read. A 404 means "absent", not failure.
    async fn fetch<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        headers: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, EngineError> {
        let request = self.authorize(HttpRequest::get(self.url(path)), headers);
        let response = self
            .http
            .call_with_retry(
                &request,
                self.reliability.context_timeout(),
                RetryPolicy::for_context_reads(&self.reliability),
                cancel,
            )
            .await?;

        if response.status == 404 {
            tracing::debug!(operation, path, "Context entity not found");
            return Ok(None);
        }
        decode(operation, &response).map(Some)
    }

    pub async fn create_row(
        &self,
        draft: &RowDraft,
        headers: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<Row, EngineError> {
        let request = self.authorize(
            HttpRequest::post(self.url("/rows")).json(draft.payload()),
            headers,
        );
        let response = self
            .http
            .call_once(&request, self.reliability.mutation_timeout(), cancel)
            .await?;
        let row: Row = decode("create row", &response)?;
        tracing::info!(row_id = row.id, title = row.title.as_str(), "Row created");
        Ok(row)
    }

    pub async fn patch_row(
        &self,
        row_id: i64,
        patch: &RowPatch,
        headers: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<Row, EngineError> {
        let request = self.authorize(
            HttpRequest::patch(self.url(&format!("/rows/{row_id}"))).json(patch.payload()),
            headers,
        );
        let response = self
            .http
            .call_once(&request, self.reliability.mutation_timeout(), cancel)
            .await?;
        let row: Row = decode("update row", &response)?;
        tracing::info!(row_id = row.id, "Row updated");
        Ok(row)
    }

    /// Start a streaming search; the body is left for the aggregator.
    pub async fn open_search_stream(
        &self,
        row_id: i64,
        query: &str,
        providers: Option<&[String]>,
        headers: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, EngineError> {
        let mut body = json!({ "query": query });
        if let Some(providers) = providers.filter(|p| !p.is_empty()) {
            body["providers"] = json!(providers);
        }
        let request = self.authorize(
            HttpRequest::post(self.url(&format!("/rows/{row_id}/search/stream")))
                .header("Accept", "text/event-stream")
                .json(body),
            headers,
        );

        let response = self
            .http
            .open_stream(&request, self.reliability.search_timeout(), cancel)
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let failed = HttpResponse {
            ok: false,
            status: status.as_u16(),
            data: serde_json::from_str(&text).ok(),
            text,
        };
        Err(upstream("search", &failed).into())
    }

    /// Returns how many vendors were contacted.
    pub async fn trigger_outreach(
        &self,
        row_id: i64,
        category: &str,
        vendor_limit: u32,
        headers: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<u64, EngineError> {
        let request = self.authorize(
            HttpRequest::post(self.url(&format!("/outreach/rows/{row_id}/trigger"))).json(
                json!({
                    "category": category,
                    "vendor_limit": vendor_limit,
                }),
            ),
            headers,
        );
        let response = self
            .http
            .call_once(&request, self.reliability.outreach_timeout(), cancel)
            .await?;
        if !response.ok {
            return Err(upstream("trigger outreach", &response).into());
        }
        Ok(contacted_count(response.data.as_ref()))
    }
}

fn contacted_count(data: Option<&Value>) -> u64 {
    let Some(data) = data else {
        return 0;
    };
    if let Some(count) = data.get("vendors_contacted").and_then(Value::as_u64) {
        return count;
    }
    data.get("vendors")
        .and_then(Value::as_array)
        .map_or(0, |vendors| vendors.len() as u64)
}

fn upstream(operation: &str, response: &HttpResponse) -> UpstreamError {
    UpstreamError {
        operation: operation.to_string(),
        status: response.status,
        message: response.error_message(),
    }
}

fn decode<T: DeserializeOwned>(operation: &str, response: &HttpResponse) -> Result<T, EngineError> {
    if !response.ok {
        return Err(upstream(operation, response).into());
    }
    let data = response
        .data
        .clone()
        .ok_or_else(|| ExecutionError::InvalidResponse {
            operation: operation.to_string(),
            message: "response body is not JSON".into(),
        })?;
    serde_json::from_value(data).map_err(|err| {
        ExecutionError::InvalidResponse {
            operation: operation.to_string(),
            message: err.to_string(),
        }
        .into()
    })
}
