use reqwest::Method;
use serde_json::Value;
use std::collections::BTreeMap;

/// Methods that may be re-sent without changing server state beyond the
/// first successful attempt.
pub fn is_idempotent(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS | Method::TRACE
    )
}

/// A fully described outbound call. Kept independent of `reqwest::Request`
/// so the same description can be re-issued on retry.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(Method::PATCH, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn headers(mut self, headers: &BTreeMap<String, String>) -> Self {
        for (name, value) in headers {
            self.headers.insert(name.clone(), value.clone());
        }
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn is_idempotent(&self) -> bool {
        is_idempotent(&self.method)
    }
}

/// A received response. `ok` mirrors a 2xx status; error statuses are data,
/// not errors, and are left for the caller to interpret.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub ok: bool,
    pub status: u16,
    pub data: Option<Value>,
    pub text: String,
}

impl HttpResponse {
    /// Best-effort human-readable error detail from an error body.
    pub fn error_message(&self) -> String {
        if let Some(data) = &self.data {
            for key in ["detail", "message", "error"] {
                if let Some(text) = data.get(key).and_then(Value::as_str) {
                    return text.to_string();
                }
            }
        }
        let trimmed = self.text.trim();
        if trimmed.is_empty() {
            format!("HTTP {}", self.status)
        } else {
            trimmed.chars().take(300).collect()
        }
    }
}
