//! Bounded-retry HTTP client used for every call to the request/search
//! service and the plan-generation endpoint.

mod client;
mod request;

pub use client::{HttpClient, RetryPolicy, build_http_client};
pub use request::{HttpRequest, HttpResponse, is_idempotent};
