use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `planstream`.
///
/// Each subsystem defines its own error variant. The executor and orchestrator
/// match on these to decide between retrying, falling back, and emitting the
/// single terminal `error` event; CLI and bootstrap code keep using
/// `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum EngineError {
    // ── Transport ───────────────────────────────────────────────────────
    #[error("http: {0}")]
    Http(#[from] HttpError),

    // ── Request/search service ──────────────────────────────────────────
    #[error("upstream: {0}")]
    Upstream(#[from] UpstreamError),

    // ── Plan generation ─────────────────────────────────────────────────
    #[error("plan: {0}")]
    Plan(#[from] PlanError),

    // ── Outbound event stream ───────────────────────────────────────────
    #[error("stream: {0}")]
    Stream(#[from] StreamError),

    // ── Action execution ────────────────────────────────────────────────
    #[error("execution: {0}")]
    Execution(#[from] ExecutionError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// True when the session was cancelled or its consumer went away.
    /// Nothing can be emitted after these.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Self::Http(HttpError::Cancelled) | Self::Stream(StreamError::Disconnected)
        )
    }
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── HTTP transport errors ──────────────────────────────────────────────────

/// Failures raised before a usable HTTP response was received.
///
/// Timeouts and connection failures share the `Transient` variant: callers
/// cannot (and should not) tell them apart.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("transient failure calling {url}: {message}")]
    Transient { url: String, message: String },

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<HttpError> },

    #[error("invalid request to {url}: {message}")]
    Request { url: String, message: String },

    #[error("operation cancelled")]
    Cancelled,
}

impl HttpError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

// ─── Upstream service errors ────────────────────────────────────────────────

/// A valid HTTP response carrying an error status. Never retried.
#[derive(Debug, Error)]
#[error("{operation} failed with status {status}: {message}")]
pub struct UpstreamError {
    pub operation: String,
    pub status: u16,
    pub message: String,
}

// ─── Plan generation errors ─────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("plan generator {generator} failed: {message}")]
    Generation { generator: String, message: String },

    #[error("plan generator {generator} returned an unparseable plan: {message}")]
    Parse { generator: String, message: String },

    #[error("plan generator {0} is disabled")]
    Disabled(String),
}

// ─── Event stream errors ────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("event stream already terminated")]
    Closed,

    #[error("event stream consumer disconnected")]
    Disconnected,
}

// ─── Execution errors ───────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("{action} has no target row (no row_id and no previous row)")]
    MissingRow { action: String },

    #[error("unexpected response from {operation}: {message}")]
    InvalidResponse { operation: String, message: String },

    #[error("invalid {action} action: {message}")]
    InvalidAction { action: String, message: String },
}
