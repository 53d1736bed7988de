use super::{Action, ChatMessage, Plan, PlanGenerator, PlanRequest};
use crate::config::PlannerConfig;
use crate::error::{HttpError, PlanError};
use crate::http::{HttpClient, HttpRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const GENERATOR_NAME: &str = "llm";

const SYSTEM_PROMPT: &str = r#"You are the planning engine of a procurement assistant.
Read the conversation and decide what to do for the user's latest message.

Return ONLY a JSON object of this shape:
{
  "assistant_message": "short conversational reply shown to the user",
  "actions": [ ... zero or more actions, executed in order ... ]
}

Action types:
- {"type": "create_row", "title": "...", "constraints": {...}, "search_query": "...", "providers": ["..."]}
  New request when there is no active row or the user switched to an unrelated item.
- {"type": "update_row", "row_id": 123, "title": "...", "constraints": {...}, "search_query": "..."}
  Refine the active row. "constraints" REPLACES the stored set, so include every constraint that
  should remain. Omit "constraints" to leave them untouched.
- {"type": "search", "row_id": 123, "query": "..."}
  Re-run the search for an existing row.
- {"type": "vendor_outreach", "row_id": 123, "category": "catering", "vendor_limit": 10}
  Contact vendors in a service category for quotes.

Rules:
- Constraints hold structured data only (size, color, min_price, max_price, date, origin, ...).
  Never put title, what, search_query, category, is_service or service_category in constraints.
- When an active row exists and the message refines the same item, use update_row, not create_row.
- row_id may be omitted to target the row created or updated by an earlier action.
- Ask for missing essentials in assistant_message with no actions rather than guessing."#;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Plan generator backed by an OpenAI-compatible `chat/completions` endpoint.
pub struct LlmPlanGenerator {
    http: HttpClient,
    api_url: String,
    /// Pre-computed `"Bearer <key>"` header value.
    cached_auth_header: Option<String>,
    model: String,
    temperature: f64,
    timeout: Duration,
    history_window: usize,
}

impl LlmPlanGenerator {
    pub fn new(config: &PlannerConfig) -> Self {
        Self::with_http(HttpClient::new(), config)
    }

    pub fn with_http(http: HttpClient, config: &PlannerConfig) -> Self {
        Self {
            http,
            api_url: config.api_url.clone(),
            cached_auth_header: config
                .api_key
                .as_deref()
                .filter(|key| !key.is_empty())
                .map(|key| format!("Bearer {key}")),
            model: config.model.clone(),
            temperature: config.temperature,
            timeout: config.timeout(),
            history_window: config.history_window.max(1),
        }
    }

    fn build_request<'a>(&'a self, request: &'a PlanRequest) -> ChatRequest<'a> {
        let mut messages = vec![
            Message {
                role: "system",
                content: SYSTEM_PROMPT.to_string(),
            },
            Message {
                role: "system",
                content: context_block(request),
            },
        ];
        let skip = request.messages.len().saturating_sub(self.history_window);
        messages.extend(
            request
                .messages
                .iter()
                .skip(skip)
                .filter(|m| matches!(m.role.as_str(), "user" | "assistant"))
                .map(|m: &ChatMessage| Message {
                    role: m.role.as_str(),
                    content: m.content.clone(),
                }),
        );

        ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        }
    }

    async fn call(&self, request: &PlanRequest, cancel: &CancellationToken) -> Result<Plan, PlanError> {
        let Some(auth_header) = self.cached_auth_header.as_ref() else {
            return Err(PlanError::Disabled(GENERATOR_NAME.into()));
        };

        let body = serde_json::to_value(self.build_request(request)).map_err(generation)?;
        let http_request = HttpRequest::post(&self.api_url)
            .header("Authorization", auth_header.as_str())
            .header("X-Title", "planstream")
            .json(body);

        let response = self
            .http
            .call_once(&http_request, self.timeout, cancel)
            .await
            .map_err(|err| match err {
                HttpError::Cancelled => PlanError::Generation {
                    generator: GENERATOR_NAME.into(),
                    message: "cancelled".into(),
                },
                other => generation(other),
            })?;

        if !response.ok {
            return Err(PlanError::Generation {
                generator: GENERATOR_NAME.into(),
                message: format!("HTTP {}: {}", response.status, response.error_message()),
            });
        }

        let chat: ChatResponse = serde_json::from_str(&response.text).map_err(parse_error)?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| parse_error("model returned no content"))?;

        parse_plan(&content).map_err(parse_error)
    }
}

impl PlanGenerator for LlmPlanGenerator {
    fn name(&self) -> &str {
        GENERATOR_NAME
    }

    fn generate<'a>(
        &'a self,
        request: &'a PlanRequest,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<Plan, PlanError>> + Send + 'a>> {
        Box::pin(async move {
            let plan = self.call(request, cancel).await?;
            tracing::debug!(
                generator = GENERATOR_NAME,
                actions = plan.actions.len(),
                "Plan generated"
            );
            Ok(plan)
        })
    }
}

fn context_block(request: &PlanRequest) -> String {
    let mut block = String::from("Context:\n");
    match (request.active_row_id, request.active_row_title.as_deref()) {
        (Some(id), Some(title)) => {
            let _ = writeln!(block, "- Active row: id={id} title={title:?}");
        }
        (Some(id), None) => {
            let _ = writeln!(block, "- Active row: id={id}");
        }
        _ => block.push_str("- Active row: none\n"),
    }
    if let Some(category) = &request.active_row_category {
        let _ = writeln!(block, "- Active row vendor category: {category}");
    }
    match (request.project_id, request.project_title.as_deref()) {
        (Some(id), Some(title)) => {
            let _ = writeln!(block, "- Project: id={id} title={title:?}");
        }
        (Some(id), None) => {
            let _ = writeln!(block, "- Project: id={id}");
        }
        _ => block.push_str("- Project: none\n"),
    }
    block
}

fn generation(err: impl std::fmt::Display) -> PlanError {
    PlanError::Generation {
        generator: GENERATOR_NAME.into(),
        message: err.to_string(),
    }
}

fn parse_error(err: impl std::fmt::Display) -> PlanError {
    PlanError::Parse {
        generator: GENERATOR_NAME.into(),
        message: err.to_string(),
    }
}

/// Slice from the first `{` to the last `}`; tolerates code fences and prose.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[derive(Deserialize)]
struct RawPlan {
    #[serde(default, alias = "message")]
    assistant_message: String,
    #[serde(default)]
    actions: Vec<Value>,
}

/// Parse a model reply into a plan. Individual actions that do not match a
/// known shape are dropped; a reply with neither message nor actions fails.
pub fn parse_plan(text: &str) -> Result<Plan, String> {
    let json = extract_json_object(text).ok_or("no JSON object in reply")?;
    let raw: RawPlan = serde_json::from_str(json).map_err(|e| e.to_string())?;

    let mut actions = Vec::with_capacity(raw.actions.len());
    for (index, value) in raw.actions.into_iter().enumerate() {
        match serde_json::from_value::<Action>(value) {
            Ok(action) => actions.push(action),
            Err(err) => {
                tracing::warn!(index, error = %err, "Dropping malformed plan action");
            }
        }
    }

    if raw.assistant_message.trim().is_empty() && actions.is_empty() {
        return Err("empty plan".into());
    }
    Ok(Plan {
        assistant_message: raw.assistant_message,
        actions,
    })
}
