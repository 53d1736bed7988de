//! Plan generation: one interface, an LLM-backed strategy, a deterministic
//! rule-based strategy and the composite that falls back from one to the
//! other.

mod llm;
mod rules;

pub use llm::{LlmPlanGenerator, extract_json_object, parse_plan};
pub use rules::{RuleBasedPlanner, parse_price_constraint};

use crate::config::Config;
use crate::error::PlanError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use strum::Display;
use tokio_util::sync::CancellationToken;

/// Ordered actions for one chat turn plus the message shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub assistant_message: String,
    #[serde(default)]
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    CreateRow {
        title: String,
        #[serde(default)]
        constraints: BTreeMap<String, Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        search_query: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        providers: Option<Vec<String>>,
    },
    UpdateRow {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        row_id: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        constraints: Option<BTreeMap<String, Value>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        search_query: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        providers: Option<Vec<String>>,
    },
    Search {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        row_id: Option<i64>,
        query: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        providers: Option<Vec<String>>,
    },
    VendorOutreach {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        row_id: Option<i64>,
        category: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        vendor_limit: Option<u32>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActionKind {
    CreateRow,
    UpdateRow,
    Search,
    VendorOutreach,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::CreateRow { .. } => ActionKind::CreateRow,
            Self::UpdateRow { .. } => ActionKind::UpdateRow,
            Self::Search { .. } => ActionKind::Search,
            Self::VendorOutreach { .. } => ActionKind::VendorOutreach,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default, deserialize_with = "content_text")]
    pub content: String,
}

/// Message content arrives as a plain string, as `{"text": ...}`, as a list
/// of such parts, or as null. Anything else reads as empty.
fn content_text<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    fn text_of(value: &Value) -> Option<&str> {
        match value {
            Value::String(text) => Some(text.as_str()),
            Value::Object(map) => map.get("text").and_then(Value::as_str),
            _ => None,
        }
    }

    let value = Value::deserialize(deserializer)?;
    Ok(match &value {
        Value::Array(parts) => parts
            .iter()
            .filter_map(text_of)
            .collect::<Vec<_>>()
            .join("\n"),
        other => text_of(other).unwrap_or_default().to_string(),
    })
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

/// Everything a generator may look at.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlanRequest {
    pub messages: Vec<ChatMessage>,
    pub active_row_id: Option<i64>,
    pub project_id: Option<i64>,
    pub active_row_title: Option<String>,
    pub project_title: Option<String>,
    /// Vendor category of the active row, when the service records one.
    pub active_row_category: Option<String>,
}

impl PlanRequest {
    pub fn latest_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.trim())
    }
}

pub trait PlanGenerator: Send + Sync {
    fn name(&self) -> &str;

    fn generate<'a>(
        &'a self,
        request: &'a PlanRequest,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<Plan, PlanError>> + Send + 'a>>;
}

/// Try the LLM first; any failure (or no LLM at all) falls through to rules.
pub struct FallbackPlanGenerator {
    primary: Option<Box<dyn PlanGenerator>>,
    fallback: RuleBasedPlanner,
}

impl FallbackPlanGenerator {
    pub fn new(primary: Option<Box<dyn PlanGenerator>>, fallback: RuleBasedPlanner) -> Self {
        Self { primary, fallback }
    }

    pub fn from_config(config: &Config) -> Self {
        let primary = if config.planner.is_usable() {
            Some(Box::new(LlmPlanGenerator::new(&config.planner)) as Box<dyn PlanGenerator>)
        } else {
            tracing::info!("LLM planner disabled or unconfigured; using rule-based planner only");
            None
        };
        Self::new(
            primary,
            RuleBasedPlanner::new(config.outreach.default_vendor_limit),
        )
    }

    pub fn into_shared(self) -> Arc<dyn PlanGenerator> {
        Arc::new(self)
    }
}

impl PlanGenerator for FallbackPlanGenerator {
    fn name(&self) -> &str {
        "fallback"
    }

    fn generate<'a>(
        &'a self,
        request: &'a PlanRequest,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<Plan, PlanError>> + Send + 'a>> {
        Box::pin(async move {
            if let Some(primary) = &self.primary {
                match primary.generate(request, cancel).await {
                    Ok(plan) => return Ok(plan),
                    Err(err) => {
                        tracing::warn!(
                            generator = primary.name(),
                            error = %err,
                            "Plan generation failed; falling back to rules"
                        );
                    }
                }
            }
            self.fallback.generate(request, cancel).await
        })
    }
}
