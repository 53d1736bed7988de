use crate::backend::Row;
use crate::planner::ActionKind;
use crate::search::{ProviderStatus, SearchResult};
use serde::Serialize;

/// Everything a consumer can observe about a session. The consumer rebuilds
/// its view of the conversation from these alone.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Event {
    AssistantMessage {
        text: String,
    },
    ActionStarted {
        #[serde(rename = "type")]
        action: ActionKind,
        index: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        row_id: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        query: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        category: Option<String>,
    },
    RowCreated {
        row: Row,
    },
    RowUpdated {
        row: Row,
    },
    SearchResults {
        row_id: i64,
        results: Vec<SearchResult>,
        provider_statuses: Vec<ProviderStatus>,
        more_incoming: bool,
        provider: String,
    },
    OutreachTriggered {
        row_id: i64,
        vendors_contacted: u64,
        category: String,
    },
    Status {
        message: String,
    },
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        action_index: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        action: Option<ActionKind>,
    },
    Done {
        row_id: Option<i64>,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AssistantMessage { .. } => "assistant_message",
            Self::ActionStarted { .. } => "action_started",
            Self::RowCreated { .. } => "row_created",
            Self::RowUpdated { .. } => "row_updated",
            Self::SearchResults { .. } => "search_results",
            Self::OutreachTriggered { .. } => "outreach_triggered",
            Self::Status { .. } => "status",
            Self::Error { .. } => "error",
            Self::Done { .. } => "done",
        }
    }

    /// `done` and `error` close the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Done { .. })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            action_index: None,
            action: None,
        }
    }

    pub fn status(message: impl Into<String>) -> Self {
        Self::Status {
            message: message.into(),
        }
    }

    pub fn to_frame(&self) -> EventFrame {
        let data = serde_json::to_value(self).unwrap_or_else(|err| {
            serde_json::json!({ "message": format!("failed to encode {} event: {err}", self.name()) })
        });
        EventFrame {
            name: self.name(),
            data,
        }
    }
}

/// One named frame ready for the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct EventFrame {
    pub name: &'static str,
    pub data: serde_json::Value,
}

impl EventFrame {
    pub fn to_sse(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.name, self.data)
    }
}
