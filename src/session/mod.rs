//! One chat turn, start to finish: load context, obtain a plan, execute it
//! and close the event stream with exactly one terminal event.

use crate::backend::BackendClient;
use crate::config::Config;
use crate::error::{EngineError, HttpError};
use crate::executor::{ActionExecutor, ExecutionContext, ExecutionOutcome};
use crate::planner::{ChatMessage, FallbackPlanGenerator, PlanGenerator, PlanRequest};
use crate::stream::{Event, EventWriter};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Body of a chat turn. Accepts both camelCase and snake_case ids.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default, alias = "activeRowId")]
    pub active_row_id: Option<i64>,
    #[serde(default, alias = "projectId")]
    pub project_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    ContextLoaded,
    PlanReady,
    Executing(usize),
    Done,
    Error,
}

/// Titles and ids that survived context loading. Anything the service
/// reported missing is cleared.
#[derive(Debug, Default)]
struct LoadedContext {
    active_row_id: Option<i64>,
    active_row_title: Option<String>,
    active_row_category: Option<String>,
    project_id: Option<i64>,
    project_title: Option<String>,
}

pub struct SessionOrchestrator {
    backend: Arc<BackendClient>,
    planner: Arc<dyn PlanGenerator>,
    executor: ActionExecutor,
}

impl SessionOrchestrator {
    pub fn new(
        backend: Arc<BackendClient>,
        planner: Arc<dyn PlanGenerator>,
        default_vendor_limit: u32,
    ) -> Self {
        Self {
            executor: ActionExecutor::new(Arc::clone(&backend), default_vendor_limit),
            backend,
            planner,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(BackendClient::new(config)),
            FallbackPlanGenerator::from_config(config).into_shared(),
            config.outreach.default_vendor_limit,
        )
    }

    /// Run one session to completion and close `writer`. Never returns an
    /// error: failures become a single best-effort `error` event.
    pub async fn run(
        &self,
        request: ChatRequest,
        headers: BTreeMap<String, String>,
        mut writer: EventWriter,
    ) -> SessionState {
        let cancel = writer.cancel_token().clone();
        let session_id = Uuid::new_v4();
        tracing::info!(
            session = %session_id,
            active_row_id = request.active_row_id,
            project_id = request.project_id,
            messages = request.messages.len(),
            "Session started"
        );

        let state = match self
            .drive(&request, headers, &mut writer, &cancel, session_id)
            .await
        {
            Ok(state) => state,
            Err(err) if err.is_disconnect() => {
                tracing::info!(session = %session_id, "Session cancelled before completion");
                SessionState::Error
            }
            Err(err) => {
                tracing::error!(session = %session_id, error = %err, "Session failed");
                if !writer.is_terminated()
                    && let Err(emit_err) = writer.emit(Event::error(err.to_string())).await
                {
                    tracing::debug!(session = %session_id, error = %emit_err, "Could not report session failure");
                }
                SessionState::Error
            }
        };

        tracing::info!(session = %session_id, state = ?state, "Session finished");
        writer.close();
        state
    }

    async fn drive(
        &self,
        request: &ChatRequest,
        headers: BTreeMap<String, String>,
        writer: &mut EventWriter,
        cancel: &CancellationToken,
        session_id: Uuid,
    ) -> Result<SessionState, EngineError> {
        let mut state = SessionState::Init;

        let context = self.load_context(request, &headers, cancel).await?;
        transition(&mut state, SessionState::ContextLoaded, session_id);

        let plan_request = PlanRequest {
            messages: request.messages.clone(),
            active_row_id: context.active_row_id,
            project_id: context.project_id,
            active_row_title: context.active_row_title,
            project_title: context.project_title,
            active_row_category: context.active_row_category,
        };
        let plan = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(HttpError::Cancelled.into()),
            plan = self.planner.generate(&plan_request, cancel) => plan?,
        };
        tracing::info!(
            session = %session_id,
            generator = self.planner.name(),
            actions = plan.actions.len(),
            "Plan ready"
        );
        transition(&mut state, SessionState::PlanReady, session_id);

        if !plan.assistant_message.trim().is_empty() {
            writer
                .emit(Event::AssistantMessage {
                    text: plan.assistant_message.clone(),
                })
                .await?;
        }

        transition(&mut state, SessionState::Executing(0), session_id);
        let mut ctx = ExecutionContext::new(headers, context.active_row_id, context.project_id);
        match self
            .executor
            .execute_plan(&plan.actions, &mut ctx, writer, cancel)
            .await?
        {
            ExecutionOutcome::Completed => {}
            ExecutionOutcome::Halted { index } => {
                transition(&mut state, SessionState::Executing(index), session_id);
                transition(&mut state, SessionState::Error, session_id);
                return Ok(state);
            }
        }

        writer
            .emit(Event::Done {
                row_id: ctx.last_row_id,
            })
            .await?;
        transition(&mut state, SessionState::Done, session_id);
        Ok(state)
    }

    async fn load_context(
        &self,
        request: &ChatRequest,
        headers: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<LoadedContext, EngineError> {
        let mut context = LoadedContext::default();

        if let Some(row_id) = request.active_row_id {
            match self.backend.fetch_row(row_id, headers, cancel).await? {
                Some(row) => {
                    context.active_row_id = Some(row.id);
                    context.active_row_category = row.service_category().map(str::to_string);
                    context.active_row_title = Some(row.title).filter(|t| !t.is_empty());
                }
                None => {
                    tracing::warn!(row_id, "Active row not found; continuing without it");
                }
            }
        }

        if let Some(project_id) = request.project_id {
            match self.backend.fetch_project(project_id, headers, cancel).await? {
                Some(project) => {
                    context.project_id = Some(project.id);
                    context.project_title = Some(project.title).filter(|t| !t.is_empty());
                }
                None => {
                    tracing::warn!(project_id, "Project not found; continuing without it");
                }
            }
        }

        Ok(context)
    }
}

fn transition(state: &mut SessionState, next: SessionState, session_id: Uuid) {
    let from = *state;
    tracing::debug!(session = %session_id, from = ?from, to = ?next, "Session state");
    *state = next;
}
