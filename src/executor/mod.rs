//! Sequential plan interpreter. Runs actions one at a time against the
//! request/search service and narrates progress through the session's
//! event writer.

mod constraints;

pub use constraints::{normalize_constraints, service_hints};

use crate::backend::{BackendClient, RowDraft, RowPatch};
use crate::error::{EngineError, ExecutionError, HttpError};
use crate::planner::{Action, ActionKind};
use crate::search::{BatchSink, ConsolidatedSearchResult, SearchBatch, aggregate};
use crate::stream::{Event, EventWriter};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// State threaded through one plan. Owned by a single session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Headers forwarded on every service call (caller's `Authorization`).
    pub headers: BTreeMap<String, String>,
    pub last_row_id: Option<i64>,
    pub project_id: Option<i64>,
}

impl ExecutionContext {
    pub fn new(
        headers: BTreeMap<String, String>,
        last_row_id: Option<i64>,
        project_id: Option<i64>,
    ) -> Self {
        Self {
            headers,
            last_row_id,
            project_id,
        }
    }

    pub fn resolve_row_id(&self, explicit: Option<i64>) -> Option<i64> {
        explicit.or(self.last_row_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Completed,
    /// The action at `index` failed; its `error` event has been written.
    Halted { index: usize },
}

pub struct ActionExecutor {
    backend: Arc<BackendClient>,
    default_vendor_limit: u32,
}

impl ActionExecutor {
    pub fn new(backend: Arc<BackendClient>, default_vendor_limit: u32) -> Self {
        Self {
            backend,
            default_vendor_limit,
        }
    }

    /// Run `actions` in order. The first failing action gets one `error`
    /// event and nothing after it runs. Cancellation and consumer loss are
    /// returned as errors without emitting anything.
    pub async fn execute_plan(
        &self,
        actions: &[Action],
        ctx: &mut ExecutionContext,
        writer: &mut EventWriter,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome, EngineError> {
        for (index, action) in actions.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(HttpError::Cancelled.into());
            }
            tracing::info!(index, action = %action.kind(), "Executing action");

            match self.execute_action(index, action, ctx, writer, cancel).await {
                Ok(()) => {}
                Err(err) if err.is_disconnect() => return Err(err),
                Err(err) => {
                    tracing::warn!(
                        index,
                        action = %action.kind(),
                        error = %err,
                        "Action failed; halting plan"
                    );
                    writer
                        .emit(Event::Error {
                            message: err.to_string(),
                            action_index: Some(index),
                            action: Some(action.kind()),
                        })
                        .await?;
                    return Ok(ExecutionOutcome::Halted { index });
                }
            }
        }
        Ok(ExecutionOutcome::Completed)
    }

    async fn execute_action(
        &self,
        index: usize,
        action: &Action,
        ctx: &mut ExecutionContext,
        writer: &mut EventWriter,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        match action {
            Action::CreateRow {
                title,
                constraints,
                search_query,
                providers,
            } => {
                writer
                    .emit(Event::ActionStarted {
                        action: ActionKind::CreateRow,
                        index,
                        row_id: None,
                        title: Some(title.clone()),
                        query: search_query.clone(),
                        category: None,
                    })
                    .await?;

                let title = non_blank(Some(title.as_str()))
                    .or_else(|| non_blank(search_query.as_deref()))
                    .ok_or_else(|| ExecutionError::InvalidAction {
                        action: ActionKind::CreateRow.to_string(),
                        message: "title is empty".into(),
                    })?;
                let row_id = self
                    .create_active_row(title, constraints, ctx, writer, cancel)
                    .await?;

                self.chain_search(
                    index,
                    row_id,
                    search_query.as_deref(),
                    providers.as_deref(),
                    ctx,
                    writer,
                    cancel,
                )
                .await
            }

            Action::UpdateRow {
                row_id,
                title,
                constraints,
                search_query,
                providers,
            } => {
                let resolved = ctx.resolve_row_id(*row_id);
                writer
                    .emit(Event::ActionStarted {
                        action: ActionKind::UpdateRow,
                        index,
                        row_id: resolved,
                        title: title.clone(),
                        query: search_query.clone(),
                        category: None,
                    })
                    .await?;
                let row_id = match resolved {
                    Some(row_id) => {
                        self.update_active_row(
                            row_id,
                            title.as_deref(),
                            constraints.as_ref(),
                            ctx,
                            writer,
                            cancel,
                        )
                        .await?;
                        row_id
                    }
                    None => {
                        let title = non_blank(title.as_deref())
                            .or_else(|| non_blank(search_query.as_deref()))
                            .ok_or_else(|| missing_row(ActionKind::UpdateRow))?;
                        tracing::info!(title, "No active row to update; creating one");
                        let empty = BTreeMap::new();
                        let constraints = constraints.as_ref().unwrap_or(&empty);
                        self.create_active_row(title, constraints, ctx, writer, cancel)
                            .await?
                    }
                };

                self.chain_search(
                    index,
                    row_id,
                    search_query.as_deref(),
                    providers.as_deref(),
                    ctx,
                    writer,
                    cancel,
                )
                .await
            }

            Action::Search {
                row_id,
                query,
                providers,
            } => {
                let resolved = ctx.resolve_row_id(*row_id);
                writer
                    .emit(Event::ActionStarted {
                        action: ActionKind::Search,
                        index,
                        row_id: resolved,
                        title: None,
                        query: Some(query.clone()),
                        category: None,
                    })
                    .await?;
                let query = non_blank(Some(query.as_str())).ok_or_else(|| {
                    ExecutionError::InvalidAction {
                        action: ActionKind::Search.to_string(),
                        message: "query is empty".into(),
                    }
                })?;
                let row_id = match resolved {
                    Some(row_id) => row_id,
                    None => {
                        tracing::info!(query, "No active row to search; creating one");
                        self.create_active_row(query, &BTreeMap::new(), ctx, writer, cancel)
                            .await?
                    }
                };

                self.run_search(row_id, query, providers.as_deref(), ctx, writer, cancel)
                    .await?;
                ctx.last_row_id = Some(row_id);
                Ok(())
            }

            Action::VendorOutreach {
                row_id,
                category,
                vendor_limit,
            } => {
                let resolved = ctx.resolve_row_id(*row_id);
                writer
                    .emit(Event::ActionStarted {
                        action: ActionKind::VendorOutreach,
                        index,
                        row_id: resolved,
                        title: None,
                        query: None,
                        category: Some(category.clone()),
                    })
                    .await?;
                let row_id = resolved.ok_or_else(|| missing_row(ActionKind::VendorOutreach))?;
                let limit = vendor_limit.unwrap_or(self.default_vendor_limit);

                let contacted = self
                    .backend
                    .trigger_outreach(row_id, category, limit, &ctx.headers, cancel)
                    .await?;
                tracing::info!(row_id, category = category.as_str(), contacted, "Outreach triggered");
                writer
                    .emit(Event::OutreachTriggered {
                        row_id,
                        vendors_contacted: contacted,
                        category: category.clone(),
                    })
                    .await?;
                Ok(())
            }
        }
    }

    /// Create a row, announce it with `row_created` and make it the active row.
    async fn create_active_row(
        &self,
        title: &str,
        constraints: &BTreeMap<String, Value>,
        ctx: &mut ExecutionContext,
        writer: &mut EventWriter,
        cancel: &CancellationToken,
    ) -> Result<i64, EngineError> {
        let (is_service, service_category) = service_hints(constraints);
        let draft = RowDraft {
            title: title.to_string(),
            constraints: normalize_constraints(constraints),
            project_id: ctx.project_id,
            is_service,
            service_category,
        };

        let row = self.backend.create_row(&draft, &ctx.headers, cancel).await?;
        let row_id = row.id;
        writer.emit(Event::RowCreated { row }).await?;
        ctx.last_row_id = Some(row_id);
        Ok(row_id)
    }

    /// Patch the row and emit `row_updated`. With nothing to change the
    /// stored row is read back instead.
    async fn update_active_row(
        &self,
        row_id: i64,
        title: Option<&str>,
        constraints: Option<&BTreeMap<String, Value>>,
        ctx: &mut ExecutionContext,
        writer: &mut EventWriter,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let patch = RowPatch {
            title: non_blank(title).map(str::to_string),
            constraints: constraints.map(normalize_constraints),
        };
        let row = if patch.is_empty() {
            tracing::debug!(row_id, "Update carries no changes; reading row back");
            self.backend
                .fetch_row(row_id, &ctx.headers, cancel)
                .await?
                .ok_or_else(|| missing_row(ActionKind::UpdateRow))?
        } else {
            self.backend
                .patch_row(row_id, &patch, &ctx.headers, cancel)
                .await?
        };
        writer.emit(Event::RowUpdated { row }).await?;
        ctx.last_row_id = Some(row_id);
        Ok(())
    }

    /// Follow a create/update with a search when the action asked for one.
    #[allow(clippy::too_many_arguments)]
    async fn chain_search(
        &self,
        index: usize,
        row_id: i64,
        search_query: Option<&str>,
        providers: Option<&[String]>,
        ctx: &mut ExecutionContext,
        writer: &mut EventWriter,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let Some(query) = non_blank(search_query) else {
            return Ok(());
        };
        writer
            .emit(Event::ActionStarted {
                action: ActionKind::Search,
                index,
                row_id: Some(row_id),
                title: None,
                query: Some(query.to_string()),
                category: None,
            })
            .await?;
        self.run_search(row_id, query, providers, ctx, writer, cancel)
            .await?;
        ctx.last_row_id = Some(row_id);
        Ok(())
    }

    /// Stream one search into `search_results` events. Guarantees the
    /// consumer sees a final `search_results` with `more_incoming == false`.
    async fn run_search(
        &self,
        row_id: i64,
        query: &str,
        providers: Option<&[String]>,
        ctx: &ExecutionContext,
        writer: &mut EventWriter,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let deadline = self.backend.reliability().search_timeout();
        let mut sink = SearchEventSink {
            row_id,
            writer,
            closed: false,
        };

        let outcome = tokio::time::timeout(
            deadline,
            self.stream_search(row_id, query, providers, &ctx.headers, &mut sink, cancel),
        )
        .await;
        let closed = sink.closed;
        let writer = sink.writer;

        let (consolidated, timed_out) = match outcome {
            Ok(result) => (result?, false),
            Err(_elapsed) => {
                tracing::warn!(
                    row_id,
                    timeout_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                    "Search timed out; keeping partial results"
                );
                (ConsolidatedSearchResult::default(), true)
            }
        };

        tracing::info!(
            row_id,
            results = consolidated.results.len(),
            providers = consolidated.provider_statuses.len(),
            completed = consolidated.completed,
            "Search finished"
        );

        if !closed {
            writer
                .emit(Event::SearchResults {
                    row_id,
                    results: Vec::new(),
                    provider_statuses: Vec::new(),
                    more_incoming: false,
                    provider: "all".into(),
                })
                .await?;
        }
        if timed_out {
            writer
                .emit(Event::status("Search timed out; showing the results found so far."))
                .await?;
        } else if let Some(message) = non_blank(consolidated.user_message.as_deref()) {
            writer.emit(Event::status(message)).await?;
        }
        Ok(())
    }

    async fn stream_search(
        &self,
        row_id: i64,
        query: &str,
        providers: Option<&[String]>,
        headers: &BTreeMap<String, String>,
        sink: &mut SearchEventSink<'_>,
        cancel: &CancellationToken,
    ) -> Result<ConsolidatedSearchResult, EngineError> {
        let response = self
            .backend
            .open_search_stream(row_id, query, providers, headers, cancel)
            .await?;
        let body = std::pin::pin!(response.bytes_stream());
        aggregate(body, sink, cancel).await
    }
}

/// Forwards each search batch as a `search_results` delta.
struct SearchEventSink<'w> {
    row_id: i64,
    writer: &'w mut EventWriter,
    /// Whether the most recent delta said no more results are coming.
    closed: bool,
}

impl BatchSink for SearchEventSink<'_> {
    fn on_batch<'a>(
        &'a mut self,
        batch: &'a SearchBatch,
    ) -> Pin<Box<dyn Future<Output = Result<(), EngineError>> + Send + 'a>> {
        Box::pin(async move {
            self.writer
                .emit(Event::SearchResults {
                    row_id: self.row_id,
                    results: batch.results.clone(),
                    provider_statuses: batch.status.iter().cloned().collect(),
                    more_incoming: batch.more_incoming,
                    provider: batch.provider.clone(),
                })
                .await?;
            self.closed = !batch.more_incoming;
            Ok(())
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn missing_row(kind: ActionKind) -> ExecutionError {
    ExecutionError::MissingRow {
        action: kind.to_string(),
    }
}
