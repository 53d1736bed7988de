use super::frame::{LineBuffer, SearchFrame, decode_line};
use super::types::{ProviderStatus, SearchBatch, SearchResult};
use crate::error::{EngineError, HttpError};
use futures_util::{Stream, StreamExt};
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// Receives each batch as it is decoded, before the next one is read.
pub trait BatchSink: Send {
    fn on_batch<'a>(
        &'a mut self,
        batch: &'a SearchBatch,
    ) -> Pin<Box<dyn Future<Output = Result<(), EngineError>> + Send + 'a>>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsolidatedSearchResult {
    pub results: Vec<SearchResult>,
    pub provider_statuses: Vec<ProviderStatus>,
    pub user_message: Option<String>,
    /// Whether the backend's `complete` frame was seen.
    pub completed: bool,
}

#[derive(Default)]
struct Accumulator {
    results: Vec<SearchResult>,
    statuses: Vec<ProviderStatus>,
}

impl Accumulator {
    async fn handle_line<K: BatchSink + ?Sized>(
        &mut self,
        line: &str,
        sink: &mut K,
    ) -> Result<Option<ConsolidatedSearchResult>, EngineError> {
        match decode_line(line) {
            None => Ok(None),
            Some(SearchFrame::Batch(batch)) => {
                tracing::debug!(
                    provider = batch.provider.as_str(),
                    results = batch.results.len(),
                    more_incoming = batch.more_incoming,
                    "Search batch"
                );
                self.results.extend(batch.results.iter().cloned());
                if let Some(status) = &batch.status {
                    self.statuses.push(status.clone());
                }
                sink.on_batch(&batch).await?;
                Ok(None)
            }
            Some(SearchFrame::Complete(complete)) => Ok(Some(ConsolidatedSearchResult {
                results: std::mem::take(&mut self.results),
                provider_statuses: complete
                    .provider_statuses
                    .unwrap_or_else(|| std::mem::take(&mut self.statuses)),
                user_message: complete.user_message,
                completed: true,
            })),
        }
    }

    fn best_effort(self) -> ConsolidatedSearchResult {
        ConsolidatedSearchResult {
            results: self.results,
            provider_statuses: self.statuses,
            user_message: None,
            completed: false,
        }
    }
}

/// Drive a chunked search stream to completion.
///
/// Returns at the first `complete` frame. If the stream ends (or breaks)
/// without one, whatever was accumulated is returned with
/// `completed == false`. Cancellation aborts with `HttpError::Cancelled`.
pub async fn aggregate<S, B, E, K>(
    mut stream: S,
    sink: &mut K,
    cancel: &CancellationToken,
) -> Result<ConsolidatedSearchResult, EngineError>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
    K: BatchSink + ?Sized,
{
    let mut buffer = LineBuffer::new();
    let mut acc = Accumulator::default();

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(HttpError::Cancelled.into()),
            next = stream.next() => next,
        };

        match next {
            None => break,
            Some(Err(err)) => {
                tracing::warn!(error = %err, "Search stream interrupted; keeping partial results");
                break;
            }
            Some(Ok(chunk)) => {
                buffer.push_chunk(chunk.as_ref());
                while let Some(line) = buffer.next_line() {
                    if let Some(done) = acc.handle_line(&line, sink).await? {
                        return Ok(done);
                    }
                }
            }
        }
    }

    if let Some(line) = buffer.take_remainder()
        && let Some(done) = acc.handle_line(&line, sink).await?
    {
        return Ok(done);
    }

    tracing::debug!(
        results = acc.results.len(),
        "Search stream ended without a complete frame"
    );
    Ok(acc.best_effort())
}
