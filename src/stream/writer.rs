use super::events::{Event, EventFrame};
use crate::error::StreamError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Single writer for one session's outbound events.
///
/// Frames reach the receiver in emission order. Once a terminal event has
/// been written the writer refuses further events; if the receiver is gone
/// the session's cancellation token is fired so in-flight calls unwind.
#[derive(Debug)]
pub struct EventWriter {
    sender: mpsc::Sender<EventFrame>,
    terminated: bool,
    cancel: CancellationToken,
}

impl EventWriter {
    pub fn channel(
        capacity: usize,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<EventFrame>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender,
                terminated: false,
                cancel,
            },
            receiver,
        )
    }

    pub async fn emit(&mut self, event: Event) -> Result<(), StreamError> {
        if self.terminated {
            tracing::debug!(event = event.name(), "Dropping event after terminal event");
            return Err(StreamError::Closed);
        }
        let terminal = event.is_terminal();
        let frame = event.to_frame();

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(StreamError::Disconnected),
            sent = self.sender.send(frame) => match sent {
                Ok(()) => {
                    if terminal {
                        self.terminated = true;
                    }
                    Ok(())
                }
                Err(_) => {
                    tracing::debug!("Event consumer went away; cancelling session");
                    self.cancel.cancel();
                    Err(StreamError::Disconnected)
                }
            },
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Drop the sending half; the receiver sees end-of-stream once drained.
    pub fn close(self) {
        drop(self.sender);
    }
}
