//! Outbound event stream: typed events, SSE framing and the single-writer
//! channel every session emits through.

mod events;
mod writer;

pub use events::{Event, EventFrame};
pub use writer::EventWriter;
