//! Multi-provider streaming search: line framing over raw bytes, typed
//! frame decoding and incremental aggregation.

mod aggregator;
mod frame;
mod types;

pub use aggregator::{BatchSink, ConsolidatedSearchResult, aggregate};
pub use frame::{LineBuffer, SearchFrame, decode_line};
pub use types::{CompleteFrame, ProviderState, ProviderStatus, SearchBatch, SearchResult};
