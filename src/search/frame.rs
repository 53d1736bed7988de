use super::types::{CompleteFrame, SearchBatch};
use serde_json::Value;

/// Byte-level line splitter. Text is only decoded once a whole line is
/// available, so a multi-byte character split across chunks survives.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Next complete line without its `\n` / `\r\n` terminator.
    pub fn next_line(&mut self) -> Option<String> {
        let newline = self.buffer.iter().position(|b| *b == b'\n')?;
        let remaining = self.buffer.split_off(newline + 1);
        let mut line = std::mem::replace(&mut self.buffer, remaining);
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Whatever is left once the input has ended.
    pub fn take_remainder(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let mut line = std::mem::take(&mut self.buffer);
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchFrame {
    Batch(SearchBatch),
    Complete(CompleteFrame),
}

/// Decode one `data:` line. Blank lines, other SSE fields and anything that
/// is not a recognizable frame yield `None`.
pub fn decode_line(line: &str) -> Option<SearchFrame> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let Some(payload) = trimmed.strip_prefix("data:") else {
        tracing::debug!(line = trimmed, "Ignoring non-data search stream line");
        return None;
    };

    let value: Value = match serde_json::from_str(payload.trim()) {
        Ok(value) => value,
        Err(err) => {
            tracing::debug!(error = %err, "Dropping malformed search frame");
            return None;
        }
    };

    if value.get("event").and_then(Value::as_str) == Some("complete") {
        return match serde_json::from_value(value) {
            Ok(complete) => Some(SearchFrame::Complete(complete)),
            Err(err) => {
                tracing::debug!(error = %err, "Dropping malformed complete frame");
                None
            }
        };
    }

    match serde_json::from_value(value) {
        Ok(batch) => Some(SearchFrame::Batch(batch)),
        Err(err) => {
            tracing::debug!(error = %err, "Dropping unrecognized search frame");
            None
        }
    }
}
