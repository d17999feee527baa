//! Reassembly of logical JSON messages from text chunks.
//!
//! A message is complete once the buffered text parses as one JSON document. Chunks that end
//! mid-document are held until the rest arrives.

use serde_json::Value;

#[derive(Debug, PartialEq)]
pub enum Assembled {
    Complete(Value),
    /// More chunks are needed.
    Partial,
    /// The buffered text can never become valid JSON; it has been discarded.
    Malformed(String),
    /// A leftover partial could not be continued by the new chunk, which parsed on its own. The
    /// stale bytes were discarded.
    Resynced { message: Value, discarded: usize },
}

#[derive(Debug)]
pub struct FrameAssembler {
    buffer: String,
    max_bytes: usize,
}

impl FrameAssembler {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            buffer: String::new(),
            max_bytes,
        }
    }

    pub fn push(&mut self, chunk: &str) -> Assembled {
        if self.buffer.len() + chunk.len() > self.max_bytes {
            let dropped = self.buffer.len() + chunk.len();
            self.buffer.clear();
            return Assembled::Malformed(format!(
                "message exceeds {} bytes ({dropped} buffered)",
                self.max_bytes
            ));
        }
        let leftover = self.buffer.len();
        self.buffer.push_str(chunk);
        match self.parse_buffer() {
            Assembled::Malformed(_) if leftover > 0 => match self.push(chunk) {
                Assembled::Complete(message) => Assembled::Resynced {
                    message,
                    discarded: leftover,
                },
                Assembled::Partial => {
                    // The chunk opened a new document; the old fragment is gone either way.
                    Assembled::Malformed(format!(
                        "incomplete message abandoned ({leftover} bytes)"
                    ))
                }
                other => other,
            },
            outcome => outcome,
        }
    }

    fn parse_buffer(&mut self) -> Assembled {
        if self.buffer.trim().is_empty() {
            self.buffer.clear();
            return Assembled::Partial;
        }
        match serde_json::from_str::<Value>(&self.buffer) {
            Ok(value) => {
                self.buffer.clear();
                Assembled::Complete(value)
            }
            Err(err) if err.is_eof() => Assembled::Partial,
            Err(err) => {
                self.buffer.clear();
                Assembled::Malformed(err.to_string())
            }
        }
    }

    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

/// Split a decoded message into its correlation id, if it carries one.
pub fn response_id(message: &Value) -> Option<u64> {
    message.get("id").and_then(Value::as_u64)
}
