//! Incremental parser for `text/event-stream` response bodies.

use anyhow::{anyhow, Result};
use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use std::fmt::Display;

/// A parsed server-sent event
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

struct ParserState {
    body: BoxStream<'static, Result<Bytes>>,
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    finished: bool,
}

impl ParserState {
    fn take_event(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() {
            self.event = None;
            return None;
        }
        let data = self.data.join("\n");
        self.data.clear();
        Some(SseEvent {
            event: self.event.take(),
            data,
        })
    }

    /// Consume one complete line from the buffer, returning an event when a blank line closes one
    fn next_line(&mut self) -> Option<Option<SseEvent>> {
        let newline = self.buffer.iter().position(|b| *b == b'\n')?;
        let raw: Vec<u8> = self.buffer.drain(..=newline).collect();
        // decode whole lines only; a chunk may end mid-character
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim_end_matches(|c: char| c == '\n' || c == '\r');

        if line.is_empty() {
            return Some(self.take_event());
        }
        if let Some(value) = line.strip_prefix("event:") {
            self.event = Some(value.trim_start().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            self.data.push(value.trim_start().to_string());
        }
        // comments (`:`) and unknown fields are ignored
        Some(None)
    }
}

/// Turn a chunked byte body into a stream of events
pub fn parse_sse<S, E>(body: S) -> impl Stream<Item = Result<SseEvent>>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display,
{
    let body = body
        .map(|chunk| chunk.map_err(|e| anyhow!("SSE stream error: {}", e)))
        .boxed();

    futures::stream::unfold(
        ParserState {
            body,
            buffer: Vec::new(),
            event: None,
            data: Vec::new(),
            finished: false,
        },
        |mut state| async move {
            loop {
                match state.next_line() {
                    Some(Some(event)) => return Some((Ok(event), state)),
                    Some(None) => continue,
                    None => {}
                }

                if state.finished {
                    return None;
                }

                match state.body.next().await {
                    Some(Ok(chunk)) => state.buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        state.finished = true;
                        return Some((Err(e), state));
                    }
                    None => {
                        state.finished = true;
                        // flush a trailing event that was not closed by a blank line
                        if !state.buffer.is_empty() {
                            state.buffer.push(b'\n');
                        }
                        state.buffer.push(b'\n');
                    }
                }
            }
        },
    )
}
