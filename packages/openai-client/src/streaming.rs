//! Server-sent events for streamed chat completions.
//!
//! Bytes are decoded incrementally: a character split across network chunks
//! is held back, complete lines are cut off, and each `data:` line becomes a
//! content delta. Empty deltas are dropped and `data: [DONE]` ends the stream.

use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use serde::Deserialize;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::{OpenAIError, Result};
use crate::types::truncate_to_char_boundary;

const CHAT_PATH: &str = "chat/completions";

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Delta,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, PartialEq)]
pub(crate) enum SseEvent {
    Delta(String),
    Done,
}

/// Incremental line decoder over raw SSE bytes.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    text: String,
    carry: Vec<u8>,
}

impl SseDecoder {
    /// Append bytes and return the events of every line they complete.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Result<Vec<SseEvent>> {
        self.carry.extend_from_slice(bytes);
        let valid = match std::str::from_utf8(&self.carry) {
            Ok(text) => text.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => return Err(OpenAIError::Decode(format!("invalid UTF-8 in stream: {e}"))),
        };
        let rest = self.carry.split_off(valid);
        let complete = std::mem::replace(&mut self.carry, rest);
        let complete = String::from_utf8(complete).map_err(|e| OpenAIError::Decode(e.to_string()))?;
        self.text.push_str(&complete);

        let mut events = Vec::new();
        while let Some(pos) = self.text.find('\n') {
            let line: String = self.text.drain(..=pos).collect();
            if let Some(event) = parse_line(line.trim())? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Decode a last line that arrived without a newline.
    pub(crate) fn finish(&mut self) -> Result<Option<SseEvent>> {
        let line = std::mem::take(&mut self.text);
        parse_line(line.trim())
    }
}

/// Comments, `event:`, `id:` and blank lines carry nothing.
fn parse_line(line: &str) -> Result<Option<SseEvent>> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(Some(SseEvent::Done));
    }

    let chunk: StreamChunk = serde_json::from_str(data).map_err(|e| {
        OpenAIError::Decode(format!(
            "stream chunk: {e} (data: {})",
            truncate_to_char_boundary(data, 200)
        ))
    })?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty())
        .map(SseEvent::Delta))
}

/// Content deltas of one streamed chat completion.
///
/// Yields at most one error, after which the stream ends.
pub struct ChatCompletionStream {
    bytes: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: SseDecoder,
    ready: VecDeque<String>,
    finished: bool,
}

impl ChatCompletionStream {
    pub(crate) fn new(bytes: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static) -> Self {
        Self {
            bytes: bytes.boxed(),
            decoder: SseDecoder::default(),
            ready: VecDeque::new(),
            finished: false,
        }
    }

    fn absorb(&mut self, events: impl IntoIterator<Item = SseEvent>) {
        for event in events {
            match event {
                SseEvent::Delta(delta) => self.ready.push_back(delta),
                SseEvent::Done => {
                    self.finished = true;
                    break;
                }
            }
        }
    }
}

impl Stream for ChatCompletionStream {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(delta) = this.ready.pop_front() {
                return Poll::Ready(Some(Ok(delta)));
            }
            if this.finished {
                return Poll::Ready(None);
            }

            let decoded = match this.bytes.poll_next_unpin(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(bytes))) => this.decoder.push(&bytes),
                Poll::Ready(Some(Err(source))) => Err(OpenAIError::Transport {
                    path: CHAT_PATH,
                    source,
                }),
                Poll::Ready(None) => {
                    this.finished = true;
                    this.decoder.finish().map(|last| last.into_iter().collect())
                }
            };

            match decoded {
                Ok(events) => this.absorb(events),
                Err(e) => {
                    this.finished = true;
                    this.ready.clear();
                    return Poll::Ready(Some(Err(e)));
                }
            }
        }
    }
}
