//! Minimal Server-Sent Events decoder for the `/sse/changes` feed.

use async_stream::stream;
use futures::StreamExt;
use reqwest::Response;
use tracing::{debug, warn};

use crate::{
    dao::{query::ChangeEvent, session_store::ChangeStream},
    dto::sse::CHANGE_EVENT,
};

/// One dispatched SSE message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Splits a byte stream into frames separated by blank lines.
#[derive(Debug, Default)]
pub(super) struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    /// Feed a chunk and return every frame it completed.
    pub(super) fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend(chunk.iter().copied().filter(|byte| *byte != b'\r'));

        let mut frames = Vec::new();
        while let Some(end) = self.buffer.windows(2).position(|pair| pair == b"\n\n") {
            let raw = self.buffer.drain(..end + 2).collect::<Vec<_>>();
            match std::str::from_utf8(&raw) {
                Ok(text) => frames.extend(parse_frame(text)),
                Err(err) => warn!(error = %err, "dropping non utf-8 SSE frame"),
            }
        }
        frames
    }
}

/// Parse the `event:`/`data:` lines of one frame. Comment-only frames yield nothing.
pub(super) fn parse_frame(text: &str) -> Option<SseFrame> {
    let mut event = None;
    let mut data: Option<String> = None;

    for line in text.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => event = Some(value.to_string()),
            "data" => match data.as_mut() {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(value);
                }
                None => data = Some(value.to_string()),
            },
            _ => {}
        }
    }

    data.map(|data| SseFrame { event, data })
}

/// Turn an open `/sse/changes` response into a stream of change events.
/// The stream ends when the connection drops.
pub(super) fn change_stream(response: Response) -> ChangeStream {
    let events = stream! {
        let mut body = Box::pin(response.bytes_stream());
        let mut decoder = FrameDecoder::default();

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    warn!(error = %err, "change feed connection lost");
                    break;
                }
            };

            for frame in decoder.push(&chunk) {
                if frame.event.as_deref() != Some(CHANGE_EVENT) {
                    debug!(event = ?frame.event, "ignoring SSE frame");
                    continue;
                }
                match serde_json::from_str::<ChangeEvent>(&frame.data) {
                    Ok(event) => yield event,
                    Err(err) => warn!(error = %err, "skipping undecodable change event"),
                }
            }
        }
    };

    events.boxed()
}
