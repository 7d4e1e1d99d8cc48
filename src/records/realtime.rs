//! Server-sent event plumbing for live record subscriptions.
//!
//! The backend opens an event stream on `GET /api/realtime`, greets the
//! client with a `PB_CONNECT` event carrying its `clientId`, and only then
//! accepts `POST /api/realtime` to set the topics (`<collection>/*` or
//! `<collection>/<id>`) this client wants change events for.

use std::collections::VecDeque;

use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::RequestError;
use crate::BackendClient;

const CONNECT_EVENT: &str = "PB_CONNECT";

/// Largest event the decoder buffers while waiting for its blank line.
const MAX_EVENT_BYTES: usize = 1024 * 1024;

/// One decoded server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SseEvent {
    pub id: Option<String>,
    pub event: String,
    pub data: String,
}

/// An event grew past [`MAX_EVENT_BYTES`] without being terminated.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("server-sent event exceeds {limit} bytes")]
pub(crate) struct EventTooLarge {
    limit: usize,
}

/// Incremental decoder for a `text/event-stream` body.
#[derive(Debug)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
    // Bytes of `buffer` already known to hold no separator.
    scanned: usize,
    limit: usize,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_limit(MAX_EVENT_BYTES)
    }
}

impl SseDecoder {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            limit,
        }
    }

    /// Feeds a chunk and returns every event it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, EventTooLarge> {
        self.buffer.extend(chunk.iter().copied().filter(|byte| *byte != b'\r'));

        let mut events = Vec::new();
        loop {
            // A separator may straddle the previous chunk boundary.
            let from = self.scanned.saturating_sub(1);
            let Some(offset) = self.buffer[from..].windows(2).position(|pair| pair == b"\n\n") else {
                break;
            };
            let block: Vec<u8> = self.buffer.drain(..from + offset + 2).collect();
            self.scanned = 0;
            if let Some(event) = parse_block(&String::from_utf8_lossy(&block)) {
                events.push(event);
            }
        }
        self.scanned = self.buffer.len();

        if self.buffer.len() > self.limit {
            self.buffer.clear();
            self.scanned = 0;
            return Err(EventTooLarge { limit: self.limit });
        }

        Ok(events)
    }
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event = SseEvent::default();
    let mut data_lines: Vec<&str> = Vec::new();

    for line in block.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }

        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);

        match field {
            "event" => event.event = value.to_owned(),
            "data" => data_lines.push(value),
            "id" => event.id = Some(value.to_owned()),
            _ => {}
        }
    }

    if event.event.is_empty() && data_lines.is_empty() {
        return None;
    }

    if event.event.is_empty() {
        event.event = "message".to_owned();
    }
    event.data = data_lines.join("\n");

    Some(event)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectPayload {
    client_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscribeRequest<'a> {
    client_id: &'a str,
    subscriptions: &'a [String],
}

/// An open realtime connection with its topics already registered.
pub(crate) struct RealtimeStream {
    body: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    decoder: SseDecoder,
    pending: VecDeque<SseEvent>,
}

impl RealtimeStream {
    /// Next event from the server; `None` once the server closed the stream.
    pub async fn next_event(&mut self) -> Option<SseEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }

            match self.body.next().await {
                Some(Ok(chunk)) => match self.decoder.push(&chunk) {
                    Ok(events) => self.pending.extend(events),
                    Err(error) => {
                        warn!(%error, "dropping realtime stream");
                        return None;
                    }
                },
                Some(Err(error)) => {
                    debug!(%error, "realtime stream interrupted");
                    return None;
                }
                None => return None,
            }
        }
    }
}

impl BackendClient {
    /// Opens the event stream and registers `topics` on it.
    pub(crate) async fn realtime_connect(
        &self,
        topics: &[String],
    ) -> Result<RealtimeStream, RequestError> {
        let url = format!("{}/api/realtime", self.base_url());

        let response = match self.request_event_stream(&url).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => return Err(RequestError::from_status(response.status())),
            Err(error) => return Err(RequestError::from_transport(&error)),
        };

        let mut stream = RealtimeStream {
            body: response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                .boxed(),
            decoder: SseDecoder::default(),
            pending: VecDeque::new(),
        };

        let client_id = loop {
            let Some(event) = stream.next_event().await else {
                return Err(RequestError::Unreachable);
            };

            if event.event == CONNECT_EVENT {
                let payload: ConnectPayload = serde_json::from_str(&event.data)
                    .map_err(|error| RequestError::ParseError(error.to_string()))?;
                break payload.client_id;
            }
        };

        let request = SubscribeRequest {
            client_id: &client_id,
            subscriptions: topics,
        };

        match self.request_post_json(&url, &request).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => return Err(RequestError::from_status(response.status())),
            Err(error) => return Err(RequestError::from_transport(&error)),
        }

        debug!(%client_id, ?topics, "realtime subscription registered");

        Ok(stream)
    }
}
