//! Server-Sent Events link used by the alert feed.
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use futures::StreamExt as _;
use tracing::debug;

use crate::connection::{TransportConnector, TransportLink};
use crate::errors::TransportError;

type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static>>;

/// One dispatched event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// `event:` field; `None` means the default `message` type.
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

impl SseEvent {
    /// Whether this is a plain `message` event (named or unnamed).
    pub fn is_message(&self) -> bool {
        matches!(self.event.as_deref(), None | Some("message"))
    }
}

/// Incremental decoder; bytes may arrive split at any position.
#[derive(Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    /// Bytes of `buf` already known to hold no complete separator.
    scanned: usize,
}

impl SseDecoder {
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some((end, delim)) = block_end(&self.buf, self.scanned) {
            let block: Vec<u8> = self.buf.drain(..end + delim).take(end).collect();
            self.scanned = 0;
            if let Some(event) = parse_block(&block) {
                events.push(event);
            }
        }
        // A separator is at most 4 bytes, so only its tail can straddle the
        // next chunk.
        self.scanned = self.buf.len().saturating_sub(3);
        events
    }
}

/// Position and length of the first blank-line separator at or after `from`.
fn block_end(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    (from..buf.len()).find_map(|i| {
        let rest = &buf[i..];
        if rest.starts_with(b"\r\n\r\n") {
            Some((i, 4))
        } else if rest.starts_with(b"\n\n") {
            Some((i, 2))
        } else {
            None
        }
    })
}

fn parse_block(block: &[u8]) -> Option<SseEvent> {
    let text = String::from_utf8_lossy(block);
    let mut event = None;
    let mut id = None;
    let mut data: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event = Some(value.to_string()),
            "data" => data.push(value),
            "id" => id = Some(value.to_string()),
            _ => {}
        }
    }
    if data.is_empty() {
        return None;
    }
    Some(SseEvent {
        event,
        data: data.join("\n"),
        id,
    })
}

/// Connector for `text/event-stream` endpoints.
#[derive(Clone)]
pub struct SseConnector {
    client: reqwest::Client,
}

impl SseConnector {
    /// `connect_timeout` bounds only connection setup; the stream itself is
    /// long-lived.
    pub fn new(connect_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportError::connect("<client>", format!("failed to build client: {e}")))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl TransportConnector for SseConnector {
    async fn open(&self, url: &str) -> Result<Box<dyn TransportLink>, TransportError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| TransportError::connect(url, format!("event stream request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::connect(
                url,
                format!("event stream rejected with status {status}"),
            ));
        }
        debug!(%url, %status, "event stream open");
        Ok(Box::new(SseLink {
            bytes: Box::pin(response.bytes_stream()),
            decoder: SseDecoder::default(),
            pending: VecDeque::new(),
        }))
    }
}

struct SseLink {
    bytes: ByteStream,
    decoder: SseDecoder,
    pending: VecDeque<String>,
}

#[async_trait::async_trait]
impl TransportLink for SseLink {
    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            if let Some(data) = self.pending.pop_front() {
                return Some(Ok(data));
            }
            match self.bytes.next().await? {
                Ok(chunk) => {
                    for event in self.decoder.push_chunk(&chunk) {
                        if event.is_message() && !event.data.trim().is_empty() {
                            self.pending.push_back(event.data);
                        } else {
                            debug!(event = ?event.event, "skipping non-message event");
                        }
                    }
                }
                Err(err) => {
                    return Some(Err(TransportError::io(format!("event stream read failed: {err}"))));
                }
            }
        }
    }

    async fn send(&mut self, _text: String) -> Result<(), TransportError> {
        Err(TransportError::Unsupported(
            "event streams are receive-only".into(),
        ))
    }

    async fn close(&mut self) {
        self.pending.clear();
        self.bytes = Box::pin(futures::stream::empty::<Result<bytes::Bytes, reqwest::Error>>());
    }
}
