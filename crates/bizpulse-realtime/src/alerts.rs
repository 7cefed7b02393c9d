//! Newest-first alert feed fed by the `/alerts/sse` event stream.
use std::collections::VecDeque;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::connection::{Connection, ReadyState, TransportConnector};
use crate::errors::ClientError;
use crate::sse::SseConnector;

/// One pushed notification.
#[derive(Clone, Debug, PartialEq)]
pub struct AlertEvent {
    pub message: String,
    /// Every other member the server sent (for example `id`).
    pub fields: Map<String, Value>,
}

impl AlertEvent {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fields: Map::new(),
        }
    }

    /// Decodes the `data` of one event. Non-object payloads yield `None`.
    pub fn from_data(data: &str) -> Option<Self> {
        let value: Value = match serde_json::from_str(data) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "dropping malformed alert");
                return None;
            }
        };
        let Value::Object(mut fields) = value else {
            warn!("dropping non-object alert");
            return None;
        };
        let message = match fields.remove("message") {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        Some(Self { message, fields })
    }

    pub fn id(&self) -> Option<&str> {
        self.fields.get("id").and_then(Value::as_str)
    }
}

/// Alert list, newest first. Unbounded unless a limit is set.
#[derive(Clone, Debug, Default)]
pub struct AlertFeed {
    events: VecDeque<AlertEvent>,
    limit: Option<usize>,
}

impl AlertFeed {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            events: VecDeque::new(),
            limit: limit.filter(|l| *l > 0),
        }
    }

    pub fn push(&mut self, event: AlertEvent) {
        self.events.push_front(event);
        if let Some(limit) = self.limit {
            self.events.truncate(limit);
        }
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &AlertEvent> + '_ {
        self.events.iter()
    }

    pub fn latest(&self) -> Option<&AlertEvent> {
        self.events.front()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

/// Event-stream connection plus the feed it fills.
pub struct AlertStream<C = SseConnector> {
    connection: Connection<C>,
    feed: AlertFeed,
}

impl AlertStream<SseConnector> {
    /// Creates a disconnected stream using the real SSE connector.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let connector = SseConnector::new(config.request_timeout)?;
        Ok(Self::new(
            connector,
            config.event_buffer_capacity,
            config.alert_limit,
        ))
    }
}

impl<C: TransportConnector> AlertStream<C> {
    pub fn new(connector: C, capacity: usize, limit: Option<usize>) -> Self {
        Self {
            connection: Connection::new(connector, capacity),
            feed: AlertFeed::new(limit),
        }
    }

    /// Points the stream at `url`, or disconnects with `None`.
    pub async fn open(&mut self, url: Option<String>) {
        self.connection.set_url(url).await;
    }

    pub async fn close(&mut self) {
        self.connection.close().await;
    }

    pub fn is_open(&self) -> bool {
        self.connection.status() == ReadyState::Open
    }

    pub fn status(&self) -> ReadyState {
        self.connection.status()
    }

    /// Waits for the next alert and records it at the front of the feed.
    ///
    /// Malformed events are skipped. Returns `None` once the stream ends.
    pub async fn next_alert(&mut self) -> Option<&AlertEvent> {
        loop {
            let data = self.connection.next_message().await?;
            if let Some(event) = AlertEvent::from_data(&data) {
                debug!(id = ?event.id(), "alert received");
                self.feed.push(event);
                return self.feed.latest();
            }
        }
    }

    pub fn feed(&self) -> &AlertFeed {
        &self.feed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::tests::{FakeConnector, wait_for_status};

    #[test]
    fn feed_is_newest_first() {
        let mut feed = AlertFeed::default();
        feed.push(AlertEvent::new("E1"));
        feed.push(AlertEvent::new("E2"));
        let messages: Vec<_> = feed.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["E2", "E1"]);
    }

    #[test]
    fn feed_keeps_duplicates_and_honours_limit() {
        let mut feed = AlertFeed::new(Some(2));
        for msg in ["a", "a", "b"] {
            feed.push(AlertEvent::new(msg));
        }
        let messages: Vec<_> = feed.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["b", "a"]);
    }

    #[test]
    fn decodes_message_and_extra_fields() {
        let event = AlertEvent::from_data(r#"{"id":"alert-3","message":"Settlement delayed"}"#)
            .expect("event");
        assert_eq!(event.message, "Settlement delayed");
        assert_eq!(event.id(), Some("alert-3"));
        assert!(!event.fields.contains_key("message"));

        let no_message = AlertEvent::from_data(r#"{"id":"x"}"#).expect("event");
        assert_eq!(no_message.message, "");
        assert!(AlertEvent::from_data("not json").is_none());
        assert!(AlertEvent::from_data("[1]").is_none());
    }

    #[tokio::test]
    async fn stream_prepends_alerts_and_skips_malformed_ones() {
        let connector = FakeConnector::default();
        let probe = connector.probe.clone();
        let mut alerts = AlertStream::new(connector, 8, None);
        let mut status = alerts.connection.watch_status();
        alerts.open(Some("http://h/alerts/sse".into())).await;
        wait_for_status(&mut status, ReadyState::Open).await;
        assert!(alerts.is_open());

        probe.push(r#"{"message":"E1"}"#);
        probe.push("garbage");
        probe.push(r#"{"message":"E2"}"#);
        assert_eq!(alerts.next_alert().await.map(|e| e.message.clone()).as_deref(), Some("E1"));
        assert_eq!(alerts.next_alert().await.map(|e| e.message.clone()).as_deref(), Some("E2"));

        let messages: Vec<_> = alerts.feed().iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["E2", "E1"]);

        alerts.close().await;
        assert!(!alerts.is_open());
        assert_eq!(alerts.feed().len(), 2);
        assert_eq!(probe.closed(), 1);
    }
}
