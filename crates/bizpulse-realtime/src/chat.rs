use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::connection::{Connection, ReadyState, TransportConnector};
use crate::errors::ClientError;
use crate::frame::{Frame, QueryFrame, decode_frame};
use crate::message::Message;
use crate::reassembler::{FoldOutcome, MessageLog, ReassemblyPolicy};
use crate::websocket::WebSocketConnector;

/// Result of folding one incoming frame.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatUpdate {
    pub frame: Frame,
    pub outcome: FoldOutcome,
}

/// Chat socket plus the message history it produces.
pub struct ChatSession<C = WebSocketConnector> {
    session_id: uuid::Uuid,
    connection: Connection<C>,
    log: MessageLog,
    business_id: Option<String>,
}

impl ChatSession<WebSocketConnector> {
    /// Creates a closed session over a real WebSocket connector.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        Ok(Self::new(
            WebSocketConnector,
            config.event_buffer_capacity,
            config.policy,
        )
        .history_limit(config.chat_history_limit)
        .business_id(config.business_id.clone()))
    }
}

impl<C: TransportConnector> ChatSession<C> {
    pub fn new(connector: C, capacity: usize, policy: ReassemblyPolicy) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4(),
            connection: Connection::new(connector, capacity),
            log: MessageLog::new(policy),
            business_id: None,
        }
    }

    /// Business id attached to every outgoing query.
    pub fn business_id(mut self, business_id: Option<String>) -> Self {
        self.business_id = business_id;
        self
    }

    pub fn history_limit(mut self, limit: Option<usize>) -> Self {
        self.log = self.log.with_limit(limit);
        self
    }

    pub fn session_id(&self) -> uuid::Uuid {
        self.session_id
    }

    /// Opens the socket at `url`, or closes it with `None`.
    pub async fn open(&mut self, url: Option<String>) {
        info!(session_id = %self.session_id, url = ?url, "chat connection target changed");
        self.connection.set_url(url).await;
    }

    pub async fn close(&mut self) {
        self.open(None).await;
    }

    pub fn status(&self) -> ReadyState {
        self.connection.status()
    }

    pub fn watch_status(&self) -> tokio::sync::watch::Receiver<ReadyState> {
        self.connection.watch_status()
    }

    /// Sends `text` as a query frame and records it as the user's message.
    ///
    /// Blank input is rejected. While the socket is not open nothing is sent
    /// or recorded and `Ok(false)` is returned.
    pub fn submit(&mut self, text: &str) -> Result<bool, ClientError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::Validation("message must not be empty".into()));
        }
        if !self.connection.is_open() {
            debug!(session_id = %self.session_id, status = ?self.status(), "query not sent: socket not open");
            return Ok(false);
        }
        let frame = QueryFrame::new(text)
            .business_id(self.business_id.as_deref())
            .to_json()?;
        let sent = self.connection.send(frame);
        if sent {
            self.log.push_user(text);
        }
        debug!(session_id = %self.session_id, sent, "query submitted");
        Ok(sent)
    }

    /// Waits for the next frame and folds it into the history.
    ///
    /// Returns `None` once the socket has closed or when no URL is set.
    pub async fn next_update(&mut self) -> Option<ChatUpdate> {
        let text = self.connection.next_message().await?;
        let frame = decode_frame(&text);
        let outcome = self.log.apply(&frame);
        Some(ChatUpdate { frame, outcome })
    }

    pub fn messages(&self) -> impl ExactSizeIterator<Item = &Message> + '_ {
        self.log.messages()
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.log.last()
    }

    pub fn history(&self) -> &MessageLog {
        &self.log
    }
}
