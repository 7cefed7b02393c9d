//! Realtime client for the BizPulse small-business dashboard.
//!
//! Two push channels feed the dashboard: a WebSocket chat socket that answers
//! questions with `chunk`/`final`/`error` frames, and a Server-Sent Events
//! stream of alerts. Both sit on a [`Connection`] that owns exactly one live
//! link per URL and drops frames from links it has already replaced.
//!
//! ```no_run
//! use bizpulse_realtime::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ClientError> {
//! let config = ClientConfig::from_env()?;
//! let mut chat = ChatSession::from_config(&config)?;
//! chat.open(Some(config.chat_url())).await;
//! chat.submit("How did sales do last week?")?;
//! while let Some(update) = chat.next_update().await {
//!     if matches!(update.frame, Frame::Final(_) | Frame::Error { .. }) {
//!         break;
//!     }
//! }
//! if let Some(answer) = chat.last_message() {
//!     println!("{}", answer.text);
//! }
//! # Ok(())
//! # }
//! ```

/// Alert feed over the event stream.
pub mod alerts;
/// REST endpoints and stale-on-error snapshots.
pub mod api;
/// Chat session: socket, query frames and history.
pub mod chat;
pub mod config;
/// Single-link connection manager and the transport traits it drives.
pub mod connection;
pub mod errors;
/// Chat frame decoding.
pub mod frame;
pub mod keywords;
pub mod message;
pub mod observability;
/// Common imports.
pub mod prelude;
/// Folding frames into the message list.
pub mod reassembler;
pub mod sse;
pub mod websocket;

pub use alerts::{AlertEvent, AlertFeed, AlertStream};
pub use api::{ApiClient, Snapshot};
pub use chat::{ChatSession, ChatUpdate};
pub use config::{ClientConfig, chat_url};
pub use connection::{Connection, ReadyState, TransportConnector, TransportLink};
pub use errors::{ClientError, TransportError};
pub use frame::{FinalAnswer, Frame, QueryFrame, decode_frame};
pub use keywords::{ReviewKeywords, extract_keywords, tokenize};
pub use message::{Message, Sender};
pub use observability::{LogSettings, init_observability, init_with};
pub use reassembler::{FoldOutcome, MessageLog, ReassemblyPolicy, fold_frames};
pub use sse::SseConnector;
pub use websocket::WebSocketConnector;
