//! Reactive single-link connection keyed by an optional URL.
//!
//! A `Connection` owns at most one live transport link. Pointing it at a new
//! URL (or at `None`) closes the current link before anything else happens,
//! and dropping the connection shuts the link down as well. There is no
//! reconnection policy: when the peer goes away the status becomes `Closed`
//! and the caller decides whether to supply the URL again.
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::TransportError;

/// Connection status exposed to the UI layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    #[default]
    Closed,
}

/// Opens transport links for a URL.
#[async_trait::async_trait]
pub trait TransportConnector: Send + Sync + 'static {
    async fn open(&self, url: &str) -> Result<Box<dyn TransportLink>, TransportError>;
}

/// One open, bidirectional (or receive-only) text link.
#[async_trait::async_trait]
pub trait TransportLink: Send {
    /// Waits for the next text message. `None` means the peer closed.
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;

    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Closes the link. Called exactly once per opened link.
    async fn close(&mut self);
}

enum LinkEvent {
    Message(String),
    Ended,
}

struct LiveLink {
    url: String,
    generation: u64,
    outbound: mpsc::Sender<String>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
    joined: bool,
    ended: bool,
}

/// Owner of a single transport link.
///
/// Dropping a `Connection` drops the shutdown signal of its live link; the
/// link task then closes the transport on its own.
pub struct Connection<C> {
    connector: Arc<C>,
    capacity: usize,
    status: Arc<watch::Sender<ReadyState>>,
    events_tx: mpsc::Sender<(u64, LinkEvent)>,
    events_rx: mpsc::Receiver<(u64, LinkEvent)>,
    live: Option<LiveLink>,
    generation: u64,
}

impl<C: TransportConnector> Connection<C> {
    /// Creates a disconnected connection. `capacity` bounds both the inbound
    /// and the outbound buffers and is clamped to at least 1.
    pub fn new(connector: C, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (status, _) = watch::channel(ReadyState::Closed);
        let (events_tx, events_rx) = mpsc::channel(capacity);
        Self {
            connector: Arc::new(connector),
            capacity,
            status: Arc::new(status),
            events_tx,
            events_rx,
            live: None,
            generation: 0,
        }
    }

    pub fn status(&self) -> ReadyState {
        *self.status.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.status() == ReadyState::Open
    }

    /// Subscribes to status changes.
    pub fn watch_status(&self) -> watch::Receiver<ReadyState> {
        self.status.subscribe()
    }

    /// URL of the current link, if any.
    pub fn url(&self) -> Option<&str> {
        self.live.as_ref().map(|live| live.url.as_str())
    }

    /// Points the connection at `url`.
    ///
    /// Supplying the URL of a still-running link is a no-op. Anything else
    /// closes the current link first and only then opens the new one.
    pub async fn set_url(&mut self, url: Option<String>) {
        let url = url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        if let (Some(live), Some(next)) = (&self.live, url.as_deref())
            && live.url == next
            && !live.task.is_finished()
        {
            return;
        }

        self.teardown().await;
        if let Some(url) = url {
            self.spawn_link(url);
        }
    }

    /// Closes the current link, if any.
    pub async fn close(&mut self) {
        self.set_url(None).await;
    }

    /// Hands `text` to the open link.
    ///
    /// Returns `false` without queueing anything when the link is not open.
    pub fn send(&self, text: impl Into<String>) -> bool {
        if self.status() != ReadyState::Open {
            debug!(status = ?self.status(), "send ignored: link not open");
            return false;
        }
        let Some(live) = &self.live else {
            return false;
        };
        match live.outbound.try_send(text.into()) {
            Ok(()) => true,
            Err(err) => {
                warn!(generation = live.generation, error = %err, "send dropped");
                false
            }
        }
    }

    /// Waits for the next message of the current link.
    ///
    /// Returns `None` when no URL is set or once the current link has ended.
    pub async fn next_message(&mut self) -> Option<String> {
        loop {
            let live = self.live.as_mut()?;
            if live.ended {
                return None;
            }
            let current = live.generation;
            let received = tokio::select! {
                biased;
                received = self.events_rx.recv() => received,
                joined = &mut live.task, if !live.joined => {
                    live.joined = true;
                    // A task that returns normally has already queued `Ended`.
                    if let Err(err) = joined {
                        warn!(url = %live.url, generation = current, error = %err, "link task failed");
                        live.ended = true;
                        self.status.send_replace(ReadyState::Closed);
                        return None;
                    }
                    continue;
                }
            };
            let (generation, event) = received?;
            if generation != current {
                continue;
            }
            match event {
                LinkEvent::Message(text) => return Some(text),
                LinkEvent::Ended => {
                    if let Some(live) = self.live.as_mut() {
                        live.ended = true;
                    }
                    return None;
                }
            }
        }
    }

    fn spawn_link(&mut self, url: String) {
        self.generation += 1;
        let generation = self.generation;
        let (outbound, outbound_rx) = mpsc::channel(self.capacity);
        let (shutdown, shutdown_rx) = oneshot::channel();

        self.status.send_replace(ReadyState::Connecting);
        debug!(%url, generation, "opening link");
        let task = tokio::spawn(run_link(LinkTask {
            connector: self.connector.clone(),
            url: url.clone(),
            generation,
            status: self.status.clone(),
            events: self.events_tx.clone(),
            outbound_rx,
            shutdown_rx,
        }));

        self.live = Some(LiveLink {
            url,
            generation,
            outbound,
            shutdown,
            task,
            joined: false,
            ended: false,
        });
    }

    async fn teardown(&mut self) {
        let Some(live) = self.live.take() else {
            return;
        };
        let LiveLink {
            url,
            generation,
            shutdown,
            mut task,
            joined,
            ..
        } = live;
        let _ = shutdown.send(());

        // Keep draining so a link task blocked on a full inbound buffer can
        // observe the shutdown signal.
        while !joined {
            tokio::select! {
                result = &mut task => {
                    if let Err(err) = result {
                        warn!(%url, generation, error = %err, "link task failed");
                    }
                    break;
                }
                _ = self.events_rx.recv() => {}
            }
        }
        while self.events_rx.try_recv().is_ok() {}

        self.status.send_replace(ReadyState::Closed);
        debug!(%url, generation, "link torn down");
    }
}

struct LinkTask<C> {
    connector: Arc<C>,
    url: String,
    generation: u64,
    status: Arc<watch::Sender<ReadyState>>,
    events: mpsc::Sender<(u64, LinkEvent)>,
    outbound_rx: mpsc::Receiver<String>,
    shutdown_rx: oneshot::Receiver<()>,
}

async fn run_link<C: TransportConnector>(task: LinkTask<C>) {
    let LinkTask {
        connector,
        url,
        generation,
        status,
        events,
        mut outbound_rx,
        mut shutdown_rx,
    } = task;

    let opened = tokio::select! {
        _ = &mut shutdown_rx => {
            debug!(%url, generation, "link cancelled while connecting");
            return;
        }
        opened = connector.open(&url) => opened,
    };
    let mut link = match opened {
        Ok(link) => link,
        Err(err) => {
            warn!(%url, generation, error = %err, "link failed to open");
            status.send_replace(ReadyState::Closed);
            let _ = events.send((generation, LinkEvent::Ended)).await;
            return;
        }
    };
    status.send_replace(ReadyState::Open);
    info!(%url, generation, "link open");

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                status.send_replace(ReadyState::Closing);
                link.close().await;
                status.send_replace(ReadyState::Closed);
                info!(%url, generation, "link closed");
                return;
            }
            Some(text) = outbound_rx.recv() => {
                if let Err(err) = link.send(text).await {
                    warn!(%url, generation, error = %err, "link send failed");
                }
            }
            incoming = link.recv() => {
                match incoming {
                    Some(Ok(text)) => {
                        if events.send((generation, LinkEvent::Message(text))).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(err)) => {
                        warn!(%url, generation, error = %err, "link receive failed");
                        break;
                    }
                    None => {
                        info!(%url, generation, "link closed by peer");
                        break;
                    }
                }
            }
        }
    }

    link.close().await;
    status.send_replace(ReadyState::Closed);
    let _ = events.send((generation, LinkEvent::Ended)).await;
}
