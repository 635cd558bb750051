//! Shared push-feed connection handle
//!
//! A [`Connection`] is what subscription channels see: readiness, a way to
//! send text frames, and per-listener queues of inbound binary frames. The
//! transport side is a [`ConnectionDriver`] plus the outbound frame queue,
//! handed to whichever connector actually talks to the socket.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use terminal_core::{FeedError, FeedResult, ReadyState, ServerText};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use url::Url;

/// Frames queued for the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    /// Close the socket and stop driving the connection
    Close,
}

pub type OutboundFrames = mpsc::UnboundedReceiver<Outbound>;

/// Identifies one listener registration on a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Queue of inbound binary frames for one listener
#[derive(Debug)]
pub struct FrameListener {
    id: ListenerId,
    generation: u64,
    frames: mpsc::UnboundedReceiver<Bytes>,
}

impl FrameListener {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Generation of the connection this listener is attached to
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Next frame, or `None` once the listener has been removed
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.frames.recv().await
    }
}

/// One transport connection to the push-feed endpoint
pub struct Connection {
    generation: u64,
    url: Url,
    state_tx: watch::Sender<ReadyState>,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    listeners: DashMap<ListenerId, mpsc::UnboundedSender<Bytes>>,
    next_listener_id: AtomicU64,
    frames_received: AtomicU64,
}

impl Connection {
    /// Create a connection in the `Connecting` state together with its
    /// transport side. Nothing happens until a connector drives it.
    pub fn new(url: Url, generation: u64) -> (Arc<Self>, ConnectionDriver, OutboundFrames) {
        let (state_tx, _) = watch::channel(ReadyState::Connecting);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let connection = Arc::new(Self {
            generation,
            url,
            state_tx,
            outbound_tx,
            listeners: DashMap::new(),
            next_listener_id: AtomicU64::new(1),
            frames_received: AtomicU64::new(0),
        });

        let driver = ConnectionDriver {
            connection: Arc::clone(&connection),
        };

        (connection, driver, outbound_rx)
    }

    /// Incremented on every forced replacement
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn ready_state(&self) -> ReadyState {
        *self.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ReadyState> {
        self.state_tx.subscribe()
    }

    /// Queue a text frame. Only valid while the connection is open.
    pub fn send_text(&self, text: String) -> FeedResult<()> {
        let state = self.ready_state();
        if !state.is_open() {
            return Err(FeedError::transport(format!(
                "connection #{} is {:?}, cannot send",
                self.generation, state
            )));
        }
        self.outbound_tx
            .send(Outbound::Text(text))
            .map_err(|_| FeedError::transport("connection task has stopped"))
    }

    /// Register a new inbound frame queue
    pub fn add_listener(&self) -> FrameListener {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.insert(id, tx);
        debug!(
            "[Feed WS] Listener {:?} attached to connection #{}",
            id, self.generation
        );
        FrameListener {
            id,
            generation: self.generation,
            frames: rx,
        }
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let removed = self.listeners.remove(&id).is_some();
        if removed {
            debug!(
                "[Feed WS] Listener {:?} removed from connection #{}",
                id, self.generation
            );
        }
        removed
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    /// Ask the transport to close. Idempotent.
    pub fn close(&self) {
        let changed = self.state_tx.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = ReadyState::Closing;
                true
            }
        });

        if changed && self.outbound_tx.send(Outbound::Close).is_err() {
            // nobody is driving the socket any more
            self.state_tx.send_replace(ReadyState::Closed);
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("generation", &self.generation)
            .field("url", &self.url.as_str())
            .field("state", &self.ready_state())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Transport side of a [`Connection`]
///
/// Dropping the driver marks the connection closed.
#[derive(Debug)]
pub struct ConnectionDriver {
    connection: Arc<Connection>,
}

impl ConnectionDriver {
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Transport finished its handshake
    pub fn mark_open(&self) {
        let opened = self.connection.state_tx.send_if_modified(|state| {
            if *state == ReadyState::Connecting {
                *state = ReadyState::Open;
                true
            } else {
                false
            }
        });
        if opened {
            info!("WebSocket connection established.");
        }
    }

    /// Transport is gone, with the error that took it down if any
    pub fn mark_closed(&self, error: Option<&str>) {
        let previous = self.connection.state_tx.send_replace(ReadyState::Closed);
        if previous != ReadyState::Closed {
            match error {
                Some(e) => warn!(
                    "[Feed WS] Connection #{} closed with error: {}",
                    self.connection.generation, e
                ),
                None => info!("[Feed WS] Connection #{} closed", self.connection.generation),
            }
        }
    }

    /// Fan one inbound binary frame out to every listener
    pub fn dispatch(&self, frame: Bytes) {
        self.connection
            .frames_received
            .fetch_add(1, Ordering::Relaxed);
        self.connection
            .listeners
            .retain(|_, tx| tx.send(frame.clone()).is_ok());
    }

    /// Inbound text frames are server acknowledgements, never data
    pub fn handle_text(&self, text: &str) {
        match ServerText::parse(text) {
            ServerText::Subscribed { channel } => {
                debug!("[Feed WS] Server confirmed subscription to {}", channel)
            }
            ServerText::Unsubscribed { channel } => {
                debug!("[Feed WS] Server confirmed unsubscription from {}", channel)
            }
            ServerText::Notice(notice) => warn!("[Feed WS] Server notice: {}", notice),
        }
    }
}

impl Drop for ConnectionDriver {
    fn drop(&mut self) {
        self.mark_closed(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> (Arc<Connection>, ConnectionDriver, OutboundFrames) {
        Connection::new(Url::parse("ws://localhost:4010/ws").unwrap(), 1)
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let (conn, driver, mut outbound) = connection();
        assert_eq!(conn.ready_state(), ReadyState::Connecting);
        assert!(conn.send_text("early".to_string()).is_err());

        driver.mark_open();
        assert_eq!(conn.ready_state(), ReadyState::Open);
        conn.send_text("hello".to_string()).unwrap();
        assert_eq!(outbound.recv().await, Some(Outbound::Text("hello".to_string())));

        conn.close();
        conn.close();
        assert_eq!(conn.ready_state(), ReadyState::Closing);
        assert_eq!(outbound.recv().await, Some(Outbound::Close));

        driver.mark_closed(None);
        assert_eq!(conn.ready_state(), ReadyState::Closed);

        // a closed connection never reopens
        driver.mark_open();
        assert_eq!(conn.ready_state(), ReadyState::Closed);
    }

    #[tokio::test]
    async fn test_dispatch_fans_out_to_listeners() {
        let (conn, driver, _outbound) = connection();
        let mut a = conn.add_listener();
        let mut b = conn.add_listener();
        assert_eq!(conn.listener_count(), 2);

        driver.dispatch(Bytes::from_static(b"\x01"));
        assert_eq!(a.recv().await, Some(Bytes::from_static(b"\x01")));
        assert_eq!(b.recv().await, Some(Bytes::from_static(b"\x01")));

        assert!(conn.remove_listener(a.id()));
        assert!(!conn.remove_listener(a.id()));
        assert_eq!(a.recv().await, None);
        assert_eq!(conn.listener_count(), 1);
        assert_eq!(conn.frames_received(), 1);
    }

    #[tokio::test]
    async fn test_dropped_listener_is_pruned() {
        let (conn, driver, _outbound) = connection();
        let listener = conn.add_listener();
        drop(listener);
        driver.dispatch(Bytes::from_static(b"\x02"));
        assert_eq!(conn.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_dropping_driver_closes() {
        let (conn, driver, outbound) = connection();
        let mut state = conn.watch_state();
        drop(driver);
        assert_eq!(*state.borrow_and_update(), ReadyState::Closed);

        // closing an already closed connection is a no-op
        drop(outbound);
        conn.close();
        assert_eq!(conn.ready_state(), ReadyState::Closed);
    }
}
