//! Connection manager for the push-feed
//!
//! Owns the single shared [`Connection`] for the process. Connections are
//! created lazily, replaced (never mutated) on forced reconnect, and are not
//! closed when individual subscription channels go away.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::connection::{Connection, ConnectionDriver, Outbound, OutboundFrames};

/// Hands out the shared connection
pub trait ConnectionProvider: Send + Sync {
    /// Return the current connection, creating one if none exists. With
    /// `force_reconnect`, close and discard the current one first. Creation
    /// does not wait for the connection to open.
    fn get_connection(&self, force_reconnect: bool) -> Arc<Connection>;
}

/// Starts driving a freshly created connection
pub trait Connector: Send + Sync {
    /// Must return immediately; the transport work happens elsewhere.
    fn connect(&self, driver: ConnectionDriver, outbound: OutboundFrames);
}

/// Process-wide owner of the push-feed connection
pub struct ConnectionManager {
    url: Url,
    connector: Arc<dyn Connector>,
    current: Mutex<Option<Arc<Connection>>>,
    generation: AtomicU64,
}

impl ConnectionManager {
    pub fn new(url: Url, connector: Arc<dyn Connector>) -> Self {
        Self {
            url,
            connector,
            current: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Manager that connects with tokio-tungstenite
    pub fn websocket(url: Url) -> Self {
        Self::new(url, Arc::new(WsConnector))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The current connection without creating one
    pub fn current(&self) -> Option<Arc<Connection>> {
        self.current.lock().clone()
    }

    /// Number of connections created so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

impl ConnectionProvider for ConnectionManager {
    fn get_connection(&self, force_reconnect: bool) -> Arc<Connection> {
        let mut current = self.current.lock();

        if force_reconnect {
            if let Some(existing) = current.take() {
                info!(
                    "[Feed WS] Replacing connection #{} ({:?})",
                    existing.generation(),
                    existing.ready_state()
                );
                existing.close();
            }
        }

        if let Some(existing) = current.as_ref() {
            return Arc::clone(existing);
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (connection, driver, outbound) = Connection::new(self.url.clone(), generation);
        debug!("[Feed WS] Created connection #{} to {}", generation, self.url);
        self.connector.connect(driver, outbound);
        *current = Some(Arc::clone(&connection));
        connection
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.url.as_str())
            .field("generation", &self.generation())
            .finish()
    }
}

// ============================================================================
// tokio-tungstenite connector
// ============================================================================

/// Drives each connection on its own tokio task
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(&self, driver: ConnectionDriver, outbound: OutboundFrames) {
        tokio::spawn(run_connection(driver, outbound));
    }
}

async fn run_connection(driver: ConnectionDriver, mut outbound: OutboundFrames) {
    let generation = driver.connection().generation();
    let url = driver.connection().url().clone();
    info!("[Feed WS] Connecting to {} (connection #{})", url, generation);

    let connect = connect_async(url.as_str());
    tokio::pin!(connect);

    // Wait for the handshake, unless the connection is replaced first
    let ws_stream = loop {
        tokio::select! {
            result = &mut connect => match result {
                Ok((ws_stream, _)) => break ws_stream,
                Err(e) => {
                    error!("[Feed WS] Connection #{} failed: {}", generation, e);
                    driver.mark_closed(Some(&e.to_string()));
                    return;
                }
            },
            cmd = outbound.recv() => match cmd {
                Some(Outbound::Text(_)) => {
                    warn!("[Feed WS] Dropping frame queued before connection #{} opened", generation);
                }
                Some(Outbound::Close) | None => {
                    debug!("[Feed WS] Connection #{} closed while connecting", generation);
                    driver.mark_closed(None);
                    return;
                }
            },
        }
    };

    driver.mark_open();
    let (mut write, mut read) = ws_stream.split();
    let mut failure: Option<String> = None;

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        driver.dispatch(data);
                    }
                    Some(Ok(Message::Text(text))) => {
                        driver.handle_text(text.as_str());
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            warn!("[Feed WS] Failed to send pong: {}", e);
                            failure = Some(e.to_string());
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("[Feed WS] Connection #{} closed by server", generation);
                        break;
                    }
                    Some(Err(e)) => {
                        error!("[Feed WS] Error: {}", e);
                        failure = Some(e.to_string());
                        break;
                    }
                    None => {
                        info!("[Feed WS] Stream ended");
                        break;
                    }
                    _ => {}
                }
            }

            cmd = outbound.recv() => {
                match cmd {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = write.send(Message::Text(text.into())).await {
                            warn!("[Feed WS] Failed to send text frame: {}", e);
                            failure = Some(e.to_string());
                            break;
                        }
                    }
                    Some(Outbound::Close) | None => {
                        let _ = write.send(Message::Close(None)).await;
                        let _ = write.close().await;
                        break;
                    }
                }
            }
        }
    }

    driver.mark_closed(failure.as_deref());
}

#[cfg(test)]
mod tests {
    use super::*;
    use terminal_core::ReadyState;

    /// Keeps transport sides alive without driving them
    #[derive(Default)]
    struct HoldingConnector {
        held: Mutex<Vec<(ConnectionDriver, OutboundFrames)>>,
    }

    impl Connector for HoldingConnector {
        fn connect(&self, driver: ConnectionDriver, outbound: OutboundFrames) {
            self.held.lock().push((driver, outbound));
        }
    }

    fn manager() -> (ConnectionManager, Arc<HoldingConnector>) {
        let connector = Arc::new(HoldingConnector::default());
        let manager = ConnectionManager::new(
            Url::parse("ws://localhost:4010/ws").unwrap(),
            connector.clone(),
        );
        (manager, connector)
    }

    #[test]
    fn test_lazy_single_instance() {
        let (manager, connector) = manager();
        assert!(manager.current().is_none());

        let a = manager.get_connection(false);
        let b = manager.get_connection(false);

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.generation(), 1);
        assert_eq!(a.ready_state(), ReadyState::Connecting);
        assert_eq!(connector.held.lock().len(), 1);
    }

    #[test]
    fn test_force_reconnect_replaces_and_closes() {
        let (manager, connector) = manager();
        let first = manager.get_connection(false);
        connector.held.lock()[0].0.mark_open();

        let second = manager.get_connection(true);

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first.ready_state(), ReadyState::Closing);
        assert_eq!(second.generation(), 2);
        assert!(Arc::ptr_eq(&manager.current().unwrap(), &second));
        assert_eq!(connector.held.lock().len(), 2);
    }

    #[test]
    fn test_force_without_existing_creates_one() {
        let (manager, _connector) = manager();
        let conn = manager.get_connection(true);
        assert_eq!(conn.generation(), 1);
        assert_eq!(manager.generation(), 1);
    }
}
