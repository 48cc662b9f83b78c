//! TCP accept loop feeding the simulation.
//!
//! Network tasks never touch entity state. Each connection gets a reader
//! task that decodes [`ClientMessage`]s into [`InboundEvent`]s on a
//! crossbeam channel drained by the tick thread, and a writer task that
//! drains the connection's bounded outbound queue onto the socket.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use cinder_protocol::{ClientMessage, Connection};
use crossbeam_channel::Sender;
use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{RwLock, mpsc, watch};

use crate::framing::{FrameConfig, FrameError, read_message, write_message};
use crate::ChannelConnection;

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Unique identifier for a TCP connection within a server session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

/// Atomic generator for monotonically increasing [`ConnectionId`]s.
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    /// Create a new generator starting at 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Return the next unique [`ConnectionId`].
    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Something that happened on a connection, for the tick to apply.
#[derive(Debug)]
pub enum InboundEvent {
    /// A client connected. The handle is how the simulation talks back.
    Connected {
        /// Transport id.
        id: ConnectionId,
        /// Outbound handle.
        connection: ChannelConnection,
    },
    /// A decoded client message.
    Message {
        /// Transport id.
        id: ConnectionId,
        /// The message.
        message: ClientMessage,
    },
    /// The client went away (EOF, error, kick, or shutdown).
    Disconnected {
        /// Transport id.
        id: ConnectionId,
    },
}

/// Live connections keyed by [`ConnectionId`], with a capacity limit.
pub struct ConnectionMap {
    inner: RwLock<HashMap<ConnectionId, ChannelConnection>>,
    max_connections: usize,
}

impl ConnectionMap {
    /// Create a new map with the given capacity limit.
    pub fn new(max_connections: usize) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            max_connections,
        }
    }

    /// Insert a connection. Returns `false` if the map is at capacity.
    pub async fn insert(&self, connection: ChannelConnection) -> bool {
        let mut map = self.inner.write().await;
        if map.len() >= self.max_connections {
            return false;
        }
        map.insert(connection.id(), connection);
        true
    }

    /// Remove a connection by ID.
    pub async fn remove(&self, id: &ConnectionId) -> Option<ChannelConnection> {
        self.inner.write().await.remove(id)
    }

    /// Return the number of active connections.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Return whether the map is empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Close every connection.
    pub async fn close_all(&self) {
        for connection in self.inner.read().await.values() {
            connection.close();
        }
    }
}

/// Configuration for [`GameServer`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Records queued per connection before it is dropped as too slow.
    pub outbound_capacity: usize,
    /// Frame limits.
    pub frame: FrameConfig,
    /// Drop a client that sends nothing for this long. `None` waits forever.
    pub idle_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 25565)),
            max_connections: 20,
            outbound_capacity: 4096,
            frame: FrameConfig::default(),
            idle_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// TCP server that accepts clients and forwards their traffic as events.
pub struct GameServer {
    config: ServerConfig,
    /// Active connections (public for test inspection).
    pub connections: Arc<ConnectionMap>,
    id_gen: Arc<IdGenerator>,
    events: Sender<InboundEvent>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl GameServer {
    /// Create a server that reports to `events`.
    pub fn new(config: ServerConfig, events: Sender<InboundEvent>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            connections: Arc::new(ConnectionMap::new(config.max_connections)),
            id_gen: Arc::new(IdGenerator::new()),
            config,
            events,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Bind to the configured address and run the accept loop.
    pub async fn run(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!("Server listening on {}", self.config.bind_addr);
        self.run_with_listener(listener).await
    }

    /// Run the accept loop with a pre-bound listener (useful for tests).
    pub async fn run_with_listener(&self, listener: TcpListener) -> std::io::Result<()> {
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let Some((stream, peer_addr)) = accepted(result) else {
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    };
                    if let Err(err) = stream.set_nodelay(true) {
                        tracing::warn!("Cannot set TCP_NODELAY for {peer_addr}: {err}");
                    }

                    let id = self.id_gen.next_id();
                    let (connection, outbound) =
                        ChannelConnection::new(id, self.config.outbound_capacity);

                    if !self.connections.insert(connection.clone()).await {
                        tracing::warn!("Connection limit reached, rejecting {peer_addr}");
                        continue;
                    }
                    tracing::info!("Accepted connection {id:?} from {peer_addr}");

                    if self
                        .events
                        .send(InboundEvent::Connected { id, connection: connection.clone() })
                        .is_err()
                    {
                        tracing::warn!("Simulation is gone, dropping {id:?}");
                        self.connections.remove(&id).await;
                        continue;
                    }

                    let (reader, writer) = stream.into_split();
                    let frame = self.config.frame.clone();
                    let idle_timeout = self.config.idle_timeout;
                    tokio::spawn(Self::write_loop(
                        connection.clone(),
                        writer,
                        outbound,
                        frame.clone(),
                        self.shutdown_rx.clone(),
                    ));

                    let connections = Arc::clone(&self.connections);
                    let events = self.events.clone();
                    let task_shutdown = self.shutdown_rx.clone();
                    tokio::spawn(async move {
                        Self::read_loop(&connection, reader, &events, &frame, idle_timeout, task_shutdown)
                            .await;
                        connection.close();
                        connections.remove(&id).await;
                        let _ = events.send(InboundEvent::Disconnected { id });
                        tracing::info!("Connection {id:?} closed");
                    });
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Server shutting down");
                        self.connections.close_all().await;
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Signal the server to shut down gracefully.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Per-connection reader loop.
    async fn read_loop(
        connection: &ChannelConnection,
        mut reader: OwnedReadHalf,
        events: &Sender<InboundEvent>,
        frame: &FrameConfig,
        idle_timeout: Option<Duration>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let id = connection.id();
        loop {
            tokio::select! {
                result = Self::next_message(&mut reader, frame, idle_timeout) => {
                    match result {
                        Ok(message) => {
                            if events.send(InboundEvent::Message { id, message }).is_err() {
                                break;
                            }
                        }
                        Err(FrameError::ConnectionClosed) => break,
                        Err(err) => {
                            tracing::warn!("Dropping {id:?}: {err}");
                            break;
                        }
                    }
                }
                _ = connection.closed() => break,
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }

    async fn next_message(
        reader: &mut OwnedReadHalf,
        frame: &FrameConfig,
        idle_timeout: Option<Duration>,
    ) -> Result<ClientMessage, FrameError> {
        match idle_timeout {
            Some(limit) => tokio::time::timeout(limit, read_message(reader, frame))
                .await
                .map_err(|_| FrameError::Timeout(limit))?,
            None => read_message(reader, frame).await,
        }
    }

    /// Per-connection writer loop.
    async fn write_loop(
        connection: ChannelConnection,
        mut writer: OwnedWriteHalf,
        mut outbound: mpsc::Receiver<cinder_protocol::Record>,
        frame: FrameConfig,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let id = connection.id();
        loop {
            tokio::select! {
                record = outbound.recv() => {
                    let Some(record) = record else { break };
                    if let Err(err) = write_message(&mut writer, &record, &frame).await {
                        tracing::debug!("Write to {id:?} failed: {err}");
                        connection.close();
                        break;
                    }
                }
                _ = connection.closed() => break,
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

/// Unwraps an accept result. A failed accept is logged and skipped.
fn accepted<T>(result: std::io::Result<T>) -> Option<T> {
    match result {
        Ok(accepted) => Some(accepted),
        Err(err) => {
            tracing::warn!("Failed to accept a connection: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_protocol::Record;
    use crossbeam_channel::Receiver;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;

    async fn start_test_server(
        max_connections: usize,
    ) -> (SocketAddr, Arc<GameServer>, Receiver<InboundEvent>) {
        start_with(ServerConfig {
            max_connections,
            ..ServerConfig::default()
        })
        .await
    }

    async fn start_with(config: ServerConfig) -> (SocketAddr, Arc<GameServer>, Receiver<InboundEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let server = Arc::new(GameServer::new(config, tx));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let srv = Arc::clone(&server);
        tokio::spawn(async move {
            srv.run_with_listener(listener).await.unwrap();
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        (addr, server, rx)
    }

    async fn next_event(rx: &Receiver<InboundEvent>) -> InboundEvent {
        for _ in 0..100 {
            if let Ok(event) = rx.try_recv() {
                return event;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no event within a second");
    }

    #[tokio::test]
    async fn test_messages_become_events() {
        let (addr, _server, events) = start_test_server(16).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        let InboundEvent::Connected { id, .. } = next_event(&events).await else {
            panic!("expected Connected first");
        };

        let login = ClientMessage::Login {
            username: "alice".to_string(),
            version: "1.12.2".to_string(),
        };
        write_message(&mut stream, &login, &FrameConfig::default()).await.unwrap();
        match next_event(&events).await {
            InboundEvent::Message { id: from, message } => {
                assert_eq!(from, id);
                assert_eq!(message, login);
            }
            other => panic!("unexpected {other:?}"),
        }

        drop(stream);
        assert!(matches!(
            next_event(&events).await,
            InboundEvent::Disconnected { id: gone } if gone == id
        ));
    }

    #[tokio::test]
    async fn test_records_reach_the_socket() {
        let (addr, _server, events) = start_test_server(16).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let InboundEvent::Connected { connection, .. } = next_event(&events).await else {
            panic!("expected Connected");
        };

        let record = Record::SystemMessage {
            message: "welcome".to_string(),
        };
        connection.send(record.clone()).unwrap();
        let received: Record = read_message(&mut stream, &FrameConfig::default()).await.unwrap();
        assert_eq!(received, record);
    }

    #[tokio::test]
    async fn test_max_connections_enforced() {
        let (addr, server, _events) = start_test_server(2).await;
        let _c1 = TcpStream::connect(addr).await.unwrap();
        let _c2 = TcpStream::connect(addr).await.unwrap();
        let _c3 = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(server.connections.len().await, 2);
    }

    #[tokio::test]
    async fn test_kicking_a_connection_closes_the_socket() {
        let (addr, _server, events) = start_test_server(16).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let InboundEvent::Connected { connection, .. } = next_event(&events).await else {
            panic!("expected Connected");
        };

        connection.close();
        let mut buf = [0u8; 16];
        let n = tokio::time::timeout(Duration::from_secs(1), stream.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 0);
        assert!(matches!(next_event(&events).await, InboundEvent::Disconnected { .. }));
    }

    #[tokio::test]
    async fn test_graceful_shutdown_closes_connections() {
        let (addr, server, _events) = start_test_server(16).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        server.shutdown();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut buf = [0u8; 64];
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(n, 0, "client should see EOF after shutdown");
    }

    #[tokio::test]
    async fn test_idle_client_is_dropped() {
        let (addr, _server, events) = start_with(ServerConfig {
            idle_timeout: Some(Duration::from_millis(100)),
            ..ServerConfig::default()
        })
        .await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        assert!(matches!(next_event(&events).await, InboundEvent::Connected { .. }));

        assert!(matches!(next_event(&events).await, InboundEvent::Disconnected { .. }));
        let mut buf = [0u8; 16];
        let n = tokio::time::timeout(Duration::from_secs(1), stream.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_failed_accept_is_skipped() {
        let failed: std::io::Result<u8> = Err(std::io::Error::other("too many open files"));
        assert_eq!(accepted(failed), None);
        assert_eq!(accepted(Ok(7u8)), Some(7));
    }

    #[test]
    fn test_connection_ids_are_sequential() {
        let id_gen = IdGenerator::new();
        let a = id_gen.next_id();
        let b = id_gen.next_id();
        assert_eq!(a.0 + 1, b.0);
    }
}
