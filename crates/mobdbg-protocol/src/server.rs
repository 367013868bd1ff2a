//! TCP endpoint the debuggee dials into.
//!
//! The server accepts one client at a time; a second connection while one
//! is active is closed immediately. Lines sent before any client connects
//! are kept in a backlog and flushed, in order, on the next connection.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, Weak};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::ServerError;
use crate::listener::{lock, panic_message, ListenerId, ListenerSet};
use crate::transport::{BodyCallback, Transport};

/// Lifecycle of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, not listening yet.
    Idle,
    /// Listening, no client.
    Listening,
    /// A client is attached.
    Connected,
    /// The client went away; still listening for the next one.
    Disconnected,
    /// Shut down for good.
    Disposed,
}

/// Connection lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected { peer: SocketAddr },
    Disconnected,
    /// A second client tried to attach and was closed.
    DuplicateRejected { peer: SocketAddr },
}

struct Shared {
    state: ConnectionState,
    local_addr: Option<SocketAddr>,
    backlog: Vec<String>,
    writer: Option<mpsc::UnboundedSender<String>>,
    accept_task: Option<JoinHandle<()>>,
    client_tasks: Vec<JoinHandle<()>>,
    /// Bumped on every accepted client so stale readers can be ignored.
    generation: u64,
}

struct PendingBody {
    len: usize,
    on_body: BodyCallback,
}

/// Single-client TCP server speaking the line protocol.
pub struct ConnectionServer {
    host: String,
    port: u16,
    shared: Mutex<Shared>,
    body: Mutex<Option<PendingBody>>,
    lines: ListenerSet<String>,
    events: ListenerSet<ConnectionEvent>,
}

impl ConnectionServer {
    /// Create a server for `host:port`. Port 0 picks a free port on start.
    pub fn new(host: impl Into<String>, port: u16) -> Arc<Self> {
        Arc::new(Self {
            host: host.into(),
            port,
            shared: Mutex::new(Shared {
                state: ConnectionState::Idle,
                local_addr: None,
                backlog: Vec::new(),
                writer: None,
                accept_task: None,
                client_tasks: Vec::new(),
                generation: 0,
            }),
            body: Mutex::new(None),
            lines: ListenerSet::new(),
            events: ListenerSet::new(),
        })
    }

    /// Bind and start accepting. Calling it again returns the bound address.
    pub async fn start(self: &Arc<Self>) -> Result<SocketAddr, ServerError> {
        {
            let shared = lock(&self.shared);
            if shared.state == ConnectionState::Disposed {
                return Err(ServerError::Disposed);
            }
            if let Some(addr) = shared.local_addr {
                return Ok(addr);
            }
        }

        let requested = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind((self.host.as_str(), self.port))
            .await
            .map_err(|source| ServerError::Bind {
                addr: requested.clone(),
                source,
            })?;
        let addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: requested,
            source,
        })?;

        let mut shared = lock(&self.shared);
        if shared.state == ConnectionState::Disposed {
            return Err(ServerError::Disposed);
        }
        if let Some(existing) = shared.local_addr {
            // Lost a race with a concurrent start; keep the first listener.
            return Ok(existing);
        }
        shared.local_addr = Some(addr);
        shared.state = ConnectionState::Listening;
        shared.accept_task = Some(tokio::spawn(accept_loop(Arc::downgrade(self), listener)));
        tracing::info!(%addr, "waiting for debuggee");
        Ok(addr)
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.shared).state
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        lock(&self.shared).local_addr
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Lines waiting for a client.
    pub fn backlog_len(&self) -> usize {
        lock(&self.shared).backlog.len()
    }

    /// Register a listener for every received line (without its newline).
    pub fn on_line(&self, callback: impl Fn(&String) + Send + Sync + 'static) -> ListenerId {
        self.lines.add(callback)
    }

    pub fn remove_line_listener(&self, id: ListenerId) -> bool {
        self.lines.remove(id)
    }

    /// Register a listener for connection lifecycle changes.
    pub fn on_connection_event(
        &self,
        callback: impl Fn(&ConnectionEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        self.events.add(callback)
    }

    pub fn remove_connection_listener(&self, id: ListenerId) -> bool {
        self.events.remove(id)
    }

    /// Close the client and the listener and drop every listener. Never
    /// fails; calling it twice is harmless.
    pub fn dispose(&self) {
        {
            let mut shared = lock(&self.shared);
            if shared.state == ConnectionState::Disposed {
                return;
            }
            shared.state = ConnectionState::Disposed;
            if let Some(task) = shared.accept_task.take() {
                task.abort();
            }
            for task in shared.client_tasks.drain(..) {
                task.abort();
            }
            shared.writer = None;
            shared.backlog.clear();
            shared.local_addr = None;
        }
        lock(&self.body).take();
        self.lines.clear();
        self.events.clear();
        tracing::debug!("connection server disposed");
    }

    fn accept(self: &Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        let generation = {
            let mut shared = lock(&self.shared);
            let state = shared.state;
            match state {
                ConnectionState::Disposed => return,
                ConnectionState::Connected => {
                    drop(shared);
                    drop(stream);
                    tracing::warn!(%peer, "rejecting second debuggee connection");
                    self.events.emit(&ConnectionEvent::DuplicateRejected { peer });
                    return;
                }
                _ => {}
            }

            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!(error = %e, "could not disable nagle");
            }
            let (read_half, write_half) = stream.into_split();
            let (tx, rx) = mpsc::unbounded_channel();
            let flushed = shared.backlog.len();
            for line in shared.backlog.drain(..) {
                let _ = tx.send(line);
            }
            if flushed > 0 {
                tracing::debug!(lines = flushed, "flushing backlog");
            }

            shared.generation += 1;
            let generation = shared.generation;
            shared.writer = Some(tx);
            shared.state = ConnectionState::Connected;
            let weak = Arc::downgrade(self);
            shared.client_tasks = vec![
                tokio::spawn(write_loop(write_half, rx)),
                tokio::spawn(read_loop(weak, read_half, generation)),
            ];
            generation
        };

        tracing::info!(%peer, generation, "debuggee connected");
        self.events.emit(&ConnectionEvent::Connected { peer });
    }

    fn client_closed(&self, generation: u64) {
        {
            let mut shared = lock(&self.shared);
            if shared.generation != generation || shared.state != ConnectionState::Connected {
                return;
            }
            shared.writer = None;
            shared.client_tasks.clear();
            shared.state = ConnectionState::Disconnected;
        }
        lock(&self.body).take();
        self.events.emit(&ConnectionEvent::Disconnected);
    }

    fn take_body_request(&self) -> Option<PendingBody> {
        lock(&self.body).take()
    }
}

impl Transport for ConnectionServer {
    fn send(&self, line: &str) {
        let mut shared = lock(&self.shared);
        if shared.state == ConnectionState::Disposed {
            tracing::debug!(line, "server disposed, dropping line");
            return;
        }
        tracing::trace!(line, "->");
        let line = match shared.writer.as_ref() {
            Some(writer) => match writer.send(line.to_string()) {
                Ok(()) => return,
                Err(mpsc::error::SendError(line)) => line,
            },
            None => line.to_string(),
        };
        shared.backlog.push(line);
    }

    fn request_body(&self, len: usize, on_body: BodyCallback) -> Result<(), ServerError> {
        let mut body = lock(&self.body);
        if body.is_some() {
            return Err(ServerError::BodyAlreadyRequested);
        }
        *body = Some(PendingBody { len, on_body });
        Ok(())
    }
}

impl Drop for ConnectionServer {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for ConnectionServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionServer")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("state", &self.state())
            .finish()
    }
}

async fn accept_loop(server: Weak<ConnectionServer>, listener: TcpListener) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                continue;
            }
        };
        let Some(server) = server.upgrade() else {
            return;
        };
        server.accept(stream, peer);
    }
}

async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = rx.recv().await {
        let mut framed = line.into_bytes();
        framed.push(b'\n');
        if let Err(e) = writer.write_all(&framed).await {
            log_disconnect(&e);
            return;
        }
        if let Err(e) = writer.flush().await {
            log_disconnect(&e);
            return;
        }
    }
}

async fn read_loop(server: Weak<ConnectionServer>, read_half: OwnedReadHalf, generation: u64) {
    let mut reader = BufReader::new(read_half);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                tracing::info!("debuggee closed the connection");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                log_disconnect(&e);
                break;
            }
        }
        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }
        let line = String::from_utf8_lossy(&buf).into_owned();

        let pending = {
            let Some(server) = server.upgrade() else {
                return;
            };
            server.lines.emit(&line);
            server.take_body_request()
        };

        if let Some(PendingBody { len, on_body }) = pending {
            let mut body = vec![0u8; len];
            if let Err(e) = reader.read_exact(&mut body).await {
                log_disconnect(&e);
                break;
            }
            let text = String::from_utf8_lossy(&body).into_owned();
            let delivered =
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || on_body(text)));
            if let Err(payload) = delivered {
                tracing::warn!(panic = panic_message(&*payload), "body callback panicked");
            }
        }
    }

    if let Some(server) = server.upgrade() {
        server.client_closed(generation);
    }
}

/// Peers vanishing is routine; only unexpected failures are warnings.
fn log_disconnect(e: &io::Error) {
    let expected = matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    ) || e.to_string().contains("closed");
    if expected {
        tracing::info!(error = %e, "debuggee disconnected");
    } else {
        tracing::warn!(error = %e, "connection error");
    }
}
