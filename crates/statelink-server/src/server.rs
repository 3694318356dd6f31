use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde_json::Value;
use statelink_frame::{FrameConfig, FrameError, RecordReader, RecordWriter, DEFAULT_MAX_LINE};
use statelink_proto::Envelope;
use tracing::{debug, info, warn};

use crate::error::{Result, ServerError};
use crate::events::EventHandlers;

/// Default port the producer pushes telemetry to.
pub const DEFAULT_PORT: u16 = 9527;

/// Default bind address.
pub const DEFAULT_BIND_ADDR: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT);

/// Connection lifecycle as seen from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not started, or stopped.
    Disconnected,
    /// Listening, no producer attached.
    Listening,
    /// One producer attached.
    Connected,
}

/// Configuration for the connection server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the listening socket to.
    pub bind_addr: SocketAddr,
    /// How long the peer may stay silent before it is considered dead.
    pub heartbeat_timeout: Duration,
    /// Socket read timeout; also the granularity of the liveness check.
    pub read_timeout: Duration,
    /// Poll interval of the accept loop (bounds how fast `stop()` lands).
    pub accept_poll: Duration,
    /// Maximum wire line length in bytes.
    pub max_line_len: usize,
    /// Upper bound on joining worker threads during `stop()`.
    pub stop_join_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR,
            heartbeat_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_millis(200),
            accept_poll: Duration::from_millis(100),
            max_line_len: DEFAULT_MAX_LINE,
            stop_join_timeout: Duration::from_secs(2),
        }
    }
}

impl ServerConfig {
    /// Override the bind address.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Override the heartbeat window.
    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    /// Override the socket read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Override the accept poll interval.
    pub fn with_accept_poll(mut self, interval: Duration) -> Self {
        self.accept_poll = interval;
        self
    }
}

/// The currently attached producer connection.
struct PeerHandle {
    generation: u64,
    /// Clone of the peer stream kept for shutdown.
    stream: TcpStream,
    writer: RecordWriter<TcpStream>,
}

struct Shared {
    config: ServerConfig,
    running: AtomicBool,
    state: Mutex<ConnectionState>,
    local_addr: Mutex<Option<SocketAddr>>,
    peer: Mutex<Option<PeerHandle>>,
    recv_handle: Mutex<Option<JoinHandle<()>>>,
    generation: AtomicU64,
    handlers: EventHandlers,
}

/// Accepts exactly one telemetry producer at a time and pumps its records
/// through the codec and envelope parser into registered handlers.
///
/// `Disconnected → Listening → Connected → Listening → …` until `stop()`.
/// A new peer replaces the old one; the old socket is torn down first.
pub struct ConnectionServer {
    shared: Arc<Shared>,
    accept_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                running: AtomicBool::new(false),
                state: Mutex::new(ConnectionState::Disconnected),
                local_addr: Mutex::new(None),
                peer: Mutex::new(None),
                recv_handle: Mutex::new(None),
                generation: AtomicU64::new(0),
                handlers: EventHandlers::default(),
            }),
            accept_handle: Mutex::new(None),
        }
    }

    /// Register a handler for peer attachment.
    pub fn on_connected(&self, handler: impl Fn(SocketAddr) + Send + Sync + 'static) {
        self.shared.handlers.on_connected(handler);
    }

    /// Register a handler for peer loss.
    pub fn on_disconnected(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.shared.handlers.on_disconnected(handler);
    }

    /// Register a handler for every parsed envelope.
    pub fn on_envelope(&self, handler: impl Fn(&Envelope) + Send + Sync + 'static) {
        self.shared.handlers.on_envelope(handler);
    }

    /// Bind, listen, and spawn the accept loop.
    ///
    /// Idempotent: calling while already running is a no-op. A failed bind
    /// is the only fatal error this layer produces.
    pub fn start(&self) -> Result<()> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            debug!("server already running");
            return Ok(());
        }

        let addr = self.shared.config.bind_addr;
        let listener = match TcpListener::bind(addr) {
            Ok(listener) => listener,
            Err(source) => {
                self.shared.running.store(false, Ordering::SeqCst);
                return Err(ServerError::Bind { addr, source });
            }
        };
        if let Err(err) = listener.set_nonblocking(true) {
            self.shared.running.store(false, Ordering::SeqCst);
            return Err(ServerError::Io(err));
        }

        *lock(&self.shared.local_addr) = listener.local_addr().ok();
        *lock(&self.shared.state) = ConnectionState::Listening;
        info!(%addr, "listening for telemetry producer");

        let shared = Arc::clone(&self.shared);
        match thread::Builder::new()
            .name("statelink-accept".into())
            .spawn(move || accept_loop(shared, listener))
        {
            Ok(handle) => {
                *lock(&self.accept_handle) = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.shared.running.store(false, Ordering::SeqCst);
                *lock(&self.shared.state) = ConnectionState::Disconnected;
                Err(ServerError::Io(err))
            }
        }
    }

    /// Write one record to the attached peer.
    ///
    /// Returns `false` when no peer is attached or the write fails — an
    /// unavailable capability, not an error. Callers must check.
    pub fn send(&self, record: &Value) -> bool {
        let mut peer = lock(&self.shared.peer);
        let Some(handle) = peer.as_mut() else {
            debug!("send skipped: no connected peer");
            return false;
        };
        match handle.writer.send(record) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "send to peer failed");
                false
            }
        }
    }

    /// Shut everything down: close sockets, stop loops, join workers.
    ///
    /// Idempotent and safe to call from any thread, including concurrently
    /// with an in-flight receive.
    pub fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("stopping server");

        if let Some(peer) = lock(&self.shared.peer).take() {
            let _ = peer.stream.shutdown(Shutdown::Both);
        }
        if let Some(handle) = lock(&self.accept_handle).take() {
            join_bounded(handle, self.shared.config.stop_join_timeout, "statelink-accept");
        }
        if let Some(handle) = lock(&self.shared.recv_handle).take() {
            join_bounded(handle, self.shared.config.stop_join_timeout, "statelink-recv");
        }
        *lock(&self.shared.state) = ConnectionState::Disconnected;
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *lock(&self.shared.state)
    }

    /// Whether a peer is currently attached.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Address the listener is actually bound to (useful with port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *lock(&self.shared.local_addr)
    }

    /// The server's configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }
}

impl Drop for ConnectionServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(shared: Arc<Shared>, listener: TcpListener) {
    while shared.running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, addr)) => attach_peer(&shared, stream, addr),
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                thread::sleep(shared.config.accept_poll);
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => {
                warn!(error = %err, "accept failed");
                thread::sleep(shared.config.accept_poll);
            }
        }
    }
    debug!("accept loop exited");
}

fn attach_peer(shared: &Arc<Shared>, stream: TcpStream, addr: SocketAddr) {
    // The listener is non-blocking; the accepted stream must not be.
    if let Err(err) = stream.set_nonblocking(false) {
        warn!(peer = %addr, error = %err, "failed to configure peer socket");
        return;
    }
    let _ = stream.set_nodelay(true);

    let frame_config = FrameConfig {
        max_line_len: shared.config.max_line_len,
        read_timeout: Some(shared.config.read_timeout),
        write_timeout: Some(shared.config.heartbeat_timeout),
    };

    let reader_stream = match stream.try_clone() {
        Ok(s) => s,
        Err(err) => {
            warn!(peer = %addr, error = %err, "failed to clone peer stream");
            return;
        }
    };
    let shutdown_stream = match stream.try_clone() {
        Ok(s) => s,
        Err(err) => {
            warn!(peer = %addr, error = %err, "failed to clone peer stream");
            return;
        }
    };
    let writer = match RecordWriter::with_config_tcp(stream, frame_config.clone()) {
        Ok(w) => w,
        Err(err) => {
            warn!(peer = %addr, error = %err, "failed to configure peer writer");
            return;
        }
    };
    let reader = match RecordReader::with_config_tcp(reader_stream, frame_config) {
        Ok(r) => r,
        Err(err) => {
            warn!(peer = %addr, error = %err, "failed to configure peer reader");
            return;
        }
    };

    // Tear the previous peer down completely before the new one is
    // installed: close its socket, then reap its receive thread (bounded
    // by the read timeout once the socket is gone).
    if let Some(previous) = lock(&shared.peer).take() {
        info!(peer = %addr, "new peer replaces existing connection");
        let _ = previous.stream.shutdown(Shutdown::Both);
    }
    if let Some(handle) = lock(&shared.recv_handle).take() {
        join_bounded(handle, shared.config.stop_join_timeout, "statelink-recv");
    }

    let generation = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
    *lock(&shared.peer) = Some(PeerHandle {
        generation,
        stream: shutdown_stream,
        writer,
    });
    *lock(&shared.state) = ConnectionState::Connected;
    info!(peer = %addr, "peer connected");
    shared.handlers.notify_connected(addr);

    let worker = Arc::clone(shared);
    match thread::Builder::new()
        .name("statelink-recv".into())
        .spawn(move || receive_loop(worker, reader, generation, addr))
    {
        Ok(handle) => *lock(&shared.recv_handle) = Some(handle),
        Err(err) => {
            warn!(error = %err, "failed to spawn receive loop");
            detach_peer(shared, generation);
        }
    }
}

fn receive_loop(
    shared: Arc<Shared>,
    mut reader: RecordReader<TcpStream>,
    generation: u64,
    addr: SocketAddr,
) {
    let heartbeat = shared.config.heartbeat_timeout;
    let mut last_rx = Instant::now();

    while shared.running.load(Ordering::SeqCst) {
        match reader.read_record() {
            Ok(Some(record)) => {
                last_rx = Instant::now();
                match Envelope::parse(&record) {
                    Ok(envelope) => shared.handlers.notify_envelope(&envelope),
                    Err(err) => {
                        warn!(peer = %addr, error = %err, "skipping invalid record");
                    }
                }
            }
            Ok(None) => {
                if last_rx.elapsed() >= heartbeat {
                    warn!(
                        peer = %addr,
                        timeout = ?heartbeat,
                        "peer silent past heartbeat window, dropping connection"
                    );
                    break;
                }
            }
            Err(FrameError::ConnectionClosed) => {
                info!(peer = %addr, "peer closed connection");
                break;
            }
            Err(err) => {
                warn!(peer = %addr, error = %err, "receive failed, dropping connection");
                break;
            }
        }
    }

    detach_peer(&shared, generation);
    debug!(peer = %addr, "receive loop exited");
}

/// Tear down the peer slot if it still belongs to `generation`.
///
/// A receive loop that was displaced by a newer peer finds a different
/// generation here and exits silently — `connected` for the replacement
/// has already fired, so a late `disconnected` would misorder the stream.
fn detach_peer(shared: &Shared, generation: u64) {
    let was_current = {
        let mut peer = lock(&shared.peer);
        let current = matches!(peer.as_ref(), Some(p) if p.generation == generation);
        if current {
            if let Some(p) = peer.take() {
                let _ = p.stream.shutdown(Shutdown::Both);
            }
        }
        current
    };

    if was_current {
        let running = shared.running.load(Ordering::SeqCst);
        *lock(&shared.state) = if running {
            ConnectionState::Listening
        } else {
            ConnectionState::Disconnected
        };
        shared.handlers.notify_disconnected();
    }
}

fn join_bounded(handle: JoinHandle<()>, timeout: Duration, name: &str) {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!(thread = name, "worker did not exit in time; detaching");
            return;
        }
        thread::sleep(Duration::from_millis(5));
    }
    if handle.join().is_err() {
        warn!(thread = name, "worker panicked");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
