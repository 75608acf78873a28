//! TCP transport carrying raw PCM chunks.
//!
//! Thread layout per endpoint: a worker performing the blocking socket
//! I/O (connect + handshake on the sender, the per-connection receive
//! loop on the receiver), an acceptor owning the listening socket
//! (receiver only), and a keepalive timer emitting zero-sized chunks
//! every [`KEEPALIVE_INTERVAL`] while streaming. `stop()` flips the
//! running flag, wakes the keepalive condvar, shuts down live sockets to
//! abort blocked reads and writes, and joins every thread.

use crate::config::StreamConfig;
use crate::protocol::{
    ChunkHeader, StreamHeader, CHUNK_HEADER_SIZE, CONNECT_TIMEOUT, KEEPALIVE_INTERVAL,
    STREAM_HEADER_SIZE,
};
use crate::transport::{
    AudioReceivedCallback, ConnectionCallback, Transport, TransportError, TransportState,
    TransportStatus,
};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{ErrorKind, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener, TcpStream};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Poll period of the non-blocking accept loop
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Wake period of the sender worker's park loop
const PARK_INTERVAL: Duration = Duration::from_millis(100);

/// Peer identity and last error, written only on transitions.
///
/// The state field in [`Shared`] is authoritative; a status read that
/// lags these by one transition is tolerable.
#[derive(Default)]
struct LinkInfo {
    peer_address: String,
    peer_port: u16,
    error_message: String,
}

/// Write side of the connection.
///
/// One mutex serializes `send_audio` against the keepalive timer so a
/// chunk header and its payload are never interleaved with another chunk.
#[derive(Default)]
struct SendLane {
    stream: Option<TcpStream>,
    /// Reused wire buffer: chunk header + interleaved little-endian payload
    wire: Vec<u8>,
}

/// Cloned socket handles used by `stop()` to abort blocked I/O without
/// taking the send lane (a stalled write may hold that lock indefinitely)
#[derive(Default)]
struct Sockets {
    sender: Option<TcpStream>,
    client: Option<TcpStream>,
}

struct Shared {
    running: AtomicBool,
    state: AtomicU8,
    sequence: AtomicU32,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    packets_lost: AtomicU32,
    config: Mutex<StreamConfig>,
    link: Mutex<LinkInfo>,
    send_lane: Mutex<SendLane>,
    sockets: Mutex<Sockets>,
    /// Paired with `parked`; signalled by `stop()` to cut short the
    /// keepalive wait and the sender park loop
    wakeup: Condvar,
    parked: Mutex<()>,
    audio_callback: Mutex<Option<AudioReceivedCallback>>,
    connection_callback: Mutex<Option<ConnectionCallback>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            state: AtomicU8::new(TransportState::Disconnected as u8),
            sequence: AtomicU32::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            packets_lost: AtomicU32::new(0),
            config: Mutex::new(StreamConfig::default()),
            link: Mutex::new(LinkInfo::default()),
            send_lane: Mutex::new(SendLane::default()),
            sockets: Mutex::new(Sockets::default()),
            wakeup: Condvar::new(),
            parked: Mutex::new(()),
            audio_callback: Mutex::new(None),
            connection_callback: Mutex::new(None),
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn state(&self) -> TransportState {
        TransportState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: TransportState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Record a fatal session error and enter the `Error` state
    fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        error!("{message}");
        self.link.lock().unwrap().error_message = message;
        self.set_state(TransportState::Error);
    }

    fn set_peer(&self, address: String, port: u16) {
        let mut link = self.link.lock().unwrap();
        link.peer_address = address;
        link.peer_port = port;
    }

    /// Classify a failed chunk write: peer close lands in `Disconnected`,
    /// anything else is an `Error`
    fn fail_write(&self, err: &std::io::Error) {
        if matches!(
            err.kind(),
            ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
        ) {
            info!("peer closed the connection");
            self.link.lock().unwrap().error_message = "Connection lost".to_string();
            self.set_state(TransportState::Disconnected);
        } else {
            self.fail(format!("Failed to send audio chunk: {err}"));
        }
    }

    fn notify_connection(&self, connected: bool) {
        let callback = self.connection_callback.lock().unwrap().clone();
        if let Some(callback) = callback {
            // A panicking callback must not take down a pipeline thread.
            if catch_unwind(AssertUnwindSafe(|| callback(connected))).is_err() {
                warn!("connection callback panicked");
            }
        }
    }

    fn emit_audio(&self, samples: &[f32], channels: u16, frames: usize) {
        let callback = self.audio_callback.lock().unwrap().clone();
        if let Some(callback) = callback {
            if catch_unwind(AssertUnwindSafe(|| callback(samples, channels, frames))).is_err() {
                warn!("audio callback panicked");
            }
        }
    }

    /// Fresh session: zero the counters and forget the previous peer
    fn reset_session(&self) {
        self.sequence.store(0, Ordering::Relaxed);
        self.bytes_sent.store(0, Ordering::Relaxed);
        self.bytes_received.store(0, Ordering::Relaxed);
        self.packets_lost.store(0, Ordering::Relaxed);
        *self.link.lock().unwrap() = LinkInfo::default();
    }
}

/// Streams raw float32 PCM over a single TCP connection.
///
/// See the module docs for the thread model. All methods take `&self`;
/// the endpoint is shared behind an `Arc` between the control surface,
/// the audio callback, and its own background threads.
pub struct TcpPcmTransport {
    shared: Arc<Shared>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for TcpPcmTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpPcmTransport {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::new()),
            threads: Mutex::new(Vec::new()),
        }
    }

    /// Bind the listening socket with `SO_REUSEADDR` so a stopped
    /// receiver can rebind the port immediately
    fn bind_listener(port: u16) -> std::io::Result<TcpListener> {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&SocketAddr::from(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)).into())?;
        socket.listen(1)?;
        Ok(socket.into())
    }
}

impl Transport for TcpPcmTransport {
    fn name(&self) -> &'static str {
        "tcp-pcm"
    }

    fn description(&self) -> &'static str {
        "TCP with raw PCM audio"
    }

    fn start_sender(
        &self,
        target: &str,
        port: u16,
        config: StreamConfig,
    ) -> Result<(), TransportError> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Err(TransportError::AlreadyRunning);
        }

        let address: Ipv4Addr = match target.parse() {
            Ok(address) => address,
            Err(_) => {
                self.shared.reset_session();
                self.shared.fail(format!("Invalid address: {target}"));
                self.shared.running.store(false, Ordering::Release);
                return Err(TransportError::InvalidAddress(target.to_string()));
            }
        };

        self.shared.reset_session();
        *self.shared.config.lock().unwrap() = config;
        self.shared.set_state(TransportState::Connecting);
        info!(%target, port, "starting sender");

        let peer = SocketAddrV4::new(address, port);
        let mut threads = self.threads.lock().unwrap();
        let shared = Arc::clone(&self.shared);
        threads.push(thread::spawn(move || sender_worker(shared, peer)));
        let shared = Arc::clone(&self.shared);
        threads.push(thread::spawn(move || keepalive_worker(shared)));

        Ok(())
    }

    fn start_receiver(&self, port: u16, config: StreamConfig) -> Result<(), TransportError> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Err(TransportError::AlreadyRunning);
        }

        self.shared.reset_session();
        *self.shared.config.lock().unwrap() = config;

        let listener = match Self::bind_listener(port) {
            Ok(listener) => listener,
            Err(source) => {
                self.shared.fail(format!("Failed to bind to port {port}"));
                self.shared.running.store(false, Ordering::Release);
                return Err(TransportError::Bind { port, source });
            }
        };
        if let Err(source) = listener.set_nonblocking(true) {
            self.shared.fail(format!("Failed to listen: {source}"));
            self.shared.running.store(false, Ordering::Release);
            return Err(TransportError::Listen(source));
        }

        self.shared.set_state(TransportState::Connecting);
        info!(port, "starting receiver");

        let mut threads = self.threads.lock().unwrap();
        let shared = Arc::clone(&self.shared);
        threads.push(thread::spawn(move || acceptor(shared, listener)));
        let shared = Arc::clone(&self.shared);
        threads.push(thread::spawn(move || keepalive_worker(shared)));

        Ok(())
    }

    fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.wakeup.notify_all();

        {
            let mut sockets = self.shared.sockets.lock().unwrap();
            for stream in [sockets.sender.take(), sockets.client.take()]
                .into_iter()
                .flatten()
            {
                let _ = stream.shutdown(std::net::Shutdown::Both);
            }
        }

        let handles: Vec<JoinHandle<()>> = self.threads.lock().unwrap().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }

        self.shared.send_lane.lock().unwrap().stream = None;
        self.shared.set_state(TransportState::Disconnected);
        debug!("transport stopped");
    }

    fn send_audio(&self, channel_data: &[&[f32]]) -> bool {
        if self.shared.state() != TransportState::Streaming {
            return false;
        }

        let channels = channel_data.len();
        let frames = channel_data.first().map(|c| c.len()).unwrap_or(0);
        if channels == 0 || frames == 0 {
            return false;
        }

        let mut guard = self.shared.send_lane.lock().unwrap();
        let lane = &mut *guard;
        let Some(stream) = lane.stream.as_mut() else {
            return false;
        };

        let payload_len = (frames * channels * 4) as u32;
        let header = ChunkHeader {
            size: payload_len,
            sequence: self.shared.sequence.fetch_add(1, Ordering::Relaxed),
        };

        // Interleave straight into the wire buffer behind the header so
        // header and payload go out in one write.
        lane.wire.clear();
        lane.wire.extend_from_slice(&header.encode());
        for frame in 0..frames {
            for channel in channel_data {
                lane.wire.extend_from_slice(&channel[frame].to_le_bytes());
            }
        }

        if let Err(err) = stream.write_all(&lane.wire) {
            self.shared.fail_write(&err);
            return false;
        }

        self.shared
            .bytes_sent
            .fetch_add(lane.wire.len() as u64, Ordering::Relaxed);
        true
    }

    fn status(&self) -> TransportStatus {
        let link = self.shared.link.lock().unwrap();
        TransportStatus {
            state: self.shared.state(),
            peer_address: link.peer_address.clone(),
            peer_port: link.peer_port,
            bytes_sent: self.shared.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.shared.bytes_received.load(Ordering::Relaxed),
            packets_lost: self.shared.packets_lost.load(Ordering::Relaxed),
            error_message: link.error_message.clone(),
        }
    }

    fn set_audio_received_callback(&self, callback: AudioReceivedCallback) {
        *self.shared.audio_callback.lock().unwrap() = Some(callback);
    }

    fn set_connection_callback(&self, callback: ConnectionCallback) {
        *self.shared.connection_callback.lock().unwrap() = Some(callback);
    }
}

impl Drop for TcpPcmTransport {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sender worker: connect, handshake, then park until stopped.
///
/// Audio itself flows through [`TcpPcmTransport::send_audio`] on the
/// caller's (typically realtime) thread.
fn sender_worker(shared: Arc<Shared>, peer: SocketAddrV4) {
    let stream = match TcpStream::connect_timeout(&peer.into(), CONNECT_TIMEOUT) {
        Ok(stream) => stream,
        Err(err) => {
            shared.fail(format!("Failed to connect to {peer}: {err}"));
            return;
        }
    };
    if let Err(err) = stream.set_nodelay(true) {
        warn!("failed to set TCP_NODELAY: {err}");
    }

    // Publish the shutdown handle before re-checking the running flag:
    // whichever side loses the race with stop() still closes the socket.
    shared.sockets.lock().unwrap().sender = stream.try_clone().ok();
    if !shared.is_running() {
        let _ = stream.shutdown(std::net::Shutdown::Both);
        return;
    }

    shared.set_peer(peer.ip().to_string(), peer.port());
    shared.set_state(TransportState::Connected);
    shared.notify_connection(true);

    // Handshake: one stream header, then the connection is chunk-only.
    let header = StreamHeader::from_config(&shared.config.lock().unwrap());
    let mut lane = shared.send_lane.lock().unwrap();
    if let Err(err) = (&stream).write_all(&header.encode()) {
        drop(lane);
        shared.fail(format!("Failed to send stream header: {err}"));
        return;
    }
    lane.stream = Some(stream);
    drop(lane);

    shared.set_state(TransportState::Streaming);
    info!(peer = %peer, "sender streaming");

    let mut guard = shared.parked.lock().unwrap();
    while shared.is_running() && shared.state() == TransportState::Streaming {
        let (parked, _) = shared.wakeup.wait_timeout(guard, PARK_INTERVAL).unwrap();
        guard = parked;
    }
}

/// Receiver acceptor: owns the listening socket, admits one client at a
/// time, and runs the receive loop on a worker thread per connection.
fn acceptor(shared: Arc<Shared>, listener: TcpListener) {
    while shared.is_running() {
        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
                continue;
            }
            Err(err) => {
                if shared.is_running() {
                    warn!("accept failed: {err}");
                    shared.link.lock().unwrap().error_message = "Accept failed".to_string();
                }
                thread::sleep(ACCEPT_POLL_INTERVAL);
                continue;
            }
        };
        // The listener is non-blocking; the accepted stream must not be.
        if stream.set_nonblocking(false).is_err() {
            continue;
        }
        if let Err(err) = stream.set_nodelay(true) {
            warn!("failed to set TCP_NODELAY: {err}");
        }

        // Publish the shutdown handle before re-checking the running flag
        // so a concurrent stop() cannot leave the receive loop blocked on
        // a socket nobody can close.
        shared.sockets.lock().unwrap().client = stream.try_clone().ok();
        if !shared.is_running() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
            break;
        }
        shared.set_peer(peer.ip().to_string(), peer.port());
        shared.set_state(TransportState::Connected);
        shared.notify_connection(true);
        info!(%peer, "client connected");

        let worker_shared = Arc::clone(&shared);
        let worker = thread::spawn(move || receive_loop(worker_shared, stream));
        let _ = worker.join();

        shared.notify_connection(false);
        shared.sockets.lock().unwrap().client = None;

        if shared.is_running() {
            info!(%peer, "client detached, waiting for next");
            shared.set_state(TransportState::Connecting);
        }
    }
}

/// Per-connection receive loop: handshake, then chunks until the peer
/// goes away or the endpoint stops.
fn receive_loop(shared: Arc<Shared>, mut stream: TcpStream) {
    let mut header_buf = [0u8; STREAM_HEADER_SIZE];
    if stream.read_exact(&mut header_buf).is_err() {
        shared.fail("Failed to receive stream header");
        return;
    }

    let header = match StreamHeader::decode(&header_buf) {
        Ok(header) if header.channels > 0 => header,
        _ => {
            shared.fail("Invalid stream header");
            return;
        }
    };

    // The handshake is authoritative: adopt the sender's parameters.
    let channels = header.channels;
    *shared.config.lock().unwrap() = header.to_config();
    shared.set_state(TransportState::Streaming);
    info!(
        sample_rate = header.sample_rate,
        channels = header.channels,
        buffer_size = header.buffer_size,
        "receiver streaming"
    );

    let mut chunk_buf = [0u8; CHUNK_HEADER_SIZE];
    let mut payload: Vec<u8> = Vec::new();
    let mut samples: Vec<f32> = Vec::new();
    let mut expected_sequence: u32 = 0;

    while shared.is_running() && shared.state() == TransportState::Streaming {
        if stream.read_exact(&mut chunk_buf).is_err() {
            if shared.is_running() {
                shared.link.lock().unwrap().error_message = "Connection lost".to_string();
                shared.set_state(TransportState::Disconnected);
            }
            break;
        }

        let chunk = ChunkHeader::from_bytes(chunk_buf);

        // Every chunk consumes a sequence number, keepalives included;
        // a gap means chunks went missing in transit.
        if chunk.sequence != expected_sequence {
            let lost = chunk.sequence.wrapping_sub(expected_sequence);
            warn!(
                expected = expected_sequence,
                actual = chunk.sequence,
                lost,
                "sequence gap"
            );
            shared.packets_lost.fetch_add(lost, Ordering::Relaxed);
        }
        expected_sequence = chunk.sequence.wrapping_add(1);

        if chunk.is_keepalive() {
            trace!(sequence = chunk.sequence, "keepalive");
            continue;
        }

        payload.resize(chunk.size as usize, 0);
        if stream.read_exact(&mut payload).is_err() {
            if shared.is_running() {
                shared.fail("Failed to receive audio data");
            }
            break;
        }

        shared
            .bytes_received
            .fetch_add((CHUNK_HEADER_SIZE + chunk.size as usize) as u64, Ordering::Relaxed);

        samples.clear();
        samples.extend(
            payload
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        );

        let frames = samples.len() / channels as usize;
        shared.emit_audio(&samples, channels, frames);
    }
}

/// Keepalive timer: a zero-sized chunk every [`KEEPALIVE_INTERVAL`]
/// while streaming, so an idle link stays verifiably alive
fn keepalive_worker(shared: Arc<Shared>) {
    loop {
        {
            // Wake early only when stop() flips the running flag; the
            // predicate re-check also covers a notify that fired before
            // we were waiting.
            let guard = shared.parked.lock().unwrap();
            let _ = shared
                .wakeup
                .wait_timeout_while(guard, KEEPALIVE_INTERVAL, |_| shared.is_running())
                .unwrap();
        }
        if !shared.is_running() {
            break;
        }
        if shared.state() != TransportState::Streaming {
            continue;
        }

        let mut guard = shared.send_lane.lock().unwrap();
        let lane = &mut *guard;
        let Some(stream) = lane.stream.as_mut() else {
            continue;
        };

        let header = ChunkHeader::keepalive(shared.sequence.fetch_add(1, Ordering::Relaxed));
        match stream.write_all(&header.encode()) {
            Ok(()) => {
                shared
                    .bytes_sent
                    .fetch_add(CHUNK_HEADER_SIZE as u64, Ordering::Relaxed);
                trace!(sequence = header.sequence, "keepalive sent");
            }
            Err(err) => {
                drop(guard);
                shared.fail_write(&err);
            }
        }
    }
}
