//! The connection orchestrator: handshake, the `poll()` read/dispatch loop,
//! ping/pong keepalive, and the graceful close handshake.
//!
//! This module splits what the original C++ `WSClient` does as a single
//! class into two Rust types so that a handler can re-entrantly call back
//! into the client from inside a callback without fighting the borrow
//! checker: [`WSClient`] is the facade handlers see and send through
//! (transport, parser, factory, status, RTT); [`Connection`] owns both the
//! client and the handler and drives `poll`/`close`. Because `client` and
//! `handler` are disjoint fields of `Connection`, borrowing them separately
//! inside `poll` lets a handler call `client.send_text(..)` while the
//! dispatch loop that invoked it is still on the stack.

use crate::config::ClientConfig;
use crate::error::Error;
use crate::factory::FrameFactory;
use crate::frame::{Frame, OpCode};
use crate::handshake::{build_websocket_handshake_request, generate_sec_websocket_key, response_accepts_upgrade};
use crate::parser::FrameParser;
use crate::transport::{ByteTransport, TcpTransport, TlsTransport};
use log::{debug, warn};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Unknown,
    Healthy,
    ClosedByServer,
    ClosedByClient,
    PingTimedOut,
    Failed,
}

/// Callbacks dispatched from [`Connection::poll`]. Implementations may
/// call back into `client` (e.g. `client.send_text(..)`) from any of these
/// — the dispatch loop does not hold a borrow across the callback.
pub trait FrameHandler<T: ByteTransport> {
    fn on_open(&mut self, client: &mut WSClient<T>) {
        let _ = client;
    }

    fn on_text(&mut self, client: &mut WSClient<T>, frame: Frame<'_>) {
        let _ = (client, frame);
    }

    fn on_binary(&mut self, client: &mut WSClient<T>, frame: Frame<'_>) {
        let _ = (client, frame);
    }

    fn on_continuation(&mut self, client: &mut WSClient<T>, frame: Frame<'_>) {
        let _ = (client, frame);
    }

    fn on_close(&mut self, client: &mut WSClient<T>, clean: bool) {
        let _ = (client, clean);
    }
}

/// Connection facade: transport, framing, keepalive state, and the
/// send/status/RTT surface a [`FrameHandler`] operates on.
pub struct WSClient<T: ByteTransport> {
    transport: T,
    parser: FrameParser,
    factory: FrameFactory,
    status: ConnectionStatus,
    connection_open: bool,
    ping_every: Duration,
    ping_timeout: Duration,
    close_timeout: Duration,
    waiting_for_pong: bool,
    ping_sent_at: Instant,
    last_rtt_ms: f64,
    max_frame_size: usize,
    max_reads: usize,
}

impl<T: ByteTransport> WSClient<T> {
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_open(&self) -> bool {
        self.connection_open
    }

    /// Last measured round-trip time of a ping/pong pair, in milliseconds.
    /// Zero until the first pong arrives.
    pub fn last_rtt(&self) -> f64 {
        self.last_rtt_ms
    }

    fn send_raw(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.transport.send(bytes).map_err(Error::from)
    }

    pub fn send_text(&mut self, payload: &[u8]) -> Result<(), Error> {
        let frame = self.factory.text(true, true, payload).to_vec();
        self.send_raw(&frame)
    }

    pub fn send_binary(&mut self, payload: &[u8]) -> Result<(), Error> {
        let frame = self.factory.binary(true, true, payload).to_vec();
        self.send_raw(&frame)
    }

    fn send_ping(&mut self, payload: &[u8]) -> Result<(), Error> {
        let frame = self.factory.ping(true, payload)?.to_vec();
        self.send_raw(&frame)
    }

    fn send_pong(&mut self, payload: &[u8]) -> Result<(), Error> {
        let frame = self.factory.pong(true, payload)?.to_vec();
        self.send_raw(&frame)
    }

    fn send_close(&mut self, payload: &[u8]) -> Result<(), Error> {
        let frame = self.factory.close(true, payload)?.to_vec();
        self.send_raw(&frame)
    }

    fn handle_pong(&mut self) {
        self.last_rtt_ms = self.ping_sent_at.elapsed().as_secs_f64() * 1000.0;
        self.waiting_for_pong = false;
        self.ping_sent_at = Instant::now();
    }

    fn update_keepalive(&mut self) {
        if self.waiting_for_pong {
            if self.ping_sent_at.elapsed() > self.ping_timeout {
                self.connection_open = false;
                self.status = ConnectionStatus::PingTimedOut;
                warn!("ping timed out");
            }
        } else if self.ping_sent_at.elapsed() > self.ping_every {
            self.waiting_for_pong = true;
            self.ping_sent_at = Instant::now();
            if let Err(e) = self.send_ping(&[]) {
                warn!("failed to send keepalive ping: {}", e);
            }
        }
    }
}

impl<T: ByteTransport> Drop for WSClient<T> {
    fn drop(&mut self) {
        if self.connection_open {
            let _ = self.send_close(&[]);
        }
    }
}

/// Owns a [`WSClient`] and its [`FrameHandler`], and drives the poll loop.
pub struct Connection<T: ByteTransport, H: FrameHandler<T>> {
    pub client: WSClient<T>,
    pub handler: H,
}

impl<H: FrameHandler<TcpTransport>> Connection<TcpTransport, H> {
    pub fn connect(config: &ClientConfig, handler: H) -> Result<Self, Error> {
        let transport = TcpTransport::connect(&config.host, config.port)?;
        Self::connect_with_transport(config, transport, handler)
    }
}

impl<H: FrameHandler<TlsTransport>> Connection<TlsTransport, H> {
    pub fn connect(config: &ClientConfig, handler: H) -> Result<Self, Error> {
        let transport = TlsTransport::connect(&config.host, config.port)?;
        Self::connect_with_transport(config, transport, handler)
    }
}

#[cfg(feature = "feature-native-tls")]
impl<H: FrameHandler<crate::transport::NativeTlsTransport>> Connection<crate::transport::NativeTlsTransport, H> {
    pub fn connect(config: &ClientConfig, handler: H) -> Result<Self, Error> {
        let transport = crate::transport::NativeTlsTransport::connect(&config.host, config.port)?;
        Self::connect_with_transport(config, transport, handler)
    }
}

impl<T: ByteTransport, H: FrameHandler<T>> Connection<T, H> {
    /// Runs the handshake over an already-connected transport. The two
    /// `connect` convenience constructors above use this after dialing
    /// [`TcpTransport`] or [`TlsTransport`]; callers using a different
    /// [`ByteTransport`] (e.g. `NativeTlsTransport` under
    /// `feature-native-tls`, or a test stub) connect their transport
    /// themselves and hand it here.
    pub fn connect_with_transport(config: &ClientConfig, mut transport: T, mut handler: H) -> Result<Self, Error> {
        let host_header = host_header(&config.host, config.port);
        let key = generate_sec_websocket_key();
        let request =
            build_websocket_handshake_request(&host_header, &config.path, &key, &config.extra_headers);
        transport.send(request.as_bytes())?;

        let mut response = Vec::new();
        let deadline = Instant::now() + config.connection_timeout;
        let mut accepted = false;
        let mut buf = crate::buffer::FrameBuffer::new(4096);
        while Instant::now() < deadline {
            buf.reset();
            if transport.read_into(&mut buf, 4096)? {
                response.extend_from_slice(buf.head());
                if response_accepts_upgrade(&response) {
                    accepted = true;
                    break;
                }
            }
            std::thread::sleep(Duration::from_millis(100));
        }

        let mut client = WSClient {
            transport,
            parser: FrameParser::new(config.initial_buffer_capacity),
            factory: FrameFactory::new(config.initial_buffer_capacity),
            status: ConnectionStatus::Unknown,
            connection_open: false,
            ping_every: config.ping_frequency,
            ping_timeout: config.ping_timeout,
            close_timeout: config.close_timeout,
            waiting_for_pong: false,
            ping_sent_at: Instant::now(),
            last_rtt_ms: 0.0,
            max_frame_size: config.max_frame_size,
            max_reads: config.max_reads,
        };

        if !accepted {
            client.status = ConnectionStatus::Failed;
            return Err(Error::NoUpgrade);
        }

        client.status = ConnectionStatus::Healthy;
        client.connection_open = true;
        debug!("handshake accepted for {}{}", config.host, config.path);
        handler.on_open(&mut client);

        Ok(Connection { client, handler })
    }

    /// Reads whatever is available and dispatches complete frames that
    /// result, up to `max_reads` per call (draining multiple frames from a
    /// single read, but yielding back to the caller rather than starving it
    /// on a busy connection), then runs the ping/pong keepalive check and
    /// returns the resulting status.
    ///
    /// A no-op once the connection is no longer open: once `status` leaves
    /// `Healthy` (server close, ping timeout, ...), every subsequent call
    /// just returns that terminal status without touching the transport.
    pub fn poll(&mut self) -> Result<ConnectionStatus, Error> {
        let client = &mut self.client;
        let handler = &mut self.handler;

        if !client.connection_open {
            return Ok(client.status);
        }

        let got_bytes = client
            .transport
            .read_into(client.parser.frame_buffer(), 1024)?;

        let mut next = client.parser.update_signal(got_bytes);
        let mut reads = 0usize;

        while let Some(frame) = next {
            if frame.payload.len() > client.max_frame_size {
                warn!("dropping frame exceeding max_frame_size");
                return Err(Error::MaxFrameSize(client.max_frame_size));
            }
            match frame.opcode {
                OpCode::Text => {
                    let owned = to_owned_frame(&frame);
                    handler.on_text(client, owned.as_frame());
                }
                OpCode::Binary => {
                    let owned = to_owned_frame(&frame);
                    handler.on_binary(client, owned.as_frame());
                }
                OpCode::Ping => {
                    let payload = frame.payload.to_vec();
                    client.send_pong(&payload)?;
                }
                OpCode::Pong => {
                    client.handle_pong();
                }
                OpCode::Close => {
                    client.connection_open = false;
                    client.status = ConnectionStatus::ClosedByServer;
                    client.send_close(&[])?;
                    handler.on_close(client, true);
                    return Ok(client.status);
                }
                OpCode::Continuation | OpCode::Unknown(_) => {
                    let owned = to_owned_frame(&frame);
                    handler.on_continuation(client, owned.as_frame());
                }
            }
            reads += 1;
            if reads >= client.max_reads {
                break;
            }
            next = client.parser.update_signal(false);
        }

        client.update_keepalive();
        Ok(client.status)
    }

    /// Idempotent graceful close: sends a CLOSE frame, then waits (polling
    /// every 100ms up to `close_timeout`) for the server's own CLOSE,
    /// discarding anything else that arrives in the meantime.
    pub fn close(&mut self) -> Result<bool, Error> {
        if !self.client.connection_open {
            return Ok(true);
        }
        let _ = self.poll();
        self.client.parser.clear();
        self.client.send_close(&[])?;
        self.client.status = ConnectionStatus::ClosedByClient;
        self.client.connection_open = false;

        let deadline = Instant::now() + self.client.close_timeout;
        let mut success = false;
        'wait: while Instant::now() < deadline {
            let got = self
                .client
                .transport
                .read_into(self.client.parser.frame_buffer(), 1024)?;
            let mut next = self.client.parser.update_signal(got);
            while let Some(frame) = next {
                if frame.opcode == OpCode::Close {
                    success = true;
                    break 'wait;
                }
                next = self.client.parser.update_signal(false);
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        self.handler.on_close(&mut self.client, success);
        Ok(success)
    }
}

impl<T: ByteTransport, H: FrameHandler<T>> Drop for Connection<T, H> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// The `Host` header value: `host:port` unless `port` is the default
/// HTTPS/WSS port 443, per spec.
fn host_header(host: &str, port: u16) -> String {
    if port == 443 {
        host.to_string()
    } else {
        format!("{}:{}", host, port)
    }
}

/// Owned copy of a borrowed [`Frame`], used to hand a frame to a handler
/// callback across the point where the parser's backing buffer could be
/// mutated again (a re-entrant `send_*` call does not touch the parser, but
/// the next `poll()` iteration's read does).
struct OwnedFrame {
    fin: bool,
    mask: bool,
    opcode: OpCode,
    masking_key: [u8; 4],
    payload: Vec<u8>,
}

impl OwnedFrame {
    fn as_frame(&self) -> Frame<'_> {
        Frame {
            fin: self.fin,
            mask: self.mask,
            opcode: self.opcode,
            masking_key: self.masking_key,
            payload: &self.payload,
        }
    }
}

fn to_owned_frame(frame: &Frame<'_>) -> OwnedFrame {
    OwnedFrame {
        fin: frame.fin,
        mask: frame.mask,
        opcode: frame.opcode,
        masking_key: frame.masking_key,
        payload: frame.payload.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::FrameBuffer;
    use crate::error::TransportError;
    use std::collections::VecDeque;

    /// In-memory transport stub so the poll loop and keepalive logic can be
    /// exercised without a real socket.
    struct StubTransport {
        inbound: VecDeque<u8>,
        sent: Vec<Vec<u8>>,
    }

    impl StubTransport {
        fn with_inbound(bytes: &[u8]) -> Self {
            StubTransport {
                inbound: bytes.iter().copied().collect(),
                sent: Vec::new(),
            }
        }
    }

    impl ByteTransport for StubTransport {
        fn connect(_host: &str, _port: u16) -> Result<Self, TransportError> {
            Ok(StubTransport {
                inbound: VecDeque::new(),
                sent: Vec::new(),
            })
        }

        fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
            self.sent.push(data.to_vec());
            Ok(())
        }

        fn read_into(&mut self, buffer: &mut FrameBuffer, chunk_hint: usize) -> Result<bool, TransportError> {
            if self.inbound.is_empty() {
                return Ok(false);
            }
            let mut drained = false;
            while let Some(byte) = self.inbound.pop_front() {
                buffer.ensure_extra_space(1);
                buffer.push_back(byte);
                drained = true;
                if buffer.size() >= chunk_hint {
                    break;
                }
            }
            Ok(drained)
        }
    }

    #[derive(Default)]
    struct RecordingHandler {
        opened: bool,
        texts: Vec<Vec<u8>>,
        closed: Option<bool>,
    }

    impl FrameHandler<StubTransport> for RecordingHandler {
        fn on_open(&mut self, _client: &mut WSClient<StubTransport>) {
            self.opened = true;
        }

        fn on_text(&mut self, _client: &mut WSClient<StubTransport>, frame: Frame<'_>) {
            self.texts.push(frame.payload.to_vec());
        }

        fn on_close(&mut self, _client: &mut WSClient<StubTransport>, clean: bool) {
            self.closed = Some(clean);
        }
    }

    fn make_client(transport: StubTransport) -> WSClient<StubTransport> {
        WSClient {
            transport,
            parser: FrameParser::new(256),
            factory: FrameFactory::new(256),
            status: ConnectionStatus::Healthy,
            connection_open: true,
            ping_every: Duration::from_secs(60),
            ping_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_millis(200),
            waiting_for_pong: false,
            ping_sent_at: Instant::now(),
            last_rtt_ms: 0.0,
            max_frame_size: 1 << 20,
            max_reads: 4,
        }
    }

    #[test]
    fn poll_dispatches_text_frame_to_handler() {
        let wire: &[u8] = &[0x81, 0x02, b'h', b'i'];
        let client = make_client(StubTransport::with_inbound(wire));
        let mut conn = Connection {
            client,
            handler: RecordingHandler::default(),
        };
        conn.poll().unwrap();
        assert_eq!(conn.handler.texts, vec![b"hi".to_vec()]);
    }

    #[test]
    fn poll_replies_to_ping_with_pong() {
        let wire: &[u8] = &[0x89, 0x00];
        let client = make_client(StubTransport::with_inbound(wire));
        let mut conn = Connection {
            client,
            handler: RecordingHandler::default(),
        };
        conn.poll().unwrap();
        assert_eq!(conn.client.transport.sent.len(), 1);
        assert_eq!(conn.client.transport.sent[0][0] & 0x0F, 0x0A);
    }

    #[test]
    fn poll_on_close_frame_marks_closed_by_server() {
        let wire: &[u8] = &[0x88, 0x00];
        let client = make_client(StubTransport::with_inbound(wire));
        let mut conn = Connection {
            client,
            handler: RecordingHandler::default(),
        };
        let status = conn.poll().unwrap();
        assert_eq!(status, ConnectionStatus::ClosedByServer);
        assert_eq!(conn.handler.closed, Some(true));
    }

    #[test]
    fn ping_timeout_flips_status_when_pong_never_arrives() {
        let client = make_client(StubTransport::with_inbound(&[]));
        let mut conn = Connection {
            client,
            handler: RecordingHandler::default(),
        };
        conn.client.ping_every = Duration::from_millis(0);
        conn.client.ping_timeout = Duration::from_millis(0);
        conn.client.waiting_for_pong = true;
        conn.client.ping_sent_at = Instant::now() - Duration::from_secs(1);
        conn.poll().unwrap();
        assert_eq!(conn.client.status, ConnectionStatus::PingTimedOut);
    }

    #[test]
    fn pong_restarts_the_ping_timer() {
        let client = make_client(StubTransport::with_inbound(&[]));
        let mut conn = Connection {
            client,
            handler: RecordingHandler::default(),
        };
        conn.client.waiting_for_pong = true;
        conn.client.ping_sent_at = Instant::now() - Duration::from_secs(5);
        conn.client.handle_pong();
        assert!(!conn.client.waiting_for_pong);
        assert!(conn.client.ping_sent_at.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn poll_dispatches_at_most_max_reads_frames_per_call() {
        let mut wire = Vec::new();
        for _ in 0..6 {
            wire.extend_from_slice(&[0x81, 0x02, b'h', b'i']);
        }
        let client = make_client(StubTransport::with_inbound(&wire));
        let mut conn = Connection {
            client,
            handler: RecordingHandler::default(),
        };
        conn.client.max_reads = 4;
        conn.poll().unwrap();
        assert_eq!(conn.handler.texts.len(), 4);
        conn.poll().unwrap();
        assert_eq!(conn.handler.texts.len(), 6);
    }

    #[test]
    fn poll_is_a_no_op_after_connection_closes() {
        let wire: &[u8] = &[0x88, 0x00];
        let client = make_client(StubTransport::with_inbound(wire));
        let mut conn = Connection {
            client,
            handler: RecordingHandler::default(),
        };
        let status = conn.poll().unwrap();
        assert_eq!(status, ConnectionStatus::ClosedByServer);
        let sent_before = conn.client.transport.sent.len();
        let status_again = conn.poll().unwrap();
        assert_eq!(status_again, ConnectionStatus::ClosedByServer);
        assert_eq!(conn.client.transport.sent.len(), sent_before);
    }

    #[test]
    fn host_header_omits_port_only_for_443() {
        assert_eq!(host_header("example.com", 443), "example.com");
        assert_eq!(host_header("example.com", 80), "example.com:80");
        assert_eq!(host_header("example.com", 8080), "example.com:8080");
    }
}
