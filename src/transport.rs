//! Non-blocking byte transports.
//!
//! Mirrors `SocketWrapper`/`SSLSocketWrapper` from the C++ client this crate
//! is modeled on: a thin wrapper around a non-blocking socket offering
//! `send` (loops until the whole buffer is written or the socket would
//! block, at which point it surfaces an error rather than queuing) and
//! `read_into` (drains whatever is currently available straight into a
//! [`FrameBuffer`], returning whether any new bytes arrived). No thread,
//! no event loop — the caller decides when to call these.

use crate::buffer::FrameBuffer;
use crate::error::TransportError;
use log::{debug, trace};
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

/// A byte-oriented, non-blocking connection to a WebSocket server.
///
/// Implementors must put the underlying socket in non-blocking mode before
/// returning it from `connect`.
pub trait ByteTransport {
    fn connect(host: &str, port: u16) -> Result<Self, TransportError>
    where
        Self: Sized;

    /// Writes the whole buffer. Returns
    /// [`TransportError::WouldBlockOnSend`] rather than retrying or
    /// buffering a partial write — see the design notes on why.
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Drains whatever bytes are currently available on the socket into
    /// `buffer`'s tail, looping until the socket would block or the peer
    /// closed the connection. Returns whether any bytes were read.
    fn read_into(&mut self, buffer: &mut FrameBuffer, chunk_hint: usize) -> Result<bool, TransportError>;
}

fn connect_tcp_nonblocking(host: &str, port: u16) -> Result<TcpStream, TransportError> {
    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|e| TransportError::Resolve(e.to_string()))?
        .next()
        .ok_or_else(|| TransportError::Resolve(format!("no addresses for {}:{}", host, port)))?;

    let stream = TcpStream::connect(addr).map_err(TransportError::Connect)?;
    stream.set_nodelay(true)?;
    stream.set_nonblocking(true)?;
    debug!("tcp connected to {}:{}", host, port);
    Ok(stream)
}

fn would_block(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
}

/// Plain (non-TLS) transport, `ws://`.
pub struct TcpTransport {
    stream: TcpStream,
}

impl ByteTransport for TcpTransport {
    fn connect(host: &str, port: u16) -> Result<Self, TransportError> {
        Ok(TcpTransport {
            stream: connect_tcp_nonblocking(host, port)?,
        })
    }

    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        match self.stream.write_all(data) {
            Ok(()) => Ok(()),
            Err(e) if would_block(&e) => Err(TransportError::WouldBlockOnSend),
            Err(e) => Err(TransportError::Io { source: e }),
        }
    }

    fn read_into(&mut self, buffer: &mut FrameBuffer, chunk_hint: usize) -> Result<bool, TransportError> {
        let mut new_data = false;
        loop {
            buffer.ensure_extra_space(chunk_hint);
            let tail = &mut buffer.tail()[..chunk_hint];
            match self.stream.read(tail) {
                Ok(0) => break,
                Ok(n) => {
                    new_data = true;
                    buffer.claim_space(n);
                    trace!("tcp read {} bytes", n);
                    if n < chunk_hint {
                        break;
                    }
                }
                Err(e) if would_block(&e) => break,
                Err(e) => return Err(TransportError::Io { source: e }),
            }
        }
        Ok(new_data)
    }
}

/// TLS transport over `rustls`, `wss://` (default backend).
pub struct TlsTransport {
    stream: TcpStream,
    conn: rustls::ClientConnection,
}

impl TlsTransport {
    fn drive_handshake(&mut self, timeout: Duration) -> Result<(), TransportError> {
        let deadline = std::time::Instant::now() + timeout;
        while self.conn.is_handshaking() {
            if std::time::Instant::now() > deadline {
                return Err(TransportError::TlsHandshake("handshake timed out".into()));
            }
            match self.conn.complete_io(&mut self.stream) {
                Ok(_) => {}
                Err(e) if would_block(&e) => {
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(e) => return Err(TransportError::TlsHandshake(e.to_string())),
            }
        }
        Ok(())
    }

    pub fn connect_with_config(
        host: &str,
        port: u16,
        config: Arc<rustls::ClientConfig>,
    ) -> Result<Self, TransportError> {
        let stream = connect_tcp_nonblocking(host, port)?;
        let server_name = pki_types::ServerName::try_from(host.to_string())
            .map_err(|e| TransportError::TlsHandshake(e.to_string()))?;
        let conn = rustls::ClientConnection::new(config, server_name)
            .map_err(|e| TransportError::TlsHandshake(e.to_string()))?;
        let mut transport = TlsTransport { stream, conn };
        transport.drive_handshake(Duration::from_secs(10))?;
        debug!("tls handshake complete with {}:{}", host, port);
        Ok(transport)
    }

    fn default_config() -> Arc<rustls::ClientConfig> {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        )
    }
}

impl ByteTransport for TlsTransport {
    fn connect(host: &str, port: u16) -> Result<Self, TransportError> {
        Self::connect_with_config(host, port, Self::default_config())
    }

    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        io::Write::write_all(&mut self.conn.writer(), data)
            .map_err(|e| TransportError::Io { source: e })?;
        match self.conn.complete_io(&mut self.stream) {
            Ok(_) => Ok(()),
            Err(e) if would_block(&e) => Err(TransportError::WouldBlockOnSend),
            Err(e) => Err(TransportError::Io { source: e }),
        }
    }

    fn read_into(&mut self, buffer: &mut FrameBuffer, chunk_hint: usize) -> Result<bool, TransportError> {
        let mut new_data = false;
        loop {
            match self.conn.read_tls(&mut self.stream) {
                Ok(0) => break,
                Ok(_) => {
                    if let Err(e) = self.conn.process_new_packets() {
                        return Err(TransportError::TlsHandshake(e.to_string()));
                    }
                }
                Err(e) if would_block(&e) => break,
                Err(e) => return Err(TransportError::Io { source: e }),
            }

            loop {
                buffer.ensure_extra_space(chunk_hint);
                let tail = &mut buffer.tail()[..chunk_hint];
                match self.conn.reader().read(tail) {
                    Ok(0) => break,
                    Ok(n) => {
                        new_data = true;
                        buffer.claim_space(n);
                        if n < chunk_hint {
                            break;
                        }
                    }
                    Err(e) if would_block(&e) => break,
                    Err(e) => return Err(TransportError::Io { source: e }),
                }
            }
        }
        Ok(new_data)
    }
}

/// TLS transport over `native-tls`, enabled with `feature-native-tls`.
#[cfg(feature = "feature-native-tls")]
pub struct NativeTlsTransport {
    stream: native_tls::TlsStream<TcpStream>,
}

#[cfg(feature = "feature-native-tls")]
impl ByteTransport for NativeTlsTransport {
    fn connect(host: &str, port: u16) -> Result<Self, TransportError> {
        let stream = connect_tcp_nonblocking(host, port)?;
        let connector = native_tls::TlsConnector::new()
            .map_err(|e| TransportError::TlsHandshake(e.to_string()))?;

        let mut handshake_result = connector.connect(host, stream);
        loop {
            match handshake_result {
                Ok(stream) => return Ok(NativeTlsTransport { stream }),
                Err(native_tls::HandshakeError::WouldBlock(mid)) => {
                    std::thread::sleep(Duration::from_millis(10));
                    handshake_result = mid.handshake();
                }
                Err(native_tls::HandshakeError::Failure(e)) => {
                    return Err(TransportError::TlsHandshake(e.to_string()))
                }
            }
        }
    }

    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        match self.stream.write_all(data) {
            Ok(()) => Ok(()),
            Err(e) if would_block(&e) => Err(TransportError::WouldBlockOnSend),
            Err(e) => Err(TransportError::Io { source: e }),
        }
    }

    fn read_into(&mut self, buffer: &mut FrameBuffer, chunk_hint: usize) -> Result<bool, TransportError> {
        let mut new_data = false;
        loop {
            buffer.ensure_extra_space(chunk_hint);
            let tail = &mut buffer.tail()[..chunk_hint];
            match self.stream.read(tail) {
                Ok(0) => break,
                Ok(n) => {
                    new_data = true;
                    buffer.claim_space(n);
                    if n < chunk_hint {
                        break;
                    }
                }
                Err(e) if would_block(&e) => break,
                Err(e) => return Err(TransportError::Io { source: e }),
            }
        }
        Ok(new_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn would_block_matches_only_that_error_kind() {
        let wb = io::Error::from(io::ErrorKind::WouldBlock);
        let other = io::Error::from(io::ErrorKind::ConnectionReset);
        assert!(would_block(&wb));
        assert!(!would_block(&other));
    }
}
