use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),

    // Handshake errors
    #[error("server didn't upgrade the connection (no HTTP/1.1 101 response within the timeout)")]
    NoUpgrade,

    // Framing errors
    #[error("control frame payload can't be greater than 125 bytes")]
    ControlFramePayloadSize,

    #[error("frame exceeds the configured max_frame_size ({0} bytes)")]
    MaxFrameSize(usize),
}

/// Errors surfaced by [`crate::transport::ByteTransport`] implementations.
///
/// Mirrors the original socket wrapper's exception taxonomy: connect
/// failures, would-block-on-send (the client does not retry or queue — see
/// the design notes on why), and the underlying IO/TLS errors.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to resolve host: {0}")]
    Resolve(String),

    #[error("failed to connect to server")]
    Connect(#[source] io::Error),

    #[error("TLS handshake failed: {0}")]
    TlsHandshake(String),

    #[error("socket would block on send; this client does not buffer or retry partial writes")]
    WouldBlockOnSend,

    #[error("{source}")]
    Io {
        #[from]
        source: io::Error,
    },
}
