//! A minimalist, low-latency WebSocket client (RFC 6455, client role only).
//!
//! Establishes a single outbound connection over plain TCP or TLS, performs
//! the HTTP Upgrade handshake, and exchanges frames according to the
//! WebSocket wire format. There is no event loop and no spawned thread: an
//! application drives the connection by calling [`client::Connection::poll`]
//! repeatedly from its own loop, and every read, parse, dispatch, and
//! keepalive check happens inline on that call.
//!
//! ```no_run
//! use fastws::client::{Connection, ConnectionStatus, FrameHandler, WSClient};
//! use fastws::config::ClientConfig;
//! use fastws::frame::Frame;
//! use fastws::transport::TlsTransport;
//!
//! struct Echo;
//!
//! impl FrameHandler<TlsTransport> for Echo {
//!     fn on_text(&mut self, client: &mut WSClient<TlsTransport>, frame: Frame<'_>) {
//!         let payload = frame.payload.to_vec();
//!         let _ = client.send_text(&payload);
//!     }
//! }
//!
//! # fn main() -> Result<(), fastws::error::Error> {
//! let config = ClientConfig::new("echo.example.com", "/");
//! let mut conn = Connection::<TlsTransport, _>::connect(&config, Echo)?;
//! while conn.client.status() == ConnectionStatus::Healthy {
//!     conn.poll()?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod client;
pub mod config;
pub mod error;
pub mod factory;
pub mod frame;
pub mod handshake;
pub mod parser;
pub mod rng;
pub mod transport;
