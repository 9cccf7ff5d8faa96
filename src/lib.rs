//! A small non-blocking HTTP/1.1 server with RFC 6455 WebSocket upgrade
//! support, a static asset fallback, and an ordered middleware chain.
//!
//! Unlike an async-runtime server, [`Server`] is a single cooperative
//! loop: one thread owns every connection, waits for readiness with a
//! bounded timeout, and drives HTTP parsing, the WebSocket handshake, and
//! frame decoding itself. Cross-thread effects (broadcasting a frame to
//! every connected WebSocket) go through [`BroadcastHandle`] rather than a
//! lock on the connection set.

pub mod assets;
pub mod config;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod http;
pub mod middleware;
pub mod server;
pub mod session;
pub mod socket;
pub mod user_data;

pub use server::{BroadcastHandle, Server};
