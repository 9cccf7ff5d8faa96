use std::sync::mpsc::SendError;
use thiserror::Error;

/// Errors surfaced by the protocol layer and the server loop.
///
/// Each variant here is actually produced by a call site in `server.rs` --
/// logged at the point a session is closed, or (for `CommunicationError`)
/// returned to a caller of the public API.
#[derive(Error, Debug)]
pub enum Error {
    #[error("malformed HTTP request")]
    MalformedRequest,

    #[error("request carried no Sec-WebSocket-Key header")]
    NoSecWebsocketKey,

    #[error("broadcast channel is closed")]
    CommunicationError,

    #[error("a middleware callback panicked")]
    HandlerPanicked,
}

impl<T> From<SendError<T>> for Error {
    fn from(_: SendError<T>) -> Self {
        Error::CommunicationError
    }
}

pub type Result<T> = std::result::Result<T, Error>;
