use std::time::{Duration, Instant};

use mio::Token;

use crate::frame::{Frame, ParseCode};
use crate::socket::Connection;
use crate::user_data::UserData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Http,
    WebSocket,
}

/// Per-connection state owned exclusively by the server loop. Nothing here
/// is shared across threads -- cross-thread effects (broadcast) arrive as
/// messages the loop applies on this struct directly, rather than through
/// a lock (see `server::BroadcastHandle`).
pub struct ClientSession {
    pub token: Token,
    pub connection: Connection,
    pub mode: Mode,
    pub display_name: String,
    pub ws_resource: Option<String>,
    pub connected_at: Instant,
    pub last_activity: Instant,
    pub closed: bool,

    pub(crate) http_buffer: Vec<u8>,
    pub(crate) ws_buffer: Vec<u8>,
    pub(crate) pending_frame: Option<(ParseCode, Frame)>,

    pub user_data: UserData,
}

impl ClientSession {
    pub fn new(token: Token, connection: Connection, now: Instant) -> Self {
        let display_name = connection.peer_endpoint();
        ClientSession {
            token,
            connection,
            mode: Mode::Http,
            display_name,
            ws_resource: None,
            connected_at: now,
            last_activity: now,
            closed: false,
            http_buffer: Vec::new(),
            ws_buffer: Vec::new(),
            pending_frame: None,
            user_data: UserData::default(),
        }
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    pub fn is_idle(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_activity) >= timeout
    }

    pub fn send_frame(&mut self, frame: &Frame) -> std::io::Result<()> {
        self.connection.send_all(&frame.encode())
    }
}
