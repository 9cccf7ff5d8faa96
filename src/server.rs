use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::time::Instant;

use mio::Token;

use crate::assets::{render_not_found, Asset, StaticAssets};
use crate::config::ServerConfig;
use crate::error::Error as ProtocolError;
use crate::frame::{self, Frame, OpCode, ParseCode};
use crate::handshake;
use crate::http::{self, HttpResponse, StatusCode};
use crate::middleware::{HttpHandlerStatus, MiddlewareRegistry, WsHandlerStatus};
use crate::session::{ClientSession, Mode};
use crate::socket::{Listener, Poller, RecvOutcome};

const LISTENER_TOKEN: Token = Token(0);
const RECV_BUFFER_SIZE: usize = 8 * 1024;

/// Whether `buf` contains a complete header block (ending in a blank
/// line), tolerating either CRLF or bare LF line endings like the parser
/// itself does.
fn header_block_present(buf: &[u8]) -> bool {
    buf.windows(4).any(|w| w == b"\r\n\r\n") || buf.windows(2).any(|w| w == b"\n\n")
}

enum BroadcastCommand {
    SendAll {
        frame: Frame,
        resource_filter: Option<String>,
    },
}

/// A cloneable, `Send` handle that lets other threads push WebSocket
/// traffic through the server without touching the session collection
/// directly. The server loop is the only thing that ever reads or writes a
/// socket; this just hands it a command to apply on the loop's own turn.
#[derive(Clone)]
pub struct BroadcastHandle {
    tx: mpsc::Sender<BroadcastCommand>,
}

impl BroadcastHandle {
    pub fn send_all(&self, frame: Frame, resource_filter: Option<&str>) -> crate::error::Result<()> {
        self.tx
            .send(BroadcastCommand::SendAll {
                frame,
                resource_filter: resource_filter.map(str::to_string),
            })
            .map_err(Into::into)
    }
}

pub struct Server {
    config: ServerConfig,
    listener: Listener,
    poller: Poller,
    sessions: Vec<ClientSession>,
    middleware: MiddlewareRegistry,
    assets: StaticAssets,
    next_token: usize,
    broadcast_rx: mpsc::Receiver<BroadcastCommand>,
}

impl Server {
    pub fn new(config: ServerConfig) -> io::Result<(Server, BroadcastHandle)> {
        let mut listener = Listener::bind(&config.listen)?;
        let poller = Poller::new()?;
        listener.register(poller.registry(), LISTENER_TOKEN)?;

        let (tx, rx) = mpsc::channel();
        let assets = StaticAssets::new(config.document_root.clone());

        let server = Server {
            listener,
            poller,
            sessions: Vec::new(),
            middleware: MiddlewareRegistry::new(),
            assets,
            next_token: 1,
            broadcast_rx: rx,
            config,
        };
        Ok((server, BroadcastHandle { tx }))
    }

    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    pub fn middleware_mut(&mut self) -> &mut MiddlewareRegistry {
        &mut self.middleware
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn run(&mut self) -> io::Result<()> {
        loop {
            self.run_once()?;
        }
    }

    pub fn run_once(&mut self) -> io::Result<()> {
        self.drain_broadcasts();
        self.accept_one()?;

        if self.sessions.is_empty() {
            std::thread::sleep(self.config.idle_sleep);
        } else {
            self.poller.wait(self.config.poll_timeout)?;
        }

        self.process_sessions();
        self.sweep_sessions();
        Ok(())
    }

    fn accept_one(&mut self) -> io::Result<()> {
        if let Some((mut connection, addr)) = self.listener.accept()? {
            let token = Token(self.next_token);
            self.next_token += 1;
            connection.register(self.poller.registry(), token)?;
            let session = ClientSession::new(token, connection, Instant::now());
            log::info!("accepted connection from {} ({})", addr, session.display_name);
            self.sessions.push(session);
        }
        Ok(())
    }

    fn drain_broadcasts(&mut self) {
        while let Ok(cmd) = self.broadcast_rx.try_recv() {
            match cmd {
                BroadcastCommand::SendAll { frame, resource_filter } => {
                    let bytes = frame.encode();
                    for session in self.sessions.iter_mut() {
                        if session.mode != Mode::WebSocket {
                            continue;
                        }
                        let matches = match &resource_filter {
                            Some(filter) => session.ws_resource.as_deref() == Some(filter.as_str()),
                            None => true,
                        };
                        if matches && session.connection.send_all(&bytes).is_err() {
                            session.closed = true;
                        }
                    }
                }
            }
        }
    }

    fn process_sessions(&mut self) {
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        for idx in 0..self.sessions.len() {
            let outcome = self.sessions[idx].connection.recv(&mut buf);
            match outcome {
                RecvOutcome::WouldBlock => continue,
                RecvOutcome::Closed => {
                    self.sessions[idx].closed = true;
                    continue;
                }
                RecvOutcome::Data(n) => {
                    self.sessions[idx].touch(Instant::now());
                    let mode = self.sessions[idx].mode;
                    match mode {
                        Mode::Http => self.handle_http_bytes(idx, &buf[..n]),
                        Mode::WebSocket => self.handle_ws_bytes(idx, &buf[..n]),
                    }
                }
            }
        }
    }

    fn handle_http_bytes(&mut self, idx: usize, chunk: &[u8]) {
        let session = &mut self.sessions[idx];
        session.http_buffer.extend_from_slice(chunk);

        if !header_block_present(&session.http_buffer) {
            // Still accumulating the request line and headers -- this tier
            // is capped at `max_header_size`, independently of the larger
            // `max_body_size` cap that applies once headers are complete.
            if session.http_buffer.len() > self.config.max_header_size {
                log::warn!(
                    "{}: closing after exceeding the {}-byte header cap ({})",
                    session.display_name,
                    self.config.max_header_size,
                    ProtocolError::MalformedRequest
                );
                session.closed = true;
            }
            return;
        }

        if session.http_buffer.len() > self.config.max_body_size {
            log::warn!(
                "{}: closing after exceeding the {}-byte body cap ({})",
                session.display_name,
                self.config.max_body_size,
                ProtocolError::MalformedRequest
            );
            session.closed = true;
            return;
        }

        let request = match http::request::parse(&session.http_buffer) {
            Some(req) => req,
            None => {
                log::warn!("{}: {}", session.display_name, ProtocolError::MalformedRequest);
                session.closed = true;
                return;
            }
        };

        if let Some(content_length) = request.header("Content-Length").and_then(|v| v.parse::<usize>().ok()) {
            let have = request.body.as_ref().map(Vec::len).unwrap_or(0);
            if have < content_length && session.http_buffer.len() < self.config.max_body_size {
                // Wait for more bytes before dispatching -- resolves the
                // Content-Length open question by buffering further reads.
                return;
            }
        }

        session.http_buffer.clear();
        self.dispatch_http(idx, request);
    }

    fn dispatch_http(&mut self, idx: usize, request: http::HttpRequest) {
        if handshake::wants_upgrade(&request) {
            match handshake::upgrade_key(&request) {
                Some(key) => {
                    let response = handshake::switching_protocols(key, &self.config.default_headers);
                    let session = &mut self.sessions[idx];
                    session.mode = Mode::WebSocket;
                    session.ws_resource = Some(request.resource.clone());
                    if session.connection.send_all(&response.serialize()).is_err() {
                        session.closed = true;
                    }
                    log::info!("{} upgraded to websocket on {}", session.display_name, request.resource);
                }
                None => {
                    log::warn!("{}: {}", self.sessions[idx].display_name, ProtocolError::NoSecWebsocketKey);
                    self.sessions[idx].closed = true;
                }
            }
            return;
        }

        let status = match panic::catch_unwind(AssertUnwindSafe(|| self.middleware.dispatch_http(&request))) {
            Ok(status) => status,
            Err(_) => {
                log::error!("{}: {}", self.sessions[idx].display_name, ProtocolError::HandlerPanicked);
                self.sessions[idx].closed = true;
                return;
            }
        };
        match status {
            HttpHandlerStatus::DisconnectClient => {
                self.sessions[idx].closed = true;
            }
            HttpHandlerStatus::DynamicResponse(mut response) => {
                self.middleware.run_postprocessors(&request, &mut response);
                self.write_response(idx, &response);
            }
            HttpHandlerStatus::DefaultResponse => {
                let mut response = match self.assets.load(&request.resource) {
                    Asset::Found { bytes, mime } => HttpResponse::with_body(StatusCode::Ok, mime, bytes),
                    Asset::NotFound => {
                        let body = render_not_found(&self.config.document_root, &request);
                        HttpResponse::with_body(StatusCode::NotFound, "text/html", body)
                    }
                };
                self.middleware.run_postprocessors(&request, &mut response);
                self.write_response(idx, &response);
            }
        }
    }

    fn write_response(&mut self, idx: usize, response: &HttpResponse) {
        let session = &mut self.sessions[idx];
        if session.connection.send_all(&response.serialize()).is_err() {
            session.closed = true;
        }
    }

    fn handle_ws_bytes(&mut self, idx: usize, chunk: &[u8]) {
        self.sessions[idx].ws_buffer.extend_from_slice(chunk);

        loop {
            let session = &mut self.sessions[idx];
            if session.ws_buffer.is_empty() {
                break;
            }

            let (frame, code) = if let Some((prior_code, mut prior_frame)) = session.pending_frame.take() {
                let mut cursor = 0;
                let code = frame::continue_decode(&session.ws_buffer, &mut cursor, prior_code, &mut prior_frame);
                session.ws_buffer.drain(0..cursor);
                (Some(prior_frame), code)
            } else {
                let mut cursor = 0;
                let (frame, code) = frame::decode(&session.ws_buffer, &mut cursor);
                session.ws_buffer.drain(0..cursor);
                (frame, code)
            };

            match (frame, code) {
                (None, ParseCode::MissingPayload) => break, // header itself incomplete; wait for more bytes
                (None, _) => {
                    log::warn!(
                        "{}: closing on an unparseable WebSocket frame (reserved or unknown opcode)",
                        self.sessions[idx].display_name
                    );
                    self.sessions[idx].closed = true;
                    break;
                }
                (Some(frame), ParseCode::Complete) => {
                    self.dispatch_ws_frame(idx, frame);
                    if self.sessions[idx].closed {
                        break;
                    }
                }
                (Some(frame), ParseCode::MissingMask) | (Some(frame), ParseCode::MissingPayload) => {
                    self.sessions[idx].pending_frame = Some((code, frame));
                    break;
                }
                (Some(_), ParseCode::Error) => {
                    log::warn!(
                        "{}: closing on a WebSocket frame that could not resume (fragmentation error)",
                        self.sessions[idx].display_name
                    );
                    self.sessions[idx].closed = true;
                    break;
                }
            }
        }
    }

    fn dispatch_ws_frame(&mut self, idx: usize, frame: Frame) {
        let status = match panic::catch_unwind(AssertUnwindSafe(|| {
            self.middleware.dispatch_ws(&mut self.sessions[idx], &frame)
        })) {
            Ok(status) => status,
            Err(_) => {
                log::error!("{}: {}", self.sessions[idx].display_name, ProtocolError::HandlerPanicked);
                self.sessions[idx].closed = true;
                return;
            }
        };
        if let WsHandlerStatus::Processed = status {
            return;
        }

        match frame.opcode {
            OpCode::Close => {
                self.sessions[idx].closed = true;
            }
            OpCode::Ping => {
                let pong = Frame::pong(frame.payload.clone());
                if self.sessions[idx].send_frame(&pong).is_err() {
                    self.sessions[idx].closed = true;
                }
            }
            _ => {}
        }
    }

    fn sweep_sessions(&mut self) {
        let now = Instant::now();
        let timeout = self.config.idle_timeout;
        let registry = self.poller.registry();

        self.sessions.retain_mut(|session| {
            let expired = session.is_idle(now, timeout);
            if session.closed || expired {
                if expired {
                    log::info!("closing idle session {}", session.display_name);
                } else {
                    log::info!("closing disconnected session {}", session.display_name);
                }
                let _ = session.connection.deregister(registry);
                session.connection.shutdown();
                false
            } else {
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpStream;

    fn test_config() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.listen.addr = "127.0.0.1".to_string();
        config.listen.port = 0;
        config.document_root = std::env::temp_dir().join("switchbox-server-test-root");
        std::fs::create_dir_all(&config.document_root).unwrap();
        std::fs::write(config.document_root.join("index.html"), b"hello world").unwrap();
        config
    }

    #[test]
    fn serves_static_asset() {
        let (mut server, _handle) = Server::new(test_config()).unwrap();
        let addr = server.local_addr().unwrap();

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();

        for _ in 0..20 {
            server.run_once().unwrap();
        }

        client.set_read_timeout(Some(std::time::Duration::from_millis(200))).unwrap();
        let mut response = Vec::new();
        let mut buf = [0u8; 1024];
        if let Ok(n) = client.read(&mut buf) {
            response.extend_from_slice(&buf[..n]);
        }
        let text = String::from_utf8_lossy(&response);
        assert!(text.starts_with("HTTP/1.1 200 OK"));
        assert!(text.ends_with("hello world"));
    }

    #[test]
    fn missing_asset_yields_404() {
        let (mut server, _handle) = Server::new(test_config()).unwrap();
        let addr = server.local_addr().unwrap();

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(b"GET /nope HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
        for _ in 0..20 {
            server.run_once().unwrap();
        }
        client.set_read_timeout(Some(std::time::Duration::from_millis(200))).unwrap();
        let mut response = Vec::new();
        let mut buf = [0u8; 1024];
        if let Ok(n) = client.read(&mut buf) {
            response.extend_from_slice(&buf[..n]);
        }
        assert!(String::from_utf8_lossy(&response).starts_with("HTTP/1.1 404 Not Found"));
    }

    #[test]
    fn websocket_upgrade_and_echo() {
        let (mut server, _handle) = Server::new(test_config()).unwrap();
        server.middleware_mut().add_ws_handler(|session, frame| {
            if frame.opcode == OpCode::Text {
                let reply = Frame::text(frame.payload.clone());
                let _ = session.send_frame(&reply);
                WsHandlerStatus::Processed
            } else {
                WsHandlerStatus::Ignore
            }
        });
        let addr = server.local_addr().unwrap();

        let mut client = TcpStream::connect(addr).unwrap();
        client
            .write_all(
                b"GET /chat HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
            )
            .unwrap();
        for _ in 0..20 {
            server.run_once().unwrap();
        }

        client.set_read_timeout(Some(std::time::Duration::from_millis(200))).unwrap();
        let mut response = [0u8; 1024];
        let n = client.read(&mut response).unwrap();
        let text = String::from_utf8_lossy(&response[..n]);
        assert!(text.starts_with("HTTP/1.1 101 Switching Protocols"));
        assert!(text.contains("s3pPLMBiTxaQ9kYGzzhZRbK+xOo="));

        let outbound = Frame::text("ping").masked([1, 2, 3, 4]).encode();
        client.write_all(&outbound).unwrap();
        for _ in 0..20 {
            server.run_once().unwrap();
        }

        let mut echoed = [0u8; 64];
        let n = client.read(&mut echoed).unwrap();
        let mut cursor = 0;
        let (frame, code) = frame::decode(&echoed[..n], &mut cursor);
        assert_eq!(code, ParseCode::Complete);
        assert_eq!(frame.unwrap().payload, b"ping".to_vec());
    }

    #[test]
    fn panicking_http_handler_drops_only_that_session() {
        let (mut server, _handle) = Server::new(test_config()).unwrap();
        server.middleware_mut().add_http_handler(|_| panic!("boom"));
        let addr = server.local_addr().unwrap();

        let mut bad_client = TcpStream::connect(addr).unwrap();
        bad_client.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
        for _ in 0..20 {
            server.run_once().unwrap();
        }
        // The panicking session is swept, but the loop itself kept running
        // and can still accept and serve a second connection.
        assert_eq!(server.session_count(), 0);

        let mut good_client = TcpStream::connect(addr).unwrap();
        good_client
            .write_all(b"GET /nope HTTP/1.1\r\nHost: x\r\n\r\n")
            .unwrap();
        for _ in 0..20 {
            server.run_once().unwrap();
        }
        good_client.set_read_timeout(Some(std::time::Duration::from_millis(200))).unwrap();
        let mut response = Vec::new();
        let mut buf = [0u8; 1024];
        if let Ok(n) = good_client.read(&mut buf) {
            response.extend_from_slice(&buf[..n]);
        }
        assert!(String::from_utf8_lossy(&response).starts_with("HTTP/1.1 404 Not Found"));
    }

    #[test]
    fn unterminated_headers_are_closed_at_the_header_cap_not_the_body_cap() {
        let mut config = test_config();
        config.max_header_size = 64;
        let (mut server, _handle) = Server::new(config).unwrap();
        let addr = server.local_addr().unwrap();

        let mut client = TcpStream::connect(addr).unwrap();
        // No blank-line terminator, and already past the 64-byte header cap
        // but nowhere near the 128KiB body cap.
        let oversized_header = format!("GET / HTTP/1.1\r\nX-Pad: {}", "a".repeat(200));
        client.write_all(oversized_header.as_bytes()).unwrap();
        for _ in 0..20 {
            server.run_once().unwrap();
        }
        assert_eq!(server.session_count(), 0);
    }

    #[test]
    fn upgrade_request_without_key_is_closed() {
        let (mut server, _handle) = Server::new(test_config()).unwrap();
        let addr = server.local_addr().unwrap();

        let mut client = TcpStream::connect(addr).unwrap();
        client
            .write_all(b"GET /chat HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\n\r\n")
            .unwrap();
        for _ in 0..20 {
            server.run_once().unwrap();
        }
        assert_eq!(server.session_count(), 0);
    }
}
