use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::time::Duration;

use mio::net::{TcpListener as MioTcpListener, TcpStream as MioTcpStream};
use mio::{Events, Interest, Poll, Token};
use socket2::{Domain, Socket as RawSocket, Type};

use crate::config::ListenConfig;

/// The non-blocking TCP primitive the protocol layer is written against.
/// Concrete here (over `mio` + `socket2`) rather than left as an external
/// trait boundary, since this crate has no separate transport plugin --
/// it's the Rust realization of the spec's "socket capability" contract.
pub struct Listener {
    inner: MioTcpListener,
}

impl Listener {
    /// Bind with `SO_REUSEADDR` and an explicit backlog set before
    /// `listen()` is called -- `socket2` is used for exactly this, since
    /// neither `std::net` nor `mio` expose backlog control directly.
    pub fn bind(config: &ListenConfig) -> io::Result<Listener> {
        let addr: SocketAddr = format!("{}:{}", config.addr, config.port)
            .parse()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "invalid listen address"))?;

        let raw = RawSocket::new(Domain::for_address(addr), Type::STREAM, None)?;
        raw.set_reuse_address(true)?;
        raw.set_nonblocking(true)?;
        raw.bind(&addr.into())?;
        raw.listen(config.backlog)?;

        let std_listener: std::net::TcpListener = raw.into();
        let inner = MioTcpListener::from_std(std_listener);
        Ok(Listener { inner })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    pub fn register(&mut self, registry: &mio::Registry, token: Token) -> io::Result<()> {
        registry.register(&mut self.inner, token, Interest::READABLE)
    }

    /// Non-blocking accept. `Ok(None)` means nothing is waiting, matching
    /// the spec's "accept yields none when nothing is ready" contract.
    pub fn accept(&self) -> io::Result<Option<(Connection, SocketAddr)>> {
        match self.inner.accept() {
            Ok((stream, addr)) => {
                stream.set_nodelay(true).ok();
                Ok(Some((Connection { inner: stream }, addr)))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Consecutive `WouldBlock`s `send_all` tolerates before giving up on a
/// stalled peer rather than spinning the event loop thread indefinitely.
const SEND_ALL_MAX_STALLED_ATTEMPTS: usize = 4096;

pub struct Connection {
    inner: MioTcpStream,
}

/// The Rust stand-in for the spec's "recv returns a signed byte count,
/// non-positive means no data or closed" contract -- expressed as an enum
/// instead of overloading a signed integer.
pub enum RecvOutcome {
    Data(usize),
    WouldBlock,
    Closed,
}

impl Connection {
    pub fn register(&mut self, registry: &mio::Registry, token: Token) -> io::Result<()> {
        registry.register(&mut self.inner, token, Interest::READABLE)
    }

    pub fn deregister(&mut self, registry: &mio::Registry) -> io::Result<()> {
        registry.deregister(&mut self.inner)
    }

    pub fn recv(&mut self, buf: &mut [u8]) -> RecvOutcome {
        match self.inner.read(buf) {
            Ok(0) => RecvOutcome::Closed,
            Ok(n) => RecvOutcome::Data(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => RecvOutcome::WouldBlock,
            Err(_) => RecvOutcome::Closed,
        }
    }

    pub fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    /// Write the whole buffer, retrying past `WouldBlock` up to
    /// `SEND_ALL_MAX_STALLED_ATTEMPTS` times. This server keeps no outbound
    /// write queue (see DESIGN.md); a peer that never drains its receive
    /// window would otherwise pin this call -- and with it the whole
    /// single-threaded loop -- in a busy-spin forever, so a run of
    /// consecutive `WouldBlock`s gives up and reports the connection dead
    /// instead. A successful partial write resets the counter: the cap
    /// bounds *stalled* retries, not the total number of writes a large
    /// buffer might need.
    pub fn send_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let mut written = 0;
        let mut stalled_attempts = 0;
        while written < buf.len() {
            match self.inner.write(&buf[written..]) {
                Ok(n) => {
                    written += n;
                    stalled_attempts = 0;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    stalled_attempts += 1;
                    if stalled_attempts >= SEND_ALL_MAX_STALLED_ATTEMPTS {
                        return Err(io::Error::new(
                            io::ErrorKind::WouldBlock,
                            "peer did not drain its receive window",
                        ));
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    pub fn peer_endpoint(&self) -> String {
        self.inner
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    }

    pub fn shutdown(&mut self) {
        let _ = self.inner.shutdown(std::net::Shutdown::Both);
    }
}

/// Blocks up to `timeout` waiting for activity on any registered socket.
/// Mirrors the reference server's use of a readiness wait purely as an
/// efficient sleep: callers still probe every session with a non-blocking
/// `recv` afterward rather than trusting which tokens fired.
pub struct Poller {
    poll: Poll,
    events: Events,
}

impl Poller {
    pub fn new() -> io::Result<Poller> {
        Ok(Poller {
            poll: Poll::new()?,
            events: Events::with_capacity(256),
        })
    }

    pub fn registry(&self) -> &mio::Registry {
        self.poll.registry()
    }

    pub fn wait(&mut self, timeout: Duration) -> io::Result<()> {
        match self.poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(()),
            Err(e) => Err(e),
        }
    }
}
