// Sync load generator for the WebSocket echo route, grounded on the same
// plain-TCP, non-blocking-free client style as `tests/e2e.rs` -- this
// server has no async runtime, so its benchmarking tool doesn't need one
// either.
use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};

use switchbox::frame::{self, Frame, ParseCode};

fn main() {
    let addr = "127.0.0.1:9002";
    let connection_count = 50;
    let message_count = 200;
    let message_size = 256;

    let mut handles = Vec::new();
    for _ in 0..connection_count {
        handles.push(thread::spawn(move || run_client(addr, message_count, message_size)));
    }

    let mut total = Duration::new(0, 0);
    let mut completed = 0u32;
    for handle in handles {
        if let Ok(duration) = handle.join() {
            total += duration;
            completed += 1;
        }
    }

    if completed > 0 {
        let avg = total / (completed * message_count as u32);
        println!("average round-trip latency: {:?}", avg);
    } else {
        println!("no client completed -- is the demo server running on {}?", addr);
    }
}

fn run_client(addr: &str, message_count: u32, message_size: usize) -> Duration {
    let mut stream = TcpStream::connect(addr).expect("connect");
    stream
        .write_all(
            b"GET /chat HTTP/1.1\r\nHost: bench\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
        )
        .unwrap();

    let mut handshake_buf = [0u8; 512];
    let n = stream.read(&mut handshake_buf).unwrap();
    assert!(String::from_utf8_lossy(&handshake_buf[..n]).starts_with("HTTP/1.1 101"));

    let payload = vec![b'a'; message_size];
    let start = Instant::now();

    for _ in 0..message_count {
        let frame = Frame::text(payload.clone()).masked([1, 2, 3, 4]);
        stream.write_all(&frame.encode()).unwrap();

        let mut buf = [0u8; 4096];
        let n = stream.read(&mut buf).unwrap();
        let mut cursor = 0;
        let (decoded, code) = frame::decode(&buf[..n], &mut cursor);
        assert_eq!(code, ParseCode::Complete);
        assert!(decoded.is_some());
    }

    start.elapsed()
}
