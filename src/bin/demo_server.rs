use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use switchbox::config::ServerConfig;
use switchbox::frame::{Frame, OpCode};
use switchbox::http::{HttpResponse, StatusCode};
use switchbox::middleware::{HttpHandlerStatus, WsHandlerStatus};
use switchbox::server::Server;

/// Per-session counter for the `/dynamic` demo route, stored in the
/// session's typed user-data slot rather than a field on `ClientSession`.
#[derive(Default)]
struct HitCounter(u64);

fn main() -> std::io::Result<()> {
    env_logger::init();

    let mut config = ServerConfig::default();
    config.listen.port = 9002;
    config.document_root = std::path::PathBuf::from("./public");

    let (mut server, broadcast) = Server::new(config)?;

    server
        .middleware_mut()
        .add_route_http_handler(vec!["/history.log".to_string()], true, |_request| {
            let body = std::fs::read("./history.log").unwrap_or_default();
            let mut response = HttpResponse::new(StatusCode::Ok);
            response.headers.insert("Content-Type", "text/plain");
            response.body = Some(body);
            HttpHandlerStatus::DynamicResponse(response)
        });

    server
        .middleware_mut()
        .add_route_ws_handler(vec!["/chat".to_string()], true, |session, frame| {
            if frame.opcode != OpCode::Text {
                return WsHandlerStatus::Ignore;
            }
            let reply = Frame::text(frame.payload.clone());
            let _ = session.send_frame(&reply);
            WsHandlerStatus::Processed
        });

    server
        .middleware_mut()
        .add_route_ws_handler(vec!["/dynamic".to_string()], true, |session, frame| {
            if frame.opcode != OpCode::Text {
                return WsHandlerStatus::Ignore;
            }
            let counter = session.user_data.get_or_create::<HitCounter>();
            counter.0 += 1;
            let reply = Frame::text(format!("hit #{}", counter.0));
            let _ = session.send_frame(&reply);
            WsHandlerStatus::Processed
        });

    // Periodic stats broadcaster, mirroring a stats-push loop against every
    // connected WebSocket session -- runs on its own thread and talks to
    // the server loop only through the broadcast channel.
    let stats_handle = broadcast.clone();
    let tick = AtomicU64::new(0);
    thread::spawn(move || loop {
        thread::sleep(Duration::from_millis(500));
        let n = tick.fetch_add(1, Ordering::Relaxed);
        let payload = format!("{{\"tick\":{}}}", n);
        let _ = stats_handle.send_all(Frame::text(payload), Some("/Stats"));
    });

    log::info!("listening on {:?}", server.local_addr());
    server.run()
}
