use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Every tunable the server loop reads before and during `Server::run`.
///
/// Mirrors the split the teacher crate uses for its own configuration
/// (a top-level config plus a nested, independently-defaulted sub-config),
/// but the knobs themselves come from the listening/serving side of this
/// spec rather than from a WebSocket client's frame limits.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: ListenConfig,
    pub document_root: PathBuf,
    pub max_header_size: usize,
    pub max_body_size: usize,
    pub idle_timeout: Duration,
    pub poll_timeout: Duration,
    pub idle_sleep: Duration,
    pub default_headers: HashMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen: ListenConfig::default(),
            document_root: PathBuf::from("./public"),
            max_header_size: 8 * 1024,
            max_body_size: 128 * 1024,
            idle_timeout: Duration::from_secs(3600),
            poll_timeout: Duration::from_millis(50),
            idle_sleep: Duration::from_millis(10),
            default_headers: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ListenConfig {
    pub addr: String,
    pub port: u16,
    pub backlog: i32,
}

impl Default for ListenConfig {
    fn default() -> Self {
        ListenConfig {
            addr: "0.0.0.0".to_string(),
            port: 80,
            backlog: 1024,
        }
    }
}

/// The maximum WebSocket payload this implementation will ever accept on a
/// single frame. A frame declaring a larger length is a protocol error.
pub const MAX_FRAME_PAYLOAD: u64 = 1024;
