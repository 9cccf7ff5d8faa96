use base64::prelude::*;
use sha1::{Digest, Sha1};
use std::collections::HashMap;

use crate::http::{HttpRequest, HttpResponse, StatusCode};

const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Whether `request` carries `Upgrade: websocket`, regardless of whether a
/// usable key is also present -- split out from `upgrade_key` so a caller
/// can tell "not an upgrade at all" apart from "upgrade with no key".
pub fn wants_upgrade(request: &HttpRequest) -> bool {
    request
        .header("Upgrade")
        .map(|upgrade| upgrade.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

/// If `request` is a WebSocket upgrade request, returns its
/// `Sec-WebSocket-Key` value. A request only counts as an upgrade when it
/// carries both `Upgrade: websocket` and the key header.
pub fn upgrade_key(request: &HttpRequest) -> Option<&str> {
    if !wants_upgrade(request) {
        return None;
    }
    request.header("Sec-WebSocket-Key")
}

/// RFC 6455 section 1.3: concatenate the client key with the fixed GUID,
/// SHA-1 the result, and Base64-encode the 20-byte digest.
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    BASE64_STANDARD.encode(hasher.finalize())
}

/// Build the 101 Switching Protocols response that completes the upgrade.
pub fn switching_protocols(client_key: &str, default_headers: &HashMap<String, String>) -> HttpResponse {
    let mut response = HttpResponse::new(StatusCode::SwitchingProtocols);
    response.headers.insert("Upgrade", "websocket");
    response.headers.insert("Connection", "Upgrade");
    response.headers.insert("Sec-WebSocket-Accept", accept_key(client_key));
    for (name, value) in default_headers {
        response.headers.insert(name.clone(), value.clone());
    }
    response
}
