use std::fs;
use std::path::{Path, PathBuf};

use crate::http::HttpRequest;

pub enum Asset {
    Found { bytes: Vec<u8>, mime: &'static str },
    NotFound,
}

pub struct StaticAssets {
    pub document_root: PathBuf,
}

impl StaticAssets {
    pub fn new(document_root: impl Into<PathBuf>) -> Self {
        StaticAssets {
            document_root: document_root.into(),
        }
    }

    /// Load `resource` (already traversal-stripped by the HTTP parser)
    /// relative to the document root. `/` and `/index.html` both resolve
    /// to the root index document.
    pub fn load(&self, resource: &str) -> Asset {
        let relative = if resource == "/" { "/index.html" } else { resource };
        let path = self.document_root.join(relative.trim_start_matches('/'));

        match fs::read(&path) {
            Ok(bytes) => {
                let mime = mime_for(&path);
                Asset::Found { bytes, mime }
            }
            Err(_) => Asset::NotFound,
        }
    }
}

fn mime_for(path: &Path) -> &'static str {
    let extension = path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("html") => "text/html",
        Some("txt") => "text/plain",
        Some("css") => "text/css",
        Some("js") => "text/javascript",
        Some("ico") => "image/x-icon",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/x-png",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ttf") => "font/ttf",
        Some("cpp") => "text/x-c",
        _ => "application/octet-stream",
    }
}

const FALLBACK_NOT_FOUND: &str = "<h1>Internal Server Error</h1>";

/// Render the `404.html` template from the document root, interpolating a
/// human-readable dump of the offending request in place of `{{request}}`.
/// Falls back to a hardcoded body if no template is present.
pub fn render_not_found(document_root: &Path, request: &HttpRequest) -> Vec<u8> {
    let template_path = document_root.join("404.html");
    let template = fs::read_to_string(&template_path).unwrap_or_else(|_| FALLBACK_NOT_FOUND.to_string());

    let friendly = html_friendly_request(request);
    template.replace("{{request}}", &friendly).into_bytes()
}

fn html_friendly_request(request: &HttpRequest) -> String {
    let mut lines = vec![format!("{:?} {}", request.method, request.resource)];
    for (name, value) in request.headers.iter() {
        lines.push(format!("{}: {}", name, value));
    }
    lines
        .join("\n")
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\n', "<br/>")
}
