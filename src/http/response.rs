use super::ordered_map::OrderedMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    SwitchingProtocols,
    BadRequest,
    NotFound,
    Custom(u16),
}

impl StatusCode {
    /// The literal `"<code> <reason phrase>"` that follows `HTTP/1.1 ` on
    /// the status line. Any code outside the fixed table renders as
    /// `404 Not Found`, matching the reference server's fallback.
    fn wire_str(&self) -> String {
        match self {
            StatusCode::Ok => "200 OK".to_string(),
            StatusCode::SwitchingProtocols => "101 Switching Protocols".to_string(),
            StatusCode::BadRequest => "400 Bad Request".to_string(),
            StatusCode::NotFound => "404 Not Found".to_string(),
            StatusCode::Custom(200) => "200 OK".to_string(),
            StatusCode::Custom(101) => "101 Switching Protocols".to_string(),
            StatusCode::Custom(400) => "400 Bad Request".to_string(),
            StatusCode::Custom(_) => "404 Not Found".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: OrderedMap,
    pub body: Option<Vec<u8>>,
}

impl HttpResponse {
    pub fn new(status: StatusCode) -> Self {
        HttpResponse {
            status,
            headers: OrderedMap::new(),
            body: None,
        }
    }

    pub fn with_body(status: StatusCode, content_type: &str, body: Vec<u8>) -> Self {
        let mut response = HttpResponse::new(status);
        response.headers.insert("Content-Type", content_type);
        response.body = Some(body);
        response
    }

    /// Render the status line, headers, an auto-computed `Content-Length`
    /// when a body is present, and the body itself.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(format!("HTTP/1.1 {}\r\n", self.status.wire_str()).as_bytes());
        for (name, value) in self.headers.iter() {
            out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }
        if let Some(body) = &self.body {
            out.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        if let Some(body) = &self.body {
            out.extend_from_slice(body);
        }
        out
    }
}
