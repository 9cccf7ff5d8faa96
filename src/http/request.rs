use super::ordered_map::OrderedMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
    Patch,
    Delete,
    /// Any verb not in the table above. A request that parses to this
    /// method is rejected outright by `parse`.
    Error,
}

impl Method {
    fn from_word(word: &str) -> Method {
        match word {
            "GET" => Method::Get,
            "PUT" => Method::Put,
            "POST" => Method::Post,
            "PATCH" => Method::Patch,
            "DELETE" => Method::Delete,
            _ => Method::Error,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub resource: String,
    pub query: OrderedMap,
    pub headers: OrderedMap,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get_ci(name)
    }
}

enum State {
    FetchVerb,
    FetchResource,
    FetchVersion,
    FetchFieldName,
    FetchFieldValue,
}

/// Parse a buffered byte span believed to hold a full request line plus
/// headers (and possibly a body trailing the header block). Returns `None`
/// only when the verb is not recognized; an otherwise-truncated request
/// (cut off mid-header, or with no headers at all) is returned best-effort
/// rather than rejected, matching the leniency of the reference parser this
/// is grounded on.
pub fn parse(data: &[u8]) -> Option<HttpRequest> {
    let mut pos = 0usize;
    let mut state = State::FetchVerb;

    let mut request = HttpRequest {
        method: Method::Error,
        resource: "/".to_string(),
        query: OrderedMap::new(),
        headers: OrderedMap::new(),
        body: None,
    };

    let mut field_name = String::new();
    let mut field_value = String::new();

    loop {
        match state {
            State::FetchVerb => match next_word(data, &mut pos) {
                Some((word, _)) => {
                    let method = Method::from_word(&word);
                    if method == Method::Error {
                        return None;
                    }
                    request.method = method;
                    state = State::FetchResource;
                }
                None => break,
            },
            State::FetchResource => match next_word(data, &mut pos) {
                Some((word, _)) => {
                    let (resource, query_string) = split_resource(&word);
                    request.resource = normalize_resource(&resource);
                    request.query = parse_query(&query_string);
                    state = State::FetchVersion;
                }
                None => break,
            },
            State::FetchVersion => match next_word(data, &mut pos) {
                Some(_) => state = State::FetchFieldName,
                None => break,
            },
            State::FetchFieldName => match next_word(data, &mut pos) {
                Some((word, eol)) => {
                    if word.is_empty() && eol {
                        // blank line: end of the header block
                        break;
                    }
                    field_name = if word.len() > 1 {
                        word[..word.len() - 1].to_string()
                    } else {
                        word
                    };
                    field_value.clear();
                    if eol {
                        request.headers.insert(field_name.clone(), "");
                    } else {
                        state = State::FetchFieldValue;
                    }
                }
                None => break,
            },
            State::FetchFieldValue => match next_word(data, &mut pos) {
                Some((word, eol)) => {
                    if !field_value.is_empty() {
                        field_value.push(' ');
                    }
                    field_value.push_str(&word);
                    if eol {
                        request.headers.insert(field_name.clone(), field_value.clone());
                        state = State::FetchFieldName;
                    }
                }
                None => break,
            },
        }
    }

    if pos < data.len() {
        request.body = Some(data[pos..].to_vec());
    }

    Some(request)
}

/// Scan one whitespace- or line-delimited token starting at `*pos`. Leading
/// spaces are skipped. CRLF and bare LF are both treated as end-of-line;
/// a trailing space ends the word without signalling end-of-line.
fn next_word(data: &[u8], pos: &mut usize) -> Option<(String, bool)> {
    while *pos < data.len() && data[*pos] == b' ' {
        *pos += 1;
    }
    if *pos >= data.len() {
        return None;
    }

    let start = *pos;
    while *pos < data.len() && data[*pos] != b' ' && data[*pos] != b'\r' && data[*pos] != b'\n' {
        *pos += 1;
    }
    let word = String::from_utf8_lossy(&data[start..*pos]).into_owned();

    let mut eol = false;
    if *pos < data.len() {
        match data[*pos] {
            b'\r' => {
                *pos += 1;
                if *pos < data.len() && data[*pos] == b'\n' {
                    *pos += 1;
                }
                eol = true;
            }
            b'\n' => {
                *pos += 1;
                eol = true;
            }
            b' ' => {
                *pos += 1;
            }
            _ => {}
        }
    }

    Some((word, eol))
}

fn split_resource(word: &str) -> (String, String) {
    match word.split_once('?') {
        Some((resource, query)) => (resource.to_string(), query.to_string()),
        None => (word.to_string(), String::new()),
    }
}

fn normalize_resource(resource: &str) -> String {
    let normalized = resource.replace('\\', "/").replace("../", "").replace("./", "");
    if normalized.is_empty() {
        "/".to_string()
    } else {
        normalized
    }
}

fn parse_query(query_string: &str) -> OrderedMap {
    let mut query = OrderedMap::new();
    if query_string.is_empty() {
        return query;
    }
    for pair in query_string.split('&') {
        if pair.is_empty() {
            continue;
        }
        match pair.split_once('=') {
            Some((key, value)) => query.insert(key, value),
            None => query.insert(pair, ""),
        }
    }
    query
}
