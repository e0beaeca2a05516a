use crate::gopher::selector::Selector;
use std::collections::HashMap;

/// Request verbs the gateway answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - header and body
    GET,
    /// HEAD - header only
    HEAD,
}

impl Method {
    /// Parses a request verb.
    ///
    /// # Example
    ///
    /// ```
    /// # use burrow::http::request::Method;
    /// assert_eq!(Method::from_str("GET"), Some(Method::GET));
    /// assert_eq!(Method::from_str("POST"), None);
    /// ```
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::GET),
            "HEAD" => Some(Method::HEAD),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::HEAD => "HEAD",
        }
    }
}

/// A gatewayed HTTP request.
///
/// The target has the gopher shape `/X/path`, where `X` is the selector.
/// A second type character (`/XY/path`) is accepted and ignored.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Target as sent, for the hit log.
    pub target: String,
    pub selector: Selector,
    /// Unquoted path below the root, without the selector. Escapes may
    /// decode to bytes that are not UTF-8.
    pub path: Vec<u8>,
    /// Header names are lowercased.
    pub headers: HashMap<String, String>,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum HttpParseError {
    #[error("not a GET or HEAD request")]
    InvalidMethod,
    #[error("malformed request target '{0}'")]
    InvalidTarget(String),
    #[error("selector type '{0}' is not served over HTTP")]
    InvalidType(char),
}

impl HttpRequest {
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(&key.to_ascii_lowercase()).map(|v| v.as_str())
    }
}

/// Parses a complete request head.
pub fn parse_http_request(buf: &[u8]) -> Result<HttpRequest, HttpParseError> {
    let mut lines = buf
        .split(|&b| b == b'\n')
        .map(|l| l.strip_suffix(b"\r").unwrap_or(l));

    let request_line = lines.next().unwrap_or_default();
    let (verb, rest) = split_once(request_line, b' ').ok_or(HttpParseError::InvalidMethod)?;
    let method = std::str::from_utf8(verb)
        .ok()
        .and_then(Method::from_str)
        .ok_or(HttpParseError::InvalidMethod)?;

    // Some clients omit the version entirely.
    let rest = rest.trim_ascii_start();
    let target = match rest.windows(5).position(|w| w == b"HTTP/") {
        Some(at) => &rest[..at],
        None => rest,
    }
    .trim_ascii_end();

    let (selector, path) = split_target(target)?;

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        let line = String::from_utf8_lossy(line);
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    Ok(HttpRequest {
        method,
        target: String::from_utf8_lossy(target).into_owned(),
        selector,
        path: unquote(path),
        headers,
    })
}

fn split_once(bytes: &[u8], sep: u8) -> Option<(&[u8], &[u8])> {
    let at = bytes.iter().position(|&b| b == sep)?;
    Some((&bytes[..at], &bytes[at + 1..]))
}

fn split_target(target: &[u8]) -> Result<(Selector, &[u8]), HttpParseError> {
    let rest = target.strip_prefix(b"/").unwrap_or(target);
    let Some((&kind, after)) = rest.split_first() else {
        return Ok((Selector::Directory, rest));
    };
    let path = match after.split_first() {
        Some((&second, tail)) if second != b'/' => tail,
        _ => after,
    };

    if !path.is_empty() && !path.starts_with(b"/") {
        return Err(HttpParseError::InvalidTarget(
            String::from_utf8_lossy(target).into_owned(),
        ));
    }
    let kind = char::from(kind);
    let selector = Selector::from_char(kind)
        .filter(Selector::http_servable)
        .ok_or(HttpParseError::InvalidType(kind))?;

    Ok((selector, path))
}

/// Decodes `%XX` escapes; malformed escapes are kept literally.
pub fn unquote(s: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    let mut i = 0;
    while i < s.len() {
        if s[i] == b'%' {
            let hex = s.get(i + 1..i + 3).and_then(|h| std::str::from_utf8(h).ok());
            if let Some(value) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(s[i]);
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unquote_handles_bad_escapes() {
        assert_eq!(unquote(b"a%20b"), b"a b");
        assert_eq!(unquote(b"100%"), b"100%");
        assert_eq!(unquote(b"%zz"), b"%zz");
        assert_eq!(unquote(b"caf%E9"), b"caf\xe9");
    }
}
