use crate::status::Status;

const HTTP_VERSION: &str = "HTTP/1.1";

/// Builder for the header block sent ahead of a gatewayed body.
///
/// Headers keep insertion order.
///
/// # Example
///
/// ```
/// # use burrow::http::response::HeaderBuilder;
/// # use burrow::status::Status;
/// let head = HeaderBuilder::new(Status::Ok)
///     .header("Content-Type", "text/plain")
///     .content_length(5)
///     .build();
/// assert!(head.starts_with(b"HTTP/1.1 200 OK\r\n"));
/// assert!(head.ends_with(b"Content-Length: 5\r\n\r\n"));
/// ```
pub struct HeaderBuilder {
    status: Status,
    headers: Vec<(String, String)>,
    content_length: usize,
}

impl HeaderBuilder {
    pub fn new(status: Status) -> Self {
        Self {
            status,
            headers: Vec::new(),
            content_length: 0,
        }
    }

    /// Adds or replaces a header.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&key)) {
            Some(existing) => existing.1 = value,
            None => self.headers.push((key, value)),
        }
        self
    }

    pub fn content_length(mut self, len: usize) -> Self {
        self.content_length = len;
        self
    }

    /// Serializes the status line and headers, ending with the blank line.
    /// `Content-Length` always comes last.
    pub fn build(self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(128);
        buf.extend_from_slice(status_line(self.status).as_bytes());

        for (k, v) in &self.headers {
            buf.extend_from_slice(k.as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(v.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }

        buf.extend_from_slice(format!("Content-Length: {}\r\n\r\n", self.content_length).as_bytes());
        buf
    }
}

/// `HTTP/1.1 <code> <reason>\r\n`
pub fn status_line(status: Status) -> String {
    format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        status.as_u16(),
        status.reason_phrase()
    )
}

/// The bare reply sent when a request fails before a header was built.
pub fn error_reply(status: Status) -> Vec<u8> {
    let mut buf = status_line(status).into_bytes();
    buf.extend_from_slice(b"\r\n");
    buf
}
