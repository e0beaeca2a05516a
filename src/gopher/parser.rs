/// Literal the administrative counters request must match, line ending included.
pub const STATS_REQUEST: &[u8] = b"STATS\r\n";

/// What a `\t$` gopher+ capability query is answered with.
pub const GOPHER_PLUS_FALLBACK: &str = "0/.gopher+";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestLine {
    /// A gopher selector line, CR/LF stripped and gopher+ suffix removed.
    /// Kept as raw bytes; file names need not be UTF-8.
    Gopher(Vec<u8>),
    /// A complete HTTP request head; the buffer is handed to the gateway as is.
    Http,
    /// The `STATS` counters request.
    Stats,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    /// No line terminator yet.
    Incomplete,
    /// The buffer filled up without a complete request.
    TooLarge { http: bool },
}

/// Whether the buffer starts with one of the gateway's request verbs.
pub fn is_http(buf: &[u8]) -> bool {
    buf.starts_with(b"GET ") || buf.starts_with(b"HEAD ")
}

/// Frames one request out of the bytes read so far.
///
/// `capacity` is the request buffer size; a buffer that reached it without
/// a complete request is too large.
pub fn parse_request_line(buf: &[u8], capacity: usize) -> Result<RequestLine, ParseError> {
    let full = buf.len() >= capacity;

    if is_http(buf) {
        // The head ends at the blank line, not at the first newline.
        if find_head_end(buf).is_some() {
            return Ok(RequestLine::Http);
        }
        return Err(if full {
            ParseError::TooLarge { http: true }
        } else {
            ParseError::Incomplete
        });
    }

    let Some(nl) = buf.iter().position(|&b| b == b'\n') else {
        return Err(if full {
            ParseError::TooLarge { http: false }
        } else {
            ParseError::Incomplete
        });
    };

    if &buf[..=nl] == STATS_REQUEST {
        return Ok(RequestLine::Stats);
    }

    let mut line = &buf[..nl];
    if let Some(stripped) = line.strip_suffix(b"\r") {
        line = stripped;
    }

    Ok(RequestLine::Gopher(clean_selector(line)))
}

/// Applies the gopher+ compatibility rule: a lone `\t$` asks for the
/// capability listing, any other tab ends the selector.
pub fn clean_selector(line: &[u8]) -> Vec<u8> {
    if line == b"\t$" {
        return GOPHER_PLUS_FALLBACK.as_bytes().to_vec();
    }
    match line.iter().position(|&b| b == b'\t') {
        Some(tab) => line[..tab].to_vec(),
        None => line.to_vec(),
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .or_else(|| buf.windows(2).position(|w| w == b"\n\n"))
}
