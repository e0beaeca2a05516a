use crate::gopher::selector::Selector;
use crate::status::Status;
use nix::errno::Errno;
use std::borrow::Cow;

/// End of document when the body already ends in a newline (or is empty).
pub const TERMINATOR: &[u8] = b".\r\n";

/// End of document when the body's last line is unterminated.
pub const TERMINATOR_AFTER_TEXT: &[u8] = b"\r\n.\r\n";

/// Trailer for a response body of the given selector type.
///
/// Only plain documents are terminated; clients read binary and listing
/// bodies until the connection closes.
pub fn terminator(selector: Selector, body: &[u8]) -> Option<&'static [u8]> {
    if !selector.is_document() {
        return None;
    }
    match body.last() {
        Some(b'\n') | None => Some(TERMINATOR),
        Some(_) => Some(TERMINATOR_AFTER_TEXT),
    }
}

/// Error item for a selector that could not be opened.
pub fn errno_line(selector: &[u8], errno: Errno) -> String {
    let name = if selector.is_empty() {
        Cow::Borrowed("<root>")
    } else {
        String::from_utf8_lossy(&selector[..selector.len().min(500)])
    };
    format!("3'{}' {} ({})\r\n", name, errno.desc(), errno as i32)
}

/// Error item for any other failure.
pub fn status_line(status: Status) -> String {
    format!("3{} [{}]\r\n", status.reason_phrase(), status.as_u16())
}
