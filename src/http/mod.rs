//! HTTP gateway.
//!
//! Web browsers that connect to the gopher port are answered with a minimal
//! HTTP/1.1 response instead of a gopher reply. The request target carries
//! the gopher selector, `/X/path`, so every gopher link has an HTTP twin.
//!
//! - **`request`**: parses the request head into a selector and path
//! - **`response`**: header block builder and bare error replies
//! - **`mime`**: content types per selector and image extension
//! - **`directory`**: renders `.cache` listings as HTML pages
//! - **`gateway`**: ties the above to the resolver
//!
//! The connection never keeps an HTTP client alive; one request is answered
//! and the socket is closed, same as gopher.

pub mod directory;
pub mod gateway;
pub mod mime;
pub mod request;
pub mod response;
