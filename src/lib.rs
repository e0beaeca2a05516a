//! Burrow - a small gopher daemon
//!
//! Serves a directory tree over gopher from a single-threaded readiness loop,
//! with file bodies shared through a pool of memory mappings and an HTTP
//! gateway for web browsers on the same port.

pub mod cache;
pub mod config;
pub mod gopher;
pub mod hitlog;
pub mod http;
pub mod logging;
pub mod server;
pub mod stats;
pub mod status;
