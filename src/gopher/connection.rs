use bytes::BytesMut;
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};
use nix::errno::Errno;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::cache::{CacheError, Lease};
use crate::gopher::parser::{ParseError, RequestLine, parse_request_line};
use crate::gopher::response::{errno_line, status_line, terminator};
use crate::gopher::writer::{ScatterList, Segment};
use crate::hitlog::{Hit, HitRequest};
use crate::http::request::{HttpRequest, parse_http_request};
use crate::http::response::error_reply;
use crate::server::Services;
use crate::status::Status;

/// Slots up to this index keep their request buffer between connections.
pub const RETAINED_BUFFERS: usize = 8;

const READ_CHUNK: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    AwaitingRequest,
    Resolving,
    AwaitingBody,
    Writing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Gopher,
    Http,
    Stats,
}

/// One connection slot.
///
/// Slot 0 is the overflow slot: it only ever holds a socket that found no
/// free slot, long enough to tell the client so.
pub struct Connection {
    index: usize,
    state: ConnectionState,
    stream: Option<TcpStream>,
    peer: Option<SocketAddr>,
    buffer: Option<BytesMut>,
    last_active: Instant,
    out: ScatterList,
    lease: Option<Lease>,
    status: Status,
    protocol: Protocol,
    selector: Option<Vec<u8>>,
    http: Option<HttpRequest>,
    errno: Option<Errno>,
    scratch: Option<PathBuf>,
    registered: bool,
}

impl Connection {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            state: ConnectionState::Idle,
            stream: None,
            peer: None,
            buffer: None,
            last_active: Instant::now(),
            out: ScatterList::new(),
            lease: None,
            status: Status::Ok,
            protocol: Protocol::Gopher,
            selector: None,
            http: None,
            errno: None,
            scratch: None,
            registered: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_free(&self) -> bool {
        self.stream.is_none()
    }

    pub fn has_buffer(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Whether the connection has been quiet for longer than `timeout`.
    pub fn is_idle(&self, now: Instant, timeout: Duration) -> bool {
        !self.is_free() && now.saturating_duration_since(self.last_active) > timeout
    }

    fn token(&self) -> Token {
        Token(self.index)
    }

    /// Takes ownership of a freshly accepted socket.
    ///
    /// On a registration error the socket is kept so the caller can close it.
    pub fn accept(
        &mut self,
        mut stream: TcpStream,
        peer: SocketAddr,
        registry: &Registry,
        services: &mut Services,
    ) -> io::Result<()> {
        debug_assert!(self.is_free(), "accepting into a busy slot");

        services.stats.record_accept(self.index);
        self.peer = Some(peer);
        self.last_active = Instant::now();
        self.state = ConnectionState::AwaitingRequest;

        if self.index == 0 {
            self.stream = Some(stream);
            return Ok(());
        }

        self.buffer
            .get_or_insert_with(|| BytesMut::with_capacity(services.max_line))
            .clear();

        let registered = registry.register(&mut stream, self.token(), Interest::READABLE);
        self.stream = Some(stream);
        registered?;
        self.registered = true;

        tracing::debug!(slot = self.index, peer = %peer, "Accepted connection");
        Ok(())
    }

    /// Read phase: drains the socket until it would block or a request is complete.
    pub fn on_readable(&mut self, registry: &Registry, services: &mut Services) {
        if self.state != ConnectionState::AwaitingRequest {
            return;
        }

        let max_line = services.max_line;
        let mut chunk = [0u8; READ_CHUNK];

        let parsed = loop {
            let (Some(stream), Some(buf)) = (self.stream.as_mut(), self.buffer.as_mut()) else {
                return;
            };

            let room = max_line.saturating_sub(buf.len()).min(READ_CHUNK);
            if room == 0 {
                break parse_request_line(buf, max_line);
            }

            match stream.read(&mut chunk[..room]) {
                Ok(0) => {
                    tracing::debug!(slot = self.index, "Client closed before sending a request");
                    self.close(Status::Timeout, registry, services);
                    return;
                }
                Ok(n) => {
                    buf.extend_from_slice(&chunk[..n]);
                    self.last_active = Instant::now();
                    match parse_request_line(buf, max_line) {
                        Err(ParseError::Incomplete) => continue,
                        other => break other,
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::debug!(slot = self.index, error = %e, "Read failed");
                    self.close(Status::Timeout, registry, services);
                    return;
                }
            }
        };

        match parsed {
            Ok(RequestLine::Stats) => self.serve_stats(registry, services),
            Ok(RequestLine::Http) => self.serve_http(registry, services),
            Ok(RequestLine::Gopher(line)) => self.serve_gopher(line, registry, services),
            Err(ParseError::TooLarge { http }) => {
                self.protocol = if http { Protocol::Http } else { Protocol::Gopher };
                services.stats.record_line(max_line);
                tracing::warn!(peer = ?self.peer, "Request line too long");
                self.close(Status::TooLarge, registry, services);
            }
            Err(ParseError::Incomplete) => {}
        }
    }

    fn serve_stats(&mut self, registry: &Registry, services: &mut Services) {
        self.protocol = Protocol::Stats;
        self.status = Status::Stats;
        services.stats.record_line(crate::gopher::parser::STATS_REQUEST.len());

        let block = services.stats.render(&services.cache.stats());
        self.out.push(Segment::Owned(block.into_bytes()));
        self.start_writing(registry, services);
    }

    fn serve_gopher(&mut self, line: Vec<u8>, registry: &Registry, services: &mut Services) {
        self.protocol = Protocol::Gopher;
        services.stats.record_line(line.len());
        self.state = ConnectionState::Resolving;

        let resolved = services.resolver.resolve(&line);
        self.selector = Some(line);
        let resolved = match resolved {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(peer = ?self.peer, error = %e, "Resolve failed");
                self.errno = Some(e.errno());
                self.close(Status::NotFound, registry, services);
                return;
            }
        };

        tracing::debug!(
            slot = self.index,
            kind = %resolved.selector.as_char(),
            path = %resolved.path.display(),
            "Resolved"
        );

        self.state = ConnectionState::AwaitingBody;
        let len = match self.lease_body(resolved.file, services) {
            Ok(len) => len,
            Err(status) => {
                self.close(status, registry, services);
                return;
            }
        };
        if len > 0 {
            self.out.push(Segment::Body(len));
        }

        let body = self
            .lease
            .as_ref()
            .and_then(|l| services.cache.bytes(l))
            .unwrap_or(&[]);
        if let Some(trailer) = terminator(resolved.selector, body) {
            self.out.push(Segment::Static(trailer));
        }

        self.start_writing(registry, services);
    }

    fn serve_http(&mut self, registry: &Registry, services: &mut Services) {
        self.protocol = Protocol::Http;
        let Some(buf) = self.buffer.as_ref() else {
            return;
        };
        services.stats.record_line(buf.len());

        let req = match parse_http_request(buf) {
            Ok(req) => req,
            Err(e) => {
                tracing::debug!(peer = ?self.peer, error = %e, "Bad HTTP request");
                self.close(Status::BadRequest, registry, services);
                return;
            }
        };

        self.state = ConnectionState::Resolving;
        let reply = services.gateway.respond(&req, &services.resolver);
        self.http = Some(req);
        self.status = reply.status;
        self.scratch = reply.scratch;

        if reply.header.is_empty() {
            self.close(reply.status, registry, services);
            return;
        }
        self.out.push(Segment::Owned(reply.header));

        if let Some((file, _)) = reply.body {
            self.state = ConnectionState::AwaitingBody;
            match self.lease_body(file, services) {
                Ok(0) => {}
                Ok(len) => self.out.push(Segment::Body(len)),
                Err(status) => {
                    self.close(status, registry, services);
                    return;
                }
            }
        }

        self.start_writing(registry, services);
    }

    /// Maps the body through the cache. The file is closed on return.
    fn lease_body(&mut self, mut file: File, services: &mut Services) -> Result<usize, Status> {
        let len = file.seek(SeekFrom::End(0)).map_err(|e| {
            tracing::warn!(peer = ?self.peer, error = %e, "Seek failed");
            Status::Timeout
        })? as usize;

        if len == 0 {
            return Ok(0);
        }

        match services.cache.acquire(&file, len) {
            Ok(lease) => {
                let len = lease.len();
                self.lease = Some(lease);
                Ok(len)
            }
            Err(e @ CacheError::Exhausted(_)) => {
                tracing::warn!(error = %e, "Cache full");
                Err(Status::Unavailable)
            }
            Err(e) => {
                tracing::warn!(peer = ?self.peer, error = %e, "Mapping failed");
                Err(Status::Timeout)
            }
        }
    }

    fn start_writing(&mut self, registry: &Registry, services: &mut Services) {
        self.state = ConnectionState::Writing;
        let token = self.token();
        if self.registered {
            if let Some(stream) = self.stream.as_mut() {
                if let Err(e) = registry.reregister(stream, token, Interest::WRITABLE) {
                    tracing::warn!(slot = self.index, error = %e, "Re-arming for write failed");
                    self.close(Status::ServerError, registry, services);
                    return;
                }
            }
        }
        // Readiness is edge triggered; write now rather than wait for the first event.
        self.on_writable(registry, services);
    }

    /// Write phase: scatter writes until drained or the socket would block.
    pub fn on_writable(&mut self, registry: &Registry, services: &mut Services) {
        if self.state != ConnectionState::Writing {
            return;
        }

        loop {
            if self.out.is_done() {
                let status = self.status;
                self.close(status, registry, services);
                return;
            }

            let Some(stream) = self.stream.as_mut() else {
                return;
            };
            let body: &[u8] = match &self.lease {
                Some(lease) => services.cache.bytes(lease).unwrap_or(&[]),
                None => &[],
            };

            match self.out.write_to(stream, body) {
                Ok(0) => {
                    tracing::debug!(slot = self.index, "Zero-byte write");
                    self.close(Status::Timeout, registry, services);
                    return;
                }
                Ok(_) => self.last_active = Instant::now(),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::debug!(slot = self.index, error = %e, "Write failed");
                    self.close(Status::Timeout, registry, services);
                    return;
                }
            }
        }
    }

    /// Ends the connection with `status` and returns the slot to `Idle`.
    pub fn close(&mut self, status: Status, registry: &Registry, services: &mut Services) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };
        self.state = ConnectionState::Closed;
        self.status = status;
        let sent = self.out.written();

        if status.is_logged() {
            services.hitlog.record(&self.hit(sent));
        }

        if sent == 0 && status.wants_error_line() {
            if let Some(line) = self.error_line() {
                // Best effort, the socket is going away either way.
                if let Err(e) = stream.write(&line) {
                    tracing::debug!(slot = self.index, error = %e, "Error line not sent");
                }
            }
        }

        tracing::debug!(
            slot = self.index,
            peer = ?self.peer,
            status = status.as_u16(),
            bytes = sent,
            "Connection closed"
        );

        if let Some(lease) = self.lease.take() {
            if let Err(e) = services.cache.release(lease) {
                tracing::error!(slot = self.index, error = %e, "Cache release failed");
            }
        }

        if self.registered {
            if let Err(e) = registry.deregister(&mut stream) {
                tracing::debug!(slot = self.index, error = %e, "Deregister failed");
            }
            self.registered = false;
        }
        drop(stream);

        if let Some(path) = self.scratch.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "Removing scratch page failed");
            }
        }

        if self.index > RETAINED_BUFFERS {
            self.buffer = None;
        } else if let Some(buf) = self.buffer.as_mut() {
            buf.clear();
        }

        self.out.clear();
        self.peer = None;
        self.selector = None;
        self.http = None;
        self.errno = None;
        self.protocol = Protocol::Gopher;
        self.status = Status::Ok;
        self.state = ConnectionState::Idle;
        services.stats.record_close();
    }

    fn hit(&self, sent: usize) -> Hit<'_> {
        let request = match (self.protocol, &self.http) {
            (Protocol::Http, Some(req)) => HitRequest::Http {
                method: req.method.as_str(),
                target: &req.target,
                referer: req.header("referer"),
                user_agent: req.header("user-agent"),
            },
            _ => HitRequest::Gopher {
                selector: self.selector.as_deref(),
            },
        };
        Hit {
            peer: self.peer,
            request,
            status: self.status.as_u16(),
            bytes: sent,
        }
    }

    fn error_line(&self) -> Option<Vec<u8>> {
        match self.protocol {
            Protocol::Gopher => {
                let line = match self.errno {
                    Some(errno) => errno_line(self.selector.as_deref().unwrap_or_default(), errno),
                    None => status_line(self.status),
                };
                Some(line.into_bytes())
            }
            Protocol::Http => Some(error_reply(self.status)),
            Protocol::Stats => None,
        }
    }
}
