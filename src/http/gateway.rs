use crate::config::Config;
use crate::gopher::resolver::Resolver;
use crate::gopher::selector::Selector;
use crate::http::directory::{ListingStyle, render_listing};
use crate::http::mime;
use crate::http::request::{HttpRequest, Method};
use crate::http::response::HeaderBuilder;
use crate::status::Status;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;

/// Name prefix of the scratch files directory pages are rendered into.
pub const SCRATCH_PREFIX: &str = ".burrow-";

/// What the connection sends back for a gatewayed request.
#[derive(Debug)]
pub struct Reply {
    pub status: Status,
    pub header: Vec<u8>,
    /// The file to serve after the header, with its length.
    pub body: Option<(File, usize)>,
    /// A rendered page to delete once the connection closes.
    pub scratch: Option<PathBuf>,
}

/// Serves gopher resources to web browsers.
#[derive(Debug, Clone)]
pub struct Gateway {
    server: String,
    style: ListingStyle,
}

impl Gateway {
    pub fn new(cfg: &Config) -> Self {
        Self {
            server: server_name(),
            style: ListingStyle {
                hostname: cfg.effective_hostname(),
                icon_width: cfg.icon_width,
                icon_height: cfg.icon_height,
            },
        }
    }

    pub fn respond(&self, req: &HttpRequest, resolver: &Resolver) -> Reply {
        let resolved = match resolver.open_typed(req.selector, &req.path) {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(request = %req.target, error = %e, "Gateway lookup failed");
                return self.not_found();
            }
        };

        if resolved.selector == Selector::Directory {
            return self.directory(req, resolved.file, resolver);
        }

        let len = match resolved.file.metadata() {
            Ok(meta) => meta.len() as usize,
            Err(e) => {
                tracing::warn!(request = %req.target, error = %e, "fstat failed");
                return self.failure(Status::ServerError);
            }
        };
        let content_type =
            mime::content_type(resolved.selector, &resolved.path).unwrap_or("application/octet-stream");
        let header = self.header(Status::Ok, content_type, len);

        Reply {
            status: Status::Ok,
            header,
            body: (req.method == Method::GET).then_some((resolved.file, len)),
            scratch: None,
        }
    }

    fn directory(&self, req: &HttpRequest, mut listing: File, resolver: &Resolver) -> Reply {
        let mut raw = Vec::new();
        if let Err(e) = listing.read_to_end(&mut raw) {
            tracing::warn!(request = %req.target, error = %e, "Reading listing failed");
            return self.failure(Status::ServerError);
        }
        let page = render_listing(&raw, &String::from_utf8_lossy(&req.path), &self.style);
        let header = self.header(Status::Ok, mime::TEXT_HTML, page.len());

        if req.method == Method::HEAD {
            return Reply {
                status: Status::Ok,
                header,
                body: None,
                scratch: None,
            };
        }

        match write_scratch(&page, resolver) {
            Ok((file, path)) => Reply {
                status: Status::Ok,
                header,
                body: Some((file, page.len())),
                scratch: Some(path),
            },
            Err(e) => {
                tracing::warn!(error = %e, "Creating scratch page failed");
                self.failure(Status::ServerError)
            }
        }
    }

    fn header(&self, status: Status, content_type: &str, len: usize) -> Vec<u8> {
        HeaderBuilder::new(status)
            .header("Server", self.server.as_str())
            .header("Content-Type", content_type)
            .content_length(len)
            .build()
    }

    fn not_found(&self) -> Reply {
        Reply {
            status: Status::NotFound,
            header: self.header(Status::NotFound, mime::TEXT_HTML, 0),
            body: None,
            scratch: None,
        }
    }

    /// A failure the client only learns about from the status line.
    fn failure(&self, status: Status) -> Reply {
        Reply {
            status,
            header: Vec::new(),
            body: None,
            scratch: None,
        }
    }
}

/// Writes a rendered page to a file inside the served root, where the cache
/// can map it like any other resource.
fn write_scratch(page: &[u8], resolver: &Resolver) -> io::Result<(File, PathBuf)> {
    let mut tmp = tempfile::Builder::new()
        .prefix(SCRATCH_PREFIX)
        .tempfile_in(resolver.root())?;
    tmp.write_all(page)?;
    tmp.keep().map_err(|e| e.error)
}

fn server_name() -> String {
    let os = nix::sys::utsname::uname()
        .map(|u| u.sysname().to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unix".to_string());
    format!("Burrow/{} ({})", env!("CARGO_PKG_VERSION"), os)
}
