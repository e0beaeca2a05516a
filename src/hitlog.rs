//! Access log in common log format.
//!
//! One line per finished connection. The file is opened before the chroot
//! and can be reopened on request for log rotation; the dispatcher only
//! asks for a reopen between readiness waits, so it never races a write.

use chrono::{DateTime, Local};
use std::borrow::Cow;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

/// What was asked for, in the shape of the protocol that asked.
#[derive(Debug, Clone)]
pub enum HitRequest<'a> {
    Gopher {
        /// `None` when the client never sent a complete line.
        selector: Option<&'a [u8]>,
    },
    Http {
        method: &'a str,
        target: &'a str,
        referer: Option<&'a str>,
        user_agent: Option<&'a str>,
    },
}

#[derive(Debug, Clone)]
pub struct Hit<'a> {
    pub peer: Option<SocketAddr>,
    pub request: HitRequest<'a>,
    pub status: u16,
    pub bytes: usize,
}

pub struct HitLog {
    path: Option<PathBuf>,
    file: Option<File>,
    ignore_local: bool,
    combined: bool,
}

impl HitLog {
    /// A log that records nothing.
    pub fn disabled() -> Self {
        Self {
            path: None,
            file: None,
            ignore_local: false,
            combined: false,
        }
    }

    pub fn open(path: &Path, ignore_local: bool, combined: bool) -> io::Result<Self> {
        let file = append(path)?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            file: Some(file),
            ignore_local,
            combined,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.file.is_some()
    }

    /// Closes and reopens the file at the same path.
    pub fn reopen(&mut self) -> io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        self.file = None;
        self.file = Some(append(path)?);
        tracing::warn!(path = %path.display(), "Log file reopened");
        Ok(())
    }

    pub fn record(&mut self, hit: &Hit<'_>) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        if self.ignore_local && hit.peer.is_some_and(|p| is_local(p.ip())) {
            return;
        }

        let line = format_hit(hit, Local::now(), self.combined);
        if let Err(e) = file.write_all(line.as_bytes()) {
            tracing::warn!(error = %e, "Hit log write failed");
        }
    }

    /// Stops recording. Lines already written are synced to disk.
    pub fn close(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = file.sync_data() {
                tracing::warn!(error = %e, "Syncing the hit log failed");
            }
        }
    }
}

fn append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Loopback and 192.168.0.0/16.
pub fn is_local(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.octets()[..2] == [192, 168],
        IpAddr::V6(v6) => v6.is_loopback(),
    }
}

/// Formats one log line, newline included.
pub fn format_hit(hit: &Hit<'_>, when: DateTime<Local>, combined: bool) -> String {
    let host = hit
        .peer
        .map(|p| p.ip().to_string())
        .unwrap_or_else(|| "-".to_string());
    let stamp = when.format("%d/%b/%Y:%T %z");

    match &hit.request {
        HitRequest::Gopher { selector } => {
            let name = match selector {
                None => Cow::Borrowed("[Empty]"),
                Some([]) => Cow::Borrowed("/"),
                Some(s) => String::from_utf8_lossy(s),
            };
            format!(
                "{} - - [{}] \"GET {}\" {} {}\n",
                host,
                stamp,
                clip(&name, 300),
                hit.status,
                hit.bytes
            )
        }
        HitRequest::Http {
            method,
            target,
            referer,
            user_agent,
        } => {
            let target = target.strip_prefix('/').unwrap_or(target);
            let mut line = format!(
                "{} - - [{}] \"{} /{}\" {} {}",
                host,
                stamp,
                method,
                clip(target, 200),
                hit.status,
                hit.bytes
            );
            if combined {
                line.push_str(&format!(
                    " \"{}\" \"{}\"",
                    clip(referer.unwrap_or("-"), 100),
                    clip(user_agent.unwrap_or("-"), 100)
                ));
            }
            line.push('\n');
            line
        }
    }
}

fn clip(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
