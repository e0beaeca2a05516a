//! Diagnostic output.
//!
//! Diagnostics go to the terminal unless an error log is configured. A
//! daemon without an error log keeps its inherited stdout, so whatever
//! started it sees the output.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing::{Level, Subscriber};

/// Where diagnostics are written.
#[derive(Debug)]
pub enum LogSink {
    Terminal,
    File(File),
}

impl LogSink {
    /// An empty path means the terminal. Files are appended to.
    pub fn open(path: &Path) -> io::Result<Self> {
        if path.as_os_str().is_empty() {
            return Ok(LogSink::Terminal);
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(LogSink::File(file))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LogSink::Terminal)
    }
}

pub fn subscriber(level: Level, sink: LogSink) -> Box<dyn Subscriber + Send + Sync> {
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(level);
    match sink {
        LogSink::Terminal => Box::new(builder.finish()),
        LogSink::File(file) => Box::new(
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .finish(),
        ),
    }
}
