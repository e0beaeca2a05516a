//! Daemon configuration.
//!
//! Settings come from a YAML file where every key is optional. A missing
//! file at the default location is not an error. The `LISTEN` environment
//! variable overrides the listen address.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Location of the configuration file when `-c` is not given.
pub const DEFAULT_CONFIG: &str = "/etc/burrow.yaml";

/// Account looked up when neither `uid` nor `gid` is configured.
pub const DEFAULT_USER: &str = "gopher";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Address the listening socket binds to.
    pub listen_addr: String,
    /// Directory served and chrooted into.
    pub root: PathBuf,
    /// Hit log file; empty disables hit logging.
    pub logfile: PathBuf,
    /// Diagnostics file; empty keeps them on the terminal.
    pub error_log: PathBuf,
    pub pidfile: PathBuf,
    /// Host name written into generated links. Empty means the system host name.
    pub hostname: String,
    pub user: Option<String>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    /// Skip hit logging for loopback and 192.168.0.0/16 clients.
    pub ignore_local: bool,
    /// Write referer and user agent on HTTP hit lines.
    pub combined_log: bool,
    /// Real connection slots; one extra sentinel slot is always added.
    pub max_requests: usize,
    /// Mapped-region pool size. Must exceed `max_requests`.
    pub cache_entries: usize,
    /// Longest accepted request, in bytes.
    pub max_line: usize,
    pub idle_timeout_ms: u64,
    /// Poll timeout while connections are active; the idle sweep runs on expiry.
    pub poll_interval_ms: u64,
    /// Only accept requests with an explicit `X/` selector prefix.
    pub strict_selectors: bool,
    /// Keep running without chroot when not started as root.
    pub allow_non_root: bool,
    /// Keep the saved root uid and raise it around `accept`.
    pub accept_privileged: bool,
    pub icon_width: u32,
    pub icon_height: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:70".to_string(),
            root: PathBuf::from("/var/lib/gopherd"),
            logfile: PathBuf::from("/var/log/burrow.log"),
            error_log: PathBuf::new(),
            pidfile: PathBuf::from("/var/run/burrow.pid"),
            hostname: String::new(),
            user: None,
            uid: None,
            gid: None,
            ignore_local: true,
            combined_log: false,
            max_requests: 255,
            cache_entries: 300,
            max_line: 1024,
            idle_timeout_ms: 60_000,
            poll_interval_ms: 10_000,
            strict_selectors: false,
            allow_non_root: false,
            accept_privileged: false,
            icon_width: 20,
            icon_height: 22,
        }
    }
}

impl Config {
    /// Loads the configuration file, applies the environment override and validates.
    pub fn load(path: &Path) -> Result<Self> {
        let mut cfg = match std::fs::read_to_string(path) {
            Ok(text) => Self::from_yaml(&text)
                .with_context(|| format!("parsing {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && path == Path::new(DEFAULT_CONFIG) => {
                tracing::debug!(path = %path.display(), "No configuration file, using defaults");
                Self::default()
            }
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };

        if let Ok(listen) = std::env::var("LISTEN") {
            cfg.listen_addr = listen;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn validate(&self) -> Result<()> {
        // The daemon changes into the root before it chroots there.
        if !self.root.is_absolute() {
            bail!("root ({}) must be an absolute path", self.root.display());
        }
        if self.max_requests == 0 {
            bail!("max_requests must be at least 1");
        }
        if self.cache_entries <= self.max_requests {
            bail!(
                "cache_entries ({}) must exceed max_requests ({})",
                self.cache_entries,
                self.max_requests
            );
        }
        if self.max_line < 16 {
            bail!("max_line ({}) is too small", self.max_line);
        }
        self.socket_addr()?;
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.listen_addr
            .parse()
            .with_context(|| format!("invalid listen address '{}'", self.listen_addr))
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// The configured host name, or the system one, or `localhost`.
    pub fn effective_hostname(&self) -> String {
        if !self.hostname.is_empty() {
            return self.hostname.clone();
        }
        match nix::unistd::gethostname() {
            Ok(name) => name.to_string_lossy().into_owned(),
            Err(e) => {
                tracing::warn!(error = %e, "Setting hostname to localhost, this is probably not what you want");
                "localhost".to_string()
            }
        }
    }
}
