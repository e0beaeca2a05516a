//! Startup sequence.
//!
//! The order matters: the pidfile and the listening socket are created while
//! the process still has the rights they need, the hit log is opened before
//! the chroot hides its directory, and privileges go last. Every step is
//! fatal on failure.

use anyhow::{Context, Result, bail};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::{Gid, Pid, Uid, User};
use std::ffi::CString;
use std::path::Path;

use crate::config::{Config, DEFAULT_USER};
use crate::gopher::resolver::Resolver;
use crate::hitlog::HitLog;
use crate::server::Services;
use crate::server::dispatcher::Dispatcher;
use crate::server::listener::Listener;
use crate::server::signals::SignalFlags;

/// The unprivileged identity the daemon runs as.
#[derive(Debug, Clone)]
pub struct Account {
    pub uid: Uid,
    pub gid: Gid,
    /// Needed for the supplementary group list.
    pub name: Option<String>,
}

/// Raises the effective uid back to root for the duration of one call.
///
/// Only available when the saved uid was kept at startup.
#[derive(Debug, Clone, Copy)]
pub struct AcceptPrivileges {
    uid: Uid,
}

impl AcceptPrivileges {
    pub fn around<T>(&self, f: impl FnOnce() -> T) -> T {
        if let Err(e) = nix::unistd::seteuid(Uid::from_raw(0)) {
            tracing::warn!(error = %e, "seteuid(0) failed");
        }
        let out = f();
        if let Err(e) = nix::unistd::seteuid(self.uid) {
            tracing::error!(error = %e, "Could not give up root after accept");
            std::process::abort();
        }
        out
    }
}

/// Runs the whole startup sequence and returns a dispatcher ready to serve.
pub fn bootstrap(cfg: &Config) -> Result<Dispatcher> {
    if !cfg.pidfile.as_os_str().is_empty() {
        create_pidfile(&cfg.pidfile)?;
    }

    std::env::set_current_dir(&cfg.root)
        .with_context(|| format!("chdir {}", cfg.root.display()))?;

    let account = if Uid::effective().is_root() {
        Some(resolve_account(cfg)?)
    } else {
        None
    };

    let listener = Listener::bind(cfg.socket_addr()?)
        .with_context(|| format!("binding {}", cfg.listen_addr))?;

    let hitlog = if cfg.logfile.as_os_str().is_empty() {
        HitLog::disabled()
    } else {
        HitLog::open(&cfg.logfile, cfg.ignore_local, cfg.combined_log)
            .with_context(|| format!("opening hit log {}", cfg.logfile.display()))?
    };

    enter_jail(&cfg.root, cfg.allow_non_root)?;

    let privileges = match &account {
        Some(account) => drop_privileges(account, cfg.accept_privileged)?,
        None => {
            tracing::info!("Not running as root, keeping the current user");
            None
        }
    };

    let signals = SignalFlags::new();
    let wake = signals.install().context("installing signal handlers")?;

    let services = Services::new(cfg, Resolver::new(".", cfg.strict_selectors), hitlog);
    let mut dispatcher = Dispatcher::new(listener, services, cfg)
        .context("creating the dispatcher")?
        .with_signals(signals, wake)
        .context("watching for signals")?;
    if let Some(privileges) = privileges {
        dispatcher = dispatcher.with_accept_privileges(privileges);
    }

    tracing::info!(root = %cfg.root.display(), "Bootstrap complete");
    Ok(dispatcher)
}

/// Writes our pid, refusing to start when another live process owns the file.
pub fn create_pidfile(path: &Path) -> Result<()> {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            let pid = text
                .trim()
                .parse::<i32>()
                .ok()
                .filter(|pid| *pid > 0)
                .with_context(|| format!("unable to read {}", path.display()))?;
            match kill(Pid::from_raw(pid), None::<Signal>) {
                Ok(()) | Err(Errno::EPERM) => {
                    bail!("already running (pid = {pid})");
                }
                Err(_) => {
                    tracing::info!(pid, "Replacing stale pidfile");
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("open {}", path.display())),
    }

    std::fs::write(path, format!("{}\n", std::process::id()))
        .with_context(|| format!("create {}", path.display()))?;
    Ok(())
}

/// Fills in whatever of uid and gid the configuration leaves open from the
/// service account.
pub fn resolve_account(cfg: &Config) -> Result<Account> {
    if let (Some(uid), Some(gid)) = (cfg.uid, cfg.gid) {
        let uid = Uid::from_raw(uid);
        let name = User::from_uid(uid).ok().flatten().map(|u| u.name);
        return Ok(Account {
            uid,
            gid: Gid::from_raw(gid),
            name,
        });
    }

    let user = cfg.user.as_deref().unwrap_or(DEFAULT_USER);
    let entry = User::from_name(user)
        .with_context(|| format!("looking up user {user}"))?
        .with_context(|| format!("no such user {user}"))?;

    Ok(Account {
        uid: cfg.uid.map(Uid::from_raw).unwrap_or(entry.uid),
        gid: cfg.gid.map(Gid::from_raw).unwrap_or(entry.gid),
        name: Some(entry.name),
    })
}

fn enter_jail(root: &Path, allow_non_root: bool) -> Result<()> {
    match nix::unistd::chroot(root) {
        Ok(()) => {
            nix::unistd::chdir("/").context("chdir / after chroot")?;
            tracing::debug!(root = %root.display(), "Entered chroot");
            Ok(())
        }
        Err(Errno::EPERM) if allow_non_root => {
            tracing::warn!("No chroot, serving from the root directory without a jail");
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("chroot {}", root.display())),
    }
}

fn drop_privileges(account: &Account, keep_saved_uid: bool) -> Result<Option<AcceptPrivileges>> {
    nix::unistd::setgid(account.gid).context("setgid")?;

    match &account.name {
        Some(name) => {
            let name = CString::new(name.as_str()).context("user name")?;
            nix::unistd::initgroups(&name, account.gid).context("initgroups")?;
        }
        None => nix::unistd::setgroups(&[account.gid]).context("setgroups")?,
    }

    if keep_saved_uid {
        nix::unistd::seteuid(account.uid).context("seteuid")?;
        tracing::info!(uid = account.uid.as_raw(), "Dropped effective uid, root kept for accept");
        return Ok(Some(AcceptPrivileges { uid: account.uid }));
    }

    nix::unistd::setuid(account.uid).context("setuid")?;
    if nix::unistd::setuid(Uid::from_raw(0)).is_ok() {
        bail!("root privileges could be regained after setuid");
    }
    tracing::info!(
        uid = account.uid.as_raw(),
        gid = account.gid.as_raw(),
        "Dropped privileges"
    );
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_ids_skip_the_account_lookup() {
        let cfg = Config {
            uid: Some(4242),
            gid: Some(4343),
            user: Some("no-such-user-anywhere".to_string()),
            ..Config::default()
        };
        let account = resolve_account(&cfg).unwrap();
        assert_eq!(account.uid.as_raw(), 4242);
        assert_eq!(account.gid.as_raw(), 4343);
    }

    #[test]
    fn missing_user_is_fatal() {
        let cfg = Config {
            user: Some("no-such-user-anywhere".to_string()),
            ..Config::default()
        };
        assert!(resolve_account(&cfg).is_err());
    }
}
