use mio::net::UnixStream;
use mio::{Interest, Registry, Token};
use signal_hook::consts::{SIGHUP, SIGINT, SIGPIPE, SIGTERM, SIGUSR1};
use signal_hook::flag;
use signal_hook::low_level::pipe;
use std::io::{self, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Flags the signal handlers set and the dispatcher reads once per iteration.
#[derive(Debug, Clone, Default)]
pub struct SignalFlags {
    pub shutdown: Arc<AtomicBool>,
    pub reopen_log: Arc<AtomicBool>,
}

/// Read end of the socket pair the handlers write a byte into after setting
/// their flag. Registered with the poll so a delivery ends the wait.
#[derive(Debug)]
pub struct SignalWake {
    receiver: UnixStream,
}

impl SignalWake {
    pub fn register(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        registry.register(&mut self.receiver, token, Interest::READABLE)
    }

    /// Empties the socket. The flags say what was delivered.
    pub fn drain(&mut self) {
        let mut buf = [0u8; 64];
        loop {
            match self.receiver.read(&mut buf) {
                Ok(0) => return,
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    tracing::warn!(error = %e, "Draining the signal socket failed");
                    return;
                }
            }
        }
    }
}

impl SignalFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// SIGTERM, SIGINT and SIGHUP ask for shutdown, SIGUSR1 for a hit log
    /// reopen. SIGPIPE is swallowed; failed writes are handled where they happen.
    ///
    /// Handlers run in registration order, so the flag is set before the
    /// wake byte is written.
    pub fn install(&self) -> io::Result<SignalWake> {
        let (receiver, sender) = std::os::unix::net::UnixStream::pair()?;
        receiver.set_nonblocking(true)?;
        sender.set_nonblocking(true)?;

        for sig in [SIGTERM, SIGINT, SIGHUP] {
            flag::register(sig, Arc::clone(&self.shutdown))?;
            pipe::register(sig, sender.try_clone()?)?;
        }
        flag::register(SIGUSR1, Arc::clone(&self.reopen_log))?;
        pipe::register(SIGUSR1, sender)?;
        flag::register(SIGPIPE, Arc::new(AtomicBool::new(false)))?;

        tracing::debug!("Signal handlers installed");
        Ok(SignalWake {
            receiver: UnixStream::from_std(receiver),
        })
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Consumes a pending reopen request.
    pub fn take_reopen(&self) -> bool {
        self.reopen_log.swap(false, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reopen_is_consumed_once() {
        let flags = SignalFlags::new();
        flags.reopen_log.store(true, Ordering::SeqCst);
        assert!(flags.take_reopen());
        assert!(!flags.take_reopen());
        assert!(!flags.shutdown_requested());
    }
}
