//! The single-threaded readiness loop.
//!
//! All connection state lives in one slot table owned by the dispatcher.
//! Nothing blocks except the wait for readiness, and signal flags are only
//! looked at between waits, so no handler ever runs concurrently with a
//! connection.

use anyhow::Context;
use mio::event::Event;
use mio::{Events, Poll, Token, Waker};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::gopher::connection::{Connection, ConnectionState};
use crate::server::Services;
use crate::server::bootstrap::AcceptPrivileges;
use crate::server::listener::Listener;
use crate::server::signals::{SignalFlags, SignalWake};
use crate::status::Status;

const LISTENER: Token = Token(usize::MAX);
const WAKER: Token = Token(usize::MAX - 1);
const SIGNAL: Token = Token(usize::MAX - 2);

const EVENT_CAPACITY: usize = 256;

/// What an event reported, copied out so the event list can be released.
#[derive(Debug, Clone, Copy)]
struct Readiness {
    readable: bool,
    writable: bool,
    hangup: bool,
    error: bool,
}

impl Readiness {
    fn of(event: &Event) -> Self {
        Self {
            readable: event.is_readable(),
            writable: event.is_writable(),
            hangup: event.is_read_closed() || event.is_write_closed(),
            error: event.is_error(),
        }
    }
}

/// Stops a running dispatcher from another thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
        if let Err(e) = self.waker.wake() {
            tracing::warn!(error = %e, "Waking the dispatcher failed");
        }
    }
}

pub struct Dispatcher {
    poll: Poll,
    events: Events,
    listener: Listener,
    /// Slot 0 is the overflow slot, `1..` are real connections.
    slots: Vec<Connection>,
    services: Services,
    signals: SignalFlags,
    signal_wake: Option<SignalWake>,
    waker: Arc<Waker>,
    idle_timeout: Duration,
    poll_interval: Duration,
    accept_privileges: Option<AcceptPrivileges>,
}

impl Dispatcher {
    pub fn new(mut listener: Listener, services: Services, cfg: &Config) -> io::Result<Self> {
        let poll = Poll::new()?;
        listener.register(poll.registry(), LISTENER)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);
        let slots = (0..=cfg.max_requests).map(Connection::new).collect();

        Ok(Self {
            poll,
            events: Events::with_capacity(EVENT_CAPACITY),
            listener,
            slots,
            services,
            signals: SignalFlags::new(),
            signal_wake: None,
            waker,
            idle_timeout: cfg.idle_timeout(),
            poll_interval: cfg.poll_interval(),
            accept_privileges: None,
        })
    }

    /// Uses installed `signals` instead of the dispatcher's own, unconnected
    /// flags. `wake` ends a readiness wait when one of them is delivered.
    pub fn with_signals(mut self, signals: SignalFlags, mut wake: SignalWake) -> io::Result<Self> {
        wake.register(self.poll.registry(), SIGNAL)?;
        self.signals = signals;
        self.signal_wake = Some(wake);
        Ok(self)
    }

    pub fn with_accept_privileges(mut self, privileges: AcceptPrivileges) -> Self {
        self.accept_privileges = Some(privileges);
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            flag: Arc::clone(&self.signals.shutdown),
            waker: Arc::clone(&self.waker),
        }
    }

    /// Serves until shutdown is requested.
    pub fn run(&mut self) -> anyhow::Result<()> {
        tracing::info!(slots = self.slots.len() - 1, "Dispatcher running");
        while self.run_once()? {}
        Ok(())
    }

    /// One wait for readiness and the work it produced. Returns `false` once
    /// the dispatcher has shut down.
    pub fn run_once(&mut self) -> anyhow::Result<bool> {
        if self.signals.shutdown_requested() {
            self.shutdown();
            return Ok(false);
        }
        if self.signals.take_reopen() {
            if let Err(e) = self.services.hitlog.reopen() {
                tracing::error!(error = %e, "Reopening the hit log failed");
            }
        }

        let timeout = (self.services.stats.active > 0).then_some(self.poll_interval);
        if let Err(e) = self.poll.poll(&mut self.events, timeout) {
            if e.kind() == io::ErrorKind::Interrupted {
                return Ok(true);
            }
            return Err(e).context("waiting for readiness");
        }

        if self.events.is_empty() {
            self.sweep_idle(Instant::now());
            return Ok(true);
        }

        let mut accept = false;
        let mut signalled = false;
        let mut ready = Vec::with_capacity(EVENT_CAPACITY);
        for event in self.events.iter() {
            match event.token() {
                LISTENER => accept = true,
                WAKER => {}
                SIGNAL => signalled = true,
                Token(slot) => ready.push((slot, Readiness::of(event))),
            }
        }
        ready.sort_unstable_by_key(|(slot, _)| *slot);

        // The flags themselves are acted on at the top of the next iteration.
        if signalled {
            if let Some(wake) = self.signal_wake.as_mut() {
                wake.drain();
            }
        }

        if accept {
            self.accept_pending();
        }
        for (slot, readiness) in ready {
            self.dispatch(slot, readiness);
        }

        Ok(true)
    }

    fn accept_pending(&mut self) {
        loop {
            let accepted = match &self.accept_privileges {
                Some(privileges) => privileges.around(|| self.listener.accept()),
                None => self.listener.accept(),
            };

            match accepted {
                Ok((stream, peer)) => self.place(stream, peer),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    return;
                }
            }
        }
    }

    fn place(&mut self, stream: mio::net::TcpStream, peer: SocketAddr) {
        let registry = self.poll.registry();
        let free = self
            .slots
            .iter()
            .skip(1)
            .position(Connection::is_free)
            .map(|i| i + 1);

        let Some(index) = free else {
            tracing::warn!(peer = %peer, "All connection slots busy");
            let overflow = &mut self.slots[0];
            if let Err(e) = overflow.accept(stream, peer, registry, &mut self.services) {
                tracing::debug!(error = %e, "Overflow accept failed");
            }
            overflow.close(Status::TooManyRequests, registry, &mut self.services);
            return;
        };

        let conn = &mut self.slots[index];
        if let Err(e) = conn.accept(stream, peer, registry, &mut self.services) {
            tracing::warn!(peer = %peer, error = %e, "Registering connection failed");
            conn.close(Status::ServerError, registry, &mut self.services);
        }
    }

    fn dispatch(&mut self, slot: usize, readiness: Readiness) {
        let registry = self.poll.registry();
        let Some(conn) = self.slots.get_mut(slot) else {
            return;
        };
        if slot == 0 || conn.is_free() {
            return;
        }

        match conn.state() {
            ConnectionState::AwaitingRequest if readiness.readable => {
                conn.on_readable(registry, &mut self.services)
            }
            ConnectionState::Writing if readiness.writable => {
                conn.on_writable(registry, &mut self.services)
            }
            _ if readiness.hangup => conn.close(Status::HungUp, registry, &mut self.services),
            _ if readiness.error => {
                tracing::warn!(slot, "Invalid descriptor");
                conn.close(Status::Gone, registry, &mut self.services)
            }
            _ => conn.close(Status::NotImplemented, registry, &mut self.services),
        }
    }

    fn sweep_idle(&mut self, now: Instant) {
        let registry = self.poll.registry();
        let timeout = self.idle_timeout;
        for conn in self.slots.iter_mut().skip(1) {
            if conn.is_idle(now, timeout) {
                tracing::warn!(peer = ?conn.peer(), "Killing idle connection");
                conn.close(Status::Timeout, registry, &mut self.services);
            }
        }
    }

    fn shutdown(&mut self) {
        tracing::info!(active = self.services.stats.active, "Shutting down");
        let registry = self.poll.registry();
        for conn in self.slots.iter_mut().filter(|c| !c.is_free()) {
            conn.close(Status::ServerError, registry, &mut self.services);
        }
        self.services.hitlog.close();
    }
}
