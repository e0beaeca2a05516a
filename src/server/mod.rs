//! Process plumbing: the listening socket, the readiness loop, startup and signals.

pub mod bootstrap;
pub mod dispatcher;
pub mod listener;
pub mod signals;

use crate::cache::MmapCache;
use crate::config::Config;
use crate::gopher::resolver::Resolver;
use crate::hitlog::HitLog;
use crate::http::gateway::Gateway;
use crate::stats::ServerStats;

/// Everything a connection needs besides its own slot.
pub struct Services {
    pub cache: MmapCache,
    pub resolver: Resolver,
    pub hitlog: HitLog,
    pub stats: ServerStats,
    pub gateway: Gateway,
    /// Request buffer capacity.
    pub max_line: usize,
}

impl Services {
    pub fn new(cfg: &Config, resolver: Resolver, hitlog: HitLog) -> Self {
        Self {
            cache: MmapCache::new(cfg.cache_entries),
            resolver,
            hitlog,
            stats: ServerStats::default(),
            gateway: Gateway::new(cfg),
            max_line: cfg.max_line,
        }
    }
}
