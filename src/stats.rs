use crate::cache::CacheStats;

/// Counters served by the `STATS` request.
#[derive(Debug, Default, Clone)]
pub struct ServerStats {
    /// Connections accepted since start.
    pub requests: u64,
    /// Highest slot index ever used.
    pub max_parallel: usize,
    /// Longest request line seen.
    pub max_length: usize,
    /// Connections currently open.
    pub active: usize,
}

impl ServerStats {
    pub fn record_accept(&mut self, slot: usize) {
        self.requests += 1;
        self.active += 1;
        self.max_parallel = self.max_parallel.max(slot);
    }

    pub fn record_close(&mut self) {
        debug_assert!(self.active > 0, "closing with no active connections");
        self.active = self.active.saturating_sub(1);
    }

    pub fn record_line(&mut self, len: usize) {
        self.max_length = self.max_length.max(len);
    }

    /// The counters block. The connection asking is not counted as open.
    pub fn render(&self, cache: &CacheStats) -> String {
        format!(
            "Burrow {}\r\n\
             Requests:     {:>10}\r\n\
             Max parallel: {:>10}\r\n\
             Max length:   {:>10}\r\n\
             Connections:  {:>10}\r\n\
             Cache hits:   {:>10}\r\n\
             Cache misses: {:>10}\r\n",
            env!("CARGO_PKG_VERSION"),
            self.requests,
            self.max_parallel,
            self.max_length,
            self.active.saturating_sub(1),
            cache.hits,
            cache.misses,
        )
    }
}
