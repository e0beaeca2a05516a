//! Memory-mapped content cache.
//!
//! A fixed pool of read-only shared mappings keyed by file identity (device,
//! inode, size and modification time), so hard links share a mapping and a
//! rewritten file is never served stale. Connections borrow mappings through
//! a [`Lease`] and hand them back with [`MmapCache::release`]. Unreferenced
//! entries stay mapped until a later miss evicts the least recently used one.

use memmap2::{Mmap, MmapOptions};
use std::fs::{File, Metadata};
use std::io;
use std::os::unix::fs::MetadataExt;

/// What a mapping is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileIdentity {
    pub dev: u64,
    pub ino: u64,
    /// Timestamps are coarse; the size catches rewrites within one tick.
    pub size: u64,
    pub mtime: i64,
    pub mtime_nsec: i64,
}

impl FileIdentity {
    pub fn of(meta: &Metadata) -> Self {
        Self {
            dev: meta.dev(),
            ino: meta.ino(),
            size: meta.size(),
            mtime: meta.mtime(),
            mtime_nsec: meta.mtime_nsec(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("fstat failed: {0}")]
    Stat(#[source] io::Error),
    #[error("all {0} cache entries are in use")]
    Exhausted(usize),
    #[error("mmap failed: {0}")]
    Map(#[source] io::Error),
    #[error("zero-length files are not mapped")]
    Empty,
    #[error("released a region the cache does not hold")]
    UnknownLease,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct Mapping {
    identity: FileIdentity,
    map: Mmap,
    generation: u64,
}

struct CacheEntry {
    mapping: Option<Mapping>,
    in_use: u32,
    last_access: u64,
}

/// A borrowed reference to a cached mapping.
///
/// Must be given back through [`MmapCache::release`]; dropping it otherwise
/// leaks an in-use count and is reported.
#[must_use = "a lease has to be released back to the cache"]
#[derive(Debug)]
pub struct Lease {
    index: usize,
    generation: u64,
    len: usize,
    armed: bool,
}

impl Lease {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if self.armed && !std::thread::panicking() {
            tracing::error!(entry = self.index, "Cache lease dropped without release");
            debug_assert!(false, "cache lease dropped without release");
        }
    }
}

pub struct MmapCache {
    entries: Vec<CacheEntry>,
    clock: u64,
    next_generation: u64,
    stats: CacheStats,
}

impl MmapCache {
    pub fn new(capacity: usize) -> Self {
        // Initial ticks put the empty entries in pool order for the LRU scan.
        let entries = (0..capacity)
            .map(|i| CacheEntry {
                mapping: None,
                in_use: 0,
                last_access: i as u64,
            })
            .collect();

        Self {
            entries,
            clock: capacity as u64,
            next_generation: 1,
            stats: CacheStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Returns a lease on a mapping of `file`, reusing an existing one when
    /// the identity matches.
    pub fn acquire(&mut self, file: &File, len: usize) -> Result<Lease, CacheError> {
        if len == 0 {
            return Err(CacheError::Empty);
        }

        let meta = file.metadata().map_err(CacheError::Stat)?;
        let identity = FileIdentity::of(&meta);

        let hit = self.entries.iter().enumerate().find_map(|(i, e)| {
            e.mapping
                .as_ref()
                .filter(|m| m.identity == identity)
                .map(|m| (i, m.generation, m.map.len()))
        });

        if let Some((i, generation, mapped_len)) = hit {
            let now = self.tick();
            self.stats.hits += 1;
            let entry = &mut self.entries[i];
            entry.in_use += 1;
            entry.last_access = now;
            tracing::trace!(entry = i, ino = identity.ino, in_use = entry.in_use, "Cache hit");
            return Ok(Lease {
                index: i,
                generation,
                len: mapped_len,
                armed: true,
            });
        }

        let victim = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.in_use == 0)
            .min_by_key(|(_, e)| e.last_access)
            .map(|(i, _)| i)
            .ok_or(CacheError::Exhausted(self.entries.len()))?;

        if let Some(old) = self.entries[victim].mapping.take() {
            self.stats.evictions += 1;
            tracing::trace!(entry = victim, ino = old.identity.ino, "Evicting mapping");
        }

        // SAFETY: the mapping is read-only and shared. Content changes under
        // it are detected by the mtime in the identity on the next acquire.
        let map = unsafe { MmapOptions::new().len(len).map(file) }.map_err(CacheError::Map)?;

        let generation = self.next_generation;
        self.next_generation += 1;
        let now = self.tick();
        let entry = &mut self.entries[victim];
        entry.mapping = Some(Mapping {
            identity,
            map,
            generation,
        });
        entry.in_use = 1;
        entry.last_access = now;
        self.stats.misses += 1;
        tracing::trace!(entry = victim, ino = identity.ino, len, "Cache miss, mapped");

        Ok(Lease {
            index: victim,
            generation,
            len,
            armed: true,
        })
    }

    fn mapping_for(&self, lease: &Lease) -> Option<(&CacheEntry, &Mapping)> {
        let entry = self.entries.get(lease.index)?;
        let mapping = entry.mapping.as_ref()?;
        (mapping.generation == lease.generation).then_some((entry, mapping))
    }

    /// The mapped bytes behind a lease.
    pub fn bytes(&self, lease: &Lease) -> Option<&[u8]> {
        self.mapping_for(lease)
            .map(|(_, mapping)| &mapping.map[..lease.len.min(mapping.map.len())])
    }

    pub fn release(&mut self, mut lease: Lease) -> Result<(), CacheError> {
        lease.armed = false;
        let entry = self
            .entries
            .get_mut(lease.index)
            .filter(|e| e.mapping.as_ref().is_some_and(|m| m.generation == lease.generation))
            .ok_or(CacheError::UnknownLease)?;

        if entry.in_use == 0 {
            return Err(CacheError::UnknownLease);
        }
        entry.in_use -= 1;
        Ok(())
    }

    /// Current in-use count of the entry a lease points at.
    pub fn in_use(&self, lease: &Lease) -> u32 {
        self.mapping_for(lease).map(|(entry, _)| entry.in_use).unwrap_or(0)
    }

    pub fn is_resident(&self, identity: &FileIdentity) -> bool {
        self.entries
            .iter()
            .filter_map(|e| e.mapping.as_ref())
            .any(|m| m.identity == *identity)
    }

    pub fn mapped_entries(&self) -> usize {
        self.entries.iter().filter(|e| e.mapping.is_some()).count()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}
