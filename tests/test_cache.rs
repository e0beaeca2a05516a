use burrow::cache::{CacheError, FileIdentity, MmapCache};
use std::fs::{self, File};
use std::path::Path;
use std::time::{Duration, SystemTime};

fn write(dir: &Path, name: &str, contents: &[u8]) -> File {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    File::open(path).unwrap()
}

#[test]
fn test_round_trip_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "a.txt", b"hello gopher\n");
    let mut cache = MmapCache::new(4);

    let lease = cache.acquire(&file, 13).unwrap();
    assert_eq!(lease.len(), 13);
    assert_eq!(cache.bytes(&lease), Some(&b"hello gopher\n"[..]));
    assert_eq!(cache.in_use(&lease), 1);
    cache.release(lease).unwrap();
}

#[test]
fn test_second_acquire_is_a_hit() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = MmapCache::new(4);
    let first = write(dir.path(), "a.txt", b"shared");
    let second = File::open(dir.path().join("a.txt")).unwrap();

    let a = cache.acquire(&first, 6).unwrap();
    let b = cache.acquire(&second, 6).unwrap();
    assert_eq!(cache.in_use(&a), 2);
    assert_eq!(cache.mapped_entries(), 1);

    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses), (1, 1));

    cache.release(a).unwrap();
    cache.release(b).unwrap();
    // Released entries stay mapped for the next request.
    assert_eq!(cache.mapped_entries(), 1);
}

#[test]
fn test_hard_links_share_a_mapping() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = MmapCache::new(4);
    let original = write(dir.path(), "a.txt", b"linked");
    fs::hard_link(dir.path().join("a.txt"), dir.path().join("b.txt")).unwrap();
    let link = File::open(dir.path().join("b.txt")).unwrap();

    let a = cache.acquire(&original, 6).unwrap();
    let b = cache.acquire(&link, 6).unwrap();
    assert_eq!(cache.mapped_entries(), 1);
    cache.release(a).unwrap();
    cache.release(b).unwrap();
}

#[test]
fn test_modified_file_is_remapped() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = MmapCache::new(4);
    let path = dir.path().join("doc.txt");

    let file = write(dir.path(), "doc.txt", b"old text");
    let old_identity = FileIdentity::of(&file.metadata().unwrap());
    let lease = cache.acquire(&file, 8).unwrap();
    cache.release(lease).unwrap();
    drop(file);

    fs::write(&path, b"new text").unwrap();
    let later = SystemTime::now() + Duration::from_secs(5);
    File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(later)
        .unwrap();

    let file = File::open(&path).unwrap();
    let lease = cache.acquire(&file, 8).unwrap();
    assert_eq!(cache.bytes(&lease), Some(&b"new text"[..]));
    assert_eq!(cache.stats().misses, 2);
    assert!(cache.is_resident(&FileIdentity::of(&file.metadata().unwrap())));
    assert_ne!(old_identity, FileIdentity::of(&file.metadata().unwrap()));
    cache.release(lease).unwrap();
}

#[test]
fn test_least_recently_used_is_evicted() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = MmapCache::new(2);
    let a = write(dir.path(), "a", b"a");
    let b = write(dir.path(), "b", b"b");
    let c = write(dir.path(), "c", b"c");
    let id = |f: &File| FileIdentity::of(&f.metadata().unwrap());

    let la = cache.acquire(&a, 1).unwrap();
    cache.release(la).unwrap();
    let lb = cache.acquire(&b, 1).unwrap();
    cache.release(lb).unwrap();

    // Touch `a` so that `b` becomes the oldest.
    let la = cache.acquire(&a, 1).unwrap();
    cache.release(la).unwrap();

    let lc = cache.acquire(&c, 1).unwrap();
    cache.release(lc).unwrap();

    assert!(cache.is_resident(&id(&a)));
    assert!(!cache.is_resident(&id(&b)));
    assert!(cache.is_resident(&id(&c)));
    assert_eq!(cache.stats().evictions, 1);
}

#[test]
fn test_entries_in_use_are_never_evicted() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = MmapCache::new(2);
    let a = write(dir.path(), "a", b"a");
    let b = write(dir.path(), "b", b"b");
    let c = write(dir.path(), "c", b"c");

    let la = cache.acquire(&a, 1).unwrap();
    let lb = cache.acquire(&b, 1).unwrap();

    assert!(matches!(cache.acquire(&c, 1), Err(CacheError::Exhausted(2))));
    assert_eq!(cache.bytes(&la), Some(&b"a"[..]));

    cache.release(lb).unwrap();
    let lc = cache.acquire(&c, 1).unwrap();
    assert_eq!(cache.bytes(&lc), Some(&b"c"[..]));
    assert_eq!(cache.bytes(&la), Some(&b"a"[..]));

    cache.release(la).unwrap();
    cache.release(lc).unwrap();
}

#[test]
fn test_zero_length_is_not_mapped() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = MmapCache::new(2);
    let empty = write(dir.path(), "empty", b"");
    assert!(matches!(cache.acquire(&empty, 0), Err(CacheError::Empty)));
    assert_eq!(cache.capacity(), 2);
    assert_eq!(cache.mapped_entries(), 0);
}
