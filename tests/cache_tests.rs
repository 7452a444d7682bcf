use fileserv::cache::{FileCache, Vfs};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// In-memory filesystem that counts full-content reads, so tests can
/// observe whether the cache went to "disk".
#[derive(Clone, Default)]
struct MemFs {
    inner: Arc<MemFsInner>,
}

#[derive(Default)]
struct MemFsInner {
    files: Mutex<HashMap<PathBuf, (SystemTime, Vec<u8>)>>,
    reads: AtomicUsize,
}

impl MemFs {
    fn put(&self, path: &str, mtime_secs: u64, content: &[u8]) {
        self.inner.files.lock().insert(
            PathBuf::from(path),
            (UNIX_EPOCH + Duration::from_secs(mtime_secs), content.to_vec()),
        );
    }

    fn remove(&self, path: &str) {
        self.inner.files.lock().remove(Path::new(path));
    }

    fn reads(&self) -> usize {
        self.inner.reads.load(Ordering::SeqCst)
    }
}

impl Vfs for MemFs {
    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        self.inner
            .files
            .lock()
            .get(path)
            .map(|(mtime, _)| *mtime)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.inner.reads.fetch_add(1, Ordering::SeqCst);
        self.inner
            .files
            .lock()
            .get(path)
            .map(|(_, content)| content.clone())
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }
}

fn cache_with_fs(capacity: usize) -> (FileCache, MemFs) {
    let fs = MemFs::default();
    let cache = FileCache::with_fs(capacity, Box::new(fs.clone()));
    (cache, fs)
}

#[test]
fn hit_returns_identical_bytes_without_second_read() {
    let (cache, fs) = cache_with_fs(1024);
    fs.put("/a.html", 100, b"<h1>hi</h1>");

    let first = cache.get(Path::new("/a.html")).unwrap();
    let second = cache.get(Path::new("/a.html")).unwrap();
    assert_eq!(first, second);
    assert_eq!(fs.reads(), 1);
}

#[test]
fn newer_mtime_forces_refresh() {
    let (cache, fs) = cache_with_fs(1024);
    fs.put("/a.html", 100, b"old");
    assert_eq!(cache.get(Path::new("/a.html")).unwrap(), b"old");

    fs.put("/a.html", 200, b"new");
    assert_eq!(cache.get(Path::new("/a.html")).unwrap(), b"new");
    assert_eq!(fs.reads(), 2);
}

#[test]
fn older_mtime_is_still_fresh() {
    // Stale iff on-disk mtime is strictly newer than the cached one.
    let (cache, fs) = cache_with_fs(1024);
    fs.put("/a.html", 100, b"cached");
    assert_eq!(cache.get(Path::new("/a.html")).unwrap(), b"cached");

    fs.put("/a.html", 50, b"rolled back");
    assert_eq!(cache.get(Path::new("/a.html")).unwrap(), b"cached");
    assert_eq!(fs.reads(), 1);
}

#[test]
fn missing_file_is_a_miss_not_a_crash() {
    let (cache, _fs) = cache_with_fs(1024);
    assert!(cache.get(Path::new("/nope")).is_none());
}

#[test]
fn file_vanishing_after_caching_is_a_miss() {
    let (cache, fs) = cache_with_fs(1024);
    fs.put("/a", 100, b"data");
    assert!(cache.get(Path::new("/a")).is_some());
    fs.remove("/a");
    assert!(cache.get(Path::new("/a")).is_none());
}

#[test]
fn eviction_keeps_total_within_capacity() {
    let (cache, fs) = cache_with_fs(10);
    fs.put("/a", 1, b"aaaa");
    fs.put("/b", 1, b"bbbb");
    fs.put("/c", 1, b"cccc");

    for path in ["/a", "/b", "/c"] {
        assert!(cache.get(Path::new(path)).is_some());
        assert!(cache.size() <= 10, "size {} over capacity", cache.size());
    }
}

#[test]
fn least_recently_used_entry_is_evicted_first() {
    let (cache, fs) = cache_with_fs(8);
    fs.put("/a", 1, b"aaaa");
    fs.put("/b", 1, b"bbbb");
    fs.put("/c", 1, b"cccc");

    cache.get(Path::new("/a")).unwrap();
    cache.get(Path::new("/b")).unwrap();
    // Touch /a so /b becomes the LRU entry, then overflow with /c.
    cache.get(Path::new("/a")).unwrap();
    cache.get(Path::new("/c")).unwrap();

    let reads_before = fs.reads();
    cache.get(Path::new("/a")).unwrap(); // still cached
    assert_eq!(fs.reads(), reads_before);
    cache.get(Path::new("/b")).unwrap(); // was evicted, needs a re-read
    assert_eq!(fs.reads(), reads_before + 1);
}

#[test]
fn refresh_replaces_rather_than_duplicates() {
    let (cache, fs) = cache_with_fs(1024);
    fs.put("/a", 100, b"version one");
    cache.get(Path::new("/a")).unwrap();
    fs.put("/a", 200, b"v2");
    cache.get(Path::new("/a")).unwrap();
    assert_eq!(cache.size(), 2);
}

#[test]
fn concurrent_hits_do_not_block_each_other() {
    let (cache, fs) = cache_with_fs(1024);
    fs.put("/a", 100, b"shared");
    cache.get(Path::new("/a")).unwrap();

    let cache = Arc::new(cache);
    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = Arc::clone(&cache);
        handles.push(std::thread::spawn(move || {
            for _ in 0..100 {
                assert_eq!(cache.get(Path::new("/a")).unwrap(), b"shared");
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(fs.reads(), 1);
}
