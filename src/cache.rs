use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// The two filesystem operations the cache relies on. Kept as a trait so
/// tests can substitute an in-memory filesystem and count disk reads.
pub trait Vfs: Send + Sync {
    fn modified(&self, path: &Path) -> io::Result<SystemTime>;
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// The real disk.
pub struct DiskFs;

impl Vfs for DiskFs {
    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        fs::metadata(path)?.modified()
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }
}

struct CacheEntry {
    mtime: SystemTime,
    content: Vec<u8>,
}

struct Node {
    path: PathBuf,
    size: usize,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Recency list as a slab-backed doubly linked list: O(1) splice-to-front
/// and tail eviction without allocation churn.
struct LruState {
    nodes: Vec<Node>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    index: HashMap<PathBuf, usize>,
    total: usize,
}

impl LruState {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            index: HashMap::new(),
            total: 0,
        }
    }

    fn unlink(&mut self, i: usize) {
        let (prev, next) = (self.nodes[i].prev, self.nodes[i].next);
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
        self.nodes[i].prev = None;
        self.nodes[i].next = None;
    }

    fn link_front(&mut self, i: usize) {
        self.nodes[i].prev = None;
        self.nodes[i].next = self.head;
        if let Some(h) = self.head {
            self.nodes[h].prev = Some(i);
        }
        self.head = Some(i);
        if self.tail.is_none() {
            self.tail = Some(i);
        }
    }

    fn push_front(&mut self, path: PathBuf, size: usize) {
        let node = Node {
            path: path.clone(),
            size,
            prev: None,
            next: None,
        };
        let i = match self.free.pop() {
            Some(i) => {
                self.nodes[i] = node;
                i
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };
        self.index.insert(path, i);
        self.link_front(i);
        self.total += size;
    }

    /// Splice an entry to the front if it is not already there.
    fn touch(&mut self, path: &Path) {
        let Some(&i) = self.index.get(path) else {
            return;
        };
        if self.head == Some(i) {
            return;
        }
        self.unlink(i);
        self.link_front(i);
    }

    fn remove(&mut self, path: &Path) -> Option<usize> {
        let i = self.index.remove(path)?;
        self.unlink(i);
        let size = self.nodes[i].size;
        self.free.push(i);
        self.total -= size;
        Some(size)
    }

    fn pop_back(&mut self) -> Option<PathBuf> {
        let i = self.tail?;
        let path = self.nodes[i].path.clone();
        self.index.remove(&path);
        self.unlink(i);
        self.total -= self.nodes[i].size;
        self.free.push(i);
        Some(path)
    }
}

/// Capacity-bounded (bytes) LRU cache of file contents keyed by path.
///
/// Two-lock discipline: the read/write lock guards the path→entry map;
/// a small dedicated mutex guards the recency list and size counter, so
/// concurrent cache hits never contend on the read/write lock.
///
/// Staleness rule: an entry is stale iff the file's on-disk modification
/// time is strictly newer than the mtime recorded when it was cached.
///
/// Concurrent misses on the same path may each read the file; the read
/// is idempotent and the final state converges, so no per-key in-flight
/// marker is kept.
pub struct FileCache {
    map: RwLock<HashMap<PathBuf, CacheEntry>>,
    lru: Mutex<LruState>,
    capacity: usize,
    fs: Box<dyn Vfs>,
}

impl FileCache {
    /// Cache backed by the real disk.
    pub fn new(capacity: usize) -> Self {
        Self::with_fs(capacity, Box::new(DiskFs))
    }

    /// Cache backed by an arbitrary filesystem implementation.
    pub fn with_fs(capacity: usize, fs: Box<dyn Vfs>) -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
            lru: Mutex::new(LruState::new()),
            capacity,
            fs,
        }
    }

    /// Total bytes currently cached.
    pub fn size(&self) -> usize {
        self.lru.lock().total
    }

    /// Fetch a file's content, from cache if fresh, from disk otherwise.
    /// Returns `None` when the file cannot be read (a miss, never a
    /// crash); content comes back by value so entries stay immutable.
    pub fn get(&self, path: &Path) -> Option<Vec<u8>> {
        {
            let map = self.map.read();
            if let Some(entry) = map.get(path) {
                let fresh = match self.fs.modified(path) {
                    Ok(disk_mtime) => disk_mtime <= entry.mtime,
                    Err(_) => false,
                };
                if fresh {
                    let mut lru = self.lru.lock();
                    lru.touch(path);
                    let content = entry.content.clone();
                    drop(lru);
                    return Some(content);
                }
            }
        }

        // Miss or stale: re-read under the exclusive lock. Different
        // paths serialize here; a throughput limit, not a correctness one.
        let mut map = self.map.write();
        let mtime = self.fs.modified(path).ok()?;
        let content = self.fs.read(path).ok()?;
        let size = content.len();

        let mut lru = self.lru.lock();
        let replaced = map.insert(
            path.to_path_buf(),
            CacheEntry {
                mtime,
                content: content.clone(),
            },
        );
        if replaced.is_some() {
            lru.remove(path);
        }
        lru.push_front(path.to_path_buf(), size);

        while lru.total > self.capacity {
            let Some(victim) = lru.pop_back() else {
                break;
            };
            map.remove(&victim);
        }

        Some(content)
    }
}
