use parking_lot::Mutex;
use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Runs once for every descriptor the wheel evicts.
pub type ExpiryAction = Box<dyn Fn(RawFd) + Send + Sync + 'static>;

struct Wheel {
    index: usize,
    buckets: Vec<Vec<RawFd>>,
    // fd -> (bucket, position within bucket)
    slots: HashMap<RawFd, (usize, usize)>,
}

impl Wheel {
    fn insert(&mut self, fd: RawFd) -> bool {
        if self.slots.contains_key(&fd) {
            return false;
        }
        // One bucket before the rotation pointer: a full lap, so the fd
        // gets the whole keep-alive window before expiry.
        let bucket = if self.index == 0 {
            self.buckets.len() - 1
        } else {
            self.index - 1
        };
        self.slots.insert(fd, (bucket, self.buckets[bucket].len()));
        self.buckets[bucket].push(fd);
        true
    }

    fn remove(&mut self, fd: RawFd) -> bool {
        let Some((bucket, pos)) = self.slots.remove(&fd) else {
            return false;
        };
        let slot = &mut self.buckets[bucket];
        slot.swap_remove(pos);
        if pos < slot.len() {
            // Fix up the element swapped into the vacated position.
            self.slots.insert(slot[pos], (bucket, pos));
        }
        true
    }
}

/// Circular array of one-second expiry buckets evicting idle
/// connections. A descriptor occupies at most one slot; a dedicated
/// ticking thread advances the wheel once per second and runs the
/// expiry action on everything left in the bucket it departs.
pub struct TimerWheel {
    wheel: Mutex<Wheel>,
    expire: ExpiryAction,
    running: Arc<AtomicBool>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl TimerWheel {
    /// `seconds` is the keep-alive budget and the bucket count.
    pub fn new(seconds: usize, expire: ExpiryAction) -> Arc<Self> {
        let size = seconds.max(1);
        Arc::new(Self {
            wheel: Mutex::new(Wheel {
                index: 0,
                buckets: vec![Vec::new(); size],
                slots: HashMap::new(),
            }),
            expire,
            running: Arc::new(AtomicBool::new(false)),
            ticker: Mutex::new(None),
        })
    }

    /// Start the ticking thread. No-op if already running.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let wheel = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("timer-wheel".to_string())
            .spawn(move || {
                while wheel.running.load(Ordering::Acquire) {
                    std::thread::sleep(Duration::from_secs(1));
                    wheel.tick();
                }
            })
            .expect("failed to spawn timer thread");
        *self.ticker.lock() = Some(handle);
    }

    /// Let the ticking thread observe the flag and exit, then join it.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.ticker.lock().take() {
            let _ = handle.join();
        }
    }

    /// Schedule `fd` for eviction one full lap from now. Returns false
    /// if it is already scheduled.
    pub fn timing(&self, fd: RawFd) -> bool {
        self.wheel.lock().insert(fd)
    }

    /// Unschedule `fd`. Returns false if it was not scheduled.
    pub fn cancel(&self, fd: RawFd) -> bool {
        self.wheel.lock().remove(fd)
    }

    /// Refresh `fd`'s deadline: cancel-then-timing under one lock.
    pub fn update(&self, fd: RawFd) -> bool {
        let mut wheel = self.wheel.lock();
        wheel.remove(fd);
        wheel.insert(fd)
    }

    /// Number of scheduled descriptors.
    pub fn len(&self) -> usize {
        self.wheel.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn tick(&self) {
        let expired = {
            let mut wheel = self.wheel.lock();
            let index = wheel.index;
            let expired = std::mem::take(&mut wheel.buckets[index]);
            wheel.index = (index + 1) % wheel.buckets.len();
            for fd in &expired {
                wheel.slots.remove(fd);
            }
            expired
        };
        // The action runs without the wheel lock so it may call back in.
        for fd in expired {
            log::debug!("idle timeout expired for fd {}", fd);
            (self.expire)(fd);
        }
    }
}

impl Drop for TimerWheel {
    fn drop(&mut self) {
        self.stop();
    }
}
