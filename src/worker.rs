use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::os::unix::io::RawFd;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;

/// The work a pool runs for each queued connection handle.
pub type Task = Arc<dyn Fn(RawFd) + Send + Sync + 'static>;

struct Shared {
    queue: Mutex<VecDeque<RawFd>>,
    cond: Condvar,
    running: AtomicBool,
    task: OnceLock<Task>,
}

/// Fixed-size pool of worker threads consuming a FIFO queue of
/// connection descriptors. One configurable task runs per descriptor;
/// a panicking task is caught at the worker boundary and never takes
/// the thread down with it.
pub struct WorkerPool {
    shared: Arc<Shared>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(worker_count: usize) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
            running: AtomicBool::new(true),
            task: OnceLock::new(),
        });

        let mut threads = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let shared = Arc::clone(&shared);
            threads.push(
                std::thread::Builder::new()
                    .name(format!("worker-{}", id))
                    .spawn(move || worker_loop(shared))
                    .expect("failed to spawn worker thread"),
            );
        }

        Self {
            shared,
            threads: Mutex::new(threads),
        }
    }

    /// Install the per-descriptor task. Settable once, before the first
    /// `push`; returns false if a task was already installed.
    pub fn set_task<F>(&self, task: F) -> bool
    where
        F: Fn(RawFd) + Send + Sync + 'static,
    {
        self.shared.task.set(Arc::new(task)).is_ok()
    }

    /// Enqueue a descriptor for the next free worker. FIFO order.
    pub fn push(&self, fd: RawFd) {
        let mut queue = self.shared.queue.lock();
        queue.push_back(fd);
        self.shared.cond.notify_one();
    }

    /// Thread-safe snapshot of the running flag.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Stop accepting work, wake every waiting worker, and join all
    /// threads. Idempotent.
    pub fn shutdown(&self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }
        {
            let _queue = self.shared.queue.lock();
            self.shared.cond.notify_all();
        }
        for handle in self.threads.lock().drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let fd = {
            let mut queue = shared.queue.lock();
            while shared.running.load(Ordering::Acquire) && queue.is_empty() {
                shared.cond.wait(&mut queue);
            }
            // Drain what is left after shutdown, then exit.
            match queue.pop_front() {
                Some(fd) => fd,
                None => return,
            }
        };

        // Task runs with no lock held.
        match shared.task.get() {
            Some(task) => {
                let task = Arc::clone(task);
                if panic::catch_unwind(AssertUnwindSafe(|| task(fd))).is_err() {
                    log::error!("worker task panicked handling fd {}", fd);
                }
            }
            None => log::warn!("worker pool has no task installed; dropping fd {}", fd),
        }
    }
}
