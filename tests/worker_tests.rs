use fileserv::worker::WorkerPool;
use parking_lot::Mutex;
use std::os::unix::io::RawFd;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    done()
}

#[test]
fn dispatch_order_is_fifo() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let pool = WorkerPool::new(1); // single worker makes order observable
    let seen_task = Arc::clone(&seen);
    assert!(pool.set_task(move |fd| seen_task.lock().push(fd)));

    for fd in [10, 20, 30, 40] {
        pool.push(fd);
    }
    assert!(wait_until(Duration::from_secs(2), || seen.lock().len() == 4));
    assert_eq!(*seen.lock(), vec![10, 20, 30, 40]);
    pool.shutdown();
}

#[test]
fn panicking_task_does_not_kill_the_worker() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let pool = WorkerPool::new(1);
    let seen_task = Arc::clone(&seen);
    pool.set_task(move |fd: RawFd| {
        if fd == 13 {
            panic!("boom");
        }
        seen_task.lock().push(fd);
    });

    pool.push(13);
    pool.push(7);
    assert!(wait_until(Duration::from_secs(2), || seen.lock().len() == 1));
    assert_eq!(*seen.lock(), vec![7]);
    pool.shutdown();
}

#[test]
fn task_is_settable_exactly_once() {
    let pool = WorkerPool::new(1);
    assert!(pool.set_task(|_| {}));
    assert!(!pool.set_task(|_| {}));
    pool.shutdown();
}

#[test]
fn shutdown_is_idempotent() {
    let pool = WorkerPool::new(2);
    pool.set_task(|_| {});
    assert!(pool.is_running());
    pool.shutdown();
    assert!(!pool.is_running());
    pool.shutdown(); // second call is a no-op
    assert!(!pool.is_running());
}

#[test]
fn queued_work_is_drained_before_exit() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let pool = WorkerPool::new(2);
    let seen_task = Arc::clone(&seen);
    pool.set_task(move |fd| {
        std::thread::sleep(Duration::from_millis(10));
        seen_task.lock().push(fd);
    });

    for fd in 0..8 {
        pool.push(fd);
    }
    pool.shutdown();
    assert_eq!(seen.lock().len(), 8);
}

#[test]
fn many_workers_process_everything() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let pool = WorkerPool::new(4);
    let seen_task = Arc::clone(&seen);
    pool.set_task(move |fd| seen_task.lock().push(fd));

    for fd in 0..100 {
        pool.push(fd);
    }
    assert!(wait_until(Duration::from_secs(5), || seen.lock().len() == 100));
    let mut got = seen.lock().clone();
    got.sort_unstable();
    assert_eq!(got, (0..100).collect::<Vec<RawFd>>());
    pool.shutdown();
}
