//! Bounded-concurrency task runner
//!
//! `submit` admits a task only while fewer than `max` tasks from this runner
//! are in flight, blocking the caller until a slot frees. Admitted tasks run
//! on a rayon thread pool, which may be shared with other runners. A slot is
//! released by a drop guard, so a panicking task still frees it.
//!
//! Tasks must not submit to, or wait on, the runner that is executing them.

use crate::error::{ConfigError, ThumbnailError};
use parking_lot::{Condvar, Mutex};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::any::Any;
use std::sync::Arc;
use tracing::error;

/// Build a named worker pool whose panicking tasks are logged instead of
/// aborting the process
pub fn worker_pool(threads: usize, name: &'static str) -> Result<Arc<ThreadPool>, ThumbnailError> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(move |i| format!("{}-{}", name, i))
        .panic_handler(move |payload| {
            error!(pool = name, panic = panic_message(payload.as_ref()), "Worker task panicked");
        })
        .build()?;
    Ok(Arc::new(pool))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

struct Gate {
    in_flight: Mutex<usize>,
    changed: Condvar,
}

impl Gate {
    fn acquire(&self, max: usize) {
        let mut in_flight = self.in_flight.lock();
        while *in_flight >= max {
            self.changed.wait(&mut in_flight);
        }
        *in_flight += 1;
    }

    fn wait_idle(&self) {
        let mut in_flight = self.in_flight.lock();
        while *in_flight > 0 {
            self.changed.wait(&mut in_flight);
        }
    }
}

/// Held by a running task; releases its slot when dropped
struct Slot(Arc<Gate>);

impl Drop for Slot {
    fn drop(&mut self) {
        let mut in_flight = self.0.in_flight.lock();
        *in_flight -= 1;
        self.0.changed.notify_all();
    }
}

/// Runs submitted closures with at most `max` of them in flight at once
pub struct BoundedTaskRunner {
    pool: Arc<ThreadPool>,
    gate: Arc<Gate>,
    max: usize,
}

impl BoundedTaskRunner {
    /// Create a runner with its own pool of `max` threads
    pub fn new(max: usize) -> Result<Self, ThumbnailError> {
        let max = check_max(max)?;
        Self::with_pool(max, worker_pool(max, "parax-task")?)
    }

    /// Create a runner that executes on an existing pool
    pub fn with_pool(max: usize, pool: Arc<ThreadPool>) -> Result<Self, ThumbnailError> {
        Ok(Self {
            pool,
            gate: Arc::new(Gate {
                in_flight: Mutex::new(0),
                changed: Condvar::new(),
            }),
            max: check_max(max)?,
        })
    }

    /// Schedule `task`, waiting first for a free slot if `max` tasks are
    /// already in flight. Returns without waiting for `task` itself.
    pub fn submit<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.gate.acquire(self.max);
        let slot = Slot(Arc::clone(&self.gate));
        self.pool.spawn(move || {
            let _slot = slot;
            task();
        });
    }

    /// Block until every submitted task has finished, successfully or not
    pub fn wait_all(&self) {
        self.gate.wait_idle();
    }

    /// Tasks admitted and not yet finished
    pub fn in_flight(&self) -> usize {
        *self.gate.in_flight.lock()
    }

    pub fn max(&self) -> usize {
        self.max
    }
}

impl Drop for BoundedTaskRunner {
    fn drop(&mut self) {
        self.wait_all();
    }
}

fn check_max(max: usize) -> Result<usize, ConfigError> {
    if max == 0 {
        return Err(ConfigError::NotPositive {
            field: "max_in_flight",
            value: 0,
        });
    }
    Ok(max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    /// Tracks how many tasks run at once and the highest value seen
    #[derive(Default)]
    struct Concurrency {
        running: AtomicUsize,
        peak: AtomicUsize,
        finished: AtomicUsize,
    }

    impl Concurrency {
        fn work(&self, pause: Duration) {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(pause);
            self.running.fetch_sub(1, Ordering::SeqCst);
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_zero_max_is_rejected() {
        assert!(BoundedTaskRunner::new(0).is_err());
        let pool = worker_pool(2, "test").unwrap();
        assert!(BoundedTaskRunner::with_pool(0, pool).is_err());
    }

    #[test]
    fn test_never_exceeds_max() {
        let runner = BoundedTaskRunner::new(4).unwrap();
        let stats = Arc::new(Concurrency::default());

        for _ in 0..64 {
            let stats = Arc::clone(&stats);
            runner.submit(move || stats.work(Duration::from_millis(2)));
            assert!(runner.in_flight() <= 4);
        }
        runner.wait_all();

        assert_eq!(stats.finished.load(Ordering::SeqCst), 64);
        assert!(stats.peak.load(Ordering::SeqCst) <= 4);
        assert!(stats.peak.load(Ordering::SeqCst) >= 2);
        assert_eq!(runner.in_flight(), 0);
    }

    #[test]
    fn test_cap_holds_on_larger_shared_pool() {
        let pool = worker_pool(8, "shared").unwrap();
        let first = BoundedTaskRunner::with_pool(3, Arc::clone(&pool)).unwrap();
        let second = BoundedTaskRunner::with_pool(2, pool).unwrap();
        let first_stats = Arc::new(Concurrency::default());
        let second_stats = Arc::new(Concurrency::default());

        for _ in 0..30 {
            let stats = Arc::clone(&first_stats);
            first.submit(move || stats.work(Duration::from_millis(1)));
            let stats = Arc::clone(&second_stats);
            second.submit(move || stats.work(Duration::from_millis(1)));
        }
        first.wait_all();
        second.wait_all();

        assert!(first_stats.peak.load(Ordering::SeqCst) <= 3);
        assert!(second_stats.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(first_stats.finished.load(Ordering::SeqCst), 30);
        assert_eq!(second_stats.finished.load(Ordering::SeqCst), 30);
    }

    #[test]
    fn test_submit_waits_for_a_free_slot() {
        let runner = Arc::new(BoundedTaskRunner::new(2).unwrap());
        let release = Arc::new(AtomicBool::new(false));

        for _ in 0..2 {
            let release = Arc::clone(&release);
            runner.submit(move || {
                while !release.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(1));
                }
            });
        }

        let admitted = Arc::new(AtomicBool::new(false));
        let submitter = {
            let runner = Arc::clone(&runner);
            let admitted = Arc::clone(&admitted);
            thread::spawn(move || {
                runner.submit(|| {});
                admitted.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!admitted.load(Ordering::SeqCst));
        assert_eq!(runner.in_flight(), 2);

        release.store(true, Ordering::SeqCst);
        submitter.join().unwrap();
        assert!(admitted.load(Ordering::SeqCst));
        runner.wait_all();
        assert_eq!(runner.in_flight(), 0);
    }

    #[test]
    fn test_panicking_task_does_not_block_wait_all() {
        let runner = BoundedTaskRunner::new(2).unwrap();
        let finished = Arc::new(AtomicUsize::new(0));

        runner.submit(|| panic!("decoder exploded"));
        for _ in 0..10 {
            let finished = Arc::clone(&finished);
            runner.submit(move || {
                finished.fetch_add(1, Ordering::SeqCst);
            });
        }
        runner.wait_all();

        assert_eq!(finished.load(Ordering::SeqCst), 10);
        assert_eq!(runner.in_flight(), 0);
    }

    #[test]
    fn test_wait_all_without_tasks_returns() {
        let runner = BoundedTaskRunner::new(1).unwrap();
        runner.wait_all();
        assert_eq!(runner.max(), 1);
    }
}
