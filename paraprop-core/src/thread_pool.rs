//! Fixed-size, resizable worker pool.
//!
//! One mutex and condition variable guard a FIFO queue. Long-lived workers
//! pop one item at a time, bump the active counter around execution, and
//! report each item's outcome (value or panic) through its [`TaskHandle`]
//! instead of letting a panic escape the worker loop.

use std::{
    collections::VecDeque,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak,
        atomic::{AtomicUsize, Ordering},
        mpsc::{self, Receiver, TryRecvError},
    },
    thread::{self, JoinHandle},
};

use tracing::{debug, warn};

use crate::{
    adaptive::ThreadPoolInfo,
    error::{ParapropError, Result, panic_message},
};

type Job = Box<dyn FnOnce() + Send + 'static>;
type Outcome<T> = core::result::Result<T, String>;

struct Queue {
    jobs: VecDeque<Job>,
    stop: bool,
    target: usize,
    live: usize,
}

struct PoolInner {
    name: String,
    queue: Mutex<Queue>,
    available: Condvar,
    active: AtomicUsize,
    next_worker: AtomicUsize,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl PoolInner {
    fn lock_queue(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_workers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_worker(self: &Arc<Self>) -> Result<JoinHandle<()>> {
        let id = self.next_worker.fetch_add(1, Ordering::Relaxed);
        let thread_name = format!("{}-worker-{id}", self.name);
        let inner = Arc::clone(self);
        thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || worker_loop(&inner))
            .map_err(|error| ParapropError::spawn_failed(&thread_name, &error))
    }

    /// Spawns `count` workers whose slots were already reserved in `live`.
    fn spawn_reserved(self: &Arc<Self>, count: usize) -> Result<()> {
        for spawned in 0..count {
            match self.spawn_worker() {
                Ok(handle) => self.lock_workers().push(handle),
                Err(error) => {
                    self.lock_queue().live -= count - spawned;
                    return Err(error);
                }
            }
        }
        Ok(())
    }

    fn set_size(self: &Arc<Self>, size: usize) -> Result<()> {
        if size == 0 {
            return Err(ParapropError::invalid_config(
                "thread pool size must be greater than zero",
            ));
        }
        let to_spawn = {
            let mut queue = self.lock_queue();
            if queue.stop {
                return Err(ParapropError::PoolShutDown);
            }
            let previous = queue.target;
            queue.target = size;
            let to_spawn = size.saturating_sub(queue.live);
            queue.live += to_spawn;
            debug!(pool = %self.name, previous, size, "resizing thread pool");
            to_spawn
        };
        // Idle workers above the new target retire once woken.
        self.available.notify_all();
        self.reap_finished();
        self.spawn_reserved(to_spawn)
    }

    fn reap_finished(&self) {
        let finished: Vec<JoinHandle<()>> = {
            let mut workers = self.lock_workers();
            let (done, running): (Vec<_>, Vec<_>) =
                workers.drain(..).partition(JoinHandle::is_finished);
            *workers = running;
            done
        };
        for handle in finished {
            if handle.join().is_err() {
                warn!(pool = %self.name, "retired worker exited with a panic");
            }
        }
    }

    fn shutdown(&self) {
        self.lock_queue().stop = true;
        self.available.notify_all();

        let handles = std::mem::take(&mut *self.lock_workers());
        let current = thread::current().id();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                warn!(pool = %self.name, "worker exited with a panic");
            }
        }
    }
}

fn worker_loop(inner: &PoolInner) {
    loop {
        let job = {
            let mut queue = inner.lock_queue();
            loop {
                if queue.live > queue.target {
                    queue.live -= 1;
                    return;
                }
                if let Some(job) = queue.jobs.pop_front() {
                    inner.active.fetch_add(1, Ordering::SeqCst);
                    break job;
                }
                if queue.stop {
                    queue.live -= 1;
                    return;
                }
                queue = inner
                    .available
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };
        job();
        inner.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Handle resolving to the outcome of a unit of work submitted with
/// [`ThreadPool::enqueue`].
pub struct TaskHandle<T> {
    receiver: Receiver<Outcome<T>>,
}

impl<T> TaskHandle<T> {
    /// Blocks until the work item has run and returns its value.
    ///
    /// # Errors
    /// Returns [`ParapropError::TaskPanicked`] when the work panicked and
    /// [`ParapropError::TaskLost`] when the pool dropped the item without
    /// running it.
    pub fn join(self) -> Result<T> {
        match self.receiver.recv() {
            Ok(outcome) => outcome.map_err(|message| ParapropError::TaskPanicked { message }),
            Err(_) => Err(ParapropError::TaskLost),
        }
    }

    /// Returns the outcome if the work item has already finished.
    ///
    /// Yields `Some` at most once; later calls report [`ParapropError::TaskLost`].
    pub fn try_join(&mut self) -> Option<Result<T>> {
        match self.receiver.try_recv() {
            Ok(outcome) => {
                Some(outcome.map_err(|message| ParapropError::TaskPanicked { message }))
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(ParapropError::TaskLost)),
        }
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle").finish_non_exhaustive()
    }
}

/// Worker pool executing queued closures on long-lived OS threads.
///
/// # Examples
/// ```
/// use paraprop_core::ThreadPool;
///
/// let pool = ThreadPool::new(2).expect("pool must start");
/// let handle = pool.enqueue(|| 6 * 7).expect("pool accepts work");
/// assert_eq!(handle.join().expect("work must finish"), 42);
/// pool.shutdown();
/// assert!(pool.enqueue(|| ()).is_err());
/// ```
pub struct ThreadPool {
    inner: Arc<PoolInner>,
}

impl ThreadPool {
    /// Starts a pool with `num_threads` workers named `paraprop-worker-N`.
    ///
    /// # Errors
    /// Returns [`ParapropError::InvalidConfig`] for a zero worker count and
    /// [`ParapropError::WorkerSpawn`] when a worker thread cannot be started.
    pub fn new(num_threads: usize) -> Result<Self> {
        Self::with_name("paraprop", num_threads)
    }

    /// Starts a pool whose worker threads are prefixed with `name`.
    ///
    /// # Errors
    /// See [`ThreadPool::new`].
    pub fn with_name(name: impl Into<String>, num_threads: usize) -> Result<Self> {
        if num_threads == 0 {
            return Err(ParapropError::invalid_config(
                "thread pool size must be greater than zero",
            ));
        }
        let inner = Arc::new(PoolInner {
            name: name.into(),
            queue: Mutex::new(Queue {
                jobs: VecDeque::new(),
                stop: false,
                target: num_threads,
                live: num_threads,
            }),
            available: Condvar::new(),
            active: AtomicUsize::new(0),
            next_worker: AtomicUsize::new(0),
            workers: Mutex::new(Vec::with_capacity(num_threads)),
        });
        if let Err(error) = inner.spawn_reserved(num_threads) {
            inner.shutdown();
            return Err(error);
        }
        Ok(Self { inner })
    }

    /// Appends `work` to the queue and returns a handle to its outcome.
    ///
    /// # Errors
    /// Returns [`ParapropError::PoolShutDown`] once [`ThreadPool::shutdown`]
    /// has been called.
    pub fn enqueue<T, F>(&self, work: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (sender, receiver) = mpsc::sync_channel(1);
        let job: Job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(work))
                .map_err(|payload| panic_message(payload.as_ref()));
            if sender.send(outcome).is_err() {
                debug!("task handle dropped before the outcome arrived");
            }
        });
        {
            let mut queue = self.inner.lock_queue();
            if queue.stop {
                return Err(ParapropError::PoolShutDown);
            }
            queue.jobs.push_back(job);
        }
        self.inner.available.notify_one();
        Ok(TaskHandle { receiver })
    }

    /// Stops accepting work, drains the queue, and joins every worker.
    ///
    /// Calling this more than once is a no-op.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    /// Returns the number of workers currently executing an item.
    #[must_use]
    pub fn active_workers(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Returns the number of items waiting for a worker.
    #[must_use]
    pub fn queue_size(&self) -> usize {
        self.inner.lock_queue().jobs.len()
    }

    /// Returns queued plus running items as one consistent count.
    ///
    /// Workers bump the active counter while holding the queue lock, so an
    /// item moving from the queue to a worker is never missed.
    #[must_use]
    pub fn outstanding_work(&self) -> usize {
        let queue = self.inner.lock_queue();
        queue.jobs.len() + self.inner.active.load(Ordering::SeqCst)
    }

    /// Returns the target worker count.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.lock_queue().target
    }

    /// Returns the number of worker threads still alive.
    #[must_use]
    pub fn live_workers(&self) -> usize {
        self.inner.lock_queue().live
    }

    /// Returns whether [`ThreadPool::shutdown`] has been requested.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.lock_queue().stop
    }

    /// Changes the worker count.
    ///
    /// Growing spawns workers immediately. Shrinking lets surplus workers
    /// retire once their current item finishes.
    ///
    /// # Errors
    /// Returns [`ParapropError::InvalidConfig`] for zero,
    /// [`ParapropError::PoolShutDown`] after shutdown, and
    /// [`ParapropError::WorkerSpawn`] when a new worker cannot be started.
    pub fn set_size(&self, size: usize) -> Result<()> {
        self.inner.set_size(size)
    }

    /// Describes this pool for [`crate::AdaptiveResourceManager`].
    ///
    /// The registration holds only a weak reference; once the pool is
    /// dropped its size reads as zero and resize requests are ignored.
    #[must_use]
    pub fn pool_info(
        &self,
        name: impl Into<String>,
        min_threads: usize,
        max_threads: usize,
    ) -> ThreadPoolInfo {
        let getter: Weak<PoolInner> = Arc::downgrade(&self.inner);
        let setter = Weak::clone(&getter);
        ThreadPoolInfo::new(
            name,
            move || getter.upgrade().map_or(0, |inner| inner.lock_queue().target),
            move |size| {
                if let Some(inner) = setter.upgrade() {
                    if let Err(error) = inner.set_size(size) {
                        warn!(pool = %inner.name, size, %error, "ignoring resize request");
                    }
                }
            },
            min_threads,
            max_threads,
        )
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("name", &self.inner.name)
            .field("size", &self.size())
            .field("active", &self.active_workers())
            .finish_non_exhaustive()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{Barrier, atomic::AtomicBool},
        time::{Duration, Instant},
    };

    fn wait_until(deadline: Duration, condition: impl Fn() -> bool) -> bool {
        let started = Instant::now();
        while started.elapsed() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    #[test]
    fn rejects_zero_workers() {
        let err = ThreadPool::new(0).expect_err("zero workers must be rejected");
        assert!(matches!(err, ParapropError::InvalidConfig { .. }));
    }

    #[test]
    fn runs_work_in_fifo_order_on_single_worker() {
        let pool = ThreadPool::new(1).expect("pool must start");
        let order = Arc::new(Mutex::new(Vec::new()));
        let handles: Vec<_> = (0..5)
            .map(|value| {
                let order = Arc::clone(&order);
                pool.enqueue(move || order.lock().expect("lock poisoned").push(value))
                    .expect("pool accepts work")
            })
            .collect();
        for handle in handles {
            handle.join().expect("work must finish");
        }
        assert_eq!(*order.lock().expect("lock poisoned"), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn panics_are_reported_through_the_handle() {
        let pool = ThreadPool::new(1).expect("pool must start");
        let failing = pool
            .enqueue(|| -> u8 { panic!("work exploded") })
            .expect("pool accepts work");
        let err = failing.join().expect_err("panic must surface");
        assert_eq!(
            err,
            ParapropError::TaskPanicked {
                message: "work exploded".to_owned()
            }
        );
        let healthy = pool.enqueue(|| 1_u8).expect("worker must survive the panic");
        assert_eq!(healthy.join().expect("work must finish"), 1);
    }

    #[test]
    fn enqueue_after_shutdown_fails() {
        let pool = ThreadPool::new(2).expect("pool must start");
        pool.shutdown();
        pool.shutdown();
        let err = pool.enqueue(|| ()).expect_err("stopped pool must refuse work");
        assert_eq!(err.code(), crate::ParapropErrorCode::PoolShutDown);
    }

    #[test]
    fn shutdown_drains_queued_work() {
        let pool = ThreadPool::new(1).expect("pool must start");
        let handles: Vec<_> = (0..4_u32)
            .map(|value| {
                pool.enqueue(move || {
                    thread::sleep(Duration::from_millis(2));
                    value
                })
                .expect("pool accepts work")
            })
            .collect();
        pool.shutdown();
        let values: Vec<u32> = handles
            .into_iter()
            .map(|handle| handle.join().expect("queued work must still run"))
            .collect();
        assert_eq!(values, vec![0, 1, 2, 3]);
    }

    #[test]
    fn active_workers_tracks_running_items() {
        let pool = ThreadPool::new(2).expect("pool must start");
        let barrier = Arc::new(Barrier::new(3));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                pool.enqueue(move || {
                    barrier.wait();
                    barrier.wait();
                })
                .expect("pool accepts work")
            })
            .collect();
        barrier.wait();
        assert_eq!(pool.active_workers(), 2);
        let queued = pool.enqueue(|| ()).expect("pool accepts work");
        assert_eq!(pool.queue_size(), 1);
        assert_eq!(pool.outstanding_work(), 3);
        barrier.wait();
        for handle in handles {
            handle.join().expect("work must finish");
        }
        queued.join().expect("queued work must finish");
        assert!(wait_until(Duration::from_secs(2), || pool.outstanding_work() == 0));
    }

    #[test]
    fn try_join_reports_pending_then_ready() {
        let pool = ThreadPool::new(1).expect("pool must start");
        let release = Arc::new(AtomicBool::new(false));
        let gate = Arc::clone(&release);
        let mut handle = pool
            .enqueue(move || {
                while !gate.load(Ordering::Acquire) {
                    thread::sleep(Duration::from_millis(1));
                }
                5_u8
            })
            .expect("pool accepts work");
        assert!(handle.try_join().is_none());
        release.store(true, Ordering::Release);
        let started = Instant::now();
        let outcome = loop {
            if let Some(outcome) = handle.try_join() {
                break outcome;
            }
            assert!(started.elapsed() < Duration::from_secs(2), "work never finished");
            thread::sleep(Duration::from_millis(1));
        };
        assert_eq!(outcome.expect("work must succeed"), 5);
    }

    #[test]
    fn resizing_grows_and_retires_workers() {
        let pool = ThreadPool::new(2).expect("pool must start");
        pool.set_size(5).expect("grow must succeed");
        assert_eq!(pool.size(), 5);
        assert_eq!(pool.live_workers(), 5);

        pool.set_size(1).expect("shrink must succeed");
        assert_eq!(pool.size(), 1);
        assert!(wait_until(Duration::from_secs(2), || pool.live_workers() == 1));

        let handle = pool.enqueue(|| "still serving").expect("pool accepts work");
        assert_eq!(handle.join().expect("work must finish"), "still serving");
    }

    #[test]
    fn pool_info_drives_resizes() {
        let pool = ThreadPool::new(2).expect("pool must start");
        let info = pool.pool_info("workers", 1, 8);
        assert_eq!(info.current_size(), 2);
        info.apply_size(4);
        assert_eq!(pool.size(), 4);
        drop(pool);
        assert_eq!(info.current_size(), 0);
        info.apply_size(3);
    }
}
