use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Shared handle to the result of a pool task.
///
/// Every clone waits on the same result; `wait` blocks, `try_result` polls.
pub struct Task<T: Clone> {
    inner: Shared<oneshot::Receiver<T>>,
}

impl<T: Clone> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone> Task<T> {
    pub(crate) fn new(receiver: oneshot::Receiver<T>) -> Self {
        Self {
            inner: receiver.shared(),
        }
    }

    /// Returns an already-completed task.
    pub fn ready(value: T) -> Self {
        let (sender, receiver) = oneshot::channel();
        let _ = sender.send(value);
        Self::new(receiver)
    }

    /// Blocks until the task completes and returns its value.
    ///
    /// Panics if the producing task panicked or was dropped; task bodies in
    /// this codebase return status values instead of panicking.
    pub fn wait(&self) -> T {
        futures::executor::block_on(self.inner.clone())
            .expect("task dropped or panicked before completing")
    }

    /// Returns the value if the task already completed.
    pub fn try_result(&self) -> Option<T> {
        self.inner
            .clone()
            .now_or_never()
            .map(|result| result.expect("task dropped or panicked before completing"))
    }
}

#[derive(Default)]
struct PendingCount {
    count: Mutex<usize>,
    idle: Condvar,
}

impl PendingCount {
    fn start(&self) {
        *self.count.lock().unwrap() += 1;
    }

    fn finish(&self) {
        let mut count = self.count.lock().unwrap();
        *count -= 1;
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn wait_idle(&self) {
        let mut count = self.count.lock().unwrap();
        while *count > 0 {
            count = self.idle.wait(count).unwrap();
        }
    }

    fn pending(&self) -> usize {
        *self.count.lock().unwrap()
    }
}

/// Fixed-size worker pool with a shared task queue.
///
/// Workers are dedicated threads, so task bodies may block on other tasks'
/// results; submitting returns a shared [`Task`].
pub struct TaskPool {
    sender: Option<crossbeam_channel::Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    pending: Arc<PendingCount>,
}

impl TaskPool {
    /// Creates a pool with one worker per available core.
    pub fn new() -> Self {
        let threads = std::thread::available_parallelism()
            .map(|count| count.get())
            .unwrap_or(4);
        Self::with_threads(threads)
    }

    /// Creates a pool with an explicit worker count.
    pub fn with_threads(threads: usize) -> Self {
        let threads = threads.max(1);
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let workers = (0..threads)
            .map(|index| {
                let receiver = receiver.clone();
                std::thread::Builder::new()
                    .name(format!("lode-worker-{index}"))
                    .spawn(move || {
                        while let Ok(job) = receiver.recv() {
                            job();
                        }
                    })
                    .expect("spawn pool worker")
            })
            .collect();
        Self {
            sender: Some(sender),
            workers,
            pending: Arc::new(PendingCount::default()),
        }
    }

    /// Number of worker threads.
    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    /// Tasks submitted but not yet picked up by a worker.
    pub fn queued_tasks(&self) -> usize {
        self.sender
            .as_ref()
            .map(crossbeam_channel::Sender::len)
            .unwrap_or(0)
    }

    /// Tasks submitted and not yet finished.
    pub fn pending_tasks(&self) -> usize {
        self.pending.pending()
    }

    /// Returns `true` when no submitted task is outstanding.
    pub fn is_idle(&self) -> bool {
        self.pending.pending() == 0
    }

    /// Blocks until every submitted task has finished. There is no
    /// cancellation; this only waits.
    pub fn wait_until_idle(&self) {
        self.pending.wait_idle();
    }

    /// Fire-and-forget execution on the pool.
    pub fn execute(&self, job: impl FnOnce() + Send + 'static) {
        let pending = self.pending.clone();
        pending.start();
        let wrapped: Job = Box::new(move || {
            if catch_unwind(AssertUnwindSafe(job)).is_err() {
                tracing::error!("pool task panicked");
            }
            pending.finish();
        });
        self.sender
            .as_ref()
            .expect("pool already shut down")
            .send(wrapped)
            .expect("pool workers gone");
    }

    /// Submits a task and returns the shared future of its result.
    pub fn submit<T, F>(&self, task: F) -> Task<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        self.execute(move || {
            let _ = sender.send(task());
        });
        Task::new(receiver)
    }
}

impl Default for TaskPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        // Closing the channel stops the workers once the queue drains.
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_returns_the_result_to_every_waiter() {
        let pool = TaskPool::with_threads(2);
        let task = pool.submit(|| 41 + 1);
        let clone = task.clone();
        assert_eq!(task.wait(), 42);
        assert_eq!(clone.wait(), 42);
        assert_eq!(task.try_result(), Some(42));
    }

    #[test]
    fn wait_until_idle_sees_all_tasks_finish() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let pool = TaskPool::with_threads(4);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..64 {
            let counter = counter.clone();
            pool.execute(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }
        pool.wait_until_idle();
        assert_eq!(counter.load(Ordering::Relaxed), 64);
        assert!(pool.is_idle());
    }

    #[test]
    fn a_panicking_task_does_not_kill_the_pool() {
        let pool = TaskPool::with_threads(1);
        pool.execute(|| panic!("boom"));
        pool.wait_until_idle();
        assert_eq!(pool.submit(|| 7).wait(), 7);
    }
}
