use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;
use std::thread::ThreadId;

use crate::task::Job;

/// FIFO of closures drained by the main thread once per frame.
///
/// Any thread may push; only the designated main thread calls
/// [`execute_all`](Self::execute_all). `push_and_wait` bridges a worker onto
/// the main thread and blocks until its closure ran there.
#[derive(Default)]
pub struct MainThreadQueue {
    queue: Mutex<std::collections::VecDeque<Job>>,
    draining: Mutex<Option<ThreadId>>,
}

impl MainThreadQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a task without waiting.
    pub fn push(&self, task: impl FnOnce() + Send + 'static) {
        self.queue.lock().unwrap().push_back(Box::new(task));
    }

    /// Enqueues a task and blocks until the main thread ran it, returning its
    /// result.
    ///
    /// Calling this from the main thread while it drains the queue would wait
    /// on itself; that is a programming error and panics.
    pub fn push_and_wait<R, F>(&self, task: F) -> R
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        if *self.draining.lock().unwrap() == Some(std::thread::current().id()) {
            panic!("push_and_wait from the main thread during a drain deadlocks");
        }
        let (sender, receiver) = crossbeam_channel::bounded(1);
        self.push(move || {
            let _ = sender.send(task());
        });
        receiver
            .recv()
            .expect("main-thread task dropped or panicked")
    }

    /// Drains and runs all currently queued tasks. Called by the main thread.
    pub fn execute_all(&self) {
        *self.draining.lock().unwrap() = Some(std::thread::current().id());
        loop {
            let task = self.queue.lock().unwrap().pop_front();
            let Some(task) = task else {
                break;
            };
            if catch_unwind(AssertUnwindSafe(task)).is_err() {
                tracing::error!("main-thread task panicked");
            }
        }
        *self.draining.lock().unwrap() = None;
    }

    /// Returns `true` if no task is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn push_and_wait_bridges_a_worker_onto_the_main_thread() {
        let queue = Arc::new(MainThreadQueue::new());
        let worker_queue = queue.clone();
        let main_id = std::thread::current().id();

        let worker = std::thread::spawn(move || {
            worker_queue.push_and_wait(move || {
                assert_eq!(std::thread::current().id(), main_id);
                40 + 2
            })
        });

        while !worker.is_finished() {
            queue.execute_all();
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(worker.join().unwrap(), 42);
    }

    #[test]
    fn tasks_run_in_push_order() {
        let queue = MainThreadQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for index in 0..10 {
            let log = log.clone();
            queue.push(move || log.lock().unwrap().push(index));
        }
        queue.execute_all();
        assert_eq!(*log.lock().unwrap(), (0..10).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }

    #[test]
    fn push_and_wait_from_the_drain_thread_panics() {
        let queue = Arc::new(MainThreadQueue::new());
        let inner = queue.clone();
        let panicked = Arc::new(AtomicBool::new(false));
        let seen = panicked.clone();

        queue.push(move || {
            let result = catch_unwind(AssertUnwindSafe(|| inner.push_and_wait(|| 1)));
            seen.store(result.is_err(), Ordering::Relaxed);
        });
        queue.execute_all();
        assert!(panicked.load(Ordering::Relaxed));
    }
}
