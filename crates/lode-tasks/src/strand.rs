use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use futures::channel::oneshot;

use crate::task::Job;
use crate::{Task, TaskPool};

struct StrandState {
    queue: VecDeque<Job>,
    running: bool,
}

/// Serial executor adapting a [`TaskPool`] into a FIFO.
///
/// Tasks submitted to a strand run one at a time in submission order on the
/// underlying pool; a strand task may itself wait on pool-scheduled work,
/// which is why pool workers are dedicated threads.
#[derive(Clone)]
pub struct Strand {
    pool: Arc<TaskPool>,
    state: Arc<Mutex<StrandState>>,
}

impl Strand {
    /// Creates a strand over the given pool.
    pub fn new(pool: Arc<TaskPool>) -> Self {
        Self {
            pool,
            state: Arc::new(Mutex::new(StrandState {
                queue: VecDeque::new(),
                running: false,
            })),
        }
    }

    /// Submits a task; tasks on the same strand complete in submission order.
    pub fn submit<T, F>(&self, task: F) -> Task<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let job: Job = Box::new(move || {
            let _ = sender.send(task());
        });

        let spawn_drainer = {
            let mut state = self.state.lock().unwrap();
            state.queue.push_back(job);
            if state.running {
                false
            } else {
                state.running = true;
                true
            }
        };

        if spawn_drainer {
            let state = self.state.clone();
            self.pool.execute(move || loop {
                let job = {
                    let mut state = state.lock().unwrap();
                    match state.queue.pop_front() {
                        Some(job) => job,
                        None => {
                            state.running = false;
                            break;
                        }
                    }
                };
                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                    tracing::error!("strand task panicked");
                }
            });
        }

        Task::new(receiver)
    }

    /// Tasks queued on the strand and not yet started.
    pub fn queued_tasks(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tasks_complete_in_submission_order() {
        let pool = Arc::new(TaskPool::with_threads(4));
        let strand = Strand::new(pool);
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut last = None;
        for index in 0..100 {
            let log = log.clone();
            last = Some(strand.submit(move || {
                log.lock().unwrap().push(index);
            }));
        }
        last.unwrap().wait();

        let log = log.lock().unwrap();
        assert_eq!(*log, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn a_strand_task_may_wait_on_pool_work() {
        let pool = Arc::new(TaskPool::with_threads(4));
        let strand = Strand::new(pool.clone());
        let task = strand.submit(move || pool.submit(|| 21).wait() * 2);
        assert_eq!(task.wait(), 42);
    }

    #[test]
    fn two_strands_do_not_serialize_each_other() {
        let pool = Arc::new(TaskPool::with_threads(4));
        let first = Strand::new(pool.clone());
        let second = Strand::new(pool);

        let (sender, receiver) = crossbeam_channel::bounded::<()>(0);
        // The first strand blocks until the second strand's task unblocks it.
        let blocked = first.submit(move || receiver.recv().is_ok());
        let unblocker = second.submit(move || sender.send(()).is_ok());
        assert!(unblocker.wait());
        assert!(blocked.wait());
    }
}
