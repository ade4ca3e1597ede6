// pool.rs - Fixed-size OS-thread pool: round-robin dispatch, per-worker FIFO
// queues, work stealing, pause/resume/stop, selective cancellation by task type.
//
// Shape follows the teacher's `concurrent_renderer.rs::RenderWorkerPool`/
// `RenderQueue` split (a pool owning N workers, each pulling from its own
// queue), rebuilt on `std::thread` + `Mutex`/`Condvar` instead of tokio tasks
// per spec.md's OS-thread concurrency model. Dispatch/steal/cancel algorithm
// is ported from the original engine's `ThreadPool2.h`/`Task2Queue.h`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::task::{self, TaskHandle, TaskObject, TaskState, TaskType, ALL_TASK_TYPES};

/// Default mask for [`ThreadPool::pause`]: cancels `COMMON` tasks only,
/// preserving `USER_CONTROL` ones in flight. Matches spec.md §4.C.
pub const DEFAULT_PAUSE_MASK: u8 = 0b0000_0001; // TaskType::Common.mask_bit()

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolState {
    Run,
    Pause,
    Stop,
}

struct TaskQueue {
    tasks: Mutex<VecDeque<Arc<dyn TaskObject>>>,
    condvar: Condvar,
}

impl TaskQueue {
    fn new() -> Self {
        Self {
            tasks: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
        }
    }

    fn push(&self, task: Arc<dyn TaskObject>) {
        let mut guard = self.tasks.lock().unwrap();
        guard.push_back(task);
        self.condvar.notify_one();
    }

    /// Drops canceled tasks off the front, then pops the first live one.
    fn pop(&self) -> Option<Arc<dyn TaskObject>> {
        let mut guard = self.tasks.lock().unwrap();
        Self::drain_canceled_front(&mut guard);
        guard.pop_front()
    }

    fn drain_canceled_front(guard: &mut VecDeque<Arc<dyn TaskObject>>) {
        while let Some(front) = guard.front() {
            if front.state() == TaskState::Canceled {
                guard.pop_front();
            } else {
                break;
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.tasks.lock().unwrap().is_empty()
    }

    fn cancel_matching(&self, mask: u8) {
        let guard = self.tasks.lock().unwrap();
        for t in guard.iter() {
            if t.task_type().mask_bit() & mask != 0 {
                t.cancel();
            }
        }
    }
}

/// Fixed-size pool of OS worker threads sharing a round-robin set of FIFO
/// queues, with work stealing when a thread's own queue runs dry.
pub struct ThreadPool {
    queues: Vec<Arc<TaskQueue>>,
    next_queue: AtomicUsize,
    state: Arc<Mutex<PoolState>>,
    state_condvar: Arc<Condvar>,
    stopped: Arc<AtomicBool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPool {
    /// Builds a pool with `worker_count` threads. `worker_count == 0` falls
    /// back to [`num_cpus::get`], matching spec.md §5's default sizing.
    pub fn new(worker_count: usize) -> Arc<Self> {
        let worker_count = if worker_count == 0 {
            num_cpus::get().max(1)
        } else {
            worker_count
        };

        let queues: Vec<Arc<TaskQueue>> = (0..worker_count).map(|_| Arc::new(TaskQueue::new())).collect();

        let pool = Arc::new(Self {
            queues,
            next_queue: AtomicUsize::new(0),
            state: Arc::new(Mutex::new(PoolState::Run)),
            state_condvar: Arc::new(Condvar::new()),
            stopped: Arc::new(AtomicBool::new(false)),
            handles: Mutex::new(Vec::new()),
        });

        let mut handles = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let pool_ref = pool.clone();
            handles.push(
                std::thread::Builder::new()
                    .name(format!("pool-worker-{id}"))
                    .spawn(move || pool_ref.run_loop(id))
                    .expect("failed to spawn pool worker thread"),
            );
        }
        *pool.handles.lock().unwrap() = handles;

        pool
    }

    pub fn worker_count(&self) -> usize {
        self.queues.len()
    }

    fn run_loop(&self, own_id: usize) {
        let own_queue = &self.queues[own_id];
        loop {
            {
                let mut state_guard = self.state.lock().unwrap();
                while *state_guard == PoolState::Pause {
                    state_guard = self.state_condvar.wait(state_guard).unwrap();
                }
                if *state_guard == PoolState::Stop {
                    return;
                }
            }

            let task = own_queue.pop().or_else(|| self.steal(own_id));

            match task {
                Some(t) => t.run(),
                None => {
                    let mut guard = own_queue.tasks.lock().unwrap();
                    if guard.is_empty() {
                        let _ = own_queue
                            .condvar
                            .wait_timeout(guard, std::time::Duration::from_millis(5))
                            .unwrap();
                    }
                    drop(guard);
                }
            }
        }
    }

    fn steal(&self, own_id: usize) -> Option<Arc<dyn TaskObject>> {
        for offset in 1..self.queues.len() {
            let idx = (own_id + offset) % self.queues.len();
            if let Some(task) = self.queues[idx].pop() {
                return Some(task);
            }
        }
        None
    }

    /// Enqueues `f` on the next queue in round-robin order. Returns an
    /// invalid handle if the pool has already been stopped.
    pub fn enqueue<F, R>(&self, task_type: TaskType, f: F) -> TaskHandle<R>
    where
        F: FnOnce(&crate::cancellation::CancellationToken) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.stopped.load(Ordering::Acquire) {
            return TaskHandle::invalid();
        }

        let (erased, handle) = task::spawn(task_type, f);
        let idx = self.next_queue.fetch_add(1, Ordering::Relaxed) % self.queues.len();
        self.queues[idx].push(erased);
        handle
    }

    /// Cancels every queued (not yet running) task whose type matches `mask`.
    pub fn cancel_tasks(&self, mask: u8) {
        for q in &self.queues {
            q.cancel_matching(mask);
        }
    }

    /// Flips every queue to `PAUSE` and cancels every queued-or-running task
    /// whose type matches `mask`. Per spec.md §4.C, the default mask
    /// ([`DEFAULT_PAUSE_MASK`]) cancels only `COMMON` tasks and preserves
    /// `USER_CONTROL` ones.
    pub fn pause(&self, mask: u8) {
        {
            let mut guard = self.state.lock().unwrap();
            if *guard == PoolState::Run {
                *guard = PoolState::Pause;
            }
        }
        self.cancel_tasks(mask);
    }

    /// Convenience wrapper around [`ThreadPool::pause`] using
    /// [`DEFAULT_PAUSE_MASK`], matching the original's parameterless `pause()`.
    pub fn pause_default(&self) {
        self.pause(DEFAULT_PAUSE_MASK);
    }

    pub fn resume(&self) {
        let mut guard = self.state.lock().unwrap();
        if *guard == PoolState::Pause {
            *guard = PoolState::Run;
            self.state_condvar.notify_all();
        }
    }

    /// Cancels all queued tasks, signals every worker to stop, and joins them.
    /// Any later `enqueue` call returns an invalid handle.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return; // already stopped
        }
        self.cancel_tasks(ALL_TASK_TYPES);
        {
            let mut guard = self.state.lock().unwrap();
            *guard = PoolState::Stop;
            self.state_condvar.notify_all();
        }
        for q in &self.queues {
            let _guard = q.tasks.lock().unwrap();
            q.condvar.notify_all();
        }
        let mut handles = self.handles.lock().unwrap();
        for h in handles.drain(..) {
            let _ = h.join();
        }
    }

    pub fn is_idle(&self) -> bool {
        self.queues.iter().all(|q| q.is_empty())
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;

    #[test]
    fn runs_enqueued_task_and_returns_result() {
        crate::test_support::init_logging();
        let pool = ThreadPool::new(2);
        let handle = pool.enqueue(TaskType::Common, |_| 1 + 1);
        assert_eq!(handle.take(), Some(2));
    }

    #[test]
    fn round_robin_spreads_across_queues() {
        let pool = ThreadPool::new(4);
        let counter = Arc::new(StdAtomicUsize::new(0));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let c = counter.clone();
                pool.enqueue(TaskType::Common, move |_| {
                    c.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();
        for h in handles {
            h.wait();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 16);
    }

    #[test]
    fn stop_drains_and_future_enqueue_is_invalid() {
        let pool = ThreadPool::new(2);
        pool.stop();
        let handle: TaskHandle<i32> = pool.enqueue(TaskType::Common, |_| 5);
        assert!(!handle.is_valid());
    }

    #[test]
    fn pause_blocks_new_work_until_resume() {
        let pool = ThreadPool::new(1);
        pool.pause_default();
        let handle = pool.enqueue(TaskType::Common, |_| 7);
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(handle.state(), TaskState::Idle);
        pool.resume();
        assert_eq!(handle.take(), Some(7));
    }

    #[test]
    fn cancel_tasks_by_type_skips_queued_work() {
        let pool = ThreadPool::new(1);
        pool.pause_default();
        let control = pool.enqueue(TaskType::UserControl, |_| "control");
        let common = pool.enqueue(TaskType::Common, |_| "common");
        pool.cancel_tasks(TaskType::UserControl.mask_bit());
        pool.resume();
        assert_eq!(control.state(), TaskState::Canceled);
        assert_eq!(common.take(), Some("common"));
    }

    /// S3 from spec.md §8: pausing with a mask selecting only `COMMON`
    /// cancels the queued `COMMON` task's token but leaves the
    /// `USER_CONTROL` task untouched; resuming lets `USER_CONTROL` complete
    /// and `COMMON` observe its token and bail out cooperatively.
    #[test]
    fn pause_with_mask_cancels_only_matching_type() {
        let pool = ThreadPool::new(2);
        pool.pause_default();
        let common = pool.enqueue(TaskType::Common, |token| token.is_cancelled());
        let control = pool.enqueue(TaskType::UserControl, |token| token.is_cancelled());
        pool.pause(DEFAULT_PAUSE_MASK);
        pool.resume();

        // COMMON was pre-emptively CANCELED while still IDLE, so it never runs.
        assert_eq!(common.state(), TaskState::Canceled);
        assert_eq!(common.take(), None);

        // USER_CONTROL was preserved and completes normally without its
        // token ever having been flipped.
        assert_eq!(control.take(), Some(false));
    }
}
