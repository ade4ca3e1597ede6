// commutator.rs - Name->worker id routing so any component can say "run this
// on the render thread" without holding a reference to that specific worker.
//
// Grounded on `original_source/.../Threads/WorkersCommutator.h`
// (`emplaceWorkerThread`, `enqueue`, `checkCurrentThreadIs`), realized as a
// `Mutex<HashMap<u8, Arc<WorkerThread>>>` rather than a raw-pointer map.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use crate::task::{Linked, TaskState};
use crate::worker::WorkerThread;

struct OneShot<F> {
    f: Mutex<Option<F>>,
}

impl<F: FnOnce() + Send> Linked for OneShot<F> {
    fn run_if_idle(&self) {
        if let Some(f) = self.f.lock().unwrap().take() {
            f();
        }
    }

    fn state(&self) -> TaskState {
        TaskState::Idle
    }
}

/// Maps worker names to runtime ids allocated monotonically from 0, and ids
/// to the worker they refer to, so code can route a closure to a named
/// worker ("render", "update", ...) without knowing its concrete id.
#[derive(Default)]
pub struct WorkerCommutator {
    next_id: AtomicU8,
    workers: Mutex<HashMap<u8, Arc<WorkerThread>>>,
}

impl WorkerCommutator {
    pub fn new() -> Self {
        Self { next_id: AtomicU8::new(0), workers: Mutex::new(HashMap::new()) }
    }

    /// Registers a worker and returns its newly allocated id.
    pub fn emplace_worker(&self, worker: Arc<WorkerThread>) -> u8 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.workers.lock().unwrap().insert(id, worker);
        id
    }

    pub fn get_worker(&self, id: u8) -> Option<Arc<WorkerThread>> {
        self.workers.lock().unwrap().get(&id).cloned()
    }

    pub fn is_current_thread(&self, id: u8) -> bool {
        match self.get_worker(id) {
            Some(worker) => worker.is_current_thread(),
            None => false,
        }
    }

    /// Routes `f` to the worker registered under `id` by linking a one-shot
    /// task onto its drain queue. Logs and no-ops if `id` is unregistered —
    /// spec.md §7 treats a missing worker/module as a programmer error to
    /// log-and-skip in release.
    pub fn enqueue_on<F>(&self, id: u8, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self.get_worker(id) {
            Some(worker) => worker.link_task(Box::new(OneShot { f: Mutex::new(Some(f)) })),
            None => log::warn!("commutator: no worker registered with id {id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    #[test]
    fn emplace_allocates_monotonic_ids() {
        let commutator = WorkerCommutator::new();
        let w1 = WorkerThread::new("w1", |_, _, _| {});
        let w2 = WorkerThread::new("w2", |_, _, _| {});
        let id1 = commutator.emplace_worker(w1);
        let id2 = commutator.emplace_worker(w2);
        assert_eq!(id1, 0);
        assert_eq!(id2, 1);
    }

    #[test]
    fn enqueue_on_routes_to_named_worker() {
        let commutator = WorkerCommutator::new();
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();

        let worker = WorkerThread::new("render", move |_dt, _now, mut drained| {
            while let Some(task) = drained.pop_front() {
                task.run_if_idle();
            }
            let _ = &ran_clone;
        });
        worker.run();
        let id = commutator.emplace_worker(worker.clone());

        let ran_for_task = ran.clone();
        commutator.enqueue_on(id, move || ran_for_task.store(true, Ordering::SeqCst));

        std::thread::sleep(Duration::from_millis(20));
        assert!(ran.load(Ordering::SeqCst));
        worker.stop();
    }

    #[test]
    fn enqueue_on_unknown_worker_is_a_noop() {
        let commutator = WorkerCommutator::new();
        commutator.enqueue_on(99, || panic!("must not run"));
    }
}
