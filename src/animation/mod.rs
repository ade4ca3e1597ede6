// animation/mod.rs - Latency-N animator tree plus skeleton, wired together
// behind an `Arc<Mutex<..>>`-guarded pipeline so `update_animation` can hand
// the recompute work to the task pool while `pre_render` arbitrates against
// it through the slot's task handle.
//
// Grounded on `original_source/.../Graphics/Mesh/AnimationTree.h`'s
// `MeshAnimationTree::update_animation`/`pre_render` pairing (spec.md §4.H).
// The original reaches the skeleton/tree through a single-threaded render
// loop with no cross-thread sharing concerns; here the recompute runs on a
// pool worker while the caller holds on to (and may concurrently drive) the
// same tree/skeleton, so `Mutex` stands in for "never touched from two
// places at once without waiting" instead of relying on that discipline
// going unenforced.

pub mod skeleton;
pub mod tree;

use std::sync::{Arc, Mutex};

use crate::pool::ThreadPool;
use crate::task::TaskType;

use skeleton::Skeleton;
use tree::AnimationTree;

struct PipelineState {
    tree: AnimationTree,
    skeleton: Skeleton,
}

/// Couples an [`AnimationTree`] to the [`Skeleton`] it drives and schedules
/// recompute work onto a [`ThreadPool`], per spec.md §4.H.
pub struct AnimationPipeline {
    state: Arc<Mutex<PipelineState>>,
    pool: Arc<ThreadPool>,
}

impl AnimationPipeline {
    pub fn new(tree: AnimationTree, skeleton: Skeleton, pool: Arc<ThreadPool>) -> Self {
        Self { state: Arc::new(Mutex::new(PipelineState { tree, skeleton })), pool }
    }

    /// Advances the updater slot; if `dt == 0` returns without touching that
    /// slot's (possibly stale but already-settled) task handle. Otherwise
    /// advances time accumulators in place on the calling thread, then
    /// schedules the heavier `calculate` -> `apply` -> world matrices ->
    /// joint matrices chain as a task, checking the cancellation token
    /// between each step per spec.md §4.H. Stores the resulting handle at
    /// the new slot.
    pub fn update_animation(&self, dt: f32) {
        let slot = {
            let mut state = self.state.lock().unwrap();
            state.skeleton.advance_updater_slot()
        };

        if dt == 0.0 {
            return;
        }

        {
            let mut state = self.state.lock().unwrap();
            state.tree.update(dt, slot);
        }

        let state = self.state.clone();
        let handle = self.pool.enqueue(TaskType::Common, move |token| {
            let mut state = state.lock().unwrap();
            if token.is_cancelled() {
                return;
            }
            state.tree.calculate(slot);
            if token.is_cancelled() {
                return;
            }
            state.tree.apply(&mut state.skeleton, slot);
            if token.is_cancelled() {
                return;
            }
            state.skeleton.recompute_world_matrices(slot);
            if token.is_cancelled() {
                return;
            }
            state.skeleton.recompute_joint_matrices(slot);
        });

        self.state.lock().unwrap().skeleton.set_task_handle(slot, handle);
    }

    /// Chooses `render_slot = (updater_slot + 1) mod latency`, waits on that
    /// slot's task handle, and returns the slot index now safe to read from.
    pub fn pre_render(&self) -> u8 {
        let (slot, handle) = {
            let state = self.state.lock().unwrap();
            let slot = state.skeleton.render_slot();
            (slot, state.skeleton.task_handle(slot))
        };
        handle.wait();
        slot
    }

    pub fn with_skeleton<R>(&self, f: impl FnOnce(&Skeleton) -> R) -> R {
        let state = self.state.lock().unwrap();
        f(&state.skeleton)
    }

    pub fn with_tree_mut<R>(&self, f: impl FnOnce(&mut AnimationTree) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state.tree)
    }
}
