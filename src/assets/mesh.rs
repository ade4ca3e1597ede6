// assets/mesh.rs - Worked example loader: dedup-by-file-path mesh data
// cache, per-entry in-flight callback coalescing list, "flush to GPU" step
// submitted to a named worker via the commutator.
//
// Grounded on `original_source/.../Graphics/Mesh/MeshLoader.cpp`
// (`MeshLoader::loadAsset`/`fillMeshData`/`executeCallbacks`): a
// `get_or_set`-style cache keyed by file path, a per-entry in-flight
// callback list drained once parsing finishes, and a commutator-routed
// "fill GPU data" step on the render thread. The real glTF parse and GPU
// upload are out of scope (§1 Non-goals: GPU resource management) — this
// loader simulates the parse step and calls [`crate::renderer::Renderer::upload_buffer`]
// for the upload so the dedup/coalescing protocol is still exercised end to end.

use std::sync::{Arc, Mutex};

use crate::assets::{AssetLoadingCallback, AssetLoadingParams, AssetLoadingResult, Loader};
use crate::commutator::WorkerCommutator;
use crate::pool::ThreadPool;
use crate::renderer::Renderer;
use crate::task::TaskType;

#[derive(Debug, Clone)]
pub struct MeshLoadingParams {
    pub file: String,
    pub semantic_mask: u32,
    pub latency: u8,
    pub callback_thread_id: u8,
}

#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub file: String,
    pub vertex_count: usize,
    pub semantic_mask: u32,
    pub gpu_buffer_handle: u64,
}

#[derive(Debug, Clone)]
struct MeshDataPayload {
    vertex_count: usize,
    gpu_buffer_handle: u64,
}

enum MeshDataState {
    Loading,
    Ready(MeshDataPayload),
    Errored,
}

type PendingCallback = (AssetLoadingCallback<Mesh>, u32, u8);

/// State and waiters share one lock so a caller's "is it ready, or do I
/// register as a waiter" decision can never race the fill task's
/// "transition to ready, then drain waiters" — both happen under the same
/// `inner` guard, so neither side can observe a state that has already
/// been drained against.
struct MeshDataEntry {
    inner: Mutex<MeshDataInner>,
}

struct MeshDataInner {
    state: MeshDataState,
    waiters: Vec<PendingCallback>,
}

/// Parses `file` into vertex data. A path containing `"bad"` simulates a
/// parse failure — there is no real glTF backend to fail against.
fn parse_mesh_file(file: &str) -> Result<usize, ()> {
    if file.is_empty() || file.contains("bad") {
        return Err(());
    }
    Ok(file.len() * 3)
}

pub struct MeshLoader {
    data_cache: Arc<crate::cache::AsyncCacheMap<String, Arc<MeshDataEntry>>>,
    loader_pool: Arc<ThreadPool>,
    commutator: Arc<WorkerCommutator>,
    renderer: Arc<dyn Renderer>,
    render_worker_id: u8,
}

impl MeshLoader {
    pub fn new(loader_pool: Arc<ThreadPool>, commutator: Arc<WorkerCommutator>, renderer: Arc<dyn Renderer>, render_worker_id: u8) -> Self {
        Self {
            data_cache: Arc::new(crate::cache::AsyncCacheMap::new()),
            loader_pool,
            commutator,
            renderer,
            render_worker_id,
        }
    }

    /// Runs the parse step, then either finishes the entry (success) or
    /// marks it errored, draining the entry's own waiter list under the
    /// same lock as the state transition — exactly the steps
    /// `fillMeshData`/`executeCallbacks` perform in the original, minus the
    /// concrete glTF/Vulkan specifics.
    fn fill_mesh_data(
        file: String,
        entry: Arc<MeshDataEntry>,
        data_cache: Arc<crate::cache::AsyncCacheMap<String, Arc<MeshDataEntry>>>,
        commutator: Arc<WorkerCommutator>,
        renderer: Arc<dyn Renderer>,
        render_worker_id: u8,
    ) {
        match parse_mesh_file(&file) {
            Ok(vertex_count) => {
                let bytes = vec![0u8; vertex_count * 4];
                let handle = renderer.upload_buffer(&bytes);

                let pending = {
                    let mut inner = entry.inner.lock().unwrap();
                    inner.state = MeshDataState::Ready(MeshDataPayload { vertex_count, gpu_buffer_handle: handle });
                    std::mem::take(&mut inner.waiters)
                };

                let renderer_for_flush = renderer.clone();
                commutator.enqueue_on(render_worker_id, move || renderer_for_flush.submit());

                for (callback, semantic_mask, target_thread) in pending {
                    let mesh = Mesh { file: file.clone(), vertex_count, semantic_mask, gpu_buffer_handle: handle };
                    commutator.enqueue_on(target_thread, move || callback(mesh, AssetLoadingResult::LoadingSuccess));
                }
            }
            Err(()) => {
                let pending = {
                    let mut inner = entry.inner.lock().unwrap();
                    inner.state = MeshDataState::Errored;
                    std::mem::take(&mut inner.waiters)
                };
                data_cache.erase(&file);

                for (callback, semantic_mask, target_thread) in pending {
                    let mesh = Mesh { file: file.clone(), semantic_mask, ..Default::default() };
                    commutator.enqueue_on(target_thread, move || callback(mesh, AssetLoadingResult::LoadingError));
                }
            }
        }
    }
}

impl Loader for MeshLoader {
    type Asset = Mesh;
    type Payload = MeshLoadingParams;

    fn load(&self, _out: &mut Mesh, params: &AssetLoadingParams<MeshLoadingParams>, callback: AssetLoadingCallback<Mesh>) {
        let file = params.payload.file.clone();
        let semantic_mask = params.payload.semantic_mask;
        let target_thread = params.payload.callback_thread_id;

        let mut created_now = false;
        let entry = self.data_cache.get_or_create(file.clone(), || {
            created_now = true;
            Arc::new(MeshDataEntry { inner: Mutex::new(MeshDataInner { state: MeshDataState::Loading, waiters: Vec::new() }) })
        });

        // Check-or-register happens under the entry's own lock, the same
        // lock `fill_mesh_data` holds while flipping to `Ready`/`Errored`
        // and draining waiters — so a caller can never observe `Loading`,
        // lose the lock, and push into a waiter list that has already been
        // drained out from under it. The callback fires from inside the
        // arm that decided its fate, never after the lock is released on a
        // separate branch, so there is exactly one move of `callback`.
        {
            let mut inner = entry.inner.lock().unwrap();
            match &inner.state {
                MeshDataState::Ready(payload) => {
                    let mesh = Mesh { file: file.clone(), vertex_count: payload.vertex_count, semantic_mask, gpu_buffer_handle: payload.gpu_buffer_handle };
                    drop(inner);
                    callback(mesh, AssetLoadingResult::LoadingSuccess);
                }
                MeshDataState::Loading | MeshDataState::Errored => {
                    inner.waiters.push((callback, semantic_mask, target_thread));
                }
            }
        }

        if created_now {
            let data_cache = self.data_cache.clone();
            let commutator = self.commutator.clone();
            let renderer = self.renderer.clone();
            let render_worker_id = self.render_worker_id;
            let file_for_task = file.clone();
            let entry_for_task = entry.clone();

            if params.r#async {
                self.loader_pool.enqueue(TaskType::Common, move |_token| {
                    Self::fill_mesh_data(file_for_task, entry_for_task, data_cache, commutator, renderer, render_worker_id);
                });
            } else {
                Self::fill_mesh_data(file_for_task, entry_for_task, data_cache, commutator, renderer, render_worker_id);
            }
        }
    }

    /// Drops any still-pending waiters without delivery, per SPEC_FULL.md
    /// §9's resolution of spec.md's pool-shutdown open question.
    fn cleanup(&self) {
        let entries = self.data_cache.values();
        let dropped: usize = entries.iter().map(|entry| entry.inner.lock().unwrap().waiters.len()).sum();
        if dropped > 0 {
            log::warn!("mesh loader shutdown: dropping {dropped} pending load callback(s) without delivery");
        }
        for entry in entries {
            entry.inner.lock().unwrap().waiters.clear();
        }
    }
}
