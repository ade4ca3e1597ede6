// engine.rs - Thin facade composing the crate's components: a type-erased
// module registry, an `EngineConfig`, and the render/update worker threads
// every embedding application drives.
//
// Grounded on the teacher's top-level wiring pattern (`concurrent_renderer.rs`
// building up a pool + worker set from config) and spec.md §9's module
// registry redesign note ("trait-object registry keyed by a type identifier
// token ... or by language-provided type id") — realized here with
// `std::any::TypeId` rather than a hand-rolled per-`T` counter.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::assets::AssetManager;
use crate::commutator::WorkerCommutator;
use crate::error::{EngineError, Result};
use crate::pool::ThreadPool;
use crate::renderer::{FileManager, Renderer};
use crate::worker::{PacingPolicy, WorkerThread};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FpsLimitConfig {
    pub fps_max: f32,
    pub limit_type: PacingPolicy,
}

impl Default for FpsLimitConfig {
    fn default() -> Self {
        Self { fps_max: 60.0, limit_type: PacingPolicy::CpuSleep }
    }
}

impl FpsLimitConfig {
    fn target_frame_time(&self) -> f32 {
        if self.fps_max <= 0.0 {
            f32::MAX
        } else {
            1.0 / self.fps_max
        }
    }
}

/// Top-level, serializable engine configuration, per spec.md §6. `graphics_cfg`
/// stays an opaque `serde_json::Value` — GPU resource management is a
/// Non-goal, but the field is still typed and round-trippable for an
/// embedding application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub fps_limit_draw: FpsLimitConfig,
    pub fps_limit_update: FpsLimitConfig,
    pub graphics_cfg: serde_json::Value,
    pub pool_threads: usize,
    pub loader_threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fps_limit_draw: FpsLimitConfig::default(),
            fps_limit_update: FpsLimitConfig { fps_max: 60.0, limit_type: PacingPolicy::Strict },
            graphics_cfg: serde_json::Value::Null,
            pool_threads: 0,
            loader_threads: 2,
        }
    }
}

/// Names the two fixed-cadence worker threads every `Engine` launches, and
/// the commutator ids they're registered under.
pub const RENDER_WORKER_NAME: &str = "render";
pub const UPDATE_WORKER_NAME: &str = "update";

/// Facade composing the pool, commutator, asset manager, and the two named
/// worker threads (render/update), plus a type-erased registry any caller
/// can stash additional modules into.
pub struct Engine {
    config: EngineConfig,
    pool: Arc<ThreadPool>,
    commutator: Arc<WorkerCommutator>,
    asset_manager: Arc<AssetManager>,
    render_worker: Arc<WorkerThread>,
    update_worker: Arc<WorkerThread>,
    render_worker_id: u8,
    update_worker_id: u8,
    modules: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Engine {
    /// Brings up components in dependency order (A -> H, per spec.md §2):
    /// pool, commutator, asset manager, then the render/update worker
    /// threads, registering each with the commutator as it starts.
    pub fn new<RenderFn, UpdateFn>(config: EngineConfig, render_frame: RenderFn, update_frame: UpdateFn) -> Self
    where
        RenderFn: FnMut(f32, std::time::Instant, std::collections::VecDeque<Box<dyn crate::task::Linked>>) + Send + 'static,
        UpdateFn: FnMut(f32, std::time::Instant, std::collections::VecDeque<Box<dyn crate::task::Linked>>) + Send + 'static,
    {
        let pool = ThreadPool::new(config.pool_threads);
        let commutator = Arc::new(WorkerCommutator::new());
        let asset_manager = Arc::new(AssetManager::new(config.loader_threads));

        let render_worker = WorkerThread::new(RENDER_WORKER_NAME, render_frame);
        render_worker.set_target_frame_time(config.fps_limit_draw.target_frame_time());
        render_worker.set_pacing_policy(config.fps_limit_draw.limit_type);
        let render_worker_id = commutator.emplace_worker(render_worker.clone());

        let update_worker = WorkerThread::new(UPDATE_WORKER_NAME, update_frame);
        update_worker.set_target_frame_time(config.fps_limit_update.target_frame_time());
        update_worker.set_pacing_policy(config.fps_limit_update.limit_type);
        let update_worker_id = commutator.emplace_worker(update_worker.clone());

        render_worker.run();
        update_worker.run();

        Self {
            config,
            pool,
            commutator,
            asset_manager,
            render_worker,
            update_worker,
            render_worker_id,
            update_worker_id,
            modules: HashMap::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<ThreadPool> {
        &self.pool
    }

    pub fn commutator(&self) -> &Arc<WorkerCommutator> {
        &self.commutator
    }

    pub fn asset_manager(&self) -> &Arc<AssetManager> {
        &self.asset_manager
    }

    pub fn render_worker(&self) -> &Arc<WorkerThread> {
        &self.render_worker
    }

    pub fn update_worker(&self) -> &Arc<WorkerThread> {
        &self.update_worker
    }

    pub fn render_worker_id(&self) -> u8 {
        self.render_worker_id
    }

    pub fn update_worker_id(&self) -> u8 {
        self.update_worker_id
    }

    /// Registers a module keyed by its own type; at most one instance per
    /// type, matching `AssetManager`'s per-`TypeId` loader slot convention.
    pub fn register_module<T: Send + Sync + 'static>(&mut self, module: T) -> Result<()> {
        if self.modules.contains_key(&TypeId::of::<T>()) {
            return Err(EngineError::ModuleAlreadyRegistered(std::any::type_name::<T>()));
        }
        self.modules.insert(TypeId::of::<T>(), Box::new(module));
        Ok(())
    }

    pub fn get_module<T: Send + Sync + 'static>(&self) -> Result<&T> {
        self.modules
            .get(&TypeId::of::<T>())
            .and_then(|m| m.downcast_ref::<T>())
            .ok_or(EngineError::ModuleNotFound(std::any::type_name::<T>()))
    }

    /// Stops both worker threads and the pool. Idempotent: `WorkerThread`
    /// and `ThreadPool` both guard their own stop with a swap.
    pub fn shutdown(&self) {
        self.render_worker.stop();
        self.update_worker.stop();
        self.pool.stop();
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Wires an [`crate::assets::mesh::MeshLoader`] and [`crate::assets::texture::TextureLoader`]
/// into `engine`'s asset manager, flushing GPU uploads/deferred-destruction
/// through `renderer` and routing callbacks via `engine`'s commutator.
pub fn register_default_loaders(engine: &Engine, renderer: Arc<dyn Renderer>, file_manager: Arc<dyn FileManager>) {
    let mesh_loader = crate::assets::mesh::MeshLoader::new(
        engine.asset_manager().loader_pool().clone(),
        engine.commutator().clone(),
        renderer.clone(),
        engine.render_worker_id(),
    );
    engine.asset_manager().set_loader(mesh_loader);

    let texture_cache = crate::assets::texture::TextureCache::new();
    let texture_loader = crate::assets::texture::TextureLoader::new(texture_cache, file_manager.clone(), renderer.clone());
    engine.asset_manager().set_loader(texture_loader);

    let font_loader = crate::assets::font::FontLoader::new(file_manager, engine.asset_manager().loader_pool().clone());
    engine.asset_manager().set_loader(font_loader);
}
