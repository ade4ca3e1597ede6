// renderer.rs - External collaborator interfaces the core consumes, per
// spec.md §6: `Renderer` (deferred-free queue, GPU buffer create/upload,
// command submission), `FileManager` (synchronous file reads), `Device`
// (platform loop start/stop). Trait-only — no concrete GPU backend, since
// GPU resource management is a Non-goal.
//
// Grounded on `original_source/.../Graphics/Graphics.h` for the interface
// boundary; the Rust shape (trait + mock test double) follows the teacher's
// `error_handling.rs::ManagedBuffer`/`ResourceTracker` pattern of tracked
// resource handles, generalized to a trait since the concrete `wgpu` types
// have no role in this crate.

use std::path::Path;

/// A GPU resource opaque to the core — the only thing the core ever does
/// with one is hand it to [`Renderer::mark_to_delete`].
pub trait GpuResource: Send + Sync {}

/// Deferred-free queue plus upload/submission surface the asset pipeline and
/// animation pipeline submit to. The core's only obligation is to *submit*;
/// the real implementation drains the deferred-free queue at a safe point
/// (after any in-flight command buffer referencing the resource retires).
pub trait Renderer: Send + Sync {
    /// Queues a resource for destruction once it is no longer referenced by
    /// an in-flight command buffer, rather than freeing it synchronously.
    fn mark_to_delete(&self, resource: Box<dyn GpuResource>);

    /// Uploads `data` to a (backend-defined) GPU buffer and returns an opaque
    /// handle the caller can later pass back to the renderer.
    fn upload_buffer(&self, data: &[u8]) -> u64;

    /// Submits queued command buffers for execution.
    fn submit(&self);
}

/// Synchronous file reads, per spec.md §6 (`read_file(path) -> bytes`).
pub trait FileManager: Send + Sync {
    fn read_file(&self, path: &Path) -> std::io::Result<Vec<u8>>;
}

/// Platform loop start/stop, per spec.md §6.
pub trait Device: Send + Sync {
    fn start(&self);
    fn stop(&self);
}

/// A `Renderer` that discards everything submitted to it. Backs the
/// placeholder `Renderer` every `Default`-constructed asset handle needs
/// before its loader has actually run (`AssetManager::load_asset` builds
/// `T::default()` up front, per spec.md §3) — not a test double, since
/// that construction happens in ordinary (non-test) builds too.
pub struct NoopRenderer;

impl Renderer for NoopRenderer {
    fn mark_to_delete(&self, _resource: Box<dyn GpuResource>) {}
    fn upload_buffer(&self, _data: &[u8]) -> u64 {
        0
    }
    fn submit(&self) {}
}
