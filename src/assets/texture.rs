// assets/texture.rs - Reference-counted texture handle with a `store_forever`
// flag, explicit forced eviction, and deferred-destruction submission on
// last-reference drop.
//
// Grounded on `original_source/.../Graphics/Texture/TextureCache.h`
// (`CacheParams::storeForever`, `onTextureFree` on last external reference,
// `eraseTexture` for forced eviction of forever-stored entries) and
// `TextureLoader.cpp`'s dedup-by-path loading. CPU-side decode uses the
// teacher's `image` dependency (`material_loader.rs`'s "decode bytes into a
// CPU-side image" shape); the GPU upload is a [`crate::renderer::Renderer`]
// trait call since GPU resource management is a Non-goal (§1).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::assets::{AssetLoadingCallback, AssetLoadingParams, AssetLoadingResult, Loader};
use crate::cache::AsyncCacheMap;
use crate::renderer::{GpuResource, Renderer};

#[derive(Debug, Clone)]
pub struct TextureLoadingParams {
    pub file: String,
    pub store_forever: bool,
}

struct TextureGpuResource;
impl GpuResource for TextureGpuResource {}

pub struct TextureData {
    pub key: String,
    pub width: u32,
    pub height: u32,
    pub gpu_buffer_handle: u64,
    external_refs: AtomicUsize,
    store_forever: AtomicBool,
}

/// Shared cache of decoded textures keyed by file path. Eviction fires when
/// the last [`TextureHandle`] referencing a non-`store_forever` entry drops.
pub struct TextureCache {
    map: AsyncCacheMap<String, Arc<TextureData>>,
}

impl TextureCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { map: AsyncCacheMap::new() })
    }

    fn on_texture_free(&self, key: &str) {
        if let Some(data) = self.map.get(&key.to_string()) {
            if !data.store_forever.load(Ordering::Acquire) {
                self.map.erase(&key.to_string());
            }
        }
    }

    /// Forces eviction even for a `store_forever` entry.
    pub fn evict_forever(&self, key: &str) {
        self.map.erase(&key.to_string());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.has(&key.to_string())
    }
}

/// An `Arc`-refcounted handle over decoded texture data, with its own
/// external-reference count distinct from the cache's internal copy — so
/// the cache can tell when the last *caller-held* handle disappears, not
/// merely when its own map entry would be dropped.
pub struct TextureHandle {
    data: Arc<TextureData>,
    cache: Arc<TextureCache>,
    renderer: Arc<dyn Renderer>,
}

impl TextureHandle {
    pub fn width(&self) -> u32 {
        self.data.width
    }

    pub fn height(&self) -> u32 {
        self.data.height
    }

    pub fn key(&self) -> &str {
        &self.data.key
    }

    pub fn mark_store_forever(&self, forever: bool) {
        self.data.store_forever.store(forever, Ordering::Release);
    }
}

impl Clone for TextureHandle {
    fn clone(&self) -> Self {
        self.data.external_refs.fetch_add(1, Ordering::AcqRel);
        Self { data: self.data.clone(), cache: self.cache.clone(), renderer: self.renderer.clone() }
    }
}

impl Drop for TextureHandle {
    fn drop(&mut self) {
        if self.data.external_refs.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.renderer.mark_to_delete(Box::new(TextureGpuResource));
            self.cache.on_texture_free(&self.data.key);
        }
    }
}

impl Default for TextureHandle {
    fn default() -> Self {
        Self {
            data: Arc::new(TextureData {
                key: String::new(),
                width: 0,
                height: 0,
                gpu_buffer_handle: 0,
                external_refs: AtomicUsize::new(1),
                store_forever: AtomicBool::new(false),
            }),
            cache: TextureCache::new(),
            renderer: Arc::new(crate::renderer::NoopRenderer),
        }
    }
}

/// Decodes `bytes` with the `image` crate; a 1x1 placeholder for empty input
/// keeps the default-constructed handle cheap to build in tests.
fn decode_dimensions(bytes: &[u8]) -> Result<(u32, u32), ()> {
    if bytes.is_empty() {
        return Err(());
    }
    match image::load_from_memory(bytes) {
        Ok(img) => Ok((img.width(), img.height())),
        Err(_) => Err(()),
    }
}

pub struct TextureLoader {
    cache: Arc<TextureCache>,
    file_manager: Arc<dyn crate::renderer::FileManager>,
    renderer: Arc<dyn Renderer>,
    in_flight: Mutex<std::collections::HashMap<String, Vec<AssetLoadingCallback<TextureHandle>>>>,
}

impl TextureLoader {
    pub fn new(cache: Arc<TextureCache>, file_manager: Arc<dyn crate::renderer::FileManager>, renderer: Arc<dyn Renderer>) -> Self {
        Self { cache, file_manager, renderer, in_flight: Mutex::new(std::collections::HashMap::new()) }
    }
}

impl Loader for TextureLoader {
    type Asset = TextureHandle;
    type Payload = TextureLoadingParams;

    fn load(&self, _out: &mut TextureHandle, params: &AssetLoadingParams<TextureLoadingParams>, callback: AssetLoadingCallback<TextureHandle>) {
        let key = params.payload.file.clone();

        if let Some(data) = self.cache.map.get(&key) {
            data.external_refs.fetch_add(1, Ordering::AcqRel);
            let handle = TextureHandle { data, cache: self.cache.clone(), renderer: self.renderer.clone() };
            callback(handle, AssetLoadingResult::LoadingSuccess);
            return;
        }

        {
            let mut in_flight = self.in_flight.lock().unwrap();
            let already_loading = in_flight.contains_key(&key);
            in_flight.entry(key.clone()).or_default().push(callback);
            if already_loading {
                return;
            }
        }

        let bytes = match self.file_manager.read_file(std::path::Path::new(&key)) {
            Ok(b) => b,
            Err(_) => {
                self.deliver(&key, Err(()));
                return;
            }
        };

        match decode_dimensions(&bytes) {
            Ok((width, height)) => {
                let gpu_buffer_handle = self.renderer.upload_buffer(&bytes);
                let data = Arc::new(TextureData {
                    key: key.clone(),
                    width,
                    height,
                    gpu_buffer_handle,
                    external_refs: AtomicUsize::new(0),
                    store_forever: AtomicBool::new(params.payload.store_forever),
                });
                self.cache.map.set(key.clone(), data);
                self.deliver(&key, Ok(()));
            }
            Err(()) => self.deliver(&key, Err(())),
        }
    }

    /// Drops any still-pending callbacks without delivery, per SPEC_FULL.md
    /// §9's resolution of spec.md's pool-shutdown open question.
    fn cleanup(&self) {
        let mut in_flight = self.in_flight.lock().unwrap();
        let dropped: usize = in_flight.values().map(Vec::len).sum();
        if dropped > 0 {
            log::warn!("texture loader shutdown: dropping {dropped} pending load callback(s) without delivery");
        }
        in_flight.clear();
    }
}

impl TextureLoader {
    fn deliver(&self, key: &str, outcome: Result<(), ()>) {
        let callbacks = self.in_flight.lock().unwrap().remove(key).unwrap_or_default();
        match outcome {
            Ok(()) => {
                let data = self.cache.map.get(&key.to_string());
                for callback in callbacks {
                    if let Some(data) = &data {
                        data.external_refs.fetch_add(1, Ordering::AcqRel);
                        let handle = TextureHandle { data: data.clone(), cache: self.cache.clone(), renderer: self.renderer.clone() };
                        callback(handle, AssetLoadingResult::LoadingSuccess);
                    } else {
                        callback(TextureHandle::default(), AssetLoadingResult::LoadingError);
                    }
                }
            }
            Err(()) => {
                for callback in callbacks {
                    callback(TextureHandle::default(), AssetLoadingResult::LoadingError);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::mock::MockRenderer;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;

    struct InMemoryFiles(std::collections::HashMap<String, Vec<u8>>);

    impl crate::renderer::FileManager for InMemoryFiles {
        fn read_file(&self, path: &std::path::Path) -> std::io::Result<Vec<u8>> {
            self.0
                .get(path.to_str().unwrap())
                .cloned()
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "missing"))
        }
    }

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbaImage::new(2, 2);
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img).write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn last_reference_drop_evicts_non_forever_entry() {
        let cache = TextureCache::new();
        let mut files = std::collections::HashMap::new();
        files.insert("tex.png".to_string(), png_bytes());
        let file_manager = Arc::new(InMemoryFiles(files));
        let renderer: Arc<dyn Renderer> = Arc::new(MockRenderer::new());
        let loader = TextureLoader::new(cache.clone(), file_manager, renderer);

        let count = Arc::new(StdAtomicUsize::new(0));
        let count_clone = count.clone();
        let params = AssetLoadingParams::new(TextureLoadingParams { file: "tex.png".to_string(), store_forever: false });
        let mut out = TextureHandle::default();
        let handle_slot: Arc<Mutex<Option<TextureHandle>>> = Arc::new(Mutex::new(None));
        let handle_slot_clone = handle_slot.clone();
        loader.load(&mut out, &params, Box::new(move |h, result| {
            assert_eq!(result, AssetLoadingResult::LoadingSuccess);
            count_clone.fetch_add(1, Ordering::SeqCst);
            *handle_slot_clone.lock().unwrap() = Some(h);
        }));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(cache.contains("tex.png"));

        handle_slot.lock().unwrap().take();
        assert!(!cache.contains("tex.png"));
    }

    #[test]
    fn store_forever_survives_last_reference_drop() {
        let cache = TextureCache::new();
        let mut files = std::collections::HashMap::new();
        files.insert("tex.png".to_string(), png_bytes());
        let file_manager = Arc::new(InMemoryFiles(files));
        let renderer: Arc<dyn Renderer> = Arc::new(MockRenderer::new());
        let loader = TextureLoader::new(cache.clone(), file_manager, renderer);

        let params = AssetLoadingParams::new(TextureLoadingParams { file: "tex.png".to_string(), store_forever: true });
        let mut out = TextureHandle::default();
        let handle_slot: Arc<Mutex<Option<TextureHandle>>> = Arc::new(Mutex::new(None));
        let handle_slot_clone = handle_slot.clone();
        loader.load(&mut out, &params, Box::new(move |h, _result| {
            *handle_slot_clone.lock().unwrap() = Some(h);
        }));

        handle_slot.lock().unwrap().take();
        assert!(cache.contains("tex.png"));

        cache.evict_forever("tex.png");
        assert!(!cache.contains("tex.png"));
    }

    #[test]
    fn missing_file_reports_loading_error() {
        let cache = TextureCache::new();
        let file_manager = Arc::new(InMemoryFiles(std::collections::HashMap::new()));
        let renderer: Arc<dyn Renderer> = Arc::new(MockRenderer::new());
        let loader = TextureLoader::new(cache, file_manager, renderer);

        let params = AssetLoadingParams::new(TextureLoadingParams { file: "missing.png".to_string(), store_forever: false });
        let mut out = TextureHandle::default();
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();
        loader.load(&mut out, &params, Box::new(move |_h, result| {
            *seen_clone.lock().unwrap() = Some(result);
        }));
        assert_eq!(seen.lock().unwrap().take(), Some(AssetLoadingResult::LoadingError));
    }
}
