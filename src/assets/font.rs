// assets/font.rs - Minimal loader demonstrating the simplest shape a
// `Loader` implementor can take: no dedup cache, no in-flight coalescing,
// just a synchronous (or pool-dispatched) read of opaque bytes.
//
// Grounded on `original_source/.../Graphics/Text/FontLoader.h`
// (`FontLoader::loadAsset` takes a file path and a single callback, no
// sharing between callers). Contrast with [`crate::assets::mesh`] and
// [`crate::assets::texture`], which add caching/refcounting on top of this
// same `Loader` shape — this file exists to show that shape is optional,
// not load-bearing.

use std::sync::Arc;

use crate::assets::{AssetLoadingCallback, AssetLoadingParams, AssetLoadingResult, Loader};
use crate::pool::ThreadPool;
use crate::task::TaskType;

#[derive(Debug, Clone)]
pub struct FontLoadingParams {
    pub file: String,
}

#[derive(Debug, Clone, Default)]
pub struct Font {
    pub file: String,
    pub bytes: Vec<u8>,
}

pub struct FontLoader {
    file_manager: Arc<dyn crate::renderer::FileManager>,
    loader_pool: Arc<ThreadPool>,
}

impl FontLoader {
    pub fn new(file_manager: Arc<dyn crate::renderer::FileManager>, loader_pool: Arc<ThreadPool>) -> Self {
        Self { file_manager, loader_pool }
    }

    fn read(file_manager: &dyn crate::renderer::FileManager, file: &str, callback: AssetLoadingCallback<Font>) {
        match file_manager.read_file(std::path::Path::new(file)) {
            Ok(bytes) => callback(Font { file: file.to_string(), bytes }, AssetLoadingResult::LoadingSuccess),
            Err(e) => {
                log::warn!("font load failed for {file}: {e}");
                callback(Font { file: file.to_string(), ..Default::default() }, AssetLoadingResult::LoadingError);
            }
        }
    }
}

impl Loader for FontLoader {
    type Asset = Font;
    type Payload = FontLoadingParams;

    fn load(&self, _out: &mut Font, params: &AssetLoadingParams<FontLoadingParams>, callback: AssetLoadingCallback<Font>) {
        let file = params.payload.file.clone();

        if !params.r#async {
            Self::read(self.file_manager.as_ref(), &file, callback);
            return;
        }

        let file_manager = self.file_manager.clone();
        self.loader_pool.enqueue(TaskType::Common, move |_token| {
            Self::read(file_manager.as_ref(), &file, callback);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    struct InMemoryFiles(std::collections::HashMap<String, Vec<u8>>);

    impl crate::renderer::FileManager for InMemoryFiles {
        fn read_file(&self, path: &std::path::Path) -> std::io::Result<Vec<u8>> {
            self.0
                .get(path.to_str().unwrap())
                .cloned()
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "missing"))
        }
    }

    #[test]
    fn sync_load_delivers_bytes_on_caller_thread() {
        let mut files = std::collections::HashMap::new();
        files.insert("a.ttf".to_string(), vec![1, 2, 3]);
        let loader = FontLoader::new(Arc::new(InMemoryFiles(files)), ThreadPool::new(1));

        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();
        let params = AssetLoadingParams::new(FontLoadingParams { file: "a.ttf".to_string() }).sync();
        let mut out = Font::default();
        loader.load(&mut out, &params, Box::new(move |font, result| {
            *seen_clone.lock().unwrap() = Some((font, result));
        }));

        let (font, result) = seen.lock().unwrap().take().unwrap();
        assert_eq!(result, AssetLoadingResult::LoadingSuccess);
        assert_eq!(font.bytes, vec![1, 2, 3]);
    }

    #[test]
    fn async_load_of_missing_file_reports_error() {
        let loader = FontLoader::new(Arc::new(InMemoryFiles(std::collections::HashMap::new())), ThreadPool::new(1));

        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();
        let params = AssetLoadingParams::new(FontLoadingParams { file: "missing.ttf".to_string() });
        let mut out = Font::default();
        loader.load(&mut out, &params, Box::new(move |_font, result| {
            *seen_clone.lock().unwrap() = Some(result);
        }));

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(seen.lock().unwrap().take(), Some(AssetLoadingResult::LoadingError));
    }
}
