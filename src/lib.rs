// lib.rs - Library exports for the concurrent task execution core.

pub mod animation;
pub mod assets;
pub mod cache;
pub mod cancellation;
pub mod commutator;
pub mod engine;
pub mod error;
pub mod math;
pub mod pool;
pub mod renderer;
pub mod task;
pub mod worker;

pub use cancellation::CancellationToken;
pub use engine::{Engine, EngineConfig, FpsLimitConfig};
pub use error::{EngineError, Result};
pub use pool::ThreadPool;
pub use task::{TaskHandle, TaskState, TaskType};
pub use worker::{PacingPolicy, WorkerThread};

/// Test-only logging init, mirroring the teacher's
/// `env_logger::Builder::from_env(...).init()` call in its binary entry
/// point. This crate has no binary, so its only "entry point" is the test
/// harness; call `init()` at the top of a test to see `log` output when
/// running with `RUST_LOG` set.
#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Once;

    static INIT: Once = Once::new();

    pub fn init_logging() {
        INIT.call_once(|| {
            let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).try_init();
        });
    }
}
