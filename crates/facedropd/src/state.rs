use crate::config::Config;
use crate::engine::EngineHandle;
use crate::storage::UploadSink;
use std::sync::{Arc, OnceLock};

/// Shared state for all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sink: UploadSink,
    /// Readiness gate: empty until the model bundle is loaded, then set once.
    engine: Arc<OnceLock<EngineHandle>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            sink: UploadSink::new(config.upload_dir.clone()),
            config: Arc::new(config),
            engine: Arc::new(OnceLock::new()),
        }
    }

    /// Open the gate. Returns `false` if it was already open; the first
    /// engine stays installed.
    pub fn mark_ready(&self, engine: EngineHandle) -> bool {
        self.engine.set(engine).is_ok()
    }

    pub fn is_ready(&self) -> bool {
        self.engine.get().is_some()
    }

    pub fn engine(&self) -> Option<&EngineHandle> {
        self.engine.get()
    }
}
