// Application state module
// Shared by every connection task

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use super::types::Config;
use crate::fs::FlashFs;

/// Application state
pub struct AppState {
    pub config: Config,
    pub fs: Arc<dyn FlashFs>,

    // Cached config values for fast access without locks
    pub cached_access_log: AtomicBool,
}

impl AppState {
    pub fn new(config: Config, fs: Arc<dyn FlashFs>) -> Self {
        let cached_access_log = AtomicBool::new(config.logging.access_log);
        Self {
            config,
            fs,
            cached_access_log,
        }
    }
}
