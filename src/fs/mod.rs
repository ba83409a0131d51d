//! Flash filesystem provider module
//!
//! Defines the storage contract consumed by the HTTP handlers:
//! - `exists` / `read` / `create` / `remove` on absolute paths
//! - Non-recursive directory enumeration
//! - Write handles that stay open across upload chunks
//!
//! Two backends are available: a host directory (`DirFs`) and a RAM-backed
//! flat namespace (`MemFs`).

mod dir;
mod inventory;
mod memory;

pub use dir::DirFs;
pub use inventory::{format_bytes, log_inventory};
pub use memory::MemFs;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{StorageBackend, StorageConfig};

/// Root of the flash namespace
pub const ROOT: &str = "/";

/// Errors returned by filesystem providers
#[derive(Debug, Error)]
pub enum FsError {
    /// Nothing stored at the path
    #[error("file not found: {0}")]
    NotFound(String),

    /// Path is not absolute or escapes the namespace
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Backend capacity exhausted
    #[error("no space left on flash while writing {0}")]
    NoSpace(String),

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single entry produced by directory enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Absolute path of the entry
    pub path: String,
    /// Size in bytes
    pub size: u64,
}

impl DirEntry {
    /// Entry name relative to `dir`, without its leading separator
    pub fn name_in<'a>(&'a self, dir: &str) -> &'a str {
        let dir = dir.trim_end_matches('/');
        let relative = self.path.strip_prefix(dir).unwrap_or(&self.path);
        relative.strip_prefix('/').unwrap_or(relative)
    }
}

/// Open write handle; bytes are appended in call order
#[async_trait]
pub trait FileWriter: Send {
    /// Append a chunk to the file
    async fn write(&mut self, chunk: &[u8]) -> Result<(), FsError>;

    /// Flush and close the handle, returning the number of bytes written
    async fn close(self: Box<Self>) -> Result<u64, FsError>;
}

/// Filesystem provider keyed by absolute paths
#[async_trait]
pub trait FlashFs: Send + Sync {
    /// Whether a file is stored at `path`
    async fn exists(&self, path: &str) -> bool;

    /// Read the whole file
    async fn read(&self, path: &str) -> Result<Vec<u8>, FsError>;

    /// Open `path` for writing, truncating any existing content
    async fn create(&self, path: &str) -> Result<Box<dyn FileWriter>, FsError>;

    /// Remove the file at `path`
    async fn remove(&self, path: &str) -> Result<(), FsError>;

    /// Enumerate entries directly under `dir`, in backend order
    async fn list_dir(&self, dir: &str) -> Result<Vec<DirEntry>, FsError>;
}

/// Validate a flash path: absolute, no `.` or `..` segments
pub fn check_path(path: &str) -> Result<&str, FsError> {
    if !path.starts_with('/') {
        return Err(FsError::InvalidPath(path.to_string()));
    }
    if path.split('/').any(|segment| segment == ".." || segment == ".") {
        return Err(FsError::InvalidPath(path.to_string()));
    }
    Ok(path)
}

/// Build the backend selected by the storage configuration
pub fn open_backend(config: &StorageConfig) -> Result<Arc<dyn FlashFs>, FsError> {
    match config.backend {
        StorageBackend::Dir => Ok(Arc::new(DirFs::new(&config.root)?)),
        StorageBackend::Memory => Ok(Arc::new(match config.capacity {
            Some(capacity) => MemFs::with_capacity(capacity),
            None => MemFs::new(),
        })),
    }
}
