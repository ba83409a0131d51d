//! RAM-backed flat namespace
//!
//! Emulates a SPIFFS-style flash: file names are full paths, directories
//! exist only as shared prefixes, and an optional capacity bounds the total
//! number of stored bytes.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{check_path, DirEntry, FileWriter, FlashFs, FsError};

type FileMap = BTreeMap<String, Vec<u8>>;

/// In-memory filesystem provider
#[derive(Debug, Clone, Default)]
pub struct MemFs {
    files: Arc<Mutex<FileMap>>,
    capacity: Option<u64>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that refuses writes once `capacity` bytes are stored
    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            files: Arc::default(),
            capacity: Some(capacity),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FileMap> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn used_bytes(files: &FileMap) -> u64 {
    files.values().map(|data| data.len() as u64).sum()
}

#[async_trait]
impl FlashFs for MemFs {
    async fn exists(&self, path: &str) -> bool {
        check_path(path).is_ok() && self.lock().contains_key(path)
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, FsError> {
        let path = check_path(path)?;
        self.lock()
            .get(path)
            .cloned()
            .ok_or_else(|| FsError::NotFound(path.to_string()))
    }

    async fn create(&self, path: &str) -> Result<Box<dyn FileWriter>, FsError> {
        let path = check_path(path)?;
        if path.ends_with('/') {
            return Err(FsError::InvalidPath(path.to_string()));
        }
        self.lock().insert(path.to_string(), Vec::new());
        Ok(Box::new(MemFileWriter {
            fs: self.clone(),
            path: path.to_string(),
            written: 0,
        }))
    }

    async fn remove(&self, path: &str) -> Result<(), FsError> {
        let path = check_path(path)?;
        self.lock()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| FsError::NotFound(path.to_string()))
    }

    async fn list_dir(&self, dir: &str) -> Result<Vec<DirEntry>, FsError> {
        let dir = check_path(dir)?;
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let entries = self
            .lock()
            .iter()
            .filter(|(path, _)| {
                path.strip_prefix(&prefix)
                    .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
            })
            .map(|(path, data)| DirEntry {
                path: path.clone(),
                size: data.len() as u64,
            })
            .collect();
        Ok(entries)
    }
}

/// Write handle appending straight into the shared map
struct MemFileWriter {
    fs: MemFs,
    path: String,
    written: u64,
}

#[async_trait]
impl FileWriter for MemFileWriter {
    async fn write(&mut self, chunk: &[u8]) -> Result<(), FsError> {
        let mut files = self.fs.lock();
        if let Some(capacity) = self.fs.capacity {
            if used_bytes(&files) + chunk.len() as u64 > capacity {
                return Err(FsError::NoSpace(self.path.clone()));
            }
        }
        // Recreated if removed while the handle is open
        files
            .entry(self.path.clone())
            .or_default()
            .extend_from_slice(chunk);
        drop(files);
        self.written += chunk.len() as u64;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<u64, FsError> {
        Ok(self.written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn put(fs: &MemFs, path: &str, data: &[u8]) {
        let mut writer = fs.create(path).await.unwrap();
        writer.write(data).await.unwrap();
        writer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let fs = MemFs::new();
        put(&fs, "/a.txt", b"hello").await;
        assert!(fs.exists("/a.txt").await);
        assert_eq!(fs.read("/a.txt").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_list_dir_direct_children_only() {
        let fs = MemFs::new();
        put(&fs, "/sub/a", b"1").await;
        put(&fs, "/sub/b", b"22").await;
        put(&fs, "/sub/deeper/c", b"333").await;
        put(&fs, "/subway", b"4444").await;

        let entries = fs.list_dir("/sub").await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name_in("/sub")).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(entries[1].size, 2);
    }

    #[tokio::test]
    async fn test_list_root() {
        let fs = MemFs::new();
        put(&fs, "/index.htm", b"<html>").await;
        put(&fs, "/sub/a", b"1").await;

        let entries = fs.list_dir("/").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name_in("/"), "index.htm");
    }

    #[tokio::test]
    async fn test_capacity_exhausted() {
        let fs = MemFs::with_capacity(4);
        let mut writer = fs.create("/big.bin").await.unwrap();
        writer.write(b"abcd").await.unwrap();
        assert!(matches!(
            writer.write(b"e").await,
            Err(FsError::NoSpace(_))
        ));
        assert_eq!(fs.read("/big.bin").await.unwrap(), b"abcd");
    }

    #[tokio::test]
    async fn test_remove() {
        let fs = MemFs::new();
        put(&fs, "/a.txt", b"x").await;
        fs.remove("/a.txt").await.unwrap();
        assert!(!fs.exists("/a.txt").await);
        assert!(matches!(fs.remove("/a.txt").await, Err(FsError::NotFound(_))));
    }
}
