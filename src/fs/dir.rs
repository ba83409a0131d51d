//! Host directory backend
//!
//! Maps absolute flash paths onto files below a root directory.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{check_path, DirEntry, FileWriter, FlashFs, FsError};

/// Filesystem provider rooted in a host directory
#[derive(Debug, Clone)]
pub struct DirFs {
    root: PathBuf,
}

impl DirFs {
    /// Open a backend rooted at `root`, creating the directory if missing
    pub fn new(root: impl AsRef<Path>) -> Result<Self, FsError> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)?;
        Ok(Self {
            root: root.canonicalize()?,
        })
    }

    fn host_path(&self, path: &str) -> Result<PathBuf, FsError> {
        let path = check_path(path)?;
        Ok(self.root.join(path.trim_start_matches('/')))
    }
}

fn map_not_found(path: &str, err: std::io::Error) -> FsError {
    if err.kind() == ErrorKind::NotFound {
        FsError::NotFound(path.to_string())
    } else {
        FsError::Io(err)
    }
}

#[async_trait]
impl FlashFs for DirFs {
    async fn exists(&self, path: &str) -> bool {
        match self.host_path(path) {
            Ok(host) => fs::try_exists(host).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, FsError> {
        let host = self.host_path(path)?;
        fs::read(&host).await.map_err(|e| map_not_found(path, e))
    }

    async fn create(&self, path: &str) -> Result<Box<dyn FileWriter>, FsError> {
        let host = self.host_path(path)?;
        if let Some(parent) = host.parent() {
            fs::create_dir_all(parent).await?;
        }
        let file = fs::File::create(&host).await?;
        Ok(Box::new(DirFileWriter { file, written: 0 }))
    }

    async fn remove(&self, path: &str) -> Result<(), FsError> {
        let host = self.host_path(path)?;
        fs::remove_file(&host)
            .await
            .map_err(|e| map_not_found(path, e))
    }

    async fn list_dir(&self, dir: &str) -> Result<Vec<DirEntry>, FsError> {
        let host = self.host_path(dir)?;
        let mut reader = fs::read_dir(&host)
            .await
            .map_err(|e| map_not_found(dir, e))?;

        let base = dir.trim_end_matches('/');
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let size = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
            entries.push(DirEntry {
                path: format!("{base}/{}", entry.file_name().to_string_lossy()),
                size,
            });
        }
        Ok(entries)
    }
}

/// Write handle over a host file
struct DirFileWriter {
    file: fs::File,
    written: u64,
}

#[async_trait]
impl FileWriter for DirFileWriter {
    async fn write(&mut self, chunk: &[u8]) -> Result<(), FsError> {
        self.file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    async fn close(mut self: Box<Self>) -> Result<u64, FsError> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        Ok(self.written)
    }
}
