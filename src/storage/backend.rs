//! Byte-storage primitives consumed by the tiering layer.
//!
//! `LocalFsStore` keeps objects as files under a root directory and writes
//! through a temp file + rename so readers never see a torn object.
//! `MemoryStore` is a sharded in-memory map with failure injection for tests
//! and embedding.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::types::now_ms;

/// Size and modification time of a stored object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObjectStat {
    pub size: u64,
    /// Unix timestamp (ms)
    pub mtime: u64,
}

/// Path-addressed byte storage.
#[async_trait]
pub trait ByteStore: Send + Sync {
    async fn read(&self, path: &str) -> io::Result<Vec<u8>>;

    /// Create or replace the object at `path`.
    async fn write(&self, path: &str, data: &[u8]) -> io::Result<()>;

    async fn exists(&self, path: &str) -> io::Result<bool>;

    async fn stat(&self, path: &str) -> io::Result<ObjectStat>;

    /// Remove `path`. Missing objects are `NotFound`.
    async fn delete(&self, path: &str) -> io::Result<()>;

    /// Move `from` over `to`.
    async fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        let data = self.read(from).await?;
        self.write(to, &data).await?;
        self.delete(from).await
    }
}

// ================================================================================================
// LOCAL FILESYSTEM
// ================================================================================================

/// Objects stored as files below `root`.
#[derive(Debug, Clone)]
pub struct LocalFsStore {
    root: PathBuf,
}

impl LocalFsStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open<P: AsRef<Path>>(root: P) -> io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map an object key to a file below the root. Keys may not escape it.
    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        let mut resolved = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("object key {:?} escapes the store root", path),
                    ))
                }
            }
        }
        if resolved == self.root {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "empty object key",
            ));
        }
        Ok(resolved)
    }
}

#[async_trait]
impl ByteStore for LocalFsStore {
    async fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        tokio::fs::read(self.resolve(path)?).await
    }

    async fn write(&self, path: &str, data: &[u8]) -> io::Result<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut tmp_name = target.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        tokio::fs::write(&tmp_path, data).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &target).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e);
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> io::Result<bool> {
        tokio::fs::try_exists(self.resolve(path)?).await
    }

    async fn stat(&self, path: &str) -> io::Result<ObjectStat> {
        let metadata = tokio::fs::metadata(self.resolve(path)?).await?;
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Ok(ObjectStat {
            size: metadata.len(),
            mtime,
        })
    }

    async fn delete(&self, path: &str) -> io::Result<()> {
        tokio::fs::remove_file(self.resolve(path)?).await
    }

    async fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        let target = self.resolve(to)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(self.resolve(from)?, target).await
    }
}

// ================================================================================================
// IN-MEMORY
// ================================================================================================

#[derive(Debug, Clone)]
struct MemoryObject {
    data: Vec<u8>,
    mtime: u64,
}

/// Sharded in-memory store.
///
/// Paths registered with [`MemoryStore::fail_on`] fail every operation with
/// an I/O error until [`MemoryStore::heal`] is called.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: DashMap<String, MemoryObject>,
    failing: DashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, path: &str) {
        self.failing.insert(path.to_string());
    }

    pub fn heal(&self, path: &str) {
        self.failing.remove(path);
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    fn check(&self, path: &str) -> io::Result<()> {
        if self.failing.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("injected failure on {}", path),
            ));
        }
        Ok(())
    }

    fn not_found(path: &str) -> io::Error {
        io::Error::new(io::ErrorKind::NotFound, format!("{} not found", path))
    }
}

#[async_trait]
impl ByteStore for MemoryStore {
    async fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        self.check(path)?;
        self.objects
            .get(path)
            .map(|object| object.data.clone())
            .ok_or_else(|| Self::not_found(path))
    }

    async fn write(&self, path: &str, data: &[u8]) -> io::Result<()> {
        self.check(path)?;
        self.objects.insert(
            path.to_string(),
            MemoryObject {
                data: data.to_vec(),
                mtime: now_ms(),
            },
        );
        Ok(())
    }

    async fn exists(&self, path: &str) -> io::Result<bool> {
        self.check(path)?;
        Ok(self.objects.contains_key(path))
    }

    async fn stat(&self, path: &str) -> io::Result<ObjectStat> {
        self.check(path)?;
        self.objects
            .get(path)
            .map(|object| ObjectStat {
                size: object.data.len() as u64,
                mtime: object.mtime,
            })
            .ok_or_else(|| Self::not_found(path))
    }

    async fn delete(&self, path: &str) -> io::Result<()> {
        self.check(path)?;
        self.objects
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(path))
    }
}
