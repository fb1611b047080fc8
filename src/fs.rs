//! Filesystem backed [`Store`](crate::Store), one file per key.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::store::{Store, StoredValue, safe_key};

/// A [`Store`] keeping one file per key under a root directory.
///
/// Files hold the encoded value exactly, with no envelope; the file's
/// modification time is the value's write time. The directory is created on
/// the first write.
#[derive(Debug, Clone)]
pub struct FsStore {
    dir: PathBuf,
    use_safe_key: bool,
}

impl FsStore {
    /// Creates a store rooted at `dir`. With `use_safe_key` file names are
    /// passed through [`safe_key`] first.
    pub fn new(dir: impl Into<PathBuf>, use_safe_key: bool) -> Self {
        Self {
            dir: dir.into(),
            use_safe_key,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        if self.use_safe_key {
            self.dir.join(safe_key(key))
        } else {
            self.dir.join(key)
        }
    }
}

#[async_trait]
impl Store for FsStore {
    async fn get(&self, key: &str) -> Result<Option<StoredValue>, StoreError> {
        let path = self.path_for(key);
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let raw = tokio::fs::read(&path).await?;
        Ok(Some(StoredValue::new(raw, metadata.modified()?)))
    }

    async fn set(&self, key: &str, raw: &[u8]) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.path_for(key), raw).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}
