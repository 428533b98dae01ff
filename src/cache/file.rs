// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{CacheEntry, CacheMetadata, CacheStore};
use crate::error::CacheError;

const ENTRY_EXTENSION: &str = "json";
const PARTIAL_EXTENSION: &str = "partial";

/// Disk-backed cache storing one JSON document per key.
///
/// Entries are written to a `.partial` sibling and renamed into place, so a
/// concurrent reader sees either the old entry or the new one.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Open (and create if needed) a cache rooted at `dir`
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| CacheError::Io {
                path: dir.clone(),
                source,
            })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let name = format!("{:x}", Sha256::digest(key.as_bytes()));
        self.dir.join(name).with_extension(ENTRY_EXTENSION)
    }

    async fn read_entry(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.entry_path(key);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheError::Io { path, source }),
        };

        let entry: CacheEntry = serde_json::from_str(&content)
            .map_err(|source| CacheError::Decode { path, source })?;

        // A colliding key reads as a miss
        Ok((entry.key == key).then_some(entry))
    }
}

#[async_trait]
impl CacheStore for FileCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.read_entry(key).await?.filter(|e| e.is_fresh()))
    }

    async fn peek(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        self.read_entry(key).await
    }

    async fn set(
        &self,
        key: &str,
        payload: String,
        ttl: Duration,
        metadata: CacheMetadata,
    ) -> Result<(), CacheError> {
        let entry = CacheEntry::new(key, payload, ttl, metadata);
        let json = serde_json::to_vec(&entry)?;

        let path = self.entry_path(key);
        let partial = path.with_extension(PARTIAL_EXTENSION);

        tokio::fs::write(&partial, json)
            .await
            .map_err(|source| CacheError::Io {
                path: partial.clone(),
                source,
            })?;

        if let Err(source) = tokio::fs::rename(&partial, &path).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(CacheError::Io { path, source });
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let path = self.entry_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(CacheError::Io { path, source }),
        }
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let io_err = |source| CacheError::Io {
            path: self.dir.clone(),
            source,
        };

        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(io_err)?;
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let path = entry.path();
            let ours = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == ENTRY_EXTENSION || ext == PARTIAL_EXTENSION);
            if !ours {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(source) => return Err(CacheError::Io { path, source }),
            }
        }
        Ok(())
    }
}
