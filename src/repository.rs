//! Persistence seam for subscribed sources.

use std::path::Path;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::RepositoryError;
use crate::feed::Source;

/// Storage for subscriptions, keyed by feed URL
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn get_by_url(&self, feed_url: &str) -> Result<Option<Source>, RepositoryError>;

    /// Fails with [`RepositoryError::AlreadyExists`] if the URL is taken
    async fn add(&self, source: Source) -> Result<(), RepositoryError>;

    /// Replace the subscription with the same feed URL
    async fn update(&self, source: Source) -> Result<(), RepositoryError>;

    async fn list(&self) -> Result<Vec<Source>, RepositoryError>;
}

/// In-memory repository that can be loaded from and saved to a JSON file.
///
/// Subscriptions keep the order in which they were added.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    sources: RwLock<Vec<Source>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sources(sources: Vec<Source>) -> Self {
        Self {
            sources: RwLock::new(sources),
        }
    }

    /// Load subscriptions from `path`; a missing file is an empty repository
    pub async fn load(path: &Path) -> Result<Self, RepositoryError> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(source) => {
                return Err(RepositoryError::ReadFailed {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let sources: Vec<Source> =
            serde_json::from_str(&content).map_err(|source| RepositoryError::JsonParseFailed {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::with_sources(sources))
    }

    /// Write all subscriptions to `path` as pretty JSON
    pub async fn save(&self, path: &Path) -> Result<(), RepositoryError> {
        let json = {
            let sources = self.sources.read().await;
            serde_json::to_string_pretty(&*sources)?
        };

        let write_failed = |source| RepositoryError::WriteFailed {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
        }
        tokio::fs::write(path, json).await.map_err(write_failed)
    }
}

#[async_trait]
impl SubscriptionRepository for MemoryRepository {
    async fn get_by_url(&self, feed_url: &str) -> Result<Option<Source>, RepositoryError> {
        let sources = self.sources.read().await;
        Ok(sources.iter().find(|s| s.feed_url == feed_url).cloned())
    }

    async fn add(&self, source: Source) -> Result<(), RepositoryError> {
        let mut sources = self.sources.write().await;
        if sources.iter().any(|s| s.feed_url == source.feed_url) {
            return Err(RepositoryError::AlreadyExists(source.feed_url));
        }
        sources.push(source);
        Ok(())
    }

    async fn update(&self, source: Source) -> Result<(), RepositoryError> {
        let mut sources = self.sources.write().await;
        match sources.iter_mut().find(|s| s.feed_url == source.feed_url) {
            Some(slot) => {
                *slot = source;
                Ok(())
            }
            None => Err(RepositoryError::NotFound(source.feed_url)),
        }
    }

    async fn list(&self) -> Result<Vec<Source>, RepositoryError> {
        Ok(self.sources.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::fixtures;

    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    const URL_A: &str = "https://example.com/a.xml";
    const URL_B: &str = "https://example.com/b.xml";

    #[tokio::test]
    async fn add_rejects_duplicate_urls() {
        let repo = MemoryRepository::new();
        repo.add(fixtures::source(URL_A)).await.unwrap();

        let err = repo.add(fixtures::source(URL_A)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::AlreadyExists(url) if url == URL_A));
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_replaces_in_place() {
        let repo = MemoryRepository::new();
        repo.add(fixtures::source(URL_A)).await.unwrap();
        repo.add(fixtures::source(URL_B)).await.unwrap();

        let mut changed = fixtures::source(URL_A);
        changed.title = "Renamed".to_string();
        repo.update(changed).await.unwrap();

        let list = repo.list().await.unwrap();
        assert_eq!(list[0].title, "Renamed");
        assert_eq!(list[1].feed_url, URL_B);
    }

    #[tokio::test]
    async fn update_of_unknown_source_fails() {
        let repo = MemoryRepository::new();
        let err = repo.update(fixtures::source(URL_A)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let repo = MemoryRepository::load(&dir.path().join("subscriptions.json"))
            .await
            .unwrap();
        assert!(repo.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_then_load_preserves_sources() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("subscriptions.json");

        let mut source = fixtures::source(URL_A);
        source.item_ids = vec!["x".to_string(), "y".to_string()];
        let repo = MemoryRepository::with_sources(vec![source.clone(), fixtures::source(URL_B)]);
        repo.save(&path).await.unwrap();

        let loaded = MemoryRepository::load(&path).await.unwrap();
        assert_eq!(loaded.get_by_url(URL_A).await.unwrap(), Some(source));
        assert_eq!(loaded.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn corrupt_file_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("subscriptions.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = MemoryRepository::load(&path).await.unwrap_err();
        assert!(matches!(err, RepositoryError::JsonParseFailed { .. }));
    }
}
