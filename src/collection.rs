use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::warn;

use crate::{config::Config, kv_store::KeyValueStore};

/// Per-owner ordered set of job ids, newest first, stored as a JSON array
/// under the owner's collection key.
pub struct CollectionIndex {
    kv: Arc<dyn KeyValueStore>,
    config: Config,
}

impl CollectionIndex {
    pub fn new(kv: Arc<dyn KeyValueStore>, config: Config) -> Self {
        Self { kv, config }
    }

    pub fn collection_key(&self, owner_key: &str) -> String {
        self.config.collection_key(owner_key)
    }

    /// Current id list for an owner. Ids may reference expired job records;
    /// staleness is expected and resolved by callers, not here.
    pub async fn job_ids(&self, owner_key: &str) -> Result<Vec<String>> {
        let key = self.collection_key(owner_key);
        let Some(raw) = self.kv.get(&key).await? else {
            return Ok(Vec::new());
        };
        match serde_json::from_slice(&raw) {
            Ok(ids) => Ok(ids),
            Err(err) => {
                warn!(collection_key = %key, "Discarding unreadable collection entry: {err}");
                Ok(Vec::new())
            }
        }
    }

    /// Prepends a job id to the owner's list.
    ///
    /// Non-atomic read-modify-write: two concurrent appends for the same
    /// owner can lose one id from the list (never the job record itself).
    /// `prune` and the GC sweep bound the damage; a backend with an atomic
    /// list push can override the race at the store level, nothing here
    /// depends on that.
    pub async fn append(&self, owner_key: &str, job_id: &str) -> Result<()> {
        let key = self.collection_key(owner_key);
        let mut ids = self.job_ids(owner_key).await?;
        ids.insert(0, job_id.to_string());
        self.write(&key, &ids).await
    }

    /// Drops ids whose job record has expired. Writes back only when the
    /// list shrank, so an unchanged collection never clobbers a concurrent
    /// append.
    pub async fn prune(&self, owner_key: &str) -> Result<()> {
        let key = self.collection_key(owner_key);
        let stored = self.job_ids(owner_key).await?;
        let mut active = Vec::with_capacity(stored.len());
        for id in &stored {
            if self.kv.get(id).await?.is_some() {
                active.push(id.clone());
            }
        }
        if active.len() != stored.len() {
            self.write(&key, &active).await?;
        }
        Ok(())
    }

    async fn write(&self, key: &str, ids: &[String]) -> Result<()> {
        let raw = serde_json::to_vec(ids).context("Failed to encode collection entry")?;
        self.kv.set(key, raw, self.config.ttl).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv_store::MemoryKvStore;
    use async_trait::async_trait;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    struct CountingKv {
        inner: MemoryKvStore,
        sets: AtomicUsize,
    }

    impl CountingKv {
        fn new() -> Self {
            Self {
                inner: MemoryKvStore::new(),
                sets: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl KeyValueStore for CountingKv {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
            self.sets.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, value, ttl).await
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.inner.delete(key).await
        }
    }

    fn index_over(kv: Arc<dyn KeyValueStore>) -> CollectionIndex {
        CollectionIndex::new(kv, Config::default())
    }

    #[tokio::test]
    async fn append_prepends_newest_first() {
        let index = index_over(Arc::new(MemoryKvStore::new()));
        index.append("7", "first").await.unwrap();
        index.append("7", "second").await.unwrap();
        assert_eq!(
            index.job_ids("7").await.unwrap(),
            vec!["second".to_string(), "first".to_string()]
        );
    }

    #[tokio::test]
    async fn missing_collection_reads_empty() {
        let index = index_over(Arc::new(MemoryKvStore::new()));
        assert!(index.job_ids("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn prune_drops_dead_ids() {
        let kv = Arc::new(MemoryKvStore::new());
        let index = index_over(kv.clone());
        kv.set("live", b"{}".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        index.append("7", "dead").await.unwrap();
        index.append("7", "live").await.unwrap();

        index.prune("7").await.unwrap();
        assert_eq!(index.job_ids("7").await.unwrap(), vec!["live".to_string()]);
    }

    #[tokio::test]
    async fn prune_skips_write_when_nothing_changed() {
        let kv = Arc::new(CountingKv::new());
        let index = index_over(kv.clone());
        kv.set("live", b"{}".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        index.append("7", "live").await.unwrap();

        let sets_before = kv.sets.load(Ordering::SeqCst);
        index.prune("7").await.unwrap();
        assert_eq!(kv.sets.load(Ordering::SeqCst), sets_before);
    }

    #[tokio::test]
    async fn corrupt_entry_reads_empty() {
        let kv = Arc::new(MemoryKvStore::new());
        let index = index_over(kv.clone());
        kv.set(
            &index.collection_key("7"),
            b"not json".to_vec(),
            Duration::from_secs(60),
        )
        .await
        .unwrap();
        assert!(index.job_ids("7").await.unwrap().is_empty());
    }
}
