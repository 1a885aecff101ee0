use std::sync::Arc;

use anyhow::Context;
use serde_json::{json, Value};
use tokio::io::AsyncRead;
use tracing::{error, info, warn};

use crate::{
    artifact_store::{self, BlobStore},
    collection::CollectionIndex,
    config::Config,
    error::RegistryError,
    gc::{self, SweepStats},
    kv_store::KeyValueStore,
    models::{JobHandle, JobRecord, JobState},
    notify::{JobEvent, JobEventKind, NotificationSink},
};

pub const DEFAULT_PROGRESS_RESOLUTION: u64 = 10;

/// Orchestrates job records across the key-value store and the blob store.
/// One registry serves many concurrent producers and readers; every
/// operation is keyed by `job_id` except the collection append, whose
/// lost-update race is documented on [`CollectionIndex::append`].
pub struct ExportRegistry {
    config: Config,
    kv: Arc<dyn KeyValueStore>,
    blobs: Arc<dyn BlobStore>,
    collections: CollectionIndex,
    sink: Option<Arc<dyn NotificationSink>>,
}

impl ExportRegistry {
    pub fn new(config: Config, kv: Arc<dyn KeyValueStore>, blobs: Arc<dyn BlobStore>) -> Self {
        let collections = CollectionIndex::new(kv.clone(), config.clone());
        Self {
            config,
            kv,
            blobs,
            collections,
            sink: None,
        }
    }

    pub fn with_notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registers a new export attempt: stores the record under its fresh
    /// `job_id`, prepends that id to the owner's collection and announces
    /// the job. Callers own retry on `StorageUnavailable`.
    pub async fn create_job(
        &self,
        owner_key: &str,
        raw_filename: &str,
        display_name: Option<&str>,
    ) -> Result<JobHandle, RegistryError> {
        let record = JobRecord::new(&self.config, owner_key, raw_filename, display_name)?;
        let job_id = record.job_id.clone();

        self.put_record(&record)
            .await
            .map_err(RegistryError::StorageUnavailable)?;
        self.collections
            .append(owner_key, &job_id)
            .await
            .map_err(RegistryError::StorageUnavailable)?;

        info!(job_id = %job_id, owner_key = %owner_key, name = %record.display_name, "Export job created");
        self.emit(JobEventKind::Created, owner_key, &job_id, None)
            .await;

        Ok(JobHandle {
            collection_key: self.collections.collection_key(owner_key),
            job_id,
        })
    }

    /// Stores a clamped, rounded progress percentage and refreshes the
    /// record's TTL. Reports against an expired, cleared or terminal job
    /// are silently discarded; late progress is expected, not an error.
    pub async fn update_progress(&self, job_id: &str, percent: f64) -> Result<(), RegistryError> {
        let Some(mut record) = self
            .fetch_record(job_id)
            .await
            .map_err(RegistryError::StorageUnavailable)?
        else {
            return Ok(());
        };
        if record.state.is_terminal() {
            return Ok(());
        }
        record.state = JobState::InProgress;
        record.progress_percent = clamp_percent(percent);
        self.put_record(&record)
            .await
            .map_err(RegistryError::StorageUnavailable)?;
        self.emit_updated(&record).await;
        Ok(())
    }

    /// Throttled progress reporting for row-by-row producers: fires
    /// `update_progress` only when `current + 1` crosses one of
    /// `resolution` evenly spaced thresholds of `total`, and never for the
    /// final 100% (finalize sets that). Keeps a million-row export from
    /// issuing a million cache writes.
    pub async fn update_progress_by_count(
        &self,
        job_id: &str,
        total: u64,
        current: u64,
        resolution: u64,
    ) -> Result<(), RegistryError> {
        let resolution = resolution.clamp(1, 100);
        let step = total / resolution;
        for x in 1..resolution {
            if current + 1 == step * x {
                self.update_progress(job_id, (100 * x) as f64 / resolution as f64)
                    .await?;
                break;
            }
        }
        Ok(())
    }

    /// Streams the finished artifact into the blob store and marks the job
    /// terminal. A write failure is captured into the record as `failed`
    /// rather than raised: the producer may already be dying, and the
    /// consumer still needs a coherent terminal state to render.
    pub async fn finalize_job<R>(&self, job_id: &str, mut content: R) -> Result<(), RegistryError>
    where
        R: AsyncRead + Send + Unpin,
    {
        let Some(mut record) = self
            .fetch_record(job_id)
            .await
            .map_err(RegistryError::StorageUnavailable)?
        else {
            return Ok(());
        };
        match self.blobs.save(&record.artifact_path, &mut content).await {
            Ok(stored_path) => {
                record.state = JobState::Completed;
                record.artifact_url = Some(self.blobs.url(&stored_path));
                record.error_message = None;
                info!(job_id = %job_id, path = %stored_path, "Export job completed");
            }
            Err(err) => {
                error!(
                    job_id = %job_id,
                    name = %record.display_name,
                    "Export artifact write failed: {err:#}"
                );
                record.state = JobState::Failed;
                record.error_message = Some(format!("{err:#}"));
            }
        }
        record.progress_percent = 100;
        self.put_record(&record)
            .await
            .map_err(RegistryError::StorageUnavailable)?;
        self.emit_updated(&record).await;
        Ok(())
    }

    /// Direct transition to `failed` for producers that detect an error
    /// without attempting a write. No-op when the record is gone.
    pub async fn fail_job(&self, job_id: &str, reason: &str) -> Result<(), RegistryError> {
        let Some(mut record) = self
            .fetch_record(job_id)
            .await
            .map_err(RegistryError::StorageUnavailable)?
        else {
            return Ok(());
        };
        warn!(job_id = %job_id, name = %record.display_name, reason = %reason, "Export job failed");
        record.state = JobState::Failed;
        record.error_message = Some(reason.to_string());
        self.put_record(&record)
            .await
            .map_err(RegistryError::StorageUnavailable)?;
        self.emit_updated(&record).await;
        Ok(())
    }

    /// User-initiated removal: drops the record, then the artifact file,
    /// then its directory. Each deletion failure is logged and tolerated
    /// independently; cleanup is best effort, the GC sweep catches
    /// leftovers.
    pub async fn clear_job(&self, job_id: &str) -> Result<(), RegistryError> {
        let Some(record) = self
            .fetch_record(job_id)
            .await
            .map_err(RegistryError::StorageUnavailable)?
        else {
            return Ok(());
        };
        if let Err(err) = self.kv.delete(job_id).await {
            warn!(job_id = %job_id, "Failed to delete job record: {err:#}");
        }
        if let Err(err) = self.blobs.delete(&record.artifact_path).await {
            warn!(
                job_id = %job_id,
                "Failed to delete artifact {}: {err:#}",
                record.artifact_path
            );
        }
        if let Some(dir) = artifact_store::parent_dir(&record.artifact_path) {
            if let Err(err) = self.blobs.delete(dir).await {
                warn!(job_id = %job_id, "Failed to delete artifact directory {dir}: {err:#}");
            }
        }
        info!(job_id = %job_id, "Export job cleared");
        self.emit(JobEventKind::Removed, &record.owner_key, job_id, None)
            .await;
        Ok(())
    }

    pub async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, RegistryError> {
        let record = self
            .fetch_record(job_id)
            .await
            .map_err(RegistryError::StorageUnavailable)?;
        Ok(record.map(|record| self.with_resolved_url(record)))
    }

    /// The owner's jobs, newest first. Ids whose record has expired are
    /// silently skipped; completed records get their download URL resolved
    /// at read time since the URL scheme can depend on runtime config.
    pub async fn list_by_owner(&self, owner_key: &str) -> Result<Vec<JobRecord>, RegistryError> {
        let ids = self
            .collections
            .job_ids(owner_key)
            .await
            .map_err(RegistryError::StorageUnavailable)?;
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self
                .fetch_record(&id)
                .await
                .map_err(RegistryError::StorageUnavailable)?
            {
                records.push(self.with_resolved_url(record));
            }
        }
        Ok(records)
    }

    pub async fn prune_collection(&self, owner_key: &str) -> Result<(), RegistryError> {
        self.collections
            .prune(owner_key)
            .await
            .map_err(RegistryError::StorageUnavailable)
    }

    pub async fn run_garbage_collection(&self) -> anyhow::Result<SweepStats> {
        gc::sweep(
            self.kv.as_ref(),
            self.blobs.as_ref(),
            &self.config.path_prefix,
        )
        .await
    }

    async fn put_record(&self, record: &JobRecord) -> anyhow::Result<()> {
        let raw = serde_json::to_vec(record).context("Failed to encode job record")?;
        self.kv.set(&record.job_id, raw, self.config.ttl).await
    }

    async fn fetch_record(&self, job_id: &str) -> anyhow::Result<Option<JobRecord>> {
        let Some(raw) = self.kv.get(job_id).await? else {
            return Ok(None);
        };
        match serde_json::from_slice(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                warn!(job_id = %job_id, "Discarding unreadable job record: {err}");
                Ok(None)
            }
        }
    }

    fn with_resolved_url(&self, mut record: JobRecord) -> JobRecord {
        if record.state == JobState::Completed && record.artifact_url.is_none() {
            record.artifact_url = Some(self.blobs.url(&record.artifact_path));
        }
        record
    }

    async fn emit(
        &self,
        kind: JobEventKind,
        owner_key: &str,
        job_id: &str,
        payload: Option<Value>,
    ) {
        if let Some(sink) = &self.sink {
            sink.emit(JobEvent {
                kind,
                owner_key: owner_key.to_string(),
                job_id: job_id.to_string(),
                payload,
            })
            .await;
        }
    }

    async fn emit_updated(&self, record: &JobRecord) {
        self.emit(
            JobEventKind::Updated,
            &record.owner_key,
            &record.job_id,
            Some(json!({
                "state": record.state,
                "progress_percent": record.progress_percent,
            })),
        )
        .await;
    }
}

fn clamp_percent(percent: f64) -> u8 {
    percent.round().clamp(0.0, 100.0) as u8
}
