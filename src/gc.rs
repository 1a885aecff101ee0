use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio::{task::JoinHandle, time};
use tracing::{info, warn};

use crate::{artifact_store::BlobStore, kv_store::KeyValueStore, registry::ExportRegistry};

#[derive(Debug, Clone, Copy, Default)]
pub struct SweepStats {
    pub scanned: usize,
    pub removed: usize,
}

/// Reconciles the blob store against the registry: every job-id directory
/// under the artifact prefix whose record has expired gets its files and
/// then itself deleted. TTL expiry alone never frees storage, so this sweep
/// is the only thing standing between the blob store and unbounded growth.
///
/// Idempotent and order-independent. Tolerates partially written
/// directories (a producer killed between path creation and record write).
pub async fn sweep(
    kv: &dyn KeyValueStore,
    blobs: &dyn BlobStore,
    path_prefix: &str,
) -> Result<SweepStats> {
    let mut stats = SweepStats::default();
    let listing = blobs.list_dir(path_prefix).await?;
    for job_id in listing.directories {
        stats.scanned += 1;
        // Probe liveness right before deleting, not at sweep start, so a
        // job created mid-sweep survives.
        if kv.get(&job_id).await?.is_some() {
            continue;
        }
        let dir = format!("{path_prefix}/{job_id}");
        let contents = match blobs.list_dir(&dir).await {
            Ok(contents) => contents,
            Err(err) => {
                warn!(job_id = %job_id, "Failed to list orphaned directory {dir}: {err:#}");
                continue;
            }
        };
        let mut files_cleared = true;
        for file in contents.files {
            let path = format!("{dir}/{file}");
            if let Err(err) = blobs.delete(&path).await {
                warn!(job_id = %job_id, "Failed to delete orphaned artifact {path}: {err:#}");
                files_cleared = false;
            }
        }
        if !files_cleared {
            continue;
        }
        match blobs.delete(&dir).await {
            Ok(()) => stats.removed += 1,
            Err(err) => {
                warn!(job_id = %job_id, "Failed to delete orphaned directory {dir}: {err:#}");
            }
        }
    }
    if stats.removed > 0 {
        info!(
            scanned = stats.scanned,
            removed = stats.removed,
            "Garbage collection sweep finished"
        );
    }
    Ok(stats)
}

/// Runs the sweep on a fixed schedule, decoupled from any job's lifecycle.
/// Cadence is deployment policy; weekly is plenty for a 24h TTL.
pub fn spawn_gc_worker(registry: Arc<ExportRegistry>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(every);
        loop {
            interval.tick().await;
            if let Err(err) = registry.run_garbage_collection().await {
                warn!("Garbage collection sweep error: {err:#}");
            }
        }
    })
}
