//! Lifecycle tracking for asynchronously produced export artifacts.
//!
//! Producers register a job, stream progress while they build the file,
//! then finalize it into durable blob storage; consumers poll or subscribe
//! for per-owner job lists. In-flight state lives in a time-bounded
//! key-value store, finished artifacts in a blob store, and a periodic
//! garbage-collection sweep reconciles the two so expired jobs never leave
//! orphaned files behind.

pub mod artifact_store;
pub mod collection;
pub mod config;
pub mod error;
pub mod gc;
pub mod kv_store;
pub mod models;
pub mod notify;
pub mod registry;
pub mod spool;

pub use artifact_store::{BlobStore, DirListing, FsBlobStore};
pub use collection::CollectionIndex;
pub use config::Config;
pub use error::RegistryError;
pub use gc::{spawn_gc_worker, SweepStats};
pub use kv_store::{KeyValueStore, MemoryKvStore};
pub use models::{
    any_in_progress, sanitize_file_name, timestamped_export_name, JobHandle, JobRecord, JobState,
};
pub use notify::{JobEvent, JobEventKind, NotificationSink};
pub use registry::{ExportRegistry, DEFAULT_PROGRESS_RESOLUTION};
pub use spool::{SpoolReader, SpooledBuffer};
