use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{artifact_store, config::Config, error::RegistryError};

const RESERVED_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One export attempt, stored in the key-value store under `job_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub owner_key: String,
    pub created_at: DateTime<Utc>,
    pub artifact_path: String,
    pub display_name: String,
    pub state: JobState,
    pub progress_percent: u8,
    pub error_message: Option<String>,
    pub artifact_url: Option<String>,
}

impl JobRecord {
    pub fn new(
        config: &Config,
        owner_key: &str,
        raw_filename: &str,
        display_name: Option<&str>,
    ) -> Result<Self, RegistryError> {
        let file_name = sanitize_file_name(raw_filename)?;
        let job_id = Uuid::new_v4().to_string();
        let artifact_path = artifact_store::artifact_path(&config.path_prefix, &job_id, &file_name);
        Ok(Self {
            job_id,
            owner_key: owner_key.to_string(),
            created_at: Utc::now(),
            artifact_path,
            display_name: display_name.unwrap_or(&file_name).to_string(),
            state: JobState::Pending,
            progress_percent: 0,
            error_message: None,
            artifact_url: None,
        })
    }

    pub fn file_name(&self) -> &str {
        self.artifact_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.artifact_path)
    }
}

/// Keys handed back to the producer: the owner's collection entry and the
/// job's own cache key.
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub collection_key: String,
    pub job_id: String,
}

pub fn any_in_progress(records: &[JobRecord]) -> bool {
    records.iter().any(|record| !record.state.is_terminal())
}

/// Reduces a requested file name to a single safe path segment. Control
/// characters are dropped; separators, reserved characters and interior
/// whitespace become `_`. A name with nothing left after that is rejected.
pub fn sanitize_file_name(raw: &str) -> Result<String, RegistryError> {
    let mut name = String::with_capacity(raw.len());
    for ch in raw.trim().chars() {
        if ch.is_control() {
            continue;
        }
        if RESERVED_CHARS.contains(&ch) || ch.is_whitespace() {
            name.push('_');
        } else {
            name.push(ch);
        }
    }
    let name = name.trim_start_matches('.').to_string();
    if name.chars().all(|c| c == '_' || c == '.') {
        return Err(RegistryError::InvalidName(raw.to_string()));
    }
    Ok(name)
}

/// File and display names for a dated export, e.g.
/// `Overdue_Books_2026-08-07_14-30.csv` / `Overdue Books 2026-08-07`.
pub fn timestamped_export_name(base: &str) -> (String, String) {
    let now = Utc::now();
    let file_name = format!(
        "{}_{}.csv",
        base.trim().replace(' ', "_"),
        now.format("%Y-%m-%d_%H-%M")
    );
    let display_name = format!("{} {}", base.trim(), now.format("%Y-%m-%d"));
    (file_name, display_name)
}
