use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::{fs, io::AsyncRead};

/// Storage key for a job's artifact: `prefix/job_id/file_name`. Keys are
/// `/`-joined strings so they stay portable across blob store backends.
pub fn artifact_path(prefix: &str, job_id: &str, file_name: &str) -> String {
    format!("{prefix}/{job_id}/{file_name}")
}

pub fn parent_dir(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(dir, _)| dir)
}

#[derive(Debug, Default)]
pub struct DirListing {
    pub directories: Vec<String>,
    pub files: Vec<String>,
}

/// Durable write-once artifact storage. Deleting a missing path succeeds;
/// deleting a directory only succeeds once its files are gone.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn save(
        &self,
        path: &str,
        content: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<String>;

    async fn delete(&self, path: &str) -> Result<()>;

    fn url(&self, path: &str) -> String;

    async fn list_dir(&self, prefix: &str) -> Result<DirListing>;
}

/// Local-filesystem blob store rooted at a directory, serving URLs under a
/// configured base.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    url_base: String,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, url_base: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            url_base: url_base.into(),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn save(
        &self,
        path: &str,
        content: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<String> {
        let target = self.resolve(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create artifact directory {}", parent.display()))?;
        }
        let mut file = fs::File::create(&target)
            .await
            .with_context(|| format!("Failed to create artifact file {}", target.display()))?;
        tokio::io::copy(content, &mut file)
            .await
            .with_context(|| format!("Failed to write artifact {}", target.display()))?;
        Ok(path.to_string())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let target = self.resolve(path);
        let meta = match fs::metadata(&target).await {
            Ok(meta) => meta,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to stat {}", target.display()))
            }
        };
        let result = if meta.is_dir() {
            fs::remove_dir(&target).await
        } else {
            fs::remove_file(&target).await
        };
        match result {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("Failed to delete {}", target.display())),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.url_base.trim_end_matches('/'), path)
    }

    async fn list_dir(&self, prefix: &str) -> Result<DirListing> {
        let dir = self.resolve(prefix);
        let mut listing = DirListing::default();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(listing),
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to list {}", dir.display()))
            }
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("Failed to list {}", dir.display()))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let file_type = entry
                .file_type()
                .await
                .with_context(|| format!("Failed to stat {name} under {}", dir.display()))?;
            if file_type.is_dir() {
                listing.directories.push(name);
            } else {
                listing.files.push(name);
            }
        }
        Ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_path_layout() {
        assert_eq!(
            artifact_path("exports", "abc", "report.csv"),
            "exports/abc/report.csv"
        );
        assert_eq!(
            parent_dir("exports/abc/report.csv"),
            Some("exports/abc")
        );
        assert_eq!(parent_dir("report.csv"), None);
    }

    #[tokio::test]
    async fn save_creates_directories_and_roundtrips() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(tmp.path(), "http://media.test");
        let mut content: &[u8] = b"id,title\n1,Dune\n";
        let stored = store
            .save("exports/j1/report.csv", &mut content)
            .await
            .unwrap();
        assert_eq!(stored, "exports/j1/report.csv");
        let on_disk = tokio::fs::read(tmp.path().join("exports/j1/report.csv"))
            .await
            .unwrap();
        assert_eq!(on_disk, b"id,title\n1,Dune\n");
        assert_eq!(
            store.url(&stored),
            "http://media.test/exports/j1/report.csv"
        );
    }

    #[tokio::test]
    async fn delete_handles_files_directories_and_missing_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(tmp.path(), "http://media.test");
        let mut content: &[u8] = b"x";
        store.save("exports/j1/a.csv", &mut content).await.unwrap();

        store.delete("exports/j1/a.csv").await.unwrap();
        store.delete("exports/j1").await.unwrap();
        assert!(!tmp.path().join("exports/j1").exists());

        store.delete("exports/never-existed").await.unwrap();
    }

    #[tokio::test]
    async fn list_dir_splits_directories_from_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(tmp.path(), "http://media.test");
        let mut content: &[u8] = b"x";
        store.save("exports/j1/a.csv", &mut content).await.unwrap();
        let mut content: &[u8] = b"y";
        store.save("exports/stray.txt", &mut content).await.unwrap();

        let listing = store.list_dir("exports").await.unwrap();
        assert_eq!(listing.directories, vec!["j1".to_string()]);
        assert_eq!(listing.files, vec!["stray.txt".to_string()]);

        let empty = store.list_dir("no-such-prefix").await.unwrap();
        assert!(empty.directories.is_empty() && empty.files.is_empty());
    }
}
