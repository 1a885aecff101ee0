use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("export file name {0:?} is empty after sanitization")]
    InvalidName(String),

    #[error("key-value store unavailable")]
    StorageUnavailable(#[source] anyhow::Error),
}
