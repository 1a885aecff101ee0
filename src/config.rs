use std::{env, time::Duration};

const DEFAULT_TTL_SECONDS: u64 = 24 * 60 * 60;
const DEFAULT_PATH_PREFIX: &str = "exports";
const DEFAULT_COLLECTION_KEY_TEMPLATE: &str = "exports/{}";
const DEFAULT_SPILL_THRESHOLD_BYTES: usize = 5_000_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub ttl: Duration,
    pub path_prefix: String,
    pub collection_key_template: String,
    pub spill_threshold_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_TTL_SECONDS),
            path_prefix: DEFAULT_PATH_PREFIX.to_string(),
            collection_key_template: DEFAULT_COLLECTION_KEY_TEMPLATE.to_string(),
            spill_threshold_bytes: DEFAULT_SPILL_THRESHOLD_BYTES,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let ttl_seconds = env::var("ASYNC_EXPORTS_TTL_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TTL_SECONDS);

        let path_prefix = env::var("ASYNC_EXPORTS_PATH_PREFIX")
            .ok()
            .map(|v| v.trim().trim_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_PATH_PREFIX.to_string());

        let collection_key_template = env::var("ASYNC_EXPORTS_COLLECTION_KEY_TEMPLATE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_COLLECTION_KEY_TEMPLATE.to_string());

        let spill_threshold_bytes = env::var("ASYNC_EXPORTS_SPILL_THRESHOLD_BYTES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(DEFAULT_SPILL_THRESHOLD_BYTES);

        Self {
            ttl: Duration::from_secs(ttl_seconds),
            path_prefix,
            collection_key_template,
            spill_threshold_bytes,
        }
    }

    /// Maps an owner key onto the cache key holding that owner's collection.
    pub fn collection_key(&self, owner_key: &str) -> String {
        self.collection_key_template.replacen("{}", owner_key, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_key_substitutes_owner() {
        let config = Config::default();
        assert_eq!(config.collection_key("42"), "exports/42");
    }

    #[test]
    fn collection_key_custom_template() {
        let config = Config {
            collection_key_template: "acme/downloads/{}".to_string(),
            ..Config::default()
        };
        assert_eq!(config.collection_key("user-7"), "acme/downloads/user-7");
    }
}
